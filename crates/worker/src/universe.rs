use anyhow::Context;
use std::borrow::Cow;
use std::collections::HashSet;
use std::path::Path;

const VENUE_SUFFIX: &str = ".IS";

#[derive(Debug, Clone, Default)]
pub struct UniverseOptions {
    /// Optional cap on the number of symbols scanned, applied after dedup.
    pub max: Option<usize>,
}

impl UniverseOptions {
    pub fn from_env() -> Self {
        let mut out = Self::default();

        if let Ok(s) = std::env::var("UNIVERSE_MAX") {
            if let Ok(n) = s.trim().parse::<usize>() {
                out.max = Some(n).filter(|n| *n > 0);
            }
        }

        out
    }
}

/// Upper-cases a ticker and appends the venue suffix. Blank input yields `None`.
pub fn normalize_symbol(raw: &str) -> Option<String> {
    let s = raw.trim().to_uppercase();
    if s.is_empty() {
        return None;
    }
    if s.ends_with(VENUE_SUFFIX) {
        Some(s)
    } else {
        Some(format!("{s}{VENUE_SUFFIX}"))
    }
}

/// One symbol per line; `#` and `//` lines are comments. File order is kept, duplicates dropped.
pub fn parse_universe(text: &str, opts: &UniverseOptions) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with("//") {
            continue;
        }
        if line.contains(char::REPLACEMENT_CHARACTER) {
            tracing::warn!(line, "undecodable symbol line skipped");
            continue;
        }
        let Some(sym) = normalize_symbol(line) else {
            continue;
        };
        if seen.insert(sym.clone()) {
            out.push(sym);
        }
    }
    if let Some(max) = opts.max {
        out.truncate(max);
    }
    out
}

/// A missing file is a configuration problem reported by the engine, not a crash.
/// Bytes that are not UTF-8 only cost the lines they sit on.
pub fn load_universe(path: &Path, opts: &UniverseOptions) -> anyhow::Result<Vec<String>> {
    if !path.exists() {
        tracing::warn!(path = %path.display(), "symbols file not found; universe is empty");
        return Ok(Vec::new());
    }
    let bytes = std::fs::read(path)
        .with_context(|| format!("failed to read symbols file {}", path.display()))?;
    let text = String::from_utf8_lossy(&bytes);
    if let Cow::Owned(_) = text {
        tracing::warn!(path = %path.display(), "symbols file is not valid UTF-8");
    }
    let symbols = parse_universe(&text, opts);
    tracing::info!(path = %path.display(), symbols = symbols.len(), "universe loaded");
    Ok(symbols)
}
