pub mod commands;
pub mod dedup;
pub mod domain;
pub mod engine;
pub mod movers;
pub mod news;
pub mod notify;
pub mod options;
pub mod pick;
pub mod quotes;
pub mod render;
pub mod schedule;
pub mod storage;
pub mod time;
pub mod tracker;

pub mod config {
    use anyhow::Context;
    use std::path::PathBuf;

    const DEFAULT_STATE_FILE: &str = "state.json";
    const DEFAULT_SYMBOLS_FILE: &str = "bist100.txt";

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub bot_token: Option<String>,
        pub chat_id: Option<String>,
        pub state_file: PathBuf,
        pub symbols_file: PathBuf,
        pub sentry_dsn: Option<String>,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            Ok(Self {
                bot_token: non_empty_var("BOT_TOKEN"),
                chat_id: non_empty_var("CHAT_ID"),
                state_file: non_empty_var("STATE_FILE")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_FILE)),
                symbols_file: non_empty_var("SYMBOLS_FILE")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_SYMBOLS_FILE)),
                sentry_dsn: non_empty_var("SENTRY_DSN"),
            })
        }

        pub fn require_bot_token(&self) -> anyhow::Result<&str> {
            self.bot_token.as_deref().context("BOT_TOKEN is required")
        }

        pub fn require_chat_id(&self) -> anyhow::Result<&str> {
            self.chat_id.as_deref().context("CHAT_ID is required")
        }
    }

    fn non_empty_var(key: &str) -> Option<String> {
        std::env::var(key)
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }
}
