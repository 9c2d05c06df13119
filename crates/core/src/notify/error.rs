use std::fmt;

#[derive(Debug, Clone)]
pub struct NotifyError {
    pub channel: &'static str,
    pub stage: &'static str,
    pub detail: String,
}

impl fmt::Display for NotifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "notification error (channel={}, stage={}): {}",
            self.channel, self.stage, self.detail
        )
    }
}

impl std::error::Error for NotifyError {}
