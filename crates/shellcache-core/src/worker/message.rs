use std::fmt;

use anyhow::Result;
use tracing::debug;

use super::{HydrationReport, ShellWorker};

/// Commands a client can post to the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Activate immediately instead of waiting.
    SkipWaiting,
    /// Fetch every manifest resource that is not cached yet.
    DownloadOffline,
}

impl Command {
    pub fn parse(data: &str) -> Option<Self> {
        match data {
            "skipWaiting" => Some(Command::SkipWaiting),
            "downloadOffline" => Some(Command::DownloadOffline),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Command::SkipWaiting => "skipWaiting",
            Command::DownloadOffline => "downloadOffline",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageOutcome {
    Ignored,
    SkipWaiting,
    Hydrated(HydrationReport),
}

impl ShellWorker {
    /// Handle a posted message. Unrecognized messages are ignored.
    pub async fn handle_message(&self, data: &str) -> Result<MessageOutcome> {
        match Command::parse(data) {
            Some(Command::SkipWaiting) => {
                self.skip_waiting();
                Ok(MessageOutcome::SkipWaiting)
            }
            Some(Command::DownloadOffline) => {
                Ok(MessageOutcome::Hydrated(self.download_offline().await?))
            }
            None => {
                debug!(data = data, "Ignoring unrecognized message");
                Ok(MessageOutcome::Ignored)
            }
        }
    }
}
