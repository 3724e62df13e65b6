//! Asking the person running the harvest for values the page would not give up.

use std::io::{BufRead, Write};

use async_trait::async_trait;
use tracing::warn;

/// Source of manually supplied values.
#[async_trait]
pub trait OperatorInput: Send + Sync {
    /// Ask for one line of text. `None` means the operator declined or no
    /// operator is available.
    async fn request(&self, prompt: &str, default: &str) -> Option<String>;
}

/// Prompts on stderr and reads the answer from stdin.
///
/// An empty answer accepts the default.
pub struct StdinOperator;

#[async_trait]
impl OperatorInput for StdinOperator {
    async fn request(&self, prompt: &str, default: &str) -> Option<String> {
        let prompt = prompt.to_string();
        let default = default.to_string();

        let answer = tokio::task::spawn_blocking(move || -> std::io::Result<String> {
            let mut stderr = std::io::stderr();
            write!(stderr, "{prompt} [{default}]: ")?;
            stderr.flush()?;

            let mut line = String::new();
            std::io::stdin().lock().read_line(&mut line)?;
            let line = line.trim();
            Ok(if line.is_empty() {
                default
            } else {
                line.to_string()
            })
        })
        .await;

        match answer {
            Ok(Ok(value)) => Some(value),
            Ok(Err(e)) => {
                warn!(error = %e, "Failed to read operator input");
                None
            }
            Err(e) => {
                warn!(error = %e, "Operator prompt task failed");
                None
            }
        }
    }
}

/// For unattended runs: every request is declined.
pub struct NonInteractive;

#[async_trait]
impl OperatorInput for NonInteractive {
    async fn request(&self, _prompt: &str, _default: &str) -> Option<String> {
        None
    }
}
