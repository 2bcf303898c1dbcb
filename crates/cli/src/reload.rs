//! Content reload through a configured shell command.

use freshwatch_core::Error;
use freshwatch_core::detector::PageHost;

/// Runs `reload_command` with `sh -c` when the detector asks for a reload.
///
/// Without a command the reload is only logged: the next read of the content
/// goes to the origin anyway because the caches were just cleared.
#[derive(Debug, Clone, Default)]
pub struct CommandReloader {
    command: Option<String>,
}

impl CommandReloader {
    pub fn new(command: Option<String>) -> Self {
        Self { command: command.filter(|c| !c.trim().is_empty()) }
    }
}

#[async_trait::async_trait]
impl PageHost for CommandReloader {
    async fn reload(&self) -> Result<(), Error> {
        let Some(command) = &self.command else {
            tracing::info!("no reload command configured, content is served fresh on next load");
            return Ok(());
        };

        tracing::info!(command = %command, "running reload command");
        let status = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(command)
            .status()
            .await
            .map_err(|e| Error::Reload(format!("failed to spawn `{command}`: {e}")))?;

        if !status.success() {
            return Err(Error::Reload(format!("`{command}` exited with {status}")));
        }
        Ok(())
    }
}
