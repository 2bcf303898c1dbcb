//! Line-based terminal prompts for the update dialog and log clearing.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::Mutex;

use freshwatch_core::detector::{Confirmation, RefreshChoice, UpdateSurface};
use freshwatch_core::viewer::ClearPrompt;
use freshwatch_core::{Error, VersionRecord};

/// Parse a refresh answer: `r`/`refresh`, `a`/`always`, `d`/`defer`/`later`.
///
/// An empty answer means refresh now.
pub fn parse_choice(answer: &str) -> Option<RefreshChoice> {
    match answer.trim().to_lowercase().as_str() {
        "" | "r" | "refresh" => Some(RefreshChoice::RefreshNow),
        "a" | "always" => Some(RefreshChoice::AlwaysAutoRefresh),
        "d" | "defer" | "later" => Some(RefreshChoice::Defer),
        _ => None,
    }
}

pub fn parse_yes(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

/// Terminal implementation of the update dialog and the clear prompt.
///
/// With a preset answer no input is read at all.
pub struct TerminalSurface<R = BufReader<Stdin>> {
    input: Mutex<Lines<R>>,
    preset: Option<Confirmation>,
}

impl TerminalSurface {
    pub fn stdin() -> Self {
        Self::from_reader(BufReader::new(tokio::io::stdin()))
    }
}

impl<R: AsyncBufRead + Unpin + Send> TerminalSurface<R> {
    pub fn from_reader(reader: R) -> Self {
        Self { input: Mutex::new(reader.lines()), preset: None }
    }

    /// Answer every confirmation with `confirmation` instead of asking.
    pub fn with_preset(mut self, confirmation: Confirmation) -> Self {
        self.preset = Some(confirmation);
        self
    }

    async fn ask(&self, question: &str) -> Result<Option<String>, Error> {
        println!("{question}");
        self.input
            .lock()
            .await
            .next_line()
            .await
            .map_err(|e| Error::InvalidInput(format!("failed to read answer: {e}")))
    }
}

#[async_trait::async_trait]
impl<R: AsyncBufRead + Unpin + Send> UpdateSurface for TerminalSurface<R> {
    async fn notify_update(&self, record: &VersionRecord) {
        match &record.last_updated {
            Some(at) => println!("New content available: version {} (updated {at})", record.version),
            None => println!("New content available: version {}", record.version),
        }
    }

    async fn confirm_refresh(&self, _record: &VersionRecord) -> Result<Confirmation, Error> {
        if let Some(preset) = self.preset {
            return Ok(preset);
        }

        let choice = loop {
            let Some(answer) = self.ask("Refresh now? [R]efresh / [a]lways auto-refresh / [d]efer").await? else {
                // Closed input behaves like dismissing the dialog.
                return Ok(Confirmation::new(RefreshChoice::Defer, false));
            };
            match parse_choice(&answer) {
                Some(choice) => break choice,
                None => println!("Unrecognized answer: {answer}"),
            }
        };

        let remember = match self.ask("Remember this choice? [y/N]").await? {
            Some(answer) => parse_yes(&answer),
            None => false,
        };
        Ok(Confirmation::new(choice, remember))
    }

    async fn show_refresh_indicator(&self) {
        println!("Refreshing content...");
    }

    async fn show_refresh_error(&self, message: &str) {
        eprintln!("{message}");
        eprintln!("Run `freshwatch refresh <version>` to retry.");
    }
}

#[async_trait::async_trait]
impl<R: AsyncBufRead + Unpin + Send> ClearPrompt for TerminalSurface<R> {
    async fn confirm_clear(&self) -> bool {
        match self.ask("Clear all update and error logs? This cannot be undone. [y/N]").await {
            Ok(Some(answer)) => parse_yes(&answer),
            Ok(None) => false,
            Err(e) => {
                tracing::warn!(error = %e, "treating unreadable answer as no");
                false
            }
        }
    }
}

/// Clear prompt for `--yes`.
#[derive(Debug, Clone, Copy)]
pub struct AssumeYes;

#[async_trait::async_trait]
impl ClearPrompt for AssumeYes {
    async fn confirm_clear(&self) -> bool {
        true
    }
}
