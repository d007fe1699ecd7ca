//! Metadata provider backed by an external helper executable.
//!
//! The helper is invoked once per query:
//!
//! ```text
//! <command> [configured args] --kind lyrics --artist <artist> --title <title>
//! <command> [configured args] --kind artist-bio --artist <artist> --language auto --language-aware-only
//! <command> [configured args] --kind similar-songs --artist <artist> --title <title> --max-results 50
//! ```
//!
//! and answers with a single JSON object on stdout:
//!
//! ```text
//! {"provider": "lyricsprovider", "text": "..."}
//! {"provider": "lastfm", "songs": [{"title": "...", "artist": "...", "url": "..."}]}
//! ```
//!
//! A non-zero exit status means nothing was found.

use crate::provider::{
    CancellationToken, InfoQuery, MetadataProvider, ProviderError, ProviderPayload,
    ProviderResponse, ProviderResult, SimilarSongRow,
};
use rena_core::ProviderCommandConfig;
use serde::Deserialize;
use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(25);

#[derive(Debug, Deserialize)]
struct CommandResponse {
    #[serde(default)]
    provider: String,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    songs: Option<Vec<SimilarSongRow>>,
}

#[derive(Debug, Clone)]
pub struct CommandProvider {
    id: String,
    config: ProviderCommandConfig,
}

impl CommandProvider {
    pub fn new(config: ProviderCommandConfig) -> Self {
        let id = config
            .command
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "command".to_string());
        Self { id, config }
    }

    fn arguments(query: &InfoQuery) -> Vec<String> {
        let mut args = vec![
            "--kind".to_string(),
            query.kind.as_str().to_string(),
            "--artist".to_string(),
            query.artist.clone(),
        ];
        if let Some(title) = &query.title {
            args.extend(["--title".to_string(), title.clone()]);
        }
        if let Some(language) = &query.language {
            args.extend(["--language".to_string(), language.clone()]);
        }
        if query.language_aware_only {
            args.push("--language-aware-only".to_string());
        }
        if let Some(max) = query.max_results {
            args.extend(["--max-results".to_string(), max.to_string()]);
        }
        args
    }

    fn spawn(&self, query: &InfoQuery) -> ProviderResult<Child> {
        Command::new(&self.config.command)
            .args(&self.config.args)
            .args(Self::arguments(query))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| ProviderError::Other {
                message: format!(
                    "failed to start {}: {e}",
                    self.config.command.display()
                ),
            })
    }

    fn timed_out(&self) -> ProviderError {
        ProviderError::Timeout {
            seconds: self.config.timeout_seconds,
        }
    }
}

impl MetadataProvider for CommandProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn fetch(
        &self,
        query: &InfoQuery,
        exit: &CancellationToken,
    ) -> ProviderResult<ProviderResponse> {
        let mut child = self.spawn(query)?;
        let mut stdout = child.stdout.take().ok_or_else(|| ProviderError::Other {
            message: "helper has no stdout".to_string(),
        })?;
        // Drain stdout concurrently so a chatty helper cannot block on a full pipe.
        let (output_tx, output_rx) = mpsc::channel();
        thread::spawn(move || {
            let mut output = String::new();
            let _ = output_tx.send(stdout.read_to_string(&mut output).map(|_| output));
        });

        let timeout = Duration::from_secs(self.config.timeout_seconds);
        let deadline = Instant::now() + timeout;
        let status = loop {
            if exit.is_cancelled() {
                stop(&mut child);
                return Err(ProviderError::Aborted);
            }
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {}
                Err(e) => {
                    stop(&mut child);
                    return Err(ProviderError::Other {
                        message: format!("failed to wait for helper: {e}"),
                    });
                }
            }
            if Instant::now() >= deadline {
                stop(&mut child);
                return Err(self.timed_out());
            }
            thread::sleep(POLL_INTERVAL);
        };

        // Anything the helper left running may still hold stdout open.
        let output = loop {
            if exit.is_cancelled() {
                return Err(ProviderError::Aborted);
            }
            match output_rx.recv_timeout(POLL_INTERVAL) {
                Ok(read) => {
                    break read.map_err(|e| ProviderError::Malformed {
                        message: format!("unreadable helper output: {e}"),
                    })?
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(ProviderError::Other {
                        message: "helper output reader panicked".to_string(),
                    })
                }
            }
            if Instant::now() >= deadline {
                tracing::debug!(command = %self.config.command.display(), "helper exited but kept stdout open");
                return Err(self.timed_out());
            }
        };

        if !status.success() {
            return Err(ProviderError::NotFound { kind: query.kind });
        }
        parse_response(query, &output)
    }
}

fn stop(child: &mut Child) {
    if let Err(e) = child.kill() {
        tracing::debug!(error = %e, "helper already exited");
    }
    let _ = child.wait();
}

fn parse_response(query: &InfoQuery, output: &str) -> ProviderResult<ProviderResponse> {
    if output.trim().is_empty() {
        return Err(ProviderError::NotFound { kind: query.kind });
    }
    let response: CommandResponse =
        serde_json::from_str(output).map_err(|e| ProviderError::Malformed {
            message: e.to_string(),
        })?;

    let payload = match (response.text, response.songs) {
        (Some(text), _) => ProviderPayload::Text(text),
        (None, Some(songs)) => ProviderPayload::Songs(songs),
        (None, None) => {
            return Err(ProviderError::Malformed {
                message: "response has neither text nor songs".to_string(),
            })
        }
    };
    Ok(ProviderResponse {
        provider: response.provider,
        payload,
    })
}
