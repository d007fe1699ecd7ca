use rena_core::InfoKind;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Most similar songs requested per lookup.
pub const SIMILAR_SONGS_LIMIT: usize = 50;

/// Shared cancellation flag for one fetch.
///
/// The session checks it when the result comes back; providers may also
/// poll it to abandon a blocking call early.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A metadata lookup as sent to a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfoQuery {
    pub kind: InfoKind,
    pub artist: String,
    pub title: Option<String>,
    /// Requested language, e.g. "auto".
    pub language: Option<String>,
    /// Only accept results known to be in `language`.
    pub language_aware_only: bool,
    pub max_results: Option<usize>,
}

impl InfoQuery {
    pub fn lyrics(artist: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            kind: InfoKind::Lyrics,
            artist: artist.into(),
            title: Some(title.into()),
            language: None,
            language_aware_only: false,
            max_results: None,
        }
    }

    pub fn artist_bio(artist: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            kind: InfoKind::ArtistBio,
            artist: artist.into(),
            title: None,
            language: Some(language.into()),
            language_aware_only: true,
            max_results: None,
        }
    }

    pub fn similar_songs(artist: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            kind: InfoKind::SimilarSongs,
            artist: artist.into(),
            title: Some(title.into()),
            language: None,
            language_aware_only: false,
            max_results: Some(SIMILAR_SONGS_LIMIT),
        }
    }
}

/// A similar-song row as reported by a provider. Fields may be empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimilarSongRow {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub artist: String,
    #[serde(default)]
    pub url: String,
}

impl SimilarSongRow {
    /// Rows without a title, artist and source URL are unusable.
    pub fn is_complete(&self) -> bool {
        [&self.title, &self.artist, &self.url]
            .iter()
            .all(|field| !field.trim().is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderPayload {
    Text(String),
    Songs(Vec<SimilarSongRow>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderResponse {
    /// Name of the source that answered (e.g. a lyrics site).
    pub provider: String,
    pub payload: ProviderPayload,
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("network error: {message}")]
    Network { message: String },
    #[error("no {kind} found")]
    NotFound { kind: InfoKind },
    #[error("malformed provider response: {message}")]
    Malformed { message: String },
    #[error("operation not supported: {operation}")]
    NotSupported { operation: String },
    #[error("provider gave up after {seconds}s")]
    Timeout { seconds: u64 },
    #[error("request aborted")]
    Aborted,
    #[error("{message}")]
    Other { message: String },
}

pub type ProviderResult<T> = Result<T, ProviderError>;

/// Client for an online metadata service.
///
/// `fetch` blocks and is only ever called from worker threads.
pub trait MetadataProvider: Send + Sync {
    /// Stable identifier used in logs.
    fn id(&self) -> &str;

    /// Runs `query`. Implementations should stop early once `exit` is cancelled.
    fn fetch(&self, query: &InfoQuery, exit: &CancellationToken)
        -> ProviderResult<ProviderResponse>;
}

/// Provider used when no metadata service is configured.
#[derive(Debug, Default, Clone)]
pub struct OfflineProvider;

impl MetadataProvider for OfflineProvider {
    fn id(&self) -> &str {
        "offline"
    }

    fn fetch(
        &self,
        query: &InfoQuery,
        _exit: &CancellationToken,
    ) -> ProviderResult<ProviderResponse> {
        Err(ProviderError::NotSupported {
            operation: format!("fetch {}", query.kind),
        })
    }
}
