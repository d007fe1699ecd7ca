//! Song-info lookups for Rena: lyrics, artist biographies and similar songs.
//!
//! This crate provides:
//! - [`AsyncTaskRunner`], which runs blocking lookups on worker threads and
//!   delivers their results back to the thread that owns the runner
//! - the [`MetadataProvider`] trait with an offline default and an adapter
//!   for external helper executables ([`CommandProvider`])
//! - [`MetadataFetchSession`], which serves one view: it answers from the
//!   on-disk cache when it can, fetches otherwise, and drops results that
//!   arrive after the request was cancelled or the song changed
//!
//! # Usage
//!
//! ```rust,ignore
//! let runner = AsyncTaskRunner::new();
//! let session = MetadataFetchSession::new(cache, provider, now_playing, surface);
//! session.show(&runner, InfoRequest::lyrics("Radiohead", "Karma Police"));
//! runner.run_until_idle(Duration::from_secs(30));
//! ```

mod command_provider;
mod provider;
mod runner;
mod session;

pub use command_provider::CommandProvider;
pub use provider::{
    CancellationToken, InfoQuery, MetadataProvider, OfflineProvider, ProviderError,
    ProviderPayload, ProviderResponse, ProviderResult, SimilarSongRow, SIMILAR_SONGS_LIMIT,
};
pub use runner::{AsyncTaskRunner, RunnerError, TaskHandle};
pub use session::{
    fetch_blocking, FetchOutcome, FetchedInfo, InfoRequest, InfoSurface, MetadataFetchSession,
    NowPlaying, NowPlayingCell, PlaybackState, SessionState, SurfaceUpdate,
};
