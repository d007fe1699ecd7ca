//! Fetch-and-cache workflow behind the lyrics, biography and similar-songs views.
//!
//! A [`MetadataFetchSession`] serves one presentation surface. Each request
//! runs the provider on a worker thread via [`AsyncTaskRunner`]; when the
//! result comes back on the main context the session decides whether it still
//! applies:
//!
//! * the request was cancelled or superseded → discarded,
//! * the player moved to another song meanwhile → discarded as stale,
//! * otherwise a result is cached and shown, and an empty result is reported
//!   as "not found" without touching the cache.
//!
//! The staleness check samples the player when the completion runs. The
//! player may still change song between that check and the cache write that
//! follows; such a result is then written and shown for the previous song.

use crate::provider::{
    CancellationToken, InfoQuery, MetadataProvider, ProviderError, ProviderPayload,
    ProviderResponse,
};
use crate::runner::AsyncTaskRunner;
use rena_core::{ArtistKey, InfoCache, InfoKind, SimilarSong, SongKey};
use std::rc::Rc;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// What the player is doing, as far as song-info staleness is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Stopped,
    Playing,
    Paused,
}

/// Oracle for the song currently loaded in the player.
pub trait NowPlaying: Send + Sync {
    fn current_file(&self) -> Option<String>;
    fn playback_state(&self) -> PlaybackState;
}

/// Settable [`NowPlaying`] for front ends that track the current song themselves.
#[derive(Debug, Default)]
pub struct NowPlayingCell {
    current: Mutex<Option<(String, PlaybackState)>>,
}

impl NowPlayingCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn play(&self, file: impl Into<String>) {
        *lock(&self.current) = Some((file.into(), PlaybackState::Playing));
    }

    pub fn pause(&self) {
        if let Some((_, state)) = lock(&self.current).as_mut() {
            *state = PlaybackState::Paused;
        }
    }

    pub fn stop(&self) {
        *lock(&self.current) = None;
    }
}

impl NowPlaying for NowPlayingCell {
    fn current_file(&self) -> Option<String> {
        lock(&self.current).as_ref().map(|(file, _)| file.clone())
    }

    fn playback_state(&self) -> PlaybackState {
        lock(&self.current)
            .as_ref()
            .map(|(_, state)| *state)
            .unwrap_or(PlaybackState::Stopped)
    }
}

/// A user's request to show information about a song or artist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfoRequest {
    pub kind: InfoKind,
    pub artist: String,
    /// Ignored for artist biographies.
    pub title: String,
    /// Song that was playing when the request was made. Results for a
    /// request tied to a song are dropped if the player has moved on.
    pub current_file: Option<String>,
}

impl InfoRequest {
    pub fn new(kind: InfoKind, artist: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            kind,
            artist: artist.into(),
            title: title.into(),
            current_file: None,
        }
    }

    pub fn lyrics(artist: impl Into<String>, title: impl Into<String>) -> Self {
        Self::new(InfoKind::Lyrics, artist, title)
    }

    pub fn artist_bio(artist: impl Into<String>) -> Self {
        Self::new(InfoKind::ArtistBio, artist, String::new())
    }

    pub fn similar_songs(artist: impl Into<String>, title: impl Into<String>) -> Self {
        Self::new(InfoKind::SimilarSongs, artist, title)
    }

    pub fn for_file(mut self, file: impl Into<String>) -> Self {
        self.current_file = Some(file.into());
        self
    }

    fn song_key(&self) -> SongKey {
        SongKey::new(&self.title, &self.artist)
    }

    fn artist_key(&self) -> ArtistKey {
        ArtistKey::new(&self.artist)
    }
}

/// What a presentation surface is asked to display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceUpdate {
    Lyrics {
        title: String,
        artist: String,
        text: String,
        provider: String,
    },
    ArtistBio {
        artist: String,
        text: String,
        provider: String,
    },
    SimilarSongs {
        title: String,
        artist: String,
        songs: Vec<SimilarSong>,
        provider: String,
    },
    NotFound {
        kind: InfoKind,
        message: String,
    },
}

impl SurfaceUpdate {
    pub fn not_found(kind: InfoKind) -> Self {
        let message = match kind {
            InfoKind::Lyrics => "Lyrics not found.",
            InfoKind::ArtistBio => "Artist information not found.",
            InfoKind::SimilarSongs => "No similar songs found.",
        };
        SurfaceUpdate::NotFound {
            kind,
            message: message.to_string(),
        }
    }
}

/// Whatever displays song info to the user. Only ever called on the thread
/// that dispatches the session's runner, so it may be thread-bound.
pub trait InfoSurface {
    fn present(&self, update: SurfaceUpdate);
}

/// How a fetch ended once its result reached the main context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Applied: cached and shown, or reported as not found.
    Fresh,
    /// Dropped because the player moved to another song.
    Stale,
    /// Dropped because the request was cancelled or superseded.
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Querying,
    Completed(FetchOutcome),
}

/// Provider result after error collapsing and validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchedInfo {
    Lyrics { provider: String, text: String },
    ArtistBio { provider: String, text: String },
    SimilarSongs { provider: String, songs: Vec<SimilarSong> },
}

#[derive(Debug, Clone)]
struct FetchTask {
    generation: u64,
    request: InfoRequest,
    query: InfoQuery,
    token: CancellationToken,
}

#[derive(Debug)]
struct ActiveFetch {
    generation: u64,
    token: Option<CancellationToken>,
    state: SessionState,
}

struct SessionInner {
    cache: InfoCache,
    now_playing: Arc<dyn NowPlaying>,
    surface: Rc<dyn InfoSurface>,
    active: Mutex<ActiveFetch>,
}

/// Fetches song info for one presentation surface and keeps the cache current.
#[derive(Clone)]
pub struct MetadataFetchSession {
    inner: Rc<SessionInner>,
    provider: Arc<dyn MetadataProvider>,
    bio_language: String,
}

impl std::fmt::Debug for MetadataFetchSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataFetchSession")
            .field("provider", &self.provider.id())
            .field("cache", &self.inner.cache.dir())
            .field("state", &self.state())
            .finish()
    }
}

impl MetadataFetchSession {
    pub fn new(
        cache: InfoCache,
        provider: Arc<dyn MetadataProvider>,
        now_playing: Arc<dyn NowPlaying>,
        surface: Rc<dyn InfoSurface>,
    ) -> Self {
        Self {
            inner: Rc::new(SessionInner {
                cache,
                now_playing,
                surface,
                active: Mutex::new(ActiveFetch {
                    generation: 0,
                    token: None,
                    state: SessionState::Idle,
                }),
            }),
            provider,
            bio_language: "auto".to_string(),
        }
    }

    /// Language requested for artist biographies (default "auto").
    pub fn with_bio_language(mut self, language: impl Into<String>) -> Self {
        self.bio_language = language.into();
        self
    }

    pub fn state(&self) -> SessionState {
        self.inner.active().state
    }

    /// Marks the in-flight fetch cancelled. Its worker keeps running; its result is dropped.
    pub fn cancel(&self) {
        if let Some(token) = self.inner.active().token.as_ref() {
            token.cancel();
        }
    }

    /// Shows cached info when available, otherwise fetches it.
    pub fn show(&self, runner: &AsyncTaskRunner, request: InfoRequest) {
        if let Some(update) = self.inner.cached_update(&request) {
            tracing::debug!(kind = %request.kind, artist = %request.artist, "song info served from cache");
            self.inner.supersede(SessionState::Completed(FetchOutcome::Fresh));
            self.inner.surface.present(update);
            return;
        }
        self.fetch(runner, request);
    }

    /// The cached answer for `request`, without touching session state.
    pub fn cached(&self, request: &InfoRequest) -> Option<SurfaceUpdate> {
        self.inner.cached_update(request)
    }

    /// Queries the provider, superseding any fetch still in flight.
    pub fn fetch(&self, runner: &AsyncTaskRunner, request: InfoRequest) {
        let Some(query) = self.query_for(&request) else {
            tracing::warn!(
                kind = %request.kind,
                artist = %request.artist,
                title = %request.title,
                "incomplete song-info request"
            );
            self.inner.supersede(SessionState::Idle);
            self.inner.surface.present(SurfaceUpdate::not_found(request.kind));
            return;
        };

        let task = self.inner.begin(request, query);
        let fallback = task.clone();
        let worker_query = task.query.clone();
        let exit = task.token.clone();
        let provider = Arc::clone(&self.provider);
        let inner = Rc::clone(&self.inner);

        let launched = runner.launch(
            move || fetch_blocking(provider.as_ref(), &worker_query, &exit),
            move |result| {
                inner.complete(task, result);
            },
        );
        if let Err(e) = launched {
            tracing::warn!(error = %e, "cannot start song-info fetch");
            self.inner.complete(fallback, None);
        }
    }

    fn query_for(&self, request: &InfoRequest) -> Option<InfoQuery> {
        let artist = request.artist.trim();
        let title = request.title.trim();
        if artist.is_empty() || (request.kind.needs_title() && title.is_empty()) {
            return None;
        }
        Some(match request.kind {
            InfoKind::Lyrics => InfoQuery::lyrics(artist, title),
            InfoKind::ArtistBio => InfoQuery::artist_bio(artist, self.bio_language.as_str()),
            InfoKind::SimilarSongs => InfoQuery::similar_songs(artist, title),
        })
    }
}

impl SessionInner {
    fn active(&self) -> MutexGuard<'_, ActiveFetch> {
        lock(&self.active)
    }

    /// Cancels whatever is in flight and moves to `state`. Returns the new generation.
    fn supersede(&self, state: SessionState) -> u64 {
        let mut active = self.active();
        if let Some(previous) = active.token.take() {
            previous.cancel();
        }
        active.generation += 1;
        active.state = state;
        active.generation
    }

    fn begin(&self, request: InfoRequest, query: InfoQuery) -> FetchTask {
        let token = CancellationToken::new();
        let generation = self.supersede(SessionState::Querying);
        self.active().token = Some(token.clone());
        tracing::debug!(kind = %request.kind, artist = %request.artist, generation, "fetching song info");
        FetchTask {
            generation,
            request,
            query,
            token,
        }
    }

    fn complete(&self, task: FetchTask, result: Option<FetchedInfo>) -> FetchOutcome {
        let outcome = if task.token.is_cancelled() {
            FetchOutcome::Cancelled
        } else if self.is_stale(&task.request) {
            FetchOutcome::Stale
        } else {
            FetchOutcome::Fresh
        };

        {
            let mut active = self.active();
            if active.generation == task.generation {
                active.token = None;
                active.state = SessionState::Completed(outcome);
            }
        }

        match outcome {
            FetchOutcome::Fresh => self.apply(&task.request, result),
            FetchOutcome::Stale => tracing::debug!(
                kind = %task.request.kind,
                artist = %task.request.artist,
                "song changed during fetch; result discarded"
            ),
            FetchOutcome::Cancelled => tracing::debug!(
                kind = %task.request.kind,
                artist = %task.request.artist,
                "fetch cancelled; result discarded"
            ),
        }
        outcome
    }

    fn is_stale(&self, request: &InfoRequest) -> bool {
        let Some(requested) = request.current_file.as_deref() else {
            return false;
        };
        self.now_playing.playback_state() == PlaybackState::Stopped
            || self.now_playing.current_file().as_deref() != Some(requested)
    }

    fn apply(&self, request: &InfoRequest, result: Option<FetchedInfo>) {
        let Some(info) = result else {
            self.surface.present(SurfaceUpdate::not_found(request.kind));
            return;
        };

        let update = match info {
            FetchedInfo::Lyrics { provider, text } => {
                let key = request.song_key();
                self.cache.lyrics().save(&key, &provider, &text);
                SurfaceUpdate::Lyrics {
                    title: key.title().to_string(),
                    artist: key.artist().to_string(),
                    text,
                    provider,
                }
            }
            FetchedInfo::ArtistBio { provider, text } => {
                let key = request.artist_key();
                self.cache.artist_bio().save(&key, &provider, &text);
                SurfaceUpdate::ArtistBio {
                    artist: key.artist().to_string(),
                    text,
                    provider,
                }
            }
            FetchedInfo::SimilarSongs { provider, songs } => {
                let key = request.song_key();
                self.cache.similar_songs().save(&key, &provider, &songs);
                SurfaceUpdate::SimilarSongs {
                    title: key.title().to_string(),
                    artist: key.artist().to_string(),
                    songs,
                    provider,
                }
            }
        };
        self.surface.present(update);
    }

    fn cached_update(&self, request: &InfoRequest) -> Option<SurfaceUpdate> {
        if request.artist.trim().is_empty()
            || (request.kind.needs_title() && request.title.trim().is_empty())
        {
            return None;
        }
        match request.kind {
            InfoKind::Lyrics => {
                let key = request.song_key();
                let record = self.cache.lyrics().get(&key)?;
                Some(SurfaceUpdate::Lyrics {
                    title: key.title().to_string(),
                    artist: key.artist().to_string(),
                    text: record.content,
                    provider: record.provider,
                })
            }
            InfoKind::ArtistBio => {
                let key = request.artist_key();
                let record = self.cache.artist_bio().get(&key)?;
                Some(SurfaceUpdate::ArtistBio {
                    artist: key.artist().to_string(),
                    text: record.content,
                    provider: record.provider,
                })
            }
            InfoKind::SimilarSongs => {
                let key = request.song_key();
                let record = self.cache.similar_songs().get(&key)?;
                Some(SurfaceUpdate::SimilarSongs {
                    title: key.title().to_string(),
                    artist: key.artist().to_string(),
                    songs: record.content,
                    provider: record.provider,
                })
            }
        }
    }
}

/// Worker body: runs the provider and collapses every failure to `None`.
pub fn fetch_blocking(
    provider: &dyn MetadataProvider,
    query: &InfoQuery,
    exit: &CancellationToken,
) -> Option<FetchedInfo> {
    match provider.fetch(query, exit) {
        Ok(response) => validate(query, response),
        Err(ProviderError::NotFound { .. }) | Err(ProviderError::Aborted) => None,
        Err(e) => {
            tracing::warn!(provider = provider.id(), kind = %query.kind, error = %e, "song-info lookup failed");
            None
        }
    }
}

fn validate(query: &InfoQuery, response: ProviderResponse) -> Option<FetchedInfo> {
    let ProviderResponse { provider, payload } = response;
    match (query.kind, payload) {
        (InfoKind::Lyrics, ProviderPayload::Text(text)) if !text.trim().is_empty() => {
            Some(FetchedInfo::Lyrics { provider, text })
        }
        (InfoKind::ArtistBio, ProviderPayload::Text(text)) if !text.trim().is_empty() => {
            Some(FetchedInfo::ArtistBio { provider, text })
        }
        (InfoKind::SimilarSongs, ProviderPayload::Songs(rows)) => {
            let limit = query.max_results.unwrap_or(usize::MAX);
            let songs: Vec<SimilarSong> = rows
                .into_iter()
                .filter(|row| row.is_complete())
                .take(limit)
                .map(|row| SimilarSong::new(row.url, row.title, row.artist))
                .collect();
            if songs.is_empty() {
                None
            } else {
                Some(FetchedInfo::SimilarSongs { provider, songs })
            }
        }
        (_, ProviderPayload::Text(_)) if query.kind != InfoKind::SimilarSongs => None,
        (kind, _) => {
            tracing::warn!(%kind, provider = %provider, "provider answered with the wrong kind of payload");
            None
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
