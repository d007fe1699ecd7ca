use rena_core::{InfoCache, KeyFile, SongKey, Timestamp};
use rena_song_info::{
    AsyncTaskRunner, CancellationToken, FetchOutcome, InfoQuery, InfoRequest, InfoSurface,
    MetadataFetchSession, MetadataProvider, NowPlayingCell, ProviderPayload, ProviderResponse,
    ProviderResult, SessionState, SurfaceUpdate,
};
use std::cell::RefCell;
use std::fs;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;

struct LyricsSite;

impl MetadataProvider for LyricsSite {
    fn id(&self) -> &str {
        "lyrics-site"
    }

    fn fetch(
        &self,
        query: &InfoQuery,
        _exit: &CancellationToken,
    ) -> ProviderResult<ProviderResponse> {
        assert_eq!(query.artist, "Radiohead");
        assert_eq!(query.title.as_deref(), Some("Karma Police"));
        Ok(ProviderResponse {
            provider: "lyricsprovider".into(),
            payload: ProviderPayload::Text("When you were king...".into()),
        })
    }
}

#[derive(Default)]
struct Panel {
    shown: RefCell<Vec<SurfaceUpdate>>,
}

impl InfoSurface for Panel {
    fn present(&self, update: SurfaceUpdate) {
        self.shown.borrow_mut().push(update);
    }
}

#[test]
fn lyrics_fetch_populates_cache_and_panel() {
    let dir = tempdir().unwrap();
    let cache = InfoCache::open(dir.path().join("info"));
    let player = Arc::new(NowPlayingCell::new());
    let panel = Rc::new(Panel::default());
    let runner = AsyncTaskRunner::new();
    let session =
        MetadataFetchSession::new(cache.clone(), Arc::new(LyricsSite), player.clone(), panel.clone());

    player.play("/music/ok-computer/06-karma-police.flac");
    let started = Timestamp::now();
    session.show(
        &runner,
        InfoRequest::lyrics("Radiohead", "Karma Police")
            .for_file("/music/ok-computer/06-karma-police.flac"),
    );
    assert!(runner.run_until_idle(Duration::from_secs(5)));

    assert_eq!(session.state(), SessionState::Completed(FetchOutcome::Fresh));

    let content = dir.path().join("info").join("Radiohead-Karma Police.lyrics.txt");
    assert_eq!(fs::read_to_string(&content).unwrap(), "When you were king...");

    let sidecar = dir.path().join("info").join("Radiohead-Karma Police.lyrics");
    let meta = KeyFile::parse(&fs::read_to_string(&sidecar).unwrap()).unwrap();
    assert_eq!(meta.string("Lyrics", "Provider").unwrap(), "lyricsprovider");
    assert!(meta.int64("Lyrics", "SavedTime").unwrap() >= started.as_micros());

    assert_eq!(
        *panel.shown.borrow(),
        vec![SurfaceUpdate::Lyrics {
            title: "Karma Police".into(),
            artist: "Radiohead".into(),
            text: "When you were king...".into(),
            provider: "lyricsprovider".into(),
        }]
    );

    let record = cache
        .lyrics()
        .get(&SongKey::new("Karma Police", "Radiohead"))
        .unwrap();
    assert_eq!(record.provider, "lyricsprovider");
    assert!(record.saved_at.unwrap() >= started);
}

#[test]
fn second_show_is_served_from_disk() {
    let dir = tempdir().unwrap();
    let runner = AsyncTaskRunner::new();
    let player = Arc::new(NowPlayingCell::new());

    let first = Rc::new(Panel::default());
    MetadataFetchSession::new(
        InfoCache::open(dir.path()),
        Arc::new(LyricsSite),
        player.clone(),
        first.clone(),
    )
    .show(&runner, InfoRequest::lyrics("Radiohead", "Karma Police"));
    assert!(runner.run_until_idle(Duration::from_secs(5)));

    // A new session over the same directory, with a provider that cannot answer.
    let second = Rc::new(Panel::default());
    MetadataFetchSession::new(
        InfoCache::open(dir.path()),
        Arc::new(rena_song_info::OfflineProvider),
        player,
        second.clone(),
    )
    .show(&runner, InfoRequest::lyrics("Radiohead", "Karma Police"));

    assert_eq!(runner.in_flight(), 0);
    assert_eq!(*second.shown.borrow(), *first.shown.borrow());
}
