use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use rena_core::{init_logging, AppDirs, ArtistKey, Config, InfoCache, InfoKind, SongKey};
use rena_song_info::{
    AsyncTaskRunner, CommandProvider, InfoRequest, InfoSurface, MetadataFetchSession,
    MetadataProvider, NowPlayingCell, OfflineProvider, SurfaceUpdate,
};
use std::fs;
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Extra time allowed on top of the provider timeout before giving up on a fetch.
const FETCH_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Parser)]
#[command(
    name = "rena-info",
    version,
    about = "Look up and cache lyrics, artist biographies and similar songs"
)]
struct Cli {
    /// Song-info cache directory (takes precedence over config)
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Show cached info, fetching it on a cache miss
    Show(LookupArgs),
    /// Fetch info from the provider and refresh the cache
    Fetch(LookupArgs),
    /// Print the cached record without contacting the provider
    Cached(LookupArgs),
    /// Import text from a file into the cache
    Store(StoreArgs),
    /// Print where a record is (or would be) cached
    Path(LookupArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum KindArg {
    Lyrics,
    Bio,
    Similar,
}

impl From<KindArg> for InfoKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Lyrics => InfoKind::Lyrics,
            KindArg::Bio => InfoKind::ArtistBio,
            KindArg::Similar => InfoKind::SimilarSongs,
        }
    }
}

#[derive(Debug, Parser, Clone)]
struct LookupArgs {
    /// What to look up
    #[arg(value_enum)]
    kind: KindArg,
    /// Artist name
    #[arg(long)]
    artist: String,
    /// Song title (required for lyrics and similar songs)
    #[arg(long)]
    title: Option<String>,
    /// File of the song being played; late results for another song are dropped
    #[arg(long)]
    file: Option<String>,
}

#[derive(Debug, Parser, Clone)]
struct StoreArgs {
    /// What to store (lyrics or bio)
    #[arg(value_enum)]
    kind: KindArg,
    /// Artist name
    #[arg(long)]
    artist: String,
    /// Song title (required for lyrics)
    #[arg(long)]
    title: Option<String>,
    /// Source recorded with the text
    #[arg(long, default_value = "")]
    provider: String,
    /// Text file to import
    #[arg(long)]
    input: PathBuf,
}

#[derive(Debug, Error, PartialEq, Eq)]
enum ArgsError {
    #[error("{kind} lookups require --title")]
    MissingTitle { kind: InfoKind },
    #[error("--artist must not be empty")]
    MissingArtist,
    #[error("similar songs cannot be imported from text")]
    NotStorable,
    #[error("input file is empty")]
    EmptyInput,
}

impl LookupArgs {
    fn request(&self) -> Result<InfoRequest, ArgsError> {
        let kind = InfoKind::from(self.kind);
        let title = checked_title(kind, &self.artist, self.title.as_deref())?;
        let request = InfoRequest::new(kind, self.artist.trim(), title);
        Ok(match &self.file {
            Some(file) => request.for_file(file.clone()),
            None => request,
        })
    }
}

impl StoreArgs {
    fn request(&self) -> Result<InfoRequest, ArgsError> {
        let kind = InfoKind::from(self.kind);
        if kind == InfoKind::SimilarSongs {
            return Err(ArgsError::NotStorable);
        }
        let title = checked_title(kind, &self.artist, self.title.as_deref())?;
        Ok(InfoRequest::new(kind, self.artist.trim(), title))
    }
}

fn checked_title(kind: InfoKind, artist: &str, title: Option<&str>) -> Result<String, ArgsError> {
    if artist.trim().is_empty() {
        return Err(ArgsError::MissingArtist);
    }
    let title = title.map(str::trim).unwrap_or_default();
    if kind.needs_title() && title.is_empty() {
        return Err(ArgsError::MissingTitle { kind });
    }
    Ok(title.to_string())
}

/// Prints every update to stdout.
struct StdoutSurface;

impl InfoSurface for StdoutSurface {
    fn present(&self, update: SurfaceUpdate) {
        println!("{}", render(&update));
    }
}

fn render(update: &SurfaceUpdate) -> String {
    let (mut lines, provider) = match update {
        SurfaceUpdate::Lyrics {
            title,
            artist,
            text,
            provider,
        } => (
            vec![format!("{artist} - {title}"), String::new(), text.trim_end().to_string()],
            provider,
        ),
        SurfaceUpdate::ArtistBio {
            artist,
            text,
            provider,
        } => (
            vec![artist.clone(), String::new(), text.trim_end().to_string()],
            provider,
        ),
        SurfaceUpdate::SimilarSongs {
            title,
            artist,
            songs,
            provider,
        } => {
            let mut lines = vec![format!("Similar to {artist} - {title}"), String::new()];
            lines.extend(songs.iter().enumerate().map(|(i, song)| {
                format!("{:>3}. {} - {} <{}>", i + 1, song.artist, song.title, song.file)
            }));
            (lines, provider)
        }
        SurfaceUpdate::NotFound { message, .. } => return message.clone(),
    };
    if !provider.is_empty() {
        lines.push(String::new());
        lines.push(format!("Source: {provider}"));
    }
    lines.join("\n")
}

fn provider_for(config: &Config) -> Arc<dyn MetadataProvider> {
    match &config.info.provider {
        Some(command) => Arc::new(CommandProvider::new(command.clone())),
        None => {
            tracing::info!("no song-info provider configured; only cached info is available");
            Arc::new(OfflineProvider)
        }
    }
}

fn fetch_wait(config: &Config) -> Duration {
    config
        .info
        .provider
        .as_ref()
        .map(|command| Duration::from_secs(command.timeout_seconds))
        .unwrap_or_default()
        + FETCH_GRACE
}

fn store(cache: &InfoCache, args: &StoreArgs) -> Result<PathBuf> {
    let request = args.request()?;
    let text = fs::read_to_string(&args.input)
        .with_context(|| format!("failed to read {}", args.input.display()))?;
    if text.trim().is_empty() {
        return Err(ArgsError::EmptyInput.into());
    }

    match request.kind {
        InfoKind::Lyrics => {
            let key = SongKey::new(&request.title, &request.artist);
            cache.lyrics().try_save(&key, &args.provider, &text)?;
            Ok(cache.lyrics().content_path(&key))
        }
        InfoKind::ArtistBio => {
            let key = ArtistKey::new(&request.artist);
            cache.artist_bio().try_save(&key, &args.provider, &text)?;
            Ok(cache.artist_bio().content_path(&key))
        }
        InfoKind::SimilarSongs => Err(ArgsError::NotStorable.into()),
    }
}

/// Content file and, when stored separately, the metadata file for `request`.
fn cache_paths(cache: &InfoCache, request: &InfoRequest) -> Vec<PathBuf> {
    let (content, metadata) = match request.kind {
        InfoKind::Lyrics => {
            let key = SongKey::new(&request.title, &request.artist);
            (cache.lyrics().content_path(&key), cache.lyrics().metadata_path(&key))
        }
        InfoKind::ArtistBio => {
            let key = ArtistKey::new(&request.artist);
            (
                cache.artist_bio().content_path(&key),
                cache.artist_bio().metadata_path(&key),
            )
        }
        InfoKind::SimilarSongs => {
            let key = SongKey::new(&request.title, &request.artist);
            (
                cache.similar_songs().content_path(&key),
                cache.similar_songs().metadata_path(&key),
            )
        }
    };
    if content == metadata {
        vec![content]
    } else {
        vec![content, metadata]
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let dirs = AppDirs::discover()?;
    let config = Config::load_or_default(&dirs)?;
    let _logging = init_logging(&config.logging, &dirs)?;

    let cache_dir = cli
        .cache_dir
        .clone()
        .unwrap_or_else(|| config.info_cache_dir(&dirs));
    tracing::debug!(cache_dir = %cache_dir.display(), "using song-info cache");
    let cache = InfoCache::open(cache_dir);

    match cli.command {
        Command::Show(args) => run_lookup(cache, &config, &args, false)?,
        Command::Fetch(args) => run_lookup(cache, &config, &args, true)?,
        Command::Cached(args) => {
            let request = args.request()?;
            let session = MetadataFetchSession::new(
                cache,
                Arc::new(OfflineProvider),
                Arc::new(NowPlayingCell::new()),
                Rc::new(StdoutSurface),
            );
            match session.cached(&request) {
                Some(update) => println!("{}", render(&update)),
                None => bail!("no cached {} for {}", request.kind, describe(&request)),
            }
        }
        Command::Store(args) => {
            let path = store(&cache, &args)?;
            tracing::info!(path = %path.display(), "imported song info");
            println!("{}", path.display());
        }
        Command::Path(args) => {
            let request = args.request()?;
            for path in cache_paths(&cache, &request) {
                println!("{}", path.display());
            }
        }
    }

    Ok(())
}

/// Runs one lookup through a fetch session and waits for it to finish.
fn run_lookup(cache: InfoCache, config: &Config, args: &LookupArgs, refresh: bool) -> Result<()> {
    let request = args.request()?;

    let now_playing = Arc::new(NowPlayingCell::new());
    if let Some(file) = &request.current_file {
        now_playing.play(file.clone());
    }
    let session = MetadataFetchSession::new(
        cache,
        provider_for(config),
        now_playing,
        Rc::new(StdoutSurface),
    )
    .with_bio_language(config.info.bio_language.clone());

    let runner = AsyncTaskRunner::new();
    if refresh {
        session.fetch(&runner, request);
    } else {
        session.show(&runner, request);
    }
    if !runner.run_until_idle(fetch_wait(config)) {
        session.cancel();
        bail!("gave up waiting for the song-info provider");
    }
    Ok(())
}

fn describe(request: &InfoRequest) -> String {
    if request.title.is_empty() {
        format!("\"{}\"", request.artist)
    } else {
        format!("\"{}\" by \"{}\"", request.title, request.artist)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use rena_core::SimilarSong;
    use tempfile::tempdir;

    fn lookup(kind: KindArg, title: Option<&str>) -> LookupArgs {
        LookupArgs {
            kind,
            artist: " Radiohead ".into(),
            title: title.map(Into::into),
            file: None,
        }
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_lookup_with_global_cache_dir() {
        let cli = Cli::try_parse_from([
            "rena-info",
            "show",
            "lyrics",
            "--artist",
            "Radiohead",
            "--title",
            "Karma Police",
            "--cache-dir",
            "/tmp/rena",
        ])
        .expect("arguments should parse");

        assert_eq!(cli.cache_dir, Some(PathBuf::from("/tmp/rena")));
        match cli.command {
            Command::Show(args) => {
                assert_eq!(args.kind, KindArg::Lyrics);
                assert_eq!(args.title.as_deref(), Some("Karma Police"));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn lyrics_require_a_title() {
        let err = lookup(KindArg::Lyrics, None)
            .request()
            .expect_err("title should be required");
        assert_eq!(
            err,
            ArgsError::MissingTitle {
                kind: InfoKind::Lyrics
            }
        );
    }

    #[test]
    fn bio_ignores_title_and_trims_artist() {
        let request = lookup(KindArg::Bio, None)
            .request()
            .expect("bio needs only an artist");
        assert_eq!(request, InfoRequest::artist_bio("Radiohead"));
    }

    #[test]
    fn file_binds_request_to_current_song() {
        let mut args = lookup(KindArg::Similar, Some("Airbag"));
        args.file = Some("/music/airbag.flac".into());
        let request = args.request().expect("request should be valid");
        assert_eq!(request.current_file.as_deref(), Some("/music/airbag.flac"));
    }

    #[test]
    fn renders_lyrics_with_source() {
        let update = SurfaceUpdate::Lyrics {
            title: "Karma Police".into(),
            artist: "Radiohead".into(),
            text: "When you were king...\n".into(),
            provider: "lyricsprovider".into(),
        };
        assert_eq!(
            render(&update),
            "Radiohead - Karma Police\n\nWhen you were king...\n\nSource: lyricsprovider"
        );
    }

    #[test]
    fn renders_numbered_similar_songs() {
        let update = SurfaceUpdate::SimilarSongs {
            title: "Karma Police".into(),
            artist: "Radiohead".into(),
            songs: vec![SimilarSong::new("https://example.org/1", "Teardrop", "Massive Attack")],
            provider: String::new(),
        };
        assert_eq!(
            render(&update),
            "Similar to Radiohead - Karma Police\n\n  1. Massive Attack - Teardrop <https://example.org/1>"
        );
        assert_eq!(
            render(&SurfaceUpdate::not_found(InfoKind::SimilarSongs)),
            "No similar songs found."
        );
    }

    #[test]
    fn store_imports_text_into_cache() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("lyrics.txt");
        fs::write(&input, "When you were king...").unwrap();
        let cache = InfoCache::open(dir.path().join("info"));

        let path = store(
            &cache,
            &StoreArgs {
                kind: KindArg::Lyrics,
                artist: "Radiohead".into(),
                title: Some("Karma Police".into()),
                provider: "manual".into(),
                input,
            },
        )
        .expect("store should succeed");

        assert_eq!(
            path,
            dir.path().join("info").join("Radiohead-Karma Police.lyrics.txt")
        );
        let record = cache
            .lyrics()
            .get(&SongKey::new("Karma Police", "Radiohead"))
            .unwrap();
        assert_eq!(record.content, "When you were king...");
        assert_eq!(record.provider, "manual");
    }

    #[test]
    fn store_rejects_similar_songs_and_empty_input() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("empty.txt");
        fs::write(&input, "  \n").unwrap();
        let cache = InfoCache::open(dir.path().join("info"));
        let mut args = StoreArgs {
            kind: KindArg::Similar,
            artist: "Radiohead".into(),
            title: Some("Airbag".into()),
            provider: String::new(),
            input,
        };

        let err = store(&cache, &args).unwrap_err();
        assert_eq!(err.downcast_ref::<ArgsError>(), Some(&ArgsError::NotStorable));

        args.kind = KindArg::Bio;
        let err = store(&cache, &args).unwrap_err();
        assert_eq!(err.downcast_ref::<ArgsError>(), Some(&ArgsError::EmptyInput));
    }

    #[test]
    fn similar_songs_have_a_single_cache_file() {
        let dir = tempdir().unwrap();
        let cache = InfoCache::open(dir.path());

        let similar = lookup(KindArg::Similar, Some("A/B")).request().unwrap();
        assert_eq!(
            cache_paths(&cache, &similar),
            vec![dir.path().join("Radiohead-A%2FB.similar")]
        );

        let bio = lookup(KindArg::Bio, None).request().unwrap();
        assert_eq!(
            cache_paths(&cache, &bio),
            vec![dir.path().join("Radiohead.bio.txt"), dir.path().join("Radiohead.bio")]
        );
    }
}
