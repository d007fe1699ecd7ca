//! On-disk cache of lyrics, artist biographies and similar-song listings.
//!
//! Each record kind is described by a [`RecordKind`] and stored through a
//! [`CacheStore`]. File layout inside the cache directory:
//!
//! | kind          | content file                 | metadata                 |
//! |---------------|------------------------------|--------------------------|
//! | lyrics        | `<artist>-<title>.lyrics.txt`| `<artist>-<title>.lyrics`|
//! | artist bio    | `<artist>.bio.txt`           | `<artist>.bio`           |
//! | similar songs | `<artist>-<title>.similar`   | inside the content file  |
//!
//! The content file alone decides whether a record exists. Metadata is
//! best-effort: without it a record still reads back, just with an empty
//! provider. Every I/O failure is logged and degrades to a miss or a no-op.
//!
//! Writes to the same key are not coordinated; the last completed write wins.

use crate::key_file::{KeyFile, KeyFileError};
use crate::paths::AppDirs;
use crate::record::{
    ArtistKey, CacheKey, CachedRecord, InfoKind, SimilarSong, SongKey, Timestamp,
};
use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use thiserror::Error;

const SAVED_TIME: &str = "SavedTime";
const PROVIDER: &str = "Provider";
const NUMBER_OF_ENTRIES: &str = "NumberOfEntries";

#[derive(Debug, Error)]
pub enum InfoCacheError {
    #[error("failed to read cache entry {path}: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("failed to write cache entry {path}: {source}")]
    Write { path: PathBuf, source: io::Error },
    #[error("malformed cache entry {path}: {source}")]
    Malformed {
        path: PathBuf,
        source: MalformedEntry,
    },
}

#[derive(Debug, Error)]
pub enum MalformedEntry {
    #[error(transparent)]
    Syntax(#[from] KeyFileError),
    #[error("negative entry count {0}")]
    NegativeCount(i64),
}

/// Describes how one kind of record is named and serialized.
pub trait RecordKind {
    type Key: CacheKey;
    type Content;

    const KIND: InfoKind;
    /// Suffix of the file whose presence means the record exists.
    const CONTENT_SUFFIX: &'static str;
    /// Suffix of the metadata sidecar, or `None` when metadata lives in the content file.
    const SIDECAR_SUFFIX: Option<&'static str>;
    /// Group naming the key the record was fetched for.
    const KEY_GROUP: &'static str;
    /// Group holding `SavedTime` and `Provider`.
    const META_GROUP: &'static str;

    /// Renders the content file. `header` holds the key and provenance groups.
    fn encode(content: &Self::Content, header: &KeyFile) -> String;

    /// Parses a content file, returning embedded metadata when the kind has no sidecar.
    fn decode(raw: String) -> Result<(Self::Content, Option<KeyFile>), MalformedEntry>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LyricsKind;

impl RecordKind for LyricsKind {
    type Key = SongKey;
    type Content = String;

    const KIND: InfoKind = InfoKind::Lyrics;
    const CONTENT_SUFFIX: &'static str = ".lyrics.txt";
    const SIDECAR_SUFFIX: Option<&'static str> = Some(".lyrics");
    const KEY_GROUP: &'static str = "Song";
    const META_GROUP: &'static str = "Lyrics";

    fn encode(content: &String, _header: &KeyFile) -> String {
        content.clone()
    }

    fn decode(raw: String) -> Result<(String, Option<KeyFile>), MalformedEntry> {
        Ok((raw, None))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ArtistBioKind;

impl RecordKind for ArtistBioKind {
    type Key = ArtistKey;
    type Content = String;

    const KIND: InfoKind = InfoKind::ArtistBio;
    const CONTENT_SUFFIX: &'static str = ".bio.txt";
    const SIDECAR_SUFFIX: Option<&'static str> = Some(".bio");
    const KEY_GROUP: &'static str = "Song";
    const META_GROUP: &'static str = "Artist-Bio";

    fn encode(content: &String, _header: &KeyFile) -> String {
        content.clone()
    }

    fn decode(raw: String) -> Result<(String, Option<KeyFile>), MalformedEntry> {
        Ok((raw, None))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SimilarSongsKind;

impl RecordKind for SimilarSongsKind {
    type Key = SongKey;
    type Content = Vec<SimilarSong>;

    const KIND: InfoKind = InfoKind::SimilarSongs;
    const CONTENT_SUFFIX: &'static str = ".similar";
    const SIDECAR_SUFFIX: Option<&'static str> = None;
    const KEY_GROUP: &'static str = "Songs";
    const META_GROUP: &'static str = "Similar-Songs";

    fn encode(songs: &Vec<SimilarSong>, header: &KeyFile) -> String {
        let group = Self::META_GROUP;
        let mut file = header.clone();
        file.set_int64(group, NUMBER_OF_ENTRIES, songs.len() as i64);
        for (index, song) in songs.iter().enumerate() {
            let n = index + 1;
            file.set_string(group, &format!("File{n}"), &song.file);
            file.set_string(group, &format!("Title{n}"), &song.title);
            file.set_string(group, &format!("Artist{n}"), &song.artist);
        }
        file.to_string()
    }

    fn decode(raw: String) -> Result<(Vec<SimilarSong>, Option<KeyFile>), MalformedEntry> {
        let group = Self::META_GROUP;
        let file = KeyFile::parse(&raw)?;
        let count = file.int64(group, NUMBER_OF_ENTRIES)?;
        if count < 0 {
            return Err(MalformedEntry::NegativeCount(count));
        }

        let mut songs = Vec::new();
        for n in 1..=count {
            songs.push(SimilarSong {
                file: file.string(group, &format!("File{n}"))?.to_string(),
                title: file.string(group, &format!("Title{n}"))?.to_string(),
                artist: file.string(group, &format!("Artist{n}"))?.to_string(),
            });
        }
        Ok((songs, Some(file)))
    }
}

/// Typed access to the records of one kind.
pub struct CacheStore<K> {
    dir: PathBuf,
    kind: PhantomData<fn() -> K>,
}

impl<K> Clone for CacheStore<K> {
    fn clone(&self) -> Self {
        Self {
            dir: self.dir.clone(),
            kind: PhantomData,
        }
    }
}

impl<K: RecordKind> fmt::Debug for CacheStore<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheStore")
            .field("kind", &K::KIND)
            .field("dir", &self.dir)
            .finish()
    }
}

impl<K: RecordKind> CacheStore<K> {
    fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            kind: PhantomData,
        }
    }

    pub fn content_path(&self, key: &K::Key) -> PathBuf {
        self.dir
            .join(format!("{}{}", key.file_stem(), K::CONTENT_SUFFIX))
    }

    /// Where `SavedTime` and `Provider` are recorded for `key`.
    pub fn metadata_path(&self, key: &K::Key) -> PathBuf {
        match K::SIDECAR_SUFFIX {
            Some(suffix) => self.dir.join(format!("{}{}", key.file_stem(), suffix)),
            None => self.content_path(key),
        }
    }

    pub fn contains(&self, key: &K::Key) -> bool {
        fs::metadata(self.content_path(key))
            .map(|meta| meta.is_file())
            .unwrap_or(false)
    }

    /// Reads a record, logging and returning `None` when it is missing or unreadable.
    pub fn get(&self, key: &K::Key) -> Option<CachedRecord<K::Content>> {
        match self.try_get(key) {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(kind = %K::KIND, error = %e, "ignoring unreadable cache entry");
                None
            }
        }
    }

    pub fn try_get(&self, key: &K::Key) -> Result<Option<CachedRecord<K::Content>>, InfoCacheError> {
        let path = self.content_path(key);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(InfoCacheError::Read { path, source }),
        };

        let (content, embedded) =
            K::decode(raw).map_err(|source| InfoCacheError::Malformed { path, source })?;
        let metadata = match K::SIDECAR_SUFFIX {
            Some(_) => self.read_sidecar(key),
            None => embedded,
        };

        let (provider, saved_at) = match &metadata {
            Some(file) => (
                file.string(K::META_GROUP, PROVIDER).unwrap_or_default().to_string(),
                file.int64(K::META_GROUP, SAVED_TIME)
                    .ok()
                    .map(Timestamp::from_micros),
            ),
            None => (String::new(), None),
        };

        Ok(Some(CachedRecord {
            content,
            provider,
            saved_at,
        }))
    }

    fn read_sidecar(&self, key: &K::Key) -> Option<KeyFile> {
        let path = self.metadata_path(key);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "cache metadata unavailable");
                return None;
            }
        };
        match KeyFile::parse(&raw) {
            Ok(file) => Some(file),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "ignoring corrupt cache metadata");
                None
            }
        }
    }

    /// Overwrites the record for `key`.
    ///
    /// The content file is written first; metadata is only written once the
    /// content is on disk, and a metadata failure leaves the content in place.
    pub fn save(&self, key: &K::Key, provider: &str, content: &K::Content) {
        if let Err(e) = self.try_save(key, provider, content) {
            tracing::warn!(kind = %K::KIND, error = %e, "failed to cache song info");
        }
    }

    /// Like [`save`](Self::save), but reports a failed content write.
    pub fn try_save(&self, key: &K::Key, provider: &str, content: &K::Content) -> Result<(), InfoCacheError> {
        let mut header = KeyFile::new();
        key.describe(&mut header, K::KEY_GROUP);
        header.set_int64(K::META_GROUP, SAVED_TIME, Timestamp::now().as_micros());
        header.set_string(K::META_GROUP, PROVIDER, provider);

        let content_path = self.content_path(key);
        write_file(&content_path, &K::encode(content, &header))?;

        if K::SIDECAR_SUFFIX.is_some() {
            let metadata_path = self.metadata_path(key);
            if let Err(e) = write_file(&metadata_path, &header.to_string()) {
                tracing::warn!(error = %e, "cached content kept without provenance");
            }
        }

        tracing::debug!(
            kind = %K::KIND,
            provider,
            path = %content_path.display(),
            "cached song info"
        );
        Ok(())
    }
}

/// Replaces `path` through a temporary sibling, so a crash never leaves a truncated record.
fn write_file(path: &Path, contents: &str) -> Result<(), InfoCacheError> {
    let tmp = temp_path(path);
    let written = write_synced(&tmp, contents).and_then(|()| fs::rename(&tmp, path));
    written.map_err(|source| {
        let _ = fs::remove_file(&tmp);
        InfoCacheError::Write {
            path: path.to_path_buf(),
            source,
        }
    })
}

fn write_synced(path: &Path, contents: &str) -> io::Result<()> {
    let mut file = fs::File::create(path)?;
    file.write_all(contents.as_bytes())?;
    file.sync_all()
}

fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.tmp.{}", std::process::id()))
}

/// Handle to the song-info cache directory.
///
/// Cheap to clone; every clone addresses the same files.
#[derive(Debug, Clone)]
pub struct InfoCache {
    dir: PathBuf,
    lyrics: CacheStore<LyricsKind>,
    artist_bio: CacheStore<ArtistBioKind>,
    similar_songs: CacheStore<SimilarSongsKind>,
}

impl InfoCache {
    /// Opens the cache rooted at `dir`, creating missing directories.
    ///
    /// A directory that cannot be created is logged, not returned: reads
    /// then miss and writes fail (and are logged) individually.
    pub fn open(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        if let Err(e) = fs::create_dir_all(&dir) {
            tracing::warn!(
                path = %dir.display(),
                error = %e,
                "cannot create song-info cache directory; results will not be cached"
            );
        }
        Self {
            lyrics: CacheStore::new(dir.clone()),
            artist_bio: CacheStore::new(dir.clone()),
            similar_songs: CacheStore::new(dir.clone()),
            dir,
        }
    }

    /// Opens the cache in the platform cache directory (`<user cache>/rena/info`).
    pub fn for_app(dirs: &AppDirs) -> Self {
        Self::open(dirs.info_cache_dir())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn lyrics(&self) -> &CacheStore<LyricsKind> {
        &self.lyrics
    }

    pub fn artist_bio(&self) -> &CacheStore<ArtistBioKind> {
        &self.artist_bio
    }

    pub fn similar_songs(&self) -> &CacheStore<SimilarSongsKind> {
        &self.similar_songs
    }
}
