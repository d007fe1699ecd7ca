//! Keys and record payloads stored in the song-info cache.

use crate::escape::escape_path_segment;
use crate::key_file::KeyFile;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// The three kinds of song information Rena fetches and caches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InfoKind {
    Lyrics,
    ArtistBio,
    SimilarSongs,
}

impl InfoKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            InfoKind::Lyrics => "lyrics",
            InfoKind::ArtistBio => "artist-bio",
            InfoKind::SimilarSongs => "similar-songs",
        }
    }

    /// Whether lookups of this kind need a song title as well as the artist.
    pub fn needs_title(&self) -> bool {
        !matches!(self, InfoKind::ArtistBio)
    }
}

impl fmt::Display for InfoKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wall-clock instant stored as microseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(i64);

impl Timestamp {
    pub fn now() -> Self {
        let micros = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_micros())
            .unwrap_or(0);
        Self(i64::try_from(micros).unwrap_or(i64::MAX))
    }

    pub fn from_micros(micros: i64) -> Self {
        Self(micros)
    }

    pub fn as_micros(&self) -> i64 {
        self.0
    }
}

/// Identity of a cache record, rendered into file names and recorded inside them.
pub trait CacheKey {
    /// Escaped file stem shared by the content and metadata files.
    fn file_stem(&self) -> String;

    /// Writes the human-readable key fields into `group`.
    fn describe(&self, file: &mut KeyFile, group: &str);
}

/// Key for per-song records (lyrics, similar songs).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SongKey {
    title: String,
    artist: String,
}

impl SongKey {
    /// Surrounding whitespace is not part of the identity.
    pub fn new(title: impl AsRef<str>, artist: impl AsRef<str>) -> Self {
        Self {
            title: title.as_ref().trim().to_string(),
            artist: artist.as_ref().trim().to_string(),
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn artist(&self) -> &str {
        &self.artist
    }
}

impl CacheKey for SongKey {
    fn file_stem(&self) -> String {
        format!(
            "{}-{}",
            escape_path_segment(&self.artist),
            escape_path_segment(&self.title)
        )
    }

    fn describe(&self, file: &mut KeyFile, group: &str) {
        file.set_string(group, "Title", &self.title);
        file.set_string(group, "Artist", &self.artist);
    }
}

/// Key for per-artist records (biographies).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArtistKey {
    artist: String,
}

impl ArtistKey {
    pub fn new(artist: impl AsRef<str>) -> Self {
        Self {
            artist: artist.as_ref().trim().to_string(),
        }
    }

    pub fn artist(&self) -> &str {
        &self.artist
    }
}

impl CacheKey for ArtistKey {
    fn file_stem(&self) -> String {
        escape_path_segment(&self.artist)
    }

    fn describe(&self, file: &mut KeyFile, group: &str) {
        file.set_string(group, "Artist", &self.artist);
    }
}

/// One row of a similar-songs listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimilarSong {
    /// Where the song can be found: a source URL, or a local file once resolved.
    pub file: String,
    pub title: String,
    pub artist: String,
}

impl SimilarSong {
    pub fn new(
        file: impl Into<String>,
        title: impl Into<String>,
        artist: impl Into<String>,
    ) -> Self {
        Self {
            file: file.into(),
            title: title.into(),
            artist: artist.into(),
        }
    }
}

/// A record read back from the cache together with its provenance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedRecord<T> {
    pub content: T,
    /// Empty when the source is unknown or the metadata file is missing.
    pub provider: String,
    /// `None` when the metadata could not be read.
    pub saved_at: Option<Timestamp>,
}
