pub mod config;
pub mod escape;
pub mod info_cache;
pub mod key_file;
pub mod logging;
pub mod paths;
pub mod record;

pub use config::{
    Config, ConfigError, InfoConfig, LogLevel, LoggingConfig, ProviderCommandConfig,
    ValidationError,
};
pub use escape::escape_path_segment;
pub use info_cache::{
    ArtistBioKind, CacheStore, InfoCache, InfoCacheError, LyricsKind, MalformedEntry, RecordKind,
    SimilarSongsKind,
};
pub use key_file::{KeyFile, KeyFileError};
pub use logging::{init_logging, LoggingError, LoggingGuard};
pub use paths::{AppDirs, DirsError};
pub use record::{ArtistKey, CacheKey, CachedRecord, InfoKind, SimilarSong, SongKey, Timestamp};

pub const APP_NAME: &str = "rena";
pub const APP_AUTHOR: &str = "Rena";
pub const APP_QUALIFIER: &str = "io";
