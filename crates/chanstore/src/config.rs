//! Store configuration.

use std::path::PathBuf;

use chanstore_core::PublicIdentifier;

/// Environment variable naming the storage root.
pub const STORAGE_ROOT_ENV: &str = "CHANSTORE_STORAGE_ROOT";

/// Storage root used when none is configured.
pub const DEFAULT_STORAGE_ROOT: &str = "./data";

/// Name of the database written before databases were namespaced by
/// identity. Reused when present so existing clients keep their state.
pub const LEGACY_DATABASE_NAME: &str = "channel-store";

/// Where and for whom to open a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Directory holding the database files.
    pub storage_root: PathBuf,
    /// Identity the store belongs to.
    pub public_identifier: PublicIdentifier,
    /// Non-namespaced database to reuse if it exists under the root.
    pub legacy_database_name: String,
}

impl StoreConfig {
    pub fn new(storage_root: impl Into<PathBuf>, public_identifier: impl Into<PublicIdentifier>) -> Self {
        Self {
            storage_root: storage_root.into(),
            public_identifier: public_identifier.into(),
            legacy_database_name: LEGACY_DATABASE_NAME.to_string(),
        }
    }

    /// Root from `CHANSTORE_STORAGE_ROOT`, else `./data`.
    pub fn from_env(public_identifier: impl Into<PublicIdentifier>) -> Self {
        let root = std::env::var_os(STORAGE_ROOT_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STORAGE_ROOT));
        Self::new(root, public_identifier)
    }

    pub fn with_legacy_database_name(mut self, name: impl Into<String>) -> Self {
        self.legacy_database_name = name.into();
        self
    }
}
