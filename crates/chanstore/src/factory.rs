//! Opening the store for an identity.

use tracing::info;

use chanstore_core::PublicIdentifier;
use chanstore_store::{Database, Result, SqliteStore};

use crate::config::StoreConfig;

/// Database name for an identity.
pub fn database_name(public_identifier: &PublicIdentifier) -> String {
    format!("{public_identifier}-store")
}

/// The database a config resolves to: the legacy one if it exists under
/// the root, otherwise the identity's own.
pub fn resolve_database_name(config: &StoreConfig) -> String {
    if Database::exists(&config.storage_root, &config.legacy_database_name) {
        config.legacy_database_name.clone()
    } else {
        database_name(&config.public_identifier)
    }
}

/// Open (or create) the store for `config`, migrated to the latest schema.
pub fn open_store(config: &StoreConfig) -> Result<SqliteStore> {
    let name = resolve_database_name(config);
    info!(
        identifier = %config.public_identifier,
        database = %name,
        legacy = name == config.legacy_database_name,
        "opening store"
    );
    SqliteStore::open(&config.storage_root, &name)
}
