//! Opening stores on disk: naming, legacy reuse and persistence.

use tempfile::TempDir;

use chanstore::core::PublicIdentifier;
use chanstore::store::migration::latest_version;
use chanstore::store::Database;
use chanstore::{
    database_name, open_store, resolve_database_name, EngineStore, StoreConfig, LEGACY_DATABASE_NAME,
};
use chanstore_testkit::fixtures::HASHLOCK_DEFINITION;
use chanstore_testkit::ChannelFixture;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

#[tokio::test]
async fn test_new_identity_gets_namespaced_database() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let config = StoreConfig::new(dir.path(), "vector8Alice");

    assert_eq!(resolve_database_name(&config), "vector8Alice-store");
    let store = open_store(&config).unwrap();
    assert_eq!(store.database().name(), database_name(&PublicIdentifier::from("vector8Alice")));
    assert_eq!(
        store.database().path(),
        Some(Database::path_for(dir.path(), "vector8Alice-store").as_path())
    );
    assert_eq!(store.get_schema_version().await.unwrap(), latest_version());
    store.close().await.unwrap();
}

#[tokio::test]
async fn test_existing_legacy_database_is_reused() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    Database::open(dir.path(), LEGACY_DATABASE_NAME)
        .unwrap()
        .close()
        .await
        .unwrap();

    let config = StoreConfig::new(dir.path(), "vector8Bob");
    let store = open_store(&config).unwrap();
    assert_eq!(store.database().name(), LEGACY_DATABASE_NAME);
    assert!(!Database::exists(dir.path(), "vector8Bob-store"));

    let renamed = StoreConfig::new(dir.path(), "vector8Bob").with_legacy_database_name("older-store");
    assert_eq!(resolve_database_name(&renamed), "vector8Bob-store");
}

#[tokio::test]
async fn test_state_survives_reopen() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let config = StoreConfig::new(dir.path(), "vector8Carol");
    let mut channel = ChannelFixture::new();
    let transfer = channel.transfer(HASHLOCK_DEFINITION, Some("route"));

    {
        let store = open_store(&config).unwrap();
        store.save_channel_state(&channel.setup(), None).await.unwrap();
        store
            .save_channel_state(&channel.create(&transfer), Some(&transfer))
            .await
            .unwrap();
        store.close().await.unwrap();
    }

    let store = open_store(&config).unwrap();
    let saved = store
        .get_channel_state(&channel.channel_address)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(saved.nonce, 2);
    let active = store.get_active_transfers(&channel.channel_address).await.unwrap();
    assert_eq!(active, vec![transfer]);
    assert_eq!(store.get_schema_version().await.unwrap(), latest_version());
}

#[tokio::test]
async fn test_identities_do_not_share_state() {
    let dir = TempDir::new().unwrap();
    let alice = open_store(&StoreConfig::new(dir.path(), "alice")).unwrap();
    let bob = open_store(&StoreConfig::new(dir.path(), "bob")).unwrap();

    let mut channel = ChannelFixture::new();
    alice.save_channel_state(&channel.setup(), None).await.unwrap();

    assert_eq!(alice.get_channel_states().await.unwrap().len(), 1);
    assert!(bob.get_channel_states().await.unwrap().is_empty());
}
