mod common;

use common::Harness;
use meshroom::config::Config;
use meshroom::identity::LocalIdentity;

#[tokio::test]
async fn default_config_round_trips_through_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("meshroom.toml");
    let path = path.to_str().unwrap();

    Config::create_default(path).await.unwrap();
    let cfg = Config::load(path).await.unwrap();
    assert_eq!(cfg.room.max_clients, 32);
    assert_eq!(cfg.sync.reply_delay_ms, 1500);
    assert!(cfg.room.admin_password_hash.is_none());
}

#[tokio::test]
async fn console_edits_are_saved_and_reloaded() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("room.toml");
    let path = path.to_str().unwrap();

    let mut h = Harness::with_config(common::config());
    h.room.handle_console_command(&mut h.outbox, "set name Ridge Top");
    h.room.handle_console_command(&mut h.outbox, "set lat 45.5");
    assert!(h.room.take_config_dirty());
    h.room.config().save(path).await.unwrap();

    let reloaded = Config::load(path).await.unwrap();
    assert_eq!(reloaded.room.name, "Ridge Top");
    assert_eq!(reloaded.room.latitude, 45.5);
}

#[tokio::test]
async fn invalid_config_is_rejected_on_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.toml");
    let mut cfg = Config::default();
    cfg.room.max_posts = 0;
    tokio::fs::write(&path, toml::to_string_pretty(&cfg).unwrap())
        .await
        .unwrap();
    let err = Config::load(path.to_str().unwrap()).await.unwrap_err();
    assert!(err.to_string().contains("max_posts"));
}

#[test]
fn identity_key_file_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let key = dir.path().join("data").join("identity.key");
    let (first, created) = LocalIdentity::load_or_create(&key).unwrap();
    assert!(created);
    let (second, created) = LocalIdentity::load_or_create(&key).unwrap();
    assert!(!created);
    assert_eq!(first.identity(), second.identity());
    let text = std::fs::read_to_string(&key).unwrap();
    assert_eq!(text.trim().len(), 64);
}
