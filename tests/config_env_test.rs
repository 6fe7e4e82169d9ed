//! `ConfigSource::from_env` reads the process environment, so it lives in its
//! own test binary with a single test.

use db_session::config::{CONFIG_DIR_ENV, CONFIG_FILE_NAME, ConfigSource};

#[tokio::test]
async fn test_from_env_honours_config_dir_variable() {
    let dir = tempfile::tempdir().unwrap();
    tokio::fs::write(
        dir.path().join(CONFIG_FILE_NAME),
        "[database.app]\ndsn = \"sqlite::memory:\"\n",
    )
    .await
    .unwrap();
    let default = std::env::current_dir().unwrap().join("config");

    // SAFETY: the only test in this binary; no other thread reads the environment.
    unsafe { std::env::remove_var(CONFIG_DIR_ENV) };
    assert_eq!(ConfigSource::from_env().unwrap().dir(), default);

    unsafe { std::env::set_var(CONFIG_DIR_ENV, "") };
    assert_eq!(ConfigSource::from_env().unwrap().dir(), default);

    unsafe { std::env::set_var(CONFIG_DIR_ENV, dir.path()) };
    let source = ConfigSource::from_env().unwrap();
    assert_eq!(source.dir(), dir.path());
    let tree = source.load().await.unwrap();
    assert_eq!(tree.data_source_names(), vec!["app"]);

    unsafe { std::env::remove_var(CONFIG_DIR_ENV) };
}
