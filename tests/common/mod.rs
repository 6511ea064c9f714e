use chatvault::config::StorageConfig;
use chatvault::storage::SessionStore;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

#[allow(dead_code)]
pub async fn create_temp_store() -> (SessionStore, TempDir) {
    create_temp_store_with(|_| {}).await
}

#[allow(dead_code)]
pub async fn create_temp_store_with(
    customize: impl FnOnce(&mut StorageConfig),
) -> (SessionStore, TempDir) {
    let tmp = TempDir::new().expect("failed to create tempdir");
    let mut config = StorageConfig::with_data_dir(tmp.path().join("data"));
    customize(&mut config);
    let store = SessionStore::new(config);
    store
        .initialize()
        .await
        .expect("failed to initialize session store");
    (store, tmp)
}

#[allow(dead_code)]
pub fn temp_config_file(contents: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("failed to create tempdir");
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, contents).expect("failed to write config file");
    (temp_dir, config_path)
}

#[allow(dead_code)]
pub fn write_export(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("failed to create export directory");
    }
    fs::write(&path, body).expect("failed to write export file");
    path
}
