//! Test utilities for handler and router tests.

use std::path::Path;

use axum_test::TestServer;

use crate::config::{Config, UploadsConfig};

pub fn create_test_config(public_dir: &Path) -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        public_dir: public_dir.to_path_buf(),
        uploads: UploadsConfig::default(),
    }
}

pub async fn create_test_app(config: Config) -> TestServer {
    crate::Application::new(config)
        .await
        .expect("Failed to create application")
        .into_test_server()
}

/// Names of the files in `dir`, sorted. Staging files count too, so an empty result means
/// nothing was left behind.
pub fn stored_files(dir: &Path) -> Vec<String> {
    let mut names: Vec<_> = std::fs::read_dir(dir)
        .expect("Failed to read upload directory")
        .map(|entry| entry.expect("Failed to read directory entry").file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
