//! Shared test utilities for docrag-cli integration tests.

#![allow(dead_code)]

use std::fs;

use assert_cmd::Command;
use tempfile::TempDir;

/// Get a Command for the docrag binary.
///
/// # Panics
///
/// Panics if the docrag binary cannot be found.
#[allow(deprecated)]
pub fn docrag_cmd() -> Command {
    Command::cargo_bin("docrag").expect("docrag binary should exist")
}

/// A command isolated from the user's home: config, uploads and models all
/// live under `home`, and the vector store is in memory.
pub fn isolated_cmd(home: &TempDir) -> Command {
    let config = home.path().join("config.yaml");
    if !config.exists() {
        fs::write(&config, "vectorStore:\n  backend: memory\nenvironment: test\n").unwrap();
    }

    let mut cmd = docrag_cmd();
    cmd.env("HOME", home.path())
        .env("DOCRAG_CONFIG", &config)
        .env("DOCRAG_UPLOAD_DIR", home.path().join("uploads"))
        .env("DOCRAG_MODELS_DIR", home.path().join("models"))
        .env("DOCRAG_COLOR", "never")
        .env_remove("DOCRAG_ENV")
        .env_remove("DOCRAG_DEVICE");
    cmd
}
