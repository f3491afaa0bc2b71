/// Test utilities and helpers for TempoDB testing
///
/// This module provides common test utilities to simplify writing tests.

use std::path::PathBuf;
use tempfile::TempDir;
use tempo_api::{Database, Write};
use tempo_core::WriteRequest;

/// Test database wrapper that manages temporary directory lifecycle
pub struct TestDatabase {
    pub db: Database,
    pub path: PathBuf,
    _temp_dir: Option<TempDir>,
}

impl TestDatabase {
    /// Create a new test database in a temporary directory
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("test.db");
        let db = Database::open(&path).expect("Failed to create database");

        Self {
            db,
            path,
            _temp_dir: Some(temp_dir),
        }
    }

    /// Create a test database at a specific path (the parent must exist)
    pub fn at_path(path: PathBuf) -> Self {
        let db = Database::open(&path).expect("Failed to create database");

        Self {
            db,
            path,
            _temp_dir: None,
        }
    }

    /// Stage a write and return its receipt id.
    pub fn stage(&self, request: WriteRequest) -> String {
        self.db.write(request).expect("Failed to stage write")
    }

    /// Stage a write and commit the pending block immediately.
    pub fn commit(&self, request: WriteRequest) -> String {
        let id = self.stage(request);
        self.db
            .commit_pending()
            .expect("Failed to commit block")
            .expect("Expected a non-empty block");
        id
    }
}

impl Default for TestDatabase {
    fn default() -> Self {
        Self::new()
    }
}

/// A minimal valid write request for tests that only care about the key.
pub fn simple_write(key: &str) -> WriteRequest {
    Write::new(key)
        .payload(format!("payload for {key}").into_bytes())
        .content_type("text/plain")
        .owner("0xtest")
        .expires_in(100)
        .build()
}
