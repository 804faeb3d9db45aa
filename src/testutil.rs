//! Shared test fixtures (spec §10.4): boots a full [`crate::Database`]
//! against a throwaway working directory, generalizing `git-issue`'s
//! `setup_temp_repo` pattern from a bare repository to the whole engine.

use tempfile::TempDir;

use crate::database::{Database, DatabaseOpenOptions};
use crate::identity::Identity;
use std::sync::Arc;

/// Opens a fresh database under a new `TempDir`. The `TempDir` must be kept
/// alive by the caller for as long as the database is used.
pub async fn temp_db(db_name: &str) -> (TempDir, Arc<Database>) {
    let dir = TempDir::new().expect("tempdir");
    let options = DatabaseOpenOptions::new(db_name, Identity::new("Test User", "test@example.com"));
    let options = DatabaseOpenOptions {
        local_dir: dir.path().to_path_buf(),
        ..options
    };
    let (db, _open_result) = Database::open(options).await.expect("open database");
    (dir, db)
}

/// Initializes a bare repository under a new `TempDir`, suitable for use as
/// the `remote_url` (a local filesystem path) in sync tests.
pub fn temp_bare_remote() -> TempDir {
    let dir = TempDir::new().expect("tempdir");
    let status = std::process::Command::new("git")
        .args(["init", "--bare", "--quiet"])
        .arg(dir.path())
        .status()
        .expect("spawn git init --bare");
    assert!(status.success(), "git init --bare failed");
    dir
}
