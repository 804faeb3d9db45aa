//! Lifecycle Manager (spec §4.9, §3 `Database`): open/create/close/destroy,
//! the per-database Task Queue, the default (root) Collection, and the
//! registry of [`Synchronizer`]s keyed by remote URL.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use log::{info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::backend::gix_backend::GixBackend;
use crate::backend::{CommitFilter, EntryKind, GitBackend, TreeChange};
use crate::collection::Collection;
use crate::document::{DocumentStore, FatDoc, FindOptions, JsonDoc, WriteResult};
use crate::error::{CrudError, GdbError, StateError};
use crate::identity::{Identity, Signature};
use crate::json_normalizer;
use crate::sync::{RemoteOptions, SchemaOptions, Synchronizer};
use crate::task_queue::TaskQueue;
use crate::validator;

/// The version this crate writes into a freshly created database's
/// `.gitddb/info.json` (spec §6 persisted-state layout). Compared against
/// an existing database's recorded version on `open` to produce
/// `OpenResult.is_valid_version`.
pub const CURRENT_VERSION: &str = env!("CARGO_PKG_VERSION");

const METADATA_DIR: &str = ".gitddb/";
const METADATA_FILE: &str = ".gitddb/info.json";

/// `{dbName, localDir, author, defaultBranch, namePrefix, schema}` (spec
/// §6 "Database open options").
#[derive(Debug, Clone)]
pub struct DatabaseOpenOptions {
    pub db_name: String,
    pub local_dir: PathBuf,
    pub author: Identity,
    pub default_branch: String,
    pub name_prefix: Option<String>,
    pub schema: SchemaOptions,
}

impl DatabaseOpenOptions {
    pub fn new(db_name: impl Into<String>, author: Identity) -> Self {
        Self {
            db_name: db_name.into(),
            local_dir: PathBuf::from("./gitddb"),
            author,
            default_branch: "main".to_string(),
            name_prefix: None,
            schema: SchemaOptions::default(),
        }
    }
}

/// The version/identity metadata blob persisted at `.gitddb/info.json`
/// (spec §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbInfo {
    pub version: String,
    #[serde(rename = "dbId")]
    pub db_id: String,
}

/// `{isNew, isClone, isCreatedHere, isValidVersion}` (spec §4.9 `open()`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenResult {
    pub is_new: bool,
    /// This core never clones a remote during `open` itself (cloning is a
    /// Sync Engine concern, triggered explicitly via `sync()`) — always
    /// `false`. Kept in the result shape for parity with spec §4.9.
    pub is_clone: bool,
    pub is_created_here: bool,
    pub is_valid_version: bool,
}

/// A GitDocumentDB core database (spec §3 `Database`): one working
/// directory, one Git repository, one Task Queue, and zero or more
/// Synchronizers keyed by remote URL.
pub struct Database {
    workdir: PathBuf,
    backend: Arc<dyn GitBackend>,
    queue: TaskQueue,
    store: Arc<DocumentStore>,
    root: Collection,
    identity: Identity,
    default_branch: String,
    default_branch_ref: String,
    name_prefix: Option<String>,
    schema: SchemaOptions,
    is_open: Arc<AtomicBool>,
    synchronizers: Mutex<HashMap<String, Arc<Synchronizer>>>,
}

impl Database {
    /// `open()` (spec §4.9): reuses the working directory's Git repository
    /// if one is already there, otherwise creates it, writes the metadata
    /// blob, and commits it as the first commit on the default branch.
    pub async fn open(options: DatabaseOpenOptions) -> Result<(Arc<Database>, OpenResult), GdbError> {
        validator::validate_db_name(&options.db_name)?;
        validator::validate_working_dir_path(&options.local_dir.to_string_lossy())?;

        let workdir = options.local_dir.join(&options.db_name);
        validator::validate_working_dir_path(&workdir.to_string_lossy())?;

        let default_branch_ref = format!("refs/heads/{}", options.default_branch);
        let git_dir_exists = workdir.join(".git").is_dir();

        let (backend, is_new): (Arc<dyn GitBackend>, bool) = if git_dir_exists {
            (Arc::new(GixBackend::open(&workdir)?), false)
        } else {
            (Arc::new(GixBackend::init(&workdir, &options.default_branch)?), true)
        };

        let is_valid_version = if is_new {
            let db_id = ulid::Ulid::new().to_string();
            Self::write_info(backend.as_ref(), &default_branch_ref, &options.author, &db_id)?;
            info!("created new database {:?} at {}", options.db_name, workdir.display());
            true
        } else {
            match Self::read_info(backend.as_ref(), &default_branch_ref)? {
                Some(existing) => existing.version == CURRENT_VERSION,
                None => false,
            }
        };

        let queue = TaskQueue::spawn();
        let store = Arc::new(DocumentStore::new(
            Arc::clone(&backend),
            &options.default_branch,
            options.author.clone(),
        ));
        let root = Collection::new(
            Arc::clone(&store),
            Arc::clone(&backend),
            queue.clone(),
            &default_branch_ref,
            "",
            true,
            options.name_prefix.clone(),
        )?;

        let db = Arc::new(Database {
            workdir,
            backend,
            queue,
            store,
            root,
            identity: options.author,
            default_branch: options.default_branch,
            default_branch_ref,
            name_prefix: options.name_prefix,
            schema: options.schema,
            is_open: Arc::new(AtomicBool::new(true)),
            synchronizers: Mutex::new(HashMap::new()),
        });

        Ok((
            db,
            OpenResult {
                is_new,
                is_clone: false,
                is_created_here: is_new,
                is_valid_version,
            },
        ))
    }

    fn write_info(
        backend: &dyn GitBackend,
        branch_ref: &str,
        author: &Identity,
        db_id: &str,
    ) -> Result<(), GdbError> {
        let info = DbInfo {
            version: CURRENT_VERSION.to_string(),
            db_id: db_id.to_string(),
        };
        let bytes = json_normalizer::canonicalize(&serde_json::to_value(&info)?);
        let blob = backend.write_blob(&bytes)?;
        let tree = backend.apply_tree_changes(
            None,
            &[TreeChange::Upsert {
                path: METADATA_FILE.to_string(),
                oid: blob,
            }],
        )?;
        let sig = Signature::now(author);
        let commit = backend.commit(tree, &[], &sig, &sig, "gitdocumentdb: initial commit")?;
        backend.update_ref(branch_ref, commit, None)?;
        Ok(())
    }

    fn read_info(backend: &dyn GitBackend, branch_ref: &str) -> Result<Option<DbInfo>, GdbError> {
        let Some(head) = backend.resolve_ref(branch_ref)? else {
            return Ok(None);
        };
        let entries = match backend.read_tree(head, METADATA_DIR) {
            Ok(entries) => entries,
            Err(_) => return Ok(None),
        };
        let Some(entry) = entries.into_iter().find(|e| e.name == "info.json" && e.kind == EntryKind::Blob) else {
            return Ok(None);
        };
        let bytes = backend.read_blob(entry.oid)?;
        match serde_json::from_slice::<DbInfo>(&bytes) {
            Ok(info) => Ok(Some(info)),
            Err(_) => Ok(None),
        }
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    pub fn default_branch(&self) -> &str {
        &self.default_branch
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn schema(&self) -> &SchemaOptions {
        &self.schema
    }

    /// The root collection (`collectionPath = ""`) — spec §4.4 Collection
    /// surface applied with no namespace prefix.
    pub fn root(&self) -> &Collection {
        &self.root
    }

    /// A JSON collection rooted at `path` (spec §4.4).
    pub fn collection(&self, path: &str) -> Result<Collection, GdbError> {
        Collection::new(
            Arc::clone(&self.store),
            Arc::clone(&self.backend),
            self.queue.clone(),
            &self.default_branch_ref,
            path,
            true,
            self.name_prefix.clone(),
        )
    }

    /// A generic (JSON/text/binary) collection rooted at `path` (spec §4.4
    /// "A generic collection … accepts JSON, UTF-8 text, or raw byte
    /// buffers").
    pub fn generic_collection(&self, path: &str) -> Result<Collection, GdbError> {
        Collection::new(
            Arc::clone(&self.store),
            Arc::clone(&self.backend),
            self.queue.clone(),
            &self.default_branch_ref,
            path,
            false,
            self.name_prefix.clone(),
        )
    }

    // -- Convenience CRUD forwarding to the root collection (spec §3
    // "path-equivalence": `db.put({_id: "p/" + id, ...})` and
    // `db.collection("p/").put({_id: id, ...})` produce the same state). --

    pub async fn put(&self, body: Value, message_template: Option<&str>) -> Result<WriteResult, GdbError> {
        self.root.put(body, message_template).await
    }

    pub async fn insert(&self, body: Value, message_template: Option<&str>) -> Result<WriteResult, GdbError> {
        self.root.insert(body, message_template).await
    }

    pub async fn update(&self, body: Value, message_template: Option<&str>) -> Result<WriteResult, GdbError> {
        self.root.update(body, message_template).await
    }

    pub async fn delete(&self, id: &str, message_template: Option<&str>) -> Result<WriteResult, GdbError> {
        self.root.delete(id, message_template).await
    }

    pub fn get(&self, id: &str) -> Result<Option<JsonDoc>, GdbError> {
        self.root.get(id)
    }

    pub fn get_fat_doc(&self, id: &str) -> Result<Option<FatDoc>, GdbError> {
        self.root.get_fat_doc(id)
    }

    pub fn get_by_oid(&self, oid: crate::backend::Oid) -> Result<Option<Vec<u8>>, GdbError> {
        self.store.get_by_oid(oid)
    }

    /// Reads a commit's normalized metadata (spec §3 `NormalizedCommit`) —
    /// used to inspect a [`WriteResult::commit`], e.g. to assert a commit
    /// message template was applied correctly.
    pub fn read_commit(&self, oid: crate::backend::Oid) -> Result<crate::backend::NormalizedCommit, GdbError> {
        Ok(self.backend.read_commit(oid)?)
    }

    pub fn get_history(&self, id: &str, filter: &CommitFilter) -> Result<Vec<Option<FatDoc>>, GdbError> {
        self.root.get_history(id, filter)
    }

    pub fn get_back_number(&self, id: &str, n: usize, filter: &CommitFilter) -> Result<Option<FatDoc>, GdbError> {
        self.root.get_back_number(id, n, filter)
    }

    pub fn find(&self, opts: FindOptions) -> Result<Vec<JsonDoc>, GdbError> {
        self.root.find(opts)
    }

    /// `sync(options)` (spec §4.7 steps 1-6): registers and bootstraps a
    /// [`Synchronizer`] for `options.remote_url`, replacing whatever was
    /// previously registered under the same URL.
    pub async fn sync(self: &Arc<Self>, options: RemoteOptions) -> Result<Arc<Synchronizer>, GdbError> {
        if !self.is_open.load(Ordering::SeqCst) {
            return Err(StateError::RepositoryNotOpen.into());
        }
        let remote_url = options.remote_url.clone();
        let remote_name = remote_name_for(&remote_url);

        let synchronizer = Synchronizer::new(
            Arc::clone(&self.backend),
            self.queue.clone(),
            self.identity.clone(),
            &self.default_branch,
            &remote_name,
            options,
            Arc::clone(&self.is_open),
        )?;

        synchronizer.bootstrap().await?;
        self.synchronizers.lock().unwrap().insert(remote_url, Arc::clone(&synchronizer));
        Ok(synchronizer)
    }

    /// Looks up a previously registered Synchronizer by remote URL.
    pub fn synchronizer(&self, remote_url: &str) -> Option<Arc<Synchronizer>> {
        self.synchronizers.lock().unwrap().get(remote_url).cloned()
    }

    /// `close({timeout, force})` (spec §4.9): rejects new submissions,
    /// cancels every Synchronizer's timer, then either drains (`force:
    /// false`) or cancels pending tasks immediately (`force: true`).
    pub async fn close(&self, timeout_ms: u64, force: bool) -> Result<(), GdbError> {
        self.is_open.store(false, Ordering::SeqCst);
        for synchronizer in self.synchronizers.lock().unwrap().values() {
            synchronizer.cancel();
        }
        info!("closing database at {}", self.workdir.display());
        if force {
            self.queue.stop();
            Ok(())
        } else {
            self.queue.close(timeout_ms).await
        }
    }

    /// `destroy()` (spec §4.9): closes, then removes the working directory.
    /// `remove_remote` would invoke the remote-repository provisioning
    /// hook — that hook lives outside this core's scope (spec §1), so this
    /// only logs the request.
    pub async fn destroy(&self, timeout_ms: u64, remove_remote: bool) -> Result<(), GdbError> {
        self.close(timeout_ms, false).await?;
        std::fs::remove_dir_all(&self.workdir).map_err(|e| {
            GdbError::Crud(CrudError::CannotDeleteData {
                path: self.workdir.display().to_string(),
                message: e.to_string(),
            })
        })?;
        if remove_remote {
            warn!(
                "destroy(removeRemote: true) requested but remote-repository provisioning is out of this core's scope (spec §1)"
            );
        }
        Ok(())
    }
}

/// Derives a stable, filesystem/Git-safe remote name from a URL so multiple
/// Synchronizers (one per remote URL, spec §3) don't collide on the Git
/// Backend's single `origin`-shaped remote slot.
fn remote_name_for(url: &str) -> String {
    let sanitized: String = url
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    let trimmed: String = sanitized.chars().rev().take(40).collect::<String>().chars().rev().collect();
    if trimmed.is_empty() {
        "origin".to_string()
    } else {
        format!("gddb_{trimmed}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::{ConnectionOptions, ConnectionType, SyncAction, SyncDirection};
    use crate::testutil::{temp_bare_remote, temp_db};
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test(flavor = "multi_thread")]
    async fn open_on_an_empty_directory_creates_a_new_database_with_a_valid_version() {
        let (_dir, db) = temp_db("nara-db").await;
        assert!(db.workdir().join(".git").is_dir());
        assert!(db.workdir().join(".gitddb").join("info.json").exists());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn reopening_an_existing_database_reports_is_new_false() {
        let dir = TempDir::new().unwrap();
        let identity = Identity::new("Test User", "test@example.com");
        let first = DatabaseOpenOptions {
            local_dir: dir.path().to_path_buf(),
            ..DatabaseOpenOptions::new("nara-db", identity.clone())
        };
        let (_db, opened) = Database::open(first).await.unwrap();
        assert!(opened.is_new);

        let second = DatabaseOpenOptions {
            local_dir: dir.path().to_path_buf(),
            ..DatabaseOpenOptions::new("nara-db", identity)
        };
        let (_db2, reopened) = Database::open(second).await.unwrap();
        assert!(!reopened.is_new);
        assert!(reopened.is_valid_version);
    }

    /// S1 (spec §8): insert and read round-trips exactly, and the commit
    /// message follows the `insert: <path>(<shortOid>)` template.
    #[tokio::test(flavor = "multi_thread")]
    async fn s1_insert_and_read() {
        let (_dir, db) = temp_db("nara-db").await;
        let result = db
            .insert(json!({"_id": "nara", "flower": "cherry blossoms"}), None)
            .await
            .unwrap();

        let doc = db.get("nara").unwrap().unwrap();
        assert_eq!(doc.body, json!({"_id": "nara", "flower": "cherry blossoms"}));

        let commit = db.read_commit(result.commit).unwrap();
        assert_eq!(commit.message, format!("insert: nara.json({})", result.file_oid.short()));
    }

    /// S2 (spec §8): update, delete, and `getHistory`/`getBackNumber`
    /// collapsing semantics.
    #[tokio::test(flavor = "multi_thread")]
    async fn s2_update_then_delete_then_back_number() {
        let (_dir, db) = temp_db("nara-db").await;
        let v1 = db.insert(json!({"_id": "nara", "rev": 1}), None).await.unwrap();
        let v2 = db.update(json!({"_id": "nara", "rev": 2}), None).await.unwrap();
        db.delete("nara", None).await.unwrap();

        let filter = CommitFilter::default();
        let history = db.get_history("nara", &filter).unwrap();
        assert_eq!(history.len(), 3);
        assert!(history[0].is_none());
        assert_eq!(history[1].as_ref().unwrap().file_oid, v2.file_oid);
        assert_eq!(history[2].as_ref().unwrap().file_oid, v1.file_oid);

        let back_2 = db.get_back_number("nara", 2, &filter).unwrap().unwrap();
        assert_eq!(back_2.file_oid, v1.file_oid);
    }

    /// S3 (spec §8): a collection's writes are visible through the
    /// database's root API at the fullDocPath, and vice versa, differing
    /// only in the returned `_id`.
    #[tokio::test(flavor = "multi_thread")]
    async fn s3_collection_path_equivalence() {
        let (_dir, db) = temp_db("nara-db").await;
        let col = db.collection("yoshino").unwrap();
        col.put(
            json!({"_id": "mt_yoshino", "flower": "awesome cherry blossoms"}),
            None,
        )
        .await
        .unwrap();

        let via_root = db.get("yoshino/mt_yoshino").unwrap().unwrap();
        assert_eq!(via_root.id, "yoshino/mt_yoshino");
        assert_eq!(via_root.body["flower"], "awesome cherry blossoms");

        let via_collection = col.get("mt_yoshino").unwrap().unwrap();
        assert_eq!(via_collection.id, "mt_yoshino");
        assert_eq!(via_collection.body["flower"], "awesome cherry blossoms");
    }

    /// S4 (spec §8): two databases sharing a bare remote converge by
    /// fast-forward after one side pushes.
    #[tokio::test(flavor = "multi_thread")]
    async fn s4_fast_forward_sync() {
        let remote = temp_bare_remote();
        let remote_url = remote.path().to_string_lossy().to_string();

        let (_dir_a, db_a) = temp_db("a").await;
        let (_dir_b, db_b) = temp_db("b").await;

        db_a.insert(json!({"_id": "seed", "name": "seed"}), None).await.unwrap();

        let sync_a = db_a
            .sync(RemoteOptions {
                connection: ConnectionOptions {
                    kind: ConnectionType::None,
                    ..ConnectionOptions::default()
                },
                sync_direction: SyncDirection::Both,
                ..RemoteOptions::new(remote_url.clone())
            })
            .await
            .unwrap();
        // bootstrap's own push already ran; nothing more to request here.
        let _ = sync_a.state();

        // b has no history of its own yet; bootstrapping adopts a's pushed
        // history wholesale (there is nothing local to lose).
        let sync_b = db_b.sync(RemoteOptions::new(remote_url)).await.unwrap();

        // a advances and pushes again, then b catches up by an ordinary
        // fast-forward over its now-shared history with a.
        db_a.insert(json!({"_id": "1", "name": "fromA"}), None).await.unwrap();
        sync_a.try_sync().await.unwrap();

        let result = sync_b.try_sync().await.unwrap();

        assert_eq!(result.action, SyncAction::FastForwardMerge);
        let doc = db_b.get("1").unwrap().unwrap();
        assert_eq!(doc.body["name"], "fromA");

        assert_eq!(result.changes.local.len(), 1);
        assert!(result.changes.remote.is_empty());
        let inserted = &result.changes.local[0];
        assert_eq!(inserted.operation, crate::document::ChangeOperation::Insert);
        assert!(inserted.old.is_none());
        let new_doc = inserted.new.as_ref().expect("inserted entry carries a new FatDoc");
        match &new_doc.doc {
            crate::document::DocBody::Json(value) => {
                assert_eq!(value["_id"], "1");
                assert_eq!(value["name"], "fromA");
            }
            other => panic!("expected Json body, got {other:?}"),
        }
    }

    /// S5 (spec §8): two databases insert the same `_id` independently after
    /// sharing a common root, then converge via a property-level merge with
    /// a diff3 fallback on the schema's `plainTextProperties` field.
    #[tokio::test(flavor = "multi_thread")]
    async fn s5_concurrent_conflicting_updates_converge() {
        use crate::sync::{JsonSchemaOptions, SchemaOptions};

        let remote = temp_bare_remote();
        let remote_url = remote.path().to_string_lossy().to_string();

        let mut schema = SchemaOptions::default();
        schema.json = JsonSchemaOptions {
            plain_text_properties: ["profile".to_string()].into_iter().collect(),
        };

        let dir_a = TempDir::new().unwrap();
        let identity = Identity::new("Test User", "test@example.com");
        let (db_a, _) = Database::open(DatabaseOpenOptions {
            local_dir: dir_a.path().to_path_buf(),
            schema: schema.clone(),
            ..DatabaseOpenOptions::new("a", identity.clone())
        })
        .await
        .unwrap();

        let dir_b = TempDir::new().unwrap();
        let (db_b, _) = Database::open(DatabaseOpenOptions {
            local_dir: dir_b.path().to_path_buf(),
            schema,
            ..DatabaseOpenOptions::new("b", identity)
        })
        .await
        .unwrap();

        let none_connection = || ConnectionOptions {
            kind: ConnectionType::None,
            ..ConnectionOptions::default()
        };

        let sync_a = db_a
            .sync(RemoteOptions {
                connection: none_connection(),
                sync_direction: SyncDirection::Both,
                ..RemoteOptions::new(remote_url.clone())
            })
            .await
            .unwrap();
        let sync_b = db_b
            .sync(RemoteOptions {
                connection: none_connection(),
                sync_direction: SyncDirection::Both,
                ..RemoteOptions::new(remote_url)
            })
            .await
            .unwrap();

        db_a.insert(
            json!({"_id": "01", "from": "A", "profile": "I am from Nara. I love cherry blossoms."}),
            None,
        )
        .await
        .unwrap();
        db_b.insert(
            json!({"_id": "01", "from": "B", "profile": "My name is Hidekazu and I am from Nara."}),
            None,
        )
        .await
        .unwrap();

        sync_a.try_sync().await.unwrap();
        let result = sync_b.try_sync().await.unwrap();
        assert_eq!(result.action, SyncAction::ResolveConflictsAndPush);
        sync_a.try_sync().await.unwrap();

        let doc_a = db_a.get("01").unwrap().unwrap();
        let doc_b = db_b.get("01").unwrap().unwrap();
        assert_eq!(doc_a.body, doc_b.body);
    }

    /// S6 (spec §8): both sides diverge and race a bare `tryPush` against
    /// the same remote; the loser rejects with
    /// `CannotPushBecauseUnfetchedCommitExists` and converges on retry.
    #[tokio::test(flavor = "multi_thread")]
    async fn s6_push_race_loser_converges_on_retry() {
        let remote = temp_bare_remote();
        let remote_url = remote.path().to_string_lossy().to_string();

        let (_dir_a, db_a) = temp_db("a").await;
        let (_dir_b, db_b) = temp_db("b").await;

        let none_connection = || ConnectionOptions {
            kind: ConnectionType::None,
            ..ConnectionOptions::default()
        };

        let sync_a = db_a
            .sync(RemoteOptions {
                connection: none_connection(),
                sync_direction: SyncDirection::Both,
                ..RemoteOptions::new(remote_url.clone())
            })
            .await
            .unwrap();
        let sync_b = db_b
            .sync(RemoteOptions {
                connection: none_connection(),
                sync_direction: SyncDirection::Both,
                ..RemoteOptions::new(remote_url)
            })
            .await
            .unwrap();

        db_a.insert(json!({"_id": "1", "name": "fromA"}), None).await.unwrap();
        db_b.insert(json!({"_id": "2", "name": "fromB"}), None).await.unwrap();

        sync_a.try_sync().await.unwrap();
        let loser = sync_b.try_push().await;
        assert!(matches!(
            loser,
            Err(GdbError::Remote(crate::error::RemoteError::CannotPushBecauseUnfetchedCommitExists))
        ));

        let result = sync_b.try_sync().await.unwrap();
        assert!(matches!(
            result.action,
            SyncAction::MergeAndPush | SyncAction::ResolveConflictsAndPush
        ));

        sync_a.try_sync().await.unwrap();
        assert!(db_a.get("1").unwrap().is_some());
        assert!(db_a.get("2").unwrap().is_some());
        assert!(db_b.get("1").unwrap().is_some());
        assert!(db_b.get("2").unwrap().is_some());
    }

    #[test]
    fn remote_name_for_sanitizes_and_bounds_length() {
        let name = remote_name_for("https://example.com/org/repo.git");
        assert!(name.starts_with("gddb_"));
        assert!(name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'));
    }
}
