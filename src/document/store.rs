//! The Document Store (spec §4.3): CRUD, history, and `find` over a single
//! Git Backend, all reading/writing at the repository's default branch.
//!
//! Every write here runs synchronously on the calling thread. Callers never
//! invoke these methods directly — [`crate::task_queue::TaskQueue`] is the
//! only thing that calls into them, one at a time, which is what gives the
//! "all-or-nothing, strictly serialized" guarantees of spec §5.

use std::sync::Mutex;

use serde_json::Value;
use ulid::Generator;

use crate::backend::{CommitFilter, EntryKind, GitBackend, Oid, TreeChange};
use crate::error::{CrudError, GdbError, ValidationError};
use crate::identity::{Identity, Signature};
use crate::json_normalizer;
use crate::validator;

use super::types::{DocBody, DocType, FatDoc, FindOptions, JsonDoc, WriteResult};

/// Placeholder used in a caller-supplied commit message template; replaced
/// with the seven-character prefix of the file oid prior to committing
/// (spec §4.3 "Commit-message templating").
const FILE_OID_PLACEHOLDER: &str = "<%file_oid%>";

pub struct DocumentStore {
    backend: std::sync::Arc<dyn GitBackend>,
    default_branch_ref: String,
    identity: Identity,
    id_generator: Mutex<Generator>,
}

/// Whether a `put` should behave like `insert` (fail if present), `update`
/// (fail if absent), or accept either (spec §4.3 `put`/`insert`/`update`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutMode {
    Upsert,
    InsertOnly,
    UpdateOnly,
}

impl DocumentStore {
    pub fn new(backend: std::sync::Arc<dyn GitBackend>, default_branch: &str, identity: Identity) -> Self {
        Self {
            backend,
            default_branch_ref: format!("refs/heads/{default_branch}"),
            identity,
            id_generator: Mutex::new(Generator::new()),
        }
    }

    fn head(&self) -> Result<Option<Oid>, GdbError> {
        Ok(self.backend.resolve_ref(&self.default_branch_ref)?)
    }

    fn next_ulid(&self) -> String {
        let mut gen = self.id_generator.lock().unwrap_or_else(|e| e.into_inner());
        gen.generate().map(|u| u.to_string()).unwrap_or_else(|_| ulid::Ulid::new().to_string())
    }

    /// Looks up a single path's blob entry in the tree of `commit`, without
    /// listing the rest of the parent directory.
    fn resolve_path(
        &self,
        commit: Oid,
        full_path: &str,
    ) -> Result<Option<crate::backend::TreeEntry>, GdbError> {
        let (dir, name) = split_parent(full_path);
        let entries = match self.backend.read_tree(commit, dir) {
            Ok(entries) => entries,
            Err(_) => return Ok(None),
        };
        Ok(entries.into_iter().find(|e| e.name == name))
    }

    fn read_blob_at(&self, head: Option<Oid>, full_path: &str) -> Result<Option<(Oid, Vec<u8>)>, GdbError> {
        let Some(head) = head else { return Ok(None) };
        let Some(entry) = self.resolve_path(head, full_path)? else {
            return Ok(None);
        };
        if entry.kind != EntryKind::Blob {
            return Ok(None);
        }
        let bytes = self.backend.read_blob(entry.oid)?;
        Ok(Some((entry.oid, bytes)))
    }

    /// Core write path shared by `put`/`insert`/`update`/`delete`: stage one
    /// blob change, commit it on top of the current HEAD, and move the
    /// default-branch ref with a compare-and-swap so a concurrent writer
    /// (there should be none — the Task Queue serializes this — but a
    /// foreign process could still race) cannot silently clobber history.
    fn commit_single_change(
        &self,
        change: TreeChange,
        message: &str,
        file_oid_for_template: Option<Oid>,
    ) -> Result<Oid, GdbError> {
        let head = self.head()?;
        let tree = self.backend.apply_tree_changes(head, std::slice::from_ref(&change))?;
        let message = match file_oid_for_template {
            Some(oid) => message.replace(FILE_OID_PLACEHOLDER, &oid.short()),
            None => message.to_string(),
        };
        let sig = Signature::now(&self.identity);
        let parents: Vec<Oid> = head.into_iter().collect();
        let commit_oid = self.backend.commit(tree, &parents, &sig, &sig, &message)?;
        self.backend.update_ref(&self.default_branch_ref, commit_oid, head)?;
        Ok(commit_oid)
    }

    /// `put`/`insert`/`update` (spec §4.3). `id` is the shortId as seen by
    /// the caller; `full_path` is where the bytes are actually written
    /// (`collectionPath + shortId + ".json"`, translated by
    /// [`crate::collection::Collection`]). The persisted JSON carries
    /// `full_id` (the fullDocPath without `.json`) in its `_id` field; the
    /// returned [`WriteResult`] carries the shortId.
    pub fn put_json(
        &self,
        id: &str,
        full_path: &str,
        full_id: &str,
        mut body: Value,
        mode: PutMode,
        message_template: Option<&str>,
    ) -> Result<WriteResult, GdbError> {
        validator::validate_id(id)?;
        validator::validate_document_property_names(&body)?;

        let head = self.head()?;
        let existing = self.read_blob_at(head, full_path)?;
        match (mode, &existing) {
            (PutMode::InsertOnly, Some(_)) => {
                return Err(CrudError::SameIdExists { id: id.to_string() }.into());
            }
            (PutMode::UpdateOnly, None) => {
                return Err(CrudError::DocumentNotFound { id: id.to_string() }.into());
            }
            _ => {}
        }

        if let Value::Object(map) = &mut body {
            map.insert("_id".to_string(), Value::String(full_id.to_string()));
        } else {
            return Err(ValidationError::UndefinedDocumentId.into());
        }

        let bytes = json_normalizer::canonicalize(&body);
        let file_oid = self.backend.write_blob(&bytes)?;

        let verb = if existing.is_some() { "update" } else { "insert" };
        let default_message = format!("{verb}: {full_path}({})", file_oid.short());
        let message = message_template.unwrap_or(&default_message);

        let commit = self.commit_single_change(
            TreeChange::Upsert {
                path: full_path.to_string(),
                oid: file_oid,
            },
            message,
            Some(file_oid),
        )?;

        Ok(WriteResult {
            id: id.to_string(),
            file_oid,
            commit,
        })
    }

    /// Generates `<namePrefix><ulid>` for a put call with no caller-supplied
    /// `_id` (spec §4.3 "Auto-`_id`").
    pub fn generate_auto_id(&self, name_prefix: &str) -> String {
        format!("{name_prefix}{}", self.next_ulid())
    }

    /// `delete(id)` (spec §4.3): fails with `DocumentNotFound` if the path
    /// is absent, else removes it and lets the Git Backend's tree editor
    /// prune any parent directory left empty.
    pub fn delete(&self, id: &str, full_path: &str, message_template: Option<&str>) -> Result<WriteResult, GdbError> {
        let head = self.head()?;
        let Some((file_oid, _)) = self.read_blob_at(head, full_path)? else {
            return Err(CrudError::DocumentNotFound { id: id.to_string() }.into());
        };

        let default_message = format!("delete: {full_path}({})", file_oid.short());
        let message = message_template.unwrap_or(&default_message);

        let commit = self.commit_single_change(
            TreeChange::Remove {
                path: full_path.to_string(),
            },
            message,
            Some(file_oid),
        )?;

        Ok(WriteResult {
            id: id.to_string(),
            file_oid,
            commit,
        })
    }

    /// `get(id)` (spec §4.3): reads the file at HEAD, parsing as JSON when
    /// `full_path` ends in `.json`.
    pub fn get(&self, id: &str, full_path: &str) -> Result<Option<JsonDoc>, GdbError> {
        let head = self.head()?;
        let Some((_, bytes)) = self.read_blob_at(head, full_path)? else {
            return Ok(None);
        };
        let value: Value = serde_json::from_slice(&bytes).map_err(|e| ValidationError::InvalidJsonObject {
            path: full_path.to_string(),
            message: e.to_string(),
        })?;
        Ok(Some(JsonDoc {
            id: id.to_string(),
            body: with_id(value, id),
        }))
    }

    /// `getFatDoc(id)` (spec §4.3): as `get`, plus `fileOid` and a type tag.
    /// `doc_type` is a hint (`Json` for JSON collections, `Text` otherwise);
    /// for a non-JSON file the actual tag is resolved by whether the stored
    /// bytes are valid UTF-8, since a generic collection's write path (spec
    /// §4.4) never records a caller-declared text/binary distinction.
    pub fn get_fat_doc(&self, id: &str, full_path: &str, doc_type: DocType) -> Result<Option<FatDoc>, GdbError> {
        let head = self.head()?;
        let Some((file_oid, bytes)) = self.read_blob_at(head, full_path)? else {
            return Ok(None);
        };
        let (doc_type, doc) = Self::doc_body_of(full_path, doc_type, bytes, id)?;
        Ok(Some(FatDoc {
            id: id.to_string(),
            name: full_path.to_string(),
            doc_type,
            file_oid,
            doc,
        }))
    }

    fn doc_body_of(
        full_path: &str,
        doc_type: DocType,
        bytes: Vec<u8>,
        id: &str,
    ) -> Result<(DocType, DocBody), GdbError> {
        match doc_type {
            DocType::Json => {
                let value: Value = serde_json::from_slice(&bytes).map_err(|e| ValidationError::InvalidJsonObject {
                    path: full_path.to_string(),
                    message: e.to_string(),
                })?;
                Ok((DocType::Json, DocBody::Json(with_id(value, id))))
            }
            DocType::Text | DocType::Binary => match String::from_utf8(bytes) {
                Ok(text) => Ok((DocType::Text, DocBody::Text(text))),
                Err(e) => Ok((DocType::Binary, DocBody::Binary(e.into_bytes()))),
            },
        }
    }

    /// `put(id, body)` for a generic (non-JSON) collection (spec §4.4: "a
    /// generic collection … accepts … UTF-8 text, or raw byte buffers"):
    /// writes `bytes` verbatim, with no JSON canonicalization or `_id`
    /// injection.
    pub fn put_raw(
        &self,
        id: &str,
        full_path: &str,
        bytes: Vec<u8>,
        mode: PutMode,
        message_template: Option<&str>,
    ) -> Result<WriteResult, GdbError> {
        validator::validate_id(id)?;

        let head = self.head()?;
        let existing = self.read_blob_at(head, full_path)?;
        match (mode, &existing) {
            (PutMode::InsertOnly, Some(_)) => {
                return Err(CrudError::SameIdExists { id: id.to_string() }.into());
            }
            (PutMode::UpdateOnly, None) => {
                return Err(CrudError::DocumentNotFound { id: id.to_string() }.into());
            }
            _ => {}
        }

        let file_oid = self.backend.write_blob(&bytes)?;
        let verb = if existing.is_some() { "update" } else { "insert" };
        let default_message = format!("{verb}: {full_path}({})", file_oid.short());
        let message = message_template.unwrap_or(&default_message);

        let commit = self.commit_single_change(
            TreeChange::Upsert {
                path: full_path.to_string(),
                oid: file_oid,
            },
            message,
            Some(file_oid),
        )?;

        Ok(WriteResult {
            id: id.to_string(),
            file_oid,
            commit,
        })
    }

    /// `getByOid(oid)` (spec §4.3): reads any blob directly, with no path or
    /// history context.
    pub fn get_by_oid(&self, oid: Oid) -> Result<Option<Vec<u8>>, GdbError> {
        match self.backend.read_blob(oid) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(_) => Ok(None),
        }
    }

    /// Computes the collapsed history sequence for `full_path` (spec §4.3
    /// "History semantics"): newest-first, consecutive-duplicate blob oids
    /// collapsed to one entry, and the trailing run of "absent" entries
    /// (before the document's first appearance) dropped. `None` represents
    /// "deleted at that revision".
    fn history_sequence(
        &self,
        full_path: &str,
        filter: &CommitFilter,
    ) -> Result<Vec<Option<Oid>>, GdbError> {
        let Some(head) = self.head()? else { return Ok(Vec::new()) };

        let mut raw = Vec::new();
        for commit in self.backend.list_commits(head, None)? {
            if !filter.matches(&commit) {
                continue;
            }
            let entry = self.resolve_path(commit.oid, full_path)?;
            raw.push(entry.map(|e| e.oid));
        }

        // Collapse rule 1: consecutive identical entries (including
        // consecutive "absent") collapse to one.
        let mut collapsed: Vec<Option<Oid>> = Vec::new();
        for oid in raw {
            if collapsed.last() != Some(&oid) {
                collapsed.push(oid);
            }
        }

        // Collapse rule 2: `raw` is newest-first (list_commits walks that
        // way), so the document's oldest, pre-creation "absent" run sits at
        // the *end* of `collapsed`, not the start — drop only that trailing
        // run. A leading `None` means "currently deleted" and must stay.
        while collapsed.last() == Some(&None) {
            collapsed.pop();
        }

        Ok(collapsed)
    }

    /// `getHistory(id, filter?)` (spec §4.3).
    pub fn get_history(
        &self,
        id: &str,
        full_path: &str,
        doc_type: DocType,
        filter: &CommitFilter,
    ) -> Result<Vec<Option<FatDoc>>, GdbError> {
        let sequence = self.history_sequence(full_path, filter)?;
        sequence
            .into_iter()
            .map(|maybe_oid| self.fat_doc_from_oid(id, full_path, doc_type, maybe_oid))
            .collect()
    }

    /// `getBackNumber(id, n, filter?)` (spec §4.3): index `n` of the same
    /// sequence `getHistory` would return (0 = latest), or `None` if `n` is
    /// out of range.
    pub fn get_back_number(
        &self,
        id: &str,
        full_path: &str,
        doc_type: DocType,
        n: usize,
        filter: &CommitFilter,
    ) -> Result<Option<FatDoc>, GdbError> {
        let sequence = self.history_sequence(full_path, filter)?;
        match sequence.get(n) {
            Some(entry) => self.fat_doc_from_oid(id, full_path, doc_type, *entry),
            None => Ok(None),
        }
    }

    fn fat_doc_from_oid(
        &self,
        id: &str,
        full_path: &str,
        doc_type: DocType,
        oid: Option<Oid>,
    ) -> Result<Option<FatDoc>, GdbError> {
        let Some(oid) = oid else { return Ok(None) };
        let bytes = self.backend.read_blob(oid)?;
        let (doc_type, doc) = Self::doc_body_of(full_path, doc_type, bytes, id)?;
        Ok(Some(FatDoc {
            id: id.to_string(),
            name: full_path.to_string(),
            doc_type,
            file_oid: oid,
            doc,
        }))
    }

    /// `find(opts)` (spec §4.3): breadth-first traversal of the HEAD tree
    /// under `opts.prefix` (directories after files at each level), parsing
    /// every blob whose name ends in `.json`.
    pub fn find(&self, opts: &FindOptions) -> Result<Vec<JsonDoc>, GdbError> {
        let Some(head) = self.head()? else { return Ok(Vec::new()) };
        let root = opts.prefix.clone().unwrap_or_default();

        let mut results = Vec::new();
        let mut queue = std::collections::VecDeque::new();
        queue.push_back(root);

        while let Some(dir) = queue.pop_front() {
            let mut entries = self.backend.read_tree(head, &dir)?;
            entries.sort_by(|a, b| {
                if opts.descending {
                    b.name.cmp(&a.name)
                } else {
                    a.name.cmp(&b.name)
                }
            });

            let (files, dirs): (Vec<_>, Vec<_>) = entries.into_iter().partition(|e| e.kind == EntryKind::Blob);

            for file in files {
                if !file.name.ends_with(".json") {
                    continue;
                }
                let bytes = self.backend.read_blob(file.oid)?;
                let value: Value = serde_json::from_slice(&bytes).map_err(|e| ValidationError::InvalidJsonObject {
                    path: format!("{dir}{}", file.name),
                    message: e.to_string(),
                })?;
                let id = format!("{dir}{}", file.name.trim_end_matches(".json"));
                results.push(JsonDoc {
                    id: id.clone(),
                    body: with_id(value, &id),
                });
            }

            if opts.recursive {
                for sub in dirs {
                    queue.push_back(format!("{dir}{}/", sub.name));
                }
            }
        }

        Ok(results)
    }
}

/// Sets `_id` in a parsed document body to `id` (the API-facing shortId),
/// overriding whatever fullDocPath-shaped `_id` was persisted on disk (spec
/// §4.4 "on read: the API returns `_id = shortId`").
fn with_id(mut value: Value, id: &str) -> Value {
    if let Value::Object(map) = &mut value {
        map.insert("_id".to_string(), Value::String(id.to_string()));
    }
    value
}

/// Splits `full_path` into `(parent_dir_with_trailing_slash, file_name)`.
fn split_parent(full_path: &str) -> (&str, &str) {
    match full_path.rfind('/') {
        Some(idx) => (&full_path[..=idx], &full_path[idx + 1..]),
        None => ("", full_path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::gix_backend::GixBackend;
    use tempfile::TempDir;

    fn store() -> (TempDir, DocumentStore) {
        let dir = TempDir::new().unwrap();
        let backend = GixBackend::init(dir.path(), "main").unwrap();
        let identity = Identity::new("Test User", "test@example.com");
        let store = DocumentStore::new(std::sync::Arc::new(backend), "main", identity);
        (dir, store)
    }

    #[test]
    fn insert_then_get_round_trips_shortid() {
        let (_dir, store) = store();
        let body = serde_json::json!({"flower": "cherry blossoms"});
        let result = store
            .put_json("nara", "nara.json", "nara", body, PutMode::InsertOnly, None)
            .unwrap();
        assert_eq!(result.id, "nara");

        let doc = store.get("nara", "nara.json").unwrap().unwrap();
        assert_eq!(doc.id, "nara");
        assert_eq!(doc.body["_id"], "nara");
        assert_eq!(doc.body["flower"], "cherry blossoms");
    }

    #[test]
    fn insert_twice_fails_with_same_id_exists() {
        let (_dir, store) = store();
        let body = serde_json::json!({"flower": "a"});
        store
            .put_json("nara", "nara.json", "nara", body.clone(), PutMode::InsertOnly, None)
            .unwrap();
        let err = store
            .put_json("nara", "nara.json", "nara", body, PutMode::InsertOnly, None)
            .unwrap_err();
        assert!(matches!(err, GdbError::Crud(CrudError::SameIdExists { .. })));
    }

    #[test]
    fn update_missing_fails_with_document_not_found() {
        let (_dir, store) = store();
        let body = serde_json::json!({"flower": "a"});
        let err = store
            .put_json("nara", "nara.json", "nara", body, PutMode::UpdateOnly, None)
            .unwrap_err();
        assert!(matches!(err, GdbError::Crud(CrudError::DocumentNotFound { .. })));
    }

    #[test]
    fn delete_then_get_returns_none_and_cannot_delete_twice() {
        let (_dir, store) = store();
        let body = serde_json::json!({"flower": "a"});
        store
            .put_json("nara", "nara.json", "nara", body, PutMode::InsertOnly, None)
            .unwrap();
        store.delete("nara", "nara.json", None).unwrap();
        assert!(store.get("nara", "nara.json").unwrap().is_none());
        assert!(store.delete("nara", "nara.json", None).is_err());
    }

    #[test]
    fn history_collapses_consecutive_duplicates_and_drops_leading_absence() {
        let (_dir, store) = store();
        let body1 = serde_json::json!({"flower": "a"});
        let r1 = store
            .put_json("nara", "nara.json", "nara", body1, PutMode::InsertOnly, None)
            .unwrap();
        let body2 = serde_json::json!({"flower": "b"});
        let r2 = store
            .put_json("nara", "nara.json", "nara", body2, PutMode::UpdateOnly, None)
            .unwrap();

        let filter = CommitFilter::default();
        let history = store
            .get_history("nara", "nara.json", DocType::Json, &filter)
            .unwrap();

        assert_eq!(history.len(), 2);
        assert_eq!(history[0].as_ref().unwrap().file_oid, r2.file_oid);
        assert_eq!(history[1].as_ref().unwrap().file_oid, r1.file_oid);
    }

    #[test]
    fn find_returns_documents_sorted_ascending_by_id() {
        let (_dir, store) = store();
        for id in ["b", "a", "c"] {
            let body = serde_json::json!({"v": id});
            store
                .put_json(id, &format!("{id}.json"), id, body, PutMode::InsertOnly, None)
                .unwrap();
        }
        let opts = FindOptions::new();
        let docs = store.find(&opts).unwrap();
        let ids: Vec<&str> = docs.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }
}
