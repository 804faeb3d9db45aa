//! Collection (spec §4.4): a namespaced view over the Document Store with
//! shortId ↔ fullDocPath translation.

use std::sync::Arc;

use serde_json::Value;

use crate::backend::{CommitFilter, EntryKind, GitBackend};
use crate::document::{DocType, DocumentStore, FatDoc, FindOptions, JsonDoc, PutMode, WriteResult};
use crate::error::{GdbError, ValidationError};
use crate::task_queue::TaskQueue;
use crate::validator;

/// The reserved metadata directory `enumerateSubCollections` must not
/// surface as a subcollection (spec §4.4, §6 persisted-state layout).
const METADATA_DIR: &str = ".gitddb";

/// A namespaced view over the [`DocumentStore`] (spec §4.4). Mutating calls
/// (`put`/`insert`/`update`/`delete`) are submitted through the shared
/// [`TaskQueue`] so every write across every collection of one database is
/// strictly serialized (spec §4.5); reads run directly against HEAD and
/// never enqueue.
pub struct Collection {
    store: Arc<DocumentStore>,
    backend: Arc<dyn GitBackend>,
    queue: TaskQueue,
    default_branch_ref: String,
    collection_path: String,
    is_json_doc_collection: bool,
    name_prefix: Option<String>,
}

impl Collection {
    pub fn new(
        store: Arc<DocumentStore>,
        backend: Arc<dyn GitBackend>,
        queue: TaskQueue,
        default_branch_ref: &str,
        collection_path: &str,
        is_json_doc_collection: bool,
        name_prefix: Option<String>,
    ) -> Result<Self, GdbError> {
        let normalized = validator::normalize_collection_path(collection_path);
        validator::validate_collection_path(&normalized)?;
        Ok(Self {
            store,
            backend,
            queue,
            default_branch_ref: default_branch_ref.to_string(),
            collection_path: normalized,
            is_json_doc_collection,
            name_prefix,
        })
    }

    pub fn collection_path(&self) -> &str {
        &self.collection_path
    }

    /// `fullDocPath = collectionPath + shortId + ".json"` for JSON
    /// collections, `collectionPath + shortId` otherwise (spec §4.4).
    fn full_path(&self, short_id: &str) -> String {
        if self.is_json_doc_collection && !short_id.ends_with(".json") {
            format!("{}{}.json", self.collection_path, short_id)
        } else {
            format!("{}{}", self.collection_path, short_id)
        }
    }

    /// The `_id` embedded in the persisted JSON: the fullDocPath without a
    /// trailing `.json` (spec §4.4).
    fn full_id(&self, short_id: &str) -> String {
        format!("{}{}", self.collection_path, short_id)
    }

    fn doc_type_of(&self, short_id: &str) -> DocType {
        if self.is_json_doc_collection || short_id.ends_with(".json") {
            DocType::Json
        } else {
            DocType::Text
        }
    }

    fn resolve_id(&self, id: Option<&str>) -> Result<String, GdbError> {
        match id {
            Some(id) => {
                validator::validate_id(id)?;
                Ok(id.to_string())
            }
            None => {
                let prefix = self
                    .name_prefix
                    .as_deref()
                    .ok_or(ValidationError::UndefinedDocumentId)?;
                Ok(self.store.generate_auto_id(prefix))
            }
        }
    }

    fn body_id(body: &Value) -> Option<String> {
        body.get("_id").and_then(Value::as_str).map(str::to_string)
    }

    /// `put(id, body)` (spec §4.3): insert-or-update. `id` may be omitted in
    /// `body._id` if this collection has a `namePrefix`. Enqueued through
    /// the Task Queue (spec §4.5) — resolves in submission order relative
    /// to every other write on this database.
    pub async fn put(&self, body: Value, message_template: Option<&str>) -> Result<WriteResult, GdbError> {
        self.write("put", body, PutMode::Upsert, message_template).await
    }

    pub async fn insert(&self, body: Value, message_template: Option<&str>) -> Result<WriteResult, GdbError> {
        self.write("insert", body, PutMode::InsertOnly, message_template).await
    }

    pub async fn update(&self, body: Value, message_template: Option<&str>) -> Result<WriteResult, GdbError> {
        self.write("update", body, PutMode::UpdateOnly, message_template).await
    }

    async fn write(
        &self,
        label: &str,
        body: Value,
        mode: PutMode,
        message_template: Option<&str>,
    ) -> Result<WriteResult, GdbError> {
        let id = self.resolve_id(Self::body_id(&body).as_deref())?;
        let full_path = self.full_path(&id);
        let full_id = self.full_id(&id);
        let store = Arc::clone(&self.store);
        let message_template = message_template.map(str::to_string);
        self.queue
            .enqueue(label, move || {
                store.put_json(&id, &full_path, &full_id, body, mode, message_template.as_deref())
            })
            .await
    }

    /// `put(id, text)` on a generic (non-JSON) collection (spec §4.4): writes
    /// `text` verbatim as UTF-8 bytes, with no JSON canonicalization.
    pub async fn put_text(&self, id: &str, text: &str, message_template: Option<&str>) -> Result<WriteResult, GdbError> {
        self.write_raw(id, text.as_bytes().to_vec(), message_template).await
    }

    /// `put(id, bytes)` on a generic (non-JSON) collection (spec §4.4): writes
    /// a raw byte buffer verbatim.
    pub async fn put_binary(&self, id: &str, bytes: Vec<u8>, message_template: Option<&str>) -> Result<WriteResult, GdbError> {
        self.write_raw(id, bytes, message_template).await
    }

    async fn write_raw(&self, id: &str, bytes: Vec<u8>, message_template: Option<&str>) -> Result<WriteResult, GdbError> {
        validator::validate_id(id)?;
        let full_path = self.full_path(id);
        let store = Arc::clone(&self.store);
        let id = id.to_string();
        let message_template = message_template.map(str::to_string);
        self.queue
            .enqueue("put_raw", move || {
                store.put_raw(&id, &full_path, bytes, PutMode::Upsert, message_template.as_deref())
            })
            .await
    }

    pub async fn delete(&self, id: &str, message_template: Option<&str>) -> Result<WriteResult, GdbError> {
        validator::validate_id(id)?;
        let full_path = self.full_path(id);
        let store = Arc::clone(&self.store);
        let id = id.to_string();
        let message_template = message_template.map(str::to_string);
        self.queue
            .enqueue("delete", move || store.delete(&id, &full_path, message_template.as_deref()))
            .await
    }

    pub fn get(&self, id: &str) -> Result<Option<JsonDoc>, GdbError> {
        validator::validate_id(id)?;
        self.store.get(id, &self.full_path(id))
    }

    pub fn get_fat_doc(&self, id: &str) -> Result<Option<FatDoc>, GdbError> {
        validator::validate_id(id)?;
        self.store.get_fat_doc(id, &self.full_path(id), self.doc_type_of(id))
    }

    pub fn get_history(&self, id: &str, filter: &CommitFilter) -> Result<Vec<Option<FatDoc>>, GdbError> {
        validator::validate_id(id)?;
        self.store
            .get_history(id, &self.full_path(id), self.doc_type_of(id), filter)
    }

    pub fn get_back_number(
        &self,
        id: &str,
        n: usize,
        filter: &CommitFilter,
    ) -> Result<Option<FatDoc>, GdbError> {
        validator::validate_id(id)?;
        self.store
            .get_back_number(id, &self.full_path(id), self.doc_type_of(id), n, filter)
    }

    /// `find(opts)` (spec §4.3), scoped to this collection's path. The
    /// Document Store returns ids relative to its own root; here they are
    /// re-expressed relative to this collection so the API-facing shortId
    /// excludes the `collectionPath` prefix (spec §4.4).
    pub fn find(&self, mut opts: FindOptions) -> Result<Vec<JsonDoc>, GdbError> {
        let scoped_prefix = format!("{}{}", self.collection_path, opts.prefix.take().unwrap_or_default());
        opts.prefix = Some(scoped_prefix);
        let mut docs = self.store.find(&opts)?;

        let strip_len = self.collection_path.len();
        for doc in &mut docs {
            doc.id = doc.id.get(strip_len..).unwrap_or(&doc.id).to_string();
            if let Value::Object(map) = &mut doc.body {
                map.insert("_id".to_string(), Value::String(doc.id.clone()));
            }
        }
        Ok(docs)
    }

    /// `enumerateSubCollections(root)` (spec §4.4): reads the HEAD tree at
    /// `root` and returns one [`Collection`] per subtree, excluding the
    /// reserved metadata directory.
    pub fn enumerate_sub_collections(&self, root: &str) -> Result<Vec<Collection>, GdbError> {
        let Some(head) = self.backend.resolve_ref(&self.default_branch_ref)? else {
            return Ok(Vec::new());
        };
        let root_path = format!("{}{}", self.collection_path, validator::normalize_collection_path(root));
        let entries = match self.backend.read_tree(head, &root_path) {
            Ok(entries) => entries,
            Err(_) => return Ok(Vec::new()),
        };

        let mut subs = Vec::new();
        for entry in entries {
            if entry.kind != EntryKind::Tree || entry.name == METADATA_DIR {
                continue;
            }
            let path = format!("{root_path}{}", entry.name);
            subs.push(Collection::new(
                Arc::clone(&self.store),
                Arc::clone(&self.backend),
                self.queue.clone(),
                &self.default_branch_ref,
                &path,
                self.is_json_doc_collection,
                self.name_prefix.clone(),
            )?);
        }
        Ok(subs)
    }
}

#[cfg(test)]
mod tests {
    use crate::backend::CommitFilter;
    use crate::document::DocType;
    use crate::testutil::temp_db;

    #[tokio::test]
    async fn generic_collection_round_trips_utf8_text() {
        let (_dir, db) = temp_db("nara-db").await;
        let notes = db.generic_collection("notes/").unwrap();

        notes.put_text("kasuga", "Kasuga Taisha, founded 768 CE.", None).await.unwrap();

        let fat = notes.get_fat_doc("kasuga").unwrap().expect("document exists");
        assert_eq!(fat.doc_type, DocType::Text);
        match fat.doc {
            crate::document::DocBody::Text(text) => assert_eq!(text, "Kasuga Taisha, founded 768 CE."),
            other => panic!("expected Text body, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn generic_collection_round_trips_non_utf8_bytes_as_binary() {
        let (_dir, db) = temp_db("nara-db").await;
        let blobs = db.generic_collection("blobs/").unwrap();
        let raw = vec![0xFF, 0xFE, 0x00, 0xD8, 0x4A, 0x50];

        blobs.put_binary("thumb", raw.clone(), None).await.unwrap();

        let fat = blobs.get_fat_doc("thumb").unwrap().expect("document exists");
        assert_eq!(fat.doc_type, DocType::Binary);
        match fat.doc {
            crate::document::DocBody::Binary(bytes) => assert_eq!(bytes, raw),
            other => panic!("expected Binary body, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn put_text_twice_updates_in_place() {
        let (_dir, db) = temp_db("nara-db").await;
        let notes = db.generic_collection("notes/").unwrap();

        notes.put_text("todo", "first draft", None).await.unwrap();
        notes.put_text("todo", "second draft", None).await.unwrap();

        let fat = notes.get_fat_doc("todo").unwrap().expect("document exists");
        match fat.doc {
            crate::document::DocBody::Text(text) => assert_eq!(text, "second draft"),
            other => panic!("expected Text body, got {other:?}"),
        }
        assert_eq!(notes.get_history("todo", &CommitFilter::default()).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn enumerate_sub_collections_excludes_metadata_dir() {
        let (_dir, db) = temp_db("nara-db").await;
        db.collection("parks/nara/").unwrap().put(serde_json::json!({"_id": "deer"}), None).await.unwrap();
        db.collection("parks/kyoto/").unwrap().put(serde_json::json!({"_id": "maple"}), None).await.unwrap();

        let mut names: Vec<String> = db
            .root()
            .enumerate_sub_collections("parks/")
            .unwrap()
            .into_iter()
            .map(|c| c.collection_path().to_string())
            .collect();
        names.sort();

        assert_eq!(names, vec!["parks/kyoto/".to_string(), "parks/nara/".to_string()]);
    }
}
