//! The document envelope types (spec §3 `JsonDoc`, `FatDoc`).

use crate::backend::Oid;
use serde_json::Value;

/// The kind of payload stored at a `fullDocPath` (spec §4.4 generic
/// collections accept JSON, text, or raw bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocType {
    Json,
    Text,
    Binary,
}

/// A parsed JSON document as returned by the public API: `_id` is always the
/// shortId, never the fullDocPath (spec §4.4 translation rules).
#[derive(Debug, Clone, PartialEq)]
pub struct JsonDoc {
    pub id: String,
    pub body: Value,
}

/// The envelope `{_id, name, type, fileOid, doc}` (spec §3 `FatDoc`).
#[derive(Debug, Clone)]
pub struct FatDoc {
    pub id: String,
    pub name: String,
    pub doc_type: DocType,
    pub file_oid: Oid,
    pub doc: DocBody,
}

/// The payload carried by a [`FatDoc`], shaped by [`DocType`].
#[derive(Debug, Clone)]
pub enum DocBody {
    Json(Value),
    Text(String),
    Binary(Vec<u8>),
}

/// The result of a single write operation (spec §4.3 `put`/`insert`/
/// `update`/`delete`).
#[derive(Debug, Clone)]
pub struct WriteResult {
    pub id: String,
    pub file_oid: Oid,
    pub commit: Oid,
}

/// A single file-level change produced by a merge or sync (spec §4.6, §6
/// `ChangedFile`).
#[derive(Debug, Clone)]
pub struct ChangedFile {
    pub operation: ChangeOperation,
    pub old: Option<FatDoc>,
    pub new: Option<FatDoc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOperation {
    Insert,
    Update,
    Delete,
}

/// One entry of `find(opts)` / history traversal filtering (spec §4.3:
/// `recursive` defaults to `true`).
#[derive(Debug, Clone)]
pub struct FindOptions {
    pub prefix: Option<String>,
    pub recursive: bool,
    pub descending: bool,
}

impl FindOptions {
    pub fn new() -> Self {
        Self {
            prefix: None,
            recursive: true,
            descending: false,
        }
    }
}

impl Default for FindOptions {
    fn default() -> Self {
        Self::new()
    }
}
