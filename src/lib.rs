//! GitDocumentDB core: an offline-first JSON document store that uses a Git
//! repository as its persistence layer. Each document is a file in a
//! working tree; each write is a commit; replication is ordinary Git
//! push/pull with automatic merge-conflict resolution at the JSON-property
//! level.
//!
//! This crate is the core engine — the serialized Task Queue, the
//! Collection/Document Store CRUD layer, and the Sync Engine — consuming
//! an abstract [`backend::GitBackend`] rather than depending on any one Git
//! plumbing library outside of the single reference implementation shipped
//! in [`backend::gix_backend`]. It carries no CLI, no example programs, and
//! no concrete remote-authentication transport: those are left to the
//! embedding application, exactly as the source system's own core does.

pub mod backend;
pub mod collection;
pub mod database;
pub mod document;
pub mod error;
pub mod events;
pub mod identity;
pub mod json_normalizer;
pub mod merge;
pub mod sync;
pub mod task_queue;
pub mod validator;

#[cfg(test)]
pub(crate) mod testutil;

pub use collection::Collection;
pub use database::{Database, DatabaseOpenOptions, DbInfo, OpenResult};
pub use document::{ChangeOperation, ChangedFile, DocBody, DocType, FatDoc, FindOptions, JsonDoc, WriteResult};
pub use error::{GdbError, GdbResult};
pub use identity::{Identity, Signature};
pub use sync::{RemoteOptions, SyncAction, SyncResult, Synchronizer};
