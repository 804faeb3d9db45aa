//! The Document Store (spec §4.3): file-layout mapping, CRUD, and history
//! traversal over a Git Backend.

pub mod store;
pub mod types;

pub use store::{DocumentStore, PutMode};
pub use types::{ChangeOperation, ChangedFile, DocBody, DocType, FatDoc, FindOptions, JsonDoc, WriteResult};
