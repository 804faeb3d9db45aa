//! The Sync Engine (spec §4.7): fetch → classify → merge → push, one
//! [`Synchronizer`] per remote URL.

pub mod engine;
pub mod options;
pub mod result;

pub use engine::{Synchronizer, SyncState};
pub use options::{
    BehaviorForNoMergeBase, ConnectionOptions, ConnectionType, JsonSchemaOptions, RemoteOptions, SchemaOptions,
    SyncDirection,
};
pub use result::{ChangeSet, CommitSet, SyncAction, SyncResult};
