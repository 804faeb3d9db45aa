//! `RemoteOptions` (spec §6): the Sync Engine's source-of-truth
//! configuration, with the defaults spec §6's table specifies.

use std::collections::HashSet;

use crate::error::{GdbError, RemoteError, StateError};
use crate::merge::ConflictResolutionStrategy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionType {
    #[default]
    None,
    Github,
    Ssh,
}

#[derive(Debug, Clone, Default)]
pub struct ConnectionOptions {
    pub kind: ConnectionType,
    pub engine: Option<String>,
    pub personal_access_token: Option<String>,
    pub public_key_path: Option<String>,
    pub private_key_path: Option<String>,
    pub pass_phrase: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncDirection {
    #[default]
    Pull,
    Push,
    Both,
}

/// Overrides the default "fail with `NoMergeBaseFound`" behavior when the
/// two histories share no common ancestor (spec §4.7 step 2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BehaviorForNoMergeBase {
    Nop,
    Theirs,
    Ours,
}

#[derive(Debug, Clone, Default)]
pub struct JsonSchemaOptions {
    pub plain_text_properties: HashSet<String>,
}

#[derive(Debug, Clone, Default)]
pub struct SchemaOptions {
    pub json: JsonSchemaOptions,
}

#[derive(Debug, Clone)]
pub struct RemoteOptions {
    pub live: bool,
    pub remote_url: String,
    pub interval_ms: u64,
    pub retry: u32,
    pub retry_interval_ms: u64,
    pub connection: ConnectionOptions,
    pub sync_direction: SyncDirection,
    pub conflict_resolution_strategy: Option<ConflictResolutionStrategy>,
    pub behavior_for_no_merge_base: Option<BehaviorForNoMergeBase>,
    pub include_commits: bool,
    pub schema: SchemaOptions,
}

impl RemoteOptions {
    pub fn new(remote_url: impl Into<String>) -> Self {
        Self {
            live: false,
            remote_url: remote_url.into(),
            interval_ms: 10_000,
            retry: 2,
            retry_interval_ms: 3_000,
            connection: ConnectionOptions::default(),
            sync_direction: SyncDirection::default(),
            conflict_resolution_strategy: Some(ConflictResolutionStrategy::OursDiff),
            behavior_for_no_merge_base: Some(BehaviorForNoMergeBase::Nop),
            include_commits: false,
            schema: SchemaOptions::default(),
        }
    }

    /// Validates the combination the spec calls out explicitly: an empty
    /// URL, too-small an interval, and authentication fields missing for
    /// the declared `connection.type` (spec §6, §7).
    pub fn validate(&self) -> Result<(), GdbError> {
        if self.remote_url.is_empty() {
            return Err(RemoteError::UndefinedRemoteURL.into());
        }
        if self.interval_ms < 1000 {
            return Err(StateError::IntervalTooSmall {
                interval_ms: self.interval_ms,
            }
            .into());
        }
        match self.connection.kind {
            ConnectionType::Github if self.connection.personal_access_token.is_none() => {
                return Err(RemoteError::UndefinedPersonalAccessToken.into());
            }
            ConnectionType::Ssh
                if self.connection.public_key_path.is_none() || self.connection.private_key_path.is_none() =>
            {
                return Err(RemoteError::InvalidSSHKeyPath {
                    path: self
                        .connection
                        .public_key_path
                        .clone()
                        .unwrap_or_default(),
                }
                .into());
            }
            _ => {}
        }
        Ok(())
    }
}
