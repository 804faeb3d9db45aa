//! The abstract Git Backend interface (spec §6).
//!
//! `GitBackend` is the single boundary between the core engine and Git
//! plumbing. It intentionally carries no `gix` (or `git2`, or CLI) types in
//! its public vocabulary — concrete backends translate at the edge — so a
//! future "native", "pure", or "remote-worker" backend (spec §9 design note)
//! can be swapped in by constructing a different implementation and handing
//! it to [`crate::database::Database::open`], never by touching the engine.
//!
//! The one implementation shipped here, [`gix_backend::GixBackend`], covers
//! object/ref/tree plumbing with `gix` and shells out to the `git` binary
//! for fetch/push — the same split a production gix-backed tool makes,
//! because gix does not yet offer a mature high-level push API.

pub mod gix_backend;

use crate::error::GitBackendError;
use crate::identity::Signature;
use std::fmt;
use std::str::FromStr;

/// A Git object identifier (SHA-1, 20 bytes), stored as raw bytes for cheap
/// `Copy`/`Eq`/`Hash` and displayed as 40 lowercase hex characters.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Oid([u8; 20]);

impl Oid {
    pub const fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    pub const fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// First 7 hex characters — used for `<%file_oid%>` commit message
    /// templating (spec §4.3) and short display.
    pub fn short(&self) -> String {
        self.to_string()[..7].to_string()
    }
}

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Oid({self})")
    }
}

impl FromStr for Oid {
    type Err = GitBackendError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 40 {
            return Err(GitBackendError::ObjectReadFailed {
                oid: s.to_string(),
                message: format!("expected 40 hex characters, got {}", s.len()),
            });
        }
        let mut bytes = [0u8; 20];
        for (i, chunk) in s.as_bytes().chunks(2).enumerate() {
            let byte = u8::from_str_radix(std::str::from_utf8(chunk).unwrap_or(""), 16).map_err(
                |_| GitBackendError::ObjectReadFailed {
                    oid: s.to_string(),
                    message: "invalid hex digit".to_string(),
                },
            )?;
            bytes[i] = byte;
        }
        Ok(Self(bytes))
    }
}

/// One entry of a Git tree listing (spec §6 `readTree`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub name: String,
    pub kind: EntryKind,
    pub oid: Oid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Blob,
    Tree,
}

/// A single change to apply to a tree in one atomic edit (spec §6
/// `stage`/`unstage`, generalized to a batch so a whole write task commits
/// as one tree-editor transaction — spec §5 atomicity).
#[derive(Debug, Clone)]
pub enum TreeChange {
    /// Write (or overwrite) the blob at `path`.
    Upsert { path: String, oid: Oid },
    /// Remove whatever is at `path`, pruning any parent directory left empty.
    Remove { path: String },
}

/// A normalized commit (spec §3 `NormalizedCommit`).
#[derive(Debug, Clone)]
pub struct NormalizedCommit {
    pub oid: Oid,
    pub message: String,
    pub parents: Vec<Oid>,
    pub author: Signature,
    pub committer: Signature,
}

/// A filter clause matched against a commit's author/committer (spec §4.3
/// "Filters").
#[derive(Debug, Clone, Default)]
pub struct CommitFilterClause {
    pub author_name: Option<String>,
    pub author_email: Option<String>,
    pub committer_name: Option<String>,
    pub committer_email: Option<String>,
}

impl CommitFilterClause {
    pub fn matches(&self, commit: &NormalizedCommit) -> bool {
        if let Some(name) = &self.author_name {
            if &commit.author.name != name {
                return false;
            }
        }
        if let Some(email) = &self.author_email {
            if &commit.author.email != email {
                return false;
            }
        }
        if let Some(name) = &self.committer_name {
            if &commit.committer.name != name {
                return false;
            }
        }
        if let Some(email) = &self.committer_email {
            if &commit.committer.email != email {
                return false;
            }
        }
        true
    }
}

/// A disjunction of [`CommitFilterClause`]s: a commit matches if it
/// satisfies any one clause.
#[derive(Debug, Clone, Default)]
pub struct CommitFilter(pub Vec<CommitFilterClause>);

impl CommitFilter {
    pub fn matches(&self, commit: &NormalizedCommit) -> bool {
        self.0.is_empty() || self.0.iter().any(|clause| clause.matches(commit))
    }
}

/// Outcome of a push attempt (spec §6 transport error classification,
/// narrowed to what the Sync Engine needs to decide a retry).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    Ok,
    /// The remote has commits the local side has not fetched —
    /// `CannotPushBecauseUnfetchedCommitExists` (spec §4.7 step 4).
    RemoteHasUnfetchedCommits,
}

/// The abstract Git Backend (spec §6). Object-safe: callers use
/// `Box<dyn GitBackend>` so the concrete backend is chosen once, at
/// construction time (spec §9 "Dynamic dispatch over Git backends").
pub trait GitBackend: Send + Sync {
    /// Path to the repository's working directory.
    fn workdir(&self) -> &std::path::Path;

    /// Hashes `bytes` as a blob without writing it to the object database.
    fn hash_blob(&self, bytes: &[u8]) -> Oid;

    /// Writes `bytes` as a blob object, returning its oid.
    fn write_blob(&self, bytes: &[u8]) -> Result<Oid, GitBackendError>;

    /// Reads a blob's content by oid.
    fn read_blob(&self, oid: Oid) -> Result<Vec<u8>, GitBackendError>;

    /// Lists the direct children of `path` within the tree of `commit`.
    /// `path = ""` lists the tree root.
    fn read_tree(&self, commit: Oid, path: &str) -> Result<Vec<TreeEntry>, GitBackendError>;

    /// Resolves a ref (e.g. `refs/heads/main`) to the oid it currently
    /// points at, or `None` if the ref does not exist.
    fn resolve_ref(&self, name: &str) -> Result<Option<Oid>, GitBackendError>;

    /// Applies `changes` to the tree of `base_commit` (or an empty tree if
    /// `None`) and returns the oid of the resulting tree. Does not create a
    /// commit or move any ref — the whole batch is one tree-editor
    /// transaction, so it either fully applies or fails without partial
    /// effect (spec §5 atomicity).
    fn apply_tree_changes(
        &self,
        base_commit: Option<Oid>,
        changes: &[TreeChange],
    ) -> Result<Oid, GitBackendError>;

    /// Creates a commit object (does not move any ref).
    fn commit(
        &self,
        tree: Oid,
        parents: &[Oid],
        author: &Signature,
        committer: &Signature,
        message: &str,
    ) -> Result<Oid, GitBackendError>;

    /// Moves `ref_name` to `new_oid`, failing if its current value is not
    /// `expected` (compare-and-swap; `expected = None` means "must not
    /// exist yet").
    fn update_ref(
        &self,
        ref_name: &str,
        new_oid: Oid,
        expected: Option<Oid>,
    ) -> Result<(), GitBackendError>;

    /// Lists commits reachable from `from` down to (but not including)
    /// `to`, newest first. `to = None` walks to the root.
    fn list_commits(&self, from: Oid, to: Option<Oid>) -> Result<Vec<NormalizedCommit>, GitBackendError>;

    /// Reads a single commit's metadata.
    fn read_commit(&self, oid: Oid) -> Result<NormalizedCommit, GitBackendError>;

    /// The most recent common ancestor of `a` and `b`, or `None` if their
    /// histories share no ancestor.
    fn merge_base(&self, a: Oid, b: Oid) -> Result<Option<Oid>, GitBackendError>;

    /// `true` if `ancestor` is reachable from `descendant`.
    fn is_ancestor(&self, ancestor: Oid, descendant: Oid) -> Result<bool, GitBackendError>;

    /// Adds or retargets the `origin`-style remote named `name`.
    fn ensure_remote(&self, name: &str, url: &str) -> Result<(), GitBackendError>;

    fn remote_url(&self, name: &str) -> Result<Option<String>, GitBackendError>;

    /// Fetches `refspec` from `remote`, subject to `timeout_ms`.
    fn fetch(&self, remote: &str, refspec: &str, timeout_ms: u64) -> Result<(), GitBackendError>;

    /// Pushes `refspec` to `remote`, subject to `timeout_ms`.
    fn push(&self, remote: &str, refspec: &str, timeout_ms: u64) -> Result<PushOutcome, GitBackendError>;

    /// Records `upstreamRef` as the upstream of `branch`.
    fn set_upstream(&self, branch: &str, upstream_ref: &str) -> Result<(), GitBackendError>;
}
