//! Typed error taxonomy (spec §7).
//!
//! Mirrors `git-issue`'s `StorageError` / `GitError` split: a narrow,
//! backend-facing error type is wrapped by a broader public one via
//! `#[from]`, so callers never have to match on strings. Nothing here is
//! allowed to degrade into a generic "something went wrong" — every
//! documented failure mode in spec §7 gets its own variant.

use thiserror::Error;

/// Top-level error returned by every public `gitdocumentdb` operation.
#[derive(Error, Debug)]
pub enum GdbError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Crud(#[from] CrudError),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    Git(#[from] GitBackendError),

    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Input-validation failures (spec §4.1, §7 "Input validation").
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("database name is required")]
    UndefinedDatabaseName,

    #[error("invalid character in database name: {name:?}")]
    InvalidDbNameCharacter { name: String },

    #[error("invalid character in local directory path: {path:?}")]
    InvalidLocalDirCharacter { path: String },

    #[error("invalid character in collection path: {path:?}")]
    InvalidCollectionPathCharacter { path: String },

    #[error("collection path length {len} is outside the allowed range [{min}, {max}]")]
    InvalidCollectionPathLength { len: usize, min: usize, max: usize },

    #[error("working directory path length {len} exceeds the maximum of {max}")]
    InvalidWorkingDirectoryPathLength { len: usize, max: usize },

    #[error("invalid character in document id: {id:?}")]
    InvalidIdCharacter { id: String },

    #[error("document id length {len} is outside the allowed range [{min}, {max}]")]
    InvalidIdLength { len: usize, min: usize, max: usize },

    #[error("invalid property name in document: {name:?} (property names must not start with '_' except '_id' and '_deleted')")]
    InvalidPropertyNameInDocument { name: String },

    #[error("document is missing a required '_id' field")]
    UndefinedDocumentId,

    #[error("blob at path {path:?} could not be parsed as a JSON object: {message}")]
    InvalidJsonObject { path: String, message: String },
}

/// Lifecycle / task-queue state failures (spec §7 "State").
#[derive(Error, Debug)]
pub enum StateError {
    #[error("database is closing; no new operations may be submitted")]
    DatabaseClosing,

    #[error("database close timed out after {timeout_ms}ms waiting for the task queue to drain")]
    DatabaseCloseTimeout { timeout_ms: u64 },

    #[error("repository is not open")]
    RepositoryNotOpen,

    #[error("database handle is undefined or already closed")]
    UndefinedDb,

    #[error("task was canceled before it ran")]
    TaskCancel,

    #[error("sync interval must be at least 1000ms, got {interval_ms}ms")]
    IntervalTooSmall { interval_ms: u64 },
}

/// CRUD failures (spec §7 "CRUD").
#[derive(Error, Debug)]
pub enum CrudError {
    #[error("document not found: {id}")]
    DocumentNotFound { id: String },

    #[error("a document already exists at id: {id}")]
    SameIdExists { id: String },

    #[error("could not create directory for path {path:?}: {message}")]
    CannotCreateDirectory { path: String, message: String },

    #[error("could not write document data for {path:?}: {message}")]
    CannotWriteData { path: String, message: String },

    #[error("could not delete document data for {path:?}: {message}")]
    CannotDeleteData { path: String, message: String },
}

/// Remote / sync failures (spec §7 "Remote").
#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("remote URL is required")]
    UndefinedRemoteURL,

    #[error("invalid URL format: {url:?}")]
    InvalidURLFormat { url: String },

    #[error("remote URL must use http:// or https://: {url:?}")]
    HttpProtocolRequired { url: String },

    #[error("invalid repository URL: {url:?}")]
    InvalidRepositoryURL { url: String },

    #[error("could not resolve host: {host:?}")]
    UnresolvedHost { host: String },

    #[error("remote repository not found: {url:?}")]
    RemoteRepositoryNotFound { url: String },

    #[error("a remote is already registered under the name {name:?}")]
    RemoteAlreadyRegistered { name: String },

    #[error("could not create remote repository: {message}")]
    CannotCreateRemoteRepository { message: String },

    #[error("invalid SSH key path: {path:?}")]
    InvalidSSHKeyPath { path: String },

    #[error("invalid SSH key format")]
    InvalidSSHKeyFormat,

    #[error("personal access token is required for connection.type = \"github\"")]
    UndefinedPersonalAccessToken,

    #[error("invalid authentication type: {kind:?}")]
    InvalidAuthenticationType { kind: String },

    #[error("push or sync requires authentication but none was configured")]
    AuthNeededForPushOrSync,

    #[error("push authentication failed")]
    PushAuthentication,

    #[error("push was denied: insufficient permission")]
    PushPermissionDenied,

    #[error("cannot push: unfetched remote commits exist")]
    CannotPushBecauseUnfetchedCommitExists,

    #[error("no merge base found between local and remote history")]
    NoMergeBaseFound,

    #[error("sync worker fetch failed: {message}")]
    SyncWorkerFetch { message: String },

    #[error("HTTP request timed out after {timeout_ms}ms")]
    HttpTimeout { timeout_ms: u64 },

    #[error("socket timed out")]
    SocketTimeout,

    #[error("network error: {message}")]
    HttpNetwork { message: String },
}

/// Errors surfaced by the abstract Git Backend (spec §6).
#[derive(Error, Debug)]
pub enum GitBackendError {
    #[error("repository not found at {path:?}")]
    RepositoryNotFound { path: String },

    #[error("failed to initialize repository at {path:?}: {message}")]
    InitializationFailed { path: String, message: String },

    #[error("object not found: {oid}")]
    ObjectNotFound { oid: String },

    #[error("reference not found: {name}")]
    ReferenceNotFound { name: String },

    #[error("reference update failed for {name}: {message}")]
    ReferenceUpdateFailed { name: String, message: String },

    #[error("failed to write object: {message}")]
    ObjectWriteFailed { message: String },

    #[error("failed to read object {oid}: {message}")]
    ObjectReadFailed { oid: String, message: String },

    #[error("commit creation failed: {message}")]
    CommitFailed { message: String },

    #[error("transport error: {0}")]
    Transport(#[from] RemoteError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

pub type GdbResult<T> = Result<T, GdbError>;
