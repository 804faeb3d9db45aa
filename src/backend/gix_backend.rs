//! The `gix`-backed [`GitBackend`] implementation.
//!
//! Object, ref, and tree plumbing goes through `gix` directly (grounded the
//! way a production gix-backed tool does it: blob/tree/commit writes via
//! `Repository::write_object`, tree edits via `Tree::edit`, refs via
//! `Repository::reference`). Fetch and push shell out to the `git` binary —
//! the same split a production gix-backed multi-agent tool makes, because
//! gix does not yet offer a mature, stable high-level push implementation.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use log::{debug, warn};

use super::{EntryKind, GitBackend, NormalizedCommit, Oid, PushOutcome, TreeChange, TreeEntry};
use crate::error::{GitBackendError, RemoteError};
use crate::identity::Signature;

pub struct GixBackend {
    repo: gix::Repository,
    workdir: PathBuf,
}

impl GixBackend {
    /// Opens an existing repository at `path`.
    pub fn open(path: &Path) -> Result<Self, GitBackendError> {
        let repo = gix::open(path).map_err(|e| GitBackendError::RepositoryNotFound {
            path: format!("{}: {e}", path.display()),
        })?;
        let workdir = repo
            .workdir()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| path.to_path_buf());
        Ok(Self { repo, workdir })
    }

    /// Initializes a new non-bare repository at `path` with `default_branch`
    /// as its initial branch name.
    pub fn init(path: &Path, default_branch: &str) -> Result<Self, GitBackendError> {
        std::fs::create_dir_all(path)?;
        let repo = gix::init(path).map_err(|e| GitBackendError::InitializationFailed {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

        // gix::init defaults the initial branch name to "main"; rename the
        // symbolic HEAD if the caller asked for something else.
        if default_branch != "main" {
            let head_path = repo.git_dir().join("HEAD");
            std::fs::write(&head_path, format!("ref: refs/heads/{default_branch}\n"))?;
        }

        let workdir = repo
            .workdir()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| path.to_path_buf());
        Ok(Self { repo, workdir })
    }

    fn run_git(&self, args: &[&str], timeout_ms: u64) -> Result<std::process::Output, GitBackendError> {
        debug!("running git {args:?} in {}", self.workdir.display());
        let mut child = Command::new("git")
            .current_dir(&self.workdir)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let deadline = Instant::now() + Duration::from_millis(timeout_ms.max(1));
        loop {
            if let Some(status) = child.try_wait()? {
                let output = child.wait_with_output()?;
                return Ok(std::process::Output { status, ..output });
            }
            if Instant::now() >= deadline {
                let _ = child.kill();
                let _ = child.wait();
                return Err(GitBackendError::Transport(RemoteError::HttpTimeout {
                    timeout_ms,
                }));
            }
            std::thread::sleep(Duration::from_millis(25));
        }
    }
}

fn to_gix_oid(oid: Oid) -> gix::ObjectId {
    gix::ObjectId::from_bytes_or_panic(oid.as_bytes())
}

fn from_gix_oid(oid: gix::ObjectId) -> Oid {
    let bytes: [u8; 20] = oid.as_bytes().try_into().unwrap_or([0u8; 20]);
    Oid::from_bytes(bytes)
}

fn to_gix_signature(sig: &Signature) -> gix::actor::Signature {
    gix::actor::Signature {
        name: sig.name.as_str().into(),
        email: sig.email.as_str().into(),
        time: gix::date::Time::new(sig.timestamp.timestamp(), 0),
    }
}

fn from_gix_signature(sig: gix::actor::SignatureRef<'_>) -> Signature {
    use chrono::TimeZone;
    Signature {
        name: sig.name.to_string(),
        email: sig.email.to_string(),
        timestamp: chrono::Utc
            .timestamp_opt(sig.time().seconds, 0)
            .single()
            .unwrap_or_else(chrono::Utc::now),
    }
}

fn entry_kind_of(mode: gix::objs::tree::EntryMode) -> EntryKind {
    match mode.kind() {
        gix::objs::tree::EntryKind::Tree => EntryKind::Tree,
        _ => EntryKind::Blob,
    }
}

impl GitBackend for GixBackend {
    fn workdir(&self) -> &Path {
        &self.workdir
    }

    fn hash_blob(&self, bytes: &[u8]) -> Oid {
        // gix's loose-object store is content-addressed and idempotent;
        // writing twice is harmless, so hashing is implemented in terms of
        // writing.
        self.write_blob(bytes).unwrap_or(Oid::from_bytes([0; 20]))
    }

    fn write_blob(&self, bytes: &[u8]) -> Result<Oid, GitBackendError> {
        let id = self
            .repo
            .write_blob(bytes)
            .map_err(|e| GitBackendError::ObjectWriteFailed {
                message: format!("blob: {e}"),
            })?;
        Ok(from_gix_oid(id.detach()))
    }

    fn read_blob(&self, oid: Oid) -> Result<Vec<u8>, GitBackendError> {
        let gid = to_gix_oid(oid);
        let blob = self
            .repo
            .find_object(gid)
            .map_err(|e| GitBackendError::ObjectReadFailed {
                oid: oid.to_string(),
                message: e.to_string(),
            })?
            .try_into_blob()
            .map_err(|_| GitBackendError::ObjectReadFailed {
                oid: oid.to_string(),
                message: "object is not a blob".to_string(),
            })?;
        Ok(blob.data.clone())
    }

    fn read_tree(&self, commit: Oid, path: &str) -> Result<Vec<TreeEntry>, GitBackendError> {
        let commit_obj =
            self.repo
                .find_commit(to_gix_oid(commit))
                .map_err(|e| GitBackendError::ObjectReadFailed {
                    oid: commit.to_string(),
                    message: e.to_string(),
                })?;
        let mut tree = commit_obj
            .tree()
            .map_err(|e| GitBackendError::ObjectReadFailed {
                oid: commit.to_string(),
                message: format!("resolving tree: {e}"),
            })?;

        for component in path.split('/').filter(|c| !c.is_empty()) {
            let entry = tree
                .iter()
                .filter_map(Result::ok)
                .find(|e| e.inner.filename == component.as_bytes())
                .ok_or_else(|| GitBackendError::ObjectNotFound {
                    oid: format!("{path} (component {component})"),
                })?;
            tree = self
                .repo
                .find_tree(entry.inner.oid)
                .map_err(|e| GitBackendError::ObjectReadFailed {
                    oid: entry.inner.oid.to_string(),
                    message: e.to_string(),
                })?;
        }

        let mut result = Vec::new();
        for entry in tree.iter() {
            let entry = entry.map_err(|e| GitBackendError::ObjectReadFailed {
                oid: commit.to_string(),
                message: format!("decoding tree entry: {e}"),
            })?;
            result.push(TreeEntry {
                name: entry.inner.filename.to_string(),
                kind: entry_kind_of(entry.inner.mode),
                oid: from_gix_oid(entry.inner.oid),
            });
        }
        Ok(result)
    }

    fn resolve_ref(&self, name: &str) -> Result<Option<Oid>, GitBackendError> {
        let reference = self
            .repo
            .try_find_reference(name)
            .map_err(|e| GitBackendError::ReferenceUpdateFailed {
                name: name.to_string(),
                message: e.to_string(),
            })?;
        Ok(reference.and_then(|mut r| r.peel_to_id_in_place().ok().map(|id| from_gix_oid(id.detach()))))
    }

    fn apply_tree_changes(
        &self,
        base_commit: Option<Oid>,
        changes: &[TreeChange],
    ) -> Result<Oid, GitBackendError> {
        let base_tree = match base_commit {
            Some(oid) => self
                .repo
                .find_commit(to_gix_oid(oid))
                .map_err(|e| GitBackendError::ObjectReadFailed {
                    oid: oid.to_string(),
                    message: e.to_string(),
                })?
                .tree()
                .map_err(|e| GitBackendError::ObjectReadFailed {
                    oid: oid.to_string(),
                    message: format!("resolving tree: {e}"),
                })?,
            None => self.repo.empty_tree(),
        };

        let mut editor = base_tree
            .edit()
            .map_err(|e| GitBackendError::ObjectWriteFailed {
                message: format!("creating tree editor: {e}"),
            })?;

        for change in changes {
            match change {
                TreeChange::Upsert { path, oid } => {
                    editor
                        .upsert(path.as_str(), gix::objs::tree::EntryKind::Blob, to_gix_oid(*oid))
                        .map_err(|e| GitBackendError::ObjectWriteFailed {
                            message: format!("upsert {path}: {e}"),
                        })?;
                }
                TreeChange::Remove { path } => {
                    editor
                        .remove(path.as_str())
                        .map_err(|e| GitBackendError::ObjectWriteFailed {
                            message: format!("remove {path}: {e}"),
                        })?;
                }
            }
        }

        let new_id = editor.write().map_err(|e| GitBackendError::ObjectWriteFailed {
            message: format!("writing edited tree: {e}"),
        })?;
        Ok(from_gix_oid(new_id.detach()))
    }

    fn commit(
        &self,
        tree: Oid,
        parents: &[Oid],
        author: &Signature,
        committer: &Signature,
        message: &str,
    ) -> Result<Oid, GitBackendError> {
        let commit = gix::objs::Commit {
            message: message.into(),
            tree: to_gix_oid(tree),
            author: to_gix_signature(author),
            committer: to_gix_signature(committer),
            encoding: None,
            parents: parents.iter().map(|p| to_gix_oid(*p)).collect(),
            extra_headers: Default::default(),
        };
        let id = self
            .repo
            .write_object(&commit)
            .map_err(|e| GitBackendError::CommitFailed {
                message: e.to_string(),
            })?;
        Ok(from_gix_oid(id.detach()))
    }

    fn update_ref(&self, ref_name: &str, new_oid: Oid, expected: Option<Oid>) -> Result<(), GitBackendError> {
        use gix::refs::transaction::PreviousValue;

        let previous = match expected {
            Some(oid) => PreviousValue::MustExistAndMatch(gix::refs::Target::Object(to_gix_oid(oid))),
            None => PreviousValue::MustNotExist,
        };

        self.repo
            .reference(ref_name, to_gix_oid(new_oid), previous, "gitdocumentdb: commit")
            .map_err(|e| GitBackendError::ReferenceUpdateFailed {
                name: ref_name.to_string(),
                message: e.to_string(),
            })?;
        Ok(())
    }

    fn list_commits(&self, from: Oid, to: Option<Oid>) -> Result<Vec<NormalizedCommit>, GitBackendError> {
        let walk = self
            .repo
            .rev_walk([to_gix_oid(from)])
            .all()
            .map_err(|e| GitBackendError::ObjectReadFailed {
                oid: from.to_string(),
                message: format!("starting rev-walk: {e}"),
            })?;

        let mut out = Vec::new();
        for info in walk {
            let info = info.map_err(|e| GitBackendError::ObjectReadFailed {
                oid: from.to_string(),
                message: format!("walking history: {e}"),
            })?;
            let id = from_gix_oid(info.id);
            if Some(id) == to {
                break;
            }
            out.push(self.read_commit(id)?);
        }
        Ok(out)
    }

    fn read_commit(&self, oid: Oid) -> Result<NormalizedCommit, GitBackendError> {
        let commit = self
            .repo
            .find_commit(to_gix_oid(oid))
            .map_err(|e| GitBackendError::ObjectReadFailed {
                oid: oid.to_string(),
                message: e.to_string(),
            })?;
        let decoded = commit.decode().map_err(|e| GitBackendError::ObjectReadFailed {
            oid: oid.to_string(),
            message: format!("decoding commit: {e}"),
        })?;

        Ok(NormalizedCommit {
            oid,
            message: decoded.message.to_string(),
            parents: decoded.parents().map(from_gix_oid).collect(),
            author: from_gix_signature(decoded.author()),
            committer: from_gix_signature(decoded.committer()),
        })
    }

    fn merge_base(&self, a: Oid, b: Oid) -> Result<Option<Oid>, GitBackendError> {
        match self.repo.merge_base(to_gix_oid(a), to_gix_oid(b)) {
            Ok(id) => Ok(Some(from_gix_oid(id.detach()))),
            Err(_) => Ok(None),
        }
    }

    fn is_ancestor(&self, ancestor: Oid, descendant: Oid) -> Result<bool, GitBackendError> {
        Ok(self.merge_base(ancestor, descendant)? == Some(ancestor))
    }

    fn ensure_remote(&self, name: &str, url: &str) -> Result<(), GitBackendError> {
        let existing = self.remote_url(name)?;
        let args = match existing {
            Some(_) => vec!["remote", "set-url", name, url],
            None => vec!["remote", "add", name, url],
        };
        let args_ref: Vec<&str> = args;
        let output = self.run_git(&args_ref, 10_000)?;
        if !output.status.success() {
            return Err(GitBackendError::Transport(RemoteError::CannotCreateRemoteRepository {
                message: String::from_utf8_lossy(&output.stderr).to_string(),
            }));
        }
        Ok(())
    }

    fn remote_url(&self, name: &str) -> Result<Option<String>, GitBackendError> {
        let output = self.run_git(&["remote", "get-url", name], 5_000)?;
        if !output.status.success() {
            return Ok(None);
        }
        Ok(Some(String::from_utf8_lossy(&output.stdout).trim().to_string()))
    }

    fn fetch(&self, remote: &str, refspec: &str, timeout_ms: u64) -> Result<(), GitBackendError> {
        let output = self.run_git(&["fetch", "--quiet", remote, refspec], timeout_ms)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            // An empty or not-yet-initialized remote has no ref matching
            // `refspec` yet; that is the expected state the Sync Engine's
            // bootstrap (spec §4.7 step 4) checks for, not a transport
            // failure.
            let lower = stderr.to_ascii_lowercase();
            if lower.contains("couldn't find remote ref") || lower.contains("couldn't find") {
                debug!("fetch {remote} {refspec}: remote ref does not exist yet ({})", stderr.trim());
                return Ok(());
            }
            return Err(classify_transport_error(&stderr).into());
        }
        Ok(())
    }

    fn push(&self, remote: &str, refspec: &str, timeout_ms: u64) -> Result<PushOutcome, GitBackendError> {
        let output = self.run_git(&["push", remote, refspec], timeout_ms)?;
        if output.status.success() {
            return Ok(PushOutcome::Ok);
        }
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        if stderr.contains("non-fast-forward")
            || stderr.contains("fetch first")
            || stderr.contains("stale info")
        {
            warn!("push to {remote} rejected, remote has unfetched commits");
            return Ok(PushOutcome::RemoteHasUnfetchedCommits);
        }
        Err(classify_transport_error(&stderr).into())
    }

    fn set_upstream(&self, branch: &str, upstream_ref: &str) -> Result<(), GitBackendError> {
        let output = self.run_git(
            &["branch", &format!("--set-upstream-to={upstream_ref}"), branch],
            5_000,
        )?;
        if !output.status.success() {
            return Err(GitBackendError::ReferenceUpdateFailed {
                name: branch.to_string(),
                message: String::from_utf8_lossy(&output.stderr).to_string(),
            });
        }
        Ok(())
    }
}

/// Maps `git`'s stderr text to the transport error taxonomy of spec §6/§7.
fn classify_transport_error(stderr: &str) -> RemoteError {
    let lower = stderr.to_ascii_lowercase();
    if lower.contains("could not resolve host") {
        RemoteError::UnresolvedHost {
            host: stderr.trim().to_string(),
        }
    } else if lower.contains("repository not found") || lower.contains("not found") {
        RemoteError::RemoteRepositoryNotFound {
            url: stderr.trim().to_string(),
        }
    } else if lower.contains("authentication") || lower.contains("permission denied (publickey)") {
        RemoteError::PushAuthentication
    } else if lower.contains("permission") {
        RemoteError::PushPermissionDenied
    } else if lower.contains("timed out") || lower.contains("timeout") {
        RemoteError::SocketTimeout
    } else {
        RemoteError::HttpNetwork {
            message: stderr.trim().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn temp_backend() -> (TempDir, GixBackend) {
        let dir = TempDir::new().unwrap();
        let backend = GixBackend::init(dir.path(), "main").unwrap();
        (dir, backend)
    }

    #[test]
    fn writes_and_reads_blob_round_trip() {
        let (_dir, backend) = temp_backend();
        let oid = backend.write_blob(b"hello world").unwrap();
        assert_eq!(backend.read_blob(oid).unwrap(), b"hello world");
    }

    #[test]
    fn hash_blob_is_stable_for_identical_content() {
        let (_dir, backend) = temp_backend();
        let a = backend.hash_blob(b"same bytes");
        let b = backend.hash_blob(b"same bytes");
        assert_eq!(a, b);
    }

    #[test]
    fn apply_tree_changes_then_commit_then_read_tree() {
        let (_dir, backend) = temp_backend();
        let blob = backend.write_blob(b"{\n  \"_id\": \"nara\"\n}\n").unwrap();
        let tree = backend
            .apply_tree_changes(None, &[TreeChange::Upsert { path: "nara.json".into(), oid: blob }])
            .unwrap();

        let author = Signature {
            name: "Test".into(),
            email: "test@example.com".into(),
            timestamp: chrono::Utc::now(),
        };
        let commit_oid = backend.commit(tree, &[], &author, &author, "insert: nara.json").unwrap();
        backend.update_ref("refs/heads/main", commit_oid, None).unwrap();

        let entries = backend.read_tree(commit_oid, "").unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "nara.json");
        assert_eq!(entries[0].oid, blob);

        assert_eq!(backend.resolve_ref("refs/heads/main").unwrap(), Some(commit_oid));
    }

    #[test]
    fn update_ref_cas_rejects_mismatched_expected_value() {
        let (_dir, backend) = temp_backend();
        let blob = backend.write_blob(b"a").unwrap();
        let tree = backend
            .apply_tree_changes(None, &[TreeChange::Upsert { path: "a.json".into(), oid: blob }])
            .unwrap();
        let author = Signature {
            name: "T".into(),
            email: "t@example.com".into(),
            timestamp: chrono::Utc::now(),
        };
        let c1 = backend.commit(tree, &[], &author, &author, "c1").unwrap();
        backend.update_ref("refs/heads/main", c1, None).unwrap();

        let c2 = backend.commit(tree, &[c1], &author, &author, "c2").unwrap();
        let wrong_expected = backend.write_blob(b"not-a-commit-oid").unwrap();
        assert!(backend.update_ref("refs/heads/main", c2, Some(wrong_expected)).is_err());
    }
}
