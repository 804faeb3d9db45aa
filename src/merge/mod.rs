//! The Merge Engine (spec §4.6): three-way tree merge with recursive
//! property-level JSON reconciliation.

pub mod diff3;

use std::collections::{HashMap, HashSet};

use serde_json::Value;

use crate::backend::{EntryKind, GitBackend, Oid, TreeChange};
use crate::document::{ChangeOperation, ChangedFile, DocBody, DocType, FatDoc};
use crate::error::{GdbError, ValidationError};
use crate::identity::Signature;

/// `conflictResolutionStrategy` (spec §6 RemoteOptions, §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictResolutionStrategy {
    /// "prefer the locally-authored side, property-wise merged" — the
    /// default for whole-file (non-JSON) conflicts.
    OursDiff,
    Ours,
    Theirs,
}

impl ConflictResolutionStrategy {
    fn prefers_ours(self) -> bool {
        matches!(self, Self::Ours | Self::OursDiff)
    }
}

#[derive(Debug, Clone, Default)]
pub struct MergeOptions {
    pub conflict_resolution_strategy: Option<ConflictResolutionStrategy>,
    /// `schema.json.plainTextProperties`: property names whose string values
    /// get a three-way diff3 merge instead of a strategy pick (spec §4.6).
    pub plain_text_properties: HashSet<String>,
}

pub struct MergeOutcome {
    pub tree: Oid,
    pub changes: Vec<ChangedFile>,
    /// Whether any path required an actual conflict resolution (a strategy
    /// pick or a diff3 fallback) rather than a clean, non-overlapping carry
    /// over (spec §4.6 rule 1 vs rule 2) — distinguishes `"merge and push"`
    /// from `"resolve conflicts and push"` (spec §4.7 step 2).
    pub had_conflicts: bool,
}

/// Merges the trees of `ours_commit` and `theirs_commit`, which diverged
/// from `base_commit` (spec §4.6). `base_commit = None` means the two sides
/// share no history — the caller decides whether to attempt this at all
/// (spec §4.7 `NoMergeBaseFound`).
pub fn merge_trees(
    backend: &dyn GitBackend,
    base_commit: Option<Oid>,
    ours_commit: Oid,
    theirs_commit: Oid,
    options: &MergeOptions,
) -> Result<MergeOutcome, GdbError> {
    let base_blobs = match base_commit {
        Some(oid) => collect_blobs(backend, oid)?,
        None => HashMap::new(),
    };
    let ours_blobs = collect_blobs(backend, ours_commit)?;
    let theirs_blobs = collect_blobs(backend, theirs_commit)?;

    let mut paths: HashSet<&String> = HashSet::new();
    paths.extend(base_blobs.keys());
    paths.extend(ours_blobs.keys());
    paths.extend(theirs_blobs.keys());

    let mut changes = Vec::new();
    let mut tree_changes = Vec::new();
    let mut had_conflicts = false;

    for path in paths {
        let base_oid = base_blobs.get(path).copied();
        let ours_oid = ours_blobs.get(path).copied();
        let theirs_oid = theirs_blobs.get(path).copied();

        let (final_oid, conflicted) = resolve_path(backend, path, base_oid, ours_oid, theirs_oid, options)?;
        had_conflicts |= conflicted;

        if final_oid != ours_oid {
            match final_oid {
                Some(oid) => tree_changes.push(TreeChange::Upsert { path: path.clone(), oid }),
                None => tree_changes.push(TreeChange::Remove { path: path.clone() }),
            }
        }

        if final_oid != base_oid {
            let operation = match (base_oid, final_oid) {
                (None, Some(_)) => ChangeOperation::Insert,
                (Some(_), None) => ChangeOperation::Delete,
                _ => ChangeOperation::Update,
            };
            changes.push(ChangedFile {
                operation,
                old: fat_doc_for(backend, path, base_oid)?,
                new: fat_doc_for(backend, path, final_oid)?,
            });
        }
    }

    let tree = backend.apply_tree_changes(Some(ours_commit), &tree_changes)?;
    Ok(MergeOutcome { tree, changes, had_conflicts })
}

fn resolve_path(
    backend: &dyn GitBackend,
    path: &str,
    base_oid: Option<Oid>,
    ours_oid: Option<Oid>,
    theirs_oid: Option<Oid>,
    options: &MergeOptions,
) -> Result<(Option<Oid>, bool), GdbError> {
    // Unchanged on one side: take the other (spec §4.6 rule 1).
    if ours_oid == base_oid {
        return Ok((theirs_oid, false));
    }
    if theirs_oid == base_oid {
        return Ok((ours_oid, false));
    }
    if ours_oid == theirs_oid {
        return Ok((ours_oid, false));
    }

    // Same path modified on both sides, divergently (spec §4.6 rule 2).
    if path.ends_with(".json") {
        let base_val = load_json(backend, base_oid)?;
        let ours_val = load_json(backend, ours_oid)?;
        let theirs_val = load_json(backend, theirs_oid)?;

        match (ours_val, theirs_val) {
            (Some(ours_val), Some(theirs_val)) => {
                let (merged, conflicted) = merge_json(base_val.as_ref(), &ours_val, &theirs_val, options);
                let bytes = crate::json_normalizer::canonicalize(&merged);
                Ok((Some(backend.write_blob(&bytes)?), conflicted))
            }
            (Some(_), None) | (None, Some(_)) => {
                // One side deleted the document, the other edited it: the
                // configured strategy decides whether the delete or the
                // edit wins.
                let strategy = options.conflict_resolution_strategy.unwrap_or(ConflictResolutionStrategy::Theirs);
                Ok((if strategy.prefers_ours() { ours_oid } else { theirs_oid }, true))
            }
            (None, None) => Ok((None, false)),
        }
    } else {
        let strategy = options.conflict_resolution_strategy.unwrap_or(ConflictResolutionStrategy::OursDiff);
        Ok((if strategy.prefers_ours() { ours_oid } else { theirs_oid }, true))
    }
}

fn load_json(backend: &dyn GitBackend, oid: Option<Oid>) -> Result<Option<Value>, GdbError> {
    let Some(oid) = oid else { return Ok(None) };
    let bytes = backend.read_blob(oid)?;
    let value: Value = serde_json::from_slice(&bytes).map_err(|e| ValidationError::InvalidJsonObject {
        path: oid.to_string(),
        message: e.to_string(),
    })?;
    Ok(Some(value))
}

/// Recursive property-level merge (spec §4.6 rule 2, JSON branch). Returns
/// the merged value and whether any property along the way needed an actual
/// conflict resolution (a diff3 fallback or a strategy pick) rather than a
/// clean property-present-on-only-one-side carry-over.
fn merge_json(base: Option<&Value>, ours: &Value, theirs: &Value, options: &MergeOptions) -> (Value, bool) {
    let (Value::Object(ours_map), Value::Object(theirs_map)) = (ours, theirs) else {
        return (resolve_scalar_conflict(ours, theirs, options), true);
    };
    let base_map = base.and_then(Value::as_object);

    let mut keys: Vec<&String> = ours_map.keys().chain(theirs_map.keys()).collect();
    keys.sort();
    keys.dedup();

    let mut result = serde_json::Map::new();
    let mut had_conflict = false;
    for key in keys {
        match (ours_map.get(key), theirs_map.get(key)) {
            (Some(o), None) => {
                result.insert(key.clone(), o.clone());
            }
            (None, Some(t)) => {
                result.insert(key.clone(), t.clone());
            }
            (Some(o), Some(t)) => {
                if o == t {
                    result.insert(key.clone(), o.clone());
                } else if o.is_object() && t.is_object() {
                    let base_val = base_map.and_then(|m| m.get(key));
                    let (merged, conflicted) = merge_json(base_val, o, t, options);
                    had_conflict |= conflicted;
                    result.insert(key.clone(), merged);
                } else if options.plain_text_properties.contains(key) && o.is_string() && t.is_string() {
                    let base_str = base_map
                        .and_then(|m| m.get(key))
                        .and_then(Value::as_str)
                        .unwrap_or("");
                    let merged = diff3::merge(base_str, o.as_str().unwrap_or(""), t.as_str().unwrap_or(""));
                    match merged {
                        diff3::Diff3Result::Clean(text) => {
                            result.insert(key.clone(), Value::String(text));
                        }
                        diff3::Diff3Result::Conflict => {
                            had_conflict = true;
                            result.insert(key.clone(), resolve_scalar_conflict(o, t, options));
                        }
                    }
                } else {
                    had_conflict = true;
                    result.insert(key.clone(), resolve_scalar_conflict(o, t, options));
                }
            }
            (None, None) => unreachable!("key drawn from the union of both maps"),
        }
    }
    (Value::Object(result), had_conflict)
}

/// A scalar (or type-mismatched) property changed on both sides: apply the
/// configured resolution, defaulting to "prefer the side being pushed now"
/// (spec §4.6 rule 2).
fn resolve_scalar_conflict(ours: &Value, theirs: &Value, options: &MergeOptions) -> Value {
    let strategy = options.conflict_resolution_strategy.unwrap_or(ConflictResolutionStrategy::Theirs);
    if strategy.prefers_ours() {
        ours.clone()
    } else {
        theirs.clone()
    }
}

/// Computes the `ChangedFile` list between two commits' trees (spec §8 S4:
/// a sync's `SyncResult.changes` reports what actually moved, not just
/// which action ran). Either side may be `None` (an empty tree — no
/// commit exists yet on that side).
pub fn diff_trees(backend: &dyn GitBackend, old_commit: Option<Oid>, new_commit: Option<Oid>) -> Result<Vec<ChangedFile>, GdbError> {
    let old_blobs = match old_commit {
        Some(oid) => collect_blobs(backend, oid)?,
        None => HashMap::new(),
    };
    let new_blobs = match new_commit {
        Some(oid) => collect_blobs(backend, oid)?,
        None => HashMap::new(),
    };

    let mut paths: HashSet<&String> = HashSet::new();
    paths.extend(old_blobs.keys());
    paths.extend(new_blobs.keys());

    let mut changes = Vec::new();
    for path in paths {
        let old_oid = old_blobs.get(path).copied();
        let new_oid = new_blobs.get(path).copied();
        if old_oid == new_oid {
            continue;
        }
        let operation = match (old_oid, new_oid) {
            (None, Some(_)) => ChangeOperation::Insert,
            (Some(_), None) => ChangeOperation::Delete,
            _ => ChangeOperation::Update,
        };
        changes.push(ChangedFile {
            operation,
            old: fat_doc_for(backend, path, old_oid)?,
            new: fat_doc_for(backend, path, new_oid)?,
        });
    }
    Ok(changes)
}

fn collect_blobs(backend: &dyn GitBackend, commit: Oid) -> Result<HashMap<String, Oid>, GdbError> {
    let mut out = HashMap::new();
    let mut stack = vec![String::new()];
    while let Some(dir) = stack.pop() {
        for entry in backend.read_tree(commit, &dir)? {
            let path = format!("{dir}{}", entry.name);
            match entry.kind {
                EntryKind::Blob => {
                    out.insert(path, entry.oid);
                }
                EntryKind::Tree => stack.push(format!("{path}/")),
            }
        }
    }
    Ok(out)
}

/// As `DocumentStore::doc_body_of`: the stored bytes carry no
/// caller-declared text/binary tag, so a non-JSON path's actual `DocType`
/// is decided by whether its content is valid UTF-8.
fn fat_doc_for(backend: &dyn GitBackend, path: &str, oid: Option<Oid>) -> Result<Option<FatDoc>, GdbError> {
    let Some(oid) = oid else { return Ok(None) };
    let bytes = backend.read_blob(oid)?;
    let (doc_type, doc) = if path.ends_with(".json") {
        let value: Value = serde_json::from_slice(&bytes).map_err(|e| ValidationError::InvalidJsonObject {
            path: path.to_string(),
            message: e.to_string(),
        })?;
        (DocType::Json, DocBody::Json(value))
    } else {
        match String::from_utf8(bytes) {
            Ok(text) => (DocType::Text, DocBody::Text(text)),
            Err(e) => (DocType::Binary, DocBody::Binary(e.into_bytes())),
        }
    };
    let id = path.trim_end_matches(".json").to_string();
    Ok(Some(FatDoc {
        id,
        name: path.to_string(),
        doc_type,
        file_oid: oid,
        doc,
    }))
}

/// Creates the merge commit once [`merge_trees`] has produced a tree (spec
/// §4.6 rule 3: "a merge commit with both sides as parents").
pub fn create_merge_commit(
    backend: &dyn GitBackend,
    tree: Oid,
    ours_commit: Oid,
    theirs_commit: Oid,
    author: &Signature,
    committer: &Signature,
    message: &str,
) -> Result<Oid, GdbError> {
    Ok(backend.commit(tree, &[ours_commit, theirs_commit], author, committer, message)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::gix_backend::GixBackend;
    use tempfile::TempDir;

    fn write_doc(backend: &GixBackend, base: Option<Oid>, path: &str, value: &Value) -> Oid {
        let bytes = crate::json_normalizer::canonicalize(value);
        let blob = backend.write_blob(&bytes).unwrap();
        backend
            .apply_tree_changes(base, &[TreeChange::Upsert { path: path.to_string(), oid: blob }])
            .unwrap()
    }

    fn sig() -> Signature {
        Signature {
            name: "T".into(),
            email: "t@example.com".into(),
            timestamp: chrono::Utc::now(),
        }
    }

    #[test]
    fn non_conflicting_property_edits_merge_cleanly() {
        let dir = TempDir::new().unwrap();
        let backend = GixBackend::init(dir.path(), "main").unwrap();

        let base_tree = write_doc(
            &backend,
            None,
            "nara.json",
            &serde_json::json!({"_id": "nara", "flower": "cherry", "season": "spring"}),
        );
        let base_commit = backend.commit(base_tree, &[], &sig(), &sig(), "base").unwrap();

        let ours_tree = write_doc(
            &backend,
            Some(base_commit),
            "nara.json",
            &serde_json::json!({"_id": "nara", "flower": "sakura", "season": "spring"}),
        );
        let ours_commit = backend.commit(ours_tree, &[base_commit], &sig(), &sig(), "ours").unwrap();

        let theirs_tree = write_doc(
            &backend,
            Some(base_commit),
            "nara.json",
            &serde_json::json!({"_id": "nara", "flower": "cherry", "season": "early spring"}),
        );
        let theirs_commit = backend
            .commit(theirs_tree, &[base_commit], &sig(), &sig(), "theirs")
            .unwrap();

        let outcome = merge_trees(
            &backend,
            Some(base_commit),
            ours_commit,
            theirs_commit,
            &MergeOptions::default(),
        )
        .unwrap();

        assert_eq!(outcome.changes.len(), 1);
        assert!(!outcome.had_conflicts, "non-overlapping property edits are not a conflict");
        let merged = outcome.changes[0].new.as_ref().unwrap();
        match &merged.doc {
            DocBody::Json(v) => {
                assert_eq!(v["flower"], "sakura");
                assert_eq!(v["season"], "early spring");
            }
            _ => panic!("expected json"),
        }
    }

    #[test]
    fn independent_file_adds_on_each_side_merge_without_conflict() {
        let dir = TempDir::new().unwrap();
        let backend = GixBackend::init(dir.path(), "main").unwrap();

        let base_tree = write_doc(&backend, None, "nara.json", &serde_json::json!({"_id": "nara"}));
        let base_commit = backend.commit(base_tree, &[], &sig(), &sig(), "base").unwrap();

        let ours_tree = write_doc(&backend, Some(base_commit), "yoshino.json", &serde_json::json!({"_id": "yoshino"}));
        let ours_commit = backend.commit(ours_tree, &[base_commit], &sig(), &sig(), "ours").unwrap();

        let theirs_tree = write_doc(&backend, Some(base_commit), "somei.json", &serde_json::json!({"_id": "somei"}));
        let theirs_commit = backend
            .commit(theirs_tree, &[base_commit], &sig(), &sig(), "theirs")
            .unwrap();

        let outcome = merge_trees(
            &backend,
            Some(base_commit),
            ours_commit,
            theirs_commit,
            &MergeOptions::default(),
        )
        .unwrap();

        assert_eq!(outcome.changes.len(), 2, "both new files are changes relative to the merge base");
        assert!(!outcome.had_conflicts, "disjoint file adds never touch the same path");
    }

    #[test]
    fn divergent_scalar_conflict_defaults_to_theirs() {
        let dir = TempDir::new().unwrap();
        let backend = GixBackend::init(dir.path(), "main").unwrap();

        let base_tree = write_doc(&backend, None, "nara.json", &serde_json::json!({"_id": "nara", "flower": "a"}));
        let base_commit = backend.commit(base_tree, &[], &sig(), &sig(), "base").unwrap();

        let ours_tree = write_doc(
            &backend,
            Some(base_commit),
            "nara.json",
            &serde_json::json!({"_id": "nara", "flower": "ours"}),
        );
        let ours_commit = backend.commit(ours_tree, &[base_commit], &sig(), &sig(), "ours").unwrap();

        let theirs_tree = write_doc(
            &backend,
            Some(base_commit),
            "nara.json",
            &serde_json::json!({"_id": "nara", "flower": "theirs"}),
        );
        let theirs_commit = backend
            .commit(theirs_tree, &[base_commit], &sig(), &sig(), "theirs")
            .unwrap();

        let outcome = merge_trees(
            &backend,
            Some(base_commit),
            ours_commit,
            theirs_commit,
            &MergeOptions::default(),
        )
        .unwrap();

        assert!(outcome.had_conflicts, "same property modified on both sides is a conflict");
        let merged = outcome.changes[0].new.as_ref().unwrap();
        match &merged.doc {
            DocBody::Json(v) => assert_eq!(v["flower"], "theirs"),
            _ => panic!("expected json"),
        }
    }
}
