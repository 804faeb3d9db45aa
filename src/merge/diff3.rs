//! Three-way plain-text merge (spec §4.6 `schema.json.plainTextProperties`).
//!
//! No diff3 crate exists in the dependency set; this builds the classic
//! algorithm on top of `similar`'s line diffing: diff base→ours and
//! base→theirs, walk both change sets over the base in lockstep, and emit a
//! conflict whenever both sides touch the same base region with different
//! replacement text.

use similar::{Algorithm, TextDiff};

/// The result of a diff3 merge: either clean text or an unresolved hunk
/// conflict, left to the caller's `conflictResolutionStrategy` (spec §4.6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diff3Result {
    Clean(String),
    Conflict,
}

/// Merges `ours` and `theirs`, both derived from `base`, line by line.
/// Returns `Conflict` when both sides replace or delete the same base
/// region with different content; ranges untouched by one side simply take
/// the other side's version, and ranges neither side touched are preserved
/// verbatim.
pub fn merge(base: &str, ours: &str, theirs: &str) -> Diff3Result {
    if ours == theirs {
        return Diff3Result::Clean(ours.to_string());
    }
    let base_lines: Vec<&str> = base.lines().collect();
    let our_lines: Vec<&str> = ours.lines().collect();
    let their_lines: Vec<&str> = theirs.lines().collect();

    // No common ancestor text to anchor a line-by-line walk against (e.g.
    // two independent inserts of the same property, spec §8 S5): there is
    // no positional information to merge on, only two divergent values.
    if base_lines.is_empty() {
        return Diff3Result::Conflict;
    }

    let our_diff = TextDiff::configure()
        .algorithm(Algorithm::Myers)
        .diff_slices(&base_lines, &our_lines);
    let their_diff = TextDiff::configure()
        .algorithm(Algorithm::Myers)
        .diff_slices(&base_lines, &their_lines);

    // Map each base line index to whether ours/theirs changed it, and what
    // replacement (if any) starts there.
    let mut our_changed = vec![false; base_lines.len()];
    let mut their_changed = vec![false; base_lines.len()];

    for op in our_diff.ops() {
        if !matches!(op.tag(), similar::DiffTag::Equal) {
            for i in op.old_range() {
                our_changed[i] = true;
            }
        }
    }
    for op in their_diff.ops() {
        if !matches!(op.tag(), similar::DiffTag::Equal) {
            for i in op.old_range() {
                their_changed[i] = true;
            }
        }
    }

    // Any base line touched by both sides is a conflicting region unless
    // both sides produced byte-identical changes (e.g. both trimmed
    // trailing whitespace the same way).
    let mut merged = Vec::new();
    let mut i = 0;
    let mut conflict = false;

    while i < base_lines.len() {
        if our_changed[i] && their_changed[i] {
            let our_op = our_diff.ops().iter().find(|op| op.old_range().contains(&i));
            let their_op = their_diff.ops().iter().find(|op| op.old_range().contains(&i));
            match (our_op, their_op) {
                (Some(a), Some(b)) => {
                    let our_text: Vec<&str> = our_lines[a.new_range()].to_vec();
                    let their_text: Vec<&str> = their_lines[b.new_range()].to_vec();
                    if our_text == their_text {
                        merged.extend(our_text);
                    } else {
                        conflict = true;
                    }
                    i = a.old_range().end.max(i + 1);
                }
                _ => {
                    conflict = true;
                    i += 1;
                }
            }
        } else if our_changed[i] {
            if let Some(op) = our_diff.ops().iter().find(|op| op.old_range().contains(&i)) {
                merged.extend(our_lines[op.new_range()].iter().copied());
                i = op.old_range().end.max(i + 1);
            } else {
                i += 1;
            }
        } else if their_changed[i] {
            if let Some(op) = their_diff.ops().iter().find(|op| op.old_range().contains(&i)) {
                merged.extend(their_lines[op.new_range()].iter().copied());
                i = op.old_range().end.max(i + 1);
            } else {
                i += 1;
            }
        } else {
            merged.push(base_lines[i]);
            i += 1;
        }
    }

    if conflict {
        Diff3Result::Conflict
    } else {
        let mut text = merged.join("\n");
        if base.ends_with('\n') || (ours.ends_with('\n') && theirs.ends_with('\n')) {
            text.push('\n');
        }
        Diff3Result::Clean(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_overlapping_edits_merge_cleanly() {
        let base = "alpha\nbeta\ngamma\n";
        let ours = "ALPHA\nbeta\ngamma\n";
        let theirs = "alpha\nbeta\nGAMMA\n";
        let result = merge(base, ours, theirs);
        assert_eq!(result, Diff3Result::Clean("ALPHA\nbeta\nGAMMA\n".to_string()));
    }

    #[test]
    fn identical_edits_on_both_sides_are_not_a_conflict() {
        let base = "alpha\nbeta\n";
        let ours = "ALPHA\nbeta\n";
        let theirs = "ALPHA\nbeta\n";
        let result = merge(base, ours, theirs);
        assert_eq!(result, Diff3Result::Clean("ALPHA\nbeta\n".to_string()));
    }

    #[test]
    fn overlapping_divergent_edits_conflict() {
        let base = "alpha\nbeta\n";
        let ours = "ALPHA_OURS\nbeta\n";
        let theirs = "ALPHA_THEIRS\nbeta\n";
        let result = merge(base, ours, theirs);
        assert_eq!(result, Diff3Result::Conflict);
    }

    #[test]
    fn unchanged_text_passes_through() {
        let base = "same\n";
        let result = merge(base, base, base);
        assert_eq!(result, Diff3Result::Clean("same\n".to_string()));
    }

    #[test]
    fn no_common_ancestor_with_identical_values_is_clean() {
        let result = merge("", "same profile", "same profile");
        assert_eq!(result, Diff3Result::Clean("same profile".to_string()));
    }

    #[test]
    fn no_common_ancestor_with_divergent_values_conflicts() {
        let result = merge("", "I am from Nara.", "My name is Hidekazu.");
        assert_eq!(result, Diff3Result::Conflict);
    }
}
