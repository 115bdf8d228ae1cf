//! Three-way line merge
//!
//! Reconciles two divergent revisions of a document against their common
//! base. Both revisions are aligned to the base with a Myers (LCS) diff,
//! the edits are grouped into hunks over base line ranges, and each hunk is
//! resolved independently. Positional (index-aligned) comparison is not
//! usable here: a single inserted line shifts every later index in one
//! branch but not the other.

use similar::{capture_diff_slices, Algorithm, DiffOp};
use tracing::debug;

/// Result of a three-way merge
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// All hunks resolved; the merged line sequence
    Merged(Vec<String>),
    /// At least one hunk was changed differently by both sides.
    /// A single conflicting hunk invalidates the whole merge.
    Conflict,
}

/// A run of branch lines replacing a range of base lines.
/// `base_start == base_end` for pure insertions.
#[derive(Debug, Clone)]
struct Edit {
    base_start: usize,
    base_end: usize,
    lines: Vec<String>,
}

/// A maximal group of overlapping edits from either side
#[derive(Debug)]
struct Hunk {
    base_start: usize,
    base_end: usize,
    local: Vec<Edit>,
    remote: Vec<Edit>,
}

/// Merge two revisions of a line sequence against their common base.
pub fn merge_lines(base: &[&str], local: &[&str], remote: &[&str]) -> MergeOutcome {
    // Identical revisions merge to themselves, even when both diverge from
    // base. Checked before any alignment work.
    if local == remote {
        return MergeOutcome::Merged(to_owned(local));
    }
    if local == base {
        return MergeOutcome::Merged(to_owned(remote));
    }
    if remote == base {
        return MergeOutcome::Merged(to_owned(local));
    }

    let local_edits = edits_against_base(base, local);
    let remote_edits = edits_against_base(base, remote);
    let hunks = group_hunks(local_edits, remote_edits);

    let mut merged = Vec::new();
    let mut pos = 0;

    for hunk in hunks {
        merged.extend(base[pos..hunk.base_start].iter().map(|s| s.to_string()));
        match resolve_hunk(&hunk, base) {
            Some(lines) => merged.extend(lines),
            None => {
                debug!(
                    base_start = hunk.base_start,
                    base_end = hunk.base_end,
                    "Overlapping hunk changed differently by both sides"
                );
                return MergeOutcome::Conflict;
            }
        }
        pos = hunk.base_end;
    }

    merged.extend(base[pos..].iter().map(|s| s.to_string()));
    MergeOutcome::Merged(merged)
}

/// Merge two text revisions against their common base.
///
/// Lines are compared without terminators; the merged text carries a
/// trailing newline iff `local` or `remote` does. Returns `None` on a
/// genuine overlapping conflict.
pub fn merge_text(base: &str, local: &str, remote: &str) -> Option<String> {
    // Exact-text shortcuts preserve the input byte-for-byte
    if local == remote {
        return Some(local.to_string());
    }
    if local == base {
        return Some(remote.to_string());
    }
    if remote == base {
        return Some(local.to_string());
    }

    let base_lines = split_lines(base);
    let local_lines = split_lines(local);
    let remote_lines = split_lines(remote);

    match merge_lines(&base_lines, &local_lines, &remote_lines) {
        MergeOutcome::Merged(lines) => {
            let mut text = lines.join("\n");
            if !text.is_empty() && (local.ends_with('\n') || remote.ends_with('\n')) {
                text.push('\n');
            }
            Some(text)
        }
        MergeOutcome::Conflict => None,
    }
}

fn split_lines(text: &str) -> Vec<&str> {
    if text.is_empty() {
        Vec::new()
    } else {
        text.lines().collect()
    }
}

fn to_owned(lines: &[&str]) -> Vec<String> {
    lines.iter().map(|s| s.to_string()).collect()
}

/// Alignment of one branch against the base, as replacement edits over
/// base line ranges. Equal runs produce no edit.
fn edits_against_base(base: &[&str], branch: &[&str]) -> Vec<Edit> {
    let mut edits = Vec::new();

    for op in capture_diff_slices(Algorithm::Myers, base, branch) {
        match op {
            DiffOp::Equal { .. } => {}
            DiffOp::Delete {
                old_index, old_len, ..
            } => edits.push(Edit {
                base_start: old_index,
                base_end: old_index + old_len,
                lines: Vec::new(),
            }),
            DiffOp::Insert {
                old_index,
                new_index,
                new_len,
            } => edits.push(Edit {
                base_start: old_index,
                base_end: old_index,
                lines: to_owned(&branch[new_index..new_index + new_len]),
            }),
            DiffOp::Replace {
                old_index,
                old_len,
                new_index,
                new_len,
            } => edits.push(Edit {
                base_start: old_index,
                base_end: old_index + old_len,
                lines: to_owned(&branch[new_index..new_index + new_len]),
            }),
        }
    }

    edits
}

/// Whether an edit belongs to the hunk currently spanning [start, end).
///
/// Edits must share base lines to be grouped; merely touching at a
/// boundary keeps them independent. Two insertions at the same point do
/// share that point and are grouped.
fn overlaps(start: usize, end: usize, edit: &Edit) -> bool {
    let (s, e) = (edit.base_start, edit.base_end);

    if s == e && start == end {
        return s == start;
    }
    if s == e {
        return start < s && s < end;
    }
    if start == end {
        return s < start && start < e;
    }
    start.max(s) < end.min(e)
}

/// Group both sides' edits into hunks by transitive base-range overlap
fn group_hunks(local: Vec<Edit>, remote: Vec<Edit>) -> Vec<Hunk> {
    let mut tagged: Vec<(bool, Edit)> = local
        .into_iter()
        .map(|e| (true, e))
        .chain(remote.into_iter().map(|e| (false, e)))
        .collect();
    tagged.sort_by_key(|(_, e)| (e.base_start, e.base_end));

    let mut hunks: Vec<Hunk> = Vec::new();

    for (is_local, edit) in tagged {
        match hunks.last_mut() {
            Some(hunk) if overlaps(hunk.base_start, hunk.base_end, &edit) => {
                hunk.base_end = hunk.base_end.max(edit.base_end);
                if is_local {
                    hunk.local.push(edit);
                } else {
                    hunk.remote.push(edit);
                }
            }
            _ => {
                let mut hunk = Hunk {
                    base_start: edit.base_start,
                    base_end: edit.base_end,
                    local: Vec::new(),
                    remote: Vec::new(),
                };
                if is_local {
                    hunk.local.push(edit);
                } else {
                    hunk.remote.push(edit);
                }
                hunks.push(hunk);
            }
        }
    }

    hunks
}

/// Resolve one hunk. `None` means both sides changed it differently.
fn resolve_hunk(hunk: &Hunk, base: &[&str]) -> Option<Vec<String>> {
    match (hunk.local.is_empty(), hunk.remote.is_empty()) {
        // Unreachable by construction, but keeping base is always sound
        (true, true) => Some(to_owned(&base[hunk.base_start..hunk.base_end])),
        (false, true) => Some(render_side(&hunk.local, base, hunk.base_start, hunk.base_end)),
        (true, false) => Some(render_side(&hunk.remote, base, hunk.base_start, hunk.base_end)),
        (false, false) => {
            let local = render_side(&hunk.local, base, hunk.base_start, hunk.base_end);
            let remote = render_side(&hunk.remote, base, hunk.base_start, hunk.base_end);
            // Changed identically by both sides: no conflict
            if local == remote {
                Some(local)
            } else {
                None
            }
        }
    }
}

/// One side's version of the hunk: its edits interleaved with the base
/// lines it left untouched inside the hunk range.
fn render_side(edits: &[Edit], base: &[&str], start: usize, end: usize) -> Vec<String> {
    let mut out = Vec::new();
    let mut pos = start;

    for edit in edits {
        out.extend(base[pos..edit.base_start].iter().map(|s| s.to_string()));
        out.extend(edit.lines.iter().cloned());
        pos = edit.base_end;
    }

    out.extend(base[pos..end].iter().map(|s| s.to_string()));
    out
}
