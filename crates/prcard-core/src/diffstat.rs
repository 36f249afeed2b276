//! Directory-level diff statistics
//!
//! Turns the flat list of files changed by a pull request into a handful of
//! lines, one per directory group. The grouping depth is chosen adaptively:
//! starting at two path segments, the depth grows until the files split into
//! at least two groups. A PR that only touches one deep module therefore
//! renders as a single line, while a PR spanning several subsystems renders
//! one line per subsystem.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

/// Rendered in place of the statistics when a PR changes no files
pub const NO_CHANGES_MARKER: &str = "No files changed";

/// Group label used for files with an empty path
pub const ROOT_GROUP: &str = "root";

/// Width of the label column in rendered lines
const LABEL_WIDTH: usize = 30;

/// Smallest grouping depth tried
const MIN_DEPTH: usize = 2;

/// One changed file as reported by the diff source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangedFile {
    /// Repository-relative path, `/`-separated
    pub filename: String,
    #[serde(default)]
    pub additions: u64,
    #[serde(default)]
    pub deletions: u64,
}

impl ChangedFile {
    pub fn new(filename: impl Into<String>, additions: u64, deletions: u64) -> Self {
        Self {
            filename: filename.into(),
            additions,
            deletions,
        }
    }

    fn segment_count(&self) -> usize {
        self.filename.split('/').count()
    }
}

/// Aggregated statistics for one directory group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffStatEntry {
    /// Directory prefix shared by every file in the group
    pub key: String,
    pub additions: u64,
    pub deletions: u64,
    pub file_count: usize,
}

impl DiffStatEntry {
    fn new(key: String) -> Self {
        Self {
            key,
            additions: 0,
            deletions: 0,
            file_count: 0,
        }
    }

    /// Total changed lines
    pub fn total(&self) -> u64 {
        self.additions.saturating_add(self.deletions)
    }

    /// Render as ` <label> | <total> +A-D (N files)`, dropping a zero sign
    pub fn render(&self) -> String {
        let mut breakdown = String::new();
        if self.additions > 0 {
            breakdown.push_str(&format!("+{}", self.additions));
        }
        if self.deletions > 0 {
            breakdown.push_str(&format!("-{}", self.deletions));
        }
        if !breakdown.is_empty() {
            breakdown.insert(0, ' ');
        }

        format!(
            " {:<width$} | {:>3}{} ({} files)",
            self.key,
            self.total(),
            breakdown,
            self.file_count,
            width = LABEL_WIDTH
        )
    }
}

/// Result of aggregating a PR's changed files
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffSummary {
    /// The PR changes no files
    NoChanges,
    /// One entry per directory group, in order of first appearance
    Groups(Vec<DiffStatEntry>),
}

impl DiffSummary {
    pub fn entries(&self) -> &[DiffStatEntry] {
        match self {
            Self::NoChanges => &[],
            Self::Groups(entries) => entries,
        }
    }
}

impl fmt::Display for DiffSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoChanges => f.write_str(NO_CHANGES_MARKER),
            Self::Groups(entries) => f.write_str(&render_entries(entries)),
        }
    }
}

/// Aggregate changed files into directory groups at the adaptive depth
pub fn aggregate(files: &[ChangedFile]) -> DiffSummary {
    if files.is_empty() {
        return DiffSummary::NoChanges;
    }

    let depth = grouping_depth(files);
    let entries = group_by_depth(files, depth);
    debug!(
        "Grouped {} changed files into {} groups at depth {}",
        files.len(),
        entries.len(),
        depth
    );
    DiffSummary::Groups(entries)
}

/// Aggregate and render in one step
pub fn summarize(files: &[ChangedFile]) -> String {
    aggregate(files).to_string()
}

/// Render entries one per line
pub fn render_entries(entries: &[DiffStatEntry]) -> String {
    entries
        .iter()
        .map(DiffStatEntry::render)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Coarsest depth (starting at 2) that separates the files into at least two
/// groups, or the deepest path's segment count when no depth does.
pub fn grouping_depth(files: &[ChangedFile]) -> usize {
    let max_depth = files
        .iter()
        .map(ChangedFile::segment_count)
        .max()
        .unwrap_or(0);

    (MIN_DEPTH..=max_depth)
        .find(|&depth| distinct_groups(files, depth) > 1)
        .unwrap_or(max_depth)
}

/// Group files by their first `depth` path segments
pub fn group_by_depth(files: &[ChangedFile], depth: usize) -> Vec<DiffStatEntry> {
    let mut entries: Vec<DiffStatEntry> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();

    for file in files {
        let key = group_key(&file.filename, depth);
        let idx = *positions.entry(key.clone()).or_insert_with(|| {
            entries.push(DiffStatEntry::new(key));
            entries.len() - 1
        });

        let entry = &mut entries[idx];
        entry.additions = entry.additions.saturating_add(file.additions);
        entry.deletions = entry.deletions.saturating_add(file.deletions);
        entry.file_count += 1;
    }

    entries
}

fn distinct_groups(files: &[ChangedFile], depth: usize) -> usize {
    let mut seen: Vec<String> = Vec::new();
    for file in files {
        let key = group_key(&file.filename, depth);
        if !seen.contains(&key) {
            seen.push(key);
            if seen.len() > 1 {
                break;
            }
        }
    }
    seen.len()
}

fn group_key(path: &str, depth: usize) -> String {
    if path.is_empty() {
        return ROOT_GROUP.to_string();
    }

    let parts: Vec<&str> = path.split('/').collect();
    if parts.len() >= depth {
        parts[..depth].join("/")
    } else {
        path.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(name: &str, additions: u64, deletions: u64) -> ChangedFile {
        ChangedFile::new(name, additions, deletions)
    }

    #[test]
    fn test_empty_is_no_changes() {
        assert_eq!(aggregate(&[]), DiffSummary::NoChanges);
        assert_eq!(summarize(&[]), NO_CHANGES_MARKER);
    }

    #[test]
    fn test_two_subsystems_group_at_depth_two() {
        let files = vec![
            file("x/y/f1.go", 10, 2),
            file("z/f2.go", 1, 0),
        ];

        assert_eq!(grouping_depth(&files), 2);
        let summary = aggregate(&files);
        let entries = summary.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].key, "x/y");
        assert_eq!(entries[0].additions, 10);
        assert_eq!(entries[0].deletions, 2);
        // two segments is the whole path at depth 2
        assert_eq!(entries[1].key, "z/f2.go");
        assert_eq!(entries[1].file_count, 1);
    }

    #[test]
    fn test_shared_prefix_escalates_depth() {
        let files = vec![
            file("src/core/net/a.rs", 1, 1),
            file("src/core/net/b.rs", 2, 0),
            file("src/core/io/c.rs", 0, 3),
        ];

        // depth 2 => "src/core" only; depth 3 splits net vs io
        assert_eq!(group_by_depth(&files, 2).len(), 1);
        assert_eq!(grouping_depth(&files), 3);

        let summary = aggregate(&files);
        let entries = summary.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].key, "src/core/net");
        assert_eq!(entries[0].file_count, 2);
        assert_eq!(entries[0].additions, 3);
        assert_eq!(entries[1].key, "src/core/io");
        assert_eq!(entries[1].deletions, 3);
    }

    #[test]
    fn test_single_group_falls_back_to_max_depth() {
        let files = vec![file("a/b/c/only.rs", 4, 4), file("a/b/c/only2.rs", 1, 0)];
        // files differ only at depth 4
        assert_eq!(grouping_depth(&files), 4);

        let one = vec![file("README.md", 3, 1)];
        assert_eq!(grouping_depth(&one), 1);
        let entries = group_by_depth(&one, 1);
        assert_eq!(entries[0].key, "README.md");
    }

    #[test]
    fn test_identical_paths_use_max_depth() {
        let files = vec![file("docs/guide.md", 1, 0), file("docs/guide.md", 2, 0)];
        assert_eq!(grouping_depth(&files), 2);
        let summary = aggregate(&files);
        assert_eq!(summary.entries().len(), 1);
        assert_eq!(summary.entries()[0].file_count, 2);
        assert_eq!(summary.entries()[0].additions, 3);
    }

    #[test]
    fn test_empty_path_groups_as_root() {
        assert_eq!(group_key("", 2), ROOT_GROUP);
        assert_eq!(group_key("top.txt", 2), "top.txt");
    }

    #[test]
    fn test_first_seen_order_is_kept() {
        let files = vec![
            file("web/ui/a.ts", 1, 0),
            file("api/v1/b.go", 1, 0),
            file("web/ui/c.ts", 1, 0),
        ];
        let summary = aggregate(&files);
        let keys: Vec<&str> = summary.entries().iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, vec!["web/ui", "api/v1"]);
    }

    #[test]
    fn test_render_formats() {
        let mut entry = DiffStatEntry::new("x/y".to_string());
        entry.additions = 10;
        entry.deletions = 2;
        entry.file_count = 1;
        assert_eq!(entry.render(), format!(" {:<30} |  12 +10-2 (1 files)", "x/y"));

        entry.deletions = 0;
        assert_eq!(entry.render(), format!(" {:<30} |  10 +10 (1 files)", "x/y"));

        entry.additions = 0;
        entry.deletions = 7;
        assert_eq!(entry.render(), format!(" {:<30} |   7 -7 (1 files)", "x/y"));

        entry.deletions = 0;
        assert_eq!(entry.render(), format!(" {:<30} |   0 (1 files)", "x/y"));
    }

    #[test]
    fn test_huge_counts_saturate() {
        let files = vec![
            file("x/y/a.bin", u64::MAX, 1),
            file("x/y/b.bin", 5, u64::MAX),
            file("z/c.bin", 1, 0),
        ];
        let summary = aggregate(&files);
        let entry = &summary.entries()[0];

        assert_eq!(entry.key, "x/y");
        assert_eq!(entry.additions, u64::MAX);
        assert_eq!(entry.deletions, u64::MAX);
        assert_eq!(entry.total(), u64::MAX);
        assert!(summarize(&files).contains(&u64::MAX.to_string()));
    }

    #[test]
    fn test_summary_renders_one_line_per_group() {
        let files = vec![file("x/y/f1.go", 10, 2), file("z/f2.go", 1, 0)];
        let text = summarize(&files);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("+10-2 (1 files)"));
        assert!(lines[1].contains("+1 (1 files)"));
    }
}
