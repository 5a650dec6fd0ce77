//! Text rendering of file pair diffs for terminal output.

use crate::tree::{ActionRecord, AstDiff};
use similar::{ChangeTag, TextDiff};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

/// Generates a unified diff between two file contents.
pub fn unified_diff(original: &str, modified: &str, src_path: &Path, dst_path: &Path) -> String {
    let diff = TextDiff::from_lines(original, modified);
    diff.unified_diff()
        .context_radius(3)
        .header(
            &format!("a/{}", src_path.display()),
            &format!("b/{}", dst_path.display()),
        )
        .to_string()
}

/// Line and action counts of one or more file pairs.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DiffSummary {
    pub files_changed: usize,
    pub insertions: usize,
    pub deletions: usize,
    /// Primitive action counts keyed by action name.
    pub actions: BTreeMap<String, usize>,
}

impl DiffSummary {
    /// Summarize an AST diff together with the text of both files.
    pub fn from_ast_diff(diff: &AstDiff, original: &str, modified: &str) -> Self {
        let text = TextDiff::from_lines(original, modified);
        let mut insertions = 0;
        let mut deletions = 0;
        for change in text.iter_all_changes() {
            match change.tag() {
                ChangeTag::Insert => insertions += 1,
                ChangeTag::Delete => deletions += 1,
                ChangeTag::Equal => {}
            }
        }

        let mut actions = BTreeMap::new();
        count_records(diff.records(), &mut actions);

        Self {
            files_changed: usize::from(insertions > 0 || deletions > 0 || !diff.is_empty()),
            insertions,
            deletions,
            actions,
        }
    }

    /// Combines two summaries.
    pub fn merge(&mut self, other: &DiffSummary) {
        self.files_changed += other.files_changed;
        self.insertions += other.insertions;
        self.deletions += other.deletions;
        for (kind, count) in &other.actions {
            *self.actions.entry(kind.clone()).or_default() += count;
        }
    }
}

fn count_records(records: &[ActionRecord], counts: &mut BTreeMap<String, usize>) {
    for record in records {
        if record.members.is_empty() {
            *counts.entry(record.kind.clone()).or_default() += 1;
        } else {
            count_records(&record.members, counts);
        }
    }
}

impl fmt::Display for DiffSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} file(s) changed, {} insertions(+), {} deletions(-)",
            self.files_changed, self.insertions, self.deletions
        )?;
        if !self.actions.is_empty() {
            let counts: Vec<String> = self
                .actions
                .iter()
                .map(|(kind, count)| format!("{count} {kind}"))
                .collect();
            write!(f, "; {}", counts.join(", "))?;
        }
        Ok(())
    }
}

/// One line per action of a diff, multi-move members indented.
pub struct ActionListing<'a>(pub &'a AstDiff);

impl fmt::Display for ActionListing<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} -> {}",
            self.0.src_path().display(),
            self.0.dst_path().display()
        )?;
        for record in self.0.records() {
            write_record(f, record, 1)?;
        }
        Ok(())
    }
}

fn write_record(f: &mut fmt::Formatter<'_>, record: &ActionRecord, depth: usize) -> fmt::Result {
    let indent = "  ".repeat(depth);
    write!(f, "{indent}{}", record.kind)?;
    if !record.node_type.is_empty() {
        write!(f, " {}", record.node_type)?;
    }
    if !record.label.is_empty() {
        write!(f, " '{}'", record.label)?;
    }
    if let Some(span) = record.src_position {
        write!(f, " from {}:{}", span.start_line, span.start_column)?;
    }
    if let Some(span) = record.dst_position {
        write!(f, " to {}:{}", span.start_line, span.start_column)?;
    }
    if record.src_path != record.dst_path {
        write!(
            f,
            " [{} -> {}]",
            record.src_path.display(),
            record.dst_path.display()
        )?;
    }
    writeln!(f)?;
    for member in &record.members {
        write_record(f, member, depth + 1)?;
    }
    Ok(())
}

/// Colorized unified diff for terminal display.
pub fn colorized_diff(original: &str, modified: &str, src_path: &Path, dst_path: &Path) -> String {
    const RED: &str = "\x1b[31m";
    const GREEN: &str = "\x1b[32m";
    const CYAN: &str = "\x1b[36m";
    const RESET: &str = "\x1b[0m";

    let diff = TextDiff::from_lines(original, modified);
    let mut output = format!(
        "{CYAN}--- a/{}{RESET}\n{CYAN}+++ b/{}{RESET}\n",
        src_path.display(),
        dst_path.display()
    );
    for group in diff.grouped_ops(3) {
        for op in &group {
            for change in diff.iter_changes(op) {
                let line = match change.tag() {
                    ChangeTag::Delete => format!("{RED}-{}{RESET}", change.value()),
                    ChangeTag::Insert => format!("{GREEN}+{}{RESET}", change.value()),
                    ChangeTag::Equal => format!(" {}", change.value()),
                };
                output.push_str(&line);
            }
        }
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::testing::tree;
    use crate::config::Thresholds;

    #[test]
    fn test_unified_diff_headers() {
        let out = unified_diff("a\nb\n", "a\nc\n", Path::new("x.java"), Path::new("y.java"));
        assert!(out.contains("--- a/x.java"));
        assert!(out.contains("+++ b/y.java"));
        assert!(out.contains("-b"));
        assert!(out.contains("+c"));
    }

    #[test]
    fn test_summary_counts_actions() {
        let src = tree("a(b:x c:y)");
        let dst = tree("a(b:z c:y)");
        let diff = AstDiff::compute(&src, &dst, &Thresholds::default()).unwrap();
        let mut summary = DiffSummary::from_ast_diff(&diff, "x\ny\n", "z\ny\n");

        assert_eq!(summary.files_changed, 1);
        assert_eq!(summary.insertions, 1);
        assert_eq!(summary.deletions, 1);
        assert_eq!(summary.actions.get("update-node"), Some(&1));

        summary.merge(&summary.clone());
        assert_eq!(summary.actions.get("update-node"), Some(&2));
        assert_eq!(
            summary.to_string(),
            "2 file(s) changed, 2 insertions(+), 2 deletions(-); 2 update-node"
        );
    }

    #[test]
    fn test_action_listing() {
        let src = tree("a(b:x)");
        let dst = tree("a(b:y)");
        let diff = AstDiff::compute(&src, &dst, &Thresholds::default()).unwrap();
        let text = ActionListing(&diff).to_string();

        assert!(text.starts_with("test.src -> test.src\n"));
        assert!(text.contains("  update-node b 'y' from "));
    }
}
