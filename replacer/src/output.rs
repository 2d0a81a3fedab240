//! User-facing progress and summary lines.
//!
//! The library reports detail through `log`; these helpers produce the short
//! lines printed on stderr for each stage and at the end of a run.

use std::collections::BTreeSet;
use std::io::Write;

use crate::dependency_id::DependencyId;
use crate::tidy::TidyReport;

/// Write one line to `stderr`, ignoring write failures.
pub fn write_stderr_line(stderr: &mut dyn Write, message: impl std::fmt::Display) {
    if writeln!(stderr, "{message}").is_err() {
        // Best-effort progress output.
    }
}

/// Describe the discovered set after deduplication.
///
/// # Example
///
/// ```
/// use std::collections::BTreeSet;
/// use native_replacer::dependency_id::DependencyId;
/// use native_replacer::output::discovered_message;
///
/// let ids: BTreeSet<_> = ["pg-0.21.0", "nokogiri-1.8.1"]
///     .into_iter()
///     .map(DependencyId::parse)
///     .collect::<Result<_, _>>()?;
/// assert_eq!(
///     discovered_message(&ids),
///     "Found 2 compiled dependencies: nokogiri-1.8.1, pg-0.21.0"
/// );
/// # Ok::<(), native_replacer::dependency_id::DependencyIdError>(())
/// ```
#[must_use]
pub fn discovered_message(ids: &BTreeSet<DependencyId>) -> String {
    if ids.is_empty() {
        return "No compiled dependencies found.".to_owned();
    }
    let noun = if ids.len() == 1 {
        "dependency"
    } else {
        "dependencies"
    };
    let list = ids
        .iter()
        .map(DependencyId::as_str)
        .collect::<Vec<_>>()
        .join(", ");
    format!("Found {} compiled {noun}: {list}", ids.len())
}

/// Summarise the replaced set.
#[must_use]
pub fn replaced_message(replaced: &[DependencyId]) -> String {
    let noun = if replaced.len() == 1 {
        "dependency"
    } else {
        "dependencies"
    };
    format!("Replaced {} compiled {noun}.", replaced.len())
}

/// Summarise a tidy pass.
#[must_use]
pub fn tidy_message(report: &TidyReport) -> String {
    format!(
        "Tidied {} dependenc{}: removed {} director{} and {} file{}.",
        report.dependencies,
        if report.dependencies == 1 { "y" } else { "ies" },
        report.removed_dirs,
        if report.removed_dirs == 1 { "y" } else { "ies" },
        report.removed_files,
        if report.removed_files == 1 { "" } else { "s" },
    )
}
