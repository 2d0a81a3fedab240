//! Replacement run orchestration.
//!
//! A run walks a fixed sequence of [`Stage`]s. Discovery (Scan, Dedup) is
//! read-only, the availability gate runs once over the whole set, and only
//! when it passes are dependencies extracted and the bundled tree tidied.
//! A missing replacement therefore never leaves the package half-modified.

use std::collections::BTreeSet;
use std::fmt;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use camino::Utf8PathBuf;
use crossbeam_channel as channel;
use log::{debug, info};

use crate::artefact::replacement::{Extract, ExtractOptions, ExtractionError, ExtractionReport};
use crate::catalog::{ArtifactCatalog, AvailabilityChecker};
use crate::config::ResolvedConfig;
use crate::dependency_id::DependencyId;
use crate::discovery::{dependency_ids, native_artifacts};
use crate::error::{ReplacerError, Result};
use crate::output::{discovered_message, replaced_message, tidy_message, write_stderr_line};
use crate::tidy::{Tidier, TidyReport};

/// Steps of a replacement run, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    /// Locate native artifacts under the cache area.
    Scan,
    /// Reduce artifacts to unique dependency identifiers.
    Dedup,
    /// Confirm every replacement exists.
    CheckAvailability,
    /// Fetch and unpack each replacement.
    Extract,
    /// Prune the bundled dependency trees.
    Tidy,
    /// The run finished.
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Scan => "scan",
            Self::Dedup => "dedup",
            Self::CheckAvailability => "check-availability",
            Self::Extract => "extract",
            Self::Tidy => "tidy",
            Self::Done => "done",
        };
        f.write_str(label)
    }
}

/// What a run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Stages entered, in order.
    pub stages: Vec<Stage>,
    /// Native artifacts found by the scan.
    pub artifacts: Vec<Utf8PathBuf>,
    /// Unique identifiers derived from the artifacts.
    pub discovered: BTreeSet<DependencyId>,
    /// Identifiers replaced, sorted.
    pub replaced: Vec<DependencyId>,
    /// Result of the tidy pass, if it ran.
    pub tidy: Option<TidyReport>,
}

/// Drives a replacement run against injected collaborators.
pub struct Replacer<'a> {
    config: &'a ResolvedConfig,
    catalog: &'a dyn ArtifactCatalog,
    extractor: &'a dyn Extract,
    tidier: Tidier,
    quiet: bool,
}

impl<'a> Replacer<'a> {
    /// Create a replacer for `config`.
    #[must_use]
    pub fn new(
        config: &'a ResolvedConfig,
        catalog: &'a dyn ArtifactCatalog,
        extractor: &'a dyn Extract,
    ) -> Self {
        Self {
            config,
            catalog,
            extractor,
            tidier: Tidier::new(),
            quiet: false,
        }
    }

    /// Suppress stage announcements on stderr.
    #[must_use]
    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    /// Run every stage: discover, verify, extract, tidy.
    ///
    /// # Errors
    ///
    /// Returns the first error of any stage. Nothing is modified unless the
    /// availability gate passed; tidy failures are reported once the whole
    /// pass has finished, and the run then never reaches [`Stage::Done`].
    pub fn run(&self, stderr: &mut dyn Write) -> Result<RunSummary> {
        let mut summary = self.check(stderr)?;

        self.enter(Stage::Extract, &mut summary, stderr);
        summary.replaced = self.extract_all(&summary.discovered)?;
        self.announce(stderr, replaced_message(&summary.replaced));

        self.enter(Stage::Tidy, &mut summary, stderr);
        let report = self.tidy_pass(stderr);
        if !report.is_clean() {
            return Err(ReplacerError::Tidy {
                failures: report.failures,
            });
        }
        summary.tidy = Some(report);

        self.enter(Stage::Done, &mut summary, stderr);
        Ok(summary)
    }

    /// Discover and verify without modifying anything.
    ///
    /// # Errors
    ///
    /// Returns discovery errors, [`ReplacerError::MissingArtifacts`] or
    /// [`ReplacerError::Catalog`].
    pub fn check(&self, stderr: &mut dyn Write) -> Result<RunSummary> {
        let mut summary = RunSummary::default();
        let cache_area = &self.config.paths.cache_area;

        self.enter(Stage::Scan, &mut summary, stderr);
        summary.artifacts = native_artifacts(cache_area)?;

        self.enter(Stage::Dedup, &mut summary, stderr);
        summary.discovered = dependency_ids(cache_area, &summary.artifacts)?;
        self.announce(stderr, discovered_message(&summary.discovered));

        self.enter(Stage::CheckAvailability, &mut summary, stderr);
        AvailabilityChecker::new(self.catalog, &self.config.registry)
            .verify(&summary.discovered)?;

        Ok(summary)
    }

    /// Run only the tidy pass.
    ///
    /// # Errors
    ///
    /// Returns [`ReplacerError::Tidy`] when some paths could not be removed.
    pub fn tidy_only(&self, stderr: &mut dyn Write) -> Result<TidyReport> {
        let mut summary = RunSummary::default();
        self.enter(Stage::Tidy, &mut summary, stderr);
        let report = self.tidy_pass(stderr);
        if report.is_clean() {
            Ok(report)
        } else {
            Err(ReplacerError::Tidy {
                failures: report.failures,
            })
        }
    }

    fn tidy_pass(&self, stderr: &mut dyn Write) -> TidyReport {
        let report = self.tidier.tidy(&self.config.paths.project_root);
        self.announce(stderr, tidy_message(&report));
        report
    }

    /// Extract every identifier on at most `jobs` workers.
    ///
    /// Once any extraction fails no further identifier is started.
    fn extract_all(&self, ids: &BTreeSet<DependencyId>) -> Result<Vec<DependencyId>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let options = ExtractOptions::from(self.config);
        let workers = self.config.jobs.clamp(1, ids.len());
        let (work_tx, work_rx) = channel::unbounded::<DependencyId>();
        let (result_tx, result_rx) = channel::unbounded::<(
            DependencyId,
            std::result::Result<ExtractionReport, ExtractionError>,
        )>();
        for id in ids {
            let _ = work_tx.send(id.clone());
        }
        drop(work_tx);

        let failed = AtomicBool::new(false);
        thread::scope(|scope| {
            for _ in 0..workers {
                let work_rx = work_rx.clone();
                let result_tx = result_tx.clone();
                let failed = &failed;
                let options = &options;
                let extractor = self.extractor;
                scope.spawn(move || {
                    while let Ok(id) = work_rx.recv() {
                        if failed.load(Ordering::Acquire) {
                            break;
                        }
                        debug!("extracting {id}");
                        let outcome = extractor.extract(&id, options);
                        if outcome.is_err() {
                            failed.store(true, Ordering::Release);
                        }
                        let _ = result_tx.send((id, outcome));
                    }
                });
            }
        });
        drop(result_tx);

        let mut replaced = Vec::new();
        let mut first_failure = None;
        for (id, outcome) in result_rx {
            match outcome {
                Ok(report) => {
                    debug!("{id}: {} file(s) unpacked", report.files.len());
                    replaced.push(id);
                }
                Err(source) if first_failure.is_none() => {
                    first_failure = Some(ReplacerError::Extraction { id, source });
                }
                Err(source) => debug!("additional failure for {id}: {source}"),
            }
        }

        if let Some(err) = first_failure {
            return Err(err);
        }
        replaced.sort();
        Ok(replaced)
    }

    fn enter(&self, stage: Stage, summary: &mut RunSummary, stderr: &mut dyn Write) {
        info!("stage: {stage}");
        summary.stages.push(stage);
        let line = match stage {
            Stage::Scan => format!(
                "Scanning {} for native artifacts...",
                self.config.paths.cache_area
            ),
            Stage::Dedup => return,
            Stage::CheckAvailability => {
                format!("Checking prebuilt replacements at {}...", self.config.registry)
            }
            Stage::Extract => "Replacing compiled dependencies...".to_owned(),
            Stage::Tidy => format!("Tidying {}...", self.config.paths.project_root),
            Stage::Done => "Done.".to_owned(),
        };
        self.announce(stderr, line);
    }

    fn announce(&self, stderr: &mut dyn Write, message: impl fmt::Display) {
        if !self.quiet {
            write_stderr_line(stderr, message);
        }
    }
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
