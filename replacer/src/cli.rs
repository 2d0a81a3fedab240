//! CLI argument definitions for `native-replacer`.
//!
//! Kept apart from the binary so argument parsing and the mapping onto
//! configuration overrides can be tested without spawning a process.

use camino::{Utf8Path, Utf8PathBuf};
use clap::{Parser, Subcommand};

use crate::config::{ConfigOverrides, DEFAULT_CONFIG_FILE};

/// Replace host-compiled native dependencies with prebuilt target binaries.
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "native-replacer")]
#[command(version, about)]
#[command(long_about = concat!(
    "Replace host-compiled native dependencies with prebuilt target binaries.\n\n",
    "Scans the build cache for compiled extensions, checks that the registry has a ",
    "prebuilt replacement for every one of them, and only then swaps them in and ",
    "tidies the bundled dependency trees. If any replacement is missing nothing is ",
    "modified and every missing dependency is listed.",
))]
#[command(after_help = concat!(
    "EXAMPLES:\n",
    "  Replace and tidy using .replacer.toml in the current directory:\n",
    "    $ native-replacer\n\n",
    "  Only check that every replacement exists:\n",
    "    $ native-replacer check --registry https://gems.example.com\n\n",
    "  Tidy an already-replaced project:\n",
    "    $ native-replacer tidy --project-root ./app",
))]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Run arguments (used when no subcommand is given).
    #[command(flatten)]
    pub args: RunArgs,
}

/// Available subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Discover, verify, replace and tidy (default).
    Run(RunArgs),

    /// Discover and verify only; nothing is modified.
    Check(RunArgs),

    /// Run only the tidy pass.
    Tidy(RunArgs),
}

/// What the binary should do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Full replacement run.
    Run,
    /// Verification only.
    Check,
    /// Tidy pass only.
    Tidy,
}

/// Options shared by every subcommand.
#[derive(Parser, Debug, Clone, Default, PartialEq, Eq)]
pub struct RunArgs {
    /// Configuration file [default: PROJECT_ROOT/.replacer.toml if present].
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<Utf8PathBuf>,

    /// Project root containing the bundled dependency tree.
    #[arg(long, value_name = "DIR")]
    pub project_root: Option<Utf8PathBuf>,

    /// Build root [default: PROJECT_ROOT/.build].
    #[arg(long, value_name = "DIR")]
    pub build_root: Option<Utf8PathBuf>,

    /// Registry base URL.
    #[arg(long, value_name = "URL")]
    pub registry: Option<String>,

    /// Number of parallel extractions.
    #[arg(short, long, value_name = "N")]
    pub jobs: Option<usize>,

    /// Network timeout in seconds.
    #[arg(long = "timeout", value_name = "SECS")]
    pub timeout_secs: Option<u64>,

    /// Increase log verbosity (repeatable: -v, -vv).
    #[arg(
        short,
        long = "verbose",
        action = clap::ArgAction::Count,
        conflicts_with = "quiet"
    )]
    pub verbosity: u8,

    /// Suppress progress output (errors still shown).
    #[arg(short, long, conflicts_with = "verbosity")]
    pub quiet: bool,
}

impl Cli {
    /// The selected mode and its arguments.
    ///
    /// Without a subcommand the top-level arguments drive a full run.
    ///
    /// # Examples
    ///
    /// ```
    /// use clap::Parser;
    /// use native_replacer::cli::{Cli, Mode};
    ///
    /// let cli = Cli::parse_from(["native-replacer", "check", "--jobs", "2"]);
    /// let (mode, args) = cli.selected();
    /// assert_eq!(mode, Mode::Check);
    /// assert_eq!(args.jobs, Some(2));
    /// ```
    #[must_use]
    pub fn selected(&self) -> (Mode, &RunArgs) {
        match &self.command {
            None => (Mode::Run, &self.args),
            Some(Command::Run(args)) => (Mode::Run, args),
            Some(Command::Check(args)) => (Mode::Check, args),
            Some(Command::Tidy(args)) => (Mode::Tidy, args),
        }
    }
}

impl RunArgs {
    /// Flags that override configuration file values.
    #[must_use]
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            project_root: self.project_root.clone(),
            build_root: self.build_root.clone(),
            registry: self.registry.clone(),
            jobs: self.jobs,
            timeout_secs: self.timeout_secs,
        }
    }

    /// The configuration file to load and whether it must exist.
    ///
    /// An explicit `--config` is required; the default location is optional.
    #[must_use]
    pub fn config_location(&self, cwd: &Utf8Path) -> (Utf8PathBuf, bool) {
        if let Some(path) = &self.config {
            return (absolute(cwd, path), true);
        }
        let project_root = self
            .project_root
            .as_deref()
            .map_or_else(|| cwd.to_owned(), |root| absolute(cwd, root));
        (project_root.join(DEFAULT_CONFIG_FILE), false)
    }
}

fn absolute(cwd: &Utf8Path, path: &Utf8Path) -> Utf8PathBuf {
    if path.is_absolute() {
        path.to_owned()
    } else {
        cwd.join(path)
    }
}

#[cfg(test)]
#[path = "cli_tests.rs"]
mod tests;
