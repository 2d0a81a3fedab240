//! `native-replacer` CLI entrypoint.
//!
//! Wires the HTTP registry, the tar unpacker and the configuration file into
//! a [`Replacer`] and maps the outcome onto an exit code.

use camino::Utf8PathBuf;
use clap::Parser;
use native_replacer::artefact::download::HttpFetcher;
use native_replacer::artefact::extraction::TarUnpacker;
use native_replacer::artefact::replacement::ReplacementExtractor;
use native_replacer::catalog::HttpCatalog;
use native_replacer::cli::{Cli, Mode};
use native_replacer::config::{FileConfig, ResolvedConfig};
use native_replacer::error::{ReplacerError, Result};
use native_replacer::logging;
use native_replacer::output::write_stderr_line;
use native_replacer::pipeline::Replacer;
use std::io::Write;

fn main() {
    let cli = Cli::parse();
    let mut stderr = std::io::stderr();
    let (_, args) = cli.selected();
    if let Err(e) = logging::init(logging::level_for(args.verbosity, args.quiet)) {
        write_stderr_line(&mut stderr, format!("logging disabled: {e}"));
    }
    let run_result = run(&cli, &mut stderr);
    let exit_code = exit_code_for_run_result(run_result, &mut stderr);
    if exit_code != 0 {
        std::process::exit(exit_code);
    }
}

fn run(cli: &Cli, stderr: &mut dyn Write) -> Result<()> {
    let (mode, args) = cli.selected();
    let cwd = current_dir()?;

    let (config_path, required) = args.config_location(&cwd);
    let file = FileConfig::load(&config_path, required)?;
    let config = ResolvedConfig::resolve(file, args.overrides(), &cwd)?;

    let catalog = HttpCatalog::new(config.registry.clone(), config.timeout);
    let fetcher = HttpFetcher::new(config.registry.clone(), config.timeout);
    let unpacker = TarUnpacker;
    let extractor = ReplacementExtractor::new(&fetcher, &unpacker);
    let replacer = Replacer::new(&config, &catalog, &extractor).quiet(args.quiet);

    match mode {
        Mode::Run => replacer.run(stderr).map(|_| ()),
        Mode::Check => replacer.check(stderr).map(|_| ()),
        Mode::Tidy => replacer.tidy_only(stderr).map(|_| ()),
    }
}

fn current_dir() -> Result<Utf8PathBuf> {
    let cwd = std::env::current_dir()?;
    Utf8PathBuf::try_from(cwd)
        .map_err(|e| ReplacerError::NonUtf8Path(e.into_path_buf().display().to_string()))
}

fn exit_code_for_run_result(result: Result<()>, stderr: &mut dyn Write) -> i32 {
    match result {
        Ok(()) => 0,
        Err(err) => {
            write_stderr_line(stderr, format!("error: {err}"));
            1
        }
    }
}
