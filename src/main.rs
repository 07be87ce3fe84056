// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use casktend::{
    ignore::{IgnoreEntry, IgnoreList},
    pipeline::Orchestrator,
    BrewCli, RunConfig, RunSummary,
};

use anyhow::Result;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use inquire::Confirm;
use std::{
    path::{Path, PathBuf},
    process::exit,
};
use tracing::{debug, error, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "\n  casktend [options] <casktend-command>",
    subcommand_help_heading = "Commands",
    version
)]
struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Run selected command. True means the run had per-cask errors.
    fn run(self) -> Result<bool> {
        match self.command {
            Command::Run(opts) => run_pipeline(opts),
            Command::Doctor(opts) => run_doctor(opts),
            Command::Ignored(opts) => run_ignored(opts),
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Remediate problem casks, then upgrade everything not excluded.
    #[command(override_usage = "casktend run [options]")]
    Run(RunOptions),

    /// Scan installed casks for problems without touching anything.
    #[command(override_usage = "casktend doctor")]
    Doctor(DoctorOptions),

    /// Show the parsed ignore list with reasons.
    #[command(override_usage = "casktend ignored [options]")]
    Ignored(IgnoredOptions),
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct RunOptions {
    /// Path to the static ignore file.
    #[arg(short, long, value_name = "path")]
    pub ignore_file: Option<PathBuf>,

    /// Skip the health scan and remediation stages.
    #[arg(long)]
    pub no_remediate: bool,

    /// Print per-cask progress while the run executes.
    #[arg(short, long)]
    pub verbose: bool,

    /// Never prompt; skip the offer to park failed casks in the ignore file.
    #[arg(long)]
    pub no_input: bool,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct DoctorOptions {}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct IgnoredOptions {
    /// Path to the static ignore file.
    #[arg(short, long, value_name = "path")]
    pub ignore_file: Option<PathBuf>,
}

fn main() {
    let layer = fmt::layer().compact();
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();
    tracing_subscriber::registry().with(layer).with(filter).init();

    match Cli::parse().run() {
        // INVARIANT: Exit non-zero iff the run recorded failed casks.
        Ok(had_errors) => exit(i32::from(had_errors)),
        Err(error) => {
            error!("{error:?}");
            exit(1);
        }
    }
}

fn run_pipeline(opts: RunOptions) -> Result<bool> {
    let mut config = RunConfig::load()?;
    if let Some(path) = opts.ignore_file {
        config.ignore_file = path;
    }
    if opts.no_remediate {
        config.remediate = false;
    }
    if opts.verbose {
        config.verbose = true;
    }

    let brew = BrewCli::new().with_extra_phrases(config.extra_failure_phrases.clone());
    let bar = progress_bar(config.verbose)?;
    let ignore_file = config.ignore_file.clone();

    let summary = Orchestrator::new(brew, config).run(&bar)?;
    print!("{summary}");

    if summary.had_errors() && !opts.no_input {
        offer_ignore_append(&summary, &ignore_file);
    }

    Ok(summary.had_errors())
}

fn run_doctor(_opts: DoctorOptions) -> Result<bool> {
    let config = RunConfig::load()?;
    let brew = BrewCli::new().with_extra_phrases(config.extra_failure_phrases.clone());

    match Orchestrator::new(brew, config).doctor() {
        Ok(report) if report.is_healthy() => println!("all installed casks look healthy"),
        Ok(report) => print!("{report}"),
        Err(err) => warn!("health inspection could not complete: {err}"),
    }

    // Inspection only; never escalates into a failing exit code.
    Ok(false)
}

fn run_ignored(opts: IgnoredOptions) -> Result<bool> {
    let mut config = RunConfig::load()?;
    if let Some(path) = opts.ignore_file {
        config.ignore_file = path;
    }

    let list = IgnoreList::load(&config.ignore_file)?;
    if list.is_empty() {
        println!("ignore list at {:?} is empty", config.ignore_file.display());
    } else {
        print!("{list}");
    }

    Ok(false)
}

fn progress_bar(verbose: bool) -> Result<ProgressBar> {
    if !verbose {
        return Ok(ProgressBar::hidden());
    }

    let style = ProgressStyle::with_template(
        "{elapsed_precise:.green}  {msg:<50}  [{wide_bar:.yellow/blue}]",
    )?
    .progress_chars("-Cco.");

    Ok(ProgressBar::new(0).with_style(style))
}

/// Offer to park failed casks in the ignore file.
///
/// Declining or running without a terminal both leave the file alone; the
/// summary already told the user what failed.
fn offer_ignore_append(summary: &RunSummary, ignore_file: &Path) {
    let failed = summary.failed();
    let question = format!(
        "add {} failed cask(s) to {:?}?",
        failed.len(),
        ignore_file.display()
    );

    match Confirm::new(&question).with_default(false).prompt() {
        Ok(true) => {
            let entries = failed.into_iter().map(|token| IgnoreEntry {
                token: token.to_owned(),
                reason: Some("repeated upgrade failure".into()),
            });
            if let Err(err) = IgnoreList::append_entries(ignore_file, entries) {
                warn!("{err}");
            }
        }
        Ok(false) => {}
        Err(err) => debug!("skipping ignore file prompt: {err}"),
    }
}
