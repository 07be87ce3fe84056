// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Pre-emptive Homebrew cask remediation.
//!
//! Homebrew sometimes leaves GUI casks in a state where `brew upgrade`
//! exits 0 while doing nothing useful: the ".app" source has gone missing,
//! or the Caskroom holds conflicting versions. Casktend front-runs those
//! failures instead of discovering them mid-upgrade. One run is a short
//! sequential pipeline:
//!
//! 1. Load the user's static ignore list.
//! 2. Scan installed casks for known problems.
//! 3. Repair problem casks with bounded, delayed retries; unrepairable
//!    casks are excluded for the rest of the session.
//! 4. Upgrade each remaining outdated cask individually, so one failure
//!    never aborts the rest, and report the whole run in one summary.
//!
//! Everything Homebrew-shaped sits behind the [`brew::PackageManager`]
//! trait, so the pipeline itself never spawns a process and the text
//! heuristics stay unit testable.

pub mod brew;
pub mod config;
pub mod ignore;
pub mod path;
pub mod pipeline;

pub use brew::{BrewCli, PackageManager};
pub use config::RunConfig;
pub use ignore::IgnoreList;
pub use pipeline::{DoctorReport, Orchestrator, RunSummary};
