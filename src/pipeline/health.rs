// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Installed cask health scanning.
//!
//! Classifies installed casks as healthy or problematic using a small set of
//! read-only heuristics over the local state Homebrew exposes. The scanner
//! never mutates anything; repair belongs to the remediation stage.
//!
//! # Heuristics
//!
//! - [`IssueKind::MissingAppSource`]: the cask's expected ".app" artifact is
//!   absent from the applications directory. Upgrading such a cask tends to
//!   "succeed" with exit 0 while doing nothing, which is the false success
//!   this whole workflow exists to catch early.
//! - [`IssueKind::VersionConflict`]: the Caskroom entry holds more than one
//!   version subdirectory, which confuses Homebrew's upgrade bookkeeping.
//! - [`IssueKind::StaleMetadata`]: the Caskroom entry exists but holds no
//!   version subdirectory at all.
//!
//! A cask whose metadata could not be queried is treated as healthy by
//! omission; one unreadable cask must not abort the scan of the rest.

use crate::brew::CaskState;

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    path::Path,
};
use tracing::{debug, warn};

/// One problematic cask found by the scanner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthIssue {
    /// Token of the affected cask.
    pub token: String,

    /// What is wrong with it.
    pub kind: IssueKind,
}

/// Closed set of problem kinds the scanner can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueKind {
    /// Expected application artifact is missing from disk.
    MissingAppSource,

    /// More than one version subdirectory in the Caskroom entry.
    VersionConflict,

    /// Caskroom entry exists with zero version subdirectories.
    StaleMetadata,
}

impl Display for IssueKind {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::MissingAppSource => fmt.write_str("missing app source"),
            Self::VersionConflict => fmt.write_str("conflicting versions"),
            Self::StaleMetadata => fmt.write_str("stale metadata"),
        }
    }
}

/// Scan installed casks for known problems.
///
/// Issues come back in input order, at most one issue per kind per cask, and
/// a cask carrying several problems reports all of them. The filesystem
/// lookup is injected so tests never need a real applications directory.
pub fn scan_installed<F>(casks: &[CaskState], path_exists: F) -> Vec<HealthIssue>
where
    F: Fn(&Path) -> bool,
{
    let mut issues = Vec::new();
    for cask in casks {
        match &cask.app_path {
            Some(app_path) => {
                if !path_exists(app_path) {
                    debug!("cask {:?} missing app at {:?}", cask.token, app_path.display());
                    issues.push(HealthIssue {
                        token: cask.token.clone(),
                        kind: IssueKind::MissingAppSource,
                    });
                }
            }
            None => warn!("no artifact metadata for cask {:?}, assuming healthy", cask.token),
        }

        match &cask.versions {
            Some(versions) if versions.len() > 1 => {
                debug!("cask {:?} has versions {versions:?}", cask.token);
                issues.push(HealthIssue {
                    token: cask.token.clone(),
                    kind: IssueKind::VersionConflict,
                });
            }
            Some(versions) if versions.is_empty() => {
                issues.push(HealthIssue {
                    token: cask.token.clone(),
                    kind: IssueKind::StaleMetadata,
                });
            }
            Some(_) => {}
            None => warn!("no caskroom metadata for cask {:?}, assuming healthy", cask.token),
        }
    }

    issues
}
