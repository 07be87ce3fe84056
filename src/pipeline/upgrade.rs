// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Selective cask upgrading.
//!
//! Computes the candidate set, records pre-emptive exclusions, and upgrades
//! each remaining candidate one at a time.
//!
//! # Pre-emptive Exclusion
//!
//! `candidates = outdated - ignore list - session exclusions`, and every
//! exclusion is recorded before the first external upgrade call of the run.
//! The whole point of the workflow is to never spend time or network on a
//! cask already known to be excluded.
//!
//! # Isolation
//!
//! Each candidate gets its own `brew upgrade` invocation, never a batch
//! call, so one failing cask cannot abort the others. Failures here are
//! terminal for the run: retries belong exclusively to the remediation
//! stage.

use crate::{
    brew::{BrewError, PackageManager, Result as BrewResult},
    ignore::IgnoreList,
    pipeline::SessionExclusions,
};

use indicatif::ProgressBar;
use tracing::{debug, info, instrument, warn};

/// Final fate of one outdated cask.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpgradeOutcome {
    /// Upgrade ran and succeeded.
    Upgraded { token: String },

    /// Filtered out before any upgrade call was made.
    Excluded {
        token: String,
        reason: ExcludeReason,
    },

    /// Upgrade ran and failed, by exit status or by failure phrase.
    Failed { token: String, output: String },
}

impl UpgradeOutcome {
    pub fn token(&self) -> &str {
        match self {
            Self::Upgraded { token }
            | Self::Excluded { token, .. }
            | Self::Failed { token, .. } => token,
        }
    }
}

/// Which set caused a pre-emptive exclusion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExcludeReason {
    /// Static ignore list, with the file's free text reason when present.
    IgnoreList { reason: Option<String> },

    /// Session exclusion set, grown by failed remediation this run.
    Session,
}

/// Upgrade every outdated cask that survives both exclusion sets.
///
/// Outcomes list every outdated cask exactly once: exclusions first in
/// outdated-list order, then one terminal outcome per attempted candidate.
///
/// # Errors
///
/// - Return [`BrewError::Unavailable`] if the package manager CLI itself is
///   gone; per-cask upgrade failures are recorded as outcomes instead.
#[instrument(skip_all, level = "debug")]
pub fn upgrade_candidates(
    brew: &impl PackageManager,
    outdated: &[String],
    ignore: &IgnoreList,
    session: &SessionExclusions,
    bar: &ProgressBar,
) -> BrewResult<Vec<UpgradeOutcome>> {
    let mut outcomes = Vec::with_capacity(outdated.len());
    let mut candidates: Vec<&str> = Vec::new();

    // INVARIANT: Record every exclusion before the first upgrade call.
    for token in outdated {
        if ignore.contains(token) {
            debug!("cask {token:?} excluded by ignore list");
            outcomes.push(UpgradeOutcome::Excluded {
                token: token.clone(),
                reason: ExcludeReason::IgnoreList {
                    reason: ignore.reason(token).map(str::to_owned),
                },
            });
        } else if session.contains(token) {
            debug!("cask {token:?} excluded by session exclusion set");
            outcomes.push(UpgradeOutcome::Excluded {
                token: token.clone(),
                reason: ExcludeReason::Session,
            });
        } else {
            candidates.push(token);
        }
    }

    bar.set_length(candidates.len() as u64);
    for token in candidates {
        bar.set_message(token.to_owned());
        outcomes.push(upgrade_one(brew, token)?);
        bar.inc(1);
    }
    bar.finish_and_clear();

    Ok(outcomes)
}

fn upgrade_one(brew: &impl PackageManager, token: &str) -> BrewResult<UpgradeOutcome> {
    info!("upgrading cask {token:?}");
    let outcome = match brew.upgrade(token) {
        Ok(verdict) if verdict.success => UpgradeOutcome::Upgraded {
            token: token.to_owned(),
        },
        Ok(verdict) => {
            warn!("upgrade failed for cask {token:?}");
            UpgradeOutcome::Failed {
                token: token.to_owned(),
                output: verdict.output,
            }
        }
        // INVARIANT: Only total CLI unavailability aborts the run.
        Err(err @ BrewError::Unavailable) => return Err(err),
        Err(err) => {
            warn!("could not invoke upgrade for cask {token:?}: {err}");
            UpgradeOutcome::Failed {
                token: token.to_owned(),
                output: err.to_string(),
            }
        }
    };

    Ok(outcome)
}
