// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Problem cask remediation.
//!
//! Attempts to repair each problematic cask found by the health scan through
//! a bounded number of forced reinstalls. A cask that resists repair is
//! added to the session exclusion set so the upgrade stage never wastes a
//! network call on it.
//!
//! # State Machine
//!
//! Each cask walks an explicit little machine:
//!
//! ```text
//! Pending -> Attempting(n) -> Resolved
//!                          -> Retrying(n) -> Attempting(n + 1)
//!                          -> Excluded
//! ```
//!
//! At most [`MAX_ATTEMPTS`] reinstalls happen per cask, with a constant
//! [`RETRY_DELAY`] pause between them. Remediation is strictly sequential:
//! one cask at a time, one attempt at a time, and one cask's fate never
//! affects another's eligibility.

use crate::{
    brew::{BrewError, PackageManager, Result as BrewResult},
    pipeline::{health::HealthIssue, SessionExclusions},
};

use std::{thread::sleep, time::Duration};
use tracing::{debug, info, instrument, warn};

/// Maximum reinstall attempts per cask.
pub const MAX_ATTEMPTS: u32 = 2;

/// Constant pause between reinstall attempts. Not a backoff multiplier.
pub const RETRY_DELAY: Duration = Duration::from_secs(2);

/// States a cask moves through during remediation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RemedyState {
    Pending,
    Attempting(u32),
    Retrying(u32),
    Resolved,
    Excluded,
}

/// One reinstall attempt and how it went. Attempt numbers are 1-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemediationAttempt {
    pub token: String,
    pub attempt: u32,
    pub success: bool,
}

/// What remediation did across all problem casks.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RemedyReport {
    /// Every reinstall attempt made, in order.
    pub attempts: Vec<RemediationAttempt>,

    /// Casks repaired successfully.
    pub resolved: Vec<String>,

    /// Casks that exhausted their attempts and got session-excluded.
    pub excluded: Vec<String>,
}

/// Problem cask remediator.
#[derive(Debug, Clone)]
pub struct Remediator {
    retry_delay: Duration,
}

impl Default for Remediator {
    fn default() -> Self {
        Self::new()
    }
}

impl Remediator {
    /// Construct new remediator with the standard retry delay.
    pub fn new() -> Self {
        Self {
            retry_delay: RETRY_DELAY,
        }
    }

    /// Construct new remediator with a custom retry delay.
    ///
    /// The real pipeline always uses [`RETRY_DELAY`]; this exists so tests
    /// can pass [`Duration::ZERO`] instead of sleeping.
    pub fn with_retry_delay(retry_delay: Duration) -> Self {
        Self { retry_delay }
    }

    /// Attempt repair for every problem cask.
    ///
    /// A cask reported with several issue kinds is remediated once, since
    /// the repair action is the same forced reinstall for all of them.
    /// Casks that exhaust their attempts land in `session`.
    ///
    /// # Errors
    ///
    /// - Return [`BrewError::Unavailable`](crate::brew::BrewError) if the
    ///   package manager CLI itself is gone; any other failure is absorbed
    ///   into the report.
    #[instrument(skip(self, brew, issues, session), level = "debug")]
    pub fn remediate(
        &self,
        brew: &impl PackageManager,
        issues: &[HealthIssue],
        session: &mut SessionExclusions,
    ) -> BrewResult<RemedyReport> {
        let mut report = RemedyReport::default();

        let mut tokens: Vec<&str> = Vec::new();
        for issue in issues {
            if !tokens.contains(&issue.token.as_str()) {
                tokens.push(issue.token.as_str());
            }
        }

        for token in tokens {
            if self.remediate_one(brew, token, &mut report)? {
                info!("repaired cask {token:?}");
                report.resolved.push(token.to_owned());
            } else {
                warn!("cask {token:?} exhausted retries, excluding for this session");
                session.insert(token);
                report.excluded.push(token.to_owned());
            }
        }

        Ok(report)
    }

    /// Walk the remedy state machine for one cask. True means repaired.
    fn remediate_one(
        &self,
        brew: &impl PackageManager,
        token: &str,
        report: &mut RemedyReport,
    ) -> BrewResult<bool> {
        let mut state = RemedyState::Pending;

        loop {
            state = match state {
                RemedyState::Pending => RemedyState::Attempting(1),
                RemedyState::Attempting(attempt) => {
                    debug!("reinstalling cask {token:?}, attempt {attempt}/{MAX_ATTEMPTS}");
                    let success = match brew.reinstall(token) {
                        Ok(verdict) => verdict.success,
                        // INVARIANT: Only total CLI unavailability aborts
                        // the run.
                        Err(err @ BrewError::Unavailable) => return Err(err),
                        Err(err) => {
                            warn!("could not invoke reinstall for cask {token:?}: {err}");
                            false
                        }
                    };
                    report.attempts.push(RemediationAttempt {
                        token: token.to_owned(),
                        attempt,
                        success,
                    });

                    if success {
                        RemedyState::Resolved
                    } else if attempt < MAX_ATTEMPTS {
                        RemedyState::Retrying(attempt)
                    } else {
                        RemedyState::Excluded
                    }
                }
                RemedyState::Retrying(attempt) => {
                    debug!("attempt {attempt} failed for {token:?}, pausing before retry");
                    sleep(self.retry_delay);
                    RemedyState::Attempting(attempt + 1)
                }
                RemedyState::Resolved => return Ok(true),
                RemedyState::Excluded => return Ok(false),
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{health::IssueKind, testing::FakeBrew};
    use pretty_assertions::assert_eq;

    fn issue(token: &str, kind: IssueKind) -> HealthIssue {
        HealthIssue {
            token: token.into(),
            kind,
        }
    }

    fn remediator() -> Remediator {
        Remediator::with_retry_delay(Duration::ZERO)
    }

    #[test]
    fn first_attempt_success_resolves_without_retry() -> anyhow::Result<()> {
        let brew = FakeBrew::default().reinstall_script("vivaldi", [true]);
        let mut session = SessionExclusions::default();

        let report = remediator().remediate(
            &brew,
            &[issue("vivaldi", IssueKind::MissingAppSource)],
            &mut session,
        )?;

        assert_eq!(report.resolved, ["vivaldi"]);
        assert!(report.excluded.is_empty());
        assert!(session.is_empty());
        assert_eq!(brew.calls(), ["reinstall vivaldi"]);

        Ok(())
    }

    #[test]
    fn failure_then_success_resolves_on_second_attempt() -> anyhow::Result<()> {
        let brew = FakeBrew::default().reinstall_script("vivaldi", [false, true]);
        let mut session = SessionExclusions::default();

        let report = remediator().remediate(
            &brew,
            &[issue("vivaldi", IssueKind::MissingAppSource)],
            &mut session,
        )?;

        let outcomes: Vec<_> = report
            .attempts
            .iter()
            .map(|attempt| (attempt.attempt, attempt.success))
            .collect();
        assert_eq!(outcomes, [(1, false), (2, true)]);
        assert_eq!(report.resolved, ["vivaldi"]);
        assert!(!session.contains("vivaldi"));

        Ok(())
    }

    #[test]
    fn exhausted_attempts_excludes_for_session() -> anyhow::Result<()> {
        let brew = FakeBrew::default().reinstall_script("skype", [false, false]);
        let mut session = SessionExclusions::default();

        let report = remediator().remediate(
            &brew,
            &[issue("skype", IssueKind::MissingAppSource)],
            &mut session,
        )?;

        assert_eq!(report.excluded, ["skype"]);
        assert!(session.contains("skype"));
        // Retry bound: never a third reinstall.
        assert_eq!(brew.calls(), ["reinstall skype", "reinstall skype"]);

        Ok(())
    }

    #[test]
    fn multiple_issue_kinds_remediated_once() -> anyhow::Result<()> {
        let brew = FakeBrew::default().reinstall_script("broken", [true]);
        let mut session = SessionExclusions::default();

        let report = remediator().remediate(
            &brew,
            &[
                issue("broken", IssueKind::MissingAppSource),
                issue("broken", IssueKind::VersionConflict),
            ],
            &mut session,
        )?;

        assert_eq!(report.resolved, ["broken"]);
        assert_eq!(brew.calls(), ["reinstall broken"]);

        Ok(())
    }

    #[test]
    fn one_cask_failing_does_not_stop_the_next() -> anyhow::Result<()> {
        let brew = FakeBrew::default()
            .reinstall_script("skype", [false, false])
            .reinstall_script("vivaldi", [true]);
        let mut session = SessionExclusions::default();

        let report = remediator().remediate(
            &brew,
            &[
                issue("skype", IssueKind::MissingAppSource),
                issue("vivaldi", IssueKind::StaleMetadata),
            ],
            &mut session,
        )?;

        assert_eq!(report.excluded, ["skype"]);
        assert_eq!(report.resolved, ["vivaldi"]);

        Ok(())
    }

    #[test]
    fn spawn_failure_counts_as_failed_attempt() -> anyhow::Result<()> {
        let brew = FakeBrew::default()
            .reinstall_error("vivaldi")
            .reinstall_script("arc", [true]);
        let mut session = SessionExclusions::default();

        let report = remediator().remediate(
            &brew,
            &[
                issue("vivaldi", IssueKind::MissingAppSource),
                issue("arc", IssueKind::VersionConflict),
            ],
            &mut session,
        )?;

        // Both bounded attempts happen, both count as failures, and the
        // run carries on to the next cask.
        let outcomes: Vec<_> = report
            .attempts
            .iter()
            .filter(|attempt| attempt.token == "vivaldi")
            .map(|attempt| (attempt.attempt, attempt.success))
            .collect();
        assert_eq!(outcomes, [(1, false), (2, false)]);
        assert_eq!(report.excluded, ["vivaldi"]);
        assert!(session.contains("vivaldi"));
        assert_eq!(report.resolved, ["arc"]);

        Ok(())
    }
}
