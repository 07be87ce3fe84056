// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Cask maintenance pipeline.
//!
//! One run is four strictly sequential stages sharing a single run context:
//!
//! 1. Load the static ignore list ([`crate::ignore`]).
//! 2. Scan installed casks for known problems ([`health`]).
//! 3. Remediate problem casks with bounded retries ([`remedy`]); casks that
//!    resist repair land in the session exclusion set.
//! 4. Upgrade outdated casks one at a time, minus both exclusion sets
//!    ([`upgrade`]).
//!
//! Everything is single threaded and blocking. Parallel upgrades were
//! considered and rejected; Homebrew holds global locks anyway, and the
//! sequential pipeline keeps the failure bookkeeping trivial.
//!
//! The run's only output is a [`RunSummary`]: an explicit value threaded
//! through the stages instead of hidden globals, so every stage stays
//! testable on its own.

pub mod health;
pub mod remedy;
pub mod upgrade;

use crate::{
    brew::PackageManager,
    config::RunConfig,
    ignore::IgnoreList,
    pipeline::{
        health::{scan_installed, HealthIssue},
        remedy::{RemedyReport, Remediator},
        upgrade::{upgrade_candidates, ExcludeReason, UpgradeOutcome},
    },
};

use indicatif::ProgressBar;
use std::fmt::{Display, Formatter, Result as FmtResult};
use tracing::{info, instrument};

/// Run-scoped exclusion set.
///
/// Starts empty every run, grown only by remediation exhaustion, read by the
/// upgrade stage, discarded at process end.
///
/// # Invariant
///
/// - A token in this set must never end a run with an `Upgraded` outcome.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SessionExclusions {
    tokens: Vec<String>,
}

impl SessionExclusions {
    pub fn insert(&mut self, token: impl Into<String>) {
        let token = token.into();
        if !self.tokens.contains(&token) {
            self.tokens.push(token);
        }
    }

    pub fn contains(&self, token: impl AsRef<str>) -> bool {
        self.tokens.iter().any(|seen| seen == token.as_ref())
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

/// Aggregated report of one pipeline run.
///
/// Mutated append-only as stages execute, finalized at orchestration end,
/// and the sole basis for the process exit code.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Problems found by the health scan, input order preserved.
    pub issues: Vec<HealthIssue>,

    /// What remediation did about them.
    pub remedy: RemedyReport,

    /// Final fate of every outdated cask.
    pub outcomes: Vec<UpgradeOutcome>,
}

impl RunSummary {
    /// Tokens upgraded successfully.
    pub fn upgraded(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|outcome| matches!(outcome, UpgradeOutcome::Upgraded { .. }))
            .map(UpgradeOutcome::token)
            .collect()
    }

    /// Tokens excluded pre-emptively, with their reasons.
    pub fn excluded(&self) -> Vec<(&str, &ExcludeReason)> {
        self.outcomes
            .iter()
            .filter_map(|outcome| match outcome {
                UpgradeOutcome::Excluded { token, reason } => Some((token.as_str(), reason)),
                _ => None,
            })
            .collect()
    }

    /// Tokens whose upgrade was attempted and failed.
    pub fn failed(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|outcome| matches!(outcome, UpgradeOutcome::Failed { .. }))
            .map(UpgradeOutcome::token)
            .collect()
    }

    /// Whether any attempted upgrade failed.
    ///
    /// Drives the process exit code: non-zero if and only if this is true.
    pub fn had_errors(&self) -> bool {
        !self.failed().is_empty()
    }
}

impl Display for RunSummary {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        let upgraded = self.upgraded();
        let excluded = self.excluded();
        let failed = self.failed();

        writeln!(fmt, "cask maintenance summary")?;
        writeln!(fmt, "  upgraded: {}", upgraded.len())?;
        for token in &upgraded {
            writeln!(fmt, "    {token}")?;
        }

        writeln!(fmt, "  excluded: {}", excluded.len())?;
        for (token, reason) in &excluded {
            match reason {
                ExcludeReason::IgnoreList { reason: Some(why) } => {
                    writeln!(fmt, "    {token}  (ignore list: {why})")?;
                }
                ExcludeReason::IgnoreList { reason: None } => {
                    writeln!(fmt, "    {token}  (ignore list)")?;
                }
                ExcludeReason::Session => {
                    writeln!(fmt, "    {token}  (failed remediation this session)")?;
                }
            }
        }

        writeln!(fmt, "  failed: {}", failed.len())?;
        for token in &failed {
            writeln!(fmt, "    {token}")?;
        }

        if !self.remedy.resolved.is_empty() {
            writeln!(fmt, "  repaired: {}", self.remedy.resolved.join(", "))?;
        }

        if !failed.is_empty() {
            writeln!(
                fmt,
                "hint: add persistently failing casks to the ignore file"
            )?;
        }

        Ok(())
    }
}

/// Pipeline orchestrator.
///
/// Owns the run configuration and drives the four stages over a generic
/// package manager collaborator.
#[derive(Debug)]
pub struct Orchestrator<P>
where
    P: PackageManager,
{
    brew: P,
    config: RunConfig,
    remediator: Remediator,
}

impl<P> Orchestrator<P>
where
    P: PackageManager,
{
    /// Construct new orchestrator.
    pub fn new(brew: P, config: RunConfig) -> Self {
        Self {
            brew,
            config,
            remediator: Remediator::new(),
        }
    }

    /// Swap in a custom remediator. Tests use this to skip retry delays.
    pub fn with_remediator(mut self, remediator: Remediator) -> Self {
        self.remediator = remediator;
        self
    }

    /// Run all four stages to completion.
    ///
    /// Stages 2 and 3 are skipped entirely when remediation is disabled in
    /// the configuration, in which case the upgrade stage sees an empty
    /// session exclusion set.
    ///
    /// # Errors
    ///
    /// - Return [`PipelineError::Ignore`] if a present ignore file cannot be
    ///   read.
    /// - Return [`PipelineError::Brew`] if the package manager CLI is
    ///   unavailable or a listing query fails. Per-cask failures never
    ///   propagate; they end up in the summary instead.
    #[instrument(skip(self, bar), level = "debug")]
    pub fn run(&self, bar: &ProgressBar) -> Result<RunSummary> {
        let ignore = IgnoreList::load(&self.config.ignore_file)?;
        let mut session = SessionExclusions::default();
        let mut summary = RunSummary::default();

        if self.config.remediate {
            let installed = self.brew.installed_casks()?;
            // INVARIANT: Ignore-listed casks never reach the remediator.
            let issues: Vec<HealthIssue> = scan_installed(&installed, |path| path.exists())
                .into_iter()
                .filter(|issue| !ignore.contains(&issue.token))
                .collect();
            info!("health scan found {} issue(s)", issues.len());

            summary.remedy = self
                .remediator
                .remediate(&self.brew, &issues, &mut session)?;
            summary.issues = issues;
        } else {
            info!("remediation disabled, skipping health scan");
        }

        let outdated = self.brew.outdated_casks()?;
        info!("{} outdated cask(s)", outdated.len());
        summary.outcomes = upgrade_candidates(&self.brew, &outdated, &ignore, &session, bar)?;

        Ok(summary)
    }

    /// Run the ignore list load and health scan alone, read-only.
    ///
    /// # Errors
    ///
    /// - Return [`PipelineError::Ignore`] if an existing ignore file cannot
    ///   be read.
    /// - Return [`PipelineError::Brew`] if the installed listing cannot be
    ///   obtained.
    pub fn doctor(&self) -> Result<DoctorReport> {
        let ignore = IgnoreList::load(&self.config.ignore_file)?;
        let installed = self.brew.installed_casks()?;
        let issues = scan_installed(&installed, |path| path.exists());
        let ignored = issues
            .iter()
            .filter(|issue| ignore.contains(&issue.token))
            .map(|issue| issue.token.clone())
            .collect();

        Ok(DoctorReport { issues, ignored })
    }
}

/// Outcome of a read-only health inspection.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DoctorReport {
    /// Problems found, in installed-list order.
    pub issues: Vec<HealthIssue>,

    /// Tokens among the issues that the static ignore list already parks.
    ignored: Vec<String>,
}

impl DoctorReport {
    pub fn is_healthy(&self) -> bool {
        self.issues.is_empty()
    }
}

impl Display for DoctorReport {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        for issue in &self.issues {
            if self.ignored.iter().any(|token| token == &issue.token) {
                writeln!(fmt, "{}: {}  (on ignore list)", issue.token, issue.kind)?;
            } else {
                writeln!(fmt, "{}: {}", issue.token, issue.kind)?;
            }
        }

        Ok(())
    }
}

/// Pipeline error types.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Ignore file handling fails.
    #[error(transparent)]
    Ignore(#[from] crate::ignore::IgnoreError),

    /// Package manager interaction fails fatally.
    #[error(transparent)]
    Brew(#[from] crate::brew::BrewError),
}

/// Friendly result alias :3
pub type Result<T, E = PipelineError> = std::result::Result<T, E>;

#[cfg(test)]
pub(crate) mod testing {
    use crate::brew::{BrewError, CaskState, CommandVerdict, PackageManager, Result as BrewResult};

    use std::{cell::RefCell, collections::HashMap, io};

    /// Scripted in-memory package manager for pipeline tests.
    ///
    /// Reinstall outcomes are a per-token queue consumed one attempt at a
    /// time; upgrade outcomes are a per-token verdict. Anything unscripted
    /// succeeds. Every mutating call lands in an ordered log.
    #[derive(Debug, Default)]
    pub(crate) struct FakeBrew {
        installed: Vec<CaskState>,
        outdated: Vec<String>,
        reinstall_scripts: RefCell<HashMap<String, Vec<bool>>>,
        reinstall_errors: Vec<String>,
        upgrade_results: HashMap<String, bool>,
        calls: RefCell<Vec<String>>,
    }

    impl FakeBrew {
        pub(crate) fn installed(mut self, casks: impl IntoIterator<Item = CaskState>) -> Self {
            self.installed = casks.into_iter().collect();
            self
        }

        pub(crate) fn outdated(mut self, tokens: &[&str]) -> Self {
            self.outdated = tokens.iter().map(ToString::to_string).collect();
            self
        }

        pub(crate) fn reinstall_script(
            self,
            token: &str,
            results: impl IntoIterator<Item = bool>,
        ) -> Self {
            self.reinstall_scripts
                .borrow_mut()
                .insert(token.to_owned(), results.into_iter().collect());
            self
        }

        /// Make every reinstall of target token fail to spawn at all.
        pub(crate) fn reinstall_error(mut self, token: &str) -> Self {
            self.reinstall_errors.push(token.to_owned());
            self
        }

        pub(crate) fn upgrade_result(mut self, token: &str, success: bool) -> Self {
            self.upgrade_results.insert(token.to_owned(), success);
            self
        }

        pub(crate) fn calls(&self) -> Vec<String> {
            self.calls.borrow().clone()
        }

        fn verdict(success: bool) -> CommandVerdict {
            CommandVerdict {
                success,
                output: if success {
                    "scripted success".into()
                } else {
                    "scripted failure".into()
                },
            }
        }
    }

    impl PackageManager for FakeBrew {
        fn installed_casks(&self) -> BrewResult<Vec<CaskState>> {
            Ok(self.installed.clone())
        }

        fn outdated_casks(&self) -> BrewResult<Vec<String>> {
            Ok(self.outdated.clone())
        }

        fn reinstall(&self, token: &str) -> BrewResult<CommandVerdict> {
            self.calls.borrow_mut().push(format!("reinstall {token}"));

            if self.reinstall_errors.iter().any(|t| t == token) {
                return Err(BrewError::Syscall(io::Error::from(
                    io::ErrorKind::PermissionDenied,
                )));
            }

            let mut scripts = self.reinstall_scripts.borrow_mut();
            let success = match scripts.get_mut(token) {
                Some(queue) if !queue.is_empty() => queue.remove(0),
                _ => true,
            };

            Ok(Self::verdict(success))
        }

        fn upgrade(&self, token: &str) -> BrewResult<CommandVerdict> {
            self.calls.borrow_mut().push(format!("upgrade {token}"));
            let success = self.upgrade_results.get(token).copied().unwrap_or(true);

            Ok(Self::verdict(success))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{brew::CaskState, pipeline::testing::FakeBrew};

    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;
    use std::{path::PathBuf, time::Duration};

    fn config_with_ignore(path: &str) -> RunConfig {
        RunConfig {
            ignore_file: PathBuf::from(path),
            ..RunConfig::default()
        }
    }

    fn fast_orchestrator(brew: FakeBrew, config: RunConfig) -> Orchestrator<FakeBrew> {
        Orchestrator::new(brew, config)
            .with_remediator(Remediator::with_retry_delay(Duration::ZERO))
    }

    /// Installed cask whose app source is gone.
    fn broken_cask(token: &str) -> CaskState {
        CaskState {
            token: token.into(),
            app_path: Some(PathBuf::from(format!("/nonexistent/{token}.app"))),
            versions: Some(vec!["1.0".into()]),
        }
    }

    #[sealed_test]
    fn ignored_casks_are_excluded_before_any_upgrade() -> anyhow::Result<()> {
        std::fs::write(".ignore", "arc  # app source missing\nopera\n")?;
        let brew = FakeBrew::default().outdated(&["arc", "opera", "iterm2"]);

        let orchestrator = fast_orchestrator(brew, config_with_ignore(".ignore"));
        let summary = orchestrator.run(&indicatif::ProgressBar::hidden())?;

        assert_eq!(summary.upgraded(), ["iterm2"]);
        assert_eq!(
            summary.excluded().iter().map(|(t, _)| *t).collect::<Vec<_>>(),
            ["arc", "opera"]
        );
        assert!(!summary.had_errors());
        assert_eq!(orchestrator.brew.calls(), ["upgrade iterm2"]);

        Ok(())
    }

    #[sealed_test]
    fn missing_ignore_file_and_empty_outdated_is_a_clean_run() -> anyhow::Result<()> {
        let brew = FakeBrew::default();

        let orchestrator = fast_orchestrator(brew, config_with_ignore("no-such-file"));
        let summary = orchestrator.run(&indicatif::ProgressBar::hidden())?;

        assert_eq!(summary, RunSummary::default());
        assert!(!summary.had_errors());

        Ok(())
    }

    #[sealed_test]
    fn repaired_cask_stays_eligible_for_upgrade() -> anyhow::Result<()> {
        let brew = FakeBrew::default()
            .installed([broken_cask("vivaldi")])
            .outdated(&["vivaldi"])
            .reinstall_script("vivaldi", [false, true]);

        let orchestrator = fast_orchestrator(brew, config_with_ignore("no-such-file"));
        let summary = orchestrator.run(&indicatif::ProgressBar::hidden())?;

        let attempts: Vec<_> = summary
            .remedy
            .attempts
            .iter()
            .map(|attempt| attempt.success)
            .collect();
        assert_eq!(attempts, [false, true]);
        assert_eq!(summary.upgraded(), ["vivaldi"]);
        assert!(summary.excluded().is_empty());

        Ok(())
    }

    #[sealed_test]
    fn unrepairable_cask_is_session_excluded_from_upgrade() -> anyhow::Result<()> {
        let brew = FakeBrew::default()
            .installed([broken_cask("skype")])
            .outdated(&["skype"])
            .reinstall_script("skype", [false, false]);

        let orchestrator = fast_orchestrator(brew, config_with_ignore("no-such-file"));
        let summary = orchestrator.run(&indicatif::ProgressBar::hidden())?;

        assert_eq!(summary.remedy.excluded, ["skype"]);
        assert_eq!(
            summary.excluded(),
            [("skype", &ExcludeReason::Session)]
        );
        assert!(summary.upgraded().is_empty());
        // Two reinstalls, zero upgrades.
        assert_eq!(
            orchestrator.brew.calls(),
            ["reinstall skype", "reinstall skype"]
        );

        Ok(())
    }

    #[sealed_test]
    fn ignored_cask_never_reaches_the_remediator() -> anyhow::Result<()> {
        std::fs::write(".ignore", "arc\n")?;
        let brew = FakeBrew::default().installed([broken_cask("arc")]);

        let orchestrator = fast_orchestrator(brew, config_with_ignore(".ignore"));
        let summary = orchestrator.run(&indicatif::ProgressBar::hidden())?;

        assert!(summary.issues.is_empty());
        assert!(orchestrator.brew.calls().is_empty());

        Ok(())
    }

    #[sealed_test]
    fn disabled_remediation_skips_straight_to_upgrades() -> anyhow::Result<()> {
        let brew = FakeBrew::default()
            .installed([broken_cask("vivaldi")])
            .outdated(&["iterm2"]);
        let config = RunConfig {
            remediate: false,
            ..config_with_ignore("no-such-file")
        };

        let orchestrator = fast_orchestrator(brew, config);
        let summary = orchestrator.run(&indicatif::ProgressBar::hidden())?;

        assert!(summary.issues.is_empty());
        assert_eq!(summary.remedy, RemedyReport::default());
        assert_eq!(summary.upgraded(), ["iterm2"]);
        assert_eq!(orchestrator.brew.calls(), ["upgrade iterm2"]);

        Ok(())
    }

    #[sealed_test]
    fn failed_upgrade_sets_had_errors() -> anyhow::Result<()> {
        let brew = FakeBrew::default()
            .outdated(&["foo", "bar"])
            .upgrade_result("foo", false);

        let orchestrator = fast_orchestrator(brew, config_with_ignore("no-such-file"));
        let summary = orchestrator.run(&indicatif::ProgressBar::hidden())?;

        assert_eq!(summary.failed(), ["foo"]);
        assert_eq!(summary.upgraded(), ["bar"]);
        assert!(summary.had_errors());

        Ok(())
    }

    #[sealed_test]
    fn doctor_reports_issues_without_touching_anything() -> anyhow::Result<()> {
        let brew = FakeBrew::default().installed([broken_cask("vivaldi")]);

        let orchestrator = fast_orchestrator(brew, config_with_ignore("no-such-file"));
        let report = orchestrator.doctor()?;

        assert_eq!(
            report.issues,
            [HealthIssue {
                token: "vivaldi".into(),
                kind: health::IssueKind::MissingAppSource,
            }]
        );
        assert!(!report.is_healthy());
        assert!(orchestrator.brew.calls().is_empty());

        Ok(())
    }

    #[sealed_test]
    fn doctor_flags_ignore_listed_casks() -> anyhow::Result<()> {
        std::fs::write(".casktend-ignore", "vivaldi  # parked\n")?;
        let brew = FakeBrew::default().installed([broken_cask("vivaldi"), broken_cask("arc")]);

        let orchestrator = fast_orchestrator(brew, config_with_ignore(".casktend-ignore"));
        let report = orchestrator.doctor()?;

        let expect = indoc! {r#"
            vivaldi: missing app source  (on ignore list)
            arc: missing app source
        "#};
        assert_eq!(report.to_string(), expect);

        Ok(())
    }

    #[test]
    fn summary_report_lists_everything() {
        let summary = RunSummary {
            issues: Vec::new(),
            remedy: RemedyReport {
                attempts: Vec::new(),
                resolved: vec!["vivaldi".into()],
                excluded: vec!["skype".into()],
            },
            outcomes: vec![
                UpgradeOutcome::Upgraded {
                    token: "iterm2".into(),
                },
                UpgradeOutcome::Excluded {
                    token: "arc".into(),
                    reason: ExcludeReason::IgnoreList {
                        reason: Some("app source missing".into()),
                    },
                },
                UpgradeOutcome::Excluded {
                    token: "skype".into(),
                    reason: ExcludeReason::Session,
                },
                UpgradeOutcome::Failed {
                    token: "foo".into(),
                    output: "boom".into(),
                },
            ],
        };

        let expect = indoc! {r#"
            cask maintenance summary
              upgraded: 1
                iterm2
              excluded: 2
                arc  (ignore list: app source missing)
                skype  (failed remediation this session)
              failed: 1
                foo
              repaired: vivaldi
            hint: add persistently failing casks to the ignore file
        "#};

        assert_eq!(summary.to_string(), expect);
    }
}
