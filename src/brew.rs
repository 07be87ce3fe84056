// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! External package manager seam.
//!
//! Homebrew has no structured API, so every interaction is a blocking shell
//! call that returns an exit status plus free text. This module keeps all of
//! that behind one narrow trait so the rest of the pipeline never touches a
//! subprocess, and so the text heuristics can be unit tested against fixture
//! output without a real `brew` on PATH.
//!
//! # False Success Detection
//!
//! Homebrew is known to sometimes exit 0 while having silently failed, e.g.
//! when a cask's ".app" source has gone missing from the Caskroom. The
//! adapter therefore scans command output against a table of known failure
//! phrases, and a match forces a failed verdict regardless of exit status.
//! The wording of those phrases tracks Homebrew's current output and will
//! drift as Homebrew changes; keep the table in [`FAILURE_PHRASES`] up to
//! date, and use the `extra_failure_phrases` configuration setting to patch
//! over new wording without a rebuild.

use std::{
    ffi::OsStr,
    fs::read_dir,
    path::{Path, PathBuf},
    process::Command,
};
use tracing::{debug, instrument, warn};

/// Known Homebrew failure phrases.
///
/// Matched case-sensitively as substrings of merged stdout/stderr. Any match
/// means the command failed no matter what the exit status claims. Update
/// this table when Homebrew rewords its diagnostics.
pub const FAILURE_PHRASES: &[&str] = &[
    "It seems the App source",
    "Failure while executing",
    "was not successfully uninstalled",
    "Permission denied",
];

/// Directory where cask applications are expected to land.
const APPLICATIONS_DIR: &str = "/Applications";

/// Layer of indirection for package manager access.
///
/// The four operations the pipeline needs from Homebrew, per stage: listing
/// for the health scan, reinstall for remediation, outdated plus upgrade for
/// the selective upgrade. Implementations must be strictly blocking; the
/// pipeline is single threaded by design.
pub trait PackageManager {
    /// List currently installed casks together with their local state.
    fn installed_casks(&self) -> Result<Vec<CaskState>>;

    /// List tokens of casks with an upgrade available.
    fn outdated_casks(&self) -> Result<Vec<String>>;

    /// Force reinstall one cask, clearing any stale local state.
    fn reinstall(&self, token: &str) -> Result<CommandVerdict>;

    /// Upgrade exactly one cask. Never batches.
    fn upgrade(&self, token: &str) -> Result<CommandVerdict>;
}

/// Locally observable state of one installed cask.
///
/// `None` fields mean the corresponding metadata could not be queried; the
/// health scanner treats those as healthy by omission rather than guessing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaskState {
    /// Cask token, e.g. "iterm2".
    pub token: String,

    /// Expected on-disk application path derived from cask artifact
    /// metadata.
    pub app_path: Option<PathBuf>,

    /// Version subdirectories found in the cask's Caskroom entry.
    pub versions: Option<Vec<String>>,
}

/// Interpreted result of one package manager command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandVerdict {
    /// Whether the command actually succeeded, after failure phrase
    /// scanning.
    pub success: bool,

    /// Merged stdout/stderr text of the command.
    pub output: String,
}

/// Package manager access through the Homebrew CLI.
#[derive(Debug, Clone)]
pub struct BrewCli {
    brew_bin: PathBuf,
    failure_phrases: Vec<String>,
}

impl Default for BrewCli {
    fn default() -> Self {
        Self::new()
    }
}

impl BrewCli {
    /// Construct new Homebrew adapter with the built-in phrase table.
    pub fn new() -> Self {
        Self {
            brew_bin: PathBuf::from("brew"),
            failure_phrases: FAILURE_PHRASES.iter().map(ToString::to_string).collect(),
        }
    }

    /// Extend the failure phrase table with user-configured entries.
    pub fn with_extra_phrases(mut self, phrases: impl IntoIterator<Item = String>) -> Self {
        self.failure_phrases.extend(phrases);
        self
    }

    /// Interpret raw command output into a final verdict.
    ///
    /// A failure phrase match forces `success` to false even when the exit
    /// status reported success.
    pub fn interpret_output(&self, exit_success: bool, output: impl Into<String>) -> CommandVerdict {
        let output = output.into();
        let phrase_hit = self
            .failure_phrases
            .iter()
            .find(|phrase| output.contains(phrase.as_str()));

        if let Some(phrase) = phrase_hit {
            if exit_success {
                warn!("exit status claimed success, but output matched {phrase:?}");
            }
        }

        CommandVerdict {
            success: exit_success && phrase_hit.is_none(),
            output,
        }
    }

    /// Invoke brew with target arguments.
    ///
    /// Returns raw exit success plus merged output. A non-zero exit is a
    /// normal outcome here; only a failure to spawn the process at all is an
    /// error.
    ///
    /// # Errors
    ///
    /// - Return [`BrewError::Unavailable`] if the brew executable cannot be
    ///   found at all.
    /// - Return [`BrewError::Syscall`] if the process cannot be spawned for
    ///   any other reason.
    fn brewcall(&self, args: impl IntoIterator<Item = impl AsRef<OsStr>>) -> Result<(bool, String)> {
        let output = Command::new(&self.brew_bin)
            .args(args)
            .output()
            .map_err(|err| match err.kind() {
                std::io::ErrorKind::NotFound => BrewError::Unavailable,
                _ => BrewError::Syscall(err),
            })?;

        let stdout = String::from_utf8_lossy(output.stdout.as_slice()).into_owned();
        let stderr = String::from_utf8_lossy(output.stderr.as_slice()).into_owned();
        let mut message = String::new();

        if !stdout.is_empty() {
            message.push_str(stdout.as_str());
        }

        if !stderr.is_empty() {
            if !message.is_empty() && !message.ends_with('\n') {
                message.push('\n');
            }
            message.push_str(stderr.as_str());
        }

        // INVARIANT: Chomp trailing newlines.
        let message = message
            .strip_suffix("\r\n")
            .or(message.strip_suffix('\n'))
            .map(ToString::to_string)
            .unwrap_or(message);

        Ok((output.status.success(), message))
    }

    /// Invoke brew for a listing query that must succeed.
    ///
    /// # Errors
    ///
    /// - Return [`BrewError::QueryFailed`] if brew reports failure, since no
    ///   stage can proceed on a partial listing.
    fn brewquery(&self, args: impl IntoIterator<Item = impl AsRef<OsStr>>) -> Result<String> {
        let (success, output) = self.brewcall(args)?;
        if !success {
            return Err(BrewError::QueryFailed { output });
        }

        Ok(output)
    }

    /// Determine the Caskroom root directory.
    fn caskroom_root(&self) -> Result<PathBuf> {
        let prefix = self.brewquery(["--prefix"])?;
        Ok(PathBuf::from(prefix.trim()).join("Caskroom"))
    }

    /// Query expected application path for one cask token.
    ///
    /// Parses the artifact section of `brew info --cask` for the first
    /// ".app" artifact. Returns `None` when the metadata query fails or no
    /// app artifact is listed; per-item metadata trouble never aborts a
    /// scan.
    fn query_app_path(&self, token: &str) -> Result<Option<PathBuf>> {
        let (success, output) = match self.brewcall(["info", "--cask", token]) {
            Ok(result) => result,
            // INVARIANT: Only total CLI unavailability aborts a scan.
            Err(err @ BrewError::Unavailable) => return Err(err),
            Err(err) => {
                warn!("metadata query failed for cask {token:?}: {err}");
                return Ok(None);
            }
        };
        if !success {
            warn!("metadata query failed for cask {token:?}, skipping artifact check");
            return Ok(None);
        }

        Ok(parse_app_artifact(&output).map(|app| Path::new(APPLICATIONS_DIR).join(app)))
    }

    /// List version subdirectories of one cask's Caskroom entry.
    fn list_versions(caskroom: &Path, token: &str) -> Option<Vec<String>> {
        let entry_dir = caskroom.join(token);
        let entries = match read_dir(&entry_dir) {
            Ok(entries) => entries,
            Err(err) => {
                warn!(
                    "cannot inspect caskroom entry {:?}: {err}",
                    entry_dir.display()
                );
                return None;
            }
        };

        let mut versions: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_dir())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .filter(|name| !name.starts_with('.'))
            .collect();
        versions.sort();

        Some(versions)
    }
}

impl PackageManager for BrewCli {
    #[instrument(skip(self), level = "debug")]
    fn installed_casks(&self) -> Result<Vec<CaskState>> {
        let listing = self.brewquery(["list", "--cask", "-1"])?;
        let tokens = parse_token_lines(&listing);
        let caskroom = self.caskroom_root()?;

        let mut casks = Vec::with_capacity(tokens.len());
        for token in tokens {
            let app_path = self.query_app_path(&token)?;
            let versions = Self::list_versions(&caskroom, &token);
            debug!("installed cask {token:?}: app={app_path:?} versions={versions:?}");

            casks.push(CaskState {
                token,
                app_path,
                versions,
            });
        }

        Ok(casks)
    }

    #[instrument(skip(self), level = "debug")]
    fn outdated_casks(&self) -> Result<Vec<String>> {
        let listing = self.brewquery(["outdated", "--cask", "--quiet"])?;
        Ok(parse_token_lines(&listing))
    }

    #[instrument(skip(self), level = "debug")]
    fn reinstall(&self, token: &str) -> Result<CommandVerdict> {
        let (success, output) = self.brewcall(["reinstall", "--cask", "--force", token])?;
        Ok(self.interpret_output(success, output))
    }

    #[instrument(skip(self), level = "debug")]
    fn upgrade(&self, token: &str) -> Result<CommandVerdict> {
        let (success, output) = self.brewcall(["upgrade", "--cask", token])?;
        Ok(self.interpret_output(success, output))
    }
}

/// Parse one token per line, trimmed, blank lines dropped, first duplicate
/// wins.
pub(crate) fn parse_token_lines(listing: &str) -> Vec<String> {
    let mut tokens: Vec<String> = Vec::new();
    for line in listing.lines() {
        let token = line.trim();
        if token.is_empty() || tokens.iter().any(|seen| seen == token) {
            continue;
        }
        tokens.push(token.to_owned());
    }

    tokens
}

/// Extract the first ".app" artifact name from `brew info --cask` output.
pub(crate) fn parse_app_artifact(info: &str) -> Option<String> {
    info.lines()
        .map(str::trim)
        .find_map(|line| line.strip_suffix(" (App)"))
        .map(str::trim)
        .filter(|app| app.ends_with(".app"))
        .map(str::to_owned)
}

/// Package manager error types.
#[derive(Debug, thiserror::Error)]
pub enum BrewError {
    /// Homebrew CLI itself cannot be found. Fatal: no stage can make
    /// progress without it.
    #[error("brew executable not found on PATH")]
    Unavailable,

    /// Process could not be spawned for some other environmental reason.
    #[error("failed to invoke brew")]
    Syscall(#[from] std::io::Error),

    /// A listing query brew must answer came back failed.
    #[error("brew query failed:\n{output}")]
    QueryFailed { output: String },
}

/// Friendly result alias :3
pub type Result<T, E = BrewError> = std::result::Result<T, E>;
