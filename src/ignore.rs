// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Static ignore list handling.
//!
//! Utilities to manage the user-maintained ignore file that permanently
//! excludes casks from automated upgrade.
//!
//! # Ignore File Layout
//!
//! The ignore file is a plain text file with one cask token per line. An
//! optional trailing comment is introduced by '#', and the text after the
//! marker is kept as the human-readable reason for the exclusion. Blank
//! lines and comment-only lines are skipped. There is no escaping and no
//! quoting. The token is exactly the whitespace-trimmed text preceding the
//! comment marker, or the whole trimmed line when no marker is present.
//!
//! ```text
//! arc     # app source keeps going missing
//! opera
//! # temporarily parked:
//! docker  # upgrade wipes local settings
//! ```
//!
//! A missing ignore file is a normal condition and loads as an empty list.
//! Malformed lines (empty token before the comment marker) never abort a
//! load; they are logged and skipped.

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    fs::{read_to_string, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};
use tracing::{debug, warn};

/// Parsed static ignore list.
///
/// Holds cask tokens in file order together with their optional free-text
/// reasons. Loaded once per run and immutable afterward.
///
/// # Invariant
///
/// - No duplicate tokens; the first occurrence in the file wins.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IgnoreList {
    entries: Vec<IgnoreEntry>,
}

/// One ignore file entry: a cask token plus an optional reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IgnoreEntry {
    pub token: String,
    pub reason: Option<String>,
}

impl IgnoreList {
    /// Load ignore list from target path.
    ///
    /// A missing file yields an empty list without error. Reloading an
    /// unchanged file yields an identical list.
    ///
    /// # Errors
    ///
    /// - Return [`IgnoreError::ReadIgnoreFile`] if the file exists but
    ///   cannot be read.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!("no ignore file at {:?}, using empty list", path.display());
            return Ok(Self::default());
        }

        let content = read_to_string(path).map_err(|err| IgnoreError::ReadIgnoreFile {
            source: err,
            path: path.to_path_buf(),
        })?;

        Ok(Self::from(content.as_str()))
    }

    /// Check if target token is on the ignore list.
    pub fn contains(&self, token: impl AsRef<str>) -> bool {
        self.entries
            .iter()
            .any(|entry| entry.token == token.as_ref())
    }

    /// Look up the recorded reason for target token, if any.
    pub fn reason(&self, token: impl AsRef<str>) -> Option<&str> {
        self.entries
            .iter()
            .find(|entry| entry.token == token.as_ref())
            .and_then(|entry| entry.reason.as_deref())
    }

    /// Iterate over entries in file order.
    pub fn iter(&self) -> impl Iterator<Item = &IgnoreEntry> {
        self.entries.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Append new entries to the ignore file at target path.
    ///
    /// Creates the file and any missing parent directories if needed.
    /// Tokens already on the list are skipped so repeated runs never stack
    /// duplicates.
    ///
    /// # Errors
    ///
    /// - Return [`IgnoreError::WriteIgnoreFile`] if the file or its parent
    ///   directories cannot be created or written to.
    pub fn append_entries(
        path: impl AsRef<Path>,
        entries: impl IntoIterator<Item = IgnoreEntry>,
    ) -> Result<()> {
        let path = path.as_ref();
        let current = Self::load(path)?;

        if let Some(parent) = path.parent() {
            mkdirp::mkdirp(parent).map_err(|err| IgnoreError::WriteIgnoreFile {
                source: err,
                path: path.to_path_buf(),
            })?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|err| IgnoreError::WriteIgnoreFile {
                source: err,
                path: path.to_path_buf(),
            })?;

        for entry in entries {
            if current.contains(&entry.token) {
                debug!("token {:?} already ignored, not appending", entry.token);
                continue;
            }

            let line = match &entry.reason {
                Some(reason) => format!("{}  # {}\n", entry.token, reason),
                None => format!("{}\n", entry.token),
            };
            file.write_all(line.as_bytes())
                .map_err(|err| IgnoreError::WriteIgnoreFile {
                    source: err,
                    path: path.to_path_buf(),
                })?;
        }

        Ok(())
    }
}

impl From<&str> for IgnoreList {
    fn from(content: &str) -> Self {
        let mut entries: Vec<IgnoreEntry> = Vec::new();
        for line in content.lines() {
            let (raw_token, raw_reason) = match line.split_once('#') {
                Some((token, reason)) => (token, Some(reason)),
                None => (line, None),
            };

            let token = raw_token.trim();
            if token.is_empty() {
                // Blank line or comment-only line.
                continue;
            }

            if entries.iter().any(|entry| entry.token == token) {
                warn!("duplicate ignore entry for {token:?}, keeping first");
                continue;
            }

            let reason = raw_reason
                .map(str::trim)
                .filter(|reason| !reason.is_empty())
                .map(str::to_owned);

            entries.push(IgnoreEntry {
                token: token.to_owned(),
                reason,
            });
        }

        Self { entries }
    }
}

impl Display for IgnoreList {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        for entry in &self.entries {
            match &entry.reason {
                Some(reason) => writeln!(fmt, "{}  # {}", entry.token, reason)?,
                None => writeln!(fmt, "{}", entry.token)?,
            }
        }

        Ok(())
    }
}

/// Ignore list error types.
#[derive(Debug, thiserror::Error)]
pub enum IgnoreError {
    /// Ignore file exists, but cannot be read from.
    #[error("failed to read ignore file at {:?}", path.display())]
    ReadIgnoreFile {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Ignore file cannot be created or written to.
    #[error("failed to write ignore file at {:?}", path.display())]
    WriteIgnoreFile {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
}

/// Friendly result alias :3
pub type Result<T, E = IgnoreError> = std::result::Result<T, E>;
