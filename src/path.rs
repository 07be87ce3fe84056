// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Path resolution utilities.
//!
//! Determine relevent path information for external files that need to be
//! interacted with, or managed in some way.

use std::path::PathBuf;

/// Determine absolute path to user's home directory.
///
/// Does not check if the path returned actually exists.
///
/// # Errors
///
/// - Return [`NoWayHome`] if home directory path cannot be determined.
pub fn home_dir() -> Result<PathBuf> {
    dirs::home_dir().ok_or(NoWayHome)
}

/// Determine default absolute path to the ignore file.
///
/// Anchored at the user's home directory so runs behave the same from any
/// working directory. Falls back to the bare relative name when the home
/// directory cannot be determined. Does not check if the path returned
/// actually exists, since a missing ignore file is a normal condition.
pub fn default_ignore_file() -> PathBuf {
    home_dir()
        .map(|path| path.join(".casktend-ignore"))
        .unwrap_or_else(|_| PathBuf::from(".casktend-ignore"))
}

/// Determine default absolute path to the configuration file.
///
/// Uses XDG Base Directory path `$XDG_CONFIG_HOME/casktend/config.toml` as
/// the default absolute path. Does not check if the path returned actually
/// exists.
///
/// # Errors
///
/// - Return [`NoWayHome`] if configuration directory path cannot be
///   determined.
///
/// # See Also
///
/// - [XDG Base Directory](https://wiki.archlinux.org/title/XDG_Base_Directory)
pub fn default_config_file() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|path| path.join("casktend").join("config.toml"))
        .ok_or(NoWayHome)
}

/// No way to determine user's home directory.
///
/// # See Also
///
/// - [`dirs::home_dir`](https://docs.rs/dirs/latest/dirs/fn.home_dir.html)
#[derive(Clone, Debug, thiserror::Error)]
#[error("cannot determine absolute path to user's home directory")]
pub struct NoWayHome;

/// Friendly result alias :3
pub type Result<T, E = NoWayHome> = std::result::Result<T, E>;
