// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Filesystem layout.
//!
//! `<home>/.labx/` holds `config/`, `log/` and `appdata/` (the status
//! records plus `load.cfg`). Measurement data lands under `<home>/labx/Data`
//! unless overridden, with a `YYYY/MM/YYYY-MM-DD` sub-path when daily data
//! directories are enabled.

use chrono::{Datelike, Local};
use std::path::{Path, PathBuf};

/// Resolved application directories rooted at one home directory.
#[derive(Debug, Clone)]
pub struct AppPaths {
    home: PathBuf,
}

impl AppPaths {
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self { home: home.into() }
    }

    /// Paths rooted at the user's home directory.
    pub fn from_user_home() -> Option<Self> {
        dirs::home_dir().map(Self::new)
    }

    fn dot_dir(&self) -> PathBuf {
        self.home.join(".labx")
    }

    /// Configuration files.
    pub fn config_dir(&self) -> PathBuf {
        self.dot_dir().join("config")
    }

    /// Default configuration document.
    pub fn default_config_file(&self) -> PathBuf {
        self.config_dir().join("default.cfg")
    }

    /// Rotating log files.
    pub fn log_dir(&self) -> PathBuf {
        self.dot_dir().join("log")
    }

    /// Appdata records and `load.cfg`.
    pub fn appdata_dir(&self) -> PathBuf {
        self.dot_dir().join("appdata")
    }

    /// Pid/lock file enforcing one application instance.
    pub fn lock_file(&self) -> PathBuf {
        self.dot_dir().join("labx.pid")
    }

    /// Measurement data root (before the daily sub-path).
    pub fn data_root(&self, override_dir: Option<&Path>) -> PathBuf {
        match override_dir {
            Some(dir) => dir.to_path_buf(),
            None => self.home.join("labx").join("Data"),
        }
    }

    /// Data directory for today: `<root>[/YYYY/MM/YYYY-MM-DD]`.
    pub fn data_dir(&self, override_dir: Option<&Path>, daily: bool) -> PathBuf {
        let root = self.data_root(override_dir);
        if daily {
            daily_sub_path(root)
        } else {
            root
        }
    }

    /// Create every directory the application writes into.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(self.config_dir())?;
        std::fs::create_dir_all(self.log_dir())?;
        std::fs::create_dir_all(self.appdata_dir())?;
        Ok(())
    }
}

fn daily_sub_path(root: PathBuf) -> PathBuf {
    let today = Local::now();
    root.join(format!("{:04}", today.year()))
        .join(format!("{:02}", today.month()))
        .join(format!(
            "{:04}-{:02}-{:02}",
            today.year(),
            today.month(),
            today.day()
        ))
}

#[cfg(test)]
#[path = "paths_tests.rs"]
mod tests;
