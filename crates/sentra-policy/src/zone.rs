//! Trust-zone classification of filesystem paths.
//!
//! Zones are resolved against configured roots in a fixed precedence
//! order. Config and secrets directories usually live inside the home
//! directory, so home must be checked last or everything under it would
//! collapse into the less restrictive `UserHome` zone.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Component, Path, PathBuf};

/// Trust zone a canonical path belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Zone {
    /// Inside the active workspace root.
    Workspace,
    /// Inside the user's home directory but outside more specific roots.
    UserHome,
    /// Application configuration directory.
    Config,
    /// Operating system directories.
    System,
    /// Credential material (SSH keys, GPG keyrings, cloud credentials).
    Secrets,
    /// Nothing matched.
    Unknown,
}

impl Zone {
    /// Restrictiveness rank. Higher means the zone demands more caution.
    fn risk_rank(self) -> u8 {
        match self {
            Self::Secrets => 5,
            Self::System => 4,
            Self::Config => 3,
            Self::UserHome => 2,
            Self::Workspace => 1,
            Self::Unknown => 0,
        }
    }

    /// The more restrictive of two zones.
    ///
    /// An action touching paths in several zones is governed by the
    /// riskiest one.
    #[must_use]
    pub fn escalate(self, other: Self) -> Self {
        if other.risk_rank() > self.risk_rank() {
            other
        } else {
            self
        }
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Workspace => write!(f, "workspace"),
            Self::UserHome => write!(f, "user_home"),
            Self::Config => write!(f, "config"),
            Self::System => write!(f, "system"),
            Self::Secrets => write!(f, "secrets"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Directories credentials typically live under, relative to home.
const SECRETS_DIRS: &[&str] = &[".ssh", ".gnupg", ".aws", ".azure"];

/// Unix system roots.
const SYSTEM_PATHS_UNIX: &[&str] = &["/etc", "/usr", "/bin", "/sbin", "/var", "/opt", "/system"];

/// Windows system roots.
const SYSTEM_PATHS_WINDOWS: &[&str] = &[
    r"C:\Windows",
    r"C:\Program Files",
    r"C:\Program Files (x86)",
];

/// The roots zone classification resolves against.
#[derive(Debug, Clone)]
pub struct ZoneRoots {
    /// Active workspace root.
    pub workspace: PathBuf,
    /// Application config directory.
    pub config: PathBuf,
    /// User home directory.
    pub home: PathBuf,
    /// System directories.
    pub system_paths: Vec<PathBuf>,
    /// Credential directories.
    pub secrets_paths: Vec<PathBuf>,
}

impl ZoneRoots {
    /// Build roots with platform-default system and secrets directories.
    #[must_use]
    pub fn new(
        workspace: impl Into<PathBuf>,
        config: impl Into<PathBuf>,
        home: impl Into<PathBuf>,
    ) -> Self {
        let home = home.into();
        let system_paths = if cfg!(windows) {
            SYSTEM_PATHS_WINDOWS.iter().map(PathBuf::from).collect()
        } else {
            SYSTEM_PATHS_UNIX.iter().map(PathBuf::from).collect()
        };
        let secrets_paths = SECRETS_DIRS.iter().map(|dir| home.join(dir)).collect();
        Self {
            workspace: workspace.into(),
            config: config.into(),
            home,
            system_paths,
            secrets_paths,
        }
    }

    /// Replace the system directory list.
    #[must_use]
    pub fn with_system_paths(mut self, paths: Vec<PathBuf>) -> Self {
        self.system_paths = paths;
        self
    }

    /// Replace the secrets directory list.
    #[must_use]
    pub fn with_secrets_paths(mut self, paths: Vec<PathBuf>) -> Self {
        self.secrets_paths = paths;
        self
    }

    /// Classify a path into its trust zone.
    ///
    /// The path is canonicalized first, so classification of an already
    /// canonical path is idempotent. Precedence: workspace, then config,
    /// then secrets, then system, then home, otherwise [`Zone::Unknown`].
    #[must_use]
    pub fn classify(&self, path: &Path) -> Zone {
        let canonical = canonicalize_path(path);

        if is_within(&canonical, &fold_case(&self.workspace)) {
            return Zone::Workspace;
        }
        if is_within(&canonical, &fold_case(&self.config)) {
            return Zone::Config;
        }
        if self
            .secrets_paths
            .iter()
            .any(|root| is_within(&canonical, &fold_case(root)))
        {
            return Zone::Secrets;
        }
        if self
            .system_paths
            .iter()
            .any(|root| is_within(&canonical, &fold_case(root)))
        {
            return Zone::System;
        }
        if is_within(&canonical, &fold_case(&self.home)) {
            return Zone::UserHome;
        }
        Zone::Unknown
    }
}

/// Containment test: `path == root` or `path` starts with `root` plus a
/// separator. Prefix comparison is per component, so `/etc2` is not
/// inside `/etc`.
fn is_within(path: &Path, root: &Path) -> bool {
    path == root || path.starts_with(root)
}

/// Canonicalize a path for zone comparison.
///
/// Resolves symlinks where the path exists; otherwise falls back to a
/// lexical normalization that collapses `.` and `..` segments so paths to
/// not-yet-created files still classify correctly. On Windows the result
/// is lowercased, since NTFS paths compare case-insensitively and
/// `C:\WINDOWS` must match the `C:\Windows` root.
#[must_use]
pub fn canonicalize_path(path: &Path) -> PathBuf {
    let resolved = match path.canonicalize() {
        Ok(resolved) => resolved,
        Err(_) => lexical_normalize(path),
    };
    fold_case(&resolved)
}

/// Case-fold a path on case-insensitive platforms; identity elsewhere.
fn fold_case(path: &Path) -> PathBuf {
    if cfg!(windows) {
        PathBuf::from(path.to_string_lossy().to_lowercase())
    } else {
        path.to_path_buf()
    }
}

fn lexical_normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {},
            Component::ParentDir => {
                if !out.pop() {
                    out.push(Component::ParentDir);
                }
            },
            other => out.push(other),
        }
    }
    out
}
