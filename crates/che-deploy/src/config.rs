//! Action configuration.
//!
//! Inputs are read once at startup from the `INPUT_*` variables the runner
//! exports, plus a few plain environment variables. The resulting
//! [`Configuration`] is never mutated afterwards.

use std::path::{Path, PathBuf};

/// Input holding a custom plugin registry image.
pub const PLUGIN_REGISTRY_IMAGE: &str = "plugin-registry-image";
/// Input holding a custom devfile registry image.
pub const DEVFILE_REGISTRY_IMAGE: &str = "devfile-registry-image";
/// Input holding a custom che-server image (`name:tag`).
pub const CHE_SERVER_IMAGE: &str = "che-server-image";
/// Input that skips the chectl installer when set to `true`.
pub const SKIP_CHECTL_INSTALL: &str = "skip-chectl-install";
/// Input selecting the chectl release channel.
pub const CHECTL_CHANNEL: &str = "chectl-channel";

/// Environment variable appended to the log artifact name.
const ENV_JOB_NAME_SUFFIX: &str = "JOB_NAME_SUFFIX";
/// Directory the action was checked out into (set by the runner).
const ENV_ACTION_PATH: &str = "GITHUB_ACTION_PATH";

/// Channel used when `chectl-channel` is not provided.
pub const DEFAULT_CHECTL_CHANNEL: &str = "next";

/// Name of the environment variable carrying an action input.
///
/// Mirrors the runner: spaces become underscores and the name is upper-cased.
/// Dashes are kept.
#[must_use]
pub fn input_env_name(name: &str) -> String {
    format!("INPUT_{}", name.replace(' ', "_").to_uppercase())
}

/// Immutable bag of overrides shared by every collaborator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Configuration {
    plugin_registry_image: Option<String>,
    devfile_registry_image: Option<String>,
    che_server_image: Option<String>,
    skip_chectl_install: bool,
    chectl_channel: Option<String>,
    job_name_suffix: Option<String>,
    home_dir: Option<PathBuf>,
    action_path: PathBuf,
}

impl Configuration {
    /// Load configuration from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        let action_path = std::env::var_os(ENV_ACTION_PATH)
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
            .or_else(|| {
                std::env::current_exe()
                    .ok()
                    .and_then(|exe| exe.parent().map(Path::to_path_buf))
            })
            .unwrap_or_else(|| PathBuf::from("."));

        Self::from_lookup(|key| std::env::var(key).ok()).with_action_path(action_path)
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// Values are trimmed and empty values count as unset, matching how the
    /// runner hands over inputs that were declared but not provided.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let input = |name: &str| read(&input_env_name(name));

        Self {
            plugin_registry_image: input(PLUGIN_REGISTRY_IMAGE),
            devfile_registry_image: input(DEVFILE_REGISTRY_IMAGE),
            che_server_image: input(CHE_SERVER_IMAGE),
            skip_chectl_install: input(SKIP_CHECTL_INSTALL).as_deref() == Some("true"),
            chectl_channel: input(CHECTL_CHANNEL),
            job_name_suffix: read(ENV_JOB_NAME_SUFFIX),
            home_dir: read("HOME").map(PathBuf::from),
            action_path: PathBuf::from("."),
        }
    }

    /// Override the plugin registry image.
    #[must_use]
    pub fn with_plugin_registry_image(mut self, image: impl Into<String>) -> Self {
        self.plugin_registry_image = Some(image.into());
        self
    }

    /// Override the devfile registry image.
    #[must_use]
    pub fn with_devfile_registry_image(mut self, image: impl Into<String>) -> Self {
        self.devfile_registry_image = Some(image.into());
        self
    }

    /// Override the che-server image.
    #[must_use]
    pub fn with_che_server_image(mut self, image: impl Into<String>) -> Self {
        self.che_server_image = Some(image.into());
        self
    }

    /// Skip (or not) the chectl installer.
    #[must_use]
    pub fn with_skip_chectl_install(mut self, skip: bool) -> Self {
        self.skip_chectl_install = skip;
        self
    }

    /// Set the artifact job-name suffix.
    #[must_use]
    pub fn with_job_name_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.job_name_suffix = Some(suffix.into());
        self
    }

    /// Set the home directory used for chectl configuration.
    #[must_use]
    pub fn with_home_dir(mut self, home: impl Into<PathBuf>) -> Self {
        self.home_dir = Some(home.into());
        self
    }

    /// Set the directory holding the packaged scripts and log output.
    #[must_use]
    pub fn with_action_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.action_path = path.into();
        self
    }

    #[must_use]
    pub fn plugin_registry_image(&self) -> Option<&str> {
        self.plugin_registry_image.as_deref()
    }

    #[must_use]
    pub fn devfile_registry_image(&self) -> Option<&str> {
        self.devfile_registry_image.as_deref()
    }

    #[must_use]
    pub fn che_server_image(&self) -> Option<&str> {
        self.che_server_image.as_deref()
    }

    #[must_use]
    pub fn skip_chectl_install(&self) -> bool {
        self.skip_chectl_install
    }

    /// Release channel passed to the chectl installer.
    #[must_use]
    pub fn chectl_channel(&self) -> &str {
        self.chectl_channel
            .as_deref()
            .unwrap_or(DEFAULT_CHECTL_CHANNEL)
    }

    #[must_use]
    pub fn job_name_suffix(&self) -> Option<&str> {
        self.job_name_suffix.as_deref()
    }

    #[must_use]
    pub fn home_dir(&self) -> Option<&Path> {
        self.home_dir.as_deref()
    }

    /// Root of the checked-out action (scripts and `che-logs` live here).
    #[must_use]
    pub fn action_path(&self) -> &Path {
        &self.action_path
    }
}
