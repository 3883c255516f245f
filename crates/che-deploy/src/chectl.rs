//! chectl installer lifecycle: download, configure, install.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::config::Configuration;
use crate::process::{CommandRunner, Invocation};
use crate::workflow::WorkflowCommands;

/// Where the chectl installer script is published.
pub const CHECTL_INSTALLER_URL: &str = "https://www.eclipse.org/che/chectl/";
/// Where the installer script is written.
pub const CHECTL_SCRIPT_PATH: &str = "/tmp/chectl-install.sh";

/// chectl settings written on configure: telemetry off.
const CHECTL_CONFIG: &str = r#"{"segment.telemetry":"off"}"#;
const NO_HOME: &str = "No HOME environment variable found";

/// Downloads, configures and installs chectl.
pub struct ChectlHelper {
    configuration: Arc<Configuration>,
    runner: Arc<dyn CommandRunner>,
    workflow: Arc<dyn WorkflowCommands>,
    http: reqwest::Client,
    installer_url: String,
    script_path: PathBuf,
}

impl ChectlHelper {
    #[must_use]
    pub fn new(
        configuration: Arc<Configuration>,
        runner: Arc<dyn CommandRunner>,
        workflow: Arc<dyn WorkflowCommands>,
    ) -> Self {
        Self {
            configuration,
            runner,
            workflow,
            http: reqwest::Client::new(),
            installer_url: CHECTL_INSTALLER_URL.to_string(),
            script_path: PathBuf::from(CHECTL_SCRIPT_PATH),
        }
    }

    /// Fetch the installer from another location.
    #[must_use]
    pub fn with_installer_url(mut self, url: impl Into<String>) -> Self {
        self.installer_url = url.into();
        self
    }

    /// Write the installer script somewhere else.
    #[must_use]
    pub fn with_script_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.script_path = path.into();
        self
    }

    /// Path of the downloaded installer script.
    #[must_use]
    pub fn script_path(&self) -> &Path {
        &self.script_path
    }

    /// Download the installer script and make it executable.
    ///
    /// # Errors
    ///
    /// Returns an error if the download fails or the script cannot be written.
    pub async fn download(&self) -> Result<()> {
        info!(url = %self.installer_url, "Downloading chectl installer...");

        let script = self
            .http
            .get(&self.installer_url)
            .send()
            .await
            .context("Failed to fetch chectl installer")?
            .error_for_status()
            .context("chectl installer download was rejected")?
            .text()
            .await
            .context("Failed to read chectl installer body")?;

        tokio::fs::write(&self.script_path, script)
            .await
            .with_context(|| format!("Failed to write {}", self.script_path.display()))?;

        info!("Making it executable...");
        set_executable(&self.script_path).await?;

        Ok(())
    }

    /// Write the chectl config file that disables telemetry.
    ///
    /// A missing HOME marks the run failed but is not returned as an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the config directory or file cannot be written.
    pub async fn configure(&self) -> Result<()> {
        info!("configuring chectl defaults...");

        let Some(home) = self.configuration.home_dir() else {
            self.workflow.error(NO_HOME);
            self.workflow.set_failed(NO_HOME);
            return Ok(());
        };

        let config_dir = home.join(".config").join("chectl");
        tokio::fs::create_dir_all(&config_dir)
            .await
            .with_context(|| format!("Failed to create {}", config_dir.display()))?;

        let config_path = config_dir.join("config.json");
        tokio::fs::write(&config_path, CHECTL_CONFIG)
            .await
            .with_context(|| format!("Failed to write {}", config_path.display()))?;
        debug!(path = %config_path.display(), "chectl telemetry disabled");

        Ok(())
    }

    /// Run the installer unless skipped by configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the installer cannot be run or fails.
    pub async fn install(&self) -> Result<()> {
        if self.configuration.skip_chectl_install() {
            info!("Skipping chectl installation as specified.");
            return Ok(());
        }

        info!(channel = self.configuration.chectl_channel(), "Installing chectl...");
        let invocation = Invocation::new(self.script_path.to_string_lossy())
            .args([format!("--channel={}", self.configuration.chectl_channel())]);

        self.runner.stream(&invocation).await
    }
}

#[cfg(unix)]
async fn set_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
        .await
        .with_context(|| format!("Failed to chmod {}", path.display()))
}

#[cfg(not(unix))]
async fn set_executable(_path: &Path) -> Result<()> {
    Ok(())
}
