//! Post-phase flow: dump the Che server logs and publish them as an artifact.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::artifact::{ArtifactUploader, UploadOptions};
use crate::config::Configuration;
use crate::dispatcher::Flow;
use crate::process::{CommandRunner, Invocation};
use crate::ui;

/// Packaged script that writes the server logs into [`LOGS_DIR`].
pub const POST_ACTION_SCRIPT: &str = "scripts/post-action-script.sh";
/// Directory, relative to the action root, holding the collected logs.
pub const LOGS_DIR: &str = "che-logs";
/// Base name of the uploaded artifact.
pub const ARTIFACT_NAME: &str = "Eclipse Che Logs";

/// Every regular file below `root`, depth-first in name order.
///
/// Symbolic links are followed, so a linked directory is descended into
/// and never reported as a file.
///
/// # Errors
///
/// Returns an error if `root` or any directory below it cannot be listed,
/// a link is dangling, or links form a loop.
pub fn collect_files(root: &Path) -> io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(true).sort_by_file_name() {
        let entry = entry?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

/// Runs the log script and uploads what it produced.
pub struct PostActionScriptRunner {
    configuration: Arc<Configuration>,
    runner: Arc<dyn CommandRunner>,
    uploader: Arc<dyn ArtifactUploader>,
}

impl PostActionScriptRunner {
    #[must_use]
    pub fn new(
        configuration: Arc<Configuration>,
        runner: Arc<dyn CommandRunner>,
        uploader: Arc<dyn ArtifactUploader>,
    ) -> Self {
        Self {
            configuration,
            runner,
            uploader,
        }
    }

    /// `Eclipse Che Logs`, followed by the job-name suffix when one is set.
    #[must_use]
    pub fn artifact_name(&self) -> String {
        match self.configuration.job_name_suffix() {
            Some(suffix) => format!("{ARTIFACT_NAME} {suffix}"),
            None => ARTIFACT_NAME.to_string(),
        }
    }

    fn logs_dir(&self) -> PathBuf {
        self.configuration.action_path().join(LOGS_DIR)
    }

    /// Run the script, then upload every file it left in the logs directory.
    ///
    /// Upload failures are reported as warnings and do not fail the step.
    ///
    /// # Errors
    ///
    /// Returns an error if the script fails or the logs cannot be listed.
    pub async fn run(&self) -> Result<()> {
        let script = self.configuration.action_path().join(POST_ACTION_SCRIPT);
        let invocation = Invocation::new(script.display().to_string()).forward_stderr();
        self.runner.stream(&invocation).await?;

        let logs_dir = self.logs_dir();
        let files = collect_files(&logs_dir)
            .with_context(|| format!("Failed to list {}", logs_dir.display()))?;
        let root = logs_dir
            .parent()
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);

        let name = self.artifact_name();
        info!(artifact = %name, files = files.len(), "Uploading logs");
        let options = UploadOptions {
            continue_on_error: true,
        };

        match self.uploader.upload(&name, &files, &root, &options).await {
            Ok(response) => {
                ui::notice(&format!("Uploaded {name} ({} bytes)", response.size));
            }
            Err(e) => {
                warn!(error = %format!("{e:#}"), "Unable to upload logs");
                ui::warning(&format!("Unable to upload {name}"));
            }
        }
        Ok(())
    }
}

/// Flow run by the post invocation.
pub struct PostAction {
    script_runner: Arc<PostActionScriptRunner>,
}

impl PostAction {
    #[must_use]
    pub fn new(script_runner: Arc<PostActionScriptRunner>) -> Self {
        Self { script_runner }
    }
}

#[async_trait]
impl Flow for PostAction {
    fn name(&self) -> &'static str {
        "post"
    }

    async fn execute(&self) -> Result<()> {
        info!("Post action being executed...");
        self.script_runner.run().await
    }
}
