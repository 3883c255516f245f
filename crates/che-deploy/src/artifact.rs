//! Upload of workflow artifacts to the Actions results service.
//!
//! An upload is three calls: `CreateArtifact` returns a signed blob URL, the
//! zipped files are PUT to that URL, and `FinalizeArtifact` records the size
//! and digest. The run and job the artifact belongs to are read from the
//! `Actions.Results:<run>:<job>` scope of the runtime token.

use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::DeployError;

const ENV_RUNTIME_TOKEN: &str = "ACTIONS_RUNTIME_TOKEN";
const ENV_RESULTS_URL: &str = "ACTIONS_RESULTS_URL";

const ARTIFACT_SERVICE: &str = "twirp/github.actions.results.api.v1.ArtifactService";
const ARTIFACT_VERSION: u32 = 4;
const RESULTS_SCOPE_PREFIX: &str = "Actions.Results:";

const INVALID_NAME_CHARACTERS: &[char] = &['"', ':', '<', '>', '|', '*', '?', '\r', '\n', '\\', '/'];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadOptions {
    /// Skip files that cannot be read instead of failing the upload.
    pub continue_on_error: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadResponse {
    pub id: i64,
    pub size: u64,
}

/// Destination for a named collection of files.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ArtifactUploader: Send + Sync {
    /// Upload `files` as one artifact. Entry names are relative to `root`.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is invalid, a file is outside `root`, or
    /// the service rejects any call.
    async fn upload(
        &self,
        name: &str,
        files: &[PathBuf],
        root: &Path,
        options: &UploadOptions,
    ) -> Result<UploadResponse>;
}

/// Workflow run and job ids the results service files artifacts under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackendIds {
    pub workflow_run_backend_id: String,
    pub workflow_job_run_backend_id: String,
}

#[derive(Debug, Serialize)]
struct CreateArtifactRequest<'a> {
    #[serde(flatten)]
    ids: &'a BackendIds,
    name: &'a str,
    version: u32,
}

#[derive(Debug, Deserialize)]
struct CreateArtifactResponse {
    ok: bool,
    #[serde(default)]
    signed_upload_url: String,
}

#[derive(Debug, Serialize)]
struct FinalizeArtifactRequest<'a> {
    #[serde(flatten)]
    ids: &'a BackendIds,
    name: &'a str,
    size: String,
    hash: String,
}

#[derive(Debug, Deserialize)]
struct FinalizeArtifactResponse {
    ok: bool,
    #[serde(default)]
    artifact_id: String,
}

#[derive(Debug, Deserialize)]
struct TokenClaims {
    #[serde(default)]
    scp: String,
}

/// Reject names the results service would refuse.
///
/// # Errors
///
/// Returns [`DeployError::InvalidArtifactName`] for an empty name or one
/// containing `" : < > | * ? \r \n \ /`.
pub fn validate_artifact_name(name: &str) -> Result<(), DeployError> {
    if name.is_empty() || name.contains(INVALID_NAME_CHARACTERS) {
        return Err(DeployError::InvalidArtifactName(name.to_string()));
    }
    Ok(())
}

/// Extract run and job ids from the runtime token's `scp` claim.
///
/// # Errors
///
/// Returns [`DeployError::InvalidRuntimeToken`] if the token is not a JWT
/// or carries no `Actions.Results` scope.
pub fn backend_ids(token: &str) -> Result<BackendIds, DeployError> {
    let invalid = |reason: &str| DeployError::InvalidRuntimeToken(reason.to_string());

    let payload = token
        .split('.')
        .nth(1)
        .ok_or_else(|| invalid("not a JWT"))?;
    let decoded = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| invalid(&e.to_string()))?;
    let claims: TokenClaims =
        serde_json::from_slice(&decoded).map_err(|e| invalid(&e.to_string()))?;

    claims
        .scp
        .split(' ')
        .filter_map(|scope| scope.strip_prefix(RESULTS_SCOPE_PREFIX))
        .find_map(|ids| {
            let (run, job) = ids.split_once(':')?;
            (!run.is_empty() && !job.is_empty() && !job.contains(':')).then(|| BackendIds {
                workflow_run_backend_id: run.to_string(),
                workflow_job_run_backend_id: job.to_string(),
            })
        })
        .ok_or_else(|| invalid("no Actions.Results scope"))
}

/// Name of `file` inside the archive: its path below `root`, `/`-separated.
fn entry_name(file: &Path, root: &Path) -> Result<String> {
    let relative = file.strip_prefix(root).map_err(|_| {
        DeployError::Artifact(format!(
            "{} is not under the root directory {}",
            file.display(),
            root.display()
        ))
    })?;

    Ok(relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/"))
}

/// Zip `files` in memory.
///
/// # Errors
///
/// Returns an error if a file lies outside `root`, or cannot be read and
/// `continue_on_error` is off.
pub fn build_archive(files: &[PathBuf], root: &Path, continue_on_error: bool) -> Result<Vec<u8>> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for file in files {
        let name = entry_name(file, root)?;
        let content = match std::fs::read(file) {
            Ok(content) => content,
            Err(e) if continue_on_error => {
                warn!(file = %file.display(), error = %e, "Skipping unreadable file");
                continue;
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", file.display()));
            }
        };

        writer
            .start_file(name.as_str(), options)
            .with_context(|| format!("Failed to add {name} to archive"))?;
        writer.write_all(&content)?;
    }

    let cursor = writer.finish().context("Failed to finish archive")?;
    Ok(cursor.into_inner())
}

/// [`ArtifactUploader`] talking to the results service of the current run.
#[derive(Debug, Clone)]
pub struct ResultsArtifactClient {
    http: reqwest::Client,
    results_url: String,
    token: String,
}

impl ResultsArtifactClient {
    /// Build from `ACTIONS_RESULTS_URL` and `ACTIONS_RUNTIME_TOKEN`.
    ///
    /// # Errors
    ///
    /// Returns [`DeployError::MissingRuntimeEnv`] if either is unset.
    pub fn from_env() -> Result<Self> {
        let read = |key: &'static str| {
            std::env::var(key)
                .ok()
                .filter(|v| !v.is_empty())
                .ok_or(DeployError::MissingRuntimeEnv(key))
        };
        Self::new(read(ENV_RESULTS_URL)?, read(ENV_RUNTIME_TOKEN)?)
    }

    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(results_url: impl Into<String>, token: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("che-deploy-action/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            results_url: results_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    fn rpc_url(&self, method: &str) -> String {
        format!("{}/{ARTIFACT_SERVICE}/{method}", self.results_url)
    }

    async fn rpc<Req, Resp>(&self, method: &str, request: &Req) -> Result<Resp>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned + Send,
    {
        debug!(method, "Calling artifact service");
        let response = self
            .http
            .post(self.rpc_url(method))
            .bearer_auth(&self.token)
            .json(request)
            .send()
            .await
            .with_context(|| format!("Failed to call {method}"))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DeployError::Artifact(format!("{method} returned {status}: {body}")).into());
        }

        response
            .json()
            .await
            .with_context(|| format!("Failed to parse {method} response"))
    }
}

#[async_trait]
impl ArtifactUploader for ResultsArtifactClient {
    async fn upload(
        &self,
        name: &str,
        files: &[PathBuf],
        root: &Path,
        options: &UploadOptions,
    ) -> Result<UploadResponse> {
        validate_artifact_name(name)?;
        let ids = backend_ids(&self.token)?;

        let created: CreateArtifactResponse = self
            .rpc(
                "CreateArtifact",
                &CreateArtifactRequest {
                    ids: &ids,
                    name,
                    version: ARTIFACT_VERSION,
                },
            )
            .await?;
        if !created.ok || created.signed_upload_url.is_empty() {
            return Err(DeployError::Artifact(format!("CreateArtifact refused {name}")).into());
        }

        let owned_files = files.to_vec();
        let owned_root = root.to_path_buf();
        let continue_on_error = options.continue_on_error;
        let archive = tokio::task::spawn_blocking(move || {
            build_archive(&owned_files, &owned_root, continue_on_error)
        })
        .await
        .context("Archive task panicked")??;

        let size = archive.len() as u64;
        let hash = hex::encode(Sha256::digest(&archive));
        info!(name, size, files = files.len(), "Uploading artifact");

        self.http
            .put(&created.signed_upload_url)
            .header("x-ms-blob-type", "BlockBlob")
            .header(reqwest::header::CONTENT_TYPE, "application/zip")
            .body(archive)
            .send()
            .await
            .context("Failed to upload artifact content")?
            .error_for_status()
            .context("Artifact content upload was rejected")?;

        let finalized: FinalizeArtifactResponse = self
            .rpc(
                "FinalizeArtifact",
                &FinalizeArtifactRequest {
                    ids: &ids,
                    name,
                    size: size.to_string(),
                    hash: format!("sha256:{hash}"),
                },
            )
            .await?;
        if !finalized.ok {
            return Err(DeployError::Artifact(format!("FinalizeArtifact refused {name}")).into());
        }

        let id = finalized.artifact_id.parse().map_err(|_| {
            DeployError::Artifact(format!("Invalid artifact id {:?}", finalized.artifact_id))
        })?;

        info!(name, id, "Artifact uploaded");
        Ok(UploadResponse { id, size })
    }
}

/// Stand-in used when the runner exposes no results service (local runs).
#[derive(Debug, Clone)]
pub struct UnavailableUploader {
    reason: String,
}

impl UnavailableUploader {
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl ArtifactUploader for UnavailableUploader {
    async fn upload(
        &self,
        name: &str,
        _files: &[PathBuf],
        _root: &Path,
        _options: &UploadOptions,
    ) -> Result<UploadResponse> {
        Err(DeployError::Artifact(format!("Cannot upload {name}: {}", self.reason)).into())
    }
}
