//! Error types for the deploy action.

use std::process::ExitStatus;

use thiserror::Error;

/// Domain failures raised while deploying Eclipse Che or collecting its logs.
#[derive(Debug, Error)]
pub enum DeployError {
    /// The che-server image override is not `name:tag`.
    #[error("che server image needs to be in format: [server/]imageName:imageTag. Found {0}")]
    InvalidImage(String),

    /// The token endpoint answered without an `access_token` field.
    #[error("Token endpoint response does not contain an access_token")]
    MissingAccessToken,

    /// A subprocess exited unsuccessfully.
    #[error("{program} exited with {status}: {stderr}")]
    CommandFailed {
        program: String,
        status: ExitStatus,
        stderr: String,
    },

    /// The ingress exists but carries no host rule.
    #[error("Ingress {namespace}/{name} has no host rule")]
    MissingIngressHost { namespace: String, name: String },

    /// The artifact name contains a character the results service rejects.
    #[error("Artifact name is not valid: {0}")]
    InvalidArtifactName(String),

    /// A runner variable needed for artifact upload is not set.
    #[error("Unable to get the {0} env variable")]
    MissingRuntimeEnv(&'static str),

    /// The runtime token could not be decoded into backend ids.
    #[error("Failed to get backend ids from runtime token: {0}")]
    InvalidRuntimeToken(String),

    /// The results service rejected an artifact call.
    #[error("Artifact service error: {0}")]
    Artifact(String),
}

pub type Result<T> = std::result::Result<T, DeployError>;
