//! Composition root: builds every collaborator once and wires them together.

use std::sync::Arc;

use anyhow::Result;
use tracing::debug;

use crate::artifact::{ArtifactUploader, ResultsArtifactClient, UnavailableUploader};
use crate::che::CheHelper;
use crate::chectl::ChectlHelper;
use crate::cluster::{ClusterQuery, KubeIngressQuery};
use crate::config::Configuration;
use crate::dispatcher::Dispatcher;
use crate::install::InstallEclipseChe;
use crate::keycloak::KeycloakClient;
use crate::post_action::{PostAction, PostActionScriptRunner};
use crate::process::{CommandRunner, ProcessRunner};
use crate::workflow::{StateStore, WorkflowCommands};

/// Production object graph for one invocation.
pub struct Bindings {
    configuration: Arc<Configuration>,
    state: Arc<dyn StateStore>,
    install: Arc<InstallEclipseChe>,
    post: Arc<PostAction>,
}

impl Bindings {
    /// Wire the production collaborators.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP clients cannot be built.
    pub fn new(
        configuration: Configuration,
        workflow: Arc<dyn WorkflowCommands>,
        state: Arc<dyn StateStore>,
    ) -> Result<Self> {
        let uploader: Arc<dyn ArtifactUploader> = match ResultsArtifactClient::from_env() {
            Ok(client) => Arc::new(client),
            Err(e) => {
                debug!(error = %e, "Artifact upload unavailable");
                Arc::new(UnavailableUploader::new(e.to_string()))
            }
        };

        Self::with_collaborators(
            configuration,
            workflow,
            state,
            Arc::new(ProcessRunner::new()),
            Arc::new(KubeIngressQuery::new()),
            uploader,
        )
    }

    /// Wire the flows around the given process, cluster and artifact seams.
    ///
    /// # Errors
    ///
    /// Returns an error if the Keycloak HTTP client cannot be built.
    pub fn with_collaborators(
        configuration: Configuration,
        workflow: Arc<dyn WorkflowCommands>,
        state: Arc<dyn StateStore>,
        runner: Arc<dyn CommandRunner>,
        cluster: Arc<dyn ClusterQuery>,
        uploader: Arc<dyn ArtifactUploader>,
    ) -> Result<Self> {
        let configuration = Arc::new(configuration);

        let chectl = ChectlHelper::new(configuration.clone(), runner.clone(), workflow.clone());
        let che = CheHelper::new(
            configuration.clone(),
            runner.clone(),
            cluster,
            workflow,
            KeycloakClient::new()?,
        );
        let install = InstallEclipseChe::new(Arc::new(chectl), Arc::new(che));

        let script_runner = PostActionScriptRunner::new(configuration.clone(), runner, uploader);
        let post = PostAction::new(Arc::new(script_runner));

        Ok(Self {
            configuration,
            state,
            install: Arc::new(install),
            post: Arc::new(post),
        })
    }

    #[must_use]
    pub fn configuration(&self) -> &Configuration {
        &self.configuration
    }

    #[must_use]
    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(self.state.clone(), self.install.clone(), self.post.clone())
    }
}
