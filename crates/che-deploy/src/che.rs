//! Eclipse Che deployment steps: deploy, expose URL and token, log in.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use crate::cluster::ClusterQuery;
use crate::config::Configuration;
use crate::custom_resource::CustomResource;
use crate::keycloak::{KeycloakClient, ADMIN_PASSWORD, ADMIN_USERNAME};
use crate::process::{CommandRunner, Invocation};
use crate::ui;
use crate::workflow::WorkflowCommands;

/// Namespace Che is deployed into.
pub const CHE_NAMESPACE: &str = "eclipse-che";
/// Where the CheCluster patch is written before deploying.
pub const CUSTOM_RESOURCE_PATH: &str = "/tmp/custom-resource-patch.yaml";

/// Output carrying the public Che URL.
pub const CHE_URL_OUTPUT: &str = "che-url";
/// Output carrying the admin bearer token.
pub const CHE_TOKEN_OUTPUT: &str = "che-token";

const CHE_INGRESS: &str = "che";
const KEYCLOAK_INGRESS: &str = "keycloak";

pub struct CheHelper {
    configuration: Arc<Configuration>,
    runner: Arc<dyn CommandRunner>,
    cluster: Arc<dyn ClusterQuery>,
    workflow: Arc<dyn WorkflowCommands>,
    keycloak: KeycloakClient,
    custom_resource_path: PathBuf,
}

impl CheHelper {
    #[must_use]
    pub fn new(
        configuration: Arc<Configuration>,
        runner: Arc<dyn CommandRunner>,
        cluster: Arc<dyn ClusterQuery>,
        workflow: Arc<dyn WorkflowCommands>,
        keycloak: KeycloakClient,
    ) -> Self {
        Self {
            configuration,
            runner,
            cluster,
            workflow,
            keycloak,
            custom_resource_path: PathBuf::from(CUSTOM_RESOURCE_PATH),
        }
    }

    /// Write the patch somewhere else.
    #[must_use]
    pub fn with_custom_resource_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.custom_resource_path = path.into();
        self
    }

    /// Render the CheCluster patch for the current configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if an image override is malformed.
    pub fn custom_resource(&self) -> Result<String> {
        let resource = CustomResource::from_configuration(&self.configuration)?;
        resource
            .to_yaml()
            .context("Failed to serialize custom resource")
    }

    /// Write the patch and run `chectl server:deploy` against minikube.
    ///
    /// # Errors
    ///
    /// Returns an error if the patch cannot be built or written, or chectl fails.
    pub async fn server_deploy(&self) -> Result<()> {
        info!("Calling chectl server:deploy...");

        let content = self.custom_resource()?;
        tokio::fs::write(&self.custom_resource_path, content)
            .await
            .with_context(|| format!("Failed to write {}", self.custom_resource_path.display()))?;

        let invocation = Invocation::new("chectl")
            .args([
                "server:deploy".to_string(),
                "--listr-renderer=verbose".to_string(),
                "--platform=minikube".to_string(),
                format!(
                    "--che-operator-cr-patch-yaml={}",
                    self.custom_resource_path.display()
                ),
                format!("--chenamespace={CHE_NAMESPACE}"),
            ])
            .forward_stderr();

        self.runner.stream(&invocation).await
    }

    /// Publish the public Che URL as `che-url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the ingress cannot be read or the output written.
    pub async fn define_che_url_output(&self) -> Result<()> {
        info!("Setting Github Action output value \"{CHE_URL_OUTPUT}\"...");

        let host = self
            .cluster
            .ingress_host(CHE_NAMESPACE, CHE_INGRESS)
            .await?;
        let che_url = format!("https://{host}");

        self.workflow.set_output(CHE_URL_OUTPUT, &che_url)?;
        ui::output(CHE_URL_OUTPUT, &che_url);
        Ok(())
    }

    /// Obtain an admin token from Keycloak and publish it masked as `che-token`.
    ///
    /// # Errors
    ///
    /// Returns an error if the ingress cannot be read, the token exchange
    /// fails, or the output cannot be written.
    pub async fn define_che_token_output(&self) -> Result<()> {
        info!("Setting Github Action output value \"{CHE_TOKEN_OUTPUT}\"...");

        let host = self
            .cluster
            .ingress_host(CHE_NAMESPACE, KEYCLOAK_INGRESS)
            .await?;
        let token = self.keycloak.admin_token(&host).await?;

        self.workflow.set_secret(&token);
        self.workflow.set_output(CHE_TOKEN_OUTPUT, &token)?;
        Ok(())
    }

    /// Log chectl into the deployed server.
    ///
    /// # Errors
    ///
    /// Returns an error if chectl fails.
    pub async fn login(&self) -> Result<()> {
        info!("Performing auth:Login...");

        let invocation = Invocation::new("chectl").args([
            "auth:login".to_string(),
            "-u".to_string(),
            ADMIN_USERNAME.to_string(),
            "-p".to_string(),
            ADMIN_PASSWORD.to_string(),
            format!("--chenamespace={CHE_NAMESPACE}"),
        ]);

        self.runner.capture(&invocation).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use mockall::predicate::eq;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::cluster::MockClusterQuery;
    use crate::keycloak::TOKEN_PATH;
    use crate::process::MockCommandRunner;
    use crate::workflow::MockWorkflowCommands;

    struct Mocks {
        runner: MockCommandRunner,
        cluster: MockClusterQuery,
        workflow: MockWorkflowCommands,
    }

    impl Mocks {
        fn new() -> Self {
            Self {
                runner: MockCommandRunner::new(),
                cluster: MockClusterQuery::new(),
                workflow: MockWorkflowCommands::new(),
            }
        }

        fn into_helper(self, configuration: Configuration, keycloak: KeycloakClient) -> CheHelper {
            CheHelper::new(
                Arc::new(configuration),
                Arc::new(self.runner),
                Arc::new(self.cluster),
                Arc::new(self.workflow),
                keycloak,
            )
        }
    }

    fn keycloak() -> KeycloakClient {
        KeycloakClient::new().unwrap()
    }

    #[tokio::test]
    async fn test_define_che_url_output() {
        let mut mocks = Mocks::new();
        mocks
            .cluster
            .expect_ingress_host()
            .with(eq(CHE_NAMESPACE), eq("che"))
            .times(1)
            .returning(|_, _| Ok("123.123.123.123".to_string()));
        mocks
            .workflow
            .expect_set_output()
            .with(eq(CHE_URL_OUTPUT), eq("https://123.123.123.123"))
            .times(1)
            .returning(|_, _| Ok(()));

        let che = mocks.into_helper(Configuration::default(), keycloak());
        che.define_che_url_output().await.unwrap();
    }

    #[tokio::test]
    async fn test_define_che_token_output() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "access_token": "my-token" })),
            )
            .expect(1)
            .mount(&server)
            .await;
        let keycloak_host = server.address().to_string();

        let mut mocks = Mocks::new();
        mocks
            .cluster
            .expect_ingress_host()
            .with(eq(CHE_NAMESPACE), eq("keycloak"))
            .times(1)
            .returning(move |_, _| Ok(keycloak_host.clone()));
        mocks
            .workflow
            .expect_set_secret()
            .with(eq("my-token"))
            .times(1)
            .return_const(());
        mocks
            .workflow
            .expect_set_output()
            .with(eq(CHE_TOKEN_OUTPUT), eq("my-token"))
            .times(1)
            .returning(|_, _| Ok(()));

        let che = mocks.into_helper(Configuration::default(), keycloak().with_scheme("http"));
        che.define_che_token_output().await.unwrap();
    }

    #[tokio::test]
    async fn test_ingress_failure_aborts_token_output() {
        let mut mocks = Mocks::new();
        mocks
            .cluster
            .expect_ingress_host()
            .returning(|_, _| Err(anyhow::anyhow!("ingresses.networking.k8s.io \"keycloak\" not found")));
        mocks.workflow.expect_set_output().never();
        mocks.workflow.expect_set_secret().never();

        let che = mocks.into_helper(Configuration::default(), keycloak());
        assert!(che.define_che_token_output().await.is_err());
    }

    #[tokio::test]
    async fn test_login() {
        let mut mocks = Mocks::new();
        mocks
            .runner
            .expect_capture()
            .withf(|inv| {
                inv.program == "chectl"
                    && inv.args
                        == vec![
                            "auth:login",
                            "-u",
                            "admin",
                            "-p",
                            "admin",
                            "--chenamespace=eclipse-che",
                        ]
            })
            .times(1)
            .returning(|_| Ok(String::new()));

        let che = mocks.into_helper(Configuration::default(), keycloak());
        che.login().await.unwrap();
    }

    #[tokio::test]
    async fn test_server_deploy() {
        let temp_dir = TempDir::new().unwrap();
        let patch_path = temp_dir.path().join("custom-resource-patch.yaml");
        let expected_patch_arg = format!("--che-operator-cr-patch-yaml={}", patch_path.display());

        let mut mocks = Mocks::new();
        mocks
            .runner
            .expect_stream()
            .withf(move |inv| {
                inv.program == "chectl"
                    && inv.args[0] == "server:deploy"
                    && inv.args.contains(&"--platform=minikube".to_string())
                    && inv.args.contains(&expected_patch_arg)
                    && inv.args.contains(&"--chenamespace=eclipse-che".to_string())
                    && inv.forward_stderr
            })
            .times(1)
            .returning(|_| Ok(()));

        let che = mocks
            .into_helper(
                Configuration::default().with_che_server_image("my-image:tag"),
                keycloak(),
            )
            .with_custom_resource_path(&patch_path);
        che.server_deploy().await.unwrap();

        let patch = std::fs::read_to_string(&patch_path).unwrap();
        assert!(patch.contains("customCheProperties"));
        assert!(patch.contains("cheImage: my-image"));
    }

    #[tokio::test]
    async fn test_server_deploy_invalid_image() {
        let temp_dir = TempDir::new().unwrap();
        let patch_path = temp_dir.path().join("custom-resource-patch.yaml");

        let mut mocks = Mocks::new();
        mocks.runner.expect_stream().never();

        let che = mocks
            .into_helper(
                Configuration::default().with_che_server_image("my-image"),
                keycloak(),
            )
            .with_custom_resource_path(&patch_path);
        let err = che.server_deploy().await.unwrap_err();

        assert!(err.to_string().contains("my-image"));
        assert!(!patch_path.exists());
    }
}
