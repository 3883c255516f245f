//! CheCluster custom-resource patch.
//!
//! The patch starts from a fixed document and only the registry and server
//! image fields are overridden from the configuration. Field declaration
//! order is the serialization order.

use serde::{Deserialize, Serialize};

use crate::config::Configuration;
use crate::error::{DeployError, Result};

/// Pull policy applied to every overridden image.
pub const PULL_POLICY: &str = "IfNotPresent";

/// Top-level patch document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomResource {
    pub spec: Spec,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Spec {
    pub auth: Auth,
    pub server: Server,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Auth {
    pub update_admin_password: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Server {
    pub custom_che_properties: CustomCheProperties,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugin_registry_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugin_registry_pull_policy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub devfile_registry_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub devfile_registry_pull_policy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub che_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub che_image_tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub che_image_pull_policy: Option<String>,
}

/// Che server properties pinning workspace images to `IfNotPresent`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomCheProperties {
    #[serde(rename = "CHE_WORKSPACE_SIDECAR_IMAGE__PULL__POLICY")]
    pub sidecar_image_pull_policy: String,
    #[serde(rename = "CHE_WORKSPACE_PLUGIN__BROKER_PULL__POLICY")]
    pub plugin_broker_pull_policy: String,
    #[serde(rename = "CHE_INFRA_KUBERNETES_PVC_JOBS_IMAGE_PULL__POLICY")]
    pub pvc_jobs_image_pull_policy: String,
}

impl Default for CustomResource {
    fn default() -> Self {
        Self {
            spec: Spec {
                auth: Auth {
                    update_admin_password: false,
                },
                server: Server {
                    custom_che_properties: CustomCheProperties {
                        sidecar_image_pull_policy: PULL_POLICY.into(),
                        plugin_broker_pull_policy: PULL_POLICY.into(),
                        pvc_jobs_image_pull_policy: PULL_POLICY.into(),
                    },
                    plugin_registry_image: None,
                    plugin_registry_pull_policy: None,
                    devfile_registry_image: None,
                    devfile_registry_pull_policy: None,
                    che_image: None,
                    che_image_tag: None,
                    che_image_pull_policy: None,
                },
            },
        }
    }
}

/// Split `name:tag`. Anything but exactly one `:` is rejected, so registry
/// hosts with a port are not accepted.
fn split_image(image: &str) -> Result<(&str, &str)> {
    let mut parts = image.split(':');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(name), Some(tag), None) => Ok((name, tag)),
        _ => Err(DeployError::InvalidImage(image.to_string())),
    }
}

impl CustomResource {
    /// Build the patch for the given configuration.
    ///
    /// # Errors
    ///
    /// Returns [`DeployError::InvalidImage`] when the che-server image is not
    /// of the form `name:tag`.
    pub fn from_configuration(configuration: &Configuration) -> Result<Self> {
        let mut resource = Self::default();
        let server = &mut resource.spec.server;

        if let Some(image) = configuration.plugin_registry_image() {
            server.plugin_registry_image = Some(image.to_string());
            server.plugin_registry_pull_policy = Some(PULL_POLICY.into());
        }

        if let Some(image) = configuration.devfile_registry_image() {
            server.devfile_registry_image = Some(image.to_string());
            server.devfile_registry_pull_policy = Some(PULL_POLICY.into());
        }

        if let Some(image) = configuration.che_server_image() {
            let (name, tag) = split_image(image)?;
            server.che_image = Some(name.to_string());
            server.che_image_tag = Some(tag.to_string());
            server.che_image_pull_policy = Some(PULL_POLICY.into());
        }

        Ok(resource)
    }

    /// Render as YAML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_yaml(&self) -> serde_yaml::Result<String> {
        serde_yaml::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEFAULT_YAML: &str = "spec:
  auth:
    updateAdminPassword: false
  server:
    customCheProperties:
      CHE_WORKSPACE_SIDECAR_IMAGE__PULL__POLICY: IfNotPresent
      CHE_WORKSPACE_PLUGIN__BROKER_PULL__POLICY: IfNotPresent
      CHE_INFRA_KUBERNETES_PVC_JOBS_IMAGE_PULL__POLICY: IfNotPresent
";

    fn build(configuration: &Configuration) -> CustomResource {
        CustomResource::from_configuration(configuration).unwrap()
    }

    fn parse(yaml: &str) -> serde_yaml::Value {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_default_custom_resource() {
        let resource = build(&Configuration::default());
        assert_eq!(resource, CustomResource::default());
        assert_eq!(resource.to_yaml().unwrap(), DEFAULT_YAML);
    }

    #[test]
    fn test_plugin_registry_image() {
        let config = Configuration::default().with_plugin_registry_image("my-image:tag");
        let yaml = parse(&build(&config).to_yaml().unwrap());

        assert_eq!(yaml["spec"]["server"]["pluginRegistryImage"], "my-image:tag");
        assert_eq!(yaml["spec"]["server"]["pluginRegistryPullPolicy"], PULL_POLICY);
        assert!(yaml["spec"]["server"].get("devfileRegistryImage").is_none());
    }

    #[test]
    fn test_devfile_registry_image() {
        let config = Configuration::default().with_devfile_registry_image("my-image:tag");
        let yaml = parse(&build(&config).to_yaml().unwrap());

        assert_eq!(yaml["spec"]["server"]["devfileRegistryImage"], "my-image:tag");
        assert_eq!(yaml["spec"]["server"]["devfileRegistryPullPolicy"], PULL_POLICY);
        assert!(yaml["spec"]["server"].get("pluginRegistryImage").is_none());
    }

    #[test]
    fn test_che_server_image() {
        let config = Configuration::default().with_che_server_image("my-image:tag");
        let yaml = parse(&build(&config).to_yaml().unwrap());

        assert_eq!(yaml["spec"]["server"]["cheImage"], "my-image");
        assert_eq!(yaml["spec"]["server"]["cheImageTag"], "tag");
        assert_eq!(yaml["spec"]["server"]["cheImagePullPolicy"], PULL_POLICY);
    }

    #[test]
    fn test_che_server_image_with_registry_path() {
        let config = Configuration::default().with_che_server_image("quay.io/eclipse/che-server:next");
        let resource = build(&config);

        assert_eq!(
            resource.spec.server.che_image.as_deref(),
            Some("quay.io/eclipse/che-server")
        );
        assert_eq!(resource.spec.server.che_image_tag.as_deref(), Some("next"));
    }

    #[test]
    fn test_invalid_che_server_image() {
        for image in ["my-image", "localhost:5000/my-image:tag"] {
            let config = Configuration::default().with_che_server_image(image);
            let err = CustomResource::from_configuration(&config).unwrap_err();

            assert!(matches!(err, DeployError::InvalidImage(ref found) if found == image));
            assert_eq!(
                err.to_string(),
                format!(
                    "che server image needs to be in format: [server/]imageName:imageTag. Found {image}"
                )
            );
        }
    }

    #[test]
    fn test_yaml_round_trip() {
        let config = Configuration::default()
            .with_plugin_registry_image("quay.io/foo/plugins:1.0")
            .with_devfile_registry_image("quay.io/foo/devfiles:2.0")
            .with_che_server_image("quay.io/foo/server:3.0");
        let resource = build(&config);

        let parsed: CustomResource = serde_yaml::from_str(&resource.to_yaml().unwrap()).unwrap();
        assert_eq!(parsed, resource);
    }
}
