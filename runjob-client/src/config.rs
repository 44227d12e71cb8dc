//! Credential resolution
//!
//! A kubeconfig file is used when it exists; otherwise the in-cluster
//! service account identity is assumed.

use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use std::path::Path;
use tracing::{debug, info};

use crate::error::{ClientError, Result};

/// Builds an authenticated client
///
/// # Arguments
/// * `kubeconfig` - Path to a kubeconfig file; ignored if it does not exist
///
/// # Errors
/// `ClientError::ConfigError` when neither the kubeconfig nor the in-cluster
/// environment yields a usable configuration.
pub async fn connect(kubeconfig: &Path) -> Result<Client> {
    let config = resolve_config(kubeconfig).await?;
    Client::try_from(config).map_err(|e| ClientError::ConfigError(format!("Failed to build client: {}", e)))
}

async fn resolve_config(kubeconfig: &Path) -> Result<Config> {
    if kubeconfig.is_file() {
        info!("Using kubeconfig {}", kubeconfig.display());
        let file = Kubeconfig::read_from(kubeconfig).map_err(|e| {
            ClientError::ConfigError(format!(
                "Error building kubeconfig {}: {}",
                kubeconfig.display(),
                e
            ))
        })?;

        return Config::from_custom_kubeconfig(file, &KubeConfigOptions::default())
            .await
            .map_err(|e| {
                ClientError::ConfigError(format!(
                    "Error building kubeconfig {}: {}",
                    kubeconfig.display(),
                    e
                ))
            });
    }

    debug!(
        "Kubeconfig {} not found, falling back to in-cluster configuration",
        kubeconfig.display()
    );
    Config::incluster()
        .map_err(|e| ClientError::ConfigError(format!("Error building in-cluster config: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_unreadable_kubeconfig_is_a_config_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "this: [is not a kubeconfig").unwrap();

        let err = resolve_config(file.path()).await.unwrap_err();
        assert!(matches!(err, ClientError::ConfigError(_)));
        assert!(err.to_string().contains("Error building kubeconfig"));
    }

    #[tokio::test]
    async fn test_kubeconfig_with_server_resolves() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
apiVersion: v1
kind: Config
current-context: test
clusters:
  - name: test
    cluster:
      server: https://127.0.0.1:6443
contexts:
  - name: test
    context:
      cluster: test
      user: test
      namespace: batch
users:
  - name: test
    user:
      token: abc
"#
        )
        .unwrap();

        let config = resolve_config(file.path()).await.unwrap();
        assert_eq!(config.cluster_url.host(), Some("127.0.0.1"));
        assert_eq!(config.cluster_url.port_u16(), Some(6443));
        assert_eq!(config.default_namespace, "batch");
    }
}
