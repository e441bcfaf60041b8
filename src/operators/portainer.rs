use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bollard::container::ListContainersOptions;
use bollard::exec::CreateExecOptions;
use log::{error, info};
use tokio::sync::OnceCell;

use crate::connection::ConnectionSource;
use crate::error::{Error, Result};
use crate::hooks::{PortainerHook, DEFAULT_API_VERSION};

/// Execute a command inside a docker container via portainer.
///
/// All fields are fixed at declaration time; [`execute`](Self::execute)
/// runs the command once, logs every output chunk as it arrives and
/// returns the full transcript in order.
pub struct PortainerExecOperator {
    source: Arc<dyn ConnectionSource>,
    conn_id: String,
    endpoint_id: i64,
    timeout: Duration,
    container_name: String,
    command: String,
    user: String,
    api_version: String,
    hook: OnceCell<PortainerHook>,
}

impl PortainerExecOperator {
    pub fn new(
        source: Arc<dyn ConnectionSource>,
        conn_id: &str,
        endpoint_id: i64,
        timeout: Duration,
        container_name: &str,
        command: &str,
        user: &str,
    ) -> Self {
        Self {
            source,
            conn_id: conn_id.to_string(),
            endpoint_id,
            timeout,
            container_name: container_name.to_string(),
            command: command.to_string(),
            user: user.to_string(),
            api_version: String::from(DEFAULT_API_VERSION),
            hook: OnceCell::new(),
        }
    }

    /// Override the docker API version spoken through the proxy.
    pub fn with_api_version(mut self, version: &str) -> Self {
        self.api_version = version.to_string();
        self
    }

    /// Hook for the declared connection and endpoint (cached).
    async fn hook(&self) -> Result<&PortainerHook> {
        self.hook
            .get_or_try_init(|| async {
                PortainerHook::new(
                    Arc::clone(&self.source),
                    &self.conn_id,
                    self.endpoint_id,
                    &self.api_version,
                    self.timeout,
                )
            })
            .await
    }

    /// Run the declared command once inside the named container.
    ///
    /// The first running container matching the name filter is
    /// targeted; with duplicate names that is the first element as
    /// returned by the daemon. Every failure is logged here with its
    /// container and command context, then propagated wrapped in
    /// [`Error::Exec`].
    pub async fn execute(&self) -> Result<Vec<String>> {
        match self.run().await {
            Ok(log_lines) => Ok(log_lines),
            Err(e) => {
                error!(
                    "Error running {:?} in container {}: {}",
                    self.command, self.container_name, e
                );
                Err(Error::Exec {
                    container: self.container_name.clone(),
                    command: self.command.clone(),
                    source: Box::new(e),
                })
            }
        }
    }

    async fn run(&self) -> Result<Vec<String>> {
        let cli = self.hook().await?.get_client().await?;
        info!("Docker api client ready for {}", cli.endpoint_url());

        let mut filters = HashMap::new();
        filters.insert(
            String::from("name"),
            vec![self.container_name.clone()],
        );
        let containers = cli
            .containers(ListContainersOptions {
                filters,
                ..Default::default()
            })
            .await?;
        let container = containers
            .first()
            .ok_or_else(|| Error::ContainerNotFound(self.container_name.clone()))?;
        let container_id = container.id.clone().unwrap_or_default();

        let exec = cli
            .create_exec(
                &container_id,
                CreateExecOptions {
                    // TODO: quoted arguments are split naively here
                    cmd: Some(self.command.split_whitespace().map(String::from).collect()),
                    user: Some(self.user.clone()),
                    attach_stdout: Some(true),
                    attach_stderr: Some(true),
                    ..Default::default()
                },
            )
            .await?;

        let mut output = cli.start_exec(&exec.id).await?;
        let mut log_lines = Vec::new();
        while let Some(chunk) = output.next_chunk().await {
            let log_chunk = chunk?.trim().to_string();
            info!("{}", log_chunk);
            log_lines.push(log_chunk);
        }
        Ok(log_lines)
    }
}
