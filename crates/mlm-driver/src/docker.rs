// Docker-backed ContainerDriver.
//
// `start`/`stop` run the catalog's opaque command arrays directly via
// `tokio::process::Command` — argv in, no shell interpretation, matching
// spec.md §4.3. `inspect` and the "remove a stopped container before
// restart" step shell out to the `docker` CLI directly since those are not
// part of the catalog-declared commands.
//
// Grounded on the `tokio::process::Command` usage in
// `other_examples/.../model_manager.rs` (kill_on_drop, captured stdio,
// `anyhow::Context` on spawn failure).

use std::time::Duration;

use anyhow::{bail, Context};
use async_trait::async_trait;
use mlm_contracts::ModelSpec;
use mlm_core::{ContainerDriver, ContainerInspection};
use tokio::process::Command;
use tracing::{info, warn};

const DRIVER_OP_TIMEOUT: Duration = Duration::from_secs(120);

pub struct DockerContainerDriver {
    docker_bin: String,
}

impl DockerContainerDriver {
    pub fn new() -> Self {
        Self {
            docker_bin: std::env::var("MLM_DOCKER_BIN").unwrap_or_else(|_| "docker".to_string()),
        }
    }

    async fn run_argv(&self, argv: &[String]) -> anyhow::Result<()> {
        let Some((program, args)) = argv.split_first() else {
            bail!("empty command");
        };

        let output = tokio::time::timeout(
            DRIVER_OP_TIMEOUT,
            Command::new(program)
                .args(args)
                .kill_on_drop(true)
                .output(),
        )
        .await
        .context("command timed out")?
        .with_context(|| format!("failed to spawn {program}"))?;

        if !output.status.success() {
            bail!(
                "{program} exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr)
            );
        }
        Ok(())
    }

    async fn docker(&self, args: &[&str]) -> anyhow::Result<String> {
        let output = tokio::time::timeout(
            DRIVER_OP_TIMEOUT,
            Command::new(&self.docker_bin)
                .args(args)
                .kill_on_drop(true)
                .output(),
        )
        .await
        .context("docker command timed out")?
        .context("failed to spawn docker")?;

        if !output.status.success() {
            bail!(
                "docker {:?} exited with {}: {}",
                args,
                output.status,
                String::from_utf8_lossy(&output.stderr)
            );
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

impl Default for DockerContainerDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContainerDriver for DockerContainerDriver {
    async fn inspect(&self, container_name: &str) -> anyhow::Result<ContainerInspection> {
        let status = self
            .docker(&[
                "inspect",
                "--format",
                "{{.State.Status}}",
                container_name,
            ])
            .await;

        let status_line = match status {
            Ok(s) => s,
            Err(_) => return Ok(ContainerInspection::absent()),
        };

        let running = status_line == "running";
        let ports = self
            .docker(&[
                "inspect",
                "--format",
                "{{range $p, $_ := .NetworkSettings.Ports}}{{$p}} {{end}}",
                container_name,
            ])
            .await
            .unwrap_or_default();

        Ok(ContainerInspection {
            present: true,
            running,
            status_line,
            ports,
        })
    }

    async fn start(&self, spec: &ModelSpec) -> anyhow::Result<()> {
        let inspection = self.inspect(&spec.container_name).await?;
        if inspection.present && inspection.running {
            info!(container = %spec.container_name, "already running, treating start as success");
            return Ok(());
        }
        if inspection.present && !inspection.running {
            info!(container = %spec.container_name, "removing stopped container before restart");
            if let Err(e) = self.docker(&["rm", "-f", &spec.container_name]).await {
                warn!(container = %spec.container_name, error = %e, "failed to remove stale container, proceeding anyway");
            }
        }
        self.run_argv(&spec.start_command).await
    }

    async fn stop(&self, spec: &ModelSpec) -> anyhow::Result<()> {
        if !spec.stop_command.is_empty() {
            return self.run_argv(&spec.stop_command).await;
        }
        self.docker(&["stop", &spec.container_name]).await.map(|_| ())
    }
}
