//! Thin wrapper around the `helm` executable

use anyhow::{bail, Context, Result};
use tokio::process::Command;
use tracing::debug;

pub const KEDA_REPO_NAME: &str = "kedacore";
pub const KEDA_REPO_URL: &str = "https://kedacore.github.io/charts";
pub const KEDA_CHART: &str = "kedacore/keda";

/// Captured output of a successful helm invocation
#[derive(Debug, Clone)]
pub struct HelmOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Argument lists for installing KEDA, in the order they must run
pub fn keda_install_steps(namespace: &str, release: &str) -> Vec<Vec<String>> {
    let args = |parts: &[&str]| parts.iter().map(|p| p.to_string()).collect::<Vec<_>>();
    vec![
        args(&["repo", "add", KEDA_REPO_NAME, KEDA_REPO_URL]),
        args(&["repo", "update"]),
        args(&[
            "install",
            release,
            KEDA_CHART,
            "--namespace",
            namespace,
            "--create-namespace",
        ]),
    ]
}

/// Run `helm` with `args`, failing on a non-zero exit status
pub async fn run(args: &[String]) -> Result<HelmOutput> {
    debug!(args = ?args, "Running helm");
    let output = Command::new("helm")
        .args(args)
        .output()
        .await
        .context("Failed to run helm; is it installed and on PATH?")?;

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

    if !output.status.success() {
        bail!(
            "helm {} failed ({}): {}",
            args.join(" "),
            output.status,
            stderr.trim()
        );
    }

    Ok(HelmOutput { stdout, stderr })
}

/// `helm version --short`
pub async fn version() -> Result<String> {
    let output = run(&["version".to_string(), "--short".to_string()]).await?;
    Ok(output.stdout.trim().to_string())
}
