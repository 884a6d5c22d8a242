//! Environment checks

use anyhow::Result;
use serde::Serialize;

use crate::helm;
use crate::output::{print_error, print_json, print_success, OutputFormat};

#[derive(Serialize)]
struct DoctorReport {
    helm_available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    helm_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Check that helm can be executed. Returns false when it cannot.
pub async fn run(format: OutputFormat) -> Result<bool> {
    let report = match helm::version().await {
        Ok(version) => DoctorReport {
            helm_available: true,
            helm_version: Some(version),
            error: None,
        },
        Err(e) => DoctorReport {
            helm_available: false,
            helm_version: None,
            error: Some(format!("{:#}", e)),
        },
    };

    match format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Table => match (&report.helm_version, &report.error) {
            (Some(version), _) => print_success(&format!("helm {}", version)),
            (_, Some(error)) => print_error(&format!("helm is not available: {}", error)),
            _ => {}
        },
    }

    Ok(report.helm_available)
}
