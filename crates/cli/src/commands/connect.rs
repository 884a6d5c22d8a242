//! Kubeconfig context switching

use anyhow::Result;
use serde::Serialize;
use std::path::Path;
use tracing::info;

use crate::kubeconfig::{prompt_for_context, KubeconfigFile};
use crate::output::{print_json, print_success, OutputFormat};

#[derive(Serialize)]
struct ConnectResult<'a> {
    kubeconfig: &'a Path,
    previous_context: Option<&'a str>,
    current_context: &'a str,
}

/// Set the current context of the kubeconfig at `path`.
///
/// Without `context_name` the user picks one interactively.
pub fn run(path: &Path, context_name: Option<String>, format: OutputFormat) -> Result<()> {
    let mut file = KubeconfigFile::load(path)?;
    let previous = file.current_context().map(str::to_string);

    let context = match context_name {
        Some(name) => name,
        None => prompt_for_context(&file)?,
    };

    file.set_current_context(&context)?;
    file.save(path)?;
    info!(kubeconfig = %path.display(), context = %context, "Switched context");

    match format {
        OutputFormat::Json => print_json(&ConnectResult {
            kubeconfig: path,
            previous_context: previous.as_deref(),
            current_context: &context,
        })?,
        OutputFormat::Table => {
            print_success(&format!("Switched to context \"{}\"", context));
            if let Some(previous) = previous.filter(|p| p != &context) {
                println!("Previous context: {}", previous);
            }
        }
    }

    Ok(())
}
