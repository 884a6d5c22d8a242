//! Reading and rewriting the kubeconfig's current context
//!
//! The file is handled as untyped YAML so fields this tool does not know
//! about survive the round trip.

use anyhow::{bail, Context, Result};
use dialoguer::{theme::ColorfulTheme, Select};
use serde_yaml::{Mapping, Value};
use std::path::Path;

const CURRENT_CONTEXT: &str = "current-context";

/// A kubeconfig document loaded from disk
#[derive(Debug, Clone)]
pub struct KubeconfigFile {
    document: Mapping,
}

impl KubeconfigFile {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read kubeconfig {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid kubeconfig {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        match serde_yaml::from_str(content)? {
            Value::Mapping(document) => Ok(Self { document }),
            Value::Null => Ok(Self {
                document: Mapping::new(),
            }),
            _ => bail!("kubeconfig must be a YAML mapping"),
        }
    }

    /// Context names in file order
    pub fn contexts(&self) -> Vec<String> {
        self.document
            .get("contexts")
            .and_then(Value::as_sequence)
            .map(|contexts| {
                contexts
                    .iter()
                    .filter_map(|c| c.get("name").and_then(Value::as_str))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn current_context(&self) -> Option<&str> {
        self.document.get(CURRENT_CONTEXT).and_then(Value::as_str)
    }

    /// Set the current context; the name must be one of [`contexts`](Self::contexts)
    pub fn set_current_context(&mut self, name: &str) -> Result<()> {
        let contexts = self.contexts();
        if !contexts.iter().any(|c| c == name) {
            bail!(
                "context \"{}\" not found in kubeconfig (available: {})",
                name,
                if contexts.is_empty() {
                    "none".to_string()
                } else {
                    contexts.join(", ")
                }
            );
        }
        self.document
            .insert(Value::from(CURRENT_CONTEXT), Value::from(name));
        Ok(())
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_yaml::to_string(&self.document).context("Failed to serialize kubeconfig")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write kubeconfig {}", path.display()))
    }
}

/// Ask the user to pick one of the available contexts
pub fn prompt_for_context(file: &KubeconfigFile) -> Result<String> {
    let contexts = file.contexts();
    if contexts.is_empty() {
        bail!("kubeconfig has no contexts");
    }

    let default = file
        .current_context()
        .and_then(|current| contexts.iter().position(|c| c == current))
        .unwrap_or(0);

    let selection = Select::with_theme(&ColorfulTheme::default())
        .with_prompt("Select a context")
        .items(&contexts)
        .default(default)
        .interact()?;

    Ok(contexts[selection].clone())
}
