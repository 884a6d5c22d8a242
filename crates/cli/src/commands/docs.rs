//! Markdown reference generated from the clap command tree

use anyhow::{Context, Result};
use clap::{Command, CommandFactory};
use std::path::{Path, PathBuf};

use crate::output::print_success;
use crate::Cli;

/// Write one Markdown file per visible command into `dir`
pub fn generate(dir: &Path) -> Result<()> {
    let written = write_docs(Cli::command(), dir)?;
    print_success(&format!(
        "Wrote {} files to {}",
        written.len(),
        dir.display()
    ));
    Ok(())
}

fn write_docs(mut root: Command, dir: &Path) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create {}", dir.display()))?;
    root.build();

    let mut written = Vec::new();
    write_command(&mut root, &[], dir, &mut written)?;
    Ok(written)
}

fn write_command(
    command: &mut Command,
    parents: &[String],
    dir: &Path,
    written: &mut Vec<PathBuf>,
) -> Result<()> {
    let mut path_parts = parents.to_vec();
    path_parts.push(command.get_name().to_string());

    let title = path_parts.join(" ");
    let about = command
        .get_about()
        .map(ToString::to_string)
        .unwrap_or_default();
    let help = command.render_long_help().to_string();

    let visible: Vec<String> = command
        .get_subcommands()
        .filter(|c| !c.is_hide_set() && c.get_name() != "help")
        .map(|c| c.get_name().to_string())
        .collect();

    let mut body = format!("# {}\n\n", title);
    if !about.is_empty() {
        body.push_str(&format!("{}\n\n", about));
    }
    body.push_str(&format!("```text\n{}\n```\n", help.trim_end()));
    if !visible.is_empty() {
        body.push_str("\n## Commands\n\n");
        for name in &visible {
            body.push_str(&format!(
                "- [{}]({}_{}.md)\n",
                name,
                path_parts.join("_"),
                name
            ));
        }
    }

    let file = dir.join(format!("{}.md", path_parts.join("_")));
    std::fs::write(&file, body).with_context(|| format!("Failed to write {}", file.display()))?;
    written.push(file);

    for sub in command.get_subcommands_mut() {
        if sub.is_hide_set() || sub.get_name() == "help" {
            continue;
        }
        write_command(sub, &path_parts, dir, written)?;
    }
    Ok(())
}
