//! Shell completion generation and installation.

use anyhow::{Context, Result, bail};
use clap::CommandFactory;
use clap_complete::{Shell, generate};
use console::style;
use directories::BaseDirs;
use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::Cli;

/// Generate shell completions to stdout.
pub(crate) fn cmd_completions(shell: Shell) {
    let mut cmd = Cli::command();
    let name = cmd
        .get_name()
        .to_string();
    generate(shell, &mut cmd, name, &mut io::stdout());
}

/// Detect the user's current shell from `$SHELL`.
fn detect_shell_type() -> Option<Shell> {
    env::var("SHELL")
        .ok()
        .and_then(|path| shell_from_path(&path))
}

/// Match the file name of a shell binary.
fn shell_from_path(shell_path: &str) -> Option<Shell> {
    let shell_name = Path::new(shell_path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("");
    match shell_name {
        "bash" => Some(Shell::Bash),
        "zsh" => Some(Shell::Zsh),
        "fish" => Some(Shell::Fish),
        "elvish" => Some(Shell::Elvish),
        "pwsh" | "powershell" => Some(Shell::PowerShell),
        _ => None,
    }
}

/// Where a shell picks up user completions.
fn install_path(shell: Shell, dirs: &BaseDirs) -> Result<PathBuf> {
    let path = match shell {
        Shell::Bash => dirs
            .data_dir()
            .join("bash-completion")
            .join("completions")
            .join("meshscan"),
        Shell::Zsh => dirs
            .home_dir()
            .join(".zfunc")
            .join("_meshscan"),
        Shell::Fish => dirs
            .config_dir()
            .join("fish")
            .join("completions")
            .join("meshscan.fish"),
        Shell::Elvish => dirs
            .config_dir()
            .join("elvish")
            .join("lib")
            .join("meshscan.elv"),
        _ => bail!("Automatic install is not supported for {shell}; redirect `meshscan completions {shell}` instead"),
    };
    Ok(path)
}

/// Install shell completions automatically.
pub(crate) fn cmd_completions_install(shell_arg: Option<Shell>) -> Result<()> {
    let shell = match shell_arg {
        Some(s) => s,
        None => detect_shell_type().context(
            "Could not detect your shell. Please specify it explicitly:\n  \
             meshscan completions --install bash",
        )?,
    };

    let dirs = BaseDirs::new().context("Could not determine home directory")?;
    let path = install_path(shell, &dirs)?;

    let mut buf = Vec::new();
    let mut cmd = Cli::command();
    let name = cmd
        .get_name()
        .to_string();
    generate(shell, &mut cmd, name, &mut buf);

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    fs::write(&path, &buf)
        .with_context(|| format!("Failed to write completion file: {}", path.display()))?;

    eprintln!(
        "{} Installed {} completions to {}",
        style("✓")
            .green()
            .bold(),
        style(shell).cyan(),
        style(path.display()).yellow()
    );
    if shell == Shell::Zsh {
        eprintln!(
            "Make sure {} is in your .zshrc, then restart your shell.",
            style("fpath=(~/.zfunc $fpath)").cyan()
        );
    }

    Ok(())
}
