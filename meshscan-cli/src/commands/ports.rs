//! `list-ports` command.

use anyhow::{Context, Result};
use console::style;
use meshscan::{NativePortEnumerator, PortEnumerator};

use crate::serial::port_label;

/// List serial ports, as text on stderr or as JSON on stdout.
pub(crate) fn cmd_list_ports(json: bool) -> Result<()> {
    let ports = NativePortEnumerator::list_ports().context("Failed to enumerate serial ports")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&ports)?);
        return Ok(());
    }

    eprintln!("{}", style("Available serial ports:").bold().underlined());
    if ports.is_empty() {
        eprintln!("  {}", style("No serial ports found").dim());
        return Ok(());
    }

    for port in &ports {
        eprintln!("  {} {}", style("•").green(), style(port_label(port)).cyan());
    }
    Ok(())
}
