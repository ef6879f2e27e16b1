//! Serial port selection.
//!
//! An explicit `--port` or a configured port always wins. Otherwise the
//! available ports are listed: a single candidate is used directly, several
//! candidates prompt the user unless running non-interactively.

use {
    crate::{CliError, config::Config},
    anyhow::Result,
    console::style,
    dialoguer::{Confirm, Error as DialoguerError, Select, theme::ColorfulTheme},
    log::{debug, error, info},
    meshscan::{NativePortEnumerator, PortEnumerator, PortInfo},
    std::{cmp::Ordering, io::IsTerminal},
};

/// Options for serial port selection.
#[derive(Debug, Clone, Default)]
pub struct SerialOptions {
    /// Explicit port specified via CLI or environment.
    pub port: Option<String>,
    /// Non-interactive mode (fail instead of prompting).
    pub non_interactive: bool,
}

/// Outcome of port selection.
#[derive(Debug)]
pub struct SelectedPort {
    /// Port name/path.
    pub name: String,
    /// Whether the user picked it from a prompt.
    pub prompted: bool,
}

fn usage_err(message: &str) -> anyhow::Error {
    CliError::Usage(message.to_string()).into()
}

/// Select the port to scan with.
pub fn select_serial_port(options: &SerialOptions, config: &Config) -> Result<SelectedPort> {
    if let Some(name) = &options.port {
        return Ok(SelectedPort {
            name: name.clone(),
            prompted: false,
        });
    }

    if let Some(name) = &config.connection.port {
        debug!("Using port from config: {name}");
        return Ok(SelectedPort {
            name: name.clone(),
            prompted: false,
        });
    }

    let mut ports = NativePortEnumerator::list_ports()?;
    // USB adapters first; printers almost always enumerate as one.
    ports.sort_by_key(|p| p.vid.is_none());

    if options.non_interactive {
        return select_non_interactive_port(ports);
    }

    match ports.len().cmp(&1) {
        Ordering::Equal => {
            let port = select_non_interactive_port(ports)?;
            info!("Auto-selected port: {}", port.name);
            Ok(port)
        },
        Ordering::Greater => {
            ensure_interactive_terminal()?;
            select_port_interactive(&ports)
        },
        Ordering::Less => Err(usage_err(
            "No serial ports found. Connect the printer or pass --port",
        )),
    }
}

/// Pick the only candidate, never prompting.
fn select_non_interactive_port(ports: Vec<PortInfo>) -> Result<SelectedPort> {
    match ports.len().cmp(&1) {
        Ordering::Equal => Ok(SelectedPort {
            name: ports
                .into_iter()
                .next()
                .map(|p| p.name)
                .unwrap_or_default(),
            prompted: false,
        }),
        Ordering::Greater => Err(usage_err(
            "Found multiple serial ports; pass --port to choose one",
        )),
        Ordering::Less => Err(usage_err(
            "No serial ports found. Connect the printer or pass --port",
        )),
    }
}

fn ensure_interactive_terminal() -> Result<()> {
    if std::io::stdin().is_terminal() && std::io::stderr().is_terminal() {
        Ok(())
    } else {
        Err(usage_err(
            "Port selection needs an interactive terminal; pass --port",
        ))
    }
}

fn map_prompt_error(err: DialoguerError) -> anyhow::Error {
    match err {
        DialoguerError::IO(io_err) => {
            if io_err.kind() == std::io::ErrorKind::Interrupted {
                CliError::Cancelled("Port selection cancelled".to_string()).into()
            } else {
                usage_err("Port prompt failed")
            }
        },
    }
}

/// One-line description of a port for prompts and listings.
pub fn port_label(port: &PortInfo) -> String {
    let ids = match (port.vid, port.pid) {
        (Some(vid), Some(pid)) => format!(" ({vid:04X}:{pid:04X})"),
        _ => String::new(),
    };
    let product = port
        .product
        .as_deref()
        .or(port.manufacturer.as_deref())
        .map(|p| format!(" - {p}"))
        .unwrap_or_default();
    format!("{}{ids}{product}", port.name)
}

fn select_port_interactive(ports: &[PortInfo]) -> Result<SelectedPort> {
    eprintln!(
        "{} Found {} serial ports",
        style("ℹ").blue(),
        ports.len()
    );

    let term_width = console::Term::stderr()
        .size()
        .1 as usize;
    let max_item_width = term_width.saturating_sub(4);
    let labels: Vec<String> = ports
        .iter()
        .map(|p| console::truncate_str(&port_label(p), max_item_width, "\u{2026}").into_owned())
        .collect();

    let selection = Select::with_theme(&ColorfulTheme::default())
        .with_prompt("Select the printer's serial port")
        .items(&labels)
        .default(0)
        .interact_opt()
        .map_err(map_prompt_error)?;

    match selection.and_then(|index| ports.get(index)) {
        Some(port) => Ok(SelectedPort {
            name: port.name.clone(),
            prompted: true,
        }),
        None => Err(CliError::Cancelled("Port selection cancelled".to_string()).into()),
    }
}

/// Offer to store a prompted port in the local config.
pub fn ask_remember_port(port: &SelectedPort) -> Result<()> {
    if !port.prompted {
        return Ok(());
    }

    let confirmed = Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt(format!(
            "Remember {} in {}?",
            port.name,
            crate::config::LOCAL_CONFIG
        ))
        .default(false)
        .interact_opt()
        .map_err(map_prompt_error)?
        .unwrap_or(false);

    if confirmed {
        if let Err(e) = Config::save_port(std::path::Path::new(crate::config::LOCAL_CONFIG), &port.name) {
            error!("Failed to save port configuration: {e}");
        }
    }

    Ok(())
}
