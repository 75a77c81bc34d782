//! hid_listen: print debug messages from a USB HID device.
//!
//! Waits for a device exposing the PJRC debug interface (usage page 0xFF31,
//! usage 0x74), prints whatever text it sends, and goes back to waiting when
//! it is unplugged. Stop with Ctrl-C.
//!
//! Usage:
//!   hid_listen                       # any device with the debug interface
//!   hid_listen --vid 0x16c0 -v       # only one vendor, log to stderr at info
//!   hid_listen --config listen.toml  # settings from a file; flags still win

use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::debug;

use rawhid::backends::NativeBackend;
use rawhid::{ConsoleSink, ListenConfig, Listener};

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Listen for debug messages from a USB HID device
#[derive(Parser, Debug)]
#[command(name = "hid_listen", version = VERSION, about)]
struct Cli {
    /// TOML file with listener settings
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Vendor ID to match (0 = any)
    #[arg(long, value_parser = parse_u16)]
    vid: Option<u16>,

    /// Product ID to match (0 = any)
    #[arg(long, value_parser = parse_u16)]
    pid: Option<u16>,

    /// Usage page to match (0 = any)
    #[arg(long, value_parser = parse_u16)]
    usage_page: Option<u16>,

    /// Usage to match (0 = any)
    #[arg(long, value_parser = parse_u16)]
    usage: Option<u16>,

    /// Read timeout in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Delay between open attempts in milliseconds
    #[arg(long)]
    poll_ms: Option<u64>,

    /// Read buffer size in bytes
    #[arg(long)]
    report_size: Option<usize>,

    /// Log more to stderr (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// Accepts `0x`-prefixed hex or decimal.
fn parse_u16(s: &str) -> Result<u16, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("`{s}` is not a 16-bit ID: {e}"))
}

impl Cli {
    fn config(&self) -> Result<ListenConfig> {
        let mut config = match &self.config {
            Some(path) => ListenConfig::load(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => ListenConfig::default(),
        };
        if let Some(v) = self.vid {
            config.vendor_id = v;
        }
        if let Some(v) = self.pid {
            config.product_id = v;
        }
        if let Some(v) = self.usage_page {
            config.usage_page = v;
        }
        if let Some(v) = self.usage {
            config.usage = v;
        }
        if let Some(v) = self.timeout_ms {
            config.read_timeout_ms = v;
        }
        if let Some(v) = self.poll_ms {
            config.poll_interval_ms = v;
        }
        if let Some(v) = self.report_size {
            config.report_size = v;
        }
        Ok(config)
    }
}

fn setup_logging(verbose: u8) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    // Device text owns stdout.
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let config = cli.config()?;
    debug!(?config, "starting");

    let stop = Arc::new(AtomicBool::new(false));
    let stop_handler = Arc::clone(&stop);
    ctrlc::set_handler(move || {
        stop_handler.store(true, Ordering::SeqCst);
    })
    .context("installing Ctrl-C handler")?;

    let listener = Listener::from_config(NativeBackend::new(), &config);
    let mut sink = ConsoleSink::new(io::stdout().lock());
    listener
        .run(&mut sink, &stop)
        .context("writing to stdout")?;
    drop(sink);
    println!();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_parsing() {
        assert_eq!(parse_u16("0xFF31"), Ok(0xff31));
        assert_eq!(parse_u16("0x74"), Ok(0x74));
        assert_eq!(parse_u16("116"), Ok(116));
        assert!(parse_u16("0x10000").is_err());
        assert!(parse_u16("ff31").is_err());
    }

    #[test]
    fn flags_override_defaults() {
        let cli = Cli::parse_from(["hid_listen", "--vid", "0x16c0", "--usage", "0", "-vv"]);
        let config = cli.config().unwrap();
        assert_eq!(config.vendor_id, 0x16c0);
        assert_eq!(config.usage, 0);
        assert_eq!(config.usage_page, 0xff31);
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn cli_definition() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
