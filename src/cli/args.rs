//! CLI argument definitions using clap

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand, ValueHint};
use regex::Regex;

use crate::domain::LayoutEngine;

/// Fabric object names: letters, digits, `_ . : -`, at most 64 characters.
const TENANT_NAME_PATTERN: &str = r"^[A-Za-z0-9_.:-]{1,64}$";

/// Plot topology diagrams of a running ACI fabric
#[derive(Parser, Debug)]
#[command(name = "aciplot")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Debug level: -d info, -dd debug, -ddd trace (logs go to stderr)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub debug: u8,

    /// Config file (default: $XDG_CONFIG_HOME/aciplot/aciplot.toml)
    #[arg(long, global = true, value_hint = ValueHint::FilePath)]
    pub config: Option<PathBuf>,

    /// Plot options when no subcommand is given
    #[command(flatten)]
    pub plot: PlotArgs,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Query the fabric and render the diagram (default)
    Plot(PlotArgs),

    /// Manage settings
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Generate shell completions
    Completion {
        /// Shell type
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct PlotArgs {
    /// APIC URL, e.g. https://apic.example.net
    #[arg(short = 'a', long = "apic", env = "ACIPLOT_APIC", value_hint = ValueHint::Url)]
    pub apic: Option<String>,

    /// APIC user
    #[arg(short, long, env = "ACIPLOT_USER")]
    pub user: Option<String>,

    /// APIC password
    #[arg(short, long, env = "ACIPLOT_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Plot only this tenant (default: all tenants)
    #[arg(short, long, value_parser = parse_tenant_name)]
    pub tenant: Option<String>,

    /// Output file; the extension selects the format
    #[arg(short, long, value_hint = ValueHint::FilePath)]
    pub output: Option<PathBuf>,

    /// Graphviz layout engine: dot, neato, fdp, sfdp, circo, twopi
    #[arg(short, long, value_parser = parse_layout_engine)]
    pub engine: Option<LayoutEngine>,

    /// Per-request timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Print the DOT document to stdout after rendering
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum ConfigCommands {
    /// Show effective config
    Show,

    /// Show config file path
    Path,

    /// Create config template
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
}

/// Tenant names end up inside a query filter; reject anything outside the fabric naming rule.
pub fn parse_tenant_name(name: &str) -> Result<String, String> {
    let re = Regex::new(TENANT_NAME_PATTERN).map_err(|e| e.to_string())?;
    if re.is_match(name) {
        Ok(name.to_string())
    } else {
        Err(format!(
            "invalid tenant name '{name}': use 1-64 of letters, digits, '_', '.', ':', '-'"
        ))
    }
}

fn parse_layout_engine(name: &str) -> Result<LayoutEngine, String> {
    name.parse()
}
