//! CLI argument parsing using clap derive API
//!
//! This module defines the command-line interface structure using clap's derive macros.
//! It is purely declarative with no side effects or I/O.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// portfwd -- UniFi port forwarding for annotated Kubernetes Pods.
///
/// Use `portfwd <COMMAND> --help` for subcommand details.
#[derive(Parser, Debug)]
#[command(name = "portfwd", version, about, long_about = None)]
pub struct Cli {
    /// Path to the portfwd.toml configuration file.
    #[arg(short, long, default_value = "portfwd.toml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Output format.
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Supported output formats.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table / text output.
    Text,
    /// Machine-readable JSON.
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Inspect forwarding rules on the appliance.
    Rules(RulesArgs),

    /// Manage configuration.
    Config(ConfigArgs),
}

// ---- rules ----

/// Inspect forwarding rules on the appliance.
#[derive(Args, Debug)]
pub struct RulesArgs {
    #[command(subcommand)]
    pub action: RulesAction,
}

#[derive(Subcommand, Debug)]
pub enum RulesAction {
    /// List the forwarding rules currently configured on the appliance.
    List {
        /// Only show rules whose name starts with this prefix.
        #[arg(long)]
        prefix: Option<String>,
    },
    /// Show which rules a workload would delete and create, without changing anything.
    Plan(PlanArgs),
}

/// Dry-run input describing a single workload.
#[derive(Args, Debug)]
pub struct PlanArgs {
    /// Workload namespace.
    #[arg(long)]
    pub namespace: String,

    /// Workload (Pod) name.
    #[arg(long)]
    pub name: String,

    /// Host IP the workload is scheduled on (omit for an unscheduled workload).
    #[arg(long)]
    pub address: Option<String>,

    /// Host ports the workload declares (repeatable).
    #[arg(long = "port", required = true)]
    pub ports: Vec<u16>,
}

// ---- config ----

/// Manage portfwd configuration.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Validate the configuration file and report errors.
    Validate,
    /// Show the effective configuration (file + env overrides + defaults).
    Show {
        /// Show only a specific section (general, controller, unifi, metrics).
        #[arg(long)]
        section: Option<String>,
    },
}
