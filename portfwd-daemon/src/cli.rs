//! CLI argument definitions for portfwd-daemon.
//!
//! Uses `clap` v4 derive macros to parse command-line arguments.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use portfwd_core::config::PortfwdConfig;

/// portfwd port forwarding controller daemon.
///
/// Watches annotated Pods and keeps matching port forwarding rules
/// on the UniFi gateway in sync with their scheduled host.
#[derive(Parser, Debug)]
#[command(name = "portfwd-daemon")]
#[command(version, about, long_about = None)]
pub struct DaemonCli {
    /// Path to portfwd.toml configuration file.
    #[arg(short, long, default_value = "/etc/portfwd/portfwd.toml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_level: Option<String>,

    /// Override log format (json, pretty).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_format: Option<String>,

    /// Validate configuration file and exit without starting the daemon.
    #[arg(long)]
    pub validate: bool,
}

impl DaemonCli {
    /// Load the configuration file and apply overrides.
    ///
    /// Precedence: defaults < file < `PORTFWD_*` environment < CLI flags.
    /// The merged result is validated once at the end.
    pub async fn load_config(&self) -> Result<PortfwdConfig> {
        let mut config = PortfwdConfig::from_file(&self.config)
            .await
            .map_err(|e| anyhow::anyhow!("failed to load {}: {}", self.config.display(), e))?;
        config.apply_env_overrides();

        if let Some(level) = &self.log_level {
            config.general.log_level = level.clone();
        }
        if let Some(format) = &self.log_format {
            config.general.log_format = format.clone();
        }

        config
            .validate()
            .map_err(|e| anyhow::anyhow!("invalid configuration: {}", e))?;
        Ok(config)
    }
}
