//! `portfwd rules` command handler

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use portfwd_controller::{PortDeclaration, WorkloadRecord, desired_rules};
use portfwd_core::config::PortfwdConfig;
use portfwd_core::types::ForwardRule;
use portfwd_forwarding::{ForwardingConfig, ForwardingReconciler, ReconcilePlan, UnifiClient};

use crate::cli::{PlanArgs, RulesAction, RulesArgs};
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `rules` command.
pub async fn execute(
    args: RulesArgs,
    config_path: &Path,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let config = PortfwdConfig::load(config_path).await?;
    let forwarding = connect(&config).await?;

    match args.action {
        RulesAction::List { prefix } => execute_list(&forwarding, prefix, writer).await,
        RulesAction::Plan(plan_args) => execute_plan(&forwarding, plan_args, writer).await,
    }
}

async fn connect(config: &PortfwdConfig) -> Result<ForwardingReconciler<UnifiClient>, CliError> {
    let forwarding_config = ForwardingConfig::from_core(config);
    forwarding_config.validate()?;

    info!(base_url = %forwarding_config.base_url, "connecting to UniFi controller");
    let client = UnifiClient::connect(&forwarding_config).await?;
    Ok(ForwardingReconciler::new(Arc::new(client), &forwarding_config))
}

async fn execute_list(
    forwarding: &ForwardingReconciler<UnifiClient>,
    prefix: Option<String>,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let rules = forwarding.list().await?;
    let report = RuleListReport::new(rules, prefix.as_deref());
    writer.render(&report)?;
    Ok(())
}

async fn execute_plan(
    forwarding: &ForwardingReconciler<UnifiClient>,
    args: PlanArgs,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let record = workload_from_args(&args);
    let desired = desired_rules(&record);

    info!(workload = %record.key(), rules = desired.len(), "computing forwarding plan");
    let plan = forwarding.preview(&desired).await?;

    writer.render(&PlanReport::new(&record, desired, plan))?;
    Ok(())
}

/// Build the workload view the controller would see for the given arguments.
pub fn workload_from_args(args: &PlanArgs) -> WorkloadRecord {
    WorkloadRecord {
        namespace: args.namespace.clone(),
        name: args.name.clone(),
        host_ip: args.address.clone().filter(|a| !a.is_empty()),
        ports: args
            .ports
            .iter()
            .map(|port| PortDeclaration {
                container: String::new(),
                container_port: i32::from(*port),
                host_port: Some(i32::from(*port)),
                protocol: "TCP".to_owned(),
            })
            .collect(),
        ..WorkloadRecord::default()
    }
}

/// Forwarding rules currently on the appliance.
#[derive(Serialize)]
pub struct RuleListReport {
    pub total: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    pub rules: Vec<ForwardRule>,
}

impl RuleListReport {
    pub fn new(mut rules: Vec<ForwardRule>, prefix: Option<&str>) -> Self {
        if let Some(prefix) = prefix {
            rules.retain(|r| r.name.starts_with(prefix));
        }
        rules.sort();
        Self {
            total: rules.len(),
            prefix: prefix.map(str::to_owned),
            rules,
        }
    }
}

impl Render for RuleListReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(
            w,
            "Forwarding Rules ({} total)",
            self.total.to_string().bold()
        )?;
        writeln!(w)?;
        writeln!(w, "{:<40} {:<16} {:<6}", "Name", "Address", "Port")?;
        writeln!(w, "{}", "-".repeat(64))?;

        for r in &self.rules {
            writeln!(w, "{:<40} {:<16} {:<6}", r.name, r.address, r.port)?;
        }

        Ok(())
    }
}

/// Dry-run result for a single workload.
#[derive(Serialize)]
pub struct PlanReport {
    pub workload: String,
    pub desired: Vec<ForwardRule>,
    pub stale: Vec<ForwardRule>,
    pub missing: Vec<ForwardRule>,
}

impl PlanReport {
    pub fn new(record: &WorkloadRecord, desired: Vec<ForwardRule>, plan: ReconcilePlan) -> Self {
        Self {
            workload: record.key().to_string(),
            desired,
            stale: plan.stale,
            missing: plan.missing,
        }
    }

    pub fn is_converged(&self) -> bool {
        self.stale.is_empty() && self.missing.is_empty()
    }
}

impl Render for PlanReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Forwarding Plan: {}", self.workload.bold())?;

        if self.is_converged() {
            writeln!(w, "  Result: {}", "UP TO DATE".green().bold())?;
            return Ok(());
        }

        for r in &self.stale {
            writeln!(w, "  {} {}", "-".red().bold(), r)?;
        }
        for r in &self.missing {
            writeln!(w, "  {} {}", "+".green().bold(), r)?;
        }
        writeln!(
            w,
            "  Result: {} to delete, {} to create",
            self.stale.len(),
            self.missing.len()
        )?;

        Ok(())
    }
}
