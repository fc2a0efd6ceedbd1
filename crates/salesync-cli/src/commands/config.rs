//! Config command - View and validate the Salesync configuration
//!
//! Provides the `salesync config` CLI command which:
//! 1. Shows the effective configuration (YAML or JSON) with secrets masked
//! 2. Validates the configuration file and reports every error

use anyhow::{Context, Result};
use clap::Subcommand;
use tracing::info;

use salesync_core::config::Config;

use super::CliContext;
use crate::output::{get_formatter, OutputFormat};

const MASK: &str = "********";

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Display the effective configuration
    Show,
    /// Validate the configuration file
    Validate,
}

impl ConfigCommand {
    pub async fn execute(&self, ctx: &CliContext, format: OutputFormat) -> Result<()> {
        match self {
            ConfigCommand::Show => execute_show(ctx, format),
            ConfigCommand::Validate => execute_validate(ctx, format),
        }
    }
}

fn execute_show(ctx: &CliContext, format: OutputFormat) -> Result<()> {
    let formatter = get_formatter(format);
    let config = masked(&ctx.config);

    info!(config_path = %ctx.config_path.display(), "Showing configuration");

    if format.is_json() {
        let json =
            serde_json::to_value(&config).context("Failed to serialize configuration to JSON")?;
        formatter.print_json(&json);
        return Ok(());
    }

    if ctx.config_found {
        formatter.success(&format!("Configuration ({})", ctx.config_path.display()));
    } else {
        formatter.warn(&format!(
            "{} not found, showing defaults",
            ctx.config_path.display()
        ));
    }
    formatter.info("");

    let yaml =
        serde_yaml::to_string(&config).context("Failed to serialize configuration to YAML")?;
    for line in yaml.lines() {
        formatter.info(line);
    }
    Ok(())
}

fn execute_validate(ctx: &CliContext, format: OutputFormat) -> Result<()> {
    let formatter = get_formatter(format);
    let errors = ctx.config.validate();

    if format.is_json() {
        let messages: Vec<serde_json::Value> = errors
            .iter()
            .map(|e| serde_json::json!({"field": e.field, "message": e.message}))
            .collect();
        formatter.print_json(&serde_json::json!({
            "valid": errors.is_empty(),
            "config_path": ctx.config_path.display().to_string(),
            "config_found": ctx.config_found,
            "errors": messages,
        }));
        return Ok(());
    }

    if !ctx.config_found {
        formatter.warn(&format!(
            "{} not found, validating defaults",
            ctx.config_path.display()
        ));
    }

    if errors.is_empty() {
        formatter.success("Configuration is valid");
        formatter.field("Channels", &ctx.config.channels.len().to_string());
    } else {
        formatter.error(&format!("{} configuration error(s)", errors.len()));
        for error in &errors {
            formatter.info(&format!("{}: {}", error.field, error.message));
        }
    }
    Ok(())
}

/// Copy of `config` with inline access tokens replaced by a mask
pub fn masked(config: &Config) -> Config {
    let mut config = config.clone();
    for channel in &mut config.channels {
        if channel.access_token.is_some() {
            channel.access_token = Some(MASK.to_string());
        }
    }
    config
}
