//! CLI command implementations.

pub mod inspect;
pub mod simulate;
pub mod synth;

use std::path::Path;

use anyhow::{Context, Result};
use pipestack_config::{DEFAULT_CONFIG_FILE, StackConfig, VariableContext, load_stack_config};
use pipestack_core::{App, DeliveryPipelineStack, Stack};
use tracing::info;

/// The declared app together with handles to the delivery stack.
pub struct Declared {
    pub app: App,
    pub delivery: DeliveryPipelineStack,
}

impl Declared {
    pub fn stack(&self) -> Result<&Stack> {
        self.app
            .stack(&self.delivery.stack_name)
            .with_context(|| format!("Stack '{}' was not declared", self.delivery.stack_name))
    }
}

/// Resolve the configuration: an explicit path must exist, the default
/// file is optional.
pub fn load_config(path: Option<&Path>) -> Result<StackConfig> {
    let vars = VariableContext::from_process_env();
    match path {
        Some(path) => load_stack_config(path, &vars)
            .with_context(|| format!("Failed to load config file: {}", path.display())),
        None => {
            let default = Path::new(DEFAULT_CONFIG_FILE);
            if default.exists() {
                load_stack_config(default, &vars)
                    .with_context(|| format!("Failed to load config file: {}", DEFAULT_CONFIG_FILE))
            } else {
                info!("No {} found, using the stock stack", DEFAULT_CONFIG_FILE);
                Ok(StackConfig::default())
            }
        }
    }
}

/// Load the configuration and declare the delivery stack.
pub fn declare(path: Option<&Path>) -> Result<Declared> {
    let config = load_config(path)?;
    let mut app = App::new();
    let delivery = DeliveryPipelineStack::with_settings(&mut app, &config.name, config.props, config.settings)
        .with_context(|| format!("Failed to declare stack '{}'", config.name))?;
    Ok(Declared { app, delivery })
}

pub fn validate(path: Option<&Path>) -> Result<()> {
    let result = declare(path).and_then(|declared| {
        let stack = declared.stack()?;
        stack.synth()?;
        Ok(stack.audit_authorization())
    });

    match result {
        Ok(report) if report.is_authorized() => {
            println!("Configuration is valid ({} permission checks)", report.checked);
            Ok(())
        }
        Ok(report) => {
            println!("Authorization gaps:");
            for gap in &report.gaps {
                println!("  {}", gap);
            }
            std::process::exit(1);
        }
        Err(e) => {
            println!("Configuration error: {:#}", e);
            std::process::exit(1);
        }
    }
}
