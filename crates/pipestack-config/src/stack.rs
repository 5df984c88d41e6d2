//! Stack configuration parsing.
//!
//! ```kdl
//! stack "delivery" description="Delivery pipeline" removal-policy="destroy" {
//!     env account="${env.AWS_ACCOUNT_ID}" region="eu-west-1"
//! }
//! repository "java-project" description="Repo for the Java project" {
//!     seed "code_from_s3/java-project"
//!     branch "master"
//! }
//! build image="aws/codebuild/standard:5.0" compute="small" {
//!     artifacts path="build_output" name="artifact.zip" include-build-id=#true package-zip=#true
//! }
//! pipeline "AppCodePipeline" trigger="events"
//! ```
//!
//! Every node is optional; anything left out keeps the stock delivery stack.

use std::path::{Path, PathBuf};

use kdl::{KdlDocument, KdlNode};
use pipestack_core::codebuild::ComputeType;
use pipestack_core::codepipeline::SourceTrigger;
use pipestack_core::stack::{Environment, RemovalPolicy, StackProps};
use pipestack_core::DeliveryPipelineSettings;
use tracing::debug;

use crate::{ConfigError, ConfigResult, VariableContext};

/// File looked up in the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "pipestack.kdl";
pub const DEFAULT_STACK_NAME: &str = "PipestackDelivery";

/// Everything needed to declare the delivery stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackConfig {
    pub name: String,
    pub props: StackProps,
    pub settings: DeliveryPipelineSettings,
}

impl Default for StackConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_STACK_NAME.to_string(),
            props: StackProps::default(),
            settings: DeliveryPipelineSettings::default(),
        }
    }
}

/// Read a configuration file. A relative seed directory is resolved against
/// the file's own directory.
pub fn load_stack_config(path: &Path, vars: &VariableContext) -> ConfigResult<StackConfig> {
    let content = std::fs::read_to_string(path)?;
    let mut config = parse_stack_config(&content, vars)?;

    let base = path.parent().unwrap_or_else(|| Path::new(""));
    if config.settings.seed_directory.is_relative() && !base.as_os_str().is_empty() {
        config.settings.seed_directory = base.join(&config.settings.seed_directory);
    }
    debug!(path = %path.display(), stack = %config.name, "Loaded stack configuration");
    Ok(config)
}

/// Parse a stack configuration from KDL text.
pub fn parse_stack_config(kdl: &str, vars: &VariableContext) -> ConfigResult<StackConfig> {
    let doc: KdlDocument = kdl.parse()?;
    let mut config = StackConfig::default();
    let mut vars = vars.clone();

    // The stack node comes first so later values can use ${stack.name}
    // and ${aws.*}.
    if let Some(node) = single_node(&doc, "stack")? {
        parse_stack(node, &mut vars, &mut config)?;
    } else {
        vars.stack.name = config.name.clone();
    }

    if let Some(node) = single_node(&doc, "repository")? {
        parse_repository(node, &vars, &mut config.settings)?;
    }
    if let Some(node) = single_node(&doc, "build")? {
        parse_build(node, &vars, &mut config.settings)?;
    }
    if let Some(node) = single_node(&doc, "pipeline")? {
        parse_pipeline(node, &vars, &mut config.settings)?;
    }

    Ok(config)
}

fn single_node<'a>(doc: &'a KdlDocument, name: &str) -> ConfigResult<Option<&'a KdlNode>> {
    let mut found = doc.nodes().iter().filter(|n| n.name().value() == name);
    let first = found.next();
    if found.next().is_some() {
        return Err(ConfigError::Duplicate(format!("{} node", name)));
    }
    Ok(first)
}

fn parse_stack(node: &KdlNode, vars: &mut VariableContext, config: &mut StackConfig) -> ConfigResult<()> {
    if let Some(name) = get_first_string_arg(node) {
        config.name = vars.interpolate(&name);
    }
    vars.stack.name = config.name.clone();

    if let Some(children) = node.children() {
        let mut envs = children.nodes().iter().filter(|c| c.name().value() == "env");
        if let Some(env) = envs.next() {
            if envs.next().is_some() {
                return Err(ConfigError::Duplicate("stack env node".to_string()));
            }
            let account = get_string_prop(env, "account").map(|a| vars.interpolate(&a));
            let region = get_string_prop(env, "region").map(|r| vars.interpolate(&r));
            vars.aws.account = account.clone();
            vars.aws.region = region.clone();
            config.props.env = Environment { account, region };
        }
    }

    config.props.description = get_string_prop(node, "description").map(|d| vars.interpolate(&d));
    if let Some(policy) = get_string_prop(node, "removal-policy") {
        let policy = vars
            .interpolate(&policy)
            .parse::<RemovalPolicy>()
            .map_err(|message| invalid("stack.removal-policy", message))?;
        config.props.removal_policy = Some(policy);
    }
    Ok(())
}

fn parse_repository(
    node: &KdlNode,
    vars: &VariableContext,
    settings: &mut DeliveryPipelineSettings,
) -> ConfigResult<()> {
    if let Some(name) = get_first_string_arg(node) {
        settings.repository_name = vars.interpolate(&name);
    }
    if let Some(description) = get_string_prop(node, "description") {
        settings.repository_description = vars.interpolate(&description);
    }

    let Some(children) = node.children() else {
        return Ok(());
    };
    for child in children.nodes() {
        let Some(value) = get_first_string_arg(child) else {
            continue;
        };
        let value = vars.interpolate(&value);
        match child.name().value() {
            "seed" => settings.seed_directory = PathBuf::from(value),
            "branch" => {
                if value.trim().is_empty() {
                    return Err(invalid("repository.branch", "must not be empty".to_string()));
                }
                settings.branch = value;
            }
            "description" => settings.repository_description = value,
            _ => {} // Ignore unknown nodes
        }
    }
    Ok(())
}

fn parse_build(node: &KdlNode, vars: &VariableContext, settings: &mut DeliveryPipelineSettings) -> ConfigResult<()> {
    if let Some(image) = get_string_prop(node, "image") {
        settings.build_image = vars.interpolate(&image);
    }
    if let Some(compute) = get_string_prop(node, "compute") {
        settings.compute_type = vars
            .interpolate(&compute)
            .parse::<ComputeType>()
            .map_err(|message| invalid("build.compute", message))?;
    }

    if let Some(children) = node.children() {
        for child in children.nodes() {
            if child.name().value() != "artifacts" {
                continue;
            }
            if let Some(path) = get_string_prop(child, "path") {
                settings.artifact_path = vars.interpolate(&path);
            }
            if let Some(name) = get_string_prop(child, "name") {
                let name = vars.interpolate(&name);
                if name.is_empty() {
                    return Err(invalid("build.artifacts.name", "must not be empty".to_string()));
                }
                settings.artifact_name = name;
            }
            if let Some(include) = get_bool_prop(child, "include-build-id") {
                settings.include_build_id = include;
            }
            if let Some(zip) = get_bool_prop(child, "package-zip") {
                settings.package_zip = zip;
            }
        }
    }
    Ok(())
}

fn parse_pipeline(node: &KdlNode, vars: &VariableContext, settings: &mut DeliveryPipelineSettings) -> ConfigResult<()> {
    if let Some(name) = get_first_string_arg(node) {
        settings.pipeline_name = vars.interpolate(&name);
    }
    if let Some(trigger) = get_string_prop(node, "trigger") {
        settings.trigger = vars
            .interpolate(&trigger)
            .parse::<SourceTrigger>()
            .map_err(|message| invalid("pipeline.trigger", message))?;
    }
    Ok(())
}

fn invalid(field: &str, message: String) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        message,
    }
}

fn get_first_string_arg(node: &KdlNode) -> Option<String> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_string())
        .map(|s| s.to_string())
}

fn get_string_prop(node: &KdlNode, name: &str) -> Option<String> {
    node.get(name)
        .and_then(|v| v.as_string())
        .map(|s| s.to_string())
}

fn get_bool_prop(node: &KdlNode, name: &str) -> Option<bool> {
    node.get(name).and_then(|v| v.as_bool())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::VariableContextBuilder;

    #[test]
    fn test_empty_config_is_stock_stack() {
        let config = parse_stack_config("", &VariableContext::new()).unwrap();
        assert_eq!(config, StackConfig::default());
        assert_eq!(config.settings.branch, "master");
    }

    #[test]
    fn test_parse_full_config() {
        let kdl = r#"
            stack "delivery" description="Delivery pipeline" removal-policy="destroy" {
                env account="123456789012" region="eu-west-1"
            }
            repository "service-repo" description="Repo for ${stack.name}" {
                seed "seed/service"
                branch "main"
            }
            build image="aws/codebuild/standard:7.0" compute="medium" {
                artifacts path="out" name="bundle.zip" include-build-id=#false package-zip=#true
            }
            pipeline "ServicePipeline" trigger="poll"
        "#;

        let config = parse_stack_config(kdl, &VariableContext::new()).unwrap();
        assert_eq!(config.name, "delivery");
        assert_eq!(config.props.description.as_deref(), Some("Delivery pipeline"));
        assert_eq!(config.props.removal_policy, Some(RemovalPolicy::Destroy));
        assert_eq!(config.props.env, Environment::new("123456789012", "eu-west-1"));

        let settings = &config.settings;
        assert_eq!(settings.repository_name, "service-repo");
        assert_eq!(settings.repository_description, "Repo for delivery");
        assert_eq!(settings.seed_directory, PathBuf::from("seed/service"));
        assert_eq!(settings.branch, "main");
        assert_eq!(settings.build_image, "aws/codebuild/standard:7.0");
        assert_eq!(settings.compute_type, ComputeType::Medium);
        assert_eq!(settings.artifact_path, "out");
        assert_eq!(settings.artifact_name, "bundle.zip");
        assert!(!settings.include_build_id);
        assert!(settings.package_zip);
        assert_eq!(settings.pipeline_name, "ServicePipeline");
        assert_eq!(settings.trigger, SourceTrigger::Poll);
    }

    #[test]
    fn test_environment_interpolation() {
        let kdl = r#"
            stack "${env.STAGE}-delivery" {
                env account="${env.ACCOUNT}" region="us-east-1"
            }
            pipeline "${stack.name}-${aws.region}"
        "#;
        let vars = VariableContextBuilder::new()
            .with_env("STAGE", "prod")
            .with_env("ACCOUNT", "210987654321")
            .build();

        let config = parse_stack_config(kdl, &vars).unwrap();
        assert_eq!(config.name, "prod-delivery");
        assert_eq!(config.props.env.account.as_deref(), Some("210987654321"));
        assert_eq!(config.settings.pipeline_name, "prod-delivery-us-east-1");
    }

    #[test]
    fn test_invalid_compute_type() {
        let result = parse_stack_config(r#"build compute="huge""#, &VariableContext::new());
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "build.compute"
        ));
    }

    #[test]
    fn test_invalid_trigger() {
        let result = parse_stack_config(r#"pipeline trigger="webhook""#, &VariableContext::new());
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_empty_branch_rejected() {
        let kdl = r#"
            repository "java-project" {
                branch "${env.BRANCH}"
            }
        "#;
        let vars = VariableContextBuilder::new().with_env("BRANCH", "").build();
        let result = parse_stack_config(kdl, &vars);
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "repository.branch"
        ));
    }

    #[test]
    fn test_duplicate_node_rejected() {
        let kdl = r#"
            pipeline "One"
            pipeline "Two"
        "#;
        let result = parse_stack_config(kdl, &VariableContext::new());
        assert!(matches!(result, Err(ConfigError::Duplicate(_))));
    }

    #[test]
    fn test_malformed_kdl() {
        let result = parse_stack_config("stack \"unterminated", &VariableContext::new());
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_load_resolves_seed_relative_to_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join(DEFAULT_CONFIG_FILE);
        std::fs::write(&path, "repository {\n    seed \"seed\"\n}\n").unwrap();

        let config = load_stack_config(&path, &VariableContext::new()).unwrap();
        assert_eq!(config.settings.seed_directory, dir.path().join("seed"));
        assert_eq!(config.settings.repository_name, "java-project");
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let result = load_stack_config(&dir.path().join("absent.kdl"), &VariableContext::new());
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }
}
