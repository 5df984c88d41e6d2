//! Variable interpolation for stack configurations.
//!
//! Supports variables like:
//! - `${stack.name}` - Name of the stack being declared
//! - `${aws.account}` - Target account, when configured
//! - `${aws.region}` - Target region, when configured
//! - `${env.VAR_NAME}` - Environment variable
//! - `${name}` - Custom variable
//!
//! Every value comes from the configuration or the process environment, so
//! interpolating the same file twice gives the same result.

use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

/// Variable context containing all available variables for interpolation.
#[derive(Debug, Clone, Default)]
pub struct VariableContext {
    pub stack: StackContext,
    pub aws: AwsContext,
    /// Environment variables
    pub env: HashMap<String, String>,
    /// Custom variables defined by user
    pub custom: HashMap<String, String>,
}

#[derive(Debug, Clone, Default)]
pub struct StackContext {
    pub name: String,
}

/// Target environment. Unset values are left uninterpolated.
#[derive(Debug, Clone, Default)]
pub struct AwsContext {
    pub account: Option<String>,
    pub region: Option<String>,
}

// Regex for matching ${...} variables
static VAR_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([a-zA-Z_][a-zA-Z0-9_]*(?:\.[a-zA-Z_][a-zA-Z0-9_]*)?)\}").unwrap()
});

impl VariableContext {
    /// Create a new empty variable context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a context holding the current process environment.
    pub fn from_process_env() -> Self {
        let mut ctx = Self::new();
        ctx.populate_env();
        ctx
    }

    /// Populate environment variables from the current process environment.
    pub fn populate_env(&mut self) {
        for (key, value) in std::env::vars() {
            self.env.insert(key, value);
        }
    }

    /// Add a custom variable.
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        self.custom.insert(name.to_string(), value.into());
    }

    /// Resolve a variable name to its value.
    pub fn resolve(&self, var_name: &str) -> Option<String> {
        let parts: Vec<&str> = var_name.split('.').collect();

        match parts.as_slice() {
            ["stack", "name"] => Some(self.stack.name.clone()).filter(|n| !n.is_empty()),

            ["aws", "account"] => self.aws.account.clone(),
            ["aws", "region"] => self.aws.region.clone(),

            ["env", name] => self.env.get(*name).cloned(),

            // Single-part names check custom variables
            [name] => self.custom.get(*name).cloned(),

            _ => None,
        }
    }

    /// Interpolate all variables in a string.
    /// Unknown variables are left as written.
    pub fn interpolate(&self, input: &str) -> String {
        VAR_REGEX
            .replace_all(input, |caps: &regex::Captures| {
                let var_name = &caps[1];
                self.resolve(var_name)
                    .unwrap_or_else(|| format!("${{{}}}", var_name))
            })
            .to_string()
    }

    /// Variable names referenced in a string that have no value.
    pub fn unresolved(&self, input: &str) -> Vec<String> {
        VAR_REGEX
            .captures_iter(input)
            .map(|caps| caps[1].to_string())
            .filter(|name| self.resolve(name).is_none())
            .collect()
    }
}

/// Builder for creating VariableContext.
pub struct VariableContextBuilder {
    ctx: VariableContext,
}

impl VariableContextBuilder {
    pub fn new() -> Self {
        Self {
            ctx: VariableContext::new(),
        }
    }

    pub fn with_stack_name(mut self, name: impl Into<String>) -> Self {
        self.ctx.stack.name = name.into();
        self
    }

    pub fn with_account(mut self, account: impl Into<String>) -> Self {
        self.ctx.aws.account = Some(account.into());
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.ctx.aws.region = Some(region.into());
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.ctx.env.insert(key.into(), value.into());
        self
    }

    pub fn with_custom(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.ctx.custom.insert(key.into(), value.into());
        self
    }

    pub fn build(self) -> VariableContext {
        self.ctx
    }
}

impl Default for VariableContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stack_and_aws_interpolation() {
        let ctx = VariableContextBuilder::new()
            .with_stack_name("delivery")
            .with_account("123456789012")
            .with_region("eu-west-1")
            .build();

        let result = ctx.interpolate("${stack.name} in ${aws.account}/${aws.region}");
        assert_eq!(result, "delivery in 123456789012/eu-west-1");
    }

    #[test]
    fn test_env_variables() {
        let ctx = VariableContextBuilder::new()
            .with_env("TEAM", "platform")
            .with_env("PROJECT", "java")
            .build();

        let result = ctx.interpolate("${env.TEAM}-${env.PROJECT}");
        assert_eq!(result, "platform-java");
    }

    #[test]
    fn test_unknown_variable_preserved() {
        let ctx = VariableContext::new();
        let result = ctx.interpolate("Unknown: ${unknown.var}");
        assert_eq!(result, "Unknown: ${unknown.var}");
    }

    #[test]
    fn test_unset_environment_preserved() {
        let ctx = VariableContextBuilder::new().with_stack_name("delivery").build();
        assert_eq!(ctx.interpolate("${aws.region}"), "${aws.region}");
        assert_eq!(ctx.unresolved("${stack.name}-${aws.region}"), vec!["aws.region"]);
    }

    #[test]
    fn test_custom_variables() {
        let mut ctx = VariableContext::new();
        ctx.set("repo", "java-project");

        let result = ctx.interpolate("Repo for ${repo}");
        assert_eq!(result, "Repo for java-project");
    }

    #[test]
    fn test_nested_braces() {
        let ctx = VariableContextBuilder::new().with_stack_name("delivery").build();

        let result = ctx.interpolate(r#"{"stack": "${stack.name}"}"#);
        assert_eq!(result, r#"{"stack": "delivery"}"#);
    }
}
