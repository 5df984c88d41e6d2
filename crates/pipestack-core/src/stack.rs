//! Stacks, the app that owns them, and synthesis.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use crate::authz::{self, AttachedStatement, AuthorizationReport, Requirement};
use crate::graph::DependencyGraph;
use crate::iam::{PolicyStatement, RoleHandle, policy_document};
use crate::id::{ConstructPath, LogicalId};
use crate::reference::{Pseudo, Reference};
use crate::template::{DeletionPolicy, PATH_METADATA_KEY, ResourceEntry, Template};
use crate::{Error, Result};

static STACK_NAME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9-]{0,127}$").unwrap());

/// What happens to a resource when its stack is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemovalPolicy {
    Destroy,
    Retain,
    Snapshot,
}

impl RemovalPolicy {
    pub fn deletion_policy(&self) -> DeletionPolicy {
        match self {
            RemovalPolicy::Destroy => DeletionPolicy::Delete,
            RemovalPolicy::Retain => DeletionPolicy::Retain,
            RemovalPolicy::Snapshot => DeletionPolicy::Snapshot,
        }
    }
}

impl std::fmt::Display for RemovalPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RemovalPolicy::Destroy => write!(f, "destroy"),
            RemovalPolicy::Retain => write!(f, "retain"),
            RemovalPolicy::Snapshot => write!(f, "snapshot"),
        }
    }
}

impl std::str::FromStr for RemovalPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "destroy" => Ok(RemovalPolicy::Destroy),
            "retain" => Ok(RemovalPolicy::Retain),
            "snapshot" => Ok(RemovalPolicy::Snapshot),
            _ => Err(format!("Unknown removal policy: {}", s)),
        }
    }
}

/// Target account and region. Unset values resolve at deploy time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    pub account: Option<String>,
    pub region: Option<String>,
}

impl Environment {
    pub fn new(account: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            account: Some(account.into()),
            region: Some(region.into()),
        }
    }
}

/// Immutable provider context for a stack.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackProps {
    pub env: Environment,
    pub description: Option<String>,
    /// Applied to resources that do not set their own removal policy.
    pub removal_policy: Option<RemovalPolicy>,
}

/// Something that can be declared into a stack.
pub trait Construct {
    type Handle;

    fn declare(self, stack: &mut Stack) -> Result<Self::Handle>;
}

#[derive(Debug, Clone)]
struct DefaultPolicy {
    logical_id: LogicalId,
    path: ConstructPath,
    role: RoleHandle,
    statements: Vec<PolicyStatement>,
}

/// A unit of declared infrastructure synthesized into one template.
#[derive(Debug)]
pub struct Stack {
    name: String,
    props: StackProps,
    paths: BTreeSet<ConstructPath>,
    resources: BTreeMap<LogicalId, ResourceEntry>,
    default_policies: BTreeMap<LogicalId, DefaultPolicy>,
    attached: Vec<AttachedStatement>,
    requirements: Vec<Requirement>,
    /// (resource, principal): the resource waits for every policy attached
    /// to the principal, including ones attached after the resource.
    policy_dependents: Vec<(LogicalId, LogicalId)>,
}

impl Stack {
    fn new(name: &str, props: StackProps) -> Result<Self> {
        if !STACK_NAME_REGEX.is_match(name) {
            return Err(Error::InvalidInput(format!("invalid stack name: {}", name)));
        }

        Ok(Self {
            name: name.to_string(),
            props,
            paths: BTreeSet::new(),
            resources: BTreeMap::new(),
            default_policies: BTreeMap::new(),
            attached: Vec::new(),
            requirements: Vec::new(),
            policy_dependents: Vec::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn declare<C: Construct>(&mut self, construct: C) -> Result<C::Handle> {
        construct.declare(self)
    }

    /// Register a resource at a construct path and return its logical id.
    pub fn add_resource(&mut self, path: ConstructPath, mut entry: ResourceEntry) -> Result<LogicalId> {
        let logical_id = self.reserve(&path)?;

        entry.metadata = Some(json!({ PATH_METADATA_KEY: format!("{}/{}", self.name, path) }));
        debug!(
            stack = %self.name,
            %path,
            %logical_id,
            resource_type = %entry.resource_type,
            "Declared resource"
        );
        self.resources.insert(logical_id.clone(), entry);

        Ok(logical_id)
    }

    fn reserve(&mut self, path: &ConstructPath) -> Result<LogicalId> {
        if self.paths.contains(path) {
            return Err(Error::DuplicateId(format!("{}/{}", self.name, path)));
        }
        let logical_id = LogicalId::from_path(path)?;
        if self.resources.contains_key(&logical_id)
            || self.default_policies.values().any(|p| p.logical_id == logical_id)
        {
            return Err(Error::DuplicateId(format!(
                "{}/{} (logical id {})",
                self.name, path, logical_id
            )));
        }
        self.paths.insert(path.clone());
        Ok(logical_id)
    }

    /// Record statements attached to a principal through a policy resource.
    pub fn attach_statements(&mut self, principal: &RoleHandle, policy: &LogicalId, statements: &[PolicyStatement]) {
        for statement in statements {
            self.attached.push(AttachedStatement {
                principal: principal.logical_id().clone(),
                policy: policy.clone(),
                statement: statement.clone(),
            });
        }
    }

    /// Append a statement to the principal's default policy, creating the
    /// policy on first use. Returns the default policy's logical id.
    pub fn add_to_principal_policy(&mut self, principal: &RoleHandle, statement: PolicyStatement) -> Result<LogicalId> {
        statement.validate()?;

        let role_id = principal.logical_id().clone();
        if !self.default_policies.contains_key(&role_id) {
            let path = principal.scope().child("DefaultPolicy").child("Resource");
            let logical_id = self.reserve(&path)?;
            self.default_policies.insert(
                role_id.clone(),
                DefaultPolicy {
                    logical_id,
                    path,
                    role: principal.clone(),
                    statements: Vec::new(),
                },
            );
        }

        let Some(policy) = self.default_policies.get_mut(&role_id) else {
            return Err(Error::NotFound(format!("default policy for {}", role_id)));
        };
        if !policy.statements.contains(&statement) {
            policy.statements.push(statement.clone());
        }
        let policy_id = policy.logical_id.clone();

        self.attach_statements(principal, &policy_id, &[statement]);
        Ok(policy_id)
    }

    /// Record actions a principal will invoke at runtime.
    pub fn require(&mut self, requirement: Requirement) {
        self.requirements.push(requirement);
    }

    pub fn requirements(&self) -> &[Requirement] {
        &self.requirements
    }

    /// Statements attached to a principal, inline and default alike.
    pub fn statements_for(&self, principal: &LogicalId) -> Vec<&PolicyStatement> {
        self.attached
            .iter()
            .filter(|a| &a.principal == principal)
            .map(|a| &a.statement)
            .collect()
    }

    /// Policy resources carrying statements for a principal.
    pub fn policies_attached_to(&self, principal: &LogicalId) -> Vec<LogicalId> {
        let policies: BTreeSet<LogicalId> = self
            .attached
            .iter()
            .filter(|a| &a.principal == principal)
            .map(|a| a.policy.clone())
            .collect();
        policies.into_iter().collect()
    }

    /// Make a resource depend on every policy attached to a principal.
    /// Resolved at synthesis.
    pub fn depend_on_policies_of(&mut self, resource: &LogicalId, principal: &LogicalId) {
        self.policy_dependents.push((resource.clone(), principal.clone()));
    }

    pub fn audit_authorization(&self) -> AuthorizationReport {
        authz::audit(&self.requirements, &self.attached)
    }

    pub fn account(&self) -> Reference {
        match &self.props.env.account {
            Some(account) => Reference::literal(account.as_str()),
            None => Reference::Pseudo(Pseudo::AccountId),
        }
    }

    pub fn region(&self) -> Reference {
        match &self.props.env.region {
            Some(region) => Reference::literal(region.as_str()),
            None => Reference::Pseudo(Pseudo::Region),
        }
    }

    pub fn partition(&self) -> Reference {
        Reference::Pseudo(Pseudo::Partition)
    }

    /// `arn:<partition>:<service>:<region>:<account>:<resource>`.
    pub fn format_arn(&self, service: &str, resource: Reference) -> Reference {
        Reference::concat([
            Reference::literal("arn:"),
            self.partition(),
            Reference::literal(format!(":{}:", service)),
            self.region(),
            Reference::literal(":"),
            self.account(),
            Reference::literal(":"),
            resource,
        ])
    }

    /// Resolve a construct's removal policy against the stack default.
    pub fn removal_policy(&self, explicit: Option<RemovalPolicy>, fallback: RemovalPolicy) -> RemovalPolicy {
        explicit.or(self.props.removal_policy).unwrap_or(fallback)
    }

    /// Produce the template: every declared resource plus materialized
    /// default policies, after checking references and ordering.
    pub fn synth(&self) -> Result<Template> {
        let mut resources = self.resources.clone();

        for policy in self.default_policies.values() {
            let mut entry = ResourceEntry::new(
                "AWS::IAM::Policy",
                json!({
                    "PolicyDocument": policy_document(&policy.statements),
                    "PolicyName": policy.logical_id,
                    "Roles": [policy.role.role_name()],
                }),
            );
            entry.metadata = Some(json!({ PATH_METADATA_KEY: format!("{}/{}", self.name, policy.path) }));
            if resources.insert(policy.logical_id.clone(), entry).is_some() {
                return Err(Error::DuplicateId(policy.logical_id.to_string()));
            }
        }

        for (resource, principal) in &self.policy_dependents {
            let Some(entry) = resources.get_mut(resource) else {
                return Err(Error::NotFound(format!("resource {}", resource)));
            };
            entry.add_depends_on(self.policies_attached_to(principal));
        }

        let graph = DependencyGraph::from_resources(&resources)?;
        info!(stack = %self.name, resources = graph.len(), "Synthesized stack");

        Ok(Template::new(self.props.description.clone(), resources))
    }

    pub fn dependency_graph(&self) -> Result<DependencyGraph> {
        DependencyGraph::from_resources(&self.synth()?.resources)
    }
}

/// Root of the construct tree; owns every stack.
#[derive(Debug, Default)]
pub struct App {
    stacks: Vec<Stack>,
}

impl App {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a stack. Stack names are unique within an app.
    pub fn new_stack(&mut self, id: &str, props: StackProps) -> Result<&mut Stack> {
        if self.stacks.iter().any(|s| s.name == id) {
            return Err(Error::DuplicateId(id.to_string()));
        }
        self.stacks.push(Stack::new(id, props)?);
        let index = self.stacks.len() - 1;
        Ok(&mut self.stacks[index])
    }

    pub fn stack(&self, name: &str) -> Option<&Stack> {
        self.stacks.iter().find(|s| s.name == name)
    }

    pub fn stack_mut(&mut self, name: &str) -> Option<&mut Stack> {
        self.stacks.iter_mut().find(|s| s.name == name)
    }

    pub fn synth(&self) -> Result<CloudAssembly> {
        let mut templates = BTreeMap::new();
        for stack in &self.stacks {
            templates.insert(stack.name.clone(), stack.synth()?);
        }
        Ok(CloudAssembly { templates })
    }
}

/// Synthesis output: one template per stack.
#[derive(Debug, Clone, PartialEq)]
pub struct CloudAssembly {
    templates: BTreeMap<String, Template>,
}

impl CloudAssembly {
    pub fn template(&self, stack: &str) -> Option<&Template> {
        self.templates.get(stack)
    }

    /// Write `<stack>.template.json` files into a directory.
    pub fn write_to(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        std::fs::create_dir_all(dir)?;
        let mut written = Vec::new();
        for (name, template) in &self.templates {
            let path = dir.join(format!("{}.template.json", name));
            std::fs::write(&path, template.to_json_pretty()?)?;
            info!(path = %path.display(), "Wrote template");
            written.push(path);
        }
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iam::{Role, ServicePrincipal};
    use tempfile::TempDir;

    fn build_role(stack: &mut Stack) -> RoleHandle {
        stack
            .declare(Role::new("AppBuildRole", ServicePrincipal::new(ServicePrincipal::CODEBUILD)))
            .unwrap()
    }

    #[test]
    fn test_duplicate_construct_rejected() {
        let mut app = App::new();
        let stack = app.new_stack("dupes", StackProps::default()).unwrap();
        build_role(stack);
        let result = stack.declare(Role::new(
            "AppBuildRole",
            ServicePrincipal::new(ServicePrincipal::CODEPIPELINE),
        ));
        assert!(matches!(result, Err(Error::DuplicateId(_))));
    }

    #[test]
    fn test_duplicate_stack_rejected() {
        let mut app = App::new();
        app.new_stack("one", StackProps::default()).unwrap();
        assert!(matches!(
            app.new_stack("one", StackProps::default()),
            Err(Error::DuplicateId(_))
        ));
        assert!(matches!(
            app.new_stack("1-bad name", StackProps::default()),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_default_policy_materialized_on_synth() {
        let mut app = App::new();
        let stack = app.new_stack("defaults", StackProps::default()).unwrap();
        let role = build_role(stack);

        let first = stack
            .add_to_principal_policy(
                &role,
                PolicyStatement::allow()
                    .with_actions(["logs:PutLogEvents"])
                    .with_resource("*"),
            )
            .unwrap();
        let second = stack
            .add_to_principal_policy(
                &role,
                PolicyStatement::allow()
                    .with_actions(["codecommit:GitPull"])
                    .with_resource("*"),
            )
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(first.as_str(), "AppBuildRoleDefaultPolicyC70CA925");

        let template = stack.synth().unwrap();
        let policy = template.resource(&first).unwrap();
        assert_eq!(policy.resource_type, "AWS::IAM::Policy");
        assert_eq!(
            policy.properties["PolicyDocument"]["Statement"]
                .as_array()
                .unwrap()
                .len(),
            2
        );
        assert_eq!(policy.construct_path(), Some("defaults/AppBuildRole/DefaultPolicy/Resource"));
        assert_eq!(stack.statements_for(role.logical_id()).len(), 2);
    }

    #[test]
    fn test_environment_resolution() {
        let mut app = App::new();
        let props = StackProps {
            env: Environment::new("123456789012", "eu-west-1"),
            ..StackProps::default()
        };
        let pinned = app.new_stack("pinned", props).unwrap();
        assert_eq!(
            pinned.format_arn("logs", Reference::literal("log-group:x")).to_string(),
            "arn:${AWS::Partition}:logs:eu-west-1:123456789012:log-group:x"
        );

        let floating = app.new_stack("floating", StackProps::default()).unwrap();
        assert_eq!(floating.region(), Reference::Pseudo(Pseudo::Region));
        assert_eq!(
            floating.removal_policy(None, RemovalPolicy::Retain),
            RemovalPolicy::Retain
        );
    }

    #[test]
    fn test_stack_default_removal_policy() {
        let mut app = App::new();
        let props = StackProps {
            removal_policy: Some(RemovalPolicy::Destroy),
            ..StackProps::default()
        };
        let stack = app.new_stack("scratch", props).unwrap();
        assert_eq!(stack.removal_policy(None, RemovalPolicy::Retain), RemovalPolicy::Destroy);
        assert_eq!(
            stack.removal_policy(Some(RemovalPolicy::Snapshot), RemovalPolicy::Retain),
            RemovalPolicy::Snapshot
        );
    }

    #[test]
    fn test_assembly_written_per_stack() {
        let mut app = App::new();
        let stack = app.new_stack("written", StackProps::default()).unwrap();
        build_role(stack);

        let dir = TempDir::new().unwrap();
        let written = app.synth().unwrap().write_to(dir.path()).unwrap();
        assert_eq!(written, vec![dir.path().join("written.template.json")]);

        let json = std::fs::read_to_string(&written[0]).unwrap();
        let template = Template::from_json(&json).unwrap();
        assert_eq!(template.resource_count("AWS::IAM::Role"), 1);
    }
}
