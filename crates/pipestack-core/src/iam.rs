//! IAM roles, policies and policy statements.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::id::{ConstructPath, LogicalId};
use crate::reference::Reference;
use crate::stack::{Construct, Stack};
use crate::template::ResourceEntry;
use crate::{Error, Result};

pub const POLICY_VERSION: &str = "2012-10-17";

static ACTION_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\*|[a-z0-9-]+:[A-Za-z0-9*?]+)$").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Effect {
    Allow,
    Deny,
}

impl std::fmt::Display for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Effect::Allow => write!(f, "Allow"),
            Effect::Deny => write!(f, "Deny"),
        }
    }
}

/// An allow/deny rule binding actions to resource patterns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyStatement {
    pub sid: Option<String>,
    pub effect: Effect,
    pub actions: Vec<String>,
    pub resources: Vec<Reference>,
}

impl PolicyStatement {
    pub fn allow() -> Self {
        Self {
            sid: None,
            effect: Effect::Allow,
            actions: Vec::new(),
            resources: Vec::new(),
        }
    }

    pub fn deny() -> Self {
        Self {
            effect: Effect::Deny,
            ..Self::allow()
        }
    }

    pub fn with_sid(mut self, sid: impl Into<String>) -> Self {
        self.sid = Some(sid.into());
        self
    }

    pub fn with_actions<I, S>(mut self, actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for action in actions {
            let action = action.into();
            if !self.actions.contains(&action) {
                self.actions.push(action);
            }
        }
        self
    }

    pub fn with_resource(mut self, resource: impl Into<Reference>) -> Self {
        let resource = resource.into();
        if !self.resources.contains(&resource) {
            self.resources.push(resource);
        }
        self
    }

    pub fn with_resources<I, R>(self, resources: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<Reference>,
    {
        resources
            .into_iter()
            .fold(self, |stmt, resource| stmt.with_resource(resource))
    }

    pub fn validate(&self) -> Result<()> {
        let label = self.sid.as_deref().unwrap_or("<unnamed>");
        if self.actions.is_empty() {
            return Err(Error::MalformedPolicy(format!(
                "statement {} has no actions",
                label
            )));
        }
        if self.resources.is_empty() {
            return Err(Error::MalformedPolicy(format!(
                "statement {} has no resources",
                label
            )));
        }
        if let Some(bad) = self.actions.iter().find(|a| !ACTION_REGEX.is_match(a)) {
            return Err(Error::MalformedPolicy(format!(
                "statement {} has invalid action '{}'",
                label, bad
            )));
        }
        Ok(())
    }

    pub fn to_json(&self) -> Value {
        let mut stmt = serde_json::Map::new();
        if let Some(sid) = &self.sid {
            stmt.insert("Sid".to_string(), json!(sid));
        }
        stmt.insert("Effect".to_string(), json!(self.effect));
        stmt.insert("Action".to_string(), one_or_many(self.actions.iter().map(|a| json!(a))));
        stmt.insert(
            "Resource".to_string(),
            one_or_many(self.resources.iter().map(Reference::to_json)),
        );
        Value::Object(stmt)
    }
}

fn one_or_many(values: impl Iterator<Item = Value>) -> Value {
    let mut values: Vec<Value> = values.collect();
    if values.len() == 1 {
        values.remove(0)
    } else {
        Value::Array(values)
    }
}

/// Render statements as a policy document.
pub fn policy_document(statements: &[PolicyStatement]) -> Value {
    let statements: Vec<Value> = statements.iter().map(PolicyStatement::to_json).collect();
    json!({ "Version": POLICY_VERSION, "Statement": statements })
}

/// A service allowed to assume a role, e.g. `codebuild.amazonaws.com`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServicePrincipal(String);

impl ServicePrincipal {
    pub const CODEBUILD: &'static str = "codebuild.amazonaws.com";
    pub const CODEPIPELINE: &'static str = "codepipeline.amazonaws.com";
    pub const EVENTS: &'static str = "events.amazonaws.com";

    pub fn new(service: impl Into<String>) -> Self {
        Self(service.into())
    }

    fn assume_role_policy(&self) -> Value {
        json!({
            "Version": POLICY_VERSION,
            "Statement": [{
                "Action": "sts:AssumeRole",
                "Effect": "Allow",
                "Principal": { "Service": self.0 },
            }],
        })
    }
}

/// An identity that a service assumes to act on other resources.
#[derive(Debug, Clone)]
pub struct Role {
    id: String,
    scope: Option<ConstructPath>,
    assumed_by: ServicePrincipal,
    path: Option<String>,
}

impl Role {
    pub fn new(id: impl Into<String>, assumed_by: ServicePrincipal) -> Self {
        Self {
            id: id.into(),
            scope: None,
            assumed_by,
            path: None,
        }
    }

    /// Nest the role under another construct.
    pub fn with_scope(mut self, scope: &ConstructPath) -> Self {
        self.scope = Some(scope.clone());
        self
    }

    /// IAM path, e.g. `/service-role/`.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }
}

/// Reference to a declared role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleHandle {
    logical_id: LogicalId,
    scope: ConstructPath,
}

impl RoleHandle {
    pub fn logical_id(&self) -> &LogicalId {
        &self.logical_id
    }

    /// Construct path of the role itself, without the trailing `Resource`.
    pub fn scope(&self) -> &ConstructPath {
        &self.scope
    }

    pub fn arn(&self) -> Reference {
        Reference::get_att(&self.logical_id, "Arn")
    }

    pub fn role_name(&self) -> Reference {
        Reference::Ref(self.logical_id.clone())
    }
}

/// Anything that acts through a role and can therefore receive grants.
pub trait Grantable {
    fn grant_principal(&self) -> &RoleHandle;
}

impl Grantable for RoleHandle {
    fn grant_principal(&self) -> &RoleHandle {
        self
    }
}

impl Construct for Role {
    type Handle = RoleHandle;

    fn declare(self, stack: &mut Stack) -> Result<RoleHandle> {
        let mut props = serde_json::Map::new();
        props.insert(
            "AssumeRolePolicyDocument".to_string(),
            self.assumed_by.assume_role_policy(),
        );
        if let Some(path) = &self.path {
            props.insert("Path".to_string(), json!(path));
        }

        let path = match &self.scope {
            Some(scope) => scope.child(&self.id).child("Resource"),
            None => ConstructPath::resource(&self.id),
        };
        let logical_id = stack.add_resource(
            path.clone(),
            ResourceEntry::new("AWS::IAM::Role", Value::Object(props)),
        )?;

        Ok(RoleHandle {
            logical_id,
            scope: path.scope(),
        })
    }
}

/// A named set of statements attached inline to one or more roles.
#[derive(Debug, Clone)]
pub struct Policy {
    id: String,
    policy_name: Option<String>,
    statements: Vec<PolicyStatement>,
    roles: Vec<RoleHandle>,
}

impl Policy {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            policy_name: None,
            statements: Vec::new(),
            roles: Vec::new(),
        }
    }

    pub fn with_policy_name(mut self, name: impl Into<String>) -> Self {
        self.policy_name = Some(name.into());
        self
    }

    pub fn with_statement(mut self, statement: PolicyStatement) -> Self {
        self.statements.push(statement);
        self
    }

    pub fn with_statements(mut self, statements: impl IntoIterator<Item = PolicyStatement>) -> Self {
        self.statements.extend(statements);
        self
    }

    /// Attach this policy inline to a role.
    pub fn attach_to_role(mut self, role: &RoleHandle) -> Self {
        if !self.roles.contains(role) {
            self.roles.push(role.clone());
        }
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyHandle {
    logical_id: LogicalId,
}

impl PolicyHandle {
    pub fn logical_id(&self) -> &LogicalId {
        &self.logical_id
    }
}

impl Construct for Policy {
    type Handle = PolicyHandle;

    fn declare(self, stack: &mut Stack) -> Result<PolicyHandle> {
        if self.statements.is_empty() {
            return Err(Error::MalformedPolicy(format!(
                "policy {} has no statements",
                self.id
            )));
        }
        if self.roles.is_empty() {
            return Err(Error::MalformedPolicy(format!(
                "policy {} is not attached to any role",
                self.id
            )));
        }
        for statement in &self.statements {
            statement.validate()?;
        }

        let path = ConstructPath::resource(&self.id);
        let logical_id = LogicalId::from_path(&path)?;
        let policy_name = self
            .policy_name
            .clone()
            .unwrap_or_else(|| logical_id.to_string());
        let roles: Vec<Value> = self.roles.iter().map(|r| r.role_name().to_json()).collect();

        let logical_id = stack.add_resource(
            path,
            ResourceEntry::new(
                "AWS::IAM::Policy",
                json!({
                    "PolicyDocument": policy_document(&self.statements),
                    "PolicyName": policy_name,
                    "Roles": roles,
                }),
            ),
        )?;

        for role in &self.roles {
            stack.attach_statements(role, &logical_id, &self.statements);
        }

        Ok(PolicyHandle { logical_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stack::{App, StackProps};
    use yare::parameterized;

    #[parameterized(
        wildcard = { "*" },
        plain = { "s3:GetObject" },
        prefix_glob = { "s3:Abort*" },
        dashed_service = { "execute-api:Invoke" },
    )]
    fn test_valid_actions(action: &str) {
        let stmt = PolicyStatement::allow()
            .with_actions([action])
            .with_resource(Reference::any());
        assert!(stmt.validate().is_ok());
    }

    #[parameterized(
        missing_service = { "GetObject" },
        spaces = { "s3: GetObject" },
        empty_action = { "s3:" },
    )]
    fn test_invalid_actions(action: &str) {
        let stmt = PolicyStatement::allow()
            .with_actions([action])
            .with_resource(Reference::any());
        assert!(matches!(stmt.validate(), Err(Error::MalformedPolicy(_))));
    }

    #[test]
    fn test_statement_without_resources_rejected() {
        let stmt = PolicyStatement::allow().with_sid("Empty").with_actions(["s3:GetObject"]);
        let err = stmt.validate().unwrap_err();
        assert!(err.to_string().contains("Empty"));
    }

    #[test]
    fn test_statement_json_collapses_single_values() {
        let stmt = PolicyStatement::allow()
            .with_sid("CodeCommitPolicy")
            .with_actions(["codecommit:GitPull", "codecommit:GitPull"])
            .with_resource("*");
        assert_eq!(
            stmt.to_json(),
            json!({
                "Sid": "CodeCommitPolicy",
                "Effect": "Allow",
                "Action": "codecommit:GitPull",
                "Resource": "*",
            })
        );
    }

    #[test]
    fn test_role_and_inline_policy() {
        let mut app = App::new();
        let stack = app.new_stack("iam-test", StackProps::default()).unwrap();
        let role = stack
            .declare(
                Role::new("AppBuildRole", ServicePrincipal::new(ServicePrincipal::CODEBUILD))
                    .with_path("/"),
            )
            .unwrap();
        let policy = stack
            .declare(
                Policy::new("CodeBuildAccess")
                    .with_policy_name("CodeBuildAccess")
                    .with_statement(
                        PolicyStatement::allow()
                            .with_actions(["codecommit:GitPull"])
                            .with_resource("*"),
                    )
                    .attach_to_role(&role),
            )
            .unwrap();

        assert_eq!(role.logical_id().as_str(), "AppBuildRole8A1C3CBF");
        assert_eq!(policy.logical_id().as_str(), "CodeBuildAccess6D51310F");
        assert_eq!(stack.policies_attached_to(role.logical_id()), vec![policy.logical_id().clone()]);

        let template = stack.synth().unwrap();
        let role_entry = template.resource(role.logical_id()).unwrap();
        assert_eq!(
            role_entry.properties["AssumeRolePolicyDocument"]["Statement"][0]["Principal"]["Service"],
            "codebuild.amazonaws.com"
        );
        let policy_entry = template.resource(policy.logical_id()).unwrap();
        assert_eq!(policy_entry.properties["PolicyName"], "CodeBuildAccess");
        assert_eq!(policy_entry.properties["Roles"], json!([{ "Ref": "AppBuildRole8A1C3CBF" }]));
    }

    #[test]
    fn test_unattached_policy_rejected() {
        let mut app = App::new();
        let stack = app.new_stack("iam-test", StackProps::default()).unwrap();
        let result = stack.declare(
            Policy::new("Orphan").with_statement(
                PolicyStatement::allow()
                    .with_actions(["s3:GetObject"])
                    .with_resource("*"),
            ),
        );
        assert!(matches!(result, Err(Error::MalformedPolicy(_))));
    }
}
