//! Build projects.

use serde_json::{Value, json};

use crate::authz::Requirement;
use crate::codecommit::RepositoryHandle;
use crate::iam::{Grantable, PolicyStatement, RoleHandle};
use crate::id::{ConstructPath, LogicalId};
use crate::reference::Reference;
use crate::s3::BucketHandle;
use crate::stack::{Construct, Stack};
use crate::template::ResourceEntry;
use crate::{Error, Result};

const LOG_ACTIONS: &[&str] = &["logs:CreateLogGroup", "logs:CreateLogStream", "logs:PutLogEvents"];

/// Managed build images.
pub struct LinuxBuildImage;

impl LinuxBuildImage {
    pub const STANDARD_5_0: &'static str = "aws/codebuild/standard:5.0";
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ComputeType {
    #[default]
    Small,
    Medium,
    Large,
    X2Large,
}

impl ComputeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComputeType::Small => "BUILD_GENERAL1_SMALL",
            ComputeType::Medium => "BUILD_GENERAL1_MEDIUM",
            ComputeType::Large => "BUILD_GENERAL1_LARGE",
            ComputeType::X2Large => "BUILD_GENERAL1_2XLARGE",
        }
    }
}

impl std::fmt::Display for ComputeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ComputeType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "small" | "build_general1_small" => Ok(ComputeType::Small),
            "medium" | "build_general1_medium" => Ok(ComputeType::Medium),
            "large" | "build_general1_large" => Ok(ComputeType::Large),
            "2xlarge" | "build_general1_2xlarge" => Ok(ComputeType::X2Large),
            _ => Err(format!("Unknown compute type: {}", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildEnvironment {
    pub image: String,
    pub compute_type: ComputeType,
    pub privileged: bool,
}

impl Default for BuildEnvironment {
    fn default() -> Self {
        Self {
            image: LinuxBuildImage::STANDARD_5_0.to_string(),
            compute_type: ComputeType::Small,
            privileged: false,
        }
    }
}

impl BuildEnvironment {
    fn to_json(&self) -> Value {
        json!({
            "Type": "LINUX_CONTAINER",
            "Image": self.image,
            "ComputeType": self.compute_type.as_str(),
            "PrivilegedMode": self.privileged,
            "ImagePullCredentialsType": "CODEBUILD",
        })
    }
}

/// Where a build writes its packaged output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Artifacts {
    bucket: BucketHandle,
    path: Option<String>,
    name: String,
    include_build_id: bool,
    package_zip: bool,
}

impl S3Artifacts {
    pub fn new(bucket: &BucketHandle, name: impl Into<String>) -> Self {
        Self {
            bucket: bucket.clone(),
            path: None,
            name: name.into(),
            include_build_id: true,
            package_zip: true,
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Insert the build id into the object key so runs never overwrite each other.
    pub fn with_include_build_id(mut self, include: bool) -> Self {
        self.include_build_id = include;
        self
    }

    pub fn with_package_zip(mut self, zip: bool) -> Self {
        self.package_zip = zip;
        self
    }

    /// Object key for a build: `path/<build-id>/name`, or `path/name`
    /// without the build-id namespace.
    pub fn object_key(&self, build_id: &str) -> String {
        let mut parts: Vec<&str> = Vec::new();
        if let Some(path) = self.path.as_deref().filter(|p| !p.is_empty()) {
            parts.push(path.trim_matches('/'));
        }
        if self.include_build_id {
            parts.push(build_id);
        }
        parts.push(&self.name);
        parts.join("/")
    }

    /// Key pattern covering every object this project may write.
    pub fn key_pattern(&self) -> String {
        match self.path.as_deref().filter(|p| !p.is_empty()) {
            Some(path) => format!("{}/*", path.trim_matches('/')),
            None => "*".to_string(),
        }
    }

    fn to_json(&self) -> Value {
        let mut artifacts = serde_json::Map::new();
        artifacts.insert("Type".to_string(), json!("S3"));
        artifacts.insert("Location".to_string(), self.bucket.bucket_name().to_json());
        if let Some(path) = &self.path {
            artifacts.insert("Path".to_string(), json!(path));
        }
        artifacts.insert("Name".to_string(), json!(self.name));
        artifacts.insert(
            "NamespaceType".to_string(),
            json!(if self.include_build_id { "BUILD_ID" } else { "NONE" }),
        );
        artifacts.insert(
            "Packaging".to_string(),
            json!(if self.package_zip { "ZIP" } else { "NONE" }),
        );
        Value::Object(artifacts)
    }
}

/// A build definition: check out the repository, build, publish one artifact.
#[derive(Debug, Clone)]
pub struct Project {
    id: String,
    source: RepositoryHandle,
    artifacts: S3Artifacts,
    environment: BuildEnvironment,
    role: RoleHandle,
}

impl Project {
    pub fn new(id: impl Into<String>, source: &RepositoryHandle, artifacts: S3Artifacts, role: &RoleHandle) -> Self {
        Self {
            id: id.into(),
            source: source.clone(),
            artifacts,
            environment: BuildEnvironment::default(),
            role: role.clone(),
        }
    }

    pub fn with_environment(mut self, environment: BuildEnvironment) -> Self {
        self.environment = environment;
        self
    }
}

/// Reference to a declared build project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectHandle {
    logical_id: LogicalId,
    role: RoleHandle,
}

impl ProjectHandle {
    pub fn logical_id(&self) -> &LogicalId {
        &self.logical_id
    }

    pub fn project_name(&self) -> Reference {
        Reference::Ref(self.logical_id.clone())
    }

    pub fn arn(&self) -> Reference {
        Reference::get_att(&self.logical_id, "Arn")
    }

    pub fn role(&self) -> &RoleHandle {
        &self.role
    }

}

impl Grantable for ProjectHandle {
    fn grant_principal(&self) -> &RoleHandle {
        &self.role
    }
}

impl Construct for Project {
    type Handle = ProjectHandle;

    fn declare(self, stack: &mut Stack) -> Result<ProjectHandle> {
        if self.environment.image.is_empty() {
            return Err(Error::InvalidInput(format!(
                "build project {} has no image",
                self.id
            )));
        }
        if self.artifacts.name.is_empty() {
            return Err(Error::InvalidInput(format!(
                "build project {} has no artifact name",
                self.id
            )));
        }

        let mut props = serde_json::Map::new();
        props.insert("Artifacts".to_string(), self.artifacts.to_json());
        props.insert("Environment".to_string(), self.environment.to_json());
        props.insert("ServiceRole".to_string(), self.role.arn().to_json());
        props.insert(
            "Source".to_string(),
            json!({ "Type": "CODECOMMIT", "Location": self.source.clone_url_http() }),
        );
        props.insert("EncryptionKey".to_string(), json!("alias/aws/s3"));

        let logical_id = stack.add_resource(
            ConstructPath::resource(&self.id),
            ResourceEntry::new("AWS::CodeBuild::Project", Value::Object(props)),
        )?;

        let log_group = stack.format_arn(
            "logs",
            Reference::concat([
                Reference::literal("log-group:/aws/codebuild/"),
                Reference::Ref(logical_id.clone()),
            ]),
        );
        let log_streams = Reference::concat([log_group.clone(), Reference::literal(":*")]);

        // CodeBuild cannot start without its logs and a source checkout.
        stack.add_to_principal_policy(
            &self.role,
            PolicyStatement::allow()
                .with_actions(LOG_ACTIONS.iter().copied())
                .with_resources([log_group, log_streams.clone()]),
        )?;
        self.source.grant_pull(stack, &self.role)?;

        let principal = self.role.logical_id();
        let purpose = format!("build project {}", self.id);
        stack.require(Requirement::new(
            principal,
            purpose.clone(),
            ["codecommit:GitPull"],
            self.source.arn(),
        ));
        stack.require(Requirement::new(
            principal,
            purpose.clone(),
            ["s3:PutObject"],
            self.artifacts.bucket.arn_for_objects(&self.artifacts.key_pattern()),
        ));
        stack.require(Requirement::new(
            principal,
            purpose.clone(),
            ["s3:GetBucketAcl", "s3:GetBucketLocation"],
            self.artifacts.bucket.arn(),
        ));
        stack.require(Requirement::new(
            principal,
            purpose,
            LOG_ACTIONS.iter().copied(),
            log_streams,
        ));

        Ok(ProjectHandle {
            logical_id,
            role: self.role,
        })
    }
}
