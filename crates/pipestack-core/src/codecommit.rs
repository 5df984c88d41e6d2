//! Source repositories.

use std::path::PathBuf;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::json;

use crate::asset::DirectoryAsset;
use crate::iam::{Grantable, PolicyStatement};
use crate::id::{ConstructPath, LogicalId};
use crate::reference::Reference;
use crate::stack::{Construct, Stack};
use crate::template::ResourceEntry;
use crate::{Error, Result};

/// Branch the pipeline tracks when none is configured.
pub const DEFAULT_BRANCH: &str = "master";

static REPOSITORY_NAME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\w.-]{1,100}$").unwrap());

/// Initial content for a repository, committed once at creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Code {
    directory: PathBuf,
    branch: Option<String>,
}

impl Code {
    pub fn from_directory(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            branch: None,
        }
    }

    /// Branch the seed commit lands on.
    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }
}

#[derive(Debug, Clone)]
pub struct Repository {
    id: String,
    repository_name: String,
    description: Option<String>,
    code: Option<Code>,
}

impl Repository {
    pub fn new(id: impl Into<String>, repository_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            repository_name: repository_name.into(),
            description: None,
            code: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_code(mut self, code: Code) -> Self {
        self.code = Some(code);
        self
    }
}

/// Reference to a declared repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryHandle {
    logical_id: LogicalId,
}

impl RepositoryHandle {
    pub fn logical_id(&self) -> &LogicalId {
        &self.logical_id
    }

    pub fn name(&self) -> Reference {
        Reference::get_att(&self.logical_id, "Name")
    }

    pub fn arn(&self) -> Reference {
        Reference::get_att(&self.logical_id, "Arn")
    }

    pub fn clone_url_http(&self) -> Reference {
        Reference::get_att(&self.logical_id, "CloneUrlHttp")
    }

    pub fn grant_pull(&self, stack: &mut Stack, grantee: &impl Grantable) -> Result<LogicalId> {
        stack.add_to_principal_policy(
            grantee.grant_principal(),
            PolicyStatement::allow()
                .with_actions(["codecommit:GitPull"])
                .with_resource(self.arn()),
        )
    }
}

impl Construct for Repository {
    type Handle = RepositoryHandle;

    fn declare(self, stack: &mut Stack) -> Result<RepositoryHandle> {
        if !REPOSITORY_NAME_REGEX.is_match(&self.repository_name) {
            return Err(Error::InvalidInput(format!(
                "invalid repository name: {}",
                self.repository_name
            )));
        }

        let mut props = serde_json::Map::new();
        props.insert("RepositoryName".to_string(), json!(self.repository_name));
        if let Some(description) = &self.description {
            props.insert("RepositoryDescription".to_string(), json!(description));
        }
        if let Some(code) = &self.code {
            let asset = DirectoryAsset::from_directory(&code.directory)?;
            let bucket = DirectoryAsset::staging_bucket(stack.account(), stack.region());
            let mut seed = serde_json::Map::new();
            seed.insert(
                "S3".to_string(),
                json!({ "Bucket": bucket, "Key": asset.object_key() }),
            );
            if let Some(branch) = &code.branch {
                seed.insert("BranchName".to_string(), json!(branch));
            }
            props.insert("Code".to_string(), serde_json::Value::Object(seed));
        }

        let logical_id = stack.add_resource(
            ConstructPath::resource(&self.id),
            ResourceEntry::new("AWS::CodeCommit::Repository", serde_json::Value::Object(props)),
        )?;

        Ok(RepositoryHandle { logical_id })
    }
}
