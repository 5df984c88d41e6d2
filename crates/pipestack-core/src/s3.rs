//! Artifact store buckets.

use serde_json::{Value, json};

use crate::iam::{Grantable, PolicyStatement};
use crate::id::{ConstructPath, LogicalId};
use crate::reference::Reference;
use crate::stack::{Construct, RemovalPolicy, Stack};
use crate::template::ResourceEntry;
use crate::Result;

const READ_ACTIONS: &[&str] = &["s3:GetObject*", "s3:GetBucket*", "s3:List*"];
const PUT_ACTIONS: &[&str] = &[
    "s3:PutObject",
    "s3:PutObjectLegalHold",
    "s3:PutObjectRetention",
    "s3:PutObjectTagging",
    "s3:PutObjectVersionTagging",
    "s3:Abort*",
];
const DELETE_ACTIONS: &[&str] = &["s3:DeleteObject*"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BucketEncryption {
    Unencrypted,
    #[default]
    S3Managed,
    KmsManaged,
}

#[derive(Debug, Clone)]
pub struct Bucket {
    id: String,
    encryption: BucketEncryption,
    versioned: bool,
    removal_policy: Option<RemovalPolicy>,
}

impl Bucket {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            encryption: BucketEncryption::default(),
            versioned: false,
            removal_policy: None,
        }
    }

    pub fn with_encryption(mut self, encryption: BucketEncryption) -> Self {
        self.encryption = encryption;
        self
    }

    pub fn with_versioned(mut self, versioned: bool) -> Self {
        self.versioned = versioned;
        self
    }

    pub fn with_removal_policy(mut self, policy: RemovalPolicy) -> Self {
        self.removal_policy = Some(policy);
        self
    }

    fn properties(&self) -> Value {
        let mut props = serde_json::Map::new();
        let algorithm = match self.encryption {
            BucketEncryption::Unencrypted => None,
            BucketEncryption::S3Managed => Some("AES256"),
            BucketEncryption::KmsManaged => Some("aws:kms"),
        };
        if let Some(algorithm) = algorithm {
            props.insert(
                "BucketEncryption".to_string(),
                json!({
                    "ServerSideEncryptionConfiguration": [{
                        "ServerSideEncryptionByDefault": { "SSEAlgorithm": algorithm }
                    }]
                }),
            );
        }
        if self.versioned {
            props.insert(
                "VersioningConfiguration".to_string(),
                json!({ "Status": "Enabled" }),
            );
        }
        if props.is_empty() {
            Value::Null
        } else {
            Value::Object(props)
        }
    }
}

/// Reference to a declared bucket. Every ARN it hands out resolves to the
/// bucket's own identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketHandle {
    logical_id: LogicalId,
}

impl BucketHandle {
    pub fn logical_id(&self) -> &LogicalId {
        &self.logical_id
    }

    pub fn bucket_name(&self) -> Reference {
        Reference::Ref(self.logical_id.clone())
    }

    pub fn arn(&self) -> Reference {
        Reference::get_att(&self.logical_id, "Arn")
    }

    /// ARN of the objects matching a key pattern, e.g. `*` or `build_output/*`.
    pub fn arn_for_objects(&self, key_pattern: &str) -> Reference {
        Reference::concat([self.arn(), Reference::literal(format!("/{}", key_pattern))])
    }

    pub fn grant_put(&self, stack: &mut Stack, grantee: &impl Grantable) -> Result<LogicalId> {
        self.grant(stack, grantee, PUT_ACTIONS.iter().copied(), false)
    }

    pub fn grant_read_write(&self, stack: &mut Stack, grantee: &impl Grantable) -> Result<LogicalId> {
        let actions = READ_ACTIONS
            .iter()
            .chain(DELETE_ACTIONS)
            .chain(PUT_ACTIONS)
            .copied();
        self.grant(stack, grantee, actions, true)
    }

    fn grant<'a>(
        &self,
        stack: &mut Stack,
        grantee: &impl Grantable,
        actions: impl Iterator<Item = &'a str>,
        include_bucket: bool,
    ) -> Result<LogicalId> {
        let mut statement = PolicyStatement::allow().with_actions(actions);
        if include_bucket {
            statement = statement.with_resource(self.arn());
        }
        statement = statement.with_resource(self.arn_for_objects("*"));
        stack.add_to_principal_policy(grantee.grant_principal(), statement)
    }
}

impl Construct for Bucket {
    type Handle = BucketHandle;

    fn declare(self, stack: &mut Stack) -> Result<BucketHandle> {
        let removal = stack.removal_policy(self.removal_policy, RemovalPolicy::Retain);
        let entry = ResourceEntry::new("AWS::S3::Bucket", self.properties())
            .with_deletion_policy(removal.deletion_policy());

        let logical_id = stack.add_resource(ConstructPath::resource(&self.id), entry)?;
        Ok(BucketHandle { logical_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iam::{Role, ServicePrincipal};
    use crate::stack::{App, StackProps};
    use crate::template::DeletionPolicy;

    #[test]
    fn test_encrypted_versioned_bucket_destroyed_with_stack() {
        let mut app = App::new();
        let stack = app.new_stack("store", StackProps::default()).unwrap();
        let bucket = stack
            .declare(
                Bucket::new("ArtifactBucket")
                    .with_encryption(BucketEncryption::S3Managed)
                    .with_versioned(true)
                    .with_removal_policy(RemovalPolicy::Destroy),
            )
            .unwrap();

        let template = stack.synth().unwrap();
        let entry = template.resource(bucket.logical_id()).unwrap();
        assert_eq!(bucket.logical_id().as_str(), "ArtifactBucket7410C9EF");
        assert_eq!(entry.deletion_policy, Some(DeletionPolicy::Delete));
        assert_eq!(entry.update_replace_policy, Some(DeletionPolicy::Delete));
        assert_eq!(
            entry.properties["BucketEncryption"]["ServerSideEncryptionConfiguration"][0]
                ["ServerSideEncryptionByDefault"]["SSEAlgorithm"],
            "AES256"
        );
        assert_eq!(entry.properties["VersioningConfiguration"]["Status"], "Enabled");
    }

    #[test]
    fn test_bucket_retained_by_default() {
        let mut app = App::new();
        let stack = app.new_stack("store", StackProps::default()).unwrap();
        let bucket = stack
            .declare(Bucket::new("Plain").with_encryption(BucketEncryption::Unencrypted))
            .unwrap();
        let template = stack.synth().unwrap();
        let entry = template.resource(bucket.logical_id()).unwrap();
        assert_eq!(entry.deletion_policy, Some(DeletionPolicy::Retain));
        assert!(entry.properties.is_null());
    }

    #[test]
    fn test_grant_put_targets_bucket_objects() {
        let mut app = App::new();
        let stack = app.new_stack("store", StackProps::default()).unwrap();
        let bucket = stack.declare(Bucket::new("ArtifactBucket")).unwrap();
        let role = stack
            .declare(Role::new("Writer", ServicePrincipal::new(ServicePrincipal::CODEBUILD)))
            .unwrap();

        bucket.grant_put(stack, &role).unwrap();

        let statements = stack.statements_for(role.logical_id());
        assert_eq!(statements.len(), 1);
        assert!(statements[0].actions.contains(&"s3:PutObject".to_string()));
        assert_eq!(statements[0].resources, vec![bucket.arn_for_objects("*")]);
    }

    #[test]
    fn test_grant_read_write_covers_bucket_and_objects() {
        let mut app = App::new();
        let stack = app.new_stack("store", StackProps::default()).unwrap();
        let bucket = stack.declare(Bucket::new("ArtifactBucket")).unwrap();
        let role = stack
            .declare(Role::new("Pipeline", ServicePrincipal::new(ServicePrincipal::CODEPIPELINE)))
            .unwrap();

        bucket.grant_read_write(stack, &role).unwrap();

        let statements = stack.statements_for(role.logical_id());
        assert_eq!(statements[0].resources, vec![bucket.arn(), bucket.arn_for_objects("*")]);
        assert!(statements[0].actions.contains(&"s3:DeleteObject*".to_string()));
        assert!(statements[0].actions.contains(&"s3:GetBucket*".to_string()));
    }
}
