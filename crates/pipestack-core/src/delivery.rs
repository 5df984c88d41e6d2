//! The delivery pipeline stack: artifact store, source repository, build
//! project, and a Source → Build pipeline with the roles that run them.

use std::path::PathBuf;

use tracing::info;

use crate::codebuild::{BuildEnvironment, ComputeType, LinuxBuildImage, Project, ProjectHandle, S3Artifacts};
use crate::codecommit::{Code, DEFAULT_BRANCH, Repository, RepositoryHandle};
use crate::codepipeline::{
    Artifact, CodeBuildAction, CodeCommitSourceAction, Pipeline, PipelineHandle, SourceTrigger,
};
use crate::iam::{Policy, PolicyStatement, Role, RoleHandle, ServicePrincipal};
use crate::s3::{Bucket, BucketEncryption, BucketHandle};
use crate::stack::{App, RemovalPolicy, StackProps};
use crate::Result;

pub const SOURCE_STAGE: &str = "Source";
pub const BUILD_STAGE: &str = "Build";
pub const SOURCE_ARTIFACT: &str = "SourceCode";

/// Tunable parts of the delivery stack. `Default` yields the stock layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryPipelineSettings {
    pub repository_name: String,
    pub repository_description: String,
    pub seed_directory: PathBuf,
    pub branch: String,
    pub build_image: String,
    pub compute_type: ComputeType,
    pub artifact_path: String,
    pub artifact_name: String,
    pub include_build_id: bool,
    pub package_zip: bool,
    pub pipeline_name: String,
    pub trigger: SourceTrigger,
}

impl Default for DeliveryPipelineSettings {
    fn default() -> Self {
        Self {
            repository_name: "java-project".to_string(),
            repository_description: "Repo for the Java project".to_string(),
            seed_directory: PathBuf::from("code_from_s3/java-project"),
            branch: DEFAULT_BRANCH.to_string(),
            build_image: LinuxBuildImage::STANDARD_5_0.to_string(),
            compute_type: ComputeType::Small,
            artifact_path: "build_output".to_string(),
            artifact_name: "artifact.zip".to_string(),
            include_build_id: true,
            package_zip: true,
            pipeline_name: "AppCodePipeline".to_string(),
            trigger: SourceTrigger::Events,
        }
    }
}

/// Handles to everything the delivery stack declares.
#[derive(Debug, Clone)]
pub struct DeliveryPipelineStack {
    pub stack_name: String,
    pub artifact_bucket: BucketHandle,
    pub repository: RepositoryHandle,
    pub build_role: RoleHandle,
    pub project: ProjectHandle,
    pub pipeline_role: RoleHandle,
    pub pipeline: PipelineHandle,
}

impl DeliveryPipelineStack {
    pub fn new(app: &mut App, id: &str, props: StackProps) -> Result<Self> {
        Self::with_settings(app, id, props, DeliveryPipelineSettings::default())
    }

    pub fn with_settings(
        app: &mut App,
        id: &str,
        props: StackProps,
        settings: DeliveryPipelineSettings,
    ) -> Result<Self> {
        let stack = app.new_stack(id, props)?;

        let artifact_bucket = stack.declare(
            Bucket::new("ArtifactBucket")
                .with_encryption(BucketEncryption::S3Managed)
                .with_versioned(true)
                .with_removal_policy(RemovalPolicy::Destroy),
        )?;

        // The seed commit must land on the branch the pipeline watches.
        let repository = stack.declare(
            Repository::new("JavaProjectRepo", &settings.repository_name)
                .with_description(&settings.repository_description)
                .with_code(Code::from_directory(&settings.seed_directory).with_branch(&settings.branch)),
        )?;

        let build_role = stack.declare(
            Role::new("AppBuildRole", ServicePrincipal::new(ServicePrincipal::CODEBUILD)).with_path("/"),
        )?;
        stack.declare(
            Policy::new("CodeBuildAccess")
                .with_policy_name("CodeBuildAccess")
                .with_statement(
                    PolicyStatement::allow()
                        .with_sid("S3Permissions")
                        .with_actions([
                            "s3:PutObject",
                            "s3:GetObject",
                            "s3:GetObjectVersion",
                            "s3:GetBucketAcl",
                            "s3:GetBucketLocation",
                        ])
                        .with_resources([artifact_bucket.arn(), artifact_bucket.arn_for_objects("*")]),
                )
                .with_statement(
                    PolicyStatement::allow()
                        .with_sid("CodeCommitPolicy")
                        .with_actions(["codecommit:GitPull"])
                        .with_resource(repository.arn()),
                )
                .attach_to_role(&build_role),
        )?;

        let artifacts = S3Artifacts::new(&artifact_bucket, &settings.artifact_name)
            .with_path(&settings.artifact_path)
            .with_include_build_id(settings.include_build_id)
            .with_package_zip(settings.package_zip);
        let project = stack.declare(
            Project::new("AppBuildProject", &repository, artifacts, &build_role).with_environment(
                BuildEnvironment {
                    image: settings.build_image.clone(),
                    compute_type: settings.compute_type,
                    privileged: false,
                },
            ),
        )?;
        artifact_bucket.grant_put(stack, &project)?;

        let pipeline_role = stack.declare(
            Role::new("CodePipelineServiceRole", ServicePrincipal::new(ServicePrincipal::CODEPIPELINE))
                .with_path("/service-role/"),
        )?;
        stack.declare(
            Policy::new("CodePipelinePolicy")
                .with_statements([
                    PolicyStatement::allow()
                        .with_actions([
                            "s3:PutObject",
                            "s3:GetObject",
                            "s3:GetBucketAcl",
                            "s3:GetBucketLocation",
                        ])
                        .with_resources([artifact_bucket.arn(), artifact_bucket.arn_for_objects("*")]),
                    PolicyStatement::allow()
                        .with_actions([
                            "codecommit:GetBranch",
                            "codecommit:GetCommit",
                            "codecommit:GetRepository",
                            "codecommit:UploadArchive",
                            "codecommit:GetUploadArchiveStatus",
                            "codecommit:CancelUploadArchive",
                        ])
                        .with_resource(repository.arn()),
                    PolicyStatement::allow()
                        .with_actions(["codebuild:StartBuild", "codebuild:BatchGetBuilds"])
                        .with_resource(project.arn()),
                ])
                .attach_to_role(&pipeline_role),
        )?;

        let source_output = Artifact::named(SOURCE_ARTIFACT);
        let pipeline = stack.declare(
            Pipeline::new("AppCodePipeline", &artifact_bucket, &pipeline_role)
                .with_pipeline_name(&settings.pipeline_name)
                .add_stage(
                    SOURCE_STAGE,
                    [CodeCommitSourceAction::new("Source", &repository, &source_output)
                        .with_branch(&settings.branch)
                        .with_trigger(settings.trigger)
                        .into()],
                )
                .add_stage(
                    BUILD_STAGE,
                    [CodeBuildAction::new("Build", &project, &source_output).into()],
                ),
        )?;

        info!(
            stack = %id,
            repository = %settings.repository_name,
            branch = %settings.branch,
            pipeline = %settings.pipeline_name,
            "Declared delivery pipeline stack"
        );

        Ok(Self {
            stack_name: id.to_string(),
            artifact_bucket,
            repository,
            build_role,
            project,
            pipeline_role,
            pipeline,
        })
    }
}
