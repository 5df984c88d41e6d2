//! Delivery pipeline definitions.
//!
//! A pipeline is an ordered list of named stages, each holding actions.
//! Actions exchange named [`Artifact`]s: an action may only consume an
//! artifact produced by an action in a strictly earlier stage.

use std::collections::{HashMap, HashSet};

use serde_json::{Value, json};

use crate::authz::Requirement;
use crate::codebuild::ProjectHandle;
use crate::codecommit::{DEFAULT_BRANCH, RepositoryHandle};
use crate::iam::{PolicyStatement, Role, RoleHandle, ServicePrincipal};
use crate::id::{ConstructPath, LogicalId};
use crate::reference::Reference;
use crate::s3::BucketHandle;
use crate::stack::{Construct, Stack};
use crate::template::ResourceEntry;
use crate::{Error, Result};

/// A named token passed between actions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Artifact(String);

impl Artifact {
    pub fn named(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }

    fn to_json(&self) -> Value {
        json!({ "Name": self.0 })
    }
}

impl std::fmt::Display for Artifact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a source action learns about new commits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SourceTrigger {
    /// No automatic runs.
    None,
    /// The pipeline polls the repository.
    Poll,
    /// A repository change event starts the pipeline.
    #[default]
    Events,
}

impl std::fmt::Display for SourceTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceTrigger::None => write!(f, "none"),
            SourceTrigger::Poll => write!(f, "poll"),
            SourceTrigger::Events => write!(f, "events"),
        }
    }
}

impl std::str::FromStr for SourceTrigger {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" => Ok(SourceTrigger::None),
            "poll" => Ok(SourceTrigger::Poll),
            "events" => Ok(SourceTrigger::Events),
            _ => Err(format!("Unknown source trigger: {}", s)),
        }
    }
}

/// Pull a branch of a repository into an output artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeCommitSourceAction {
    pub action_name: String,
    pub repository: RepositoryHandle,
    pub branch: String,
    pub output: Artifact,
    pub trigger: SourceTrigger,
}

impl CodeCommitSourceAction {
    pub fn new(action_name: impl Into<String>, repository: &RepositoryHandle, output: &Artifact) -> Self {
        Self {
            action_name: action_name.into(),
            repository: repository.clone(),
            branch: DEFAULT_BRANCH.to_string(),
            output: output.clone(),
            trigger: SourceTrigger::default(),
        }
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = branch.into();
        self
    }

    pub fn with_trigger(mut self, trigger: SourceTrigger) -> Self {
        self.trigger = trigger;
        self
    }
}

/// Run a build project over an input artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeBuildAction {
    pub action_name: String,
    pub project: ProjectHandle,
    pub input: Artifact,
    pub outputs: Vec<Artifact>,
}

impl CodeBuildAction {
    pub fn new(action_name: impl Into<String>, project: &ProjectHandle, input: &Artifact) -> Self {
        Self {
            action_name: action_name.into(),
            project: project.clone(),
            input: input.clone(),
            outputs: Vec::new(),
        }
    }

    pub fn with_output(mut self, output: &Artifact) -> Self {
        self.outputs.push(output.clone());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Source(CodeCommitSourceAction),
    Build(CodeBuildAction),
}

impl From<CodeCommitSourceAction> for Action {
    fn from(action: CodeCommitSourceAction) -> Self {
        Action::Source(action)
    }
}

impl From<CodeBuildAction> for Action {
    fn from(action: CodeBuildAction) -> Self {
        Action::Build(action)
    }
}

impl Action {
    pub fn name(&self) -> &str {
        match self {
            Action::Source(a) => &a.action_name,
            Action::Build(a) => &a.action_name,
        }
    }

    pub fn is_source(&self) -> bool {
        matches!(self, Action::Source(_))
    }

    pub fn inputs(&self) -> Vec<&Artifact> {
        match self {
            Action::Source(_) => Vec::new(),
            Action::Build(a) => vec![&a.input],
        }
    }

    pub fn outputs(&self) -> Vec<&Artifact> {
        match self {
            Action::Source(a) => vec![&a.output],
            Action::Build(a) => a.outputs.iter().collect(),
        }
    }

    fn type_id(&self) -> Value {
        let (category, provider) = match self {
            Action::Source(_) => ("Source", "CodeCommit"),
            Action::Build(_) => ("Build", "CodeBuild"),
        };
        json!({ "Category": category, "Owner": "AWS", "Provider": provider, "Version": "1" })
    }

    fn configuration(&self) -> Value {
        match self {
            Action::Source(a) => json!({
                "RepositoryName": a.repository.name(),
                "BranchName": a.branch,
                "PollForSourceChanges": a.trigger == SourceTrigger::Poll,
            }),
            Action::Build(a) => json!({ "ProjectName": a.project.project_name() }),
        }
    }

    fn to_json(&self) -> Value {
        let mut action = serde_json::Map::new();
        action.insert("Name".to_string(), json!(self.name()));
        action.insert("ActionTypeId".to_string(), self.type_id());
        action.insert("Configuration".to_string(), self.configuration());
        let inputs: Vec<Value> = self.inputs().into_iter().map(Artifact::to_json).collect();
        if !inputs.is_empty() {
            action.insert("InputArtifacts".to_string(), Value::Array(inputs));
        }
        let outputs: Vec<Value> = self.outputs().into_iter().map(Artifact::to_json).collect();
        if !outputs.is_empty() {
            action.insert("OutputArtifacts".to_string(), Value::Array(outputs));
        }
        action.insert("RunOrder".to_string(), json!(1));
        Value::Object(action)
    }

    /// Access the principals involved need to run this action: the pipeline
    /// role, and for builds the project's role reading its input artifacts.
    fn requirements(&self, role: &LogicalId, artifact_bucket: &BucketHandle) -> Vec<Requirement> {
        match self {
            Action::Source(a) => vec![Requirement::new(
                role,
                format!("source action {}", a.action_name),
                [
                    "codecommit:GetBranch",
                    "codecommit:GetCommit",
                    "codecommit:UploadArchive",
                    "codecommit:GetUploadArchiveStatus",
                    "codecommit:CancelUploadArchive",
                ],
                a.repository.arn(),
            )],
            Action::Build(a) => vec![
                Requirement::new(
                    role,
                    format!("build action {}", a.action_name),
                    ["codebuild:StartBuild", "codebuild:BatchGetBuilds"],
                    a.project.arn(),
                ),
                Requirement::new(
                    a.project.role().logical_id(),
                    format!("input artifacts of build action {}", a.action_name),
                    ["s3:GetObject", "s3:GetObjectVersion"],
                    artifact_bucket.arn_for_objects("*"),
                ),
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage {
    pub name: String,
    pub actions: Vec<Action>,
}

impl Stage {
    fn to_json(&self) -> Value {
        let actions: Vec<Value> = self.actions.iter().map(Action::to_json).collect();
        json!({ "Name": self.name, "Actions": actions })
    }
}

#[derive(Debug, Clone)]
pub struct Pipeline {
    id: String,
    pipeline_name: Option<String>,
    artifact_bucket: BucketHandle,
    role: RoleHandle,
    stages: Vec<Stage>,
}

impl Pipeline {
    pub fn new(id: impl Into<String>, artifact_bucket: &BucketHandle, role: &RoleHandle) -> Self {
        Self {
            id: id.into(),
            pipeline_name: None,
            artifact_bucket: artifact_bucket.clone(),
            role: role.clone(),
            stages: Vec::new(),
        }
    }

    pub fn with_pipeline_name(mut self, name: impl Into<String>) -> Self {
        self.pipeline_name = Some(name.into());
        self
    }

    /// Append a stage; stages run in the order they are added.
    pub fn add_stage(mut self, name: impl Into<String>, actions: impl IntoIterator<Item = Action>) -> Self {
        self.stages.push(Stage {
            name: name.into(),
            actions: actions.into_iter().collect(),
        });
        self
    }

    /// Check stage and artifact ordering.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(Error::InvalidPipeline(format!("{}: {}", self.id, msg)));

        if self.stages.len() < 2 {
            return invalid(format!(
                "a pipeline needs at least two stages, found {}",
                self.stages.len()
            ));
        }

        let mut stage_names = HashSet::new();
        // artifact name -> index of the producing stage
        let mut produced: HashMap<&str, usize> = HashMap::new();

        for (index, stage) in self.stages.iter().enumerate() {
            if !stage_names.insert(stage.name.as_str()) {
                return invalid(format!("duplicate stage name '{}'", stage.name));
            }
            if stage.actions.is_empty() {
                return invalid(format!("stage '{}' has no actions", stage.name));
            }

            let mut action_names = HashSet::new();
            for action in &stage.actions {
                if !action_names.insert(action.name()) {
                    return invalid(format!(
                        "duplicate action name '{}' in stage '{}'",
                        action.name(),
                        stage.name
                    ));
                }
                if index == 0 && !action.is_source() {
                    return invalid(format!(
                        "first stage '{}' may only contain source actions, found '{}'",
                        stage.name,
                        action.name()
                    ));
                }
                if index > 0 && action.is_source() {
                    return invalid(format!(
                        "source action '{}' must be in the first stage, found in '{}'",
                        action.name(),
                        stage.name
                    ));
                }
                if let Action::Source(source) = action {
                    if source.branch.trim().is_empty() {
                        return invalid(format!("source action '{}' has an empty branch", source.action_name));
                    }
                }
            }

            // Inputs are checked before this stage's outputs are registered,
            // so an artifact produced in the same stage does not count.
            for action in &stage.actions {
                for input in action.inputs() {
                    match produced.get(input.name()) {
                        Some(&producer) if producer < index => {}
                        _ => {
                            return invalid(format!(
                                "action '{}' in stage '{}' consumes artifact '{}' which no earlier stage produces",
                                action.name(),
                                stage.name,
                                input
                            ));
                        }
                    }
                }
            }

            for action in &stage.actions {
                for output in action.outputs() {
                    if produced.insert(output.name(), index).is_some() {
                        return invalid(format!("artifact '{}' is produced more than once", output));
                    }
                }
            }
        }

        Ok(())
    }

    fn properties(&self) -> Value {
        let mut props = serde_json::Map::new();
        props.insert(
            "ArtifactStore".to_string(),
            json!({ "Location": self.artifact_bucket.bucket_name(), "Type": "S3" }),
        );
        if let Some(name) = &self.pipeline_name {
            props.insert("Name".to_string(), json!(name));
        }
        props.insert("RoleArn".to_string(), self.role.arn().to_json());
        let stages: Vec<Value> = self.stages.iter().map(Stage::to_json).collect();
        props.insert("Stages".to_string(), Value::Array(stages));
        Value::Object(props)
    }
}

/// Reference to a declared pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineHandle {
    logical_id: LogicalId,
    pipeline_name: Option<String>,
    stages: Vec<Stage>,
    arn: Reference,
}

impl PipelineHandle {
    pub fn logical_id(&self) -> &LogicalId {
        &self.logical_id
    }

    pub fn pipeline_name(&self) -> Option<&str> {
        self.pipeline_name.as_deref()
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn arn(&self) -> &Reference {
        &self.arn
    }
}

impl Construct for Pipeline {
    type Handle = PipelineHandle;

    fn declare(self, stack: &mut Stack) -> Result<PipelineHandle> {
        self.validate()?;

        let role_id = self.role.logical_id().clone();
        let purpose = format!("pipeline {}", self.id);
        stack.require(Requirement::new(
            &role_id,
            purpose.clone(),
            ["s3:GetObject", "s3:PutObject"],
            self.artifact_bucket.arn_for_objects("*"),
        ));
        stack.require(Requirement::new(
            &role_id,
            purpose,
            ["s3:GetBucketAcl", "s3:GetBucketLocation"],
            self.artifact_bucket.arn(),
        ));
        for action in self.stages.iter().flat_map(|s| &s.actions) {
            for requirement in action.requirements(&role_id, &self.artifact_bucket) {
                stack.require(requirement);
            }
        }

        let entry = ResourceEntry::new("AWS::CodePipeline::Pipeline", self.properties());
        let path = ConstructPath::resource(&self.id);
        let logical_id = stack.add_resource(path.clone(), entry)?;
        // Permissions must be in place before the first execution starts.
        stack.depend_on_policies_of(&logical_id, &role_id);

        let arn = stack.format_arn("codepipeline", Reference::Ref(logical_id.clone()));
        let handle = PipelineHandle {
            logical_id,
            pipeline_name: self.pipeline_name,
            stages: self.stages,
            arn,
        };

        for action in handle.stages.iter().flat_map(|s| &s.actions) {
            if let Action::Source(source) = action {
                if source.trigger == SourceTrigger::Events {
                    declare_event_rule(stack, &path.scope(), &handle, source)?;
                }
            }
        }

        tracing::info!(
            pipeline = %handle.logical_id,
            stages = ?handle.stage_names(),
            "Declared pipeline"
        );
        Ok(handle)
    }
}

/// Start the pipeline on pushes to the source branch.
fn declare_event_rule(
    stack: &mut Stack,
    scope: &ConstructPath,
    pipeline: &PipelineHandle,
    source: &CodeCommitSourceAction,
) -> Result<()> {
    let events_role = stack.declare(
        Role::new(
            format!("{}EventsRole", source.action_name),
            ServicePrincipal::new(ServicePrincipal::EVENTS),
        )
        .with_scope(scope),
    )?;

    stack.add_to_principal_policy(
        &events_role,
        PolicyStatement::allow()
            .with_actions(["codepipeline:StartPipelineExecution"])
            .with_resource(pipeline.arn().clone()),
    )?;
    stack.require(Requirement::new(
        events_role.logical_id(),
        format!("event trigger for source action {}", source.action_name),
        ["codepipeline:StartPipelineExecution"],
        pipeline.arn().clone(),
    ));

    let rule = json!({
        "EventPattern": {
            "source": ["aws.codecommit"],
            "resources": [source.repository.arn()],
            "detail-type": ["CodeCommit Repository State Change"],
            "detail": {
                "event": ["referenceCreated", "referenceUpdated"],
                "referenceName": [source.branch],
            },
        },
        "State": "ENABLED",
        "Targets": [{
            "Arn": pipeline.arn(),
            "Id": "Target0",
            "RoleArn": events_role.arn(),
        }],
    });
    stack.add_resource(
        scope.child(&format!("{}EventRule", source.action_name)).child("Resource"),
        ResourceEntry::new("AWS::Events::Rule", rule),
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codebuild::{Project, S3Artifacts};
    use crate::codecommit::Repository;
    use crate::s3::Bucket;
    use crate::stack::{App, StackProps};

    struct Fixture {
        app: App,
        bucket: BucketHandle,
        repo: RepositoryHandle,
        project: ProjectHandle,
        role: RoleHandle,
    }

    fn fixture() -> Fixture {
        let mut app = App::new();
        let stack = app.new_stack("pipeline", StackProps::default()).unwrap();
        let bucket = stack.declare(Bucket::new("ArtifactBucket")).unwrap();
        let repo = stack.declare(Repository::new("Repo", "java-project")).unwrap();
        let build_role = stack
            .declare(Role::new("BuildRole", ServicePrincipal::new(ServicePrincipal::CODEBUILD)))
            .unwrap();
        let project = stack
            .declare(Project::new(
                "Project",
                &repo,
                S3Artifacts::new(&bucket, "artifact.zip"),
                &build_role,
            ))
            .unwrap();
        let role = stack
            .declare(Role::new("PipelineRole", ServicePrincipal::new(ServicePrincipal::CODEPIPELINE)))
            .unwrap();
        Fixture { app, bucket, repo, project, role }
    }

    fn two_stage(f: &Fixture, trigger: SourceTrigger) -> Pipeline {
        let source_output = Artifact::named("SourceCode");
        Pipeline::new("AppCodePipeline", &f.bucket, &f.role)
            .with_pipeline_name("AppCodePipeline")
            .add_stage(
                "Source",
                [CodeCommitSourceAction::new("Source", &f.repo, &source_output)
                    .with_trigger(trigger)
                    .into()],
            )
            .add_stage(
                "Build",
                [CodeBuildAction::new("Build", &f.project, &source_output).into()],
            )
    }

    #[test]
    fn test_two_stage_pipeline_properties() {
        let mut f = fixture();
        let pipeline = two_stage(&f, SourceTrigger::Poll);
        let stack = f.app.stack_mut("pipeline").unwrap();
        let handle = stack.declare(pipeline).unwrap();

        assert_eq!(handle.stage_names(), vec!["Source", "Build"]);
        let template = stack.synth().unwrap();
        let props = &template.resource(handle.logical_id()).unwrap().properties;
        assert_eq!(props["Name"], "AppCodePipeline");
        assert_eq!(props["ArtifactStore"]["Location"], f.bucket.bucket_name().to_json());

        let source = &props["Stages"][0]["Actions"][0];
        assert_eq!(source["ActionTypeId"]["Provider"], "CodeCommit");
        assert_eq!(source["Configuration"]["BranchName"], "master");
        assert_eq!(source["Configuration"]["PollForSourceChanges"], true);
        assert_eq!(source["OutputArtifacts"][0]["Name"], "SourceCode");

        let build = &props["Stages"][1]["Actions"][0];
        assert_eq!(build["ActionTypeId"]["Category"], "Build");
        assert_eq!(build["InputArtifacts"][0]["Name"], "SourceCode");
        assert_eq!(build["Configuration"]["ProjectName"], f.project.project_name().to_json());
        assert_eq!(template.resource_count("AWS::Events::Rule"), 0);
    }

    #[test]
    fn test_event_trigger_declares_rule_and_role() {
        let mut f = fixture();
        let pipeline = two_stage(&f, SourceTrigger::Events);
        let stack = f.app.stack_mut("pipeline").unwrap();
        let handle = stack.declare(pipeline).unwrap();

        let template = stack.synth().unwrap();
        let (_, rule) = template.only_resource_of_type("AWS::Events::Rule").unwrap();
        assert_eq!(rule.properties["EventPattern"]["detail"]["referenceName"][0], "master");
        assert_eq!(rule.properties["Targets"][0]["Arn"], handle.arn().to_json());
        assert_eq!(template.resource_count("AWS::IAM::Role"), 3);

        let (events_role, _) = template
            .resources_of_type("AWS::IAM::Role")
            .into_iter()
            .find(|(id, _)| id.as_str().starts_with("AppCodePipelineSourceEventsRole"))
            .unwrap();
        let report = stack.audit_authorization();
        assert!(report.gaps_for(events_role).is_empty());
    }

    #[test]
    fn test_pipeline_depends_on_attached_policies() {
        let mut f = fixture();
        let pipeline = two_stage(&f, SourceTrigger::None);
        let role = f.role.clone();
        let stack = f.app.stack_mut("pipeline").unwrap();
        let policy = f.bucket.grant_read_write(stack, &role).unwrap();
        let handle = stack.declare(pipeline).unwrap();

        let template = stack.synth().unwrap();
        assert_eq!(template.resource(handle.logical_id()).unwrap().depends_on, vec![policy]);
    }

    fn input_artifact_gaps(stack: &Stack, role: &RoleHandle) -> Vec<String> {
        stack
            .audit_authorization()
            .gaps_for(role.logical_id())
            .into_iter()
            .filter(|g| g.purpose.starts_with("input artifacts"))
            .map(|g| g.action.clone())
            .collect()
    }

    #[test]
    fn test_build_role_must_read_input_artifacts() {
        let mut f = fixture();
        let pipeline = two_stage(&f, SourceTrigger::None);
        let build_role = f.project.role().clone();
        let stack = f.app.stack_mut("pipeline").unwrap();
        stack.declare(pipeline).unwrap();

        assert_eq!(
            input_artifact_gaps(stack, &build_role),
            vec!["s3:GetObject", "s3:GetObjectVersion"]
        );

        f.bucket.grant_read_write(stack, &f.project).unwrap();
        assert!(input_artifact_gaps(stack, &build_role).is_empty());
    }

    #[test]
    fn test_pipeline_waits_for_later_grants() {
        let mut f = fixture();
        let pipeline = two_stage(&f, SourceTrigger::None);
        let role = f.role.clone();
        let stack = f.app.stack_mut("pipeline").unwrap();
        let handle = stack.declare(pipeline).unwrap();
        let late = f.bucket.grant_read_write(stack, &role).unwrap();

        let template = stack.synth().unwrap();
        assert_eq!(
            template.resource(handle.logical_id()).unwrap().depends_on,
            vec![late.clone()]
        );

        let order = stack.dependency_graph().unwrap().creation_order().unwrap();
        let position = |id: &LogicalId| order.iter().position(|o| o == id).unwrap();
        assert!(position(&late) < position(handle.logical_id()));
    }

    #[test]
    fn test_empty_branch_rejected() {
        let f = fixture();
        let source = Artifact::named("SourceCode");
        let pipeline = Pipeline::new("P", &f.bucket, &f.role)
            .add_stage(
                "Source",
                [CodeCommitSourceAction::new("Source", &f.repo, &source)
                    .with_branch("")
                    .into()],
            )
            .add_stage("Build", [CodeBuildAction::new("Build", &f.project, &source).into()]);
        let err = pipeline.validate().unwrap_err();
        assert!(matches!(err, Error::InvalidPipeline(_)));
        assert!(err.to_string().contains("empty branch"));
    }

    #[test]
    fn test_single_stage_rejected() {
        let f = fixture();
        let pipeline = Pipeline::new("P", &f.bucket, &f.role).add_stage(
            "Source",
            [CodeCommitSourceAction::new("Source", &f.repo, &Artifact::named("Out")).into()],
        );
        assert!(matches!(pipeline.validate(), Err(Error::InvalidPipeline(_))));
    }

    #[test]
    fn test_input_must_come_from_earlier_stage() {
        let f = fixture();
        let pipeline = Pipeline::new("P", &f.bucket, &f.role)
            .add_stage(
                "Source",
                [CodeCommitSourceAction::new("Source", &f.repo, &Artifact::named("SourceCode")).into()],
            )
            .add_stage(
                "Build",
                [CodeBuildAction::new("Build", &f.project, &Artifact::named("Missing")).into()],
            );
        let err = pipeline.validate().unwrap_err();
        assert!(err.to_string().contains("Missing"));
    }

    #[test]
    fn test_same_stage_artifact_not_visible() {
        let f = fixture();
        let compiled = Artifact::named("Compiled");
        let source = Artifact::named("SourceCode");
        let pipeline = Pipeline::new("P", &f.bucket, &f.role)
            .add_stage(
                "Source",
                [CodeCommitSourceAction::new("Source", &f.repo, &source).into()],
            )
            .add_stage(
                "Build",
                [
                    CodeBuildAction::new("Compile", &f.project, &source)
                        .with_output(&compiled)
                        .into(),
                    CodeBuildAction::new("Test", &f.project, &compiled).into(),
                ],
            );
        assert!(matches!(pipeline.validate(), Err(Error::InvalidPipeline(_))));
    }

    #[test]
    fn test_source_action_outside_first_stage_rejected() {
        let f = fixture();
        let pipeline = Pipeline::new("P", &f.bucket, &f.role)
            .add_stage(
                "Source",
                [CodeCommitSourceAction::new("Source", &f.repo, &Artifact::named("A")).into()],
            )
            .add_stage(
                "Again",
                [CodeCommitSourceAction::new("Source", &f.repo, &Artifact::named("B")).into()],
            );
        let err = pipeline.validate().unwrap_err();
        assert!(err.to_string().contains("first stage"));
    }

    #[test]
    fn test_duplicate_stage_names_rejected() {
        let f = fixture();
        let source = Artifact::named("SourceCode");
        let pipeline = Pipeline::new("P", &f.bucket, &f.role)
            .add_stage(
                "Source",
                [CodeCommitSourceAction::new("Source", &f.repo, &source).into()],
            )
            .add_stage("Build", [CodeBuildAction::new("Build", &f.project, &source).into()])
            .add_stage("Build", [CodeBuildAction::new("Build", &f.project, &source).into()]);
        let err = pipeline.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate stage"));
    }
}
