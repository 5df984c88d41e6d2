//! Core declaration and synthesis library for pipestack.
//!
//! This crate contains:
//! - Construct paths, logical ids and typed references
//! - Stacks, the app, and template synthesis
//! - IAM roles, policies and the authorization audit
//! - Bucket, repository, build project and pipeline constructs
//! - The resource dependency graph and directory assets
//! - The delivery pipeline stack and its execution model

pub mod asset;
pub mod authz;
pub mod codebuild;
pub mod codecommit;
pub mod codepipeline;
pub mod delivery;
pub mod error;
pub mod execution;
pub mod graph;
pub mod iam;
pub mod id;
pub mod reference;
pub mod s3;
pub mod stack;
pub mod template;

pub use authz::AuthorizationReport;
pub use delivery::{DeliveryPipelineSettings, DeliveryPipelineStack};
pub use error::{Error, Result};
pub use id::{ConstructPath, LogicalId};
pub use reference::Reference;
pub use stack::{App, CloudAssembly, Construct, Environment, RemovalPolicy, Stack, StackProps};
pub use template::Template;
