//! KDL configuration parsing for pipestack.
//!
//! This crate handles parsing of:
//! - Stack definitions (pipestack.kdl)
//! - Variable interpolation

pub mod error;
pub mod stack;
pub mod variables;

pub use error::{ConfigError, ConfigResult};
pub use stack::{DEFAULT_CONFIG_FILE, DEFAULT_STACK_NAME, StackConfig, load_stack_config, parse_stack_config};
pub use variables::{AwsContext, StackContext, VariableContext, VariableContextBuilder};
