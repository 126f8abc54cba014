use thiserror::Error;

use crate::syntax::SyntaxKind;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("invalid JSON schema: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid YAML schema: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("function `{function}`: required parameter `{parameter}` follows an optional one")]
    RequiredAfterOptional { function: String, parameter: String },
    #[error("function `{function}`: duplicate parameter `{parameter}`")]
    DuplicateParameter { function: String, parameter: String },
}

/// Failure reported by a type declaration lookup hook.
#[derive(Debug, Error)]
#[error("type lookup for `{type_name}` failed: {message}")]
pub struct LookupError {
    pub type_name: String,
    pub message: String,
}

impl LookupError {
    pub fn new(type_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TreeError {
    #[error("{0} node(s) still open when finishing the tree")]
    Unclosed(usize),
    #[error("finish_node called without a matching start_node")]
    UnbalancedFinish,
    #[error("expected exactly one root node, found {0}")]
    RootCount(usize),
    #[error("root node must be `Expression`, found `{0:?}`")]
    RootKind(SyntaxKind),
    #[error("checkpoint is no longer valid")]
    StaleCheckpoint,
}
