use thiserror::Error;

pub type TreeResult<T> = Result<T, TreeError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TreeError {
    #[error("Component '{id}' not found")]
    NotFound { id: String },

    #[error("Duplicate id '{id}': component ids must be unique within the document")]
    DuplicateId { id: String },

    #[error("Component id must be a non-empty string")]
    EmptyId,

    #[error("Invalid geometry for component '{id}': {reason}")]
    InvalidGeometry { id: String, reason: String },

    #[error("Invalid value for '{key}' on component '{id}': {reason}")]
    InvalidValue {
        id: String,
        key: String,
        reason: String,
    },

    #[error("Maximum nesting depth ({max_depth}) exceeded")]
    MaxNestingDepthExceeded { max_depth: usize },

    #[error("Cannot move component '{id}' into its own subtree (target parent '{parent}')")]
    CycleDetected { id: String, parent: String },

    #[error("Unknown resize direction '{0}'. Expected one of: n, s, e, w, ne, nw, se, sw")]
    UnknownDirection(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for TreeError {
    fn from(err: serde_json::Error) -> Self {
        TreeError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for TreeError {
    fn from(err: serde_yaml::Error) -> Self {
        TreeError::Serialization(err.to_string())
    }
}
