use std::path::PathBuf;
use thiserror::Error;

/// Result type for graph loading, annotation and conversion
pub type Result<T> = std::result::Result<T, NodeLinkError>;

/// Errors that can occur while producing a node-link document
#[derive(Error, Debug)]
pub enum NodeLinkError {
    #[error("Did not understand format from filename {}", path.display())]
    UnrecognizedFormat { path: PathBuf },

    #[error("Unknown format tag: {0}")]
    UnknownFormatTag(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{format} syntax error on line {line}: {message}")]
    Syntax {
        format: &'static str,
        line: usize,
        message: String,
    },

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("XML attribute error: {0}")]
    XmlAttribute(#[from] quick_xml::events::attributes::AttrError),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Pickle error: {0}")]
    Pickle(#[from] serde_pickle::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid parameter: {message}")]
    InvalidParameter { message: String },

    #[error("Algorithm execution failed: {message}")]
    AlgorithmFailed { message: String },

    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("Cannot write {format}: {message}")]
    Unsupported {
        format: &'static str,
        message: String,
    },
}

impl NodeLinkError {
    pub fn invalid_parameter(message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            message: message.into(),
        }
    }

    pub fn algorithm_failed(message: impl Into<String>) -> Self {
        Self::AlgorithmFailed {
            message: message.into(),
        }
    }

    pub fn syntax(format: &'static str, line: usize, message: impl Into<String>) -> Self {
        Self::Syntax {
            format,
            line,
            message: message.into(),
        }
    }

    pub fn unsupported(format: &'static str, message: impl Into<String>) -> Self {
        Self::Unsupported {
            format,
            message: message.into(),
        }
    }
}
