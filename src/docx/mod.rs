//! Docx merge machinery: template loading, placeholder merge engine and the
//! optional image embedding module.

pub mod engine;
pub mod images;
pub mod template;

pub use engine::MergeEngine;
pub use images::ImageModule;
pub use template::{TemplateArchive, TemplateStore};

use thiserror::Error;

/// Errors locating or parsing the packaged template.
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("Template file not found")]
    NotFound,
    #[error("failed to read template: {0}")]
    Io(#[source] std::io::Error),
    #[error("{0}")]
    Corrupted(#[source] zip::result::ZipError),
    #[error("{0}")]
    StructureInvalid(String),
}

/// One named render failure, e.g. an unclosed loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderIssue {
    pub name: String,
    pub message: String,
}

impl RenderIssue {
    pub fn new(name: &str, message: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            message: message.into(),
        }
    }
}

fn join_issues(issues: &[RenderIssue]) -> String {
    issues
        .iter()
        .map(|issue| format!("{}: {}", issue.name, issue.message))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors while merging data into the template.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("{}", join_issues(.0))]
    Failed(Vec<RenderIssue>),
    #[error("failed to assemble document archive: {0}")]
    Archive(#[from] zip::result::ZipError),
    #[error("failed to write document archive: {0}")]
    Io(#[from] std::io::Error),
}

/// Any failure of the load → merge pipeline, for the handler to map onto an
/// HTTP error response.
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error("failed to serialize merge data: {0}")]
    Data(#[from] serde_json::Error),
}

/// Result of a successful merge.
#[derive(Debug)]
pub struct GeneratedDocument {
    pub filename: String,
    pub docx: Vec<u8>,
}
