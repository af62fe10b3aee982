//! Error types for the restyle library.

use std::io;
use thiserror::Error;

/// Result type alias for restyle operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while restyling a document.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The file is not a recognizable Word document.
    #[error("Unknown file format")]
    UnknownFormat,

    /// Error reading or writing a ZIP archive.
    #[error("ZIP archive error: {0}")]
    ZipArchive(String),

    /// Error tokenizing XML content.
    #[error("XML parse error: {0}")]
    XmlParse(String),

    /// Error reading JSON input.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid or malformed data in a part.
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// A required part or input file is missing.
    #[error("Missing component: {0}")]
    MissingComponent(String),

    /// The role registry is unusable.
    #[error("Role registry error: {0}")]
    Registry(String),

    /// A registry entry names a role outside the known vocabulary.
    #[error("Unknown role in registry: {0}")]
    UnknownRole(String),

    /// A classification references a role with no registry mapping.
    #[error("Role '{role}' at paragraph {index} has no style mapping in the registry")]
    UnmappedRole { role: String, index: usize },

    /// A classification references a paragraph that does not exist.
    #[error("Paragraph index {index} out of range (document has {count} paragraphs)")]
    ParagraphOutOfRange { index: usize, count: usize },

    /// The same paragraph was classified more than once.
    #[error("Paragraph {0} is classified more than once")]
    DuplicateClassification(usize),

    /// Styles required by an import are absent from the source style sheet.
    #[error("Source style sheet is missing required styles: {}", .0.join(", "))]
    MissingStyles(Vec<String>),

    /// A structural region changed between snapshot and verification.
    #[error("Stability check failed; changed: {}", .changed.join(", "))]
    StabilityViolation { changed: Vec<String> },

    /// A paragraph changed outside the permitted fields.
    #[error("Paragraph {index} changed outside allowed edits (pStyle/numPr):\n{diff}")]
    ContractViolation { index: usize, diff: String },

    /// A replacement path is not on the patch allow-list.
    #[error("Illegal patch target: {path} (allowed: {})", .allowed.join(", "))]
    IllegalPatchTarget { path: String, allowed: Vec<String> },

    /// A replacement path is explicitly forbidden.
    #[error("Forbidden patch target: {0}")]
    ForbiddenPatchTarget(String),
}

impl From<zip::result::ZipError> for Error {
    fn from(err: zip::result::ZipError) -> Self {
        Error::ZipArchive(err.to_string())
    }
}

impl From<quick_xml::Error> for Error {
    fn from(err: quick_xml::Error) -> Self {
        Error::XmlParse(err.to_string())
    }
}

impl Error {
    /// Whether this error is an invariant violation detected after mutation.
    pub fn is_invariant_violation(&self) -> bool {
        matches!(
            self,
            Error::StabilityViolation { .. } | Error::ContractViolation { .. }
        )
    }
}
