//! # restyle
//!
//! Byte-stable style reassignment and style import for Word documents.
//!
//! A target `.docx` is restyled against an "architect" document: the styles
//! a classifier's roles map to are imported from the architect, each
//! classified paragraph's style reference is rewritten, and everything else
//! in the package is carried over byte for byte.
//!
//! ## Quick Start
//!
//! ```no_run
//! use restyle::{restyle_file, AuditLog};
//!
//! let mut log = AuditLog::new();
//! let report = restyle_file(
//!     "target.docx",
//!     "architect.docx",
//!     "registry.json",
//!     "classifications.json",
//!     "restyled.docx",
//!     &mut log,
//! )?;
//! println!("Imported styles: {:?}", report.imported_styles);
//! print!("{}", log.render());
//! # Ok::<(), restyle::Error>(())
//! ```
//!
//! ## Lower-level APIs
//!
//! ```no_run
//! use restyle::docx::{import_styles, StyleSheet};
//! use restyle::AuditLog;
//!
//! let target = std::fs::read_to_string("styles.xml")?;
//! let architect = std::fs::read_to_string("architect-styles.xml")?;
//! let mut log = AuditLog::new();
//! let import = import_styles(&target, &architect, &["CSI-Part".to_string()], &mut log)?;
//! let sheet = StyleSheet::parse(&import.xml)?;
//! assert!(sheet.contains("CSI-Part"));
//! # Ok::<(), restyle::Error>(())
//! ```

pub mod audit;
pub mod container;
pub mod detect;
pub mod docx;
pub mod error;
pub mod guard;
pub mod patch;
pub mod pipeline;
pub mod registry;

// Re-exports
pub use audit::{AuditEvent, AuditLog, Severity, Stage};
pub use container::{OoxmlContainer, Relationship, Relationships};
pub use detect::{detect_format, detect_format_from_bytes, detect_format_from_path, WordFormat};
pub use error::{Error, Result};
pub use pipeline::{list_paragraphs, ParagraphSummary, RestyleOptions, RestyleReport, Restyler};
pub use registry::{Classification, ClassificationSet, Preflight, Role, RoleRegistry};

use std::path::Path;

/// Restyle a document with default options, loading the registry and the
/// classifications from JSON files.
pub fn restyle_file(
    target: impl AsRef<Path>,
    architect: impl AsRef<Path>,
    registry: impl AsRef<Path>,
    classifications: impl AsRef<Path>,
    output: impl AsRef<Path>,
    log: &mut AuditLog,
) -> Result<RestyleReport> {
    restyle_file_with_options(
        target,
        architect,
        registry,
        classifications,
        output,
        &RestyleOptions::default(),
        log,
    )
}

/// Restyle a document with explicit options.
pub fn restyle_file_with_options(
    target: impl AsRef<Path>,
    architect: impl AsRef<Path>,
    registry: impl AsRef<Path>,
    classifications: impl AsRef<Path>,
    output: impl AsRef<Path>,
    options: &RestyleOptions,
    log: &mut AuditLog,
) -> Result<RestyleReport> {
    let registry = RoleRegistry::load(registry)?;
    let classifications = ClassificationSet::load(classifications)?;
    Restyler::new(registry, classifications)
        .with_options(options.clone())
        .run(target, architect, output, log)
}

/// Compute the preflight report for a target without modifying anything.
pub fn preflight_file(
    target: impl AsRef<Path>,
    registry: impl AsRef<Path>,
    classifications: impl AsRef<Path>,
) -> Result<Preflight> {
    let registry = RoleRegistry::load(registry)?;
    let classifications = ClassificationSet::load(classifications)?;
    let target = OoxmlContainer::open(target)?;
    Restyler::new(registry, classifications).preflight(&target)
}
