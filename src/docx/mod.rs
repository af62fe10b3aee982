//! WordprocessingML editing.
//!
//! Every module here works on raw part text and edits it by byte region,
//! so bytes outside an edited element survive a round trip exactly.

pub mod applier;
pub mod environment;
pub mod importer;
pub mod numbering;
pub mod regions;
pub mod schema;
pub mod styles;

pub use applier::{apply_classifications, Application, ParagraphOutcome, SkipReason};
pub use environment::{
    apply_environment, ArchitectEnvironment, EnvironmentChanges, EnvironmentOptions,
    TargetEnvironment,
};
pub use importer::{import_styles, StyleImport};
pub use numbering::{import_numbering, NumberingFont, NumberingImport, NumberingOptions};
pub use regions::{paragraph_blocks, ParagraphBlock, Region};
pub use styles::{StyleDefinition, StyleKind, StyleSheet};

/// Main document part.
pub const DOCUMENT: &str = "word/document.xml";
/// Style definitions part.
pub const STYLES: &str = "word/styles.xml";
/// Numbering definitions part.
pub const NUMBERING: &str = "word/numbering.xml";
/// Document settings part.
pub const SETTINGS: &str = "word/settings.xml";
/// Font table part.
pub const FONT_TABLE: &str = "word/fontTable.xml";
/// Primary theme part.
pub const THEME: &str = "word/theme/theme1.xml";
/// Package content types.
pub const CONTENT_TYPES: &str = "[Content_Types].xml";
/// Relationships of the main document part.
pub const DOCUMENT_RELS: &str = "word/_rels/document.xml.rels";
