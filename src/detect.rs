//! Word package detection.
//!
//! Both inputs of a restyle must be WordprocessingML packages. An architect
//! is often a template (`.dotx`), so every Word main-part flavor is
//! accepted.

use crate::container::{decode_xml_bytes, OoxmlContainer};
use crate::docx::{CONTENT_TYPES, DOCUMENT};
use crate::error::{Error, Result};
use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;

/// ZIP file magic bytes: PK\x03\x04
const ZIP_MAGIC: [u8; 4] = [0x50, 0x4B, 0x03, 0x04];

const DOCUMENT_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml";
const TEMPLATE_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.template.main+xml";
const MACRO_DOCUMENT_CONTENT_TYPE: &str = "application/vnd.ms-word.document.macroEnabled.main+xml";
const MACRO_TEMPLATE_CONTENT_TYPE: &str =
    "application/vnd.ms-word.template.macroEnabledTemplate.main+xml";

/// Flavor of a Word package, from its main part content type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WordFormat {
    /// Document (.docx)
    Document,
    /// Template (.dotx)
    Template,
    /// Macro-enabled document (.docm)
    MacroEnabledDocument,
    /// Macro-enabled template (.dotm)
    MacroEnabledTemplate,
}

impl WordFormat {
    /// Returns the file extension for this format.
    pub fn extension(&self) -> &'static str {
        match self {
            WordFormat::Document => "docx",
            WordFormat::Template => "dotx",
            WordFormat::MacroEnabledDocument => "docm",
            WordFormat::MacroEnabledTemplate => "dotm",
        }
    }

    /// Returns a human-readable name for this format.
    pub fn name(&self) -> &'static str {
        match self {
            WordFormat::Document => "Word Document",
            WordFormat::Template => "Word Template",
            WordFormat::MacroEnabledDocument => "Word Macro-Enabled Document",
            WordFormat::MacroEnabledTemplate => "Word Macro-Enabled Template",
        }
    }
}

impl std::fmt::Display for WordFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

fn classify(content_types: &str, has_document: bool) -> Result<WordFormat> {
    if content_types.contains(MACRO_TEMPLATE_CONTENT_TYPE) {
        Ok(WordFormat::MacroEnabledTemplate)
    } else if content_types.contains(MACRO_DOCUMENT_CONTENT_TYPE) {
        Ok(WordFormat::MacroEnabledDocument)
    } else if content_types.contains(TEMPLATE_CONTENT_TYPE) {
        Ok(WordFormat::Template)
    } else if content_types.contains(DOCUMENT_CONTENT_TYPE) || has_document {
        Ok(WordFormat::Document)
    } else {
        Err(Error::UnknownFormat)
    }
}

/// Detect the Word format of a file.
///
/// # Example
///
/// ```no_run
/// use restyle::detect::detect_format_from_path;
///
/// let format = detect_format_from_path("document.docx")?;
/// println!("Detected format: {}", format);
/// # Ok::<(), restyle::Error>(())
/// ```
pub fn detect_format_from_path(path: impl AsRef<Path>) -> Result<WordFormat> {
    let file = File::open(path.as_ref())?;
    let mut reader = BufReader::new(file);
    let mut magic = [0u8; 4];
    if reader.read_exact(&mut magic).is_err() || magic != ZIP_MAGIC {
        return Err(Error::UnknownFormat);
    }
    reader.rewind()?;
    detect_format_from_reader(reader)
}

/// Detect the Word format of in-memory package bytes.
pub fn detect_format_from_bytes(data: &[u8]) -> Result<WordFormat> {
    if !is_zip_file(data) {
        return Err(Error::UnknownFormat);
    }
    detect_format_from_reader(std::io::Cursor::new(data))
}

/// Detect the Word format of a package read from `reader`.
pub fn detect_format_from_reader<R: Read + Seek>(reader: R) -> Result<WordFormat> {
    let mut archive = zip::ZipArchive::new(reader)?;

    let content_types = match archive.by_name(CONTENT_TYPES) {
        Ok(mut file) => {
            let mut bytes = Vec::new();
            file.read_to_end(&mut bytes)?;
            decode_xml_bytes(&bytes)?
        }
        Err(_) => return Err(Error::MissingComponent(CONTENT_TYPES.to_string())),
    };

    let has_document = archive.file_names().any(|n| n == DOCUMENT);
    classify(&content_types, has_document)
}

/// Detect the Word format of an opened package.
pub fn detect_format(container: &OoxmlContainer) -> Result<WordFormat> {
    if !container.exists(CONTENT_TYPES) {
        return Err(Error::MissingComponent(CONTENT_TYPES.to_string()));
    }
    let content_types = container.read_xml(CONTENT_TYPES)?;
    classify(&content_types, container.exists(DOCUMENT))
}

/// Check if data starts with ZIP magic bytes.
pub fn is_zip_file(data: &[u8]) -> bool {
    data.len() >= 4 && data[..4] == ZIP_MAGIC
}
