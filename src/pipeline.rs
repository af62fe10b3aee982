//! End-to-end restyle of a target package against an architect package.
//!
//! ```no_run
//! use restyle::audit::AuditLog;
//! use restyle::pipeline::{RestyleOptions, Restyler};
//! use restyle::registry::{ClassificationSet, RoleRegistry};
//!
//! let registry = RoleRegistry::load("registry.json")?;
//! let classifications = ClassificationSet::load("classifications.json")?;
//! let restyler = Restyler::new(registry, classifications)
//!     .with_options(RestyleOptions::default().with_theme(false));
//!
//! let mut log = AuditLog::new();
//! let report = restyler.run("target.docx", "architect.docx", "out.docx", &mut log)?;
//! println!("{} paragraph(s) processed", report.outcomes.len());
//! # Ok::<(), restyle::Error>(())
//! ```

use crate::audit::{AuditLog, Stage};
use crate::container::OoxmlContainer;
use crate::detect::detect_format;
use crate::docx::applier::{apply_classifications, ParagraphOutcome};
use crate::docx::environment::{
    apply_environment, ArchitectEnvironment, EnvironmentChanges, EnvironmentOptions,
    TargetEnvironment,
};
use crate::docx::importer::import_styles;
use crate::docx::regions::paragraph_blocks;
use crate::docx::styles::StyleSheet;
use crate::docx::{CONTENT_TYPES, DOCUMENT, DOCUMENT_RELS, FONT_TABLE, SETTINGS, STYLES, THEME};
use crate::error::{Error, Result};
use crate::guard::{run_properties_unchanged, PartSource, StabilitySnapshot};
use crate::patch::{patch_file, PatchReport};
use crate::registry::{validate, ClassificationSet, Preflight, RoleRegistry};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// Options for a restyle run.
#[derive(Debug, Clone)]
pub struct RestyleOptions {
    /// Environment steps to run before style import
    pub environment: EnvironmentOptions,

    /// Import the styles the classification roles need from the architect
    pub import_styles: bool,

    /// Enforce that run properties other than fonts and sizes are untouched
    pub check_run_properties: bool,
}

impl Default for RestyleOptions {
    fn default() -> Self {
        Self {
            environment: EnvironmentOptions::default(),
            import_styles: true,
            check_run_properties: true,
        }
    }
}

impl RestyleOptions {
    /// Create new options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy the architect theme.
    pub fn with_theme(mut self, enabled: bool) -> Self {
        self.environment.theme = enabled;
        self
    }

    /// Copy the architect compat settings.
    pub fn with_settings(mut self, enabled: bool) -> Self {
        self.environment.settings = enabled;
        self
    }

    /// Merge the architect font declarations.
    pub fn with_font_table(mut self, enabled: bool) -> Self {
        self.environment.font_table = enabled;
        self
    }

    /// Copy the architect document defaults.
    pub fn with_doc_defaults(mut self, enabled: bool) -> Self {
        self.environment.doc_defaults = enabled;
        self
    }

    /// Replace all environment switches at once.
    pub fn with_environment(mut self, environment: EnvironmentOptions) -> Self {
        self.environment = environment;
        self
    }

    /// Import required styles from the architect.
    pub fn with_style_import(mut self, enabled: bool) -> Self {
        self.import_styles = enabled;
        self
    }

    /// Enforce the run-property stability check.
    pub fn with_run_property_check(mut self, enabled: bool) -> Self {
        self.check_run_properties = enabled;
        self
    }
}

/// Summary of a restyle run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RestyleReport {
    pub preflight: Preflight,
    pub environment: EnvironmentChanges,
    pub imported_styles: Vec<String>,
    pub already_present_styles: Vec<String>,
    pub stripped_numbering: Vec<String>,
    pub outcomes: Vec<ParagraphOutcome>,
    /// Parts whose content differs from the target
    pub changed_parts: Vec<String>,
    /// Set once the output archive has been written
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patch: Option<PatchReport>,
}

/// In-memory result of a restyle: the parts to write and the report.
#[derive(Debug, Clone)]
pub struct Restyled {
    pub replacements: BTreeMap<String, Vec<u8>>,
    pub report: RestyleReport,
}

/// A package with some parts replaced in memory.
pub struct PackageOverlay<'a> {
    base: &'a OoxmlContainer,
    parts: BTreeMap<String, String>,
}

impl<'a> PackageOverlay<'a> {
    pub fn new(base: &'a OoxmlContainer) -> Self {
        Self {
            base,
            parts: BTreeMap::new(),
        }
    }

    /// Overlay `text` as the content of `name`.
    pub fn set(&mut self, name: &str, text: impl Into<String>) {
        self.parts.insert(name.to_string(), text.into());
    }

    /// Overlay `after` when it exists and differs from `before`.
    pub fn set_if_changed(&mut self, name: &str, before: Option<&str>, after: Option<&str>) {
        if let Some(after) = after {
            if before != Some(after) {
                self.set(name, after);
            }
        }
    }

    /// Names of overlaid parts.
    pub fn overlaid(&self) -> Vec<String> {
        self.parts.keys().cloned().collect()
    }

    /// The overlaid parts as patch replacements.
    pub fn into_replacements(self) -> BTreeMap<String, Vec<u8>> {
        self.parts
            .into_iter()
            .map(|(name, text)| (name, text.into_bytes()))
            .collect()
    }
}

impl PartSource for PackageOverlay<'_> {
    fn part_names(&self) -> Vec<String> {
        let names: BTreeSet<String> = self
            .base
            .list_files()
            .into_iter()
            .chain(self.parts.keys().cloned())
            .collect();
        names.into_iter().collect()
    }

    fn part_bytes(&self, name: &str) -> Result<Option<Vec<u8>>> {
        match self.parts.get(name) {
            Some(text) => Ok(Some(text.as_bytes().to_vec())),
            None => self.base.part_bytes(name),
        }
    }
}

fn optional_xml(container: &OoxmlContainer, path: &str) -> Result<Option<String>> {
    if container.exists(path) {
        Ok(Some(container.read_xml(path)?))
    } else {
        Ok(None)
    }
}

/// One paragraph as seen by a classifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParagraphSummary {
    pub index: usize,
    pub style_id: Option<String>,
    pub num_id: Option<String>,
    pub level: Option<String>,
    pub has_section_properties: bool,
    pub text: String,
}

/// List the body paragraphs of a package in classification index order.
pub fn list_paragraphs(target: &OoxmlContainer) -> Result<Vec<ParagraphSummary>> {
    let document = target.read_xml(DOCUMENT)?;
    paragraph_blocks(&document)?
        .iter()
        .map(|block| -> Result<ParagraphSummary> {
            let numbering = block.numbering()?;
            Ok(ParagraphSummary {
                index: block.index,
                style_id: block.style_id()?,
                num_id: numbering.as_ref().and_then(|n| n.num_id.clone()),
                level: numbering.and_then(|n| n.level),
                has_section_properties: block.has_section_properties()?,
                text: block.visible_text(),
            })
        })
        .collect()
}

/// Restyles target packages from a registry and a classification batch.
#[derive(Debug, Clone)]
pub struct Restyler {
    registry: RoleRegistry,
    classifications: ClassificationSet,
    options: RestyleOptions,
}

impl Restyler {
    pub fn new(registry: RoleRegistry, classifications: ClassificationSet) -> Self {
        Self {
            registry,
            classifications,
            options: RestyleOptions::default(),
        }
    }

    /// Set run options.
    pub fn with_options(mut self, options: RestyleOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &RestyleOptions {
        &self.options
    }

    /// Compute the preflight report for `target` without changing anything.
    pub fn preflight(&self, target: &OoxmlContainer) -> Result<Preflight> {
        detect_format(target)?;
        let document = target.read_xml(DOCUMENT)?;
        let count = paragraph_blocks(&document)?.len();
        Ok(Preflight::compute(&self.registry, &self.classifications, count))
    }

    /// Run every stage in memory and return the parts to write.
    ///
    /// Nothing is written; on error no partial result exists.
    pub fn restyle(
        &self,
        target: &OoxmlContainer,
        architect: &OoxmlContainer,
        log: &mut AuditLog,
    ) -> Result<Restyled> {
        let target_format = detect_format(target)?;
        let architect_format = detect_format(architect)?;
        log.info(
            Stage::Preflight,
            format!("Target is a {}, architect is a {}", target_format, architect_format),
        );

        // Preflight: nothing below runs unless the whole batch is valid.
        let document = target.read_part_text(DOCUMENT)?;
        let paragraph_count = paragraph_blocks(&document)?.len();
        let preflight = Preflight::compute(&self.registry, &self.classifications, paragraph_count);
        log.info(
            Stage::Preflight,
            format!(
                "{} classification(s) over {} paragraph(s)",
                self.classifications.classifications.len(),
                paragraph_count
            ),
        );
        for role in &preflight.unmapped_roles {
            log.warn(Stage::Preflight, format!("Role {} has no registry mapping", role));
        }
        validate(&self.registry, &self.classifications.classifications, paragraph_count)?;

        let original = TargetEnvironment {
            theme: target.read_optional_part_text(THEME)?,
            settings: target.read_optional_part_text(SETTINGS)?,
            font_table: target.read_optional_part_text(FONT_TABLE)?,
            styles: target.read_part_text(STYLES)?,
            content_types: target.read_part_text(CONTENT_TYPES)?,
            document_rels: target.read_part_text(DOCUMENT_RELS)?,
        };
        let architect_styles = architect.read_xml(STYLES)?;
        let mut current = original.clone();

        let environment = if self.options.environment.any() {
            let source = ArchitectEnvironment {
                theme: optional_xml(architect, THEME)?,
                settings: optional_xml(architect, SETTINGS)?,
                font_table: optional_xml(architect, FONT_TABLE)?,
                styles: Some(architect_styles.clone()),
            };
            apply_environment(&source, &mut current, &self.options.environment, log)?
        } else {
            log.info(Stage::Environment, "All environment steps disabled");
            EnvironmentChanges::default()
        };

        let required = self.classifications.required_styles(&self.registry);
        let mut report = RestyleReport {
            preflight,
            environment,
            ..Default::default()
        };
        if self.options.import_styles {
            let import = import_styles(&current.styles, &architect_styles, &required, log)?;
            report.imported_styles = import.imported;
            report.already_present_styles = import.already_present;
            report.stripped_numbering = import.stripped_numbering;
            current.styles = import.xml;
        } else {
            let sheet = StyleSheet::parse(&current.styles)?;
            let missing: Vec<String> = required
                .into_iter()
                .filter(|id| !sheet.contains(id))
                .collect();
            if !missing.is_empty() {
                return Err(Error::MissingStyles(missing));
            }
            log.info(Stage::StyleImport, "Style import disabled; all required styles present");
        }

        let mut overlay = PackageOverlay::new(target);
        overlay.set_if_changed(THEME, original.theme.as_deref(), current.theme.as_deref());
        overlay.set_if_changed(SETTINGS, original.settings.as_deref(), current.settings.as_deref());
        overlay.set_if_changed(
            FONT_TABLE,
            original.font_table.as_deref(),
            current.font_table.as_deref(),
        );
        overlay.set_if_changed(STYLES, Some(original.styles.as_str()), Some(current.styles.as_str()));
        overlay.set_if_changed(
            CONTENT_TYPES,
            Some(original.content_types.as_str()),
            Some(current.content_types.as_str()),
        );
        overlay.set_if_changed(
            DOCUMENT_RELS,
            Some(original.document_rels.as_str()),
            Some(current.document_rels.as_str()),
        );

        let snapshot = StabilitySnapshot::capture(&overlay)?;

        let sheet = StyleSheet::parse(&current.styles)?;
        let application = apply_classifications(
            &document,
            &sheet,
            &self.registry,
            &self.classifications.classifications,
            log,
        )?;

        snapshot.verify(&overlay_with_document(&overlay, &application.document))?;
        if self.options.check_run_properties {
            run_properties_unchanged(&document, &application.document)?;
        }
        log.info(Stage::Verify, "Headers, footers, sections and relationships unchanged");

        overlay.set_if_changed(DOCUMENT, Some(document.as_str()), Some(application.document.as_str()));
        report.outcomes = application.outcomes;
        report.changed_parts = overlay.overlaid();

        Ok(Restyled {
            replacements: overlay.into_replacements(),
            report,
        })
    }

    /// Restyle `target_path` into `output_path`.
    ///
    /// The output file only appears if every stage succeeded; the input is
    /// never written.
    pub fn run(
        &self,
        target_path: impl AsRef<Path>,
        architect_path: impl AsRef<Path>,
        output_path: impl AsRef<Path>,
        log: &mut AuditLog,
    ) -> Result<RestyleReport> {
        let target_path = target_path.as_ref();
        let output_path = output_path.as_ref();
        if output_path.exists()
            && std::fs::canonicalize(output_path)? == std::fs::canonicalize(target_path)?
        {
            return Err(Error::InvalidData(
                "output path must differ from the target path".to_string(),
            ));
        }

        let target = OoxmlContainer::open(target_path)?;
        let architect = OoxmlContainer::open(architect_path.as_ref())?;
        let Restyled {
            replacements,
            mut report,
        } = self.restyle(&target, &architect, log)?;

        let patch = patch_file(target_path, output_path, &replacements)?;
        log.info(
            Stage::Patch,
            format!(
                "Wrote {} ({} part(s) replaced, {} added)",
                output_path.display(),
                patch.replaced.len(),
                patch.added.len()
            ),
        );
        report.patch = Some(patch);
        Ok(report)
    }
}

/// A view of `overlay` with the document part replaced.
fn overlay_with_document<'a>(overlay: &PackageOverlay<'a>, document: &str) -> PackageOverlay<'a> {
    let mut view = PackageOverlay {
        base: overlay.base,
        parts: overlay.parts.clone(),
    };
    view.set(DOCUMENT, document);
    view
}
