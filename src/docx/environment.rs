//! Formatting environment transfer: theme, compatibility settings, font
//! declarations and document defaults.
//!
//! Imported styles render as intended only when the target shares the
//! architect's theme fonts, compat flags and defaults. Each step rewrites
//! one part and can be switched off on its own.

use super::regions::{attribute, find_element, find_elements, open_tag, splice};
use super::{CONTENT_TYPES, DOCUMENT, FONT_TABLE, THEME};
use crate::audit::{AuditLog, Stage};
use crate::container::{OoxmlContainer, Relationships};
use crate::error::{Error, Result};
use serde::Serialize;
use std::collections::HashSet;

const THEME_CONTENT_TYPE: &str = "application/vnd.openxmlformats-officedocument.theme+xml";
const THEME_RELATIONSHIP: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/theme";
const FONT_TABLE_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.fontTable+xml";
const FONT_TABLE_RELATIONSHIP: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/fontTable";

/// Which environment steps to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvironmentOptions {
    pub theme: bool,
    pub settings: bool,
    pub font_table: bool,
    pub doc_defaults: bool,
}

impl Default for EnvironmentOptions {
    fn default() -> Self {
        Self {
            theme: true,
            settings: true,
            font_table: true,
            doc_defaults: true,
        }
    }
}

impl EnvironmentOptions {
    /// All steps disabled.
    pub fn none() -> Self {
        Self {
            theme: false,
            settings: false,
            font_table: false,
            doc_defaults: false,
        }
    }

    /// Whether any step is enabled.
    pub fn any(&self) -> bool {
        self.theme || self.settings || self.font_table || self.doc_defaults
    }
}

/// Environment parts read from the architect package.
#[derive(Debug, Clone, Default)]
pub struct ArchitectEnvironment {
    pub theme: Option<String>,
    pub settings: Option<String>,
    pub font_table: Option<String>,
    pub styles: Option<String>,
}

/// Environment parts of the target package, rewritten in place.
#[derive(Debug, Clone, Default)]
pub struct TargetEnvironment {
    pub theme: Option<String>,
    pub settings: Option<String>,
    pub font_table: Option<String>,
    pub styles: String,
    pub content_types: String,
    pub document_rels: String,
}

/// Parts changed by [`apply_environment`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EnvironmentChanges {
    pub theme: bool,
    pub settings: bool,
    pub font_table: bool,
    pub styles: bool,
    pub content_types: bool,
    pub document_rels: bool,
}

impl EnvironmentChanges {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Run the enabled environment steps in order: theme, settings, font
/// table, document defaults.
pub fn apply_environment(
    architect: &ArchitectEnvironment,
    target: &mut TargetEnvironment,
    options: &EnvironmentOptions,
    log: &mut AuditLog,
) -> Result<EnvironmentChanges> {
    let mut changes = EnvironmentChanges::default();

    if options.theme {
        match architect.theme.as_deref() {
            None => log.info(Stage::Environment, "No theme in architect; skipping theme"),
            Some(theme) if target.theme.as_deref() == Some(theme) => {
                log.info(Stage::Environment, "Target theme already matches architect")
            }
            Some(theme) => {
                if target.theme.is_some() {
                    log.info(Stage::Environment, "Replaced target theme with architect theme");
                } else {
                    log.info(Stage::Environment, "Added theme from architect (none existed)");
                    register_part(target, &mut changes, THEME, THEME_CONTENT_TYPE, THEME_RELATIONSHIP, log)?;
                }
                target.theme = Some(theme.to_string());
                changes.theme = true;
            }
        }
    }

    if options.settings {
        match (architect.settings.as_deref(), target.settings.as_deref()) {
            (None, _) => log.info(Stage::Environment, "No settings in architect; skipping compat"),
            (_, None) => log.warn(Stage::Environment, "Target has no settings part; skipping compat"),
            (Some(source), Some(current)) => {
                if let Some(updated) = apply_compat(source, current, log)? {
                    target.settings = Some(updated);
                    changes.settings = true;
                }
            }
        }
    }

    if options.font_table {
        match architect.font_table.as_deref() {
            None => log.info(Stage::Environment, "No font table in architect; skipping fonts"),
            Some(source) => match target.font_table.as_deref() {
                Some(current) => {
                    if let Some(updated) = merge_font_table(source, current, log)? {
                        target.font_table = Some(updated);
                        changes.font_table = true;
                    }
                }
                None => {
                    log.info(Stage::Environment, "Added font table from architect (none existed)");
                    register_part(
                        target,
                        &mut changes,
                        FONT_TABLE,
                        FONT_TABLE_CONTENT_TYPE,
                        FONT_TABLE_RELATIONSHIP,
                        log,
                    )?;
                    target.font_table = Some(source.to_string());
                    changes.font_table = true;
                }
            },
        }
    }

    if options.doc_defaults {
        match architect.styles.as_deref() {
            None => log.info(Stage::Environment, "No architect styles; skipping docDefaults"),
            Some(source) => {
                if let Some(updated) = apply_doc_defaults(source, &target.styles, log)? {
                    target.styles = updated;
                    changes.styles = true;
                }
            }
        }
    }

    Ok(changes)
}

fn register_part(
    target: &mut TargetEnvironment,
    changes: &mut EnvironmentChanges,
    part: &str,
    content_type: &str,
    rel_type: &str,
    log: &mut AuditLog,
) -> Result<()> {
    if let Some(updated) = ensure_override(&target.content_types, part, content_type)? {
        log.info(Stage::Environment, format!("Added {} to {}", part, CONTENT_TYPES));
        target.content_types = updated;
        changes.content_types = true;
    }
    if let Some((updated, id)) = ensure_relationship(&target.document_rels, part, rel_type)? {
        log.info(Stage::Environment, format!("Added relationship {} for {}", id, part));
        target.document_rels = updated;
        changes.document_rels = true;
    }
    Ok(())
}

/// Add an `Override` for `part` to `[Content_Types].xml` unless one exists.
pub fn ensure_override(content_types: &str, part: &str, content_type: &str) -> Result<Option<String>> {
    let part_name = format!("/{}", part);
    for region in find_elements(content_types, "Override")? {
        if attribute(region.slice(content_types), "PartName").as_deref() == Some(part_name.as_str()) {
            return Ok(None);
        }
    }

    let close = content_types
        .rfind("</Types>")
        .ok_or_else(|| Error::InvalidData(format!("{} has no </Types>", CONTENT_TYPES)))?;
    let entry = format!(
        r#"<Override PartName="{}" ContentType="{}"/>"#,
        part_name, content_type
    );
    Ok(Some(format!(
        "{}{}{}",
        &content_types[..close],
        entry,
        &content_types[close..]
    )))
}

/// Add a document relationship to `part` unless one of that type exists.
///
/// Returns the new text and the relationship id used.
pub fn ensure_relationship(rels: &str, part: &str, rel_type: &str) -> Result<Option<(String, String)>> {
    let parsed = Relationships::parse(rels)?;
    let exists = parsed
        .get_by_type(rel_type)
        .iter()
        .any(|r| OoxmlContainer::resolve_path(DOCUMENT, &r.target) == part);
    if exists {
        return Ok(None);
    }

    let close = rels
        .rfind("</Relationships>")
        .ok_or_else(|| Error::InvalidData("document relationships have no </Relationships>".to_string()))?;
    let id = parsed.next_id();
    let target = part.strip_prefix("word/").unwrap_or(part);
    let entry = format!(
        r#"<Relationship Id="{}" Type="{}" Target="{}"/>"#,
        id, rel_type, target
    );
    Ok(Some((
        format!("{}{}{}", &rels[..close], entry, &rels[close..]),
        id,
    )))
}

/// Replace or insert the target's `w:compat` block with the architect's.
pub fn apply_compat(source_settings: &str, target_settings: &str, log: &mut AuditLog) -> Result<Option<String>> {
    let Some(source) = find_element(source_settings, "w:compat")? else {
        log.info(Stage::Environment, "No compat flags in architect settings");
        return Ok(None);
    };
    let compat = source.slice(source_settings);

    if let Some(existing) = find_element(target_settings, "w:compat")? {
        if existing.slice(target_settings) == compat {
            log.info(Stage::Environment, "Compat flags already match architect");
            return Ok(None);
        }
        log.info(Stage::Environment, "Replaced compat flags with architect values");
        return Ok(Some(splice(target_settings, &[(existing, compat)])));
    }

    let close = target_settings
        .rfind("</w:settings>")
        .ok_or_else(|| Error::InvalidData("settings.xml has no </w:settings>".to_string()))?;
    log.info(Stage::Environment, "Inserted compat flags from architect");
    Ok(Some(format!(
        "{}{}{}",
        &target_settings[..close],
        compat,
        &target_settings[close..]
    )))
}

/// Add architect font declarations whose `w:name` the target lacks.
pub fn merge_font_table(source: &str, target: &str, log: &mut AuditLog) -> Result<Option<String>> {
    let present: HashSet<String> = find_elements(target, "w:font")?
        .into_iter()
        .filter_map(|r| attribute(r.slice(target), "w:name"))
        .collect();

    let mut added = Vec::new();
    let mut names = HashSet::new();
    for region in find_elements(source, "w:font")? {
        let block = region.slice(source);
        let Some(name) = attribute(block, "w:name") else {
            continue;
        };
        if present.contains(&name) || !names.insert(name) {
            continue;
        }
        added.push(block);
    }

    if added.is_empty() {
        log.info(Stage::Environment, "All architect fonts already declared in target");
        return Ok(None);
    }

    let close = target
        .rfind("</w:fonts>")
        .ok_or_else(|| Error::InvalidData("fontTable.xml has no </w:fonts>".to_string()))?;
    log.info(
        Stage::Environment,
        format!("Added {} font declarations from architect", added.len()),
    );
    Ok(Some(format!(
        "{}{}{}",
        &target[..close],
        added.concat(),
        &target[close..]
    )))
}

/// Replace or insert the target's `w:docDefaults` with the architect's.
pub fn apply_doc_defaults(source_styles: &str, target_styles: &str, log: &mut AuditLog) -> Result<Option<String>> {
    let Some(source) = find_element(source_styles, "w:docDefaults")? else {
        log.info(Stage::Environment, "No docDefaults in architect styles");
        return Ok(None);
    };
    let defaults = source.slice(source_styles);

    if let Some(existing) = find_element(target_styles, "w:docDefaults")? {
        if existing.slice(target_styles) == defaults {
            log.info(Stage::Environment, "docDefaults already match architect");
            return Ok(None);
        }
        log.info(Stage::Environment, "Replaced docDefaults with architect values");
        return Ok(Some(splice(target_styles, &[(existing, defaults)])));
    }

    let styles = find_element(target_styles, "w:styles")?
        .filter(|r| !r.self_closing)
        .ok_or_else(|| Error::InvalidData("styles.xml has no w:styles element".to_string()))?;
    let insert_at = styles.start + open_tag(styles.slice(target_styles)).len();
    log.info(Stage::Environment, "Inserted docDefaults from architect (none existed)");
    Ok(Some(format!(
        "{}{}{}",
        &target_styles[..insert_at],
        defaults,
        &target_styles[insert_at..]
    )))
}
