//! Style import from an architect style sheet into a target style sheet.

use super::regions::{
    attribute, element_inner, escape_attribute, first_child, first_text_run_properties, open_tag,
    paragraph_properties, remove_children, remove_elements, root_region,
};
use super::schema::{insert_child, RUN_PROPERTIES, STYLE};
use super::styles::{property_child, StyleKind, StyleSheet, TRACKED_RUN_PROPERTIES};
use crate::audit::{AuditLog, Stage};
use crate::error::{Error, Result};
use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

static DEFAULT_FLAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\s+w:default\s*=\s*(?:"[^"]*"|'[^']*')"#).expect("default flag pattern")
});

/// Children removed from an exemplar's `w:pPr` when synthesizing a style.
const EXEMPLAR_EXCLUDED: [&str; 5] = ["w:pStyle", "w:numPr", "w:sectPr", "w:rPr", "w:pPrChange"];

/// Outcome of [`import_styles`].
#[derive(Debug, Clone, Default)]
pub struct StyleImport {
    /// The target sheet after import.
    pub xml: String,
    /// Style ids appended, in insertion order.
    pub imported: Vec<String>,
    /// Required ids already present in the target.
    pub already_present: Vec<String>,
    /// Imported ids whose numbering reference was removed.
    pub stripped_numbering: Vec<String>,
}

impl StyleImport {
    /// Whether the target sheet changed.
    pub fn changed(&self) -> bool {
        !self.imported.is_empty()
    }
}

/// Copy the requested styles and their basedOn ancestors from `source` into
/// `target`.
///
/// Styles already in the target are left alone. Fails before producing any
/// output when a required style exists in neither sheet.
pub fn import_styles(
    target: &str,
    source: &str,
    requested: &[String],
    log: &mut AuditLog,
) -> Result<StyleImport> {
    let source_sheet = StyleSheet::parse(source)?;
    let target_sheet = StyleSheet::parse(target)?;

    let order = dependency_order(&source_sheet, requested);

    let missing: Vec<String> = order
        .iter()
        .filter(|id| !source_sheet.contains(id) && !target_sheet.contains(id))
        .cloned()
        .collect();
    if !missing.is_empty() {
        return Err(Error::MissingStyles(missing));
    }

    let mut result = StyleImport::default();
    let mut blocks = Vec::new();

    for id in &order {
        if target_sheet.contains(id) {
            log::debug!("Style {} already present in target", id);
            result.already_present.push(id.clone());
            continue;
        }
        let Some(style) = source_sheet.get(id) else {
            continue;
        };
        let Some(region) = style.region else {
            continue;
        };

        let mut block = region.slice(source).to_string();

        if style.numbering.is_some() {
            block = remove_elements(&block, "w:numPr")?;
            result.stripped_numbering.push(id.clone());
            log.warn(
                Stage::StyleImport,
                format!("Stripped numbering from imported style: {}", id),
            );
        }

        if style.is_default {
            if let Some(kind) = style.kind {
                if target_sheet.default_style(kind).is_some() {
                    block = strip_default_flag(&block);
                    log.info(
                        Stage::StyleImport,
                        format!(
                            "Cleared default flag on {}; target already has a default {} style",
                            id,
                            kind.as_str()
                        ),
                    );
                }
            }
        }

        block = materialize_typography(&block, id, style.kind, &source_sheet)?;

        log.info(Stage::StyleImport, format!("Imported style: {}", id));
        result.imported.push(id.clone());
        blocks.push(block);
    }

    result.xml = insert_style_blocks(target, &blocks)?;
    Ok(result)
}

/// Requested ids plus their source ancestors, bases before dependents.
fn dependency_order(sheet: &StyleSheet, requested: &[String]) -> Vec<String> {
    fn visit(sheet: &StyleSheet, id: &str, seen: &mut HashSet<String>, out: &mut Vec<String>) {
        if !seen.insert(id.to_string()) {
            return;
        }
        if let Some(base) = sheet.get(id).and_then(|s| s.based_on.as_deref()) {
            visit(sheet, base, seen, out);
        }
        out.push(id.to_string());
    }

    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for id in requested {
        let id = id.trim();
        if !id.is_empty() {
            visit(sheet, id, &mut seen, &mut out);
        }
    }
    out
}

fn strip_default_flag(block: &str) -> String {
    let tag = open_tag(block);
    let cleaned = DEFAULT_FLAG.replace(tag, "");
    format!("{}{}", cleaned, &block[tag.len()..])
}

/// Make an imported style carry its own effective typography.
///
/// Only copies values that already resolve in the source sheet. An existing
/// `w:pPr` is never replaced; an existing `w:rPr` only gains the tracked
/// kinds it lacks.
fn materialize_typography(
    block: &str,
    style_id: &str,
    kind: Option<StyleKind>,
    source: &StyleSheet,
) -> Result<String> {
    let mut block = block.to_string();
    let root = root_region(&block)?;

    let is_paragraph = matches!(kind, None | Some(StyleKind::Paragraph));
    if is_paragraph && first_child(&block, root, "w:pPr")?.is_none() {
        let ppr = source.effective_paragraph_properties(style_id)?;
        if !ppr.is_empty() {
            block = insert_child(&block, &format!("<w:pPr>{}</w:pPr>", ppr), "w:pPr", STYLE)?;
        }
    }

    let effective = source.effective_run_properties(style_id)?;
    if effective.is_empty() {
        return Ok(block);
    }

    let root = root_region(&block)?;
    let Some(rpr_region) = first_child(&block, root, "w:rPr")? else {
        return insert_child(&block, &format!("<w:rPr>{}</w:rPr>", effective), "w:rPr", STYLE);
    };

    let wrapped = format!("<w:rPr>{}</w:rPr>", effective);
    let mut rpr = rpr_region.slice(&block).to_string();
    for kind in TRACKED_RUN_PROPERTIES {
        if property_child(&rpr, kind)?.is_some() {
            continue;
        }
        if let Some(node) = property_child(&wrapped, kind)? {
            rpr = insert_child(&rpr, &node, kind, RUN_PROPERTIES)?;
        }
    }

    Ok(format!(
        "{}{}{}",
        &block[..rpr_region.start],
        rpr,
        &block[rpr_region.end..]
    ))
}

/// Append style blocks before `</w:styles>`, skipping ids already present.
///
/// All blocks go in with a single insertion; with nothing new to add the
/// sheet is returned unchanged.
pub fn insert_style_blocks(sheet: &str, blocks: &[String]) -> Result<String> {
    let existing = StyleSheet::parse(sheet)?;
    let mut seen = HashSet::new();
    let mut fresh = Vec::new();

    for block in blocks {
        let id = attribute(block, "w:styleId")
            .ok_or_else(|| Error::InvalidData("style block has no w:styleId".to_string()))?;
        if existing.contains(&id) || !seen.insert(id) {
            continue;
        }
        fresh.push(block.as_str());
    }

    if fresh.is_empty() {
        return Ok(sheet.to_string());
    }

    let insert_at = sheet
        .rfind("</w:styles>")
        .ok_or_else(|| Error::InvalidData("styles.xml has no </w:styles>".to_string()))?;

    let mut out = String::with_capacity(sheet.len() + fresh.iter().map(|b| b.len() + 1).sum::<usize>());
    out.push_str(&sheet[..insert_at]);
    for block in fresh {
        out.push_str(block);
        out.push('\n');
    }
    out.push_str(&sheet[insert_at..]);
    Ok(out)
}

/// Build a custom paragraph style from an exemplar paragraph.
///
/// The style takes the exemplar's paragraph properties (without style,
/// numbering, section or revision children) and the run properties of its
/// first run with visible text.
pub fn synthesize_paragraph_style(
    style_id: &str,
    name: &str,
    based_on: Option<&str>,
    exemplar: &str,
) -> Result<String> {
    let mut out = format!(
        r#"<w:style w:type="paragraph" w:customStyle="1" w:styleId="{}"><w:name w:val="{}"/>"#,
        escape_attribute(style_id),
        escape_attribute(name)
    );
    if let Some(base) = based_on {
        out.push_str(&format!(r#"<w:basedOn w:val="{}"/>"#, escape_attribute(base)));
    }
    out.push_str("<w:qFormat/>");

    if let Some(ppr) = paragraph_properties(exemplar)? {
        let mut ppr = ppr.to_string();
        for name in EXEMPLAR_EXCLUDED {
            ppr = remove_children(&ppr, name)?;
        }
        let root = root_region(&ppr)?;
        if let Some(inner) = element_inner(&ppr, root).map(str::trim) {
            if !inner.is_empty() {
                out.push_str(&format!("<w:pPr>{}</w:pPr>", inner));
            }
        }
    }

    if let Some(rpr) = first_text_run_properties(exemplar)? {
        let rpr = remove_children(rpr, "w:rStyle")?;
        let rpr = remove_children(&rpr, "w:rPrChange")?;
        let root = root_region(&rpr)?;
        if let Some(inner) = element_inner(&rpr, root).map(str::trim) {
            if !inner.is_empty() {
                out.push_str(&format!("<w:rPr>{}</w:rPr>", inner));
            }
        }
    }

    out.push_str("</w:style>");
    Ok(out)
}
