//! DOCX numbering (list) definitions and cross-document import.

use super::regions::{
    attribute, find_element, find_elements, first_child, root_region, set_attribute, splice,
    Region,
};
use super::schema::{insert_child, RUN_PROPERTIES};
use super::styles::{property_child, StyleSheet};
use crate::audit::{AuditLog, Stage};
use crate::error::{Error, Result};
use rand::Rng;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

static NSID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(<w:nsid\b[^>]*?\bw:val=")[^"]*(")"#).expect("nsid pattern")
});

static ABSTRACT_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(<w:abstractNumId\b[^>]*?\bw:val=")[^"]*(")"#).expect("abstract ref pattern")
});

/// Abstract numbering definition (`w:abstractNum`).
#[derive(Debug, Clone)]
pub struct AbstractNum {
    /// Abstract numbering ID
    pub id: u32,
    /// Span in the numbering part
    pub region: Region,
}

/// Concrete numbering instance (`w:num`).
#[derive(Debug, Clone)]
pub struct NumInstance {
    /// Numbering ID
    pub num_id: u32,
    /// Abstract numbering ID
    pub abstract_num_id: u32,
    /// Span in the numbering part
    pub region: Region,
}

/// An indexed `numbering.xml`.
#[derive(Debug, Clone, Default)]
pub struct NumberingPart {
    /// Abstract numbering definitions in document order
    pub abstract_nums: Vec<AbstractNum>,
    /// Numbering instances in document order
    pub instances: Vec<NumInstance>,
}

impl NumberingPart {
    /// Index numbering definitions from XML content.
    pub fn parse(xml: &str) -> Result<Self> {
        // Handle empty content
        if xml.trim().is_empty() {
            return Ok(Self::default());
        }

        let mut part = NumberingPart::default();

        for region in find_elements(xml, "w:abstractNum")? {
            let block = region.slice(xml);
            let id = numeric_attribute(block, "w:abstractNumId")?;
            part.abstract_nums.push(AbstractNum { id, region });
        }

        for region in find_elements(xml, "w:num")? {
            let block = region.slice(xml);
            let num_id = numeric_attribute(block, "w:numId")?;
            let root = root_region(block)?;
            let abstract_ref = first_child(block, root, "w:abstractNumId")?
                .ok_or_else(|| {
                    Error::InvalidData(format!("w:num {} has no w:abstractNumId", num_id))
                })?;
            let abstract_num_id = numeric_attribute(abstract_ref.slice(block), "w:val")?;
            part.instances.push(NumInstance {
                num_id,
                abstract_num_id,
                region,
            });
        }

        Ok(part)
    }

    /// Look up an abstract definition.
    pub fn abstract_num(&self, id: u32) -> Option<&AbstractNum> {
        self.abstract_nums.iter().find(|a| a.id == id)
    }

    /// Look up a numbering instance.
    pub fn instance(&self, num_id: u32) -> Option<&NumInstance> {
        self.instances.iter().find(|n| n.num_id == num_id)
    }

    /// Highest abstract numbering ID in use.
    pub fn max_abstract_id(&self) -> Option<u32> {
        self.abstract_nums.iter().map(|a| a.id).max()
    }

    /// Highest numbering instance ID in use.
    pub fn max_num_id(&self) -> Option<u32> {
        self.instances.iter().map(|n| n.num_id).max()
    }
}

fn numeric_attribute(element: &str, qname: &str) -> Result<u32> {
    let raw = attribute(element, qname)
        .ok_or_else(|| Error::InvalidData(format!("missing {} attribute", qname)))?;
    raw.trim()
        .parse()
        .map_err(|_| Error::InvalidData(format!("{}=\"{}\" is not a number", qname, raw)))
}

/// Font forced onto list labels of imported numbering levels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NumberingFont {
    /// Font family for all four `w:rFonts` slots
    pub name: String,
    /// Size in half-points
    pub size: u32,
}

impl Default for NumberingFont {
    fn default() -> Self {
        Self {
            name: "Arial".to_string(),
            size: 20,
        }
    }
}

impl NumberingFont {
    /// Create a font specification.
    pub fn new(name: impl Into<String>, size: u32) -> Self {
        Self {
            name: name.into(),
            size,
        }
    }

    fn run_fonts(&self) -> String {
        let name = &self.name;
        format!(
            r#"<w:rFonts w:ascii="{0}" w:hAnsi="{0}" w:eastAsia="{0}" w:cs="{0}"/>"#,
            name
        )
    }
}

/// Options for numbering import.
#[derive(Debug, Clone, Default)]
pub struct NumberingOptions {
    /// Font injected into label run properties; `None` leaves them alone
    pub font: Option<NumberingFont>,
}

impl NumberingOptions {
    /// Options with the default label font.
    pub fn new() -> Self {
        Self {
            font: Some(NumberingFont::default()),
        }
    }

    /// Set the label font.
    pub fn with_font(mut self, font: NumberingFont) -> Self {
        self.font = Some(font);
        self
    }

    /// Leave label run properties untouched.
    pub fn without_font(mut self) -> Self {
        self.font = None;
        self
    }
}

/// Outcome of [`import_numbering`].
#[derive(Debug, Clone, Default)]
pub struct NumberingImport {
    /// The target numbering part after import.
    pub xml: String,
    /// Style id to its new numbering instance id.
    pub style_num_ids: BTreeMap<String, u32>,
    /// Old to new abstract numbering ids.
    pub abstract_remap: BTreeMap<u32, u32>,
    /// Old to new numbering instance ids.
    pub num_remap: BTreeMap<u32, u32>,
}

impl NumberingImport {
    /// Whether the target numbering part changed.
    pub fn changed(&self) -> bool {
        !self.num_remap.is_empty()
    }
}

/// Copy the numbering definitions referenced by `style_ids` from the source
/// package into the target numbering part.
///
/// Ids are remapped above the target's current maxima, assigned in
/// ascending order of the source ids.
pub fn import_numbering(
    source_numbering: &str,
    target_numbering: &str,
    source_styles: &str,
    style_ids: &[String],
    options: &NumberingOptions,
    log: &mut AuditLog,
) -> Result<NumberingImport> {
    let sheet = StyleSheet::parse(source_styles)?;
    let source = NumberingPart::parse(source_numbering)?;
    let target = NumberingPart::parse(target_numbering)?;

    let mut style_usage: BTreeMap<String, u32> = BTreeMap::new();
    for id in style_ids {
        let Some(style) = sheet.get(id) else {
            continue;
        };
        let Some(num_ref) = style.numbering_ref()? else {
            continue;
        };
        if num_ref.is_disabled() {
            continue;
        }
        if let Some(raw) = num_ref.num_id.as_deref() {
            let num_id = raw.trim().parse().map_err(|_| {
                Error::InvalidData(format!("style {} has non-numeric numId {}", id, raw))
            })?;
            style_usage.insert(id.clone(), num_id);
        }
    }

    let mut result = NumberingImport {
        xml: target_numbering.to_string(),
        ..Default::default()
    };
    if style_usage.is_empty() {
        log.info(Stage::NumberingImport, "No numbering definitions need to be imported");
        return Ok(result);
    }

    let wanted: BTreeSet<u32> = style_usage.values().copied().collect();
    let mut instances = Vec::new();
    for &num_id in &wanted {
        let instance = source.instance(num_id).ok_or_else(|| {
            Error::MissingComponent(format!("numbering instance {} in source", num_id))
        })?;
        instances.push(instance);
    }

    let needed_abstracts: BTreeSet<u32> = instances.iter().map(|n| n.abstract_num_id).collect();
    let mut next_abstract = target.max_abstract_id().map_or(0, |m| m + 1);
    let mut abstract_blocks = Vec::new();
    for &old in &needed_abstracts {
        let definition = source.abstract_num(old).ok_or_else(|| {
            Error::MissingComponent(format!("abstract numbering {} in source", old))
        })?;
        let new = next_abstract;
        next_abstract += 1;

        let block = definition.region.slice(source_numbering);
        let block = set_attribute(block, "w:abstractNumId", &new.to_string())
            .unwrap_or_else(|| block.to_string());
        let block = NSID
            .replace_all(&block, |caps: &regex::Captures| {
                format!("{}{}{}", &caps[1], generate_nsid(), &caps[2])
            })
            .into_owned();
        abstract_blocks.push(label_font(&block, options.font.as_ref())?);
        result.abstract_remap.insert(old, new);
    }

    let mut next_num = target.max_num_id().map_or(1, |m| m + 1);
    let mut instance_blocks = Vec::new();
    for instance in instances {
        let new = next_num;
        next_num += 1;
        let new_abstract = result
            .abstract_remap
            .get(&instance.abstract_num_id)
            .copied()
            .unwrap_or(instance.abstract_num_id);

        let block = instance.region.slice(source_numbering);
        let block = set_attribute(block, "w:numId", &new.to_string())
            .unwrap_or_else(|| block.to_string());
        let block = ABSTRACT_REF
            .replace(&block, |caps: &regex::Captures| {
                format!("{}{}{}", &caps[1], new_abstract, &caps[2])
            })
            .into_owned();
        let block = set_attribute(&block, "w16cid:durableId", &generate_durable_id().to_string())
            .unwrap_or(block);
        instance_blocks.push(label_font(&block, options.font.as_ref())?);

        log.info(
            Stage::NumberingImport,
            format!(
                "numId {} -> {} (abstractNum {} -> {})",
                instance.num_id, new, instance.abstract_num_id, new_abstract
            ),
        );
        result.num_remap.insert(instance.num_id, new);
    }

    for (style_id, old) in &style_usage {
        if let Some(&new) = result.num_remap.get(old) {
            result.style_num_ids.insert(style_id.clone(), new);
        }
    }

    result.xml = insert_definitions(target_numbering, &abstract_blocks, &instance_blocks)?;
    log.info(
        Stage::NumberingImport,
        format!(
            "Imported {} abstractNum and {} num definitions",
            abstract_blocks.len(),
            instance_blocks.len()
        ),
    );
    Ok(result)
}

fn generate_nsid() -> String {
    format!("{:08X}", rand::thread_rng().gen::<u32>())
}

fn generate_durable_id() -> u32 {
    rand::thread_rng().gen_range(1..=2_147_483_647)
}

/// Give every run property block without explicit fonts the label font.
fn label_font(block: &str, font: Option<&NumberingFont>) -> Result<String> {
    let Some(font) = font else {
        return Ok(block.to_string());
    };

    let mut replaced = Vec::new();
    for region in find_elements(block, "w:rPr")? {
        let rpr = region.slice(block);
        if property_child(rpr, "w:rFonts")?.is_some() {
            continue;
        }
        let mut rpr = insert_child(rpr, &font.run_fonts(), "w:rFonts", RUN_PROPERTIES)?;
        if property_child(&rpr, "w:sz")?.is_none() {
            let sz = format!(r#"<w:sz w:val="{}"/>"#, font.size);
            rpr = insert_child(&rpr, &sz, "w:sz", RUN_PROPERTIES)?;
        }
        if property_child(&rpr, "w:szCs")?.is_none() {
            let sz_cs = format!(r#"<w:szCs w:val="{}"/>"#, font.size);
            rpr = insert_child(&rpr, &sz_cs, "w:szCs", RUN_PROPERTIES)?;
        }
        replaced.push((region, rpr));
    }

    let edits: Vec<(Region, &str)> = replaced.iter().map(|(r, s)| (*r, s.as_str())).collect();
    Ok(splice(block, &edits))
}

fn insert_definitions(target: &str, abstracts: &[String], instances: &[String]) -> Result<String> {
    let close = target
        .rfind("</w:numbering>")
        .ok_or_else(|| Error::InvalidData("numbering.xml has no </w:numbering>".to_string()))?;
    let abstract_at = find_element(target, "w:num")?
        .map(|r| r.start)
        .unwrap_or(close);

    let mut abstract_text = String::new();
    for block in abstracts {
        abstract_text.push_str(block);
        abstract_text.push('\n');
    }
    let mut instance_text = String::new();
    for block in instances {
        instance_text.push_str(block);
        instance_text.push('\n');
    }

    let mut out = String::with_capacity(target.len() + abstract_text.len() + instance_text.len());
    out.push_str(&target[..abstract_at]);
    out.push_str(&abstract_text);
    out.push_str(&target[abstract_at..close]);
    out.push_str(&instance_text);
    out.push_str(&target[close..]);
    Ok(out)
}

/// Point a style's numbering reference at a new instance id.
///
/// Only `w:numId` values equal to `old` are rewritten.
pub fn remap_style_numbering(style_block: &str, old: u32, new: u32) -> Result<String> {
    let mut edits = Vec::new();
    for region in find_elements(style_block, "w:numId")? {
        let element = region.slice(style_block);
        let matches = attribute(element, "w:val")
            .and_then(|v| v.trim().parse::<u32>().ok())
            == Some(old);
        if matches {
            if let Some(updated) = set_attribute(element, "w:val", &new.to_string()) {
                edits.push((region, updated));
            }
        }
    }
    let edits: Vec<(Region, &str)> = edits.iter().map(|(r, s)| (*r, s.as_str())).collect();
    Ok(splice(style_block, &edits))
}
