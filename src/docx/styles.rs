//! Style sheet indexing and effective-property resolution.

use super::regions::{
    attribute, child_elements, element_inner, find_element, find_elements, first_child,
    remove_elements, root_region, NumberingRef, Region,
};
use crate::error::Result;
use std::collections::{HashMap, HashSet};

/// Run property kinds materialized on imported styles, in canonical order.
pub const TRACKED_RUN_PROPERTIES: [&str; 4] = ["w:rFonts", "w:sz", "w:szCs", "w:lang"];

/// Style type (paragraph, character, table, numbering).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StyleKind {
    Paragraph,
    Character,
    Table,
    Numbering,
}

impl StyleKind {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "paragraph" => Some(StyleKind::Paragraph),
            "character" => Some(StyleKind::Character),
            "table" => Some(StyleKind::Table),
            "numbering" => Some(StyleKind::Numbering),
            _ => None,
        }
    }

    /// The `w:type` attribute value.
    pub fn as_str(&self) -> &'static str {
        match self {
            StyleKind::Paragraph => "paragraph",
            StyleKind::Character => "character",
            StyleKind::Table => "table",
            StyleKind::Numbering => "numbering",
        }
    }
}

/// A style definition indexed from raw `w:style` text.
#[derive(Debug, Clone, Default)]
pub struct StyleDefinition {
    /// Style ID (e.g., "Heading1")
    pub id: String,
    /// Display name (e.g., "heading 1")
    pub name: Option<String>,
    /// Style type
    pub kind: Option<StyleKind>,
    /// Marked as the default style of its kind
    pub is_default: bool,
    /// Parent style
    pub based_on: Option<String>,
    /// Linked character/paragraph style
    pub link: Option<String>,
    /// Style applied to the following paragraph
    pub next: Option<String>,
    /// Raw `w:pPr` block
    pub paragraph_properties: Option<String>,
    /// Raw `w:rPr` block
    pub run_properties: Option<String>,
    /// Raw `w:tblPr` block
    pub table_properties: Option<String>,
    /// Raw `w:trPr` block
    pub row_properties: Option<String>,
    /// Raw `w:tcPr` block
    pub cell_properties: Option<String>,
    /// Raw `w:numPr` block inside `w:pPr`
    pub numbering: Option<String>,
    /// Span of the block in the sheet text
    pub region: Option<Region>,
}

impl StyleDefinition {
    /// Index a single raw `w:style` block.
    pub fn from_block(block: &str) -> Result<Self> {
        let root = root_region(block)?;
        let mut style = StyleDefinition {
            id: attribute(block, "w:styleId").unwrap_or_default(),
            kind: attribute(block, "w:type").and_then(|t| StyleKind::parse(&t)),
            is_default: matches!(
                attribute(block, "w:default").as_deref(),
                Some("1") | Some("true") | Some("on")
            ),
            ..Default::default()
        };

        for child in child_elements(block, root)? {
            let raw = child.region.slice(block);
            match child.name.as_str() {
                "w:name" => style.name = attribute(raw, "w:val"),
                "w:basedOn" => style.based_on = attribute(raw, "w:val"),
                "w:link" => style.link = attribute(raw, "w:val"),
                "w:next" => style.next = attribute(raw, "w:val"),
                "w:pPr" => {
                    style.paragraph_properties = Some(raw.to_string());
                    let ppr_root = root_region(raw)?;
                    style.numbering = first_child(raw, ppr_root, "w:numPr")?
                        .map(|r| r.slice(raw).to_string());
                }
                "w:rPr" => style.run_properties = Some(raw.to_string()),
                "w:tblPr" => style.table_properties = Some(raw.to_string()),
                "w:trPr" => style.row_properties = Some(raw.to_string()),
                "w:tcPr" => style.cell_properties = Some(raw.to_string()),
                _ => {}
            }
        }

        Ok(style)
    }

    /// The explicit numbering reference carried by this style.
    pub fn numbering_ref(&self) -> Result<Option<NumberingRef>> {
        self.numbering
            .as_deref()
            .map(NumberingRef::from_element)
            .transpose()
    }
}

/// Document-wide defaults from `w:docDefaults`.
#[derive(Debug, Clone, Default)]
pub struct DocDefaults {
    /// Raw `w:rPr` inside `w:rPrDefault`
    pub run_properties: Option<String>,
    /// Raw `w:pPr` inside `w:pPrDefault`
    pub paragraph_properties: Option<String>,
    /// Span of the `w:docDefaults` block
    pub region: Option<Region>,
}

/// An indexed `styles.xml`.
#[derive(Debug, Clone, Default)]
pub struct StyleSheet {
    /// Style definitions in document order
    pub styles: Vec<StyleDefinition>,
    /// Document defaults
    pub defaults: DocDefaults,
    by_id: HashMap<String, usize>,
}

impl StyleSheet {
    /// Index styles and defaults from raw `styles.xml` text.
    pub fn parse(xml: &str) -> Result<Self> {
        // Handle empty content
        if xml.trim().is_empty() {
            return Ok(Self::default());
        }

        let mut sheet = StyleSheet::default();

        for region in find_elements(xml, "w:style")? {
            let mut style = StyleDefinition::from_block(region.slice(xml))?;
            style.region = Some(region);
            if style.id.is_empty() {
                log::warn!("Skipping w:style without w:styleId at byte {}", region.start);
                continue;
            }
            // First definition wins, matching how Word resolves duplicates.
            if !sheet.by_id.contains_key(&style.id) {
                sheet.by_id.insert(style.id.clone(), sheet.styles.len());
            }
            sheet.styles.push(style);
        }

        if let Some(region) = find_element(xml, "w:docDefaults")? {
            sheet.defaults = parse_doc_defaults(xml, region)?;
        }

        Ok(sheet)
    }

    /// Look up a style by identifier.
    pub fn get(&self, id: &str) -> Option<&StyleDefinition> {
        self.by_id.get(id).map(|&i| &self.styles[i])
    }

    /// Whether a style with this identifier exists.
    pub fn contains(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    /// The default style of a kind (`w:default="1"`).
    pub fn default_style(&self, kind: StyleKind) -> Option<&StyleDefinition> {
        self.styles
            .iter()
            .find(|s| s.is_default && s.kind == Some(kind))
    }

    /// The basedOn chain starting at `id` (inclusive).
    ///
    /// Stops at the first unknown identifier or the first repeat, so a
    /// cyclic chain yields each member once.
    pub fn based_on_chain(&self, id: &str) -> Vec<&StyleDefinition> {
        let mut chain = Vec::new();
        let mut seen = HashSet::new();
        let mut current = Some(id.to_string());

        while let Some(cur) = current {
            if !seen.insert(cur.clone()) {
                log::debug!("basedOn cycle detected at style {}", cur);
                break;
            }
            let Some(style) = self.get(&cur) else {
                break;
            };
            chain.push(style);
            current = style.based_on.clone();
        }

        chain
    }

    /// Effective run properties of a style for the tracked property kinds.
    ///
    /// Each kind is resolved independently: the nearest style in the chain
    /// that sets it wins, then the document defaults. The result is the
    /// concatenation of found fragments in canonical kind order.
    pub fn effective_run_properties(&self, style_id: &str) -> Result<String> {
        let chain = self.based_on_chain(style_id);
        let mut out = String::new();

        for kind in TRACKED_RUN_PROPERTIES {
            let mut found = None;
            for style in &chain {
                if let Some(rpr) = style.run_properties.as_deref() {
                    if let Some(node) = property_child(rpr, kind)? {
                        found = Some(node);
                        break;
                    }
                }
            }
            if found.is_none() {
                if let Some(rpr) = self.defaults.run_properties.as_deref() {
                    found = property_child(rpr, kind)?;
                }
            }
            if let Some(node) = found {
                out.push_str(&node);
            }
        }

        Ok(out)
    }

    /// Effective paragraph properties of a style, as inner `w:pPr` content.
    ///
    /// The first non-empty property block along the chain wins, then the
    /// document defaults. Style and numbering references are stripped.
    pub fn effective_paragraph_properties(&self, style_id: &str) -> Result<String> {
        for style in self.based_on_chain(style_id) {
            if let Some(ppr) = style.paragraph_properties.as_deref() {
                let inner = structural_free_inner(ppr)?;
                if !inner.is_empty() {
                    return Ok(inner);
                }
            }
        }

        match self.defaults.paragraph_properties.as_deref() {
            Some(ppr) => structural_free_inner(ppr),
            None => Ok(String::new()),
        }
    }

    /// The first explicit `w:numPr` block along a style's chain.
    ///
    /// A `numId` of 0 means the style explicitly switches numbering off and
    /// ends the search.
    pub fn numbering_in_chain(&self, style_id: &str) -> Result<Option<String>> {
        for style in self.based_on_chain(style_id) {
            if let Some(num_ref) = style.numbering_ref()? {
                if num_ref.is_disabled() {
                    return Ok(None);
                }
                return Ok(style.numbering.clone());
            }
        }
        Ok(None)
    }
}

fn parse_doc_defaults(xml: &str, region: Region) -> Result<DocDefaults> {
    let mut defaults = DocDefaults {
        region: Some(region),
        ..Default::default()
    };
    for child in child_elements(xml, region)? {
        match child.name.as_str() {
            "w:rPrDefault" => {
                defaults.run_properties =
                    first_child(xml, child.region, "w:rPr")?.map(|r| r.slice(xml).to_string());
            }
            "w:pPrDefault" => {
                defaults.paragraph_properties =
                    first_child(xml, child.region, "w:pPr")?.map(|r| r.slice(xml).to_string());
            }
            _ => {}
        }
    }
    Ok(defaults)
}

/// The raw child element `kind` of a property block, if set.
pub fn property_child(block: &str, kind: &str) -> Result<Option<String>> {
    let root = root_region(block)?;
    Ok(first_child(block, root, kind)?.map(|r| r.slice(block).to_string()))
}

/// Inner content of a `w:pPr` block without `w:pStyle` and `w:numPr`.
pub fn structural_free_inner(ppr: &str) -> Result<String> {
    let root = root_region(ppr)?;
    let Some(inner) = element_inner(ppr, root) else {
        return Ok(String::new());
    };
    let without_style = remove_elements(inner, "w:pStyle")?;
    let without_numbering = remove_elements(&without_style, "w:numPr")?;
    Ok(without_numbering.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHEET: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:styles xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
  <w:docDefaults>
    <w:rPrDefault><w:rPr><w:rFonts w:ascii="Calibri" w:hAnsi="Calibri"/><w:sz w:val="22"/><w:szCs w:val="22"/><w:lang w:val="en-US"/></w:rPr></w:rPrDefault>
    <w:pPrDefault><w:pPr><w:spacing w:after="160"/></w:pPr></w:pPrDefault>
  </w:docDefaults>
  <w:style w:type="paragraph" w:default="1" w:styleId="Normal">
    <w:name w:val="Normal"/>
    <w:qFormat/>
  </w:style>
  <w:style w:type="paragraph" w:customStyle="1" w:styleId="CSI-Base">
    <w:name w:val="CSI Base"/>
    <w:basedOn w:val="Normal"/>
    <w:pPr><w:pStyle w:val="Ignored"/><w:jc w:val="both"/></w:pPr>
    <w:rPr><w:rFonts w:ascii="Arial" w:hAnsi="Arial"/></w:rPr>
  </w:style>
  <w:style w:type="paragraph" w:customStyle="1" w:styleId="CSI-Part">
    <w:name w:val="CSI Part"/>
    <w:basedOn w:val="CSI-Base"/>
    <w:next w:val="CSI-Article"/>
    <w:pPr><w:numPr><w:ilvl w:val="0"/><w:numId w:val="4"/></w:numPr></w:pPr>
    <w:rPr><w:sz w:val="24"/></w:rPr>
  </w:style>
  <w:style w:type="paragraph" w:customStyle="1" w:styleId="CSI-NoList">
    <w:name w:val="CSI NoList"/>
    <w:basedOn w:val="CSI-Part"/>
    <w:pPr><w:numPr><w:numId w:val="0"/></w:numPr></w:pPr>
  </w:style>
  <w:style w:type="paragraph" w:styleId="LoopA"><w:basedOn w:val="LoopB"/><w:rPr><w:sz w:val="30"/></w:rPr></w:style>
  <w:style w:type="paragraph" w:styleId="LoopB"><w:basedOn w:val="LoopA"/></w:style>
</w:styles>"#;

    #[test]
    fn test_parse_styles() {
        let sheet = StyleSheet::parse(SHEET).unwrap();
        assert_eq!(sheet.styles.len(), 6);

        let part = sheet.get("CSI-Part").unwrap();
        assert_eq!(part.name.as_deref(), Some("CSI Part"));
        assert_eq!(part.kind, Some(StyleKind::Paragraph));
        assert_eq!(part.based_on.as_deref(), Some("CSI-Base"));
        assert_eq!(part.next.as_deref(), Some("CSI-Article"));
        assert!(part.numbering.is_some());
        assert_eq!(
            part.numbering_ref().unwrap().unwrap().num_id.as_deref(),
            Some("4")
        );

        let region = part.region.unwrap();
        assert!(region.slice(SHEET).starts_with("<w:style"));
        assert!(region.slice(SHEET).ends_with("</w:style>"));

        assert_eq!(
            sheet.default_style(StyleKind::Paragraph).map(|s| s.id.as_str()),
            Some("Normal")
        );
        assert!(sheet.defaults.run_properties.is_some());
    }

    #[test]
    fn test_effective_run_properties_per_kind() {
        let sheet = StyleSheet::parse(SHEET).unwrap();
        // sz from the style itself, rFonts from its parent, szCs and lang
        // from docDefaults.
        assert_eq!(
            sheet.effective_run_properties("CSI-Part").unwrap(),
            r#"<w:rFonts w:ascii="Arial" w:hAnsi="Arial"/><w:sz w:val="24"/><w:szCs w:val="22"/><w:lang w:val="en-US"/>"#
        );
        assert_eq!(
            sheet.effective_run_properties("Normal").unwrap(),
            r#"<w:rFonts w:ascii="Calibri" w:hAnsi="Calibri"/><w:sz w:val="22"/><w:szCs w:val="22"/><w:lang w:val="en-US"/>"#
        );
    }

    #[test]
    fn test_cycle_terminates() {
        let sheet = StyleSheet::parse(SHEET).unwrap();
        let chain: Vec<&str> = sheet
            .based_on_chain("LoopA")
            .iter()
            .map(|s| s.id.as_str())
            .collect();
        assert_eq!(chain, vec!["LoopA", "LoopB"]);
        let rpr = sheet.effective_run_properties("LoopB").unwrap();
        assert!(rpr.contains(r#"<w:sz w:val="30"/>"#));
        assert!(rpr.contains("Calibri"));
    }

    #[test]
    fn test_effective_paragraph_properties_strip_links() {
        let sheet = StyleSheet::parse(SHEET).unwrap();
        // CSI-Part's own pPr is only numbering, which is stripped, so the
        // parent's block is used (with its pStyle stripped).
        assert_eq!(
            sheet.effective_paragraph_properties("CSI-Part").unwrap(),
            r#"<w:jc w:val="both"/>"#
        );
        assert_eq!(
            sheet.effective_paragraph_properties("Normal").unwrap(),
            r#"<w:spacing w:after="160"/>"#
        );
        assert_eq!(sheet.effective_paragraph_properties("Missing").unwrap(), r#"<w:spacing w:after="160"/>"#);
    }

    #[test]
    fn test_empty_everywhere_yields_empty() {
        let sheet = StyleSheet::parse(
            r#"<w:styles><w:style w:type="paragraph" w:styleId="A"><w:name w:val="A"/></w:style></w:styles>"#,
        )
        .unwrap();
        assert_eq!(sheet.effective_run_properties("A").unwrap(), "");
        assert_eq!(sheet.effective_paragraph_properties("A").unwrap(), "");
    }

    #[test]
    fn test_numbering_in_chain() {
        let sheet = StyleSheet::parse(SHEET).unwrap();
        assert!(sheet.numbering_in_chain("CSI-Part").unwrap().is_some());
        assert_eq!(sheet.numbering_in_chain("CSI-NoList").unwrap(), None);
        assert_eq!(sheet.numbering_in_chain("CSI-Base").unwrap(), None);
    }
}
