//! Paragraph style reassignment.
//!
//! Each classified paragraph gets its `w:pStyle` pointed at the style the
//! registry maps its role to. Nothing else in the paragraph may change,
//! except that a paragraph whose numbering came only from its old style
//! keeps that numbering as an explicit `w:numPr`.

use super::regions::{
    escape_attribute, first_child, paragraph_blocks, root_region, set_attribute, splice,
    splice_paragraphs, ParagraphBlock,
};
use super::schema::{insert_child, PARAGRAPH, PARAGRAPH_PROPERTIES};
use super::styles::{StyleKind, StyleSheet};
use crate::audit::{AuditLog, Stage};
use crate::error::{Error, Result};
use crate::guard::{paragraph_count_unchanged, ParagraphContract, PropertyContract};
use crate::registry::{validate, Classification, RoleRegistry};
use serde::Serialize;

/// Why a classified paragraph was left alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The paragraph carries `w:sectPr`.
    SectionProperties,
}

/// What happened to one classified paragraph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ParagraphOutcome {
    StyleAssigned {
        index: usize,
        role: String,
        previous: Option<String>,
        style_id: String,
        /// False when the paragraph already had the target style.
        changed: bool,
        numbering_materialized: bool,
    },
    Skipped {
        index: usize,
        reason: SkipReason,
    },
}

impl ParagraphOutcome {
    pub fn index(&self) -> usize {
        match self {
            ParagraphOutcome::StyleAssigned { index, .. } | ParagraphOutcome::Skipped { index, .. } => {
                *index
            }
        }
    }
}

/// Result of applying a batch to a document body.
#[derive(Debug, Clone)]
pub struct Application {
    /// The rewritten `word/document.xml` text.
    pub document: String,
    /// One outcome per classification, in input order.
    pub outcomes: Vec<ParagraphOutcome>,
}

impl Application {
    /// Paragraphs whose style reference actually changed.
    pub fn changed_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, ParagraphOutcome::StyleAssigned { changed: true, .. }))
            .count()
    }

    pub fn skipped_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, ParagraphOutcome::Skipped { .. }))
            .count()
    }

    pub fn materialized_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| {
                matches!(
                    o,
                    ParagraphOutcome::StyleAssigned {
                        numbering_materialized: true,
                        ..
                    }
                )
            })
            .count()
    }
}

/// Insert `child` into the paragraph's own property block, creating the
/// block when the paragraph has none.
fn insert_property(p_xml: &str, child: &str, child_name: &str) -> Result<String> {
    let root = root_region(p_xml)?;
    match first_child(p_xml, root, "w:pPr")? {
        Some(ppr) => {
            let updated = insert_child(ppr.slice(p_xml), child, child_name, PARAGRAPH_PROPERTIES)?;
            Ok(splice(p_xml, &[(ppr, &updated)]))
        }
        None => insert_child(
            p_xml,
            &format!("<w:pPr>{}</w:pPr>", child),
            "w:pPr",
            PARAGRAPH,
        ),
    }
}

/// Point a paragraph's `w:pStyle` at `style_id`, inserting it if absent.
pub fn assign_style(p_xml: &str, style_id: &str) -> Result<String> {
    let escaped = escape_attribute(style_id);
    let root = root_region(p_xml)?;
    if let Some(ppr) = first_child(p_xml, root, "w:pPr")? {
        let ppr_xml = ppr.slice(p_xml);
        let ppr_root = root_region(ppr_xml)?;
        if let Some(pstyle) = first_child(ppr_xml, ppr_root, "w:pStyle")? {
            let element = pstyle.slice(ppr_xml);
            let updated = set_attribute(element, "w:val", &escaped)
                .unwrap_or_else(|| format!(r#"<w:pStyle w:val="{}"/>"#, escaped));
            let new_ppr = splice(ppr_xml, &[(pstyle, &updated)]);
            return Ok(splice(p_xml, &[(ppr, &new_ppr)]));
        }
    }
    insert_property(p_xml, &format!(r#"<w:pStyle w:val="{}"/>"#, escaped), "w:pStyle")
}

/// Copy numbering a paragraph inherits from `current_style` into its own
/// properties. Returns `None` when there is nothing to materialize.
fn materialize_numbering(
    block: &ParagraphBlock,
    sheet: &StyleSheet,
    current_style: Option<&str>,
) -> Result<Option<String>> {
    if block.numbering()?.is_some() {
        return Ok(None);
    }
    let style = match current_style {
        Some(id) => Some(id.to_string()),
        None => sheet
            .default_style(StyleKind::Paragraph)
            .map(|s| s.id.clone()),
    };
    let Some(style) = style else {
        return Ok(None);
    };
    match sheet.numbering_in_chain(&style)? {
        Some(num_pr) => Ok(Some(insert_property(&block.xml, &num_pr, "w:numPr")?)),
        None => Ok(None),
    }
}

/// Apply `classifications` to the document text.
///
/// The whole batch is validated first; a bad index, an unmapped role or a
/// duplicate index fails before any paragraph is edited. Paragraphs that
/// carry section properties are skipped. Every edited paragraph is checked
/// against its contracts before the document is rebuilt.
pub fn apply_classifications(
    document: &str,
    sheet: &StyleSheet,
    registry: &RoleRegistry,
    classifications: &[Classification],
    log: &mut AuditLog,
) -> Result<Application> {
    let mut blocks = paragraph_blocks(document)?;
    validate(registry, classifications, blocks.len())?;

    let classified: Vec<&ParagraphBlock> = classifications
        .iter()
        .map(|c| &blocks[c.paragraph_index])
        .collect();
    let contract = ParagraphContract::capture(classified.iter().copied())?;
    let properties = PropertyContract::capture(classified)?;

    let mut outcomes = Vec::with_capacity(classifications.len());
    for item in classifications {
        let block = &mut blocks[item.paragraph_index];
        let index = block.index;

        if block.has_section_properties()? {
            log.warn(
                Stage::Apply,
                format!("p[{}] carries section properties; left unchanged", index),
            );
            outcomes.push(ParagraphOutcome::Skipped {
                index,
                reason: SkipReason::SectionProperties,
            });
            continue;
        }

        let style_id = registry
            .style_for(&item.csi_role)
            .ok_or_else(|| Error::UnmappedRole {
                role: item.csi_role.clone(),
                index,
            })?
            .to_string();
        let previous = block.style_id()?;

        if previous.as_deref() == Some(style_id.as_str()) {
            outcomes.push(ParagraphOutcome::StyleAssigned {
                index,
                role: item.csi_role.clone(),
                previous,
                style_id,
                changed: false,
                numbering_materialized: false,
            });
            continue;
        }

        let mut numbering_materialized = false;
        if let Some(with_numbering) = materialize_numbering(block, sheet, previous.as_deref())? {
            block.xml = with_numbering;
            numbering_materialized = true;
        }
        block.xml = assign_style(&block.xml, &style_id)?;

        log.info(
            Stage::Apply,
            format!(
                "p[{}] {}: {} -> {}{}",
                index,
                item.csi_role,
                previous.as_deref().unwrap_or("(none)"),
                style_id,
                if numbering_materialized {
                    " (numbering materialized)"
                } else {
                    ""
                }
            ),
        );
        outcomes.push(ParagraphOutcome::StyleAssigned {
            index,
            role: item.csi_role.clone(),
            previous,
            style_id,
            changed: true,
            numbering_materialized,
        });
    }

    contract.verify(&blocks)?;
    properties.verify(&blocks)?;

    let application = Application {
        document: splice_paragraphs(document, &blocks),
        outcomes,
    };
    paragraph_count_unchanged(blocks.len(), &application.document)?;
    log.info(
        Stage::Apply,
        format!(
            "{} paragraph(s) restyled, {} skipped, {} with materialized numbering",
            application.changed_count(),
            application.skipped_count(),
            application.materialized_count()
        ),
    );
    Ok(application)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Role;

    const STYLES: &str = r#"<w:styles>
<w:style w:type="paragraph" w:default="1" w:styleId="Normal"><w:name w:val="Normal"/></w:style>
<w:style w:type="paragraph" w:styleId="ListBullet"><w:name w:val="List Bullet"/><w:pPr><w:numPr><w:numId w:val="4"/></w:numPr></w:pPr></w:style>
<w:style w:type="paragraph" w:styleId="ListBullet2"><w:name w:val="List Bullet 2"/><w:basedOn w:val="ListBullet"/></w:style>
<w:style w:type="paragraph" w:styleId="NoList"><w:name w:val="No List"/><w:basedOn w:val="ListBullet"/><w:pPr><w:numPr><w:numId w:val="0"/></w:numPr></w:pPr></w:style>
<w:style w:type="paragraph" w:styleId="CSI-Part"><w:name w:val="CSI Part"/></w:style>
<w:style w:type="paragraph" w:styleId="CSI-Article"><w:name w:val="CSI Article"/></w:style>
</w:styles>"#;

    const DOCUMENT: &str = r#"<w:document><w:body>
<w:p><w:pPr></w:pPr><w:r><w:t>PART 1 GENERAL</w:t></w:r></w:p>
<w:p><w:pPr><w:pStyle w:val="ListBullet2"/><w:jc w:val="left"/></w:pPr><w:r><w:rPr><w:b/></w:rPr><w:t>1.1 SUMMARY</w:t></w:r></w:p>
<w:p/>
<w:p><w:pPr><w:pStyle w:val="CSI-Part"/></w:pPr><w:r><w:t>PART 2</w:t></w:r></w:p>
<w:p><w:pPr><w:sectPr><w:pgSz w:w="12240"/></w:sectPr></w:pPr></w:p>
<w:p><w:pPr><w:pStyle w:val="NoList"/></w:pPr><w:r><w:t>plain</w:t></w:r></w:p>
</w:body></w:document>"#;

    fn registry() -> RoleRegistry {
        RoleRegistry::from_mappings([
            (Role::Part, "CSI-Part".to_string()),
            (Role::Article, "CSI-Article".to_string()),
        ])
        .unwrap()
    }

    fn batch(items: &[(usize, &str)]) -> Vec<Classification> {
        items
            .iter()
            .map(|(i, r)| Classification {
                paragraph_index: *i,
                csi_role: r.to_string(),
            })
            .collect()
    }

    fn run(items: &[(usize, &str)]) -> Result<Application> {
        let sheet = StyleSheet::parse(STYLES).unwrap();
        apply_classifications(DOCUMENT, &sheet, &registry(), &batch(items), &mut AuditLog::new())
    }

    #[test]
    fn test_assign_style_forms() {
        assert_eq!(
            assign_style("<w:p/>", "A").unwrap(),
            r#"<w:p><w:pPr><w:pStyle w:val="A"/></w:pPr></w:p>"#
        );
        assert_eq!(
            assign_style(r#"<w:p><w:r><w:t>x</w:t></w:r></w:p>"#, "A").unwrap(),
            r#"<w:p><w:pPr><w:pStyle w:val="A"/></w:pPr><w:r><w:t>x</w:t></w:r></w:p>"#
        );
        assert_eq!(
            assign_style(r#"<w:p><w:pPr><w:jc w:val="left"/></w:pPr></w:p>"#, "A&B").unwrap(),
            r#"<w:p><w:pPr><w:pStyle w:val="A&amp;B"/><w:jc w:val="left"/></w:pPr></w:p>"#
        );
        assert_eq!(
            assign_style(r#"<w:p><w:pPr><w:pStyle w:val="Old"/></w:pPr></w:p>"#, "New").unwrap(),
            r#"<w:p><w:pPr><w:pStyle w:val="New"/></w:pPr></w:p>"#
        );
    }

    #[test]
    fn test_empty_properties_paragraph() {
        let app = run(&[(0, "PART")]).unwrap();
        assert!(app.document.contains(
            r#"<w:p><w:pPr><w:pStyle w:val="CSI-Part"/></w:pPr><w:r><w:t>PART 1 GENERAL</w:t></w:r></w:p>"#
        ));
        assert_eq!(app.changed_count(), 1);
    }

    #[test]
    fn test_only_classified_paragraphs_change() {
        let app = run(&[(2, "ARTICLE")]).unwrap();
        let expected = DOCUMENT.replacen(
            "<w:p/>",
            r#"<w:p><w:pPr><w:pStyle w:val="CSI-Article"/></w:pPr></w:p>"#,
            1,
        );
        assert_eq!(app.document, expected);
    }

    #[test]
    fn test_numbering_materialized_from_old_style() {
        let app = run(&[(1, "ARTICLE")]).unwrap();
        assert!(app.document.contains(
            r#"<w:pPr><w:pStyle w:val="CSI-Article"/><w:numPr><w:numId w:val="4"/></w:numPr><w:jc w:val="left"/></w:pPr><w:r><w:rPr><w:b/></w:rPr>"#
        ));
        match &app.outcomes[0] {
            ParagraphOutcome::StyleAssigned {
                previous,
                numbering_materialized,
                changed,
                ..
            } => {
                assert_eq!(previous.as_deref(), Some("ListBullet2"));
                assert!(*numbering_materialized);
                assert!(*changed);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn test_disabled_numbering_not_materialized() {
        let app = run(&[(5, "PART")]).unwrap();
        assert!(app.document.contains(
            r#"<w:p><w:pPr><w:pStyle w:val="CSI-Part"/></w:pPr><w:r><w:t>plain</w:t></w:r></w:p>"#
        ));
        assert_eq!(app.materialized_count(), 0);
    }

    #[test]
    fn test_same_style_is_unchanged() {
        let app = run(&[(3, "PART")]).unwrap();
        assert_eq!(app.document, DOCUMENT);
        assert!(matches!(
            app.outcomes[0],
            ParagraphOutcome::StyleAssigned { changed: false, .. }
        ));
    }

    #[test]
    fn test_section_paragraph_skipped() {
        let app = run(&[(4, "PART")]).unwrap();
        assert_eq!(app.document, DOCUMENT);
        assert_eq!(
            app.outcomes,
            vec![ParagraphOutcome::Skipped {
                index: 4,
                reason: SkipReason::SectionProperties
            }]
        );
    }

    #[test]
    fn test_batch_errors_before_mutation() {
        assert!(matches!(
            run(&[(0, "PART"), (6, "PART")]),
            Err(Error::ParagraphOutOfRange { index: 6, count: 6 })
        ));
        assert!(matches!(
            run(&[(0, "PART"), (1, "PARAGRAPH")]),
            Err(Error::UnmappedRole { index: 1, .. })
        ));
        assert!(matches!(
            run(&[(0, "PART"), (0, "ARTICLE")]),
            Err(Error::DuplicateClassification(0))
        ));
    }

    #[test]
    fn test_outcome_serialization() {
        let outcome = ParagraphOutcome::Skipped {
            index: 4,
            reason: SkipReason::SectionProperties,
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["outcome"], "skipped");
        assert_eq!(json["reason"], "section_properties");
        assert_eq!(outcome.index(), 4);
    }
}
