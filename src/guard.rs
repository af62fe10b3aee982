//! Invariant checks around paragraph rewriting.
//!
//! A [`ParagraphContract`] records every paragraph before it is touched and
//! proves afterwards that only the style reference (and a newly materialized
//! numbering reference) changed. A [`StabilitySnapshot`] hashes the parts a
//! restyle must never alter.

use crate::container::OoxmlContainer;
use crate::docx::regions::{
    element_inner, find_elements, first_child, paragraph_blocks, paragraph_properties,
    remove_children, root_region, splice, ParagraphBlock,
};
use crate::docx::schema::expanded;
use crate::docx::{DOCUMENT, DOCUMENT_RELS};
use crate::error::{Error, Result};
use sha2::{Digest, Sha256};
use similar::TextDiff;
use std::collections::{BTreeMap, BTreeSet};

/// Longest diff carried in a contract violation.
pub const MAX_DIFF_CHARS: usize = 4000;

/// Run-property kinds a restyle may legitimately affect.
const FONT_PROPERTIES: [&str; 3] = ["w:rFonts", "w:sz", "w:szCs"];

/// Read access to package parts by name.
pub trait PartSource {
    /// Every part name in the package.
    fn part_names(&self) -> Vec<String>;

    /// Raw bytes of a part, or `None` if it does not exist.
    fn part_bytes(&self, name: &str) -> Result<Option<Vec<u8>>>;
}

impl PartSource for OoxmlContainer {
    fn part_names(&self) -> Vec<String> {
        self.list_files()
    }

    fn part_bytes(&self, name: &str) -> Result<Option<Vec<u8>>> {
        if self.exists(name) {
            Ok(Some(self.read_binary(name)?))
        } else {
            Ok(None)
        }
    }
}

fn digest(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

fn is_header_or_footer(name: &str) -> bool {
    (name.starts_with("word/header") || name.starts_with("word/footer")) && name.ends_with(".xml")
}

/// Hashes of everything a restyle must leave byte-identical.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StabilitySnapshot {
    /// Header and footer parts by name
    pub header_footer: BTreeMap<String, String>,
    /// All `w:sectPr` blocks of the document, joined
    pub section_properties: String,
    /// The document relationships part (empty when absent)
    pub document_rels: String,
}

impl StabilitySnapshot {
    /// Hash the protected parts of `parts`.
    pub fn capture(parts: &impl PartSource) -> Result<Self> {
        let mut header_footer = BTreeMap::new();
        for name in parts.part_names().into_iter().filter(|n| is_header_or_footer(n)) {
            if let Some(bytes) = parts.part_bytes(&name)? {
                header_footer.insert(name, digest(&bytes));
            }
        }

        let document = parts
            .part_bytes(DOCUMENT)?
            .ok_or_else(|| Error::MissingComponent(DOCUMENT.to_string()))?;
        let document = String::from_utf8_lossy(&document);
        let sections: Vec<&str> = find_elements(&document, "w:sectPr")?
            .into_iter()
            .map(|r| r.slice(&document))
            .collect();

        let document_rels = parts
            .part_bytes(DOCUMENT_RELS)?
            .map(|b| digest(&b))
            .unwrap_or_default();

        Ok(Self {
            header_footer,
            section_properties: digest(sections.join("\n").as_bytes()),
            document_rels,
        })
    }

    /// Names of everything that differs between two snapshots.
    pub fn changes(&self, other: &Self) -> Vec<String> {
        let names: BTreeSet<&String> = self
            .header_footer
            .keys()
            .chain(other.header_footer.keys())
            .collect();
        let mut changed: Vec<String> = names
            .into_iter()
            .filter(|n| self.header_footer.get(*n) != other.header_footer.get(*n))
            .cloned()
            .collect();
        if self.section_properties != other.section_properties {
            changed.push("sectPr".to_string());
        }
        if self.document_rels != other.document_rels {
            changed.push(DOCUMENT_RELS.to_string());
        }
        changed
    }

    /// Re-hash `parts` and fail if anything protected moved.
    pub fn verify(&self, parts: &impl PartSource) -> Result<()> {
        let changed = self.changes(&Self::capture(parts)?);
        if changed.is_empty() {
            Ok(())
        } else {
            Err(Error::StabilityViolation { changed })
        }
    }
}

/// Unified diff of two texts, truncated to [`MAX_DIFF_CHARS`].
pub fn bounded_diff(before: &str, after: &str, before_label: &str, after_label: &str) -> String {
    let diff = TextDiff::from_lines(before, after)
        .unified_diff()
        .context_radius(3)
        .header(before_label, after_label)
        .to_string();
    if diff.chars().count() <= MAX_DIFF_CHARS {
        diff
    } else {
        let mut cut: String = diff.chars().take(MAX_DIFF_CHARS).collect();
        cut.push_str("\n... (diff truncated)");
        cut
    }
}

/// Drop the permitted edits from a property block; `None` when nothing
/// else remains.
fn normalize_properties(ppr: &str, strip_numbering: bool) -> Result<Option<String>> {
    let mut block = remove_children(ppr, "w:pStyle")?;
    if strip_numbering {
        block = remove_children(&block, "w:numPr")?;
    }
    let root = root_region(&block)?;
    let empty = element_inner(&block, root).is_none_or(|inner| inner.trim().is_empty());
    Ok((!empty).then_some(block))
}

fn normalize_paragraph(p_xml: &str, strip_numbering: bool) -> Result<String> {
    let p = expanded(p_xml)?;
    let root = root_region(&p)?;
    let Some(ppr) = first_child(&p, root, "w:pPr")? else {
        return Ok(p);
    };
    let block = normalize_properties(ppr.slice(&p), strip_numbering)?;
    Ok(splice(&p, &[(ppr, block.as_deref().unwrap_or(""))]))
}

fn own_properties(p_xml: &str, strip_numbering: bool) -> Result<Option<String>> {
    match paragraph_properties(p_xml)? {
        Some(ppr) => normalize_properties(ppr, strip_numbering),
        None => Ok(None),
    }
}

#[derive(Debug, Clone)]
struct Recorded {
    xml: String,
    had_numbering: bool,
}

impl Recorded {
    fn of(block: &ParagraphBlock) -> Result<Self> {
        Ok(Self {
            xml: block.xml.clone(),
            had_numbering: block.numbering()?.is_some(),
        })
    }
}

/// Whole-paragraph contract.
///
/// After removing `w:pStyle` everywhere, `w:numPr` where the paragraph had
/// none before, and any property block left empty, each paragraph must be
/// byte-identical to its recorded form.
#[derive(Debug, Clone, Default)]
pub struct ParagraphContract {
    recorded: BTreeMap<usize, Recorded>,
}

impl ParagraphContract {
    /// Record the given paragraphs.
    pub fn capture<'a>(blocks: impl IntoIterator<Item = &'a ParagraphBlock>) -> Result<Self> {
        let mut recorded = BTreeMap::new();
        for block in blocks {
            recorded.insert(block.index, Recorded::of(block)?);
        }
        Ok(Self { recorded })
    }

    /// Number of recorded paragraphs.
    pub fn len(&self) -> usize {
        self.recorded.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recorded.is_empty()
    }

    /// Check every recorded paragraph against its current text.
    pub fn verify(&self, blocks: &[ParagraphBlock]) -> Result<()> {
        for block in blocks {
            let Some(before) = self.recorded.get(&block.index) else {
                continue;
            };
            let strip = !before.had_numbering;
            let expected = normalize_paragraph(&before.xml, strip)?;
            let actual = normalize_paragraph(&block.xml, strip)?;
            if expected != actual {
                return Err(Error::ContractViolation {
                    index: block.index,
                    diff: bounded_diff(
                        &expected,
                        &actual,
                        &format!("before:p[{}]", block.index),
                        &format!("after:p[{}]", block.index),
                    ),
                });
            }
        }
        Ok(())
    }
}

/// Property-block contract: the paragraph's own `w:pPr` may differ only in
/// `w:pStyle` and newly added `w:numPr`.
#[derive(Debug, Clone, Default)]
pub struct PropertyContract {
    recorded: BTreeMap<usize, Recorded>,
}

impl PropertyContract {
    pub fn capture<'a>(blocks: impl IntoIterator<Item = &'a ParagraphBlock>) -> Result<Self> {
        let mut recorded = BTreeMap::new();
        for block in blocks {
            recorded.insert(block.index, Recorded::of(block)?);
        }
        Ok(Self { recorded })
    }

    pub fn verify(&self, blocks: &[ParagraphBlock]) -> Result<()> {
        for block in blocks {
            let Some(before) = self.recorded.get(&block.index) else {
                continue;
            };
            let strip = !before.had_numbering;
            let expected = own_properties(&before.xml, strip)?.unwrap_or_default();
            let actual = own_properties(&block.xml, strip)?.unwrap_or_default();
            if expected != actual {
                return Err(Error::ContractViolation {
                    index: block.index,
                    diff: bounded_diff(
                        &expected,
                        &actual,
                        &format!("before:pPr[{}]", block.index),
                        &format!("after:pPr[{}]", block.index),
                    ),
                });
            }
        }
        Ok(())
    }
}

/// Fail if rebuilding the document changed how many paragraphs it has.
pub fn paragraph_count_unchanged(before: usize, after_document: &str) -> Result<()> {
    let after = paragraph_blocks(after_document)?.len();
    if before == after {
        return Ok(());
    }
    Err(Error::ContractViolation {
        index: before.min(after),
        diff: format!("paragraph count changed: {} -> {}", before, after),
    })
}

fn comparable_run_properties(document: &str) -> Result<Vec<String>> {
    let mut out = Vec::new();
    for region in find_elements(document, "w:rPr")? {
        let mut block = region.slice(document).to_string();
        for kind in FONT_PROPERTIES {
            block = remove_children(&block, kind)?;
        }
        out.push(block);
    }
    Ok(out)
}

/// Fail if any run property other than fonts and sizes differs between two
/// document texts.
pub fn run_properties_unchanged(before: &str, after: &str) -> Result<()> {
    let before = comparable_run_properties(before)?;
    let after = comparable_run_properties(after)?;
    if before.len() != after.len() {
        return Err(Error::StabilityViolation {
            changed: vec![format!("w:rPr count {} -> {}", before.len(), after.len())],
        });
    }
    let changed: Vec<String> = before
        .iter()
        .zip(&after)
        .enumerate()
        .filter(|(_, (b, a))| b != a)
        .map(|(i, _)| format!("w:rPr[{}]", i))
        .collect();
    if changed.is_empty() {
        Ok(())
    } else {
        Err(Error::StabilityViolation { changed })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Parts(BTreeMap<String, Vec<u8>>);

    impl PartSource for Parts {
        fn part_names(&self) -> Vec<String> {
            self.0.keys().cloned().collect()
        }

        fn part_bytes(&self, name: &str) -> Result<Option<Vec<u8>>> {
            Ok(self.0.get(name).cloned())
        }
    }

    fn package(document: &str, header: &str) -> Parts {
        let mut parts = BTreeMap::new();
        parts.insert(DOCUMENT.to_string(), document.as_bytes().to_vec());
        parts.insert("word/header1.xml".to_string(), header.as_bytes().to_vec());
        parts.insert("word/footer1.xml".to_string(), b"<w:ftr/>".to_vec());
        parts.insert(DOCUMENT_RELS.to_string(), b"<Relationships/>".to_vec());
        Parts(parts)
    }

    const DOC: &str = r#"<w:document><w:body><w:p><w:pPr><w:sectPr><w:pgSz w:w="12240"/></w:sectPr></w:pPr></w:p><w:p><w:r><w:t>x</w:t></w:r></w:p><w:sectPr><w:pgMar w:top="1440"/></w:sectPr></w:body></w:document>"#;

    fn block(index: usize, xml: &str) -> ParagraphBlock {
        let mut b = paragraph_blocks(xml).unwrap().remove(0);
        b.index = index;
        b
    }

    #[test]
    fn test_snapshot_detects_header_change() {
        let before = StabilitySnapshot::capture(&package(DOC, "<w:hdr/>")).unwrap();
        assert!(before.verify(&package(DOC, "<w:hdr/>")).is_ok());

        let err = before.verify(&package(DOC, "<w:hdr><w:p/></w:hdr>")).unwrap_err();
        assert!(matches!(err, Error::StabilityViolation { ref changed } if changed == &vec!["word/header1.xml".to_string()]));
    }

    #[test]
    fn test_snapshot_detects_section_change() {
        let before = StabilitySnapshot::capture(&package(DOC, "<w:hdr/>")).unwrap();
        let moved = DOC.replace("12240", "11906");
        let err = before.verify(&package(&moved, "<w:hdr/>")).unwrap_err();
        assert!(matches!(err, Error::StabilityViolation { ref changed } if changed == &vec!["sectPr".to_string()]));

        // Body text outside sections is not protected by the snapshot.
        let edited = DOC.replace(">x<", ">y<");
        assert!(before.verify(&package(&edited, "<w:hdr/>")).is_ok());
    }

    #[test]
    fn test_snapshot_without_rels() {
        let mut parts = package(DOC, "<w:hdr/>");
        parts.0.remove(DOCUMENT_RELS);
        let snap = StabilitySnapshot::capture(&parts).unwrap();
        assert_eq!(snap.document_rels, "");
        assert_eq!(snap.header_footer.len(), 2);

        let with_rels = StabilitySnapshot::capture(&package(DOC, "<w:hdr/>")).unwrap();
        assert_eq!(snap.changes(&with_rels), vec![DOCUMENT_RELS.to_string()]);
    }

    #[test]
    fn test_contract_allows_style_and_new_numbering() {
        let before = block(0, r#"<w:p><w:pPr><w:jc w:val="left"/></w:pPr><w:r><w:t>a</w:t></w:r></w:p>"#);
        let contract = ParagraphContract::capture([&before]).unwrap();
        let properties = PropertyContract::capture([&before]).unwrap();

        let mut after = before.clone();
        after.xml = r#"<w:p><w:pPr><w:pStyle w:val="CSI-Part"/><w:numPr><w:numId w:val="3"/></w:numPr><w:jc w:val="left"/></w:pPr><w:r><w:t>a</w:t></w:r></w:p>"#.to_string();
        assert!(contract.verify(std::slice::from_ref(&after)).is_ok());
        assert!(properties.verify(std::slice::from_ref(&after)).is_ok());
    }

    #[test]
    fn test_contract_treats_empty_properties_as_absent() {
        let before = block(2, "<w:p/>");
        let contract = ParagraphContract::capture([&before]).unwrap();
        let mut after = before.clone();
        after.xml = r#"<w:p><w:pPr><w:pStyle w:val="A"/></w:pPr></w:p>"#.to_string();
        assert!(contract.verify(&[after]).is_ok());

        let before = block(0, r#"<w:p><w:pPr/><w:r><w:t>a</w:t></w:r></w:p>"#);
        let contract = ParagraphContract::capture([&before]).unwrap();
        let mut after = before.clone();
        after.xml = r#"<w:p><w:pPr><w:pStyle w:val="A"/></w:pPr><w:r><w:t>a</w:t></w:r></w:p>"#.to_string();
        assert!(contract.verify(&[after]).is_ok());
    }

    #[test]
    fn test_contract_rejects_other_edits() {
        let before = block(4, r#"<w:p><w:pPr><w:numPr><w:numId w:val="2"/></w:numPr></w:pPr><w:r><w:t>a</w:t></w:r></w:p>"#);
        let contract = ParagraphContract::capture([&before]).unwrap();

        // Existing numbering may not be rewritten.
        let mut after = before.clone();
        after.xml = before.xml.replace(r#"w:val="2""#, r#"w:val="9""#);
        let err = contract.verify(&[after]).unwrap_err();
        match err {
            Error::ContractViolation { index, diff } => {
                assert_eq!(index, 4);
                assert!(diff.contains("before:p[4]"));
                assert!(diff.contains("after:p[4]"));
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let mut after = before.clone();
        after.xml = before.xml.replace(">a<", ">b<");
        assert!(contract.verify(&[after]).is_err());
    }

    #[test]
    fn test_property_contract_rejects_property_edit() {
        let before = block(1, r#"<w:p><w:pPr><w:jc w:val="left"/></w:pPr></w:p>"#);
        let contract = PropertyContract::capture([&before]).unwrap();
        let mut after = before.clone();
        after.xml = r#"<w:p><w:pPr><w:jc w:val="both"/></w:pPr></w:p>"#.to_string();
        let err = contract.verify(&[after]).unwrap_err();
        assert!(matches!(err, Error::ContractViolation { index: 1, ref diff } if diff.contains("before:pPr[1]")));
    }

    #[test]
    fn test_diff_is_truncated() {
        let before = "a\n".repeat(3000);
        let after = "b\n".repeat(3000);
        let diff = bounded_diff(&before, &after, "l", "r");
        assert!(diff.chars().count() <= MAX_DIFF_CHARS + 30);
        assert!(diff.ends_with("(diff truncated)"));
    }

    #[test]
    fn test_paragraph_count() {
        assert!(paragraph_count_unchanged(2, DOC).is_ok());
        assert!(matches!(
            paragraph_count_unchanged(3, DOC),
            Err(Error::ContractViolation { index: 2, .. })
        ));
    }

    #[test]
    fn test_run_properties_ignore_fonts_and_sizes() {
        let before = r#"<w:p><w:r><w:rPr><w:rFonts w:ascii="Arial"/><w:b/><w:sz w:val="20"/></w:rPr><w:t>a</w:t></w:r></w:p>"#;
        let resized = r#"<w:p><w:r><w:rPr><w:b/><w:sz w:val="24"/><w:szCs w:val="24"/></w:rPr><w:t>a</w:t></w:r></w:p>"#;
        assert!(run_properties_unchanged(before, resized).is_ok());

        let unbolded = r#"<w:p><w:r><w:rPr><w:rFonts w:ascii="Arial"/><w:sz w:val="20"/></w:rPr><w:t>a</w:t></w:r></w:p>"#;
        let err = run_properties_unchanged(before, unbolded).unwrap_err();
        assert!(matches!(err, Error::StabilityViolation { ref changed } if changed == &vec!["w:rPr[0]".to_string()]));
    }
}
