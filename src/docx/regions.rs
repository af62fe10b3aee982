//! Byte-offset region extraction over raw WordprocessingML text.
//!
//! Nothing here builds a tree. The XML is tokenized with `quick-xml` only to
//! learn where elements begin and end; every region is a span into the
//! original text, so edits can be spliced back without reformatting a
//! single byte outside the span.

use crate::error::{Error, Result};
use quick_xml::events::Event;
use quick_xml::Reader;
use regex::Regex;
use std::sync::LazyLock;

static ATTRIBUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([A-Za-z_][\w.:-]*)\s*=\s*(?:"([^"]*)"|'([^']*)')"#).expect("attribute pattern")
});

static TEXT_NODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<w:t(?:\s[^>]*)?>([\s\S]*?)</w:t>").expect("text pattern"));

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("ws pattern"));

/// A span of raw XML text covering one element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    /// Byte offset of the opening `<`.
    pub start: usize,
    /// Byte offset just past the closing `>`.
    pub end: usize,
    /// Whether the element is written as `<x .../>`.
    pub self_closing: bool,
}

impl Region {
    /// The raw text of this region.
    pub fn slice<'a>(&self, xml: &'a str) -> &'a str {
        &xml[self.start..self.end]
    }

    /// Shift the region by `offset` bytes.
    fn offset(self, offset: usize) -> Self {
        Self {
            start: self.start + offset,
            end: self.end + offset,
            self_closing: self.self_closing,
        }
    }
}

/// A direct child element of some parent region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Child {
    /// Qualified element name (e.g. `w:pStyle`).
    pub name: String,
    /// Span of the child in the text that was scanned.
    pub region: Region,
}

fn position(reader: &Reader<&[u8]>) -> usize {
    reader.buffer_position() as usize
}

fn xml_error(err: quick_xml::Error, offset: usize) -> Error {
    Error::XmlParse(format!("{} (near byte {})", err, offset))
}

/// Find every outermost occurrence of `qname` in `xml`.
///
/// Occurrences nested inside another occurrence of the same element (such
/// as paragraphs inside a text box) belong to the outer one.
pub fn find_elements(xml: &str, qname: &str) -> Result<Vec<Region>> {
    let target = qname.as_bytes();
    let mut reader = Reader::from_str(xml);
    let mut found = Vec::new();
    let mut depth = 0usize;
    let mut open_start = 0usize;

    loop {
        let before = position(&reader);
        let event = reader.read_event().map_err(|e| xml_error(e, before))?;
        match event {
            Event::Start(e) if e.name().as_ref() == target => {
                if depth == 0 {
                    open_start = before;
                }
                depth += 1;
            }
            Event::End(e) if e.name().as_ref() == target && depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    found.push(Region {
                        start: open_start,
                        end: position(&reader),
                        self_closing: false,
                    });
                }
            }
            Event::Empty(e) if e.name().as_ref() == target && depth == 0 => {
                found.push(Region {
                    start: before,
                    end: position(&reader),
                    self_closing: true,
                });
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(found)
}

/// Find the first outermost occurrence of `qname` in `xml`.
pub fn find_element(xml: &str, qname: &str) -> Result<Option<Region>> {
    Ok(find_elements(xml, qname)?.into_iter().next())
}

/// List the direct children of the element occupying `parent`.
pub fn child_elements(xml: &str, parent: Region) -> Result<Vec<Child>> {
    if parent.self_closing {
        return Ok(Vec::new());
    }

    let fragment = parent.slice(xml);
    let mut reader = Reader::from_str(fragment);
    let mut children = Vec::new();
    let mut depth = 0usize;
    let mut open: Option<(String, usize)> = None;

    loop {
        let before = position(&reader);
        let event = reader
            .read_event()
            .map_err(|e| xml_error(e, parent.start + before))?;
        match event {
            Event::Start(e) => {
                depth += 1;
                if depth == 2 {
                    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                    open = Some((name, before));
                }
            }
            Event::End(_) => {
                if depth == 2 {
                    if let Some((name, start)) = open.take() {
                        children.push(Child {
                            name,
                            region: Region {
                                start,
                                end: position(&reader),
                                self_closing: false,
                            }
                            .offset(parent.start),
                        });
                    }
                }
                depth = depth.saturating_sub(1);
            }
            Event::Empty(e) if depth == 1 => {
                children.push(Child {
                    name: String::from_utf8_lossy(e.name().as_ref()).into_owned(),
                    region: Region {
                        start: before,
                        end: position(&reader),
                        self_closing: true,
                    }
                    .offset(parent.start),
                });
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(children)
}

/// Find the first direct child named `qname` of the element at `parent`.
pub fn first_child(xml: &str, parent: Region, qname: &str) -> Result<Option<Region>> {
    Ok(child_elements(xml, parent)?
        .into_iter()
        .find(|c| c.name == qname)
        .map(|c| c.region))
}

/// The region of the element that starts at byte 0 of `xml`.
///
/// Used on fragments that are exactly one element (a paragraph block, a
/// style block, a property block).
pub fn root_region(xml: &str) -> Result<Region> {
    let mut reader = Reader::from_str(xml);
    let mut depth = 0usize;
    let mut start = None;

    loop {
        let before = position(&reader);
        let event = reader.read_event().map_err(|e| xml_error(e, before))?;
        match event {
            Event::Start(_) => {
                if depth == 0 {
                    start = Some(before);
                }
                depth += 1;
            }
            Event::End(_) => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    if let Some(start) = start {
                        return Ok(Region {
                            start,
                            end: position(&reader),
                            self_closing: false,
                        });
                    }
                }
            }
            Event::Empty(_) if depth == 0 => {
                return Ok(Region {
                    start: before,
                    end: position(&reader),
                    self_closing: true,
                });
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Err(Error::InvalidData("fragment contains no element".to_string()))
}

/// The opening tag of an element (`<w:pPr w:rsid="1">` or `<w:pPr/>`).
pub fn open_tag(element: &str) -> &str {
    let mut quote: Option<char> = None;
    for (i, ch) in element.char_indices() {
        match (quote, ch) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"') | (None, '\'') => quote = Some(ch),
            (None, '>') => return &element[..=i],
            _ => {}
        }
    }
    element
}

/// Read an attribute from the opening tag of `element`.
pub fn attribute(element: &str, qname: &str) -> Option<String> {
    let tag = open_tag(element);
    ATTRIBUTE.captures_iter(tag).find_map(|caps| {
        if &caps[1] == qname {
            caps.get(2)
                .or_else(|| caps.get(3))
                .map(|m| m.as_str().to_string())
        } else {
            None
        }
    })
}

/// Rewrite an existing attribute value on the opening tag of `element`.
///
/// Returns `None` when the attribute is not present.
pub fn set_attribute(element: &str, qname: &str, value: &str) -> Option<String> {
    let tag = open_tag(element);
    let span = ATTRIBUTE.captures_iter(tag).find_map(|caps| {
        if &caps[1] == qname {
            caps.get(2).or_else(|| caps.get(3)).map(|m| m.range())
        } else {
            None
        }
    })?;
    let mut out = String::with_capacity(element.len() + value.len());
    out.push_str(&element[..span.start]);
    out.push_str(value);
    out.push_str(&element[span.end..]);
    Some(out)
}

/// Escape a value for use inside a double-quoted attribute.
pub fn escape_attribute(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Inner text of a paired element region; `None` for self-closing ones.
pub fn element_inner<'a>(xml: &'a str, region: Region) -> Option<&'a str> {
    if region.self_closing {
        return None;
    }
    let element = region.slice(xml);
    let open_len = open_tag(element).len();
    let close_start = element.rfind("</")?;
    (close_start >= open_len).then(|| &element[open_len..close_start])
}

/// Remove every outermost occurrence of `qname` from `xml`.
pub fn remove_elements(xml: &str, qname: &str) -> Result<String> {
    let regions = find_elements(xml, qname)?;
    if regions.is_empty() {
        return Ok(xml.to_string());
    }
    let mut out = String::with_capacity(xml.len());
    let mut last = 0;
    for region in regions {
        out.push_str(&xml[last..region.start]);
        last = region.end;
    }
    out.push_str(&xml[last..]);
    Ok(out)
}

/// Remove the direct children named `qname` of the root element of `xml`.
pub fn remove_children(xml: &str, qname: &str) -> Result<String> {
    let root = root_region(xml)?;
    let mut out = String::with_capacity(xml.len());
    let mut last = 0;
    for child in child_elements(xml, root)?.into_iter().filter(|c| c.name == qname) {
        out.push_str(&xml[last..child.region.start]);
        last = child.region.end;
    }
    out.push_str(&xml[last..]);
    Ok(out)
}

/// Replace the text of each region with the matching replacement.
///
/// `edits` must be sorted by start offset and non-overlapping; every byte
/// outside the edited spans is copied from `xml` unchanged.
pub fn splice(xml: &str, edits: &[(Region, &str)]) -> String {
    let mut out = String::with_capacity(xml.len());
    let mut last = 0;
    for (region, text) in edits {
        out.push_str(&xml[last..region.start]);
        out.push_str(text);
        last = region.end;
    }
    out.push_str(&xml[last..]);
    out
}

/// Extract the raw `w:style` block whose `w:styleId` equals `style_id`.
pub fn style_block<'a>(sheet: &'a str, style_id: &str) -> Result<Option<&'a str>> {
    for region in find_elements(sheet, "w:style")? {
        let block = region.slice(sheet);
        if attribute(block, "w:styleId").as_deref() == Some(style_id) {
            return Ok(Some(block));
        }
    }
    Ok(None)
}

/// A paragraph's explicit numbering reference (`w:numPr`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NumberingRef {
    /// Numbering instance id (`w:numId/@w:val`).
    pub num_id: Option<String>,
    /// Indent level (`w:ilvl/@w:val`).
    pub level: Option<String>,
}

impl NumberingRef {
    /// Read a numbering reference from a `w:numPr` element.
    pub fn from_element(num_pr: &str) -> Result<Self> {
        let root = root_region(num_pr)?;
        let value = |name: &str| -> Result<Option<String>> {
            Ok(first_child(num_pr, root, name)?
                .and_then(|r| attribute(r.slice(num_pr), "w:val")))
        };
        Ok(Self {
            num_id: value("w:numId")?,
            level: value("w:ilvl")?,
        })
    }

    /// Whether this reference explicitly turns numbering off (`numId` 0).
    pub fn is_disabled(&self) -> bool {
        self.num_id.as_deref().map(str::trim) == Some("0")
    }
}

/// One paragraph of the document body, located by byte offsets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParagraphBlock {
    /// Position in document order (the index classifications refer to).
    pub index: usize,
    /// Span of the paragraph in the body text.
    pub region: Region,
    /// Raw paragraph text; may be edited in place before splicing.
    pub xml: String,
}

impl ParagraphBlock {
    /// The paragraph's own property block (`w:pPr` directly under `w:p`).
    pub fn properties(&self) -> Result<Option<&str>> {
        paragraph_properties(&self.xml)
    }

    /// The paragraph's style reference, if any.
    pub fn style_id(&self) -> Result<Option<String>> {
        paragraph_style_id(&self.xml)
    }

    /// The paragraph's explicit numbering reference, if any.
    pub fn numbering(&self) -> Result<Option<NumberingRef>> {
        paragraph_numbering(&self.xml)
    }

    /// Whether the paragraph carries section properties.
    pub fn has_section_properties(&self) -> Result<bool> {
        has_section_properties(&self.xml)
    }

    /// Run properties of the first run that contains visible text.
    pub fn first_text_run_properties(&self) -> Result<Option<&str>> {
        first_text_run_properties(&self.xml)
    }

    /// Visible text, whitespace-collapsed.
    pub fn visible_text(&self) -> String {
        visible_text(&self.xml)
    }
}

/// Locate every outermost paragraph of a document body.
pub fn paragraph_blocks(body: &str) -> Result<Vec<ParagraphBlock>> {
    Ok(find_elements(body, "w:p")?
        .into_iter()
        .enumerate()
        .map(|(index, region)| ParagraphBlock {
            index,
            region,
            xml: region.slice(body).to_string(),
        })
        .collect())
}

/// Rebuild `body` with the current text of every block spliced back in.
///
/// Blocks whose text is unchanged are copied from `body` as-is.
pub fn splice_paragraphs(body: &str, blocks: &[ParagraphBlock]) -> String {
    let edits: Vec<(Region, &str)> = blocks
        .iter()
        .filter(|b| b.region.slice(body) != b.xml)
        .map(|b| (b.region, b.xml.as_str()))
        .collect();
    splice(body, &edits)
}

/// The own property block of a paragraph's raw text.
pub fn paragraph_properties(p_xml: &str) -> Result<Option<&str>> {
    let root = root_region(p_xml)?;
    Ok(first_child(p_xml, root, "w:pPr")?.map(|r| r.slice(p_xml)))
}

/// The style reference of a paragraph's raw text.
pub fn paragraph_style_id(p_xml: &str) -> Result<Option<String>> {
    properties_child_value(p_xml, "w:pStyle")
}

/// The explicit numbering reference of a paragraph's raw text.
pub fn paragraph_numbering(p_xml: &str) -> Result<Option<NumberingRef>> {
    let Some(ppr) = paragraph_properties(p_xml)? else {
        return Ok(None);
    };
    let root = root_region(ppr)?;
    match first_child(ppr, root, "w:numPr")? {
        Some(region) => Ok(Some(NumberingRef::from_element(region.slice(ppr))?)),
        None => Ok(None),
    }
}

fn properties_child_value(p_xml: &str, qname: &str) -> Result<Option<String>> {
    let Some(ppr) = paragraph_properties(p_xml)? else {
        return Ok(None);
    };
    let root = root_region(ppr)?;
    Ok(first_child(ppr, root, qname)?.and_then(|r| attribute(r.slice(ppr), "w:val")))
}

/// Whether a paragraph's own `w:pPr` carries `w:sectPr`.
///
/// Paragraphs nested inside the paragraph (text boxes) do not count.
pub fn has_section_properties(p_xml: &str) -> Result<bool> {
    let Some(ppr) = paragraph_properties(p_xml)? else {
        return Ok(false);
    };
    let root = root_region(ppr)?;
    Ok(first_child(ppr, root, "w:sectPr")?.is_some())
}

/// Run properties of the first run in `p_xml` whose text is non-empty.
pub fn first_text_run_properties(p_xml: &str) -> Result<Option<&str>> {
    for run in find_elements(p_xml, "w:r")? {
        let run_xml = run.slice(p_xml);
        if visible_text(run_xml).is_empty() {
            continue;
        }
        let root = root_region(run_xml)?;
        return Ok(first_child(run_xml, root, "w:rPr")?
            .map(|r| &p_xml[run.start + r.start..run.start + r.end]));
    }
    Ok(None)
}

/// Visible text of a fragment: `w:t` contents, unescaped, whitespace-collapsed.
pub fn visible_text(xml: &str) -> String {
    let joined: String = TEXT_NODE
        .captures_iter(xml)
        .map(|c| c[1].to_string())
        .collect();
    let unescaped = joined
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&");
    WHITESPACE.replace_all(&unescaped, " ").trim().to_string()
}
