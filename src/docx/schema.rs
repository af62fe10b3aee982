//! Child ordering for the WordprocessingML elements this crate inserts into.
//!
//! Word rejects property blocks whose children are out of schema sequence,
//! so new children are placed before the first existing sibling that must
//! follow them rather than appended blindly.

use super::regions::{child_elements, open_tag, root_region};
use crate::error::{Error, Result};

/// `CT_PPr` child sequence.
pub const PARAGRAPH_PROPERTIES: &[&str] = &[
    "w:pStyle",
    "w:keepNext",
    "w:keepLines",
    "w:pageBreakBefore",
    "w:framePr",
    "w:widowControl",
    "w:numPr",
    "w:suppressLineNumbers",
    "w:pBdr",
    "w:shd",
    "w:tabs",
    "w:suppressAutoHyphens",
    "w:kinsoku",
    "w:wordWrap",
    "w:overflowPunct",
    "w:topLinePunct",
    "w:autoSpaceDE",
    "w:autoSpaceDN",
    "w:bidi",
    "w:adjustRightInd",
    "w:snapToGrid",
    "w:spacing",
    "w:ind",
    "w:contextualSpacing",
    "w:mirrorIndents",
    "w:suppressOverlap",
    "w:jc",
    "w:textDirection",
    "w:textAlignment",
    "w:textboxTightWrap",
    "w:outlineLvl",
    "w:divId",
    "w:cnfStyle",
    "w:rPr",
    "w:sectPr",
    "w:pPrChange",
];

/// `CT_RPr` child sequence.
pub const RUN_PROPERTIES: &[&str] = &[
    "w:rStyle",
    "w:rFonts",
    "w:b",
    "w:bCs",
    "w:i",
    "w:iCs",
    "w:caps",
    "w:smallCaps",
    "w:strike",
    "w:dstrike",
    "w:outline",
    "w:shadow",
    "w:emboss",
    "w:imprint",
    "w:noProof",
    "w:snapToGrid",
    "w:vanish",
    "w:webHidden",
    "w:color",
    "w:spacing",
    "w:w",
    "w:kern",
    "w:position",
    "w:sz",
    "w:szCs",
    "w:highlight",
    "w:u",
    "w:effect",
    "w:bdr",
    "w:shd",
    "w:fitText",
    "w:vertAlign",
    "w:rtl",
    "w:cs",
    "w:em",
    "w:lang",
    "w:eastAsianLayout",
    "w:specVanish",
    "w:oMath",
    "w:rPrChange",
];

/// `CT_Style` child sequence.
pub const STYLE: &[&str] = &[
    "w:name",
    "w:aliases",
    "w:basedOn",
    "w:next",
    "w:link",
    "w:autoRedefine",
    "w:hidden",
    "w:uiPriority",
    "w:semiHidden",
    "w:unhideWhenUsed",
    "w:qFormat",
    "w:locked",
    "w:personal",
    "w:personalCompose",
    "w:personalReply",
    "w:rsid",
    "w:pPr",
    "w:rPr",
    "w:tblPr",
    "w:trPr",
    "w:tcPr",
    "w:tblStylePr",
];

/// `CT_P` leading child: the property block comes first.
pub const PARAGRAPH: &[&str] = &["w:pPr"];

fn rank(order: &[&str], name: &str) -> usize {
    order.iter().position(|n| *n == name).unwrap_or(usize::MAX)
}

fn split_self_closing(element: &str) -> (String, String) {
    let tag = open_tag(element);
    let name_end = tag[1..]
        .find(|c: char| c.is_whitespace() || c == '/' || c == '>')
        .map(|i| i + 1)
        .unwrap_or(tag.len());
    let name = &tag[1..name_end];
    let opened = format!("{}>", tag.trim_end_matches('>').trim_end_matches('/').trim_end());
    (opened, format!("</{}>", name))
}

/// The element making up `xml`, written as an open/close pair.
///
/// Paired elements are returned unchanged.
pub fn expanded(xml: &str) -> Result<String> {
    let root = root_region(xml)?;
    if !root.self_closing || root.start != 0 {
        return Ok(xml.to_string());
    }
    let (opened, closing) = split_self_closing(xml);
    Ok(format!("{}{}{}", opened, closing, &xml[root.end..]))
}

/// Insert `child_xml` (an element named `child_name`) into the element that
/// makes up all of `parent_xml`, honoring `order`.
///
/// A self-closing parent is expanded into an open/close pair. Children not
/// listed in `order` are treated as trailing extensions.
pub fn insert_child(
    parent_xml: &str,
    child_xml: &str,
    child_name: &str,
    order: &[&str],
) -> Result<String> {
    let root = root_region(parent_xml)?;
    if root.start != 0 {
        return Err(Error::InvalidData(
            "parent fragment does not start with an element".to_string(),
        ));
    }

    if root.self_closing {
        let (opened, closing) = split_self_closing(parent_xml);
        return Ok(format!(
            "{}{}{}{}",
            opened,
            child_xml,
            closing,
            &parent_xml[root.end..]
        ));
    }

    let new_rank = rank(order, child_name);
    let children = child_elements(parent_xml, root)?;
    let insert_at = children
        .iter()
        .find(|c| rank(order, &c.name) > new_rank)
        .map(|c| c.region.start)
        .or_else(|| parent_xml[..root.end].rfind("</"))
        .ok_or_else(|| Error::InvalidData("element has no closing tag".to_string()))?;

    let mut out = String::with_capacity(parent_xml.len() + child_xml.len());
    out.push_str(&parent_xml[..insert_at]);
    out.push_str(child_xml);
    out.push_str(&parent_xml[insert_at..]);
    Ok(out)
}
