//! End-to-end restyle runs over synthetic packages.

use restyle::docx::{ParagraphOutcome, SkipReason, StyleSheet};
use restyle::pipeline::RestyleOptions;
use restyle::registry::{Classification, ClassificationSet, Role, RoleRegistry};
use restyle::{AuditLog, Error, OoxmlContainer, Restyler, Severity, Stage};
use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

const W: &str = r#"xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main""#;

const TARGET_CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Default Extension="png" ContentType="image/png"/><Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/><Override PartName="/word/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.styles+xml"/><Override PartName="/word/settings.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.settings+xml"/></Types>"#;

const TARGET_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/><Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/settings" Target="settings.xml"/><Relationship Id="rId3" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/header" Target="header1.xml"/><Relationship Id="rId4" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/numbering" Target="numbering.xml"/></Relationships>"#;

const HEADER: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:hdr xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:p><w:r><w:t>SECTION 09 91 23</w:t></w:r></w:p></w:hdr>"#;

const NUMBERING: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:numbering xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:abstractNum w:abstractNumId="0"><w:lvl w:ilvl="0"><w:numFmt w:val="bullet"/></w:lvl></w:abstractNum><w:num w:numId="4"><w:abstractNumId w:val="0"/></w:num></w:numbering>"#;

fn target_document() -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document {W}><w:body>
<w:p><w:r><w:t>SECTION 09 91 23</w:t></w:r></w:p>
<w:p><w:pPr><w:jc w:val="center"/></w:pPr><w:r><w:t>PAINTING</w:t></w:r></w:p>
<w:p><w:pPr></w:pPr><w:r><w:rPr><w:b/><w:sz w:val="24"/></w:rPr><w:t>PART 1 GENERAL</w:t></w:r></w:p>
<w:p><w:pPr><w:pStyle w:val="ListBullet"/></w:pPr><w:r><w:t>SUMMARY</w:t></w:r></w:p>
<w:p><w:pPr><w:pStyle w:val="Heading1"/><w:numPr><w:ilvl w:val="1"/><w:numId w:val="4"/></w:numPr></w:pPr><w:r><w:t>Section includes surface preparation.</w:t></w:r></w:p>
<w:p/>
<w:p><w:pPr><w:sectPr><w:headerReference w:type="default" r:id="rId3"/><w:pgSz w:w="12240" w:h="15840"/></w:sectPr></w:pPr></w:p>
<w:p><w:r><w:t>END OF SECTION</w:t></w:r></w:p>
<w:sectPr><w:pgSz w:w="12240" w:h="15840"/><w:pgMar w:top="1440"/></w:sectPr>
</w:body></w:document>"#
    )
}

fn target_styles() -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:styles {W}><w:docDefaults><w:rPrDefault><w:rPr><w:rFonts w:ascii="Calibri" w:hAnsi="Calibri"/><w:sz w:val="22"/></w:rPr></w:rPrDefault></w:docDefaults>
<w:style w:type="paragraph" w:default="1" w:styleId="Normal"><w:name w:val="Normal"/><w:qFormat/></w:style>
<w:style w:type="paragraph" w:styleId="ListBullet"><w:name w:val="List Bullet"/><w:basedOn w:val="Normal"/><w:pPr><w:numPr><w:numId w:val="4"/></w:numPr></w:pPr></w:style>
<w:style w:type="paragraph" w:styleId="Heading1"><w:name w:val="heading 1"/><w:basedOn w:val="Normal"/></w:style>
</w:styles>"#
    )
}

fn target_settings() -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:settings {W}><w:zoom w:percent="100"/><w:compat><w:compatSetting w:name="compatibilityMode" w:uri="http://schemas.microsoft.com/office/word" w:val="14"/></w:compat></w:settings>"#
    )
}

fn architect_styles() -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:styles {W}><w:docDefaults><w:rPrDefault><w:rPr><w:rFonts w:ascii="Arial" w:hAnsi="Arial"/><w:sz w:val="20"/><w:szCs w:val="20"/><w:lang w:val="en-US"/></w:rPr></w:rPrDefault><w:pPrDefault><w:pPr><w:spacing w:after="0"/></w:pPr></w:pPrDefault></w:docDefaults>
<w:style w:type="paragraph" w:default="1" w:styleId="Normal"><w:name w:val="Normal"/><w:qFormat/></w:style>
<w:style w:type="paragraph" w:customStyle="1" w:styleId="CSI-Base"><w:name w:val="CSI Base"/><w:basedOn w:val="Normal"/><w:pPr><w:jc w:val="both"/></w:pPr><w:rPr><w:rFonts w:ascii="Arial" w:hAnsi="Arial"/></w:rPr></w:style>
<w:style w:type="paragraph" w:customStyle="1" w:styleId="CSI-SectionTitle"><w:name w:val="CSI Section Title"/><w:basedOn w:val="CSI-Base"/><w:pPr><w:jc w:val="center"/></w:pPr><w:rPr><w:b/></w:rPr></w:style>
<w:style w:type="paragraph" w:customStyle="1" w:styleId="CSI-Part"><w:name w:val="CSI Part"/><w:basedOn w:val="CSI-Base"/><w:pPr><w:numPr><w:ilvl w:val="0"/><w:numId w:val="7"/></w:numPr><w:keepNext/></w:pPr><w:rPr><w:b/><w:sz w:val="24"/></w:rPr></w:style>
<w:style w:type="paragraph" w:customStyle="1" w:styleId="CSI-Article"><w:name w:val="CSI Article"/><w:basedOn w:val="CSI-Base"/></w:style>
</w:styles>"#
    )
}

fn architect_settings() -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:settings {W}><w:compat><w:compatSetting w:name="compatibilityMode" w:uri="http://schemas.microsoft.com/office/word" w:val="15"/></w:compat></w:settings>"#
    )
}

fn architect_fonts() -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:fonts {W}><w:font w:name="Arial"><w:panose1 w:val="020B0604020202020204"/></w:font></w:fonts>"#
    )
}

const THEME: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<a:theme xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" name="Architect"><a:themeElements/></a:theme>"#;

fn zip(entries: &[(&str, &[u8], CompressionMethod)]) -> Vec<u8> {
    let mut buffer = Cursor::new(Vec::new());
    {
        let mut writer = ZipWriter::new(&mut buffer);
        for (name, data, method) in entries {
            writer
                .start_file(*name, SimpleFileOptions::default().compression_method(*method))
                .unwrap();
            writer.write_all(data).unwrap();
        }
        writer.set_comment("synthetic target");
        writer.finish().unwrap();
    }
    buffer.into_inner()
}

fn target_package() -> Vec<u8> {
    let document = target_document();
    let styles = target_styles();
    let settings = target_settings();
    let deflated = CompressionMethod::Deflated;
    zip(&[
        ("[Content_Types].xml", TARGET_CONTENT_TYPES.as_bytes(), deflated),
        ("word/document.xml", document.as_bytes(), deflated),
        ("word/styles.xml", styles.as_bytes(), deflated),
        ("word/settings.xml", settings.as_bytes(), deflated),
        ("word/numbering.xml", NUMBERING.as_bytes(), deflated),
        ("word/header1.xml", HEADER.as_bytes(), deflated),
        ("word/_rels/document.xml.rels", TARGET_RELS.as_bytes(), deflated),
        ("word/media/image1.png", &b"\x89PNG\r\n\x1a\n"[..], CompressionMethod::Stored),
    ])
}

fn architect_package() -> Vec<u8> {
    let document = format!(r#"<w:document {W}><w:body><w:p/></w:body></w:document>"#);
    let styles = architect_styles();
    let settings = architect_settings();
    let fonts = architect_fonts();
    let deflated = CompressionMethod::Deflated;
    zip(&[
        ("[Content_Types].xml", TARGET_CONTENT_TYPES.as_bytes(), deflated),
        ("word/document.xml", document.as_bytes(), deflated),
        ("word/styles.xml", styles.as_bytes(), deflated),
        ("word/settings.xml", settings.as_bytes(), deflated),
        ("word/fontTable.xml", fonts.as_bytes(), deflated),
        ("word/theme/theme1.xml", THEME.as_bytes(), deflated),
    ])
}

fn registry() -> RoleRegistry {
    RoleRegistry::from_json(
        r#"{
            "version": 1,
            "source_docx": "architect.docx",
            "roles": {
                "SectionTitle": { "style_id": "CSI-SectionTitle" },
                "PART": { "style_id": "CSI-Part" },
                "ARTICLE": { "styleId": "CSI-Article" }
            }
        }"#,
    )
    .unwrap()
}

fn batch(items: &[(usize, &str)]) -> ClassificationSet {
    ClassificationSet {
        classifications: items
            .iter()
            .map(|(i, r)| Classification {
                paragraph_index: *i,
                csi_role: r.to_string(),
            })
            .collect(),
        notes: Vec::new(),
    }
}

struct Fixture {
    _dir: tempfile::TempDir,
    target: PathBuf,
    architect: PathBuf,
    output: PathBuf,
}

fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("target.docx");
    let architect = dir.path().join("architect.docx");
    std::fs::write(&target, target_package()).unwrap();
    std::fs::write(&architect, architect_package()).unwrap();
    let output = dir.path().join("out").join("restyled.docx");
    Fixture {
        _dir: dir,
        target,
        architect,
        output,
    }
}

fn part(path: &Path, name: &str) -> Option<Vec<u8>> {
    let mut archive = ZipArchive::new(std::fs::File::open(path).unwrap()).unwrap();
    let mut file = archive.by_name(name).ok()?;
    let mut data = Vec::new();
    file.read_to_end(&mut data).unwrap();
    Some(data)
}

fn part_text(path: &Path, name: &str) -> String {
    String::from_utf8(part(path, name).unwrap()).unwrap()
}

fn standard_batch() -> ClassificationSet {
    batch(&[(0, "SectionTitle"), (2, "PART"), (3, "ARTICLE"), (5, "ARTICLE")])
}

#[test]
fn full_restyle_changes_only_allowed_parts() {
    let f = fixture();
    let mut log = AuditLog::new();
    let report = Restyler::new(registry(), standard_batch())
        .run(&f.target, &f.architect, &f.output, &mut log)
        .unwrap();

    // Protected parts are byte-identical.
    for name in ["word/header1.xml", "word/numbering.xml", "word/media/image1.png"] {
        assert_eq!(part(&f.target, name), part(&f.output, name), "{name}");
    }

    let document = part_text(&f.output, "word/document.xml");
    assert!(document.contains(
        r#"<w:p><w:pPr><w:pStyle w:val="CSI-SectionTitle"/></w:pPr><w:r><w:t>SECTION 09 91 23</w:t></w:r></w:p>"#
    ));
    assert!(document.contains(
        r#"<w:p><w:pPr><w:pStyle w:val="CSI-Part"/></w:pPr><w:r><w:rPr><w:b/><w:sz w:val="24"/></w:rPr><w:t>PART 1 GENERAL</w:t></w:r></w:p>"#
    ));
    // The bullet came from the old style and is kept explicitly.
    assert!(document.contains(
        r#"<w:pPr><w:pStyle w:val="CSI-Article"/><w:numPr><w:numId w:val="4"/></w:numPr></w:pPr><w:r><w:t>SUMMARY</w:t></w:r>"#
    ));
    assert!(document.contains(r#"<w:p><w:pPr><w:pStyle w:val="CSI-Article"/></w:pPr></w:p>"#));

    // Unclassified paragraphs are untouched.
    let original = target_document();
    for untouched in [
        r#"<w:p><w:pPr><w:jc w:val="center"/></w:pPr><w:r><w:t>PAINTING</w:t></w:r></w:p>"#,
        r#"<w:p><w:pPr><w:pStyle w:val="Heading1"/><w:numPr><w:ilvl w:val="1"/><w:numId w:val="4"/></w:numPr></w:pPr>"#,
        r#"<w:p><w:r><w:t>END OF SECTION</w:t></w:r></w:p>"#,
    ] {
        assert!(original.contains(untouched));
        assert!(document.contains(untouched));
    }

    let styles = StyleSheet::parse(&part_text(&f.output, "word/styles.xml")).unwrap();
    for id in ["CSI-Base", "CSI-SectionTitle", "CSI-Part", "CSI-Article", "ListBullet"] {
        assert!(styles.contains(id), "{id}");
    }
    assert_eq!(styles.get("CSI-Part").unwrap().numbering, None);
    assert_eq!(report.stripped_numbering, vec!["CSI-Part".to_string()]);
    assert_eq!(
        report.imported_styles,
        vec!["CSI-Base", "CSI-SectionTitle", "CSI-Part", "CSI-Article"]
    );

    // Environment: theme and fonts added and registered, compat replaced.
    assert_eq!(part_text(&f.output, "word/theme/theme1.xml"), THEME);
    assert!(part(&f.output, "word/fontTable.xml").is_some());
    let content_types = part_text(&f.output, "[Content_Types].xml");
    assert!(content_types.contains(r#"PartName="/word/theme/theme1.xml""#));
    assert!(content_types.contains(r#"PartName="/word/fontTable.xml""#));
    let rels = part_text(&f.output, "word/_rels/document.xml.rels");
    assert!(rels.contains(r#"Target="theme/theme1.xml""#));
    assert!(rels.contains(r#"Target="fontTable.xml""#));
    assert!(part_text(&f.output, "word/settings.xml").contains(r#"w:val="15""#));

    let mut archive = ZipArchive::new(std::fs::File::open(&f.output).unwrap()).unwrap();
    assert_eq!(archive.comment(), b"synthetic target");
    assert_eq!(
        archive.by_name("word/media/image1.png").unwrap().compression(),
        CompressionMethod::Stored
    );

    let patch = report.patch.unwrap();
    assert_eq!(
        patch.added,
        vec!["word/fontTable.xml".to_string(), "word/theme/theme1.xml".to_string()]
    );
    assert!(log.stage_events(Stage::Apply).count() >= 4);
    assert!(log.render().contains("[verify]"));
}

#[test]
fn section_paragraph_is_skipped() {
    let f = fixture();
    let mut log = AuditLog::new();
    let report = Restyler::new(registry(), batch(&[(6, "PART")]))
        .run(&f.target, &f.architect, &f.output, &mut log)
        .unwrap();

    assert_eq!(
        report.outcomes,
        vec![ParagraphOutcome::Skipped {
            index: 6,
            reason: SkipReason::SectionProperties
        }]
    );
    assert_eq!(
        part(&f.output, "word/document.xml"),
        part(&f.target, "word/document.xml")
    );
    let apply_warnings = log
        .stage_events(Stage::Apply)
        .filter(|e| e.severity == Severity::Warning)
        .count();
    assert_eq!(apply_warnings, 1);
}

#[test]
fn unmapped_role_writes_nothing() {
    let f = fixture();
    let err = Restyler::new(registry(), batch(&[(0, "PART"), (1, "SUBPARAGRAPH")]))
        .run(&f.target, &f.architect, &f.output, &mut AuditLog::new())
        .unwrap_err();
    assert!(matches!(err, Error::UnmappedRole { index: 1, .. }));
    assert!(!f.output.exists());
}

#[test]
fn out_of_range_and_duplicates_write_nothing() {
    let f = fixture();
    let err = Restyler::new(registry(), batch(&[(8, "PART")]))
        .run(&f.target, &f.architect, &f.output, &mut AuditLog::new())
        .unwrap_err();
    assert!(matches!(err, Error::ParagraphOutOfRange { index: 8, count: 8 }));

    let err = Restyler::new(registry(), batch(&[(2, "PART"), (2, "ARTICLE")]))
        .run(&f.target, &f.architect, &f.output, &mut AuditLog::new())
        .unwrap_err();
    assert!(matches!(err, Error::DuplicateClassification(2)));
    assert!(!f.output.exists());
}

#[test]
fn missing_architect_style_writes_nothing() {
    let f = fixture();
    let registry = RoleRegistry::from_mappings([(Role::Part, "CSI-Missing".to_string())]).unwrap();
    let err = Restyler::new(registry, batch(&[(2, "PART")]))
        .run(&f.target, &f.architect, &f.output, &mut AuditLog::new())
        .unwrap_err();
    assert!(matches!(err, Error::MissingStyles(ref ids) if ids == &vec!["CSI-Missing".to_string()]));
    assert!(!f.output.exists());
}

#[test]
fn second_run_is_idempotent() {
    let f = fixture();
    let restyler = Restyler::new(registry(), standard_batch());
    restyler
        .run(&f.target, &f.architect, &f.output, &mut AuditLog::new())
        .unwrap();

    let again = f.output.with_file_name("again.docx");
    let report = restyler
        .run(&f.output, &f.architect, &again, &mut AuditLog::new())
        .unwrap();

    assert!(report.imported_styles.is_empty());
    assert!(report.changed_parts.is_empty());
    assert!(report
        .outcomes
        .iter()
        .all(|o| matches!(o, ParagraphOutcome::StyleAssigned { changed: false, .. })));
    for name in ["word/document.xml", "word/styles.xml", "[Content_Types].xml"] {
        assert_eq!(part(&f.output, name), part(&again, name), "{name}");
    }
}

#[test]
fn disabled_environment_touches_only_styles_and_document() {
    let f = fixture();
    let options = RestyleOptions::new()
        .with_theme(false)
        .with_settings(false)
        .with_font_table(false)
        .with_doc_defaults(false);
    let report = Restyler::new(registry(), batch(&[(2, "PART")]))
        .with_options(options)
        .run(&f.target, &f.architect, &f.output, &mut AuditLog::new())
        .unwrap();

    assert_eq!(
        report.changed_parts,
        vec!["word/document.xml".to_string(), "word/styles.xml".to_string()]
    );
    assert!(part(&f.output, "word/theme/theme1.xml").is_none());
    for name in ["[Content_Types].xml", "word/settings.xml", "word/_rels/document.xml.rels"] {
        assert_eq!(part(&f.target, name), part(&f.output, name), "{name}");
    }
}

#[test]
fn output_must_differ_from_target() {
    let f = fixture();
    let err = Restyler::new(registry(), batch(&[(2, "PART")]))
        .run(&f.target, &f.architect, &f.target, &mut AuditLog::new())
        .unwrap_err();
    assert!(matches!(err, Error::InvalidData(_)));
}

#[test]
fn preflight_and_listing() {
    let f = fixture();
    let target = OoxmlContainer::open(&f.target).unwrap();

    let paragraphs = restyle::list_paragraphs(&target).unwrap();
    assert_eq!(paragraphs.len(), 8);
    assert_eq!(paragraphs[3].style_id.as_deref(), Some("ListBullet"));
    assert_eq!(paragraphs[4].num_id.as_deref(), Some("4"));
    assert_eq!(paragraphs[4].level.as_deref(), Some("1"));
    assert!(paragraphs[6].has_section_properties);
    assert_eq!(paragraphs[7].text, "END OF SECTION");

    let preflight = Restyler::new(registry(), batch(&[(0, "PART"), (1, "PARAGRAPH"), (12, "PART")]))
        .preflight(&target)
        .unwrap();
    assert_eq!(preflight.paragraph_count, 8);
    assert_eq!(preflight.unmapped_roles, vec!["PARAGRAPH".to_string()]);
    assert_eq!(preflight.out_of_range, vec![12]);
    assert!(!preflight.is_clean());
}

#[test]
fn rejects_non_word_target() {
    let f = fixture();
    let sheet = zip(&[(
        "[Content_Types].xml",
        &br#"<Types><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/></Types>"#[..],
        CompressionMethod::Deflated,
    )]);
    std::fs::write(&f.target, sheet).unwrap();
    let err = Restyler::new(registry(), batch(&[(0, "PART")]))
        .run(&f.target, &f.architect, &f.output, &mut AuditLog::new())
        .unwrap_err();
    assert!(matches!(err, Error::UnknownFormat));
}
