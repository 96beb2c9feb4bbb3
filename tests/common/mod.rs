#![allow(dead_code)]

use std::io::{Cursor, Write};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use docfill::docx::package::DocxPackage;
use docfill::docx::text::body_text;
use docfill::docx::xml::XmlPart;

const W_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/></Types>"#;

const ROOT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/></Relationships>"#;

/// `<w:p>` with one plain run per piece.
pub fn paragraph(pieces: &[&str]) -> String {
    let runs: String = pieces
        .iter()
        .map(|t| format!(r#"<w:r><w:t xml:space="preserve">{}</w:t></w:r>"#, escape(t)))
        .collect();
    format!("<w:p>{runs}</w:p>")
}

pub fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

pub fn document_xml(body: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="{W_NS}"><w:body>{body}<w:sectPr/></w:body></w:document>"#
    )
}

/// Minimal docx with the given body paragraphs and optional extra parts.
pub fn build_docx(body: &str, extra: &[(&str, &str)]) -> Vec<u8> {
    let mut w = ZipWriter::new(Cursor::new(Vec::new()));
    let opts = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let doc = document_xml(body);
    let mut parts: Vec<(&str, &str)> = vec![
        ("[Content_Types].xml", CONTENT_TYPES),
        ("_rels/.rels", ROOT_RELS),
        ("word/document.xml", doc.as_str()),
    ];
    parts.extend_from_slice(extra);
    for (name, data) in parts {
        w.start_file(name, opts).unwrap();
        w.write_all(data.as_bytes()).unwrap();
    }
    w.finish().unwrap().into_inner()
}

pub fn docx(paragraphs: &[String]) -> Vec<u8> {
    build_docx(&paragraphs.concat(), &[])
}

pub fn part_text(package: &[u8], name: &str) -> String {
    let pkg = DocxPackage::from_bytes(package).unwrap();
    String::from_utf8(pkg.entry(name).unwrap().data.clone()).unwrap()
}

pub fn extracted_text(package: &[u8]) -> String {
    let pkg = DocxPackage::from_bytes(package).unwrap();
    let part = XmlPart::parse("word/document.xml", pkg.body_bytes().unwrap()).unwrap();
    body_text(&part).unwrap()
}

pub fn tokens(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

pub fn values(pairs: &[(&str, &str)]) -> docfill::ValueMap {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}
