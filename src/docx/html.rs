use anyhow::Context;

use crate::docx::package::{DocxPackage, BODY_PART};
use crate::docx::text::{parse_body, Block, Paragraph, Run, Table};
use crate::docx::xml::XmlPart;

/// Turns a document package into HTML for previews.
pub trait HtmlConverter: Send + Sync {
    fn convert(&self, package: &[u8]) -> anyhow::Result<String>;
}

/// Renders paragraphs, headings, lists and tables of `word/document.xml`.
/// Empty paragraphs are dropped; run text is HTML-escaped.
#[derive(Clone, Copy, Debug, Default)]
pub struct DocxHtmlConverter;

impl HtmlConverter for DocxHtmlConverter {
    fn convert(&self, package: &[u8]) -> anyhow::Result<String> {
        let pkg = DocxPackage::from_bytes(package).context("open package")?;
        let body = pkg.body_bytes()?;
        let part = XmlPart::parse(BODY_PART, body)?;
        let blocks = parse_body(&part)?;
        let mut out = String::new();
        render_blocks(&blocks, &mut out);
        Ok(out)
    }
}

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
    out
}

fn render_blocks(blocks: &[Block], out: &mut String) {
    let mut list_depth = 0usize;
    for block in blocks {
        match block {
            Block::Paragraph(p) if p.is_list_item() => {
                let target = p.num_ilvl.unwrap_or(0).clamp(0, 8) as usize + 1;
                if target > list_depth {
                    while list_depth < target {
                        out.push_str("<ul><li>");
                        list_depth += 1;
                    }
                } else {
                    while list_depth > target {
                        out.push_str("</li></ul>");
                        list_depth -= 1;
                    }
                    out.push_str("</li><li>");
                }
                render_runs(&p.runs, out);
            }
            Block::Paragraph(p) => {
                close_lists(&mut list_depth, out);
                render_paragraph(p, out);
            }
            Block::Table(t) => {
                close_lists(&mut list_depth, out);
                render_table(t, out);
            }
        }
    }
    close_lists(&mut list_depth, out);
}

fn close_lists(depth: &mut usize, out: &mut String) {
    while *depth > 0 {
        out.push_str("</li></ul>");
        *depth -= 1;
    }
}

fn render_paragraph(p: &Paragraph, out: &mut String) {
    if p.runs.iter().all(|r| r.text.trim().is_empty()) {
        return;
    }
    let tag = match p.heading_level() {
        Some(n) => format!("h{n}"),
        None => "p".to_string(),
    };
    out.push('<');
    out.push_str(&tag);
    out.push('>');
    render_runs(&p.runs, out);
    out.push_str("</");
    out.push_str(&tag);
    out.push('>');
}

fn render_runs(runs: &[Run], out: &mut String) {
    for run in runs {
        let mut opened: Vec<&str> = Vec::new();
        for (on, tag) in [(run.bold, "strong"), (run.italic, "em"), (run.underline, "u")] {
            if on {
                out.push('<');
                out.push_str(tag);
                out.push('>');
                opened.push(tag);
            }
        }
        out.push_str(&escape_html(&run.text).replace('\n', "<br />"));
        for tag in opened.iter().rev() {
            out.push_str("</");
            out.push_str(tag);
            out.push('>');
        }
    }
}

fn render_table(t: &Table, out: &mut String) {
    out.push_str("<table>");
    for row in &t.rows {
        out.push_str("<tr>");
        for cell in row {
            out.push_str("<td>");
            render_blocks(cell, out);
            out.push_str("</td>");
        }
        out.push_str("</tr>");
    }
    out.push_str("</table>");
}
