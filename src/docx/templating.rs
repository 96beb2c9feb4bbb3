use std::collections::{BTreeMap, BTreeSet, HashMap};

use anyhow::Context;
use thiserror::Error;

use crate::docx::package::DocxPackage;
use crate::docx::xml::{set_attr, XmlEvent, XmlPart};

/// Substitutes `{key}` tags inside a package, keeping run formatting.
pub trait TemplatingPass: Send + Sync {
    fn render(&self, package: &[u8], data: &BTreeMap<String, String>) -> anyhow::Result<Vec<u8>>;
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TagError {
    #[error("unclosed tag at offset {offset} in {part}")]
    Unclosed { part: String, offset: usize },
    #[error("closing brace without opening tag at offset {offset} in {part}")]
    Unopened { part: String, offset: usize },
    #[error("empty tag in {part}")]
    Empty { part: String },
    #[error("unsupported tag {{{tag}}} in {part}")]
    Unsupported { part: String, tag: String },
    #[error("no value for tag {{{tag}}} in {part}")]
    Unresolved { part: String, tag: String },
}

/// Tag-level templater over every XML part under `word/`.
///
/// Tags may span several runs of one paragraph; the substituted value lands in the run
/// where the tag starts. Loops, conditions and other control tags are rejected.
#[derive(Clone, Copy, Debug)]
pub struct DocxTemplater {
    /// Render `\n` in values as `<w:br/>` line breaks.
    pub linebreaks: bool,
}

impl Default for DocxTemplater {
    fn default() -> Self {
        Self { linebreaks: true }
    }
}

impl TemplatingPass for DocxTemplater {
    fn render(&self, package: &[u8], data: &BTreeMap<String, String>) -> anyhow::Result<Vec<u8>> {
        let pkg = DocxPackage::from_bytes(package).context("open package")?;
        let mut replacements: HashMap<String, Vec<u8>> = HashMap::new();
        for ent in pkg.body_xml_entries() {
            if ent.data.is_empty() {
                continue;
            }
            let mut part = XmlPart::parse(&ent.name, &ent.data)?;
            let touched = substitute_tags(&mut part, data)?;
            if touched.is_empty() {
                continue;
            }
            part.verify_structure_unchanged()?;
            if self.linebreaks {
                expand_linebreaks(&mut part, &touched);
            }
            replacements.insert(ent.name.clone(), part.to_bytes()?);
        }
        pkg.to_bytes_with_replacements(&replacements)
    }
}

struct TextNode {
    elem_index: usize,
    text_index: usize,
}

struct Tag {
    start: usize,
    end: usize,
    value: String,
}

/// Replaces every tag of the part in place. Returns the indices of rewritten text events.
pub fn substitute_tags(
    part: &mut XmlPart,
    data: &BTreeMap<String, String>,
) -> Result<BTreeSet<usize>, TagError> {
    let paragraphs = collect_paragraph_text_nodes(&part.events);
    let mut touched = BTreeSet::new();
    for nodes in paragraphs {
        let texts: Vec<&str> = nodes
            .iter()
            .map(|n| match &part.events[n.text_index] {
                XmlEvent::Text { text } => text.as_str(),
                _ => "",
            })
            .collect();
        let full: String = texts.concat();
        let tags = parse_tags(&part.name, &full, data)?;
        if tags.is_empty() {
            continue;
        }

        let mut rewritten: Vec<String> = Vec::with_capacity(nodes.len());
        let mut base = 0usize;
        let mut tag_idx = 0usize;
        for text in &texts {
            let mut out = String::with_capacity(text.len());
            for (off, ch) in text.char_indices() {
                let pos = base + off;
                while tag_idx < tags.len() && tags[tag_idx].end <= pos {
                    tag_idx += 1;
                }
                match tags.get(tag_idx) {
                    Some(tag) if tag.start <= pos => {
                        if tag.start == pos {
                            out.push_str(&tag.value);
                        }
                    }
                    _ => out.push(ch),
                }
            }
            base += text.len();
            rewritten.push(out);
        }

        for (node, new_text) in nodes.iter().zip(rewritten) {
            let changed = matches!(
                &part.events[node.text_index],
                XmlEvent::Text { text } if *text != new_text
            );
            if !changed {
                continue;
            }
            let needs_preserve = new_text.starts_with(char::is_whitespace)
                || new_text.ends_with(char::is_whitespace);
            if let XmlEvent::Text { text } = &mut part.events[node.text_index] {
                *text = new_text;
            }
            if needs_preserve {
                if let XmlEvent::Start { attrs, .. } = &mut part.events[node.elem_index] {
                    set_attr(attrs, "xml:space", "preserve");
                }
            }
            touched.insert(node.text_index);
        }
    }
    Ok(touched)
}

fn collect_paragraph_text_nodes(events: &[XmlEvent]) -> Vec<Vec<TextNode>> {
    let mut done: Vec<Vec<TextNode>> = Vec::new();
    let mut open: Vec<Vec<TextNode>> = Vec::new();
    let mut current_t: Option<usize> = None;
    for (idx, ev) in events.iter().enumerate() {
        match ev {
            XmlEvent::Start { name, .. } if name == "w:p" => open.push(Vec::new()),
            XmlEvent::Start { name, .. } if name == "w:t" => current_t = Some(idx),
            XmlEvent::Text { .. } => {
                if let (Some(elem_index), Some(nodes)) = (current_t, open.last_mut()) {
                    nodes.push(TextNode {
                        elem_index,
                        text_index: idx,
                    });
                }
            }
            XmlEvent::End { name } if name == "w:t" => current_t = None,
            XmlEvent::End { name } if name == "w:p" => {
                if let Some(nodes) = open.pop() {
                    done.push(nodes);
                }
            }
            _ => {}
        }
    }
    done
}

fn parse_tags(
    part: &str,
    full: &str,
    data: &BTreeMap<String, String>,
) -> Result<Vec<Tag>, TagError> {
    let mut tags = Vec::new();
    let mut open: Option<usize> = None;
    for (pos, ch) in full.char_indices() {
        match ch {
            '{' => {
                if let Some(offset) = open {
                    return Err(TagError::Unclosed {
                        part: part.to_string(),
                        offset,
                    });
                }
                open = Some(pos);
            }
            '}' => {
                let Some(start) = open.take() else {
                    return Err(TagError::Unopened {
                        part: part.to_string(),
                        offset: pos,
                    });
                };
                let key = &full[start + 1..pos];
                tags.push(Tag {
                    start,
                    end: pos + 1,
                    value: resolve_tag(part, key, data)?,
                });
            }
            _ => {}
        }
    }
    if let Some(offset) = open {
        return Err(TagError::Unclosed {
            part: part.to_string(),
            offset,
        });
    }
    Ok(tags)
}

fn resolve_tag(part: &str, key: &str, data: &BTreeMap<String, String>) -> Result<String, TagError> {
    if key.trim().is_empty() {
        return Err(TagError::Empty {
            part: part.to_string(),
        });
    }
    if key.starts_with(['#', '/', '^', '@']) {
        return Err(TagError::Unsupported {
            part: part.to_string(),
            tag: key.to_string(),
        });
    }
    data.get(key).cloned().ok_or_else(|| TagError::Unresolved {
        part: part.to_string(),
        tag: key.to_string(),
    })
}

/// Splits rewritten text nodes on `\n` into `<w:t>` pieces separated by `<w:br/>`.
fn expand_linebreaks(part: &mut XmlPart, touched: &BTreeSet<usize>) {
    if !touched.iter().any(|&i| {
        matches!(&part.events[i], XmlEvent::Text { text } if text.contains('\n'))
    }) {
        return;
    }
    let mut out: Vec<XmlEvent> = Vec::with_capacity(part.events.len());
    let mut t_attrs: Vec<(String, String)> = Vec::new();
    for (idx, ev) in part.events.drain(..).enumerate() {
        match ev {
            XmlEvent::Start { ref name, ref attrs } if name == "w:t" => {
                t_attrs = attrs.clone();
                out.push(ev);
            }
            XmlEvent::Text { text } if touched.contains(&idx) && text.contains('\n') => {
                let mut reopened = t_attrs.clone();
                set_attr(&mut reopened, "xml:space", "preserve");
                for (i, line) in text.split('\n').enumerate() {
                    if i > 0 {
                        out.push(XmlEvent::End {
                            name: "w:t".to_string(),
                        });
                        out.push(XmlEvent::Empty {
                            name: "w:br".to_string(),
                            attrs: Vec::new(),
                        });
                        out.push(XmlEvent::Start {
                            name: "w:t".to_string(),
                            attrs: reopened.clone(),
                        });
                    }
                    out.push(XmlEvent::Text {
                        text: line.trim_end_matches('\r').to_string(),
                    });
                }
            }
            other => out.push(other),
        }
    }
    part.events = out;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn part(body: &str) -> XmlPart {
        let xml = format!(r#"<w:document xmlns:w="urn:w"><w:body>{body}</w:body></w:document>"#);
        XmlPart::parse("word/document.xml", xml.as_bytes()).unwrap()
    }

    fn data(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn xml_of(part: &XmlPart) -> String {
        String::from_utf8(part.to_bytes().unwrap()).unwrap()
    }

    #[test]
    fn replaces_tag_inside_single_run() {
        let mut p = part(r#"<w:p><w:r><w:t>Hi {customer.name}!</w:t></w:r></w:p>"#);
        let touched = substitute_tags(&mut p, &data(&[("customer.name", "Ann")])).unwrap();
        assert_eq!(touched.len(), 1);
        assert!(xml_of(&p).contains("<w:t>Hi Ann!</w:t>"));
        p.verify_structure_unchanged().unwrap();
    }

    #[test]
    fn tag_split_across_runs_lands_in_first_run() {
        let mut p = part(
            r#"<w:p><w:r><w:t>A {cust</w:t></w:r><w:r><w:rPr><w:b/></w:rPr><w:t>omer.na</w:t></w:r><w:r><w:t>me} B</w:t></w:r></w:p>"#,
        );
        substitute_tags(&mut p, &data(&[("customer.name", "Ann & Co")])).unwrap();
        let xml = xml_of(&p);
        assert!(xml.contains("<w:t>A Ann &amp; Co</w:t>"), "{xml}");
        assert!(xml.contains(r#"<w:rPr><w:b/></w:rPr><w:t></w:t>"#), "{xml}");
        assert!(xml.contains(r#"<w:t xml:space="preserve"> B</w:t>"#), "{xml}");
        p.verify_structure_unchanged().unwrap();
    }

    #[test]
    fn unbalanced_braces_are_rejected() {
        let mut p = part(r#"<w:p><w:r><w:t>{a.b</w:t></w:r></w:p><w:p><w:r><w:t>c}</w:t></w:r></w:p>"#);
        let err = substitute_tags(&mut p, &data(&[("a.b", "x")])).unwrap_err();
        assert!(matches!(err, TagError::Unclosed { offset: 0, .. }));

        let mut p = part(r#"<w:p><w:r><w:t>x} {a.b}</w:t></w:r></w:p>"#);
        let err = substitute_tags(&mut p, &data(&[("a.b", "x")])).unwrap_err();
        assert!(matches!(err, TagError::Unopened { offset: 1, .. }));
    }

    #[test]
    fn control_and_unknown_tags_are_rejected() {
        let mut p = part(r#"<w:p><w:r><w:t>{#items}</w:t></w:r></w:p>"#);
        assert!(matches!(
            substitute_tags(&mut p, &data(&[])).unwrap_err(),
            TagError::Unsupported { .. }
        ));

        let mut p = part(r#"<w:p><w:r><w:t>{other.thing}</w:t></w:r></w:p>"#);
        assert_eq!(
            substitute_tags(&mut p, &data(&[("a.b", "x")])).unwrap_err(),
            TagError::Unresolved {
                part: "word/document.xml".to_string(),
                tag: "other.thing".to_string()
            }
        );

        let mut p = part(r#"<w:p><w:r><w:t>{}</w:t></w:r></w:p>"#);
        assert!(matches!(
            substitute_tags(&mut p, &data(&[])).unwrap_err(),
            TagError::Empty { .. }
        ));
    }

    #[test]
    fn paragraphs_without_tags_are_untouched() {
        let mut p = part(r#"<w:p><w:r><w:t>plain</w:t></w:r></w:p>"#);
        assert!(substitute_tags(&mut p, &data(&[])).unwrap().is_empty());
    }

    #[test]
    fn newlines_in_values_become_breaks() {
        let mut p = part(r#"<w:p><w:r><w:t>{a.b}</w:t></w:r></w:p>"#);
        let touched = substitute_tags(&mut p, &data(&[("a.b", "one\r\ntwo")])).unwrap();
        expand_linebreaks(&mut p, &touched);
        assert!(xml_of(&p).contains(
            r#"<w:t>one</w:t><w:br/><w:t xml:space="preserve">two</w:t>"#
        ));
    }
}
