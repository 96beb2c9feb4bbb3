use anyhow::anyhow;

use crate::docx::xml::{find_attr, XmlEvent, XmlPart};

/// A body-level block of the main document part.
#[derive(Clone, Debug, PartialEq)]
pub enum Block {
    Paragraph(Paragraph),
    Table(Table),
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Paragraph {
    pub style: Option<String>,
    pub num_id: Option<i32>,
    pub num_ilvl: Option<i32>,
    pub outline_lvl: Option<i32>,
    pub runs: Vec<Run>,
}

impl Paragraph {
    pub fn text(&self) -> String {
        self.runs.iter().map(|r| r.text.as_str()).collect()
    }

    pub fn heading_level(&self) -> Option<usize> {
        if let Some(lvl) = self.outline_lvl {
            if (0..9).contains(&lvl) {
                return Some((lvl as usize + 1).min(6));
            }
        }
        let style = self.style.as_deref()?.trim();
        let lower = style.to_ascii_lowercase();
        if lower.starts_with("heading") {
            let digits: String = style.chars().skip_while(|c| !c.is_ascii_digit()).collect();
            if let Ok(n) = digits.parse::<usize>() {
                if n > 0 {
                    return Some(n.min(6));
                }
            }
        }
        if lower == "title" {
            return Some(1);
        }
        None
    }

    pub fn is_list_item(&self) -> bool {
        self.num_id.is_some_and(|id| id > 0)
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Run {
    pub text: String,
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
}

impl Run {
    fn same_format(&self, other: &Run) -> bool {
        self.bold == other.bold && self.italic == other.italic && self.underline == other.underline
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Table {
    pub rows: Vec<Vec<Vec<Block>>>,
}

/// Parses `w:body` of the main document part into blocks.
pub fn parse_body(part: &XmlPart) -> anyhow::Result<Vec<Block>> {
    let events = &part.events;
    let start = events
        .iter()
        .position(|ev| matches!(ev, XmlEvent::Start { name, .. } if name == "w:body"))
        .ok_or_else(|| anyhow!("{} has no w:body", part.name))?;
    let mut i = start + 1;
    Ok(parse_blocks(events, &mut i, "w:body"))
}

/// Plain text of the body: every paragraph (table cells included) followed by a blank line.
pub fn body_text(part: &XmlPart) -> anyhow::Result<String> {
    let blocks = parse_body(part)?;
    let mut out = String::new();
    push_block_text(&blocks, &mut out);
    Ok(out)
}

fn push_block_text(blocks: &[Block], out: &mut String) {
    for block in blocks {
        match block {
            Block::Paragraph(p) => {
                out.push_str(&p.text());
                out.push_str("\n\n");
            }
            Block::Table(t) => {
                for cell in t.rows.iter().flatten() {
                    push_block_text(cell, out);
                }
            }
        }
    }
}

fn parse_blocks(events: &[XmlEvent], i: &mut usize, end_name: &str) -> Vec<Block> {
    let mut blocks = Vec::new();
    while *i < events.len() {
        match &events[*i] {
            XmlEvent::Start { name, .. } if name == "w:p" => {
                blocks.push(Block::Paragraph(parse_paragraph(events, i)));
            }
            XmlEvent::Empty { name, .. } if name == "w:p" => {
                blocks.push(Block::Paragraph(Paragraph::default()));
                *i += 1;
            }
            XmlEvent::Start { name, .. } if name == "w:tbl" => {
                blocks.push(Block::Table(parse_table(events, i)));
            }
            XmlEvent::Start { name, .. } if name == "w:sectPr" => skip_subtree(events, i),
            XmlEvent::End { name } if name == end_name => {
                *i += 1;
                return blocks;
            }
            _ => *i += 1,
        }
    }
    blocks
}

fn parse_table(events: &[XmlEvent], i: &mut usize) -> Table {
    let mut table = Table::default();
    *i += 1;
    while *i < events.len() {
        match &events[*i] {
            XmlEvent::Start { name, .. } if name == "w:tr" => {
                table.rows.push(Vec::new());
                *i += 1;
            }
            XmlEvent::Start { name, .. } if name == "w:tc" => {
                *i += 1;
                let cell = parse_blocks(events, i, "w:tc");
                if let Some(row) = table.rows.last_mut() {
                    row.push(cell);
                }
            }
            XmlEvent::Empty { name, .. } if name == "w:tc" => {
                if let Some(row) = table.rows.last_mut() {
                    row.push(Vec::new());
                }
                *i += 1;
            }
            XmlEvent::End { name } if name == "w:tbl" => {
                *i += 1;
                return table;
            }
            _ => *i += 1,
        }
    }
    table
}

fn skip_subtree(events: &[XmlEvent], i: &mut usize) {
    let mut depth = 0usize;
    while *i < events.len() {
        match &events[*i] {
            XmlEvent::Start { .. } => depth += 1,
            XmlEvent::End { .. } => depth = depth.saturating_sub(1),
            _ => {}
        }
        *i += 1;
        if depth == 0 {
            return;
        }
    }
}

fn parse_paragraph(events: &[XmlEvent], i: &mut usize) -> Paragraph {
    let mut para = Paragraph::default();
    let mut p_depth = 0usize;
    let mut stack: Vec<&str> = Vec::new();
    // Runs nest through text boxes (`w:drawing/../w:txbxContent`).
    let mut runs: Vec<Run> = Vec::new();
    let mut in_text = false;

    while *i < events.len() {
        let ev = &events[*i];
        *i += 1;
        match ev {
            XmlEvent::Start { name, attrs } => {
                let parent = stack.last().copied().unwrap_or("");
                match name.as_str() {
                    "w:p" => p_depth += 1,
                    "w:r" => {
                        if let Some(outer) = runs.last_mut() {
                            let head = Run {
                                text: std::mem::take(&mut outer.text),
                                ..outer.clone()
                            };
                            push_run(&mut para.runs, head);
                        }
                        runs.push(Run::default());
                    }
                    "w:t" => in_text = !runs.is_empty(),
                    _ => apply_property(&mut para, runs.last_mut(), name, attrs, parent),
                }
                stack.push(name.as_str());
            }
            XmlEvent::Empty { name, attrs } => {
                let parent = stack.last().copied().unwrap_or("");
                if parent == "w:r" {
                    if let Some(r) = runs.last_mut() {
                        push_control(&mut r.text, name, attrs);
                    }
                } else {
                    apply_property(&mut para, runs.last_mut(), name, attrs, parent);
                }
            }
            XmlEvent::Text { text } => {
                if let (true, Some(r)) = (in_text, runs.last_mut()) {
                    r.text.push_str(text);
                }
            }
            XmlEvent::End { name } => {
                stack.pop();
                match name.as_str() {
                    "w:t" => in_text = false,
                    "w:r" => {
                        if let Some(r) = runs.pop() {
                            push_run(&mut para.runs, r);
                        }
                    }
                    "w:p" => {
                        p_depth = p_depth.saturating_sub(1);
                        if p_depth == 0 {
                            return para;
                        }
                    }
                    _ => {}
                }
            }
            _ => {}
        }
    }
    para
}

fn apply_property(
    para: &mut Paragraph,
    run: Option<&mut Run>,
    name: &str,
    attrs: &[(String, String)],
    parent: &str,
) {
    match (name, parent) {
        ("w:pStyle", "w:pPr") => {
            if let Some(v) = find_attr(attrs, "w:val").map(str::trim).filter(|v| !v.is_empty()) {
                para.style = Some(v.to_string());
            }
        }
        ("w:numId", "w:numPr") => {
            para.num_id = para.num_id.or_else(|| parse_i32_attr(attrs, "w:val"));
        }
        ("w:ilvl", "w:numPr") => {
            para.num_ilvl = para.num_ilvl.or_else(|| parse_i32_attr(attrs, "w:val"));
        }
        ("w:outlineLvl", "w:pPr") => {
            para.outline_lvl = para.outline_lvl.or_else(|| parse_i32_attr(attrs, "w:val"));
        }
        ("w:b", "w:rPr") => {
            if let Some(r) = run {
                r.bold = toggle_on(attrs);
            }
        }
        ("w:i", "w:rPr") => {
            if let Some(r) = run {
                r.italic = toggle_on(attrs);
            }
        }
        ("w:u", "w:rPr") => {
            if let Some(r) = run {
                r.underline = find_attr(attrs, "w:val").unwrap_or("single") != "none";
            }
        }
        _ => {}
    }
}

fn push_control(buf: &mut String, name: &str, attrs: &[(String, String)]) {
    match name {
        "w:tab" | "w:ptab" => buf.push('\t'),
        "w:cr" => buf.push('\n'),
        "w:br" => {
            if find_attr(attrs, "w:type").unwrap_or("textWrapping") == "textWrapping" {
                buf.push('\n');
            }
        }
        "w:noBreakHyphen" => buf.push('-'),
        _ => {}
    }
}

fn toggle_on(attrs: &[(String, String)]) -> bool {
    !matches!(find_attr(attrs, "w:val"), Some("0" | "false" | "off"))
}

fn parse_i32_attr(attrs: &[(String, String)], key: &str) -> Option<i32> {
    find_attr(attrs, key).and_then(|v| v.trim().parse::<i32>().ok())
}

/// Adjacent runs with identical formatting collapse into one.
fn push_run(runs: &mut Vec<Run>, run: Run) {
    if run.text.is_empty() {
        return;
    }
    match runs.last_mut() {
        Some(prev) if prev.same_format(&run) => prev.text.push_str(&run.text),
        _ => runs.push(run),
    }
}
