use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use crate::core::types::{BlockPayload, ContentBlock, Page, Section, TableData};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InfoboxEntry {
    pub label: String,
    pub value: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TocEntry {
    pub level: u8,
    pub title: String,
}

/// Typed distillation of a wiki page: infobox facts, table of contents,
/// trailing categories.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct WikiExtract {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub infobox: Vec<InfoboxEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub toc: Vec<TocEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<String>,
}

fn category_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)categor(?:y|ies)\s*:\s*(.+)").unwrap())
}

/// How many leading blocks count as "near the document start" for infobox
/// detection.
const INFOBOX_WINDOW: usize = 10;

pub fn extract(page: &Page) -> WikiExtract {
    let mut out = WikiExtract::default();

    // TOC from the heading hierarchy, in document order.
    fn toc_walk(section: &Section, toc: &mut Vec<TocEntry>) {
        if let (true, Some(text)) = (section.level > 0, section.heading_text()) {
            toc.push(TocEntry {
                level: section.level,
                title: text.to_string(),
            });
        }
        for child in &section.children {
            toc_walk(child, toc);
        }
    }
    for root in &page.content {
        toc_walk(root, &mut out.toc);
    }

    // Infobox: the first header-less two-column table near the start.
    let mut leading: Vec<&ContentBlock> = Vec::new();
    page.for_each_block(&mut |b| {
        if leading.len() < INFOBOX_WINDOW {
            leading.push(b);
        }
    });
    for block in leading {
        if let BlockPayload::Table(table) = &block.payload {
            if is_infobox(table) {
                out.infobox = table
                    .rows
                    .iter()
                    .filter(|row| row.len() == 2)
                    .map(|row| InfoboxEntry {
                        label: row[0].clone(),
                        value: row[1].clone(),
                    })
                    .collect();
                break;
            }
        }
    }

    // Categories from trailing "Category:"/"Categories:" lines.
    let text = page.plain_text();
    if let Some(captures) = text
        .lines()
        .rev()
        .find_map(|line| category_re().captures(line))
    {
        out.categories = captures[1]
            .split(['|', ',', '•'])
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect();
    }

    out
}

/// Header-less, mostly two-column, and non-trivial: the shape of a wiki
/// infobox rendered as a plain table.
fn is_infobox(table: &TableData) -> bool {
    if !table.headers.is_empty() || table.rows.len() < 2 {
        return false;
    }
    let two_col = table.rows.iter().filter(|row| row.len() == 2).count();
    (two_col as f64) / (table.rows.len() as f64) > 0.7
}
