use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::OnceLock;

use crate::core::types::{Page, Section};

/// Typed distillation of an academic page: abstract, section outline,
/// numbered citations, and reference entries.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AcademicExtract {
    #[serde(rename = "abstract", skip_serializing_if = "Option::is_none")]
    pub abstract_text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sections: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub citations: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<String>,
}

fn citation_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[(\d{1,3})\]").unwrap())
}

pub fn extract(page: &Page) -> AcademicExtract {
    let mut out = AcademicExtract::default();

    // Top-level outline: headings directly under the root sentinel. When the
    // whole page hangs off a single title section, its children are the real
    // outline.
    let mut top: Vec<&Section> = Vec::new();
    for root in &page.content {
        top.extend(root.children.iter());
    }
    if top.len() == 1 && !top[0].children.is_empty() {
        top = top[0].children.iter().collect();
    }
    out.sections = top
        .iter()
        .filter_map(|s| s.heading_text().map(str::to_string))
        .collect();

    out.abstract_text = find_section(page, &["abstract"])
        .map(section_body_text)
        .filter(|t| !t.is_empty());

    // Numbered citation markers, deduplicated and in numeric order.
    let text = page.plain_text();
    let numbers: BTreeSet<u32> = citation_re()
        .captures_iter(&text)
        .filter_map(|c| c.get(1)?.as_str().parse().ok())
        .collect();
    out.citations = numbers.into_iter().map(|n| format!("[{}]", n)).collect();

    // One reference per long paragraph of the references section.
    if let Some(section) = find_section(page, &["references", "bibliography"]) {
        out.references = section
            .blocks
            .iter()
            .filter_map(|b| b.payload.text())
            .map(str::to_string)
            .filter(|t| t.len() > 50)
            .collect();
    }

    out
}

/// Depth-first search for a section whose heading contains any keyword.
pub fn find_section<'a>(page: &'a Page, keywords: &[&str]) -> Option<&'a Section> {
    fn walk<'a>(section: &'a Section, keywords: &[&str]) -> Option<&'a Section> {
        if let Some(heading) = section.heading_text() {
            let lower = heading.to_lowercase();
            if keywords.iter().any(|k| lower.contains(k)) {
                return Some(section);
            }
        }
        section.children.iter().find_map(|c| walk(c, keywords))
    }
    page.content.iter().find_map(|s| walk(s, keywords))
}

fn section_body_text(section: &Section) -> String {
    let parts: Vec<String> = section
        .blocks
        .iter()
        .filter_map(|b| b.payload.text().map(str::to_string))
        .collect();
    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{ExtractionMode, PageMetadata};
    use crate::parse::full::build_sections;

    fn paper_page() -> Page {
        let html = "\
            <h1>A Study of Things</h1>\
            <h2>Abstract</h2>\
            <p>We study things and report findings with strong evidence.</p>\
            <h2>Introduction</h2>\
            <p>Prior work [1] and [2] established the baseline; we extend [3].</p>\
            <h2>References</h2>\
            <p>Smith, J. A comprehensive survey of thing studies, Journal of Things, 2024.</p>\
            <p>Doe, R. Things reconsidered: a longitudinal analysis, ThingConf, 2023.</p>\
            <p>Short.</p>";
        let mut metadata = PageMetadata::default();
        metadata.extraction_mode = ExtractionMode::Full;
        Page {
            url: "https://arxiv.org/abs/1234.5678".into(),
            title: "A Study of Things".into(),
            content: build_sections(html, "arxiv.org"),
            flat_content: Vec::new(),
            metadata,
        }
    }

    #[test]
    fn abstract_located_by_heading() {
        let extract = extract(&paper_page());
        assert!(extract
            .abstract_text
            .as_deref()
            .unwrap()
            .contains("strong evidence"));
    }

    #[test]
    fn citations_deduplicated_and_ordered() {
        let extract = extract(&paper_page());
        assert_eq!(extract.citations, vec!["[1]", "[2]", "[3]"]);
    }

    #[test]
    fn references_take_long_paragraphs_only() {
        let extract = extract(&paper_page());
        assert_eq!(extract.references.len(), 2);
        assert!(extract.references[0].contains("comprehensive survey"));
    }

    #[test]
    fn outline_lists_top_level_sections() {
        let extract = extract(&paper_page());
        assert_eq!(extract.sections, vec!["Abstract", "Introduction", "References"]);
    }
}
