use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use crate::core::types::{BlockPayload, Page, Section};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CodeExample {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    pub content: String,
    /// Heading of the section the block sits under, when any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiParameter {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
}

/// Typed distillation of a documentation page: code with section context,
/// version strings, parameter tables, and example passages.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DocsExtract {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub code_examples: Vec<CodeExample>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub versions: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub api_parameters: Vec<ApiParameter>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub examples: Vec<String>,
}

fn version_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(?:version\s+|v)(\d+\.\d+(?:\.\d+)?(?:-[a-z0-9.]+)?)\b").unwrap()
    })
}

const PARAMETER_HEADINGS: [&str; 3] = ["parameter", "argument", "option"];
const EXAMPLE_HEADINGS: [&str; 1] = ["example"];

pub fn extract(page: &Page) -> DocsExtract {
    let mut out = DocsExtract::default();

    for root in &page.content {
        walk(root, None, &mut out);
    }

    // Version strings from the whole page text, first occurrence wins.
    let text = page.plain_text();
    for captures in version_re().captures_iter(&text) {
        if let Some(m) = captures.get(1) {
            let v = m.as_str().to_string();
            if !out.versions.contains(&v) {
                out.versions.push(v);
            }
        }
    }

    out
}

fn heading_matches(section: &Section, keywords: &[&str]) -> bool {
    section
        .heading_text()
        .map(|h| {
            let lower = h.to_lowercase();
            keywords.iter().any(|k| lower.contains(k))
        })
        .unwrap_or(false)
}

fn walk(section: &Section, parent_heading: Option<&str>, out: &mut DocsExtract) {
    let heading = section.heading_text().or(parent_heading);
    let in_parameters = heading_matches(section, &PARAMETER_HEADINGS);
    let in_examples = heading_matches(section, &EXAMPLE_HEADINGS);

    for block in &section.blocks {
        match &block.payload {
            BlockPayload::Code(snippet) => {
                out.code_examples.push(CodeExample {
                    language: snippet.language.clone(),
                    content: snippet.content.clone(),
                    section: heading.map(str::to_string),
                });
            }
            BlockPayload::Table(table) if in_parameters => {
                for row in &table.rows {
                    let Some((name, rest)) = row.split_first() else {
                        continue;
                    };
                    if name.is_empty() {
                        continue;
                    }
                    out.api_parameters.push(ApiParameter {
                        name: name.clone(),
                        details: rest.to_vec(),
                        section: heading.map(str::to_string),
                    });
                }
            }
            BlockPayload::Text(text) if in_examples && !text.is_empty() => {
                out.examples.push(text.clone());
            }
            _ => {}
        }
    }

    for child in &section.children {
        walk(child, heading, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{ExtractionMode, PageMetadata};
    use crate::parse::full::build_sections;

    fn docs_page() -> Page {
        let html = "\
            <h1>client library</h1>\
            <p>Works with version 2.4 and newer; v3.0.1 is in beta.</p>\
            <h2>Parameters</h2>\
            <table><tr><th>name</th><th>type</th><th>description</th></tr>\
            <tr><td>timeout</td><td>int</td><td>seconds to wait</td></tr>\
            <tr><td>retries</td><td>int</td><td>attempt count</td></tr></table>\
            <h2>Examples</h2>\
            <p>Construct a client and issue a request.</p>\
            <pre><code class=\"language-rust\">let c = Client::new();</code></pre>";
        let mut metadata = PageMetadata::default();
        metadata.extraction_mode = ExtractionMode::Full;
        Page {
            url: "https://docs.example/client".into(),
            title: "client library".into(),
            content: build_sections(html, "docs.example"),
            flat_content: Vec::new(),
            metadata,
        }
    }

    #[test]
    fn versions_collected_once() {
        let extract = extract(&docs_page());
        assert_eq!(extract.versions, vec!["2.4", "3.0.1"]);
    }

    #[test]
    fn parameter_tables_split_into_rows() {
        let extract = extract(&docs_page());
        assert_eq!(extract.api_parameters.len(), 2);
        assert_eq!(extract.api_parameters[0].name, "timeout");
        assert_eq!(extract.api_parameters[0].details, vec!["int", "seconds to wait"]);
        assert_eq!(
            extract.api_parameters[0].section.as_deref(),
            Some("Parameters")
        );
    }

    #[test]
    fn code_carries_section_context() {
        let extract = extract(&docs_page());
        assert_eq!(extract.code_examples.len(), 1);
        assert_eq!(extract.code_examples[0].language.as_deref(), Some("rust"));
        assert_eq!(extract.code_examples[0].section.as_deref(), Some("Examples"));
    }

    #[test]
    fn example_text_collected_under_example_headings() {
        let extract = extract(&docs_page());
        assert_eq!(extract.examples.len(), 1);
        assert!(extract.examples[0].contains("issue a request"));
    }
}
