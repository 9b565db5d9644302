use scraper::ElementRef;
use url::Url;

use crate::core::types::{
    BlockKind, BlockPayload, CodeSnippet, ContentBlock, Link, LinkKind, TableData,
};

/// Structural blocks (code, table) carry a fixed high confidence.
pub const STRUCTURAL_CONFIDENCE: f64 = 0.95;
/// Headings carry a fixed mid confidence.
pub const HEADING_CONFIDENCE: f64 = 0.70;
/// Flat blocks from the cheap pass.
pub const CHEAP_CONFIDENCE: f64 = 0.5;

/// Collapse all whitespace runs to single spaces, joining lines.
pub fn normalize_text(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Normalized text content of an element.
pub fn element_text(element: ElementRef) -> String {
    normalize_text(&element.text().collect::<String>())
}

/// Density-scored confidence for paragraph/list text: 0.40 base, one tier
/// bonus by word count, minus 0.05 per embedded link, clamped to [0, 1].
pub fn text_confidence(text: &str, link_count: usize) -> f64 {
    let words = text.split_whitespace().count();
    let mut confidence = 0.40;
    if words > 120 {
        confidence += 0.40;
    } else if words > 40 {
        confidence += 0.25;
    } else if words > 15 {
        confidence += 0.10;
    }
    confidence -= 0.05 * link_count as f64;
    confidence.clamp(0.0, 1.0)
}

/// Deterministic link classification against the page host: fragments,
/// absolute paths, and same-host URLs are internal; everything else is
/// external; malformed hrefs default to internal.
pub fn classify_link(href: &str, page_host: &str) -> LinkKind {
    if href.starts_with('#') || href.starts_with('/') {
        return LinkKind::Internal;
    }
    match Url::parse(href) {
        Ok(parsed) => {
            let host = parsed.host_str().unwrap_or("");
            if host.eq_ignore_ascii_case(page_host) {
                LinkKind::Internal
            } else {
                LinkKind::External
            }
        }
        Err(_) => LinkKind::Internal,
    }
}

/// Anchor links under an element, classified against the page host.
pub fn extract_links(element: ElementRef, page_host: &str) -> Vec<Link> {
    let mut links = Vec::new();
    for descendant in element.descendants() {
        let Some(el) = ElementRef::wrap(descendant) else {
            continue;
        };
        if el.value().name() != "a" {
            continue;
        }
        let Some(href) = el.value().attr("href") else {
            continue;
        };
        if href.starts_with("javascript:") || href.starts_with("mailto:") {
            continue;
        }
        links.push(Link {
            href: href.to_string(),
            text: element_text(el),
            kind: classify_link(href, page_host),
        });
    }
    links
}

/// Text block (heading, paragraph, list item) with scored confidence.
pub fn text_block(id: u32, kind: BlockKind, element: ElementRef, page_host: &str) -> ContentBlock {
    let text = element_text(element);
    let links = extract_links(element, page_host);
    let confidence = if kind.heading_level().is_some() {
        HEADING_CONFIDENCE
    } else {
        text_confidence(&text, links.len())
    };
    ContentBlock {
        id,
        kind,
        payload: BlockPayload::Text(text),
        links,
        confidence,
    }
}

/// Code block preserving raw text, with a best-effort language hint from
/// `language-*` / `lang-*` classes on the element or a nested `<code>`.
pub fn code_block(id: u32, element: ElementRef) -> ContentBlock {
    let raw: String = element.text().collect();
    let language = language_hint(element).or_else(|| {
        element
            .select(&scraper::Selector::parse("code").unwrap())
            .next()
            .and_then(language_hint)
    });
    ContentBlock {
        id,
        kind: BlockKind::Code,
        payload: BlockPayload::Code(CodeSnippet {
            language,
            content: raw.trim_end().to_string(),
        }),
        links: Vec::new(),
        confidence: STRUCTURAL_CONFIDENCE,
    }
}

fn language_hint(element: ElementRef) -> Option<String> {
    element.value().attr("class").and_then(|classes| {
        classes
            .split_whitespace()
            .find(|c| c.starts_with("language-") || c.starts_with("lang-"))
            .map(|c| {
                c.strip_prefix("language-")
                    .or_else(|| c.strip_prefix("lang-"))
                    .unwrap_or(c)
                    .to_string()
            })
    })
}

/// Table block: headers from `<th>` cells, one string row per `<tr>` of
/// `<td>` cells. Header-less tables keep `headers` empty, which is what the
/// infobox detector keys on.
pub fn table_block(id: u32, element: ElementRef) -> ContentBlock {
    ContentBlock {
        id,
        kind: BlockKind::Table,
        payload: BlockPayload::Table(extract_table(element)),
        links: Vec::new(),
        confidence: STRUCTURAL_CONFIDENCE,
    }
}

pub fn extract_table(element: ElementRef) -> TableData {
    let tr = scraper::Selector::parse("tr").unwrap();
    let th = scraper::Selector::parse("th").unwrap();
    let td = scraper::Selector::parse("td").unwrap();

    let headers: Vec<String> = element.select(&th).map(element_text).collect();
    let mut rows: Vec<Vec<String>> = Vec::new();

    for row in element.select(&tr) {
        let cells: Vec<String> = row.select(&td).map(element_text).collect();
        if !cells.is_empty() {
            rows.push(cells);
        }
    }

    TableData { headers, rows }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::{Html, Selector};

    fn first<'a>(doc: &'a Html, sel: &str) -> ElementRef<'a> {
        doc.select(&Selector::parse(sel).unwrap()).next().unwrap()
    }

    #[test]
    fn whitespace_collapses() {
        assert_eq!(normalize_text("  a \n\n  b\tc  "), "a b c");
    }

    #[test]
    fn confidence_tiers_and_link_penalty() {
        let short = "one two three";
        assert_eq!(text_confidence(short, 0), 0.40);

        let mid = "w ".repeat(20);
        assert_eq!(text_confidence(&mid, 0), 0.50);

        let long = "w ".repeat(50);
        assert_eq!(text_confidence(&long, 0), 0.65);

        let very_long = "w ".repeat(130);
        assert_eq!(text_confidence(&very_long, 0), 0.80);

        // Links pull confidence down, floored at zero.
        assert!((text_confidence(short, 2) - 0.30).abs() < 1e-9);
        assert_eq!(text_confidence(short, 20), 0.0);
    }

    #[test]
    fn link_classification_rules() {
        assert_eq!(classify_link("#section", "a.example"), LinkKind::Internal);
        assert_eq!(classify_link("/about", "a.example"), LinkKind::Internal);
        assert_eq!(
            classify_link("https://a.example/page", "a.example"),
            LinkKind::Internal
        );
        assert_eq!(
            classify_link("https://other.example/", "a.example"),
            LinkKind::External
        );
        // Malformed / relative defaults to internal.
        assert_eq!(classify_link("page.html", "a.example"), LinkKind::Internal);
    }

    #[test]
    fn code_block_language_from_class() {
        let doc = Html::parse_fragment(
            r#"<pre><code class="language-rust">fn main() {}</code></pre>"#,
        );
        let block = code_block(0, first(&doc, "pre"));
        match &block.payload {
            BlockPayload::Code(snippet) => {
                assert_eq!(snippet.language.as_deref(), Some("rust"));
                assert_eq!(snippet.content, "fn main() {}");
            }
            other => panic!("expected code payload, got {:?}", other),
        }
        assert_eq!(block.confidence, STRUCTURAL_CONFIDENCE);
    }

    #[test]
    fn table_headers_and_rows() {
        let doc = Html::parse_fragment(
            "<table><tr><th>name</th><th>type</th></tr>\
             <tr><td>id</td><td>int</td></tr>\
             <tr><td>host</td><td>text</td></tr></table>",
        );
        let table = extract_table(first(&doc, "table"));
        assert_eq!(table.headers, vec!["name", "type"]);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0], vec!["id", "int"]);
    }

    #[test]
    fn headerless_table_keeps_headers_empty() {
        let doc = Html::parse_fragment(
            "<table><tr><td>Born</td><td>1815</td></tr>\
             <tr><td>Died</td><td>1852</td></tr></table>",
        );
        let table = extract_table(first(&doc, "table"));
        assert!(table.headers.is_empty());
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0], vec!["Born", "1815"]);
    }
}
