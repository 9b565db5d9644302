use scraper::{ElementRef, Html};

use crate::core::types::{BlockKind, BlockPayload, ContentBlock, Link};
use crate::parse::blocks;

const CHEAP_TAGS: [&str; 7] = ["h1", "h2", "h3", "p", "div", "pre", "blockquote"];

fn is_cheap_tag(name: &str) -> bool {
    CHEAP_TAGS.contains(&name)
}

fn has_cheap_ancestor(el: ElementRef) -> bool {
    el.ancestors()
        .filter_map(ElementRef::wrap)
        .any(|a| is_cheap_tag(a.value().name()) && !is_container_div(a))
}

/// A `div` that wraps other elements is a container, not content; emitting
/// it would duplicate every child's text.
fn is_container_div(el: ElementRef) -> bool {
    el.value().name() == "div" && el.children().any(|c| c.value().is_element())
}

/// Flat single-pass extraction: one block per matched element, all at the
/// fixed cheap confidence, no hierarchy.
pub fn build_flat_blocks(fragment: &str, page_host: &str) -> Vec<ContentBlock> {
    let doc = Html::parse_fragment(fragment);
    let mut out: Vec<ContentBlock> = Vec::new();
    let mut next_id: u32 = 0;

    for node in doc.root_element().descendants() {
        let Some(el) = ElementRef::wrap(node) else {
            continue;
        };
        let name = el.value().name();
        if !is_cheap_tag(name) || is_container_div(el) || has_cheap_ancestor(el) {
            continue;
        }

        let kind = match name {
            "h1" => BlockKind::H1,
            "h2" => BlockKind::H2,
            "h3" => BlockKind::H3,
            "pre" => BlockKind::Code,
            _ => BlockKind::P,
        };

        let block = if kind == BlockKind::Code {
            let mut b = blocks::code_block(next_id, el);
            b.confidence = blocks::CHEAP_CONFIDENCE;
            b
        } else {
            let text = blocks::element_text(el);
            if text.is_empty() {
                continue;
            }
            let links: Vec<Link> = blocks::extract_links(el, page_host);
            ContentBlock {
                id: next_id,
                kind,
                payload: BlockPayload::Text(text),
                links,
                confidence: blocks::CHEAP_CONFIDENCE,
            }
        };

        if let BlockPayload::Code(snippet) = &block.payload {
            if snippet.content.trim().is_empty() {
                continue;
            }
        }

        out.push(block);
        next_id += 1;
    }

    out
}
