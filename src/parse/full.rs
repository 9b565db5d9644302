use scraper::{ElementRef, Html};

use crate::core::types::{BlockKind, ContentBlock, Section};
use crate::parse::blocks;

const CAPTURED_TAGS: [&str; 11] = [
    "h1", "h2", "h3", "h4", "h5", "h6", "p", "li", "pre", "code", "table",
];

fn is_captured(name: &str) -> bool {
    CAPTURED_TAGS.contains(&name)
}

/// A block element nested inside another captured element belongs to its
/// ancestor (`code` in `pre`, `p` in `li`, cells in `table`).
fn has_captured_ancestor(el: ElementRef) -> bool {
    el.ancestors()
        .filter_map(ElementRef::wrap)
        .any(|a| is_captured(a.value().name()))
}

/// Arena node: children as indices so the level stack can point into a
/// growing tree without interior references.
struct SectionNode {
    id: u32,
    level: u8,
    heading: Option<ContentBlock>,
    blocks: Vec<ContentBlock>,
    children: Vec<usize>,
}

/// Walk the distilled fragment in document order and fold headings into a
/// section tree. A level-0 sentinel root holds everything before the first
/// heading; each `hN` pops the stack to its enclosing level and opens a new
/// section owning the heading block.
pub fn build_sections(fragment: &str, page_host: &str) -> Vec<Section> {
    let doc = Html::parse_fragment(fragment);

    let mut arena: Vec<SectionNode> = Vec::new();
    let mut next_id: u32 = 0;

    arena.push(SectionNode {
        id: next_id,
        level: 0,
        heading: None,
        blocks: Vec::new(),
        children: Vec::new(),
    });
    next_id += 1;

    let mut roots: Vec<usize> = vec![0];
    let mut stack: Vec<usize> = vec![0];

    for node in doc.root_element().descendants() {
        let Some(el) = ElementRef::wrap(node) else {
            continue;
        };
        let name = el.value().name();
        if !is_captured(name) || has_captured_ancestor(el) {
            continue;
        }

        match name {
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                let level = name.as_bytes()[1] - b'0';
                let kind = BlockKind::heading(level);
                let heading = blocks::text_block(next_id, kind, el, page_host);
                next_id += 1;

                if heading.payload.text().map(str::is_empty).unwrap_or(true) {
                    continue;
                }

                while let Some(&top) = stack.last() {
                    if arena[top].level >= level {
                        stack.pop();
                    } else {
                        break;
                    }
                }

                let section_idx = arena.len();
                arena.push(SectionNode {
                    id: next_id,
                    level,
                    heading: Some(heading),
                    blocks: Vec::new(),
                    children: Vec::new(),
                });
                next_id += 1;

                match stack.last() {
                    Some(&parent) => arena[parent].children.push(section_idx),
                    None => roots.push(section_idx),
                }
                stack.push(section_idx);
            }
            "table" => {
                let block = blocks::table_block(next_id, el);
                next_id += 1;
                push_block(&mut arena, &stack, block);
            }
            "pre" | "code" => {
                let block = blocks::code_block(next_id, el);
                next_id += 1;
                if let crate::core::types::BlockPayload::Code(snippet) = &block.payload {
                    if snippet.content.trim().is_empty() {
                        continue;
                    }
                }
                push_block(&mut arena, &stack, block);
            }
            _ => {
                let kind = if name == "li" { BlockKind::Li } else { BlockKind::P };
                let block = blocks::text_block(next_id, kind, el, page_host);
                next_id += 1;
                if block.payload.text().map(str::is_empty).unwrap_or(true) {
                    continue;
                }
                push_block(&mut arena, &stack, block);
            }
        }
    }

    let is_empty = arena[0].blocks.is_empty() && arena[0].children.is_empty() && roots.len() == 1;
    if is_empty {
        return Vec::new();
    }

    let mut materialized: Vec<Option<SectionNode>> = arena.into_iter().map(Some).collect();
    roots
        .into_iter()
        .map(|idx| materialize(&mut materialized, idx))
        .collect()
}

fn push_block(arena: &mut [SectionNode], stack: &[usize], block: ContentBlock) {
    if let Some(&top) = stack.last() {
        arena[top].blocks.push(block);
    }
}

fn materialize(arena: &mut Vec<Option<SectionNode>>, idx: usize) -> Section {
    let node = arena[idx].take().expect("section materialized twice");
    let children = node
        .children
        .iter()
        .map(|&child| materialize(arena, child))
        .collect();
    Section {
        id: node.id,
        level: node.level,
        heading: node.heading,
        blocks: node.blocks,
        children,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::BlockPayload;
    use crate::parse::blocks::{HEADING_CONFIDENCE, STRUCTURAL_CONFIDENCE};

    const PAGE: &str = r#"
        <p>Intro before any heading.</p>
        <h1>Title</h1>
        <p>Opening paragraph.</p>
        <h2>Methods</h2>
        <p>Method details.</p>
        <pre><code class="language-rust">fn run() {}</code></pre>
        <h3>Subsection</h3>
        <ul><li>first item</li><li>second item</li></ul>
        <h2>Results</h2>
        <table><tr><th>k</th></tr><tr><td>v</td></tr></table>
    "#;

    #[test]
    fn heading_stack_builds_monotone_tree() {
        let sections = build_sections(PAGE, "a.example");
        assert_eq!(sections.len(), 1);

        let root = &sections[0];
        assert_eq!(root.level, 0);
        assert!(root.heading.is_none());
        // Pre-heading intro lands on the sentinel.
        assert_eq!(root.blocks.len(), 1);

        let h1 = &root.children[0];
        assert_eq!(h1.level, 1);
        assert_eq!(h1.heading_text(), Some("Title"));
        assert_eq!(h1.children.len(), 2); // Methods, Results

        let methods = &h1.children[0];
        assert_eq!(methods.heading_text(), Some("Methods"));
        assert_eq!(methods.children.len(), 1);
        let sub = &methods.children[0];
        assert_eq!(sub.level, 3);
        assert_eq!(sub.blocks.len(), 2); // two list items

        // h2 after h3 pops back to the h1.
        let results = &h1.children[1];
        assert_eq!(results.heading_text(), Some("Results"));
        assert_eq!(results.blocks.len(), 1);
    }

    #[test]
    fn nesting_is_strictly_monotone() {
        fn check(section: &Section) {
            for child in &section.children {
                if section.level > 0 {
                    assert!(child.level > section.level);
                }
                check(child);
            }
        }
        for section in build_sections(PAGE, "a.example") {
            check(&section);
        }
    }

    #[test]
    fn confidence_constants_hold() {
        let sections = build_sections(PAGE, "a.example");
        let mut heading_count = 0;
        let mut structural_count = 0;

        fn walk(section: &Section, f: &mut impl FnMut(&crate::core::types::ContentBlock)) {
            if let Some(h) = &section.heading {
                f(h);
            }
            for b in &section.blocks {
                f(b);
            }
            for c in &section.children {
                walk(c, f);
            }
        }

        for section in &sections {
            walk(section, &mut |block| {
                assert!((0.0..=1.0).contains(&block.confidence));
                if block.kind.heading_level().is_some() {
                    assert_eq!(block.confidence, HEADING_CONFIDENCE);
                    heading_count += 1;
                }
                if matches!(
                    block.payload,
                    BlockPayload::Code(_) | BlockPayload::Table(_)
                ) {
                    assert_eq!(block.confidence, STRUCTURAL_CONFIDENCE);
                    structural_count += 1;
                }
            });
        }
        assert_eq!(heading_count, 4);
        assert_eq!(structural_count, 2);
    }

    #[test]
    fn nested_code_is_not_double_counted() {
        let sections = build_sections(
            "<h2>Code</h2><pre><code>let a = 1;</code></pre>",
            "a.example",
        );
        let root = &sections[0];
        let code_section = &root.children[0];
        assert_eq!(code_section.blocks.len(), 1);
        match &code_section.blocks[0].payload {
            BlockPayload::Code(snippet) => assert_eq!(snippet.content, "let a = 1;"),
            other => panic!("expected code, got {:?}", other),
        }
    }

    #[test]
    fn empty_fragment_yields_no_sections() {
        assert!(build_sections("<div></div>", "a.example").is_empty());
    }
}
