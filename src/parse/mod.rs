pub mod blocks;
pub mod cheap;
pub mod distill;
pub mod full;
pub mod metadata;

use scraper::Html;
use tracing::debug;
use url::Url;

use crate::core::errors::Result;
use crate::core::types::{
    estimated_read_min, ExtractionMode, ExtractionQuality, Page, PageMetadata,
};
use crate::detect;

/// Fewer extracted blocks than this marks a parse as low quality and, in
/// cheap mode, triggers the silent re-run in full mode.
const LOW_QUALITY_BLOCKS: usize = 5;

/// A parsed page plus the distilled plain text it was scored against.
/// The text feeds analytics even in minimal mode, where no blocks exist.
#[derive(Clone, Debug)]
pub struct Parsed {
    pub page: Page,
    pub text: String,
}

/// Parse one page at the requested tier. Mode resolution: the caller's mode
/// wins, except that cheap + citation requirements promotes to full, and a
/// low-quality cheap pass silently escalates to full on the same input.
/// Minimal never escalates. HTTP fields of the metadata are left for the
/// caller to fill.
pub fn parse_page(
    html: &str,
    url: &Url,
    requested: ExtractionMode,
    require_citations: bool,
) -> Result<Parsed> {
    let mut mode = if requested == ExtractionMode::Cheap && require_citations {
        debug!("citation requirement promotes cheap parse to full for {}", url);
        ExtractionMode::Full
    } else {
        requested
    };

    let distilled = distill::distill(html, url)?;
    let document = Html::parse_document(html);
    let meta_fields = metadata::extract(&document, url, &distilled.text);
    let host = url.host_str().unwrap_or("").to_string();

    let mut content = Vec::new();
    let mut flat_content = Vec::new();
    let mut escalated = false;

    match mode {
        ExtractionMode::Minimal => {}
        ExtractionMode::Cheap => {
            flat_content = cheap::build_flat_blocks(&distilled.fragment, &host);
            if flat_content.len() < LOW_QUALITY_BLOCKS {
                debug!(
                    "cheap parse of {} yielded {} blocks, escalating to full",
                    url,
                    flat_content.len()
                );
                flat_content = Vec::new();
                content = full::build_sections(&distilled.fragment, &host);
                mode = ExtractionMode::Full;
                escalated = true;
            }
        }
        ExtractionMode::Full => {
            content = full::build_sections(&distilled.fragment, &host);
        }
    }

    let title = meta_fields
        .title
        .clone()
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| distilled.title.clone());

    let academic = detect::academic::scan(&distilled.text);
    let domain_type = detect::domain_type(url);
    let detection = detect::classify(url, &title, &distilled.text, &academic);
    let detection_confidence = detect::overall_confidence(
        domain_type,
        &academic,
        meta_fields.author.is_some(),
        meta_fields.published_time.is_some(),
        meta_fields.site_name.is_some(),
    );

    let word_count = distilled.text.split_whitespace().count();

    let mut page = Page {
        url: url.to_string(),
        title,
        content,
        flat_content,
        metadata: PageMetadata::default(),
    };

    let block_count = page.block_count();
    let section_count = page.section_count();
    let quality = match mode {
        ExtractionMode::Minimal => ExtractionQuality::Minimal,
        _ if escalated && block_count < LOW_QUALITY_BLOCKS => ExtractionQuality::Degraded,
        _ if block_count < LOW_QUALITY_BLOCKS => ExtractionQuality::Low,
        _ => ExtractionQuality::Ok,
    };

    page.metadata = PageMetadata {
        extraction_mode: mode,
        extraction_quality: quality,
        author: meta_fields.author,
        excerpt: meta_fields.excerpt,
        site_name: meta_fields.site_name,
        published_time: meta_fields.published_time,
        favicon: meta_fields.favicon,
        image: meta_fields.image,
        domain_type,
        domain_category: detect::category(url).to_string(),
        country: detect::country(url).to_string(),
        content_type: detection.content_type,
        content_subtype: detection.content_subtype,
        detection_confidence,
        academic,
        word_count,
        estimated_read_min: estimated_read_min(word_count),
        section_count,
        block_count,
        image_count: meta_fields.image_count,
        language: meta_fields.language,
        language_confidence: meta_fields.language_confidence,
        computed: true,
        ..PageMetadata::default()
    };

    Ok(Parsed {
        page,
        text: distilled.text,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn article_html(paragraphs: usize) -> String {
        let body: String = (0..paragraphs)
            .map(|i| {
                format!(
                    "<p>Paragraph {} with enough words to look like real article \
                     content that survives the readability distillation pass.</p>",
                    i
                )
            })
            .collect();
        format!(
            "<html><head><title>Escalation Sample</title></head><body>\
             <article><h1>Escalation Sample</h1>{}</article></body></html>",
            body
        )
    }

    fn url() -> Url {
        Url::parse("https://a.example/post").unwrap()
    }

    fn parsed_page(html: &str, mode: ExtractionMode, citations: bool) -> Page {
        parse_page(html, &url(), mode, citations).unwrap().page
    }

    #[test]
    fn minimal_mode_produces_no_blocks() {
        let page = parsed_page(&article_html(8), ExtractionMode::Minimal, false);
        assert!(page.content.is_empty());
        assert!(page.flat_content.is_empty());
        assert_eq!(page.metadata.extraction_mode, ExtractionMode::Minimal);
        assert_eq!(page.metadata.extraction_quality, ExtractionQuality::Minimal);
        assert!(page.metadata.word_count > 0);
        assert!(page.metadata.computed);
    }

    #[test]
    fn cheap_mode_populates_flat_only() {
        let page = parsed_page(&article_html(10), ExtractionMode::Cheap, false);
        assert_eq!(page.metadata.extraction_mode, ExtractionMode::Cheap);
        assert!(!page.flat_content.is_empty());
        assert!(page.content.is_empty());
        assert_eq!(page.metadata.extraction_quality, ExtractionQuality::Ok);
        for block in &page.flat_content {
            assert_eq!(block.confidence, 0.5);
        }
    }

    #[test]
    fn full_mode_populates_tree_only() {
        let page = parsed_page(&article_html(10), ExtractionMode::Full, false);
        assert_eq!(page.metadata.extraction_mode, ExtractionMode::Full);
        assert!(!page.content.is_empty());
        assert!(page.flat_content.is_empty());
        assert!(page.metadata.section_count >= 1);
    }

    #[test]
    fn sparse_cheap_parse_escalates_to_full() {
        let page = parsed_page(&article_html(3), ExtractionMode::Cheap, false);
        assert_eq!(page.metadata.extraction_mode, ExtractionMode::Full);
        assert!(page.flat_content.is_empty());
        assert!(page.metadata.section_count >= 1);
    }

    #[test]
    fn citations_requirement_promotes_cheap_to_full() {
        let page = parsed_page(&article_html(10), ExtractionMode::Cheap, true);
        assert_eq!(page.metadata.extraction_mode, ExtractionMode::Full);
        assert!(!page.content.is_empty());
    }

    #[test]
    fn counts_are_materialized() {
        let page = parsed_page(&article_html(10), ExtractionMode::Full, false);
        assert_eq!(page.metadata.block_count, page.block_count());
        assert_eq!(page.metadata.section_count, page.section_count());
        assert!(page.metadata.word_count > 50);
        assert!(page.metadata.estimated_read_min >= 1);
    }
}
