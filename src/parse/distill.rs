use readability::extractor;
use regex::Regex;
use std::sync::OnceLock;
use tracing::{debug, warn};
use url::Url;

use crate::core::errors::{PipelineError, Result};

/// Readability output plus the plain text used for counting and scanning.
#[derive(Clone, Debug)]
pub struct Distilled {
    pub title: String,
    /// Main-content HTML fragment the block passes walk.
    pub fragment: String,
    pub text: String,
}

fn script_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<(script|style|noscript)[^>]*>.*?</(script|style|noscript)>").unwrap())
}

/// Strip script/style payloads before readability sees the page. Keeps the
/// extractor from scoring JS-heavy wrappers as content.
fn preprocess(html: &str) -> String {
    script_re().replace_all(html, "").into_owned()
}

/// Readability-style main-content distillation. Falls back to the whole
/// `<body>` when the extractor returns almost nothing; fails with a parse
/// error only when the extractor itself fails.
pub fn distill(html: &str, base_url: &Url) -> Result<Distilled> {
    let pre = preprocess(html);

    let product =
        extractor::extract(&mut pre.as_bytes(), base_url).map_err(|e| PipelineError::Parse {
            url: base_url.to_string(),
            message: format!("readability failed: {}", e),
        })?;

    let mut fragment = product.content;
    let mut text = crate::parse::blocks::normalize_text(&product.text);

    // Thin result: readability sometimes strips everything on sparse or
    // unusual markup. The raw body is a better input for the block walk.
    if text.len() < 80 {
        warn!(
            "readability yielded {} chars for {}, falling back to full body",
            text.len(),
            base_url
        );
        if let Some(body) = body_fragment(&pre) {
            let body_text = fragment_text(&body);
            if body_text.len() > text.len() {
                fragment = body;
                text = body_text;
            }
        }
    }

    debug!("distilled {} to {} chars of text", base_url, text.len());

    Ok(Distilled {
        title: product.title.trim().to_string(),
        fragment,
        text,
    })
}

fn body_fragment(html: &str) -> Option<String> {
    let doc = scraper::Html::parse_document(html);
    let body = doc
        .select(&scraper::Selector::parse("body").unwrap())
        .next()?;
    Some(body.inner_html())
}

fn fragment_text(fragment: &str) -> String {
    let doc = scraper::Html::parse_fragment(fragment);
    crate::parse::blocks::normalize_text(&doc.root_element().text().collect::<String>())
}
