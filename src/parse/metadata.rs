use scraper::{Html, Selector};
use url::Url;
use whatlang::{detect, Lang};

/// Document-level metadata pulled from meta tags and OpenGraph properties.
#[derive(Clone, Debug, Default)]
pub struct MetaFields {
    pub title: Option<String>,
    pub author: Option<String>,
    pub excerpt: Option<String>,
    pub site_name: Option<String>,
    pub published_time: Option<String>,
    pub favicon: Option<String>,
    pub image: Option<String>,
    pub image_count: usize,
    pub language: String,
    pub language_confidence: f64,
}

fn select_content(document: &Html, selector: &str) -> Option<String> {
    let sel = Selector::parse(selector).ok()?;
    document
        .select(&sel)
        .next()
        .and_then(|el| el.value().attr("content"))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

pub fn extract(document: &Html, base_url: &Url, sample_text: &str) -> MetaFields {
    let mut fields = MetaFields::default();

    fields.title = extract_title(document);
    fields.author = select_content(document, r#"meta[name="author"]"#)
        .or_else(|| select_content(document, r#"meta[property="article:author"]"#));
    fields.excerpt = select_content(document, r#"meta[name="description"]"#)
        .or_else(|| select_content(document, r#"meta[property="og:description"]"#));
    fields.site_name = select_content(document, r#"meta[property="og:site_name"]"#);
    fields.published_time = select_content(document, r#"meta[property="article:published_time"]"#)
        .or_else(|| select_content(document, r#"meta[name="date"]"#));
    fields.image = select_content(document, r#"meta[property="og:image"]"#)
        .and_then(|s| absolutize(base_url, &s));
    fields.favicon = extract_favicon(document, base_url);
    fields.image_count = count_images(document);

    let (language, confidence) = detect_language(document, sample_text);
    fields.language = language;
    fields.language_confidence = confidence;

    fields
}

/// Page title: `<title>` first, `<h1>` as fallback.
fn extract_title(document: &Html) -> Option<String> {
    for selector in ["title", "h1"] {
        if let Ok(sel) = Selector::parse(selector) {
            if let Some(el) = document.select(&sel).next() {
                let text = el.text().collect::<String>().trim().to_string();
                if !text.is_empty() {
                    return Some(text);
                }
            }
        }
    }
    None
}

fn extract_favicon(document: &Html, base_url: &Url) -> Option<String> {
    for selector in [
        r#"link[rel="icon"]"#,
        r#"link[rel="shortcut icon"]"#,
        r#"link[rel="apple-touch-icon"]"#,
    ] {
        if let Ok(sel) = Selector::parse(selector) {
            if let Some(el) = document.select(&sel).next() {
                if let Some(href) = el.value().attr("href") {
                    return absolutize(base_url, href);
                }
            }
        }
    }
    None
}

fn count_images(document: &Html) -> usize {
    let Ok(sel) = Selector::parse("img[src]") else {
        return 0;
    };
    document.select(&sel).count()
}

fn absolutize(base_url: &Url, href: &str) -> Option<String> {
    base_url
        .join(href)
        .ok()
        .map(|u| u.to_string())
        .or_else(|| Some(href.to_string()))
}

/// Language from the `lang` attribute when declared, else whatlang over the
/// distilled text. Attribute declarations get full confidence; detection
/// carries whatlang's own confidence.
fn detect_language(document: &Html, sample_text: &str) -> (String, f64) {
    if let Ok(sel) = Selector::parse("html") {
        if let Some(el) = document.select(&sel).next() {
            if let Some(lang) = el.value().attr("lang") {
                let code = lang.trim().split('-').next().unwrap_or("").to_lowercase();
                if !code.is_empty() {
                    return (code, 1.0);
                }
            }
        }
    }

    if sample_text.split_whitespace().count() >= 10 {
        if let Some(info) = detect(sample_text) {
            let code = match info.lang() {
                Lang::Eng => "en".to_string(),
                Lang::Spa => "es".to_string(),
                Lang::Fra => "fr".to_string(),
                Lang::Deu => "de".to_string(),
                Lang::Ita => "it".to_string(),
                Lang::Por => "pt".to_string(),
                Lang::Rus => "ru".to_string(),
                Lang::Jpn => "ja".to_string(),
                Lang::Kor => "ko".to_string(),
                Lang::Cmn => "zh".to_string(),
                other => format!("{:?}", other).to_lowercase(),
            };
            return (code, info.confidence());
        }
    }

    ("unknown".to_string(), 0.0)
}
