use url::Url;

use crate::core::types::{AcademicSignals, ContentType};

/// Classifier verdict: label, optional subtype, and the fixed confidence of
/// the matched rule (0–10 scale, separate from block confidence).
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    pub content_type: ContentType,
    pub content_subtype: Option<String>,
    pub type_confidence: f64,
}

impl Detection {
    fn new(content_type: ContentType, subtype: Option<&str>, confidence: f64) -> Self {
        Self {
            content_type,
            content_subtype: subtype.map(|s| s.to_string()),
            type_confidence: confidence,
        }
    }
}

const ACADEMIC_HOSTS: [&str; 13] = [
    "arxiv.org",
    "scholar.google.com",
    "semanticscholar.org",
    "pubmed.ncbi.nlm.nih.gov",
    "jstor.org",
    "springer.com",
    "sciencedirect.com",
    "nature.com",
    "ieee.org",
    "acm.org",
    "researchgate.net",
    "biorxiv.org",
    "plos.org",
];

const REPO_HOSTS: [&str; 4] = ["github.com", "gitlab.com", "bitbucket.org", "codeberg.org"];

const NEWS_HOSTS: [&str; 6] = [
    "news.ycombinator.com",
    "techcrunch.com",
    "arstechnica.com",
    "theverge.com",
    "wired.com",
    "reuters.com",
];

pub fn is_academic_host(host: &str) -> bool {
    ACADEMIC_HOSTS
        .iter()
        .any(|a| host == *a || host.ends_with(&format!(".{}", a)))
}

/// Ordered, short-circuiting cascade: academic → docs → wiki → repo → blog →
/// news → landing → unknown. First matching rule wins.
pub fn classify(url: &Url, title: &str, content: &str, academic: &AcademicSignals) -> Detection {
    let host = url.host_str().unwrap_or("").to_ascii_lowercase();
    let path = url.path().to_ascii_lowercase();
    let title_lower = title.to_ascii_lowercase();

    // Academic: known scholarly host, .edu paper path, or strong signals.
    if is_academic_host(&host)
        || (host.ends_with(".edu") && (path.contains("/paper") || path.contains("/pub")))
        || academic.academic_score >= 4.0
    {
        let subtype = if academic.has_doi || academic.has_arxiv {
            "paper"
        } else {
            "article"
        };
        return Detection::new(ContentType::Academic, Some(subtype), 9.0);
    }

    // Docs: documentation hosts and manual-shaped paths.
    if host.starts_with("docs.")
        || host.starts_with("doc.")
        || host == "developer.mozilla.org"
        || path.contains("/docs/")
        || path.contains("/documentation/")
        || path.contains("/reference/")
        || path.contains("/api/")
        || title_lower.contains("documentation")
    {
        let subtype = if path.contains("/api/") || path.contains("/reference/") {
            "api"
        } else {
            "guide"
        };
        return Detection::new(ContentType::Docs, Some(subtype), 8.0);
    }

    // Wiki: wiki hosts or /wiki/ paths.
    if host.contains("wikipedia.org")
        || host.contains("fandom.com")
        || host.starts_with("wiki.")
        || path.starts_with("/wiki/")
    {
        let subtype = if host.contains("wikipedia.org") {
            "wikipedia"
        } else {
            "wiki"
        };
        return Detection::new(ContentType::Wiki, Some(subtype), 9.0);
    }

    // Repo: code-hosting frontends.
    if REPO_HOSTS.iter().any(|h| host == *h || host.ends_with(&format!(".{}", h))) {
        return Detection::new(ContentType::Repo, Some("code"), 9.0);
    }

    // Blog: blogging hosts and post-shaped paths.
    if host.contains("blog")
        || host.ends_with("medium.com")
        || host.ends_with("substack.com")
        || host == "dev.to"
        || path.contains("/blog/")
        || path.contains("/posts/")
    {
        return Detection::new(ContentType::Blog, None, 7.0);
    }

    // News: known outlets or news-shaped paths.
    if NEWS_HOSTS.iter().any(|h| host == *h || host.ends_with(&format!(".{}", h)))
        || path.contains("/news/")
    {
        let subtype = if host.contains("tech") || host == "news.ycombinator.com" {
            "tech"
        } else {
            "general"
        };
        return Detection::new(ContentType::News, Some(subtype), 7.0);
    }

    // Landing: a bare host with no path and thin content.
    if (path == "/" || path.is_empty()) && content.split_whitespace().count() < 300 {
        return Detection::new(ContentType::Landing, None, 6.0);
    }

    Detection::new(ContentType::Unknown, None, 3.0)
}
