pub mod academic;
pub mod content_type;

use url::Url;

use crate::core::types::{AcademicSignals, DomainType};

pub use content_type::{classify, Detection};

/// Domain classification by host suffix and shape.
pub fn domain_type(url: &Url) -> DomainType {
    let host = url.host_str().unwrap_or("").to_ascii_lowercase();
    if host.ends_with(".gov") || host.ends_with(".mil") {
        return DomainType::Gov;
    }
    if host.ends_with(".edu") {
        return DomainType::Edu;
    }
    if content_type::is_academic_host(&host) {
        return DomainType::Academic;
    }
    if host.starts_with("m.") || host.starts_with("mobile.") {
        return DomainType::Mobile;
    }
    DomainType::Commercial
}

/// Country from the last host label. US government/education TLDs map to
/// `us`; anything unrecognized is `unknown`.
pub fn country(url: &Url) -> &'static str {
    let host = url.host_str().unwrap_or("").to_ascii_lowercase();
    let tld = host.rsplit('.').next().unwrap_or("");
    match tld {
        "gov" | "edu" | "mil" | "us" => "us",
        "uk" => "uk",
        "de" => "de",
        "fr" => "fr",
        "jp" => "jp",
        "cn" => "cn",
        "ru" => "ru",
        "br" => "br",
        "in" => "in",
        "ca" => "ca",
        "au" => "au",
        "it" => "it",
        "es" => "es",
        "nl" => "nl",
        "se" => "se",
        "ch" => "ch",
        "kr" => "kr",
        _ => "unknown",
    }
}

/// Rule cascade over host and path substrings; first match wins.
pub fn category(url: &Url) -> &'static str {
    let host = url.host_str().unwrap_or("").to_ascii_lowercase();
    let path = url.path().to_ascii_lowercase();

    if host.ends_with(".gov") || host.ends_with(".mil") {
        if path.contains("health") || path.contains("medical") || path.contains("disease") {
            return "gov/health";
        }
        return "gov/general";
    }
    if host.ends_with(".edu") || content_type::is_academic_host(&host) {
        if path.contains("/ai")
            || path.contains("machine-learning")
            || path.contains("neural")
            || host.contains("ai.")
        {
            return "academic/ai";
        }
        return "academic/general";
    }
    if host.starts_with("docs.") || path.contains("/docs/") || path.contains("/api/") {
        return "docs/api";
    }
    if host.contains("blog") || path.contains("/blog/") {
        return "blog";
    }
    if host == "news.ycombinator.com"
        || host.ends_with("techcrunch.com")
        || host.ends_with("arstechnica.com")
        || host.ends_with("theverge.com")
    {
        return "news/tech";
    }
    "general"
}

/// Overall detection confidence on the 0–10 scale: a 5.0 baseline plus
/// domain, academic, and metadata-presence bonuses.
pub fn overall_confidence(
    domain: DomainType,
    academic: &AcademicSignals,
    has_author: bool,
    has_published_time: bool,
    has_site_name: bool,
) -> f64 {
    let mut score = 5.0;
    score += match domain {
        DomainType::Gov | DomainType::Edu => 2.0,
        DomainType::Academic => 3.0,
        DomainType::Mobile => 1.0,
        DomainType::Commercial => 0.0,
    };
    score += 0.3 * academic.academic_score;
    if has_author {
        score += 0.5;
    }
    if has_published_time {
        score += 0.5;
    }
    if has_site_name {
        score += 0.3;
    }
    score.min(10.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn domain_suffix_rules() {
        assert_eq!(domain_type(&url("https://cdc.gov/flu")), DomainType::Gov);
        assert_eq!(domain_type(&url("https://army.mil/")), DomainType::Gov);
        assert_eq!(domain_type(&url("https://mit.edu/ai")), DomainType::Edu);
        assert_eq!(domain_type(&url("https://arxiv.org/abs/1")), DomainType::Academic);
        assert_eq!(domain_type(&url("https://m.example.com/")), DomainType::Mobile);
        assert_eq!(domain_type(&url("https://shop.example.com/")), DomainType::Commercial);
    }

    #[test]
    fn country_table() {
        assert_eq!(country(&url("https://cdc.gov/")), "us");
        assert_eq!(country(&url("https://bbc.co.uk/")), "uk");
        assert_eq!(country(&url("https://spiegel.de/")), "de");
        assert_eq!(country(&url("https://example.com/")), "unknown");
    }

    #[test]
    fn category_cascade() {
        assert_eq!(category(&url("https://cdc.gov/health/flu")), "gov/health");
        assert_eq!(category(&url("https://nasa.gov/missions")), "gov/general");
        assert_eq!(category(&url("https://mit.edu/machine-learning/intro")), "academic/ai");
        assert_eq!(category(&url("https://stanford.edu/courses")), "academic/general");
        assert_eq!(category(&url("https://docs.rs/serde")), "docs/api");
        assert_eq!(category(&url("https://example.com/blog/hello")), "blog");
        assert_eq!(category(&url("https://news.ycombinator.com/item?id=1")), "news/tech");
        assert_eq!(category(&url("https://example.com/about")), "general");
    }

    #[test]
    fn confidence_bonuses_clamp_at_ten() {
        let mut signals = AcademicSignals::default();
        assert_eq!(
            overall_confidence(DomainType::Commercial, &signals, false, false, false),
            5.0
        );
        signals.academic_score = 10.0;
        let score = overall_confidence(DomainType::Academic, &signals, true, true, true);
        assert_eq!(score, 10.0);
    }
}
