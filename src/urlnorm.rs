use regex::Regex;
use std::sync::OnceLock;
use url::Url;

/// A raw input URL after sanitization, with the original retained whenever
/// cleaning changed it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SanitizedUrl {
    pub url: String,
    /// The pre-sanitization string, present only when it differs from `url`.
    pub original: Option<String>,
}

impl SanitizedUrl {
    pub fn was_sanitized(&self) -> bool {
        self.original.is_some()
    }
}

/// Outcome of preflight validation over a raw URL list.
#[derive(Clone, Debug, Default)]
pub struct NormalizedBatch {
    pub valid: Vec<SanitizedUrl>,
    pub invalid: Vec<String>,
}

fn url_shape_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^https?://[^/\s]+(/\S*)?$").unwrap())
}

/// Clean one raw URL string: trim, unwrap `[text](url)` markdown links,
/// strip balanced wrapping punctuation and trailing clutter.
pub fn sanitize(raw: &str) -> String {
    let mut s = raw.trim().to_string();

    // Markdown link form: keep the target.
    if s.starts_with('[') {
        if let Some(close) = s.find("](") {
            if let Some(end) = s[close + 2..].find(')') {
                s = s[close + 2..close + 2 + end].trim().to_string();
            }
        }
    }

    // Balanced wrapping pairs, applied repeatedly: [u] (u) <u> "u" 'u'
    let pairs = [('[', ']'), ('(', ')'), ('<', '>'), ('"', '"'), ('\'', '\'')];
    loop {
        let before = s.len();
        for (open, close) in pairs {
            if s.len() >= 2 && s.starts_with(open) && s.ends_with(close) {
                s = s[1..s.len() - 1].trim().to_string();
            }
        }
        if s.len() == before {
            break;
        }
    }

    // Trailing punctuation that URLs pasted from prose tend to pick up.
    while let Some(last) = s.chars().last() {
        if matches!(last, ',' | '.' | ';' | ':' | ')' | '}' | ']' | '"' | '\'') {
            s.pop();
        } else {
            break;
        }
    }

    s.trim().to_string()
}

/// A sanitized URL is valid when it is http(s), has a non-empty host free of
/// bracket/quote characters, contains no literal spaces (pre-encoded `%20`
/// is fine), and round-trips through the URL parser.
pub fn is_valid(candidate: &str) -> bool {
    if candidate.is_empty() || candidate.contains(' ') {
        return false;
    }
    if !url_shape_re().is_match(candidate) {
        return false;
    }
    let parsed = match Url::parse(candidate) {
        Ok(u) => u,
        Err(_) => return false,
    };
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return false;
    }
    match parsed.host_str() {
        None | Some("") => false,
        Some(host) => !host.chars().any(|c| "{}[]<>\"'".contains(c)),
    }
}

/// Sanitize, validate, and dedupe a raw URL list, preserving first-seen
/// order. Invalid inputs are reported under their raw form.
pub fn normalize_batch<I, S>(raw_urls: I) -> NormalizedBatch
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut batch = NormalizedBatch::default();
    let mut seen: Vec<String> = Vec::new();

    for raw in raw_urls {
        let raw = raw.as_ref();
        if raw.trim().is_empty() {
            continue;
        }
        let cleaned = sanitize(raw);
        if !is_valid(&cleaned) {
            batch.invalid.push(raw.to_string());
            continue;
        }
        if seen.contains(&cleaned) {
            continue;
        }
        seen.push(cleaned.clone());
        let original = if cleaned == raw.trim() {
            None
        } else {
            Some(raw.to_string())
        };
        batch.valid.push(SanitizedUrl { url: cleaned, original });
    }

    batch
}

/// Canonical form: scheme + host + path, query and fragment stripped.
pub fn canonical_form(url: &Url) -> String {
    let mut out = format!("{}://{}", url.scheme(), url.host_str().unwrap_or(""));
    if let Some(port) = url.port() {
        out.push_str(&format!(":{}", port));
    }
    out.push_str(url.path());
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markdown_links_unwrap() {
        assert_eq!(sanitize("[click](https://a.example)"), "https://a.example");
        assert_eq!(
            sanitize("[ docs ]( https://a.example/path )"),
            "https://a.example/path"
        );
    }

    #[test]
    fn wrapping_and_trailing_punctuation_strips() {
        assert_eq!(sanitize("<https://a.example>"), "https://a.example");
        assert_eq!(sanitize("(https://a.example)"), "https://a.example");
        assert_eq!(sanitize("https://b.example."), "https://b.example");
        assert_eq!(sanitize("  https://c.example  "), "https://c.example");
        assert_eq!(sanitize("\"https://d.example\","), "https://d.example");
    }

    #[test]
    fn validation_rejects_malformed() {
        assert!(is_valid("https://a.example"));
        assert!(is_valid("http://a.example/path?q=1#frag"));
        assert!(is_valid("https://a.example/with%20space"));
        assert!(!is_valid("not-a-url"));
        assert!(!is_valid("ftp://x"));
        assert!(!is_valid("https://"));
        assert!(!is_valid("https://a b.example"));
        assert!(!is_valid("https://a{x}.example"));
    }

    #[test]
    fn batch_collects_invalid_and_dedupes() {
        let batch = normalize_batch([
            "[click](https://a.example)",
            "https://b.example.",
            "  https://c.example  ",
            "https://a.example",
            "not-a-url",
            "ftp://x",
        ]);
        assert_eq!(
            batch.valid.iter().map(|s| s.url.as_str()).collect::<Vec<_>>(),
            vec!["https://a.example", "https://b.example", "https://c.example"]
        );
        assert_eq!(batch.invalid, vec!["not-a-url".to_string(), "ftp://x".to_string()]);
        // The first two were rewritten, so originals are recorded;
        // whitespace-only trimming does not count as sanitization.
        assert!(batch.valid[0].was_sanitized());
        assert!(batch.valid[1].was_sanitized());
        assert!(!batch.valid[2].was_sanitized());
    }

    #[test]
    fn sanitize_roundtrips_or_rejects() {
        for raw in ["https://ok.example/a", "[x](https://ok.example)", "garbage", "https://{bad}.example"] {
            let cleaned = sanitize(raw);
            if is_valid(&cleaned) {
                assert!(Url::parse(&cleaned).is_ok());
            }
        }
    }

    #[test]
    fn canonical_strips_query_and_fragment() {
        let u = Url::parse("https://a.example/path/page?q=1&x=2#section").unwrap();
        assert_eq!(canonical_form(&u), "https://a.example/path/page");
    }
}
