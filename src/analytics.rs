use std::collections::HashMap;

/// Closed-class English plus the navigation/UI noise that dominates scraped
/// pages. Checked against every token before it can reach a keyword list.
pub const STOP_WORDS: [&str; 123] = [
    "a", "an", "the", "and", "or", "but", "nor", "so", "yet", "if", "then", "else", "when",
    "while", "as", "at", "by", "for", "from", "in", "into", "of", "off", "on", "onto", "out",
    "over", "to", "under", "up", "with", "about", "after", "before", "between", "during",
    "through", "is", "am", "are", "was", "were", "be", "been", "being", "do", "does", "did",
    "have", "has", "had", "having", "will", "would", "can", "could", "shall", "should", "may",
    "might", "must", "not", "no", "it", "its", "this", "that", "these", "those", "he", "she",
    "they", "them", "his", "her", "their", "we", "us", "our", "you", "your", "i", "me", "my",
    "who", "whom", "which", "what", "where", "why", "how", "all", "any", "both", "each", "few",
    "more", "most", "other", "some", "such", "than", "too", "very", "just", "also", "there",
    // Web-UI noise
    "click", "here", "home", "menu", "search", "login", "signup", "share", "cookie", "cookies",
    "privacy", "terms", "subscribe", "next", "previous", "page",
];

pub fn is_stop_word(word: &str) -> bool {
    STOP_WORDS.contains(&word)
}

/// Lowercase, tokenize on whitespace, strip surrounding non-alphanumerics
/// (intra-word hyphens and apostrophes survive), drop stop words and bare
/// one-to-two-digit numbers.
pub fn word_frequency(text: &str) -> HashMap<String, u64> {
    let mut counts: HashMap<String, u64> = HashMap::new();
    for raw in text.split_whitespace() {
        let token = normalize_token(raw);
        if token.is_empty() || is_stop_word(&token) {
            continue;
        }
        if token.len() <= 2 && token.chars().all(|c| c.is_ascii_digit()) {
            continue;
        }
        if token.len() < 2 {
            continue;
        }
        *counts.entry(token).or_insert(0) += 1;
    }
    counts
}

fn normalize_token(raw: &str) -> String {
    let lower = raw.to_lowercase();
    lower
        .trim_matches(|c: char| !c.is_alphanumeric())
        .to_string()
}

/// A token is malformed when its brackets are unbalanced, a quote is
/// unmatched, or it trails a dangling `:` / `=`.
pub fn is_malformed_token(word: &str) -> bool {
    if word.ends_with(':') || word.ends_with('=') {
        return true;
    }
    for (open, close) in [('(', ')'), ('[', ']'), ('{', '}')] {
        let opens = word.matches(open).count();
        let closes = word.matches(close).count();
        if opens != closes {
            return true;
        }
    }
    if word.matches('"').count() % 2 != 0 {
        return true;
    }
    // A lone apostrophe at either edge is an unmatched quote; an interior
    // one (contractions) is fine.
    if (word.starts_with('\'') || word.ends_with('\'')) && word.matches('\'').count() % 2 != 0 {
        return true;
    }
    false
}

/// Top-N keywords as `word:count` strings, sorted by count descending with
/// the word as tiebreak. Malformed tokens and stop words are filtered.
pub fn top_keywords(counts: &HashMap<String, u64>, n: usize) -> Vec<String> {
    let mut entries: Vec<(&String, &u64)> = counts
        .iter()
        .filter(|(word, _)| !is_malformed_token(word) && !is_stop_word(word))
        .collect();
    entries.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
    entries
        .into_iter()
        .take(n)
        .map(|(word, count)| format!("{}:{}", word, count))
        .collect()
}

/// Key-wise sum of per-URL maps. Deterministic with respect to the multiset
/// of inputs, not their observation order.
pub fn reduce(maps: impl IntoIterator<Item = HashMap<String, u64>>) -> HashMap<String, u64> {
    let mut total: HashMap<String, u64> = HashMap::new();
    for map in maps {
        for (word, count) in map {
            *total.entry(word).or_insert(0) += count;
        }
    }
    total
}

/// Render a frequency map as `word:count` lines, count-descending, the
/// on-disk `wordcount.txt` format.
pub fn to_wordcount_lines(counts: &HashMap<String, u64>) -> String {
    let mut entries: Vec<(&String, &u64)> = counts.iter().collect();
    entries.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
    let mut out = String::new();
    for (word, count) in entries {
        out.push_str(word);
        out.push(':');
        out.push_str(&count.to_string());
        out.push('\n');
    }
    out
}

/// Parse `wordcount.txt` content back into a map. Words may themselves
/// contain `:`; the count is everything after the last colon.
pub fn parse_wordcount_lines(text: &str) -> HashMap<String, u64> {
    let mut counts = HashMap::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(idx) = line.rfind(':') {
            let word = &line[..idx];
            if let Ok(count) = line[idx + 1..].parse::<u64>() {
                if !word.is_empty() {
                    *counts.entry(word.to_string()).or_insert(0) += count;
                }
            }
        }
    }
    counts
}
