use std::collections::HashMap;
use std::time::Duration;

use serde_json::json;
use tracing::debug;

use crate::analytics;
use crate::corpus::{CorpusRequest, CorpusResponse};
use crate::store::{ArtifactKind, ArtifactStore, RelationalIndex};

const DEFAULT_TOP: usize = 25;

/// Co-occurrence rules over the top keywords; the first rule with at least
/// two hits names the interpretation.
const INTERPRETATIONS: [(&str, &[&str]); 3] = [
    (
        "debugging-oriented content",
        &["error", "exception", "debug", "stack", "trace", "failed", "panic"],
    ),
    (
        "programming documentation",
        &["function", "class", "type", "method", "api", "parameter", "return", "struct", "trait"],
    ),
    (
        "research-oriented content",
        &["study", "research", "data", "results", "analysis", "method", "model"],
    ),
];

/// EXTRACT: aggregate per-URL `wordcount.txt` artifacts into a ranked
/// keyword list with interpretation hints.
pub fn run(
    request: &CorpusRequest,
    index: &RelationalIndex,
    store: &ArtifactStore,
) -> CorpusResponse {
    let verb = "extract";

    let url_ids = if !request.url_ids.is_empty() {
        request.url_ids.clone()
    } else if let Some(session) = request.session {
        match index.session(session) {
            Ok(Some(_)) => match index.session_url_ids(session) {
                Ok(ids) => ids,
                Err(e) => return CorpusResponse::error(verb, "database_error", e.to_string(), vec![]),
            },
            Ok(None) => {
                return CorpusResponse::error(
                    verb,
                    "session_error",
                    format!("session {} not found", session),
                    vec!["list sessions with: webcorpus db sessions".to_string()],
                )
            }
            Err(e) => return CorpusResponse::error(verb, "database_error", e.to_string(), vec![]),
        }
    } else {
        return CorpusResponse::error(
            verb,
            "missing_parameter",
            "extract requires --session or --url-ids",
            vec!["pass --session <id> or --url-ids 1,2,3".to_string()],
        );
    };

    let top_n = request
        .constraints
        .get("top")
        .and_then(|v| v.as_u64())
        .map(|n| n as usize)
        .unwrap_or(DEFAULT_TOP);

    let mut total: HashMap<String, u64> = HashMap::new();
    let mut files_read = 0usize;
    let mut unknowns: Vec<String> = Vec::new();

    for &url_id in &url_ids {
        match store.read(url_id, ArtifactKind::Wordcount, Duration::MAX) {
            Ok(Some((bytes, _))) => {
                let text = String::from_utf8_lossy(&bytes);
                for (word, count) in analytics::parse_wordcount_lines(&text) {
                    // Curly apostrophes creep in from typographic pages.
                    let word = word.replace(['\u{2019}', '\u{2018}'], "'");
                    if analytics::is_stop_word(&word) {
                        continue;
                    }
                    *total.entry(word).or_insert(0) += count;
                }
                files_read += 1;
            }
            Ok(None) => unknowns.push(format!("url {}: no wordcount artifact", url_id)),
            Err(e) => unknowns.push(format!("url {}: {}", url_id, e)),
        }
    }

    debug!(
        "extract aggregated {} keywords from {}/{} urls",
        total.len(),
        files_read,
        url_ids.len()
    );

    let mut entries: Vec<(&String, &u64)> = total
        .iter()
        .filter(|(word, _)| !analytics::is_malformed_token(word))
        .collect();
    entries.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));

    let keywords: Vec<serde_json::Value> = entries
        .iter()
        .take(top_n)
        .map(|(word, count)| json!({ "word": word, "count": count }))
        .collect();

    let top_words: Vec<&str> = entries.iter().take(15).map(|(w, _)| w.as_str()).collect();
    let hint_words: Vec<&str> = top_words.iter().take(3).copied().collect();
    let interpretation = interpret(&top_words);

    let follow_ups: Vec<String> = hint_words
        .iter()
        .map(|w| format!("corpus query --filter \"keyword:{}\"", w))
        .chain(std::iter::once(
            "corpus query --filter \"content_type=academic\"".to_string(),
        ))
        .collect();

    let coverage = if url_ids.is_empty() {
        0.0
    } else {
        files_read as f64 / url_ids.len() as f64
    };
    let confidence = if files_read > 0 { 0.95 } else { 0.0 };

    let data = json!({
        "keywords": keywords,
        "url_count": url_ids.len(),
        "files_read": files_read,
        "hints": {
            "top": hint_words,
            "follow_ups": follow_ups,
            "interpretation": interpretation,
        },
    });

    CorpusResponse::ok(verb, data, confidence, coverage, unknowns)
}

fn interpret(top_words: &[&str]) -> Option<&'static str> {
    for (label, vocabulary) in INTERPRETATIONS {
        let hits = top_words
            .iter()
            .filter(|w| vocabulary.contains(&w.to_lowercase().as_str()))
            .count();
        if hits >= 2 {
            return Some(label);
        }
    }
    None
}
