use std::fs;
use std::path::PathBuf;

use serde_json::{json, Map, Value};
use tracing::debug;

use crate::core::config::{FetchOptions, SummaryVersion};
use crate::core::errors::Result;
use crate::core::types::{estimated_tokens, ContentType, ExtractionMode};
use crate::orchestrator::worker::UrlOutcome;
use crate::store::{ArtifactStore, SessionRow};

/// Session-directory writers: `summary-index.yaml` (successes only),
/// `summary-details.yaml` (every URL), `failed-urls.yaml` (failures only).
pub fn write_session_summaries(
    store: &ArtifactStore,
    session: &SessionRow,
    outcomes: &[UrlOutcome],
    options: &FetchOptions,
) -> Result<PathBuf> {
    let dir = store.base().join(&session.session_dir);
    fs::create_dir_all(&dir)?;

    let index_entries: Vec<Value> = sorted(outcomes)
        .iter()
        .filter_map(|o| index_entry(o))
        .collect();
    write_yaml(&dir.join("summary-index.yaml"), &Value::Array(index_entries))?;

    let detail_entries: Vec<Value> = sorted(outcomes)
        .iter()
        .map(|o| detail_entry(o, options))
        .collect();
    write_yaml(&dir.join("summary-details.yaml"), &Value::Array(detail_entries))?;

    let failed: Vec<Value> = sorted(outcomes)
        .iter()
        .filter_map(|o| failed_entry(o))
        .collect();
    if !failed.is_empty() {
        write_yaml(&dir.join("failed-urls.yaml"), &Value::Array(failed))?;
    }

    debug!("session summaries written to {}", dir.display());
    Ok(dir)
}

/// Summary writers must not depend on worker completion order.
fn sorted(outcomes: &[UrlOutcome]) -> Vec<&UrlOutcome> {
    let mut sorted: Vec<&UrlOutcome> = outcomes.iter().collect();
    sorted.sort_by_key(|o| o.url_id);
    sorted
}

fn index_entry(outcome: &UrlOutcome) -> Option<Value> {
    let success = outcome.result.as_ref().ok()?;
    Some(json!({
        "url": outcome.url,
        "cat": success.metadata.domain_category,
        "conf": success.metadata.detection_confidence,
        "title": success.title,
        "desc": success.metadata.excerpt,
        "tokens": estimated_tokens(success.metadata.word_count),
    }))
}

fn detail_entry(outcome: &UrlOutcome, options: &FetchOptions) -> Value {
    let v1 = detail_entry_v1(outcome);
    match options.summary_version {
        SummaryVersion::V1 => project_fields(v1, options.summary_fields.as_deref()),
        SummaryVersion::V2 => terse_alias(v1),
    }
}

fn detail_entry_v1(outcome: &UrlOutcome) -> Value {
    match &outcome.result {
        Ok(s) => {
            let m = &s.metadata;
            json!({
                "id": outcome.url_id,
                "url": outcome.url,
                "file": s.artifact_path,
                "status": "success",
                "status_code": m.status_code,
                "error": Value::Null,
                "title": s.title,
                "excerpt": m.excerpt,
                "site_name": m.site_name,
                "author": m.author,
                "published_at": m.published_time,
                "domain_type": m.domain_type.as_str(),
                "domain_category": m.domain_category,
                "country": m.country,
                "confidence": m.detection_confidence,
                "academic_score": m.academic.academic_score,
                "has_doi": m.academic.has_doi,
                "has_arxiv": m.academic.has_arxiv,
                "has_latex": m.academic.has_latex,
                "has_citations": m.academic.has_citations,
                "has_references": m.academic.has_references,
                "has_abstract": m.academic.has_abstract,
                "doi": m.academic.doi,
                "arxiv_id": m.academic.arxiv_id,
                "word_count": m.word_count,
                "estimated_tokens": estimated_tokens(m.word_count),
                "read_time_min": m.estimated_read_min,
                "language": m.language,
                "language_confidence": m.language_confidence,
                "content_type": m.content_type.as_str(),
                "extraction_mode": m.extraction_mode.as_str(),
                "extraction_quality": m.extraction_quality.as_str(),
                "section_count": m.section_count,
                "block_count": m.block_count,
                "has_favicon": m.favicon.is_some(),
                "image_count": m.image_count,
                "final_url": m.final_url,
                "redirect_chain": m.redirect_chain,
                "http_content_type": m.http_content_type,
            })
        }
        Err(f) => json!({
            "id": outcome.url_id,
            "url": outcome.url,
            "file": Value::Null,
            "status": "failed",
            "status_code": f.status_code,
            "error": format!("{}: {}", f.error_type, f.message),
        }),
    }
}

fn failed_entry(outcome: &UrlOutcome) -> Option<Value> {
    let failure = outcome.result.as_ref().err()?;
    Some(json!({
        "url": outcome.url,
        "status_code": failure.status_code,
        "error_type": failed_bucket(&failure.error_type),
        "error_message": failure.message,
    }))
}

/// Collapse the internal error taxonomy onto the closed failed-urls set.
fn failed_bucket(kind: &str) -> &'static str {
    match kind {
        "http_error" => "http_error",
        "fetch_error" => "fetch_error",
        "timeout" => "timeout",
        "parse_error" | "marshal_error" => "parse_error",
        "cache_error" | "cache_miss" => "network_error",
        _ => "unknown_error",
    }
}

/// Restrict a v1 detail record to the requested field names; identity,
/// status, and error context always survive.
fn project_fields(value: Value, fields: Option<&[String]>) -> Value {
    let Some(fields) = fields else {
        return value;
    };
    let Value::Object(map) = value else {
        return value;
    };
    let keep = |key: &str| {
        matches!(key, "id" | "url" | "status" | "status_code" | "error")
            || fields.iter().any(|f| f == key)
    };
    Value::Object(
        map.into_iter()
            .filter(|(key, _)| keep(key))
            .collect::<Map<String, Value>>(),
    )
}

/// (v1 key, v2 key) alias table for the terse schema.
const TERSE_ALIASES: [(&str, &str); 39] = [
    ("id", "i"),
    ("url", "u"),
    ("file", "f"),
    ("status", "s"),
    ("status_code", "c"),
    ("error", "e"),
    ("title", "t"),
    ("excerpt", "x"),
    ("site_name", "sn"),
    ("author", "a"),
    ("published_at", "p"),
    ("domain_type", "dt"),
    ("domain_category", "dc"),
    ("country", "co"),
    ("confidence", "cf"),
    ("academic_score", "as"),
    ("has_doi", "hd"),
    ("has_arxiv", "ha"),
    ("has_latex", "hl"),
    ("has_citations", "hc"),
    ("has_references", "hr"),
    ("has_abstract", "hb"),
    ("doi", "doi"),
    ("arxiv_id", "ax"),
    ("word_count", "w"),
    ("estimated_tokens", "tk"),
    ("read_time_min", "rt"),
    ("language", "lg"),
    ("language_confidence", "lc"),
    ("content_type", "ct"),
    ("extraction_mode", "m"),
    ("extraction_quality", "q"),
    ("section_count", "sc"),
    ("block_count", "bc"),
    ("has_favicon", "hf"),
    ("image_count", "ic"),
    ("final_url", "fu"),
    ("redirect_chain", "rc"),
    ("http_content_type", "ht"),
];

fn terse_alias(value: Value) -> Value {
    let Value::Object(map) = value else {
        return value;
    };
    let mut out = Map::new();
    for (key, val) in map {
        let short = TERSE_ALIASES
            .iter()
            .find(|(long, _)| *long == key)
            .map(|(_, short)| (*short).to_string())
            .unwrap_or(key.clone());
        out.insert(short, terse_value(&key, val));
    }
    Value::Object(out)
}

/// Small-integer / single-character encodings for the terse schema.
fn terse_value(key: &str, value: Value) -> Value {
    match (key, &value) {
        ("status", Value::String(s)) => json!(if s == "success" { 1 } else { 0 }),
        ("extraction_mode", Value::String(s)) => match ExtractionMode::parse_str(s) {
            Some(ExtractionMode::Minimal) => json!(0),
            Some(ExtractionMode::Cheap) => json!(1),
            Some(ExtractionMode::Full) => json!(2),
            None => value,
        },
        ("extraction_quality", Value::String(s)) => match s.as_str() {
            "minimal" => json!(0),
            "low" => json!(1),
            "ok" => json!(2),
            "degraded" => json!(3),
            _ => value,
        },
        ("content_type", Value::String(s)) => {
            let ordinal = match ContentType::parse_str(s) {
                ContentType::Academic => 0,
                ContentType::Docs => 1,
                ContentType::Wiki => 2,
                ContentType::News => 3,
                ContentType::Repo => 4,
                ContentType::Blog => 5,
                ContentType::Landing => 6,
                ContentType::Unknown => 7,
            };
            json!(ordinal)
        }
        (_, Value::Bool(b)) => json!(if *b { 1 } else { 0 }),
        _ => value,
    }
}

/// Static reference for every summary field; generated once per corpus.
pub fn write_fields_reference(store: &ArtifactStore) -> Result<()> {
    let path = store.base().join("FIELDS.yaml");
    if path.exists() {
        return Ok(());
    }
    fs::create_dir_all(store.base())?;
    let reference = json!({
        "summary_index": {
            "url": "fetched URL",
            "cat": "domain category (gov/health, academic/ai, docs/api, ...)",
            "conf": "detection confidence, 0-10",
            "title": "page title",
            "desc": "meta/OpenGraph description",
            "tokens": "estimated LLM tokens (words / 2.5)",
        },
        "summary_details": {
            "status": "success | failed",
            "extraction_mode": "minimal | cheap | full",
            "extraction_quality": "minimal | low | ok | degraded",
            "content_type": "academic | docs | wiki | news | repo | blog | landing | unknown",
            "confidence": "detection confidence, 0-10",
            "academic_score": "composite academic signal score, 0-10",
            "estimated_tokens": "words / 2.5, rounded",
            "read_time_min": "words / 200, rounded up",
        },
        "terse_aliases": TERSE_ALIASES
            .iter()
            .map(|(long, short)| json!({ "field": long, "alias": short }))
            .collect::<Vec<_>>(),
    });
    write_yaml(&path, &reference)
}

/// Append this session's header to the corpus-wide `index.yaml` registry.
pub fn append_session_header(store: &ArtifactStore, session: &SessionRow) -> Result<()> {
    let path = store.base().join("index.yaml");
    let mut entries: Vec<Value> = if path.exists() {
        let text = fs::read_to_string(&path)?;
        serde_yaml::from_str(&text).unwrap_or_default()
    } else {
        Vec::new()
    };

    entries.push(json!({
        "session": session.id,
        "created_at": session.created_at,
        "url_count": session.url_count,
        "success_count": session.success_count,
        "failed_count": session.failed_count,
        "parse_mode": session.parse_mode,
        "dir": session.session_dir,
    }));
    write_yaml(&path, &Value::Array(entries))
}

/// Structured stdout summary for the non-tier2 output modes.
pub fn stdout_summary(
    session: &SessionRow,
    outcomes: &[UrlOutcome],
    options: &FetchOptions,
    full: bool,
) -> Value {
    let mut body = json!({
        "session": session.id,
        "session_dir": session.session_dir,
        "url_count": session.url_count,
        "success_count": outcomes.iter().filter(|o| o.result.is_ok()).count(),
        "failed_count": outcomes.iter().filter(|o| o.result.is_err()).count(),
    });
    if full {
        body["results"] = Value::Array(
            sorted(outcomes)
                .iter()
                .map(|o| detail_entry(o, options))
                .collect(),
        );
    }
    body
}

fn write_yaml(path: &std::path::Path, value: &Value) -> Result<()> {
    let yaml = serde_yaml::to_string(value)?;
    let tmp = path.with_extension("yaml.tmp");
    fs::write(&tmp, yaml)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::PageMetadata;
    use crate::orchestrator::worker::{UrlFailure, UrlSuccess};
    use std::collections::HashMap;

    fn success_outcome(url_id: i64, url: &str) -> UrlOutcome {
        let mut metadata = PageMetadata::default();
        metadata.word_count = 250;
        metadata.detection_confidence = 7.0;
        metadata.domain_category = "docs/api".to_string();
        UrlOutcome {
            url: url.to_string(),
            url_id,
            result: Ok(UrlSuccess {
                title: "A Title".to_string(),
                metadata,
                word_counts: HashMap::new(),
                file_size_bytes: 1000,
                from_cache: false,
                filtered_out: false,
                artifact_path: format!("{}/generic.yaml", url_id),
            }),
        }
    }

    fn failed_outcome(url_id: i64, url: &str) -> UrlOutcome {
        UrlOutcome {
            url: url.to_string(),
            url_id,
            result: Err(UrlFailure {
                error_type: "http_error".to_string(),
                message: "HTTP 404".to_string(),
                status_code: 404,
            }),
        }
    }

    #[test]
    fn index_entries_skip_failures() {
        assert!(index_entry(&success_outcome(1, "https://a.example")).is_some());
        assert!(index_entry(&failed_outcome(2, "https://b.example")).is_none());
    }

    #[test]
    fn detail_entry_tokens_follow_word_count() {
        let entry = detail_entry_v1(&success_outcome(1, "https://a.example"));
        assert_eq!(entry["estimated_tokens"], 100); // 250 / 2.5
        assert_eq!(entry["status"], "success");
    }

    #[test]
    fn failed_entries_use_the_closed_bucket_set() {
        let entry = failed_entry(&failed_outcome(2, "https://b.example")).unwrap();
        assert_eq!(entry["error_type"], "http_error");
        assert_eq!(entry["status_code"], 404);

        assert_eq!(failed_bucket("marshal_error"), "parse_error");
        assert_eq!(failed_bucket("database_error"), "unknown_error");
        assert_eq!(failed_bucket("cache_error"), "network_error");
    }

    #[test]
    fn projection_keeps_identity_fields() {
        let entry = detail_entry_v1(&success_outcome(1, "https://a.example"));
        let fields = vec!["title".to_string(), "word_count".to_string()];
        let projected = project_fields(entry, Some(&fields));
        let map = projected.as_object().unwrap();
        assert!(map.contains_key("title"));
        assert!(map.contains_key("word_count"));
        assert!(map.contains_key("url"));
        assert!(map.contains_key("status"));
        assert!(!map.contains_key("language"));
    }

    #[test]
    fn terse_schema_aliases_and_encodes() {
        let entry = detail_entry_v1(&success_outcome(1, "https://a.example"));
        let terse = terse_alias(entry);
        let map = terse.as_object().unwrap();
        assert_eq!(map["s"], 1); // success
        assert_eq!(map["m"], 0); // minimal mode ordinal
        assert_eq!(map["ct"], 7); // unknown content type ordinal
        assert_eq!(map["u"], "https://a.example");
        assert!(!map.contains_key("status"));
    }

    #[test]
    fn summaries_land_in_the_session_dir() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path());
        let session = SessionRow {
            id: 3,
            created_at: "2026-08-01T00:00:00Z".to_string(),
            url_count: 2,
            success_count: 1,
            failed_count: 1,
            features: String::new(),
            parse_mode: "cheap".to_string(),
            session_dir: "sessions/2026-08-01-3".to_string(),
        };
        let outcomes = vec![
            success_outcome(1, "https://a.example"),
            failed_outcome(2, "https://b.example"),
        ];

        let written = write_session_summaries(&store, &session, &outcomes, &FetchOptions::default())
            .unwrap();
        assert!(written.join("summary-index.yaml").exists());
        assert!(written.join("summary-details.yaml").exists());
        assert!(written.join("failed-urls.yaml").exists());

        // No failures → no failed-urls file.
        let ok_only = vec![success_outcome(1, "https://a.example")];
        let dir2 = tempfile::TempDir::new().unwrap();
        let store2 = ArtifactStore::new(dir2.path());
        let written2 =
            write_session_summaries(&store2, &session, &ok_only, &FetchOptions::default()).unwrap();
        assert!(!written2.join("failed-urls.yaml").exists());
    }

    #[test]
    fn session_registry_appends() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path());
        let session = SessionRow {
            id: 1,
            created_at: "2026-08-01T00:00:00Z".to_string(),
            url_count: 1,
            success_count: 1,
            failed_count: 0,
            features: String::new(),
            parse_mode: "full".to_string(),
            session_dir: "sessions/2026-08-01-1".to_string(),
        };
        append_session_header(&store, &session).unwrap();
        let mut second = session.clone();
        second.id = 2;
        append_session_header(&store, &second).unwrap();

        let text = fs::read_to_string(store.base().join("index.yaml")).unwrap();
        let entries: Vec<Value> = serde_yaml::from_str(&text).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1]["session"], 2);
    }
}
