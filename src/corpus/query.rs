use serde_json::json;
use tracing::debug;

use crate::corpus::{filter, CorpusRequest, CorpusResponse};
use crate::store::{RelationalIndex, UrlRow};

/// QUERY: compile a v1 metadata filter to one SQL WHERE over the URL table,
/// optionally scoped to a session's membership.
pub fn run(request: &CorpusRequest, index: &RelationalIndex) -> CorpusResponse {
    let verb = "query";

    let Some(filter_text) = request.filter.as_deref().filter(|f| !f.trim().is_empty()) else {
        return CorpusResponse::error(
            verb,
            "missing_parameter",
            "query requires --filter",
            vec!["pass --filter \"content_type=academic\"".to_string()],
        );
    };

    if let Some(session) = request.session {
        match index.session(session) {
            Ok(Some(_)) => {}
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
    }

    // Whitelist violations stop here; no SQL runs on a bad filter.
    let expr = match filter::parse(filter_text) {
        Ok(expr) => expr,
        Err(e) => {
            return CorpusResponse::error(verb, "filter_parse_error", e.message, e.suggested_actions)
        }
    };

    let (where_sql, params) = filter::compile(&expr);
    debug!("query filter compiled to: {}", where_sql);

    let matches = match index.url_rows_where(&where_sql, &params, request.session) {
        Ok(rows) => rows,
        Err(e) => return CorpusResponse::error(verb, "database_error", e.to_string(), vec![]),
    };

    let total_count = match request.session {
        Some(session) => match index.session_url_ids(session) {
            Ok(ids) => ids.len() as i64,
            Err(e) => return CorpusResponse::error(verb, "database_error", e.to_string(), vec![]),
        },
        None => match index.count_urls() {
            Ok(n) => n,
            Err(e) => return CorpusResponse::error(verb, "database_error", e.to_string(), vec![]),
        },
    };

    let coverage = if total_count > 0 {
        matches.len() as f64 / total_count as f64
    } else {
        0.0
    };
    let confidence = filter::confidence(&expr);

    let data = json!({
        "filter": filter_text,
        "match_count": matches.len(),
        "total_count": total_count,
        "matches": matches.iter().map(url_row_json).collect::<Vec<_>>(),
    });

    CorpusResponse::ok(verb, data, confidence, coverage, Vec::new())
}

fn url_row_json(row: &UrlRow) -> serde_json::Value {
    json!({
        "url_id": row.id,
        "url": row.original_url,
        "scheme": row.scheme,
        "domain": row.host,
        "content_type": row.content_type,
        "content_subtype": row.content_subtype,
        "detection_confidence": row.detection_confidence,
        "has_abstract": row.has_abstract,
        "has_infobox": row.has_infobox,
        "has_toc": row.has_toc,
        "has_code_examples": row.has_code_examples,
        "section_count": row.section_count,
        "citation_count": row.citation_count,
        "code_block_count": row.code_block_count,
        "top_keywords": row.top_keywords,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{ContentType, PageMetadata};
    use crate::corpus::CorpusRequest;
    use std::time::Duration;

    fn classified(index: &RelationalIndex, url: &str, content_type: ContentType) -> i64 {
        let id = index.insert_url(url).unwrap();
        let mut meta = PageMetadata::default();
        meta.content_type = content_type;
        meta.detection_confidence = 8.0;
        meta.section_count = 4;
        index
            .update_url_content_type(id, &meta, false, true, 2, 1, "[\"neural:10\"]")
            .unwrap();
        id
    }

    fn request_with_filter(filter: &str) -> CorpusRequest {
        let mut request = CorpusRequest::for_verb("query");
        request.filter = Some(filter.to_string());
        request
    }

    #[test]
    fn equality_filter_matches_classified_rows() {
        let index = RelationalIndex::open_in_memory().unwrap();
        let academic = classified(&index, "https://arxiv.org/abs/1", ContentType::Academic);
        let _docs = classified(&index, "https://docs.rs/x", ContentType::Docs);

        let response = run(&request_with_filter("content_type=academic"), &index);
        assert!(response.error.is_none());
        assert_eq!(response.data["match_count"], 1);
        assert_eq!(response.data["total_count"], 2);
        assert_eq!(response.data["matches"][0]["url_id"], academic);
        assert_eq!(response.confidence, 0.95);
        assert!((response.coverage - 0.5).abs() < 1e-9);
    }

    #[test]
    fn unknown_value_on_whitelisted_field_matches_nothing() {
        let index = RelationalIndex::open_in_memory().unwrap();
        classified(&index, "https://arxiv.org/abs/1", ContentType::Academic);

        let response = run(&request_with_filter("content_type=unknown_type"), &index);
        assert!(response.error.is_none());
        assert_eq!(response.data["match_count"], 0);
    }

    #[test]
    fn unknown_field_is_a_parse_error() {
        let index = RelationalIndex::open_in_memory().unwrap();
        let response = run(&request_with_filter("word_count > 10"), &index);
        let error = response.error.unwrap();
        assert_eq!(error.kind, "filter_parse_error");
        assert!(!error.suggested_actions.is_empty());
    }

    #[test]
    fn session_scoping_restricts_matches() {
        let index = RelationalIndex::open_in_memory().unwrap();
        let in_session = classified(&index, "https://arxiv.org/abs/1", ContentType::Academic);
        let _outside = classified(&index, "https://arxiv.org/abs/2", ContentType::Academic);

        let members = vec![crate::store::SessionMember {
            url_id: in_session,
            was_sanitized: false,
            original_url: None,
        }];
        let (session, _) = index
            .find_or_create_session(&members, "", "full", Duration::from_secs(60))
            .unwrap();

        let mut request = request_with_filter("content_type=academic");
        request.session = Some(session);
        let response = run(&request, &index);
        assert_eq!(response.data["match_count"], 1);
        assert_eq!(response.data["total_count"], 1);
        assert_eq!(response.data["matches"][0]["url_id"], in_session);
    }

    #[test]
    fn keyword_predicate_matches_stored_json() {
        let index = RelationalIndex::open_in_memory().unwrap();
        classified(&index, "https://arxiv.org/abs/1", ContentType::Academic);

        let hit = run(&request_with_filter("keyword:neural"), &index);
        assert_eq!(hit.data["match_count"], 1);
        let miss = run(&request_with_filter("keyword:cooking"), &index);
        assert_eq!(miss.data["match_count"], 0);
    }

    #[test]
    fn missing_filter_is_a_missing_parameter() {
        let index = RelationalIndex::open_in_memory().unwrap();
        let response = run(&CorpusRequest::for_verb("query"), &index);
        assert_eq!(response.error.unwrap().kind, "missing_parameter");
    }
}
