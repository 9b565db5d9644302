pub mod extract;
pub mod filter;
pub mod query;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::store::{ArtifactStore, RelationalIndex};

/// The closed verb vocabulary. Unknown names are a hard error; reserved
/// verbs dispatch to a structured not-implemented response.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verb {
    Ingest,
    Extract,
    Normalize,
    Compare,
    Detect,
    Trace,
    Score,
    Query,
    Delta,
    Summarize,
    ExplainFailure,
}

impl Verb {
    pub const ALL: [Verb; 11] = [
        Verb::Ingest,
        Verb::Extract,
        Verb::Normalize,
        Verb::Compare,
        Verb::Detect,
        Verb::Trace,
        Verb::Score,
        Verb::Query,
        Verb::Delta,
        Verb::Summarize,
        Verb::ExplainFailure,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Ingest => "ingest",
            Verb::Extract => "extract",
            Verb::Normalize => "normalize",
            Verb::Compare => "compare",
            Verb::Detect => "detect",
            Verb::Trace => "trace",
            Verb::Score => "score",
            Verb::Query => "query",
            Verb::Delta => "delta",
            Verb::Summarize => "summarize",
            Verb::ExplainFailure => "explain-failure",
        }
    }

    pub fn parse_str(name: &str) -> Option<Self> {
        let lower = name.trim().to_ascii_lowercase();
        Verb::ALL.into_iter().find(|v| v.as_str() == lower)
    }
}

/// Shared request shape for every verb.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct CorpusRequest {
    pub verb: String,
    pub session: Option<i64>,
    pub view: Option<String>,
    pub schema: Option<String>,
    pub filter: Option<String>,
    pub format: Option<String>,
    #[serde(default)]
    pub url_ids: Vec<i64>,
    #[serde(default)]
    pub constraints: HashMap<String, serde_json::Value>,
}

impl CorpusRequest {
    pub fn for_verb(verb: &str) -> Self {
        Self {
            verb: verb.to_string(),
            ..Default::default()
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CorpusErrorBody {
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggested_actions: Vec<String>,
}

/// Shared response contract: data + confidence + coverage + diagnostics.
/// Verbs return structured errors, never raise.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CorpusResponse {
    pub verb: String,
    pub data: serde_json::Value,
    pub confidence: f64,
    pub coverage: f64,
    #[serde(default)]
    pub unknowns: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<CorpusErrorBody>,
}

impl CorpusResponse {
    pub fn ok(
        verb: &str,
        data: serde_json::Value,
        confidence: f64,
        coverage: f64,
        unknowns: Vec<String>,
    ) -> Self {
        Self {
            verb: verb.to_string(),
            data,
            confidence,
            coverage,
            unknowns,
            error: None,
        }
    }

    pub fn error(
        verb: &str,
        kind: &str,
        message: impl Into<String>,
        suggested_actions: Vec<String>,
    ) -> Self {
        Self {
            verb: verb.to_string(),
            data: serde_json::Value::Null,
            confidence: 0.0,
            coverage: 0.0,
            unknowns: Vec::new(),
            error: Some(CorpusErrorBody {
                kind: kind.to_string(),
                message: message.into(),
                suggested_actions,
            }),
        }
    }
}

/// Dispatch by verb name. EXTRACT and QUERY run; the other nine are
/// registered and answer with `not_implemented`; anything outside the
/// vocabulary is `unknown_verb` with a nearest-name suggestion.
pub fn dispatch(
    request: &CorpusRequest,
    index: &RelationalIndex,
    store: &ArtifactStore,
) -> CorpusResponse {
    let Some(verb) = Verb::parse_str(&request.verb) else {
        let suggestion = suggest_verb(&request.verb);
        return CorpusResponse::error(
            &request.verb,
            "unknown_verb",
            format!("unknown verb '{}'", request.verb),
            vec![format!("did you mean '{}'?", suggestion)],
        );
    };

    info!("corpus verb: {}", verb.as_str());

    match verb {
        Verb::Extract => extract::run(request, index, store),
        Verb::Query => query::run(request, index),
        reserved => CorpusResponse::error(
            reserved.as_str(),
            "not_implemented",
            format!("verb '{}' is reserved and not yet implemented", reserved.as_str()),
            vec!["use 'extract' or 'query'".to_string()],
        ),
    }
}

/// Nearest verb by shared-prefix length, ties to vocabulary order.
fn suggest_verb(name: &str) -> &'static str {
    let lower = name.trim().to_ascii_lowercase();
    let mut best = Verb::ALL[0].as_str();
    let mut best_len = 0;
    for verb in Verb::ALL {
        let candidate = verb.as_str();
        let shared = lower
            .bytes()
            .zip(candidate.bytes())
            .take_while(|(a, b)| a == b)
            .count();
        if shared > best_len {
            best_len = shared;
            best = candidate;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn harness() -> (TempDir, ArtifactStore, RelationalIndex) {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path());
        let index = RelationalIndex::open_in_memory().unwrap();
        (dir, store, index)
    }

    #[test]
    fn vocabulary_is_closed_at_eleven() {
        assert_eq!(Verb::ALL.len(), 11);
        assert_eq!(Verb::parse_str("extract"), Some(Verb::Extract));
        assert_eq!(Verb::parse_str("explain-failure"), Some(Verb::ExplainFailure));
        assert_eq!(Verb::parse_str("EXTRACT"), Some(Verb::Extract));
        assert_eq!(Verb::parse_str("evaluate"), None);
    }

    #[test]
    fn unknown_verb_is_a_hard_error_with_suggestion() {
        let (_dir, store, index) = harness();
        let response = dispatch(&CorpusRequest::for_verb("extrct"), &index, &store);
        let error = response.error.unwrap();
        assert_eq!(error.kind, "unknown_verb");
        assert!(error.suggested_actions[0].contains("extract"));
    }

    #[test]
    fn reserved_verbs_answer_not_implemented() {
        let (_dir, store, index) = harness();
        for name in [
            "ingest",
            "normalize",
            "compare",
            "detect",
            "trace",
            "score",
            "delta",
            "summarize",
            "explain-failure",
        ] {
            let response = dispatch(&CorpusRequest::for_verb(name), &index, &store);
            let error = response.error.unwrap();
            assert_eq!(error.kind, "not_implemented", "verb {}", name);
            assert!(error.message.contains(name));
        }
    }

    #[test]
    fn implemented_verbs_reach_their_handlers() {
        let (_dir, store, index) = harness();
        // No filter: reaches the query handler and reports the missing
        // parameter rather than not_implemented.
        let response = dispatch(&CorpusRequest::for_verb("query"), &index, &store);
        assert_eq!(response.error.unwrap().kind, "missing_parameter");
    }

    #[test]
    fn prefix_suggestion_picks_closest() {
        assert_eq!(suggest_verb("quer"), "query");
        assert_eq!(suggest_verb("sum"), "summarize");
        assert_eq!(suggest_verb("sco"), "score");
        assert_eq!(suggest_verb("zzz"), "ingest");
    }
}
