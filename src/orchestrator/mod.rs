pub mod summary;
pub mod worker;

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, warn};

use crate::analytics;
use crate::core::config::{self, FetchOptions, OutputFormat, OutputMode};
use crate::core::errors::{PipelineError, Result};
use crate::core::types::estimated_tokens;
use crate::corpus::filter::{self, FilterExpr};
use crate::fetch::Fetcher;
use crate::store::{ArtifactStore, RelationalIndex, SessionMember, SessionResultRow};
use crate::urlnorm::{self, SanitizedUrl};
use worker::{UrlJob, UrlOutcome, WorkerContext};

/// Terminal state of one `fetch` invocation.
#[derive(Clone, Debug)]
pub enum BatchOutcome {
    /// A fresh session with the same URL set already existed; nothing ran.
    CacheHit {
        session_id: i64,
        session_dir: String,
    },
    Completed {
        session_id: i64,
        session_dir: String,
        url_count: usize,
        success_count: usize,
        failed_count: usize,
        top_keywords: Vec<String>,
    },
}

impl BatchOutcome {
    /// 0 full success, 1 partial failure, 2 total failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            BatchOutcome::CacheHit { .. } => 0,
            BatchOutcome::Completed {
                url_count,
                failed_count,
                ..
            } => {
                if *failed_count == 0 {
                    0
                } else if failed_count < url_count {
                    1
                } else {
                    2
                }
            }
        }
    }
}

/// Run the full batch lifecycle against the default on-disk store and index.
pub async fn run_batch(raw_urls: Vec<String>, options: FetchOptions) -> Result<BatchOutcome> {
    let store = ArtifactStore::new(&options.output_dir);
    let index = RelationalIndex::open(&config::index_path(&options.output_dir))?;
    run_batch_with(&index, &store, raw_urls, options).await
}

/// Batch lifecycle over explicit store/index handles.
pub async fn run_batch_with(
    index: &RelationalIndex,
    store: &ArtifactStore,
    raw_urls: Vec<String>,
    options: FetchOptions,
) -> Result<BatchOutcome> {
    if options.workers < 1 {
        return Err(PipelineError::Config(
            "worker count must be at least 1".to_string(),
        ));
    }

    // Phase A: preflight. Any invalid URL aborts before any fetch.
    let batch = urlnorm::normalize_batch(&raw_urls);
    if !batch.invalid.is_empty() {
        for bad in &batch.invalid {
            error!("invalid URL: {}", bad);
        }
        return Err(PipelineError::InvalidUrl(batch.invalid.join(", ")));
    }
    if batch.valid.is_empty() {
        return Err(PipelineError::Config("no URLs to process".to_string()));
    }

    // A bad inline filter is a configuration error, not a per-URL one.
    let inline_filter: Option<Arc<FilterExpr>> = match options.filter.as_deref() {
        Some(text) => Some(Arc::new(filter::parse(text).map_err(|e| {
            PipelineError::Config(format!("invalid --filter: {}", e.message))
        })?)),
        None => None,
    };

    // Phase B: session resolution.
    let mut members = Vec::with_capacity(batch.valid.len());
    for sanitized in &batch.valid {
        let url_id = index.insert_url(&sanitized.url)?;
        members.push(SessionMember {
            url_id,
            was_sanitized: sanitized.was_sanitized(),
            original_url: sanitized.original.clone(),
        });
    }

    let session_max_age = if options.force_refetch {
        Duration::ZERO
    } else {
        options.max_age
    };
    let (session_id, cache_hit) = index.find_or_create_session(
        &members,
        &options.features_string(),
        options.parse_mode.as_str(),
        session_max_age,
    )?;

    if cache_hit {
        let session = index.session(session_id)?.ok_or_else(|| {
            PipelineError::Config(format!("session {} vanished after lookup", session_id))
        })?;
        info!("session cache hit: reusing session {}", session_id);
        println!(
            "session {} (cached): {} urls, summaries in {}",
            session_id,
            session.url_count,
            store.base().join(&session.session_dir).display()
        );
        return Ok(BatchOutcome::CacheHit {
            session_id,
            session_dir: session.session_dir,
        });
    }

    // Phase C: concurrent processing over bounded channels. Workers block
    // on network, disk, and index I/O; stdout stays untouched until after
    // the barrier.
    let outcomes = run_workers(index, store, &batch.valid, &options, inline_filter).await;

    // Phase D: reduce per-URL counts into the corpus-wide keyword view.
    let global_counts = analytics::reduce(
        outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().ok())
            .map(|s| s.word_counts.clone()),
    );
    let top_keywords = analytics::top_keywords(&global_counts, 25);

    // Phase E: summarize.
    let success_count = outcomes.iter().filter(|o| o.result.is_ok()).count();
    let failed_count = outcomes.len() - success_count;

    for outcome in &outcomes {
        let row = session_result_row(outcome);
        if let Err(e) = index.insert_session_result(session_id, &row) {
            warn!("session result write failed for {}: {}", outcome.url, e);
        }
    }
    if let Err(e) = index.update_session_stats(session_id, success_count as i64, failed_count as i64)
    {
        warn!("session stats update failed: {}", e);
    }

    let session = index.session(session_id)?.ok_or_else(|| {
        PipelineError::Config(format!("session {} vanished after processing", session_id))
    })?;

    match options.output_mode {
        OutputMode::Tier2 => {
            let dir = summary::write_session_summaries(store, &session, &outcomes, &options)?;
            summary::write_fields_reference(store)?;
            summary::append_session_header(store, &session)?;
            println!(
                "session {}: {}/{} ok, {} failed, summaries in {}",
                session_id,
                success_count,
                outcomes.len(),
                failed_count,
                dir.display()
            );
        }
        OutputMode::Summary | OutputMode::Full => {
            let body = summary::stdout_summary(
                &session,
                &outcomes,
                &options,
                options.output_mode == OutputMode::Full,
            );
            print_value(&body, options.format)?;
        }
        OutputMode::Minimal => {
            println!(
                "session {}: {}/{} ok, {} failed",
                session_id,
                success_count,
                outcomes.len(),
                failed_count
            );
        }
    }

    Ok(BatchOutcome::Completed {
        session_id,
        session_dir: session.session_dir,
        url_count: outcomes.len(),
        success_count,
        failed_count,
        top_keywords,
    })
}

async fn run_workers(
    index: &RelationalIndex,
    store: &ArtifactStore,
    urls: &[SanitizedUrl],
    options: &FetchOptions,
    inline_filter: Option<Arc<FilterExpr>>,
) -> Vec<UrlOutcome> {
    let capacity = urls.len();
    let (job_tx, job_rx) = mpsc::channel::<UrlJob>(capacity);
    let (result_tx, mut result_rx) = mpsc::channel::<UrlOutcome>(capacity);
    let job_rx = Arc::new(Mutex::new(job_rx));

    let ctx = WorkerContext {
        fetcher: Arc::new(Fetcher::new()),
        store: store.clone(),
        index: index.clone(),
        options: Arc::new(options.clone()),
        inline_filter,
    };

    let worker_count = options.workers.min(capacity.max(1));
    info!(
        "dispatching {} urls across {} workers",
        capacity, worker_count
    );

    let mut handles = Vec::with_capacity(worker_count);
    for worker_id in 0..worker_count {
        let ctx = ctx.clone();
        let job_rx = Arc::clone(&job_rx);
        let result_tx = result_tx.clone();
        handles.push(tokio::spawn(async move {
            loop {
                let job = { job_rx.lock().await.recv().await };
                let Some(job) = job else { break };
                let outcome = worker::process_url(&ctx, job).await;
                if result_tx.send(outcome).await.is_err() {
                    break;
                }
            }
            debug!("worker {} done", worker_id);
        }));
    }
    drop(result_tx);

    // Channel capacity equals the job count, so enqueueing never blocks on
    // worker progress.
    for sanitized in urls {
        if job_tx
            .send(UrlJob {
                url: sanitized.url.clone(),
            })
            .await
            .is_err()
        {
            break;
        }
    }
    drop(job_tx);

    // Completion barrier, then drain.
    join_all(handles).await;

    let mut outcomes = Vec::with_capacity(capacity);
    while let Some(outcome) = result_rx.recv().await {
        outcomes.push(outcome);
    }
    outcomes
}

fn session_result_row(outcome: &UrlOutcome) -> SessionResultRow {
    match &outcome.result {
        Ok(s) => SessionResultRow {
            url_id: outcome.url_id,
            status: "success".to_string(),
            status_code: s.metadata.status_code,
            error_type: None,
            error_message: None,
            file_size_bytes: s.file_size_bytes,
            estimated_tokens: estimated_tokens(s.metadata.word_count),
        },
        Err(f) => SessionResultRow {
            url_id: outcome.url_id,
            status: "failed".to_string(),
            status_code: f.status_code,
            error_type: Some(f.error_type.clone()),
            error_message: Some(f.message.clone()),
            file_size_bytes: 0,
            estimated_tokens: 0,
        },
    }
}

fn print_value(value: &serde_json::Value, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string_pretty(value).map_err(|e| PipelineError::Marshal {
                url: String::new(),
                message: e.to_string(),
            })?
        ),
        OutputFormat::Yaml => println!("{}", serde_yaml::to_string(value)?),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn completed(url_count: usize, failed_count: usize) -> BatchOutcome {
        BatchOutcome::Completed {
            session_id: 1,
            session_dir: "sessions/2026-08-01-1".to_string(),
            url_count,
            success_count: url_count - failed_count,
            failed_count,
            top_keywords: Vec::new(),
        }
    }

    #[test]
    fn exit_codes_follow_failure_shape() {
        assert_eq!(completed(3, 0).exit_code(), 0);
        assert_eq!(completed(3, 1).exit_code(), 1);
        assert_eq!(completed(3, 3).exit_code(), 2);
        assert_eq!(
            BatchOutcome::CacheHit {
                session_id: 1,
                session_dir: String::new()
            }
            .exit_code(),
            0
        );
    }

    #[tokio::test]
    async fn zero_workers_rejected() {
        let index = RelationalIndex::open_in_memory().unwrap();
        let dir = tempfile::TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path());
        let options = FetchOptions {
            workers: 0,
            ..Default::default()
        };
        let err = run_batch_with(&index, &store, vec!["https://a.example".to_string()], options)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }

    #[tokio::test]
    async fn invalid_urls_abort_before_any_fetch() {
        let index = RelationalIndex::open_in_memory().unwrap();
        let dir = tempfile::TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path());
        let err = run_batch_with(
            &index,
            &store,
            vec![
                "not-a-url".to_string(),
                "ftp://x".to_string(),
                "https://a.example".to_string(),
            ],
            FetchOptions::default(),
        )
        .await
        .unwrap_err();

        assert_eq!(err.kind(), "invalid_url");
        // Preflight aborts before session creation or URL registration.
        assert_eq!(index.count_urls().unwrap(), 0);
    }

    #[tokio::test]
    async fn bad_inline_filter_is_fatal() {
        let index = RelationalIndex::open_in_memory().unwrap();
        let dir = tempfile::TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path());
        let options = FetchOptions {
            filter: Some("bogus_field = 1".to_string()),
            ..Default::default()
        };
        let err = run_batch_with(&index, &store, vec!["https://a.example".to_string()], options)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }
}
