use std::collections::HashMap;
use std::sync::Arc;

use regex::Regex;
use std::sync::OnceLock;
use tracing::{debug, info};
use url::Url;

use crate::analytics;
use crate::core::config::FetchOptions;
use crate::core::errors::PipelineError;
use crate::core::types::{BlockKind, Link, PageMetadata};
use crate::corpus::filter::{self, FilterExpr, FilterTarget};
use crate::extractors::{self, TypedExtract};
use crate::fetch::{FetchedDocument, Fetcher};
use crate::parse;
use crate::store::{ArtifactKind, ArtifactStore, RelationalIndex};

/// Everything a worker task needs; cheap to clone per task.
#[derive(Clone)]
pub struct WorkerContext {
    pub fetcher: Arc<Fetcher>,
    pub store: ArtifactStore,
    pub index: RelationalIndex,
    pub options: Arc<FetchOptions>,
    pub inline_filter: Option<Arc<FilterExpr>>,
}

#[derive(Clone, Debug)]
pub struct UrlJob {
    pub url: String,
}

#[derive(Clone, Debug)]
pub struct UrlSuccess {
    pub title: String,
    pub metadata: PageMetadata,
    pub word_counts: HashMap<String, u64>,
    pub file_size_bytes: u64,
    pub from_cache: bool,
    /// The page fetched and parsed fine but failed the inline filter;
    /// parsed artifacts were not written.
    pub filtered_out: bool,
    pub artifact_path: String,
}

#[derive(Clone, Debug)]
pub struct UrlFailure {
    pub error_type: String,
    pub message: String,
    pub status_code: u16,
}

impl From<&PipelineError> for UrlFailure {
    fn from(err: &PipelineError) -> Self {
        Self {
            error_type: err.kind().to_string(),
            message: err.to_string(),
            status_code: err.status_code(),
        }
    }
}

/// Per-URL terminal state. Failures never cross URL boundaries.
#[derive(Clone, Debug)]
pub struct UrlOutcome {
    pub url: String,
    pub url_id: i64,
    pub result: Result<UrlSuccess, UrlFailure>,
}

fn citation_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[(\d{1,3})\]").unwrap())
}

/// The full per-URL lifecycle: identity, cache check, fetch, parse, enrich,
/// persist, index. Strictly sequential within one worker.
pub async fn process_url(ctx: &WorkerContext, job: UrlJob) -> UrlOutcome {
    let url = job.url;

    let url_id = match ctx.index.insert_url(&url) {
        Ok(id) => id,
        Err(e) => {
            return UrlOutcome {
                url,
                url_id: 0,
                result: Err(UrlFailure::from(&e)),
            }
        }
    };

    match run_pipeline(ctx, url_id, &url).await {
        Ok(success) => UrlOutcome {
            url,
            url_id,
            result: Ok(success),
        },
        Err(e) => {
            let failure = UrlFailure::from(&e);
            if let Err(log_err) =
                ctx.index
                    .record_access(url_id, failure.status_code, &failure.error_type, false)
            {
                debug!("access log write failed for {}: {}", url, log_err);
            }
            UrlOutcome {
                url,
                url_id,
                result: Err(failure),
            }
        }
    }
}

async fn run_pipeline(
    ctx: &WorkerContext,
    url_id: i64,
    url: &str,
) -> Result<UrlSuccess, PipelineError> {
    let parsed_url =
        Url::parse(url).map_err(|_| PipelineError::InvalidUrl(url.to_string()))?;

    // Raw HTML: fresh artifact wins unless a refetch is forced.
    let mut from_cache = false;
    let mut http: Option<FetchedDocument> = None;

    let html_bytes = if ctx.options.force_refetch {
        fetch_and_store(ctx, url_id, url, &mut http).await?
    } else {
        match ctx.store.read(url_id, ArtifactKind::RawHtml, ctx.options.max_age)? {
            Some((bytes, true)) => {
                debug!("raw html cache hit for {}", url);
                from_cache = true;
                ctx.index.record_access(url_id, 200, "success", true)?;
                bytes
            }
            _ => fetch_and_store(ctx, url_id, url, &mut http).await?,
        }
    };

    let html = String::from_utf8_lossy(&html_bytes).into_owned();
    let parsed = parse::parse_page(
        &html,
        &parsed_url,
        ctx.options.parse_mode,
        ctx.options.require_citations(),
    )?;
    let mut page = parsed.page;

    match &http {
        Some(doc) => {
            page.metadata.status_code = doc.status_code;
            page.metadata.final_url = doc.final_url.clone();
            page.metadata.redirect_chain = doc.redirect_chain.clone();
            page.metadata.http_content_type = doc.content_type.clone();
        }
        None => {
            page.metadata.status_code = 200;
            page.metadata.final_url = url.to_string();
            page.metadata.http_content_type = "text/html".to_string();
        }
    }

    // Analytics over the distilled text; block text is the fallback when
    // distillation produced nothing to count.
    let text = if parsed.text.is_empty() {
        page.plain_text()
    } else {
        parsed.text
    };
    let word_counts = analytics::word_frequency(&text);
    let top_keywords = analytics::top_keywords(&word_counts, 10);

    let mut code_block_count = 0i64;
    let mut all_links: Vec<Link> = Vec::new();
    page.for_each_block(&mut |block| {
        if block.kind == BlockKind::Code {
            code_block_count += 1;
        }
        all_links.extend(block.links.iter().cloned());
    });
    let citation_count = {
        let distinct: std::collections::BTreeSet<u32> = citation_re()
            .captures_iter(&text)
            .filter_map(|c| c.get(1)?.as_str().parse().ok())
            .collect();
        distinct.len() as i64
    };

    let typed = extractors::run(&page);
    let has_infobox = matches!(&typed, Some(TypedExtract::Wiki(w)) if !w.infobox.is_empty());
    let has_toc = page.metadata.section_count >= 3;

    if let Some(expr) = &ctx.inline_filter {
        let target = FilterTarget {
            content_type: page.metadata.content_type.as_str().to_string(),
            content_subtype: page.metadata.content_subtype.clone(),
            detection_confidence: page.metadata.detection_confidence,
            has_abstract: page.metadata.academic.has_abstract,
            has_infobox,
            has_toc,
            has_code_examples: code_block_count > 0,
            section_count: page.metadata.section_count as i64,
            citation_count,
            code_block_count,
            host: parsed_url.host_str().unwrap_or("").to_string(),
            scheme: parsed_url.scheme().to_string(),
            top_keywords: top_keywords.clone(),
        };
        if !filter::matches(expr, &target) {
            info!("inline filter dropped {}", url);
            return Ok(UrlSuccess {
                title: page.title.clone(),
                metadata: page.metadata.clone(),
                word_counts: HashMap::new(),
                file_size_bytes: html_bytes.len() as u64,
                from_cache,
                filtered_out: true,
                artifact_path: String::new(),
            });
        }
    }

    // Persist parsed artifacts; all of them are registered in the index.
    let generic_yaml = serde_yaml::to_string(&page).map_err(|e| PipelineError::Marshal {
        url: url.to_string(),
        message: e.to_string(),
    })?;
    let metadata_yaml =
        serde_yaml::to_string(&page.metadata).map_err(|e| PipelineError::Marshal {
            url: url.to_string(),
            message: e.to_string(),
        })?;

    let generic = ctx
        .store
        .write(url_id, ArtifactKind::Generic, generic_yaml.as_bytes())?;
    let artifact_path = generic.file_path.to_string_lossy().into_owned();
    ctx.index.insert_artifact(url_id, &generic)?;

    let wordcount = ctx.store.write(
        url_id,
        ArtifactKind::Wordcount,
        analytics::to_wordcount_lines(&word_counts).as_bytes(),
    )?;
    ctx.index.insert_artifact(url_id, &wordcount)?;

    let metadata = ctx
        .store
        .write(url_id, ArtifactKind::Metadata, metadata_yaml.as_bytes())?;
    ctx.index.insert_artifact(url_id, &metadata)?;

    for feature in &ctx.options.features {
        let stored = match feature.as_str() {
            "links" => {
                let yaml = serde_yaml::to_string(&all_links)?;
                Some(ctx.store.write(url_id, ArtifactKind::Links, yaml.as_bytes())?)
            }
            "keywords" => {
                let yaml = serde_yaml::to_string(&top_keywords)?;
                Some(ctx.store.write(url_id, ArtifactKind::Keywords, yaml.as_bytes())?)
            }
            "images" => {
                let record = serde_json::json!({
                    "count": page.metadata.image_count,
                    "primary": page.metadata.image,
                    "favicon": page.metadata.favicon,
                });
                let yaml = serde_yaml::to_string(&record)?;
                Some(ctx.store.write(url_id, ArtifactKind::Images, yaml.as_bytes())?)
            }
            _ => None,
        };
        if let Some(stored) = stored {
            ctx.index.insert_artifact(url_id, &stored)?;
        }
    }

    if let Some(typed) = &typed {
        let yaml = typed.to_yaml()?;
        let stored = ctx
            .store
            .write(url_id, typed.artifact_kind(), yaml.as_bytes())?;
        ctx.index.insert_artifact(url_id, &stored)?;
    }

    let top_json = serde_json::to_string(&top_keywords).map_err(|e| PipelineError::Marshal {
        url: url.to_string(),
        message: e.to_string(),
    })?;
    ctx.index.update_url_content_type(
        url_id,
        &page.metadata,
        has_infobox,
        has_toc,
        citation_count,
        code_block_count,
        &top_json,
    )?;

    info!(
        "processed {} ({} words, {} blocks, {})",
        url,
        page.metadata.word_count,
        page.metadata.block_count,
        page.metadata.content_type.as_str()
    );

    Ok(UrlSuccess {
        title: page.title.clone(),
        metadata: page.metadata.clone(),
        word_counts,
        file_size_bytes: html_bytes.len() as u64,
        from_cache,
        filtered_out: false,
        artifact_path,
    })
}

async fn fetch_and_store(
    ctx: &WorkerContext,
    url_id: i64,
    url: &str,
    http: &mut Option<FetchedDocument>,
) -> Result<Vec<u8>, PipelineError> {
    let doc = ctx.fetcher.fetch(url).await?;
    let stored = ctx.store.write(url_id, ArtifactKind::RawHtml, &doc.bytes)?;
    ctx.index.insert_artifact(url_id, &stored)?;
    ctx.index
        .record_access(url_id, doc.status_code, "success", false)?;
    let bytes = doc.bytes.clone();
    *http = Some(doc);
    Ok(bytes)
}
