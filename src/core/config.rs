use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::types::ExtractionMode;

// ---------------------------------------------------------------------------
// Batch configuration: flag, then WEBCORPUS_* env var, then default
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputMode {
    /// Per-session YAML files plus a brief stats line on stdout (default).
    Tier2,
    /// Structured batch summary on stdout.
    Summary,
    /// Full per-URL detail records on stdout.
    Full,
    /// Stats line only.
    Minimal,
}

impl OutputMode {
    pub fn parse_str(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "tier2" => Some(OutputMode::Tier2),
            "summary" => Some(OutputMode::Summary),
            "full" => Some(OutputMode::Full),
            "minimal" => Some(OutputMode::Minimal),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OutputMode::Tier2 => "tier2",
            OutputMode::Summary => "summary",
            OutputMode::Full => "full",
            OutputMode::Minimal => "minimal",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Yaml,
    Json,
}

impl OutputFormat {
    pub fn parse_str(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "yaml" | "yml" => Some(OutputFormat::Yaml),
            "json" => Some(OutputFormat::Json),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SummaryVersion {
    V1,
    /// Terse alias schema: short keys, small-integer status/quality encodings.
    V2,
}

/// Everything one `fetch` invocation needs to know.
#[derive(Clone, Debug)]
pub struct FetchOptions {
    pub features: Vec<String>,
    pub parse_mode: ExtractionMode,
    pub max_age: Duration,
    pub force_refetch: bool,
    pub workers: usize,
    pub output_mode: OutputMode,
    pub format: OutputFormat,
    pub summary_version: SummaryVersion,
    pub summary_fields: Option<Vec<String>>,
    pub filter: Option<String>,
    pub quiet: bool,
    pub output_dir: PathBuf,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            features: Vec::new(),
            parse_mode: ExtractionMode::Cheap,
            max_age: Duration::from_secs(3600),
            force_refetch: false,
            workers: default_workers(),
            output_mode: OutputMode::Tier2,
            format: OutputFormat::Yaml,
            summary_version: SummaryVersion::V1,
            summary_fields: None,
            filter: None,
            quiet: false,
            output_dir: default_output_dir(),
        }
    }
}

impl FetchOptions {
    /// The `citations` feature promotes cheap parsing to full before any
    /// extraction runs.
    pub fn require_citations(&self) -> bool {
        self.features.iter().any(|f| f == "citations")
    }

    pub fn features_string(&self) -> String {
        self.features.join(",")
    }
}

/// Output dir: flag → `WEBCORPUS_OUTPUT_DIR` → `./webcorpus-data`.
pub fn default_output_dir() -> PathBuf {
    std::env::var("WEBCORPUS_OUTPUT_DIR")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("webcorpus-data"))
}

/// Worker count: flag → `WEBCORPUS_WORKERS` → 8.
pub fn default_workers() -> usize {
    std::env::var("WEBCORPUS_WORKERS")
        .ok()
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(8)
}

/// Index path: `WEBCORPUS_DB` → sibling of the output dir.
pub fn index_path(output_dir: &Path) -> PathBuf {
    if let Ok(v) = std::env::var("WEBCORPUS_DB") {
        if !v.trim().is_empty() {
            return PathBuf::from(v);
        }
    }
    match output_dir.parent() {
        Some(parent) if parent.as_os_str().is_empty() => PathBuf::from("webcorpus.db"),
        Some(parent) => parent.join("webcorpus.db"),
        None => PathBuf::from("webcorpus.db"),
    }
}

/// Parse a human duration: bare seconds, or `s`/`m`/`h`/`d` suffixed.
/// `"0"` means never-fresh (force refetch semantics at the artifact layer).
pub fn parse_duration(value: &str) -> Result<Duration, String> {
    let v = value.trim();
    if v.is_empty() {
        return Err("empty duration".to_string());
    }
    let (digits, unit) = match v.chars().last() {
        Some(c) if c.is_ascii_alphabetic() => (&v[..v.len() - 1], c.to_ascii_lowercase()),
        _ => (v, 's'),
    };
    let n: u64 = digits
        .trim()
        .parse()
        .map_err(|_| format!("invalid duration '{}'", value))?;
    let secs = match unit {
        's' => n,
        'm' => n * 60,
        'h' => n * 3600,
        'd' => n * 86_400,
        other => return Err(format!("unknown duration unit '{}'", other)),
    };
    Ok(Duration::from_secs(secs))
}

/// Comma-separated feature list → trimmed, de-duplicated vec.
pub fn parse_features(value: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for part in value.split(',') {
        let f = part.trim().to_ascii_lowercase();
        if !f.is_empty() && !out.contains(&f) {
            out.push(f);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_suffixes() {
        assert_eq!(parse_duration("90").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("15m").unwrap(), Duration::from_secs(900));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_duration("2d").unwrap(), Duration::from_secs(172_800));
        assert_eq!(parse_duration("0").unwrap(), Duration::ZERO);
        assert!(parse_duration("soon").is_err());
        assert!(parse_duration("").is_err());
    }

    #[test]
    fn feature_parsing_dedupes() {
        assert_eq!(
            parse_features("citations, links,citations ,"),
            vec!["citations".to_string(), "links".to_string()]
        );
    }

    #[test]
    fn citations_feature_detected() {
        let opts = FetchOptions {
            features: parse_features("citations"),
            ..Default::default()
        };
        assert!(opts.require_citations());
        assert!(!FetchOptions::default().require_citations());
    }
}
