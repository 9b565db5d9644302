use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::core::config::{
    self, FetchOptions, OutputFormat, OutputMode, SummaryVersion,
};
use crate::core::types::ExtractionMode;

#[derive(Parser, Debug)]
#[command(
    name = "webcorpus",
    version,
    about = "Batch web-research pipeline: fetch, parse, and query a URL corpus"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Fetch and parse a batch of URLs into the corpus
    Fetch(FetchArgs),
    /// Run a corpus verb over the index and on-disk artifacts
    Corpus(CorpusArgs),
    /// Inspect the relational index (read-only)
    Db(DbArgs),
}

#[derive(Args, Debug)]
pub struct FetchArgs {
    /// Comma-separated URL list
    #[arg(long)]
    pub urls: Option<String>,

    /// Refetch the URL set of an existing session
    #[arg(long)]
    pub session: Option<i64>,

    /// Comma-separated feature flags (citations, links, keywords, images)
    #[arg(long, default_value = "")]
    pub features: String,

    /// Parse tier: minimal, cheap, or full
    #[arg(long = "parse-mode", default_value = "cheap")]
    pub parse_mode: String,

    /// Worker count (defaults to WEBCORPUS_WORKERS or 8)
    #[arg(long)]
    pub workers: Option<usize>,

    /// Stdout format for summary/full output modes: yaml or json
    #[arg(long, default_value = "yaml")]
    pub format: String,

    /// tier2, summary, full, or minimal
    #[arg(long = "output-mode", default_value = "tier2")]
    pub output_mode: String,

    /// Artifact/session freshness window (e.g. 30m, 1h, 2d; 0 disables)
    #[arg(long = "max-age", default_value = "1h")]
    pub max_age: String,

    /// Refetch every URL even when fresh artifacts exist
    #[arg(long = "force-fetch")]
    pub force_fetch: bool,

    /// Corpus base directory (defaults to WEBCORPUS_OUTPUT_DIR)
    #[arg(long = "output-dir")]
    pub output_dir: Option<PathBuf>,

    /// Summary schema: v1 (long keys) or v2 (terse aliases)
    #[arg(long = "summary-version", default_value = "v1")]
    pub summary_version: String,

    /// Comma-separated projection of v1 detail fields
    #[arg(long = "summary-fields")]
    pub summary_fields: Option<String>,

    /// Inline metadata filter; pages that fail it keep only their raw HTML
    #[arg(long)]
    pub filter: Option<String>,

    /// Log errors only
    #[arg(long)]
    pub quiet: bool,
}

impl FetchArgs {
    pub fn to_options(&self) -> Result<FetchOptions, String> {
        let parse_mode = ExtractionMode::parse_str(&self.parse_mode)
            .ok_or_else(|| format!("unknown parse mode '{}'", self.parse_mode))?;
        let output_mode = OutputMode::parse_str(&self.output_mode)
            .ok_or_else(|| format!("unknown output mode '{}'", self.output_mode))?;
        let format = OutputFormat::parse_str(&self.format)
            .ok_or_else(|| format!("unknown format '{}'", self.format))?;
        let summary_version = match self.summary_version.trim().to_ascii_lowercase().as_str() {
            "v1" => SummaryVersion::V1,
            "v2" => SummaryVersion::V2,
            other => return Err(format!("unknown summary version '{}'", other)),
        };
        let max_age = config::parse_duration(&self.max_age)?;

        Ok(FetchOptions {
            features: config::parse_features(&self.features),
            parse_mode,
            max_age,
            force_refetch: self.force_fetch,
            workers: self.workers.unwrap_or_else(config::default_workers),
            output_mode,
            format,
            summary_version,
            summary_fields: self.summary_fields.as_deref().map(|fields| {
                fields
                    .split(',')
                    .map(|f| f.trim().to_string())
                    .filter(|f| !f.is_empty())
                    .collect()
            }),
            filter: self.filter.clone(),
            quiet: self.quiet,
            output_dir: self
                .output_dir
                .clone()
                .unwrap_or_else(config::default_output_dir),
        })
    }
}

#[derive(Args, Debug)]
pub struct CorpusArgs {
    /// One of the eleven corpus verbs
    pub verb: String,

    #[arg(long)]
    pub session: Option<i64>,

    /// Named corpus view (accepted; v1 operates on sessions)
    #[arg(long)]
    pub view: Option<String>,

    /// Comma-separated explicit URL ids
    #[arg(long = "url-ids")]
    pub url_ids: Option<String>,

    /// Keyword limit for extract (default 25)
    #[arg(long)]
    pub top: Option<u64>,

    /// Metadata filter expression for query
    #[arg(long)]
    pub filter: Option<String>,

    /// Response format: json or yaml
    #[arg(long, default_value = "json")]
    pub format: String,

    #[arg(long = "output-dir")]
    pub output_dir: Option<PathBuf>,

    #[arg(long)]
    pub quiet: bool,
}

impl CorpusArgs {
    pub fn parse_url_ids(&self) -> Result<Vec<i64>, String> {
        let Some(raw) = &self.url_ids else {
            return Ok(Vec::new());
        };
        raw.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| s.parse::<i64>().map_err(|_| format!("bad url id '{}'", s)))
            .collect()
    }
}

#[derive(Args, Debug)]
pub struct DbArgs {
    #[command(subcommand)]
    pub command: DbCommand,

    #[arg(long = "output-dir")]
    pub output_dir: Option<PathBuf>,

    #[arg(long)]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum DbCommand {
    /// List tables
    Tables,
    /// Row counts per table
    Counts,
    /// Most recent sessions
    Sessions {
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
    /// Per-URL results for one session
    Session { id: i64 },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn fetch_args_resolve_to_options() {
        let cli = Cli::parse_from([
            "webcorpus",
            "fetch",
            "--urls",
            "https://a.example",
            "--parse-mode",
            "full",
            "--max-age",
            "30m",
            "--workers",
            "4",
            "--features",
            "citations,links",
        ]);
        let Command::Fetch(args) = cli.command else {
            panic!("expected fetch");
        };
        let options = args.to_options().unwrap();
        assert_eq!(options.parse_mode, ExtractionMode::Full);
        assert_eq!(options.max_age.as_secs(), 1800);
        assert_eq!(options.workers, 4);
        assert!(options.require_citations());
    }

    #[test]
    fn bad_parse_mode_is_an_error() {
        let cli = Cli::parse_from(["webcorpus", "fetch", "--parse-mode", "turbo"]);
        let Command::Fetch(args) = cli.command else {
            panic!("expected fetch");
        };
        assert!(args.to_options().is_err());
    }

    #[test]
    fn corpus_url_ids_parse() {
        let cli = Cli::parse_from(["webcorpus", "corpus", "extract", "--url-ids", "1, 2,3"]);
        let Command::Corpus(args) = cli.command else {
            panic!("expected corpus");
        };
        assert_eq!(args.parse_url_ids().unwrap(), vec![1, 2, 3]);
    }
}
