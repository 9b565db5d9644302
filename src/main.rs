use anyhow::Context;
use clap::Parser;
use tracing::error;

use webcorpus::cli::{Cli, Command, CorpusArgs, DbArgs, DbCommand, FetchArgs};
use webcorpus::config;
use webcorpus::corpus;
use webcorpus::orchestrator;
use webcorpus::store::{ArtifactStore, RelationalIndex};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let quiet = match &cli.command {
        Command::Fetch(args) => args.quiet,
        Command::Corpus(args) => args.quiet,
        Command::Db(args) => args.quiet,
    };
    init_tracing(quiet);

    let code = match cli.command {
        Command::Fetch(args) => run_fetch(args).await,
        Command::Corpus(args) => run_corpus(args),
        Command::Db(args) => match run_db(args) {
            Ok(()) => 0,
            Err(e) => {
                error!("{:#}", e);
                2
            }
        },
    };
    std::process::exit(code);
}

/// Progress goes to stderr at `info`; `--quiet` drops to errors only.
fn init_tracing(quiet: bool) {
    let default = if quiet { "error" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run_fetch(args: FetchArgs) -> i32 {
    let options = match args.to_options() {
        Ok(options) => options,
        Err(message) => {
            error!("{}", message);
            return 2;
        }
    };

    // URL list: explicit, or replayed from an existing session.
    let raw_urls: Vec<String> = if let Some(csv) = &args.urls {
        csv.split(',').map(|u| u.trim().to_string()).collect()
    } else if let Some(session_id) = args.session {
        let index = match RelationalIndex::open(&config::index_path(&options.output_dir)) {
            Ok(index) => index,
            Err(e) => {
                error!("failed to open index: {}", e);
                return 2;
            }
        };
        match index.session_member_urls(session_id) {
            Ok(rows) if !rows.is_empty() => rows.into_iter().map(|(_, url)| url).collect(),
            Ok(_) => {
                error!("session {} not found or empty", session_id);
                return 2;
            }
            Err(e) => {
                error!("failed to load session {}: {}", session_id, e);
                return 2;
            }
        }
    } else {
        error!("fetch requires --urls or --session");
        return 2;
    };

    match orchestrator::run_batch(raw_urls, options).await {
        Ok(outcome) => outcome.exit_code(),
        Err(e) => {
            error!("{}", e);
            2
        }
    }
}

fn run_corpus(args: CorpusArgs) -> i32 {
    let output_dir = args
        .output_dir
        .clone()
        .unwrap_or_else(config::default_output_dir);
    let index = match RelationalIndex::open(&config::index_path(&output_dir)) {
        Ok(index) => index,
        Err(e) => {
            error!("failed to open index: {}", e);
            return 2;
        }
    };
    let store = ArtifactStore::new(&output_dir);

    let url_ids = match args.parse_url_ids() {
        Ok(ids) => ids,
        Err(message) => {
            error!("{}", message);
            return 2;
        }
    };

    let mut request = corpus::CorpusRequest::for_verb(&args.verb);
    request.session = args.session;
    request.view = args.view.clone();
    request.filter = args.filter.clone();
    request.format = Some(args.format.clone());
    request.url_ids = url_ids;
    if let Some(top) = args.top {
        request
            .constraints
            .insert("top".to_string(), serde_json::json!(top));
    }

    let response = corpus::dispatch(&request, &index, &store);
    let had_error = response.error.is_some();

    let rendered = if args.format.eq_ignore_ascii_case("yaml") {
        serde_yaml::to_string(&response).unwrap_or_default()
    } else {
        serde_json::to_string_pretty(&response).unwrap_or_default()
    };
    println!("{}", rendered);

    if had_error {
        2
    } else {
        0
    }
}

fn run_db(args: DbArgs) -> anyhow::Result<()> {
    let output_dir = args
        .output_dir
        .clone()
        .unwrap_or_else(config::default_output_dir);
    let index = RelationalIndex::open(&config::index_path(&output_dir))
        .context("failed to open index")?;

    match args.command {
        DbCommand::Tables => {
            for name in index.table_names()? {
                println!("{}", name);
            }
        }
        DbCommand::Counts => {
            for (name, count) in index.table_counts()? {
                println!("{:<20} {}", name, count);
            }
        }
        DbCommand::Sessions { limit } => {
            for s in index.recent_sessions(limit)? {
                println!(
                    "{:<6} {}  urls={} ok={} failed={} mode={} {}",
                    s.id, s.created_at, s.url_count, s.success_count, s.failed_count,
                    s.parse_mode, s.session_dir
                );
            }
        }
        DbCommand::Session { id } => {
            for r in index.session_results(id)? {
                println!(
                    "url={:<6} {:<8} code={} tokens={} {}",
                    r.url_id,
                    r.status,
                    r.status_code,
                    r.estimated_tokens,
                    r.error_message.unwrap_or_default()
                );
            }
        }
    }
    Ok(())
}
