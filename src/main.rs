//! # Mailprobe CLI
//!
//! Command-line interface for the Mailprobe library (`mailprobe_core`).
//! This binary parses arguments, sets up configuration, builds the verification
//! engine, verifies entities (either one from flags or many from a file), and
//! writes the results.

use mailprobe_core::{
    initialize_engine, verify_entities, verify_single_entity, Config, ConfigBuilder,
    EntityResult, FinalStatus, VerificationEngine, VerifyOptions, VerifyRequest,
};

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::{fmt::format::FmtSpan, EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Discovers and verifies mailbox addresses for people at an organization.",
    long_about = "Mailprobe generates address candidates from a name and domain, scores them with DNS and username signals, and verifies the best ones with SMTP RCPT probes."
)]
struct AppArgs {
    /// Path to the input JSON file: an array of {first_name, last_name, domain} objects.
    #[arg(short, long, default_value = "input.json", env = "MAILPROBE_INPUT")]
    input: String,

    /// Path to the output JSON file where results will be saved.
    #[arg(short, long, default_value = "results.json", env = "MAILPROBE_OUTPUT")]
    output: String,

    /// First name of the person (enables single entity mode). Requires --domain.
    #[arg(long, env = "MAILPROBE_FIRST", requires = "domain")]
    first: Option<String>,

    /// Last name of the person (enables single entity mode). Requires --domain.
    #[arg(long, env = "MAILPROBE_LAST", requires = "domain")]
    last: Option<String>,

    /// Domain, website URL or address to search against.
    #[arg(long, env = "MAILPROBE_DOMAIN")]
    domain: Option<String>,

    /// Print results to standard output instead of a file (single entity mode only).
    #[arg(long, default_value = "false", env = "MAILPROBE_STDOUT")]
    stdout: bool,

    /// Path to a TOML configuration file. CLI args override file settings.
    #[arg(long, env = "MAILPROBE_CONFIG")]
    config_file: Option<String>,

    /// Disable SMTP probing; candidates are scored and classified only.
    #[arg(long, action = clap::ArgAction::SetTrue, env = "MAILPROBE_NO_SMTP")]
    no_smtp: bool,

    /// Disable DNS lookups; every domain is treated as having no MX.
    #[arg(long, action = clap::ArgAction::SetTrue, env = "MAILPROBE_NO_DNS")]
    no_dns: bool,

    /// Enable username enumeration against the public profile host.
    #[arg(long, action = clap::ArgAction::SetTrue, env = "MAILPROBE_USERNAMES")]
    usernames: bool,

    /// Maximum number of entities verified concurrently.
    #[arg(short, long, env = "MAILPROBE_CONCURRENCY")]
    concurrency: Option<usize>,

    /// HELO/EHLO name announced to mail exchangers.
    #[arg(long, env = "MAILPROBE_HELO")]
    helo_name: Option<String>,

    /// SMTP connection/command timeout in seconds.
    #[arg(long, env = "MAILPROBE_SMTP_TIMEOUT")]
    smtp_timeout: Option<u64>,

    /// DNS resolution timeout in seconds.
    #[arg(long, env = "MAILPROBE_DNS_TIMEOUT")]
    dns_timeout: Option<u64>,

    /// Comma-separated list of DNS servers to use for lookups.
    #[arg(long, value_delimiter = ',', env = "MAILPROBE_DNS_SERVERS")]
    dns_servers: Option<Vec<String>>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(env_filter)
        .with_thread_names(true)
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Setting up tracing subscriber failed")?;

    tracing::info!("Mailprobe CLI v{} starting...", env!("CARGO_PKG_VERSION"));

    let args = AppArgs::parse();
    tracing::debug!("Parsed CLI arguments: {:?}", args);

    let config = build_config(&args)?;
    tracing::debug!("Effective configuration loaded: {:?}", config);

    let engine = match initialize_engine(&config) {
        Ok(e) => Arc::new(e),
        Err(e) => {
            tracing::error!("Initialization error: {}", e);
            return Err(anyhow::anyhow!("Failed to initialize verification engine: {}", e));
        }
    };
    let opts = engine.config().verify_options();

    let is_cli_mode = args.first.is_some() || args.last.is_some();
    let start_time = Instant::now();

    let execution_result = if is_cli_mode {
        process_cli_mode(&engine, &opts, &args).await
    } else {
        process_file_mode(Arc::clone(&engine), opts, &args, start_time).await
    };

    if let Err(e) = execution_result {
        tracing::error!("Execution failed: {}", e);
        return Err(e);
    }

    for metric in engine.metrics().snapshot().await {
        tracing::info!(
            "Provider '{}': {} probe(s), {} valid, {} invalid, codes {:?}",
            metric.provider,
            metric.probes,
            metric.valid,
            metric.invalid,
            metric.codes
        );
    }

    if !is_cli_mode {
        tracing::info!(
            "Processing finished successfully. Total duration: {:.2?}",
            start_time.elapsed()
        );
    }
    Ok(())
}

fn build_config(args: &AppArgs) -> Result<Config> {
    let mut config_builder = ConfigBuilder::new();

    if let Some(ref path) = args.config_file {
        config_builder = config_builder.config_file(path);
    }
    if args.no_smtp {
        config_builder = config_builder.smtp_enabled(false);
    }
    if args.no_dns {
        config_builder = config_builder.dns_enabled(false);
    }
    if args.usernames {
        config_builder = config_builder.usernames_enabled(true);
    }
    if let Some(c) = args.concurrency {
        config_builder = config_builder.max_concurrency(c);
    }
    if let Some(ref helo) = args.helo_name {
        config_builder = config_builder.helo_name(helo);
    }
    if let Some(t) = args.smtp_timeout {
        config_builder = config_builder.smtp_timeout(Duration::from_secs(t));
    }
    if let Some(t) = args.dns_timeout {
        config_builder = config_builder.dns_timeout(Duration::from_secs(t));
    }
    if let Some(ref servers) = args.dns_servers {
        if !servers.is_empty() {
            config_builder = config_builder.dns_servers(servers.clone());
        }
    }

    config_builder.build().map_err(|e| {
        tracing::error!("Configuration error: {}", e);
        anyhow::anyhow!("Failed to build configuration: {}", e)
    })
}

async fn process_cli_mode(
    engine: &VerificationEngine,
    opts: &VerifyOptions,
    args: &AppArgs,
) -> Result<()> {
    tracing::info!("Running in single entity CLI mode.");
    let start_time = Instant::now();
    let domain = args
        .domain
        .clone()
        .context("--domain is required in single entity mode")?;
    let request = VerifyRequest::new(
        args.first.clone().unwrap_or_default(),
        args.last.clone().unwrap_or_default(),
        domain,
    );

    tracing::info!(
        "Verifying First='{}', Last='{}', Domain='{}'",
        request.first_name,
        request.last_name,
        request.domain
    );

    let result = verify_single_entity(engine, request, opts).await;

    if args.stdout {
        print_cli_results(&result);
    } else {
        tracing::info!("Saving result to '{}'...", args.output);
        save_results(&[result], &args.output)?;
        tracing::info!("Result saved successfully to '{}'.", args.output);
    }
    tracing::info!("CLI mode finished. Duration: {:.2?}", start_time.elapsed());
    Ok(())
}

async fn process_file_mode(
    engine: Arc<VerificationEngine>,
    opts: VerifyOptions,
    args: &AppArgs,
    start_time: Instant,
) -> Result<()> {
    tracing::info!(
        "Running in file processing mode. Input: '{}', Output: '{}'",
        args.input,
        args.output
    );
    let input_path = Path::new(&args.input);
    let output_path = Path::new(&args.output);

    if !input_path.is_file() {
        return Err(anyhow::anyhow!(
            "Input file not found or is not a file: {}",
            args.input
        ));
    }
    if let Some(parent_dir) = output_path.parent() {
        if !parent_dir.as_os_str().is_empty() && !parent_dir.exists() {
            tracing::debug!("Creating output directory: {}", parent_dir.display());
            std::fs::create_dir_all(parent_dir).with_context(|| {
                format!("Failed to create output directory '{}'", parent_dir.display())
            })?;
        }
    }

    tracing::info!("Loading requests from '{}'...", args.input);
    let requests = load_requests(&args.input)?;
    let total_records_loaded = requests.len();
    if total_records_loaded == 0 {
        tracing::warn!(
            "Input file '{}' contains no requests. Saving empty results file.",
            args.input
        );
        save_results(&[], &args.output)?;
        return Ok(());
    }

    tracing::info!(
        "Verifying {} entities (Concurrency: {})...",
        total_records_loaded,
        engine.config().max_concurrency
    );
    let pb = ProgressBar::new(total_records_loaded as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) | ETA: {eta} | {msg}")
            .context("Failed to set progress bar template")?
            .progress_chars("=> "),
    );
    pb.set_message("Verifying entities...");

    let mut results = verify_entities(engine, requests, Arc::new(opts)).await;

    pb.set_position(results.len() as u64);
    pb.finish_with_message(format!("Processed {} records", results.len()));

    results.sort_by(|a, b| {
        (&a.domain, &a.request.last_name, &a.request.first_name).cmp(&(
            &b.domain,
            &b.request.last_name,
            &b.request.first_name,
        ))
    });

    tracing::info!("Saving results to '{}'...", args.output);
    save_results(&results, &args.output)?;
    tracing::info!("Results saved successfully.");

    log_summary(&results, total_records_loaded, start_time.elapsed());
    Ok(())
}

fn load_requests(file_path: &str) -> Result<Vec<VerifyRequest>> {
    let file = File::open(file_path)
        .with_context(|| format!("Failed to open input file '{}'", file_path))?;
    let reader = BufReader::new(file);
    serde_json::from_reader(reader).with_context(|| {
        format!(
            "Failed to parse JSON from '{}'. Ensure it's an array of request objects.",
            file_path
        )
    })
}

/// Writes results as pretty-printed JSON.
fn save_results(results: &[EntityResult], file_path: &str) -> Result<()> {
    let file = File::create(file_path)
        .with_context(|| format!("Failed to create/truncate output file '{}'", file_path))?;
    let writer = BufWriter::new(file);
    serde_json::to_writer_pretty(writer, results)
        .with_context(|| format!("Failed to serialize results to JSON for '{}'", file_path))?;
    Ok(())
}

fn log_summary(results: &[EntityResult], original_total: usize, duration: Duration) {
    let skipped = results.iter().filter(|r| r.skipped).count();
    let with_accepted = results.iter().filter(|r| r.best().is_some()).count();
    let catch_all = results.iter().filter(|r| r.is_catch_all).count();
    let no_mx = results
        .iter()
        .filter(|r| !r.skipped && !r.footprint.has_mx())
        .count();

    tracing::info!("-------------------- Verification Summary --------------------");
    tracing::info!("Total Records in Input File : {}", original_total);
    tracing::info!("Records Processed/Attempted : {}", results.len());
    tracing::info!("  - With Accepted Address   : {}", with_accepted);
    tracing::info!("  - Catch-all Domains       : {}", catch_all);
    tracing::info!("  - Domains Without MX      : {}", no_mx);
    tracing::info!("  - Skipped                 : {}", skipped);
    tracing::info!("Total Time Taken            : {:.2?}", duration);
    if duration.as_secs_f64() > 0.01 && !results.is_empty() {
        let rate = results.len() as f64 / duration.as_secs_f64();
        tracing::info!("Processing Rate             : {:.2} records/sec", rate);
    }
    tracing::info!("--------------------------------------------------------------");
}

/// Prints the result for one entity (CLI mode).
fn print_cli_results(result: &EntityResult) {
    const BLUE: &str = "\x1b[34m";
    const GREEN: &str = "\x1b[32m";
    const YELLOW: &str = "\x1b[33m";
    const RESET: &str = "\x1b[0m";

    println!("\n{BLUE}===== Mailprobe Results ====={RESET}");
    println!(
        "Name:   {} {}",
        result.request.first_name, result.request.last_name
    );
    println!("Domain: {}", result.domain);
    println!(
        "MX:     {}",
        if result.footprint.has_mx() {
            result.footprint.mx_hosts().join(", ")
        } else {
            "none".to_string()
        }
    );
    if result.is_catch_all {
        println!("{YELLOW}Domain accepts any recipient (catch-all).{RESET}");
    }

    if result.skipped {
        println!("\n{YELLOW}Status: SKIPPED{RESET}");
        println!(
            "Reason: {}",
            result.skip_reason.as_deref().unwrap_or("Unknown")
        );
    } else if let Some(best) = result.best() {
        println!("\n{GREEN}Status: ACCEPTED{RESET}");
        println!("Email:  {GREEN}{}{RESET}", best.email);
        println!(
            "Score:  {:.3} ({})",
            best.blended_score,
            best.final_status.map(|s| s.to_string()).unwrap_or_default()
        );
    } else {
        println!("\n{YELLOW}Status: NO ADDRESS ACCEPTED{RESET}");
    }

    let shown: Vec<_> = result
        .candidates
        .iter()
        .filter(|c| c.final_status != Some(FinalStatus::Purged))
        .collect();
    if !shown.is_empty() {
        println!("\n{BLUE}Candidates:{RESET}");
        for candidate in shown {
            println!(
                "- {} [{:.3}] {}{}",
                candidate.email,
                candidate.blended_score,
                candidate.verification_status,
                candidate
                    .source_signals
                    .smtp_code
                    .map(|c| format!(" ({})", c))
                    .unwrap_or_default()
            );
        }
    }

    println!("{BLUE}============================={RESET}\n");
}
