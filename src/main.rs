//! `ghrank`: the most active GitHub users, by location.

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use ghrank::options::{Metric, QueryConfig, RetryPolicy, RunOptions, DEFAULT_GRAPHQL_URL};
use ghrank::output::{write_report, OutputFormat};
use ghrank::{logging, presets};

#[derive(Parser, Debug)]
#[command(name = "ghrank")]
#[command(about = "Rank the most active GitHub users by location")]
struct Cli {
    /// GitHub token used for the GraphQL API.
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true, default_value = "")]
    token: String,

    /// Number of users to show.
    #[arg(short = 'n', long, default_value_t = 256)]
    amount: usize,

    /// Number of users to consider per location.
    ///
    /// GitHub search never returns more than 1000 results for one query.
    #[arg(long = "consider", default_value_t = 1000)]
    consider_num: usize,

    /// Location to query (repeatable). Without any, the search is worldwide.
    #[arg(long)]
    location: Vec<String>,

    /// Location to leave out of every query (repeatable).
    #[arg(long)]
    exclude_location: Vec<String>,

    /// Login to drop from the results (repeatable).
    #[arg(long)]
    exclude_user: Vec<String>,

    /// Activity signal to rank by.
    #[arg(short, long, value_enum, default_value_t = Metric::Contributions)]
    metric: Metric,

    /// Output format.
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Plain)]
    output: OutputFormat,

    /// Output file (defaults to stdout). `.json` is appended for JSON output.
    #[arg(long)]
    file: Option<PathBuf>,

    /// Preset of locations; replaces `--location` and `--exclude-location`.
    #[arg(long)]
    preset: Option<String>,

    /// List all presets as CSV and exit.
    #[arg(long)]
    list_presets: bool,

    /// Location queries allowed to run at the same time.
    #[arg(long, default_value_t = 2)]
    concurrency: usize,

    /// Retries for transient upstream failures, per page.
    #[arg(long, default_value_t = 3)]
    max_retries: u32,

    /// Give up on a location after waiting this long on rate limits.
    #[arg(long, default_value_t = 3600)]
    max_rate_limit_wait_secs: u64,

    /// Per-request read timeout.
    #[arg(long, default_value_t = 30)]
    timeout_secs: u64,

    /// GraphQL endpoint.
    #[arg(long, default_value = DEFAULT_GRAPHQL_URL)]
    api_url: String,

    /// More logging on stderr (-v info, -vv debug). `RUST_LOG` overrides.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn print_presets() -> Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    writeln!(out, "preset,title,definition_checksum")?;
    for p in presets::sorted() {
        writeln!(out, "{},\"{}\",{}", p.name, p.title, p.checksum())?;
    }
    Ok(())
}

fn run_options(cli: &Cli) -> Result<RunOptions> {
    let mut opts = RunOptions {
        token: cli.token.trim().to_string(),
        locations: cli.location.clone(),
        excluded_locations: cli.exclude_location.clone(),
        excluded_users: cli.exclude_user.clone(),
        amount: cli.amount,
        consider_num: cli.consider_num,
        metric: cli.metric,
        preset: None,
    };

    if let Some(name) = &cli.preset {
        let preset = presets::lookup(name).ok_or_else(|| {
            anyhow!(
                "unknown preset {:?} (known: {})",
                name,
                presets::names().join(", ")
            )
        })?;
        opts.locations = preset.include.iter().map(|s| s.to_string()).collect();
        opts.excluded_locations = preset.exclude.iter().map(|s| s.to_string()).collect();
        opts.preset = Some(preset.identity());
    }

    if opts.token.is_empty() {
        bail!("a GitHub token is required (--token or GITHUB_TOKEN)");
    }
    Ok(opts)
}

fn query_config(cli: &Cli) -> QueryConfig {
    QueryConfig {
        api_url: cli.api_url.clone(),
        concurrency: cli.concurrency.max(1),
        retry: RetryPolicy {
            max_retries: cli.max_retries,
            ..RetryPolicy::default()
        },
        max_rate_limit_wait: Duration::from_secs(cli.max_rate_limit_wait_secs),
        request_timeout: Duration::from_secs(cli.timeout_secs.max(1)),
        ..QueryConfig::default()
    }
}

fn output_path(file: &Path, format: OutputFormat) -> PathBuf {
    let wants_ext = format == OutputFormat::Json
        && file.extension().and_then(|e| e.to_str()) != Some(format.extension());
    if wants_ext {
        let mut s = file.as_os_str().to_os_string();
        s.push(".json");
        PathBuf::from(s)
    } else {
        file.to_path_buf()
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    if cli.list_presets {
        return print_presets();
    }

    let opts = run_options(&cli)?;
    let config = query_config(&cli);
    tracing::debug!(?opts, "resolved run options");

    let report = ghrank::run(&opts, &config).context("ranking run failed")?;

    match &cli.file {
        Some(file) => {
            let path = output_path(file, cli.output);
            let f = fs::File::create(&path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            let mut w = BufWriter::new(f);
            write_report(cli.output, &report, &mut w)
                .with_context(|| format!("failed to write {}", path.display()))?;
            w.flush()
                .with_context(|| format!("failed to write {}", path.display()))?;
        }
        None => {
            let stdout = io::stdout();
            let mut w = BufWriter::new(stdout.lock());
            write_report(cli.output, &report, &mut w).context("failed to write report")?;
            w.flush().context("failed to write report")?;
        }
    }

    Ok(())
}
