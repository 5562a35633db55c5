#![forbid(unsafe_code)]

mod cmd;
mod output;

use std::env;
use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use dredge_core::cancel::CancelToken;
use dredge_core::client::HubSpotClient;
use output::OutputMode;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "dredge: HubSpot deal history extractor",
    long_about = None
)]
struct Cli {
    /// HubSpot private-app token. Falls back to the `HUBSPOT_TOKEN` env var.
    #[arg(long, global = true, value_name = "TOKEN")]
    token: Option<String>,

    /// Directory extract files are written to.
    #[arg(long, global = true, value_name = "DIR", default_value = "extract")]
    out: PathBuf,

    /// Emit JSON output instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        about = "List deal pipelines",
        after_help = "EXAMPLES:\n    # Enumerate pipelines to pick a --pipeline number\n    dg list"
    )]
    List,

    #[command(
        about = "Extract deal stage history",
        long_about = "Extract each deal's stage change history, one CSV file per page of deals.",
        after_help = "EXAMPLES:\n    # First date each stage was reached, all pipelines\n    dg stages\n\n    # Every stage change for pipeline 2 from `dg list`\n    dg stages --pipeline 2 --full"
    )]
    Stages(cmd::stages::StagesArgs),

    #[command(
        about = "Extract deal pipeline history",
        after_help = "EXAMPLES:\n    # First date each pipeline was entered\n    dg pipes\n\n    # Every pipeline change, as JSON report\n    dg pipes --full --json"
    )]
    Pipes(cmd::pipes::PipesArgs),

    #[command(
        about = "Count stage changes per deal",
        after_help = "EXAMPLES:\n    # One row per deal with its number of stage changes\n    dg counts"
    )]
    Counts(cmd::counts::CountsArgs),
}

fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    let Some(token) = resolve_token(cli.token.as_deref()) else {
        eprintln!("No HubSpot token found.");
        eprintln!("Pass --token or set HUBSPOT_TOKEN in the environment;");
        eprintln!("a private-app token with deal read scope is required.");
        return Ok(());
    };

    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    ctrlc::set_handler(move || handler_token.cancel())
        .context("failed to install the interrupt handler")?;

    let client = HubSpotClient::new(token);
    let output = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Human
    };
    let ctx = cmd::ExtractCtx {
        client: &client,
        out_dir: &cli.out,
        output,
        cancel: &cancel,
    };

    match &cli.command {
        Commands::List => cmd::list::run_list(&client, output),
        Commands::Stages(args) => cmd::stages::run_stages(args, &ctx),
        Commands::Pipes(args) => cmd::pipes::run_pipes(args, &ctx),
        Commands::Counts(args) => cmd::counts::run_counts(args, &ctx),
    }
}

/// Resolve the credential once, before any network call. An empty value
/// counts as missing so a blank env entry still gets the setup help.
fn resolve_token(flag: Option<&str>) -> Option<String> {
    let token = flag
        .map(ToString::to_string)
        .or_else(|| env::var("HUBSPOT_TOKEN").ok())?;

    if token.trim().is_empty() { None } else { Some(token) }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("DREDGE_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if env::var("DEBUG").is_ok() {
            "dredge_core=debug,dredge_cli=debug,info"
        } else {
            "dredge_core=info,dredge_cli=info,warn"
        })
    });

    let format = env::var("DREDGE_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());
    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => registry.with(fmt::layer().json().with_ansi(false)).init(),
        _ => registry.with(fmt::layer().compact()).init(),
    }
}

#[cfg(test)]
mod tests {
    use super::resolve_token;

    #[test]
    fn flag_wins_over_missing_env() {
        assert_eq!(resolve_token(Some("tok-1")), Some("tok-1".to_string()));
    }

    #[test]
    fn blank_flag_counts_as_missing() {
        assert_eq!(resolve_token(Some("   ")), None);
    }
}
