// Command-line front end: log in, search a date range, print the three views
use anyhow::{bail, Context, Result};
use clap::Parser;
use court_finder::credentials::DEFAULT_CREDENTIALS_PATH;
use court_finder::report;
use court_finder::{run_query, ClientConfig, Credentials, PortalClient, QueryRange, SessionClient};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "court_finder", about = "Find free badminton courts on the booking portal")]
struct Args {
    /// First day to search, YYYYMMDD
    start: String,

    /// Last day to search, YYYYMMDD (defaults to the start date)
    end: Option<String>,

    #[arg(short, long)]
    username: Option<String>,

    #[arg(short, long)]
    password: Option<String>,

    /// Saved credentials file
    #[arg(long, default_value = DEFAULT_CREDENTIALS_PATH)]
    credentials: PathBuf,

    /// Write the given username/password to the credentials file after login
    #[arg(long)]
    save_credentials: bool,

    #[arg(long)]
    base_url: Option<String>,

    /// Pause between per-facility requests
    #[arg(long, default_value_t = 300)]
    delay_ms: u64,

    /// Skip the facility by half-hour grid
    #[arg(long)]
    no_grid: bool,
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn resolve_credentials(args: &Args) -> Result<(Credentials, bool)> {
    if let (Some(username), Some(password)) = (&args.username, &args.password) {
        return Ok((Credentials::new(username.clone(), password.clone()), true));
    }
    match Credentials::load(&args.credentials)
        .with_context(|| format!("reading {}", args.credentials.display()))?
    {
        Some(saved) => Ok((saved, false)),
        None => bail!(
            "no credentials: pass --username and --password or create {}",
            args.credentials.display()
        ),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging();

    let range = QueryRange::parse_compact(&args.start, args.end.as_deref().unwrap_or(&args.start))?;
    let (credentials, from_args) = resolve_credentials(&args)?;

    let mut config = ClientConfig {
        request_delay_ms: args.delay_ms,
        ..ClientConfig::default()
    };
    if let Some(base_url) = &args.base_url {
        config.base_url = base_url.trim_end_matches('/').to_string();
    }
    let booking_base = config.facility_page_url();
    let request_delay = config.request_delay();

    let mut session = SessionClient::new(config).context("building HTTP client")?;
    if !session
        .authenticate(&credentials.username, &credentials.password)
        .await
    {
        bail!("login failed, check username and password");
    }
    if from_args && args.save_credentials {
        credentials.save(&args.credentials)?;
    }

    let report = run_query(&session, range, request_delay)
        .await
        .context("querying facilities")?;

    println!(
        "Courts from {} to {} ({} days)",
        range.start(),
        range.end(),
        range.days_count()
    );
    println!("{}", report::render_summary(&report.summary));

    if report.summary.available().next().is_none() {
        println!("No bookable courts in this range.");
        return Ok(());
    }
    println!("{}", report::render_slots(&report, &booking_base));
    if !args.no_grid {
        println!("{}", report::render_grid(&report.grid));
    }
    Ok(())
}
