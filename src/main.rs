use std::{path::PathBuf, process, sync::Arc};

use clap::Parser;
use nico_rtmp::{output, resolve, session, status, transport, util, worker};

/// Record a niconico live broadcast or timeshift over RTMP
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Broadcast id, e.g. lv123456789
    live_id: String,

    /// Value of the `user_session` cookie
    #[arg(long, env = "NICO_SESSION", hide_env_values = true)]
    session: Option<String>,

    /// Maximum parallel sessions (0: auto, negative: one at a time)
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    max_conn: i32,

    /// Substreams to record, 1-based and comma separated (default: all)
    #[arg(long, value_delimiter = ',', value_parser = clap::value_parser!(u64).range(1..))]
    index: Vec<u64>,

    /// Fetch the player status over HTTPS (experimental)
    #[arg(long)]
    https: bool,

    /// Directory the recordings are written to
    #[arg(long, default_value = ".")]
    output_dir: PathBuf,

    /// Print the resolved substreams as JSON and exit
    #[arg(long)]
    list: bool,
}

#[derive(thiserror::Error, Debug)]
enum AppError {
    #[error("Could not create HttpClient")]
    HttpClient(#[from] reqwest::Error),
    #[error(transparent)]
    Status(#[from] status::StatusError),
    #[error(transparent)]
    Worker(#[from] worker::WorkerError),
    #[error("Could not encode substreams")]
    Json(#[from] serde_json::Error),
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    match run(args).await {
        Ok(true) => (),
        Ok(false) => process::exit(1),
        Err(e) => {
            log::error!("{}", e);
            process::exit(1);
        }
    }
}

/// Returns whether every selected substream was recorded.
async fn run(args: Args) -> Result<bool, AppError> {
    let client = util::HttpClient::new(args.session)?;

    log::info!("Fetching player status of {}", args.live_id);
    let status = status::fetch_status(&client, &args.live_id, args.https).await?;

    if args.list {
        if status.availability()? == status::Availability::NotLoggedIn {
            println!("Not logged in");
            return Ok(false);
        }
        let res = resolve::resolve(&status);
        println!("{}", serde_json::to_string_pretty(&res.streams)?);
        return Ok(true);
    }

    let config = worker::WorkerConfig {
        max_sessions: args.max_conn,
        indices: (!args.index.is_empty()).then(|| {
            args.index
                .iter()
                .map(|&i| (i - 1) as usize)
                .collect()
        }),
    };

    let outcome = worker::record(
        status,
        Arc::new(transport::LogConnector),
        Arc::new(output::FsNamer::new(args.output_dir)),
        session::SessionConfig::default(),
        &config,
    )
    .await?;

    match outcome {
        worker::RunOutcome::NotLoggedIn => {
            println!("Not logged in");
            Ok(false)
        }
        worker::RunOutcome::Recorded(report) => {
            report.print();
            Ok(report.is_success())
        }
    }
}
