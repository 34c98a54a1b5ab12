use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use waypost::{ApiServer, Config, db};

/// Waypost - Location tracking and remote device command gateway
#[derive(Parser)]
#[command(name = "waypost", version, about)]
struct Cli {
    /// Port to listen on
    #[arg(long, env = "WAYPOST_PORT", default_value = "3000")]
    port: u16,

    /// Data directory (database lives here)
    #[arg(long, env = "WAYPOST_DATA_DIR", default_value = "./data")]
    data_dir: PathBuf,

    /// Static files directory for the web console
    #[arg(long, env = "WAYPOST_STATIC_DIR")]
    static_dir: Option<PathBuf>,

    /// Run the demo movement simulator
    #[arg(long, env = "WAYPOST_SIMULATE")]
    simulate: bool,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,waypost=info",
        1 => "info,waypost=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    tracing::info!(
        port = cli.port,
        data_dir = %cli.data_dir.display(),
        simulate = cli.simulate,
        "starting waypost gateway"
    );

    let config = Config::load(cli.port, cli.data_dir, cli.static_dir, cli.simulate)?;

    std::fs::create_dir_all(&config.data_dir)?;
    let pool = db::init(&config.db_path())?;

    let server = ApiServer::new(&config, pool);

    let _sim = config.simulate.then(|| waypost::sim::spawn(server.state()));

    tracing::info!("waypost gateway ready");
    server.run().await?;

    Ok(())
}
