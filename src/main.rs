use std::sync::Arc;

use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use class_booking::config::Config;
use class_booking::gateway::MidtransGateway;
use class_booking::ledger::Ledger;
use class_booking::{simulate, sweeper, AppState};

#[derive(Parser)]
#[command(version, about = "Class slot booking service")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run migrations, start the sweeper and serve HTTP (default).
    Serve,
    /// Mark confirmed bookings whose class has ended as finished.
    FinishBookings,
    /// Send a locally signed gateway notification through reconciliation.
    SimulateCallback {
        /// Booking code; defaults to the latest booking with a pending payment.
        #[arg(long)]
        code: Option<String>,
        #[arg(long, default_value = "settlement")]
        status: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "class_booking=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    let ledger = Ledger::connect(
        &config.database_url,
        config.db_pool_size,
        config.db_busy_timeout_ms,
    )?;
    ledger.run_migrations().await?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config, ledger).await?,
        Command::FinishBookings => {
            let count = sweeper::sweep_finished(&ledger).await?;
            println!("Marked {count} booking(s) as finished.");
        }
        Command::SimulateCallback { code, status } => {
            let (code, outcome) =
                simulate::simulate_callback(&ledger, &config.gateway.server_key, code, &status)
                    .await?;
            println!("Simulated `{status}` for booking {code}: {outcome:?}");
        }
    }
    Ok(())
}

async fn serve(config: Config, ledger: Ledger) -> Result<(), Box<dyn std::error::Error>> {
    let gateway = MidtransGateway::shared(&config.gateway)?;

    let sweeper = config
        .sweep_interval
        .map(|interval| sweeper::spawn(ledger.clone(), interval));

    let app_state = AppState {
        ledger,
        gateway,
        gateway_config: Arc::new(config.gateway.clone()),
    };
    let app = class_booking::app(app_state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::debug!("listening on {}", config.bind_addr);
    axum::serve(listener, app).await?;

    if let Some(handle) = sweeper {
        handle.abort();
    }
    Ok(())
}
