use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};
use std::fs::File;
use std::io::{self, BufReader};
use std::path::PathBuf;
use std::sync::Arc;
use studiopay::application::PaymentServices;
use studiopay::config::Settings;
use studiopay::domain::ports::{EnrollmentStoreHandle, OrderStoreHandle};
use studiopay::infrastructure::in_memory::{InMemoryEnrollmentStore, InMemoryOrderStore};
use studiopay::interfaces::csv::ledger_reader::LedgerReader;
use studiopay::interfaces::csv::ledger_writer::LedgerWriter;
use studiopay::interfaces::gateway::GatewayRegistry;
use studiopay::interfaces::http::router;
use studiopay::interfaces::replay::{recorded_callbacks, replay_callbacks, seed_ledger};
use studiopay::telemetry::init_tracing;
use tracing::info;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Settings file (TOML, YAML, JSON...). Environment variables prefixed
    /// `STUDIOPAY__` take precedence over it.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the callback HTTP server until Ctrl-C.
    Serve {
        /// Path to persistent database. Overrides `storage.db_path`.
        #[arg(long)]
        db_path: Option<PathBuf>,
    },
    /// Seed a ledger, replay recorded callbacks, print the resulting ledger as CSV.
    Replay {
        /// Seed CSV: enrollment,order_no,amount,payment_method
        ledger: PathBuf,
        /// Recorded callbacks, one JSON object per line
        callbacks: PathBuf,
        /// Path to persistent database. Overrides `storage.db_path`.
        #[arg(long)]
        db_path: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref()).into_diagnostic()?;
    let registry = GatewayRegistry::from_settings(&settings.gateways);
    let gateways = registry.configured();

    match cli.command {
        Command::Serve { db_path } => {
            let (orders, enrollments) = open_stores(db_path.or(settings.storage.db_path))?;
            let services = PaymentServices::new(orders, enrollments, registry);
            let addr = settings.server.addr().into_diagnostic()?;
            info!(%addr, ?gateways, "listening");

            axum::Server::bind(&addr)
                .serve(router(services).into_make_service())
                .with_graceful_shutdown(async {
                    let _ = tokio::signal::ctrl_c().await;
                })
                .await
                .into_diagnostic()?;
        }
        Command::Replay {
            ledger,
            callbacks,
            db_path,
        } => {
            let (orders, enrollments) = open_stores(db_path.or(settings.storage.db_path))?;
            let services = PaymentServices::new(orders, enrollments, registry);

            let ledger = File::open(ledger).into_diagnostic()?;
            let seeded = seed_ledger(&services, LedgerReader::new(ledger).rows())
                .await
                .into_diagnostic()?;
            info!(inserted = seeded.inserted, skipped = seeded.skipped, "ledger seeded");

            let callbacks = BufReader::new(File::open(callbacks).into_diagnostic()?);
            let summary = replay_callbacks(&services, recorded_callbacks(callbacks)).await;
            info!(
                applied = summary.applied,
                duplicates = summary.duplicates,
                rejected = summary.rejected,
                "callbacks replayed"
            );

            let orders = services.orders.get_all().await.into_diagnostic()?;
            let stdout = io::stdout();
            let mut writer = LedgerWriter::new(stdout.lock());
            writer.write_orders(&orders).into_diagnostic()?;
        }
    }

    Ok(())
}

#[cfg(feature = "storage-rocksdb")]
fn open_stores(db_path: Option<PathBuf>) -> Result<(OrderStoreHandle, EnrollmentStoreHandle)> {
    use studiopay::infrastructure::rocksdb::RocksDBStore;

    if let Some(path) = db_path {
        info!(path = %path.display(), "using RocksDB storage");
        let store = Arc::new(RocksDBStore::open(path).into_diagnostic()?);
        let orders: OrderStoreHandle = store.clone();
        let enrollments: EnrollmentStoreHandle = store;
        return Ok((orders, enrollments));
    }
    Ok(in_memory())
}

#[cfg(not(feature = "storage-rocksdb"))]
fn open_stores(db_path: Option<PathBuf>) -> Result<(OrderStoreHandle, EnrollmentStoreHandle)> {
    if db_path.is_some() {
        tracing::warn!(
            "Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to in-memory storage."
        );
    }
    Ok(in_memory())
}

fn in_memory() -> (OrderStoreHandle, EnrollmentStoreHandle) {
    let orders: OrderStoreHandle = Arc::new(InMemoryOrderStore::new());
    let enrollments: EnrollmentStoreHandle = Arc::new(InMemoryEnrollmentStore::new());
    (orders, enrollments)
}
