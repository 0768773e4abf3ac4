//! Loan Desk - loan application intake and review service

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use loan_desk::{
    config::{Args, LogFormat},
    db::MongoClient,
    server::{self, AppState},
    store::{ApplicationStore, MemoryApplicationStore, MongoApplicationStore},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    // Parse command line arguments
    let args = Args::parse();

    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("loan_desk={},info", args.log_level).into());
    match args.log_format {
        LogFormat::Text => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }

    // Validate configuration
    if let Err(e) = args.validate() {
        error!("{}", e);
        std::process::exit(1);
    }

    info!("======================================");
    info!("  Loan Desk");
    info!("======================================");
    info!("Listen: {}", args.listen);
    info!("Mode: {}", if args.dev_mode { "DEVELOPMENT" } else { "PRODUCTION" });
    info!("MongoDB: {} (db: {})", args.mongodb_uri, args.mongodb_db);
    info!("Reference prefix: {}", args.reference_prefix);
    info!("Max page size: {}", args.max_page_size);
    info!("======================================");

    // Open the store (in-memory fallback only in dev mode)
    let store: Arc<dyn ApplicationStore> =
        match MongoClient::new(&args.mongodb_uri, &args.mongodb_db).await {
            Ok(client) => Arc::new(MongoApplicationStore::open(client).await?),
            Err(e) if args.dev_mode => {
                warn!("MongoDB connection failed (dev mode, using in-memory store): {}", e);
                Arc::new(MemoryApplicationStore::new())
            }
            Err(e) => {
                error!("MongoDB connection failed: {}", e);
                std::process::exit(1);
            }
        };
    info!("Application store: {}", store.backend());

    let state = Arc::new(AppState::new(args, Arc::clone(&store)));

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
    };
    let served = server::run(state, shutdown).await;

    if let Err(e) = store.close().await {
        warn!("Error closing application store: {}", e);
    }
    info!("Loan Desk stopped");

    served?;
    Ok(())
}
