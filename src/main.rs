use anyhow::Result;
use clap::Parser;
use config_manager::SystemConfig;
use history_service::TransactionHistoryService;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "safe_history")]
#[command(about = "Print the merged transaction history of a Safe as JSON", long_about = None)]
struct Args {
    /// Safe address (0x + 40 hex chars)
    address: String,

    /// Chain to query
    #[arg(long, default_value = "1")]
    chain_id: u64,

    /// Maximum number of records to print
    #[arg(short, long, default_value = "20")]
    limit: usize,

    /// Number of newest records to skip
    #[arg(short, long, default_value = "0")]
    offset: usize,

    /// Configuration file
    #[arg(long, default_value = "config.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Logs go to stderr so stdout stays valid JSON
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,safe_history=debug".into()),
        )
        .init();

    let config = SystemConfig::load_from_path(&args.config)?;
    let service = TransactionHistoryService::from_config(&config)?;

    info!(
        "🔍 Fetching history for {} on chain {} (limit {}, offset {})",
        args.address, args.chain_id, args.limit, args.offset
    );

    let records = service
        .get_transactions(&args.address, args.chain_id, args.limit, args.offset)
        .await?;

    info!("✅ {} records", records.len());
    println!("{}", serde_json::to_string_pretty(&records)?);

    Ok(())
}
