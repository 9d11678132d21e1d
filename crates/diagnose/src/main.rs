//! Connectivity and access-policy checks against the remote sample table.

use anyhow::Result;
use clap::Parser;
use services::services::{
    config::{DEFAULT_TABLE, RemoteConfig},
    diagnostics::Diagnostics,
    postgrest::PostgrestClient,
};
use tracing::info;
use utils::logging::init_tracing;

#[derive(Debug, Parser)]
#[command(name = "qc-diagnose", about = "Diagnose why samples fall back to offline mode")]
struct Args {
    /// Base URL of the remote store
    #[arg(long, env = "QC_REMOTE_URL")]
    url: String,

    /// Anonymous API key
    #[arg(long, env = "QC_REMOTE_KEY", hide_env_values = true)]
    key: String,

    #[arg(long, env = "QC_REMOTE_TABLE", default_value = DEFAULT_TABLE)]
    table: String,

    /// Also try to install permissive row-level security policies (needs admin rights)
    #[arg(long)]
    activate_policies: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();
    let args = Args::parse();

    let config = RemoteConfig::new(args.url, args.key).with_table(args.table);
    info!(
        url = %config.url,
        key = %config.masked_key(),
        table = %config.table,
        "Starting diagnostics"
    );

    let client = PostgrestClient::new(&config)?;
    let report = Diagnostics::new(&client).run(args.activate_policies).await;
    print!("{report}");

    if report.has_failures() {
        anyhow::bail!("remote store is not fully accessible");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_table_defaults_to_samples() {
        let args = Args::try_parse_from(["qc-diagnose", "--url", "https://x.test", "--key", "k"]).unwrap();
        assert_eq!(args.table, "samples");
        assert!(!args.activate_policies);
    }
}
