use clap::Parser;
use dhcpvisor::{
    cli::{self, DhcpvisordArgs},
    daemon, DhcpvisorResult,
};

//--------------------------------------------------------------------------------------------------
// Functions: main
//--------------------------------------------------------------------------------------------------

#[tokio::main(flavor = "current_thread")]
async fn main() -> DhcpvisorResult<()> {
    let args = DhcpvisordArgs::parse();
    cli::init_tracing(args.verbose);

    let config = args.load_config().await?;
    tracing::debug!(?config, "loaded daemon configuration");

    if let Err(e) = daemon::run_daemon(config).await {
        tracing::error!("dhcpvisord stopped: {}", e);
        return Err(e);
    }

    Ok(())
}
