use clap::Parser;
use dhcpvisor::{cli::DhcpvisorctlArgs, daemon, DhcpvisorError, DhcpvisorResult};

//--------------------------------------------------------------------------------------------------
// Functions: main
//--------------------------------------------------------------------------------------------------

#[tokio::main(flavor = "current_thread")]
async fn main() -> DhcpvisorResult<()> {
    let args = DhcpvisorctlArgs::parse();
    let command = args.subcommand.control_command();

    let reply = daemon::send_command(&args.control_socket, &command).await?;
    println!("{}", reply);

    if reply != daemon::CONTROL_REPLY_OK {
        return Err(DhcpvisorError::ControlChannel(reply));
    }

    Ok(())
}
