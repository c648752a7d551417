use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;

use ipk25chat_client::args::{Args, Transport};
use ipk25chat_client::output::{ConsoleOutput, UserOutput};
use ipk25chat_client::session::Flow;
use ipk25chat_client::tcp_session::run_tcp;
use ipk25chat_client::udp_session::run_udp;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // diagnostics go to stderr so chat output on stdout stays clean;
    // verbosity is controlled through RUST_LOG
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let output: Arc<dyn UserOutput> = Arc::new(ConsoleOutput);

    let result = async {
        let server_addr = args.resolve_server_addr().await?;
        match args.transport {
            Transport::Tcp => run_tcp(server_addr, output).await,
            Transport::Udp => run_udp(server_addr, args.udp_config(), output).await,
        }
    }
    .await;

    match result {
        Ok(Flow::Failure) => ExitCode::FAILURE,
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("ERROR: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
