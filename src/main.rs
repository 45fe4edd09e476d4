use clap::Parser;

#[tokio::main]
async fn main() {
    let cli = relaygate::cli::Cli::parse();
    if let Err(e) = relaygate::cmd::dispatch(cli).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
