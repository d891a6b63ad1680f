use clap::Parser;
use agentworks_lib::cli::Cli;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    env_logger::builder()
        .filter_level(cli.log_level())
        .parse_default_env()
        .init();

    if let Err(e) = agentworks_lib::run(cli).await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}
