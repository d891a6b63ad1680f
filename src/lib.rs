pub mod agent_network;
pub mod api;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;

pub use agent_network::{AgentNetwork, TaskResult, TaskStatus};
pub use error::{Error, Result};

use cli::{Cli, Command, ConfigAction, ServersAction};
use config::DATA_DIR;

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let dir = cli.data_dir.clone().unwrap_or_else(|| DATA_DIR.clone());
    let mut ctx = api::load_from_dir(dir);
    let opts = cli.run_options();

    match cli.command {
        Command::Chat { agent_id, message } => {
            api::controller::chat(&ctx, &opts, &agent_id, &message).await
        }
        Command::Task { description } => {
            api::controller::task(&ctx, &opts, &description).await
        }
        Command::Status { ping } => api::controller::status(&ctx, &opts, ping).await,
        Command::Servers { action } => match action {
            ServersAction::List => api::controller::list_servers(&ctx, opts.json),
            ServersAction::Add { name, endpoint, api_key } => {
                api::controller::add_server(&mut ctx, name, endpoint, api_key)
            }
            ServersAction::Remove { name } => api::controller::remove_server(&mut ctx, &name),
        },
        Command::Config { action } => match action {
            ConfigAction::Show => api::controller::show_config(&ctx),
            ConfigAction::Init => api::controller::init_config(&ctx),
        },
    }
}
