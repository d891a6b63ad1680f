use std::path::PathBuf;
use clap::{ArgAction, Parser, Subcommand};
use log::LevelFilter;
use crate::api::RunOptions;

#[derive(Parser, Debug)]
#[command(name = "agentworks", version, about = "MCP Agent Network CLI")]
pub struct Cli {
    /// Directory holding config.json and servers.json
    #[arg(long, global = true, env = "AGENTWORKS_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Servers to connect to (comma separated); defaults to every registered server,
    /// or the configured defaults when none are registered
    #[arg(long, global = true, value_delimiter = ',')]
    pub servers: Vec<String>,

    /// Hide progress bars and spinners
    #[arg(long, global = true)]
    pub no_progress: bool,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Chat with an agent
    Chat {
        /// ID of the agent to chat with
        agent_id: String,
        /// Message to send to the agent
        message: String,
    },
    /// Execute a task across the connected servers
    Task {
        /// Description of the task to execute
        description: String,
    },
    /// Connect and report the status of every server
    Status {
        /// Also measure round-trip latency
        #[arg(long)]
        ping: bool,
    },
    /// Manage the server registry
    Servers {
        #[command(subcommand)]
        action: ServersAction,
    },
    /// Inspect or initialise the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ServersAction {
    List,
    Add {
        name: String,
        /// JSON-RPC endpoint; omit for an in-process loopback server
        #[arg(long)]
        endpoint: Option<String>,
        #[arg(long, env = "AGENTWORKS_API_KEY")]
        api_key: Option<String>,
    },
    Remove {
        name: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    Show,
    Init,
}

impl Cli {
    pub fn log_level(&self) -> LevelFilter {
        match self.verbose {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            2 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }

    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            servers: self.servers.clone(),
            show_progress: !self.no_progress && !self.json,
            json: self.json,
        }
    }
}
