use std::collections::BTreeMap;
use anyhow::{bail, Context};
use log::warn;
use serde::Serialize;
use crate::{
    agent_network::AgentNetwork,
    api::{ApiContext, RunOptions},
    client::{hooks, progress}
};

const EVENT_CAPACITY: usize = 64;

fn print<T: Serialize>(value: &T, json: bool, human: impl FnOnce(&T) -> String) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        println!("{}", human(value));
    }
    Ok(())
}

/// Connects the network for a command. Partial failure is tolerated as long as at
/// least one server is up.
async fn connect(ctx: &ApiContext, opts: &RunOptions) -> anyhow::Result<AgentNetwork> {
    let mut network = ctx.network();
    let events = network.manager_mut().subscribe(EVENT_CAPACITY);
    hooks::log_events(events);

    if !network.connect_to_servers(&opts.servers, opts.show_progress).await {
        if network.manager().get_connected_servers().is_empty() {
            bail!("Failed to connect to any MCP server");
        }
        warn!("Continuing with a partial network: {}",
              network.manager().get_connected_servers().join(", "));
    }
    Ok(network)
}

pub async fn chat(ctx: &ApiContext, opts: &RunOptions, agent_id: &str, message: &str) -> anyhow::Result<()> {
    let mut network = connect(ctx, opts).await?;
    let spinner = progress::spinner(format!("Communicating with agent {agent_id}"), opts.show_progress);
    let response = network.chat_with_agent(agent_id, message).await;
    spinner.finish_and_clear();
    network.disconnect_from_servers();

    let response = response.with_context(|| format!("Chat with {agent_id} failed"))?;
    print(&response, opts.json, |r| r.clone())
}

pub async fn task(ctx: &ApiContext, opts: &RunOptions, description: &str) -> anyhow::Result<()> {
    let mut network = connect(ctx, opts).await?;
    let spinner = progress::spinner("Sending task to MCP servers", opts.show_progress);
    let result = network.execute_task(description).await;
    spinner.finish_and_clear();
    network.disconnect_from_servers();

    let result = result.context("Task execution failed")?;
    print(&result, opts.json, |r| r.to_string())
}

#[derive(Serialize)]
struct StatusReport {
    servers: BTreeMap<String, crate::client::ServerStatus>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pings: BTreeMap<String, String>,
}

pub async fn status(ctx: &ApiContext, opts: &RunOptions, ping: bool) -> anyhow::Result<()> {
    let mut network = connect(ctx, opts).await?;
    let mut pings = BTreeMap::new();
    if ping {
        for (name, result) in network.manager().ping_all().await {
            let line = match result {
                Ok(latency) => format!("{}ms", latency.as_millis()),
                Err(e) => e.to_string(),
            };
            pings.insert(name, line);
        }
    }
    let report = StatusReport { servers: network.get_server_status(), pings };
    network.disconnect_from_servers();

    print(&report, opts.json, |report| {
        let mut lines = vec!["Server connection status:".to_owned()];
        for status in report.servers.values() {
            lines.push(format!("  • {status}"));
            if let Some(ping) = report.pings.get(status.server_name()) {
                lines.push(format!("    - Ping: {ping}"));
            }
        }
        lines.join("\n")
    })
}

pub fn list_servers(ctx: &ApiContext, json: bool) -> anyhow::Result<()> {
    let servers = super::get_servers(ctx);
    print(&servers, json, |_| {
        if ctx.servers.is_empty() {
            return format!("No servers registered. Defaults: {}", ctx.config.default_servers.join(", "));
        }
        ctx.servers.sorted().iter()
            .map(|server| format!("  • {server}{}", if server.api_key.is_some() { " [key]" } else { "" }))
            .collect::<Vec<_>>()
            .join("\n")
    })
}

pub fn add_server(
    ctx: &mut ApiContext,
    name: String,
    endpoint: Option<String>,
    api_key: Option<String>
) -> anyhow::Result<()> {
    super::create_server(ctx, name.clone(), endpoint, api_key)?;
    println!("Added server {name}");
    Ok(())
}

pub fn remove_server(ctx: &mut ApiContext, name: &str) -> anyhow::Result<()> {
    super::delete_server(ctx, name)?;
    println!("Removed server {name}");
    Ok(())
}

pub fn show_config(ctx: &ApiContext) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(&ctx.config)?);
    Ok(())
}

pub fn init_config(ctx: &ApiContext) -> anyhow::Result<()> {
    ctx.config.write_to_file(&ctx.save)
        .with_context(|| format!("Failed to write config to {:?}", ctx.save))?;
    println!("Wrote config to {:?}", ctx.save.join("config.json"));
    Ok(())
}
