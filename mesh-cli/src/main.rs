//! Agent-management CLI (spec.md §6): only the commands the core protocol
//! requires — list/status and a one-shot tool call through the registry.

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mesh-cli", about = "MCP Mesh agent-management CLI")]
struct Cli {
    #[arg(long, env = "MESH_REGISTRY_URL", default_value = "http://localhost:7650")]
    registry_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List registered agents, optionally filtered.
    List {
        #[arg(long)]
        capability: Option<String>,
        #[arg(long = "tag")]
        tags: Vec<String>,
        #[arg(long)]
        namespace: Option<String>,
    },
    /// Alias for `list` (spec.md §6 names both `list` and `status`).
    Status {
        #[arg(long)]
        capability: Option<String>,
        #[arg(long = "tag")]
        tags: Vec<String>,
        #[arg(long)]
        namespace: Option<String>,
    },
    /// Resolve `<agent-id>:<tool_name>` via the registry, then invoke it.
    Call {
        /// `<agent-id>:<tool_name>`
        target: String,
        /// JSON-encoded call arguments.
        args: String,
    },
}

#[derive(serde::Deserialize)]
struct RegisteredAgent {
    agent_id: String,
    name: String,
    endpoint: String,
    status: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let cli = Cli::parse();
    let client = reqwest::Client::new();

    match run(&client, &cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:?}");
            ExitCode::from(2)
        }
    }
}

async fn run(client: &reqwest::Client, cli: &Cli) -> Result<ExitCode> {
    match &cli.command {
        Commands::List { capability, tags, namespace } | Commands::Status { capability, tags, namespace } => {
            list_agents(client, &cli.registry_url, capability.as_deref(), tags, namespace.as_deref()).await
        }
        Commands::Call { target, args } => call_tool(client, &cli.registry_url, target, args).await,
    }
}

async fn list_agents(
    client: &reqwest::Client,
    registry_url: &str,
    capability: Option<&str>,
    tags: &[String],
    namespace: Option<&str>,
) -> Result<ExitCode> {
    let mut query: Vec<(&str, String)> = Vec::new();
    if let Some(cap) = capability {
        query.push(("capability", cap.to_string()));
    }
    for tag in tags {
        query.push(("tag", tag.clone()));
    }
    if let Some(ns) = namespace {
        query.push(("namespace", ns.to_string()));
    }

    let response = client
        .get(format!("{registry_url}/agents"))
        .query(&query)
        .send()
        .await
        .context("requesting agent list from registry")?;

    if !response.status().is_success() {
        eprintln!("registry returned {}", response.status());
        return Ok(ExitCode::from(1));
    }

    let agents: Vec<RegisteredAgent> = response.json().await.context("decoding agent list")?;
    for agent in &agents {
        println!("{}\t{}\t{}\t{}", agent.agent_id, agent.name, agent.status, agent.endpoint);
    }
    Ok(ExitCode::SUCCESS)
}

async fn call_tool(client: &reqwest::Client, registry_url: &str, target: &str, args: &str) -> Result<ExitCode> {
    let (agent_id, tool_name) = target
        .split_once(':')
        .context("target must be formatted as <agent-id>:<tool_name>")?;

    let args: serde_json::Value = serde_json::from_str(args).context("args must be valid JSON")?;

    let response = client.get(format!("{registry_url}/agents")).send().await.context("requesting agent list")?;
    if !response.status().is_success() {
        eprintln!("registry returned {}", response.status());
        return Ok(ExitCode::from(1));
    }
    let agents: Vec<RegisteredAgent> = response.json().await.context("decoding agent list")?;
    let Some(agent) = agents.into_iter().find(|a| a.agent_id == agent_id) else {
        eprintln!("agent {agent_id} not found or not resolvable");
        return Ok(ExitCode::from(1));
    };

    let call_body = serde_json::json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "tools/call",
        "params": { "name": tool_name, "arguments": args },
    });

    let call_response = client
        .post(&agent.endpoint)
        .json(&call_body)
        .send()
        .await
        .context("invoking remote tool")?;

    if !call_response.status().is_success() {
        eprintln!("remote call failed with {}", call_response.status());
        return Ok(ExitCode::from(2));
    }

    let body: serde_json::Value = call_response.json().await.context("decoding tool response")?;
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(ExitCode::SUCCESS)
}
