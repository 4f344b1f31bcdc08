//! Dev CLI: registers a single agent against a freshly started, in-memory
//! bus and prints the result as JSON. Ported from `spawn_agent.py`'s
//! one-shot `EnhancedAgentBus` spawn into a `clap` binary; not part of the
//! core message-processing kernel.

use clap::Parser;
use serde::Serialize;

use agent_governance_bus::config::BusConfig;
use agent_governance_bus::default_bus;

/// Register an agent with the bus and print the resulting record as JSON.
#[derive(Parser)]
#[command(name = "spawn-agent")]
#[command(about = "Register a new agent against an in-memory agent bus")]
struct Cli {
    /// Agent type, e.g. "coder"
    agent_type: String,

    /// Agent display name; the agent's id is derived from this.
    name: String,

    /// Comma-separated list of capabilities.
    #[arg(short, long, default_value = "")]
    capabilities: String,

    /// Tenant the agent belongs to.
    #[arg(short, long, default_value = "default")]
    tenant: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SpawnResult {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    agent_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    agent_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    capabilities: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let capabilities: Vec<String> = cli
        .capabilities
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect();

    let agent_id = format!("{}-{}", cli.agent_type, cli.name.to_lowercase().replace(' ', "-"));

    let result = spawn(&cli.agent_type, &agent_id, capabilities, &cli.tenant).await;
    let success = result.success;
    println!("{}", serde_json::to_string_pretty(&result).expect("serializable result"));
    std::process::exit(if success { 0 } else { 1 });
}

async fn spawn(agent_type: &str, agent_id: &str, capabilities: Vec<String>, tenant: &str) -> SpawnResult {
    let bus = match default_bus(BusConfig::from_env()) {
        Ok(bus) => bus,
        Err(e) => {
            return SpawnResult {
                success: false,
                agent_id: None,
                agent_type: None,
                capabilities: None,
                error: Some(e.to_string()),
            }
        }
    };

    if let Err(e) = bus.start().await {
        return SpawnResult {
            success: false,
            agent_id: None,
            agent_type: None,
            capabilities: None,
            error: Some(e.to_string()),
        };
    }

    let outcome = bus
        .register(agent_id, agent_type, capabilities.clone(), tenant, None)
        .await;
    let _ = bus.stop().await;

    match outcome {
        Ok(record) => SpawnResult {
            success: true,
            agent_id: Some(record.agent_id),
            agent_type: Some(record.agent_type),
            capabilities: Some(record.capabilities),
            error: None,
        },
        Err(e) => SpawnResult {
            success: false,
            agent_id: None,
            agent_type: None,
            capabilities: None,
            error: Some(e.to_string()),
        },
    }
}
