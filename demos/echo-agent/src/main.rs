//! Echo agent
//!
//! Serves the HTTP chat channel and answers every message with a streamed
//! progress update followed by an echo. `/tools` lists the discovered
//! workspace tools and `/tool <name> <json>` runs one.

use std::path::PathBuf;
use std::sync::Arc;

use agent_runtime::channels::{HttpChannel, HttpChannelConfig};
use agent_runtime::config::{RuntimeConfig, load_config};
use agent_runtime::kernel::{ChannelManager, MessageBus};
use agent_runtime::primitives::{InboundMessage, OutboundMessage};
use agent_runtime::telemetry::{TracingOptions, init_tracing};
use agent_runtime::tools::{DiscoveryOptions, ToolRegistry, load_workspace_tools};
use anyhow::Context;
use clap::Parser;
use serde_json::{Map, Value};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Echo agent CLI
#[derive(Parser, Debug)]
#[command(name = "echo-agent")]
#[command(about = "Streams echo replies over HTTP and runs workspace tools")]
#[command(version)]
struct Cli {
    /// Configuration file path (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Workspace directory, overriding the configured one
    #[arg(short, long)]
    workspace: Option<PathBuf>,

    /// HTTP port, overriding the configured one
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = load_config(cli.config.as_deref())?;
    if let Some(workspace) = cli.workspace {
        config.workspace = workspace;
    }
    if let Some(port) = cli.port {
        config.channels.http.port = port;
    }

    init_tracing(&TracingOptions {
        filter: config.logging.filter.clone(),
        json: config.logging.json,
    })?;

    let registry = Arc::new(discover_tools(&config));
    let bus = Arc::new(MessageBus::new());
    let manager = ChannelManager::new(Arc::clone(&bus));

    if config.channels.http.enabled {
        let http = &config.channels.http;
        manager.register(Arc::new(HttpChannel::new(
            HttpChannelConfig {
                host: http.host.clone(),
                port: http.port,
                allow_from: http.allow_from.clone(),
                stream_timeout: http.stream_timeout(),
            },
            Arc::clone(&bus),
        )));
    } else {
        warn!("http channel disabled; no messages will arrive");
    }

    manager.start_all();
    let agent = tokio::spawn(run_agent(Arc::clone(&bus), Arc::clone(&registry)));
    info!(workspace = %config.workspace.display(), tools = registry.len(), "echo agent ready");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    info!("shutting down");

    manager.stop_all().await;
    agent.await.context("agent loop panicked")?;
    Ok(())
}

fn discover_tools(config: &RuntimeConfig) -> ToolRegistry {
    let registry = ToolRegistry::new();
    if !config.tools.enabled {
        return registry;
    }

    let options = DiscoveryOptions {
        manifest_file: config.tools.manifest_file.clone(),
        entry_point: config.tools.entry_point.clone(),
        default_timeout: config.tools.default_timeout(),
    };
    let report = load_workspace_tools(&config.workspace, &registry, &options);
    info!(
        registered = report.count(),
        skipped = report.skipped.len(),
        "workspace tools loaded"
    );
    registry
}

/// Answers each inbound message on its own task so a slow tool call in one
/// session does not hold up the others.
async fn run_agent(bus: Arc<MessageBus>, registry: Arc<ToolRegistry>) {
    let mut turns = JoinSet::new();
    while let Some(inbound) = bus.consume_inbound().await {
        turns.spawn(handle_turn(Arc::clone(&bus), Arc::clone(&registry), inbound));
        while turns.try_join_next().is_some() {}
    }
    while turns.join_next().await.is_some() {}
    info!("agent loop finished");
}

async fn handle_turn(
    bus: Arc<MessageBus>,
    registry: Arc<ToolRegistry>,
    inbound: InboundMessage,
) {
    debug!(
        session = %inbound.session_key(),
        received_at = %inbound.received_at(),
        "agent turn started"
    );
    if bus
        .publish_outbound(OutboundMessage::progress_to(&inbound, "thinking…"))
        .is_err()
    {
        return;
    }
    let reply = respond(&registry, inbound.content()).await;
    if bus
        .publish_outbound(OutboundMessage::reply_to(&inbound, reply))
        .is_err()
    {
        debug!(session = %inbound.session_key(), "bus closed before the reply was sent");
    }
}

#[derive(Debug, PartialEq)]
enum Command {
    ListTools,
    Call {
        name: String,
        args: Map<String, Value>,
    },
    Invalid(String),
    Echo(String),
}

impl Command {
    fn parse(content: &str) -> Self {
        let content = content.trim();
        if content == "/tools" {
            return Self::ListTools;
        }
        let Some(rest) = content.strip_prefix("/tool ") else {
            return Self::Echo(content.to_owned());
        };

        let rest = rest.trim();
        let (name, raw_args) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
        let raw_args = raw_args.trim();
        if raw_args.is_empty() {
            return Self::Call {
                name: name.to_owned(),
                args: Map::new(),
            };
        }
        match serde_json::from_str::<Value>(raw_args) {
            Ok(Value::Object(args)) => Self::Call {
                name: name.to_owned(),
                args,
            },
            _ => Self::Invalid("Error: tool arguments must be a JSON object".into()),
        }
    }
}

async fn respond(registry: &ToolRegistry, content: &str) -> String {
    match Command::parse(content) {
        Command::ListTools => list_tools(registry),
        Command::Call { name, args } => match registry.execute(&name, &args).await {
            Ok(outcome) => {
                debug!(tool = %name, ok = outcome.is_success(), "tool call finished");
                outcome.to_text()
            }
            Err(err) => format!("Error: {err}"),
        },
        Command::Invalid(message) => message,
        Command::Echo(text) => format!("You said: {text}"),
    }
}

fn list_tools(registry: &ToolRegistry) -> String {
    let names = registry.names();
    if names.is_empty() {
        return "No tools registered.".into();
    }
    names
        .iter()
        .filter_map(|name| registry.get(name))
        .map(|tool| format!("- {}: {}", tool.name(), tool.description()))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn plain_text_is_echoed() {
        assert_eq!(Command::parse("  hi there "), Command::Echo("hi there".into()));
    }

    #[test]
    fn tool_commands_parse_arguments() {
        assert_eq!(Command::parse("/tools"), Command::ListTools);
        assert_eq!(
            Command::parse("/tool clock"),
            Command::Call {
                name: "clock".into(),
                args: Map::new(),
            }
        );

        let Value::Object(args) = json!({"q": "rust"}) else {
            unreachable!()
        };
        assert_eq!(
            Command::parse(r#"/tool search {"q": "rust"}"#),
            Command::Call {
                name: "search".into(),
                args,
            }
        );
        assert!(matches!(
            Command::parse("/tool search [1]"),
            Command::Invalid(_)
        ));
    }

    #[tokio::test]
    async fn turns_run_concurrently() {
        let bus = Arc::new(MessageBus::new());
        let registry = Arc::new(ToolRegistry::new());
        let agent = tokio::spawn(run_agent(Arc::clone(&bus), registry));

        for chat in ["a", "b"] {
            bus.publish_inbound(InboundMessage::new("http", "desktop", chat, "hi"))
                .unwrap();
        }

        let mut replies = Vec::new();
        while replies.len() < 2 {
            let message = bus.consume_outbound().await.unwrap();
            if !message.is_progress() {
                replies.push((message.chat_id().to_owned(), message.content().to_owned()));
            }
        }
        replies.sort();
        assert_eq!(
            replies,
            [
                ("a".to_owned(), "You said: hi".to_owned()),
                ("b".to_owned(), "You said: hi".to_owned()),
            ]
        );

        bus.close();
        agent.await.unwrap();
    }

    #[tokio::test]
    async fn unknown_tool_is_reported_as_text() {
        let registry = ToolRegistry::new();
        assert_eq!(list_tools(&registry), "No tools registered.");

        let reply = respond(&registry, "/tool ghost").await;
        assert!(reply.starts_with("Error: "), "{reply}");
    }
}
