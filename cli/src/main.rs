//! Admin CLI for the gasable hub.
//!
//! `gasable serve` boots the HTTP/SSE server in-process; every other
//! subcommand is a thin REST client against a running server's spec §6
//! surface — there is no embedded/local execution mode, since every
//! operation here already has a `gasable-core` component reachable only
//! through `serve`'s `AppState`.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde_json::Value;

const DEFAULT_URL: &str = "http://127.0.0.1:8080";

#[derive(Parser, Debug)]
#[command(name = "gasable")]
#[command(about = "Admin CLI for the gasable hub")]
struct Args {
    #[command(subcommand)]
    cmd: Command,

    /// Base URL of a running server (default http://127.0.0.1:8080, or GASABLE_URL)
    #[arg(long, global = true, value_name = "URL")]
    url: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP/SSE server
    Serve {
        /// Listen address (default 127.0.0.1:8080)
        #[arg(long, value_name = "ADDR")]
        addr: Option<String>,
    },
    /// Print health and status
    Status,
    /// Manage agents
    Agents {
        #[command(subcommand)]
        sub: AgentsCommand,
    },
    /// List registered tools
    Tools,
    /// Manage secrets
    Keys {
        #[command(subcommand)]
        sub: KeysCommand,
    },
    /// Send a single retrieval query
    Query {
        /// The question text
        text: String,
        /// Number of context hits to request
        #[arg(short = 'k', long)]
        k: Option<usize>,
        #[arg(long)]
        agent_id: Option<String>,
        #[arg(long)]
        namespace: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum AgentsCommand {
    /// List agents in a namespace
    List {
        #[arg(long, default_value = "global")]
        namespace: String,
    },
    /// Register a new agent
    Create {
        #[arg(long)]
        id: String,
        #[arg(long)]
        display_name: String,
        #[arg(long)]
        system_prompt: String,
        #[arg(long, default_value = "global")]
        namespace: String,
    },
}

#[derive(Subcommand, Debug)]
enum KeysCommand {
    /// List stored secret names
    List,
    /// Rotate the MCP bearer token
    RotateMcpToken,
}

fn resolve_url(args: &Args) -> String {
    args.url
        .clone()
        .or_else(|| std::env::var("GASABLE_URL").ok())
        .unwrap_or_else(|| DEFAULT_URL.to_string())
}

fn print_json(value: &Value) {
    println!("{}", serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string()));
}

async fn run_admin(args: Args) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let base = resolve_url(&args);
    let client = reqwest::Client::new();

    let value: Value = match args.cmd {
        Command::Serve { .. } => unreachable!("handled before run_admin"),
        Command::Status => client.get(format!("{base}/api/status")).send().await?.json().await?,
        Command::Agents { sub: AgentsCommand::List { namespace } } => client
            .get(format!("{base}/api/agents"))
            .query(&[("namespace", namespace)])
            .send()
            .await?
            .json()
            .await?,
        Command::Agents { sub: AgentsCommand::Create { id, display_name, system_prompt, namespace } } => client
            .post(format!("{base}/api/agents"))
            .json(&serde_json::json!({
                "id": id,
                "display_name": display_name,
                "system_prompt": system_prompt,
                "namespace": namespace,
            }))
            .send()
            .await?
            .json()
            .await?,
        Command::Tools => client.get(format!("{base}/api/mcp_tools")).send().await?.json().await?,
        Command::Keys { sub: KeysCommand::List } => client.get(format!("{base}/api/keys")).send().await?.json().await?,
        Command::Keys { sub: KeysCommand::RotateMcpToken } => {
            client.post(format!("{base}/api/keys/mcp_token/rotate")).send().await?.json().await?
        }
        Command::Query { text, k, agent_id, namespace } => client
            .post(format!("{base}/api/query"))
            .json(&serde_json::json!({ "q": text, "k": k, "agent_id": agent_id, "namespace": namespace }))
            .send()
            .await?
            .json()
            .await?,
    };

    print_json(&value);
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    config::load_and_apply("gasable", None::<&std::path::Path>).ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    if let Command::Serve { addr } = &args.cmd {
        if let Err(e) = serve::run_serve(addr.as_deref()).await {
            eprintln!("gasable: serve error: {e}");
            return ExitCode::FAILURE;
        }
        return ExitCode::SUCCESS;
    }

    if let Err(e) = run_admin(args).await {
        eprintln!("gasable: {e}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_flag_overrides_env_and_default() {
        let args = Args::parse_from(["gasable", "--url", "http://example.test", "status"]);
        assert_eq!(resolve_url(&args), "http://example.test");
    }

    #[test]
    fn missing_url_flag_falls_back_to_default() {
        std::env::remove_var("GASABLE_URL");
        let args = Args::parse_from(["gasable", "status"]);
        assert_eq!(resolve_url(&args), DEFAULT_URL);
    }

    #[test]
    fn agents_list_defaults_namespace_to_global() {
        let args = Args::parse_from(["gasable", "agents", "list"]);
        match args.cmd {
            Command::Agents { sub: AgentsCommand::List { namespace } } => assert_eq!(namespace, "global"),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn query_accepts_optional_k_and_agent_id() {
        let args = Args::parse_from(["gasable", "query", "what's the weather", "-k", "3", "--agent-id", "support"]);
        match args.cmd {
            Command::Query { text, k, agent_id, .. } => {
                assert_eq!(text, "what's the weather");
                assert_eq!(k, Some(3));
                assert_eq!(agent_id.as_deref(), Some("support"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn serve_subcommand_parses_without_a_message() {
        let args = Args::parse_from(["gasable", "serve", "--addr", "127.0.0.1:9000"]);
        match args.cmd {
            Command::Serve { addr } => assert_eq!(addr.as_deref(), Some("127.0.0.1:9000")),
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
