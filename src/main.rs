use chat_gateway::adapters::AdapterCache;
use chat_gateway::config::ConfigManager;
use chat_gateway::domain::models::{Message, TurnEvent, TurnRequest};
use chat_gateway::domain::orchestrator::ResponseOrchestrator;
use chat_gateway::domain::ports::ToolService;
use chat_gateway::mcp::McpRegistry;
use clap::{Args, Parser, Subcommand};
use serde_json::{Map, Value};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

type CliResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Chat gateway for OpenAI-compatible, Anthropic and Ollama models with MCP tools
#[derive(Parser, Debug)]
#[command(name = "chat-gateway")]
#[command(version, about)]
struct Cli {
    /// Config file path (YAML or JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Stream one chat turn, running any tool calls the model makes
    Chat(TurnArgs),

    /// Ask for a single complete answer without tool execution
    Ask(TurnArgs),

    /// List configured models and whether they can be used
    Models,

    /// List the enabled MCP namespaces
    Namespaces,

    /// List the tools an MCP namespace exposes
    Tools {
        /// Namespace identifier (the `value` of an mcp_options entry)
        namespace: String,
    },

    /// Call a tool directly and print its result
    Call {
        namespace: String,
        function: String,
        /// Parameters as a JSON object
        params: Option<String>,
    },

    /// Show whether models and namespaces are usable
    Health,
}

#[derive(Args, Debug)]
struct TurnArgs {
    /// Model name (defaults to default_model)
    #[arg(short, long)]
    model: Option<String>,

    /// Enable an MCP namespace for this turn (repeatable)
    #[arg(long = "mcp")]
    mcp: Vec<String>,

    /// System prompt
    #[arg(long)]
    system: Option<String>,

    /// The user message
    message: String,
}

impl TurnArgs {
    fn into_request(self) -> TurnRequest {
        let mut messages = Vec::new();
        if let Some(system) = self.system {
            messages.push(Message::system(system));
        }
        messages.push(Message::user(self.message));
        TurnRequest {
            messages,
            model: self.model,
            selected_mcp: self.mcp,
        }
    }
}

#[tokio::main]
async fn main() -> CliResult {
    let cli = Cli::parse();

    let default_level = match cli.verbose {
        0 => "chat_gateway=info",
        1 => "chat_gateway=debug",
        _ => "chat_gateway=trace",
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let config = Arc::new(ConfigManager::load(cli.config.as_deref())?);
    let settings = config.settings().clone();
    let registry = Arc::new(McpRegistry::new(config.clone(), settings.tool_call_timeout()));

    match cli.command {
        Commands::Chat(args) => {
            let orchestrator = ResponseOrchestrator::new(
                config.clone(),
                Arc::new(AdapterCache::new(settings.request_timeout())),
                registry.clone(),
            )
            .with_settings(settings.orchestrator());

            let (tx, mut rx) = mpsc::channel::<TurnEvent>(64);
            let printer = tokio::spawn(async move {
                let mut stdout = std::io::stdout();
                while let Some(event) = rx.recv().await {
                    let _ = write!(stdout, "{}", event.as_text());
                    let _ = stdout.flush();
                }
                let _ = writeln!(stdout);
            });

            let outcome = orchestrator.stream_turn(args.into_request(), tx).await;
            let _ = printer.await;
            registry.disconnect_all().await;
            outcome?;
        }
        Commands::Ask(args) => {
            let orchestrator = ResponseOrchestrator::new(
                config.clone(),
                Arc::new(AdapterCache::new(settings.request_timeout())),
                registry.clone(),
            );
            let text = orchestrator.respond(args.into_request()).await?;
            println!("{}", text);
        }
        Commands::Models => {
            let default_model = config.config().default_model.clone();
            for model in config.available_models() {
                let marker = if model.name == default_model { "*" } else { " " };
                let status = if model.available { "available" } else { "no api key" };
                println!(
                    "{} {:<20} {:<10} {:<32} {}",
                    marker, model.name, model.provider, model.model_id, status
                );
            }
        }
        Commands::Namespaces => {
            let namespaces = config.enabled_namespaces();
            if namespaces.is_empty() {
                println!("No MCP namespaces enabled");
            }
            for namespace in namespaces {
                let endpoint = namespace.endpoint.as_deref().unwrap_or("(no mcp_url)");
                println!("{:<20} {:<24} {}", namespace.id, namespace.label, endpoint);
                if let Some(description) = namespace.description.as_deref() {
                    println!("    {}", description);
                }
            }
        }
        Commands::Tools { namespace } => {
            let tools = registry.list_tools(&namespace).await?;
            if tools.is_empty() {
                println!("No tools available for {}", namespace);
            }
            for tool in tools {
                println!("{}", tool.name);
                if !tool.description.is_empty() {
                    println!("    {}", tool.description);
                }
                for param in tool.parameter_specs() {
                    let mark = if param.required { "required" } else { "optional" };
                    println!("    - {} ({}, {}) {}", param.name, param.kind, mark, param.description);
                }
            }
        }
        Commands::Call {
            namespace,
            function,
            params,
        } => {
            let parameters: Map<String, Value> = match params {
                Some(raw) => serde_json::from_str(&raw)?,
                None => Map::new(),
            };
            let result = registry.call_tool(&namespace, &function, parameters).await?;
            let result = chat_gateway::domain::executor::normalize_result(result);
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Commands::Health => {
            let models_ok = config.is_healthy();
            let namespaces_ok = config.namespaces_healthy();
            println!("models:     {}", if models_ok { "ok" } else { "no usable model" });
            println!(
                "namespaces: {}",
                if namespaces_ok { "ok" } else { "enabled namespace without mcp_url" }
            );
            if !(models_ok && namespaces_ok) {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
