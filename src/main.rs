mod doctor;

use std::collections::HashMap;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{CommandFactory, Parser, Subcommand};
use tokio::sync::RwLock;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use nexus_core::config::{AppConfig, McpServerConfig};
use nexus_core::event::EventBus;
use nexus_core::state::{AgentName, WorkflowStatus};
use nexus_core::traits::{KvStore, LlmClient};
use nexus_core::types::AgentEvent;

use nexus_agent::{AgentRuntime, TurnOutcome, TurnRequest, WorkflowRunner};
use nexus_mcp::McpClientManager;
use nexus_memory::{AgentHistoryStore, MemoryStore, RedisStore, WorkflowStateStore};
use nexus_tools::ToolRegistry;

/// Name of the bundled calculator MCP server.
const CALCULATOR_SERVER: &str = "calculator";

#[derive(Parser)]
#[command(name = "nexus", version, about = "Farm advisory agents: market prices and government schemes")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "nexus.toml")]
    config: PathBuf,

    /// Keep history and workflow state in process memory instead of Redis
    #[arg(long)]
    memory: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single turn and exit
    Run {
        /// Workflow ID (auto-generated if not provided)
        #[arg(short, long)]
        workflow: Option<String>,
        /// market_price_agent or gov_scheme_agent
        #[arg(short, long)]
        agent: AgentName,
        /// Human-readable workflow name
        #[arg(long)]
        name: Option<String>,
        /// The user input; read from stdin when empty
        #[arg(trailing_var_arg = true)]
        prompt: Vec<String>,
    },
    /// Start interactive REPL mode
    Repl {
        #[arg(short, long)]
        workflow: Option<String>,
        #[arg(short, long, default_value = "market_price_agent")]
        agent: AgentName,
    },
    /// Show the checkpointed state of a workflow
    Status {
        #[arg(short, long)]
        workflow: String,
    },
    /// Show an agent's conversation history for a workflow
    History {
        #[arg(short, long)]
        workflow: String,
        #[arg(short, long)]
        agent: AgentName,
    },
    /// Serve the calculator tools over MCP stdio
    Calculator,
    /// Run system health checks
    Doctor,
    /// Show current configuration
    Config,
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout belongs to MCP framing when serving the calculator
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("nexus=info,warn")),
        )
        .with_writer(io::stderr)
        .with_target(false)
        .init();

    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            warn!(error = %e, "Failed to read .env");
        }
    }

    let cli = Cli::parse();

    match &cli.command {
        Some(Commands::Completions { shell }) => {
            let mut cmd = Cli::command();
            clap_complete::generate(*shell, &mut cmd, "nexus", &mut io::stdout());
            return Ok(());
        }
        Some(Commands::Calculator) => {
            nexus_mcp::calculator::serve_stdio().await?;
            return Ok(());
        }
        _ => {}
    }

    let config = load_config(&cli.config)?;

    match &cli.command {
        Some(Commands::Config) => {
            println!("{}", toml::to_string_pretty(&config)?);
            return Ok(());
        }
        Some(Commands::Doctor) => {
            println!("Nexus Doctor");
            println!("============");
            let issues = doctor::run_doctor(&config).await;
            if issues > 0 {
                std::process::exit(1);
            }
            return Ok(());
        }
        Some(Commands::Status { workflow }) => {
            let kv = open_store(&config, cli.memory).await?;
            print_status(&WorkflowStateStore::new(kv, config.redis.ttl_secs), workflow).await?;
            return Ok(());
        }
        Some(Commands::History { workflow, agent }) => {
            let kv = open_store(&config, cli.memory).await?;
            let history = AgentHistoryStore::new(kv, config.redis.ttl_secs)
                .load(workflow, agent.as_str())
                .await;
            println!("{}", serde_json::to_string_pretty(&history)?);
            return Ok(());
        }
        _ => {}
    }

    // Set up components
    let kv = open_store(&config, cli.memory).await?;
    let http = nexus_tools::build_http_client(&config)?;
    let llm: Arc<dyn LlmClient> =
        Arc::new(nexus_llm::create_retrying_client(&config, http.clone())?);
    let event_bus = Arc::new(EventBus::default());

    let mut tools = ToolRegistry::new();
    nexus_tools::register_builtins(&mut tools, &config, http);

    let mcp_manager = Arc::new(McpClientManager::new());
    let servers = mcp_servers(&config);
    for (name, server_config) in &servers {
        if !server_config.auto_connect {
            continue;
        }
        match nexus_mcp::connect_and_register(&mcp_manager, name, server_config, &mut tools).await
        {
            Ok(count) => info!(server = %name, tools = count, "MCP server connected"),
            Err(e) => error!(server = %name, error = %e, "Failed to connect MCP server"),
        }
    }
    let tools = Arc::new(RwLock::new(tools));
    let timeouts = servers
        .iter()
        .map(|(name, c)| (name.clone(), c.timeout_secs))
        .collect();
    spawn_mcp_listener(&mcp_manager, &tools, timeouts);

    let runtime = Arc::new(AgentRuntime::new(&config, llm, tools.clone(), event_bus.clone()));
    let cancel = runtime.cancel_token();
    let runner = WorkflowRunner::with_runtime(runtime, kv, config.redis.ttl_secs);

    let result = match cli.command {
        Some(Commands::Run {
            workflow,
            agent,
            name,
            prompt,
        }) => {
            let text = if prompt.is_empty() {
                let stdin = io::stdin();
                let lines: Vec<String> = stdin.lock().lines().map_while(|l| l.ok()).collect();
                lines.join("\n")
            } else {
                prompt.join(" ")
            };
            let mut request =
                TurnRequest::new(workflow_or_new(workflow), text, Some(agent));
            if let Some(name) = name {
                request = request.with_workflow_name(name);
            }
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    cancel.cancel();
                }
            });
            run_once(&runner, &event_bus, request).await
        }
        Some(Commands::Repl { workflow, agent }) => {
            run_repl(&runner, &event_bus, &tools, &mcp_manager, workflow_or_new(workflow), agent)
                .await
        }
        None => {
            run_repl(
                &runner,
                &event_bus,
                &tools,
                &mcp_manager,
                workflow_or_new(None),
                AgentName::MarketPriceAgent,
            )
            .await
        }
        Some(_) => Ok(()),
    };

    // Disconnect MCP servers on shutdown
    mcp_manager.disconnect_all().await;
    result
}

fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    if path.exists() {
        return Ok(AppConfig::load(path)?);
    }
    let home_config = dirs_home().map(|h| h.join(".nexus").join("config.toml"));
    match home_config {
        Some(path) if path.exists() => {
            info!(path = %path.display(), "Loading config from home directory");
            Ok(AppConfig::load(&path)?)
        }
        _ => {
            info!("No config file found, reading configuration from the environment");
            Ok(AppConfig::from_env())
        }
    }
}

async fn open_store(config: &AppConfig, in_memory: bool) -> anyhow::Result<Arc<dyn KvStore>> {
    if in_memory {
        warn!("Using in-memory store; history is lost on exit");
        return Ok(Arc::new(MemoryStore::new()));
    }
    Ok(Arc::new(RedisStore::connect(&config.redis.url).await?))
}

/// Configured servers plus the bundled calculator, unless the config
/// already defines a server under that name.
fn mcp_servers(config: &AppConfig) -> Vec<(String, McpServerConfig)> {
    let mut servers: Vec<(String, McpServerConfig)> = config
        .mcp
        .as_ref()
        .map(|m| m.servers.clone().into_iter().collect())
        .unwrap_or_default();
    if !servers.iter().any(|(name, _)| name == CALCULATOR_SERVER) {
        match std::env::current_exe() {
            Ok(exe) => servers.push((
                CALCULATOR_SERVER.to_string(),
                McpServerConfig::bundled_calculator(exe.display().to_string()),
            )),
            Err(e) => warn!(error = %e, "Cannot locate own executable, calculator disabled"),
        }
    }
    servers.sort_by(|a, b| a.0.cmp(&b.0));
    servers
}

fn spawn_mcp_listener(
    manager: &Arc<McpClientManager>,
    tools: &Arc<RwLock<ToolRegistry>>,
    timeouts: HashMap<String, u64>,
) {
    let mut changed_rx = manager.subscribe_tool_changes();
    let manager = manager.clone();
    let tools = tools.clone();
    tokio::spawn(async move {
        while let Ok(server) = changed_rx.recv().await {
            info!(server = %server, "MCP tools changed, refreshing");
            let timeout_secs = timeouts.get(&server).copied().unwrap_or(30);
            let mut registry = tools.write().await;
            match nexus_mcp::register_from(&manager, &server, timeout_secs, &mut registry).await {
                Ok(count) => info!(server = %server, tools = count, "MCP tools refreshed"),
                Err(e) => error!(server = %server, error = %e, "Failed to refresh MCP tools"),
            }
        }
    });
}

fn workflow_or_new(workflow: Option<String>) -> String {
    workflow.unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}

/// Print tool activity to stderr while a turn runs.
fn spawn_event_printer(event_bus: &EventBus) -> tokio::task::JoinHandle<()> {
    let mut rx = event_bus.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = rx.recv().await {
            match event {
                AgentEvent::ToolStart { name, .. } => eprintln!("[tool: {}]", name),
                AgentEvent::ToolEnd { name, result } => {
                    let tag = if result.is_error { "ERROR" } else { "ok" };
                    eprintln!("[{}: {}] {}", name, tag, truncate(&result.content, 200));
                }
                AgentEvent::OutputRejected { attempt, reason } => {
                    eprintln!("[answer rejected #{}: {}]", attempt, truncate(&reason, 200));
                }
                AgentEvent::RunComplete {
                    total_turns,
                    input_tokens,
                    output_tokens,
                    ..
                } => {
                    eprintln!(
                        "[done: {} turns, {}in/{}out tokens]",
                        total_turns, input_tokens, output_tokens
                    );
                }
                AgentEvent::RunError { error } => eprintln!("[error: {}]", error),
                AgentEvent::HistorySaved {
                    persisted: false, ..
                } => eprintln!("[warning: history not saved]"),
                _ => {}
            }
        }
    })
}

async fn run_once(
    runner: &WorkflowRunner,
    event_bus: &EventBus,
    request: TurnRequest,
) -> anyhow::Result<()> {
    let printer = spawn_event_printer(event_bus);
    let outcome = runner.run_turn(request).await;
    printer.abort();

    let outcome = outcome?;
    print_outcome(&outcome)?;
    if outcome.status == WorkflowStatus::Failed {
        std::process::exit(2);
    }
    Ok(())
}

fn print_outcome(outcome: &TurnOutcome) -> anyhow::Result<()> {
    match outcome.state.agent_output() {
        Some(output) => {
            println!("{}", output.full_response());
            eprintln!("{}", serde_json::to_string_pretty(&output.payload())?);
        }
        None => println!("No agent handled this turn."),
    }
    eprintln!(
        "[workflow {} | {} | {}]",
        outcome.state.workflow_id,
        outcome.status,
        outcome.visited.join(" -> ")
    );
    Ok(())
}

async fn print_status(store: &WorkflowStateStore, workflow_id: &str) -> anyhow::Result<()> {
    let routing = store.load_routing_state(workflow_id).await;
    let summary = serde_json::json!({
        "workflow_id": workflow_id,
        "workflow_name": store.load_workflow_name(workflow_id).await,
        "status": store.load_status(workflow_id).await,
        "sub_agent": store.load_sub_agent(workflow_id).await,
        "routing_state": routing,
        "final_output": store.load_final_output(workflow_id).await,
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

async fn run_repl(
    runner: &WorkflowRunner,
    event_bus: &EventBus,
    tools: &Arc<RwLock<ToolRegistry>>,
    mcp_manager: &Arc<McpClientManager>,
    workflow_id: String,
    initial_agent: AgentName,
) -> anyhow::Result<()> {
    let mut agent = initial_agent;
    println!("Nexus v{}", env!("CARGO_PKG_VERSION"));
    println!("Workflow: {}", workflow_id);
    println!("Agent: {}", agent);
    println!("Type /help for commands, /quit to exit.\n");

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("{}> ", agent);
        stdout.flush()?;

        let mut input = String::new();
        if stdin.lock().read_line(&mut input)? == 0 {
            break; // EOF
        }

        let input = input.trim();
        if input.is_empty() {
            continue;
        }

        let parts: Vec<&str> = input.split_whitespace().collect();

        match parts[0] {
            "/quit" | "/exit" | "/q" => {
                println!("Goodbye!");
                break;
            }
            "/help" => {
                println!("  /agent <name>   switch agent (market_price_agent, gov_scheme_agent)");
                println!("  /status         show workflow status and routing");
                println!("  /history        show this agent's history");
                println!("  /tools          list registered tools");
                println!("  /quit           exit");
                continue;
            }
            "/agent" => {
                match parts.get(1).map(|s| s.parse::<AgentName>()) {
                    Some(Ok(next)) => {
                        agent = next;
                        println!("Agent: {}", agent);
                    }
                    Some(Err(e)) => println!("{}", e),
                    None => println!("Agent: {}", agent),
                }
                continue;
            }
            "/status" => {
                let routing = runner.routing(&workflow_id).await;
                println!("Status: {}", runner.status(&workflow_id).await);
                println!("Sub agent: {}", runner.sub_agent(&workflow_id).await);
                println!(
                    "Routing: previous={} next={}",
                    routing.previous_agent, routing.next_agent
                );
                continue;
            }
            "/history" => {
                let history = runner.history(&workflow_id, agent).await;
                println!("{}", serde_json::to_string_pretty(&history)?);
                continue;
            }
            "/tools" => {
                let registry = tools.read().await;
                println!("Tools: {}", registry.list().join(", "));
                let servers = mcp_manager.connected_servers().await;
                if servers.is_empty() {
                    println!("MCP: no servers connected");
                } else {
                    println!("MCP: {}", servers.join(", "));
                }
                continue;
            }
            _ => {}
        }

        let printer = spawn_event_printer(event_bus);
        let outcome = runner
            .run_turn(TurnRequest::new(workflow_id.clone(), input, Some(agent)))
            .await;
        printer.abort();
        match outcome {
            Ok(outcome) => print_outcome(&outcome)?,
            Err(e) => eprintln!("[error: {}]", e),
        }
        println!();
    }

    Ok(())
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
