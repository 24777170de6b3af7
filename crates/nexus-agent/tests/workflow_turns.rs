use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::RwLock;

use nexus_agent::{AgentDefinition, AgentExecutor, AgentRuntime, TurnRequest, WorkflowRunner};
use nexus_core::config::AppConfig;
use nexus_core::error::{NexusError, Result};
use nexus_core::event::EventBus;
use nexus_core::output::AgentOutput;
use nexus_core::state::{AgentName, WorkflowStatus, END};
use nexus_core::traits::{KvStore, LlmClient};
use nexus_core::types::ToolResult;
use nexus_memory::MemoryStore;
use nexus_test_utils::{test_model_config, MockLlmClient, RecordingTool};
use nexus_tools::ToolRegistry;

/// Answers every prompt with a market output, counting calls.
struct Canned {
    agent: AgentName,
    calls: AtomicUsize,
    delay: Duration,
}

impl Canned {
    fn new(agent: AgentName) -> Arc<Self> {
        Self::slow(agent, Duration::ZERO)
    }

    fn slow(agent: AgentName, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            agent,
            calls: AtomicUsize::new(0),
            delay,
        })
    }
}

impl AgentExecutor for Canned {
    fn execute(&self, _workflow_id: &str, prompt: String) -> BoxFuture<'_, Result<AgentOutput>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let answer = format!("{} answered {} chars", self.agent, prompt.len());
            Ok(match self.agent {
                AgentName::MarketPriceAgent => {
                    AgentOutput::MarketPrice(serde_json::from_value(serde_json::json!({
                        "crop": "onion",
                        "full_response": answer,
                    }))?)
                }
                AgentName::GovSchemeAgent => {
                    AgentOutput::GovScheme(serde_json::from_value(serde_json::json!({
                        "full_response": answer,
                    }))?)
                }
            })
        })
    }
}

struct Harness {
    runner: WorkflowRunner,
    market: Arc<Canned>,
    gov: Arc<Canned>,
    kv: Arc<MemoryStore>,
}

fn harness_with(market: Arc<Canned>, gov: Arc<Canned>) -> Harness {
    let kv = Arc::new(MemoryStore::new());
    let agents: Vec<(AgentDefinition, Arc<dyn AgentExecutor>)> = vec![
        (AgentDefinition::market_price(), market.clone()),
        (AgentDefinition::gov_scheme(), gov.clone()),
    ];
    let runner = WorkflowRunner::with_agents(agents, kv.clone() as Arc<dyn KvStore>, 3600, None);
    Harness {
        runner,
        market,
        gov,
        kv,
    }
}

fn harness() -> Harness {
    harness_with(
        Canned::new(AgentName::MarketPriceAgent),
        Canned::new(AgentName::GovSchemeAgent),
    )
}

#[tokio::test]
async fn market_turn_visits_only_market_subgraph() {
    let h = harness();
    let outcome = h
        .runner
        .run_turn(TurnRequest::new("wf-1", "onion price in Nashik", Some(AgentName::MarketPriceAgent)))
        .await
        .unwrap();

    assert_eq!(outcome.visited, vec!["agent_router", "market_price_agent"]);
    assert_eq!(h.market.calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.gov.calls.load(Ordering::SeqCst), 0);
    assert_eq!(outcome.status, WorkflowStatus::Completed);

    assert_eq!(h.runner.status("wf-1").await, WorkflowStatus::Completed);
    assert_eq!(h.runner.sub_agent("wf-1").await, "market_price_agent");
    let routing = h.runner.routing("wf-1").await;
    assert_eq!(routing.previous_agent, "market_price_agent");
    assert_eq!(routing.next_agent, END);
    assert!(matches!(
        h.runner.final_output("wf-1").await,
        Some(AgentOutput::MarketPrice(out)) if out.crop.as_deref() == Some("onion")
    ));
    assert!(h.runner.history("wf-1", AgentName::GovSchemeAgent).await.is_empty());
}

#[tokio::test]
async fn gov_turn_visits_only_gov_subgraph() {
    let h = harness();
    let outcome = h
        .runner
        .run_turn(
            TurnRequest::new("wf-2", "schemes for drip irrigation", Some(AgentName::GovSchemeAgent))
                .with_workflow_name("irrigation help"),
        )
        .await
        .unwrap();

    assert_eq!(outcome.visited, vec!["agent_router", "gov_scheme_agent"]);
    assert_eq!(h.market.calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.runner.workflow_name("wf-2").await, "irrigation help");
    assert_eq!(h.runner.history("wf-2", AgentName::GovSchemeAgent).await.len(), 1);
}

#[tokio::test]
async fn unrouted_turn_runs_no_agent() {
    let h = harness();
    let outcome = h
        .runner
        .run_turn(TurnRequest::new("wf-3", "hello", None))
        .await
        .unwrap();

    assert_eq!(outcome.visited, vec!["agent_router"]);
    assert!(outcome.state.agent_output().is_none());
    assert_eq!(h.market.calls.load(Ordering::SeqCst) + h.gov.calls.load(Ordering::SeqCst), 0);
    assert!(h.runner.final_output("wf-3").await.is_none());
    assert_eq!(h.runner.sub_agent("wf-3").await, "");
}

#[tokio::test]
async fn empty_input_returns_canned_reply_without_history() {
    let h = harness();
    let outcome = h
        .runner
        .run_turn(TurnRequest::new("wf-4", "", Some(AgentName::MarketPriceAgent)))
        .await
        .unwrap();

    assert_eq!(
        outcome.state.agent_output(),
        Some(&AgentOutput::Message("No data found!!!".into()))
    );
    assert_eq!(outcome.state.routing.previous.as_deref(), Some("market_price_agent"));
    assert_eq!(h.market.calls.load(Ordering::SeqCst), 0);
    assert!(h.runner.history("wf-4", AgentName::MarketPriceAgent).await.is_empty());

    let outcome = h
        .runner
        .run_turn(TurnRequest::new("wf-4", serde_json::Value::Null, Some(AgentName::GovSchemeAgent)))
        .await
        .unwrap();
    assert_eq!(
        outcome.state.agent_output(),
        Some(&AgentOutput::Message("Sorry something went wrong!!!".into()))
    );
}

#[tokio::test]
async fn history_grows_one_entry_per_turn() {
    let h = harness();
    for question in ["wheat price?", "and in Indore?", "convert to per kg"] {
        let outcome = h
            .runner
            .run_turn(TurnRequest::new("wf-5", question, Some(AgentName::MarketPriceAgent)))
            .await
            .unwrap();
        assert_eq!(outcome.state.agent_input_output.history_persisted, Some(true));
    }

    let history = h.runner.history("wf-5", AgentName::MarketPriceAgent).await;
    assert_eq!(history.len(), 3);
    assert_eq!(history[1].user_input, "and in Indore?");
    assert_eq!(history[2].agent_response["crop"], "onion");
}

#[tokio::test]
async fn prior_routing_is_loaded_into_the_next_turn() {
    let h = harness();
    h.runner
        .run_turn(TurnRequest::new("wf-6", "wheat price?", Some(AgentName::MarketPriceAgent)))
        .await
        .unwrap();
    let outcome = h
        .runner
        .run_turn(TurnRequest::new("wf-6", "hello", None))
        .await
        .unwrap();
    assert_eq!(outcome.state.routing.previous.as_deref(), Some("market_price_agent"));
}

#[tokio::test]
async fn concurrent_turns_on_one_workflow_lose_no_history() {
    let h = Arc::new(harness_with(
        Canned::slow(AgentName::MarketPriceAgent, Duration::from_millis(5)),
        Canned::new(AgentName::GovSchemeAgent),
    ));

    let mut handles = Vec::new();
    for i in 0..8 {
        let h = Arc::clone(&h);
        handles.push(tokio::spawn(async move {
            h.runner
                .run_turn(TurnRequest::new(
                    "wf-shared",
                    format!("question {i}"),
                    Some(AgentName::MarketPriceAgent),
                ))
                .await
                .unwrap()
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let history = h.runner.history("wf-shared", AgentName::MarketPriceAgent).await;
    assert_eq!(history.len(), 8);
    assert_eq!(h.market.calls.load(Ordering::SeqCst), 8);
}

#[tokio::test]
async fn empty_workflow_id_is_rejected() {
    let h = harness();
    let err = h
        .runner
        .run_turn(TurnRequest::new("  ", "hi", Some(AgentName::MarketPriceAgent)))
        .await
        .unwrap_err();
    assert!(matches!(err, NexusError::InvalidRequest(_)));
    assert!(h.kv.is_empty());
}

fn runtime_runner(llm: MockLlmClient, registry: ToolRegistry) -> (WorkflowRunner, Arc<EventBus>) {
    let mut config = AppConfig::from_toml_str("[model]\nmodel_id = \"mock-model\"\n").unwrap();
    config.model = test_model_config();
    config.agent.output_retries = 1;
    let events = Arc::new(EventBus::default());
    let runtime = Arc::new(AgentRuntime::new(
        &config,
        Arc::new(llm) as Arc<dyn LlmClient>,
        Arc::new(RwLock::new(registry)),
        Arc::clone(&events),
    ));
    let kv: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
    (WorkflowRunner::with_runtime(runtime, kv, 3600), events)
}

#[tokio::test]
async fn bound_agent_runs_tools_and_returns_structured_output() {
    let price = RecordingTool::new(
        "get_market_price",
        ToolResult::success(r#"{"crop": "onion", "markets": []}"#),
    );
    let mut registry = ToolRegistry::new();
    registry.register(price.clone());

    let llm = MockLlmClient::new()
        .with_tool_call(
            "get_market_price",
            serde_json::json!({ "crop": "onion", "state": "Maharashtra" }),
        )
        .with_text(r#"{"crop": "onion", "state": "Maharashtra", "full_response": "Onion trades at 1800-2200 Rs/quintal."}"#);
    let (runner, _events) = runtime_runner(llm, registry);

    let outcome = runner
        .run_turn(TurnRequest::new("wf-7", "onion price in Maharashtra", Some(AgentName::MarketPriceAgent)))
        .await
        .unwrap();

    assert_eq!(price.calls().len(), 1);
    assert_eq!(price.calls()[0].1.workflow_id, "wf-7");
    let Some(AgentOutput::MarketPrice(out)) = outcome.state.agent_output() else {
        panic!("expected a market price output");
    };
    assert_eq!(out.state.as_deref(), Some("Maharashtra"));
    assert_eq!(outcome.status, WorkflowStatus::Completed);
}

#[tokio::test]
async fn schema_drift_degrades_to_failed_turn() {
    let llm = MockLlmClient::new()
        .with_text(r#"{"full_response": "x", "confidence": 0.4}"#)
        .with_text(r#"{"full_response": "y", "confidence": 0.9}"#);
    let (runner, _events) = runtime_runner(llm, ToolRegistry::new());

    let outcome = runner
        .run_turn(TurnRequest::new("wf-8", "PM-KISAN eligibility", Some(AgentName::GovSchemeAgent)))
        .await
        .unwrap();

    assert_eq!(outcome.status, WorkflowStatus::Failed);
    assert_eq!(runner.status("wf-8").await, WorkflowStatus::Failed);
    let message = outcome.state.agent_output().unwrap().full_response().to_string();
    assert!(message.starts_with("Sorry"), "{message}");
    assert!(message.contains("unknown field"), "{message}");
    assert!(runner.history("wf-8", AgentName::GovSchemeAgent).await.is_empty());
}

#[tokio::test]
async fn llm_outage_marks_workflow_failed() {
    let llm = MockLlmClient::new().with_error(NexusError::LlmRequest("HTTP 401: bad key".into()));
    let (runner, events) = runtime_runner(llm, ToolRegistry::new());
    let mut rx = events.subscribe();

    let outcome = runner
        .run_turn(TurnRequest::new("wf-9", "wheat price", Some(AgentName::MarketPriceAgent)))
        .await
        .unwrap();
    assert_eq!(outcome.status, WorkflowStatus::Failed);
    assert!(outcome.state.agent_input_output.error.as_deref().unwrap().contains("401"));

    let mut saw_node = false;
    while let Ok(event) = rx.try_recv() {
        if let nexus_core::types::AgentEvent::NodeEntered { node, .. } = event {
            saw_node |= node == "market_price_agent";
        }
    }
    assert!(saw_node);
}
