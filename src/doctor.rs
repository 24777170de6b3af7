use nexus_core::config::{AppConfig, McpTransport};
use nexus_memory::RedisStore;

struct CheckResult {
    label: String,
    ok: bool,
    detail: String,
}

impl CheckResult {
    fn ok(label: &str, detail: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ok: true,
            detail: detail.into(),
        }
    }

    fn issue(label: &str, detail: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ok: false,
            detail: detail.into(),
        }
    }
}

/// Print one line per check. Returns the number of issues found.
pub async fn run_doctor(config: &AppConfig) -> usize {
    let mut checks = vec![
        check_api_key(config),
        check_redis(config).await,
        check_web_search(config),
        check_nexus_service(config),
        check_perplexity(config),
        check_mcp(config),
        check_agent_limits(config),
    ];
    checks.extend(config.fallback_models.iter().map(|fb| {
        let label = format!("Fallback {}", fb.model_id);
        if has_value(fb.api_key.as_deref()) {
            CheckResult::ok(&label, fb.provider.clone())
        } else {
            CheckResult::issue(&label, "no api_key")
        }
    }));

    let mut ok_count = 0;
    let mut fail_count = 0;

    for check in &checks {
        let icon = if check.ok { "[OK]" } else { "[!!]" };
        println!("  {} {}: {}", icon, check.label, check.detail);
        if check.ok {
            ok_count += 1;
        } else {
            fail_count += 1;
        }
    }

    println!();
    println!("  {} passed, {} issues found", ok_count, fail_count);
    fail_count
}

/// Present and not an unexpanded `${VAR}` reference.
fn has_value(value: Option<&str>) -> bool {
    value.is_some_and(|v| !v.trim().is_empty() && !v.starts_with("${"))
}

fn check_api_key(config: &AppConfig) -> CheckResult {
    let provider = &config.model.provider;
    let needs_key = provider != "ollama";

    if !needs_key || has_value(config.model.api_key.as_deref()) {
        CheckResult::ok(
            "API Key",
            format!("Configured for {} ({})", config.model.model_id, provider),
        )
    } else {
        CheckResult::issue(
            "API Key",
            format!("No API key set for provider '{}' (GOOGLE_API_KEY)", provider),
        )
    }
}

async fn check_redis(config: &AppConfig) -> CheckResult {
    let url = &config.redis.url;
    let result = match RedisStore::connect(url).await {
        Ok(store) => store.ping().await,
        Err(e) => Err(e),
    };
    match result {
        Ok(()) => CheckResult::ok("Redis", format!("{} (ttl {}s)", url, config.redis.ttl_secs)),
        Err(e) => CheckResult::issue("Redis", format!("{}: {}", url, e)),
    }
}

fn check_web_search(config: &AppConfig) -> CheckResult {
    match &config.web_search {
        Some(ws) if has_value(Some(&ws.api_key)) => {
            CheckResult::ok("Web search", format!("{} ({})", ws.provider, ws.country))
        }
        Some(ws) => CheckResult::issue("Web search", format!("{}: empty api_key", ws.provider)),
        None => CheckResult::issue("Web search", "Not configured (TAVILY_API_KEY)"),
    }
}

fn check_nexus_service(config: &AppConfig) -> CheckResult {
    match config.services.nexus_base_url.as_deref() {
        Some(url) if has_value(Some(url)) => CheckResult::ok("Nexus service", url),
        _ => CheckResult::issue(
            "Nexus service",
            "Not configured (NEXUS_SERVICE_BASE_URL); scrape, RAG and research tools disabled",
        ),
    }
}

fn check_perplexity(config: &AppConfig) -> CheckResult {
    match &config.services.perplexity {
        Some(p) if has_value(Some(&p.api_key)) && has_value(Some(&p.base_url)) => {
            CheckResult::ok("Market prices", format!("{} via {}", p.model, p.base_url))
        }
        Some(_) => CheckResult::issue("Market prices", "perplexity base_url or api_key empty"),
        None => CheckResult::issue(
            "Market prices",
            "Not configured (PERPLEXITY_BASE_URL, PERPLEXITY_API_KEY)",
        ),
    }
}

fn check_mcp(config: &AppConfig) -> CheckResult {
    let Some(mcp) = &config.mcp else {
        return CheckResult::ok("MCP", "Bundled calculator only");
    };
    let bad: Vec<&str> = mcp
        .servers
        .iter()
        .filter(|(_, s)| match &s.transport {
            McpTransport::Stdio { command, .. } => command.trim().is_empty(),
            McpTransport::Http { url } => url.trim().is_empty(),
        })
        .map(|(name, _)| name.as_str())
        .collect();
    if bad.is_empty() {
        let auto = mcp.servers.values().filter(|s| s.auto_connect).count();
        CheckResult::ok(
            "MCP",
            format!("{} servers ({} auto-connect)", mcp.servers.len(), auto),
        )
    } else {
        CheckResult::issue("MCP", format!("Missing command or url: {}", bad.join(", ")))
    }
}

fn check_agent_limits(config: &AppConfig) -> CheckResult {
    let agent = &config.agent;
    if agent.max_turns == 0 || agent.max_duration_secs == 0 {
        CheckResult::issue("Agent", "max_turns and max_duration_secs must be positive")
    } else {
        CheckResult::ok(
            "Agent",
            format!(
                "{} turns, {}s, {} output retries",
                agent.max_turns, agent.max_duration_secs, agent.output_retries
            ),
        )
    }
}
