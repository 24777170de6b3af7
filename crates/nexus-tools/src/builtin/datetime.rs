use chrono::{DateTime, FixedOffset, Utc};
use futures::future::BoxFuture;

use nexus_core::error::Result;
use nexus_core::traits::Tool;
use nexus_core::types::{ToolContext, ToolResult};

/// India Standard Time, UTC+05:30.
const IST_OFFSET_SECS: i32 = 5 * 3600 + 30 * 60;

/// Current wall-clock time in IST.
pub fn ist_now() -> DateTime<FixedOffset> {
    match FixedOffset::east_opt(IST_OFFSET_SECS) {
        Some(ist) => Utc::now().with_timezone(&ist),
        None => Utc::now().fixed_offset(),
    }
}

/// `DD-MM-YYYY`
pub fn format_date(dt: &DateTime<FixedOffset>) -> String {
    dt.format("%d-%m-%Y").to_string()
}

/// `HH:MM AM/PM`, 12-hour clock.
pub fn format_time(dt: &DateTime<FixedOffset>) -> String {
    dt.format("%I:%M %p").to_string()
}

// ── GetDateTool ─────────────────────────────────────────────────

pub struct GetDateTool;

impl Tool for GetDateTool {
    fn name(&self) -> &str {
        "get_date"
    }
    fn description(&self) -> &str {
        "Get today's date in India (IST) formatted as DD-MM-YYYY."
    }
    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({ "type": "object", "properties": {} })
    }
    fn execute(
        &self,
        _input: serde_json::Value,
        _ctx: ToolContext,
    ) -> BoxFuture<'_, Result<ToolResult>> {
        Box::pin(async move { Ok(ToolResult::success(format_date(&ist_now()))) })
    }
}

// ── GetTimeTool ─────────────────────────────────────────────────

pub struct GetTimeTool;

impl Tool for GetTimeTool {
    fn name(&self) -> &str {
        "get_time"
    }
    fn description(&self) -> &str {
        "Get the current time in India (IST) formatted as HH:MM AM/PM."
    }
    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({ "type": "object", "properties": {} })
    }
    fn execute(
        &self,
        _input: serde_json::Value,
        _ctx: ToolContext,
    ) -> BoxFuture<'_, Result<ToolResult>> {
        Box::pin(async move { Ok(ToolResult::success(format_time(&ist_now()))) })
    }
}
