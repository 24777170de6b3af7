pub mod browser_use;
pub mod datetime;
pub mod market_price;
pub mod nexus_service;
pub mod scheme;
pub mod web_search;

use nexus_core::types::ToolResult;

/// Transport failures are reported to the model, never raised.
pub(crate) fn transport_error(tool: &str, err: impl std::fmt::Display) -> ToolResult {
    ToolResult::error(format!("Error in {tool}: {err}"))
}
