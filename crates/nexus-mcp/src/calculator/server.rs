use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{CallToolResult, Content, ServerCapabilities, ServerInfo};
use rmcp::{tool, tool_handler, tool_router, ErrorData as McpError, ServerHandler, ServiceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use nexus_core::error::NexusError;

use super::ops::{self, CalcResult};

fn one() -> f64 {
    1.0
}

fn two_places() -> u32 {
    2
}

fn four_places() -> u32 {
    4
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SumArgs {
    /// First value.
    pub a: f64,
    /// Second value.
    pub b: f64,
    #[serde(default)]
    pub c: f64,
    #[serde(default)]
    pub d: f64,
    #[serde(default)]
    pub e: f64,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SubtractArgs {
    pub minuend: f64,
    pub subtrahend: f64,
    #[serde(default)]
    pub additional1: f64,
    #[serde(default)]
    pub additional2: f64,
    #[serde(default)]
    pub additional3: f64,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ProductArgs {
    pub a: f64,
    pub b: f64,
    #[serde(default = "one")]
    pub c: f64,
    #[serde(default = "one")]
    pub d: f64,
    #[serde(default = "one")]
    pub e: f64,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct DivideArgs {
    pub dividend: f64,
    pub divisor: f64,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct PowerArgs {
    pub base: f64,
    pub exponent: f64,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct PercentageArgs {
    /// The subset value.
    pub part: f64,
    /// The total value.
    pub whole: f64,
    #[serde(default = "four_places")]
    pub precision: u32,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct PercentageChangeArgs {
    pub old: f64,
    pub new: f64,
    #[serde(default = "four_places")]
    pub precision: u32,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct TwoValues {
    pub value1: f64,
    pub value2: f64,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ThreeValues {
    pub value1: f64,
    pub value2: f64,
    pub value3: f64,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct FiveValues {
    pub value1: f64,
    pub value2: f64,
    pub value3: f64,
    pub value4: f64,
    pub value5: f64,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct AverageTwoArgs {
    pub value1: f64,
    pub value2: f64,
    #[serde(default = "four_places")]
    pub precision: u32,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct AverageThreeArgs {
    pub value1: f64,
    pub value2: f64,
    pub value3: f64,
    #[serde(default = "four_places")]
    pub precision: u32,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct AverageFiveArgs {
    pub value1: f64,
    pub value2: f64,
    pub value3: f64,
    pub value4: f64,
    pub value5: f64,
    #[serde(default = "four_places")]
    pub precision: u32,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct UnitConversionArgs {
    pub value: f64,
    /// One of kg, ton, tonne, pound, lb, bushel, quintal, cwt, gram, g, ounce, oz.
    pub from_unit: String,
    /// Same units as `from_unit`.
    pub to_unit: String,
    #[serde(default = "four_places")]
    pub precision: u32,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct PricePerUnitArgs {
    pub total_price: f64,
    pub quantity: f64,
    #[serde(default = "four_places")]
    pub precision: u32,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct TotalCostArgs {
    pub price_per_unit: f64,
    pub quantity: f64,
    #[serde(default = "two_places")]
    pub precision: u32,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ProfitLossArgs {
    pub selling_price: f64,
    pub buying_price: f64,
    pub quantity: f64,
    #[serde(default = "two_places")]
    pub precision: u32,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct BreakevenArgs {
    pub cost_per_unit: f64,
    /// Desired margin in percent, e.g. 20 for 20%.
    pub desired_profit_margin: f64,
    #[serde(default = "four_places")]
    pub precision: u32,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct PriceRangeThreeArgs {
    pub price1: f64,
    pub price2: f64,
    pub price3: f64,
    #[serde(default = "four_places")]
    pub precision: u32,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct PriceRangeFiveArgs {
    pub price1: f64,
    pub price2: f64,
    pub price3: f64,
    pub price4: f64,
    pub price5: f64,
    #[serde(default = "four_places")]
    pub precision: u32,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CompoundInterestArgs {
    pub principal: f64,
    /// Interest rate in percent.
    pub rate: f64,
    pub time: f64,
    #[serde(default = "default_frequency")]
    pub compounding_frequency: u32,
    #[serde(default = "two_places")]
    pub precision: u32,
}

fn default_frequency() -> u32 {
    1
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct StorageCostArgs {
    pub base_price: f64,
    pub storage_rate_per_month: f64,
    pub months: u32,
    #[serde(default = "two_places")]
    pub precision: u32,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct YieldValueArgs {
    pub yield_per_acre: f64,
    pub price_per_unit: f64,
    #[serde(default = "two_places")]
    pub precision: u32,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CurrencyArgs {
    pub amount: f64,
    pub exchange_rate: f64,
    #[serde(default = "two_places")]
    pub precision: u32,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct RoundArgs {
    pub value: f64,
    #[serde(default = "two_places")]
    pub precision: u32,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SingleValue {
    pub value: f64,
}

/// Turn an operation result into an MCP tool result. Calculation errors are
/// flagged `is_error` with the error text as content.
fn respond<T: Serialize>(result: CalcResult<T>) -> Result<CallToolResult, McpError> {
    match result {
        Ok(value) => {
            let text = serde_json::to_string(&value)
                .map_err(|e| McpError::internal_error(e.to_string(), None))?;
            Ok(CallToolResult::success(vec![Content::text(text)]))
        }
        Err(e) => {
            debug!(error = %e, "Calculation rejected");
            Ok(CallToolResult::error(vec![Content::text(e.to_string())]))
        }
    }
}

/// Stateless calculator for arithmetic and crop-trading math.
#[derive(Clone)]
pub struct CalculatorServer {
    tool_router: ToolRouter<Self>,
}

impl Default for CalculatorServer {
    fn default() -> Self {
        Self::new()
    }
}

#[tool_router]
impl CalculatorServer {
    pub fn new() -> Self {
        Self {
            tool_router: Self::tool_router(),
        }
    }

    #[tool(description = "Return the sum of up to 5 values (c, d, e default to 0).")]
    fn add(&self, Parameters(a): Parameters<SumArgs>) -> Result<CallToolResult, McpError> {
        respond(ops::add(a.a, a.b, a.c, a.d, a.e))
    }

    #[tool(description = "Subtract subtrahend and up to three additional values from minuend.")]
    fn subtract(
        &self,
        Parameters(a): Parameters<SubtractArgs>,
    ) -> Result<CallToolResult, McpError> {
        respond(ops::subtract(
            a.minuend,
            a.subtrahend,
            a.additional1,
            a.additional2,
            a.additional3,
        ))
    }

    #[tool(description = "Return the product of up to 5 values (c, d, e default to 1).")]
    fn multiply(&self, Parameters(a): Parameters<ProductArgs>) -> Result<CallToolResult, McpError> {
        respond(ops::multiply(a.a, a.b, a.c, a.d, a.e))
    }

    #[tool(description = "Divide dividend by divisor. Fails when divisor is zero.")]
    fn divide(&self, Parameters(a): Parameters<DivideArgs>) -> Result<CallToolResult, McpError> {
        respond(ops::divide(a.dividend, a.divisor))
    }

    #[tool(description = "Raise base to the power of exponent.")]
    fn power(&self, Parameters(a): Parameters<PowerArgs>) -> Result<CallToolResult, McpError> {
        respond(ops::power(a.base, a.exponent))
    }

    #[tool(description = "What percentage part is of whole (0-100).")]
    fn percentage(
        &self,
        Parameters(a): Parameters<PercentageArgs>,
    ) -> Result<CallToolResult, McpError> {
        respond(ops::percentage(a.part, a.whole, a.precision))
    }

    #[tool(description = "Percentage change from old to new. Positive for an increase.")]
    fn percentage_change(
        &self,
        Parameters(a): Parameters<PercentageChangeArgs>,
    ) -> Result<CallToolResult, McpError> {
        respond(ops::percentage_change(a.old, a.new, a.precision))
    }

    #[tool(description = "Arithmetic mean of two values.")]
    fn average_two(
        &self,
        Parameters(a): Parameters<AverageTwoArgs>,
    ) -> Result<CallToolResult, McpError> {
        respond(ops::average(&[a.value1, a.value2], a.precision))
    }

    #[tool(description = "Arithmetic mean of three values.")]
    fn average_three(
        &self,
        Parameters(a): Parameters<AverageThreeArgs>,
    ) -> Result<CallToolResult, McpError> {
        respond(ops::average(&[a.value1, a.value2, a.value3], a.precision))
    }

    #[tool(description = "Arithmetic mean of five values.")]
    fn average_five(
        &self,
        Parameters(a): Parameters<AverageFiveArgs>,
    ) -> Result<CallToolResult, McpError> {
        respond(ops::average(
            &[a.value1, a.value2, a.value3, a.value4, a.value5],
            a.precision,
        ))
    }

    #[tool(description = "Median of three numbers.")]
    fn median_three(
        &self,
        Parameters(a): Parameters<ThreeValues>,
    ) -> Result<CallToolResult, McpError> {
        respond(ops::median_three(a.value1, a.value2, a.value3))
    }

    #[tool(description = "Median of five numbers.")]
    fn median_five(
        &self,
        Parameters(a): Parameters<FiveValues>,
    ) -> Result<CallToolResult, McpError> {
        respond(ops::median_five(a.value1, a.value2, a.value3, a.value4, a.value5))
    }

    #[tool(
        description = "Convert between crop-trading weight units: kg, ton, tonne, pound, lb, bushel, quintal, cwt, gram, g, ounce, oz."
    )]
    fn unit_conversion(
        &self,
        Parameters(a): Parameters<UnitConversionArgs>,
    ) -> Result<CallToolResult, McpError> {
        respond(ops::unit_conversion(a.value, &a.from_unit, &a.to_unit, a.precision))
    }

    #[tool(description = "Price per unit from a total price and a quantity.")]
    fn price_per_unit(
        &self,
        Parameters(a): Parameters<PricePerUnitArgs>,
    ) -> Result<CallToolResult, McpError> {
        respond(ops::price_per_unit(a.total_price, a.quantity, a.precision))
    }

    #[tool(description = "Total cost from a price per unit and a quantity.")]
    fn total_cost(
        &self,
        Parameters(a): Parameters<TotalCostArgs>,
    ) -> Result<CallToolResult, McpError> {
        respond(ops::total_cost(a.price_per_unit, a.quantity, a.precision))
    }

    #[tool(
        description = "Profit or loss of a crop transaction: total_profit_loss, profit_loss_per_unit, profit_margin_percentage."
    )]
    fn profit_loss_calculation(
        &self,
        Parameters(a): Parameters<ProfitLossArgs>,
    ) -> Result<CallToolResult, McpError> {
        respond(ops::profit_loss_calculation(
            a.selling_price,
            a.buying_price,
            a.quantity,
            a.precision,
        ))
    }

    #[tool(description = "Selling price needed to reach a desired profit margin.")]
    fn breakeven_price(
        &self,
        Parameters(a): Parameters<BreakevenArgs>,
    ) -> Result<CallToolResult, McpError> {
        respond(ops::breakeven_price(
            a.cost_per_unit,
            a.desired_profit_margin,
            a.precision,
        ))
    }

    #[tool(description = "Min, max, average, median and spread of three prices.")]
    fn price_range_analysis_three(
        &self,
        Parameters(a): Parameters<PriceRangeThreeArgs>,
    ) -> Result<CallToolResult, McpError> {
        respond(ops::price_range_analysis(
            &[a.price1, a.price2, a.price3],
            a.precision,
        ))
    }

    #[tool(description = "Min, max, average, median and spread of five prices.")]
    fn price_range_analysis_five(
        &self,
        Parameters(a): Parameters<PriceRangeFiveArgs>,
    ) -> Result<CallToolResult, McpError> {
        respond(ops::price_range_analysis(
            &[a.price1, a.price2, a.price3, a.price4, a.price5],
            a.precision,
        ))
    }

    #[tool(description = "Final amount after compound interest. Rate is a percentage.")]
    fn compound_interest(
        &self,
        Parameters(a): Parameters<CompoundInterestArgs>,
    ) -> Result<CallToolResult, McpError> {
        respond(ops::compound_interest(
            a.principal,
            a.rate,
            a.time,
            a.compounding_frequency,
            a.precision,
        ))
    }

    #[tool(description = "Storage cost over a number of months and the per-unit cost afterwards.")]
    fn storage_cost_calculation(
        &self,
        Parameters(a): Parameters<StorageCostArgs>,
    ) -> Result<CallToolResult, McpError> {
        respond(ops::storage_cost_calculation(
            a.base_price,
            a.storage_rate_per_month,
            a.months,
            a.precision,
        ))
    }

    #[tool(description = "Value per acre from yield per acre and price per unit.")]
    fn yield_per_acre_value(
        &self,
        Parameters(a): Parameters<YieldValueArgs>,
    ) -> Result<CallToolResult, McpError> {
        respond(ops::yield_per_acre_value(
            a.yield_per_acre,
            a.price_per_unit,
            a.precision,
        ))
    }

    #[tool(description = "Convert an amount by multiplying with an exchange rate.")]
    fn currency_conversion_simple(
        &self,
        Parameters(a): Parameters<CurrencyArgs>,
    ) -> Result<CallToolResult, McpError> {
        respond(ops::currency_conversion_simple(
            a.amount,
            a.exchange_rate,
            a.precision,
        ))
    }

    #[tool(description = "Round a value to the given number of decimal places.")]
    fn round_to_precision(
        &self,
        Parameters(a): Parameters<RoundArgs>,
    ) -> Result<CallToolResult, McpError> {
        respond(ops::round_to_precision(a.value, a.precision))
    }

    #[tool(description = "Smaller of two numbers.")]
    fn min_two(&self, Parameters(a): Parameters<TwoValues>) -> Result<CallToolResult, McpError> {
        respond(ops::min_of(&[a.value1, a.value2]))
    }

    #[tool(description = "Smallest of three numbers.")]
    fn min_three(
        &self,
        Parameters(a): Parameters<ThreeValues>,
    ) -> Result<CallToolResult, McpError> {
        respond(ops::min_of(&[a.value1, a.value2, a.value3]))
    }

    #[tool(description = "Larger of two numbers.")]
    fn max_two(&self, Parameters(a): Parameters<TwoValues>) -> Result<CallToolResult, McpError> {
        respond(ops::max_of(&[a.value1, a.value2]))
    }

    #[tool(description = "Largest of three numbers.")]
    fn max_three(
        &self,
        Parameters(a): Parameters<ThreeValues>,
    ) -> Result<CallToolResult, McpError> {
        respond(ops::max_of(&[a.value1, a.value2, a.value3]))
    }

    #[tool(description = "Absolute value of a number.")]
    fn absolute_value(
        &self,
        Parameters(a): Parameters<SingleValue>,
    ) -> Result<CallToolResult, McpError> {
        respond(ops::absolute_value(a.value))
    }
}

#[tool_handler]
impl ServerHandler for CalculatorServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "Calculator for arithmetic, statistics and crop-trading math. \
                 Errors are reported as tool results flagged is_error."
                    .into(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

/// Serve the calculator on stdin/stdout until the client disconnects.
pub async fn serve_stdio() -> Result<(), NexusError> {
    info!("Calculator MCP server starting on stdio");
    let service = CalculatorServer::new()
        .serve(rmcp::transport::stdio())
        .await
        .map_err(|e| NexusError::Mcp(format!("Calculator failed to start: {}", e)))?;
    let reason = service
        .waiting()
        .await
        .map_err(|e| NexusError::Mcp(format!("Calculator stopped unexpectedly: {}", e)))?;
    info!(reason = ?reason, "Calculator MCP server stopped");
    Ok(())
}
