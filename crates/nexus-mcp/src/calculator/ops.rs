//! Arithmetic and crop-trading calculations served by the calculator.
//!
//! Every operation rejects non-finite input and rounds ties to even where it
//! takes a `precision`.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Largest precision that still changes an `f64`.
const MAX_PRECISION: u32 = 15;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CalcError {
    #[error("divide_by_zero: {0}")]
    DivideByZero(&'static str),

    /// Reported as an invalid argument.
    #[error("invalid_argument: unsupported unit conversion: {from} to {to}")]
    UnsupportedUnit { from: String, to: String },

    #[error("invalid_argument: {0}")]
    InvalidArgument(String),
}

pub type CalcResult<T> = std::result::Result<T, CalcError>;

fn finite(values: &[(&str, f64)]) -> CalcResult<()> {
    match values.iter().find(|(_, v)| !v.is_finite()) {
        Some((name, v)) => Err(CalcError::InvalidArgument(format!(
            "{name} must be a finite number, got {v}"
        ))),
        None => Ok(()),
    }
}

fn finite_result(value: f64) -> CalcResult<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(CalcError::InvalidArgument(format!(
            "result is not a finite number ({value})"
        )))
    }
}

/// Round to `precision` decimal places, ties to even.
pub fn round(value: f64, precision: u32) -> f64 {
    if precision >= MAX_PRECISION {
        return value;
    }
    let factor = 10f64.powi(precision as i32);
    let scaled = value * factor;
    if !scaled.is_finite() {
        return value;
    }
    let floor = scaled.floor();
    let fraction = scaled - floor;
    let rounded = if fraction > 0.5 || (fraction == 0.5 && floor % 2.0 != 0.0) {
        floor + 1.0
    } else {
        floor
    };
    rounded / factor
}

fn sorted<const N: usize>(mut values: [f64; N]) -> [f64; N] {
    values.sort_by(|a, b| a.total_cmp(b));
    values
}

pub fn add(a: f64, b: f64, c: f64, d: f64, e: f64) -> CalcResult<f64> {
    finite(&[("a", a), ("b", b), ("c", c), ("d", d), ("e", e)])?;
    finite_result(a + b + c + d + e)
}

pub fn subtract(
    minuend: f64,
    subtrahend: f64,
    additional1: f64,
    additional2: f64,
    additional3: f64,
) -> CalcResult<f64> {
    finite(&[
        ("minuend", minuend),
        ("subtrahend", subtrahend),
        ("additional1", additional1),
        ("additional2", additional2),
        ("additional3", additional3),
    ])?;
    finite_result(minuend - subtrahend - additional1 - additional2 - additional3)
}

pub fn multiply(a: f64, b: f64, c: f64, d: f64, e: f64) -> CalcResult<f64> {
    finite(&[("a", a), ("b", b), ("c", c), ("d", d), ("e", e)])?;
    finite_result(a * b * c * d * e)
}

pub fn divide(dividend: f64, divisor: f64) -> CalcResult<f64> {
    finite(&[("dividend", dividend), ("divisor", divisor)])?;
    if divisor == 0.0 {
        return Err(CalcError::DivideByZero("cannot divide by zero"));
    }
    finite_result(dividend / divisor)
}

pub fn power(base: f64, exponent: f64) -> CalcResult<f64> {
    finite(&[("base", base), ("exponent", exponent)])?;
    finite_result(base.powf(exponent))
}

pub fn percentage(part: f64, whole: f64, precision: u32) -> CalcResult<f64> {
    finite(&[("part", part), ("whole", whole)])?;
    if whole == 0.0 {
        return Err(CalcError::DivideByZero(
            "whole cannot be zero when calculating a percentage",
        ));
    }
    finite_result(round(part / whole * 100.0, precision))
}

pub fn percentage_change(old: f64, new: f64, precision: u32) -> CalcResult<f64> {
    finite(&[("old", old), ("new", new)])?;
    if old == 0.0 {
        return Err(CalcError::DivideByZero(
            "old value cannot be zero when calculating a percentage change",
        ));
    }
    finite_result(round((new - old) / old * 100.0, precision))
}

/// Mean of the given values, rounded.
pub fn average(values: &[f64], precision: u32) -> CalcResult<f64> {
    if values.is_empty() {
        return Err(CalcError::InvalidArgument("no values to average".into()));
    }
    let named: Vec<(&str, f64)> = values.iter().map(|v| ("value", *v)).collect();
    finite(&named)?;
    let sum: f64 = values.iter().sum();
    finite_result(round(sum / values.len() as f64, precision))
}

pub fn median_three(v1: f64, v2: f64, v3: f64) -> CalcResult<f64> {
    finite(&[("value1", v1), ("value2", v2), ("value3", v3)])?;
    Ok(sorted([v1, v2, v3])[1])
}

pub fn median_five(v1: f64, v2: f64, v3: f64, v4: f64, v5: f64) -> CalcResult<f64> {
    finite(&[
        ("value1", v1),
        ("value2", v2),
        ("value3", v3),
        ("value4", v4),
        ("value5", v5),
    ])?;
    Ok(sorted([v1, v2, v3, v4, v5])[2])
}

/// Kilograms per unit for the weights used in crop trading.
fn kg_per_unit(unit: &str) -> Option<f64> {
    Some(match unit.trim().to_lowercase().as_str() {
        "kg" => 1.0,
        "ton" | "tonne" => 1000.0,
        "pound" | "lb" => 0.453592,
        // Average grain bushel.
        "bushel" => 27.216,
        "quintal" => 100.0,
        "cwt" => 50.8023,
        "gram" | "g" => 0.001,
        "ounce" | "oz" => 0.0283495,
        _ => return None,
    })
}

pub fn unit_conversion(
    value: f64,
    from_unit: &str,
    to_unit: &str,
    precision: u32,
) -> CalcResult<f64> {
    finite(&[("value", value)])?;
    match (kg_per_unit(from_unit), kg_per_unit(to_unit)) {
        (Some(from), Some(to)) => finite_result(round(value * from / to, precision)),
        _ => Err(CalcError::UnsupportedUnit {
            from: from_unit.to_string(),
            to: to_unit.to_string(),
        }),
    }
}

pub fn price_per_unit(total_price: f64, quantity: f64, precision: u32) -> CalcResult<f64> {
    finite(&[("total_price", total_price), ("quantity", quantity)])?;
    if quantity == 0.0 {
        return Err(CalcError::DivideByZero("quantity cannot be zero"));
    }
    finite_result(round(total_price / quantity, precision))
}

pub fn total_cost(price_per_unit: f64, quantity: f64, precision: u32) -> CalcResult<f64> {
    finite(&[("price_per_unit", price_per_unit), ("quantity", quantity)])?;
    finite_result(round(price_per_unit * quantity, precision))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ProfitLoss {
    pub total_profit_loss: f64,
    pub profit_loss_per_unit: f64,
    pub profit_margin_percentage: f64,
}

pub fn profit_loss_calculation(
    selling_price: f64,
    buying_price: f64,
    quantity: f64,
    precision: u32,
) -> CalcResult<ProfitLoss> {
    finite(&[
        ("selling_price", selling_price),
        ("buying_price", buying_price),
        ("quantity", quantity),
    ])?;
    let per_unit = round(selling_price - buying_price, precision);
    let total = round(per_unit * quantity, precision);
    // Margin is always reported at two places.
    let margin = if buying_price != 0.0 {
        round((selling_price - buying_price) / buying_price * 100.0, 2)
    } else {
        0.0
    };
    Ok(ProfitLoss {
        total_profit_loss: finite_result(total)?,
        profit_loss_per_unit: per_unit,
        profit_margin_percentage: margin,
    })
}

pub fn breakeven_price(
    cost_per_unit: f64,
    desired_profit_margin: f64,
    precision: u32,
) -> CalcResult<f64> {
    finite(&[
        ("cost_per_unit", cost_per_unit),
        ("desired_profit_margin", desired_profit_margin),
    ])?;
    finite_result(round(
        cost_per_unit * (1.0 + desired_profit_margin / 100.0),
        precision,
    ))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PriceRange {
    pub min: f64,
    pub max: f64,
    pub average: f64,
    pub median: f64,
    pub price_spread: f64,
}

/// Summary statistics over an odd number of prices.
pub fn price_range_analysis(prices: &[f64], precision: u32) -> CalcResult<PriceRange> {
    if prices.is_empty() {
        return Err(CalcError::InvalidArgument("no prices to analyse".into()));
    }
    let named: Vec<(&str, f64)> = prices.iter().map(|p| ("price", *p)).collect();
    finite(&named)?;

    let mut ordered = prices.to_vec();
    ordered.sort_by(|a, b| a.total_cmp(b));
    let min = round(ordered[0], precision);
    let max = round(ordered[ordered.len() - 1], precision);
    let sum: f64 = ordered.iter().sum();
    Ok(PriceRange {
        min,
        max,
        average: finite_result(round(sum / ordered.len() as f64, precision))?,
        median: round(ordered[ordered.len() / 2], precision),
        price_spread: round(max - min, precision),
    })
}

pub fn compound_interest(
    principal: f64,
    rate: f64,
    time: f64,
    compounding_frequency: u32,
    precision: u32,
) -> CalcResult<f64> {
    finite(&[("principal", principal), ("rate", rate), ("time", time)])?;
    if compounding_frequency == 0 {
        return Err(CalcError::DivideByZero(
            "compounding frequency cannot be zero",
        ));
    }
    let n = compounding_frequency as f64;
    let amount = principal * (1.0 + rate / 100.0 / n).powf(n * time);
    finite_result(round(amount, precision))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct StorageCost {
    pub total_storage_cost: f64,
    pub cost_per_unit_after_storage: f64,
    pub months_stored: u32,
}

pub fn storage_cost_calculation(
    base_price: f64,
    storage_rate_per_month: f64,
    months: u32,
    precision: u32,
) -> CalcResult<StorageCost> {
    finite(&[
        ("base_price", base_price),
        ("storage_rate_per_month", storage_rate_per_month),
    ])?;
    let total_storage_cost = round(storage_rate_per_month * months as f64, precision);
    Ok(StorageCost {
        total_storage_cost: finite_result(total_storage_cost)?,
        cost_per_unit_after_storage: finite_result(round(
            base_price + total_storage_cost,
            precision,
        ))?,
        months_stored: months,
    })
}

pub fn yield_per_acre_value(
    yield_per_acre: f64,
    price_per_unit: f64,
    precision: u32,
) -> CalcResult<f64> {
    finite(&[
        ("yield_per_acre", yield_per_acre),
        ("price_per_unit", price_per_unit),
    ])?;
    finite_result(round(yield_per_acre * price_per_unit, precision))
}

pub fn currency_conversion_simple(
    amount: f64,
    exchange_rate: f64,
    precision: u32,
) -> CalcResult<f64> {
    finite(&[("amount", amount), ("exchange_rate", exchange_rate)])?;
    finite_result(round(amount * exchange_rate, precision))
}

pub fn round_to_precision(value: f64, precision: u32) -> CalcResult<f64> {
    finite(&[("value", value)])?;
    Ok(round(value, precision))
}

pub fn min_of(values: &[f64]) -> CalcResult<f64> {
    let named: Vec<(&str, f64)> = values.iter().map(|v| ("value", *v)).collect();
    finite(&named)?;
    values
        .iter()
        .copied()
        .reduce(f64::min)
        .ok_or_else(|| CalcError::InvalidArgument("no values given".into()))
}

pub fn max_of(values: &[f64]) -> CalcResult<f64> {
    let named: Vec<(&str, f64)> = values.iter().map(|v| ("value", *v)).collect();
    finite(&named)?;
    values
        .iter()
        .copied()
        .reduce(f64::max)
        .ok_or_else(|| CalcError::InvalidArgument("no values given".into()))
}

pub fn absolute_value(value: f64) -> CalcResult<f64> {
    finite(&[("value", value)])?;
    Ok(value.abs())
}
