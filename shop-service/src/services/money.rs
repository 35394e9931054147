//! Fixed-point money arithmetic.
//!
//! All amounts are `i64` minor units (paisa). Decimal inputs are converted to
//! minor units before any multiplication. Tax is rounded per line and the
//! per-line results are summed; the grand total is rounded to a whole currency
//! unit and the difference is reported as `round_off`.

use crate::error::CoreError;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;

/// Minor units per whole currency unit.
pub const MINOR_PER_MAJOR: i64 = 100;

/// Whether supply happens within the shop's own state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SupplyKind {
    /// Tax splits evenly into CGST and SGST.
    IntraState,
    /// Tax goes entirely to IGST.
    InterState,
}

/// One line as the calculator sees it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TaxableLine {
    pub quantity: Decimal,
    pub rate: Decimal,
    /// Percentage, e.g. `3` for 3%.
    pub tax_rate: Option<Decimal>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct LineAmounts {
    pub rate: i64,
    pub subtotal: i64,
    pub tax: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct TaxBreakdown {
    pub subtotal: i64,
    pub tax_total: i64,
    pub cgst: i64,
    pub sgst: i64,
    pub igst: i64,
    pub round_off: i64,
    pub grand_total: i64,
}

/// Per-line amounts in input order plus the document totals.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Computation {
    pub lines: Vec<LineAmounts>,
    pub totals: TaxBreakdown,
}

fn invalid(msg: impl Into<String>) -> CoreError {
    CoreError::InvalidMonetaryInput(msg.into())
}

fn round_to_i64(value: Decimal, what: &str) -> Result<i64, CoreError> {
    value
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .ok_or_else(|| invalid(format!("{} out of range", what)))
}

/// Convert a decimal currency amount to minor units, rounding half away from zero.
pub fn to_minor(value: Decimal) -> Result<i64, CoreError> {
    let scaled = value
        .checked_mul(Decimal::from(MINOR_PER_MAJOR))
        .ok_or_else(|| invalid("amount out of range"))?;
    round_to_i64(scaled, "amount")
}

/// Presentation string with two fractional digits. Display only.
pub fn format_minor(value: i64) -> String {
    let sign = if value < 0 { "-" } else { "" };
    let abs = value.unsigned_abs();
    let per_major = MINOR_PER_MAJOR as u64;
    format!("{}{}.{:02}", sign, abs / per_major, abs % per_major)
}

/// Round to the nearest whole currency unit, half away from zero.
pub fn round_to_major(value: i64) -> Result<i64, CoreError> {
    let whole = value / MINOR_PER_MAJOR;
    let rem = value % MINOR_PER_MAJOR;
    let units = if rem.abs() * 2 >= MINOR_PER_MAJOR {
        whole + value.signum()
    } else {
        whole
    };
    units
        .checked_mul(MINOR_PER_MAJOR)
        .ok_or_else(|| invalid("grand total out of range"))
}

/// Fractional digits a stored quantity keeps.
pub const QUANTITY_SCALE: u32 = 3;
/// Fractional digits a stored tax rate keeps.
pub const TAX_RATE_SCALE: u32 = 2;
/// Quantities must stay below 10^11 to fit the item column.
const QUANTITY_LIMIT: i64 = 100_000_000_000;

fn line_amounts(index: usize, line: &TaxableLine) -> Result<LineAmounts, CoreError> {
    if line.quantity.is_sign_negative() && !line.quantity.is_zero() {
        return Err(invalid(format!("item {}: quantity must not be negative", index + 1)));
    }
    if line.quantity.normalize().scale() > QUANTITY_SCALE {
        return Err(invalid(format!(
            "item {}: quantity allows at most {} decimal places",
            index + 1,
            QUANTITY_SCALE
        )));
    }
    if line.quantity >= Decimal::from(QUANTITY_LIMIT) {
        return Err(invalid(format!("item {}: quantity out of range", index + 1)));
    }
    if line.rate.is_sign_negative() && !line.rate.is_zero() {
        return Err(invalid(format!("item {}: rate must not be negative", index + 1)));
    }
    let tax_rate = line.tax_rate.unwrap_or(Decimal::ZERO);
    if tax_rate < Decimal::ZERO || tax_rate > Decimal::ONE_HUNDRED {
        return Err(invalid(format!(
            "item {}: tax rate must be between 0 and 100",
            index + 1
        )));
    }
    if tax_rate.normalize().scale() > TAX_RATE_SCALE {
        return Err(invalid(format!(
            "item {}: tax rate allows at most {} decimal places",
            index + 1,
            TAX_RATE_SCALE
        )));
    }

    let rate = to_minor(line.rate)?;
    let subtotal = line
        .quantity
        .checked_mul(Decimal::from(rate))
        .ok_or_else(|| invalid(format!("item {}: amount out of range", index + 1)))?;
    let subtotal = round_to_i64(subtotal, "line subtotal")?;

    let tax = Decimal::from(subtotal)
        .checked_mul(tax_rate)
        .and_then(|v| v.checked_div(Decimal::ONE_HUNDRED))
        .ok_or_else(|| invalid(format!("item {}: tax out of range", index + 1)))?;
    let tax = round_to_i64(tax, "line tax")?;

    Ok(LineAmounts {
        rate,
        subtotal,
        tax,
    })
}

fn add(a: i64, b: i64) -> Result<i64, CoreError> {
    a.checked_add(b).ok_or_else(|| invalid("total out of range"))
}

/// Compute per-line amounts and document totals.
pub fn compute(lines: &[TaxableLine], supply: SupplyKind) -> Result<Computation, CoreError> {
    let mut totals = TaxBreakdown::default();
    let mut amounts = Vec::with_capacity(lines.len());

    for (index, line) in lines.iter().enumerate() {
        let line = line_amounts(index, line)?;

        totals.subtotal = add(totals.subtotal, line.subtotal)?;
        totals.tax_total = add(totals.tax_total, line.tax)?;
        match supply {
            SupplyKind::IntraState => {
                let cgst = line.tax / 2;
                totals.cgst = add(totals.cgst, cgst)?;
                totals.sgst = add(totals.sgst, line.tax - cgst)?;
            }
            SupplyKind::InterState => {
                totals.igst = add(totals.igst, line.tax)?;
            }
        }

        amounts.push(line);
    }

    let exact = add(totals.subtotal, totals.tax_total)?;
    totals.grand_total = round_to_major(exact)?;
    totals.round_off = totals.grand_total - exact;

    Ok(Computation {
        lines: amounts,
        totals,
    })
}
