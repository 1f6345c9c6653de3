//! Unit Conversion - DXN <-> dei
//!
//! 1 DXN = 10^18 dei. On-chain amounts are always dei; DXN only exists
//! for configuration and display. Conversions go through `rust_decimal`
//! so a `deposit_dxn = 49.95` in config never picks up float dust.

use alloy::primitives::U256;
use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};

/// dei per DXN (18 decimals).
pub const DEI_PER_DXN: u128 = 1_000_000_000_000_000_000;

/// Convert a DXN amount to dei, truncating sub-dei precision.
/// `None` for negative amounts or values past `Decimal` range.
pub fn dxn_to_dei(dxn: Decimal) -> Option<U256> {
    if dxn.is_sign_negative() {
        return None;
    }
    let scaled = dxn.checked_mul(Decimal::from_u128(DEI_PER_DXN)?)?;
    scaled.trunc().to_u128().map(U256::from)
}

/// Convert a dei amount to DXN. `None` when the amount exceeds what
/// `Decimal` can represent (display-only concern, never protocol).
pub fn dei_to_dxn(dei: U256) -> Option<Decimal> {
    let raw = u128::try_from(dei).ok()?;
    Decimal::from_u128(raw)?.checked_div(Decimal::from_u128(DEI_PER_DXN)?)
}

/// Human-readable DXN rendering of a dei amount, falling back to the
/// raw dei count for amounts past display range.
pub fn format_dxn(dei: U256) -> String {
    dei_to_dxn(dei).map_or_else(|| format!("{dei} dei"), |d| d.normalize().to_string())
}
