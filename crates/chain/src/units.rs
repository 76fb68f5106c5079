//! Fixed-point conversions between on-chain integers and decimals.
//!
//! On-chain amounts stay in `U256` for arithmetic that can exceed 96 bits
//! (balance times exchange rate); they are converted to [`Decimal`] only
//! once the scale has been divided out.

use alloy::primitives::U256;
use rust_decimal::Decimal;
use thiserror::Error;

/// WAD constant: 1e18 for 18-decimal fixed-point arithmetic
pub const WAD: U256 = U256::from_limbs([1_000_000_000_000_000_000u64, 0, 0, 0]);

/// Basis points denominator (10000 = 100%)
pub const BPS_DENOMINATOR: U256 = U256::from_limbs([10_000u64, 0, 0, 0]);

/// Largest mantissa a `Decimal` can hold (2^96 - 1).
const MAX_MANTISSA: u128 = 79_228_162_514_264_337_593_543_950_335;

/// Largest scale a `Decimal` can hold.
const MAX_SCALE: u32 = 28;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UnitsError {
    #[error("value {0} does not fit in a decimal")]
    Overflow(U256),
    #[error("negative amount {0}")]
    Negative(Decimal),
    #[error("amount {0} overflows 256 bits at {1} decimals")]
    TooLarge(Decimal, u8),
}

/// 10^exp as U256.
#[inline]
pub fn pow10(exp: u32) -> U256 {
    U256::from(10u64).pow(U256::from(exp))
}

/// value * (10000 - bps) / 10000, e.g. a minimum output after slippage.
#[inline]
pub fn apply_basis_points(value: U256, basis_points: u16) -> U256 {
    let factor = U256::from(10_000u16.saturating_sub(basis_points));
    value.saturating_mul(factor) / BPS_DENOMINATOR
}

/// value * (10000 + bps) / 10000, e.g. a maximum input after slippage.
#[inline]
pub fn apply_basis_points_up(value: U256, basis_points: u16) -> U256 {
    let factor = U256::from(10_000u16.saturating_add(basis_points));
    value.saturating_mul(factor) / BPS_DENOMINATOR
}

/// Convert a raw amount with `decimals` to a decimal.
///
/// Digits beyond what a `Decimal` can represent are truncated.
pub fn units_to_decimal(amount: U256, decimals: u8) -> Result<Decimal, UnitsError> {
    let max = U256::from(MAX_MANTISSA);
    let ten = U256::from(10u8);
    let mut mantissa = amount;
    let mut scale = u32::from(decimals);

    while scale > MAX_SCALE || mantissa > max {
        if scale == 0 {
            return Err(UnitsError::Overflow(amount));
        }
        mantissa /= ten;
        scale -= 1;
    }

    let mantissa = i128::try_from(mantissa.to::<u128>()).map_err(|_| UnitsError::Overflow(amount))?;
    Decimal::try_from_i128_with_scale(mantissa, scale)
        .map(|d| d.normalize())
        .map_err(|_| UnitsError::Overflow(amount))
}

/// Convert a 1e18-scaled value to a decimal.
pub fn wad_to_decimal(wad: U256) -> Result<Decimal, UnitsError> {
    units_to_decimal(wad, 18)
}

/// Convert a non-negative decimal to raw units, truncating extra precision.
pub fn decimal_to_units(amount: Decimal, decimals: u8) -> Result<U256, UnitsError> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(UnitsError::Negative(amount));
    }
    let mantissa = U256::from(amount.mantissa().unsigned_abs());
    let scale = amount.scale();
    let target = u32::from(decimals);

    if target >= scale {
        mantissa
            .checked_mul(pow10(target - scale))
            .ok_or(UnitsError::TooLarge(amount, decimals))
    } else {
        Ok(mantissa / pow10(scale - target))
    }
}
