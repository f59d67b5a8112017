//! Checked fixed-point helpers.
//!
//! Every helper returns [`MathError`] instead of wrapping or panicking, so
//! callers can surface overflow as a fatal accounting error.

/// Arithmetic failure in a fixed-point helper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MathError {
    /// A multiplication or addition exceeded `u128::MAX`.
    #[error("arithmetic overflow")]
    Overflow,

    /// Division by zero.
    #[error("division by zero")]
    DivisionByZero,

    /// A subtraction would have gone negative.
    #[error("arithmetic underflow")]
    Underflow,
}

/// `a * b / denominator`, rounding down.
pub fn mul_div(a: u128, b: u128, denominator: u128) -> Result<u128, MathError> {
    if denominator == 0 {
        return Err(MathError::DivisionByZero);
    }
    let product = a.checked_mul(b).ok_or(MathError::Overflow)?;
    Ok(product / denominator)
}

/// `ceil(a / b)`.
pub fn ceil_div(a: u128, b: u128) -> Result<u128, MathError> {
    if b == 0 {
        return Err(MathError::DivisionByZero);
    }
    Ok(a / b + u128::from(a % b != 0))
}

/// `a - b`, failing instead of going negative.
pub fn checked_sub(a: u128, b: u128) -> Result<u128, MathError> {
    a.checked_sub(b).ok_or(MathError::Underflow)
}

/// `a + b`, failing on overflow.
pub fn checked_add(a: u128, b: u128) -> Result<u128, MathError> {
    a.checked_add(b).ok_or(MathError::Overflow)
}

/// Apply a basis-point rate to an amount, rounding down.
pub fn apply_bps(amount: u128, bps: u64) -> Result<u128, MathError> {
    mul_div(amount, u128::from(bps), u128::from(crate::BPS_DENOMINATOR))
}
