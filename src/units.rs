//! Token amount representation.
//!
//! Balances are kept in base units (`10^-decimals` of a token). Human-facing
//! surfaces (config files, CLI output) use decimal token strings such as
//! `"1000.5"`, converted with [`parse_units`] and [`format_units`].

pub type Amount = u128;

/// Decimals used by the T9C token.
pub const TOKEN_DECIMALS: u8 = 18;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum UnitsError {
    #[error("empty amount")]
    Empty,
    #[error("invalid digit in amount {0:?}")]
    InvalidDigit(String),
    #[error("amount {value:?} has more than {decimals} fractional digits")]
    TooPrecise { value: String, decimals: u8 },
    #[error("amount {0:?} does not fit in 128 bits")]
    Overflow(String),
}

/// `10^decimals`, or `None` when it does not fit.
pub fn scale(decimals: u8) -> Option<Amount> {
    10u128.checked_pow(decimals as u32)
}

/// Parses a decimal token string into base units.
pub fn parse_units(value: &str, decimals: u8) -> Result<Amount, UnitsError> {
    let trimmed = value.trim().replace('_', "");
    if trimmed.is_empty() {
        return Err(UnitsError::Empty);
    }
    let (whole, frac) = match trimmed.split_once('.') {
        Some((w, f)) => (w, f),
        None => (trimmed.as_str(), ""),
    };
    if whole.is_empty() && frac.is_empty() {
        return Err(UnitsError::Empty);
    }
    let digits_ok = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if !digits_ok(whole) || !digits_ok(frac) {
        return Err(UnitsError::InvalidDigit(value.to_string()));
    }
    let frac = frac.trim_end_matches('0');
    if frac.len() > decimals as usize {
        return Err(UnitsError::TooPrecise {
            value: value.to_string(),
            decimals,
        });
    }

    let overflow = || UnitsError::Overflow(value.to_string());
    let unit = scale(decimals).ok_or_else(overflow)?;
    let whole: Amount = if whole.is_empty() {
        0
    } else {
        whole.parse().map_err(|_| overflow())?
    };
    let mut fraction: Amount = 0;
    if !frac.is_empty() {
        let pad = scale(decimals - frac.len() as u8).ok_or_else(overflow)?;
        let digits: Amount = frac.parse().map_err(|_| overflow())?;
        fraction = digits.checked_mul(pad).ok_or_else(overflow)?;
    }
    whole
        .checked_mul(unit)
        .and_then(|w| w.checked_add(fraction))
        .ok_or_else(overflow)
}

/// Renders base units as a decimal token string (`"980.0"`, `"0.5"`).
pub fn format_units(amount: Amount, decimals: u8) -> String {
    let Some(unit) = scale(decimals) else {
        return amount.to_string();
    };
    let whole = amount / unit;
    let frac = amount % unit;
    if frac == 0 {
        return format!("{whole}.0");
    }
    let frac = format!("{:0width$}", frac, width = decimals as usize);
    format!("{whole}.{}", frac.trim_end_matches('0'))
}

/// Whole tokens to base units at [`TOKEN_DECIMALS`]. Panics on overflow, so
/// only meant for constants and tests.
pub const fn tokens(whole: u128) -> Amount {
    whole * 1_000_000_000_000_000_000
}
