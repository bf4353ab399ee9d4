//! Currency codes and amount validation.

use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::ServiceError;

/// Upper-case currency code such as `USD`, `TON` or `USDT`.
///
/// Codes are 3 to 5 ASCII letters; parsing normalizes to upper case. No
/// conversion between currencies is ever performed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Currency(String);

impl Currency {
    /// Parses and normalizes a currency code.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::InvalidRequest`] if the code is not 3–5
    /// ASCII letters.
    pub fn new(code: &str) -> Result<Self, ServiceError> {
        let code = code.trim();
        let valid = (3..=5).contains(&code.len()) && code.chars().all(|c| c.is_ascii_alphabetic());
        if !valid {
            return Err(ServiceError::InvalidRequest(format!(
                "invalid currency code: {code:?}"
            )));
        }
        Ok(Self(code.to_ascii_uppercase()))
    }

    /// Returns the code as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Currency {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for Currency {
    type Error = ServiceError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<Currency> for String {
    fn from(currency: Currency) -> Self {
        currency.0
    }
}

/// Decimal places every stored amount and balance fits in.
pub const MAX_SCALE: u32 = 8;

/// Exclusive upper bound for amounts and balances (`NUMERIC(20, 8)`).
pub const AMOUNT_LIMIT: Decimal = Decimal::from_parts(0xD4A5_1000, 0xE8, 0, false, 0);

/// Rejects zero and negative amounts before any ledger work happens.
///
/// # Errors
///
/// Returns [`ServiceError::InvalidAmount`] if `amount <= 0`, has more than
/// [`MAX_SCALE`] decimal places, or is not below [`AMOUNT_LIMIT`].
pub fn ensure_positive(amount: Decimal) -> Result<Decimal, ServiceError> {
    if amount <= Decimal::ZERO {
        return Err(ServiceError::InvalidAmount(amount));
    }
    ensure_storable(amount)
}

/// Checks that a non-negative amount or balance is representable in storage.
///
/// # Errors
///
/// Returns [`ServiceError::InvalidAmount`] on more than [`MAX_SCALE`]
/// significant decimal places or a value at or above [`AMOUNT_LIMIT`].
pub fn ensure_storable(amount: Decimal) -> Result<Decimal, ServiceError> {
    if amount.normalize().scale() > MAX_SCALE || amount.abs() >= AMOUNT_LIMIT {
        return Err(ServiceError::InvalidAmount(amount));
    }
    Ok(amount)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn currency_is_normalized() {
        let usd = Currency::new(" usd ");
        assert!(matches!(usd, Ok(ref c) if c.as_str() == "USD"));
    }

    #[test]
    fn currency_rejects_garbage() {
        assert!(Currency::new("US").is_err());
        assert!(Currency::new("DOLLARS").is_err());
        assert!(Currency::new("U$D").is_err());
    }

    #[test]
    fn currency_deserialization_validates() {
        let ok: Result<Currency, _> = serde_json::from_str("\"ton\"");
        assert!(matches!(ok, Ok(ref c) if c.as_str() == "TON"));
        let bad: Result<Currency, _> = serde_json::from_str("\"1\"");
        assert!(bad.is_err());
    }

    #[test]
    fn positive_amounts_only() {
        assert!(ensure_positive(dec!(0.01)).is_ok());
        assert!(matches!(
            ensure_positive(dec!(0)),
            Err(ServiceError::InvalidAmount(_))
        ));
        assert!(ensure_positive(dec!(-5)).is_err());
    }

    #[test]
    fn amounts_must_fit_storage() {
        assert_eq!(AMOUNT_LIMIT, dec!(1_000_000_000_000));
        assert!(ensure_positive(dec!(0.00000001)).is_ok());
        assert!(ensure_positive(dec!(1.50000000000)).is_ok());
        assert!(matches!(
            ensure_positive(dec!(0.000000001)),
            Err(ServiceError::InvalidAmount(_))
        ));
        assert!(ensure_positive(dec!(999_999_999_999.99999999)).is_ok());
        assert!(matches!(
            ensure_positive(dec!(1_000_000_000_000)),
            Err(ServiceError::InvalidAmount(_))
        ));
        assert!(ensure_positive(Decimal::MAX).is_err());
    }
}
