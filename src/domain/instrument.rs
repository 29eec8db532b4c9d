//! Option instrument identity.
//!
//! An instrument is one (underlying, strike, option type) contract. It is used
//! directly as the per-instrument map key throughout the pipeline and rendered
//! into a store-safe key for persistence.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Call or put leg of an option series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OptionType {
    Call,
    Put,
}

impl OptionType {
    /// Single-letter code used in keys and logs
    pub fn code(&self) -> &'static str {
        match self {
            OptionType::Call => "C",
            OptionType::Put => "P",
        }
    }

    /// The other leg at the same strike (straddle counterpart)
    pub fn opposite(&self) -> OptionType {
        match self {
            OptionType::Call => OptionType::Put,
            OptionType::Put => OptionType::Call,
        }
    }
}

impl fmt::Display for OptionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for OptionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "c" | "call" => Ok(OptionType::Call),
            "p" | "put" => Ok(OptionType::Put),
            other => Err(format!("unknown option type: {}", other)),
        }
    }
}

/// One tradable option contract
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Instrument {
    /// Underlying symbol (e.g. "ES")
    pub underlying: String,
    /// Strike price
    pub strike: Decimal,
    /// Call or put
    pub option_type: OptionType,
}

impl Instrument {
    pub fn new(underlying: impl Into<String>, strike: Decimal, option_type: OptionType) -> Self {
        Self {
            underlying: underlying.into(),
            strike,
            option_type,
        }
    }

    /// Filesystem/store-safe identifier, e.g. "ES-5000-C"
    pub fn key(&self) -> String {
        format!(
            "{}-{}-{}",
            self.underlying,
            self.strike.normalize().to_string().replace('.', "_"),
            self.option_type.code()
        )
    }

    /// The opposite-type contract at the same strike
    pub fn sibling(&self) -> Instrument {
        Instrument {
            underlying: self.underlying.clone(),
            strike: self.strike,
            option_type: self.option_type.opposite(),
        }
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}",
            self.underlying,
            self.strike.normalize(),
            self.option_type
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_option_type_parsing() {
        assert_eq!("call".parse::<OptionType>().unwrap(), OptionType::Call);
        assert_eq!("P".parse::<OptionType>().unwrap(), OptionType::Put);
        assert!("straddle".parse::<OptionType>().is_err());
    }

    #[test]
    fn test_key_is_store_safe() {
        let instrument = Instrument::new("ES", dec!(5000.50), OptionType::Call);
        assert_eq!(instrument.key(), "ES-5000_50-C");

        // Trailing zeros are normalized away so keys stay stable
        let instrument = Instrument::new("ES", dec!(5000.00), OptionType::Put);
        assert_eq!(instrument.key(), "ES-5000-P");
    }

    #[test]
    fn test_sibling_flips_type_only() {
        let call = Instrument::new("ES", dec!(5000), OptionType::Call);
        let put = call.sibling();

        assert_eq!(put.underlying, "ES");
        assert_eq!(put.strike, call.strike);
        assert_eq!(put.option_type, OptionType::Put);
        assert_eq!(put.sibling(), call);
    }

    #[test]
    fn test_display() {
        let instrument = Instrument::new("ES", dec!(5000), OptionType::Call);
        assert_eq!(instrument.to_string(), "ES 5000 C");
    }
}
