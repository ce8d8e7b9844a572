//! Product weight parsing.
//!
//! Weights arrive as free text in two grammars: `<number><unit>` (`200g`,
//! `1.5kg`, `500ml`, `16oz`) and `<count> x <number><unit>` (`3 x 100g`).
//! Everything is converted to kilograms. An unrecognized unit is an error,
//! never a silent zero.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

const GRAMS_PER_KG: f64 = 1000.0;
const KG_PER_OUNCE: f64 = 0.028_349_5;

static SINGLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<amount>\d+(?:\.\d+)?|\.\d+)\s*(?P<unit>[A-Za-z]+)$")
        .unwrap_or_else(|err| panic!("invalid weight pattern: {err}"))
});
static MULTI_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<count>\d+)\s*[xX]\s*(?P<amount>\d+(?:\.\d+)?)\s*(?P<unit>[A-Za-z]+)$")
        .unwrap_or_else(|err| panic!("invalid multipack pattern: {err}"))
});

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WeightError {
    #[error("Unrecognized weight unit '{unit}' in '{raw}'")]
    UnknownUnit { raw: String, unit: String },
    #[error("Unparseable weight '{0}'")]
    Unparseable(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeightUnit {
    Kilograms,
    Grams,
    Millilitres,
    Ounces,
}

impl WeightUnit {
    pub fn parse(unit: &str) -> Option<Self> {
        match unit.to_ascii_lowercase().as_str() {
            "kg" => Some(WeightUnit::Kilograms),
            "g" => Some(WeightUnit::Grams),
            "ml" => Some(WeightUnit::Millilitres),
            "oz" => Some(WeightUnit::Ounces),
            _ => None,
        }
    }

    pub fn to_kg(self, amount: f64) -> f64 {
        match self {
            WeightUnit::Kilograms => amount,
            // Density of 1 g/ml is assumed for liquids.
            WeightUnit::Grams | WeightUnit::Millilitres => amount / GRAMS_PER_KG,
            WeightUnit::Ounces => amount * KG_PER_OUNCE,
        }
    }
}

/// Parses a raw weight into kilograms, rounded to three decimals.
pub fn parse_weight_kg(raw: &str) -> Result<f64, WeightError> {
    let cleaned = raw
        .trim()
        .trim_end_matches(|c: char| c.is_whitespace() || c.is_ascii_punctuation());
    if cleaned.is_empty() {
        return Err(WeightError::Unparseable(raw.to_string()));
    }

    let (count, amount, unit) = if let Some(caps) = MULTI_RE.captures(cleaned) {
        let count: f64 = caps["count"]
            .parse()
            .map_err(|_| WeightError::Unparseable(raw.to_string()))?;
        (count, caps["amount"].to_string(), caps["unit"].to_string())
    } else if let Some(caps) = SINGLE_RE.captures(cleaned) {
        (1.0, caps["amount"].to_string(), caps["unit"].to_string())
    } else {
        return Err(WeightError::Unparseable(raw.to_string()));
    };

    let amount: f64 = amount
        .parse()
        .map_err(|_| WeightError::Unparseable(raw.to_string()))?;
    let unit = WeightUnit::parse(&unit).ok_or_else(|| WeightError::UnknownUnit {
        raw: raw.to_string(),
        unit,
    })?;
    Ok(round_kg(unit.to_kg(count * amount)))
}

fn round_kg(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

/// Bucket label derived from a kilogram weight for delivery planning.
pub fn weight_category(kg: f64) -> &'static str {
    if kg < 2.0 {
        "Light"
    } else if kg < 40.0 {
        "Mid_Sized"
    } else if kg < 140.0 {
        "Heavy"
    } else {
        "Truck_Required"
    }
}
