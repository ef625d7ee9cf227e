//! Fixed-precision decimal normalization for designated numeric fields.
//!
//! Values arriving from the service may be floats in scientific notation
//! (`6.125e-05`) or strings with stray whitespace. Designated fields are
//! rewritten as plain fixed-point decimal strings so downstream SQL can
//! cast them without surprises.

use std::collections::BTreeMap;
use std::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};
use serde_json::{Map, Value};

/// Decimal places applied to known numeric fields unless overridden.
fn default_places() -> BTreeMap<String, u32> {
    BTreeMap::from([
        ("F_TQOY_Price_9s2".to_string(), 2),
        ("F_price_effect_num".to_string(), 3),
        ("F_BOX_VOLUME".to_string(), 6),
        ("FNETWEIGHT".to_string(), 6),
        ("FGROSSWEIGHT".to_string(), 6),
    ])
}

/// Per-field precision table with a global enable toggle.
#[derive(Debug, Clone)]
pub struct DecimalFormats {
    enabled: bool,
    places: BTreeMap<String, u32>,
}

impl DecimalFormats {
    /// Builds the table from defaults merged with per-field overrides.
    pub fn new(enabled: bool, overrides: &BTreeMap<String, u32>) -> Self {
        let mut places = default_places();
        for (field, decimals) in overrides {
            places.insert(field.clone(), *decimals);
        }
        Self { enabled, places }
    }

    pub fn places_for(&self, field: &str) -> Option<u32> {
        self.places.get(field).copied()
    }

    /// Rewrites the record's listed fields in place.
    ///
    /// Fields absent from the table, or whose value is null, pass through
    /// unmodified. When normalization is disabled the record is untouched.
    pub fn normalize_record(&self, record: &mut Map<String, Value>) {
        if !self.enabled {
            return;
        }

        for (field, places) in &self.places {
            let Some(value) = record.get_mut(field) else {
                continue;
            };
            if value.is_null() {
                continue;
            }
            *value = match fmt_decimal_str(&value_to_text(value), *places) {
                Some(text) => Value::String(text),
                None => Value::Null,
            };
        }
    }
}

/// Converts numeric text (including scientific notation) into a plain
/// fixed-point string with exactly `places` fractional digits, rounding
/// half-away-from-zero.
///
/// Returns `None` when the trimmed input is empty. Text that does not
/// parse as a decimal numeral is returned unchanged so downstream
/// validation can deal with it.
pub fn fmt_decimal_str(value: &str, places: u32) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }

    let parsed = Decimal::from_str(trimmed).or_else(|_| Decimal::from_scientific(trimmed));
    match parsed {
        Ok(decimal) => {
            let rounded =
                decimal.round_dp_with_strategy(places, RoundingStrategy::MidpointAwayFromZero);
            Some(format!("{:.*}", places as usize, rounded))
        }
        Err(_) => Some(trimmed.to_string()),
    }
}

/// Textual form of a scalar value, matching how it would print.
fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
