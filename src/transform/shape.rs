//! Row shaping: positional service rows into field-keyed records.

use serde_json::{Map, Value};

/// Shape of a raw service row, resolved once per row.
#[derive(Debug, Clone, PartialEq)]
pub enum RowShape {
    /// Already keyed by field name; passed through as-is.
    Keyed(Map<String, Value>),
    /// An ordered value sequence to be zipped against the field keys.
    Positional(Vec<Value>),
    /// Neither a sequence nor a mapping; dropped from the output.
    Unrecognized,
}

impl RowShape {
    pub fn classify(row: Value) -> Self {
        match row {
            Value::Object(map) => RowShape::Keyed(map),
            Value::Array(values) => RowShape::Positional(values),
            _ => RowShape::Unrecognized,
        }
    }
}

/// Re-keys raw rows against `field_keys`.
///
/// Positional rows shorter than the key list are padded with null; extra
/// trailing values are ignored. Unrecognized rows are dropped silently.
/// Record key order follows `field_keys` declaration order.
pub fn shape_rows(rows: Vec<Value>, field_keys: &[String]) -> Vec<Map<String, Value>> {
    rows.into_iter()
        .filter_map(|row| shape_row(row, field_keys))
        .collect()
}

fn shape_row(row: Value, field_keys: &[String]) -> Option<Map<String, Value>> {
    match RowShape::classify(row) {
        RowShape::Keyed(map) => Some(map),
        RowShape::Positional(values) => {
            let mut record = Map::new();
            let mut values = values.into_iter();
            for key in field_keys {
                record.insert(key.clone(), values.next().unwrap_or(Value::Null));
            }
            Some(record)
        }
        RowShape::Unrecognized => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn keys(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn short_row_pads_missing_keys_with_null() {
        let field_keys = keys(&["A", "B", "C", "D", "E"]);
        let rows = vec![json!(["1", "2", "3"])];

        let records = shape_rows(rows, &field_keys);

        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.len(), 5);
        assert_eq!(record["A"], json!("1"));
        assert_eq!(record["C"], json!("3"));
        assert_eq!(record["D"], Value::Null);
        assert_eq!(record["E"], Value::Null);
    }

    #[test]
    fn long_row_ignores_extra_values() {
        let field_keys = keys(&["A", "B"]);
        let rows = vec![json!(["1", "2", "3", "4"])];

        let records = shape_rows(rows, &field_keys);

        assert_eq!(records[0].len(), 2);
        assert_eq!(records[0]["B"], json!("2"));
    }

    #[test]
    fn keyed_row_passes_through_unchanged() {
        let field_keys = keys(&["A", "B"]);
        let rows = vec![json!({ "X": 1, "Y": "two" })];

        let records = shape_rows(rows, &field_keys);

        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["X"], json!(1));
        assert_eq!(records[0]["Y"], json!("two"));
    }

    #[test]
    fn unrecognized_rows_are_dropped() {
        let field_keys = keys(&["A"]);
        let rows = vec![json!("scalar"), json!(42), json!(null), json!(["1"])];

        let records = shape_rows(rows, &field_keys);

        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["A"], json!("1"));
    }

    #[test]
    fn record_keys_follow_declaration_order() {
        let field_keys = keys(&["FNUMBER", "FNAME", "F_BOX_VOLUME"]);
        let rows = vec![json!(["M001", "Widget", "0.5"])];

        let records = shape_rows(rows, &field_keys);

        let ordered: Vec<&String> = records[0].keys().collect();
        assert_eq!(ordered, vec!["FNUMBER", "FNAME", "F_BOX_VOLUME"]);
    }

    #[test]
    fn fetch_order_is_preserved() {
        let field_keys = keys(&["A"]);
        let rows = vec![json!(["1"]), json!(["2"]), json!(["3"])];

        let records = shape_rows(rows, &field_keys);

        let values: Vec<&Value> = records.iter().map(|r| &r["A"]).collect();
        assert_eq!(values, vec![&json!("1"), &json!("2"), &json!("3")]);
    }

    #[test]
    fn classify_resolves_each_shape_once() {
        assert!(matches!(
            RowShape::classify(json!({ "A": 1 })),
            RowShape::Keyed(_)
        ));
        assert!(matches!(
            RowShape::classify(json!([1, 2])),
            RowShape::Positional(_)
        ));
        assert!(matches!(
            RowShape::classify(json!("text")),
            RowShape::Unrecognized
        ));
        assert!(matches!(RowShape::classify(json!(3.5)), RowShape::Unrecognized));
    }
}
