//! Conversion between worksheet cells and serialized model fields
//!
//! Reading goes `CellValue -> serde_json::Value` (lenient: text is parsed into
//! the declared type). Writing goes the other way after [`check_json`] has
//! verified that the serialized field matches its declared column.

use crate::errors::{ValidationError, ValidationErrors};
use crate::formats;
use crate::types::{CellValue, ColumnType};
use serde_json::Value;

/// Coerce one cell into the JSON value serde will deserialize the field from
///
/// Empty cells become `null` so that `Option<T>` fields read back as `None`;
/// string columns keep them as `""`.
pub fn cell_to_json(field: &str, cell: &CellValue, ty: &ColumnType) -> Result<Value, ValidationError> {
    if cell.is_empty() {
        return Ok(match ty {
            ColumnType::String(_) => Value::String(String::new()),
            _ => Value::Null,
        });
    }

    match ty {
        ColumnType::String(constraints) => {
            let text = cell.to_string();
            constraints.check(field, &text)?;
            Ok(Value::String(text))
        }
        ColumnType::Int(constraints) => {
            let i = cell_to_int(field, cell)?;
            constraints.check(field, i)?;
            Ok(Value::from(i))
        }
        ColumnType::Float(constraints) => {
            let f = cell_to_float(field, cell)?;
            constraints.check(field, f)?;
            serde_json::Number::from_f64(f)
                .map(Value::Number)
                .ok_or_else(|| ValidationError::value_error(field, "Input should be a finite number"))
        }
        ColumnType::Bool => cell_to_bool(field, cell).map(Value::Bool),
        ColumnType::Email => formatted_text(field, cell, "email", formats::validate_email),
        ColumnType::Url => formatted_text(field, cell, "URL", formats::validate_url),
        ColumnType::Uuid => formatted_text(field, cell, "UUID", formats::validate_uuid),
        ColumnType::Date => formatted_text(field, cell, "date", formats::validate_date),
        ColumnType::DateTime => formatted_text(field, cell, "datetime", formats::validate_datetime),
        ColumnType::Json => match cell {
            CellValue::Text(s) => serde_json::from_str(s)
                .map_err(|e| ValidationError::type_error(field, format!("Invalid JSON: {}", e))),
            other => Ok(other.to_json()),
        },
        ColumnType::Any => Ok(match cell {
            CellValue::Text(s) => Value::String(s.clone()),
            other => other.to_json(),
        }),
    }
}

/// Check a serialized model field against its declared column
///
/// `null` is always accepted; whether the field is optional is serde's call.
pub fn check_json(field: &str, value: &Value, ty: &ColumnType) -> Result<(), ValidationError> {
    if value.is_null() {
        return Ok(());
    }

    match ty {
        ColumnType::String(constraints) => {
            let s = expect_str(field, value, ty)?;
            constraints.check(field, s)
        }
        ColumnType::Int(constraints) => {
            let i = value
                .as_i64()
                .ok_or_else(|| mismatch(field, value, ty))?;
            constraints.check(field, i)
        }
        ColumnType::Float(constraints) => {
            let f = value
                .as_f64()
                .ok_or_else(|| mismatch(field, value, ty))?;
            constraints.check(field, f)
        }
        ColumnType::Bool => value
            .as_bool()
            .map(|_| ())
            .ok_or_else(|| mismatch(field, value, ty)),
        ColumnType::Email => check_format(field, value, ty, "email", formats::validate_email),
        ColumnType::Url => check_format(field, value, ty, "URL", formats::validate_url),
        ColumnType::Uuid => check_format(field, value, ty, "UUID", formats::validate_uuid),
        ColumnType::Date => check_format(field, value, ty, "date", formats::validate_date),
        ColumnType::DateTime => {
            check_format(field, value, ty, "datetime", formats::validate_datetime)
        }
        ColumnType::Json | ColumnType::Any => Ok(()),
    }
}

/// Cell to store for a serialized field
///
/// JSON columns keep strings in their encoded form (`"a"` is stored with its
/// quotes) so that reading the cell back parses to the same value.
pub fn json_to_cell(value: &Value, ty: &ColumnType) -> CellValue {
    match (ty, value) {
        (ColumnType::Json, Value::String(_)) => CellValue::Text(value.to_string()),
        _ => CellValue::from_json(value),
    }
}

/// Run [`check_json`] over every `(field, type)` pair of a serialized record
pub fn check_record<'a, I>(record: &serde_json::Map<String, Value>, columns: I) -> Result<(), ValidationErrors>
where
    I: IntoIterator<Item = (&'a str, &'a ColumnType)>,
{
    let mut errors = ValidationErrors::new();
    for (field, ty) in columns {
        let value = record.get(field).unwrap_or(&Value::Null);
        if let Err(e) = check_json(field, value, ty) {
            errors.add(e);
        }
    }
    errors.into_result()
}

fn cell_to_int(field: &str, cell: &CellValue) -> Result<i64, ValidationError> {
    let invalid = || ValidationError::type_error(field, "Input should be a valid integer");
    match cell {
        CellValue::Int(i) => Ok(*i),
        CellValue::Float(f) => float_to_int(*f).ok_or_else(invalid),
        CellValue::Text(s) => {
            let s = s.trim();
            if let Ok(i) = s.parse::<i64>() {
                return Ok(i);
            }
            if is_grouped_thousands(s) {
                return Err(invalid());
            }
            parse_decimal(s).and_then(float_to_int).ok_or_else(invalid)
        }
        CellValue::Bool(_) | CellValue::Empty => Err(invalid()),
    }
}

fn cell_to_float(field: &str, cell: &CellValue) -> Result<f64, ValidationError> {
    let invalid = || ValidationError::type_error(field, "Input should be a valid number");
    match cell {
        CellValue::Int(i) => Ok(*i as f64),
        CellValue::Float(f) => Ok(*f),
        CellValue::Text(s) => parse_decimal(s.trim()).ok_or_else(invalid),
        CellValue::Bool(_) | CellValue::Empty => Err(invalid()),
    }
}

fn cell_to_bool(field: &str, cell: &CellValue) -> Result<bool, ValidationError> {
    let invalid = || ValidationError::type_error(field, "Input should be a valid boolean");
    match cell {
        CellValue::Bool(b) => Ok(*b),
        CellValue::Int(0) => Ok(false),
        CellValue::Int(1) => Ok(true),
        CellValue::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "y" | "on" | "1" => Ok(true),
            "false" | "no" | "n" | "off" | "0" => Ok(false),
            _ => Err(invalid()),
        },
        _ => Err(invalid()),
    }
}

/// Parse a decimal that may use `,` as the decimal separator
///
/// `"999,95"` and `"999.95"` both give 999.95. When both separators appear the
/// earlier one groups thousands (`"1,234.5"`, `"1.234,5"`). Spaces (including
/// the no-break space some locales group digits with) are ignored.
fn parse_decimal(s: &str) -> Option<f64> {
    let compact: String = s
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '\u{a0}')
        .collect();
    // Whichever separator comes last is the decimal point.
    let normalized = match (compact.rfind('.'), compact.rfind(',')) {
        (Some(dot), Some(comma)) if comma > dot => compact.replace('.', "").replace(',', "."),
        (Some(_), _) => compact.replace(',', ""),
        (None, Some(_)) => compact.replace(',', "."),
        (None, None) => compact,
    };
    normalized.parse::<f64>().ok().filter(|f| f.is_finite())
}

/// `"1,000"`: a lone comma followed by exactly three digits reads as a
/// thousands separator, which an integer column does not guess at
fn is_grouped_thousands(s: &str) -> bool {
    if s.contains('.') {
        return false;
    }
    match s.split_once(',') {
        Some((head, tail)) => {
            !head.is_empty()
                && !tail.contains(',')
                && tail.len() == 3
                && tail.bytes().all(|b| b.is_ascii_digit())
        }
        None => false,
    }
}

fn float_to_int(f: f64) -> Option<i64> {
    // i64::MAX as f64 rounds up to 2^63, which is out of range.
    if f.fract() == 0.0 && f >= i64::MIN as f64 && f < 9_223_372_036_854_775_808.0 {
        Some(f as i64)
    } else {
        None
    }
}

fn formatted_text(
    field: &str,
    cell: &CellValue,
    label: &str,
    check: fn(&str) -> bool,
) -> Result<Value, ValidationError> {
    let text = cell.to_string();
    let text = text.trim();
    if check(text) {
        Ok(Value::String(text.to_string()))
    } else {
        Err(ValidationError::format_error(
            field,
            format!("Invalid {} format: {}", label, text),
        ))
    }
}

fn check_format(
    field: &str,
    value: &Value,
    ty: &ColumnType,
    label: &str,
    check: fn(&str) -> bool,
) -> Result<(), ValidationError> {
    let s = expect_str(field, value, ty)?;
    if check(s) {
        Ok(())
    } else {
        Err(ValidationError::format_error(
            field,
            format!("Invalid {} format: {}", label, s),
        ))
    }
}

fn expect_str<'v>(field: &str, value: &'v Value, ty: &ColumnType) -> Result<&'v str, ValidationError> {
    value.as_str().ok_or_else(|| mismatch(field, value, ty))
}

fn mismatch(field: &str, value: &Value, ty: &ColumnType) -> ValidationError {
    let got = match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    };
    ValidationError::type_error(field, format!("Expected {}, got {}", ty.type_name(), got))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraints::NumericConstraints;
    use crate::errors::ErrorType;
    use serde_json::json;

    fn text(s: &str) -> CellValue {
        CellValue::Text(s.to_string())
    }

    #[test]
    fn test_parse_decimal_separators() {
        assert_eq!(parse_decimal("999,95"), Some(999.95));
        assert_eq!(parse_decimal("999.95"), Some(999.95));
        assert_eq!(parse_decimal("1,234.5"), Some(1234.5));
        assert_eq!(parse_decimal("1 234,5"), Some(1234.5));
        assert_eq!(parse_decimal("1.234,50"), Some(1234.5));
        assert_eq!(parse_decimal("abc"), None);
        assert_eq!(parse_decimal("inf"), None);
    }

    #[test]
    fn test_int_from_cells() {
        let ty = ColumnType::int();
        assert_eq!(cell_to_json("id", &text("42"), &ty).unwrap(), json!(42));
        assert_eq!(cell_to_json("id", &text(" 7 "), &ty).unwrap(), json!(7));
        assert_eq!(cell_to_json("id", &CellValue::Float(3.0), &ty).unwrap(), json!(3));
        assert_eq!(cell_to_json("id", &text("3,0"), &ty).unwrap(), json!(3));

        let err = cell_to_json("id", &text("3.5"), &ty).unwrap_err();
        assert_eq!(err.error_type, ErrorType::TypeError);
        assert!(cell_to_json("id", &text("abc"), &ty).is_err());
    }

    #[test]
    fn test_int_rejects_grouped_thousands() {
        let ty = ColumnType::int();
        let err = cell_to_json("qty", &text("1,000"), &ty).unwrap_err();
        assert_eq!(err.error_type, ErrorType::TypeError);
        assert!(cell_to_json("qty", &text("12,345"), &ty).is_err());
        assert_eq!(cell_to_json("qty", &text("7,0"), &ty).unwrap(), json!(7));
        assert_eq!(cell_to_json("qty", &text("1.000,0"), &ty).unwrap(), json!(1000));

        // Float columns still read a lone comma as the decimal point.
        assert_eq!(
            cell_to_json("price", &text("1,000"), &ColumnType::float()).unwrap(),
            json!(1.0)
        );
    }

    #[test]
    fn test_int_range_edges() {
        let ty = ColumnType::int();
        assert!(cell_to_json("id", &CellValue::Float(9_223_372_036_854_775_808.0), &ty).is_err());
        assert!(cell_to_json("id", &CellValue::Float(-9_223_372_036_854_775_808.0), &ty).is_ok());
        assert_eq!(float_to_int(9_007_199_254_740_992.0), Some(9_007_199_254_740_992));
    }

    #[test]
    fn test_empty_cells() {
        assert_eq!(
            cell_to_json("id", &CellValue::Empty, &ColumnType::int()).unwrap(),
            Value::Null
        );
        assert_eq!(
            cell_to_json("name", &text(""), &ColumnType::string()).unwrap(),
            json!("")
        );
    }

    #[test]
    fn test_float_with_constraints() {
        let ty = ColumnType::Float(NumericConstraints {
            minimum: Some(0.0),
            maximum: None,
        });
        assert_eq!(cell_to_json("price", &text("12,5"), &ty).unwrap(), json!(12.5));
        let err = cell_to_json("price", &text("-1"), &ty).unwrap_err();
        assert_eq!(err.error_type, ErrorType::ValueError);
    }

    #[test]
    fn test_bool_spellings() {
        let ty = ColumnType::Bool;
        for yes in ["TRUE", "true", "Yes", "1", "on"] {
            assert_eq!(cell_to_json("active", &text(yes), &ty).unwrap(), json!(true));
        }
        for no in ["FALSE", "no", "0", "off"] {
            assert_eq!(cell_to_json("active", &text(no), &ty).unwrap(), json!(false));
        }
        assert!(cell_to_json("active", &text("maybe"), &ty).is_err());
    }

    #[test]
    fn test_format_columns() {
        let ok = cell_to_json("email", &text("alice@example.com"), &ColumnType::Email);
        assert_eq!(ok.unwrap(), json!("alice@example.com"));

        let err = cell_to_json("email", &text("alice"), &ColumnType::Email).unwrap_err();
        assert_eq!(err.error_type, ErrorType::FormatError);
        assert_eq!(err.field, "email");
    }

    #[test]
    fn test_json_column() {
        let v = cell_to_json("tags", &text(r#"["a","b"]"#), &ColumnType::Json).unwrap();
        assert_eq!(v, json!(["a", "b"]));
        assert!(cell_to_json("tags", &text("[oops"), &ColumnType::Json).is_err());
    }

    #[test]
    fn test_json_column_round_trips_scalars() {
        let ty = ColumnType::Json;
        for value in [json!("hello"), json!("42"), json!(42), json!(true), json!({"a": [1]})] {
            let cell = json_to_cell(&value, &ty);
            assert_eq!(cell_to_json("meta", &cell, &ty).unwrap(), value);
        }
        assert_eq!(json_to_cell(&json!("hello"), &ty), text("\"hello\""));
        assert_eq!(json_to_cell(&json!("hello"), &ColumnType::string()), text("hello"));
        assert_eq!(json_to_cell(&Value::Null, &ty), CellValue::Empty);
    }

    #[test]
    fn test_any_keeps_typed_cells() {
        assert_eq!(
            cell_to_json("x", &CellValue::Int(5), &ColumnType::Any).unwrap(),
            json!(5)
        );
        assert_eq!(
            cell_to_json("x", &text("5"), &ColumnType::Any).unwrap(),
            json!("5")
        );
    }

    #[test]
    fn test_check_json() {
        assert!(check_json("id", &json!(1), &ColumnType::int()).is_ok());
        assert!(check_json("id", &json!(null), &ColumnType::int()).is_ok());
        assert!(check_json("id", &json!("1"), &ColumnType::int()).is_err());
        assert!(check_json("price", &json!(1), &ColumnType::float()).is_ok());
        assert!(check_json("email", &json!("nope"), &ColumnType::Email).is_err());
        assert!(check_json("meta", &json!({"a": 1}), &ColumnType::Json).is_ok());
    }

    #[test]
    fn test_check_record_collects_all_errors() {
        let record = json!({"id": "x", "email": "bad", "name": "ok"});
        let record = record.as_object().unwrap();
        let int = ColumnType::int();
        let email = ColumnType::Email;
        let string = ColumnType::string();
        let columns = vec![("id", &int), ("email", &email), ("name", &string)];
        let errors = check_record(record, columns).unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(errors.has_field("id"));
        assert!(errors.has_field("email"));
    }
}
