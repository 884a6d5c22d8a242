//! Resource quantity validation
//!
//! `k8s-openapi` carries quantities as opaque strings, so a malformed value
//! would only be rejected by the API server halfway through a reconcile.
//! This module checks the Kubernetes quantity grammar up front:
//!
//! ```text
//! <quantity> ::= <sign>? <number> <suffix>
//! <number>   ::= <digits> | <digits>.<digits> | <digits>. | .<digits>
//! <suffix>   ::= Ki | Mi | Gi | Ti | Pi | Ei | n | u | m | "" | k | M | G | T | P | E
//!              | (e | E) <sign>? <digits>
//! ```

use crate::error::{Error, Result};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

const BINARY_SUFFIXES: &[&str] = &["Ki", "Mi", "Gi", "Ti", "Pi", "Ei"];
const DECIMAL_SUFFIXES: &[&str] = &["n", "u", "m", "", "k", "M", "G", "T", "P", "E"];

/// Parse a resource quantity string such as `100m` or `128Mi`.
///
/// `field` names the flag or spec field the value came from and is only
/// used in the error.
pub fn parse_quantity(field: &'static str, value: &str) -> Result<Quantity> {
    let invalid = |reason: &str| Error::InvalidQuantity {
        field,
        value: value.to_string(),
        reason: reason.to_string(),
    };

    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(invalid("quantity is empty"));
    }
    if trimmed != value {
        return Err(invalid("quantity must not contain surrounding whitespace"));
    }

    let unsigned = match trimmed.as_bytes()[0] {
        b'-' => return Err(invalid("resource quantities must not be negative")),
        b'+' => &trimmed[1..],
        _ => trimmed,
    };

    let number_len = unsigned
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(unsigned.len());
    let (number, suffix) = unsigned.split_at(number_len);

    validate_number(number).map_err(invalid)?;
    validate_suffix(suffix).map_err(invalid)?;

    Ok(Quantity(value.to_string()))
}

fn validate_number(number: &str) -> std::result::Result<(), &'static str> {
    if number.is_empty() {
        return Err("expected a number");
    }
    let mut parts = number.splitn(2, '.');
    let whole = parts.next().unwrap_or_default();
    let fraction = parts.next();

    if fraction.map_or(false, |f| f.contains('.')) {
        return Err("number has more than one decimal point");
    }
    match fraction {
        Some(f) if whole.is_empty() && f.is_empty() => Err("expected digits around the decimal point"),
        _ => Ok(()),
    }
}

fn validate_suffix(suffix: &str) -> std::result::Result<(), &'static str> {
    if BINARY_SUFFIXES.contains(&suffix) || DECIMAL_SUFFIXES.contains(&suffix) {
        return Ok(());
    }

    if let Some(exponent) = suffix.strip_prefix(&['e', 'E'][..]) {
        let digits = exponent.strip_prefix(&['+', '-'][..]).unwrap_or(exponent);
        if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) {
            return Ok(());
        }
        return Err("malformed decimal exponent");
    }

    Err("unknown unit suffix")
}
