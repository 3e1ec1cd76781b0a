//! Turning user-typed text into position values and back.
//!
//! Numbers follow the Italian convention: `,` is the decimal separator and,
//! when a comma is present, `.` groups thousands (`1.234,56`). Text without a
//! comma is parsed as-is, so `1234.56` is also accepted.

use crate::error::{KpiError, Result};
use crate::position::PositionCode;
use crate::snapshot::BalanceSheetSnapshot;
use log::debug;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Message shown next to a field whose text is not a number.
pub const INVALID_NUMBER_MESSAGE: &str = "Valore non valido. Inserire un numero (es. 1234,56)";

/// Submitted form fields keyed by field name (`pos_<code>`).
pub type FormData = BTreeMap<String, String>;

/// How raw field text is interpreted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum InputMode {
    /// A single number.
    #[default]
    Plain,
    /// A sum such as `1.000,00 + 250,50 - 10`.
    Expression,
}

pub fn coerce_input(raw: &str) -> Result<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(0.0);
    }

    parse_number(trimmed).ok_or_else(|| KpiError::Parse {
        raw: raw.to_string(),
    })
}

fn parse_number(text: &str) -> Option<f64> {
    let normalized = match text.split_once(',') {
        Some((integer, fraction)) => {
            let fraction_ok =
                !fraction.is_empty() && fraction.bytes().all(|b| b.is_ascii_digit());
            if !fraction_ok {
                return None;
            }
            format!("{}.{}", ungroup(integer)?, fraction)
        }
        None => text.to_string(),
    };

    normalized.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Integer part before a decimal comma: plain digits, or `1.234.567` with
/// dots between groups of exactly three digits.
fn ungroup(integer: &str) -> Option<String> {
    let (sign, digits) = match integer.strip_prefix(['-', '+']) {
        Some(rest) => (&integer[..1], rest),
        None => ("", integer),
    };

    let mut groups = digits.split('.');
    let head = groups.next()?;
    let is_digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    if !is_digits(head) {
        return None;
    }

    let mut out = format!("{}{}", sign, head);
    let mut grouped = false;
    for group in groups {
        if group.len() != 3 || !is_digits(group) {
            return None;
        }
        grouped = true;
        out.push_str(group);
    }
    if grouped && head.len() > 3 {
        return None;
    }
    Some(out)
}

enum Token {
    Number(String),
    Sign(f64),
}

fn tokenize(text: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let flush = |current: &mut String, tokens: &mut Vec<Token>| {
        if !current.is_empty() {
            tokens.push(Token::Number(std::mem::take(current)));
        }
    };

    for c in text.chars() {
        match c {
            '+' | '-' => {
                flush(&mut current, &mut tokens);
                tokens.push(Token::Sign(if c == '-' { -1.0 } else { 1.0 }));
            }
            c if c.is_whitespace() => flush(&mut current, &mut tokens),
            c => current.push(c),
        }
    }
    flush(&mut current, &mut tokens);
    tokens
}

/// Evaluates `+`/`-` sums of numbers. Nothing but digits, separators, the two
/// operators and whitespace is accepted; each term follows [`coerce_input`] rules.
pub fn coerce_expression(raw: &str) -> Result<f64> {
    let invalid = |reason: String| KpiError::InvalidExpression {
        raw: raw.to_string(),
        reason,
    };

    let text = raw.trim();
    if text.is_empty() {
        return Ok(0.0);
    }

    if let Some(c) = text.chars().find(|c| {
        !(c.is_ascii_digit() || matches!(c, '.' | ',' | '+' | '-') || c.is_whitespace())
    }) {
        return Err(invalid(format!("unexpected character '{}'", c)));
    }

    let mut tokens = tokenize(text).into_iter().peekable();
    let mut sign = match tokens.peek() {
        Some(Token::Sign(s)) => {
            let s = *s;
            tokens.next();
            s
        }
        _ => 1.0,
    };

    let mut total = 0.0;
    loop {
        match tokens.next() {
            Some(Token::Number(term)) => {
                let value = parse_number(&term)
                    .ok_or_else(|| invalid(format!("'{}' is not a number", term)))?;
                total += sign * value;
            }
            Some(Token::Sign(_)) => return Err(invalid("operator without a number".to_string())),
            None => return Err(invalid("expression ends with an operator".to_string())),
        }

        match tokens.next() {
            Some(Token::Sign(s)) => sign = s,
            Some(Token::Number(_)) => {
                return Err(invalid("missing operator between numbers".to_string()))
            }
            None => break,
        }
    }

    if !total.is_finite() {
        return Err(invalid("result is not a finite number".to_string()));
    }
    Ok(total)
}

pub fn coerce(raw: &str, mode: InputMode) -> Result<f64> {
    match mode {
        InputMode::Plain => coerce_input(raw),
        InputMode::Expression => coerce_expression(raw),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldError {
    pub position: PositionCode,
    pub field_name: String,
    /// The text exactly as submitted.
    pub raw: String,
    pub message: String,
}

/// Outcome of validating one submitted form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FormValidation {
    /// Parsed values for every field that coerced cleanly.
    pub values: BTreeMap<PositionCode, f64>,
    /// Raw text per position, kept for redisplay.
    pub raw: BTreeMap<PositionCode, String>,
    pub errors: Vec<FieldError>,
}

impl FormValidation {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn error_for(&self, position: &PositionCode) -> Option<&FieldError> {
        self.errors.iter().find(|e| &e.position == position)
    }

    /// The parsed values as a snapshot, or the field errors if any field failed.
    pub fn into_snapshot(self) -> std::result::Result<BalanceSheetSnapshot, Vec<FieldError>> {
        if self.errors.is_empty() {
            Ok(BalanceSheetSnapshot::from(self.values))
        } else {
            Err(self.errors)
        }
    }
}

/// Coerces the field of every required position. Missing fields count as `"0"`.
pub fn validate_form(
    form: &FormData,
    required: &[PositionCode],
    mode: InputMode,
) -> FormValidation {
    let mut validation = FormValidation::default();

    for position in required {
        let field_name = position.field_name();
        let raw = form.get(&field_name).map(String::as_str).unwrap_or("0");

        match coerce(raw, mode) {
            Ok(value) => {
                validation.values.insert(position.clone(), value);
            }
            Err(err) => {
                let message = match &err {
                    KpiError::InvalidExpression { reason, .. } => {
                        format!("{} ({})", INVALID_NUMBER_MESSAGE, reason)
                    }
                    _ => INVALID_NUMBER_MESSAGE.to_string(),
                };
                validation.errors.push(FieldError {
                    position: position.clone(),
                    field_name,
                    raw: raw.to_string(),
                    message,
                });
            }
        }
        validation.raw.insert(position.clone(), raw.to_string());
    }

    if !validation.errors.is_empty() {
        debug!(
            "Form validation failed for {} of {} fields",
            validation.errors.len(),
            required.len()
        );
    }

    validation
}

/// Comma-decimal text that coerces back to exactly `value`.
pub fn format_for_input(value: f64) -> String {
    if value == 0.0 {
        return "0".to_string();
    }
    value.to_string().replace('.', ",")
}

/// Italian display formatting with thousands grouping: `1.234.567,89`.
pub fn format_amount(value: f64, decimals: usize) -> String {
    if !value.is_finite() {
        return "n/d".to_string();
    }

    let formatted = format!("{:.*}", decimals, value.abs());
    let (integer, fraction) = match formatted.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (formatted.as_str(), None),
    };

    let mut grouped = String::with_capacity(integer.len() + integer.len() / 3);
    for (i, digit) in integer.chars().enumerate() {
        if i > 0 && (integer.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(digit);
    }

    let is_zero = formatted.chars().all(|c| c == '0' || c == '.');
    let mut out = String::new();
    if value < 0.0 && !is_zero {
        out.push('-');
    }
    out.push_str(&grouped);
    if let Some(fraction) = fraction {
        out.push(',');
        out.push_str(fraction);
    }
    out
}
