//! Composite string formatting for `Context::format`.

use serde::{Deserialize, Serialize};

use crate::errors::{ScriptError, ScriptResult};
use crate::evaluator::value::{TypedValue, Value};

/// Separators used when numbers are rendered by format specifiers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NumberFormat {
    pub decimal_separator: String,
    pub group_separator: String,
    pub group_size: usize,
}

impl Default for NumberFormat {
    fn default() -> Self {
        Self {
            decimal_separator: ".".to_string(),
            group_separator: ",".to_string(),
            group_size: 3,
        }
    }
}

struct Placeholder<'a> {
    index: usize,
    alignment: i64,
    spec: Option<&'a str>,
}

fn format_error(message: impl Into<String>) -> ScriptError {
    ScriptError::argument(message)
}

pub(super) fn format(nf: &NumberFormat, template: &str, args: &[TypedValue]) -> ScriptResult<String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(pos) = rest.find(['{', '}']) {
        out.push_str(&rest[..pos]);
        let brace = &rest[pos..];
        if brace.starts_with("{{") {
            out.push('{');
            rest = &brace[2..];
        } else if brace.starts_with("}}") {
            out.push('}');
            rest = &brace[2..];
        } else if brace.starts_with('}') {
            return Err(format_error("input string was not in a correct format: unmatched '}'"));
        } else {
            let end = brace
                .find('}')
                .ok_or_else(|| format_error("input string was not in a correct format: unclosed '{'"))?;
            let placeholder = parse_placeholder(&brace[1..end])?;
            let arg = args.get(placeholder.index).ok_or_else(|| {
                format_error(format!(
                    "format index {} is out of range ({} arguments)",
                    placeholder.index,
                    args.len()
                ))
            })?;
            let text = match placeholder.spec {
                Some(spec) => format_spec(nf, &arg.value, spec)?,
                None => plain(nf, &arg.value),
            };
            out.push_str(&align(text, placeholder.alignment));
            rest = &brace[end + 1..];
        }
    }
    out.push_str(rest);
    Ok(out)
}

fn parse_placeholder(body: &str) -> ScriptResult<Placeholder<'_>> {
    let (head, spec) = match body.split_once(':') {
        Some((head, spec)) => (head, Some(spec)),
        None => (body, None),
    };
    let (index, alignment) = match head.split_once(',') {
        Some((index, alignment)) => (index, Some(alignment)),
        None => (head, None),
    };
    let index = index
        .trim()
        .parse::<usize>()
        .map_err(|_| format_error(format!("invalid format index '{}'", index.trim())))?;
    let alignment = match alignment {
        Some(a) => a
            .trim()
            .parse::<i64>()
            .map_err(|_| format_error(format!("invalid format alignment '{}'", a.trim())))?,
        None => 0,
    };
    Ok(Placeholder {
        index,
        alignment,
        spec,
    })
}

fn align(text: String, alignment: i64) -> String {
    let width = alignment.unsigned_abs() as usize;
    let len = text.chars().count();
    if len >= width {
        return text;
    }
    let pad = " ".repeat(width - len);
    if alignment > 0 {
        pad + &text
    } else {
        text + &pad
    }
}

fn plain(nf: &NumberFormat, value: &Value) -> String {
    let text = value.to_string();
    match value {
        Value::Float(_) | Value::Double(_) | Value::Decimal(_) if nf.decimal_separator != "." => {
            text.replacen('.', &nf.decimal_separator, 1)
        }
        _ => text,
    }
}

fn format_spec(nf: &NumberFormat, value: &Value, spec: &str) -> ScriptResult<String> {
    let mut chars = spec.chars();
    let Some(kind) = chars.next() else {
        return Ok(plain(nf, value));
    };
    let digits = chars.as_str();
    let precision = if digits.is_empty() {
        None
    } else {
        Some(
            digits
                .parse::<usize>()
                .map_err(|_| format_error(format!("invalid format specifier '{}'", spec)))?,
        )
    };
    let not_numeric = || format_error(format!("format '{}' needs a numeric argument", spec));

    match kind {
        'N' | 'n' => {
            let fixed = fixed_digits(value, precision.unwrap_or(2)).ok_or_else(not_numeric)?;
            Ok(localize(nf, &fixed, true))
        }
        'F' | 'f' => {
            let fixed = fixed_digits(value, precision.unwrap_or(2)).ok_or_else(not_numeric)?;
            Ok(localize(nf, &fixed, false))
        }
        'D' | 'd' => {
            let n = value.as_i128().ok_or_else(not_numeric)?;
            let width = precision.unwrap_or(0);
            let digits = format!("{:0width$}", n.unsigned_abs(), width = width);
            Ok(if n < 0 { format!("-{}", digits) } else { digits })
        }
        'X' | 'x' => {
            let bits = two_complement(value).ok_or_else(not_numeric)?;
            let width = precision.unwrap_or(0);
            Ok(if kind == 'X' {
                format!("{:0width$X}", bits, width = width)
            } else {
                format!("{:0width$x}", bits, width = width)
            })
        }
        'E' | 'e' => {
            let f = value.as_f64().ok_or_else(not_numeric)?;
            Ok(localize(nf, &exponent(f, precision.unwrap_or(6), kind), false))
        }
        _ => Err(format_error(format!("unknown format specifier '{}'", spec))),
    }
}

/// Fixed-point digits with '.' as the separator
fn fixed_digits(value: &Value, precision: usize) -> Option<String> {
    match value {
        Value::Decimal(d) => Some(format!("{:.*}", precision, d.round_dp(precision as u32))),
        Value::Float(f) => Some(format!("{:.*}", precision, f)),
        Value::Double(f) => Some(format!("{:.*}", precision, f)),
        other => other.as_i128().map(|n| {
            if precision == 0 {
                n.to_string()
            } else {
                format!("{}.{}", n, "0".repeat(precision))
            }
        }),
    }
}

/// Swap in the configured separators, grouping the integer part if asked
fn localize(nf: &NumberFormat, fixed: &str, grouped: bool) -> String {
    let (sign, unsigned) = match fixed.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", fixed),
    };
    let (int_part, frac_part) = match unsigned.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (unsigned, None),
    };
    let mut out = String::from(sign);
    if grouped && nf.group_size > 0 && int_part.chars().all(|c| c.is_ascii_digit()) {
        let len = int_part.len();
        for (i, c) in int_part.chars().enumerate() {
            if i > 0 && (len - i) % nf.group_size == 0 {
                out.push_str(&nf.group_separator);
            }
            out.push(c);
        }
    } else {
        out.push_str(int_part);
    }
    if let Some(frac) = frac_part {
        out.push_str(&nf.decimal_separator);
        out.push_str(frac);
    }
    out
}

fn exponent(f: f64, precision: usize, kind: char) -> String {
    let raw = format!("{:.*e}", precision, f);
    let (mantissa, exp) = raw.split_once('e').unwrap_or((raw.as_str(), "0"));
    let exp: i32 = exp.parse().unwrap_or(0);
    let sign = if exp < 0 { '-' } else { '+' };
    let marker = if kind == 'E' { 'E' } else { 'e' };
    format!("{}{}{}{:03}", mantissa, marker, sign, exp.unsigned_abs())
}

/// Integral payload as its unsigned bit pattern at the value's own width
fn two_complement(value: &Value) -> Option<u128> {
    Some(match value {
        Value::SByte(n) => *n as u8 as u128,
        Value::Short(n) => *n as u16 as u128,
        Value::Int(n) => *n as u32 as u128,
        Value::Long(n) => *n as u64 as u128,
        other => other.as_i128().filter(|n| *n >= 0)? as u128,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn fmt(template: &str, args: &[TypedValue]) -> String {
        format(&NumberFormat::default(), template, args).unwrap()
    }

    #[test]
    fn test_positional_and_escapes() {
        assert_eq!(
            fmt("{1}-{0} {{literal}}", &[TypedValue::from("a"), TypedValue::from(2)]),
            "2-a {literal}"
        );
        assert_eq!(fmt("[{0,5}][{0,-5}]", &[TypedValue::from("ab")]), "[   ab][ab   ]");
    }

    #[test]
    fn test_numeric_specifiers() {
        assert_eq!(fmt("{0:N}", &[TypedValue::from(1234567.891)]), "1,234,567.89");
        assert_eq!(fmt("{0:N0}", &[TypedValue::from(-1234)]), "-1,234");
        assert_eq!(fmt("{0:F3}", &[TypedValue::from(Decimal::new(25, 1))]), "2.500");
        assert_eq!(fmt("{0:D4}", &[TypedValue::from(42)]), "0042");
        assert_eq!(fmt("{0:X}", &[TypedValue::from(255)]), "FF");
        assert_eq!(fmt("{0:x8}", &[TypedValue::from(-1)]), "ffffffff");
        assert_eq!(fmt("{0:E2}", &[TypedValue::from(12345.0)]), "1.23E+004");
    }

    #[test]
    fn test_custom_separators() {
        let nf = NumberFormat {
            decimal_separator: ",".to_string(),
            group_separator: ".".to_string(),
            group_size: 3,
        };
        let out = format(&nf, "{0:N2} {1}", &[TypedValue::from(1234.5), TypedValue::from(0.5)]).unwrap();
        assert_eq!(out, "1.234,50 0,5");
    }

    #[test]
    fn test_malformed_templates() {
        let nf = NumberFormat::default();
        assert!(format(&nf, "{0", &[TypedValue::from(1)]).is_err());
        assert!(format(&nf, "{1}", &[TypedValue::from(1)]).is_err());
        assert!(format(&nf, "}", &[]).is_err());
        assert!(format(&nf, "{0:D}", &[TypedValue::from("x")]).is_err());
    }
}
