use crate::error::{BinError, Result};

/// 检查字符串是否为有效的整数
pub fn is_integer_number(s: &str) -> bool {
    let s = s.trim();
    if s.is_empty() {
        return false;
    }

    let digits = s.strip_prefix('+').or_else(|| s.strip_prefix('-')).unwrap_or(s);
    !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
}

/// Splits a `key: value` line.
///
/// The label is everything before the first colon; a value that itself
/// contains colons (times such as `11:00:00:000`) keeps all remaining
/// segments joined by `:`. Lines without a colon have no value.
pub fn split_field(line: &str) -> Option<(&str, &str)> {
    let (key, value) = line.split_once(':')?;
    Some((key.trim(), value.trim()))
}

/// Turns a label such as `Device Unique Serial Code` into a field name.
pub fn field_name(label: &str) -> String {
    label.trim().replace(' ', "_")
}

/// 非本地化的浮点数解析，支持逗号作为小数点
pub fn parse_decimal(s: &str, decimal_separator: char) -> Result<f64> {
    let s = s.trim();
    let normalized = if decimal_separator == ',' {
        s.replace(',', ".")
    } else {
        s.to_string()
    };

    // 去掉单位后缀，例如 "100 Hz"
    let number = normalized.split_whitespace().next().unwrap_or("");
    number
        .parse::<f64>()
        .map_err(|_| BinError::InvalidFormat(format!("Not a number: '{}'", s)))
}

/// Integer parse for calibration fields.
///
/// Fields written with a decimal mark (`300,0`) are accepted when their
/// fractional part is zero.
pub fn parse_integer(s: &str, decimal_separator: char) -> Result<i64> {
    let s = s.trim();
    if is_integer_number(s) {
        return s
            .parse::<i64>()
            .map_err(|_| BinError::InvalidFormat(format!("Not an integer: '{}'", s)));
    }

    let value = parse_decimal(s, decimal_separator)?;
    if value.fract() != 0.0 {
        return Err(BinError::InvalidFormat(format!("Not an integer: '{}'", s)));
    }
    Ok(value as i64)
}

/// Byte substring search.
pub fn find_bytes(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Last occurrence of `needle` in `haystack`.
pub fn rfind_bytes(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).rposition(|w| w == needle)
}

/// Strips leading and trailing ASCII whitespace from a byte line.
pub fn trim_bytes(mut bytes: &[u8]) -> &[u8] {
    while let [first, rest @ ..] = bytes {
        if !first.is_ascii_whitespace() {
            break;
        }
        bytes = rest;
    }
    while let [rest @ .., last] = bytes {
        if !last.is_ascii_whitespace() {
            break;
        }
        bytes = rest;
    }
    bytes
}

/// Strips a trailing `\r` left by CRLF files.
pub fn trim_line_end(line: &str) -> &str {
    line.strip_suffix('\r').unwrap_or(line)
}
