//! Unified-id cleanup.
//!
//! Ids arrive from spreadsheets that sometimes coerce them to numbers, so
//! the same app can show up as `"1234"`, `"1234.0"` or, with precision
//! already lost, `"6.6e+23"`.

/// Whether a raw id cell should be treated as absent.
pub fn is_null_like(value: &str) -> bool {
    let v = value.trim();
    v.is_empty()
        || v.eq_ignore_ascii_case("nan")
        || v.eq_ignore_ascii_case("none")
        || v.eq_ignore_ascii_case("null")
}

/// Whether `value` looks like a number in scientific notation.
pub fn is_scientific(value: &str) -> bool {
    let lower = value.trim().to_ascii_lowercase();
    lower.contains("e+") || lower.contains("e-")
}

/// Whether `value` is a 24-character hexadecimal id.
pub fn is_hex24(value: &str) -> bool {
    value.len() == 24 && value.chars().all(|c| c.is_ascii_hexdigit())
}

/// Outcome of normalizing one id cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NormalizedId {
    /// Usable id text.
    Id(String),
    /// Scientific notation; kept verbatim, it cannot address a record.
    Scientific(String),
    /// Blank or null-like.
    Empty,
}

/// Normalize an app id for joining.
///
/// * null-like → [`NormalizedId::Empty`]
/// * scientific notation → left untouched
/// * 24-char hex → left untouched
/// * integer-valued numbers (`"1234.0"`) → integer text (`"1234"`)
/// * anything else → trimmed text
pub fn normalize_app_id(raw: &str) -> NormalizedId {
    let s = raw.trim();
    if is_null_like(s) || s.to_ascii_lowercase().starts_with("nan") {
        return NormalizedId::Empty;
    }
    if is_scientific(s) {
        return NormalizedId::Scientific(s.to_string());
    }
    if is_hex24(s) {
        return NormalizedId::Id(s.to_string());
    }
    if let Some(int) = integer_text(s) {
        return NormalizedId::Id(int);
    }
    NormalizedId::Id(s.to_string())
}

/// `"1234.000"` → `"1234"`; `None` for anything not integer-valued.
fn integer_text(s: &str) -> Option<String> {
    let (int_part, frac_part) = match s.split_once('.') {
        Some((i, f)) => (i, f),
        None => (s, ""),
    };
    let digits = int_part.strip_prefix('-').unwrap_or(int_part);
    if digits.is_empty()
        || !digits.chars().all(|c| c.is_ascii_digit())
        || !frac_part.chars().all(|c| c == '0')
    {
        return None;
    }
    let trimmed = digits.trim_start_matches('0');
    let body = if trimmed.is_empty() { "0" } else { trimmed };
    if int_part.starts_with('-') && body != "0" {
        Some(format!("-{}", body))
    } else {
        Some(body.to_string())
    }
}
