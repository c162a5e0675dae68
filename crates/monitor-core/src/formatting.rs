use unicode_width::UnicodeWidthStr;

/// Marker appended to a non-negative change.
pub const UP_ARROW: char = '▲';
/// Marker appended to a negative change.
pub const DOWN_ARROW: char = '▼';

/// Format a floating-point number with thousands separators and a fixed number
/// of decimal places.
///
/// # Examples
///
/// ```
/// use monitor_core::formatting::format_number;
///
/// assert_eq!(format_number(1234.5,  1), "1,234.5");
/// assert_eq!(format_number(1234567.0, 0), "1,234,567");
/// assert_eq!(format_number(0.0, 2), "0.00");
/// assert_eq!(format_number(-9876.5, 1), "-9,876.5");
/// ```
pub fn format_number(value: f64, decimals: u32) -> String {
    let negative = value < 0.0;
    let abs_value = value.abs();

    // Nudge exact binary midpoints before rounding.
    let factor = 10_f64.powi(decimals as i32);
    let epsilon = f64::EPSILON * abs_value * factor;
    let rounded = ((abs_value * factor) + epsilon).round() / factor;

    let grouped = group_thousands(&(rounded.trunc() as u64).to_string());

    let result = if decimals == 0 {
        grouped
    } else {
        let frac_str = format!("{:.prec$}", rounded.fract(), prec = decimals as usize);
        // "0.50" → ".50"
        format!("{}{}", grouped, &frac_str[1..])
    };

    if negative && rounded != 0.0 {
        format!("-{}", result)
    } else {
        result
    }
}

/// Render a week-over-week change (a fraction) as the report shows it.
///
/// The magnitude is printed in percent with two decimals followed by an
/// arrow for the direction. An undefined change renders as an empty string.
///
/// ```
/// use monitor_core::formatting::format_change;
///
/// assert_eq!(format_change(Some(0.125)), "12.50%▲");
/// assert_eq!(format_change(Some(-0.5)), "50.00%▼");
/// assert_eq!(format_change(None), "");
/// ```
pub fn format_change(change: Option<f64>) -> String {
    match change {
        Some(c) if c.is_finite() => {
            let arrow = if c >= 0.0 { UP_ARROW } else { DOWN_ARROW };
            format!("{:.2}%{}", (c * 100.0).abs(), arrow)
        }
        _ => String::new(),
    }
}

/// Parse a rendered change back into percent points.
///
/// `"12.50%▲"` → `Some(12.5)`, `"12.50%▼"` → `Some(-12.5)`. A bare signed
/// number with or without `%` is accepted too. Blank input → `None`.
pub fn parse_change_pct(text: &str) -> Option<f64> {
    let s = text.trim();
    if s.is_empty() {
        return None;
    }
    let negative = s.contains(DOWN_ARROW);
    let body: String = s
        .chars()
        .filter(|c| *c != UP_ARROW && *c != DOWN_ARROW && *c != '%' && *c != ',')
        .collect();
    let magnitude: f64 = body.trim().parse().ok()?;
    if negative {
        Some(-magnitude.abs())
    } else {
        Some(magnitude)
    }
}

// ── Console tables ────────────────────────────────────────────────────────────

/// Pad `text` with spaces to `width` terminal columns.
///
/// Width is measured in display columns so CJK text lines up.
pub fn pad_to_width(text: &str, width: usize) -> String {
    let current = UnicodeWidthStr::width(text);
    if current >= width {
        return text.to_string();
    }
    format!("{}{}", text, " ".repeat(width - current))
}

/// Cut `text` to at most `max` display columns, marking the cut with `…`.
pub fn truncate_to_width(text: &str, max: usize) -> String {
    if UnicodeWidthStr::width(text) <= max {
        return text.to_string();
    }
    let mut out = String::new();
    let mut used = 0;
    for ch in text.chars() {
        let w = unicode_width::UnicodeWidthChar::width(ch).unwrap_or(0);
        if used + w + 1 > max {
            break;
        }
        out.push(ch);
        used += w;
    }
    out.push('…');
    out
}

/// Render a plain-text table with a header rule.
///
/// Cells wider than `max_cell` columns are truncated.
pub fn render_table(headers: &[&str], rows: &[Vec<String>], max_cell: usize) -> String {
    let cols = headers.len();
    let cell = |row: &Vec<String>, i: usize| -> String {
        truncate_to_width(row.get(i).map(String::as_str).unwrap_or(""), max_cell)
    };

    let mut widths: Vec<usize> = headers.iter().map(|h| UnicodeWidthStr::width(*h)).collect();
    for row in rows {
        for (i, width) in widths.iter_mut().enumerate() {
            *width = (*width).max(UnicodeWidthStr::width(cell(row, i).as_str()));
        }
    }

    let render_line = |cells: Vec<String>| -> String {
        cells
            .iter()
            .zip(&widths)
            .map(|(c, w)| pad_to_width(c, *w))
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };

    let mut out = String::new();
    out.push_str(&render_line(headers.iter().map(|h| h.to_string()).collect()));
    out.push('\n');
    let total: usize = widths.iter().sum::<usize>() + 2 * cols.saturating_sub(1);
    out.push_str(&"─".repeat(total));
    out.push('\n');
    for row in rows {
        out.push_str(&render_line((0..cols).map(|i| cell(row, i)).collect()));
        out.push('\n');
    }
    out
}

// ── Internal helpers ──────────────────────────────────────────────────────────

/// Insert commas every three digits from the right of an integer string.
fn group_thousands(s: &str) -> String {
    if s.len() <= 3 {
        return s.to_string();
    }
    let chars: Vec<char> = s.chars().collect();
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    let remainder = chars.len() % 3;
    for (i, &c) in chars.iter().enumerate() {
        if i != 0 && (i % 3 == remainder) {
            result.push(',');
        }
        result.push(c);
    }
    result
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    // ── format_number ────────────────────────────────────────────────────────

    #[test]
    fn test_format_number_zero() {
        assert_eq!(format_number(0.0, 0), "0");
        assert_eq!(format_number(0.0, 2), "0.00");
    }

    #[test]
    fn test_format_number_with_thousands() {
        assert_eq!(format_number(1_234.5, 1), "1,234.5");
        assert_eq!(format_number(1_234_567.0, 0), "1,234,567");
    }

    #[test]
    fn test_format_number_negative() {
        assert_eq!(format_number(-9_876.5, 1), "-9,876.5");
        assert_eq!(format_number(-0.001, 0), "0");
    }

    // ── format_change / parse_change_pct ─────────────────────────────────────

    #[test]
    fn test_format_change_directions() {
        assert_eq!(format_change(Some(0.25)), "25.00%▲");
        assert_eq!(format_change(Some(0.0)), "0.00%▲");
        assert_eq!(format_change(Some(-0.1234)), "12.34%▼");
    }

    #[test]
    fn test_format_change_undefined() {
        assert_eq!(format_change(None), "");
        assert_eq!(format_change(Some(f64::INFINITY)), "");
    }

    #[test]
    fn test_parse_change_pct() {
        assert_eq!(parse_change_pct("12.50%▲"), Some(12.5));
        assert_eq!(parse_change_pct("12.50%▼"), Some(-12.5));
        assert_eq!(parse_change_pct("-3%"), Some(-3.0));
        assert_eq!(parse_change_pct(""), None);
        assert_eq!(parse_change_pct("n/a"), None);
    }

    #[test]
    fn test_change_text_survives_reparse() {
        let text = format_change(Some(-0.375));
        let pct = parse_change_pct(&text).unwrap();
        assert!((pct + 37.5).abs() < 1e-9);
    }

    // ── Tables ───────────────────────────────────────────────────────────────

    #[test]
    fn test_pad_to_width_cjk() {
        assert_eq!(pad_to_width("汇总", 6), "汇总  ");
        assert_eq!(pad_to_width("abc", 2), "abc");
    }

    #[test]
    fn test_truncate_to_width() {
        assert_eq!(truncate_to_width("abcdef", 4), "abc…");
        assert_eq!(truncate_to_width("abc", 4), "abc");
    }

    #[test]
    fn test_render_table_aligns_columns() {
        let rows = vec![
            vec!["腾讯 汇总".to_string(), "1".to_string()],
            vec!["A".to_string(), "22".to_string()],
        ];
        let table = render_table(&["company", "n"], &rows, 40);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("company"));
        // "腾讯 汇总" is 9 columns wide, same as the padded "A" row prefix.
        assert_eq!(lines[2], "腾讯 汇总  1");
        assert_eq!(lines[3], "A          22");
    }
}
