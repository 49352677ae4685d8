//! Number formatting for report text.

/// Placeholder for a value the source did not report
pub const MISSING: &str = "정보없음";

/// Format an optional number: integer values get thousands separators,
/// everything else `digits` decimals. Missing or non-finite values render as [`MISSING`].
pub fn safe_num(value: Option<f64>, digits: usize) -> String {
    let Some(v) = value.filter(|v| v.is_finite()) else {
        return MISSING.to_string();
    };

    if v.fract() == 0.0 {
        group_thousands(&format!("{:.0}", v))
    } else {
        group_thousands(&format!("{:.*}", digits, v))
    }
}

pub fn fmt_pct(value: Option<f64>) -> String {
    let s = safe_num(value, 2);
    if s == MISSING {
        s
    } else {
        format!("{}%", s)
    }
}

/// Insert `,` every three digits of the integer part of a plain decimal string
pub fn group_thousands(plain: &str) -> String {
    let (sign, rest) = match plain.strip_prefix('-') {
        Some(r) => ("-", r),
        None => ("", plain),
    };
    let (int_part, frac_part) = match rest.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (rest, None),
    };

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    match frac_part {
        Some(f) => format!("{}{}.{}", sign, grouped, f),
        None => format!("{}{}", sign, grouped),
    }
}
