// Amount parsing shared by extraction, composite splitting and column scoring.

use crate::model::Amount;

const CURRENCY_SYMBOLS: &[char] = &[
    '¥', '￥', '$', '€', '£', '₽', '₹', '₩', '₪', '₫', '₡', '₵', '₺', '₴', '₸', '₼', '₲', '₱', '₭',
    '₯', '₰', '₳', '₶', '₷', '₻', '₾', '₿',
];

/// Largest magnitude a single cell may carry: ten trillion units, in cents.
/// Keeps any realistic column sum well inside `i64`.
pub const MAX_CENTS: i64 = 1_000_000_000_000_000;

/// Parse a currency-like cell into cents.
///
/// Currency symbols, thousands separators and a trailing `元`/`块` are
/// ignored; `(123.45)` is negative. Rounds half away from zero at the cent.
pub fn parse_amount(raw: &str) -> Result<Amount, String> {
    let mut s = raw.trim();
    if s.is_empty() {
        return Err("empty amount".to_string());
    }

    let mut negative = false;
    if let Some(inner) = strip_parens(s) {
        negative = true;
        s = inner.trim();
    }

    let cleaned: String = s
        .chars()
        .filter(|c| !CURRENCY_SYMBOLS.contains(c) && *c != ',' && !c.is_whitespace())
        .collect();
    let mut cleaned = cleaned.as_str();
    for unit in ["元", "块"] {
        if let Some(rest) = cleaned.strip_suffix(unit) {
            cleaned = rest;
        }
    }

    let (sign_negative, digits) = match cleaned.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, cleaned.strip_prefix('+').unwrap_or(cleaned)),
    };
    if sign_negative {
        negative = !negative;
    }

    let cents = match decimal_to_cents(digits) {
        Some(cents) => cents,
        None => float_to_cents(digits).ok_or_else(|| format!("not a number: '{}'", raw.trim()))?,
    };
    if cents > MAX_CENTS {
        return Err(format!("amount out of range: '{}'", raw.trim()));
    }

    Ok(Amount::from_cents(if negative { -cents } else { cents }))
}

/// True when the cell reads as an amount
pub fn is_amount(raw: &str) -> bool {
    parse_amount(raw).is_ok()
}

fn strip_parens(s: &str) -> Option<&str> {
    let inner = s
        .strip_prefix('(')
        .or_else(|| s.strip_prefix('（'))?;
    inner
        .strip_suffix(')')
        .or_else(|| inner.strip_suffix('）'))
}

/// `123`, `123.4`, `.5`, `123.456` with integer math; rounds on the third decimal.
fn decimal_to_cents(s: &str) -> Option<i64> {
    let (whole, frac) = match s.split_once('.') {
        Some((w, f)) => (w, f),
        None => (s, ""),
    };
    if whole.is_empty() && frac.is_empty() {
        return None;
    }
    if !whole.chars().all(|c| c.is_ascii_digit()) || !frac.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    let whole: i64 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
    let mut digits = frac.chars().map(|c| c as i64 - '0' as i64);
    let tenths = digits.next().unwrap_or(0);
    let hundredths = digits.next().unwrap_or(0);
    let round_up = digits.next().map(|d| d >= 5).unwrap_or(false);

    let cents = whole
        .checked_mul(100)?
        .checked_add(tenths * 10 + hundredths)?;
    Some(if round_up { cents + 1 } else { cents })
}

/// Anything else `f64` accepts (exponents), as long as it is finite.
fn float_to_cents(s: &str) -> Option<i64> {
    let value: f64 = s.parse().ok()?;
    if !value.is_finite() || value.abs() >= 9.0e16 {
        return None;
    }
    Some((value * 100.0).round() as i64)
}
