use anyhow::Context;
use regex::Regex;

use crate::models::Bounds;
use crate::normalize::fold_text;

const NUMBER: &str = r"[0-9]+(?:[.,][0-9]+)?";

const MISSING_MARKERS: &[&str] = &[
    "", "nan", "n/a", "na", "nd", "n.d.", "-", "--", "none", "null", "non disponible", "non mesure",
];

/// Result of reading a free-form value cell.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ParsedValue {
    pub value: Option<f64>,
    /// The cell carried an "(estimé)" marker.
    pub estimated: bool,
}

/// Turns extracted value text into one representative number.
///
/// First match wins: scientific notation or product (`a x 10^n`, `a x b`),
/// `a-b` range (midpoint), leading comparison operator (magnitude only),
/// first embedded number.
#[derive(Debug, Clone)]
pub struct ValueParser {
    estimate_marker: Regex,
    scientific: Regex,
    range: Regex,
    inner_range: Regex,
    comparison: Regex,
    number: Regex,
}

impl ValueParser {
    pub fn new() -> anyhow::Result<Self> {
        Ok(Self {
            estimate_marker: Regex::new(r"(?i)\(\s*estim(?:é|e)e?s?\s*\)")
                .context("failed to compile estimate marker regex")?,
            scientific: Regex::new(&format!(
                r"(?i)([-+]?{NUMBER})\s*[x×*]\s*(?:10([-+][0-9]+)|({NUMBER})(?:\s*\^\s*([-+]?[0-9]+))?)"
            ))
            .context("failed to compile scientific notation regex")?,
            range: Regex::new(&format!(
                r"^({NUMBER})\s*-\s*({NUMBER})(?:\s*[^0-9.,\-\s].*)?$"
            ))
            .context("failed to compile range regex")?,
            inner_range: Regex::new(r"[0-9]\s*-\s*[0-9]")
                .context("failed to compile inner range regex")?,
            comparison: Regex::new(&format!(
                r"^(>=|<=|≥|≤|>|<)\s*([-+]?{NUMBER}(?:[eE][-+]?[0-9]+)?)"
            ))
            .context("failed to compile comparison regex")?,
            number: Regex::new(&format!(r"-?{NUMBER}(?:[eE][-+]?[0-9]+)?"))
                .context("failed to compile number regex")?,
        })
    }

    pub fn parse(&self, raw: &str) -> ParsedValue {
        let estimated = self.estimate_marker.is_match(raw);
        let cleaned = self.estimate_marker.replace_all(raw, " ");
        let text = normalize_symbols(cleaned.trim());
        let text = text.trim();

        if MISSING_MARKERS.contains(&fold_text(text).as_str()) {
            return ParsedValue {
                value: None,
                estimated,
            };
        }

        ParsedValue {
            value: self.parse_number(text).filter(|value| value.is_finite()),
            estimated,
        }
    }

    /// Magnitude of a single value; `None` when no number can be read.
    pub fn parse_numeric(&self, raw: &str) -> Option<f64> {
        self.parse(raw).value
    }

    fn parse_number(&self, text: &str) -> Option<f64> {
        if let Some(caps) = self.scientific.captures(text) {
            let mantissa = to_f64(&caps[1])?;
            if let Some(exponent) = caps.get(2) {
                return Some(mantissa * 10f64.powi(exponent.as_str().parse().ok()?));
            }
            let factor = to_f64(caps.get(3)?.as_str())?;
            return match caps.get(4) {
                Some(exponent) => Some(mantissa * factor.powi(exponent.as_str().parse().ok()?)),
                None => Some(mantissa * factor),
            };
        }

        if let Some((low, high)) = self.range(text) {
            return Some((low + high) / 2.0);
        }

        if let Some(caps) = self.comparison.captures(text) {
            return to_f64(&caps[2]);
        }

        let found = self.number.find(text)?;
        let mut token = found.as_str();
        // A dash glued to a preceding word is a separator, not a sign.
        if token.starts_with('-') {
            let glued = text[..found.start()]
                .chars()
                .next_back()
                .map_or(false, |c| !c.is_whitespace() && c != '(');
            if glued {
                token = &token[1..];
            }
        }
        to_f64(token)
    }

    /// Reads acceptable-interval text such as `"6.5 - 8.5"`, `"<30°C"` or `"> 5 mg/L"`.
    pub fn parse_interval(&self, raw: &str) -> Option<Bounds> {
        let text = normalize_symbols(raw.trim());
        let text = text.trim();

        if let Some(caps) = self.comparison.captures(text) {
            let bound = to_f64(&caps[2])?;
            return match &caps[1] {
                "<" | "<=" | "≤" => Some(Bounds::new(None, Some(bound))),
                _ => Some(Bounds::new(Some(bound), None)),
            };
        }

        self.range(text)
            .map(|(low, high)| Bounds::new(Some(low.min(high)), Some(low.max(high))))
    }

    /// Leading `a-b` pair; a unit may follow but no further numeric range or date part.
    fn range(&self, text: &str) -> Option<(f64, f64)> {
        let caps = self.range.captures(text)?;
        let tail = &text[caps.get(2)?.end()..];
        if self.inner_range.is_match(tail) {
            return None;
        }
        Some((to_f64(&caps[1])?, to_f64(&caps[2])?))
    }
}

/// Superscript runs become `^`-prefixed exponents ("10⁻⁴" reads "10^-4").
fn normalize_symbols(text: &str) -> String {
    let mut normalized = String::with_capacity(text.len());
    let mut in_superscript = false;
    for c in text.chars() {
        match superscript(c) {
            Some(plain) => {
                if !in_superscript {
                    normalized.push('^');
                }
                normalized.push(plain);
                in_superscript = true;
            }
            None => {
                normalized.push(match c {
                    '−' | '–' => '-',
                    other => other,
                });
                in_superscript = false;
            }
        }
    }
    normalized
}

fn superscript(c: char) -> Option<char> {
    match c {
        '⁰' => Some('0'),
        '¹' => Some('1'),
        '²' => Some('2'),
        '³' => Some('3'),
        '⁴' => Some('4'),
        '⁵' => Some('5'),
        '⁶' => Some('6'),
        '⁷' => Some('7'),
        '⁸' => Some('8'),
        '⁹' => Some('9'),
        '⁻' => Some('-'),
        '⁺' => Some('+'),
        _ => None,
    }
}

fn to_f64(token: &str) -> Option<f64> {
    token.replace(',', ".").parse().ok()
}
