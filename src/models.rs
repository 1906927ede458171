use std::fmt;

use serde::Serialize;

use crate::catalog::{Category, MatchSource, Standard};

/// One extracted measurement row as produced upstream (OCR, vision model, spreadsheet).
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterReading {
    pub parameter_name: String,
    pub value_raw: String,
    pub unit: String,
}

impl ParameterReading {
    /// Returns `None` when the parameter name is blank; such rows carry nothing to score.
    pub fn new(parameter_name: &str, value_raw: &str, unit: &str) -> Option<Self> {
        let parameter_name = parameter_name.trim();
        if parameter_name.is_empty() {
            return None;
        }

        Some(Self {
            parameter_name: parameter_name.to_string(),
            value_raw: value_raw.trim().to_string(),
            unit: unit.trim().to_string(),
        })
    }
}

/// Acceptable interval; either side may be open.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Bounds {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Below,
    Above,
}

/// Distance outside an interval, relative to the crossed bound.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Deviation {
    pub direction: Direction,
    pub ratio: f64,
}

impl Bounds {
    pub fn new(min: Option<f64>, max: Option<f64>) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: f64) -> bool {
        self.min.map_or(true, |min| value >= min) && self.max.map_or(true, |max| value <= max)
    }

    /// `None` when the value is inside the interval.
    ///
    /// A zero bound makes the ratio undefined; it is reported as 1.0 so the
    /// value lands in the most severe band instead of dividing by zero.
    pub fn deviation(&self, value: f64) -> Option<Deviation> {
        if self.contains(value) {
            return None;
        }

        if let Some(min) = self.min {
            if value < min {
                return Some(Deviation {
                    direction: Direction::Below,
                    ratio: relative_distance(min - value, min),
                });
            }
        }

        if let Some(max) = self.max {
            if value > max {
                return Some(Deviation {
                    direction: Direction::Above,
                    ratio: relative_distance(value - max, max),
                });
            }
        }

        None
    }

    /// `"6.5-8.5 -"`, `"< 5 NTU"`, `"> 5 mg/L"`.
    pub fn label(&self, unit: &str) -> String {
        let interval = match (self.min, self.max) {
            (Some(min), Some(max)) => format!("{}-{}", format_number(min), format_number(max)),
            (None, Some(max)) => format!("< {}", format_number(max)),
            (Some(min), None) => format!("> {}", format_number(min)),
            (None, None) => String::new(),
        };

        let unit = unit.trim();
        if unit.is_empty() {
            interval
        } else {
            format!("{interval} {unit}")
        }
    }
}

fn relative_distance(distance: f64, reference: f64) -> f64 {
    if reference == 0.0 {
        1.0
    } else {
        distance / reference.abs()
    }
}

pub fn format_number(value: f64) -> String {
    format!("{value}")
}

/// Conformity level on the 0..=3 reporting scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ScoreLevel {
    Unscored,
    Conforme,
    Attention,
    Critique,
}

impl ScoreLevel {
    pub const ALL: [ScoreLevel; 4] = [
        ScoreLevel::Conforme,
        ScoreLevel::Attention,
        ScoreLevel::Critique,
        ScoreLevel::Unscored,
    ];

    pub fn value(self) -> u8 {
        match self {
            ScoreLevel::Unscored => 0,
            ScoreLevel::Conforme => 1,
            ScoreLevel::Attention => 2,
            ScoreLevel::Critique => 3,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ScoreLevel::Unscored => "Non évalué",
            ScoreLevel::Conforme => "Conforme",
            ScoreLevel::Attention => "Attention",
            ScoreLevel::Critique => "Critique",
        }
    }
}

impl fmt::Display for ScoreLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value())
    }
}

/// A reading after parsing, name normalization, catalog lookup and scoring.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredParameter {
    pub reading: ParameterReading,
    pub canonical_name: String,
    pub numeric_value: Option<f64>,
    pub estimated: bool,
    pub standard: Option<Standard>,
    pub match_source: Option<MatchSource>,
    pub score: ScoreLevel,
    pub status: String,
}

impl ScoredParameter {
    pub fn category(&self) -> Category {
        self.standard
            .as_ref()
            .map(|standard| standard.category)
            .unwrap_or(Category::Inconnu)
    }

    pub fn interval_label(&self) -> String {
        self.standard
            .as_ref()
            .map(Standard::interval_label)
            .unwrap_or_default()
    }
}

/// Output contract consumed by the spreadsheet and dashboard layers.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredRow {
    #[serde(rename = "Paramètre")]
    pub parameter: String,
    #[serde(rename = "Valeur")]
    pub value: String,
    #[serde(rename = "Unité")]
    pub unit: String,
    #[serde(rename = "Intervalle acceptable")]
    pub interval: String,
    #[serde(rename = "Score")]
    pub score: u8,
    #[serde(rename = "Statut")]
    pub status: String,
    #[serde(rename = "Catégorie")]
    pub category: String,
}

impl From<&ScoredParameter> for ScoredRow {
    fn from(scored: &ScoredParameter) -> Self {
        Self {
            parameter: scored.reading.parameter_name.clone(),
            value: scored.reading.value_raw.clone(),
            unit: scored.reading.unit.clone(),
            interval: scored.interval_label(),
            score: scored.score.value(),
            status: scored.status.clone(),
            category: scored.category().label().to_string(),
        }
    }
}

/// [`ScoredRow`] plus the intermediate results, for JSON consumers.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredRecord {
    #[serde(flatten)]
    pub row: ScoredRow,
    #[serde(rename = "Nom canonique")]
    pub canonical_name: String,
    #[serde(rename = "Valeur numérique")]
    pub numeric_value: Option<f64>,
    #[serde(rename = "Estimé")]
    pub estimated: bool,
    #[serde(rename = "Source du standard")]
    pub match_source: Option<MatchSource>,
}

impl From<&ScoredParameter> for ScoredRecord {
    fn from(scored: &ScoredParameter) -> Self {
        Self {
            row: ScoredRow::from(scored),
            canonical_name: scored.canonical_name.clone(),
            numeric_value: scored.numeric_value,
            estimated: scored.estimated,
            match_source: scored.match_source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_parameter_names_are_rejected() {
        assert!(ParameterReading::new("   ", "7", "-").is_none());
        let reading = ParameterReading::new(" pH ", " 7.2 ", " - ").unwrap();
        assert_eq!(reading.parameter_name, "pH");
        assert_eq!(reading.value_raw, "7.2");
        assert_eq!(reading.unit, "-");
    }

    #[test]
    fn closed_bounds_include_both_ends() {
        let bounds = Bounds::new(Some(25.0), Some(45.0));
        assert!(bounds.contains(25.0));
        assert!(bounds.contains(45.0));
        assert!(!bounds.contains(45.1));
        assert!(bounds.deviation(45.0).is_none());
    }

    #[test]
    fn open_bounds_only_check_the_present_side() {
        let upper_only = Bounds::new(None, Some(5.0));
        assert!(upper_only.contains(-100.0));
        assert!(!upper_only.contains(6.0));

        let lower_only = Bounds::new(Some(5.0), None);
        assert!(lower_only.contains(1_000.0));
        assert_eq!(lower_only.deviation(4.0).unwrap().direction, Direction::Below);
    }

    #[test]
    fn deviation_is_relative_to_crossed_bound() {
        let bounds = Bounds::new(Some(6.5), Some(8.5));
        let above = bounds.deviation(9.0).unwrap();
        assert_eq!(above.direction, Direction::Above);
        assert!((above.ratio - 0.5 / 8.5).abs() < 1e-9);

        let below = bounds.deviation(5.2).unwrap();
        assert_eq!(below.direction, Direction::Below);
        assert!((below.ratio - 0.2).abs() < 1e-9);
    }

    #[test]
    fn zero_bound_reports_full_deviation() {
        let bounds = Bounds::new(Some(0.0), Some(0.0));
        assert_eq!(bounds.deviation(0.5).unwrap().ratio, 1.0);
        assert_eq!(bounds.deviation(-0.5).unwrap().ratio, 1.0);
    }

    #[test]
    fn labels_render_open_and_closed_intervals() {
        assert_eq!(Bounds::new(Some(6.5), Some(8.5)).label("-"), "6.5-8.5 -");
        assert_eq!(Bounds::new(Some(25.0), Some(45.0)).label("°C"), "25-45 °C");
        assert_eq!(Bounds::new(None, Some(5.0)).label("NTU"), "< 5 NTU");
        assert_eq!(Bounds::new(Some(5.0), None).label(""), "> 5");
        assert_eq!(Bounds::new(Some(0.0001), Some(0.005)).label("m²/s"), "0.0001-0.005 m²/s");
    }
}
