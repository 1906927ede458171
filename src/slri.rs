use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::catalog::{domain_category, Category, FallbackPolicy};
use crate::models::Bounds;
use crate::normalize::fold_text;
use crate::scoring::ScoringEngine;

/// Relative deviation up to which an exceedance counts as "léger".
pub const SLRI_SLIGHT_THRESHOLD: f64 = 0.10;

/// More major risks than this calls the project design into question.
const DESIGN_REVIEW_RISKS: usize = 5;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScaleError {
    #[error("{scale} must be between 0 and {max}, got {value}")]
    OutOfRange {
        scale: &'static str,
        value: i64,
        max: u8,
    },
}

macro_rules! ordinal_scale {
    ($(#[$meta:meta])* $name:ident, $scale:literal, [$($label:literal),+ $(,)?]) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
        pub struct $name(u8);

        impl $name {
            pub const LABELS: &'static [&'static str] = &[$($label),+];

            pub fn new(value: i64) -> Result<Self, ScaleError> {
                let max = Self::LABELS.len() - 1;
                match u8::try_from(value) {
                    Ok(level) if usize::from(level) <= max => Ok(Self(level)),
                    _ => Err(ScaleError::OutOfRange {
                        scale: $scale,
                        value,
                        // Label tables are tiny.
                        max: max as u8,
                    }),
                }
            }

            pub fn value(self) -> u8 {
                self.0
            }

            pub fn label(self) -> &'static str {
                Self::LABELS[usize::from(self.0)]
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{} ({})", self.0, self.label())
            }
        }
    };
}

ordinal_scale!(
    /// How long the impact lasts.
    Duree,
    "durée",
    ["Très court terme", "Court terme", "Moyen terme", "Long terme", "Permanent"]
);

ordinal_scale!(
    /// Spatial reach of the impact.
    Etendue,
    "étendue",
    ["Locale", "Régionale", "Nationale", "Internationale"]
);

ordinal_scale!(
    Frequence,
    "fréquence",
    ["Très rare", "Rare", "Occasionnelle", "Fréquente", "Permanente"]
);

ordinal_scale!(
    /// Conformity on the SLRI 0..=2 scale. Not interchangeable with `ScoreLevel`.
    ParameterScore,
    "score paramètre",
    ["Conforme", "Dépassement léger (≤10%)", "Dépassement important (>10%)"]
);

/// 0 inside the interval, 1 up to a 10% relative deviation, 2 beyond.
pub fn slri_parameter_score(value: f64, bounds: &Bounds) -> ParameterScore {
    match bounds.deviation(value) {
        None => ParameterScore(0),
        Some(deviation) if deviation.ratio <= SLRI_SLIGHT_THRESHOLD => ParameterScore(1),
        Some(_) => ParameterScore(2),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Amplitude {
    Faible,
    Moyen,
    Fort,
    #[serde(rename = "Très grave")]
    TresGrave,
}

impl Amplitude {
    pub fn from_score(score_final: u32) -> Self {
        match score_final {
            0..=4 => Amplitude::Faible,
            5..=8 => Amplitude::Moyen,
            9..=12 => Amplitude::Fort,
            _ => Amplitude::TresGrave,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Amplitude::Faible => "Faible",
            Amplitude::Moyen => "Moyen",
            Amplitude::Fort => "Fort",
            Amplitude::TresGrave => "Très grave",
        }
    }

    pub fn is_major(self) -> bool {
        matches!(self, Amplitude::Fort | Amplitude::TresGrave)
    }
}

impl fmt::Display for Amplitude {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RiskAssessment {
    pub parameter_score: ParameterScore,
    pub duree: Duree,
    pub etendue: Etendue,
    pub frequence: Frequence,
    pub score_final: u32,
    pub amplitude: Amplitude,
}

impl RiskAssessment {
    /// `score_final = score_parametre + durée × étendue × fréquence`.
    pub fn compute(
        parameter_score: ParameterScore,
        duree: Duree,
        etendue: Etendue,
        frequence: Frequence,
    ) -> Self {
        let score_final = u32::from(parameter_score.value())
            + u32::from(duree.value()) * u32::from(etendue.value()) * u32::from(frequence.value());

        Self {
            parameter_score,
            duree,
            etendue,
            frequence,
            score_final,
            amplitude: Amplitude::from_score(score_final),
        }
    }

    pub fn is_conforme(&self) -> bool {
        self.parameter_score.value() == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Phase {
    PreConstruction,
    Construction,
    Exploitation,
    Demantelement,
}

impl Phase {
    /// Case and accent insensitive; `-` and `_` read as spaces.
    pub fn parse(raw: &str) -> Option<Self> {
        let folded = fold_text(&raw.replace(['-', '_'], " "));
        match folded.as_str() {
            "pre construction" | "preconstruction" => Some(Phase::PreConstruction),
            "construction" => Some(Phase::Construction),
            "exploitation" => Some(Phase::Exploitation),
            "demantelement" | "demantalement" => Some(Phase::Demantelement),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Phase::PreConstruction => "PRE CONSTRUCTION",
            Phase::Construction => "CONSTRUCTION",
            Phase::Exploitation => "EXPLOITATION",
            Phase::Demantelement => "DÉMANTÈLEMENT",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One matrix line: a parameter observed in a medium during a project phase.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SlriRow {
    pub phase: String,
    pub milieu: String,
    pub parameter: String,
    pub value_raw: String,
    pub interval: Option<String>,
    /// Precomputed 0..=2 conformity; replaces the interval check when present.
    pub parameter_score: Option<i64>,
    pub duree: Option<i64>,
    pub etendue: Option<i64>,
    pub frequence: Option<i64>,
}

#[derive(Debug, Error, PartialEq)]
pub enum SlriRowError {
    #[error("unknown phase `{0}`")]
    UnknownPhase(String),
    #[error("value `{value}` of `{parameter}` is not numeric")]
    NonNumericValue { parameter: String, value: String },
    #[error("no acceptable interval for `{parameter}`")]
    NoInterval { parameter: String },
    #[error(transparent)]
    Scale(#[from] ScaleError),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlriEvaluation {
    pub phase: Phase,
    pub milieu: String,
    pub parameter: String,
    pub value: f64,
    pub interval: String,
    pub assessment: RiskAssessment,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhaseStatistics {
    pub mean_score: f64,
    pub max_score: u32,
    pub parameters: usize,
    pub non_conformes: usize,
    pub conformity_rate: f64,
}

impl PhaseStatistics {
    pub fn from_evaluations(evaluations: &[SlriEvaluation]) -> Self {
        if evaluations.is_empty() {
            return Self {
                mean_score: 0.0,
                max_score: 0,
                parameters: 0,
                non_conformes: 0,
                conformity_rate: 0.0,
            };
        }

        let count = evaluations.len();
        let total: u32 = evaluations.iter().map(|e| e.assessment.score_final).sum();
        let non_conformes = evaluations
            .iter()
            .filter(|e| !e.assessment.is_conforme())
            .count();

        Self {
            mean_score: f64::from(total) / count as f64,
            max_score: evaluations
                .iter()
                .map(|e| e.assessment.score_final)
                .max()
                .unwrap_or(0),
            parameters: count,
            non_conformes,
            conformity_rate: (count - non_conformes) as f64 / count as f64 * 100.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhaseReport {
    pub phase: Phase,
    pub evaluations: Vec<SlriEvaluation>,
    pub statistics: PhaseStatistics,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MajorRisk {
    pub phase: Phase,
    pub parameter: String,
    pub milieu: String,
    pub amplitude: Amplitude,
    pub score: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GlobalAssessment {
    pub phases: Vec<PhaseReport>,
    pub major_risks: Vec<MajorRisk>,
    pub recommendations: Vec<String>,
    /// Rows that could not be evaluated.
    pub skipped: usize,
}

/// Runs SLRI rows through the shared parser, normalizer and catalog.
pub struct SlriAssessor<'e, 'c> {
    engine: &'e ScoringEngine<'c>,
}

impl<'e, 'c> SlriAssessor<'e, 'c> {
    pub fn new(engine: &'e ScoringEngine<'c>) -> Self {
        Self { engine }
    }

    pub fn evaluate_row(&self, row: &SlriRow) -> Result<SlriEvaluation, SlriRowError> {
        let phase =
            Phase::parse(&row.phase).ok_or_else(|| SlriRowError::UnknownPhase(row.phase.clone()))?;

        let value = self
            .engine
            .parser()
            .parse_numeric(&row.value_raw)
            .ok_or_else(|| SlriRowError::NonNumericValue {
                parameter: row.parameter.clone(),
                value: row.value_raw.clone(),
            })?;

        let (parameter_score, interval) = match row.parameter_score {
            Some(level) => (
                ParameterScore::new(level)?,
                row.interval.clone().unwrap_or_default(),
            ),
            None => {
                let (bounds, interval) = self.resolve_interval(row)?;
                (slri_parameter_score(value, &bounds), interval)
            }
        };

        let assessment = RiskAssessment::compute(
            parameter_score,
            Duree::new(row.duree.unwrap_or(1))?,
            Etendue::new(row.etendue.unwrap_or(1))?,
            Frequence::new(row.frequence.unwrap_or(1))?,
        );

        Ok(SlriEvaluation {
            phase,
            milieu: row.milieu.clone(),
            parameter: row.parameter.clone(),
            value,
            interval,
            assessment,
        })
    }

    /// Explicit interval text first, then the catalog standard of the normalized name.
    fn resolve_interval(&self, row: &SlriRow) -> Result<(Bounds, String), SlriRowError> {
        if let Some(text) = row.interval.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            if let Some(bounds) = self.engine.parser().parse_interval(text) {
                return Ok((bounds, text.to_string()));
            }
        }

        let canonical = self.engine.normalizer().normalize(&row.parameter);
        self.engine
            .catalog()
            .lookup(&canonical, &row.parameter, "", FallbackPolicy::Strict)
            .map(|found| (found.standard.bounds(), found.standard.interval_label()))
            .ok_or_else(|| SlriRowError::NoInterval {
                parameter: row.parameter.clone(),
            })
    }

    pub fn assess(&self, rows: &[SlriRow]) -> GlobalAssessment {
        let mut evaluations = Vec::new();
        let mut phases_seen = BTreeSet::new();
        let mut skipped = 0;

        for row in rows {
            if let Some(phase) = Phase::parse(&row.phase) {
                phases_seen.insert(phase);
            }
            match self.evaluate_row(row) {
                Ok(evaluation) => evaluations.push(evaluation),
                Err(err) => {
                    warn!(parameter = %row.parameter, phase = %row.phase, error = %err, "skipping SLRI row");
                    skipped += 1;
                }
            }
        }

        let phases: Vec<PhaseReport> = phases_seen
            .into_iter()
            .map(|phase| {
                let evaluations: Vec<SlriEvaluation> = evaluations
                    .iter()
                    .filter(|e| e.phase == phase)
                    .cloned()
                    .collect();
                PhaseReport {
                    phase,
                    statistics: PhaseStatistics::from_evaluations(&evaluations),
                    evaluations,
                }
            })
            .collect();

        let major_risks: Vec<MajorRisk> = phases
            .iter()
            .flat_map(|report| report.evaluations.iter())
            .filter(|e| e.assessment.amplitude.is_major())
            .map(|e| MajorRisk {
                phase: e.phase,
                parameter: e.parameter.clone(),
                milieu: e.milieu.clone(),
                amplitude: e.assessment.amplitude,
                score: e.assessment.score_final,
            })
            .collect();

        let recommendations = recommendations(&major_risks);

        info!(
            phases = phases.len(),
            evaluated = evaluations.len(),
            skipped,
            major_risks = major_risks.len(),
            "SLRI assessment complete"
        );

        GlobalAssessment {
            phases,
            major_risks,
            recommendations,
            skipped,
        }
    }
}

pub fn recommendations(major_risks: &[MajorRisk]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut push = |text: String| {
        if !out.contains(&text) {
            out.push(text);
        }
    };

    for risk in major_risks {
        match domain_category(&risk.milieu) {
            Some(Category::Eau) => {
                push(format!(
                    "Mettre en place un système de traitement des eaux pour le milieu {}",
                    risk.milieu
                ));
                push("Installer des dispositifs de surveillance continue de la qualité de l'eau".to_string());
            }
            Some(Category::Sol) => {
                push("Prévoir des mesures de protection et de réhabilitation des sols".to_string());
                push("Mettre en place un plan de gestion des terres excavées".to_string());
            }
            Some(Category::Air) => {
                push("Installer des systèmes de dépoussiérage et de filtration".to_string());
                push("Mettre en place un plan de surveillance de la qualité de l'air".to_string());
            }
            _ => {}
        }
    }

    if major_risks.len() > DESIGN_REVIEW_RISKS {
        push("Réviser la conception du projet pour réduire les impacts environnementaux".to_string());
    }
    push("Élaborer un plan de gestion environnementale détaillé".to_string());
    push("Mettre en place un système de monitoring environnemental continu".to_string());

    out
}
