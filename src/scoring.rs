use tracing::{debug, info, warn};

use crate::catalog::{FallbackPolicy, MatchSource, Standard, StandardsCatalog};
use crate::models::{Bounds, Direction, ParameterReading, ScoreLevel, ScoredParameter};
use crate::normalize::{contains_word, fold_text, ParameterNameNormalizer};
use crate::value::ValueParser;

/// Relative deviation up to which an out-of-range value is only "attention".
pub const ATTENTION_THRESHOLD: f64 = 0.2;

pub const STATUS_NON_NUMERIC: &str = "Valeur non numérique";
pub const STATUS_NOT_FOUND: &str = "Standard non trouvé";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conformity {
    Conforme,
    SlightlyBelow,
    FarBelow,
    SlightlyAbove,
    FarAbove,
}

impl Conformity {
    pub fn level(self) -> ScoreLevel {
        match self {
            Conformity::Conforme => ScoreLevel::Conforme,
            Conformity::SlightlyBelow | Conformity::SlightlyAbove => ScoreLevel::Attention,
            Conformity::FarBelow | Conformity::FarAbove => ScoreLevel::Critique,
        }
    }

    pub fn status(self) -> &'static str {
        match self {
            Conformity::Conforme => "Conforme",
            Conformity::SlightlyBelow => "Légèrement en dessous",
            Conformity::FarBelow => "Très en dessous",
            Conformity::SlightlyAbove => "Légèrement au dessus",
            Conformity::FarAbove => "Très au dessus",
        }
    }

    pub fn direction(self) -> Option<Direction> {
        match self {
            Conformity::Conforme => None,
            Conformity::SlightlyBelow | Conformity::FarBelow => Some(Direction::Below),
            Conformity::SlightlyAbove | Conformity::FarAbove => Some(Direction::Above),
        }
    }
}

pub fn assess(value: f64, bounds: &Bounds) -> Conformity {
    match bounds.deviation(value) {
        None => Conformity::Conforme,
        Some(deviation) => match (deviation.direction, deviation.ratio <= ATTENTION_THRESHOLD) {
            (Direction::Below, true) => Conformity::SlightlyBelow,
            (Direction::Below, false) => Conformity::FarBelow,
            (Direction::Above, true) => Conformity::SlightlyAbove,
            (Direction::Above, false) => Conformity::FarAbove,
        },
    }
}

/// Score and status for one value against one standard, in that order of null checks.
pub fn score(value: Option<f64>, standard: Option<&Standard>) -> (ScoreLevel, String) {
    match (value, standard) {
        (None, _) => (ScoreLevel::Unscored, STATUS_NON_NUMERIC.to_string()),
        (Some(_), None) => (ScoreLevel::Unscored, STATUS_NOT_FOUND.to_string()),
        (Some(value), Some(standard)) => {
            let conformity = assess(value, &standard.bounds());
            (conformity.level(), conformity.status().to_string())
        }
    }
}

/// Parameter-specific wording for an out-of-range value. Never changes the score.
pub fn domain_status(canonical_name: &str, direction: Direction) -> Option<&'static str> {
    let name = fold_text(canonical_name);

    if contains_word(&name, "ph") {
        return Some(match direction {
            Direction::Below => "Trop acide",
            Direction::Above => "Trop basique",
        });
    }
    if name.contains("temperature") {
        return Some(match direction {
            Direction::Below => "Température basse",
            Direction::Above => "Température élevée",
        });
    }
    if direction == Direction::Below {
        return None;
    }
    if name.contains("conductivite") {
        Some("Salinité élevée")
    } else if name.contains("turbidite") {
        Some("Eau troublée")
    } else if name.contains("dbo") || name.contains("dco") {
        Some("Pollution organique élevée")
    } else if name.contains("nitrates") || name.contains("phosphates") {
        Some("Concentration élevée en nutriments")
    } else {
        None
    }
}

/// Parse, normalize, look up and score extracted rows against an injected catalog.
#[derive(Debug)]
pub struct ScoringEngine<'a> {
    catalog: &'a StandardsCatalog,
    normalizer: ParameterNameNormalizer,
    parser: ValueParser,
    policy: FallbackPolicy,
    domain_status: bool,
}

impl<'a> ScoringEngine<'a> {
    pub fn new(catalog: &'a StandardsCatalog) -> anyhow::Result<Self> {
        Ok(Self {
            catalog,
            normalizer: ParameterNameNormalizer::new(catalog.names()),
            parser: ValueParser::new()?,
            policy: FallbackPolicy::default(),
            domain_status: false,
        })
    }

    pub fn with_policy(mut self, policy: FallbackPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_domain_status(mut self, enabled: bool) -> Self {
        self.domain_status = enabled;
        self
    }

    pub fn catalog(&self) -> &StandardsCatalog {
        self.catalog
    }

    pub fn normalizer(&self) -> &ParameterNameNormalizer {
        &self.normalizer
    }

    pub fn parser(&self) -> &ValueParser {
        &self.parser
    }

    pub fn score_reading(&self, reading: &ParameterReading) -> ScoredParameter {
        let parsed = self.parser.parse(&reading.value_raw);
        let canonical_name = self.normalizer.normalize(&reading.parameter_name);
        let matched = self.catalog.lookup(
            &canonical_name,
            &reading.parameter_name,
            &reading.unit,
            self.policy,
        );

        match &matched {
            Some(found) if found.source != MatchSource::Primary => info!(
                parameter = %reading.parameter_name,
                standard = %found.name,
                source = ?found.source,
                "fallback standard used"
            ),
            Some(_) => {}
            None => warn!(parameter = %reading.parameter_name, "no standard found"),
        }

        let standard = matched.as_ref().map(|found| &found.standard);
        let (score, mut status) = score(parsed.value, standard);

        if self.domain_status {
            if let (Some(value), Some(standard)) = (parsed.value, standard) {
                if let Some(phrase) = assess(value, &standard.bounds())
                    .direction()
                    .and_then(|direction| domain_status(&canonical_name, direction))
                {
                    status = phrase.to_string();
                }
            }
        }

        debug!(
            parameter = %reading.parameter_name,
            canonical = %canonical_name,
            value = ?parsed.value,
            score = score.value(),
            "scored reading"
        );

        ScoredParameter {
            reading: reading.clone(),
            canonical_name,
            numeric_value: parsed.value,
            estimated: parsed.estimated,
            match_source: matched.as_ref().map(|found| found.source),
            standard: matched.map(|found| found.standard),
            score,
            status,
        }
    }

    /// Rows are independent; order is preserved.
    pub fn score_all(&self, readings: &[ParameterReading]) -> Vec<ScoredParameter> {
        let scored: Vec<ScoredParameter> = readings
            .iter()
            .map(|reading| self.score_reading(reading))
            .collect();

        info!(rows = scored.len(), "scored readings");
        scored
    }
}
