use std::collections::BTreeMap;
use std::fmt::Write;

use chrono::NaiveDate;
use serde::Serialize;

use crate::catalog::Category;
use crate::models::{ScoreLevel, ScoredParameter};
use crate::slri::GlobalAssessment;
use crate::trends::ParameterTrend;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LevelCount {
    pub level: u8,
    pub label: &'static str,
    pub count: usize,
    pub percent: f64,
}

/// An out-of-range row, with what is needed to read it without the table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlaggedParameter {
    pub parameter: String,
    pub value: String,
    pub unit: String,
    pub interval: String,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategorySummary {
    pub category: Category,
    pub count: usize,
    pub mean_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoringSummary {
    pub total: usize,
    pub levels: Vec<LevelCount>,
    pub critical: Vec<FlaggedParameter>,
    pub attention: Vec<FlaggedParameter>,
    pub categories: Vec<CategorySummary>,
}

fn flagged(row: &ScoredParameter) -> FlaggedParameter {
    FlaggedParameter {
        parameter: row.reading.parameter_name.clone(),
        value: row.reading.value_raw.clone(),
        unit: row.reading.unit.clone(),
        interval: row.interval_label(),
        status: row.status.clone(),
    }
}

fn percent(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 / total as f64 * 100.0
    }
}

pub fn summarize(rows: &[ScoredParameter]) -> ScoringSummary {
    let total = rows.len();

    let levels = ScoreLevel::ALL
        .iter()
        .map(|level| {
            let count = rows.iter().filter(|row| row.score == *level).count();
            LevelCount {
                level: level.value(),
                label: level.label(),
                count,
                percent: percent(count, total),
            }
        })
        .collect();

    let by_level = |level: ScoreLevel| -> Vec<FlaggedParameter> {
        rows.iter()
            .filter(|row| row.score == level)
            .map(flagged)
            .collect()
    };

    let mut categories: BTreeMap<Category, (usize, u32)> = BTreeMap::new();
    for row in rows {
        let entry = categories.entry(row.category()).or_insert((0, 0));
        entry.0 += 1;
        entry.1 += u32::from(row.score.value());
    }

    ScoringSummary {
        total,
        levels,
        critical: by_level(ScoreLevel::Critique),
        attention: by_level(ScoreLevel::Attention),
        categories: categories
            .into_iter()
            .map(|(category, (count, total_score))| CategorySummary {
                category,
                count,
                mean_score: f64::from(total_score) / count as f64,
            })
            .collect(),
    }
}

fn title_case(label: &str) -> String {
    let mut chars = label.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn write_flagged(output: &mut String, rows: &[FlaggedParameter], empty: &str) {
    if rows.is_empty() {
        let _ = writeln!(output, "{empty}");
        return;
    }
    for row in rows {
        let _ = writeln!(
            output,
            "- {}: {} {} (intervalle acceptable: {}) - {}",
            row.parameter,
            row.value,
            row.unit,
            if row.interval.is_empty() { "non défini" } else { row.interval.as_str() },
            row.status
        );
    }
}

pub fn build_scoring_report(rows: &[ScoredParameter]) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "# Rapport d'analyse environnementale");

    if rows.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(output, "Aucune donnée à analyser.");
        return output;
    }

    let summary = summarize(rows);
    let _ = writeln!(output, "{} paramètres analysés", summary.total);
    let _ = writeln!(output);
    let _ = writeln!(output, "## Répartition des scores");
    for level in &summary.levels {
        let _ = writeln!(
            output,
            "- Score {} ({}): {} ({:.1}%)",
            level.level, level.label, level.count, level.percent
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Paramètres critiques");
    write_flagged(&mut output, &summary.critical, "Aucun paramètre critique.");

    let _ = writeln!(output);
    let _ = writeln!(output, "## Paramètres nécessitant attention");
    write_flagged(&mut output, &summary.attention, "Aucun paramètre en attention.");

    let _ = writeln!(output);
    let _ = writeln!(output, "## Analyse par catégorie");
    for category in &summary.categories {
        let _ = writeln!(
            output,
            "- {}: {} paramètres, score moyen {:.2}",
            title_case(category.category.label()),
            category.count,
            category.mean_score
        );
    }

    output
}

pub fn build_slri_report(assessment: &GlobalAssessment) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "# Évaluation SLRI");

    if assessment.phases.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(output, "Aucune phase évaluée.");
    }

    for report in &assessment.phases {
        let stats = &report.statistics;
        let _ = writeln!(output);
        let _ = writeln!(output, "## Phase {}", report.phase);
        let _ = writeln!(
            output,
            "Score moyen {:.2}, score maximum {}, {} paramètres, {} non conformes, conformité {:.1}%",
            stats.mean_score, stats.max_score, stats.parameters, stats.non_conformes, stats.conformity_rate
        );
        for evaluation in &report.evaluations {
            let risk = &evaluation.assessment;
            let _ = writeln!(
                output,
                "- {} [{}]: {} (intervalle {}) -> {} + {}x{}x{} = {} ({})",
                evaluation.parameter,
                evaluation.milieu,
                evaluation.value,
                evaluation.interval,
                risk.parameter_score.value(),
                risk.duree.value(),
                risk.etendue.value(),
                risk.frequence.value(),
                risk.score_final,
                risk.amplitude
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Risques majeurs");
    if assessment.major_risks.is_empty() {
        let _ = writeln!(output, "Aucun risque majeur identifié.");
    } else {
        for risk in &assessment.major_risks {
            let _ = writeln!(
                output,
                "- {} ({}, {}): score {} - {}",
                risk.parameter, risk.milieu, risk.phase, risk.score, risk.amplitude
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Recommandations");
    for recommendation in &assessment.recommendations {
        let _ = writeln!(output, "- {recommendation}");
    }

    if assessment.skipped > 0 {
        let _ = writeln!(output);
        let _ = writeln!(output, "{} lignes ignorées (valeur ou intervalle inexploitable).", assessment.skipped);
    }

    output
}

pub fn build_trend_report(site: &str, cutoff: NaiveDate, trends: &[ParameterTrend]) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "# Tendances de surveillance");
    let _ = writeln!(output, "Site {site} (mesures depuis {cutoff})");
    let _ = writeln!(output);

    if trends.is_empty() {
        let _ = writeln!(output, "Pas assez de mesures pour calculer une tendance.");
        return output;
    }

    for trend in trends {
        let _ = writeln!(
            output,
            "- {}: {} -> {} ({:+.3}) sur {} mesures du {} au {}, min {}, max {}, moyenne {:.3}, pente {:+.4}/jour, tendance {}",
            trend.parameter,
            trend.first_value,
            trend.current_value,
            trend.change,
            trend.measurements,
            trend.first_date,
            trend.last_date,
            trend.min,
            trend.max,
            trend.mean,
            trend.slope,
            trend.direction
        );
    }

    output
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::catalog::{FallbackPolicy, StandardsCatalog};
    use crate::models::ParameterReading;
    use crate::scoring::ScoringEngine;
    use crate::slri::{Amplitude, MajorRisk, Phase};
    use crate::trends::TrendDirection;

    fn scored(rows: &[(&str, &str, &str)]) -> Vec<ScoredParameter> {
        let catalog = StandardsCatalog::morocco().unwrap();
        let engine = ScoringEngine::new(&catalog)
            .unwrap()
            .with_policy(FallbackPolicy::Strict);
        let readings: Vec<ParameterReading> = rows
            .iter()
            .filter_map(|(name, value, unit)| ParameterReading::new(name, value, unit))
            .collect();
        engine.score_all(&readings)
    }

    #[test]
    fn summary_counts_levels_and_categories() {
        let rows = scored(&[
            ("pH", "7.2", "-"),
            ("pH du sol", "12", "-"),
            ("Cadmium", "5", "mg/kg"),
            ("Turbidité", "n/a", "NTU"),
            ("Radon", "3", "Bq"),
        ]);
        let summary = summarize(&rows);

        assert_eq!(summary.total, 5);
        let counts: Vec<(u8, usize)> = summary.levels.iter().map(|l| (l.level, l.count)).collect();
        assert_eq!(counts, vec![(1, 1), (2, 0), (3, 2), (0, 2)]);
        assert_relative_eq!(summary.levels[3].percent, 40.0);

        assert_eq!(summary.critical.len(), 2);
        assert_eq!(summary.critical[1].parameter, "Cadmium");
        assert_eq!(summary.critical[1].interval, "0-3 mg/kg");
        assert!(summary.attention.is_empty());

        let eau = summary
            .categories
            .iter()
            .find(|c| c.category == Category::Eau)
            .unwrap();
        assert_eq!(eau.count, 2);
        assert_relative_eq!(eau.mean_score, 0.5);
        let sol = summary
            .categories
            .iter()
            .find(|c| c.category == Category::Sol)
            .unwrap();
        assert_relative_eq!(sol.mean_score, 3.0);
        assert!(summary.categories.iter().any(|c| c.category == Category::Inconnu));
    }

    #[test]
    fn empty_input_reports_no_data() {
        let report = build_scoring_report(&[]);
        assert!(report.contains("Aucune donnée à analyser."));
        assert!(!report.contains("## Paramètres critiques"));
    }

    #[test]
    fn scoring_report_lists_sections() {
        let rows = scored(&[("pH", "9.0", "-"), ("SO2", "400", "µg/m³")]);
        let report = build_scoring_report(&rows);

        assert!(report.contains("2 paramètres analysés"));
        assert!(report.contains("- Score 3 (Critique): 1 (50.0%)"));
        assert!(report.contains("- SO2: 400 µg/m³ (intervalle acceptable: 0-125 µg/m³) - Très au dessus"));
        assert!(report.contains("- pH: 9.0 - (intervalle acceptable: 6.5-8.5 -) - Légèrement au dessus"));
        assert!(report.contains("- Air: 1 paramètres, score moyen 3.00"));
        assert!(report.contains("- Eau: 1 paramètres, score moyen 2.00"));
    }

    #[test]
    fn slri_report_renders_phases_and_recommendations() {
        let assessment = GlobalAssessment {
            phases: Vec::new(),
            major_risks: vec![MajorRisk {
                phase: Phase::Exploitation,
                parameter: "Nitrates".to_string(),
                milieu: "PHYSIQUE/EAU".to_string(),
                amplitude: Amplitude::TresGrave,
                score: 18,
            }],
            recommendations: vec!["Élaborer un plan de gestion environnementale détaillé".to_string()],
            skipped: 2,
        };
        let report = build_slri_report(&assessment);

        assert!(report.contains("Aucune phase évaluée."));
        assert!(report.contains("- Nitrates (PHYSIQUE/EAU, EXPLOITATION): score 18 - Très grave"));
        assert!(report.contains("- Élaborer un plan"));
        assert!(report.contains("2 lignes ignorées"));
    }

    #[test]
    fn trend_report_handles_empty_and_filled_series() {
        let cutoff = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        assert!(build_trend_report("site-a", cutoff, &[]).contains("Pas assez de mesures"));

        let trend = ParameterTrend {
            parameter: "Nitrates".to_string(),
            first_value: 20.0,
            current_value: 40.0,
            change: 20.0,
            min: 20.0,
            max: 40.0,
            mean: 30.0,
            measurements: 3,
            slope: 1.0,
            direction: TrendDirection::Rising,
            first_date: cutoff,
            last_date: cutoff,
        };
        let report = build_trend_report("site-a", cutoff, &[trend]);
        assert!(report.contains("Site site-a (mesures depuis 2026-01-01)"));
        assert!(report.contains("- Nitrates: 20 -> 40 (+20.000) sur 3 mesures"));
        assert!(report.contains("tendance croissante"));
    }
}
