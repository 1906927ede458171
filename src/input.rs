use std::fs;
use std::io;
use std::path::Path;

use anyhow::Context;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::models::{ParameterReading, ScoredParameter, ScoredRecord, ScoredRow};
use crate::slri::SlriRow;

/// A cell that can be read as text whatever its source type.
pub trait CellText {
    fn into_text(self) -> String;
}

impl CellText for String {
    fn into_text(self) -> String {
        self
    }
}

impl CellText for Value {
    fn into_text(self) -> String {
        match self {
            Value::Null => String::new(),
            Value::String(text) => text,
            other => other.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "V: Deserialize<'de> + Default"))]
struct ReadingRecord<V> {
    #[serde(
        rename = "Paramètre",
        alias = "Parametre",
        alias = "paramètre",
        alias = "parametre",
        alias = "Parameter",
        alias = "parameter"
    )]
    parameter: V,
    #[serde(
        default,
        rename = "Valeur",
        alias = "Valeur mesurée",
        alias = "valeur",
        alias = "Value",
        alias = "value",
        alias = "valeur_mesuree"
    )]
    value: V,
    #[serde(default, rename = "Unité", alias = "Unite", alias = "unité", alias = "unite", alias = "Unit", alias = "unit")]
    unit: V,
}

impl<V: CellText> ReadingRecord<V> {
    fn into_reading(self) -> Option<ParameterReading> {
        ParameterReading::new(
            &self.parameter.into_text(),
            &self.value.into_text(),
            &self.unit.into_text(),
        )
    }
}

#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "V: Deserialize<'de> + Default"))]
struct SlriRecord<V> {
    #[serde(rename = "Phase", alias = "phase")]
    phase: V,
    #[serde(default, rename = "Milieu", alias = "milieu")]
    milieu: V,
    #[serde(rename = "Paramètre", alias = "Parametre", alias = "parametre", alias = "Parameter")]
    parameter: V,
    #[serde(
        default,
        rename = "Valeur_Mesuree",
        alias = "Valeur mesurée",
        alias = "Valeur",
        alias = "valeur",
        alias = "valeur_mesuree"
    )]
    value: V,
    #[serde(
        default,
        rename = "Intervalle acceptable",
        alias = "Valeur_Reference",
        alias = "Intervalle",
        alias = "intervalle"
    )]
    interval: V,
    #[serde(
        default,
        rename = "Score_Parametre",
        alias = "Score paramètre",
        alias = "score_parametre"
    )]
    parameter_score: V,
    #[serde(default, rename = "Durée", alias = "Duree", alias = "duree")]
    duree: V,
    #[serde(default, rename = "Étendue", alias = "Etendue", alias = "etendue")]
    etendue: V,
    #[serde(default, rename = "Fréquence", alias = "Frequence", alias = "frequence")]
    frequence: V,
}

impl<V: CellText> SlriRecord<V> {
    fn into_row(self) -> Result<Option<SlriRow>, String> {
        let parameter = self.parameter.into_text().trim().to_string();
        if parameter.is_empty() {
            return Ok(None);
        }

        let interval = self.interval.into_text().trim().to_string();
        Ok(Some(SlriRow {
            phase: self.phase.into_text().trim().to_string(),
            milieu: self.milieu.into_text().trim().to_string(),
            value_raw: self.value.into_text().trim().to_string(),
            interval: (!interval.is_empty()).then_some(interval),
            parameter_score: ordinal(self.parameter_score.into_text(), "score paramètre")?,
            duree: ordinal(self.duree.into_text(), "durée")?,
            etendue: ordinal(self.etendue.into_text(), "étendue")?,
            frequence: ordinal(self.frequence.into_text(), "fréquence")?,
            parameter,
        }))
    }
}

fn ordinal(text: String, scale: &str) -> Result<Option<i64>, String> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(None);
    }
    if let Ok(level) = text.parse::<i64>() {
        return Ok(Some(level));
    }
    match text.replace(',', ".").parse::<f64>() {
        Ok(level) if level.fract() == 0.0 && level.is_finite() => Ok(Some(level as i64)),
        _ => Err(format!("{scale} `{text}` is not an integer")),
    }
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map_or(false, |ext| ext.eq_ignore_ascii_case("json"))
}

/// `;` when the header line holds more semicolons than commas (French spreadsheet exports).
fn sniff_delimiter(content: &str) -> u8 {
    let header = content.lines().next().unwrap_or_default();
    if header.matches(';').count() > header.matches(',').count() {
        b';'
    } else {
        b','
    }
}

fn csv_records<T: DeserializeOwned>(content: &str) -> anyhow::Result<Vec<T>> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(sniff_delimiter(content))
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(content.as_bytes());

    let mut records = Vec::new();
    for (index, result) in reader.deserialize::<T>().enumerate() {
        // Header is line 1.
        records.push(result.with_context(|| format!("invalid CSV row {}", index + 2))?);
    }
    Ok(records)
}

fn read_input(path: &Path) -> anyhow::Result<String> {
    fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

pub fn parse_readings_csv(content: &str) -> anyhow::Result<Vec<ParameterReading>> {
    let records: Vec<ReadingRecord<String>> = csv_records(content)?;
    Ok(collect_readings(records))
}

pub fn parse_readings_json(content: &str) -> anyhow::Result<Vec<ParameterReading>> {
    let records: Vec<ReadingRecord<Value>> =
        serde_json::from_str(content).context("expected a JSON array of parameter rows")?;
    Ok(collect_readings(records))
}

fn collect_readings<V: CellText>(records: Vec<ReadingRecord<V>>) -> Vec<ParameterReading> {
    let mut readings = Vec::with_capacity(records.len());
    for (index, record) in records.into_iter().enumerate() {
        match record.into_reading() {
            Some(reading) => readings.push(reading),
            None => warn!(row = index + 1, "skipping row without parameter name"),
        }
    }
    readings
}

/// Extracted parameter rows from a CSV or JSON file.
pub fn read_readings(path: &Path) -> anyhow::Result<Vec<ParameterReading>> {
    let content = read_input(path)?;
    let readings = if is_json(path) {
        parse_readings_json(&content)
    } else {
        parse_readings_csv(&content)
    }
    .with_context(|| format!("failed to parse {}", path.display()))?;

    info!(path = %path.display(), rows = readings.len(), "loaded parameter rows");
    Ok(readings)
}

pub fn parse_slri_csv(content: &str) -> anyhow::Result<Vec<SlriRow>> {
    let records: Vec<SlriRecord<String>> = csv_records(content)?;
    Ok(collect_slri_rows(records))
}

pub fn parse_slri_json(content: &str) -> anyhow::Result<Vec<SlriRow>> {
    let records: Vec<SlriRecord<Value>> =
        serde_json::from_str(content).context("expected a JSON array of SLRI rows")?;
    Ok(collect_slri_rows(records))
}

fn collect_slri_rows<V: CellText>(records: Vec<SlriRecord<V>>) -> Vec<SlriRow> {
    let mut rows = Vec::with_capacity(records.len());
    for (index, record) in records.into_iter().enumerate() {
        match record.into_row() {
            Ok(Some(row)) => rows.push(row),
            Ok(None) => warn!(row = index + 1, "skipping SLRI row without parameter name"),
            Err(reason) => warn!(row = index + 1, %reason, "skipping SLRI row"),
        }
    }
    rows
}

pub fn read_slri_rows(path: &Path) -> anyhow::Result<Vec<SlriRow>> {
    let content = read_input(path)?;
    let rows = if is_json(path) {
        parse_slri_json(&content)
    } else {
        parse_slri_csv(&content)
    }
    .with_context(|| format!("failed to parse {}", path.display()))?;

    info!(path = %path.display(), rows = rows.len(), "loaded SLRI rows");
    Ok(rows)
}

/// The input table with the scoring columns appended.
pub fn write_scored_csv<W: io::Write>(writer: W, scored: &[ScoredParameter]) -> anyhow::Result<()> {
    let mut writer = csv::Writer::from_writer(writer);
    for row in scored {
        writer
            .serialize(ScoredRow::from(row))
            .context("failed to write scored row")?;
    }
    writer.flush().context("failed to flush scored rows")?;
    Ok(())
}

pub fn write_scored_json<W: io::Write>(writer: W, scored: &[ScoredParameter]) -> anyhow::Result<()> {
    let records: Vec<ScoredRecord> = scored.iter().map(ScoredRecord::from).collect();
    serde_json::to_writer_pretty(writer, &records).context("failed to write scored rows as JSON")?;
    Ok(())
}
