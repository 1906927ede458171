use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::models::Bounds;
use crate::normalize::{best_containment, contains_word, fold_text};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "climat")]
    Climat,
    #[serde(rename = "géographie")]
    Geographie,
    #[serde(rename = "hydrologie")]
    Hydrologie,
    #[serde(rename = "géologie")]
    Geologie,
    #[serde(rename = "air")]
    Air,
    #[serde(rename = "eau")]
    Eau,
    #[serde(rename = "sol")]
    Sol,
    #[serde(rename = "bruit")]
    Bruit,
    #[serde(rename = "général")]
    General,
    #[serde(rename = "inconnu")]
    Inconnu,
}

impl Category {
    pub fn label(self) -> &'static str {
        match self {
            Category::Climat => "climat",
            Category::Geographie => "géographie",
            Category::Hydrologie => "hydrologie",
            Category::Geologie => "géologie",
            Category::Air => "air",
            Category::Eau => "eau",
            Category::Sol => "sol",
            Category::Bruit => "bruit",
            Category::General => "général",
            Category::Inconnu => "inconnu",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Reference interval for one parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Standard {
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
    pub unit: String,
    pub category: Category,
}

impl Standard {
    pub fn new(min: Option<f64>, max: Option<f64>, unit: &str, category: Category) -> Self {
        Self {
            min,
            max,
            unit: unit.to_string(),
            category,
        }
    }

    pub fn bounds(&self) -> Bounds {
        Bounds::new(self.min, self.max)
    }

    pub fn interval_label(&self) -> String {
        self.bounds().label(&self.unit)
    }

    fn validate(&self, name: &str) -> Result<(), CatalogError> {
        if self.min.is_none() && self.max.is_none() {
            return Err(CatalogError::MissingBounds {
                name: name.to_string(),
            });
        }
        if self.min.iter().chain(self.max.iter()).any(|bound| !bound.is_finite()) {
            return Err(CatalogError::NonFiniteBound {
                name: name.to_string(),
            });
        }
        if let (Some(min), Some(max)) = (self.min, self.max) {
            if min > max {
                return Err(CatalogError::InvertedBounds {
                    name: name.to_string(),
                    min,
                    max,
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum CatalogError {
    #[error("catalog entry has an empty name")]
    EmptyName,
    #[error("standard `{name}` has neither a min nor a max bound")]
    MissingBounds { name: String },
    #[error("standard `{name}` has a non-finite bound")]
    NonFiniteBound { name: String },
    #[error("standard `{name}` has min {min} greater than max {max}")]
    InvertedBounds { name: String, min: f64, max: f64 },
    #[error("standard `{name}` is declared more than once")]
    DuplicateName { name: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub name: String,
    #[serde(flatten)]
    pub standard: Standard,
}

/// Which catalog layer produced a standard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchSource {
    Primary,
    Extended,
    DomainDefault,
    Generic,
}

/// How far [`StandardsCatalog::lookup`] may go past the two static tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FallbackPolicy {
    /// Keyword-based domain defaults, then a generic 0-100 interval.
    #[default]
    Permissive,
    /// Primary and extended tables only.
    Strict,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StandardMatch {
    pub name: String,
    pub standard: Standard,
    pub source: MatchSource,
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    primary: Vec<CatalogEntry>,
    #[serde(default)]
    extended: Vec<CatalogEntry>,
}

/// Immutable reference standards, validated once at construction.
#[derive(Debug, Clone)]
pub struct StandardsCatalog {
    primary: Vec<CatalogEntry>,
    extended: Vec<CatalogEntry>,
}

impl StandardsCatalog {
    pub fn new(primary: Vec<CatalogEntry>, extended: Vec<CatalogEntry>) -> Result<Self, CatalogError> {
        let mut seen = HashSet::new();
        for entry in primary.iter().chain(extended.iter()) {
            let key = fold_text(&entry.name);
            if key.is_empty() {
                return Err(CatalogError::EmptyName);
            }
            entry.standard.validate(&entry.name)?;
            if !seen.insert(key) {
                return Err(CatalogError::DuplicateName {
                    name: entry.name.clone(),
                });
            }
        }

        Ok(Self { primary, extended })
    }

    /// Built-in Moroccan reference standards.
    pub fn morocco() -> Result<Self, CatalogError> {
        Self::new(to_entries(MOROCCO_PRIMARY), to_entries(MOROCCO_EXTENDED))
    }

    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read catalog {}", path.display()))?;
        let file: CatalogFile = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse catalog {}", path.display()))?;
        let catalog = Self::new(file.primary, file.extended)
            .with_context(|| format!("invalid catalog {}", path.display()))?;

        info!(
            path = %path.display(),
            primary = catalog.primary.len(),
            extended = catalog.extended.len(),
            "loaded standards catalog"
        );
        Ok(catalog)
    }

    pub fn primary(&self) -> &[CatalogEntry] {
        &self.primary
    }

    pub fn extended(&self) -> &[CatalogEntry] {
        &self.extended
    }

    /// Every name, primary table first.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.primary
            .iter()
            .chain(self.extended.iter())
            .map(|entry| entry.name.as_str())
    }

    pub fn get(&self, name: &str) -> Option<&Standard> {
        self.primary
            .iter()
            .chain(self.extended.iter())
            .find(|entry| entry.name == name)
            .map(|entry| &entry.standard)
    }

    /// Resolves a standard for a normalized name, falling back on the raw name.
    ///
    /// Under [`FallbackPolicy::Permissive`] this always returns `Some`.
    pub fn lookup(
        &self,
        canonical_name: &str,
        raw_name: &str,
        unit: &str,
        policy: FallbackPolicy,
    ) -> Option<StandardMatch> {
        if let Some(entry) = self.primary.iter().find(|entry| entry.name == canonical_name) {
            return Some(StandardMatch {
                name: entry.name.clone(),
                standard: entry.standard.clone(),
                source: MatchSource::Primary,
            });
        }

        let folded = fold_text(raw_name);
        let extended = self
            .extended
            .iter()
            .find(|entry| entry.name == canonical_name)
            .or_else(|| {
                best_containment(
                    &folded,
                    self.extended
                        .iter()
                        .map(|entry| (fold_text(&entry.name), entry)),
                )
            });
        if let Some(entry) = extended {
            return Some(StandardMatch {
                name: entry.name.clone(),
                standard: entry.standard.clone(),
                source: MatchSource::Extended,
            });
        }

        match policy {
            FallbackPolicy::Strict => None,
            FallbackPolicy::Permissive => Some(domain_default(&folded, unit)),
        }
    }
}

const DOMAIN_KEYWORDS: &[(Category, &[&str])] = &[
    (Category::Air, &["air", "atmosphere", "atmospherique", "pollution"]),
    (Category::Eau, &["eau", "eaux", "hydrique", "aquatique"]),
    (Category::Sol, &["sol", "sols", "terre", "sediment", "sediments"]),
    (Category::Bruit, &["bruit", "sonore", "acoustique"]),
];

/// Environmental medium named by a free-text label, by whole-word keyword.
pub fn domain_category(name: &str) -> Option<Category> {
    let folded = fold_text(name);
    DOMAIN_KEYWORDS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|keyword| contains_word(&folded, keyword)))
        .map(|(category, _)| *category)
}

fn domain_default(folded_name: &str, unit: &str) -> StandardMatch {
    let category = domain_category(folded_name);

    let unit = unit.trim();
    let pick_unit = |default: &str| {
        if unit.is_empty() {
            default.to_string()
        } else {
            unit.to_string()
        }
    };

    let (min, max, unit, category, source) = match category {
        Some(Category::Air) => (0.0, 100.0, pick_unit("µg/m³"), Category::Air, MatchSource::DomainDefault),
        Some(Category::Eau) => (0.0, 50.0, pick_unit("mg/L"), Category::Eau, MatchSource::DomainDefault),
        Some(Category::Sol) => (0.0, 100.0, pick_unit("mg/kg"), Category::Sol, MatchSource::DomainDefault),
        Some(Category::Bruit) => (30.0, 70.0, pick_unit("dB"), Category::Bruit, MatchSource::DomainDefault),
        _ => (0.0, 100.0, pick_unit("-"), Category::General, MatchSource::Generic),
    };

    StandardMatch {
        name: category.label().to_string(),
        standard: Standard {
            min: Some(min),
            max: Some(max),
            unit,
            category,
        },
        source,
    }
}

type StaticStandard = (&'static str, Option<f64>, Option<f64>, &'static str, Category);

fn to_entries(table: &[StaticStandard]) -> Vec<CatalogEntry> {
    table
        .iter()
        .map(|(name, min, max, unit, category)| CatalogEntry {
            name: name.to_string(),
            standard: Standard::new(*min, *max, unit, *category),
        })
        .collect()
}

const MOROCCO_PRIMARY: &[StaticStandard] = &[
    ("Température maximale", Some(25.0), Some(45.0), "°C", Category::Climat),
    ("Température minimale", Some(5.0), Some(25.0), "°C", Category::Climat),
    ("Précipitations annuelles moyennes", Some(200.0), Some(800.0), "mm", Category::Climat),
    ("Précipitations annuelles minimales", Some(50.0), Some(400.0), "mm", Category::Climat),
    ("Précipitations annuelles maximales", Some(400.0), Some(1200.0), "mm", Category::Climat),
    ("Vitesse du vent", Some(2.0), Some(15.0), "m/s", Category::Climat),
    ("Fréquence du vent de Nord-Nord-est", Some(15.0), Some(40.0), "%", Category::Climat),
    ("Altitude moyenne des plaines côtières", Some(0.0), Some(100.0), "m", Category::Geographie),
    ("Altitude des Hamadas", Some(200.0), Some(800.0), "m", Category::Geographie),
    ("Surface Sebkha Lahmira", Some(500.0), Some(700.0), "ha", Category::Hydrologie),
    ("Profondeur Sebkha Lahmira", Some(2.0), Some(8.0), "m", Category::Hydrologie),
    ("Surface Sebkha Tizfourine", Some(2000.0), Some(3000.0), "ha", Category::Hydrologie),
    ("Profondeur Sebkha Tizfourine", Some(3.0), Some(7.0), "m", Category::Hydrologie),
    ("Surface Sebkha Tah", Some(7000.0), Some(9000.0), "ha", Category::Hydrologie),
    ("Profondeur Sebkha Tah", Some(50.0), Some(80.0), "m", Category::Hydrologie),
    ("Débit pointe Oued El Hamra", Some(0.5), Some(15.0), "m³/s", Category::Hydrologie),
    ("Surface nappe de Tarfaya", Some(80.0), Some(150.0), "km²", Category::Geologie),
    ("Puissance nappe de Tarfaya", Some(3.0), Some(30.0), "m", Category::Geologie),
    ("Transmissivité du grès calcaire", Some(1e-4), Some(5e-3), "m²/s", Category::Geologie),
    ("Transmissivité du marno-calcaire", Some(1e-5), Some(1e-3), "m²/s", Category::Geologie),
    ("CO2", Some(350.0), Some(450.0), "ppm", Category::Air),
    ("NOx", Some(0.0), Some(40.0), "µg/m³", Category::Air),
    ("PM10", Some(0.0), Some(50.0), "µg/m³", Category::Air),
    ("PM2.5", Some(0.0), Some(25.0), "µg/m³", Category::Air),
    ("SO2", Some(0.0), Some(125.0), "µg/m³", Category::Air),
    ("O3", Some(0.0), Some(120.0), "µg/m³", Category::Air),
    ("pH", Some(6.5), Some(8.5), "-", Category::Eau),
    ("Turbidité", Some(0.0), Some(5.0), "NTU", Category::Eau),
    ("Chlore résiduel", Some(0.2), Some(2.0), "mg/L", Category::Eau),
    ("Conductivité", Some(50.0), Some(2700.0), "µS/cm", Category::Eau),
    ("TDS", Some(0.0), Some(1500.0), "mg/L", Category::Eau),
    ("Nitrates", Some(0.0), Some(50.0), "mg/L", Category::Eau),
    ("Phosphates", Some(0.0), Some(2.0), "mg/L", Category::Eau),
    ("pH du sol", Some(6.0), Some(8.0), "-", Category::Sol),
    ("Métaux lourds Pb", Some(0.0), Some(100.0), "mg/kg", Category::Sol),
    ("Métaux lourds Cd", Some(0.0), Some(3.0), "mg/kg", Category::Sol),
    ("Métaux lourds Hg", Some(0.0), Some(1.0), "mg/kg", Category::Sol),
    ("Hydrocarbures", Some(0.0), Some(100.0), "mg/kg", Category::Sol),
    ("Matière organique", Some(1.0), Some(5.0), "%", Category::Sol),
];

const MOROCCO_EXTENDED: &[StaticStandard] = &[
    ("CO", Some(0.0), Some(10.0), "mg/m³", Category::Air),
    ("Benzène", Some(0.0), Some(5.0), "µg/m³", Category::Air),
    ("Formaldéhyde", Some(0.0), Some(30.0), "µg/m³", Category::Air),
    ("Ammoniaque", Some(0.0), Some(0.5), "mg/L", Category::Eau),
    ("Sulfates", Some(0.0), Some(250.0), "mg/L", Category::Eau),
    ("Chlorures", Some(0.0), Some(250.0), "mg/L", Category::Eau),
    ("Calcium", Some(0.0), Some(200.0), "mg/L", Category::Eau),
    ("Magnésium", Some(0.0), Some(50.0), "mg/L", Category::Eau),
    ("Fer", Some(0.0), Some(0.3), "mg/L", Category::Eau),
    ("Manganèse", Some(0.0), Some(0.1), "mg/L", Category::Eau),
    ("Nitrites", None, Some(0.5), "mg/L", Category::Eau),
    ("DBO5", None, Some(5.0), "mg/L", Category::Eau),
    ("DCO", None, Some(30.0), "mg/L", Category::Eau),
    ("Oxygène dissous", Some(5.0), None, "mg/L", Category::Eau),
    ("Azote total", Some(0.1), Some(0.5), "%", Category::Sol),
    ("Phosphore", Some(10.0), Some(50.0), "mg/kg", Category::Sol),
    ("Potassium", Some(100.0), Some(500.0), "mg/kg", Category::Sol),
    ("Zinc", Some(0.0), Some(300.0), "mg/kg", Category::Sol),
    ("Cuivre", Some(0.0), Some(100.0), "mg/kg", Category::Sol),
    ("Niveau sonore", Some(35.0), Some(65.0), "dB", Category::Bruit),
    ("Bruit de fond", Some(30.0), Some(55.0), "dB", Category::Bruit),
];

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, min: Option<f64>, max: Option<f64>) -> CatalogEntry {
        CatalogEntry {
            name: name.to_string(),
            standard: Standard::new(min, max, "mg/L", Category::Eau),
        }
    }

    #[test]
    fn builtin_catalog_is_valid() {
        let catalog = StandardsCatalog::morocco().unwrap();
        assert_eq!(catalog.primary().len(), 39);
        assert_eq!(catalog.extended().len(), 21);

        let ph = catalog.get("pH").unwrap();
        assert_eq!(ph.min, Some(6.5));
        assert_eq!(ph.max, Some(8.5));
        assert_eq!(ph.category, Category::Eau);
    }

    #[test]
    fn rejects_standard_without_bounds() {
        let err = StandardsCatalog::new(vec![entry("Radon", None, None)], Vec::new()).unwrap_err();
        assert_eq!(
            err,
            CatalogError::MissingBounds {
                name: "Radon".to_string()
            }
        );
    }

    #[test]
    fn rejects_inverted_and_non_finite_bounds() {
        assert!(matches!(
            StandardsCatalog::new(vec![entry("Fer", Some(2.0), Some(1.0))], Vec::new()),
            Err(CatalogError::InvertedBounds { .. })
        ));
        assert!(matches!(
            StandardsCatalog::new(vec![entry("Fer", Some(f64::NAN), Some(1.0))], Vec::new()),
            Err(CatalogError::NonFiniteBound { .. })
        ));
    }

    #[test]
    fn rejects_duplicates_across_tables_after_folding() {
        let err = StandardsCatalog::new(
            vec![entry("Turbidité", Some(0.0), Some(5.0))],
            vec![entry("turbidite", Some(0.0), Some(4.0))],
        )
        .unwrap_err();
        assert!(matches!(err, CatalogError::DuplicateName { .. }));
    }

    #[test]
    fn lookup_prefers_primary_table() {
        let catalog = StandardsCatalog::morocco().unwrap();
        let found = catalog
            .lookup("Métaux lourds Cd", "Cadmium", "mg/kg", FallbackPolicy::Permissive)
            .unwrap();
        assert_eq!(found.source, MatchSource::Primary);
        assert_eq!(found.standard.max, Some(3.0));
    }

    #[test]
    fn lookup_searches_extended_table_by_raw_name() {
        let catalog = StandardsCatalog::morocco().unwrap();
        let found = catalog
            .lookup("Sulfates dissous", "Sulfates dissous", "", FallbackPolicy::Strict)
            .unwrap();
        assert_eq!(found.name, "Sulfates");
        assert_eq!(found.source, MatchSource::Extended);

        let open = catalog
            .lookup("Oxygène dissous", "O2 dissous", "mg/L", FallbackPolicy::Strict)
            .unwrap();
        assert_eq!(open.standard.min, Some(5.0));
        assert_eq!(open.standard.max, None);
    }

    #[test]
    fn extended_names_do_not_match_inside_other_words() {
        let catalog = StandardsCatalog::morocco().unwrap();
        for raw in ["Température de référence", "Différence de niveau"] {
            let found = catalog
                .lookup(raw, raw, "", FallbackPolicy::Permissive)
                .unwrap();
            assert_ne!(found.name, "Fer", "raw name {raw}");
            assert_eq!(found.source, MatchSource::Generic, "raw name {raw}");
        }

        let iron = catalog
            .lookup("Fer total", "Fer total", "mg/L", FallbackPolicy::Strict)
            .unwrap();
        assert_eq!(iron.name, "Fer");
    }

    #[test]
    fn lookup_falls_back_on_domain_keywords() {
        let catalog = StandardsCatalog::morocco().unwrap();
        let water = catalog
            .lookup("Indice de l'eau", "Indice de l'eau", "", FallbackPolicy::Permissive)
            .unwrap();
        assert_eq!(water.source, MatchSource::DomainDefault);
        assert_eq!(water.standard.category, Category::Eau);
        assert_eq!(water.standard.unit, "mg/L");
        assert_eq!(water.standard.max, Some(50.0));

        let noise = catalog
            .lookup("Emergence sonore", "Emergence sonore", "dB(A)", FallbackPolicy::Permissive)
            .unwrap();
        assert_eq!(noise.standard.category, Category::Bruit);
        assert_eq!(noise.standard.unit, "dB(A)");
        assert_eq!(noise.standard.min, Some(30.0));
    }

    #[test]
    fn lookup_generic_fallback_and_strict_policy() {
        let catalog = StandardsCatalog::morocco().unwrap();
        let generic = catalog
            .lookup("Radon", "Radon", "", FallbackPolicy::Permissive)
            .unwrap();
        assert_eq!(generic.source, MatchSource::Generic);
        assert_eq!(generic.standard.category, Category::General);
        assert_eq!(generic.standard.unit, "-");
        assert_eq!(generic.standard.interval_label(), "0-100 -");

        assert!(catalog
            .lookup("Radon", "Radon", "", FallbackPolicy::Strict)
            .is_none());
    }

    #[test]
    fn solar_radiation_is_not_soil() {
        let catalog = StandardsCatalog::morocco().unwrap();
        let found = catalog
            .lookup("Rayonnement solaire", "Rayonnement solaire", "W/m²", FallbackPolicy::Permissive)
            .unwrap();
        assert_eq!(found.source, MatchSource::Generic);
    }

    #[test]
    fn domain_category_reads_media_labels() {
        assert_eq!(domain_category("PHYSIQUE/EAU"), Some(Category::Eau));
        assert_eq!(domain_category("Qualité des eaux"), Some(Category::Eau));
        assert_eq!(domain_category("physique/sol"), Some(Category::Sol));
        assert_eq!(domain_category("Qualité de l'air"), Some(Category::Air));
        assert_eq!(domain_category("BIOLOGIQUE/FAUNE"), None);
    }

    #[test]
    fn catalog_file_round_trips_through_serde() {
        let json = r#"{
            "primary": [
                {"name": "pH", "min": 6.0, "max": 9.0, "unit": "-", "category": "eau"},
                {"name": "DBO5", "max": 10.0, "unit": "mg/L", "category": "eau"}
            ]
        }"#;
        let file: CatalogFile = serde_json::from_str(json).unwrap();
        let catalog = StandardsCatalog::new(file.primary, file.extended).unwrap();
        assert_eq!(catalog.get("DBO5").unwrap().min, None);
        assert!(catalog.extended().is_empty());
        assert_eq!(catalog.names().collect::<Vec<_>>(), vec!["pH", "DBO5"]);
    }

    #[test]
    fn from_json_file_loads_and_reports_bad_paths() {
        let path = std::env::temp_dir().join(format!("envrisk-catalog-{}.json", uuid::Uuid::new_v4()));
        fs::write(
            &path,
            r#"{"primary": [{"name": "Nitrates", "max": 50.0, "unit": "mg/L", "category": "eau"}]}"#,
        )
        .unwrap();
        let loaded = StandardsCatalog::from_json_file(&path);
        fs::remove_file(&path).unwrap();
        let catalog = loaded.unwrap();
        assert_eq!(catalog.get("Nitrates").unwrap().max, Some(50.0));

        let missing = StandardsCatalog::from_json_file(&path).unwrap_err();
        assert!(missing.to_string().starts_with("failed to read catalog"));
    }

    #[test]
    fn from_json_file_rejects_malformed_and_invalid_content() {
        let path = std::env::temp_dir().join(format!("envrisk-catalog-{}.json", uuid::Uuid::new_v4()));

        fs::write(&path, "{ not json").unwrap();
        let malformed = StandardsCatalog::from_json_file(&path).unwrap_err();

        fs::write(
            &path,
            r#"{"primary": [{"name": "Fer", "min": 2.0, "max": 1.0, "unit": "mg/L", "category": "eau"}]}"#,
        )
        .unwrap();
        let inverted = StandardsCatalog::from_json_file(&path).unwrap_err();
        fs::remove_file(&path).unwrap();

        assert!(malformed.to_string().starts_with("failed to parse catalog"));
        assert!(inverted.to_string().starts_with("invalid catalog"));
        assert!(matches!(
            inverted.downcast_ref::<CatalogError>(),
            Some(CatalogError::InvertedBounds { .. })
        ));
    }
}
