use std::collections::HashMap;

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Fragments shorter than this only match as whole words ("ph" must not hit "phosphates").
const MIN_FRAGMENT_CHARS: usize = 3;

/// Lowercase, accent-free, whitespace-collapsed form used for every name comparison.
pub fn fold_text(text: &str) -> String {
    let stripped: String = text.nfd().filter(|c| !is_combining_mark(*c)).collect();
    stripped
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// `needle` occurs in `haystack` delimited by non-alphanumeric characters.
pub fn contains_word(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return false;
    }

    haystack.match_indices(needle).any(|(start, _)| {
        let before = haystack[..start].chars().next_back();
        let after = haystack[start + needle.len()..].chars().next();
        before.map_or(true, |c| !c.is_alphanumeric()) && after.map_or(true, |c| !c.is_alphanumeric())
    })
}

pub fn contains_fragment(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return false;
    }
    if needle.chars().count() >= MIN_FRAGMENT_CHARS && haystack.contains(needle) {
        return true;
    }
    contains_word(haystack, needle)
}

/// Key that best contains, or is contained in, `folded`.
///
/// A key inside the input must appear as whole words; the input inside a key
/// may be any fragment of at least three characters. The longest matched text
/// wins, earlier keys on ties.
pub fn best_containment<K: AsRef<str>, T>(
    folded: &str,
    keyed: impl IntoIterator<Item = (K, T)>,
) -> Option<T> {
    let mut best: Option<(usize, T)> = None;
    for (key, item) in keyed {
        let key = key.as_ref();
        let matched = if contains_word(folded, key) {
            key.len()
        } else if contains_fragment(key, folded) {
            folded.len()
        } else {
            continue;
        };
        if best.as_ref().map_or(true, |(len, _)| matched > *len) {
            best = Some((matched, item));
        }
    }
    best.map(|(_, item)| item)
}

/// Curated spellings seen in extracted reports, keyed by folded text.
const ALIASES: &[(&str, &str)] = &[
    ("co2", "CO2"),
    ("dioxyde de carbone", "CO2"),
    ("nox", "NOx"),
    ("no2", "NOx"),
    ("oxydes d'azote", "NOx"),
    ("pm10", "PM10"),
    ("pm2.5", "PM2.5"),
    ("pm 2.5", "PM2.5"),
    ("particules fines", "PM2.5"),
    ("so2", "SO2"),
    ("dioxyde de soufre", "SO2"),
    ("o3", "O3"),
    ("ozone", "O3"),
    ("monoxyde de carbone", "CO"),
    ("ph", "pH"),
    ("ph de l'eau", "pH"),
    ("ph du sol", "pH du sol"),
    ("ph sol", "pH du sol"),
    ("turbidite", "Turbidité"),
    ("conductivite", "Conductivité"),
    ("conductivite electrique", "Conductivité"),
    ("nitrates", "Nitrates"),
    ("phosphates", "Phosphates"),
    ("plomb", "Métaux lourds Pb"),
    ("pb", "Métaux lourds Pb"),
    ("cadmium", "Métaux lourds Cd"),
    ("cd", "Métaux lourds Cd"),
    ("mercure", "Métaux lourds Hg"),
    ("hg", "Métaux lourds Hg"),
    ("hydrocarbures", "Hydrocarbures"),
    ("matiere organique", "Matière organique"),
    ("dbo", "DBO5"),
    ("demande biochimique en oxygene", "DBO5"),
    ("demande chimique en oxygene", "DCO"),
    ("o2 dissous", "Oxygène dissous"),
];

/// Maps free-text parameter names onto catalog names.
///
/// Lookup order: exact catalog name, exact alias, containment against
/// catalog names (longest match), alias found as a whole word.
/// Unmatched names come back verbatim.
#[derive(Debug, Clone)]
pub struct ParameterNameNormalizer {
    candidates: Vec<(String, String)>,
    aliases: HashMap<String, String>,
    alias_words: Vec<(String, String)>,
}

impl ParameterNameNormalizer {
    /// `names` must be in priority order; aliases pointing at absent names are dropped.
    pub fn new<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        let candidates: Vec<(String, String)> = names
            .into_iter()
            .map(|name| (fold_text(name), name.to_string()))
            .collect();

        let mut alias_words: Vec<(String, String)> = ALIASES
            .iter()
            .filter(|(_, target)| candidates.iter().any(|(_, name)| name == target))
            .map(|(alias, target)| (alias.to_string(), target.to_string()))
            .collect();
        // Longest alias first so "ph de l'eau" beats "ph".
        alias_words.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(&b.0)));
        let aliases = alias_words.iter().cloned().collect();

        Self {
            candidates,
            aliases,
            alias_words,
        }
    }

    pub fn normalize(&self, raw: &str) -> String {
        let folded = fold_text(raw);
        if folded.is_empty() {
            return raw.to_string();
        }

        if let Some((_, name)) = self.candidates.iter().find(|(key, _)| *key == folded) {
            return name.clone();
        }

        if let Some(name) = self.aliases.get(&folded) {
            return name.clone();
        }

        if let Some(name) = best_containment(
            &folded,
            self.candidates.iter().map(|(key, name)| (key, name)),
        ) {
            return name.clone();
        }

        if let Some((_, name)) = self
            .alias_words
            .iter()
            .find(|(alias, _)| contains_word(&folded, alias))
        {
            return name.clone();
        }

        raw.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalizer() -> ParameterNameNormalizer {
        ParameterNameNormalizer::new([
            "Température maximale",
            "Température minimale",
            "CO2",
            "pH",
            "Turbidité",
            "Nitrates",
            "Phosphates",
            "pH du sol",
            "Métaux lourds Pb",
            "Métaux lourds Cd",
            "CO",
            "DBO5",
        ])
    }

    #[test]
    fn fold_text_strips_accents_case_and_spacing() {
        assert_eq!(fold_text("  Turbidité   de l'Eau "), "turbidite de l'eau");
        assert_eq!(fold_text("MATIÈRE Organique"), "matiere organique");
        assert_eq!(fold_text(""), "");
    }

    #[test]
    fn contains_word_respects_boundaries() {
        assert!(contains_word("ph de l'eau", "ph"));
        assert!(!contains_word("phosphates", "ph"));
        assert!(contains_word("plomb (pb)", "pb"));
        assert!(!contains_word("anything", ""));
    }

    #[test]
    fn exact_catalog_names_win() {
        let normalizer = normalizer();
        assert_eq!(normalizer.normalize("co"), "CO");
        assert_eq!(normalizer.normalize("CO2"), "CO2");
        assert_eq!(normalizer.normalize("turbidite"), "Turbidité");
    }

    #[test]
    fn aliases_map_symbols_and_french_names() {
        let normalizer = normalizer();
        assert_eq!(normalizer.normalize("PH"), "pH");
        assert_eq!(normalizer.normalize("Cadmium"), "Métaux lourds Cd");
        assert_eq!(normalizer.normalize("pb"), "Métaux lourds Pb");
        assert_eq!(normalizer.normalize("pH du sol"), "pH du sol");
    }

    #[test]
    fn short_aliases_do_not_match_inside_words() {
        let normalizer = normalizer();
        assert_eq!(normalizer.normalize("Phosphates totaux"), "Phosphates");
        assert_eq!(normalizer.normalize("Cobalt"), "Cobalt");
    }

    #[test]
    fn substring_matching_is_symmetric() {
        let normalizer = normalizer();
        assert_eq!(normalizer.normalize("Température"), "Température maximale");
        assert_eq!(normalizer.normalize("Nitrates dissous"), "Nitrates");
        assert_eq!(normalizer.normalize("pH de l'eau brute"), "pH");
    }

    #[test]
    fn catalog_names_only_match_whole_words_inside_labels() {
        let normalizer = ParameterNameNormalizer::new(["Température maximale", "pH", "Fer"]);
        assert_eq!(normalizer.normalize("Température de référence"), "Température de référence");
        assert_eq!(normalizer.normalize("Différence de niveau"), "Différence de niveau");
        assert_eq!(normalizer.normalize("Fer dissous"), "Fer");
    }

    #[test]
    fn most_specific_catalog_name_wins() {
        let normalizer = normalizer();
        assert_eq!(normalizer.normalize("pH du sol mesuré"), "pH du sol");
        assert_eq!(normalizer.normalize("pH du sol (mesuré)"), "pH du sol");
        assert_eq!(normalizer.normalize("pH sol"), "pH du sol");
        assert_eq!(normalizer.normalize("pH mesuré"), "pH");
    }

    #[test]
    fn alias_words_inside_longer_labels() {
        let normalizer = normalizer();
        assert_eq!(normalizer.normalize("Plomb total (sol)"), "Métaux lourds Pb");
    }

    #[test]
    fn unknown_names_come_back_verbatim() {
        let normalizer = normalizer();
        assert_eq!(normalizer.normalize("Radon 222"), "Radon 222");
        assert_eq!(normalizer.normalize("   "), "   ");
    }

    #[test]
    fn aliases_without_catalog_target_are_ignored() {
        let normalizer = ParameterNameNormalizer::new(["pH"]);
        assert_eq!(normalizer.normalize("cadmium"), "cadmium");
    }

    #[test]
    fn normalization_is_idempotent() {
        let normalizer = normalizer();
        for raw in [
            "Température",
            "ph",
            "Cadmium",
            "Plomb total (sol)",
            "Nitrates dissous",
            "Radon 222",
            "co",
            "DBO",
            "Turbidité de l'eau",
        ] {
            let once = normalizer.normalize(raw);
            assert_eq!(normalizer.normalize(&once), once, "raw name {raw}");
        }
    }
}
