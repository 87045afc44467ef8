// src/classify.rs
//! Keyword classifier: maps an incident title to a category and a derived
//! severity. Pure and table-driven; the tables are checked in a fixed order
//! and the first category with any keyword hit wins.

use serde::{Deserialize, Serialize};

use crate::region::normalize_text;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Protest,
    Fire,
    Explosion,
    Crime,
    Accident,
    Infrastructure,
    WeatherAlert,
    General,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Protest => "protest",
            Category::Fire => "fire",
            Category::Explosion => "explosion",
            Category::Crime => "crime",
            Category::Accident => "accident",
            Category::Infrastructure => "infrastructure",
            Category::WeatherAlert => "weather_alert",
            Category::General => "general",
        }
    }

    pub fn parse(input: &str) -> Option<Category> {
        match input.trim().to_ascii_lowercase().as_str() {
            "protest" => Some(Category::Protest),
            "fire" => Some(Category::Fire),
            "explosion" => Some(Category::Explosion),
            "crime" => Some(Category::Crime),
            "accident" => Some(Category::Accident),
            "infrastructure" => Some(Category::Infrastructure),
            "weather_alert" => Some(Category::WeatherAlert),
            "general" => Some(Category::General),
            _ => None,
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }
}

/// Ordered classifier tables. Priority matters: a title mentioning both a
/// march and a fire is a protest.
static CATEGORY_KEYWORDS: &[(Category, &[&str])] = &[
    (
        Category::Protest,
        &["protest", "demonstration", "rally", "strike", "riot", "march", "unrest", "πορεία", "απεργία"],
    ),
    (
        Category::Fire,
        &["fire", "blaze", "wildfire", "arson", "φωτιά", "πυρκαγιά"],
    ),
    (
        Category::Explosion,
        &["explosion", "bomb", "blast", "explosive", "έκρηξη"],
    ),
    (
        Category::Crime,
        &["murder", "shooting", "robbery", "stabbing", "arrest", "crime", "attack", "gang"],
    ),
    (
        Category::Accident,
        &["crash", "accident", "collision", "derail", "flood", "earthquake", "ατύχημα"],
    ),
];

/// Severity is a fixed mapping from category, independent of any other signal.
pub fn severity_for(category: Category) -> Severity {
    match category {
        Category::Explosion | Category::Fire => Severity::High,
        Category::Protest | Category::Crime => Severity::Medium,
        _ => Severity::Low,
    }
}

pub fn classify_incident(title: &str) -> (Category, Severity) {
    let normalized = normalize_text(title);

    let category = CATEGORY_KEYWORDS
        .iter()
        .find(|(_, words)| {
            words
                .iter()
                .any(|word| normalized.contains(&normalize_text(word)))
        })
        .map(|(category, _)| *category)
        .unwrap_or(Category::General);

    (category, severity_for(category))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fire_title_is_high_severity() {
        let (category, severity) = classify_incident("Building fire in Kolonaki");
        assert_eq!(category, Category::Fire);
        assert_eq!(severity, Severity::High);
    }

    #[test]
    fn greek_protest_keyword_matches() {
        let (category, severity) = classify_incident("Μεγάλη πορεία στο κέντρο");
        assert_eq!(category, Category::Protest);
        assert_eq!(severity, Severity::Medium);
    }

    #[test]
    fn first_table_hit_wins() {
        // Mentions both a march and a fire; protest is checked first.
        let (category, _) = classify_incident("March against wildfire response");
        assert_eq!(category, Category::Protest);
    }

    #[test]
    fn unmatched_title_is_general_low() {
        let (category, severity) = classify_incident("New bakery opens downtown");
        assert_eq!(category, Category::General);
        assert_eq!(severity, Severity::Low);
    }
}
