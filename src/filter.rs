// src/filter.rs
//! Inclusion filter for noisy text-search feeds. Decides whether an item is
//! topically relevant enough to keep at all; it does not influence severity.
//! The keyword universe here is intentionally separate from the classifier's.
//!
//! Order of evaluation: denylist first (title stems, then title+body
//! keywords) and it short-circuits everything else; then the category
//! allowlist, where single-word keywords must start at a word boundary and
//! multi-word phrases match as substrings.

use std::collections::BTreeMap;

use crate::classify::Category;
use crate::region::normalize_text;

static ALLOWED_CATEGORY_KEYWORDS: &[(Category, &[&str])] = &[
    (
        Category::Fire,
        &["φωτιά", "πυρκαγιά", "fire", "blaze", "wildfire", "arson", "καίει", "εμπρησμός", "καπνός", "καπνιά"],
    ),
    (
        Category::Explosion,
        &["έκρηξη", "explosion", "bomb", "blast", "βόμβα"],
    ),
    (
        Category::Protest,
        &[
            "διαδήλωση", "πορεία", "απεργία", "protest", "demonstration", "strike",
            "riot", "march", "μπλοκ", "συγκέντρωση", "αποκλεισμός", "επεισόδια",
        ],
    ),
    (
        Category::Accident,
        &[
            "τροχαίο", "accident", "crash", "flood", "πλημμύρα", "σεισμός", "earthquake",
            "gas leak", "αέριο", "derail", "έκρηξη αερίου", "τραυματίες", "εγκλωβισμένος",
        ],
    ),
    (Category::Crime, &["ένοπλη", "οπλισμένος", "κλοπή οχήματος"]),
    (
        Category::Infrastructure,
        &["blackout", "διακοπή ρεύματος", "διακοπή νερού", "outage", "μετρό ακυρώσεις", "οασα"],
    ),
    (
        Category::WeatherAlert,
        &["καταιγίδα", "θυελλώδεις", "χαλάζι", "πλημμυρικά", "meteoalarm", "κίτρινη προειδοποίηση", "πορτοκαλί"],
    ),
];

/// Hard rejections: politics, economy, sports, entertainment.
static REJECT_ALWAYS_KEYWORDS: &[&str] = &[
    "πολιτικ", "εκλογ", "βουλ", "υπουργ", "οικονομ", "χρηματιστ", "αθλη",
    "σκορ", "γκολ", "μεταγραφ", "ψυχαγωγ", "τραγουδ", "ηθοποι", "election",
    "parliament", "minister", "economy", "stock", "market", "sports", "score",
    "goal", "transfer", "entertainment", "singer", "actor", "movie", "tv show",
];

/// Stems that reject on the title alone.
static TITLE_REJECT_STEMS: &[&str] = &[
    "εκλογ", "βουλ", "υπουργ", "χρηματιστ", "σκορ", "γκολ", "μεταγραφ", "τραγουδ", "ηθοποι",
];

/// Attica location phrases, looser than the anchor gazetteer (stems included).
static ATTICA_LOCATION_TERMS: &[&str] = &[
    "athens greece", "athens, greece", "athina", "attica", "attiki", "piraeus",
    "πειραι", "κηφισ", "kifiss", "glyfada", "γλυφαδ", "marous", "μαρουσ",
    "chalandr", "χαλανδρ", "kallithea", "καλλιθε", "nea smyrn", "νεα σμυρν",
    "perister", "περιστερ", "galats", "γαλατσ", "pentel", "πεντελ", "zograf",
    "ζωγραφ", "athens metro", "οασα",
];

#[derive(Debug, Clone, PartialEq)]
pub struct InclusionVerdict {
    pub accepted: bool,
    pub reason: &'static str,
    pub matched_categories: BTreeMap<Category, Vec<String>>,
    pub matched_keyword_count: usize,
    /// Computed and reported for diagnostics; the current acceptance rule
    /// does not require it (≥1 keyword match suffices).
    pub has_location_signal: bool,
}

impl InclusionVerdict {
    fn rejected(reason: &'static str, has_location_signal: bool) -> Self {
        Self {
            accepted: false,
            reason,
            matched_categories: BTreeMap::new(),
            matched_keyword_count: 0,
            has_location_signal,
        }
    }
}

/// Word-boundary matching for single words (prefix boundary, so inflected
/// forms like "fires" still hit), substring matching for phrases.
fn keyword_matches(normalized_text: &str, normalized_keyword: &str) -> bool {
    if normalized_keyword.is_empty() {
        return false;
    }
    if normalized_keyword.contains(' ') {
        return normalized_text.contains(normalized_keyword);
    }

    let mut search_from = 0;
    while let Some(offset) = normalized_text[search_from..].find(normalized_keyword) {
        let start = search_from + offset;
        let boundary_before = normalized_text[..start]
            .chars()
            .next_back()
            .map(|c| !c.is_alphanumeric())
            .unwrap_or(true);
        if boundary_before {
            return true;
        }
        search_from = start + normalized_keyword.len();
    }
    false
}

fn has_rejected_terms(normalized_title: &str, normalized_body: &str) -> bool {
    if TITLE_REJECT_STEMS
        .iter()
        .any(|stem| normalized_title.contains(&normalize_text(stem)))
    {
        return true;
    }

    REJECT_ALWAYS_KEYWORDS.iter().any(|keyword| {
        let keyword = normalize_text(keyword);
        normalized_title.contains(&keyword) || normalized_body.contains(&keyword)
    })
}

fn find_allowed_matches(normalized_body: &str) -> (BTreeMap<Category, Vec<String>>, usize) {
    let mut matched_categories = BTreeMap::new();
    let mut unique_keywords = std::collections::BTreeSet::new();

    for (category, keywords) in ALLOWED_CATEGORY_KEYWORDS {
        let matched: Vec<String> = keywords
            .iter()
            .map(|keyword| normalize_text(keyword))
            .filter(|keyword| keyword_matches(normalized_body, keyword))
            .collect();
        if !matched.is_empty() {
            for keyword in &matched {
                unique_keywords.insert(keyword.clone());
            }
            matched_categories.insert(*category, matched);
        }
    }

    let count = unique_keywords.len();
    (matched_categories, count)
}

pub fn evaluate_inclusion(
    title: &str,
    description: &str,
    location_match_in_attica: bool,
) -> InclusionVerdict {
    let normalized_title = normalize_text(title);
    let normalized_body = normalize_text(&format!("{title} {description}"));

    if has_rejected_terms(&normalized_title, &normalized_body) {
        return InclusionVerdict::rejected("rejected_keyword", location_match_in_attica);
    }

    let (matched_categories, matched_keyword_count) = find_allowed_matches(&normalized_body);

    if matched_keyword_count == 0 {
        return InclusionVerdict::rejected("no_allowed_category_match", location_match_in_attica);
    }

    InclusionVerdict {
        accepted: true,
        reason: "accepted",
        matched_categories,
        matched_keyword_count,
        has_location_signal: location_match_in_attica,
    }
}

pub fn has_attica_location_signal(text: &str) -> bool {
    let normalized = normalize_text(text);
    ATTICA_LOCATION_TERMS
        .iter()
        .any(|term| normalized.contains(&normalize_text(term)))
}
