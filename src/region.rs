// src/region.rs
//! The fixed target geography: the Attica bounding box, the Athens centroid
//! used for approximate placement, the anchor gazetteer for fast
//! high-confidence geolocation, and the region relevance keyword list.

/// Athens city centre; also the fallback point for approximate resolutions.
pub const ATHENS_LAT: f64 = 37.9838;
pub const ATHENS_LNG: f64 = 23.7275;

pub const ATTICA_MIN_LAT: f64 = 37.65;
pub const ATTICA_MAX_LAT: f64 = 38.35;
pub const ATTICA_MIN_LNG: f64 = 23.2;
pub const ATTICA_MAX_LNG: f64 = 24.25;

/// A named sub-location with a canonical point and normalized-text aliases.
#[derive(Debug, Clone, Copy)]
pub struct Anchor {
    pub key: &'static str,
    pub aliases: &'static [&'static str],
    pub lat: f64,
    pub lng: f64,
}

pub static ATHENS_ANCHORS: &[Anchor] = &[
    Anchor { key: "syntagma", aliases: &["syntagma", "σύνταγμα"], lat: 37.9755, lng: 23.7348 },
    Anchor { key: "exarcheia", aliases: &["exarcheia", "εξάρχεια"], lat: 37.9867, lng: 23.7319 },
    Anchor { key: "kolonaki", aliases: &["kolonaki", "κολωνάκι"], lat: 37.9789, lng: 23.7439 },
    Anchor { key: "kypseli", aliases: &["kypseli", "κυψέλη"], lat: 37.9939, lng: 23.7329 },
    Anchor { key: "omonia", aliases: &["omonia", "ομόνοια"], lat: 37.9843, lng: 23.7281 },
    Anchor { key: "piraeus", aliases: &["piraeus", "πειραιάς", "πειραιας"], lat: 37.9439, lng: 23.6467 },
    Anchor { key: "kifissia", aliases: &["kifissia", "κηφισιά", "κηφισια"], lat: 38.0741, lng: 23.8116 },
    Anchor { key: "glyfada", aliases: &["glyfada", "γλυφάδα", "γλυφαδα"], lat: 37.8629, lng: 23.7488 },
    Anchor { key: "chalandri", aliases: &["chalandri", "halandri", "χαλάνδρι", "χαλανδρι"], lat: 38.0217, lng: 23.7988 },
    Anchor { key: "marousi", aliases: &["marousi", "μαρούσι", "μαρουσι", "amarousio"], lat: 38.0518, lng: 23.8050 },
    Anchor { key: "peristeri", aliases: &["peristeri", "περιστέρι", "περιστερι"], lat: 38.0154, lng: 23.6917 },
    Anchor { key: "galatsi", aliases: &["galatsi", "γαλάτσι", "γαλατσι"], lat: 38.0167, lng: 23.7500 },
    Anchor { key: "nea smyrni", aliases: &["nea smyrni", "νέα σμύρνη", "νεα σμυρνη"], lat: 37.9450, lng: 23.7110 },
    Anchor { key: "kallithea", aliases: &["kallithea", "καλλιθέα", "καλλιθεα"], lat: 37.9511, lng: 23.7006 },
    Anchor { key: "zografou", aliases: &["zografou", "ζωγράφου", "ζωγραφου"], lat: 37.9717, lng: 23.7656 },
    Anchor { key: "penteli", aliases: &["penteli", "πεντέλη", "πεντελη"], lat: 38.0614, lng: 23.8694 },
    Anchor { key: "attiki odos", aliases: &["attiki odos", "αττική οδός", "αττικη οδος"], lat: 37.9908, lng: 23.6917 },
];

/// Terms that make free text look Athens/Attica-related at all. Broader than
/// the anchor aliases; used to decide whether geocoding is worth attempting.
pub static ATHENS_KEYWORDS: &[&str] = &[
    "athens", "αθήνα", "attica", "attiki", "piraeus", "πειραιά", "kifissia",
    "glyfada", "nea smyrni", "kallithea", "chalandri", "halandri", "marousi",
    "iraklio", "heraklion", "galatsi", "peristeri", "exarcheia", "kolonaki",
    "syntagma", "omonia", "zografou", "attiki odos", "penteli",
];

pub fn is_inside_attica(lat: f64, lng: f64) -> bool {
    lat.is_finite()
        && lng.is_finite()
        && (ATTICA_MIN_LAT..=ATTICA_MAX_LAT).contains(&lat)
        && (ATTICA_MIN_LNG..=ATTICA_MAX_LNG).contains(&lng)
}

pub fn text_looks_athens_relevant(text: &str) -> bool {
    let normalized = normalize_text(text);
    ATHENS_KEYWORDS
        .iter()
        .any(|keyword| normalized.contains(&normalize_text(keyword)))
}

pub fn find_anchor(text: &str) -> Option<&'static Anchor> {
    let normalized = normalize_text(text);
    ATHENS_ANCHORS.iter().find(|anchor| {
        anchor
            .aliases
            .iter()
            .any(|alias| normalized.contains(&normalize_text(alias)))
    })
}

/// Lowercase, strip diacritics, collapse whitespace. Both keyword tables and
/// input text go through this, so matching is accent- and case-insensitive.
pub fn normalize_text(input: &str) -> String {
    let folded: String = input
        .chars()
        .flat_map(|c| c.to_lowercase())
        .map(fold_diacritic)
        .collect();

    let mut out = String::with_capacity(folded.len());
    let mut last_was_space = false;
    for c in folded.chars() {
        if c.is_whitespace() {
            if !last_was_space && !out.is_empty() {
                out.push(' ');
            }
            last_was_space = true;
        } else {
            out.push(c);
            last_was_space = false;
        }
    }
    while out.ends_with(' ') {
        out.pop();
    }
    out
}

/// Strip Greek tonos/dialytika and common Latin accents. Only the marks that
/// actually occur in the feeds and keyword tables are covered.
pub fn fold_diacritic(c: char) -> char {
    match c {
        'ά' => 'α',
        'έ' => 'ε',
        'ή' => 'η',
        'ί' | 'ϊ' | 'ΐ' => 'ι',
        'ό' => 'ο',
        'ύ' | 'ϋ' | 'ΰ' => 'υ',
        'ώ' => 'ω',
        'á' | 'à' | 'â' | 'ä' | 'ã' | 'å' => 'a',
        'é' | 'è' | 'ê' | 'ë' => 'e',
        'í' | 'ì' | 'î' | 'ï' => 'i',
        'ó' | 'ò' | 'ô' | 'ö' | 'õ' => 'o',
        'ú' | 'ù' | 'û' | 'ü' => 'u',
        'ç' => 'c',
        'ñ' => 'n',
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bbox_containment() {
        assert!(is_inside_attica(ATHENS_LAT, ATHENS_LNG));
        assert!(!is_inside_attica(40.64, 22.94)); // Thessaloniki
        assert!(!is_inside_attica(f64::NAN, 23.7));
    }

    #[test]
    fn normalization_strips_accents_and_whitespace() {
        assert_eq!(normalize_text("  Κολωνάκι   τώρα "), "κολωνακι τωρα");
        assert_eq!(normalize_text("Café  du   Nord"), "cafe du nord");
    }

    #[test]
    fn anchor_matches_greek_and_latin_aliases() {
        let anchor = find_anchor("Φωτιά στο Κολωνάκι").expect("greek alias");
        assert_eq!(anchor.key, "kolonaki");
        let anchor = find_anchor("Building fire in Kolonaki").expect("latin alias");
        assert_eq!(anchor.key, "kolonaki");
        assert!(find_anchor("storm over Thessaloniki").is_none());
    }

    #[test]
    fn relevance_keywords_hit_accented_text() {
        assert!(text_looks_athens_relevant("Συναγερμός στην Αθήνα"));
        assert!(!text_looks_athens_relevant("quiet day in Patras"));
    }
}
