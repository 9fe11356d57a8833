//! Text canonicalization shared by author matching, deduplication and the
//! similarity comparator.

use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

/// Anything that is not a word character, whitespace, or a period.
static DISALLOWED: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s.]").unwrap());

/// `{\ss}`, `{\o}`, `{\aa}` style escapes (one or two lowercase letters).
static SHORT_ESCAPE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{\\[a-z]{1,2}\}").unwrap());

/// `{\textregistered }` style control sequences.
static CONTROL_SEQUENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{\\\w+\s*\}").unwrap());

/// Normalize free text for comparison.
///
/// Steps (order matters):
/// 1. Lowercase
/// 2. Unicode canonical decomposition
/// 3. Drop combining marks (accents)
/// 4. Drop everything except word characters, whitespace and `.`
/// 5. Trim
///
/// The result is a fixed point: normalizing it again returns it unchanged.
pub fn normalize_text(text: &str) -> String {
    let lowered = text.to_lowercase();
    let stripped: String = lowered.nfd().filter(|c| !is_combining_mark(*c)).collect();
    DISALLOWED.replace_all(&stripped, "").trim().to_string()
}

/// Text of a provider payload field that should hold a string.
///
/// `null` and absent fields read as empty. Any other JSON value is coerced to
/// its textual form with a warning, since it usually means a provider changed
/// its schema.
pub fn value_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => {
            tracing::warn!(value = %other, "expected a string in provider payload");
            other.to_string()
        }
    }
}

/// [`normalize_text`] over [`value_text`].
pub fn normalize_value(value: &serde_json::Value) -> String {
    normalize_text(&value_text(value))
}

/// Comparator-side normalization.
///
/// Locally curated titles can still carry BibTeX escape fragments that crawled
/// titles never contain, so those are removed before the generic cleanup.
pub fn normalize_for_comparison(text: &str) -> String {
    let text = SHORT_ESCAPE.replace_all(text, "");
    let text = CONTROL_SEQUENCE.replace_all(&text, "");
    normalize_text(&text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_accents_and_case() {
        assert_eq!(normalize_text("Jürgen MÜLLER"), "jurgen muller");
        assert_eq!(normalize_text("Hervé Jégou"), "herve jegou");
    }

    #[test]
    fn keeps_periods_drops_other_punctuation() {
        assert_eq!(normalize_text("M. Mustermann"), "m. mustermann");
        assert_eq!(normalize_text("Deep Learning: A (Short) Survey!"), "deep learning a short survey");
        assert_eq!(normalize_text("10.1145/3292500"), "10.11453292500");
    }

    #[test]
    fn trims_whitespace() {
        assert_eq!(normalize_text("  padded title \n"), "padded title");
        assert_eq!(normalize_text(""), "");
        assert_eq!(normalize_text(" ?! "), "");
    }

    #[test]
    fn idempotent() {
        let samples = [
            "Deep Learning Systems",
            "  Ünïcödé — títlé, with “quotes” ",
            "İstanbul Ǆemal ﬁnance",
            "K Å Ω ẞ",
            "J. Doe, Max Mustermann",
            "{\\\"u}ber {\\ss}",
            "",
        ];
        for s in samples {
            let once = normalize_text(s);
            assert_eq!(normalize_text(&once), once, "not idempotent for {s:?}");
        }
    }

    #[test]
    fn value_coercion() {
        assert_eq!(normalize_value(&serde_json::json!("Ça Va")), "ca va");
        assert_eq!(normalize_value(&serde_json::Value::Null), "");
        assert_eq!(normalize_value(&serde_json::json!(2021)), "2021");
        assert_eq!(value_text(&serde_json::json!("Ça Va")), "Ça Va");
        assert_eq!(value_text(&serde_json::json!(12)), "12");
        assert_eq!(value_text(&serde_json::json!({"a": 1})["missing"]), "");
    }

    #[test]
    fn comparison_strips_markup_escapes() {
        assert_eq!(normalize_for_comparison("Stra{\\ss}e Netzwerke"), "strae netzwerke");
        assert_eq!(
            normalize_for_comparison("Secure {\\textregistered } Systems"),
            "secure  systems"
        );
        assert_eq!(
            normalize_for_comparison("Plain Crawled Title"),
            normalize_text("Plain Crawled Title")
        );
    }
}
