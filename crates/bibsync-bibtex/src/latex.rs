//! Rewrite LaTeX accent and special-letter escapes in .bib text as Unicode.

use std::path::Path;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use unicode_normalization::UnicodeNormalization;

use crate::BibError;

/// Letters written as a bare control word, e.g. `{\ss}`.
const SPECIAL_LETTERS: [(&str, &str); 14] = [
    (r#"{\"s}"#, "ß"),
    (r"{\ss}", "ß"),
    (r"{\o}", "ø"),
    (r"{\O}", "Ø"),
    (r"{\l}", "ł"),
    (r"{\L}", "Ł"),
    (r"{\i}", "ı"),
    (r"{\j}", "ȷ"),
    (r"{\aa}", "å"),
    (r"{\AA}", "Å"),
    (r"{\ae}", "æ"),
    (r"{\AE}", "Æ"),
    (r"{\oe}", "œ"),
    (r"{\OE}", "Œ"),
];

// `{\"u}`, `{\"{u}}`, `\"{u}`, `\"u`
static SYMBOL_ACCENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"\{\\(["'`^~=.])\s*(?:\{([A-Za-z])\}|([A-Za-z]))\}|\\(["'`^~=.])(?:\{([A-Za-z])\}|([A-Za-z]))"#,
    )
    .unwrap()
});

// `{\v c}`, `{\v{c}}`, `\v{c}`; a space or brace must follow the command
// letter so `\url` and `\ref` are left alone.
static LETTER_ACCENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\{\\([uvHckr])(?:\s*\{([A-Za-z])\}|\s+([A-Za-z]))\}|\\([uvHckr])(?:\{([A-Za-z])\}|\s+([A-Za-z]))",
    )
    .unwrap()
});

fn combining_mark(accent: &str) -> Option<char> {
    Some(match accent {
        "\"" => '\u{0308}',
        "'" => '\u{0301}',
        "`" => '\u{0300}',
        "^" => '\u{0302}',
        "~" => '\u{0303}',
        "=" => '\u{0304}',
        "." => '\u{0307}',
        "u" => '\u{0306}',
        "v" => '\u{030C}',
        "H" => '\u{030B}',
        "c" => '\u{0327}',
        "k" => '\u{0328}',
        "r" => '\u{030A}',
        _ => return None,
    })
}

fn first_group<'h>(caps: &Captures<'h>, groups: &[usize]) -> Option<&'h str> {
    groups
        .iter()
        .find_map(|&i| caps.get(i))
        .map(|m| m.as_str())
}

fn compose(caps: &Captures<'_>) -> String {
    let accent = first_group(caps, &[1, 4]);
    let letter = first_group(caps, &[2, 3, 5, 6]);
    match (accent.and_then(combining_mark), letter) {
        (Some(mark), Some(letter)) => format!("{letter}{mark}").nfc().collect(),
        _ => caps[0].to_string(),
    }
}

/// Replace LaTeX letter escapes with the Unicode characters they denote.
pub fn preprocess_latex_characters(content: &str) -> String {
    let mut text = content.to_string();
    for (escape, letter) in SPECIAL_LETTERS {
        if text.contains(escape) {
            text = text.replace(escape, letter);
        }
    }
    let text = SYMBOL_ACCENT.replace_all(&text, compose);
    LETTER_ACCENT.replace_all(&text, compose).into_owned()
}

/// Preprocess `input` and write the result to `output`.
pub fn preprocess_bib_file(input: &Path, output: &Path) -> Result<(), BibError> {
    let content = std::fs::read_to_string(input)?;
    let processed = preprocess_latex_characters(&content);
    if let Some(parent) = output.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(output, processed)?;
    tracing::info!(
        input = %input.display(),
        output = %output.display(),
        "bibliography preprocessed"
    );
    Ok(())
}
