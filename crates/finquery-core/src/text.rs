//! Query text normalization
//!
//! Both backends see text in the same canonical form: lowercased, with every
//! run of whitespace collapsed to a single space and no leading or trailing
//! whitespace. The ASCII file, group, record and unit separators
//! (`\x1c`..=`\x1f`) count as whitespace too.

/// Normalize query text before classification.
///
/// Idempotent: `normalize(&normalize(s)) == normalize(s)`.
pub fn normalize(text: &str) -> String {
    let lowered = text.to_lowercase();
    let mut out = String::with_capacity(lowered.len());

    for word in lowered.split(is_separator).filter(|word| !word.is_empty()) {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(word);
    }

    out
}

fn is_separator(c: char) -> bool {
    c.is_whitespace() || ('\x1c'..='\x1f').contains(&c)
}
