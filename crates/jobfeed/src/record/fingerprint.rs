use sha2::{Digest, Sha256};

use super::Posting;

/// Separates fields so that `("ab", "c")` and `("a", "bc")` hash apart.
const FIELD_SEPARATOR: char = '\u{1f}';

/// Deterministic identity of a posting for duplicate detection.
///
/// SHA-256 over the source name, company, title, location and description,
/// each lowercased with whitespace collapsed. Formatting churn upstream
/// (extra spaces, case changes) maps to the same fingerprint; a changed word
/// does not.
pub fn fingerprint(source_name: &str, posting: &Posting) -> String {
    let fields = [
        source_name,
        posting.company.as_str(),
        posting.title.as_str(),
        posting.location.as_deref().unwrap_or_default(),
        posting.description.as_str(),
    ];

    let mut hasher = Sha256::new();
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            let mut buf = [0u8; 4];
            hasher.update(FIELD_SEPARATOR.encode_utf8(&mut buf).as_bytes());
        }
        hasher.update(normalize(field).as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

fn normalize(field: &str) -> String {
    field
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}
