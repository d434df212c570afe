//! Student identity extraction from the free-text `ActivityDescription`.
//!
//! The description mixes a student id (two letters + six digits, e.g.
//! `AB123456`) with service words and the student name in no fixed order. The
//! heuristic: take the first id-shaped token, then treat the longer side of
//! the surrounding tokens as the name.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;

static STUDENT_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z]{2}\d{6}$").unwrap());

/// Split an activity description into `(student_id, student_name)`.
///
/// Both outputs are empty when no token matches the id pattern. Scanning
/// stops at the first match; later id-shaped tokens are ignored. When the
/// token counts on both sides of the id are equal, the left side wins.
pub fn extract_student_fields(activity: &str) -> (String, String) {
    let tokens: Vec<&str> = activity.split_whitespace().collect();

    for (index, token) in tokens.iter().enumerate() {
        if !STUDENT_ID.is_match(token) {
            continue;
        }
        let left = &tokens[..index];
        let right = &tokens[index + 1..];
        let candidate = if right.len() > left.len() { right } else { left };
        let name = dedupe_tokens(candidate).join(" ");
        return ((*token).to_string(), name);
    }

    (String::new(), String::new())
}

/// Remove duplicate tokens, preserving first-occurrence order.
fn dedupe_tokens<'a>(tokens: &[&'a str]) -> Vec<&'a str> {
    let mut seen = HashSet::new();
    tokens.iter().copied().filter(|t| seen.insert(*t)).collect()
}
