use regex::{Regex, RegexBuilder};

pub fn build_highlight_regex(query: &str) -> Option<Regex> {
    if query.trim().is_empty() {
        return None;
    }
    RegexBuilder::new(&regex::escape(query))
        .case_insensitive(true)
        .build()
        .ok()
}

/// Wraps every case-insensitive hit in `[` `]`.
pub fn mark_matches(text: &str, regex: &Regex) -> String {
    regex
        .replace_all(text, |caps: &regex::Captures<'_>| format!("[{}]", &caps[0]))
        .into_owned()
}
