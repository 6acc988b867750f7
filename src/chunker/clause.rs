//! Clause number extraction (§4.5 step 7).

use std::sync::OnceLock;

fn leading_clause_re() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| regex::Regex::new(r"^\s*(\d+(?:\.\d+){0,4})\b").unwrap())
}

/// Scans for a leading clause number in `text`; falls back to
/// `inherited` (the nearest ancestor header's clause) when none is found.
pub fn extract_clause(text: &str, inherited: Option<&str>) -> String {
    if let Some(caps) = leading_clause_re().captures(text) {
        return caps[1].to_string();
    }
    inherited.unwrap_or_default().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_leading_clause() {
        assert_eq!(extract_clause("4.2.3 The device SHALL...", None), "4.2.3");
    }

    #[test]
    fn falls_back_to_inherited() {
        assert_eq!(extract_clause("The device SHALL...", Some("4.2")), "4.2");
    }

    #[test]
    fn empty_when_no_clause_anywhere() {
        assert_eq!(extract_clause("The device SHALL...", None), "");
    }
}
