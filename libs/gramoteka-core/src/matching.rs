//! Tolerant answer matching for free-text submissions.
//!
//! Canonical answers come from exercise data; submissions come from users
//! typing on phones. The matcher is case-insensitive, anchored to the whole
//! trimmed string, and can relax three things independently: a dash in the
//! canonical answer, a space in the canonical answer, and the letter "ё".
//! A submission may never introduce a separator the canonical answer lacks.

use regex::RegexBuilder;

/// Toggles for the individual tolerance rules.
#[derive(Debug, Clone, Copy)]
pub struct MatchOptions {
    /// A canonical dash may be answered with a dash, whitespace, or nothing.
    pub dash_tolerance: bool,
    /// A canonical space may be answered with whitespace or nothing
    /// (a dash is not accepted in its place).
    pub space_tolerance: bool,
    /// A canonical "ё" may be answered with "ё" or "е".
    pub yo_tolerance: bool,
}

impl Default for MatchOptions {
    fn default() -> Self {
        Self {
            dash_tolerance: true,
            space_tolerance: true,
            yo_tolerance: true,
        }
    }
}

impl MatchOptions {
    /// Strict separators: single-word answers where neither a dash nor a
    /// space may be dropped, only the "ё"/"е" variation is allowed.
    pub fn single_word() -> Self {
        Self {
            dash_tolerance: false,
            space_tolerance: false,
            yo_tolerance: true,
        }
    }
}

/// Compare a submission against one canonical answer.
pub fn matches(submitted: &str, canonical: &str, opts: MatchOptions) -> bool {
    let mut pattern = String::with_capacity(canonical.len() * 2 + 2);
    pattern.push('^');
    for ch in canonical.trim().to_lowercase().chars() {
        match ch {
            '-' if opts.dash_tolerance => pattern.push_str(r"[-\s]?"),
            ' ' if opts.space_tolerance => pattern.push_str(r"\s?"),
            'ё' if opts.yo_tolerance => pattern.push_str("[её]"),
            other => pattern.push_str(&regex::escape(&other.to_string())),
        }
    }
    pattern.push('$');

    match RegexBuilder::new(&pattern).case_insensitive(true).build() {
        Ok(re) => re.is_match(submitted.trim()),
        // Every canonical character is escaped, so the pattern is valid by
        // construction; fall back to a plain comparison just in case.
        Err(_) => submitted.trim().eq_ignore_ascii_case(canonical.trim()),
    }
}

/// Compare a submission against a `;`-joined list of canonical alternatives.
/// Matching any alternative counts as correct.
pub fn matches_any(submitted: &str, canonical: &str, opts: MatchOptions) -> bool {
    canonical
        .split(';')
        .map(str::trim)
        .filter(|alt| !alt.is_empty())
        .any(|alt| matches(submitted, alt, opts))
}

/// Split a `;`-joined canonical answer into its trimmed alternatives.
pub fn alternatives(canonical: &str) -> Vec<&str> {
    canonical
        .split(';')
        .map(str::trim)
        .filter(|alt| !alt.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_match(submitted: &str, canonical: &str) -> bool {
        matches(submitted, canonical, MatchOptions::default())
    }

    #[test]
    fn dash_can_be_dropped_or_replaced_by_space() {
        assert!(default_match("какой-то", "какой-то"));
        assert!(default_match("какойто", "какой-то"));
        assert!(default_match("какой то", "какой-то"));
        assert!(default_match("КАКОЙ-ТО", "какой-то"));
        assert!(!default_match("ка-който", "какой-то"));
        assert!(!default_match("ка който", "какой-то"));
    }

    #[test]
    fn space_can_be_dropped_but_not_replaced_by_dash() {
        assert!(default_match("привет мир", "привет мир"));
        assert!(default_match("приветмир", "привет мир"));
        assert!(!default_match("привет-мир", "привет мир"));
        assert!(default_match("ПРИВЕТ МИР", "привет мир"));
        assert!(!default_match("при вет мир", "привет мир"));
    }

    #[test]
    fn yo_accepts_plain_e() {
        assert!(default_match("ёжик", "ёжик"));
        assert!(default_match("ежик", "ёжик"));
        assert!(default_match("Ежик", "ёжик"));
        assert!(!default_match("ё жик", "ёжик"));
        assert!(!default_match("е-жик", "ёжик"));
    }

    #[test]
    fn combined_dash_and_space() {
        for ok in ["какой-то текст", "какойто текст", "какой то текст",
                   "какой-тотекст", "какойтотекст"] {
            assert!(default_match(ok, "какой-то текст"), "{ok}");
        }
        assert!(!default_match("какой  то текст", "какой-то текст"));
        assert!(!default_match("ка-който текст", "какой-то текст"));
    }

    #[test]
    fn no_separators_may_be_invented() {
        assert!(default_match("привет", "привет"));
        assert!(default_match("ПРИВЕТ", "привет"));
        assert!(!default_match("при вет", "привет"));
        assert!(!default_match("при-вет", "привет"));
    }

    #[test]
    fn outer_whitespace_is_ignored() {
        assert!(default_match("  привет  ", "привет"));
        assert!(default_match("привет", "  привет  "));
    }

    #[test]
    fn tolerances_can_be_disabled() {
        let strict = MatchOptions {
            dash_tolerance: false,
            space_tolerance: false,
            yo_tolerance: false,
        };
        assert!(!matches("какойто", "какой-то", strict));
        assert!(matches("какой-то", "какой-то", strict));
        assert!(!matches("ежик", "ёжик", strict));
    }

    #[test]
    fn single_word_keeps_yo_tolerance_only() {
        let opts = MatchOptions::single_word();
        assert!(matches("ежик", "ёжик", opts));
        assert!(!matches("какойто", "какой-то", opts));
        assert!(!matches("приветмир", "привет мир", opts));
    }

    #[test]
    fn space_tolerance_alone_rejects_dash_for_space() {
        let opts = MatchOptions {
            dash_tolerance: false,
            space_tolerance: true,
            yo_tolerance: false,
        };
        assert!(!matches("привет-мир", "привет мир", opts));
        assert!(matches("приветмир", "привет мир", opts));
    }

    #[test]
    fn regex_metacharacters_in_canonical_are_literal() {
        assert!(default_match("во-первых (кратко)", "во-первых (кратко)"));
        assert!(!default_match("во-первых кратко", "во-первых (кратко)"));
    }

    #[test]
    fn any_alternative_matches() {
        let opts = MatchOptions::default();
        assert!(matches_any("зато", "зато; однако", opts));
        assert!(matches_any("однако", "зато; однако", opts));
        assert!(!matches_any("потому", "зато; однако", opts));
    }

    #[test]
    fn alternatives_are_trimmed() {
        assert_eq!(alternatives("зато; однако ;"), vec!["зато", "однако"]);
        assert_eq!(alternatives("один"), vec!["один"]);
    }
}
