//! Turns free-text artist and title strings into single path segments.
//!
//! Only four characters are rewritten, each to a percent escape:
//!
//! | char | escape |
//! |------|--------|
//! | `%`  | `%25`  |
//! | `/`  | `%2F`  |
//! | `\`  | `%5C`  |
//! | `-`  | `%2D`  |
//!
//! Escaping `%` itself makes the mapping prefix-free, so two different inputs
//! never produce the same segment (`"A/B"` becomes `"A%2FB"`, `"A_B"` is left
//! alone). Escaping `-` keeps `<artist>-<title>` file stems unambiguous: the
//! only raw `-` in such a stem is the separator.
//!
//! Other characters some filesystems reject (`:`, `?`, NUL, over-long names)
//! pass through unchanged. Writes for such keys may fail on those platforms;
//! the cache logs and degrades to a miss.
//!
//! Caches written by the older scheme, which rewrote only the path separators,
//! keep any `-` or `%` raw. Records for names such as `"Jay-Z"` therefore sit
//! under file names this module no longer produces: they are never read, and
//! the next fetch stores a fresh copy under the escaped name.

const ESCAPES: [(char, &str); 4] = [('%', "%25"), ('/', "%2F"), ('\\', "%5C"), ('-', "%2D")];

/// Escapes `input` for use verbatim as one filesystem path segment.
pub fn escape_path_segment(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        match ESCAPES.iter().find(|(raw, _)| *raw == c) {
            Some((_, replacement)) => escaped.push_str(replacement),
            None => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_untouched() {
        assert_eq!(escape_path_segment("Karma Police"), "Karma Police");
        assert_eq!(escape_path_segment(""), "");
        assert_eq!(escape_path_segment("Sigur Rós"), "Sigur Rós");
    }

    #[test]
    fn separators_are_escaped() {
        assert_eq!(escape_path_segment("AC/DC"), "AC%2FDC");
        assert_eq!(escape_path_segment("a\\b"), "a%5Cb");
        assert_eq!(escape_path_segment("//"), "%2F%2F");
        assert_eq!(escape_path_segment("Jay-Z"), "Jay%2DZ");
    }

    #[test]
    fn hyphen_and_percent_names_differ_from_separator_only_escaping() {
        let separator_only = |s: &str| s.replace('/', "%2F").replace('\\', "%5C");
        for name in ["Jay-Z", "Blink-182", "100% Pure"] {
            assert_ne!(escape_path_segment(name), separator_only(name));
        }
        assert_eq!(escape_path_segment("AC/DC"), separator_only("AC/DC"));
    }

    #[test]
    fn escaped_output_never_contains_separators() {
        let escaped = escape_path_segment("../../etc/passwd");
        assert!(!escaped.contains('/'));
        assert_eq!(escaped, "..%2F..%2Fetc%2Fpasswd");
    }

    #[test]
    fn slash_and_underscore_do_not_collide() {
        assert_ne!(escape_path_segment("A/B"), escape_path_segment("A_B"));
    }

    #[test]
    fn literal_escape_sequences_do_not_collide() {
        assert_ne!(escape_path_segment("A/B"), escape_path_segment("A%2FB"));
        assert_eq!(escape_path_segment("100%"), "100%25");
    }
}
