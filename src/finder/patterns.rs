//! Candidate email pattern generation.
//!
//! Patterns are ordered by observed hit rate: `first.last@` is tried before
//! initial-based and concatenated forms. Order is part of the contract
//! because verification credits are spent per attempt.

/// Generate candidate addresses for a contact, in priority order.
///
/// `first` and `last` are expected lowercased. Duplicates (possible when
/// first and last collide) are removed preserving first occurrence.
/// An empty first name yields no candidates.
pub fn prioritized_patterns(first: &str, last: Option<&str>, domain: &str) -> Vec<String> {
    if first.is_empty() || domain.is_empty() {
        return Vec::new();
    }

    let first_initial = &first[..first
        .char_indices()
        .nth(1)
        .map_or(first.len(), |(i, _)| i)];

    let mut patterns = match last.filter(|l| !l.is_empty()) {
        Some(last) => {
            let last_initial = &last[..last
                .char_indices()
                .nth(1)
                .map_or(last.len(), |(i, _)| i)];
            vec![
                format!("{first}.{last}@{domain}"),
                format!("{first}{last_initial}@{domain}"),
                format!("{first_initial}{last}@{domain}"),
                format!("{last}{first}@{domain}"),
                format!("{first}@{domain}"),
                format!("{last}@{domain}"),
                format!("{first}{last}@{domain}"),
            ]
        }
        None => vec![format!("{first}@{domain}")],
    };

    // Order-preserving dedup
    let mut seen = std::collections::HashSet::new();
    patterns.retain(|p| seen.insert(p.clone()));
    patterns
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_name_priority_order() {
        let patterns = prioritized_patterns("jane", Some("doe"), "example.com");
        assert_eq!(
            patterns,
            vec![
                "jane.doe@example.com",
                "janed@example.com",
                "jdoe@example.com",
                "doejane@example.com",
                "jane@example.com",
                "doe@example.com",
                "janedoe@example.com",
            ]
        );
    }

    #[test]
    fn missing_last_name_yields_single_candidate() {
        assert_eq!(
            prioritized_patterns("jane", None, "example.com"),
            vec!["jane@example.com"]
        );
        assert_eq!(
            prioritized_patterns("jane", Some(""), "example.com"),
            vec!["jane@example.com"]
        );
    }

    #[test]
    fn colliding_patterns_are_deduped_in_order() {
        // first == last makes several patterns collide
        let patterns = prioritized_patterns("lee", Some("lee"), "example.com");
        assert_eq!(
            patterns,
            vec![
                "lee.lee@example.com",
                "leel@example.com",
                "llee@example.com",
                "leelee@example.com",
                "lee@example.com",
            ]
        );
    }

    #[test]
    fn empty_inputs_yield_nothing() {
        assert!(prioritized_patterns("", Some("doe"), "example.com").is_empty());
        assert!(prioritized_patterns("jane", Some("doe"), "").is_empty());
    }

    #[test]
    fn multibyte_initials_do_not_split_chars() {
        let patterns = prioritized_patterns("éloise", Some("øst"), "example.com");
        assert!(patterns.contains(&"éloise.øst@example.com".to_string()));
        assert!(patterns.contains(&"éøst@example.com".to_string()));
    }
}
