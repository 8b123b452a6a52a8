//! Root domain extraction from company website fields.

/// Derive the mail domain from a company website value.
///
/// Strips an `http://` / `https://` scheme and a leading `www.`, then takes
/// everything before the first path separator. No public-suffix handling:
/// `sub.example.co.uk` stays `sub.example.co.uk`.
pub fn extract_root_domain(company_website: &str) -> String {
    let stripped = company_website
        .trim()
        .strip_prefix("https://")
        .or_else(|| company_website.trim().strip_prefix("http://"))
        .unwrap_or_else(|| company_website.trim());

    let stripped = stripped.strip_prefix("www.").unwrap_or(stripped);

    stripped
        .split('/')
        .next()
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_scheme_and_www() {
        assert_eq!(extract_root_domain("https://www.example.com"), "example.com");
        assert_eq!(extract_root_domain("http://example.com"), "example.com");
        assert_eq!(extract_root_domain("www.example.com"), "example.com");
    }

    #[test]
    fn drops_path_and_keeps_subdomains() {
        assert_eq!(
            extract_root_domain("https://example.com/about/team"),
            "example.com"
        );
        assert_eq!(
            extract_root_domain("https://mail.example.co.uk/x"),
            "mail.example.co.uk"
        );
    }

    #[test]
    fn bare_domain_passes_through() {
        assert_eq!(extract_root_domain("example.com"), "example.com");
        assert_eq!(extract_root_domain("  example.com  "), "example.com");
    }
}
