//! Domain name validation and normalization.
//!
//! All identifiers are lowercased before comparison; validation follows
//! DNS label rules (1-253 chars total, labels 1-63 chars, alphanumeric
//! plus interior hyphens).

/// Maximum length of a fully-qualified domain name.
pub const MAX_DOMAIN_LENGTH: usize = 253;

/// Maximum length of a single DNS label.
pub const MAX_LABEL_LENGTH: usize = 63;

/// Lowercase and trim a domain for comparison and storage.
pub fn normalize(domain: &str) -> String {
    domain.trim().to_ascii_lowercase()
}

/// Check a domain against DNS syntax rules.
///
/// Requires at least two labels (a bare TLD is not a blockable domain)
/// and rejects an all-numeric final label so IPv4 addresses never pass.
pub fn validate_domain(domain: &str) -> bool {
    let domain = normalize(domain);
    if domain.is_empty() || domain.len() > MAX_DOMAIN_LENGTH {
        return false;
    }

    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 {
        return false;
    }

    for label in &labels {
        if label.is_empty() || label.len() > MAX_LABEL_LENGTH {
            return false;
        }
        if label.starts_with('-') || label.ends_with('-') {
            return false;
        }
        if !label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return false;
        }
    }

    // Final label must not be purely numeric.
    let tld = labels[labels.len() - 1];
    if tld.chars().all(|c| c.is_ascii_digit()) {
        return false;
    }

    true
}

/// Check whether `child` is a strict subdomain of `parent`.
///
/// A domain is never a subdomain of itself, and a suffix match that
/// does not fall on a label boundary does not count.
pub fn is_subdomain(child: &str, parent: &str) -> bool {
    let child = normalize(child);
    let parent = normalize(parent);

    if child.is_empty() || parent.is_empty() || child == parent {
        return false;
    }

    child.ends_with(&format!(".{parent}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_domains() {
        assert!(validate_domain("example.com"));
        assert!(validate_domain("aws.amazon.com"));
        assert!(validate_domain("a-b.example.co.uk"));
        assert!(validate_domain("EXAMPLE.COM"));
    }

    #[test]
    fn test_invalid_domains() {
        assert!(!validate_domain(""));
        assert!(!validate_domain("localhost"));
        assert!(!validate_domain("-bad.com"));
        assert!(!validate_domain("bad-.com"));
        assert!(!validate_domain("exa mple.com"));
        assert!(!validate_domain("192.168.1.1"));
        assert!(!validate_domain(&format!("{}.com", "a".repeat(64))));
        assert!(!validate_domain(&"a.".repeat(130)));
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("  Example.COM "), "example.com");
    }

    #[test]
    fn test_is_subdomain() {
        assert!(is_subdomain("aws.amazon.com", "amazon.com"));
        assert!(is_subdomain("a.b.c.example.com", "example.com"));
        assert!(is_subdomain("AWS.Amazon.COM", "amazon.com"));
        assert!(is_subdomain("  aws.amazon.com  ", "amazon.com"));
    }

    #[test]
    fn test_is_not_subdomain() {
        assert!(!is_subdomain("amazon.com", "amazon.com"));
        assert!(!is_subdomain("notamazon.com", "amazon.com"));
        assert!(!is_subdomain("google.com", "amazon.com"));
        assert!(!is_subdomain("", "amazon.com"));
        assert!(!is_subdomain("aws.amazon.com", ""));
    }
}
