use regex::Regex;
use std::net::IpAddr;
use std::sync::OnceLock;

use crate::error::{Result, StorageError};

/// Longest hostname DNS can carry, without the trailing dot.
const MAX_DOMAIN_LEN: usize = 253;

/// Dot-separated LDH labels of 1-63 chars ending in an alphabetic TLD.
const HOSTNAME_PATTERN: &str =
    r"^(?:[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?\.)+[a-z]{2,63}$";

fn hostname_regex() -> Result<&'static Regex> {
    static HOSTNAME: OnceLock<std::result::Result<Regex, regex::Error>> = OnceLock::new();
    HOSTNAME
        .get_or_init(|| Regex::new(HOSTNAME_PATTERN))
        .as_ref()
        .map_err(|e| StorageError::InvalidValue {
            field: "domain_name",
            reason: format!("hostname pattern does not compile: {e}"),
        })
}

/// Trims and lowercases `name`, then checks it is a hostname or an IP
/// literal a prober can dial.
///
/// ```
/// use certpulse_storage::domain::normalize_domain;
///
/// assert_eq!(normalize_domain(" Example.COM ").unwrap(), "example.com");
/// assert!(normalize_domain("https://example.com/path").is_err());
/// ```
pub fn normalize_domain(name: &str) -> Result<String> {
    let domain = name.trim().to_lowercase();
    if domain.parse::<IpAddr>().is_ok() {
        return Ok(domain);
    }
    if domain.len() <= MAX_DOMAIN_LEN && hostname_regex()?.is_match(&domain) {
        return Ok(domain);
    }
    Err(StorageError::InvalidValue {
        field: "domain_name",
        reason: format!("'{}' is not a valid domain name", name.trim()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_hostnames_and_ip_literals() {
        for name in [
            "example.com",
            "www.rust-lang.org",
            "a.b.co",
            "xn--bcher-kva.example",
            "127.0.0.1",
            "::1",
        ] {
            assert!(normalize_domain(name).is_ok(), "{name}");
        }
    }

    #[test]
    fn rejects_urls_and_garbage() {
        for name in [
            "",
            "   ",
            "not a domain!",
            "exa mple..com",
            "https://x.com/path",
            "example.com:443",
            "-leading.com",
            "trailing-.com",
            "localhost",
            "example.c0m",
        ] {
            let err = normalize_domain(name).unwrap_err();
            assert!(
                matches!(err, StorageError::InvalidValue { field: "domain_name", .. }),
                "{name}"
            );
        }
    }

    #[test]
    fn rejects_overlong_names() {
        let name = format!("{}.com", vec!["a".repeat(63); 4].join("."));
        assert!(name.len() > MAX_DOMAIN_LEN);
        assert!(normalize_domain(&name).is_err());
    }
}
