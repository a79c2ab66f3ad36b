use super::*;
use crate::Error;
use crate::HubError;

#[test]
fn test_to_http_replaces_or_adds_scheme() {
    assert_eq!(to_http("https://harbor.domain.com"), "http://harbor.domain.com");
    assert_eq!(to_http("http://harbor.domain.com"), "http://harbor.domain.com");
    assert_eq!(to_http("harbor.domain.com"), "http://harbor.domain.com");
    assert_eq!(to_http("HTTPS://harbor.domain.com/"), "http://harbor.domain.com");
}

#[test]
fn test_to_https_replaces_or_adds_scheme() {
    assert_eq!(to_https("http://harbor.domain.com"), "https://harbor.domain.com");
    assert_eq!(to_https("https://harbor.domain.com"), "https://harbor.domain.com");
    assert_eq!(to_https("harbor.domain.com:8443/"), "https://harbor.domain.com:8443");
}

#[test]
fn test_endpoint_key_keeps_own_scheme() {
    assert_eq!(endpoint_key("https://harbor.domain.com/").unwrap(), "https://harbor.domain.com");
    assert_eq!(endpoint_key("Http://harbor.domain.com").unwrap(), "http://harbor.domain.com");
    assert_eq!(endpoint_key("  harbor.domain.com ").unwrap(), "http://harbor.domain.com");
}

#[test]
fn test_endpoint_key_rejects_missing_host() {
    for bad in ["", "   ", "http://", "https:///", "ftp://harbor.domain.com"] {
        let err = endpoint_key(bad).unwrap_err();
        assert!(
            matches!(err, Error::Hub(HubError::InvalidEndpoint(_))),
            "{bad:?} should be rejected"
        );
    }
}

#[test]
fn test_canonical_endpoint_ignores_scheme() {
    assert_eq!(
        canonical_endpoint("https://harbor.domain.com").unwrap(),
        canonical_endpoint("http://harbor.domain.com/").unwrap()
    );
    assert!(canonical_endpoint("").is_err());
}
