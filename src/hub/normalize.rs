use crate::constants::HTTPS_PREFIX;
use crate::constants::HTTP_PREFIX;
use crate::HubError;
use crate::Result;

/// Splits a leading `http://` or `https://` (any case) off `url`
fn split_scheme(url: &str) -> (Option<&'static str>, &str) {
    let url = url.trim();
    for prefix in [HTTPS_PREFIX, HTTP_PREFIX] {
        if url
            .get(..prefix.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
        {
            return (Some(prefix), &url[prefix.len()..]);
        }
    }
    (None, url)
}

fn host_part(url: &str) -> &str {
    split_scheme(url).1.trim_end_matches('/')
}

/// `url` with its scheme replaced by (or prefixed with) `http://`, without trailing `/`
pub fn to_http(url: &str) -> String {
    format!("{}{}", HTTP_PREFIX, host_part(url))
}

/// `url` with its scheme replaced by (or prefixed with) `https://`, without trailing `/`
pub fn to_https(url: &str) -> String {
    format!("{}{}", HTTPS_PREFIX, host_part(url))
}

/// Key a configured endpoint is stored under: its own scheme (lowercased,
/// `http://` when absent) followed by the host part.
pub fn endpoint_key(url: &str) -> Result<String> {
    let (scheme, rest) = split_scheme(url);
    let host = rest.trim_end_matches('/');
    if host.is_empty() || host.contains("://") {
        return Err(HubError::InvalidEndpoint(url.to_string()).into());
    }
    Ok(format!("{}{}", scheme.unwrap_or(HTTP_PREFIX), host))
}

/// Scheme-insensitive identity of an endpoint; two urls naming the same host
/// through different schemes share it.
pub(crate) fn canonical_endpoint(url: &str) -> Result<String> {
    endpoint_key(url)?;
    Ok(to_http(url))
}
