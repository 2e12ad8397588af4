//! OAuth 1.0a request signing (HMAC-SHA1), as used by the legacy Twitter
//! v1.1 endpoints.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use hmac::{Hmac, Mac};
use sha1::Sha1;

use crate::error::{PlatformError, PlatformResult};

type HmacSha1 = Hmac<Sha1>;

/// Application and user key material for one signed request.
#[derive(Debug, Clone, Copy)]
pub struct OAuth1Keys<'a> {
    pub consumer_key: &'a str,
    pub consumer_secret: &'a str,
    pub token: &'a str,
    pub token_secret: &'a str,
}

/// RFC 3986 percent-encoding: everything but `A-Z a-z 0-9 - . _ ~`.
fn enc(s: &str) -> String {
    urlencoding::encode(s).into_owned()
}

/// 32 hex characters of randomness for `oauth_nonce`.
pub fn fresh_nonce() -> String {
    hex::encode(rand::random::<[u8; 16]>())
}

/// The `oauth_signature` value for a request.
///
/// `url` must not carry a query string; query and form parameters go in
/// `request_params` alongside nothing else, the protocol parameters are
/// added here.
pub fn signature(
    method: &str,
    url: &str,
    request_params: &[(&str, &str)],
    keys: &OAuth1Keys<'_>,
    nonce: &str,
    timestamp: i64,
) -> PlatformResult<String> {
    let timestamp = timestamp.to_string();
    let mut params: Vec<(String, String)> = request_params
        .iter()
        .map(|(k, v)| (enc(k), enc(v)))
        .collect();
    params.extend(
        protocol_params(keys, nonce, &timestamp)
            .iter()
            .map(|(k, v)| (enc(k), enc(v))),
    );
    params.sort();

    let param_string = params
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");

    let base = format!("{}&{}&{}", method.to_uppercase(), enc(url), enc(&param_string));
    let key = format!("{}&{}", enc(keys.consumer_secret), enc(keys.token_secret));

    let mut mac = HmacSha1::new_from_slice(key.as_bytes())
        .map_err(|e| PlatformError::malformed("oauth1", e))?;
    mac.update(base.as_bytes());
    Ok(B64.encode(mac.finalize().into_bytes()))
}

/// Full `Authorization` header value for a signed request.
pub fn authorization_header(
    method: &str,
    url: &str,
    request_params: &[(&str, &str)],
    keys: &OAuth1Keys<'_>,
    nonce: &str,
    timestamp: i64,
) -> PlatformResult<String> {
    let signature = signature(method, url, request_params, keys, nonce, timestamp)?;
    let timestamp = timestamp.to_string();

    let mut fields = protocol_params(keys, nonce, &timestamp);
    fields.push(("oauth_signature", signature.as_str()));
    fields.sort();

    let rendered = fields
        .iter()
        .map(|(k, v)| format!("{}=\"{}\"", enc(k), enc(v)))
        .collect::<Vec<_>>()
        .join(", ");

    Ok(format!("OAuth {rendered}"))
}

fn protocol_params<'a>(keys: &OAuth1Keys<'a>, nonce: &'a str, timestamp: &'a str) -> Vec<(&'a str, &'a str)> {
    vec![
        ("oauth_consumer_key", keys.consumer_key),
        ("oauth_nonce", nonce),
        ("oauth_signature_method", "HMAC-SHA1"),
        ("oauth_timestamp", timestamp),
        ("oauth_token", keys.token),
        ("oauth_version", "1.0"),
    ]
}
