//! Ingest gate: subnet allow-list, gzip request decompression, and body
//! signature validation.
//!
//! The gate runs ahead of every handler in a fixed order: reject callers
//! outside the trusted subnet, inflate gzip bodies, then compare the
//! `HashSHA256` header against an HMAC computed over the raw decompressed
//! body. A mismatch is rejected before ingest ever sees the batch.

use axum::{
    body::{Body, Bytes},
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use flate2::read::GzDecoder;
use hmac::{Hmac, Mac};
use ip_network::IpNetwork;
use sha2::Sha256;
use std::io::Read;
use std::net::IpAddr;
use std::sync::Arc;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the hex HMAC of the uncompressed body.
pub const SIGNATURE_HEADER: &str = "HashSHA256";
/// Header carrying the caller's address for the subnet gate.
pub const REAL_IP_HEADER: &str = "X-Real-IP";

const MAX_BODY_BYTES: usize = 8 * 1024 * 1024;

/// Shared gate configuration.
#[derive(Debug, Default)]
pub struct IngestGate {
    pub secret_key: Option<String>,
    pub trusted_subnet: Option<IpNetwork>,
}

pub async fn ingest_gate(
    State(gate): State<Arc<IngestGate>>,
    request: Request,
    next: Next,
) -> Response {
    if let Some(subnet) = &gate.trusted_subnet {
        match caller_ip(&request) {
            Some(ip) if subnet.contains(ip) => {},
            _ => {
                tracing::debug!("request outside trusted subnet rejected");
                return StatusCode::FORBIDDEN.into_response();
            },
        }
    }

    // Only mutating requests carry bodies worth gating.
    if request.method() == axum::http::Method::GET {
        return next.run(request).await;
    }

    let (mut parts, body) = request.into_parts();
    let raw = match axum::body::to_bytes(body, MAX_BODY_BYTES).await {
        Ok(raw) => raw,
        Err(_) => return StatusCode::BAD_REQUEST.into_response(),
    };

    let raw = if is_gzip(&parts.headers) {
        parts.headers.remove(header::CONTENT_ENCODING);
        match inflate(&raw) {
            Ok(raw) => raw,
            Err(_) => {
                tracing::debug!("malformed gzip body rejected");
                return StatusCode::BAD_REQUEST.into_response();
            },
        }
    } else {
        raw
    };

    if let Some(secret) = &gate.secret_key {
        if !signature_matches(secret, &parts.headers, &raw) {
            tracing::warn!("body signature mismatch, rejecting before ingest");
            return StatusCode::BAD_REQUEST.into_response();
        }
    }

    parts.headers.remove(header::CONTENT_LENGTH);
    let request = Request::from_parts(parts, Body::from(raw));
    next.run(request).await
}

fn caller_ip(request: &Request) -> Option<IpAddr> {
    request
        .headers()
        .get(REAL_IP_HEADER)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

fn is_gzip(headers: &axum::http::HeaderMap) -> bool {
    headers
        .get(header::CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .map_or(false, |v| v.contains("gzip"))
}

fn inflate(raw: &[u8]) -> std::io::Result<Bytes> {
    let mut decoder = GzDecoder::new(raw);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(Bytes::from(out))
}

/// Compares the signature header against an HMAC over the raw decompressed
/// body. A missing header with a configured secret is a mismatch.
fn signature_matches(secret: &str, headers: &axum::http::HeaderMap, body: &[u8]) -> bool {
    let Some(claimed) = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| hex::decode(v).ok())
    else {
        return false;
    };

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(body);
    mac.verify_slice(&claimed).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signed_headers(secret: &str, body: &[u8]) -> axum::http::HeaderMap {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        let hex = hex::encode(mac.finalize().into_bytes());
        let mut headers = axum::http::HeaderMap::new();
        headers.insert(SIGNATURE_HEADER, hex.parse().unwrap());
        headers
    }

    #[test]
    fn test_signature_round_trip() {
        let headers = signed_headers("s3cret", b"payload");
        assert!(signature_matches("s3cret", &headers, b"payload"));
        assert!(!signature_matches("s3cret", &headers, b"tampered"));
        assert!(!signature_matches("other-key", &headers, b"payload"));
    }

    #[test]
    fn test_missing_signature_is_a_mismatch() {
        let headers = axum::http::HeaderMap::new();
        assert!(!signature_matches("s3cret", &headers, b"payload"));
    }

    #[test]
    fn test_inflate_round_trip() {
        use flate2::write::GzEncoder;
        use flate2::Compression;
        use std::io::Write;

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"[{\"id\":\"hits\"}]").unwrap();
        let compressed = encoder.finish().unwrap();

        let inflated = inflate(&compressed).unwrap();
        assert_eq!(&inflated[..], b"[{\"id\":\"hits\"}]");
        assert!(inflate(b"not gzip").is_err());
    }

    #[test]
    fn test_subnet_contains() {
        let subnet: IpNetwork = "10.0.0.0/8".parse().unwrap();
        assert!(subnet.contains("10.1.2.3".parse::<IpAddr>().unwrap()));
        assert!(!subnet.contains("192.168.1.1".parse::<IpAddr>().unwrap()));
    }
}
