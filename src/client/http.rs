//! REST delivery client.
//!
//! Per attempt: serialize the batch to JSON, sign the serialized payload
//! with HMAC-SHA256 when a secret is configured, gzip it with a reused
//! output buffer, POST to `/updates/`, and parse the merged records from
//! the ack. Only network-level connection failures are worth retrying;
//! anything else (encoding, HTTP status, decode) is permanent for the
//! attempt.

use crate::client::DeliveryClient;
use crate::core::{MetricBatch, MetricRecord, Result, VigilError};
use flate2::write::GzEncoder;
use flate2::Compression;
use hmac::{Hmac, Mac};
use parking_lot::Mutex;
use sha2::Sha256;
use std::io::Write;
use std::net::IpAddr;
use std::time::Duration;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the hex HMAC of the uncompressed body.
pub const SIGNATURE_HEADER: &str = "HashSHA256";

/// reqwest-based delivery client.
pub struct HttpDelivery {
    http: reqwest::Client,
    base_url: String,
    secret_key: Option<String>,
    local_ip: Option<IpAddr>,
    // Reused gzip output buffer; one client is owned by one worker, the
    // lock is only there to keep send_batch on &self.
    gzip_buf: Mutex<Vec<u8>>,
}

impl HttpDelivery {
    pub fn new(server_address: impl Into<String>, secret_key: Option<String>) -> Result<Self> {
        let base_url = server_address.into().trim_end_matches('/').to_string();
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| VigilError::config(format!("building HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url,
            secret_key,
            local_ip: None,
            gzip_buf: Mutex::new(Vec::new()),
        })
    }

    /// Resolves the local outbound IP by "connecting" a UDP socket toward
    /// the collector. No traffic is sent.
    fn resolve_local_ip(&self) -> Result<IpAddr> {
        let url = reqwest::Url::parse(&self.base_url)
            .map_err(|e| VigilError::config(format!("invalid server address: {e}")))?;
        let host = url
            .host_str()
            .ok_or_else(|| VigilError::config("server address has no host"))?;
        let port = url.port_or_known_default().unwrap_or(80);

        let socket = std::net::UdpSocket::bind("0.0.0.0:0")?;
        socket.connect((host, port))?;
        Ok(socket.local_addr()?.ip())
    }

    fn sign(&self, payload: &[u8]) -> Option<String> {
        let key = self.secret_key.as_ref()?;
        let mut mac =
            HmacSha256::new_from_slice(key.as_bytes()).expect("HMAC accepts any key length");
        mac.update(payload);
        Some(hex::encode(mac.finalize().into_bytes()))
    }

    fn compress(&self, payload: &[u8]) -> Result<Vec<u8>> {
        let mut buf = self.gzip_buf.lock();
        buf.clear();
        let mut encoder = GzEncoder::new(&mut *buf, Compression::default());
        encoder.write_all(payload)?;
        encoder.finish()?;
        Ok(buf.clone())
    }

    fn map_send_error(e: reqwest::Error) -> VigilError {
        if e.is_connect() {
            VigilError::network(e.to_string())
        } else {
            VigilError::Transport(e.to_string())
        }
    }
}

#[async_trait::async_trait]
impl DeliveryClient for HttpDelivery {
    async fn init(&mut self) -> Result<()> {
        let ip = self.resolve_local_ip()?;
        tracing::debug!(local_ip = %ip, server = %self.base_url, "REST delivery client ready");
        self.local_ip = Some(ip);
        Ok(())
    }

    async fn send_batch(&self, batch: &[MetricRecord]) -> Result<MetricBatch> {
        let payload = serde_json::to_vec(batch)?;
        let signature = self.sign(&payload);
        let body = self.compress(&payload)?;

        let mut request = self
            .http
            .post(format!("{}/updates/", self.base_url))
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(reqwest::header::CONTENT_ENCODING, "gzip")
            .header(reqwest::header::ACCEPT_ENCODING, "gzip");
        if let Some(signature) = signature {
            request = request.header(SIGNATURE_HEADER, signature);
        }
        if let Some(ip) = self.local_ip {
            request = request.header("X-Real-IP", ip.to_string());
        }

        let response = request.body(body).send().await.map_err(Self::map_send_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(VigilError::HttpStatus {
                status: status.as_u16(),
            });
        }

        let ack = response
            .bytes()
            .await
            .map_err(|e| VigilError::Transport(e.to_string()))?;
        Ok(serde_json::from_slice(&ack)?)
    }

    fn is_transient(&self, error: &VigilError) -> bool {
        matches!(error, VigilError::Network(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_is_keyed() {
        let signed = HttpDelivery::new("http://localhost:8080", Some("s3cret".into())).unwrap();
        let unsigned = HttpDelivery::new("http://localhost:8080", None).unwrap();

        let sig = signed.sign(b"payload").unwrap();
        assert_eq!(sig.len(), 64);
        assert_ne!(sig, signed.sign(b"other payload").unwrap());
        assert!(unsigned.sign(b"payload").is_none());
    }

    #[test]
    fn test_compress_round_trip() {
        use flate2::read::GzDecoder;
        use std::io::Read;

        let client = HttpDelivery::new("http://localhost:8080", None).unwrap();
        let compressed = client.compress(b"[{\"id\":\"x\"}]").unwrap();

        let mut decoder = GzDecoder::new(compressed.as_slice());
        let mut out = Vec::new();
        decoder.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"[{\"id\":\"x\"}]");
    }

    #[test]
    fn test_transient_predicate_is_connect_only() {
        let client = HttpDelivery::new("http://localhost:8080", None).unwrap();
        assert!(client.is_transient(&VigilError::network("connection refused")));
        assert!(!client.is_transient(&VigilError::HttpStatus { status: 503 }));
        assert!(!client.is_transient(&VigilError::Transport("body error".into())));
        // GRPC codes belong to the other variant's predicate.
        assert!(!client.is_transient(&VigilError::Grpc(tonic::Status::unavailable("x"))));
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let client = HttpDelivery::new("http://localhost:8080/", None).unwrap();
        assert_eq!(client.base_url, "http://localhost:8080");
    }
}
