//! Getting image bytes into memory, from an inline upload or a URL.

use anyhow::{bail, ensure, Context};
use base64::{engine::general_purpose, Engine as _};
use std::net::IpAddr;
use std::time::Duration;

use crate::config::Settings;

pub const INLINE_IMAGE_REF: &str = "inline";

#[async_trait::async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> anyhow::Result<Vec<u8>>;
}

/// Accepts plain base64 or a `data:image/...;base64,` URL.
pub fn decode_base64(input: &str, max_bytes: usize) -> anyhow::Result<Vec<u8>> {
    let payload = match input.trim().strip_prefix("data:") {
        Some(rest) => rest
            .split_once(',')
            .map(|(_, data)| data)
            .context("data URL has no payload")?,
        None => input,
    };

    let compact: String = payload.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    ensure!(!compact.is_empty(), "image payload is empty");
    // Cheap pre-check: decoded size is roughly 3/4 of the encoded length.
    ensure!(
        compact.len() / 4 * 3 <= max_bytes + 3,
        "image exceeds {max_bytes} bytes"
    );

    let bytes = general_purpose::STANDARD
        .decode(compact.as_bytes())
        .context("image is not valid base64")?;
    ensure!(bytes.len() <= max_bytes, "image exceeds {max_bytes} bytes");
    Ok(bytes)
}

/// Downloads caller-supplied image URLs. Hosts resolving to loopback, private, link-local or
/// otherwise internal addresses are refused, and redirects are not followed.
#[derive(Debug, Clone)]
pub struct HttpImageFetcher {
    http: reqwest::Client,
    max_bytes: usize,
    allow_internal_hosts: bool,
}

impl HttpImageFetcher {
    pub fn new(timeout: Duration, max_bytes: usize) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .context("failed to build reqwest client")?;
        Ok(Self {
            http,
            max_bytes,
            allow_internal_hosts: false,
        })
    }

    /// Lifts the internal-address check, for fetching from a local mock server.
    pub fn allow_internal_hosts(mut self) -> Self {
        self.allow_internal_hosts = true;
        self
    }

    async fn ensure_public_host(&self, url: &reqwest::Url) -> anyhow::Result<()> {
        if self.allow_internal_hosts {
            return Ok(());
        }
        let host = url
            .host_str()
            .context("image URL has no host")?
            .trim_start_matches('[')
            .trim_end_matches(']');
        let port = url.port_or_known_default().unwrap_or(80);

        let addrs: Vec<_> = tokio::net::lookup_host((host, port))
            .await
            .with_context(|| format!("could not resolve image host {host}"))?
            .collect();
        ensure!(!addrs.is_empty(), "image host {host} has no addresses");
        for addr in addrs {
            ensure!(
                is_public_address(addr.ip()),
                "image host {host} resolves to internal address {}",
                addr.ip()
            );
        }
        Ok(())
    }

    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        Self::new(
            Duration::from_secs(settings.image_fetch_timeout_secs),
            settings.max_image_bytes,
        )
    }
}

#[async_trait::async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch(&self, url: &str) -> anyhow::Result<Vec<u8>> {
        let parsed = reqwest::Url::parse(url).with_context(|| format!("invalid image URL: {url}"))?;
        ensure!(
            matches!(parsed.scheme(), "http" | "https"),
            "unsupported image URL scheme: {}",
            parsed.scheme()
        );
        self.ensure_public_host(&parsed).await?;

        let mut res = self
            .http
            .get(parsed)
            .send()
            .await
            .context("image download failed")?;

        let status = res.status();
        if !status.is_success() {
            bail!("image download failed with status {status}");
        }
        if let Some(len) = res.content_length() {
            ensure!(
                len <= self.max_bytes as u64,
                "image exceeds {} bytes",
                self.max_bytes
            );
        }

        let mut bytes = Vec::new();
        while let Some(chunk) = res.chunk().await.context("image download interrupted")? {
            bytes.extend_from_slice(&chunk);
            ensure!(
                bytes.len() <= self.max_bytes,
                "image exceeds {} bytes",
                self.max_bytes
            );
        }
        ensure!(!bytes.is_empty(), "image download returned no data");

        tracing::debug!(bytes = bytes.len(), "image downloaded");
        Ok(bytes)
    }
}

fn is_public_address(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            let [a, b, ..] = v4.octets();
            !(v4.is_private()
                || v4.is_loopback()
                || v4.is_link_local()
                || v4.is_unspecified()
                || v4.is_broadcast()
                || v4.is_documentation()
                // 100.64.0.0/10 carrier-grade NAT
                || (a == 100 && (b & 0xc0) == 64)
                || a == 0)
        }
        IpAddr::V6(v6) => {
            if let Some(v4) = v6.to_ipv4_mapped() {
                return is_public_address(IpAddr::V4(v4));
            }
            let first = v6.segments()[0];
            !(v6.is_loopback()
                || v6.is_unspecified()
                // fc00::/7 unique local, fe80::/10 link-local
                || (first & 0xfe00) == 0xfc00
                || (first & 0xffc0) == 0xfe80)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn decodes_plain_and_data_url_base64() {
        let encoded = general_purpose::STANDARD.encode(b"coffee grounds");
        assert_eq!(decode_base64(&encoded, 1024).unwrap(), b"coffee grounds");

        let data_url = format!("data:image/jpeg;base64,{encoded}");
        assert_eq!(decode_base64(&data_url, 1024).unwrap(), b"coffee grounds");

        let wrapped = format!("{}\n{}", &encoded[..8], &encoded[8..]);
        assert_eq!(decode_base64(&wrapped, 1024).unwrap(), b"coffee grounds");
    }

    #[test]
    fn rejects_invalid_or_oversized_payloads() {
        assert!(decode_base64("not base64 !!", 1024).is_err());
        assert!(decode_base64("data:image/png;base64", 1024).is_err());
        assert!(decode_base64("", 1024).is_err());

        let big = general_purpose::STANDARD.encode(vec![7u8; 2048]);
        assert!(decode_base64(&big, 1024).is_err());
    }

    #[tokio::test]
    async fn fetches_image_bytes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/cup.png"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1u8, 2, 3]))
            .mount(&server)
            .await;

        let fetcher = HttpImageFetcher::new(Duration::from_secs(5), 1024)
            .unwrap()
            .allow_internal_hosts();
        let bytes = fetcher
            .fetch(&format!("{}/cup.png", server.uri()))
            .await
            .unwrap();
        assert_eq!(bytes, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn fetch_fails_on_error_status_and_oversized_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing.png"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/huge.png"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 4096]))
            .mount(&server)
            .await;

        let fetcher = HttpImageFetcher::new(Duration::from_secs(5), 1024)
            .unwrap()
            .allow_internal_hosts();
        assert!(fetcher
            .fetch(&format!("{}/missing.png", server.uri()))
            .await
            .is_err());
        assert!(fetcher
            .fetch(&format!("{}/huge.png", server.uri()))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn fetch_rejects_non_http_urls() {
        let fetcher = HttpImageFetcher::new(Duration::from_secs(5), 1024).unwrap();
        assert!(fetcher.fetch("file:///etc/passwd").await.is_err());
        assert!(fetcher.fetch("not a url").await.is_err());
    }

    #[tokio::test]
    async fn internal_hosts_are_refused_by_default() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1u8, 2, 3]))
            .expect(0)
            .mount(&server)
            .await;

        let fetcher = HttpImageFetcher::new(Duration::from_secs(5), 1024).unwrap();
        let err = fetcher
            .fetch(&format!("{}/cup.png", server.uri()))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("internal address"));

        for url in [
            "http://169.254.169.254/latest/meta-data/",
            "http://10.0.0.7/cup.png",
            "http://[::1]:8080/cup.png",
        ] {
            assert!(fetcher.fetch(url).await.is_err(), "{url} was fetched");
        }
    }

    #[tokio::test]
    async fn redirects_are_not_followed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/moved.png"))
            .respond_with(
                ResponseTemplate::new(302).insert_header("location", "http://127.0.0.1:9/secret"),
            )
            .mount(&server)
            .await;

        let fetcher = HttpImageFetcher::new(Duration::from_secs(5), 1024)
            .unwrap()
            .allow_internal_hosts();
        assert!(fetcher
            .fetch(&format!("{}/moved.png", server.uri()))
            .await
            .is_err());
    }

    #[test]
    fn classifies_addresses() {
        for internal in [
            "127.0.0.1",
            "10.1.2.3",
            "172.16.0.1",
            "192.168.1.1",
            "169.254.169.254",
            "100.64.0.1",
            "0.0.0.0",
            "::1",
            "fd00::1",
            "fe80::1",
            "::ffff:127.0.0.1",
        ] {
            assert!(!is_public_address(internal.parse().unwrap()), "{internal}");
        }
        for public in ["8.8.8.8", "151.101.1.69", "2606:4700::1111"] {
            assert!(is_public_address(public.parse().unwrap()), "{public}");
        }
    }
}
