use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use reqwest::redirect::Policy;
use reqwest::Client;

use crate::fetch::options::HttpClientOptions;
use crate::fetch::pull_error::{PullError, Result};

const USER_AGENT: &str = concat!("regpull/", env!("CARGO_PKG_VERSION"));

/// Request headers as (name, value) pairs, built fresh for every request
pub type RequestHeaders = Vec<(String, String)>;

/// Status, lower-cased headers and full body of one HTTP exchange
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: Bytes,
}

impl HttpResponse {
    /// Look up a header by case-insensitive name
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

/// Destination for a response body delivered in chunks
pub trait BlobSink: Send {
    fn write_chunk(&mut self, chunk: &[u8]) -> Result<()>;
}

/// A single GET round trip. Implementations must not follow redirects.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, url: &str, headers: &[(String, String)]) -> Result<HttpResponse>;

    /// Like `send`, but a 200 body goes to `sink` instead of being returned.
    /// Bodies of other statuses are buffered as usual.
    async fn send_to(
        &self,
        url: &str,
        headers: &[(String, String)],
        sink: &mut dyn BlobSink,
    ) -> Result<HttpResponse> {
        let mut response = self.send(url, headers).await?;
        if response.status == 200 {
            sink.write_chunk(&response.body)?;
            response.body = Bytes::new();
        }
        Ok(response)
    }
}

/// `HttpTransport` backed by a reqwest client with redirects disabled
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(options: &HttpClientOptions) -> Result<Self> {
        Ok(Self {
            client: setup_http_client(options)?,
        })
    }
}

impl ReqwestTransport {
    async fn start(&self, url: &str, headers: &[(String, String)]) -> Result<reqwest::Response> {
        let mut request = self.client.get(url).header("User-Agent", USER_AGENT);
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }

        request.send().await.map_err(PullError::from_reqwest)
    }
}

/// Lower-cased response headers; the first occurrence of a repeated header
/// such as WWW-Authenticate wins
fn collect_headers(response: &reqwest::Response) -> BTreeMap<String, String> {
    let mut headers = BTreeMap::new();
    for (name, value) in response.headers() {
        match value.to_str() {
            Ok(text) => {
                headers
                    .entry(name.as_str().to_ascii_lowercase())
                    .or_insert_with(|| text.to_string());
            }
            Err(_) => tracing::trace!(header = %name, "Skipping non-ASCII header value"),
        }
    }
    headers
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, url: &str, headers: &[(String, String)]) -> Result<HttpResponse> {
        let response = self.start(url, headers).await?;
        let status = response.status().as_u16();
        let response_headers = collect_headers(&response);

        let body = response.bytes().await.map_err(PullError::from_reqwest)?;

        tracing::trace!(url, status, bytes = body.len(), "HTTP response");

        Ok(HttpResponse {
            status,
            headers: response_headers,
            body,
        })
    }

    async fn send_to(
        &self,
        url: &str,
        headers: &[(String, String)],
        sink: &mut dyn BlobSink,
    ) -> Result<HttpResponse> {
        let response = self.start(url, headers).await?;
        let status = response.status().as_u16();
        let response_headers = collect_headers(&response);

        if status != 200 {
            let body = response.bytes().await.map_err(PullError::from_reqwest)?;
            return Ok(HttpResponse {
                status,
                headers: response_headers,
                body,
            });
        }

        let mut received: u64 = 0;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(PullError::from_reqwest)?;
            received += chunk.len() as u64;
            sink.write_chunk(&chunk)?;
        }

        tracing::trace!(url, status, bytes = received, "HTTP response streamed");

        Ok(HttpResponse {
            status,
            headers: response_headers,
            body: Bytes::new(),
        })
    }
}

pub(crate) fn setup_http_client(options: &HttpClientOptions) -> Result<Client> {
    tracing::debug!(
        timeout_secs = options.timeout_secs,
        insecure_tls = options.insecure_tls,
        cacert = ?options.cacert,
        "Initializing HTTP client"
    );

    let mut builder = Client::builder()
        .use_rustls_tls()
        // Redirects are followed by the registry transport so it can drop
        // the Authorization header before talking to blob storage.
        .redirect(Policy::none())
        .pool_max_idle_per_host(10)
        .pool_idle_timeout(Some(Duration::from_secs(90)))
        .tcp_keepalive(Some(Duration::from_secs(10)))
        .tcp_nodelay(true)
        .timeout(Duration::from_secs(options.timeout_secs))
        .connect_timeout(Duration::from_secs(30));

    if let Some(ca_cert_path) = &options.cacert {
        tracing::info!(path = %ca_cert_path.display(), "Loading CA certificate");
        let cert_bytes =
            std::fs::read(ca_cert_path).map_err(|e| PullError::fs(ca_cert_path, e))?;
        let cert = reqwest::Certificate::from_pem(&cert_bytes).map_err(PullError::from_reqwest)?;
        builder = builder.add_root_certificate(cert);
    }

    if options.insecure_tls {
        tracing::warn!("Certificate verification is disabled");
        builder = builder.danger_accept_invalid_certs(true);
    }

    builder.build().map_err(PullError::from_reqwest)
}
