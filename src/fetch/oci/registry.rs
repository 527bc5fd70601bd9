/// Registry transport
///
/// Wraps a single-request `HttpTransport` with the two pieces of registry
/// protocol every request needs:
/// - redirect following, dropping `Authorization` before each hop
/// - the bearer token challenge/response cycle on 401
use parking_lot::Mutex;

use super::auth::{parse_token_response, AuthChallenge, Credentials};
use super::manifest::media_types;
use crate::fetch::http::{BlobSink, HttpResponse, HttpTransport, RequestHeaders};
use crate::fetch::pull_error::{PullError, Result};

/// Maximum number of redirect hops followed for one request
pub const MAX_REDIRECTS: usize = 10;

/// Where a `pull` is in the authentication cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AuthState {
    /// No token has been obtained for this request yet
    Unauthenticated,
    /// A fresh token was obtained; another 401 is fatal
    Retried,
}

fn is_redirect(status: u16) -> bool {
    matches!(status, 301 | 302 | 303 | 307 | 308)
}

/// Resolve a `Location` header against the URL that produced it
fn resolve_location(base: &str, location: &str) -> Result<String> {
    let base = reqwest::Url::parse(base)
        .map_err(|e| PullError::Protocol(format!("Invalid request URL '{}': {}", base, e)))?;
    base.join(location)
        .map(String::from)
        .map_err(|e| PullError::Protocol(format!("Invalid redirect location '{}': {}", location, e)))
}

fn reborrow<'s>(sink: &'s mut Option<&mut dyn BlobSink>) -> Option<&'s mut dyn BlobSink> {
    sink.as_mut().map(|sink| &mut **sink as &mut dyn BlobSink)
}

fn strip_authorization(headers: &mut RequestHeaders) {
    headers.retain(|(name, _)| !name.eq_ignore_ascii_case("authorization"));
}

/// Authenticated, redirect-following GET against a registry
pub struct RegistryTransport<T> {
    http: T,
    credentials: Credentials,
    /// Bearer token for the current pull session
    token: Mutex<Option<String>>,
}

impl<T: HttpTransport> RegistryTransport<T> {
    pub fn new(http: T, credentials: Credentials) -> Self {
        Self {
            http,
            credentials,
            token: Mutex::new(None),
        }
    }

    /// GET `url`, following 3xx redirects. `Authorization` is removed
    /// before any redirect is followed; any non-redirect status is
    /// returned to the caller uninterpreted.
    pub async fn get(&self, url: &str, headers: RequestHeaders) -> Result<HttpResponse> {
        self.follow(url, headers, None).await
    }

    /// Redirect loop shared by `get` and `pull_to`. With a sink, the body of
    /// the final 200 response is streamed into it.
    async fn follow(
        &self,
        url: &str,
        mut headers: RequestHeaders,
        mut sink: Option<&mut dyn BlobSink>,
    ) -> Result<HttpResponse> {
        let mut current = url.to_string();

        for _ in 0..=MAX_REDIRECTS {
            tracing::debug!(url = %current, "GET");
            let response = match reborrow(&mut sink) {
                Some(sink) => self.http.send_to(&current, &headers, sink).await?,
                None => self.http.send(&current, &headers).await?,
            };

            if !is_redirect(response.status) {
                return Ok(response);
            }

            let location = response.header("location").ok_or_else(|| {
                PullError::Protocol(format!(
                    "Redirect {} from {} has no Location header",
                    response.status, current
                ))
            })?;
            let next = resolve_location(&current, location)?;

            tracing::debug!(status = response.status, from = %current, to = %next, "Following redirect");
            strip_authorization(&mut headers);
            current = next;
        }

        Err(PullError::TooManyRedirects {
            url: url.to_string(),
            limit: MAX_REDIRECTS,
        })
    }

    /// Fetch `url` with the session token, re-authenticating once on 401.
    /// Only a 200 response is returned; everything else is an error.
    pub async fn pull(&self, url: &str) -> Result<HttpResponse> {
        self.authenticated(url, None).await
    }

    /// `pull`, streaming the 200 body into `sink` rather than buffering it
    pub async fn pull_to(&self, url: &str, sink: &mut dyn BlobSink) -> Result<()> {
        self.authenticated(url, Some(sink)).await.map(|_| ())
    }

    async fn authenticated(
        &self,
        url: &str,
        mut sink: Option<&mut dyn BlobSink>,
    ) -> Result<HttpResponse> {
        let mut state = AuthState::Unauthenticated;

        loop {
            let token = self.token.lock().clone();
            let response = self
                .follow(
                    url,
                    Self::request_headers(token.as_deref()),
                    reborrow(&mut sink),
                )
                .await?;

            match (response.status, state) {
                (200, _) => return Ok(response),
                (401, AuthState::Unauthenticated) => {
                    let challenge = response.header("www-authenticate").ok_or_else(|| {
                        PullError::Protocol(format!(
                            "401 from {} without a WWW-Authenticate header",
                            url
                        ))
                    })?;
                    let token_url = AuthChallenge::parse(challenge)?.token_url();
                    let token = self.fetch_token(&token_url).await?;
                    *self.token.lock() = Some(token);
                    state = AuthState::Retried;
                }
                (401, AuthState::Retried) => {
                    return Err(PullError::Unauthorized {
                        url: url.to_string(),
                    })
                }
                (status, _) => return Err(PullError::status(url, status, &response.body)),
            }
        }
    }

    /// Exchange a token URL for a bearer token
    pub async fn fetch_token(&self, token_url: &str) -> Result<String> {
        tracing::info!(url = %token_url, "Requesting registry token");

        let mut headers = RequestHeaders::new();
        if let Some(basic) = self.credentials.basic_auth_header() {
            tracing::debug!("Using basic auth for token request");
            headers.push(("Authorization".to_string(), basic));
        }

        let response = self.get(token_url, headers).await?;
        if response.status != 200 {
            return Err(PullError::Auth(format!(
                "Token request to {} failed with status {}",
                token_url, response.status
            )));
        }

        parse_token_response(&response.body)
    }

    fn request_headers(token: Option<&str>) -> RequestHeaders {
        let mut headers = vec![(
            "Accept".to_string(),
            media_types::DOCKER_MANIFEST_V2.to_string(),
        )];
        if let Some(token) = token {
            headers.push(("Authorization".to_string(), format!("Bearer {}", token)));
        }
        headers
    }
}
