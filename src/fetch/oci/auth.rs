/// Registry token authentication
///
/// Implements the Docker registry bearer token flow:
/// 1. Request the resource
/// 2. On 401, parse the WWW-Authenticate challenge
/// 3. Exchange the challenge for a token at the realm
/// 4. Retry with `Authorization: Bearer <token>`
use std::collections::HashMap;

use base64::Engine;
use serde::Deserialize;

use crate::fetch::pull_error::{PullError, Result};

const BEARER_PREFIX: &str = "Bearer ";

/// Credentials presented to the token endpoint
#[derive(Debug, Clone)]
pub enum Credentials {
    Anonymous,
    Basic { username: String, password: String },
}

impl Credentials {
    pub fn new(username: Option<String>, password: Option<String>) -> Self {
        match (username, password) {
            (Some(u), Some(p)) => Credentials::Basic {
                username: u,
                password: p,
            },
            _ => Credentials::Anonymous,
        }
    }

    /// Encode as basic auth header value
    pub fn basic_auth_header(&self) -> Option<String> {
        match self {
            Credentials::Anonymous => None,
            Credentials::Basic { username, password } => {
                let encoded = base64::engine::general_purpose::STANDARD
                    .encode(format!("{}:{}", username, password));
                Some(format!("Basic {}", encoded))
            }
        }
    }
}

/// Parsed `WWW-Authenticate: Bearer realm="...",service="...",scope="..."`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthChallenge {
    pub realm: String,
    pub service: String,
    pub scope: String,
}

impl AuthChallenge {
    /// Parse a bearer challenge, requiring realm, service and scope
    pub fn parse(header: &str) -> Result<Self> {
        let params_str = header
            .strip_prefix(BEARER_PREFIX)
            .filter(|rest| rest.trim_start().starts_with("realm=\""))
            .ok_or_else(|| {
                PullError::Protocol(format!(
                    "WWW-Authenticate header is not a bearer challenge starting with 'Bearer realm=\"': {}",
                    header
                ))
            })?;

        let mut params = parse_auth_params(params_str);
        let mut required = |name: &str| {
            params.remove(name).ok_or_else(|| {
                PullError::Protocol(format!(
                    "WWW-Authenticate challenge is missing '{}': {}",
                    name, header
                ))
            })
        };

        Ok(Self {
            realm: required("realm")?,
            service: required("service")?,
            scope: required("scope")?,
        })
    }

    /// Token request URL: the realm with service and scope as query parameters
    pub fn token_url(&self) -> String {
        let separator = if self.realm.contains('?') { '&' } else { '?' };
        format!(
            "{}{}service={}&scope={}",
            self.realm, separator, self.service, self.scope
        )
    }
}

/// Turn a `WWW-Authenticate` value into the URL that issues a token
pub fn challenge_to_token_url(header: &str) -> Result<String> {
    AuthChallenge::parse(header).map(|challenge| challenge.token_url())
}

/// Parse key="value" pairs from auth header
fn parse_auth_params(s: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();

    let mut key = String::new();
    let mut value = String::new();
    let mut in_value = false;
    let mut in_quotes = false;

    for c in s.chars() {
        match c {
            '=' if !in_value => {
                in_value = true;
            }
            '"' if in_value => {
                if in_quotes {
                    params.insert(key.trim().to_string(), value.clone());
                    key.clear();
                    value.clear();
                    in_value = false;
                    in_quotes = false;
                } else {
                    in_quotes = true;
                }
            }
            ',' if !in_quotes => {
                // Separator after an unquoted value
                if in_value && !value.is_empty() {
                    params.insert(key.trim().to_string(), value.clone());
                    key.clear();
                    value.clear();
                    in_value = false;
                }
            }
            ' ' if !in_quotes && !in_value => {}
            _ if in_value => {
                value.push(c);
            }
            _ => {
                key.push(c);
            }
        }
    }

    if in_value && !value.is_empty() {
        params.insert(key.trim().to_string(), value);
    }

    params
}

/// Token response from auth service
#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: Option<String>,
    access_token: Option<String>,
}

/// Extract the bearer token from a token endpoint body.
/// Some services answer with `access_token` instead of `token`.
pub fn parse_token_response(body: &[u8]) -> Result<String> {
    let response: TokenResponse = serde_json::from_slice(body)
        .map_err(|e| PullError::Auth(format!("Failed to parse token response: {}", e)))?;

    response
        .token
        .or(response.access_token)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| PullError::Auth("No token in token endpoint response".to_string()))
}
