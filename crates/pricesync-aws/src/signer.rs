//! AWS Signature Version 4 request signing.
//!
//! A signature is a pure function of the credentials, the request (method,
//! path, query, signed headers, body) and the signing instant. The instant
//! comes from an injected [`Clock`] so test vectors can be reproduced.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use pricesync_core::{Clock, SystemClock};
use sha2::{Digest, Sha256};

use crate::credentials::Credentials;
use crate::error::SigningError;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";

/// RFC 3986 unreserved characters are left as-is; everything else is encoded.
const URI_ENCODE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// The parts of an outgoing request that take part in the signature.
#[derive(Debug, Clone)]
pub struct SignableRequest<'a> {
    pub method: &'a str,
    /// Absolute path, not yet percent-encoded.
    pub path: &'a str,
    /// Raw (unencoded) query pairs.
    pub query: &'a [(&'a str, &'a str)],
    /// Headers to sign. Must include `host`. Names are case-insensitive.
    pub headers: &'a [(&'a str, &'a str)],
    pub body: &'a [u8],
}

/// Headers the caller must add to the request, exactly as returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedHeaders {
    pub amz_date: String,
    pub authorization: String,
}

impl SignedHeaders {
    /// `(name, value)` pairs ready to attach to an HTTP request.
    #[must_use]
    pub fn pairs(&self) -> [(&'static str, &str); 2] {
        [
            ("x-amz-date", self.amz_date.as_str()),
            ("authorization", self.authorization.as_str()),
        ]
    }
}

/// Signs requests for one region/service pair.
#[derive(Clone)]
pub struct Signer {
    credentials: Credentials,
    region: String,
    service: String,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signer")
            .field("credentials", &self.credentials)
            .field("region", &self.region)
            .field("service", &self.service)
            .finish_non_exhaustive()
    }
}

impl Signer {
    #[must_use]
    pub fn new(
        credentials: Credentials,
        region: impl Into<String>,
        service: impl Into<String>,
    ) -> Self {
        Self::with_clock(credentials, region, service, Arc::new(SystemClock))
    }

    #[must_use]
    pub fn with_clock(
        credentials: Credentials,
        region: impl Into<String>,
        service: impl Into<String>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            credentials,
            region: region.into(),
            service: service.into(),
            clock,
        }
    }

    #[must_use]
    pub fn region(&self) -> &str {
        &self.region
    }

    /// Signs `request` at the clock's current instant.
    ///
    /// # Errors
    ///
    /// Returns [`SigningError::MissingCredentials`] for empty keys and
    /// [`SigningError::MissingHost`] when no `host` header is supplied.
    pub fn sign(&self, request: &SignableRequest<'_>) -> Result<SignedHeaders, SigningError> {
        self.sign_at(request, self.clock.now())
    }

    /// Signs `request` as of `at`.
    ///
    /// # Errors
    ///
    /// See [`Signer::sign`].
    pub fn sign_at(
        &self,
        request: &SignableRequest<'_>,
        at: DateTime<Utc>,
    ) -> Result<SignedHeaders, SigningError> {
        if self.credentials.access_key().is_empty() || self.credentials.secret_key().is_empty() {
            return Err(SigningError::MissingCredentials);
        }

        let amz_date = at.format("%Y%m%dT%H%M%SZ").to_string();
        let date = at.format("%Y%m%d").to_string();
        let scope = format!("{date}/{}/{}/aws4_request", self.region, self.service);

        let canonical = canonical_request(request, &amz_date)?;
        let string_to_sign = format!(
            "{ALGORITHM}\n{amz_date}\n{scope}\n{}",
            sha256_hex(canonical.text.as_bytes())
        );

        let key = self.signing_key(&date)?;
        let signature = hex::encode(hmac_sha256(&key, string_to_sign.as_bytes())?);

        let authorization = format!(
            "{ALGORITHM} Credential={}/{scope}, SignedHeaders={}, Signature={signature}",
            self.credentials.access_key(),
            canonical.signed_headers,
        );

        Ok(SignedHeaders {
            amz_date,
            authorization,
        })
    }

    fn signing_key(&self, date: &str) -> Result<Vec<u8>, SigningError> {
        let secret = format!("AWS4{}", self.credentials.secret_key());
        let k_date = hmac_sha256(secret.as_bytes(), date.as_bytes())?;
        let k_region = hmac_sha256(&k_date, self.region.as_bytes())?;
        let k_service = hmac_sha256(&k_region, self.service.as_bytes())?;
        hmac_sha256(&k_service, b"aws4_request")
    }
}

pub(crate) struct CanonicalRequest {
    pub(crate) text: String,
    pub(crate) signed_headers: String,
}

pub(crate) fn canonical_request(
    request: &SignableRequest<'_>,
    amz_date: &str,
) -> Result<CanonicalRequest, SigningError> {
    let mut headers: Vec<(String, String)> = request
        .headers
        .iter()
        .map(|(name, value)| (name.trim().to_ascii_lowercase(), normalize_value(value)))
        .filter(|(name, _)| name != "x-amz-date" && name != "authorization")
        .collect();
    if !headers.iter().any(|(name, _)| name == "host") {
        return Err(SigningError::MissingHost);
    }
    headers.push(("x-amz-date".to_string(), amz_date.to_string()));
    headers.sort();

    let canonical_headers: String = headers
        .iter()
        .map(|(name, value)| format!("{name}:{value}\n"))
        .collect();
    let signed_headers = headers
        .iter()
        .map(|(name, _)| name.as_str())
        .collect::<Vec<_>>()
        .join(";");

    let text = format!(
        "{}\n{}\n{}\n{canonical_headers}\n{signed_headers}\n{}",
        request.method.to_ascii_uppercase(),
        canonical_uri(request.path),
        canonical_query(request.query),
        sha256_hex(request.body),
    );

    Ok(CanonicalRequest {
        text,
        signed_headers,
    })
}

fn canonical_uri(path: &str) -> String {
    if path.is_empty() {
        return "/".to_string();
    }
    path.split('/')
        .map(|segment| utf8_percent_encode(segment, URI_ENCODE).to_string())
        .collect::<Vec<_>>()
        .join("/")
}

fn canonical_query(query: &[(&str, &str)]) -> String {
    let mut pairs: Vec<(String, String)> = query
        .iter()
        .map(|(k, v)| {
            (
                utf8_percent_encode(k, URI_ENCODE).to_string(),
                utf8_percent_encode(v, URI_ENCODE).to_string(),
            )
        })
        .collect();
    pairs.sort();
    pairs
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}

/// Trims and collapses runs of whitespace to a single space.
fn normalize_value(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub(crate) fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<Vec<u8>, SigningError> {
    let mut mac = Hmac::<Sha256>::new_from_slice(key)
        .map_err(|e| SigningError::InvalidKey(e.to_string()))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

#[cfg(test)]
#[path = "signer_test.rs"]
mod tests;
