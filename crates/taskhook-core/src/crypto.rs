//! Cryptographic primitives for webhook signature verification.
//!
//! Provides HMAC-SHA256 generation and verification over raw body bytes, the
//! `"<algorithm>=<hex>"` header format parser, and constant-time comparison
//! shared by both verification schemes.

use std::fmt;

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Algorithm assumed when a signature header carries no `<algorithm>=` prefix.
pub const DEFAULT_ALGORITHM: &str = "sha256";

/// Signature verification errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureError {
    /// Signature header present but empty.
    MissingSignature,
    /// Header names an algorithm outside the SHA-256 family.
    UnsupportedAlgorithm(String),
    /// Signature did not match the expected value.
    VerificationFailed,
    /// Secret key could not be used.
    InvalidSecret,
}

impl fmt::Display for SignatureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingSignature => write!(f, "signature header is empty"),
            Self::UnsupportedAlgorithm(algorithm) => {
                write!(f, "unsupported algorithm: {algorithm}")
            },
            Self::VerificationFailed => write!(f, "signature mismatch"),
            Self::InvalidSecret => write!(f, "invalid secret key"),
        }
    }
}

impl std::error::Error for SignatureError {}

/// A signature header split into its algorithm and digest parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedSignature<'a> {
    /// Algorithm name as sent, e.g. `sha256`.
    pub algorithm: &'a str,
    /// Hex-encoded digest.
    pub digest: &'a str,
}

/// Splits `"<algorithm>=<hex>"` into its parts.
///
/// A value without `=` is treated as a bare digest using
/// [`DEFAULT_ALGORITHM`].
pub fn parse_signature_header(value: &str) -> ParsedSignature<'_> {
    let value = value.trim();
    match value.split_once('=') {
        Some((algorithm, digest)) => {
            ParsedSignature { algorithm: algorithm.trim(), digest: digest.trim() }
        },
        None => ParsedSignature { algorithm: DEFAULT_ALGORITHM, digest: value },
    }
}

/// Returns whether `algorithm` names HMAC-SHA256.
///
/// Accepts `sha256`, `sha-256`, `hmac-sha256`, `HMAC_SHA256` and similar
/// spellings.
pub fn is_sha256_family(algorithm: &str) -> bool {
    let normalized: String = algorithm
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect();
    let normalized = normalized.strip_prefix("hmac").unwrap_or(&normalized);
    normalized == "sha256"
}

/// Generates the HMAC-SHA256 of `payload` as a lowercase hex string.
///
/// # Errors
///
/// Returns `SignatureError::InvalidSecret` if the key is rejected.
pub fn generate_hmac_hex(payload: &[u8], secret: &str) -> Result<String, SignatureError> {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| SignatureError::InvalidSecret)?;

    mac.update(payload);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Verifies an HMAC signature header against the exact `payload` bytes.
///
/// # Errors
///
/// - `MissingSignature` if the header value is blank
/// - `UnsupportedAlgorithm` for anything but the SHA-256 family
/// - `VerificationFailed` if the digest does not match
pub fn verify_hmac(payload: &[u8], header_value: &str, secret: &str) -> Result<(), SignatureError> {
    let parsed = parse_signature_header(header_value);
    if parsed.digest.is_empty() {
        return Err(SignatureError::MissingSignature);
    }

    if !is_sha256_family(parsed.algorithm) {
        return Err(SignatureError::UnsupportedAlgorithm(parsed.algorithm.to_string()));
    }

    let expected = generate_hmac_hex(payload, secret)?;
    let candidate = parsed.digest.to_ascii_lowercase();

    if constant_time_eq(candidate.as_bytes(), expected.as_bytes()) {
        Ok(())
    } else {
        Err(SignatureError::VerificationFailed)
    }
}

/// Verifies a static token header against the webhook secret.
///
/// # Errors
///
/// Returns `VerificationFailed` unless `token` equals `secret` exactly.
pub fn verify_token(token: &str, secret: &str) -> Result<(), SignatureError> {
    if constant_time_eq(token.as_bytes(), secret.as_bytes()) {
        Ok(())
    } else {
        Err(SignatureError::VerificationFailed)
    }
}

/// Constant-time byte comparison.
///
/// Lengths are compared first; the length of a secret is not treated as
/// confidential.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && bool::from(a.ct_eq(b))
}
