//! HMAC body signing for outbound relay requests.
//!
//! Report and signing-request bodies can be authenticated with a shared
//! secret. The header wire format is:
//!
//! ```text
//! Xrelay-Signature: {unix_timestamp}.{base64_signature}
//! ```
//!
//! where the signature is `HMAC-SHA256("{timestamp}.{json_body}", secret)`.
//! Receivers use [`SignedBody::from_header_and_body`] followed by
//! [`SignedBody::verify`].

/// Header name for the HMAC signature.
pub const SIGNATURE_HEADER: &str = "Xrelay-Signature";

/// Maximum allowed age of a signature (in seconds).
pub const MAX_SIGNATURE_AGE: i64 = 5 * 60;

/// Errors produced by signature operations.
#[derive(Debug, thiserror::Error)]
pub enum SignatureError {
    #[error("invalid header format")]
    InvalidFormat,
    #[error("invalid base64 encoding")]
    InvalidBase64,
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid signature")]
    SignatureMismatch,
    #[error("signature expired")]
    Expired,
}

impl From<ring::error::Unspecified> for SignatureError {
    fn from(_: ring::error::Unspecified) -> Self {
        Self::SignatureMismatch
    }
}

/// A JSON body together with its timestamp and HMAC-SHA256 signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedBody {
    pub timestamp: i64,
    pub json: String,
    pub signature: Box<[u8]>,
}

impl SignedBody {
    /// Serialize `body` and sign it with `key` at the current time.
    pub fn new<T: serde::Serialize>(body: &T, key: &[u8]) -> Result<Self, serde_json::Error> {
        let json = serde_json::to_string(body)?;
        let now = time::OffsetDateTime::now_utc().unix_timestamp();
        Ok(Self::sign_at(json, now, key))
    }

    /// Sign an already-serialized body at an explicit timestamp.
    pub fn sign_at(json: String, timestamp: i64, key: &[u8]) -> Self {
        let data = format!("{timestamp}.{json}");
        let signature = ring::hmac::sign(
            &ring::hmac::Key::new(ring::hmac::HMAC_SHA256, key),
            data.as_bytes(),
        );
        Self {
            timestamp,
            json,
            signature: signature.as_ref().to_owned().into_boxed_slice(),
        }
    }

    /// Reconstruct from a raw header value and the request body. Does **not**
    /// verify anything; call [`verify`](Self::verify) for that.
    pub fn from_header_and_body(header_value: &str, json: String) -> Result<Self, SignatureError> {
        let (timestamp, signature) = parse_signature_header(header_value)?;
        Ok(Self {
            timestamp,
            json,
            signature,
        })
    }

    /// Verify the HMAC and timestamp freshness, then deserialize the body.
    pub fn verify<T>(self, key: &[u8]) -> Result<T, SignatureError>
    where
        T: for<'de> serde::Deserialize<'de>,
    {
        let data = format!("{}.{}", self.timestamp, self.json);
        ring::hmac::verify(
            &ring::hmac::Key::new(ring::hmac::HMAC_SHA256, key),
            data.as_bytes(),
            self.signature.as_ref(),
        )?;
        check_timestamp(self.timestamp)?;
        Ok(serde_json::from_str(&self.json)?)
    }

    /// Format the full header value (`{timestamp}.{b64}`).
    pub fn to_header(&self) -> String {
        format_signature_header(self.timestamp, &self.signature)
    }
}

/// Parse a `{timestamp}.{base64}` header value into its parts.
pub fn parse_signature_header(value: &str) -> Result<(i64, Box<[u8]>), SignatureError> {
    let (timestamp, signature) = value.split_once('.').ok_or(SignatureError::InvalidFormat)?;
    let timestamp: i64 = timestamp
        .parse()
        .map_err(|_| SignatureError::InvalidFormat)?;
    let signature_bytes = fast32::base64::RFC4648_NOPAD
        .decode_str(signature)
        .map_err(|_| SignatureError::InvalidBase64)?
        .into_boxed_slice();
    Ok((timestamp, signature_bytes))
}

/// Format a `{timestamp}.{base64}` header value from its parts.
pub fn format_signature_header(timestamp: i64, signature: &[u8]) -> String {
    format!(
        "{}.{}",
        timestamp,
        fast32::base64::RFC4648_NOPAD.encode(signature)
    )
}

/// Check that a signature timestamp is within [`MAX_SIGNATURE_AGE`].
pub fn check_timestamp(timestamp: i64) -> Result<(), SignatureError> {
    let now = time::OffsetDateTime::now_utc().unix_timestamp();
    if now - timestamp > MAX_SIGNATURE_AGE {
        return Err(SignatureError::Expired);
    }
    Ok(())
}
