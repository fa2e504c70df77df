//! Structural handling of the JWS compact serialization.
//!
//! Nothing here checks a signature. Both the untrusted pre-parse and the validator split and decode
//! through these helpers, the validator only after it has verified the signature over the very
//! same segments.
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use serde_json::{Map, Value};

/// Base64url as used by JWS, trailing padding tolerated.
const BASE64URL: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// The three segments of a compact serialization.
pub(crate) struct Compact<'a> {
    raw: &'a str,
    header: &'a str,
    payload: &'a str,
    signature: &'a str,
}

/// The JOSE header fields this grant consumes.
#[derive(Clone, Debug)]
pub(crate) struct Header {
    pub alg: Option<Value>,
    pub kid: Option<Value>,
}

/// A segment or the assembled serialization is malformed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Malformed;

impl<'a> Compact<'a> {
    /// Split into exactly three non-empty base64url segments.
    ///
    /// The signature segment may not be empty either, unsecured JWS are never accepted.
    pub fn split(raw: &'a str) -> Result<Self, Malformed> {
        let mut segments = raw.split('.');
        let (header, payload, signature) = match (
            segments.next(),
            segments.next(),
            segments.next(),
            segments.next(),
        ) {
            (Some(header), Some(payload), Some(signature), None) => (header, payload, signature),
            _ => return Err(Malformed),
        };

        let well_formed = |segment: &str| {
            !segment.is_empty()
                && segment
                    .bytes()
                    .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_' || b == b'=')
        };

        if !(well_formed(header) && well_formed(payload) && well_formed(signature)) {
            return Err(Malformed);
        }

        Ok(Compact {
            raw,
            header,
            payload,
            signature,
        })
    }

    /// The bytes covered by the signature, header and payload segment joined by their dot.
    pub fn signing_input(&self) -> &'a [u8] {
        let len = self.header.len() + 1 + self.payload.len();
        &self.raw.as_bytes()[..len]
    }

    /// The header must be a JSON object, any other JSON value is malformed.
    pub fn header(&self) -> Result<Header, Malformed> {
        let bytes = decode(self.header)?;
        let fields: Map<String, Value> = serde_json::from_slice(&bytes).map_err(|_| Malformed)?;
        Ok(Header {
            alg: fields.get("alg").cloned(),
            kid: fields.get("kid").cloned(),
        })
    }

    pub fn claims(&self) -> Result<Map<String, Value>, Malformed> {
        let bytes = decode(self.payload)?;
        serde_json::from_slice(&bytes).map_err(|_| Malformed)
    }

    pub fn signature(&self) -> Result<Vec<u8>, Malformed> {
        decode(self.signature)
    }
}

fn decode(segment: &str) -> Result<Vec<u8>, Malformed> {
    BASE64URL.decode(segment).map_err(|_| Malformed)
}

/// Encode a segment, used to assemble assertions in tests.
#[cfg(test)]
pub(crate) fn encode(bytes: &[u8]) -> String {
    BASE64URL.encode(bytes)
}
