//! IPN webhook payload canonicalization and signature verification.
//!
//! The gateway signs `json.dumps(payload, sort_keys=True, separators=(',', ':'))`
//! with HMAC-SHA512 and sends the lowercase hex digest in the
//! `x-nowpayments-sig` header. Verification re-serializes the received payload
//! into that exact form, nested objects included, so values keep their
//! original typing: numbers are carried as the literal text received and never
//! round-trip through `f64`.

use std::collections::BTreeMap;
use std::fmt;

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde_json::value::RawValue;
use sha2::Sha512;
use thiserror::Error;

type HmacSha512 = Hmac<Sha512>;

/// Header carrying the payload signature.
pub const SIGNATURE_HEADER: &str = "x-nowpayments-sig";

/// Errors from parsing a webhook body.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PayloadError {
    /// Body is not a JSON object.
    #[error("malformed JSON: {0}")]
    Json(String),

    /// A required field is absent.
    #[error("missing field {0}")]
    MissingField(&'static str),

    /// A field has an unusable value.
    #[error("invalid field {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

/// Errors from signature verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SignatureError {
    /// No signature was supplied.
    #[error("missing signature")]
    Missing,

    /// Signature does not match the payload.
    #[error("signature mismatch")]
    Mismatch,

    /// Shared secret cannot key the MAC.
    #[error("invalid signing key")]
    InvalidKey,
}

/// A webhook field value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadValue {
    Null,
    Bool(bool),
    /// Number as its exact JSON text.
    Number(String),
    String(String),
    Array(Vec<PayloadValue>),
    /// Nested object, keys in sorted order.
    Object(BTreeMap<String, PayloadValue>),
}

type RawObject = BTreeMap<String, Box<RawValue>>;

fn parse_json<T: serde::de::DeserializeOwned>(text: &str) -> Result<T, PayloadError> {
    serde_json::from_str(text).map_err(|e| PayloadError::Json(e.to_string()))
}

fn object_from_raw(raw: &RawObject) -> Result<BTreeMap<String, PayloadValue>, PayloadError> {
    raw.iter()
        .map(|(key, value)| Ok((key.clone(), PayloadValue::from_raw(value)?)))
        .collect()
}

impl PayloadValue {
    fn from_raw(raw: &RawValue) -> Result<Self, PayloadError> {
        let text = raw.get();
        match text.as_bytes().first() {
            Some(b'"') => parse_json(text).map(Self::String),
            Some(b't' | b'f') => parse_json(text).map(Self::Bool),
            Some(b'n') => Ok(Self::Null),
            Some(b'-' | b'0'..=b'9') => Ok(Self::Number(text.to_owned())),
            Some(b'[') => parse_json::<Vec<Box<RawValue>>>(text)?
                .iter()
                .map(|item| Self::from_raw(item))
                .collect::<Result<_, _>>()
                .map(Self::Array),
            Some(b'{') => object_from_raw(&parse_json::<RawObject>(text)?).map(Self::Object),
            _ => Err(PayloadError::Json(format!("unexpected value {text}"))),
        }
    }

    fn write_canonical(&self, out: &mut String) {
        match self {
            Self::Null => out.push_str("null"),
            Self::Bool(true) => out.push_str("true"),
            Self::Bool(false) => out.push_str("false"),
            Self::Number(text) => out.push_str(text),
            Self::String(s) => write_escaped(out, s),
            Self::Array(items) => {
                out.push('[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    item.write_canonical(out);
                }
                out.push(']');
            }
            Self::Object(fields) => write_object(out, fields),
        }
    }
}

fn write_object(out: &mut String, fields: &BTreeMap<String, PayloadValue>) {
    out.push('{');
    for (i, (key, value)) in fields.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        write_escaped(out, key);
        out.push(':');
        value.write_canonical(out);
    }
    out.push('}');
}

/// A webhook payload, keys in sorted order.
///
/// Only `order_id`, `payment_status` and `payment_id` are interpreted; every
/// other field, nested or not, is carried so the signature can be checked.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WebhookPayload {
    fields: BTreeMap<String, PayloadValue>,
}

impl WebhookPayload {
    /// Parse a raw webhook body.
    ///
    /// # Errors
    ///
    /// Returns [`PayloadError::Json`] if the body is not a JSON object.
    pub fn from_json(body: &[u8]) -> Result<Self, PayloadError> {
        let raw: RawObject =
            serde_json::from_slice(body).map_err(|e| PayloadError::Json(e.to_string()))?;

        Ok(Self {
            fields: object_from_raw(&raw)?,
        })
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&PayloadValue> {
        self.fields.get(key)
    }

    /// A field as text: strings verbatim, numbers as received.
    #[must_use]
    pub fn get_text(&self, key: &str) -> Option<&str> {
        match self.fields.get(key)? {
            PayloadValue::String(s) | PayloadValue::Number(s) => Some(s),
            PayloadValue::Null
            | PayloadValue::Bool(_)
            | PayloadValue::Array(_)
            | PayloadValue::Object(_) => None,
        }
    }

    /// The exact byte sequence the gateway signs.
    #[must_use]
    pub fn canonical_json(&self) -> String {
        let mut out = String::with_capacity(self.fields.len() * 32);
        write_object(&mut out, &self.fields);
        out
    }
}

/// Write `s` as an ASCII-only JSON string literal.
fn write_escaped(out: &mut String, s: &str) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{08}' => out.push_str("\\b"),
            '\u{0c}' => out.push_str("\\f"),
            ' '..='~' => out.push(c),
            _ => {
                let mut units = [0u16; 2];
                for unit in c.encode_utf16(&mut units) {
                    out.push_str(&format!("\\u{unit:04x}"));
                }
            }
        }
    }
    out.push('"');
}

/// Verifies webhook signatures with the shared IPN secret.
#[derive(Clone)]
pub struct WebhookVerifier {
    mac: HmacSha512,
}

impl fmt::Debug for WebhookVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebhookVerifier").finish_non_exhaustive()
    }
}

impl WebhookVerifier {
    /// Create a verifier keyed with `secret`.
    ///
    /// # Errors
    ///
    /// Returns [`SignatureError::InvalidKey`] if the MAC rejects the key.
    pub fn new(secret: &SecretString) -> Result<Self, SignatureError> {
        let mac = HmacSha512::new_from_slice(secret.expose_secret().as_bytes())
            .map_err(|_| SignatureError::InvalidKey)?;
        Ok(Self { mac })
    }

    /// Lowercase hex HMAC-SHA512 of the payload's canonical form.
    #[must_use]
    pub fn sign(&self, payload: &WebhookPayload) -> String {
        let mut mac = self.mac.clone();
        mac.update(payload.canonical_json().as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Check `signature` against the payload in constant time.
    ///
    /// # Errors
    ///
    /// Returns [`SignatureError::Missing`] for an absent or blank signature and
    /// [`SignatureError::Mismatch`] for anything that does not verify.
    pub fn verify(
        &self,
        payload: &WebhookPayload,
        signature: Option<&str>,
    ) -> Result<(), SignatureError> {
        let signature = signature
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(SignatureError::Missing)?;
        let provided =
            hex::decode(signature.to_ascii_lowercase()).map_err(|_| SignatureError::Mismatch)?;

        let mut mac = self.mac.clone();
        mac.update(payload.canonical_json().as_bytes());
        mac.verify_slice(&provided)
            .map_err(|_| SignatureError::Mismatch)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const SECRET: &str = "ipn-test-secret-7Qz2";
    const FINISHED_DIGEST: &str = "2362aedff19fba323e1d4c9731b2c1e273316d572b2f1c5dd9fea6d1ed7d415436b81276961dea2310cbbe4e52d1d81477c52b61350493d0cca7ab4dada5f201";

    fn verifier() -> WebhookVerifier {
        WebhookVerifier::new(&SecretString::from(SECRET)).unwrap()
    }

    #[test]
    fn test_known_digest() {
        let payload =
            WebhookPayload::from_json(br#"{"payment_status":"finished","order_id":"1"}"#).unwrap();

        assert_eq!(
            payload.canonical_json(),
            r#"{"order_id":"1","payment_status":"finished"}"#
        );
        assert_eq!(verifier().sign(&payload), FINISHED_DIGEST);
        assert!(verifier().verify(&payload, Some(FINISHED_DIGEST)).is_ok());
    }

    #[test]
    fn test_mixed_scalars_canonical_form() {
        let body = r#"{
            "price_amount": 100,
            "payment_status": "finished",
            "order_id": "1",
            "order_description": "Café \"deluxe\"\n",
            "pay_amount": 0.00123,
            "is_fixed_rate": true,
            "fee": null
        }"#;
        let payload = WebhookPayload::from_json(body.as_bytes()).unwrap();

        assert_eq!(
            payload.canonical_json(),
            r#"{"fee":null,"is_fixed_rate":true,"order_description":"Caf\u00e9 \"deluxe\"\n","order_id":"1","pay_amount":0.00123,"payment_status":"finished","price_amount":100}"#
        );
        assert_eq!(
            verifier().sign(&payload),
            "d1b2c52c952aac1b5f070d5d39b7e69e559c33bc41423dc37c3612bc6cf9bcecc4b10fc5214f1d6dfd989452e083ffc94534cce846699baa0a63d23977679bd0"
        );
    }

    #[test]
    fn test_escapes_astral_and_control_characters() {
        let payload =
            WebhookPayload::from_json(r#"{"note":"😀\u0001/\u007f"}"#.as_bytes()).unwrap();

        assert_eq!(
            payload.canonical_json(),
            r#"{"note":"\ud83d\ude00\u0001/\u007f"}"#
        );
    }

    #[test]
    fn test_numbers_keep_received_text() {
        let payload =
            WebhookPayload::from_json(br#"{"actually_paid":1.50,"order_id":12}"#).unwrap();

        assert_eq!(payload.get_text("order_id"), Some("12"));
        assert_eq!(
            payload.canonical_json(),
            r#"{"actually_paid":1.50,"order_id":12}"#
        );
    }

    #[test]
    fn test_signature_is_case_insensitive() {
        let payload =
            WebhookPayload::from_json(br#"{"order_id":"1","payment_status":"finished"}"#).unwrap();
        let upper = FINISHED_DIGEST.to_ascii_uppercase();

        assert!(verifier().verify(&payload, Some(&upper)).is_ok());
    }

    #[test]
    fn test_rejections() {
        let payload =
            WebhookPayload::from_json(br#"{"order_id":"1","payment_status":"finished"}"#).unwrap();
        let v = verifier();

        assert_eq!(v.verify(&payload, None), Err(SignatureError::Missing));
        assert_eq!(v.verify(&payload, Some("  ")), Err(SignatureError::Missing));
        assert_eq!(
            v.verify(&payload, Some("not-hex")),
            Err(SignatureError::Mismatch)
        );

        let other =
            WebhookPayload::from_json(br#"{"order_id":"1","payment_status":"failed"}"#).unwrap();
        assert_eq!(
            v.verify(&other, Some(FINISHED_DIGEST)),
            Err(SignatureError::Mismatch)
        );

        let wrong_key = WebhookVerifier::new(&SecretString::from("another-secret")).unwrap();
        assert_eq!(
            wrong_key.verify(&payload, Some(FINISHED_DIGEST)),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn test_malformed_payloads() {
        assert!(matches!(
            WebhookPayload::from_json(b"not json"),
            Err(PayloadError::Json(_))
        ));
        assert!(matches!(
            WebhookPayload::from_json(b"[1,2]"),
            Err(PayloadError::Json(_))
        ));
        assert!(matches!(
            WebhookPayload::from_json(br#"{"order_id":"1","fee":{"a":}}"#),
            Err(PayloadError::Json(_))
        ));
    }

    #[test]
    fn test_nested_fee_known_digest() {
        let body = br#"{"order_id":"1","payment_status":"finished","payment_id":5077125051,"fee":{"currency":"btc","depositFee":0,"serviceFee":0,"withdrawalFee":0}}"#;
        let payload = WebhookPayload::from_json(body).unwrap();

        assert_eq!(
            payload.canonical_json(),
            r#"{"fee":{"currency":"btc","depositFee":0,"serviceFee":0,"withdrawalFee":0},"order_id":"1","payment_id":5077125051,"payment_status":"finished"}"#
        );
        assert_eq!(
            verifier().sign(&payload),
            "e817ca177cd4b8c6c9f5495dadc575e3f7038cd2a83a959157332971a0f1ca97e825bbd840bce0ee8875016fef97af5655825f2ee72e6e3467415b7daca2971b"
        );
        assert_eq!(payload.get_text("fee"), None);
    }

    #[test]
    fn test_nested_values_sort_and_keep_text() {
        let body = r#"{ "tags": ["b", {"z": 1.50, "a": null}, []], "fee": {"withdrawalFee": 0, "note": "é"} }"#;
        let payload = WebhookPayload::from_json(body.as_bytes()).unwrap();

        assert_eq!(
            payload.canonical_json(),
            r#"{"fee":{"note":"\u00e9","withdrawalFee":0},"tags":["b",{"a":null,"z":1.50},[]]}"#
        );
    }
}
