//! Unverified decoding of JWT payloads and `client_info` blobs.
//!
//! Signatures are never checked: claims are informational only.

use base64::{
    Engine,
    engine::general_purpose::{STANDARD, URL_SAFE, URL_SAFE_NO_PAD},
};
use serde_json::{Map, Value};

use crate::errors::{Result, TokenmanError};

/// Decoded claim set of a token or client info blob
pub type Claims = Map<String, Value>;

/// Decode the payload segment of a compact JWT without validating its signature
pub fn decode_jwt(token: &str) -> Result<Claims> {
    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != 3 {
        return Err(TokenmanError::Decode(format!(
            "expected 3 JWT segments, found {}",
            segments.len()
        )));
    }

    let payload = URL_SAFE_NO_PAD
        .decode(segments[1].trim_end_matches('='))
        .map_err(|e| TokenmanError::Decode(format!("invalid JWT payload encoding: {e}")))?;

    parse_claims(&payload)
}

/// Decode a base64url `client_info` blob, tolerating missing padding
pub fn decode_client_info(blob: &str) -> Result<Claims> {
    let padded = pad_base64(blob.trim());
    let bytes = URL_SAFE
        .decode(&padded)
        .or_else(|_| STANDARD.decode(&padded))
        .map_err(|e| TokenmanError::Decode(format!("invalid client info encoding: {e}")))?;

    parse_claims(&bytes)
}

/// Right-pad with `=` until the length is a multiple of 4
pub fn pad_base64(data: &str) -> String {
    let mut padded = data.to_string();
    while padded.len() % 4 != 0 {
        padded.push('=');
    }
    padded
}

fn parse_claims(bytes: &[u8]) -> Result<Claims> {
    match serde_json::from_slice::<Value>(bytes) {
        Ok(Value::Object(claims)) => Ok(claims),
        Ok(other) => Err(TokenmanError::Decode(format!(
            "expected a JSON object, found {}",
            json_kind(&other)
        ))),
        Err(e) => Err(TokenmanError::Decode(format!("payload is not JSON: {e}"))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// String claim lookup, absent when missing or not a string
pub fn claim_str<'a>(claims: &'a Claims, name: &str) -> Option<&'a str> {
    claims.get(name).and_then(Value::as_str)
}

/// Integer claim lookup, accepting numeric strings as some issuers emit them
pub fn claim_i64(claims: &Claims, name: &str) -> Option<i64> {
    match claims.get(name)? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::{client_info, jwt};
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_jwt_payload() {
        let token = jwt(json!({ "appid": "c1", "scp": "Mail.Read", "exp": 1700000000 }));
        let claims = decode_jwt(&token).unwrap();

        assert_eq!(claim_str(&claims, "appid"), Some("c1"));
        assert_eq!(claim_i64(&claims, "exp"), Some(1700000000));
    }

    #[test]
    fn test_decode_jwt_ignores_signature() {
        let token = jwt(json!({ "aud": "https://graph.microsoft.com" }));
        let (unsigned, _) = token.rsplit_once('.').unwrap();
        let tampered = format!("{unsigned}.not-a-real-signature");

        assert!(decode_jwt(&tampered).is_ok());
    }

    #[test]
    fn test_decode_jwt_wrong_segment_count() {
        assert!(matches!(
            decode_jwt("only.two"),
            Err(TokenmanError::Decode(_))
        ));
        assert!(matches!(decode_jwt("a.b.c.d"), Err(TokenmanError::Decode(_))));
    }

    #[test]
    fn test_decode_jwt_payload_not_json() {
        let payload = URL_SAFE_NO_PAD.encode("not json");
        let token = format!("e30.{payload}.sig");
        assert!(matches!(decode_jwt(&token), Err(TokenmanError::Decode(_))));
    }

    #[test]
    fn test_decode_jwt_payload_not_object() {
        let payload = URL_SAFE_NO_PAD.encode("[1,2,3]");
        let token = format!("e30.{payload}.sig");
        assert!(matches!(decode_jwt(&token), Err(TokenmanError::Decode(_))));
    }

    #[test]
    fn test_client_info_roundtrip_after_padding() {
        let blob = STANDARD.encode(r#"{"uid":"u1","tid":"t1"}"#);
        let claims = decode_client_info(&pad_base64(&blob)).unwrap();

        assert_eq!(claims, json!({ "uid": "u1", "tid": "t1" }).as_object().unwrap().clone());
    }

    #[test]
    fn test_client_info_without_padding() {
        let claims = decode_client_info(&client_info("user-1", "tenant-1")).unwrap();
        assert_eq!(claim_str(&claims, "uid"), Some("user-1"));
        assert_eq!(claim_str(&claims, "tid"), Some("tenant-1"));
    }

    #[test]
    fn test_client_info_malformed() {
        assert!(matches!(
            decode_client_info("%%%not-base64%%%"),
            Err(TokenmanError::Decode(_))
        ));
    }

    #[test]
    fn test_pad_base64() {
        assert_eq!(pad_base64("abcd"), "abcd");
        assert_eq!(pad_base64("abc"), "abc=");
        assert_eq!(pad_base64("ab"), "ab==");
        assert_eq!(pad_base64(""), "");
    }

    #[test]
    fn test_claim_i64_accepts_numeric_strings() {
        let claims = json!({ "exp": "1700000000", "nbf": true })
            .as_object()
            .unwrap()
            .clone();
        assert_eq!(claim_i64(&claims, "exp"), Some(1700000000));
        assert_eq!(claim_i64(&claims, "nbf"), None);
    }
}
