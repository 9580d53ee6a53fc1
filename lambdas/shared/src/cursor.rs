//! Opaque pagination tokens
//!
//! A continuation token is the raw `LastEvaluatedKey` of the previous page,
//! JSON-encoded and base64-wrapped. Decoding is the inverse; the token
//! carries no signature, so its contents are whatever the caller presents.
//! All key attributes in this table are strings, which keeps the JSON flat.

use aws_sdk_dynamodb::types::AttributeValue;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use std::collections::{BTreeMap, HashMap};

use crate::errors::{Error, Result};

/// Encode a `LastEvaluatedKey` as an opaque continuation token.
pub fn encode_token(last_evaluated_key: &HashMap<String, AttributeValue>) -> Result<String> {
    let mut flat = BTreeMap::new();
    for (name, value) in last_evaluated_key {
        let s = value
            .as_s()
            .map_err(|_| Error::Internal(format!("non-string key attribute: {}", name)))?;
        flat.insert(name.clone(), s.clone());
    }
    let json = serde_json::to_string(&flat)?;
    Ok(URL_SAFE_NO_PAD.encode(json.as_bytes()))
}

/// Decode a continuation token back into an `ExclusiveStartKey`.
pub fn decode_token(token: &str) -> Result<HashMap<String, AttributeValue>> {
    let bytes = URL_SAFE_NO_PAD
        .decode(token)
        .map_err(|_| Error::InvalidToken("invalid base64".to_string()))?;
    let json = std::str::from_utf8(&bytes)
        .map_err(|_| Error::InvalidToken("invalid UTF-8".to_string()))?;
    let flat: BTreeMap<String, String> =
        serde_json::from_str(json).map_err(|_| Error::InvalidToken("invalid JSON".to_string()))?;
    Ok(flat
        .into_iter()
        .map(|(name, value)| (name, AttributeValue::S(value)))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_key() -> HashMap<String, AttributeValue> {
        HashMap::from([
            (
                "pk".to_string(),
                AttributeValue::S("DevicePatch:p-1".to_string()),
            ),
            (
                "sk".to_string(),
                AttributeValue::S("Device:core-001".to_string()),
            ),
            (
                "si1Sort".to_string(),
                AttributeValue::S("DevicePatch:complete:p-1".to_string()),
            ),
        ])
    }

    #[test]
    fn test_token_round_trip() {
        let key = sample_key();
        let token = encode_token(&key).unwrap();
        let decoded = decode_token(&token).unwrap();
        assert_eq!(decoded, key);
    }

    #[test]
    fn test_token_is_url_safe() {
        let token = encode_token(&sample_key()).unwrap();
        assert!(!token.contains('+'));
        assert!(!token.contains('/'));
        assert!(!token.contains('='));
    }

    #[test]
    fn test_invalid_base64_rejected() {
        let err = decode_token("not base64 !!!").unwrap_err();
        assert!(matches!(err, Error::InvalidToken(_)));
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn test_invalid_json_rejected() {
        let token = URL_SAFE_NO_PAD.encode(b"{broken");
        let err = decode_token(&token).unwrap_err();
        assert!(matches!(err, Error::InvalidToken(_)));
    }

    #[test]
    fn test_non_string_attribute_rejected() {
        let key = HashMap::from([("pk".to_string(), AttributeValue::N("7".to_string()))]);
        assert!(encode_token(&key).is_err());
    }
}
