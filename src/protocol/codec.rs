//! Protocol codec for encoding/decoding message bodies
//!
//! Bodies are single JSON objects. The procedure address is not part of the
//! body; callers hand it in from the transport's routing attribute.

use thiserror::Error;

use super::message::RequestBody;
use super::{Request, Response};

/// Inbound body could not be parsed
///
/// These never get a reply: a malformed body means the correlation id
/// cannot be trusted either.
#[derive(Error, Debug)]
#[error("Malformed request body {raw:?}: {source}")]
pub struct DecodeError {
    /// The payload as received
    pub raw: String,
    #[source]
    pub source: serde_json::Error,
}

/// Outbound body could not be serialized
#[derive(Error, Debug)]
#[error("Serialization error: {0}")]
pub struct EncodeError(#[from] serde_json::Error);

/// Decode a request body received on `address`
pub fn decode_request(address: &str, payload: &str) -> Result<Request, DecodeError> {
    let body: RequestBody = serde_json::from_str(payload).map_err(|source| DecodeError {
        raw: payload.to_string(),
        source,
    })?;

    Ok(Request {
        uuid: body.uuid,
        address: address.to_string(),
        arguments: body.arguments,
    })
}

/// Encode a request body; the address is carried separately
pub fn encode_request(request: &Request) -> Result<String, EncodeError> {
    let body = RequestBody {
        uuid: request.uuid.clone(),
        arguments: request.arguments.clone(),
    };
    Ok(serde_json::to_string(&body)?)
}

/// Encode a response body
pub fn encode_response(response: &Response) -> Result<String, EncodeError> {
    Ok(serde_json::to_string(response)?)
}

/// Decode a response body
pub fn decode_response(payload: &str) -> Result<Response, DecodeError> {
    serde_json::from_str(payload).map_err(|source| DecodeError {
        raw: payload.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::CallId;
    use serde_json::{json, Value};

    #[test]
    fn test_decode_request() {
        let request = decode_request("/rpc/add", r#"{"uuid": 1, "arguments": ["2", "3"]}"#).unwrap();
        assert_eq!(request.uuid, CallId::from(1));
        assert_eq!(request.address, "/rpc/add");
        assert_eq!(request.arguments, vec!["2".to_string(), "3".to_string()]);
    }

    #[test]
    fn test_arguments_default_empty() {
        let request = decode_request("/rpc/_get_methods", r#"{"uuid": 4}"#).unwrap();
        assert!(request.arguments.is_empty());
    }

    #[test]
    fn test_unknown_body_fields_ignored() {
        let request =
            decode_request("/rpc/add", r#"{"uuid": 2, "method": "sub", "jsonrpc": "2.0"}"#).unwrap();
        assert_eq!(request.address, "/rpc/add");
    }

    #[test]
    fn test_decode_rejects_malformed_bodies() {
        for payload in [
            "",
            "not json",
            r#"{"arguments": ["1"]}"#,
            r#"{"uuid": "one"}"#,
            r#"{"uuid": 1, "arguments": [1, 2]}"#,
            r#"[1, 2]"#,
        ] {
            let err = decode_request("/rpc/add", payload).unwrap_err();
            assert_eq!(err.raw, payload);
        }
    }

    #[test]
    fn test_encode_response_keeps_null_fault() {
        let encoded = encode_response(&Response::success(1, json!(5))).unwrap();
        let value: Value = serde_json::from_str(&encoded).unwrap();
        assert_eq!(value, json!({"uuid": 1, "response": 5, "fault": null}));

        let encoded = encode_response(&Response::fault(7, "boom")).unwrap();
        let value: Value = serde_json::from_str(&encoded).unwrap();
        assert_eq!(value, json!({"uuid": 7, "response": null, "fault": "boom"}));
    }

    #[test]
    fn test_large_correlation_id_is_echoed_verbatim() {
        let request =
            decode_request("/rpc/_get_methods", r#"{"uuid": 18446744073709551615}"#).unwrap();
        assert_eq!(request.uuid.to_string(), "18446744073709551615");

        let encoded = encode_response(&Response::success(request.uuid, Value::Null)).unwrap();
        assert_eq!(
            encoded,
            r#"{"uuid":18446744073709551615,"response":null,"fault":null}"#
        );
        assert_eq!(decode_response(&encoded).unwrap().uuid.to_string(), "18446744073709551615");
    }

    #[test]
    fn test_request_body_omits_address() {
        let request = Request::new(9, "/rpc/add", vec!["1".into()]);
        let value: Value = serde_json::from_str(&encode_request(&request).unwrap()).unwrap();
        assert_eq!(value, json!({"uuid": 9, "arguments": ["1"]}));
    }
}
