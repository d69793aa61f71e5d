//! Strict decoding of wire payloads.
//!
//! Every inbound payload is validated here, before it reaches the router.
//! Anything that does not match its contract becomes
//! [`RpcError::BrokenContract`].

use serde::Deserialize;
use serde_json::Value;

use crate::contracts::{EventContract, RequestContract, ResponseContract};
use crate::errors::RpcError;

/// Request body as accepted on templated routes, where the path may be implied.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RequestBody {
    #[serde(default)]
    namespace: Option<Vec<String>>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    params: Vec<Value>,
}

/// Decode a request from the plain endpoint, where the body carries the full path.
pub fn decode_request(bytes: &[u8]) -> Result<RequestContract, RpcError> {
    decode_request_for_signature(bytes, None)
}

/// Decode a request, reconciling the body with an optional route signature.
///
/// With a signature, the body may omit `namespace` and `method`; any it does
/// supply must agree with the signature.
pub fn decode_request_for_signature(
    bytes: &[u8],
    signature: Option<&str>,
) -> Result<RequestContract, RpcError> {
    let body: RequestBody = serde_json::from_slice(bytes)
        .map_err(|e| RpcError::broken_contract(format!("Malformed request body: {e}")))?;

    let (namespace, method) = match signature {
        None => {
            let namespace = body
                .namespace
                .ok_or_else(|| RpcError::broken_contract("Request is missing 'namespace'"))?;
            let method = body
                .method
                .ok_or_else(|| RpcError::broken_contract("Request is missing 'method'"))?;
            (namespace, method)
        }
        Some(signature) => {
            let (sig_ns, sig_method) = parse_signature(signature)?;
            if body.namespace.as_ref().is_some_and(|ns| *ns != sig_ns)
                || body.method.as_ref().is_some_and(|m| *m != sig_method)
            {
                return Err(RpcError::broken_contract(format!(
                    "Request body does not match route signature '{signature}'"
                )));
            }
            (sig_ns, sig_method)
        }
    };

    validate_path(&namespace, &method)?;
    Ok(RequestContract::new(namespace, method, body.params))
}

/// Split a dot-joined signature into `(namespace, method)`.
pub fn parse_signature(signature: &str) -> Result<(Vec<String>, String), RpcError> {
    let mut segments: Vec<String> = signature.split('.').map(str::to_owned).collect();
    let method = segments.pop().unwrap_or_default();
    validate_path(&segments, &method)?;
    Ok((segments, method))
}

fn validate_path(namespace: &[String], method: &str) -> Result<(), RpcError> {
    if method.is_empty() {
        return Err(RpcError::broken_contract("Method name must not be empty"));
    }
    if namespace.iter().any(String::is_empty) {
        return Err(RpcError::broken_contract(
            "Namespace segments must not be empty",
        ));
    }
    if method.contains('.') || namespace.iter().any(|seg| seg.contains('.')) {
        return Err(RpcError::broken_contract("Path segments must not contain '.'"));
    }
    Ok(())
}

/// Decode a response returned by the server.
pub fn decode_response(bytes: &[u8]) -> Result<ResponseContract, RpcError> {
    serde_json::from_slice(bytes)
        .map_err(|e| RpcError::broken_contract(format!("Malformed response body: {e}")))
}

/// Serialize an event frame to a single JSON line.
pub fn encode_event(event: &EventContract) -> Result<String, RpcError> {
    Ok(serde_json::to_string(event)?)
}

/// Decode one event frame.
pub fn decode_event(data: &str) -> Result<EventContract, RpcError> {
    serde_json::from_str(data)
        .map_err(|e| RpcError::broken_contract(format!("Malformed event frame: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::ConnectionId;
    use crate::errors::BROKEN_CONTRACT;
    use assert_matches::assert_matches;
    use serde_json::json;

    #[test]
    fn decode_full_request() {
        let req = decode_request(br#"{"namespace":["chat"],"method":"join","params":["bob"]}"#)
            .unwrap();
        assert_eq!(req.namespace(), ["chat"]);
        assert_eq!(req.method(), "join");
        assert_eq!(req.params(), [json!("bob")]);
    }

    #[test]
    fn decode_rejects_non_json() {
        let err = decode_request(b"not json").unwrap_err();
        assert_eq!(err.reason(), BROKEN_CONTRACT);
    }

    #[test]
    fn decode_rejects_missing_method() {
        assert_matches!(
            decode_request(br#"{"namespace":[]}"#),
            Err(RpcError::BrokenContract { .. })
        );
    }

    #[test]
    fn decode_rejects_wrong_types() {
        assert_matches!(
            decode_request(br#"{"namespace":"chat","method":"join"}"#),
            Err(RpcError::BrokenContract { .. })
        );
        assert_matches!(
            decode_request(br#"{"namespace":[],"method":"x","params":{"a":1}}"#),
            Err(RpcError::BrokenContract { .. })
        );
    }

    #[test]
    fn decode_rejects_unknown_fields() {
        assert_matches!(
            decode_request(br#"{"namespace":[],"method":"x","extra":1}"#),
            Err(RpcError::BrokenContract { .. })
        );
    }

    #[test]
    fn decode_rejects_empty_segments() {
        assert_matches!(
            decode_request(br#"{"namespace":["",""],"method":"x"}"#),
            Err(RpcError::BrokenContract { .. })
        );
        assert_matches!(
            decode_request(br#"{"namespace":[],"method":""}"#),
            Err(RpcError::BrokenContract { .. })
        );
    }

    #[test]
    fn decode_rejects_dotted_segments() {
        assert_matches!(
            decode_request(br#"{"namespace":["a.b"],"method":"x"}"#),
            Err(RpcError::BrokenContract { .. })
        );
        assert_matches!(
            decode_request(br#"{"namespace":["a"],"method":"b.x"}"#),
            Err(RpcError::BrokenContract { .. })
        );
    }

    #[test]
    fn signature_supplies_path() {
        let req = decode_request_for_signature(br#"{"params":[1]}"#, Some("chat.send_message"))
            .unwrap();
        assert_eq!(req.namespace(), ["chat"]);
        assert_eq!(req.method(), "send_message");
        assert_eq!(req.params(), [json!(1)]);
    }

    #[test]
    fn signature_accepts_agreeing_body() {
        let req = decode_request_for_signature(
            br#"{"namespace":["a","b"],"method":"c"}"#,
            Some("a.b.c"),
        )
        .unwrap();
        assert_eq!(req.signature(), "a.b.c");
    }

    #[test]
    fn signature_rejects_disagreeing_body() {
        assert_matches!(
            decode_request_for_signature(br#"{"namespace":["x"],"method":"c"}"#, Some("a.c")),
            Err(RpcError::BrokenContract { .. })
        );
        assert_matches!(
            decode_request_for_signature(br#"{"method":"d"}"#, Some("a.c")),
            Err(RpcError::BrokenContract { .. })
        );
    }

    #[test]
    fn parse_signature_rejects_empty_parts() {
        assert!(parse_signature("").is_err());
        assert!(parse_signature("a..b").is_err());
        assert!(parse_signature("a.").is_err());
        let (ns, method) = parse_signature("health").unwrap();
        assert!(ns.is_empty());
        assert_eq!(method, "health");
    }

    #[test]
    fn decode_response_variants() {
        assert!(decode_response(br#"{"result":[1]}"#).unwrap().is_success());
        let resp = decode_response(br#"{"error":{"reason":"ROUTING","message":"m"}}"#).unwrap();
        assert_eq!(resp.error().unwrap().reason, "ROUTING");
        assert_matches!(decode_response(b"{}"), Err(RpcError::BrokenContract { .. }));
    }

    #[test]
    fn event_frame_is_single_line() {
        let ev = EventContract::emit(vec!["chat".into()], "m", json!({"text": "a\nb"}));
        let line = encode_event(&ev).unwrap();
        assert!(!line.contains('\n'));
        assert_eq!(decode_event(&line).unwrap(), ev);
    }

    #[test]
    fn decode_connected_frame() {
        let ev = decode_event(r#"{"event_type":"connected","connection_id":"c1"}"#).unwrap();
        assert_eq!(
            ev,
            EventContract::Connected {
                connection_id: ConnectionId::from("c1")
            }
        );
    }

    #[test]
    fn decode_unknown_event_type_fails() {
        assert_matches!(
            decode_event(r#"{"event_type":"bogus"}"#),
            Err(RpcError::BrokenContract { .. })
        );
    }
}
