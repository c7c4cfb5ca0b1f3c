//! JSON-RPC 2.0 wire types.
//!
//! One message per line, `\n`-terminated. Servers may also emit lines that
//! are not JSON at all (startup banners, stray prints); the transport is
//! responsible for tolerating those.

use serde::{Deserialize, Serialize};

/// An outgoing request. Ids are assigned by the correlator and never reused.
#[derive(Debug, Clone, Serialize)]
pub struct Request {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl Request {
    pub fn new(id: u64, method: impl Into<String>, params: Option<serde_json::Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method: method.into(),
            params,
        }
    }
}

/// An incoming response. The id is optional: servers answer unparseable
/// requests with `id: null`, and notification lines carry no id at all.
#[derive(Debug, Clone, Deserialize)]
pub struct Response {
    #[serde(default)]
    pub id: Option<u64>,
    pub result: Option<serde_json::Value>,
    pub error: Option<ErrorObject>,
}

/// The `error` member of a failed response.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorObject {
    pub code: i64,
    pub message: String,
    pub data: Option<serde_json::Value>,
}

/// An outgoing notification: no id, no response expected.
#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub jsonrpc: &'static str,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl Notification {
    pub fn new(method: impl Into<String>, params: Option<serde_json::Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            method: method.into(),
            params,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serializes_in_wire_order() {
        let req = Request::new(7, "tools/call", Some(serde_json::json!({"name": "echo"})));
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["jsonrpc"], "2.0");
        assert_eq!(json["id"], 7);
        assert_eq!(json["method"], "tools/call");
        assert_eq!(json["params"]["name"], "echo");
    }

    #[test]
    fn request_omits_absent_params() {
        let req = Request::new(1, "initialize", None);
        let json = serde_json::to_value(&req).unwrap();
        assert!(json.get("params").is_none());
    }

    #[test]
    fn response_with_result() {
        let resp: Response =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":3,"result":{"ok":true}}"#).unwrap();
        assert_eq!(resp.id, Some(3));
        assert!(resp.result.is_some());
        assert!(resp.error.is_none());
    }

    #[test]
    fn response_with_error() {
        let resp: Response = serde_json::from_str(
            r#"{"jsonrpc":"2.0","id":3,"error":{"code":-32601,"message":"Method not found"}}"#,
        )
        .unwrap();
        let err = resp.error.unwrap();
        assert_eq!(err.code, -32601);
        assert_eq!(err.message, "Method not found");
    }

    #[test]
    fn response_with_null_id() {
        // Servers answer parse failures with id: null.
        let resp: Response = serde_json::from_str(
            r#"{"jsonrpc":"2.0","id":null,"error":{"code":-32700,"message":"Parse error"}}"#,
        )
        .unwrap();
        assert_eq!(resp.id, None);
    }

    #[test]
    fn server_notification_parses_without_id() {
        let resp: Response =
            serde_json::from_str(r#"{"jsonrpc":"2.0","method":"log","params":{}}"#).unwrap();
        assert_eq!(resp.id, None);
        assert!(resp.result.is_none());
        assert!(resp.error.is_none());
    }

    #[test]
    fn notification_has_no_id() {
        let n = Notification::new("notifications/initialized", None);
        let json = serde_json::to_value(&n).unwrap();
        assert!(json.get("id").is_none());
        assert!(json.get("params").is_none());
        assert_eq!(json["method"], "notifications/initialized");
    }
}
