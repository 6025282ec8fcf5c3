//! JSON-RPC 2.0 wire types (§4.1, §6).
//!
//! Each message is a single line of newline-delimited JSON. Grounded in
//! `sa_mcp_client::protocol`, adapted from a client's outbound request
//! shape to the dispatcher's inbound/outbound shape: `id` here is
//! `string | number | null` (§6), not a client-assigned `u64`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A JSON-RPC id: string, number, or null. `null` is a valid id and must
/// be echoed back verbatim (§4.1).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RpcId {
    String(String),
    Number(i64),
    Null,
}

/// An inbound JSON-RPC request.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcRequest {
    #[allow(dead_code)]
    pub jsonrpc: String,
    #[serde(default = "default_id")]
    pub id: RpcId,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
}

fn default_id() -> RpcId {
    RpcId::Null
}

/// A JSON-RPC error object. `code`/`message` follow the reserved codes in
/// §4.1: -32700 parse error, -32601 method not found, -32000 tool error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
}

pub const PARSE_ERROR: i64 = -32700;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const TOOL_ERROR: i64 = -32000;

/// An outbound JSON-RPC response. `result` and `error` are mutually
/// exclusive (§4.1 invariant), enforced by construction via
/// [`JsonRpcResponse::ok`] / [`JsonRpcResponse::err`].
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: RpcId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    pub fn ok(id: RpcId, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn err(id: RpcId, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
            }),
        }
    }

    /// Build the `-32000` envelope for a tool-raised [`reportdeck_domain::Error`]:
    /// message is `"<ErrorKind>: <message>"`, no stack traces (§4.1).
    pub fn from_tool_error(id: RpcId, err: &reportdeck_domain::Error) -> Self {
        let code = match err.kind {
            reportdeck_domain::ErrorKind::BadRequest => TOOL_ERROR,
            _ => TOOL_ERROR,
        };
        Self::err(id, code, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_id_round_trips() {
        let req: JsonRpcRequest =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":null,"method":"x"}"#).unwrap();
        assert_eq!(req.id, RpcId::Null);
        let resp = JsonRpcResponse::ok(req.id, serde_json::json!({}));
        let s = serde_json::to_string(&resp).unwrap();
        assert!(s.contains("\"id\":null"));
    }

    #[test]
    fn result_and_error_are_mutually_exclusive_in_json() {
        let resp = JsonRpcResponse::ok(RpcId::Number(1), serde_json::json!(5));
        let v: Value = serde_json::to_value(&resp).unwrap();
        assert!(v.get("result").is_some());
        assert!(v.get("error").is_none());

        let resp = JsonRpcResponse::err(RpcId::Number(1), TOOL_ERROR, "BadRequest: x");
        let v: Value = serde_json::to_value(&resp).unwrap();
        assert!(v.get("error").is_some());
        assert!(v.get("result").is_none());
    }

    #[test]
    fn tool_error_message_has_kind_prefix() {
        let err = reportdeck_domain::Error::bad_request("missing field");
        let resp = JsonRpcResponse::from_tool_error(RpcId::Null, &err);
        let e = resp.error.unwrap();
        assert_eq!(e.code, TOOL_ERROR);
        assert_eq!(e.message, "BadRequest: missing field");
    }
}
