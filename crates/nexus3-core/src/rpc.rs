//! JSON-RPC 2.0 wire types (§6).
//!
//! Wire format:
//!
//! Request:  `{"jsonrpc":"2.0","method":"send","params":{...},"id":"r1"}`
//! Response: `{"jsonrpc":"2.0","id":"r1","result":{...}}`
//!           `{"jsonrpc":"2.0","id":"r1","error":{"code":-32602,"message":"..."}}`
//!
//! Only named (object) params are accepted; positional (array) params are a
//! parse-time rejection, surfaced as an `invalid_request` response. Requests
//! without an `id` are notifications and never receive a response.

use crate::error::Error;
use serde::{Deserialize, Serialize};

fn jsonrpc_version() -> String {
    "2.0".to_string()
}

/// Either a string or a number request id, per the JSON-RPC 2.0 spec.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RpcId {
    String(String),
    Number(i64),
}

impl std::fmt::Display for RpcId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RpcId::String(s) => f.write_str(s),
            RpcId::Number(n) => write!(f, "{n}"),
        }
    }
}

/// A raw, not-yet-validated JSON-RPC request body.
#[derive(Debug, Clone, Deserialize)]
pub struct RpcRequest {
    #[serde(default = "jsonrpc_version")]
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
    #[serde(default)]
    pub id: Option<RpcId>,
}

impl RpcRequest {
    /// Named (object) params are required; positional (array) params are rejected.
    pub fn named_params(&self) -> Result<&serde_json::Map<String, serde_json::Value>, Error> {
        match &self.params {
            serde_json::Value::Object(m) => Ok(m),
            serde_json::Value::Null => {
                static EMPTY: std::sync::OnceLock<serde_json::Map<String, serde_json::Value>> =
                    std::sync::OnceLock::new();
                Ok(EMPTY.get_or_init(serde_json::Map::new))
            }
            serde_json::Value::Array(_) => Err(Error::InvalidParams(
                "positional params are not accepted; use named params".to_string(),
            )),
            _ => Err(Error::InvalidParams("params must be an object".to_string())),
        }
    }

    /// A request with no `id` is a notification: it never receives a response.
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RpcErrorBody {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RpcResponse {
    #[serde(default = "jsonrpc_version")]
    pub jsonrpc: String,
    pub id: Option<RpcId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcErrorBody>,
}

impl RpcResponse {
    pub fn ok(id: Option<RpcId>, result: serde_json::Value) -> Self {
        Self {
            jsonrpc: jsonrpc_version(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn err(id: Option<RpcId>, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: jsonrpc_version(),
            id,
            result: None,
            error: Some(RpcErrorBody {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }

    pub fn parse_error() -> Self {
        Self::err(None, -32700, "parse error")
    }

    pub fn invalid_request(id: Option<RpcId>, message: impl Into<String>) -> Self {
        Self::err(id, -32600, message)
    }

    pub fn method_not_found(id: Option<RpcId>, method: &str) -> Self {
        Self::err(id, -32601, format!("method not found: {method}"))
    }

    pub fn from_error(id: Option<RpcId>, error: &Error) -> Self {
        Self::err(id, error.rpc_code(), error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positional_params_rejected() {
        let req: RpcRequest =
            serde_json::from_str(r#"{"jsonrpc":"2.0","method":"x","params":[1,2],"id":"1"}"#)
                .unwrap();
        assert!(req.named_params().is_err());
    }

    #[test]
    fn missing_params_defaults_to_empty_object() {
        let req: RpcRequest =
            serde_json::from_str(r#"{"jsonrpc":"2.0","method":"x","id":"1"}"#).unwrap();
        assert!(req.named_params().unwrap().is_empty());
    }

    #[test]
    fn notification_has_no_id() {
        let req: RpcRequest =
            serde_json::from_str(r#"{"jsonrpc":"2.0","method":"x","params":{}}"#).unwrap();
        assert!(req.is_notification());
    }

    #[test]
    fn numeric_and_string_ids_roundtrip() {
        let req: RpcRequest =
            serde_json::from_str(r#"{"jsonrpc":"2.0","method":"x","id":42}"#).unwrap();
        assert_eq!(req.id, Some(RpcId::Number(42)));
    }
}
