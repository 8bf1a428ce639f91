//! Line-delimited JSON-RPC envelopes and the error-code taxonomy.
pub mod server;

pub use server::{read_message, Message, RpcServer};

use crate::search::DispatchError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use thiserror::Error;

pub const PROTOCOL_VERSION: &str = "2.0";

pub const PARSE_ERROR: i32 = -32700;
pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const INTERNAL_ERROR: i32 = -32603;
pub const ENGINE_NOT_FOUND: i32 = -32001;
pub const ENGINE_DISABLED: i32 = -32002;

/// Request identifier. A missing or null id marks a notification.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RpcId {
    Number(serde_json::Number),
    String(String),
}

impl fmt::Display for RpcId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RpcId::Number(n) => write!(f, "{n}"),
            RpcId::String(s) => write!(f, "{s}"),
        }
    }
}

impl From<i64> for RpcId {
    fn from(value: i64) -> Self {
        RpcId::Number(value.into())
    }
}

impl From<&str> for RpcId {
    fn from(value: &str) -> Self {
        RpcId::String(value.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    #[serde(rename = "protocolVersion", alias = "jsonrpc", default)]
    pub protocol_version: Option<String>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(default)]
    pub id: Option<RpcId>,
}

impl RpcRequest {
    pub fn new(method: impl Into<String>, params: Value, id: Option<RpcId>) -> Self {
        Self {
            protocol_version: Some(PROTOCOL_VERSION.to_string()),
            method: Some(method.into()),
            params: Some(params),
            id,
        }
    }

    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }

    /// Decode one line into a request, or the error response it earns.
    pub fn decode(line: &str) -> Result<Self, RpcResponse> {
        let value: Value = serde_json::from_str(line)
            .map_err(|e| RpcResponse::failure(None, &RpcError::Parse(e.to_string())))?;

        let Value::Object(fields) = &value else {
            return Err(RpcResponse::failure(
                None,
                &RpcError::InvalidRequest("message must be a JSON object".to_string()),
            ));
        };
        let id = fields
            .get("id")
            .and_then(|id| serde_json::from_value::<RpcId>(id.clone()).ok());
        let invalid = |reason: String| RpcResponse::failure(id.clone(), &RpcError::InvalidRequest(reason));

        let request: RpcRequest =
            serde_json::from_value(value.clone()).map_err(|e| invalid(e.to_string()))?;

        match request.protocol_version.as_deref() {
            Some(PROTOCOL_VERSION) => {}
            Some(other) => return Err(invalid(format!("unsupported protocol version '{other}'"))),
            None => return Err(invalid("missing protocolVersion".to_string())),
        }
        match &request.params {
            None | Some(Value::Null) | Some(Value::Object(_)) => {}
            Some(_) => return Err(invalid("params must be an object".to_string())),
        }
        Ok(request)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcErrorObject {
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    #[serde(rename = "protocolVersion", alias = "jsonrpc")]
    pub protocol_version: String,
    pub id: Option<RpcId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcErrorObject>,
}

impl RpcResponse {
    pub fn success(id: Option<RpcId>, result: Value) -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: Option<RpcId>, error: &RpcError) -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION.to_string(),
            id,
            result: None,
            error: Some(error.to_object()),
        }
    }

    pub fn error_code(&self) -> Option<i32> {
        self.error.as_ref().map(|e| e.code)
    }
}

/// Typed failure of a request, mapped onto a wire error code.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RpcError {
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Method '{0}' not found")]
    MethodNotFound(String),

    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Engine '{0}' not found")]
    EngineNotFound(String),

    #[error("Engine '{0}' is disabled")]
    EngineDisabled(String),
}

impl RpcError {
    pub fn code(&self) -> i32 {
        match self {
            RpcError::Parse(_) => PARSE_ERROR,
            RpcError::InvalidRequest(_) => INVALID_REQUEST,
            RpcError::MethodNotFound(_) => METHOD_NOT_FOUND,
            RpcError::InvalidParams(_) => INVALID_PARAMS,
            RpcError::Internal(_) => INTERNAL_ERROR,
            RpcError::EngineNotFound(_) => ENGINE_NOT_FOUND,
            RpcError::EngineDisabled(_) => ENGINE_DISABLED,
        }
    }

    pub fn to_object(&self) -> RpcErrorObject {
        let (message, data) = match self {
            RpcError::Parse(detail) => ("Parse error".to_string(), Some(json!(detail))),
            RpcError::InvalidRequest(detail) => ("Invalid request".to_string(), Some(json!(detail))),
            RpcError::MethodNotFound(_) => (self.to_string(), None),
            RpcError::InvalidParams(detail) => ("Invalid parameters".to_string(), Some(json!(detail))),
            RpcError::Internal(cause) => ("Internal error".to_string(), Some(json!(cause))),
            RpcError::EngineNotFound(engine) | RpcError::EngineDisabled(engine) => {
                (self.to_string(), Some(json!({ "engine": engine })))
            }
        };
        RpcErrorObject {
            code: self.code(),
            message,
            data,
        }
    }
}

impl From<DispatchError> for RpcError {
    fn from(error: DispatchError) -> Self {
        match error {
            DispatchError::EngineNotFound(name) => RpcError::EngineNotFound(name),
            DispatchError::EngineDisabled(name) => RpcError::EngineDisabled(name),
            other => RpcError::InvalidParams(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for RpcError {
    fn from(error: serde_json::Error) -> Self {
        RpcError::Internal(error.to_string())
    }
}

/// Bind named parameters to `T`. Absent or null params bind as `{}`.
pub fn parse_params<T: DeserializeOwned>(params: Value) -> Result<T, RpcError> {
    let params = match params {
        Value::Null => Value::Object(Default::default()),
        other => other,
    };
    serde_json::from_value(params).map_err(|e| RpcError::InvalidParams(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_request_with_either_version_field() {
        let request =
            RpcRequest::decode(r#"{"protocolVersion":"2.0","method":"ping","id":1}"#).unwrap();
        assert_eq!(request.method.as_deref(), Some("ping"));
        assert_eq!(request.id, Some(RpcId::from(1)));

        let request =
            RpcRequest::decode(r#"{"jsonrpc":"2.0","method":"ping","id":"a"}"#).unwrap();
        assert_eq!(request.id, Some(RpcId::from("a")));
    }

    #[test]
    fn fractional_and_large_ids_are_echoed() {
        for (line, wire) in [
            (r#"{"protocolVersion":"2.0","method":"ping","id":1.5}"#, json!(1.5)),
            (
                r#"{"protocolVersion":"2.0","method":"ping","id":18446744073709551615}"#,
                json!(u64::MAX),
            ),
        ] {
            let request = RpcRequest::decode(line).unwrap();
            assert!(!request.is_notification(), "{line}");
            let response = RpcResponse::success(request.id, json!("pong"));
            assert_eq!(serde_json::to_value(&response).unwrap()["id"], wire);
        }
    }

    #[test]
    fn null_id_is_a_notification() {
        let request =
            RpcRequest::decode(r#"{"protocolVersion":"2.0","method":"ping","id":null}"#).unwrap();
        assert!(request.is_notification());
    }

    #[test]
    fn malformed_json_is_a_parse_error_without_id() {
        let response = RpcRequest::decode("{not json").unwrap_err();
        assert_eq!(response.error_code(), Some(PARSE_ERROR));
        assert_eq!(response.id, None);
    }

    #[test]
    fn shape_errors_are_invalid_requests() {
        for line in [
            "[1,2]",
            r#"{"method":"ping","id":3}"#,
            r#"{"protocolVersion":"1.0","method":"ping","id":3}"#,
            r#"{"protocolVersion":"2.0","method":"ping","params":[1],"id":3}"#,
            r#"{"protocolVersion":"2.0","method":5,"id":3}"#,
        ] {
            let response = RpcRequest::decode(line).unwrap_err();
            assert_eq!(response.error_code(), Some(INVALID_REQUEST), "{line}");
        }
        let response = RpcRequest::decode(r#"{"method":"ping","id":3}"#).unwrap_err();
        assert_eq!(response.id, Some(RpcId::from(3)));
    }

    #[test]
    fn error_envelope_serializes_wire_shape() {
        let response = RpcResponse::failure(
            Some(RpcId::from(1)),
            &RpcError::MethodNotFound("x".to_string()),
        );
        let wire = serde_json::to_value(&response).unwrap();
        assert_eq!(
            wire,
            json!({
                "protocolVersion": "2.0",
                "id": 1,
                "error": { "code": -32601, "message": "Method 'x' not found" }
            })
        );
    }

    #[test]
    fn dispatch_errors_map_to_domain_codes() {
        let not_found: RpcError = DispatchError::EngineNotFound("x".to_string()).into();
        let disabled: RpcError = DispatchError::EngineDisabled("x".to_string()).into();
        let empty: RpcError = DispatchError::EmptyQuery.into();
        assert_eq!(not_found.code(), ENGINE_NOT_FOUND);
        assert_eq!(disabled.code(), ENGINE_DISABLED);
        assert_eq!(empty.code(), INVALID_PARAMS);
    }

    #[test]
    fn params_bind_by_name() {
        #[derive(Deserialize)]
        struct Params {
            engine: String,
        }
        let params: Params = parse_params(json!({ "engine": "x" })).unwrap();
        assert_eq!(params.engine, "x");
        assert!(matches!(
            parse_params::<Params>(Value::Null),
            Err(RpcError::InvalidParams(_))
        ));
    }
}
