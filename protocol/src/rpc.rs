//! JSON-RPC envelope.
//!
//! Requests are sent as `{"method": ..., "params": {...}}` with the access token
//! injected into `params.token`. Responses carry an `error` object (a non-zero
//! `code` means failure) and a `result` whose shape depends on the method.

use {
    crate::credentials::AccessToken,
    serde::{Deserialize, Serialize},
    serde_json::{Map, Value},
};

#[derive(Serialize)]
pub struct RpcRequest<'a, P> {
    pub method: &'a str,
    pub params: P,
}

/// Typed params with the token added next to the request's own fields.
#[derive(Serialize)]
pub struct WithToken<'a, P> {
    pub token: &'a str,
    #[serde(flatten)]
    pub params: &'a P,
}

impl<'a, P: Serialize> RpcRequest<'a, WithToken<'a, P>> {
    #[inline]
    pub fn new(method: &'a str, token: &'a AccessToken, params: &'a P) -> Self {
        Self {
            method,
            params: WithToken {
                token: token.as_unmasked_str(),
                params,
            },
        }
    }
}

impl<'a> RpcRequest<'a, Map<String, Value>> {
    /// Untyped request. A `token` already present in `params` takes precedence.
    #[inline]
    pub fn raw(method: &'a str, token: &AccessToken, mut params: Map<String, Value>) -> Self {
        if !params.contains_key("token") {
            params.insert(
                "token".to_owned(),
                Value::String(token.as_unmasked_str().to_owned()),
            );
        }
        Self { method, params }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcError {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
}

/// Envelope decoded before the method-specific result.
#[derive(Debug, Default, Deserialize)]
pub struct RpcResponse {
    #[serde(default)]
    pub error: Option<RpcError>,
    #[serde(default)]
    pub result: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseError {
    Server(RpcError),
    MissingResult,
}

impl RpcResponse {
    /// Returns the raw result, or the server error if its code is non-zero.
    #[inline]
    pub fn into_result(self) -> Result<Value, ResponseError> {
        if let Some(error) = self.error {
            if error.code != 0 {
                return Err(ResponseError::Server(error));
            }
        }
        match self.result {
            None | Some(Value::Null) => Err(ResponseError::MissingResult),
            Some(value) => Ok(value),
        }
    }
}
