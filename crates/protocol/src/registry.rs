//! Tool registry & dispatcher (C1).
//!
//! Grounded in `sa_gateway::skills::{Skill, SkillEngine}`: a trait per
//! callable unit plus a name-keyed registry that owns no orchestration
//! logic of its own. Here the trait is `Tool` (one per JSON-RPC method)
//! and the registry is [`ToolRegistry`].

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use reportdeck_domain::Error;

use crate::wire::{JsonRpcResponse, RpcId, METHOD_NOT_FOUND};

/// A single callable tool. `params` arrives already split out of the
/// envelope; `call` returns the JSON-RPC `result` payload or a domain
/// [`Error`] that the dispatcher translates to `-32000` (§4.1).
///
/// Implementations reject unknown parameters (forbid-extra schemas, per
/// §4.1) by using `#[serde(deny_unknown_fields)]` on their params struct.
#[async_trait]
pub trait Tool: Send + Sync {
    fn method_name(&self) -> &str;
    async fn call(&self, params: Value) -> Result<Value, Error>;
}

/// Name → handler table (§4.1). Construction is the only place tools are
/// wired up; the registry itself holds no state beyond the map.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    pub fn register(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.insert(tool.method_name().to_string(), tool);
        self
    }

    pub fn get(&self, method: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(method)
    }

    pub fn method_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// Dispatch one already-parsed request to its handler, producing a
    /// response that carries the request's `id` verbatim (§4.1).
    pub async fn dispatch(&self, id: RpcId, method: &str, params: Value) -> JsonRpcResponse {
        match self.tools.get(method) {
            None => JsonRpcResponse::err(
                id,
                METHOD_NOT_FOUND,
                format!("method not found: {method}"),
            ),
            Some(tool) => match tool.call(params).await {
                Ok(result) => JsonRpcResponse::ok(id, result),
                Err(err) => JsonRpcResponse::from_tool_error(id, &err),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Echo;

    #[async_trait]
    impl Tool for Echo {
        fn method_name(&self) -> &str {
            "echo"
        }
        async fn call(&self, params: Value) -> Result<Value, Error> {
            Ok(params)
        }
    }

    struct AlwaysFails;

    #[async_trait]
    impl Tool for AlwaysFails {
        fn method_name(&self) -> &str {
            "fail"
        }
        async fn call(&self, _params: Value) -> Result<Value, Error> {
            Err(Error::bad_request("no thanks"))
        }
    }

    #[tokio::test]
    async fn dispatch_routes_by_method_name() {
        let registry = ToolRegistry::new().register(Arc::new(Echo));
        let resp = registry
            .dispatch(RpcId::Number(1), "echo", json!({"a": 1}))
            .await;
        assert_eq!(resp.result, Some(json!({"a": 1})));
    }

    #[tokio::test]
    async fn unknown_method_is_method_not_found() {
        let registry = ToolRegistry::new().register(Arc::new(Echo));
        let resp = registry.dispatch(RpcId::Null, "nope", json!({})).await;
        assert_eq!(resp.error.unwrap().code, METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn tool_error_becomes_tool_error_envelope() {
        let registry = ToolRegistry::new().register(Arc::new(AlwaysFails));
        let resp = registry.dispatch(RpcId::Null, "fail", json!({})).await;
        let e = resp.error.unwrap();
        assert_eq!(e.code, crate::wire::TOOL_ERROR);
        assert_eq!(e.message, "BadRequest: no thanks");
    }
}
