//! Tool invocation.
//!
//! Looks tools up by name, validates arguments against the declared
//! parameters and runs them. Panics inside a tool are caught here and come
//! back as [`ToolError::ExecutionFailed`] so a single bad tool cannot take a
//! run down.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::Instant;

use futures::FutureExt;
use tracing::{debug, warn};
use unillm_core::error::ToolError;
use unillm_core::tool::{ToolCall, ToolRegistry, ToolResult, validate_arguments};

/// Execute a single tool call.
pub async fn invoke(tools: &ToolRegistry, call: &ToolCall) -> Result<String, ToolError> {
    let tool = tools.get(&call.name).ok_or_else(|| ToolError::UnknownTool {
        name: call.name.clone(),
        call_id: call.id.clone(),
    })?;

    validate_arguments(tool.name(), tool.parameters(), &call.arguments)?;

    let start = Instant::now();
    let outcome = AssertUnwindSafe(tool.call(call.arguments.clone()))
        .catch_unwind()
        .await;
    let duration_ms = start.elapsed().as_millis() as u64;

    match outcome {
        Ok(result) => {
            debug!(
                tool = %call.name,
                call_id = %call.id,
                duration_ms,
                success = result.is_ok(),
                "Tool executed"
            );
            result
        }
        Err(payload) => {
            let reason = panic_message(payload.as_ref());
            warn!(tool = %call.name, call_id = %call.id, %reason, "Tool panicked");
            Err(ToolError::ExecutionFailed {
                tool_name: call.name.clone(),
                reason: format!("tool panicked: {reason}"),
            })
        }
    }
}

/// Execute every call in order, one at a time.
///
/// Always yields exactly one result per call, in the same order, each linked
/// back by `tool_call_id`. Failures become error-shaped results.
pub async fn call_tools(tools: &ToolRegistry, calls: &[ToolCall]) -> Vec<ToolResult> {
    let mut results = Vec::with_capacity(calls.len());
    for call in calls {
        let result = match invoke(tools, call).await {
            Ok(output) => ToolResult::success(call, output),
            Err(e) => {
                warn!(tool = %call.name, error = %e, "Tool execution failed");
                ToolResult::failure(call, &e)
            }
        };
        results.push(result);
    }
    results
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use unillm_core::tool::{FunctionTool, ToolArguments};

    fn registry() -> ToolRegistry {
        ToolRegistry::new()
            .with_tool(
                FunctionTool::new("get_weather")
                    .description("Current weather")
                    .string_parameter("city", "City name")
                    .using(|args| async move {
                        let city = args.get("city").and_then(|v| v.as_str()).unwrap_or_default();
                        Ok(format!("sunny in {city}"))
                    }),
            )
            .with_tool(
                FunctionTool::new("flaky")
                    .using(|_| async {
                        Err(ToolError::ExecutionFailed {
                            tool_name: "flaky".into(),
                            reason: "upstream offline".into(),
                        })
                    }),
            )
            .with_tool(FunctionTool::new("explode").using(|_| async {
                if true {
                    panic!("kaboom");
                }
                Ok(String::new())
            }))
    }

    fn call(id: &str, name: &str, args: serde_json::Value) -> ToolCall {
        let arguments: ToolArguments = args.as_object().cloned().unwrap_or_default();
        ToolCall::new(id, name, arguments)
    }

    #[tokio::test]
    async fn invokes_registered_tool() {
        let out = invoke(&registry(), &call("1", "get_weather", json!({"city": "Paris"})))
            .await
            .unwrap();
        assert_eq!(out, "sunny in Paris");
    }

    #[tokio::test]
    async fn unknown_tool_is_reported() {
        let err = invoke(&registry(), &call("c9", "launch_rockets", json!({})))
            .await
            .unwrap_err();
        match err {
            ToolError::UnknownTool { name, call_id } => {
                assert_eq!(name, "launch_rockets");
                assert_eq!(call_id, "c9");
            }
            other => panic!("expected UnknownTool, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn invalid_arguments_never_reach_tool() {
        let err = invoke(&registry(), &call("1", "get_weather", json!({"town": "Paris"})))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments { .. }));
    }

    #[tokio::test]
    async fn panicking_tool_is_caught() {
        let err = invoke(&registry(), &call("1", "explode", json!({})))
            .await
            .unwrap_err();
        match err {
            ToolError::ExecutionFailed { tool_name, reason } => {
                assert_eq!(tool_name, "explode");
                assert!(reason.contains("kaboom"));
            }
            other => panic!("expected ExecutionFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn results_keep_order_and_linkage() {
        let calls = vec![
            call("a", "flaky", json!({})),
            call("b", "get_weather", json!({"city": "Oslo"})),
            call("c", "missing", json!({})),
            call("d", "explode", json!({})),
        ];
        let results = call_tools(&registry(), &calls).await;

        let ids: Vec<_> = results.iter().map(|r| r.tool_call_id.as_str()).collect();
        assert_eq!(ids, ["a", "b", "c", "d"]);

        assert!(results[0].is_error);
        assert!(results[0].result.contains("upstream offline"));
        assert!(!results[1].is_error);
        assert_eq!(results[1].result, "sunny in Oslo");
        assert_eq!(results[1].args["city"], "Oslo");
        assert!(results[2].is_error);
        assert!(results[2].result.contains("not registered"));
        assert!(results[3].is_error);
        assert_eq!(results[3].tool_name, "explode");
    }
}
