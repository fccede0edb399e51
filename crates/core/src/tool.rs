//! Tool trait — callable capabilities the model can request.
//!
//! A tool declares a name, a description and a flat list of parameters.
//! The declared parameters drive both the JSON Schema sent upstream and the
//! validation applied to arguments before the tool is called.

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;

use crate::error::{ProviderError, ToolError};
use crate::provider::ToolDefinition;

/// Parsed tool arguments, always a JSON object.
pub type ToolArguments = serde_json::Map<String, serde_json::Value>;

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Provider-assigned call ID, echoed back in the matching [`ToolResult`]
    pub id: String,

    /// Name of the tool to execute
    pub name: String,

    /// Arguments as a JSON object
    #[serde(default)]
    pub arguments: ToolArguments,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: ToolArguments) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }

    /// Build a call from the string-encoded arguments most wire formats use.
    ///
    /// An empty string means "no arguments". Anything that is not a JSON
    /// object is a malformed upstream payload.
    pub fn from_raw(
        id: impl Into<String>,
        name: impl Into<String>,
        raw_arguments: &str,
    ) -> Result<Self, ProviderError> {
        let name = name.into();
        let arguments = if raw_arguments.trim().is_empty() {
            ToolArguments::new()
        } else {
            match serde_json::from_str::<serde_json::Value>(raw_arguments) {
                Ok(serde_json::Value::Object(map)) => map,
                Ok(other) => {
                    return Err(ProviderError::InvalidResponse(format!(
                        "arguments for tool call '{name}' are not an object: {other}"
                    )));
                }
                Err(e) => {
                    return Err(ProviderError::InvalidResponse(format!(
                        "arguments for tool call '{name}' are not valid JSON: {e}"
                    )));
                }
            }
        };
        Ok(Self {
            id: id.into(),
            name,
            arguments,
        })
    }

    /// Arguments re-encoded as a JSON string, for wire formats that want one.
    pub fn arguments_json(&self) -> String {
        serde_json::Value::Object(self.arguments.clone()).to_string()
    }
}

/// The outcome of one tool call, linked to it by `tool_call_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool_call_id: String,
    pub tool_name: String,
    #[serde(default)]
    pub args: ToolArguments,
    pub result: String,
    /// Set when `result` carries a failure description instead of output.
    #[serde(default)]
    pub is_error: bool,
}

impl ToolResult {
    pub fn success(call: &ToolCall, result: impl Into<String>) -> Self {
        Self {
            tool_call_id: call.id.clone(),
            tool_name: call.name.clone(),
            args: call.arguments.clone(),
            result: result.into(),
            is_error: false,
        }
    }

    pub fn failure(call: &ToolCall, error: &ToolError) -> Self {
        Self {
            tool_call_id: call.id.clone(),
            tool_name: call.name.clone(),
            args: call.arguments.clone(),
            result: format!("Error: {error}"),
            is_error: true,
        }
    }
}

/// The JSON type a parameter accepts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "type", content = "options")]
pub enum ParameterKind {
    String,
    Number,
    Integer,
    Boolean,
    Array,
    Object,
    /// A string restricted to the listed values.
    Enum(Vec<String>),
}

impl ParameterKind {
    fn schema_type(&self) -> &'static str {
        match self {
            Self::String | Self::Enum(_) => "string",
            Self::Number => "number",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::Array => "array",
            Self::Object => "object",
        }
    }

    fn accepts(&self, value: &serde_json::Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Boolean => value.is_boolean(),
            Self::Array => value.is_array(),
            Self::Object => value.is_object(),
            Self::Enum(options) => value
                .as_str()
                .is_some_and(|v| options.iter().any(|o| o == v)),
        }
    }
}

/// A single declared tool parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolParameter {
    pub name: String,
    pub kind: ParameterKind,
    pub description: String,
    #[serde(default = "default_required")]
    pub required: bool,
}

fn default_required() -> bool {
    true
}

impl ToolParameter {
    pub fn new(name: impl Into<String>, kind: ParameterKind, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            description: description.into(),
            required: true,
        }
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }
}

/// Build the JSON Schema object for a parameter list.
pub fn parameters_schema(parameters: &[ToolParameter]) -> serde_json::Value {
    let mut properties = serde_json::Map::new();
    for p in parameters {
        let mut prop = serde_json::json!({
            "type": p.kind.schema_type(),
            "description": p.description,
        });
        if let ParameterKind::Enum(options) = &p.kind {
            prop["enum"] = serde_json::json!(options);
        }
        properties.insert(p.name.clone(), prop);
    }
    let required: Vec<&str> = parameters
        .iter()
        .filter(|p| p.required)
        .map(|p| p.name.as_str())
        .collect();

    serde_json::json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

/// Check arguments against a declared parameter list.
///
/// Rejects missing required parameters, parameters that were never declared,
/// and values of the wrong JSON type. `null` is accepted for optional ones.
pub fn validate_arguments(
    tool_name: &str,
    parameters: &[ToolParameter],
    arguments: &ToolArguments,
) -> Result<(), ToolError> {
    let invalid = |reason: String| ToolError::InvalidArguments {
        tool_name: tool_name.to_string(),
        reason,
    };

    for p in parameters {
        match arguments.get(&p.name) {
            None if p.required => {
                return Err(invalid(format!("missing required parameter '{}'", p.name)));
            }
            None => {}
            Some(serde_json::Value::Null) if !p.required => {}
            Some(value) if !p.kind.accepts(value) => {
                return Err(invalid(format!(
                    "parameter '{}' expects {}, got {value}",
                    p.name,
                    p.kind.schema_type()
                )));
            }
            Some(_) => {}
        }
    }

    if let Some(extra) = arguments
        .keys()
        .find(|k| !parameters.iter().any(|p| &p.name == *k))
    {
        return Err(invalid(format!("unknown parameter '{extra}'")));
    }

    Ok(())
}

/// The core Tool trait.
///
/// Tools are registered in a [`ToolRegistry`] and exposed to the model on
/// every step of a generation run.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "get_weather").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the model).
    fn description(&self) -> &str;

    /// Declared parameters, in declaration order.
    fn parameters(&self) -> &[ToolParameter];

    /// Execute the tool with already-validated arguments.
    async fn call(&self, arguments: ToolArguments) -> Result<String, ToolError>;

    /// Convert this tool into a ToolDefinition for sending to the model.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: parameters_schema(self.parameters()),
        }
    }
}

type ToolFn = Arc<dyn Fn(ToolArguments) -> BoxFuture<'static, Result<String, ToolError>> + Send + Sync>;

/// A tool backed by an async closure.
///
/// ```ignore
/// let weather = FunctionTool::new("get_weather")
///     .description("Current weather for a city")
///     .string_parameter("city", "City name")
///     .using(|args| async move { Ok("sunny".to_string()) });
/// ```
#[derive(Clone)]
pub struct FunctionTool {
    name: String,
    description: String,
    parameters: Vec<ToolParameter>,
    handler: ToolFn,
}

impl FunctionTool {
    #[allow(clippy::new_ret_no_self)]
    pub fn new(name: impl Into<String>) -> FunctionToolBuilder {
        FunctionToolBuilder {
            name: name.into(),
            description: String::new(),
            parameters: Vec::new(),
        }
    }
}

impl std::fmt::Debug for FunctionTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionTool")
            .field("name", &self.name)
            .field("parameters", &self.parameters)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Tool for FunctionTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters(&self) -> &[ToolParameter] {
        &self.parameters
    }

    async fn call(&self, arguments: ToolArguments) -> Result<String, ToolError> {
        (self.handler)(arguments).await
    }
}

#[derive(Debug, Clone)]
pub struct FunctionToolBuilder {
    name: String,
    description: String,
    parameters: Vec<ToolParameter>,
}

impl FunctionToolBuilder {
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn parameter(mut self, parameter: ToolParameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    pub fn string_parameter(self, name: impl Into<String>, description: impl Into<String>) -> Self {
        self.parameter(ToolParameter::new(name, ParameterKind::String, description))
    }

    pub fn number_parameter(self, name: impl Into<String>, description: impl Into<String>) -> Self {
        self.parameter(ToolParameter::new(name, ParameterKind::Number, description))
    }

    pub fn boolean_parameter(self, name: impl Into<String>, description: impl Into<String>) -> Self {
        self.parameter(ToolParameter::new(name, ParameterKind::Boolean, description))
    }

    pub fn enum_parameter(
        self,
        name: impl Into<String>,
        description: impl Into<String>,
        options: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        let options = options.into_iter().map(Into::into).collect();
        self.parameter(ToolParameter::new(name, ParameterKind::Enum(options), description))
    }

    /// Mark the most recently added parameter as optional.
    pub fn optional(mut self) -> Self {
        if let Some(last) = self.parameters.last_mut() {
            last.required = false;
        }
        self
    }

    /// Attach the handler and finish the tool.
    pub fn using<F, Fut>(self, handler: F) -> FunctionTool
    where
        F: Fn(ToolArguments) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String, ToolError>> + Send + 'static,
    {
        FunctionTool {
            name: self.name,
            description: self.description,
            parameters: self.parameters,
            handler: Arc::new(move |args| Box::pin(handler(args))),
        }
    }
}

/// A registry of available tools.
///
/// Clones share the underlying tools. Definitions are reported in
/// registration order so requests are stable across runs.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.register_arc(Arc::new(tool));
    }

    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        match self.tools.iter().position(|t| t.name() == tool.name()) {
            Some(i) => self.tools[i] = tool,
            None => self.tools.push(tool),
        }
    }

    pub fn with_tool(mut self, tool: impl Tool + 'static) -> Self {
        self.register(tool);
        self
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name).cloned()
    }

    /// Get all tool definitions (for sending to the model).
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.to_definition()).collect()
    }

    /// List all registered tool names.
    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn echo_tool() -> FunctionTool {
        FunctionTool::new("echo")
            .description("Echoes back the input")
            .string_parameter("text", "Text to echo")
            .boolean_parameter("shout", "Uppercase the output")
            .optional()
            .using(|args| async move {
                let text = args.get("text").and_then(|v| v.as_str()).unwrap_or("");
                Ok(text.to_string())
            })
    }

    fn args(value: serde_json::Value) -> ToolArguments {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn registry_register_and_lookup() {
        let registry = ToolRegistry::new().with_tool(echo_tool());
        assert!(registry.get("echo").is_some());
        assert!(registry.get("nonexistent").is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn registry_replaces_same_name() {
        let mut registry = ToolRegistry::new();
        registry.register(echo_tool());
        registry.register(
            FunctionTool::new("echo")
                .description("second")
                .using(|_| async { Ok(String::new()) }),
        );
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("echo").unwrap().description(), "second");
    }

    #[test]
    fn definitions_carry_schema() {
        let registry = ToolRegistry::new().with_tool(echo_tool());
        let defs = registry.definitions();
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].name, "echo");
        assert_eq!(defs[0].parameters["type"], "object");
        assert_eq!(defs[0].parameters["properties"]["text"]["type"], "string");
        assert_eq!(defs[0].parameters["required"], json!(["text"]));
    }

    #[test]
    fn enum_parameter_lists_options() {
        let tool = FunctionTool::new("unit")
            .enum_parameter("unit", "Temperature unit", ["celsius", "fahrenheit"])
            .using(|_| async { Ok(String::new()) });
        let schema = tool.to_definition().parameters;
        assert_eq!(schema["properties"]["unit"]["enum"], json!(["celsius", "fahrenheit"]));

        let err = validate_arguments("unit", tool.parameters(), &args(json!({"unit": "kelvin"})));
        assert!(matches!(err, Err(ToolError::InvalidArguments { .. })));
    }

    #[test]
    fn validation_rejects_missing_extra_and_mistyped() {
        let tool = echo_tool();
        let params = tool.parameters();

        assert!(validate_arguments("echo", params, &args(json!({"text": "hi"}))).is_ok());
        assert!(validate_arguments("echo", params, &args(json!({"text": "hi", "shout": null}))).is_ok());

        let missing = validate_arguments("echo", params, &args(json!({}))).unwrap_err();
        assert!(missing.to_string().contains("missing required parameter 'text'"));

        let extra =
            validate_arguments("echo", params, &args(json!({"text": "hi", "volume": 3}))).unwrap_err();
        assert!(extra.to_string().contains("unknown parameter 'volume'"));

        let mistyped = validate_arguments("echo", params, &args(json!({"text": 42}))).unwrap_err();
        assert!(mistyped.to_string().contains("expects string"));
    }

    #[test]
    fn raw_arguments_parse() {
        let call = ToolCall::from_raw("1", "get_weather", r#"{"city":"Paris"}"#).unwrap();
        assert_eq!(call.arguments["city"], "Paris");

        let empty = ToolCall::from_raw("2", "now", "").unwrap();
        assert!(empty.arguments.is_empty());

        let broken = ToolCall::from_raw("3", "get_weather", "{city: Paris").unwrap_err();
        assert!(matches!(broken, ProviderError::InvalidResponse(_)));

        let not_object = ToolCall::from_raw("4", "get_weather", "[1,2]").unwrap_err();
        assert!(not_object.to_string().contains("not an object"));
    }

    #[test]
    fn failure_result_is_error_shaped() {
        let call = ToolCall::new("call_7", "echo", ToolArguments::new());
        let err = ToolError::ExecutionFailed {
            tool_name: "echo".into(),
            reason: "boom".into(),
        };
        let result = ToolResult::failure(&call, &err);
        assert!(result.is_error);
        assert_eq!(result.tool_call_id, "call_7");
        assert!(result.result.starts_with("Error: "));
        assert!(result.result.contains("boom"));
    }

    #[tokio::test]
    async fn function_tool_calls_handler() {
        let tool = echo_tool();
        let out = tool.call(args(json!({"text": "hello world"}))).await.unwrap();
        assert_eq!(out, "hello world");
    }
}
