//! task-completion 工具服务器的协议处理
//!
//! stdio 上的 MCP（JSON-RPC 2.0，协议版本 2024-11-05，每行一条消息）。只提供一个工具
//! complete_task(finalAnswer)，结果文本为 `TASK_COMPLETE:<finalAnswer>`，与事件流处理中的完成标记一致。

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::session::COMPLETION_MARKER;

pub const PROTOCOL_VERSION: &str = "2024-11-05";
pub const SERVER_NAME: &str = "task-completion";
pub const TOOL_NAME: &str = "complete_task";

const METHOD_NOT_FOUND: i64 = -32601;
const INVALID_PARAMS: i64 = -32602;

#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    #[serde(default)]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct JsonRpcResponse {
    pub jsonrpc: &'static str,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
}

impl JsonRpcResponse {
    fn ok(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: Some(result),
            error: None,
        }
    }

    fn err(id: Value, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(json!({ "code": code, "message": message.into() })),
        }
    }
}

/// complete_task 的返回文本
pub fn completion_result(final_answer: &str) -> String {
    format!("{COMPLETION_MARKER}{final_answer}")
}

fn tool_definition() -> Value {
    json!({
        "name": TOOL_NAME,
        "description": "Signal task completion and provide the final answer.",
        "inputSchema": {
            "type": "object",
            "properties": {
                "finalAnswer": {
                    "type": "string",
                    "description": "Your final answer/result for the task"
                }
            },
            "required": ["finalAnswer"]
        }
    })
}

/// 处理一条请求；通知（无 id）不回复
pub fn handle_request(request: &JsonRpcRequest) -> Option<JsonRpcResponse> {
    let id = request.id.clone()?;
    let response = match request.method.as_str() {
        "initialize" => JsonRpcResponse::ok(
            id,
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": { "tools": {} },
                "serverInfo": { "name": SERVER_NAME, "version": env!("CARGO_PKG_VERSION") }
            }),
        ),
        "ping" => JsonRpcResponse::ok(id, json!({})),
        "tools/list" => JsonRpcResponse::ok(id, json!({ "tools": [tool_definition()] })),
        "tools/call" => call_tool(id, request.params.as_ref()),
        other => JsonRpcResponse::err(id, METHOD_NOT_FOUND, format!("Method not found: {other}")),
    };
    Some(response)
}

fn call_tool(id: Value, params: Option<&Value>) -> JsonRpcResponse {
    let name = params
        .and_then(|p| p.get("name"))
        .and_then(Value::as_str)
        .unwrap_or_default();
    if name != TOOL_NAME {
        return JsonRpcResponse::err(id, INVALID_PARAMS, format!("Unknown tool: {name}"));
    }
    let answer = params
        .and_then(|p| p.get("arguments"))
        .and_then(|a| a.get("finalAnswer"));
    let answer = match answer {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => {
            return JsonRpcResponse::err(id, INVALID_PARAMS, "missing argument: finalAnswer");
        }
    };
    tracing::info!(answer = %answer, "complete_task called");
    JsonRpcResponse::ok(
        id,
        json!({
            "content": [{ "type": "text", "text": completion_result(&answer) }],
            "isError": false
        }),
    )
}

/// 处理一行原始输入；无法解析时返回 parse error（id 为 null）
pub fn handle_line(line: &str) -> Option<String> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let response = match serde_json::from_str::<JsonRpcRequest>(line) {
        Ok(request) => handle_request(&request)?,
        Err(e) => JsonRpcResponse::err(Value::Null, -32700, format!("Parse error: {e}")),
    };
    serde_json::to_string(&response).ok()
}
