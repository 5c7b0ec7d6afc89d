//! 参数校验与计划步骤格式 Schema
//!
//! validate_args 按工具声明的 argSchema（JSON Schema 子集：object + properties/required/type）
//! 在发起网络调用前拦截缺字段、类型不符的参数；plan_step_schema_json 用 schemars
//! 生成「合法计划步骤」的 JSON 结构，注入规划 prompt 减少模型输出格式错误。

use std::collections::HashMap;

use schemars::{schema_for, JsonSchema};
use serde_json::Value;

use crate::tools::ToolSpec;

/// 计划步骤格式：与规划解析的 `[{"description", "tool", "args"}]` 一致（仅用于 Schema 生成）
#[allow(dead_code)]
#[derive(JsonSchema)]
struct PlanStepFormat {
    /// 这一步做什么（自然语言）
    pub description: String,
    /// 工具名，必须出自目录
    pub tool: String,
    /// 工具参数，依工具的 argSchema 而定
    pub args: HashMap<String, String>,
}

/// 返回计划步骤的 JSON Schema 字符串，可拼入规划 prompt
pub fn plan_step_schema_json() -> String {
    let schema = schema_for!(PlanStepFormat);
    serde_json::to_string_pretty(&schema).unwrap_or_else(|_| String::new())
}

fn type_matches(expected: &str, value: &Value) -> bool {
    match expected {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        // 未知类型声明不拦截
        _ => true,
    }
}

/// 按工具声明的 argSchema 校验参数；通过返回 Ok，否则返回拒绝原因
pub fn validate_args(spec: &ToolSpec, args: &Value) -> Result<(), String> {
    let schema = match spec.arg_schema.as_object() {
        Some(s) => s,
        // 未声明 schema 的工具不校验
        None => return Ok(()),
    };

    let empty = serde_json::Map::new();
    let args_obj = match args {
        Value::Object(m) => m,
        Value::Null => &empty,
        _ => return Err(format!("args must be a JSON object, got {}", json_type_name(args))),
    };

    if let Some(required) = schema.get("required").and_then(|r| r.as_array()) {
        for field in required.iter().filter_map(|f| f.as_str()) {
            if !args_obj.contains_key(field) {
                return Err(format!("missing required field: {field}"));
            }
        }
    }

    if let Some(props) = schema.get("properties").and_then(|p| p.as_object()) {
        for (key, value) in args_obj {
            if let Some(expected) = props
                .get(key)
                .and_then(|p| p.get("type"))
                .and_then(|t| t.as_str())
            {
                if !type_matches(expected, value) {
                    return Err(format!(
                        "field {key} expects {expected}, got {}",
                        json_type_name(value)
                    ));
                }
            }
        }
    }

    Ok(())
}

fn json_type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn read_spec() -> ToolSpec {
        ToolSpec {
            name: "filesystem_read".to_string(),
            description: "Read contents of a file".to_string(),
            arg_schema: json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string"},
                    "limit": {"type": "integer"}
                },
                "required": ["path"]
            }),
        }
    }

    #[test]
    fn test_valid_args_pass() {
        let spec = read_spec();
        assert!(validate_args(&spec, &json!({"path": "/etc/hosts"})).is_ok());
        assert!(validate_args(&spec, &json!({"path": "/tmp/a", "limit": 10})).is_ok());
    }

    #[test]
    fn test_missing_required_rejected() {
        let spec = read_spec();
        let err = validate_args(&spec, &json!({})).unwrap_err();
        assert!(err.contains("path"));
    }

    #[test]
    fn test_wrong_type_rejected() {
        let spec = read_spec();
        let err = validate_args(&spec, &json!({"path": 42})).unwrap_err();
        assert!(err.contains("string"));
        let err = validate_args(&spec, &json!({"path": "/a", "limit": "ten"})).unwrap_err();
        assert!(err.contains("integer"));
    }

    #[test]
    fn test_non_object_args_rejected() {
        let spec = read_spec();
        assert!(validate_args(&spec, &json!([1, 2])).is_err());
    }

    #[test]
    fn test_no_schema_accepts_anything() {
        let spec = ToolSpec {
            name: "docker_list_containers".to_string(),
            description: String::new(),
            arg_schema: Value::Null,
        };
        assert!(validate_args(&spec, &json!({"whatever": true})).is_ok());
    }

    #[test]
    fn test_null_args_ok_when_nothing_required() {
        let spec = ToolSpec {
            name: "docker_list_containers".to_string(),
            description: String::new(),
            arg_schema: json!({"type": "object", "properties": {}, "required": []}),
        };
        assert!(validate_args(&spec, &Value::Null).is_ok());
    }

    #[test]
    fn test_plan_step_schema_mentions_fields() {
        let s = plan_step_schema_json();
        assert!(s.contains("description"));
        assert!(s.contains("tool"));
        assert!(s.contains("args"));
    }
}
