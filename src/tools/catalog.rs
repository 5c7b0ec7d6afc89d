//! 工具目录
//!
//! 目录协议返回 `{name, description, argSchema}` 列表；每个 Run 开始时取一次并缓存，
//! 取不到目录则规划无从谈起，Run 直接失败。

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 单个工具的描述与参数 Schema（JSON Schema 子集）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, rename = "argSchema")]
    pub arg_schema: Value,
}

/// 一次 Run 内缓存的工具目录：按名查找 + 生成 prompt 用的描述段落
#[derive(Debug, Clone, Default)]
pub struct ToolCatalog {
    tools: HashMap<String, ToolSpec>,
}

impl ToolCatalog {
    pub fn new(specs: Vec<ToolSpec>) -> Self {
        let tools = specs.into_iter().map(|s| (s.name.clone(), s)).collect();
        Self { tools }
    }

    pub fn get(&self, name: &str) -> Option<&ToolSpec> {
        self.tools.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// 工具名列表（排序，保证 prompt 稳定）
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// 生成 prompt 中的 Available tools 段落：`- name: description`
    pub fn descriptions_block(&self) -> String {
        self.names()
            .iter()
            .map(|n| {
                let desc = self.tools.get(n).map(|t| t.description.as_str()).unwrap_or("");
                format!("- {}: {}", n, desc)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}
