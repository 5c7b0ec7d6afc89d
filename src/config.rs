//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `HIVE__*` 覆盖（双下划线表示嵌套，
//! 如 `HIVE__INFERENCE__MODEL=llama3.2:3b`）。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub orchestrator: OrchestratorSection,
    pub inference: InferenceSection,
    pub tools: ToolsSection,
    pub memory: MemorySection,
    pub server: ServerSection,
}

/// [orchestrator] 段：循环上限与历史注入
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OrchestratorSection {
    /// 重规划（Planning 进入次数）上限，达到后 Run 以 ReplanBudgetExhausted 失败
    pub max_replan_cycles: u32,
    /// 规划时注入的历史记录条数上限
    pub max_history_records: usize,
}

impl Default for OrchestratorSection {
    fn default() -> Self {
        Self {
            max_replan_cycles: 5,
            max_history_records: 5,
        }
    }
}

/// [inference] 段：推理引擎端点与超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InferenceSection {
    /// 后端：ollama / mock（mock 仅用于本地联调）
    pub provider: String,
    pub base_url: String,
    pub model: String,
    /// 单次生成请求超时（秒）
    pub request_timeout_secs: u64,
}

impl Default for InferenceSection {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            base_url: "http://localhost:11434".to_string(),
            model: "llama3.2:3b".to_string(),
            request_timeout_secs: 60,
        }
    }
}

/// [tools] 段：执行服务端点、调用超时与并发上限
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    /// 工具执行服务（目录 + 调用）基地址
    pub service_url: String,
    /// 单次工具调用超时（秒），桥在服务自身限制之上再施加一层
    pub tool_timeout_secs: u64,
    /// 副作用类工具（容器控制、写文件）并发上限
    pub side_effect_limit: usize,
    /// 只读类工具并发上限
    pub read_only_limit: usize,
    /// 归入副作用类的工具名；未列出的工具走只读上限
    pub side_effect: Vec<String>,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            service_url: "http://localhost:8001".to_string(),
            tool_timeout_secs: 30,
            side_effect_limit: 2,
            read_only_limit: 4,
            side_effect: vec![
                "docker_exec_command".to_string(),
                "filesystem_write".to_string(),
            ],
        }
    }
}

/// [memory] 段：记忆库文件位置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MemorySection {
    pub db_path: PathBuf,
}

impl Default for MemorySection {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./data/hive_memory.db"),
        }
    }
}

/// [server] 段：HTTP 入口监听地址
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

/// 加载配置：TOML 文件（config/default.toml 或显式路径）+ `HIVE__*` 环境变量覆盖
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("HIVE")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.orchestrator.max_replan_cycles, 5);
        assert_eq!(cfg.tools.side_effect_limit, 2);
        assert!(cfg
            .tools
            .side_effect
            .iter()
            .any(|t| t == "docker_exec_command"));
        assert_eq!(cfg.server.port, 8000);
    }

    #[test]
    fn test_toml_overrides_defaults() {
        let toml = r#"
            [orchestrator]
            max_replan_cycles = 3

            [tools]
            read_only_limit = 8
        "#;
        let cfg: AppConfig = config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        assert_eq!(cfg.orchestrator.max_replan_cycles, 3);
        assert_eq!(cfg.tools.read_only_limit, 8);
        // 未覆盖的段保持默认
        assert_eq!(cfg.inference.model, "llama3.2:3b");
    }
}
