//! 引擎設定
//!
//! 載入順序：內建預設 → `mrp.toml` → `MRP_` 前綴環境變數（`__` 分隔層級），
//! 啟動時先讀取 `.env`。

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("載入設定失敗: {0}")]
    Load(#[from] figment::Error),
}

/// 資料庫設定
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseSettings {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    10
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: "postgres://localhost/erp".to_string(),
            max_connections: default_max_connections(),
        }
    }
}

/// 日誌設定
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetrySettings {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// 以 JSON 格式輸出
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json: false,
        }
    }
}

/// 計算引擎設定
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// 失敗訊息最大字元數
    pub error_message_limit: usize,
    pub bom_max_depth: usize,
    pub snapshot_list_limit: u64,
    pub recalc_history_limit: u64,
    /// 委外缺供應商且允許草稿時使用的佔位供應商
    pub placeholder_supplier_name: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            error_message_limit: 2000,
            bom_max_depth: mrp_calc::DEFAULT_MAX_DEPTH,
            snapshot_list_limit: 20,
            recalc_history_limit: 50,
            placeholder_supplier_name: "待指定".to_string(),
        }
    }
}

/// 全部設定
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineSettings {
    #[serde(default)]
    pub database: DatabaseSettings,
    #[serde(default)]
    pub telemetry: TelemetrySettings,
    #[serde(default)]
    pub engine: EngineConfig,
}

impl EngineSettings {
    /// 從 `mrp.toml` 與環境變數載入
    pub fn load() -> Result<Self, SettingsError> {
        let _ = dotenvy::dotenv();
        Self::load_from("mrp.toml")
    }

    /// 從指定設定檔與環境變數載入；檔案不存在時只用預設值與環境變數
    pub fn load_from(path: &str) -> Result<Self, SettingsError> {
        let settings = Self::figment(path).extract()?;
        Ok(settings)
    }

    fn figment(path: &str) -> Figment {
        Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("MRP_").split("__"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_file() {
        let settings = EngineSettings::load_from("definitely-missing-mrp.toml").unwrap();

        assert_eq!(settings.engine.error_message_limit, 2000);
        assert_eq!(settings.engine.bom_max_depth, 10);
        assert_eq!(settings.engine.snapshot_list_limit, 20);
        assert_eq!(settings.engine.recalc_history_limit, 50);
        assert_eq!(settings.engine.placeholder_supplier_name, "待指定");
    }

    #[test]
    fn test_toml_overrides_defaults() {
        let figment = Figment::from(Serialized::defaults(EngineSettings::default())).merge(
            Toml::string(
                r#"
                [engine]
                bom_max_depth = 4

                [telemetry]
                json = true
                "#,
            ),
        );
        let settings: EngineSettings = figment.extract().unwrap();

        assert_eq!(settings.engine.bom_max_depth, 4);
        assert_eq!(settings.engine.error_message_limit, 2000);
        assert!(settings.telemetry.json);
        assert_eq!(settings.database.max_connections, 10);
    }
}
