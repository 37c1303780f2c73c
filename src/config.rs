use crate::error::{Result, UmaOcrError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uma_ocr_common::ShareOptions;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// カタログディレクトリ（characters.txt, skillnames.json など）
    pub catalog_dir: PathBuf,
    /// ランナーCSVストア
    pub store_path: PathBuf,
    /// 照合の採用閾値（0.0-1.0）
    pub match_threshold: f64,
    /// これ未満の信頼度のフラグメントは無視
    pub min_fragment_confidence: f32,
    /// 書き込み競合時の再試行回数
    pub store_max_retries: u32,
    /// 再試行の初回待ち時間（倍々で増加）
    pub store_backoff_ms: u64,
    /// 共有リンクを連結するシミュレータURL
    pub simulator_base_url: String,
    /// UMA_OCR_LOG 未設定時のログレベル
    pub log_level: String,
    pub share: ShareOptions,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            catalog_dir: PathBuf::from("data/catalog"),
            store_path: PathBuf::from("data/runners.csv"),
            match_threshold: 0.6,
            min_fragment_confidence: 0.0,
            store_max_retries: 1,
            store_backoff_ms: 25,
            simulator_base_url: "https://alpha123.github.io/uma-tools/umalator-global/#".into(),
            log_level: "info".into(),
            share: ShareOptions::default(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: Config = serde_json::from_str(&content)?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| UmaOcrError::Config("ホームディレクトリが見つかりません".into()))?;
        Ok(home.join(".config").join("uma-ocr").join("config.json"))
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.match_threshold) {
            return Err(UmaOcrError::Config(format!(
                "match_threshold は0.0〜1.0で指定してください: {}",
                self.match_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.min_fragment_confidence) {
            return Err(UmaOcrError::Config(format!(
                "min_fragment_confidence は0.0〜1.0で指定してください: {}",
                self.min_fragment_confidence
            )));
        }
        Ok(())
    }
}
