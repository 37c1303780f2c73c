//! エラー型定義

use std::path::PathBuf;
use thiserror::Error;

/// 共通エラー型
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// カタログの必須ファイルが存在しない（起動時の致命的エラー）
    #[error("Catalog file missing: {}", .0.display())]
    CatalogMissing(PathBuf),

    /// カタログの内容が不正（起動時の致命的エラー）
    #[error("Catalog file malformed: {} (line {line}): {reason}", .path.display())]
    CatalogMalformed {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("Share link decode error: {0}")]
    ShareDecode(String),
}

impl Error {
    /// カタログ読み込み失敗かどうか
    pub fn is_catalog_load(&self) -> bool {
        matches!(self, Error::CatalogMissing(_) | Error::CatalogMalformed { .. })
    }
}

/// Result型エイリアス
pub type Result<T> = std::result::Result<T, Error>;
