use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum UmaOcrError {
    /// カタログ読み込み失敗（致命的）などの共通エラー
    #[error(transparent)]
    Common(#[from] uma_ocr_common::Error),

    #[error("設定エラー: {0}")]
    Config(String),

    #[error("ファイルが見つかりません: {0}")]
    FileNotFound(String),

    #[error("フォルダが見つかりません: {0}")]
    FolderNotFound(String),

    #[error("OCR出力の形式が不正: {}: {}", .0.display(), .1)]
    InvalidScreenshot(PathBuf, String),

    #[error("ストアへの書き込みが競合しました（ロック: {}）", .0.display())]
    StoreWriteConflict(PathBuf),

    #[error("ストアの列構成が不正: {0}")]
    StoreSchema(String),

    #[error("選択が不正: {0}")]
    InvalidSelection(String),

    #[error("JSON解析エラー: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("IOエラー: {0}")]
    Io(#[from] std::io::Error),

    #[error("CLI実行エラー: {0}")]
    CliExecution(String),
}

impl UmaOcrError {
    /// 起動を止めるべきエラーか（カタログ読み込み失敗のみ）
    pub fn is_fatal(&self) -> bool {
        matches!(self, UmaOcrError::Common(e) if e.is_catalog_load())
    }
}

pub type Result<T> = std::result::Result<T, UmaOcrError>;
