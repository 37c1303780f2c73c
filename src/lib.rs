//! uma-ocr: OCR結果 → ランナーレコード → CSVストア → シミュレータ共有リンク

pub mod assembler;
pub mod cli;
pub mod config;
pub mod error;
pub mod matcher;
pub mod picker;
pub mod pipeline;
pub mod scanner;
pub mod store;
