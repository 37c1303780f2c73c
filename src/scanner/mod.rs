//! OCR出力ファイルの収集と処理済みファイルの退避

use crate::error::{Result, UmaOcrError};
use chrono::Local;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// 処理済みファイルの退避先フォルダ名
pub const PROCESSED_DIR: &str = "processed";

const DUMP_EXTENSIONS: &[&str] = &["json", "JSON"];

/// フォルダ直下のOCR出力（*.json）をファイル名順で返す
pub fn scan_folder(folder: &Path) -> Result<Vec<PathBuf>> {
    if !folder.exists() {
        return Err(UmaOcrError::FolderNotFound(folder.display().to_string()));
    }

    let mut dumps: Vec<PathBuf> = WalkDir::new(folder)
        .max_depth(1) // 直下のみ（processed/ は見ない）
        .into_iter()
        .filter_map(|e| e.ok())
        .map(|e| e.into_path())
        .filter(|p| p.is_file() && is_dump_file(p))
        .collect();

    dumps.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(dumps)
}

/// 引数のパス群を入力ファイル一覧に展開（フォルダは直下のみ、指定順を保持）
pub fn collect_inputs(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut inputs = Vec::new();
    for path in paths {
        if path.is_dir() {
            inputs.extend(scan_folder(path)?);
        } else if path.is_file() {
            inputs.push(path.clone());
        } else {
            return Err(UmaOcrError::FileNotFound(path.display().to_string()));
        }
    }
    Ok(inputs)
}

fn is_dump_file(path: &Path) -> bool {
    path.extension()
        .map(|ext| DUMP_EXTENSIONS.iter().any(|&e| e == ext.to_string_lossy()))
        .unwrap_or(false)
}

/// 処理済みファイルを同じフォルダの processed/ へ移動
///
/// 同名ファイルがあれば日時を前置する
pub fn archive_processed(path: &Path) -> Result<PathBuf> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let dest_dir = parent.join(PROCESSED_DIR);
    std::fs::create_dir_all(&dest_dir)?;

    let file_name = path
        .file_name()
        .ok_or_else(|| UmaOcrError::FileNotFound(path.display().to_string()))?
        .to_string_lossy()
        .to_string();

    let mut dest = dest_dir.join(&file_name);
    if dest.exists() {
        let stamp = Local::now().format("%Y%m%d_%H%M%S%3f");
        dest = dest_dir.join(format!("{}_{}", stamp, file_name));
    }

    std::fs::rename(path, &dest)?;
    Ok(dest)
}
