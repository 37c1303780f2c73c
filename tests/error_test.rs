//! エラーケーステスト
//!
//! 各種エラー条件でのエラーハンドリングを検証

use std::path::{Path, PathBuf};
use tempfile::tempdir;
use uma_ocr_common::{Catalog, CatalogSources};
use uma_ocr_rust::error::UmaOcrError;
use uma_ocr_rust::{pipeline, scanner};

/// 存在しないフォルダをスキャンした場合
#[test]
fn test_scan_nonexistent_folder() {
    let result = scanner::scan_folder(Path::new("/nonexistent/path/12345"));
    assert!(result.is_err());

    let err = result.unwrap_err();
    assert!(matches!(err, UmaOcrError::FolderNotFound(_)));
}

/// OCR出力のないフォルダをスキャンした場合
#[test]
fn test_scan_folder_no_dumps() {
    let dir = tempdir().expect("Failed to create temp dir");
    std::fs::write(dir.path().join("test.txt"), "hello").unwrap();
    std::fs::write(dir.path().join("shot.png"), "png").unwrap();

    let result = scanner::scan_folder(dir.path());
    assert!(result.unwrap().is_empty());
}

/// カタログの必須ファイルがない場合は致命的エラー
#[test]
fn test_catalog_missing_is_fatal() {
    let dir = tempdir().unwrap();
    let result = Catalog::load(&CatalogSources::in_dir(dir.path()));
    let err: UmaOcrError = result.unwrap_err().into();

    assert!(err.is_fatal());
    assert!(matches!(
        err,
        UmaOcrError::Common(uma_ocr_common::Error::CatalogMissing(_))
    ));
}

/// スキル表が壊れている場合も致命的エラー
#[test]
fn test_catalog_malformed_is_fatal() {
    let dir = tempdir().unwrap();
    std::fs::write(dir.path().join("characters.txt"), "Special Week\n").unwrap();
    std::fs::write(dir.path().join("skillnames.json"), "{ not json").unwrap();

    let err: UmaOcrError = Catalog::load(&CatalogSources::in_dir(dir.path()))
        .unwrap_err()
        .into();
    assert!(err.is_fatal());
}

/// スクリーンショット単位・ストアのエラーは致命的ではない
#[test]
fn test_non_fatal_errors() {
    let errors = vec![
        UmaOcrError::InvalidScreenshot(PathBuf::from("a.json"), "bad".into()),
        UmaOcrError::StoreWriteConflict(PathBuf::from("runners.csv.lock")),
        UmaOcrError::StoreSchema("列が違う".into()),
        UmaOcrError::InvalidSelection("5 行目はありません".into()),
        UmaOcrError::Common(uma_ocr_common::Error::ShareDecode("base64".into())),
    ];
    for err in errors {
        assert!(!err.is_fatal(), "{:?}", err);
    }
}

/// UmaOcrErrorのDisplay実装確認
#[test]
fn test_error_display() {
    let errors = vec![
        UmaOcrError::Config("テスト設定エラー".to_string()),
        UmaOcrError::FileNotFound("shot.json".to_string()),
        UmaOcrError::FolderNotFound("/path/to/folder".to_string()),
        UmaOcrError::InvalidScreenshot(PathBuf::from("shot.json"), "EOF".into()),
        UmaOcrError::StoreWriteConflict(PathBuf::from("runners.csv.lock")),
        UmaOcrError::StoreSchema("ヘッダー".into()),
        UmaOcrError::InvalidSelection("範囲外".into()),
        UmaOcrError::CliExecution("中断".into()),
    ];

    for err in errors {
        let display = format!("{}", err);
        assert!(!display.is_empty(), "エラーメッセージが空: {:?}", err);
    }
}

#[test]
fn test_write_conflict_message_names_lock() {
    let err = UmaOcrError::StoreWriteConflict(PathBuf::from("data/runners.csv.lock"));
    assert!(err.to_string().contains("runners.csv.lock"));
}

#[test]
fn test_invalid_screenshot_message_names_path_and_reason() {
    let err = UmaOcrError::InvalidScreenshot(
        PathBuf::from("shots/special_week.json"),
        "expected value at line 1".into(),
    );
    assert_eq!(
        err.to_string(),
        "OCR出力の形式が不正: shots/special_week.json: expected value at line 1"
    );
}

/// IOエラーからの変換
#[test]
fn test_io_error_conversion() {
    let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
    let err: UmaOcrError = io_err.into();

    assert!(matches!(err, UmaOcrError::Io(_)));
    assert!(format!("{}", err).contains("IO"));
}

/// JSONエラーからの変換
#[test]
fn test_json_error_conversion() {
    let json_err = serde_json::from_str::<serde_json::Value>("{ invalid }").unwrap_err();
    let err: UmaOcrError = json_err.into();

    assert!(matches!(err, UmaOcrError::JsonParse(_)));
}

/// 透過的エラーなのでメッセージがそのまま表示される
#[test]
fn test_error_chain_transparent() {
    let common_err = uma_ocr_common::Error::ShareDecode("gzip".to_string());
    let expected = common_err.to_string();
    let err: UmaOcrError = common_err.into();

    assert_eq!(format!("{}", err), expected);
}

/// 不正なOCR出力はスクリーンショット単位のエラー
#[test]
fn test_invalid_dump_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("broken.json");
    std::fs::write(&path, "not json").unwrap();

    let err = pipeline::load_screenshot(&path).unwrap_err();
    match err {
        UmaOcrError::InvalidScreenshot(p, _) => assert_eq!(p, path),
        other => panic!("unexpected: {:?}", other),
    }
}
