//! ランナーストアの統合テスト

use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;
use uma_ocr_common::{RunnerRecord, DEFAULT_STAT_LABELS};
use uma_ocr_rust::error::UmaOcrError;
use uma_ocr_rust::store::{dedup_key, read_records, AppendOutcome, RunnerStore, StoreOptions};

fn labels() -> Vec<String> {
    DEFAULT_STAT_LABELS.iter().map(|s| s.to_string()).collect()
}

fn runner(name: &str, speed: u32) -> RunnerRecord {
    let mut record = RunnerRecord {
        name: name.to_string(),
        skills: vec!["Early Lead".into(), "Straightaway Acceleration".into()],
        source_image: format!("{}.png", name),
        ..Default::default()
    };
    record.stats.insert("Speed".into(), speed);
    record.stats.insert("Stamina".into(), 900);
    record
}

/// 同じレコードを2回追記しても1行
#[test]
fn test_append_twice_yields_one_row() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("runners.csv");
    let store = RunnerStore::open(&path, &labels(), StoreOptions::default()).unwrap();

    let record = runner("Special Week", 1200);
    assert_eq!(store.append(&record).unwrap(), AppendOutcome::Appended);
    assert_eq!(store.append(&record).unwrap(), AppendOutcome::Duplicate);

    let content = std::fs::read_to_string(&path).unwrap();
    assert_eq!(content.lines().count(), 2);
    assert_eq!(store.list().unwrap(), vec![record]);
}

/// 並列の追記も直列化され、重複は1行のみ
#[test]
fn test_concurrent_appends() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("runners.csv");
    let options = StoreOptions {
        max_retries: 10,
        backoff: Duration::from_millis(1),
    };
    let store = Arc::new(RunnerStore::open(&path, &labels(), options).unwrap());

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                // 偶数・奇数で2種類のレコード
                store.append(&runner("Special Week", 1200 + (i % 2))).unwrap()
            })
        })
        .collect();

    let appended = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|o| *o == AppendOutcome::Appended)
        .count();

    assert_eq!(appended, 2);
    assert_eq!(store.list().unwrap().len(), 2);
}

/// 別プロセスの追記（ファイル直接追記）も重複判定に反映される
#[test]
fn test_external_append_is_seen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("runners.csv");
    let store = RunnerStore::open(&path, &labels(), StoreOptions::default()).unwrap();
    store.append(&runner("Special Week", 1200)).unwrap();

    let other = RunnerStore::open(&path, &labels(), StoreOptions::default()).unwrap();
    other.append(&runner("Tokai Teio", 1100)).unwrap();

    assert_eq!(
        store.append(&runner("Tokai Teio", 1100)).unwrap(),
        AppendOutcome::Duplicate
    );
    let names: Vec<String> = read_records(&path).unwrap().into_iter().map(|r| r.name).collect();
    assert_eq!(names, vec!["Special Week", "Tokai Teio"]);
}

/// ロックが残っている場合は再試行後に競合エラー
#[test]
fn test_stale_lock_surfaces_conflict() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("runners.csv");
    let store = RunnerStore::open(
        &path,
        &labels(),
        StoreOptions {
            max_retries: 2,
            backoff: Duration::from_millis(1),
        },
    )
    .unwrap();
    std::fs::write(dir.path().join("runners.csv.lock"), "").unwrap();

    let err = store.append(&runner("Special Week", 1200)).unwrap_err();
    assert!(matches!(err, UmaOcrError::StoreWriteConflict(_)));
}

#[test]
fn test_dedup_key_ignores_order_and_case() {
    let a = runner("Special Week", 1200);
    let mut b = runner("SPECIAL  WEEK", 1200);
    b.skills.reverse();
    b.source_image = "elsewhere.png".into();
    assert_eq!(dedup_key(&a), dedup_key(&b));

    let c = runner("Special Week", 1201);
    assert_ne!(dedup_key(&a), dedup_key(&c));
    assert_eq!(dedup_key(&a).len(), 64);
}

#[test]
fn test_header_mismatch_is_schema_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("runners.csv");
    std::fs::write(&path, "Name,Speed,Stamina,Skills,SourceImage\n").unwrap();

    let err = RunnerStore::open(&path, &labels(), StoreOptions::default()).err().unwrap();
    assert!(matches!(err, UmaOcrError::StoreSchema(_)));
}
