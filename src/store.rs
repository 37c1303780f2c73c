//! ランナーCSVストア
//!
//! 追記専用。1行1レコード、列は `Name, <ステータス名...>, Skills, SourceImage`。
//! 同じ内容（名前・ステータス・スキル）のレコードは2度書かない。
//!
//! 書き込みはプロセス内の Mutex と、ストア横の `.lock` ファイルで直列化する。
//! 読み出し（`list`）は毎回ファイルを読み直すスナップショット。

use crate::error::{Result, UmaOcrError};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, error, warn};
use uma_ocr_common::{normalize, RunnerRecord};

pub const NAME_COLUMN: &str = "Name";
pub const SKILLS_COLUMN: &str = "Skills";
pub const SOURCE_COLUMN: &str = "SourceImage";
/// スキル列の区切り
pub const SKILL_DELIMITER: char = '|';

/// 追記結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    Appended,
    /// 同じ内容が既にある（何もしない）
    Duplicate,
}

#[derive(Debug, Clone, Copy)]
pub struct StoreOptions {
    /// ロック取得の再試行回数
    pub max_retries: u32,
    /// 初回の待ち時間（倍々、8倍で頭打ち）
    pub backoff: Duration,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            max_retries: 1,
            backoff: Duration::from_millis(25),
        }
    }
}

#[derive(Debug, Default)]
struct StoreState {
    keys: HashSet<String>,
    /// 最後にキーを読み込んだ時点のファイル長
    known_len: Option<u64>,
}

pub struct RunnerStore {
    path: PathBuf,
    header: Vec<String>,
    stat_labels: Vec<String>,
    options: StoreOptions,
    state: Mutex<StoreState>,
}

impl RunnerStore {
    /// ストアを開く（ファイルがなければ最初の追記時に作成）
    ///
    /// 既存ファイルのヘッダーがステータス構成と異なる場合はエラー
    pub fn open(path: &Path, stat_labels: &[String], options: StoreOptions) -> Result<Self> {
        let header = build_header(stat_labels);

        if let Some(existing) = read_header(path)? {
            if existing != header {
                return Err(UmaOcrError::StoreSchema(format!(
                    "{} のヘッダーが一致しません（期待: {} / 実際: {}）",
                    path.display(),
                    header.join(","),
                    existing.join(",")
                )));
            }
        }

        Ok(Self {
            path: path.to_path_buf(),
            header,
            stat_labels: stat_labels.to_vec(),
            options,
            state: Mutex::new(StoreState::default()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// レコードを追記する（同内容が既にあれば何もしない）
    pub fn append(&self, record: &RunnerRecord) -> Result<AppendOutcome> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| UmaOcrError::StoreWriteConflict(self.lock_path()))?;
        let _lock = self.acquire_lock()?;

        self.refresh_keys(&mut state)?;

        let key = dedup_key(record);
        if state.keys.contains(&key) {
            debug!(name = %record.name, source = %record.source_image, "重複のため追記しない");
            return Ok(AppendOutcome::Duplicate);
        }

        let needs_header = std::fs::metadata(&self.path).map(|m| m.len() == 0).unwrap_or(true);
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;

        let mut text = String::new();
        if needs_header {
            text.push_str(&format_row(&self.header));
        }
        text.push_str(&format_row(&self.record_row(record)));
        file.write_all(text.as_bytes())?;
        file.flush()?;

        state.keys.insert(key);
        state.known_len = Some(file.metadata()?.len());
        Ok(AppendOutcome::Appended)
    }

    /// 全レコードを挿入順に返す
    pub fn list(&self) -> Result<Vec<RunnerRecord>> {
        read_records(&self.path)
    }

    fn record_row(&self, record: &RunnerRecord) -> Vec<String> {
        let mut row = Vec::with_capacity(self.header.len());
        row.push(record.name.clone());
        for label in &self.stat_labels {
            row.push(record.stat(label).map(|v| v.to_string()).unwrap_or_default());
        }
        row.push(record.skills.join(&SKILL_DELIMITER.to_string()));
        row.push(record.source_image.clone());
        row
    }

    /// 別プロセスの追記があればキーを読み直す
    fn refresh_keys(&self, state: &mut StoreState) -> Result<()> {
        let len = std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0);
        if state.known_len == Some(len) {
            return Ok(());
        }
        state.keys = read_records(&self.path)?.iter().map(dedup_key).collect();
        state.known_len = Some(len);
        Ok(())
    }

    fn lock_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".lock");
        self.path.with_file_name(name)
    }

    /// ロックファイルを取得（競合時は待って再試行、上限で諦める）
    fn acquire_lock(&self) -> Result<LockGuard> {
        let lock_path = self.lock_path();
        if let Some(parent) = lock_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let mut attempt = 0;
        loop {
            match OpenOptions::new().write(true).create_new(true).open(&lock_path) {
                Ok(_) => return Ok(LockGuard { path: lock_path }),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    if attempt >= self.options.max_retries {
                        error!(lock = %lock_path.display(), "ストアのロックを取得できません");
                        return Err(UmaOcrError::StoreWriteConflict(lock_path));
                    }
                    let wait = backoff_delay(self.options.backoff, attempt);
                    warn!(lock = %lock_path.display(), ?wait, "ストアのロック待ち");
                    std::thread::sleep(wait);
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// 指数バックオフ（基準値の8倍で頭打ち）
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base * 2u32.pow(attempt.min(3))
}

/// 保持中のロックファイル（破棄時に削除）
struct LockGuard {
    path: PathBuf,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

pub fn build_header(stat_labels: &[String]) -> Vec<String> {
    let mut header = vec![NAME_COLUMN.to_string()];
    header.extend(stat_labels.iter().cloned());
    header.push(SKILLS_COLUMN.to_string());
    header.push(SOURCE_COLUMN.to_string());
    header
}

/// 重複判定キー: 正規化した名前・ソート済みステータス・ソート済みスキルのSHA-256
pub fn dedup_key(record: &RunnerRecord) -> String {
    let stats: Vec<String> = record
        .stats
        .iter()
        .map(|(label, value)| format!("{}={}", normalize(label), value))
        .collect();
    let mut sorted_stats = stats;
    sorted_stats.sort();

    let mut skills: Vec<String> = record.skills.iter().map(|s| normalize(s)).collect();
    skills.sort();

    let mut hasher = Sha256::new();
    hasher.update(normalize(&record.name).as_bytes());
    hasher.update([0x1f]);
    hasher.update(sorted_stats.join(";").as_bytes());
    hasher.update([0x1f]);
    hasher.update(skills.join("|").as_bytes());
    hex::encode(hasher.finalize())
}

fn read_header(path: &Path) -> Result<Option<Vec<String>>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(path)?;
    Ok(content
        .lines()
        .find(|line| !line.trim().is_empty())
        .map(|line| parse_csv_line(strip_bom(line))))
}

/// ストアファイルを読む（ファイルがなければ空）
pub fn read_records(path: &Path) -> Result<Vec<RunnerRecord>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = std::fs::read_to_string(path)?;
    let mut lines = content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty());

    let header = match lines.next() {
        Some((_, line)) => parse_csv_line(strip_bom(line)),
        None => return Ok(Vec::new()),
    };
    let column = |name: &str| header.iter().position(|h| h == name);
    let name_idx = column(NAME_COLUMN)
        .ok_or_else(|| UmaOcrError::StoreSchema(format!("{} 列がありません", NAME_COLUMN)))?;
    let skills_idx = column(SKILLS_COLUMN);
    let source_idx = column(SOURCE_COLUMN);

    let mut records = Vec::new();
    for (line_no, line) in lines {
        let fields = parse_csv_line(line);
        let field = |idx: usize| fields.get(idx).map(String::as_str).unwrap_or("");

        let mut record = RunnerRecord {
            name: field(name_idx).to_string(),
            source_image: source_idx.map(field).unwrap_or("").to_string(),
            ..Default::default()
        };

        if let Some(idx) = skills_idx {
            record.skills = field(idx)
                .split(SKILL_DELIMITER)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }

        for (idx, label) in header.iter().enumerate() {
            if Some(idx) == skills_idx || Some(idx) == source_idx || idx == name_idx {
                continue;
            }
            let cell = field(idx).trim();
            if cell.is_empty() {
                continue;
            }
            let value = cell.parse::<u32>().map_err(|_| {
                UmaOcrError::StoreSchema(format!(
                    "{} 行目の {} が整数ではありません: {:?}",
                    line_no + 1,
                    label,
                    cell
                ))
            })?;
            record.stats.insert(label.clone(), value);
        }

        records.push(record);
    }

    Ok(records)
}

fn strip_bom(line: &str) -> &str {
    line.strip_prefix('\u{FEFF}').unwrap_or(line)
}

/// 1行を書き出し用に整形（改行付き）
fn format_row(fields: &[String]) -> String {
    let mut line = fields.iter().map(|f| escape_field(f)).collect::<Vec<_>>().join(",");
    line.push('\n');
    line
}

/// 区切り・引用符を含むフィールドは引用符で囲む（改行は空白に置換）
fn escape_field(field: &str) -> String {
    let field = field.replace(['\r', '\n'], " ");
    if field.contains(',') || field.contains('"') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field
    }
}

/// CSVの1行を分割（`""` は引用符1つとして扱う）
fn parse_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                // フィールド終了
                fields.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }
    }

    // 最後のフィールド
    fields.push(current);
    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use uma_ocr_common::DEFAULT_STAT_LABELS;

    fn labels() -> Vec<String> {
        DEFAULT_STAT_LABELS.iter().map(|s| s.to_string()).collect()
    }

    fn record(name: &str, speed: u32, skills: &[&str]) -> RunnerRecord {
        let mut record = RunnerRecord {
            name: name.to_string(),
            skills: skills.iter().map(|s| s.to_string()).collect(),
            source_image: format!("{}.png", name),
            ..Default::default()
        };
        record.stats.insert("Speed".into(), speed);
        record.stats.insert("Wit".into(), 400);
        record
    }

    #[test]
    fn test_append_writes_header_once() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("runners.csv");
        let store = RunnerStore::open(&path, &labels(), StoreOptions::default()).unwrap();

        store.append(&record("Special Week", 1200, &["Early Lead"])).unwrap();
        store.append(&record("Silence Suzuka", 1300, &[])).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "Name,Speed,Stamina,Power,Guts,Wit,Skills,SourceImage");
        assert_eq!(lines[1], "Special Week,1200,,,,400,Early Lead,Special Week.png");
    }

    #[test]
    fn test_duplicate_append_is_noop() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("runners.csv");
        let store = RunnerStore::open(&path, &labels(), StoreOptions::default()).unwrap();

        let rec = record("Special Week", 1200, &["Early Lead", "Escape Artist"]);
        assert_eq!(store.append(&rec).unwrap(), AppendOutcome::Appended);
        assert_eq!(store.append(&rec).unwrap(), AppendOutcome::Duplicate);

        // 別のスクリーンショットでも内容が同じなら重複（スキル順も無関係）
        let mut same = record("special  week", 1200, &["Escape Artist", "Early Lead"]);
        same.source_image = "other.png".into();
        assert_eq!(store.append(&same).unwrap(), AppendOutcome::Duplicate);

        assert_eq!(store.list().unwrap().len(), 1);
    }

    #[test]
    fn test_dedup_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("runners.csv");
        let rec = record("Special Week", 1200, &["Early Lead"]);

        let store = RunnerStore::open(&path, &labels(), StoreOptions::default()).unwrap();
        store.append(&rec).unwrap();
        drop(store);

        let reopened = RunnerStore::open(&path, &labels(), StoreOptions::default()).unwrap();
        assert_eq!(reopened.append(&rec).unwrap(), AppendOutcome::Duplicate);
    }

    #[test]
    fn test_list_roundtrip_with_quoting() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("runners.csv");
        let store = RunnerStore::open(&path, &labels(), StoreOptions::default()).unwrap();

        let mut rec = record("Special Week", 1200, &["Leader's Pride", "Early Lead"]);
        rec.source_image = "shots/a,\"b\".png".into();
        store.append(&rec).unwrap();

        let records = store.list().unwrap();
        assert_eq!(records, vec![rec]);
    }

    #[test]
    fn test_schema_mismatch() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("runners.csv");
        std::fs::write(&path, "Name,Speed,Skills,SourceImage\n").unwrap();
        let result = RunnerStore::open(&path, &labels(), StoreOptions::default());
        assert!(matches!(result, Err(UmaOcrError::StoreSchema(_))));
    }

    #[test]
    fn test_write_conflict_surfaces_after_retry() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("runners.csv");
        let options = StoreOptions {
            max_retries: 1,
            backoff: Duration::from_millis(1),
        };
        let store = RunnerStore::open(&path, &labels(), options).unwrap();
        std::fs::write(dir.path().join("runners.csv.lock"), "").unwrap();

        let result = store.append(&record("Special Week", 1200, &[]));
        assert!(matches!(result, Err(UmaOcrError::StoreWriteConflict(_))));
        assert!(!path.exists());
    }

    #[test]
    fn test_lock_released_after_append() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("runners.csv");
        let store = RunnerStore::open(&path, &labels(), StoreOptions::default()).unwrap();
        store.append(&record("Special Week", 1200, &[])).unwrap();
        assert!(!dir.path().join("runners.csv.lock").exists());
    }

    #[test]
    fn test_backoff_is_capped() {
        let base = Duration::from_millis(10);
        assert_eq!(backoff_delay(base, 0), Duration::from_millis(10));
        assert_eq!(backoff_delay(base, 1), Duration::from_millis(20));
        assert_eq!(backoff_delay(base, 3), Duration::from_millis(80));
        assert_eq!(backoff_delay(base, 10), Duration::from_millis(80));
    }

    #[test]
    fn test_parse_csv_line() {
        assert_eq!(parse_csv_line("a,\"b,c\",\"d\"\"e\","), vec!["a", "b,c", "d\"e", ""]);
    }

    #[test]
    fn test_read_records_missing_file() {
        assert!(read_records(Path::new("/nonexistent/runners.csv")).unwrap().is_empty());
    }
}
