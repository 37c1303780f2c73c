//! 共有リンク用の2人を選ぶ

use crate::error::{Result, UmaOcrError};
use dialoguer::Select;
use uma_ocr_common::RunnerRecord;

/// 一覧表示用の1行
pub fn describe(record: &RunnerRecord) -> String {
    let stats = record
        .stats
        .iter()
        .map(|(label, value)| format!("{} {}", label, value))
        .collect::<Vec<_>>()
        .join(" / ");
    format!(
        "{} [{}] スキル{}個 ({})",
        record.name,
        stats,
        record.skills.len(),
        record.source_image
    )
}

/// 行番号で2人を取り出す（同じ行を2回指定してもよい）
pub fn pair_by_index(
    records: &[RunnerRecord],
    first: usize,
    second: usize,
) -> Result<(RunnerRecord, RunnerRecord)> {
    let get = |idx: usize| {
        records.get(idx).cloned().ok_or_else(|| {
            UmaOcrError::InvalidSelection(format!(
                "{} 行目はありません（登録数: {}）",
                idx,
                records.len()
            ))
        })
    };
    Ok((get(first)?, get(second)?))
}

/// 対話式で2人を選ぶ
pub fn select_pair(records: &[RunnerRecord]) -> Result<(RunnerRecord, RunnerRecord)> {
    if records.is_empty() {
        return Err(UmaOcrError::InvalidSelection("ストアにランナーがいません".into()));
    }

    let items: Vec<String> = records
        .iter()
        .enumerate()
        .map(|(i, r)| format!("{:>3}: {}", i, describe(r)))
        .collect();

    let first = prompt(&items, "1人目 (uma1)", 0)?;
    let second = prompt(&items, "2人目 (uma2)", (first + 1).min(items.len() - 1))?;

    pair_by_index(records, first, second)
}

fn prompt(items: &[String], label: &str, default: usize) -> Result<usize> {
    Select::new()
        .with_prompt(label)
        .items(items)
        .default(default)
        .interact()
        .map_err(|e| UmaOcrError::CliExecution(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runner(name: &str) -> RunnerRecord {
        let mut record = RunnerRecord {
            name: name.into(),
            skills: vec!["Early Lead".into()],
            source_image: format!("{}.png", name),
            ..Default::default()
        };
        record.stats.insert("Speed".into(), 1200);
        record
    }

    #[test]
    fn test_pair_by_index() {
        let records = vec![runner("Special Week"), runner("Silence Suzuka")];
        let (a, b) = pair_by_index(&records, 1, 0).unwrap();
        assert_eq!(a.name, "Silence Suzuka");
        assert_eq!(b.name, "Special Week");

        let (a, b) = pair_by_index(&records, 0, 0).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_pair_by_index_out_of_range() {
        let records = vec![runner("Special Week")];
        let result = pair_by_index(&records, 0, 1);
        assert!(matches!(result, Err(UmaOcrError::InvalidSelection(_))));
    }

    #[test]
    fn test_describe() {
        let line = describe(&runner("Special Week"));
        assert_eq!(line, "Special Week [Speed 1200] スキル1個 (Special Week.png)");
    }
}
