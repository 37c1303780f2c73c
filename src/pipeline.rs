//! 取り込みパイプライン
//!
//! OCR出力ファイル群 → 組み立て（並列） → ストア追記（入力順） → 集計

use crate::assembler::{Assembler, Assembly, AssemblyFailure};
use crate::error::{Result, UmaOcrError};
use crate::scanner::archive_processed;
use crate::store::{AppendOutcome, RunnerStore};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uma_ocr_common::ScreenshotInput;

/// OCR出力ファイルを読み込む
///
/// 形式が不正なら InvalidScreenshot。source_image が空ならファイル名（拡張子なし）を使う。
pub fn load_screenshot(path: &Path) -> Result<ScreenshotInput> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| UmaOcrError::InvalidScreenshot(path.to_path_buf(), e.to_string()))?;
    let mut input: ScreenshotInput = serde_json::from_str(&content)
        .map_err(|e| UmaOcrError::InvalidScreenshot(path.to_path_buf(), e.to_string()))?;

    if input.source_image.trim().is_empty() {
        input.source_image = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
    }
    Ok(input)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct IngestOptions {
    /// 処理済みファイルを processed/ へ移動
    pub archive: bool,
    /// 進捗バーを表示
    pub show_progress: bool,
}

/// スキップしたスクリーンショット
#[derive(Debug, Clone, Serialize)]
pub struct SkippedScreenshot {
    pub path: PathBuf,
    pub reason: String,
}

/// 1回の取り込みの集計
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub screenshots: usize,
    pub appended: usize,
    pub duplicates: usize,
    pub invalid_dumps: usize,
    pub unresolved_name: usize,
    pub no_stats_resolved: usize,
    pub names_matched: usize,
    pub stats_resolved: usize,
    pub stats_dropped: usize,
    pub skills_matched: usize,
    pub skills_unmatched: usize,
    pub fragments_ignored: usize,
    pub archived: usize,
    pub store_errors: usize,
    pub archive_failures: usize,
    pub skipped: Vec<SkippedScreenshot>,
    /// ストアの書き込み競合で中断した場合のみ Some
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aborted: Option<String>,
}

impl RunSummary {
    pub fn failures(&self) -> usize {
        self.invalid_dumps
            + self.unresolved_name
            + self.no_stats_resolved
            + self.store_errors
            + self.archive_failures
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.is_some()
    }

    fn record_skip(&mut self, path: &Path, reason: impl ToString) {
        self.skipped.push(SkippedScreenshot {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        });
    }

    fn record_failure(&mut self, path: &Path, failure: AssemblyFailure) {
        match failure {
            AssemblyFailure::UnresolvedName => self.unresolved_name += 1,
            AssemblyFailure::NoStatsResolved => self.no_stats_resolved += 1,
        }
        self.record_skip(path, failure);
    }

    fn record_assembly(&mut self, assembly: &Assembly) {
        self.names_matched += 1;
        self.stats_resolved += assembly.counts.stats_resolved;
        self.stats_dropped += assembly.counts.stats_dropped;
        self.skills_matched += assembly.counts.skills_matched;
        self.skills_unmatched += assembly.counts.skills_unmatched;
        self.fragments_ignored += assembly.counts.fragments_ignored;
    }
}

/// スクリーンショット1枚の処理結果
enum Outcome {
    Invalid(UmaOcrError),
    Failed(AssemblyFailure, usize),
    Assembled(Assembly),
}

fn process_one(assembler: &Assembler<'_>, path: &Path) -> Outcome {
    let input = match load_screenshot(path) {
        Ok(input) => input,
        Err(e) => return Outcome::Invalid(e),
    };
    let ignored = input
        .fragments
        .iter()
        .filter(|f| f.confidence < assembler.min_fragment_confidence())
        .count();
    match assembler.assemble(&input.fragments, &input.source_image) {
        Ok(assembly) => Outcome::Assembled(assembly),
        Err(failure) => Outcome::Failed(failure, ignored),
    }
}

/// OCR出力ファイル群を取り込む
///
/// 組み立ては並列、ストアへの追記は入力順。スクリーンショット単位の失敗（追記・退避の
/// IOエラーを含む）は集計に記録して続行する。ストアの書き込み競合だけは残りを処理せず
/// `aborted` を立てた途中までの集計を返す。
pub fn ingest(
    paths: &[PathBuf],
    assembler: &Assembler<'_>,
    store: &RunnerStore,
    options: IngestOptions,
) -> Result<RunSummary> {
    let pb = if options.show_progress {
        let pb = ProgressBar::new(paths.len() as u64);
        pb.set_style(
            ProgressStyle::with_template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .map(|s| s.progress_chars("#>-"))
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        pb
    } else {
        ProgressBar::hidden()
    };

    let outcomes: Vec<Outcome> = paths
        .par_iter()
        .map(|path| {
            let outcome = process_one(assembler, path);
            pb.inc(1);
            outcome
        })
        .collect();
    pb.finish_and_clear();

    let mut summary = RunSummary {
        screenshots: paths.len(),
        ..Default::default()
    };

    for (path, outcome) in paths.iter().zip(outcomes) {
        match outcome {
            Outcome::Invalid(e) => {
                warn!(path = %path.display(), "{}", e);
                summary.invalid_dumps += 1;
                summary.record_skip(path, e);
            }
            Outcome::Failed(failure, ignored) => {
                warn!(path = %path.display(), "{}", failure);
                summary.fragments_ignored += ignored;
                summary.record_failure(path, failure);
            }
            Outcome::Assembled(assembly) => {
                summary.record_assembly(&assembly);
                match store.append(&assembly.record) {
                    Ok(AppendOutcome::Appended) => {
                        info!(name = %assembly.record.name, path = %path.display(), "追記");
                        summary.appended += 1;
                    }
                    Ok(AppendOutcome::Duplicate) => {
                        debug!(name = %assembly.record.name, path = %path.display(), "重複");
                        summary.duplicates += 1;
                    }
                    Err(e @ UmaOcrError::StoreWriteConflict(_)) => {
                        warn!(path = %path.display(), "{}", e);
                        summary.aborted = Some(e.to_string());
                        break;
                    }
                    Err(e) => {
                        warn!(path = %path.display(), "{}", e);
                        summary.store_errors += 1;
                        summary.record_skip(path, e);
                        continue;
                    }
                }
                if options.archive {
                    match archive_processed(path) {
                        Ok(dest) => {
                            debug!(from = %path.display(), to = %dest.display(), "退避");
                            summary.archived += 1;
                        }
                        Err(e) => {
                            warn!(path = %path.display(), "退避に失敗: {}", e);
                            summary.archive_failures += 1;
                            summary.record_skip(path, format!("退避に失敗: {}", e));
                        }
                    }
                }
            }
        }
    }

    Ok(summary)
}
