//! レコード組み立て
//!
//! 1枚のスクリーンショットのフラグメント群から RunnerRecord を組み立てる。
//!
//! - 名前: 照合できなければ失敗（UnresolvedName）
//! - ステータス: 読めない欄は警告付きで除外、1つも読めなければ失敗（NoStatsResolved）
//! - スキル: 照合できない候補は黙って除外、重複は初出を残す

use crate::matcher::Matcher;
use std::collections::HashSet;
use thiserror::Error;
use tracing::{debug, warn};
use uma_ocr_common::normalize::{split_stat_text, StatValue};
use uma_ocr_common::{split_skill_candidates, EntryKind, MatchResult, OcrFragment, RegionTag, RunnerRecord};

/// 組み立て失敗（スクリーンショット単位、処理は継続）
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssemblyFailure {
    #[error("キャラクター名を特定できません")]
    UnresolvedName,

    #[error("ステータスを1つも読み取れません")]
    NoStatsResolved,
}

/// 組み立て中の警告（レコードは有効）
#[derive(Debug, Clone, PartialEq)]
pub enum AssemblyWarning {
    LowConfidence { text: String, confidence: f32 },
    StatUnparsable { text: String },
    StatMissingValue { text: String },
    StatLabelUnmatched { text: String, score: f64 },
    StatDuplicate { label: String, text: String },
    StatUnassigned { text: String },
}

impl std::fmt::Display for AssemblyWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AssemblyWarning::LowConfidence { text, confidence } => {
                write!(f, "信頼度が低いため無視: {:?} ({:.2})", text, confidence)
            }
            AssemblyWarning::StatUnparsable { text } => write!(f, "ステータス値を読めません: {:?}", text),
            AssemblyWarning::StatMissingValue { text } => write!(f, "ステータス値がありません: {:?}", text),
            AssemblyWarning::StatLabelUnmatched { text, score } => {
                write!(f, "ステータス名を特定できません: {:?} (score {:.2})", text, score)
            }
            AssemblyWarning::StatDuplicate { label, text } => {
                write!(f, "{} は既に読み取り済み: {:?}", label, text)
            }
            AssemblyWarning::StatUnassigned { text } => write!(f, "割り当て先のないステータス値: {:?}", text),
        }
    }
}

/// 組み立て時の集計
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AssemblyCounts {
    pub fragments_ignored: usize,
    pub stats_resolved: usize,
    pub stats_dropped: usize,
    pub skills_matched: usize,
    pub skills_unmatched: usize,
    pub skills_duplicate: usize,
}

/// 組み立て結果
#[derive(Debug, Clone)]
pub struct Assembly {
    pub record: RunnerRecord,
    pub name_score: f64,
    pub warnings: Vec<AssemblyWarning>,
    pub counts: AssemblyCounts,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AssemblerOptions {
    /// これ未満の信頼度のフラグメントは無視
    pub min_fragment_confidence: f32,
}

pub struct Assembler<'a> {
    matcher: Matcher<'a>,
    options: AssemblerOptions,
}

impl<'a> Assembler<'a> {
    pub fn new(matcher: Matcher<'a>, options: AssemblerOptions) -> Self {
        Self { matcher, options }
    }

    pub fn matcher(&self) -> &Matcher<'a> {
        &self.matcher
    }

    pub fn min_fragment_confidence(&self) -> f32 {
        self.options.min_fragment_confidence
    }

    /// フラグメント群からレコードを組み立てる
    ///
    /// 警告は失敗時も含めて必ずログに出す。
    pub fn assemble(
        &self,
        fragments: &[OcrFragment],
        source_image: &str,
    ) -> Result<Assembly, AssemblyFailure> {
        let mut warnings = Vec::new();
        let mut counts = AssemblyCounts::default();

        let built = self.build(fragments, source_image, &mut warnings, &mut counts);

        for warning in &warnings {
            warn!(source = source_image, "{}", warning);
        }

        let (record, name_score) = built?;
        Ok(Assembly {
            record,
            name_score,
            warnings,
            counts,
        })
    }

    fn build(
        &self,
        fragments: &[OcrFragment],
        source_image: &str,
        warnings: &mut Vec<AssemblyWarning>,
        counts: &mut AssemblyCounts,
    ) -> Result<(RunnerRecord, f64), AssemblyFailure> {
        let mut names = Vec::new();
        let mut stats = Vec::new();
        let mut skills = Vec::new();

        for fragment in fragments {
            if fragment.confidence < self.options.min_fragment_confidence {
                counts.fragments_ignored += 1;
                warnings.push(AssemblyWarning::LowConfidence {
                    text: fragment.raw_text.clone(),
                    confidence: fragment.confidence,
                });
                continue;
            }
            match fragment.region_tag {
                RegionTag::Name => names.push(fragment),
                RegionTag::Stat => stats.push(fragment),
                RegionTag::SkillList => skills.push(fragment),
                RegionTag::Other => {}
            }
        }

        let name_match = self.resolve_name(&names).ok_or(AssemblyFailure::UnresolvedName)?;
        let name = name_match
            .canonical_name()
            .ok_or(AssemblyFailure::UnresolvedName)?
            .to_string();

        let mut record = RunnerRecord {
            name,
            source_image: source_image.to_string(),
            ..Default::default()
        };

        self.resolve_stats(&stats, &mut record, warnings, counts);
        if record.stats.is_empty() {
            return Err(AssemblyFailure::NoStatsResolved);
        }

        self.resolve_skills(&skills, &mut record, counts);

        Ok((record, name_match.score))
    }

    /// 名前欄ごと・行ごとに照合し、採用された中で最良の1件
    ///
    /// 称号（"[Special Dreamer]" など）が別行に付く場合に備え行単位でも試す。
    fn resolve_name(&self, names: &[&OcrFragment]) -> Option<MatchResult> {
        let mut best: Option<MatchResult> = None;
        for fragment in names {
            let lines: Vec<&str> = fragment.raw_text.lines().filter(|l| !l.trim().is_empty()).collect();
            let mut attempts = vec![(*fragment).clone()];
            if lines.len() > 1 {
                attempts.extend(lines.iter().map(|line| fragment.with_text(*line)));
            }

            for attempt in attempts {
                let result = self.matcher.match_fragment(&attempt, EntryKind::CharacterName);
                if !result.is_accepted() {
                    continue;
                }
                if best.as_ref().map_or(true, |b| result.score > b.score) {
                    best = Some(result);
                }
            }
        }
        best
    }

    fn resolve_stats(
        &self,
        stats: &[&OcrFragment],
        record: &mut RunnerRecord,
        warnings: &mut Vec<AssemblyWarning>,
        counts: &mut AssemblyCounts,
    ) {
        let labels = self.matcher.catalog().stat_labels();

        for fragment in stats {
            let parsed = split_stat_text(&fragment.raw_text);
            let text = fragment.raw_text.clone();

            let label = if parsed.label.is_empty() {
                // ラベルなしの数値は未入力の列に順番に割り当てる
                match labels.iter().find(|l| !record.stats.contains_key(l.as_str())) {
                    Some(label) => label.clone(),
                    None => {
                        counts.stats_dropped += 1;
                        warnings.push(AssemblyWarning::StatUnassigned { text });
                        continue;
                    }
                }
            } else {
                let result = self
                    .matcher
                    .match_fragment(&fragment.with_text(parsed.label.as_str()), EntryKind::StatLabel);
                match result.canonical_name() {
                    Some(label) => label.to_string(),
                    None => {
                        counts.stats_dropped += 1;
                        warnings.push(AssemblyWarning::StatLabelUnmatched {
                            text,
                            score: result.score,
                        });
                        continue;
                    }
                }
            };

            let value = match parsed.value {
                StatValue::Parsed(value) => value,
                StatValue::Unparsable(_) => {
                    counts.stats_dropped += 1;
                    warnings.push(AssemblyWarning::StatUnparsable { text });
                    continue;
                }
                StatValue::Missing => {
                    counts.stats_dropped += 1;
                    warnings.push(AssemblyWarning::StatMissingValue { text });
                    continue;
                }
            };

            if record.stats.contains_key(&label) {
                counts.stats_dropped += 1;
                warnings.push(AssemblyWarning::StatDuplicate { label, text });
                continue;
            }

            debug!(%label, value, "ステータス");
            record.stats.insert(label, value);
            counts.stats_resolved += 1;
        }
    }

    fn resolve_skills(&self, skills: &[&OcrFragment], record: &mut RunnerRecord, counts: &mut AssemblyCounts) {
        let mut seen = HashSet::new();

        for fragment in skills {
            for candidate in split_skill_candidates(&fragment.raw_text) {
                let result = self
                    .matcher
                    .match_fragment(&fragment.with_text(candidate), EntryKind::SkillName);
                match result.canonical_name() {
                    Some(skill) => {
                        if seen.insert(skill.to_string()) {
                            record.skills.push(skill.to_string());
                            counts.skills_matched += 1;
                        } else {
                            counts.skills_duplicate += 1;
                        }
                    }
                    None => {
                        debug!(text = %result.fragment.raw_text, score = result.score, "スキル候補を除外");
                        counts.skills_unmatched += 1;
                    }
                }
            }
        }
    }
}
