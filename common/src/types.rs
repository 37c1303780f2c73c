//! 共有型定義
//!
//! - OcrFragment: 外部OCRエンジンの出力（1領域分）
//! - CatalogEntry: 正規名カタログの1エントリ
//! - MatchResult: 照合結果（1フラグメントにつき1件）
//! - RunnerRecord: 組み立て済みのウマ娘レコード

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// スクリーンショット上の領域
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionTag {
    Name,
    Stat,
    #[serde(alias = "skills")]
    SkillList,
    #[default]
    #[serde(other)]
    Other,
}

/// OCRフラグメント
///
/// 境界でのみ形を検証し、内部では常にこの形で扱う。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawFragment")]
pub struct OcrFragment {
    pub raw_text: String,
    pub region_tag: RegionTag,
    /// 0.0〜1.0
    pub confidence: f32,
}

impl OcrFragment {
    pub fn new(raw_text: impl Into<String>, region_tag: RegionTag, confidence: f64) -> Self {
        Self {
            raw_text: raw_text.into(),
            region_tag,
            confidence: clamp_confidence(confidence),
        }
    }

    /// 同じ領域・信頼度で本文だけ差し替えたフラグメント（スキル分割用）
    pub fn with_text(&self, raw_text: impl Into<String>) -> Self {
        Self {
            raw_text: raw_text.into(),
            region_tag: self.region_tag,
            confidence: self.confidence,
        }
    }
}

/// OCRエンジンが返す生の形
#[derive(Debug, Deserialize)]
struct RawFragment {
    #[serde(default, alias = "text")]
    raw_text: String,
    #[serde(default, alias = "region")]
    region_tag: RegionTag,
    #[serde(default)]
    confidence: Option<f64>,
}

impl From<RawFragment> for OcrFragment {
    fn from(raw: RawFragment) -> Self {
        OcrFragment::new(raw.raw_text, raw.region_tag, raw.confidence.unwrap_or(1.0))
    }
}

/// 信頼度を0.0〜1.0に変換
///
/// 1より大きく100以下の値はパーセント表記（Tesseract形式）とみなす。
fn clamp_confidence(value: f64) -> f32 {
    if value.is_nan() || value <= 0.0 {
        0.0
    } else if value <= 1.0 {
        value as f32
    } else if value <= 100.0 {
        (value / 100.0) as f32
    } else {
        1.0
    }
}

/// 1枚のスクリーンショットのOCR出力（JSONファイル1つ分）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScreenshotInput {
    #[serde(default, alias = "sourceImage")]
    pub source_image: String,
    #[serde(default)]
    pub fragments: Vec<OcrFragment>,
}

/// カタログエントリの種類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntryKind {
    CharacterName,
    StatLabel,
    SkillName,
}

impl std::fmt::Display for EntryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntryKind::CharacterName => write!(f, "character"),
            EntryKind::StatLabel => write!(f, "stat"),
            EntryKind::SkillName => write!(f, "skill"),
        }
    }
}

/// カタログエントリ
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub canonical_name: String,
    pub kind: EntryKind,
    /// スキルID（SkillNameのみ）
    pub aux_id: Option<u32>,
}

impl CatalogEntry {
    pub fn new(canonical_name: impl Into<String>, kind: EntryKind) -> Self {
        Self {
            canonical_name: canonical_name.into(),
            kind,
            aux_id: None,
        }
    }

    pub fn skill(canonical_name: impl Into<String>, id: Option<u32>) -> Self {
        Self {
            canonical_name: canonical_name.into(),
            kind: EntryKind::SkillName,
            aux_id: id,
        }
    }
}

/// 照合結果
///
/// `candidate` が `None` の場合は「確信のある一致なし」を表す。
/// `score` は閾値未満でも最良スコアを保持する。
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub fragment: OcrFragment,
    pub candidate: Option<CatalogEntry>,
    pub score: f64,
}

impl MatchResult {
    pub fn is_accepted(&self) -> bool {
        self.candidate.is_some()
    }

    pub fn canonical_name(&self) -> Option<&str> {
        self.candidate.as_ref().map(|c| c.canonical_name.as_str())
    }
}

/// ウマ娘レコード
///
/// ストアに追記された後は変更しない。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunnerRecord {
    pub name: String,
    /// ステータス名 → 値
    pub stats: BTreeMap<String, u32>,
    /// 出現順・重複なし
    pub skills: Vec<String>,
    pub source_image: String,
}

impl RunnerRecord {
    pub fn stat(&self, label: &str) -> Option<u32> {
        self.stats.get(label).copied()
    }
}
