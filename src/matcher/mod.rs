//! カタログ照合
//!
//! 正規化したフラグメントをカタログの指定種類の全エントリと比較し、
//! 最もスコアの高い1件を選ぶ。フラグメント間で状態を持たない。
//!
//! ## 同点の扱い
//! スコア → 正規名が短い方 → 正規名の辞書順 → IDが大きい方

pub mod similarity;

use std::cmp::Ordering;
use std::collections::HashMap;
use tracing::debug;
use uma_ocr_common::{compact, normalize, Catalog, CatalogEntry, EntryKind, MatchResult, OcrFragment};

/// 採用閾値の既定値（これ未満は「一致なし」）
pub const DEFAULT_THRESHOLD: f64 = 0.6;

/// 正規形が異なる候補のスコア上限（1.0は正規形の完全一致のみ）
const NEAR_EXACT: f64 = 0.99;

const KINDS: [EntryKind; 3] = [EntryKind::CharacterName, EntryKind::StatLabel, EntryKind::SkillName];

/// 照合用に前計算したエントリ
#[derive(Debug, Clone)]
struct Prepared {
    normalized: String,
    compact: String,
    name_len: usize,
}

pub struct Matcher<'a> {
    catalog: &'a Catalog,
    threshold: f64,
    prepared: HashMap<EntryKind, Vec<Prepared>>,
}

impl<'a> Matcher<'a> {
    pub fn new(catalog: &'a Catalog) -> Self {
        let prepared = KINDS
            .iter()
            .map(|&kind| {
                let entries = catalog
                    .all_entries(kind)
                    .iter()
                    .map(|entry| Prepared {
                        normalized: normalize(&entry.canonical_name),
                        compact: compact(&entry.canonical_name),
                        name_len: entry.canonical_name.chars().count(),
                    })
                    .collect();
                (kind, entries)
            })
            .collect();

        Self {
            catalog,
            threshold: DEFAULT_THRESHOLD,
            prepared,
        }
    }

    /// 採用閾値を変更（0.0〜1.0に丸める）
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold.clamp(0.0, 1.0);
        self
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn catalog(&self) -> &'a Catalog {
        self.catalog
    }

    /// フラグメントを指定種類のエントリと照合する
    pub fn match_fragment(&self, fragment: &OcrFragment, kind: EntryKind) -> MatchResult {
        let key = normalize(&fragment.raw_text);
        if key.is_empty() {
            return MatchResult {
                fragment: fragment.clone(),
                candidate: None,
                score: 0.0,
            };
        }

        let entries = self.catalog.all_entries(kind);
        let prepared = self.prepared.get(&kind).map(Vec::as_slice).unwrap_or(&[]);
        let key_compact = compact(&fragment.raw_text);

        let mut best: Option<(usize, f64)> = None;
        for (i, prep) in prepared.iter().enumerate() {
            let score = score(&key, &key_compact, prep);
            let better = match best {
                None => true,
                Some((b, best_score)) => {
                    compare(score, &entries[i], prep, best_score, &entries[b], &prepared[b])
                        == Ordering::Less
                }
            };
            if better {
                best = Some((i, score));
            }
        }

        let (candidate, score) = match best {
            Some((i, score)) if score >= self.threshold => (Some(entries[i].clone()), score),
            Some((_, score)) => (None, score),
            None => (None, 0.0),
        };

        debug!(
            text = %fragment.raw_text,
            %kind,
            score,
            matched = candidate.as_ref().map(|c| c.canonical_name.as_str()).unwrap_or("-"),
            "照合"
        );

        MatchResult {
            fragment: fragment.clone(),
            candidate,
            score,
        }
    }
}

/// 正規形・英数字のみの形・語集合の3通りで比較し最大値を採る
///
/// ◎/○のように記号だけが違う名前は英数字のみの形が一致するため、
/// 完全一致以外は `NEAR_EXACT` で頭打ちにする
fn score(key: &str, key_compact: &str, prep: &Prepared) -> f64 {
    if key == prep.normalized {
        return 1.0;
    }
    let by_text = similarity::similarity(key, &prep.normalized);
    let by_compact = if key_compact.is_empty() || prep.compact.is_empty() {
        0.0
    } else {
        similarity::similarity(key_compact, &prep.compact)
    };
    let by_tokens = similarity::token_set_similarity(key, &prep.normalized);
    by_text.max(by_compact).max(by_tokens).min(NEAR_EXACT)
}

/// `Less` = aの方が良い候補
fn compare(
    a_score: f64,
    a: &CatalogEntry,
    a_prep: &Prepared,
    b_score: f64,
    b: &CatalogEntry,
    b_prep: &Prepared,
) -> Ordering {
    b_score
        .partial_cmp(&a_score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a_prep.name_len.cmp(&b_prep.name_len))
        .then_with(|| a.canonical_name.cmp(&b.canonical_name))
        .then_with(|| b.aux_id.cmp(&a.aux_id))
}
