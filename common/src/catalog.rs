//! 正規名カタログ
//!
//! キャラクター名・ステータス名・スキル名の正規リストを保持する。
//! 起動時に一度だけ読み込み、以降は読み取り専用で共有する。
//!
//! ## ファイル構成（カタログディレクトリ）
//! - `characters.txt`  : キャラクター名（1行1件、必須）
//! - `skillnames.json` : スキルID → 表示名配列（シミュレータ公開形式、必須）
//! - `skill_names.txt` : 追加スキル名（任意、IDなし）
//! - `stat_labels.txt` : ステータス名（任意、列順）

use crate::error::{Error, Result};
use crate::normalize::normalize;
use crate::types::{CatalogEntry, EntryKind};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

/// ステータス名の既定値（CSVの列順）
pub const DEFAULT_STAT_LABELS: &[&str] = &["Speed", "Stamina", "Power", "Guts", "Wit"];

pub const CHARACTERS_FILE: &str = "characters.txt";
pub const SKILL_IDS_FILE: &str = "skillnames.json";
pub const SKILL_NAMES_FILE: &str = "skill_names.txt";
pub const STAT_LABELS_FILE: &str = "stat_labels.txt";

/// カタログの読み込み元
#[derive(Debug, Clone)]
pub struct CatalogSources {
    pub characters: PathBuf,
    pub skill_ids: PathBuf,
    pub skill_names: Option<PathBuf>,
    pub stat_labels: Option<PathBuf>,
}

impl CatalogSources {
    /// ディレクトリの標準ファイル名から構築（任意ファイルは存在する場合のみ）
    pub fn in_dir(dir: &Path) -> Self {
        let optional = |name: &str| {
            let path = dir.join(name);
            path.exists().then_some(path)
        };
        Self {
            characters: dir.join(CHARACTERS_FILE),
            skill_ids: dir.join(SKILL_IDS_FILE),
            skill_names: optional(SKILL_NAMES_FILE),
            stat_labels: optional(STAT_LABELS_FILE),
        }
    }
}

/// スキル名 → スキルID の対応（カタログのSkillName部分のビュー）
#[derive(Debug, Clone, Default)]
pub struct SkillIdMapping {
    ids: HashMap<String, u32>,
}

impl SkillIdMapping {
    /// スキル名（表記揺れ可）からIDを引く
    pub fn get(&self, skill_name: &str) -> Option<u32> {
        self.ids.get(&normalize(skill_name)).copied()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// 同名のスキルが複数IDに載っている場合は大きいIDを採用
    fn insert(&mut self, name: &str, id: u32) {
        let entry = self.ids.entry(normalize(name)).or_insert(id);
        if id > *entry {
            *entry = id;
        }
    }
}

/// 正規名カタログ
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    characters: Vec<CatalogEntry>,
    stats: Vec<CatalogEntry>,
    skills: Vec<CatalogEntry>,
    /// (種類, 正規化キー) → 種類別リストの添字
    index: HashMap<(EntryKind, String), Vec<usize>>,
    stat_labels: Vec<String>,
    skill_ids: SkillIdMapping,
}

impl Catalog {
    /// カタログディレクトリのファイルから読み込む
    ///
    /// 必須ファイルの欠落・形式不正は致命的エラー
    pub fn load(sources: &CatalogSources) -> Result<Self> {
        let characters_text = read_required(&sources.characters)?;
        let characters = parse_line_list(&characters_text, &sources.characters, true)?;

        let skill_ids_text = read_required(&sources.skill_ids)?;
        let skill_table = parse_skill_table(&skill_ids_text, &sources.skill_ids)?;

        let extra_skill_names = match &sources.skill_names {
            Some(path) => parse_line_list(&read_required(path)?, path, false)?,
            None => Vec::new(),
        };

        let stat_labels = match &sources.stat_labels {
            Some(path) => parse_line_list(&read_required(path)?, path, true)?,
            None => DEFAULT_STAT_LABELS.iter().map(|s| s.to_string()).collect(),
        };

        Ok(Self::from_parts(characters, stat_labels, &skill_table, extra_skill_names))
    }

    /// 解析済みのリストから構築
    pub fn from_parts(
        characters: Vec<String>,
        stat_labels: Vec<String>,
        skill_table: &BTreeMap<u32, Vec<String>>,
        extra_skill_names: Vec<String>,
    ) -> Self {
        let mut catalog = Catalog::default();

        for name in characters {
            catalog.push_unique(CatalogEntry::new(name, EntryKind::CharacterName));
        }

        for label in &stat_labels {
            catalog.push_unique(CatalogEntry::new(label.clone(), EntryKind::StatLabel));
        }
        catalog.stat_labels = catalog
            .stats
            .iter()
            .map(|e| e.canonical_name.clone())
            .collect();

        for (&id, names) in skill_table {
            for name in names {
                catalog.push_unique(CatalogEntry::skill(name.clone(), Some(id)));
                catalog.skill_ids.insert(name, id);
            }
        }

        for name in extra_skill_names {
            if catalog.lookup(EntryKind::SkillName, &name).is_empty() {
                catalog.push_unique(CatalogEntry::skill(name, None));
            }
        }

        catalog
    }

    /// 同じ (種類, 正規名, ID) のエントリは1件にまとめる
    fn push_unique(&mut self, entry: CatalogEntry) {
        let key = normalize(&entry.canonical_name);
        if key.is_empty() {
            return;
        }
        let kind = entry.kind;
        let list = match kind {
            EntryKind::CharacterName => &mut self.characters,
            EntryKind::StatLabel => &mut self.stats,
            EntryKind::SkillName => &mut self.skills,
        };
        let slot = self.index.entry((kind, key)).or_default();
        if slot.iter().any(|&i| list[i] == entry) {
            return;
        }
        slot.push(list.len());
        list.push(entry);
    }

    /// 正規化キーで検索（種類ごと、同名は複数件ありうる）
    pub fn lookup(&self, kind: EntryKind, normalized_key: &str) -> Vec<&CatalogEntry> {
        let list = self.all_entries(kind);
        self.index
            .get(&(kind, normalize(normalized_key)))
            .map(|indices| indices.iter().map(|&i| &list[i]).collect())
            .unwrap_or_default()
    }

    /// 種類ごとの全エントリ（読み込み順）
    pub fn all_entries(&self, kind: EntryKind) -> &[CatalogEntry] {
        match kind {
            EntryKind::CharacterName => &self.characters,
            EntryKind::StatLabel => &self.stats,
            EntryKind::SkillName => &self.skills,
        }
    }

    /// ステータス名（CSVの列順）
    pub fn stat_labels(&self) -> &[String] {
        &self.stat_labels
    }

    pub fn skill_ids(&self) -> &SkillIdMapping {
        &self.skill_ids
    }

    pub fn len(&self, kind: EntryKind) -> usize {
        self.all_entries(kind).len()
    }
}

fn read_required(path: &Path) -> Result<String> {
    if !path.exists() {
        return Err(Error::CatalogMissing(path.to_path_buf()));
    }
    Ok(std::fs::read_to_string(path)?)
}

/// 1行1件のリストを読む（空行・`#`コメント・BOMは無視）
pub fn parse_line_list(content: &str, path: &Path, required: bool) -> Result<Vec<String>> {
    let content = content.strip_prefix('\u{FEFF}').unwrap_or(content);
    let names: Vec<String> = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect();

    if required && names.is_empty() {
        return Err(Error::CatalogMalformed {
            path: path.to_path_buf(),
            line: 1,
            reason: "list is empty".into(),
        });
    }
    Ok(names)
}

/// シミュレータの skillnames.json を読む
///
/// `{"100101": ["Straightaway Acceleration", ...], ...}`
pub fn parse_skill_table(content: &str, path: &Path) -> Result<BTreeMap<u32, Vec<String>>> {
    let content = content.strip_prefix('\u{FEFF}').unwrap_or(content);
    let malformed = |line: usize, reason: String| Error::CatalogMalformed {
        path: path.to_path_buf(),
        line,
        reason,
    };

    let value: serde_json::Value = serde_json::from_str(content)
        .map_err(|e| malformed(e.line(), format!("invalid JSON: {}", e)))?;
    let object = value
        .as_object()
        .ok_or_else(|| malformed(1, "top level must be an object".into()))?;

    let mut table = BTreeMap::new();
    for (key, names) in object {
        let line = line_of_key(content, key);
        let id: u32 = key
            .trim()
            .parse()
            .map_err(|_| malformed(line, format!("skill id '{}' is not an integer", key)))?;

        let names: Vec<String> = match names {
            serde_json::Value::String(name) => vec![name.trim().to_string()],
            serde_json::Value::Array(items) => items
                .iter()
                .map(|item| {
                    item.as_str()
                        .map(|s| s.trim().to_string())
                        .ok_or_else(|| malformed(line, format!("names of '{}' must be strings", key)))
                })
                .collect::<Result<_>>()?,
            _ => return Err(malformed(line, format!("names of '{}' must be an array", key))),
        };

        table.insert(id, names.into_iter().filter(|n| !n.is_empty()).collect());
    }

    if table.is_empty() {
        return Err(malformed(1, "no skills listed".into()));
    }
    Ok(table)
}

/// エラー表示用にキーの出現行を探す
fn line_of_key(content: &str, key: &str) -> usize {
    content
        .find(&format!("\"{}\"", key))
        .map(|pos| content[..pos].matches('\n').count() + 1)
        .unwrap_or(1)
}
