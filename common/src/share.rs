//! 共有リンクのエンコード
//!
//! 2人分のレコードを外部レースシミュレータ（UmaLator）のURLフラグメントに変換する。
//! 形式はシミュレータ側の復号処理に合わせて固定:
//!
//! `percent_quote(base64(gzip(json)))`
//!
//! - JSONは空白なし、キー順固定（構造体のフィールド順で保証）
//! - gzipは最高圧縮・mtime=0・OS=255
//! - base64は標準アルファベット（パディングあり）
//! - `A-Z a-z 0-9 _ . - ~ /` 以外は `%XX`

use crate::catalog::SkillIdMapping;
use crate::error::{Error, Result};
use crate::normalize::compact;
use crate::types::RunnerRecord;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use flate2::read::GzDecoder;
use flate2::{Compression, GzBuilder};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

/// レース条件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RaceDef {
    pub mood: i32,
    pub ground: i32,
    pub weather: i32,
    pub season: i32,
    pub time: i32,
    pub grade: i32,
}

impl Default for RaceDef {
    fn default() -> Self {
        Self {
            mood: 2,
            ground: 1,  // 良
            weather: 1, // 晴れ
            season: 1,  // 春
            time: 2,    // 昼
            grade: 100, // G1
        }
    }
}

/// 1人分のペイロード
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HorsePayload {
    pub outfit_id: String,
    pub speed: u32,
    pub stamina: u32,
    pub power: u32,
    pub guts: u32,
    pub wisdom: u32,
    pub strategy: String,
    pub distance_aptitude: String,
    pub surface_aptitude: String,
    pub strategy_aptitude: String,
    /// スキルID（10進文字列）
    pub skills: Vec<String>,
}

/// URLに載せるペイロード全体
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SharePayload {
    pub course_id: u32,
    pub nsamples: u32,
    pub use_pos_keep: bool,
    pub racedef: RaceDef,
    pub uma1: HorsePayload,
    pub uma2: HorsePayload,
}

/// レコードに含まれない項目の既定値
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShareOptions {
    /// 東京 芝1600m
    pub course_id: u32,
    pub nsamples: u32,
    pub use_pos_keep: bool,
    pub racedef: RaceDef,
    pub outfit_id: String,
    pub strategy: String,
    pub distance_aptitude: String,
    pub surface_aptitude: String,
    pub strategy_aptitude: String,
}

impl Default for ShareOptions {
    fn default() -> Self {
        Self {
            course_id: 10606,
            nsamples: 500,
            use_pos_keep: true,
            racedef: RaceDef::default(),
            outfit_id: String::new(),
            strategy: "Senkou".into(),
            distance_aptitude: "S".into(),
            surface_aptitude: "A".into(),
            strategy_aptitude: "A".into(),
        }
    }
}

/// エンコード済みのURLパス片
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShareLink {
    pub path_segment: String,
}

impl ShareLink {
    /// ベースURLの末尾にそのまま連結する
    pub fn url(&self, base_url: &str) -> String {
        format!("{}{}", base_url, self.path_segment)
    }
}

impl std::fmt::Display for ShareLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.path_segment)
    }
}

/// スキル名 → ID の解決結果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SkillResolution {
    /// レコード順
    pub ids: Vec<u32>,
    /// IDが見つからず除外したスキル名
    pub unresolved: Vec<String>,
}

/// レコードのスキルをIDに解決する（未知のスキルは除外して報告）
pub fn resolve_skill_ids(record: &RunnerRecord, mapping: &SkillIdMapping) -> SkillResolution {
    let mut resolution = SkillResolution::default();
    for skill in &record.skills {
        match mapping.get(skill) {
            Some(id) => resolution.ids.push(id),
            None => resolution.unresolved.push(skill.clone()),
        }
    }
    resolution
}

/// 2人分のレコードを共有リンクにエンコードする
///
/// IDのないスキルは失敗にせず除外する。
pub fn encode(
    record_a: &RunnerRecord,
    record_b: &RunnerRecord,
    mapping: &SkillIdMapping,
    options: &ShareOptions,
) -> Result<ShareLink> {
    let payload = build_payload(record_a, record_b, mapping, options);
    let json = payload_json(&payload)?;

    let mut encoder = GzBuilder::new()
        .mtime(0)
        .operating_system(255)
        .write(Vec::new(), Compression::best());
    encoder.write_all(json.as_bytes())?;
    let zipped = encoder.finish()?;

    Ok(ShareLink {
        path_segment: percent_quote(&STANDARD.encode(zipped)),
    })
}

pub fn build_payload(
    record_a: &RunnerRecord,
    record_b: &RunnerRecord,
    mapping: &SkillIdMapping,
    options: &ShareOptions,
) -> SharePayload {
    SharePayload {
        course_id: options.course_id,
        nsamples: options.nsamples,
        use_pos_keep: options.use_pos_keep,
        racedef: options.racedef.clone(),
        uma1: horse_payload(record_a, mapping, options),
        uma2: horse_payload(record_b, mapping, options),
    }
}

fn horse_payload(record: &RunnerRecord, mapping: &SkillIdMapping, options: &ShareOptions) -> HorsePayload {
    let mut horse = HorsePayload {
        outfit_id: options.outfit_id.clone(),
        speed: 0,
        stamina: 0,
        power: 0,
        guts: 0,
        wisdom: 0,
        strategy: options.strategy.clone(),
        distance_aptitude: options.distance_aptitude.clone(),
        surface_aptitude: options.surface_aptitude.clone(),
        strategy_aptitude: options.strategy_aptitude.clone(),
        skills: resolve_skill_ids(record, mapping)
            .ids
            .iter()
            .map(u32::to_string)
            .collect(),
    };

    for (label, &value) in &record.stats {
        match compact(label).as_str() {
            "speed" | "spd" => horse.speed = value,
            "stamina" | "sta" => horse.stamina = value,
            "power" | "pow" => horse.power = value,
            "guts" => horse.guts = value,
            "wit" | "wisdom" | "int" | "intelligence" => horse.wisdom = value,
            _ => {}
        }
    }

    horse
}

/// 区切りなしJSON（非ASCIIは `\uXXXX` にエスケープ）
pub fn payload_json(payload: &SharePayload) -> Result<String> {
    let json = serde_json::to_string(payload)?;
    Ok(escape_non_ascii(&json))
}

fn escape_non_ascii(json: &str) -> String {
    let mut out = String::with_capacity(json.len());
    for c in json.chars() {
        if c.is_ascii() {
            out.push(c);
        } else {
            let mut units = [0u16; 2];
            for unit in c.encode_utf16(&mut units) {
                out.push_str(&format!("\\u{:04x}", unit));
            }
        }
    }
    out
}

fn percent_quote(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for byte in text.bytes() {
        if byte.is_ascii_alphanumeric() || b"_.-~/".contains(&byte) {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{:02X}", byte));
        }
    }
    out
}

fn percent_unquote(text: &str) -> Result<String> {
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = text
                .get(i + 1..i + 3)
                .ok_or_else(|| Error::ShareDecode(format!("truncated escape at {}", i)))?;
            let byte = u8::from_str_radix(hex, 16)
                .map_err(|_| Error::ShareDecode(format!("bad escape '%{}'", hex)))?;
            out.push(byte);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).map_err(|e| Error::ShareDecode(e.to_string()))
}

/// 共有リンクを復号する（確認・デバッグ用）
///
/// URL全体が渡された場合は `#` 以降を使う。
pub fn decode_share_link(segment: &str) -> Result<SharePayload> {
    let segment = segment.rsplit_once('#').map(|(_, s)| s).unwrap_or(segment).trim();
    let base64_text = percent_unquote(segment)?;
    let zipped = STANDARD
        .decode(base64_text.as_bytes())
        .map_err(|e| Error::ShareDecode(format!("base64: {}", e)))?;

    let mut json = String::new();
    GzDecoder::new(zipped.as_slice())
        .read_to_string(&mut json)
        .map_err(|e| Error::ShareDecode(format!("gzip: {}", e)))?;

    serde_json::from_str(&json).map_err(|e| Error::ShareDecode(format!("json: {}", e)))
}
