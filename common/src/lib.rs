//! Uma OCR Common Library
//!
//! CLIと将来のフロントエンドで共有される型と純粋ロジック

pub mod types;
pub mod error;
pub mod normalize;
pub mod catalog;
pub mod share;

pub use types::{
    CatalogEntry, EntryKind, MatchResult, OcrFragment, RegionTag, RunnerRecord, ScreenshotInput,
};
pub use error::{Error, Result};
pub use normalize::{compact, extract_number, normalize, split_skill_candidates};
pub use catalog::{Catalog, CatalogSources, SkillIdMapping, DEFAULT_STAT_LABELS};
pub use share::{
    decode_share_link, encode, resolve_skill_ids, HorsePayload, RaceDef, ShareLink, ShareOptions,
    SharePayload,
};
