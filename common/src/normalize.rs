//! テキスト正規化
//!
//! OCRの生テキストを照合用の正規形に変換する。
//! `normalize` は冪等: `normalize(normalize(x)) == normalize(x)`

use regex::Regex;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// 文字・数字・空白以外で残す記号
const ALLOWED_PUNCTUATION: &[char] = &[
    '\'', '-', '.', ',', '!', '?', '&', '☆', '★', '♪', '(', ')', '/', ':', '+', '◎', '○', '×',
];

/// スキル一覧の区切り（改行以外）
const SKILL_DELIMITERS: &[char] = &['|', '•', '・', '●', '◆', '■', '▪', '*'];

/// テキストを正規化する
///
/// 1. 互換分解（NFKD）して結合文字を除去、小文字化
/// 2. 許可リスト外の文字を除去
/// 3. 前後の空白除去・連続空白を1つに
pub fn normalize(raw: &str) -> String {
    let folded = fold_pass(&fold_pass(raw));

    let filtered: String = folded
        .chars()
        .map(|c| if c.is_whitespace() { ' ' } else { c })
        .filter(|&c| c == ' ' || c.is_alphanumeric() || ALLOWED_PUNCTUATION.contains(&c))
        .collect();

    filtered.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn fold_pass(text: &str) -> String {
    text.nfkd()
        .filter(|&c| !is_combining_mark(c))
        .map(fold_quote)
        .flat_map(char::to_lowercase)
        .collect()
}

fn fold_quote(c: char) -> char {
    match c {
        '\u{2018}' | '\u{2019}' | '\u{201B}' | '`' | '\u{FF07}' => '\'',
        _ => c,
    }
}

/// 正規化後の英数字のみを残した形（空白・記号の揺れを吸収）
pub fn compact(text: &str) -> String {
    normalize(text).chars().filter(|c| c.is_alphanumeric()).collect()
}

/// 複数行のスキル欄を個別の候補に分割する（出現順を保持）
pub fn split_skill_candidates(raw: &str) -> Vec<String> {
    raw.split(|c: char| c == '\n' || c == '\r' || SKILL_DELIMITERS.contains(&c))
        .map(|piece| {
            let piece = piece.trim();
            let piece = piece.strip_prefix("- ").unwrap_or(piece);
            strip_ocr_residue(piece)
        })
        .filter(|piece| !piece.is_empty())
        .collect()
}

/// スキル候補の末尾に残るOCRノイズを除去
///
/// - レベル表記（"Lvl 4", "Lv.3"）
/// - 末尾の孤立した大文字1文字
fn strip_ocr_residue(piece: &str) -> String {
    lazy_static::lazy_static! {
        static ref LEVEL_RE: Regex = Regex::new(r"(?i)\s*\blv[l.]?\s*\d*\S*$").unwrap();
        static ref STRAY_RE: Regex = Regex::new(r"\s+[A-Z]$").unwrap();
    }

    let without_level = LEVEL_RE.replace(piece, "");
    let without_stray = STRAY_RE.replace(&without_level, "");
    without_stray.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// ステータス欄の値
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatValue {
    Parsed(u32),
    /// 数字を含むが整数として読めない（例: "12O0"）
    Unparsable(String),
    Missing,
}

/// ステータス欄を「ラベル」と「値」に分けたもの
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatText {
    /// 数字を含まない語を連結したラベル部分（空の場合あり）
    pub label: String,
    pub value: StatValue,
}

/// ステータス欄のテキストを分解する
///
/// "Speed 1,200" / "Speed:1200" / "Speed1200" → ("Speed", 1200)
/// ランク表記などの1文字の語はラベルに含めない。
pub fn split_stat_text(raw: &str) -> StatText {
    lazy_static::lazy_static! {
        static ref GLUED_RE: Regex = Regex::new(r"^(\D+?)(\d.*)$").unwrap();
    }

    let mut label_words = Vec::new();
    let mut numeric_tokens = Vec::new();

    for token in raw.split(|c: char| c.is_whitespace() || c == ':' || c == '：') {
        if token.is_empty() {
            continue;
        }
        if !token.chars().any(|c| c.is_ascii_digit()) {
            if token.chars().count() > 1 {
                label_words.push(token.to_string());
            }
            continue;
        }
        match GLUED_RE.captures(token) {
            Some(cap) if cap[1].chars().all(char::is_alphabetic) => {
                label_words.push(cap[1].to_string());
                numeric_tokens.push(cap[2].to_string());
            }
            _ => numeric_tokens.push(token.to_string()),
        }
    }

    let value = match numeric_tokens.last() {
        None => StatValue::Missing,
        Some(token) => match extract_number(token) {
            Some(v) => StatValue::Parsed(v),
            None => StatValue::Unparsable(token.clone()),
        },
    };

    StatText {
        label: label_words.join(" "),
        value,
    }
}

/// 数値トークンを整数として読む（桁区切りの `,` `.` は除去）
///
/// 数字以外が混ざっている場合は `None`
pub fn extract_number(token: &str) -> Option<u32> {
    let digits: String = token
        .trim()
        .chars()
        .filter(|&c| c != ',' && c != '.')
        .collect();
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_whitespace_and_case() {
        assert_eq!(normalize("  Special Week "), normalize("special   week"));
        assert_eq!(normalize("  Special Week "), "special week");
    }

    #[test]
    fn test_normalize_strips_diacritics_and_fullwidth() {
        assert_eq!(normalize("Café Crème"), "cafe creme");
        assert_eq!(normalize("ＳＰＥＥＤ"), "speed");
    }

    #[test]
    fn test_normalize_removes_disallowed() {
        assert_eq!(normalize("Leader’s Pride"), "leader's pride");
        assert_eq!(normalize("Flashy☆Landing #"), "flashy☆landing");
        assert_eq!(normalize("Early Lead ~~ @"), "early lead");
    }

    #[test]
    fn test_normalize_idempotent() {
        let samples = [
            "  Special Week ",
            "Flashy☆Landing",
            "İstanbul ℌello",
            "Ｔｏｋａｉ　Ｔｅｉｏ",
            "\tGo-Go-Go!\n\n",
            "Café ﬁre ½ ²",
            "",
            "   ",
        ];
        for s in samples {
            let once = normalize(s);
            assert_eq!(normalize(&once), once, "冪等でない: {:?}", s);
        }
    }

    #[test]
    fn test_compact() {
        assert_eq!(compact("Leader's Pride"), "leaderspride");
        assert_eq!(compact("Flashy☆Landing"), "flashylanding");
    }

    #[test]
    fn test_split_skill_candidates() {
        let raw = "Early Lead Lvl 4\n• Escape Artist\r\n\n・Breath of Fresh Air P|Straightaway Adept";
        assert_eq!(
            split_skill_candidates(raw),
            vec![
                "Early Lead",
                "Escape Artist",
                "Breath of Fresh Air",
                "Straightaway Adept",
            ]
        );
    }

    #[test]
    fn test_split_skill_candidates_keeps_symbols() {
        assert_eq!(split_skill_candidates("Right-Handed ◎"), vec!["Right-Handed ◎"]);
        assert!(split_skill_candidates("\n \n|").is_empty());
    }

    #[test]
    fn test_split_stat_text() {
        assert_eq!(
            split_stat_text("Speed 1,200"),
            StatText { label: "Speed".into(), value: StatValue::Parsed(1200) }
        );
        assert_eq!(
            split_stat_text("Stamina:900"),
            StatText { label: "Stamina".into(), value: StatValue::Parsed(900) }
        );
        assert_eq!(
            split_stat_text("Power1050"),
            StatText { label: "Power".into(), value: StatValue::Parsed(1050) }
        );
        assert_eq!(
            split_stat_text("Guts B 640"),
            StatText { label: "Guts".into(), value: StatValue::Parsed(640) }
        );
    }

    #[test]
    fn test_split_stat_text_failures() {
        assert_eq!(
            split_stat_text("Wit 12O0"),
            StatText { label: "Wit".into(), value: StatValue::Unparsable("12O0".into()) }
        );
        assert_eq!(split_stat_text("Wit").value, StatValue::Missing);
        assert_eq!(split_stat_text("  880 ").label, "");
    }

    #[test]
    fn test_extract_number() {
        assert_eq!(extract_number("1,200"), Some(1200));
        assert_eq!(extract_number("850"), Some(850));
        assert_eq!(extract_number("8S0"), None);
        assert_eq!(extract_number(""), None);
        assert_eq!(extract_number("99999999999"), None);
    }
}
