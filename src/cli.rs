use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "uma-ocr")]
#[command(about = "ウマ娘OCR結果のランナー登録・シミュレータ共有リンク生成ツール", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// 詳細ログを出力
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// OCR出力（JSON）を取り込みストアに追記
    Ingest {
        /// OCR出力ファイルまたはフォルダ
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// ストアCSV（省略時は設定値）
        #[arg(long)]
        store: Option<PathBuf>,

        /// カタログディレクトリ（省略時は設定値）
        #[arg(long)]
        catalog: Option<PathBuf>,

        /// 照合の採用閾値（0.0-1.0）
        #[arg(long)]
        threshold: Option<f64>,

        /// 処理済みファイルを processed/ へ移動
        #[arg(long)]
        archive: bool,

        /// 集計の出力形式 (text/json)
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// 登録済みランナーを一覧表示
    List {
        /// ストアCSV（省略時は設定値）
        #[arg(long)]
        store: Option<PathBuf>,

        /// 出力形式 (text/json)
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// 2人を選んで共有リンクを生成
    Link {
        /// 1人目の行番号
        #[arg(long, default_value = "0")]
        first: usize,

        /// 2人目の行番号
        #[arg(long, default_value = "1")]
        second: usize,

        /// 対話式で選ぶ
        #[arg(long)]
        pick: bool,

        /// シミュレータのURL（省略時は設定値）
        #[arg(long)]
        base_url: Option<String>,

        /// ストアCSV（省略時は設定値）
        #[arg(long)]
        store: Option<PathBuf>,

        /// カタログディレクトリ（省略時は設定値）
        #[arg(long)]
        catalog: Option<PathBuf>,
    },

    /// 共有リンクを復号して中身を表示
    Inspect {
        /// パス部分またはURL全体
        #[arg(required = true)]
        segment: String,
    },

    /// カタログを読み込んで件数を表示
    Catalog {
        /// カタログディレクトリ（省略時は設定値）
        #[arg(long)]
        catalog: Option<PathBuf>,
    },

    /// 設定を表示/初期化
    Config {
        /// 設定を表示
        #[arg(long)]
        show: bool,

        /// 既定値で設定ファイルを作成
        #[arg(long)]
        init: bool,
    },
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "txt" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Unknown format: {}. Use text or json", s)),
        }
    }
}
