use anyhow::Context;
use clap::Parser;
use std::path::Path;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use uma_ocr_common::{decode_share_link, encode, resolve_skill_ids, Catalog, CatalogSources, EntryKind};
use uma_ocr_rust::{cli, config, picker, pipeline, scanner, store};
use uma_ocr_rust::assembler::{Assembler, AssemblerOptions};
use uma_ocr_rust::matcher::Matcher;
use cli::{Cli, Commands, OutputFormat};
use config::Config;
use store::{read_records, RunnerStore, StoreOptions};

/// ログレベルの環境変数（tracing の EnvFilter 書式）
const LOG_ENV: &str = "UMA_OCR_LOG";

fn init_logging(verbose: bool, config: &Config) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(&config.log_level))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_catalog(dir: &Path) -> anyhow::Result<Catalog> {
    let catalog = Catalog::load(&CatalogSources::in_dir(dir))
        .with_context(|| format!("カタログを読み込めません: {}", dir.display()))?;
    tracing::info!(
        characters = catalog.len(EntryKind::CharacterName),
        stats = catalog.len(EntryKind::StatLabel),
        skills = catalog.len(EntryKind::SkillName),
        "カタログ読み込み完了"
    );
    Ok(catalog)
}

fn store_options(config: &Config) -> StoreOptions {
    StoreOptions {
        max_retries: config.store_max_retries,
        backoff: Duration::from_millis(config.store_backoff_ms),
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = Config::load().context("設定ファイルを読み込めません")?;
    init_logging(cli.verbose, &config);

    match cli.command {
        Commands::Ingest { paths, store, catalog, threshold, archive, format } => {
            if let Some(threshold) = threshold {
                config.match_threshold = threshold;
            }
            config.validate()?;
            let store_path = store.unwrap_or_else(|| config.store_path.clone());
            let catalog_dir = catalog.unwrap_or_else(|| config.catalog_dir.clone());
            let text = format == OutputFormat::Text;

            if text {
                println!("🏇 uma-ocr - 取り込み\n");
                println!("[1/3] カタログを読み込み中...");
            }
            let catalog = load_catalog(&catalog_dir)?;

            let inputs = scanner::collect_inputs(&paths)?;
            if text {
                println!("✔ {}件のOCR出力を検出\n", inputs.len());
            }
            if inputs.is_empty() {
                return Ok(());
            }

            let matcher = Matcher::new(&catalog).with_threshold(config.match_threshold);
            let assembler = Assembler::new(
                matcher,
                AssemblerOptions {
                    min_fragment_confidence: config.min_fragment_confidence,
                },
            );
            let runner_store = RunnerStore::open(&store_path, catalog.stat_labels(), store_options(&config))?;

            if text {
                println!("[2/3] 照合・追記中...");
            }
            let summary = pipeline::ingest(
                &inputs,
                &assembler,
                &runner_store,
                pipeline::IngestOptions {
                    archive,
                    show_progress: text && !cli.verbose,
                },
            )?;

            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summary)?),
                OutputFormat::Text => {
                    println!("✔ 完了\n");
                    println!("[3/3] 集計");
                    println!("  スクリーンショット: {}", summary.screenshots);
                    println!("  追記: {}  重複スキップ: {}", summary.appended, summary.duplicates);
                    println!(
                        "  失敗: 形式不正 {} / 名前未特定 {} / ステータスなし {}",
                        summary.invalid_dumps, summary.unresolved_name, summary.no_stats_resolved
                    );
                    println!(
                        "  ステータス: 読取 {} / 除外 {}",
                        summary.stats_resolved, summary.stats_dropped
                    );
                    println!(
                        "  スキル: 一致 {} / 不一致 {}",
                        summary.skills_matched, summary.skills_unmatched
                    );
                    if summary.fragments_ignored > 0 {
                        println!("  低信頼度で無視: {}", summary.fragments_ignored);
                    }
                    if summary.store_errors > 0 {
                        println!("  追記エラー: {}", summary.store_errors);
                    }
                    if archive {
                        println!(
                            "  processed/ へ移動: {}  失敗: {}",
                            summary.archived, summary.archive_failures
                        );
                    }
                    for skipped in &summary.skipped {
                        println!("  ⚠ {}: {}", skipped.path.display(), skipped.reason);
                    }
                    if summary.aborted.is_none() {
                        println!("\n✅ 保存先: {}", runner_store.path().display());
                    }
                }
            }

            if let Some(reason) = &summary.aborted {
                anyhow::bail!("取り込みを中断しました: {}", reason);
            }
        }

        Commands::List { store, format } => {
            let store_path = store.unwrap_or_else(|| config.store_path.clone());
            let records = read_records(&store_path)?;

            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&records)?),
                OutputFormat::Text => {
                    if records.is_empty() {
                        println!("登録済みのランナーはいません: {}", store_path.display());
                    }
                    for (i, record) in records.iter().enumerate() {
                        println!("{:>3}: {}", i, picker::describe(record));
                    }
                }
            }
        }

        Commands::Link { first, second, pick, base_url, store, catalog } => {
            let store_path = store.unwrap_or_else(|| config.store_path.clone());
            let catalog_dir = catalog.unwrap_or_else(|| config.catalog_dir.clone());
            let catalog = load_catalog(&catalog_dir)?;
            let records = read_records(&store_path)?;

            let (a, b) = if pick {
                picker::select_pair(&records)?
            } else {
                picker::pair_by_index(&records, first, second)?
            };

            for record in [&a, &b] {
                let resolution = resolve_skill_ids(record, catalog.skill_ids());
                for skill in &resolution.unresolved {
                    println!("⚠ {}: IDが不明なスキルを除外: {}", record.name, skill);
                }
            }

            let link = encode(&a, &b, catalog.skill_ids(), &config.share)?;
            let base_url = base_url.unwrap_or_else(|| config.simulator_base_url.clone());
            println!("🔗 {} vs {}", a.name, b.name);
            println!("{}", link.url(&base_url));
        }

        Commands::Inspect { segment } => {
            let payload = decode_share_link(&segment)?;
            println!("{}", serde_json::to_string_pretty(&payload)?);
        }

        Commands::Catalog { catalog } => {
            let catalog_dir = catalog.unwrap_or_else(|| config.catalog_dir.clone());
            let catalog = load_catalog(&catalog_dir)?;
            println!("カタログ: {}", catalog_dir.display());
            println!("  キャラクター: {}", catalog.len(EntryKind::CharacterName));
            println!("  ステータス: {} ({})", catalog.len(EntryKind::StatLabel), catalog.stat_labels().join(", "));
            println!("  スキル: {} (ID付き {})", catalog.len(EntryKind::SkillName), catalog.skill_ids().len());
        }

        Commands::Config { show, init } => {
            let path = Config::config_path()?;

            if init {
                if path.exists() {
                    println!("設定ファイルは既に存在します: {}", path.display());
                } else {
                    Config::default().save()?;
                    println!("✔ 設定ファイルを作成しました: {}", path.display());
                }
            }

            if show || !init {
                println!("設定: {}", path.display());
                println!("  カタログ: {}", config.catalog_dir.display());
                println!("  ストア: {}", config.store_path.display());
                println!("  照合閾値: {}", config.match_threshold);
                println!("  最小信頼度: {}", config.min_fragment_confidence);
                println!(
                    "  書き込み再試行: {}回 ({}ms〜)",
                    config.store_max_retries, config.store_backoff_ms
                );
                println!("  シミュレータURL: {}", config.simulator_base_url);
                println!("  ログレベル: {}", config.log_level);
            }
        }
    }

    Ok(())
}
