use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use itertools::Itertools;
use std::path::Path;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use crate::config::Config;
use crate::documents::load_folder;
use crate::embeddings::{chunk_page, provider_from_config};
use crate::store::{CancelFlag, IngestOutcome, KnowledgeStore, SearchResult, StoreOptions};

/// Chunk every page in `folder` without embedding and print per-source counts
#[inline]
pub fn show_chunks(config: &Config, folder: &Path) -> Result<()> {
    let loaded = load_folder(folder)?;

    if loaded.pages.is_empty() {
        println!("No documents found in {}", folder.display());
        println!("Add .txt or .md files to the folder and try again.");
        return Ok(());
    }

    let chunks: Vec<_> = loaded
        .pages
        .iter()
        .flat_map(|page| chunk_page(&page.text, &page.source, page.page, &config.chunking))
        .collect();

    println!(
        "📄 {} files, {} pages, {} chunks ({} files skipped)",
        loaded.files,
        loaded.pages.len(),
        chunks.len(),
        loaded.skipped
    );
    println!(
        "   Chunk size: {} < length <= {} characters",
        config.chunking.min_chars, config.chunking.target_chars
    );
    println!();

    let per_source = chunks.iter().map(|c| c.source.as_str()).counts();
    for (source, count) in per_source.into_iter().sorted() {
        println!("   {source}: {count} chunks");
    }

    if let Some((min, max)) = chunks.iter().map(|c| c.length).minmax().into_option() {
        println!();
        println!("   Shortest chunk: {min} characters");
        println!("   Longest chunk: {max} characters");
    }

    Ok(())
}

/// Ingest `folder` and print the fragments closest to `query`
#[inline]
pub async fn search(config: &Config, folder: &Path, query: &str, top_k: usize) -> Result<()> {
    let store = build_store(config, folder).await?;

    if !store.is_ready().await {
        println!("Nothing was indexed, so there is nothing to search.");
        return Ok(());
    }

    let results = store.query(query, top_k).await;
    print_results(&results);
    Ok(())
}

/// Ingest `folder` once, then answer one query per line read from stdin
#[inline]
pub async fn repl(config: &Config, folder: &Path, top_k: usize) -> Result<()> {
    let store = build_store(config, folder).await?;

    if !store.is_ready().await {
        println!("Nothing was indexed, so there is nothing to search.");
        return Ok(());
    }

    println!("Ask a question (Ctrl-D to quit):");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines
        .next_line()
        .await
        .context("Failed to read from stdin")?
    {
        let query = line.trim();
        if query.is_empty() {
            continue;
        }

        let results = store.query(query, top_k).await;
        print_results(&results);
        println!();
    }

    Ok(())
}

/// Create the configured provider and ingest every page in `folder`.
///
/// Ctrl-C while ingesting cancels the run.
#[inline]
pub async fn build_store(config: &Config, folder: &Path) -> Result<KnowledgeStore> {
    let loaded = load_folder(folder)?;
    let provider = provider_from_config(&config.provider)?;
    let store = KnowledgeStore::new(provider, StoreOptions::from_config(config));

    if loaded.pages.is_empty() {
        println!("No documents found in {}", folder.display());
        return Ok(store);
    }

    let cancel = CancelFlag::new();
    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, cancelling ingestion");
                cancel.cancel();
            }
        })
    };

    let bar = spinner(format!(
        "Indexing {} pages with {}",
        loaded.pages.len(),
        config.provider.model
    ));
    let result = store.ingest(loaded.pages, &cancel).await;
    bar.finish_and_clear();
    interrupt.abort();

    let report = result.context("Ingestion failed")?;
    match report.outcome {
        IngestOutcome::Indexed { chunks, dimension } => {
            info!("Indexed {} chunks of dimension {}", chunks, dimension);
            println!("✅ Indexed {chunks} chunks from {} pages", report.pages);
        }
        IngestOutcome::NothingToIndex => {
            println!("⚠️  No chunks were indexed from {} pages", report.pages);
        }
    }
    if report.failed_batches > 0 {
        println!(
            "⚠️  {} embedding batches failed, {} chunks left out",
            report.failed_batches, report.skipped_chunks
        );
    }

    Ok(store)
}

fn spinner(message: String) -> ProgressBar {
    let bar = if console::user_attended_stderr() {
        let style = ProgressStyle::with_template("{spinner} {msg} [{elapsed}]")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        let bar = ProgressBar::new_spinner().with_style(style);
        bar.enable_steady_tick(Duration::from_millis(100));
        bar
    } else {
        ProgressBar::hidden()
    };
    bar.set_message(message);
    bar
}

fn print_results(results: &[SearchResult]) {
    if results.is_empty() {
        println!("No matching fragments.");
        return;
    }

    for (rank, result) in results.iter().enumerate() {
        println!(
            "{}. {} (page {}) distance {:.4}",
            rank + 1,
            result.source,
            result.page,
            result.score
        );
        println!("   {}", result.text.split_whitespace().join(" "));
    }
}
