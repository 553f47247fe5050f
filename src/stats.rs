//! Status report rendering for `nrag status`.
//!
//! Prints lifecycle state, index counts, the active embedding model and LLM
//! adapter, a per-source breakdown, and the outcome of the last build in
//! this process.

use chrono::{DateTime, Utc};

use crate::config::Config;
use crate::models::SystemStatus;

/// Print `status` as a human-readable report on stdout.
pub fn print_status(config: &Config, status: &SystemStatus) {
    println!("O-RAN / Nephio RAG Status");
    println!("=========================");
    println!();
    println!("  State:       {}", status.state);
    println!(
        "  Ready:       vectordb={} qa_chain={}",
        status.vectordb_ready, status.qa_chain_ready
    );
    println!("  Store:       {}", status.store_backend);
    if status.store_backend == "sqlite" {
        let size = std::fs::metadata(&config.store.path)
            .map(|m| m.len())
            .unwrap_or(0);
        println!("  Path:        {}", config.store.path.display());
        println!("  Size:        {}", format_bytes(size));
    }
    println!("  Embeddings:  {}", status.embedding_model);
    println!("  LLM:         {}", status.llm_provider);
    println!();
    println!("  Documents:   {}", status.document_count);
    println!("  Chunks:      {}", status.chunk_count);
    println!(
        "  Embedded:    {} / {} ({}%)",
        status.embedded_count,
        status.chunk_count,
        if status.chunk_count > 0 {
            (status.embedded_count * 100) / status.chunk_count
        } else {
            0
        }
    );

    if !status.sources.is_empty() {
        println!();
        println!("  By source:");
        println!(
            "  {:<28} {:>6} {:>8}   {}",
            "SOURCE", "DOCS", "CHUNKS", "LAST FETCH"
        );
        println!("  {}", "-".repeat(64));
        for s in &status.sources {
            let fetched = match s.last_fetched {
                Some(ts) => format_relative(ts, Utc::now()),
                None => "never".to_string(),
            };
            println!(
                "  {:<28} {:>6} {:>8}   {}",
                s.source, s.documents, s.chunks, fetched
            );
        }
    }

    if let Some(build) = &status.last_build {
        println!();
        println!(
            "  Last build:  {} documents, {} chunks, {} unchanged, {} removed, {} failed in {:.1}s",
            build.documents_indexed,
            build.chunks_indexed,
            build.documents_unchanged,
            build.documents_removed,
            build.failed.len(),
            build.elapsed_secs
        );
        for f in &build.failed {
            println!("    ✗ [{}] {}: {}", f.source, f.url, f.reason);
        }
    }

    println!();
}

/// Format a byte count as a human-readable string.
pub fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format `ts` relative to `now` (e.g. "3 hours ago").
pub fn format_relative(ts: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let delta = (now - ts).num_seconds();

    if delta < 0 {
        return ts.format("%Y-%m-%d %H:%M").to_string();
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        ts.format("%Y-%m-%d %H:%M").to_string()
    }
}
