//! Subcommand handlers.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{bail, Context};
use bitrank_core::{
    BitrankConfig, ChunkFilter, DocumentChunk, HybridRetriever, IndexKind, RetrievalApi,
    RetrievalRequest,
};
use tracing::{info, warn};

/// Arguments of the `query` subcommand.
pub struct QueryArgs {
    pub embedding: String,
    pub top_k: Option<usize>,
    pub pool: Option<usize>,
    pub product_id: Option<String>,
    pub theme: Option<String>,
    pub source: Option<String>,
    pub json: bool,
}

fn open(config: &BitrankConfig, snapshot: &Path) -> anyhow::Result<HybridRetriever> {
    HybridRetriever::load(snapshot, config.search)
        .with_context(|| format!("loading snapshot {}", snapshot.display()))
}

fn read_corpus(path: &Path) -> anyhow::Result<Vec<DocumentChunk>> {
    let file = File::open(path).with_context(|| format!("opening corpus {}", path.display()))?;
    let mut chunks = Vec::new();
    for (line_no, line) in BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("reading {}", path.display()))?;
        if line.trim().is_empty() {
            continue;
        }
        let chunk: DocumentChunk = serde_json::from_str(&line)
            .with_context(|| format!("{}:{}: invalid chunk", path.display(), line_no + 1))?;
        chunks.push(chunk);
    }
    Ok(chunks)
}

fn parse_embedding(raw: &str) -> anyhow::Result<Vec<f32>> {
    if let Some(path) = raw.strip_prefix('@') {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading embedding file {path}"))?;
        return serde_json::from_str(&text).context("embedding file must hold a JSON array");
    }
    raw.split(',')
        .map(|v| {
            v.trim()
                .parse::<f32>()
                .with_context(|| format!("invalid embedding component '{v}'"))
        })
        .collect()
}

/// `bitrank ingest`
pub fn ingest(config: &BitrankConfig, corpus: &Path, out: &Path) -> anyhow::Result<()> {
    let chunks = read_corpus(corpus)?;
    let retriever = HybridRetriever::from_config(config).context("building retriever")?;

    let report = retriever.ingest_batch(chunks);
    for (chunk_id, err) in &report.failed {
        warn!(chunk_id, error = %err, "chunk skipped");
    }
    if matches!(config.index.kind, IndexKind::Partitioned(_)) {
        let outcome = retriever.reindex().context("reindexing")?;
        info!(partitions = outcome.partitions, "index rebuilt");
    }
    retriever
        .save(out)
        .with_context(|| format!("writing snapshot {}", out.display()))?;

    println!(
        "Ingested {} chunks ({} rejected) into {}",
        report.inserted,
        report.failed.len(),
        out.display()
    );
    Ok(())
}

/// `bitrank query`
pub fn query(config: &BitrankConfig, snapshot: &Path, args: &QueryArgs) -> anyhow::Result<()> {
    let retriever = open(config, snapshot)?;
    let filters = ChunkFilter {
        product_id: args.product_id.clone(),
        theme: args.theme.clone(),
        source: args.source.clone(),
    };
    let request = RetrievalRequest {
        embedding: parse_embedding(&args.embedding)?,
        filters,
        top_k: args.top_k,
        candidate_pool: args.pool,
    };

    let response = retriever.retrieve(&request).context("query failed")?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    for warning in &response.warnings {
        eprintln!("warning: {warning}");
    }
    if response.results.is_empty() {
        println!("No results.");
    }
    for (rank, hit) in response.results.iter().enumerate() {
        println!("{:>3}. [{}] {:.4}  {}", rank + 1, hit.chunk_id, hit.score, hit.text);
    }
    Ok(())
}

/// `bitrank reindex`
pub fn reindex(config: &BitrankConfig, snapshot: &Path) -> anyhow::Result<()> {
    let retriever = open(config, snapshot)?;
    let outcome = retriever.reindex().context("reindexing")?;
    retriever
        .save(snapshot)
        .with_context(|| format!("writing snapshot {}", snapshot.display()))?;

    println!(
        "Reclaimed {} slots, built {} partitions in {} iterations",
        outcome.reclaimed, outcome.partitions, outcome.iterations
    );
    if let Some(report) = outcome.recall {
        println!(
            "Recall {:.3} (worst {:.3}, threshold {:.3}), precision {:.3}, MRR {:.3}: {}",
            report.mean_recall,
            report.worst_recall,
            report.threshold,
            report.mean_precision,
            report.mrr,
            if report.passed { "ok" } else { "degraded" }
        );
    }
    Ok(())
}

/// `bitrank validate`
pub fn validate(
    config: &BitrankConfig,
    snapshot: &Path,
    queries: usize,
    pool: usize,
) -> anyhow::Result<()> {
    let retriever = open(config, snapshot)?;
    let Some(report) = retriever.measure_recall(queries, pool)? else {
        println!("Index has no partitions; flat scans are exact.");
        return Ok(());
    };

    println!("{}", serde_json::to_string_pretty(&report)?);
    if !report.passed {
        bail!(
            "mean recall {:.3} below threshold {:.3}",
            report.mean_recall,
            report.threshold
        );
    }
    Ok(())
}

/// `bitrank stats`
pub fn stats(config: &BitrankConfig, snapshot: &Path) -> anyhow::Result<()> {
    let retriever = open(config, snapshot)?;
    println!("{}", serde_json::to_string_pretty(&retriever.stats())?);
    Ok(())
}
