// SPDX-License-Identifier: MIT OR Apache-2.0

//! Similarity search over the embedding store

use anyhow::Result;
use colored::Colorize;
use serde::Serialize;
use std::path::Path;
use std::time::Instant;

use crate::cli::OutputFormat;
use crate::session;
use embedsearch::embedding::SimilarityResult;
use embedsearch::output::{colorize_dim, colorize_id, colorize_score, print_json, use_colors};

/// Search response for JSON output
#[derive(Debug, Serialize)]
struct SearchResponse<'a> {
    query: &'a str,
    limit: usize,
    elapsed_ms: u128,
    results: &'a [SimilarityResult],
}

/// Render results as ranked text lines
pub fn format_results(results: &[SimilarityResult], use_color: bool) -> Vec<String> {
    results
        .iter()
        .enumerate()
        .map(|(rank, result)| {
            format!(
                "{:>3}. {}  {} {}",
                rank + 1,
                colorize_id(result.item_id.as_str(), use_color),
                colorize_score(result.similarity, use_color),
                colorize_dim(&format!("(distance {:.4})", result.distance), use_color),
            )
        })
        .collect()
}

/// Run the search command
pub fn run(query: &str, limit: Option<usize>, store: Option<&Path>, format: OutputFormat) -> Result<()> {
    let session = session::open_for_search(store)?;
    let limit = limit.unwrap_or_else(|| session.config.search().default_limit());

    let start = Instant::now();
    let results = session.engine.search(query, limit)?;
    let elapsed_ms = start.elapsed().as_millis();

    match format {
        OutputFormat::Json => print_json(&SearchResponse {
            query,
            limit,
            elapsed_ms,
            results: &results,
        })?,
        OutputFormat::Text => {
            if results.is_empty() {
                println!("{} No matches for: {}", "✗".red(), query.yellow());
                return Ok(());
            }
            for line in format_results(&results, use_colors()) {
                println!("{}", line);
            }
            println!(
                "{}",
                format!("{} results in {}ms", results.len(), elapsed_ms).dimmed()
            );
        }
    }

    Ok(())
}
