//! Canopy Command-Line Interface
//!
//! A CLI tool for inspecting and querying Annoy index files.
//!
//! # Commands
//!
//! - `query` - Look up the nearest neighbors of an indexed item
//! - `info` - Display index metadata (node size, node count, tree count)
//!
//! The dimension and metric are not stored in the file; both commands take
//! them as arguments, exactly as the builder was invoked.

use clap::{ArgAction, Parser, Subcommand};
use serde::Serialize;
use std::path::Path;
use tracing_subscriber::EnvFilter;

use canopy::distance::{cosine_margin, dot_margin, euclidean_distance};
use canopy::{DistanceMetric, ForestConfig, ForestIndex};

/// Canopy CLI - query engine for Annoy forests
#[derive(Parser, Debug)]
#[command(name = "canopy")]
#[command(author, version, about = "Annoy forest query CLI", long_about = None)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Look up the nearest neighbors of an indexed item
    Query {
        /// Path to the index file
        index: String,
        /// Vector dimensionality the index was built with
        dimension: usize,
        /// Metric: angular, euclidean, or dot
        metric: String,
        /// Item id to use as the query point
        item: usize,
        /// Number of neighbors to return
        #[arg(short, long, default_value = "10")]
        k: usize,
        /// Emit the result as JSON instead of plain text
        #[arg(long)]
        json: bool,
    },
    /// Display index metadata
    Info {
        /// Path to the index file
        index: String,
        /// Vector dimensionality the index was built with
        dimension: usize,
        /// Metric: angular, euclidean, or dot
        metric: String,
    },
}

fn main() {
    let cli = Cli::parse();

    // Initialize tracing based on verbosity
    let filter = match cli.verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let result = match cli.command {
        Commands::Query {
            index,
            dimension,
            metric,
            item,
            k,
            json,
        } => cmd_query(&index, dimension, &metric, item, k, json),
        Commands::Info {
            index,
            dimension,
            metric,
        } => cmd_info(&index, dimension, &metric),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn parse_metric(s: &str) -> Result<DistanceMetric, Box<dyn std::error::Error>> {
    match s.to_lowercase().as_str() {
        "angular" | "cosine" => Ok(DistanceMetric::Angular),
        "euclidean" | "l2" => Ok(DistanceMetric::Euclidean),
        "dot" => Ok(DistanceMetric::Dot),
        _ => Err(format!("Unknown metric: {}. Use: angular, euclidean, dot", s).into()),
    }
}

/// Score shown next to each neighbor: the metric's natural display value
/// (cosine margin, Euclidean distance, or dot product).
fn display_score(metric: DistanceMetric, query: &[f32], neighbor: &[f32]) -> f32 {
    match metric {
        DistanceMetric::Angular => cosine_margin(query, neighbor),
        DistanceMetric::Euclidean => euclidean_distance(query, neighbor),
        DistanceMetric::Dot => dot_margin(query, neighbor),
    }
}

#[derive(Serialize)]
struct NeighborRecord {
    item: usize,
    score: f32,
}

#[derive(Serialize)]
struct QueryRecord {
    query: usize,
    vector: Vec<f32>,
    neighbors: Vec<NeighborRecord>,
}

/// Query the nearest neighbors of an indexed item
fn cmd_query(
    path: &str,
    dimension: usize,
    metric_str: &str,
    item: usize,
    k: usize,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if !Path::new(path).exists() {
        return Err(format!("Index not found: {}", path).into());
    }

    let metric = parse_metric(metric_str)?;
    let config = ForestConfig {
        dimensions: dimension,
        metric,
        ..Default::default()
    };
    let index = ForestIndex::open(path, config)?;

    let query = index.item_vector(item)?;
    let neighbors = index.nearest(&query, k)?;

    if json {
        let mut records = Vec::with_capacity(neighbors.len());
        for nn in &neighbors {
            let v = index.item_vector(*nn)?;
            records.push(NeighborRecord {
                item: *nn,
                score: display_score(metric, &query, &v),
            });
        }
        let record = QueryRecord {
            query: item,
            vector: query,
            neighbors: records,
        };
        println!("{}", serde_json::to_string_pretty(&record)?);
    } else {
        print!("vector[{}]: ", item);
        for x in &query {
            print!("{:.2} ", x);
        }
        println!();

        for nn in &neighbors {
            let v = index.item_vector(*nn)?;
            println!("{} {} {:.6}", item, nn, display_score(metric, &query, &v));
        }
    }

    Ok(())
}

/// Display index metadata
fn cmd_info(
    path: &str,
    dimension: usize,
    metric_str: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    if !Path::new(path).exists() {
        return Err(format!("Index not found: {}", path).into());
    }

    let metric = parse_metric(metric_str)?;
    let config = ForestConfig {
        dimensions: dimension,
        metric,
        ..Default::default()
    };
    let index = ForestIndex::open(path, config)?;
    let file_size = std::fs::metadata(path)?.len();

    println!("Index: {}", path);
    println!(
        "File size: {} bytes ({:.2} KB)",
        file_size,
        file_size as f64 / 1024.0
    );
    println!("Metric: {}", metric_str.to_lowercase());
    println!("Dimensions: {}", dimension);
    println!("Node size: {} bytes", index.node_size()?);
    println!("Nodes: {}", index.node_count()?);
    println!("Trees: {}", index.tree_count()?);

    Ok(())
}
