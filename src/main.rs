//! rfmforge: customer segmentation CLI
//!
//! Loads an order ledger, runs the RFM segmentation pipeline, writes the
//! segmented customer table and prints run summaries. With `--predict` it
//! reports the cluster a new (recency, frequency, monetary) triple falls into.

use anyhow::{Context, Result};
use clap::Parser;
use env_logger::Env;
use rfmforge::report::{format_cleaning_summary, format_cluster_statistics, format_segment_summary};
use rfmforge::{load_order_lines, predict_cluster, write_segments, Args, Pipeline, PipelineOutput};
use std::time::Instant;

const SILHOUETTE_SAMPLE: usize = 100;

fn main() -> Result<()> {
    let args = Args::parse();

    let default_filter = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(default_filter)).init();

    if let Some(rfm_values) = args.parse_rfm_values()? {
        run_prediction_mode(&args, rfm_values)
    } else {
        run_full_pipeline(&args)
    }
}

fn fit(args: &Args) -> Result<PipelineOutput> {
    let config = args.pipeline_config().context("Invalid configuration")?;

    log::info!("Loading order lines from {}", args.input);
    let raw = load_order_lines(&args.input)
        .with_context(|| format!("Failed to load order lines from {}", args.input))?;

    Pipeline::new(config)
        .run(&raw)
        .with_context(|| format!("Segmentation of {} failed", args.input))
}

/// Run prediction mode for a single customer
fn run_prediction_mode(args: &Args, rfm_values: [f64; 3]) -> Result<()> {
    println!("=== Prediction Mode ===");
    println!(
        "Input RFM values: R={}, F={}, M={}",
        rfm_values[0], rfm_values[1], rfm_values[2]
    );

    let start_time = Instant::now();
    let output = fit(args)?;
    let cluster = predict_cluster(&output.clusters, &rfm_values)?;

    println!("\nPredicted Cluster: {}", cluster);
    log::debug!("Processing time: {:.2}s", start_time.elapsed().as_secs_f64());

    let cluster_sizes = output.cluster_counts();
    let total_customers = output.customers.len();
    let cluster_percentage = cluster_sizes[cluster] as f64 / total_customers as f64 * 100.0;
    let centroid = output.clusters.model.centroids.row(cluster);

    println!("\nCluster {} details:", cluster);
    println!(
        "  Size: {} customers ({:.1}% of total)",
        cluster_sizes[cluster], cluster_percentage
    );
    println!(
        "  Centroid (standardized): R={:.2}, F={:.2}, M={:.2}",
        centroid[0], centroid[1], centroid[2]
    );

    Ok(())
}

/// Run the full segmentation pipeline and export the result
fn run_full_pipeline(args: &Args) -> Result<()> {
    let start_time = Instant::now();
    let output = fit(args)?;

    write_segments(&args.output, &output.customers)
        .with_context(|| format!("Failed to write {}", args.output))?;

    println!("{}", format_cleaning_summary(&output.cleaning));
    println!("Reference date: {}\n", output.reference_date);
    for metric in output.quantile_fallbacks() {
        println!("Note: {} scored on first-seen rank", metric);
    }
    println!("{}", format_segment_summary(&output));
    println!("{}", format_cluster_statistics(&output, SILHOUETTE_SAMPLE));

    println!("=== Pipeline Complete ===");
    println!("Total processing time: {:.2}s", start_time.elapsed().as_secs_f64());
    println!("Segmented customers saved to: {}", args.output);

    Ok(())
}
