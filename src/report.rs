//! Console summaries of a pipeline run

use crate::clean::CleaningReport;
use crate::pipeline::PipelineOutput;
use std::fmt::Write;

/// Row counts from the cleaning stage
pub fn format_cleaning_summary(report: &CleaningReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "=== Cleaning ===");
    let _ = writeln!(out, "Input rows:            {}", report.input_rows);
    let _ = writeln!(out, "Kept:                  {}", report.kept);
    let _ = writeln!(out, "Missing customer:      {}", report.missing_customer);
    let _ = writeln!(out, "Cancelled:             {}", report.cancelled);
    let _ = writeln!(out, "Non-positive quantity: {}", report.non_positive_quantity);
    let _ = writeln!(out, "Non-positive price:    {}", report.non_positive_price);
    let _ = writeln!(out, "Malformed:             {}", report.malformed);
    out
}

/// Customers per segment with their share of the population
pub fn format_segment_summary(output: &PipelineOutput) -> String {
    let total = output.customers.len().max(1) as f64;
    let mut out = String::new();
    let _ = writeln!(out, "=== Segments ===");
    for (segment, count) in output.segment_counts() {
        let percentage = count as f64 / total * 100.0;
        let _ = writeln!(out, "{:<20} {:>6} ({:.1}%)", segment.label(), count, percentage);
    }
    out
}

/// Cluster sizes, centroids, inertia and a sampled silhouette score
pub fn format_cluster_statistics(output: &PipelineOutput, silhouette_sample: usize) -> String {
    let model = &output.clusters.model;
    let total = output.customers.len();
    let mut out = String::new();

    let _ = writeln!(out, "=== Cluster Statistics ===");
    let _ = writeln!(out, "Number of clusters: {}", model.n_clusters);
    let _ = writeln!(out, "Total customers: {}", total);
    let _ = writeln!(out, "Within-cluster sum of squares (Inertia): {:.2}", model.inertia);

    let silhouette = model.compute_silhouette_sample(&output.clusters.scaled, silhouette_sample);
    let _ = writeln!(out, "Silhouette score (sample): {:.3}", silhouette);
    if let Some(warning) = &output.convergence_warning {
        let _ = writeln!(out, "Warning: {}", warning);
    }

    let _ = writeln!(out, "\nCluster sizes:");
    for (i, size) in output.cluster_counts().into_iter().enumerate() {
        let percentage = size as f64 / total.max(1) as f64 * 100.0;
        let _ = writeln!(out, "  Cluster {}: {} customers ({:.1}%)", i, size, percentage);
    }

    let _ = writeln!(out, "\nCluster centroids (standardized):");
    let _ = writeln!(out, "  Cluster | Recency | Frequency | Monetary");
    let _ = writeln!(out, "  --------|---------|-----------|----------");
    for (i, centroid_row) in model.centroids.outer_iter().enumerate() {
        let _ = writeln!(
            out,
            "  {:7} | {:7.2} | {:9.2} | {:8.2}",
            i, centroid_row[0], centroid_row[1], centroid_row[2]
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cleaning_summary_lists_counts() {
        let report = CleaningReport {
            input_rows: 10,
            kept: 6,
            missing_customer: 1,
            cancelled: 2,
            non_positive_quantity: 0,
            non_positive_price: 0,
            malformed: 1,
        };
        let text = format_cleaning_summary(&report);

        assert!(text.contains("Input rows:            10"));
        assert!(text.contains("Cancelled:             2"));
        assert!(text.contains("Malformed:             1"));
    }

    #[test]
    fn test_segment_and_cluster_summaries() {
        let csv = "\
Invoice,Customer ID,InvoiceDate,Quantity,Price
1,7,2011-01-01 09:00:00,1,1.0
2,8,2011-01-02 09:00:00,2,1.0
3,9,2011-01-03 09:00:00,3,1.0
4,10,2011-01-04 09:00:00,4,1.0
5,11,2011-01-05 09:00:00,5,1.0
";
        let raw = crate::data::read_order_lines(csv.as_bytes()).unwrap();
        let output = crate::pipeline::Pipeline::default().run(&raw).unwrap();

        let segments = format_segment_summary(&output);
        for segment in crate::segment::Segment::ALL {
            assert!(segments.contains(segment.label()));
        }

        let clusters = format_cluster_statistics(&output, 100);
        assert!(clusters.contains("Number of clusters: 4"));
        assert!(clusters.contains("Total customers: 5"));
        assert!(!clusters.contains("Warning"));
    }
}
