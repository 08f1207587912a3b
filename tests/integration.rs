//! Integration tests for rfmforge

use rfmforge::{
    load_order_lines, predict_cluster, read_order_lines, run_pipeline, write_segments, Metric, Pipeline,
    PipelineConfig, QuantileFallback, Segment, SegmentationError,
};
use std::fs;
use std::io::Write;
use tempfile::{tempdir, NamedTempFile};

const HEADER: &str = "Invoice,StockCode,Description,Quantity,InvoiceDate,Price,Customer ID,Country";

/// Six customers: customer j places j orders of quantity j at 2.00 each, the
/// latest one (6 - j) * 7 days before 2011-12-09.
fn create_test_csv() -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "{}", HEADER).unwrap();

    for j in 1..=6i64 {
        for order in 0..j {
            let days_back = (6 - j) * 7 + order * 2;
            let date = chrono::NaiveDate::from_ymd_opt(2011, 12, 9).unwrap() - chrono::Duration::days(days_back);
            writeln!(
                file,
                "5{}{:02},85123A,WHITE HANGING HEART T-LIGHT HOLDER,{},{} 10:30:00,2.00,{}.0,United Kingdom",
                j,
                order,
                j,
                date,
                12000 + j
            )
            .unwrap();
        }
    }

    // cancelled, missing customer, malformed quantity, non-positive price
    writeln!(file, "C53601,22633,HAND WARMER UNION JACK,-6,2011-12-01 08:28:00,1.85,12001.0,United Kingdom").unwrap();
    writeln!(file, "536020,22633,HAND WARMER UNION JACK,6,2011-12-01 08:28:00,1.85,,United Kingdom").unwrap();
    writeln!(file, "536021,22633,HAND WARMER UNION JACK,six,2011-12-01 08:28:00,1.85,12002.0,United Kingdom").unwrap();
    writeln!(file, "536022,22633,HAND WARMER UNION JACK,6,2011-12-01 08:28:00,0.00,12003.0,United Kingdom").unwrap();

    file.flush().unwrap();
    file
}

#[test]
fn test_end_to_end_pipeline() {
    let test_file = create_test_csv();
    let raw = load_order_lines(test_file.path()).unwrap();
    assert_eq!(raw.len(), 25);

    let output = Pipeline::default().run(&raw).unwrap();

    assert_eq!(output.cleaning.input_rows, 25);
    assert_eq!(output.cleaning.kept, 21);
    assert_eq!(output.cleaning.cancelled, 1);
    assert_eq!(output.cleaning.missing_customer, 1);
    assert_eq!(output.cleaning.malformed, 1);
    assert_eq!(output.cleaning.non_positive_price, 1);
    assert_eq!(output.reference_date.to_string(), "2011-12-10 10:30:00");

    assert_eq!(output.customers.len(), 6);
    let first = &output.customers[0];
    assert_eq!(first.metrics.customer_id.as_str(), "12001");
    assert_eq!(first.metrics.frequency, 1);
    assert_eq!(first.metrics.monetary, 2.0);
    assert_eq!(first.metrics.recency_days, 36);

    let last = &output.customers[5];
    assert_eq!(last.metrics.customer_id.as_str(), "12006");
    assert_eq!(last.metrics.frequency, 6);
    assert_eq!(last.metrics.monetary, 72.0);
    assert_eq!(last.metrics.recency_days, 1);
    assert_eq!((last.scores.r, last.scores.f, last.scores.m), (5, 5, 5));
    assert_eq!(last.segment, Segment::Champions);

    assert_eq!((first.scores.r, first.scores.f, first.scores.m), (1, 1, 1));
    assert_eq!(first.segment, Segment::Lost);

    for customer in &output.customers {
        assert!(customer.cluster < 4);
        for score in [customer.scores.r, customer.scores.f, customer.scores.m] {
            assert!((1..=5).contains(&score));
        }
    }
    assert_eq!(output.cluster_counts().iter().sum::<usize>(), 6);
    assert!(output.convergence_warning.is_none());
}

#[test]
fn test_written_table_has_expected_schema() {
    let test_file = create_test_csv();
    let raw = load_order_lines(test_file.path()).unwrap();
    let output = Pipeline::default().run(&raw).unwrap();

    let dir = tempdir().unwrap();
    let path = dir.path().join("nested").join("segmented_customers.csv");
    write_segments(&path, &output.customers).unwrap();

    let text = fs::read_to_string(&path).unwrap();
    let mut lines = text.lines();
    assert_eq!(
        lines.next(),
        Some("CustomerID,Recency,Frequency,Monetary,R_Score,F_Score,M_Score,Segment,Cluster")
    );
    let rows: Vec<&str> = lines.collect();
    assert_eq!(rows.len(), 6);
    assert!(rows[0].starts_with("12001,36,1,2.0,1,1,1,Lost,"));
    assert!(rows[5].starts_with("12006,1,6,72.0,5,5,5,Champions,"));
}

#[test]
fn test_repeated_runs_write_identical_files() {
    let test_file = create_test_csv();
    let raw = load_order_lines(test_file.path()).unwrap();
    let dir = tempdir().unwrap();

    let mut contents = Vec::new();
    for name in ["first.csv", "second.csv"] {
        let output = run_pipeline(&raw, &PipelineConfig::default()).unwrap();
        let path = dir.path().join(name);
        write_segments(&path, &output.customers).unwrap();
        contents.push(fs::read(&path).unwrap());
    }

    assert_eq!(contents[0], contents[1]);
}

#[test]
fn test_prediction_matches_training_labels() {
    let test_file = create_test_csv();
    let raw = load_order_lines(test_file.path()).unwrap();
    let output = Pipeline::default().run(&raw).unwrap();

    for customer in &output.customers {
        let rfm = [
            f64::from(customer.metrics.recency_days),
            f64::from(customer.metrics.frequency),
            customer.metrics.monetary,
        ];
        let cluster = predict_cluster(&output.clusters, &rfm).unwrap();
        assert_eq!(cluster, customer.cluster);
    }
}

#[test]
fn test_tolerant_headers() {
    let csv = "\
invoice_no , customer_id, invoice_date ,QTY,unit_price
1,7,2011-01-01,1,1.0
2,8,2011-01-02,2,1.0
3,9,2011-01-03,3,1.0
4,10,2011-01-04,4,1.0
4b,10,2011-01-04,1,1.0
5,11,2011-01-05,6,1.0
";
    let raw = read_order_lines(csv.as_bytes()).unwrap();
    let output = Pipeline::default().run(&raw).unwrap();

    assert_eq!(output.customers.len(), 5);
    let ids: Vec<&str> = output.customers.iter().map(|c| c.metrics.customer_id.as_str()).collect();
    assert_eq!(ids, vec!["7", "8", "9", "10", "11"]);
}

#[test]
fn test_missing_column_is_reported() {
    let csv = "Invoice,InvoiceDate,Quantity,Price\n1,2011-01-01,1,1.0\n";
    let err = read_order_lines(csv.as_bytes()).unwrap_err();

    assert!(matches!(err, SegmentationError::MissingColumn { field: "customer id", .. }));
}

#[test]
fn test_only_cancellations_is_empty_dataset() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "{}", HEADER).unwrap();
    writeln!(file, "C1,1,X,-1,2011-01-01 10:00:00,2.0,7.0,UK").unwrap();
    writeln!(file, "C2,1,X,-3,2011-01-02 10:00:00,2.0,8.0,UK").unwrap();
    file.flush().unwrap();

    let raw = load_order_lines(file.path()).unwrap();
    let err = Pipeline::default().run(&raw).unwrap_err();

    assert!(matches!(err, SegmentationError::EmptyDataset));
}

#[test]
fn test_single_customer_cannot_be_scored() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "{}", HEADER).unwrap();
    writeln!(file, "1,1,X,2,2011-01-01 10:00:00,2.0,7.0,UK").unwrap();
    writeln!(file, "2,1,X,3,2011-01-05 10:00:00,2.0,7.0,UK").unwrap();
    file.flush().unwrap();

    let raw = load_order_lines(file.path()).unwrap();
    let err = Pipeline::default().run(&raw).unwrap_err();

    assert!(matches!(err, SegmentationError::Quantization { .. }));
}

#[test]
fn test_rank_fallback_for_tied_recency() {
    // every customer last ordered on the same day
    let csv = "\
Invoice,Customer ID,InvoiceDate,Quantity,Price
1,7,2011-01-01 09:00:00,1,1.0
2,8,2011-01-01 09:00:00,2,1.0
3,9,2011-01-01 09:00:00,3,1.0
4,10,2011-01-01 09:00:00,4,1.0
5,11,2011-01-01 09:00:00,5,1.0
";
    let raw = read_order_lines(csv.as_bytes()).unwrap();

    let strict = Pipeline::default().run(&raw).unwrap_err();
    assert!(matches!(
        strict,
        SegmentationError::Quantization {
            metric: Metric::Recency,
            ..
        }
    ));

    let config = PipelineConfig {
        quantile_fallback: QuantileFallback::RankFirst,
        ..PipelineConfig::default()
    };
    let output = run_pipeline(&raw, &config).unwrap();
    assert_eq!(output.quantile_fallbacks(), vec![Metric::Recency]);

    let recency_scores: Vec<u8> = output.customers.iter().map(|c| c.scores.r).collect();
    assert_eq!(recency_scores, vec![5, 4, 3, 2, 1]);
}

#[test]
fn test_latin1_description_does_not_abort_the_load() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "{}", HEADER).unwrap();
    for j in 1..=6 {
        writeln!(
            file,
            "{},22423,REGENCY CAKESTAND,{},2011-12-0{} 10:00:00,12.75,{}.0,United Kingdom",
            600 + j,
            j,
            j,
            12100 + j
        )
        .unwrap();
    }
    file.write_all(b"607,22999,GIFT \xA3 VOUCHER,1,2011-12-07 10:00:00,10.0,12107.0,United Kingdom\n")
        .unwrap();
    file.write_all(b"608,22998,MUG,1,2011-12-07 10:00:00,2.5,\xA312108,United Kingdom\n")
        .unwrap();
    file.flush().unwrap();

    let raw = load_order_lines(file.path()).unwrap();
    assert_eq!(raw.len(), 8);

    let output = Pipeline::default().run(&raw).unwrap();
    assert_eq!(output.cleaning.kept, 7);
    assert_eq!(output.cleaning.malformed, 1);
    assert_eq!(output.customers.len(), 7);
    assert_eq!(output.customers[6].metrics.customer_id.as_str(), "12107");
}
