//! CSV loading of raw order lines and writing of the segmented customer table

use crate::error::SegmentationError;
use crate::pipeline::SegmentedCustomer;
use crate::types::CustomerId;
use csv::{ByteRecord, ReaderBuilder, StringRecord, Trim, Writer};
use serde::Serialize;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;

/// One input row as text, before any validation.
///
/// Empty cells are `None`. `row` is the 1-based data row number (the header
/// is not counted) and is only used for diagnostics. Only the five mapped
/// cells are decoded; `undecodable` names the first of them that was not
/// valid UTF-8, and the cleaner drops such a row as malformed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawOrderLine {
    pub row: usize,
    pub order_id: Option<String>,
    pub customer_id: Option<String>,
    pub timestamp: Option<String>,
    pub quantity: Option<String>,
    pub unit_price: Option<String>,
    pub undecodable: Option<&'static str>,
}

const ORDER_ID_ALIASES: &[&str] = &["invoice", "invoiceno", "invoiceid", "orderid", "order"];
const CUSTOMER_ID_ALIASES: &[&str] = &["customerid", "customer", "custid"];
const TIMESTAMP_ALIASES: &[&str] = &["invoicedate", "orderdate", "timestamp", "date", "datetime"];
const QUANTITY_ALIASES: &[&str] = &["quantity", "qty"];
const UNIT_PRICE_ALIASES: &[&str] = &["price", "unitprice"];

/// Positions of the five semantic fields within a CSV header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnMap {
    pub order_id: usize,
    pub customer_id: usize,
    pub timestamp: usize,
    pub quantity: usize,
    pub unit_price: usize,
}

impl ColumnMap {
    /// Resolve the semantic fields from header names.
    ///
    /// Matching ignores case, surrounding whitespace, and any spaces,
    /// underscores or hyphens, so `Customer ID`, `customer_id` and
    /// `CustomerID` all resolve to the customer column.
    pub fn resolve(headers: &StringRecord) -> crate::Result<Self> {
        let normalized: Vec<String> = headers.iter().map(normalize_header).collect();
        let find = |field: &'static str, aliases: &[&str]| {
            aliases
                .iter()
                .find_map(|alias| normalized.iter().position(|h| h == alias))
                .ok_or_else(|| SegmentationError::MissingColumn {
                    field,
                    headers: headers.iter().collect::<Vec<_>>().join(", "),
                })
        };

        Ok(Self {
            order_id: find("order id", ORDER_ID_ALIASES)?,
            customer_id: find("customer id", CUSTOMER_ID_ALIASES)?,
            timestamp: find("timestamp", TIMESTAMP_ALIASES)?,
            quantity: find("quantity", QUANTITY_ALIASES)?,
            unit_price: find("unit price", UNIT_PRICE_ALIASES)?,
        })
    }

    fn extract(&self, row: usize, record: &ByteRecord) -> RawOrderLine {
        let mut undecodable = None;
        let mut cell = |idx: usize, field: &'static str| {
            let bytes = record.get(idx)?;
            match std::str::from_utf8(bytes) {
                Ok(text) => Some(text.trim()).filter(|s| !s.is_empty()).map(str::to_string),
                Err(_) => {
                    undecodable.get_or_insert(field);
                    None
                }
            }
        };

        let order_id = cell(self.order_id, "order id");
        let customer_id = cell(self.customer_id, "customer id");
        let timestamp = cell(self.timestamp, "timestamp");
        let quantity = cell(self.quantity, "quantity");
        let unit_price = cell(self.unit_price, "unit price");

        RawOrderLine {
            row,
            order_id,
            customer_id,
            timestamp,
            quantity,
            unit_price,
            undecodable,
        }
    }
}

fn normalize_header(header: &str) -> String {
    header
        .trim()
        .chars()
        .filter(|c| !matches!(c, ' ' | '_' | '-'))
        .flat_map(char::to_lowercase)
        .collect()
}

/// Read raw order lines from any CSV source with a header row
pub fn read_order_lines<R: Read>(source: R) -> crate::Result<Vec<RawOrderLine>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(source);

    let headers = StringRecord::from_byte_record_lossy(reader.byte_headers()?.clone());
    let columns = ColumnMap::resolve(&headers)?;
    log::debug!("Resolved input columns: {:?}", columns);

    // cells outside the five mapped columns are never decoded
    let mut lines = Vec::new();
    for (idx, record) in reader.byte_records().enumerate() {
        let record = record?;
        lines.push(columns.extract(idx + 1, &record));
    }

    Ok(lines)
}

/// Load raw order lines from a CSV file
pub fn load_order_lines<P: AsRef<Path>>(path: P) -> crate::Result<Vec<RawOrderLine>> {
    let file = File::open(path.as_ref())?;
    let lines = read_order_lines(file)?;
    log::info!(
        "Loaded {} order lines from {}",
        lines.len(),
        path.as_ref().display()
    );
    Ok(lines)
}

/// Output schema, one row per customer
#[derive(Debug, Serialize)]
struct OutputRow<'a> {
    #[serde(rename = "CustomerID")]
    customer_id: &'a CustomerId,
    #[serde(rename = "Recency")]
    recency: u32,
    #[serde(rename = "Frequency")]
    frequency: u32,
    #[serde(rename = "Monetary")]
    monetary: f64,
    #[serde(rename = "R_Score")]
    r_score: u8,
    #[serde(rename = "F_Score")]
    f_score: u8,
    #[serde(rename = "M_Score")]
    m_score: u8,
    #[serde(rename = "Segment")]
    segment: &'static str,
    #[serde(rename = "Cluster")]
    cluster: usize,
}

impl<'a> From<&'a SegmentedCustomer> for OutputRow<'a> {
    fn from(customer: &'a SegmentedCustomer) -> Self {
        Self {
            customer_id: &customer.metrics.customer_id,
            recency: customer.metrics.recency_days,
            frequency: customer.metrics.frequency,
            monetary: customer.metrics.monetary,
            r_score: customer.scores.r,
            f_score: customer.scores.f,
            m_score: customer.scores.m,
            segment: customer.segment.label(),
            cluster: customer.cluster,
        }
    }
}

/// Write the segmented table as CSV to any sink
pub fn write_segments_to<W: Write>(sink: W, customers: &[SegmentedCustomer]) -> crate::Result<()> {
    let mut writer = Writer::from_writer(sink);
    for customer in customers {
        writer.serialize(OutputRow::from(customer))?;
    }
    writer.flush()?;
    Ok(())
}

/// Write the segmented table to a CSV file, creating parent directories
pub fn write_segments<P: AsRef<Path>>(path: P, customers: &[SegmentedCustomer]) -> crate::Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    write_segments_to(File::create(path)?, customers)?;
    log::info!("Wrote {} customers to {}", customers.len(), path.display());
    Ok(())
}
