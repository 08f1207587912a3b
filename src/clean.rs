//! Record cleaning: turns raw order lines into validated, priced lines

use crate::data::RawOrderLine;
use crate::error::SegmentationError;
use crate::types::CustomerId;
use chrono::{DateTime, NaiveDate, NaiveDateTime};

/// Invoice prefix that marks a cancellation in the Online Retail ledgers
pub const DEFAULT_CANCELLATION_PREFIX: &str = "C";

const NULL_MARKERS: &[&str] = &["nan", "null", "na", "none"];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%m/%d/%Y %H:%M",
    "%m/%d/%Y %H:%M:%S",
];

/// A validated order line
#[derive(Debug, Clone, PartialEq)]
pub struct OrderLine {
    pub order_id: String,
    pub customer_id: CustomerId,
    pub timestamp: NaiveDateTime,
    pub quantity: i64,
    pub unit_price: f64,
    /// `quantity * unit_price`
    pub revenue: f64,
}

/// Why a raw line did not make it through cleaning
#[derive(Debug)]
pub enum Rejection {
    MissingCustomer,
    Cancelled,
    NonPositiveQuantity,
    NonPositivePrice,
    Malformed(SegmentationError),
}

impl From<SegmentationError> for Rejection {
    fn from(err: SegmentationError) -> Self {
        Rejection::Malformed(err)
    }
}

/// Row counts per cleaning outcome
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleaningReport {
    pub input_rows: usize,
    pub kept: usize,
    pub missing_customer: usize,
    pub cancelled: usize,
    pub non_positive_quantity: usize,
    pub non_positive_price: usize,
    pub malformed: usize,
}

impl CleaningReport {
    pub fn rejected(&self) -> usize {
        self.input_rows - self.kept
    }

    fn record(&mut self, rejection: &Rejection) {
        match rejection {
            Rejection::MissingCustomer => self.missing_customer += 1,
            Rejection::Cancelled => self.cancelled += 1,
            Rejection::NonPositiveQuantity => self.non_positive_quantity += 1,
            Rejection::NonPositivePrice => self.non_positive_price += 1,
            Rejection::Malformed(_) => self.malformed += 1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CleanedRecords {
    pub lines: Vec<OrderLine>,
    pub report: CleaningReport,
}

#[derive(Debug, Clone)]
pub struct RecordCleaner {
    cancellation_prefix: String,
}

impl Default for RecordCleaner {
    fn default() -> Self {
        Self::new(DEFAULT_CANCELLATION_PREFIX)
    }
}

impl RecordCleaner {
    pub fn new(cancellation_prefix: impl Into<String>) -> Self {
        Self {
            cancellation_prefix: cancellation_prefix.into(),
        }
    }

    /// Validate a single raw line.
    ///
    /// Checks run in a fixed order: encoding, customer, order id,
    /// cancellation, quantity, unit price, timestamp. The first failure is
    /// the reported reason.
    pub fn clean_line(&self, raw: &RawOrderLine) -> Result<OrderLine, Rejection> {
        if let Some(field) = raw.undecodable {
            return Err(SegmentationError::data(raw.row, format!("{field} is not valid UTF-8")).into());
        }

        let customer_id = match raw.customer_id.as_deref() {
            Some(id) if !is_null_marker(id) => CustomerId::new(id),
            _ => return Err(Rejection::MissingCustomer),
        };

        let order_id = raw
            .order_id
            .as_deref()
            .ok_or_else(|| SegmentationError::data(raw.row, "missing order id"))?;
        if !self.cancellation_prefix.is_empty() && order_id.starts_with(&self.cancellation_prefix) {
            return Err(Rejection::Cancelled);
        }

        let quantity = parse_quantity(raw.row, raw.quantity.as_deref())?;
        if quantity <= 0 {
            return Err(Rejection::NonPositiveQuantity);
        }

        let unit_price = parse_price(raw.row, raw.unit_price.as_deref())?;
        if unit_price <= 0.0 || !unit_price.is_finite() {
            return Err(Rejection::NonPositivePrice);
        }

        let revenue = quantity as f64 * unit_price;
        if !revenue.is_finite() {
            return Err(SegmentationError::data(raw.row, format!("revenue {quantity} x {unit_price} overflows")).into());
        }

        let timestamp = parse_timestamp(raw.row, raw.timestamp.as_deref())?;

        Ok(OrderLine {
            order_id: order_id.to_string(),
            customer_id,
            timestamp,
            quantity,
            unit_price,
            revenue,
        })
    }

    /// Clean a whole ledger.
    ///
    /// Malformed rows are dropped and counted, never fatal. An empty result is
    /// returned as-is; the aggregator turns it into `EmptyDataset`.
    pub fn clean(&self, raw: &[RawOrderLine]) -> CleanedRecords {
        let mut report = CleaningReport {
            input_rows: raw.len(),
            ..CleaningReport::default()
        };
        let mut lines = Vec::with_capacity(raw.len());

        for row in raw {
            match self.clean_line(row) {
                Ok(line) => lines.push(line),
                Err(rejection) => {
                    if let Rejection::Malformed(err) = &rejection {
                        log::debug!("Dropping row: {}", err);
                    }
                    report.record(&rejection);
                }
            }
        }
        report.kept = lines.len();

        if report.malformed > 0 {
            log::warn!("Dropped {} malformed rows", report.malformed);
        }
        log::info!(
            "Cleaning kept {} of {} rows ({} missing customer, {} cancelled, {} bad quantity, {} bad price)",
            report.kept,
            report.input_rows,
            report.missing_customer,
            report.cancelled,
            report.non_positive_quantity,
            report.non_positive_price
        );

        CleanedRecords { lines, report }
    }
}

fn is_null_marker(value: &str) -> bool {
    NULL_MARKERS.iter().any(|m| value.eq_ignore_ascii_case(m))
}

fn parse_quantity(row: usize, value: Option<&str>) -> crate::Result<i64> {
    let text = value.ok_or_else(|| SegmentationError::data(row, "missing quantity"))?;
    if let Ok(quantity) = text.parse::<i64>() {
        return Ok(quantity);
    }
    match text.parse::<f64>() {
        Ok(q) if q.is_finite() && q.fract() == 0.0 && q.abs() < i64::MAX as f64 => Ok(q as i64),
        _ => Err(SegmentationError::data(row, format!("invalid quantity {text:?}"))),
    }
}

fn parse_price(row: usize, value: Option<&str>) -> crate::Result<f64> {
    let text = value.ok_or_else(|| SegmentationError::data(row, "missing unit price"))?;
    text.parse::<f64>()
        .map_err(|_| SegmentationError::data(row, format!("invalid unit price {text:?}")))
}

/// Parse an order timestamp into a naive UTC datetime
pub fn parse_timestamp(row: usize, value: Option<&str>) -> crate::Result<NaiveDateTime> {
    let text = value.ok_or_else(|| SegmentationError::data(row, "missing timestamp"))?;

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Ok(dt.naive_utc());
    }
    if let Some(dt) = DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
    {
        return Ok(dt);
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .ok_or_else(|| SegmentationError::data(row, format!("unparsable timestamp {text:?}")))
}
