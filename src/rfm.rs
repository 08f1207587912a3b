//! Per-customer Recency / Frequency / Monetary aggregation

use crate::clean::OrderLine;
use crate::error::SegmentationError;
use crate::types::{CustomerId, Metric};
use chrono::{Duration, NaiveDateTime};
use ndarray::Array2;
use std::collections::{BTreeMap, HashSet};

/// Raw RFM metrics for one customer
#[derive(Debug, Clone, PartialEq)]
pub struct CustomerMetrics {
    pub customer_id: CustomerId,
    /// Whole days between the last order and the reference date
    pub recency_days: u32,
    /// Number of distinct orders
    pub frequency: u32,
    /// Total revenue over all of the customer's lines
    pub monetary: f64,
}

impl CustomerMetrics {
    pub fn value(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Recency => f64::from(self.recency_days),
            Metric::Frequency => f64::from(self.frequency),
            Metric::Monetary => self.monetary,
        }
    }
}

/// RFM metrics for a whole population, ordered by customer id
#[derive(Debug, Clone)]
pub struct RfmTable {
    pub reference_date: NaiveDateTime,
    pub customers: Vec<CustomerMetrics>,
}

impl RfmTable {
    /// Raw (recency, frequency, monetary) matrix, one row per customer
    pub fn raw_features(&self) -> Array2<f64> {
        let mut features = Array2::zeros((self.customers.len(), 3));
        for (mut row, customer) in features.outer_iter_mut().zip(&self.customers) {
            row[0] = f64::from(customer.recency_days);
            row[1] = f64::from(customer.frequency);
            row[2] = customer.monetary;
        }
        features
    }

    pub fn len(&self) -> usize {
        self.customers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.customers.is_empty()
    }
}

/// One day after the latest order in the ledger
pub fn default_reference_date(lines: &[OrderLine]) -> crate::Result<NaiveDateTime> {
    lines
        .iter()
        .map(|line| line.timestamp)
        .max()
        .map(|latest| latest + Duration::days(1))
        .ok_or(SegmentationError::EmptyDataset)
}

#[derive(Default)]
struct Accumulator<'a> {
    last_order: Option<NaiveDateTime>,
    orders: HashSet<&'a str>,
    monetary: f64,
}

/// Aggregate cleaned lines into one metrics row per customer.
///
/// The reference date is global to the ledger. An explicit override must lie
/// strictly after the latest order so recency stays non-negative.
pub fn aggregate(lines: &[OrderLine], reference_override: Option<NaiveDateTime>) -> crate::Result<RfmTable> {
    let derived = default_reference_date(lines)?;
    let reference_date = match reference_override {
        Some(reference) if reference + Duration::days(1) <= derived => {
            return Err(SegmentationError::config(format!(
                "reference date {} is not after the latest order ({})",
                reference,
                derived - Duration::days(1)
            )));
        }
        Some(reference) => reference,
        None => derived,
    };

    let mut by_customer: BTreeMap<&CustomerId, Accumulator> = BTreeMap::new();
    for line in lines {
        let acc = by_customer.entry(&line.customer_id).or_default();
        acc.last_order = Some(acc.last_order.map_or(line.timestamp, |t| t.max(line.timestamp)));
        acc.orders.insert(line.order_id.as_str());
        acc.monetary += line.revenue;
    }

    let customers = by_customer
        .into_iter()
        .map(|(customer_id, acc)| -> crate::Result<CustomerMetrics> {
            // every accumulator saw at least one line
            let last_order = acc.last_order.unwrap_or(reference_date);
            let days = (reference_date - last_order).num_days();
            let recency_days = u32::try_from(days).map_err(|_| {
                SegmentationError::config(format!("recency of {days} days for customer {customer_id}"))
            })?;
            let frequency = u32::try_from(acc.orders.len())
                .map_err(|_| SegmentationError::config("order count overflow"))?;

            Ok(CustomerMetrics {
                customer_id: customer_id.clone(),
                recency_days,
                frequency,
                monetary: acc.monetary,
            })
        })
        .collect::<crate::Result<Vec<_>>>()?;

    log::info!(
        "Aggregated {} lines into {} customers (reference date {})",
        lines.len(),
        customers.len(),
        reference_date
    );

    Ok(RfmTable {
        reference_date,
        customers,
    })
}
