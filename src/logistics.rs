use crate::metrics;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgPool};
use std::collections::HashSet;
use std::time::Instant;
use thiserror::Error;

/// A physical bag created when merchandise is handed over at a Return Bar.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ReturnBag {
    pub id: i64,
    pub return_id: String,
    pub location_id: Option<String>,
    pub retailer_id: Option<String>,
    pub barcode: String,
    pub label_layout: Option<String>,
}

/// A bag-to-hub shipment leg. Absent timestamps mean the milestone has not
/// happened yet.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Shipment {
    pub id: String,
    pub carrier: String,
    pub tracking: String,
    pub departure: Option<DateTime<Utc>>,
    pub estimated_arrival: Option<DateTime<Utc>>,
    pub arrival: Option<DateTime<Utc>>,
}

/// Join record written when the hub inducts a bag; its existence for a bag id
/// is the only induction signal there is.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ReturnBagInstance {
    pub id: i64,
    pub return_bag_id: i64,
    pub instance_id: String,
}

/// A hub-to-retailer-warehouse shipment leg.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct TrackedUnit {
    pub id: String,
    pub carrier: String,
    pub tracking: String,
    pub departure: Option<DateTime<Utc>>,
    pub arrival: Option<DateTime<Utc>>,
}

#[derive(Debug, Error)]
pub enum LogisticsError {
    #[error("empty key set")]
    EmptyInput,
    #[error("query failed: {0}")]
    Query(#[from] sqlx::Error),
}

/// Four read-only lookups over the logistics store. Each keyed operation
/// rejects an empty key set with `LogisticsError::EmptyInput`; the composer
/// treats that the same as zero rows.
#[async_trait]
pub trait LogisticsSource: Send + Sync {
    async fn bags_by_return(&self, return_id: &str) -> Result<Vec<ReturnBag>, LogisticsError>;

    async fn shipments_by_barcodes(
        &self,
        barcodes: &[String],
    ) -> Result<Vec<Shipment>, LogisticsError>;

    async fn induction_by_bag_ids(
        &self,
        bag_ids: &[i64],
    ) -> Result<Vec<ReturnBagInstance>, LogisticsError>;

    async fn outbound_by_instance_ids(
        &self,
        instance_ids: &[String],
    ) -> Result<Vec<TrackedUnit>, LogisticsError>;
}

#[derive(Debug, Clone)]
pub struct LogisticsStore {
    pool: PgPool,
}

impl LogisticsStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LogisticsSource for LogisticsStore {
    async fn bags_by_return(&self, return_id: &str) -> Result<Vec<ReturnBag>, LogisticsError> {
        if return_id.is_empty() {
            return Err(LogisticsError::EmptyInput);
        }
        let started = Instant::now();
        let rows = sqlx::query_as::<_, ReturnBag>(
            "select id, return_id, location_id, retailer_id, barcode, label_layout \
             from frontman.return_bag where return_id = $1",
        )
        .bind(return_id)
        .fetch_all(&self.pool)
        .await?;
        metrics::lookup_elapsed("bags_by_return", started.elapsed().as_millis());
        Ok(rows)
    }

    async fn shipments_by_barcodes(
        &self,
        barcodes: &[String],
    ) -> Result<Vec<Shipment>, LogisticsError> {
        if barcodes.is_empty() {
            return Err(LogisticsError::EmptyInput);
        }
        let started = Instant::now();
        let rows = sqlx::query_as::<_, Shipment>(
            "select s.id, s.carrier, s.tracking, s.departure, s.estimated_arrival, s.arrival \
             from frontman.shipment s \
             inner join frontman.location_shipment_return_bag lsrb on lsrb.shipment_id = s.id \
             where lsrb.return_bag_barcode = any($1)",
        )
        .bind(barcodes)
        .fetch_all(&self.pool)
        .await?;
        metrics::lookup_elapsed("shipments_by_barcodes", started.elapsed().as_millis());
        Ok(rows)
    }

    async fn induction_by_bag_ids(
        &self,
        bag_ids: &[i64],
    ) -> Result<Vec<ReturnBagInstance>, LogisticsError> {
        if bag_ids.is_empty() {
            return Err(LogisticsError::EmptyInput);
        }
        let started = Instant::now();
        let rows = sqlx::query_as::<_, ReturnBagInstance>(
            "select id, return_bag_id, instance_id \
             from hub.return_bag_instance where return_bag_id = any($1)",
        )
        .bind(bag_ids)
        .fetch_all(&self.pool)
        .await?;
        metrics::lookup_elapsed("induction_by_bag_ids", started.elapsed().as_millis());
        Ok(rows)
    }

    async fn outbound_by_instance_ids(
        &self,
        instance_ids: &[String],
    ) -> Result<Vec<TrackedUnit>, LogisticsError> {
        if instance_ids.is_empty() {
            return Err(LogisticsError::EmptyInput);
        }
        let started = Instant::now();
        let rows = sqlx::query_as::<_, TrackedUnit>(
            "select distinct tu.id, tu.carrier, tu.tracking, tu.departure, tu.arrival \
             from hub.tracked_unit tu \
             inner join hub.outbound_shipment_item osi \
             on osi.outbound_shipment_id = tu.outbound_shipment_id \
             where osi.instance_id = any($1)",
        )
        .bind(instance_ids)
        .fetch_all(&self.pool)
        .await?;
        metrics::lookup_elapsed("outbound_by_instance_ids", started.elapsed().as_millis());
        Ok(dedup_by_id(rows))
    }
}

/// The join can match the same tracked unit through several instance rows;
/// the select is distinct, but dedup again here so counting never depends on
/// the store's behavior.
fn dedup_by_id(units: Vec<TrackedUnit>) -> Vec<TrackedUnit> {
    let mut seen = HashSet::new();
    units
        .into_iter()
        .filter(|unit| seen.insert(unit.id.clone()))
        .collect()
}
