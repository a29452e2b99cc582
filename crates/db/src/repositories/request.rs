use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{sqlite::SqliteRow, Row};

use procura_core::domain::purchase_order::PurchaseOrder;
use procura_core::domain::report::ValidationReport;
use procura_core::domain::request::{PurchaseRequest, RequestId, RequestItem, RequestStatus};

use super::{RepositoryError, RequestRepository};
use crate::DbPool;

pub struct SqlRequestRepository {
    pool: DbPool,
}

impl SqlRequestRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn load_items(&self, request_id: &RequestId) -> Result<Vec<RequestItem>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT name, quantity, unit_price
             FROM request_item
             WHERE request_id = ?
             ORDER BY position ASC",
        )
        .bind(&request_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(RequestItem {
                    name: row.try_get("name")?,
                    quantity: parse_u32("quantity", row.try_get("quantity")?)?,
                    unit_price: parse_decimal("unit_price", row.try_get("unit_price")?)?,
                })
            })
            .collect()
    }
}

#[async_trait::async_trait]
impl RequestRepository for SqlRequestRepository {
    async fn find_by_id(&self, id: &RequestId) -> Result<Option<PurchaseRequest>, RepositoryError> {
        let row = sqlx::query(
            "SELECT
                id,
                title,
                description,
                amount,
                status,
                created_by,
                vendor,
                currency,
                extracted_total,
                degraded_extraction,
                purchase_order_json,
                validation_report_json,
                created_at,
                updated_at
             FROM purchase_request
             WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let items = self.load_items(id).await?;
        request_from_row(row, items).map(Some)
    }

    /// Transactional upsert. Items are replaced wholesale; the row set and
    /// the in-memory collection always agree after a save.
    async fn save(&self, request: PurchaseRequest) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO purchase_request (
                id,
                title,
                description,
                amount,
                status,
                created_by,
                vendor,
                currency,
                extracted_total,
                degraded_extraction,
                purchase_order_json,
                validation_report_json,
                created_at,
                updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                description = excluded.description,
                amount = excluded.amount,
                status = excluded.status,
                created_by = excluded.created_by,
                vendor = excluded.vendor,
                currency = excluded.currency,
                extracted_total = excluded.extracted_total,
                degraded_extraction = excluded.degraded_extraction,
                purchase_order_json = excluded.purchase_order_json,
                validation_report_json = excluded.validation_report_json,
                updated_at = excluded.updated_at",
        )
        .bind(&request.id.0)
        .bind(&request.title)
        .bind(&request.description)
        .bind(request.amount.to_string())
        .bind(request.status.as_str())
        .bind(&request.created_by)
        .bind(request.vendor.as_deref())
        .bind(request.currency.as_deref())
        .bind(request.extracted_total.map(|value| value.to_string()))
        .bind(i64::from(request.degraded_extraction))
        .bind(encode_json("purchase_order", request.purchase_order.as_ref())?)
        .bind(encode_json("validation_report", request.validation_report.as_ref())?)
        .bind(request.created_at.to_rfc3339())
        .bind(request.updated_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM request_item WHERE request_id = ?")
            .bind(&request.id.0)
            .execute(&mut *tx)
            .await?;

        for (position, item) in request.items.iter().enumerate() {
            sqlx::query(
                "INSERT INTO request_item (request_id, position, name, quantity, unit_price)
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&request.id.0)
            .bind(position as i64)
            .bind(&item.name)
            .bind(i64::from(item.quantity))
            .bind(item.unit_price.to_string())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<PurchaseRequest>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT
                id,
                title,
                description,
                amount,
                status,
                created_by,
                vendor,
                currency,
                extracted_total,
                degraded_extraction,
                purchase_order_json,
                validation_report_json,
                created_at,
                updated_at
             FROM purchase_request
             ORDER BY created_at ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut requests = Vec::with_capacity(rows.len());
        for row in rows {
            let id = RequestId(row.try_get::<String, _>("id")?);
            let items = self.load_items(&id).await?;
            requests.push(request_from_row(row, items)?);
        }
        Ok(requests)
    }
}

fn request_from_row(
    row: SqliteRow,
    items: Vec<RequestItem>,
) -> Result<PurchaseRequest, RepositoryError> {
    let status_raw = row.try_get::<String, _>("status")?;
    let status = RequestStatus::parse(&status_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown request status `{status_raw}`")))?;

    Ok(PurchaseRequest {
        id: RequestId(row.try_get("id")?),
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        amount: parse_decimal("amount", row.try_get("amount")?)?,
        status,
        created_by: row.try_get("created_by")?,
        items,
        vendor: row.try_get("vendor")?,
        currency: row.try_get("currency")?,
        extracted_total: parse_optional_decimal(
            "extracted_total",
            row.try_get("extracted_total")?,
        )?,
        degraded_extraction: row.try_get::<i64, _>("degraded_extraction")? != 0,
        purchase_order: decode_json::<PurchaseOrder>(
            "purchase_order_json",
            row.try_get("purchase_order_json")?,
        )?,
        validation_report: decode_json::<ValidationReport>(
            "validation_report_json",
            row.try_get("validation_report_json")?,
        )?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}

fn encode_json<T: serde::Serialize>(
    column: &str,
    value: Option<&T>,
) -> Result<Option<String>, RepositoryError> {
    value
        .map(|payload| {
            serde_json::to_string(payload).map_err(|error| {
                RepositoryError::Decode(format!("could not encode `{column}`: {error}"))
            })
        })
        .transpose()
}

fn decode_json<T: serde::de::DeserializeOwned>(
    column: &str,
    value: Option<String>,
) -> Result<Option<T>, RepositoryError> {
    value
        .map(|raw| {
            serde_json::from_str(&raw).map_err(|error| {
                RepositoryError::Decode(format!("could not decode `{column}`: {error}"))
            })
        })
        .transpose()
}

fn parse_u32(column: &str, value: i64) -> Result<u32, RepositoryError> {
    u32::try_from(value).map_err(|_| {
        RepositoryError::Decode(format!(
            "invalid value for `{column}` (expected non-negative u32): {value}"
        ))
    })
}

fn parse_decimal(column: &str, value: String) -> Result<Decimal, RepositoryError> {
    value.parse::<Decimal>().map_err(|error| {
        RepositoryError::Decode(format!("invalid decimal in `{column}`: `{value}` ({error})"))
    })
}

fn parse_optional_decimal(
    column: &str,
    value: Option<String>,
) -> Result<Option<Decimal>, RepositoryError> {
    value.map(|raw| parse_decimal(column, raw)).transpose()
}

fn parse_timestamp(column: &str, value: String) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        },
    )
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};
    use rust_decimal::Decimal;

    use procura_core::domain::purchase_order::{PurchaseOrder, PurchaseOrderLine};
    use procura_core::domain::request::{PurchaseRequest, RequestId, RequestItem, RequestStatus};

    use super::SqlRequestRepository;
    use crate::migrations;
    use crate::repositories::RequestRepository;
    use crate::{connect_with_settings, DbPool, PoolSettings};

    async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:?cache=shared", PoolSettings::new(1, 30))
            .await
            .expect("connect test pool");
        migrations::run_pending(&pool).await.expect("run migrations");
        pool
    }

    fn parse_ts(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value).expect("valid rfc3339").with_timezone(&Utc)
    }

    fn sample_request(id: &str) -> PurchaseRequest {
        PurchaseRequest {
            id: RequestId(id.to_string()),
            title: "Office hardware".to_string(),
            description: "Replacement laptops".to_string(),
            amount: Decimal::new(110_000, 2),
            status: RequestStatus::Pending,
            created_by: "u-staff".to_string(),
            items: vec![
                RequestItem {
                    name: "Laptop".to_string(),
                    quantity: 2,
                    unit_price: Decimal::new(50_000, 2),
                },
                RequestItem {
                    name: "Mouse".to_string(),
                    quantity: 5,
                    unit_price: Decimal::new(2_000, 2),
                },
            ],
            vendor: Some("Acme Supplies Ltd".to_string()),
            currency: Some("USD".to_string()),
            extracted_total: Some(Decimal::new(110_000, 2)),
            degraded_extraction: false,
            purchase_order: None,
            validation_report: None,
            created_at: parse_ts("2026-08-01T09:00:00Z"),
            updated_at: parse_ts("2026-08-01T09:00:00Z"),
        }
    }

    #[tokio::test]
    async fn round_trips_a_request_with_items() {
        let pool = setup_pool().await;
        let repo = SqlRequestRepository::new(pool.clone());
        let request = sample_request("PR-DB-001");

        repo.save(request.clone()).await.expect("save");

        let found = repo.find_by_id(&request.id).await.expect("find");
        assert_eq!(found, Some(request));

        pool.close().await;
    }

    #[tokio::test]
    async fn missing_request_reads_as_none() {
        let pool = setup_pool().await;
        let repo = SqlRequestRepository::new(pool.clone());

        let found = repo.find_by_id(&RequestId("PR-ABSENT".to_string())).await.expect("find");
        assert_eq!(found, None);

        pool.close().await;
    }

    #[tokio::test]
    async fn save_replaces_items_and_attaches_purchase_order() {
        let pool = setup_pool().await;
        let repo = SqlRequestRepository::new(pool.clone());
        let mut request = sample_request("PR-DB-002");
        repo.save(request.clone()).await.expect("save initial");

        request.status = RequestStatus::Approved;
        request.items = vec![RequestItem {
            name: "Monitor".to_string(),
            quantity: 3,
            unit_price: Decimal::new(15_000, 2),
        }];
        request.purchase_order = Some(PurchaseOrder {
            po_number: "PO-AB12CD34EF56".to_string(),
            vendor: request.vendor.clone(),
            lines: vec![PurchaseOrderLine {
                description: "Monitor".to_string(),
                quantity: 3,
                unit_price: Decimal::new(15_000, 2),
            }],
            total: Decimal::new(45_000, 2),
            currency: request.currency.clone(),
            terms: "net 30".to_string(),
            generated_at: parse_ts("2026-08-02T10:00:00Z"),
        });
        request.updated_at = parse_ts("2026-08-02T10:00:00Z");

        repo.save(request.clone()).await.expect("save update");

        let found = repo.find_by_id(&request.id).await.expect("find").expect("present");
        assert_eq!(found.items.len(), 1);
        assert_eq!(found.items[0].name, "Monitor");
        assert_eq!(
            found.purchase_order.as_ref().map(|po| po.po_number.as_str()),
            Some("PO-AB12CD34EF56")
        );
        assert_eq!(found.status, RequestStatus::Approved);

        pool.close().await;
    }

    #[tokio::test]
    async fn list_returns_requests_in_creation_order() {
        let pool = setup_pool().await;
        let repo = SqlRequestRepository::new(pool.clone());

        let mut first = sample_request("PR-DB-010");
        first.created_at = parse_ts("2026-08-01T09:00:00Z");
        let mut second = sample_request("PR-DB-011");
        second.created_at = parse_ts("2026-08-02T09:00:00Z");

        repo.save(second.clone()).await.expect("save second");
        repo.save(first.clone()).await.expect("save first");

        let listed = repo.list().await.expect("list");
        let ids: Vec<_> = listed.iter().map(|request| request.id.0.as_str()).collect();
        assert_eq!(ids, vec!["PR-DB-010", "PR-DB-011"]);

        pool.close().await;
    }
}
