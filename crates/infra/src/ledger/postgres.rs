//! Postgres-backed movement ledger.
//!
//! ## Ordering
//!
//! `position` is a `BIGSERIAL`. Sequence values are handed out before commit,
//! so two concurrent transactions could otherwise commit out of position
//! order and a reader catching up from a watermark would skip the later-
//! committing, lower-numbered row. Appends therefore take a per-tenant
//! transaction-scoped advisory lock: within a tenant, rows commit in position
//! order. Tenants do not block each other.
//!
//! ## Error Mapping
//!
//! | SQLx Error | LedgerError |
//! |------------|-------------|
//! | Database, check violation (`23514`) | `Domain(Validation)` |
//! | Any other database error | `Unavailable` |
//! | PoolClosed, Io, timeouts | `Unavailable` |

use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::instrument;
use uuid::Uuid;

use async_trait::async_trait;
use posledger_core::{
    DomainError, Money, MovementId, OutletId, ProductId, SupplierId, TenantId, UserId,
    VariationId,
};
use posledger_inventory::{MovementType, NewMovement, StockMovement};

use super::{
    prepare, replay, AppendOutcome, LedgerError, MovementFilter, MovementLedger, MovementPage,
    Pagination,
};

const SCHEMA: &str = include_str!("../../migrations/0001_stock_movements.sql");

const COLUMNS: &str = "position, movement_id, tenant_id, outlet_id, product_id, variation_id, \
     movement_type, quantity, unit_cost, reference_id, counterpart_outlet_id, supplier_id, \
     reason, actor, occurred_at, recorded_at, idempotency_key";

/// Shared by `query` (count + page): `$1` is the tenant, `$2..$9` the filter.
const FILTER: &str = "tenant_id = $1
    AND ($2::uuid IS NULL OR outlet_id = $2)
    AND ($3::uuid IS NULL OR product_id = $3)
    AND ($4::uuid IS NULL OR variation_id = $4)
    AND (cardinality($5::text[]) = 0 OR movement_type = ANY($5))
    AND ($6::text IS NULL OR reference_id = $6)
    AND ($7::timestamptz IS NULL OR occurred_at >= $7)
    AND ($8::timestamptz IS NULL OR occurred_at < $8)
    AND ($9::bigint IS NULL OR position > $9)";

#[derive(Debug, Clone)]
pub struct PostgresMovementLedger {
    pool: PgPool,
}

impl PostgresMovementLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect and make sure the ledger table exists.
    pub async fn connect(database_url: &str) -> Result<Self, LedgerError> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        let ledger = Self::new(pool);
        ledger.ensure_schema().await?;
        Ok(ledger)
    }

    /// Apply the (idempotent) ledger migration.
    #[instrument(skip(self), err)]
    pub async fn ensure_schema(&self) -> Result<(), LedgerError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        Ok(())
    }

    async fn find_by_key(
        tx: &mut Transaction<'_, Postgres>,
        tenant_id: TenantId,
        key: &str,
    ) -> Result<Option<StockMovement>, LedgerError> {
        let sql = format!(
            "SELECT {COLUMNS} FROM stock_movements WHERE tenant_id = $1 AND idempotency_key = $2"
        );
        let row = sqlx::query(&sql)
            .bind(tenant_id.as_uuid())
            .bind(key)
            .fetch_optional(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error("find_by_key", e))?;

        row.as_ref().map(decode_movement).transpose()
    }
}

#[async_trait]
impl MovementLedger for PostgresMovementLedger {
    #[instrument(
        skip(self, movement, idempotency_key),
        fields(
            tenant_id = %tenant_id,
            outlet_id = %movement.outlet_id,
            movement_type = %movement.movement_type
        ),
        err
    )]
    async fn append(
        &self,
        tenant_id: TenantId,
        movement: NewMovement,
        idempotency_key: Option<String>,
    ) -> Result<AppendOutcome, LedgerError> {
        let (mut movement, key) = prepare(movement, idempotency_key)?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(advisory_key(tenant_id))
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("advisory_lock", e))?;

        let movement_id = MovementId::new();
        let inserted = sqlx::query(
            r#"
            INSERT INTO stock_movements (
                movement_id, tenant_id, outlet_id, product_id, variation_id,
                movement_type, quantity, unit_cost, reference_id,
                counterpart_outlet_id, supplier_id, reason, actor,
                occurred_at, idempotency_key
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13,
                    COALESCE($14::timestamptz, NOW()), $15)
            ON CONFLICT (tenant_id, idempotency_key) WHERE idempotency_key IS NOT NULL
            DO NOTHING
            RETURNING position, occurred_at, recorded_at
            "#,
        )
        .bind(movement_id.as_uuid())
        .bind(tenant_id.as_uuid())
        .bind(movement.outlet_id.as_uuid())
        .bind(movement.product_id.as_uuid())
        .bind(movement.variation_id.map(|v| *v.as_uuid()))
        .bind(movement.movement_type.as_str())
        .bind(movement.quantity)
        .bind(movement.unit_cost.map(Money::minor))
        .bind(movement.reference_id.as_deref())
        .bind(movement.counterpart_outlet_id.map(|o| *o.as_uuid()))
        .bind(movement.supplier_id.map(|s| *s.as_uuid()))
        .bind(movement.reason.as_deref())
        .bind(movement.actor.as_uuid())
        .bind(movement.occurred_at)
        .bind(key.as_deref())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_movement", e))?;

        // Nothing inserted: the key is taken. Resolve against the stored row.
        let Some(row) = inserted else {
            let k = key.as_deref().unwrap_or_default();
            let existing = Self::find_by_key(&mut tx, tenant_id, k).await?;
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("rollback", e))?;
            return match existing {
                Some(existing) => replay(existing, &movement, k),
                None => Err(LedgerError::Unavailable(format!(
                    "idempotency key {k} conflicted but no row was found"
                ))),
            };
        };

        let position: i64 = row
            .try_get("position")
            .map_err(|e| map_sqlx_error("read_position", e))?;
        let recorded_at: DateTime<Utc> = row
            .try_get("recorded_at")
            .map_err(|e| map_sqlx_error("read_recorded_at", e))?;
        let occurred_at: DateTime<Utc> = row
            .try_get("occurred_at")
            .map_err(|e| map_sqlx_error("read_occurred_at", e))?;
        movement.occurred_at = Some(occurred_at);

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        Ok(AppendOutcome {
            movement: StockMovement::record(
                tenant_id,
                movement_id,
                position as u64,
                recorded_at,
                key,
                movement,
            ),
            replayed: false,
        })
    }

    #[instrument(skip(self, filter), fields(tenant_id = %tenant_id), err)]
    async fn query(
        &self,
        tenant_id: TenantId,
        filter: &MovementFilter,
        pagination: Pagination,
    ) -> Result<MovementPage, LedgerError> {
        let types: Vec<&str> = filter.movement_types.iter().map(|t| t.as_str()).collect();
        let after = filter.after_position.map(|p| p as i64);

        let count_sql = format!("SELECT COUNT(*) AS total FROM stock_movements WHERE {FILTER}");
        let total: i64 = sqlx::query(&count_sql)
            .bind(tenant_id.as_uuid())
            .bind(filter.outlet_id.map(|o| *o.as_uuid()))
            .bind(filter.product_id.map(|p| *p.as_uuid()))
            .bind(filter.variation_id.map(|v| *v.as_uuid()))
            .bind(&types)
            .bind(filter.reference_id.as_deref())
            .bind(filter.occurred_from)
            .bind(filter.occurred_to)
            .bind(after)
            .fetch_one(&self.pool)
            .await
            .and_then(|row| row.try_get("total"))
            .map_err(|e| map_sqlx_error("count_movements", e))?;

        let direction = if filter.newest_first { "DESC" } else { "ASC" };
        let page_sql = format!(
            "SELECT {COLUMNS} FROM stock_movements WHERE {FILTER} \
             ORDER BY position {direction} LIMIT $10 OFFSET $11"
        );
        let rows = sqlx::query(&page_sql)
            .bind(tenant_id.as_uuid())
            .bind(filter.outlet_id.map(|o| *o.as_uuid()))
            .bind(filter.product_id.map(|p| *p.as_uuid()))
            .bind(filter.variation_id.map(|v| *v.as_uuid()))
            .bind(&types)
            .bind(filter.reference_id.as_deref())
            .bind(filter.occurred_from)
            .bind(filter.occurred_to)
            .bind(after)
            .bind(i64::from(pagination.limit))
            .bind(i64::from(pagination.offset))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("query_movements", e))?;

        let movements = rows.iter().map(decode_movement).collect::<Result<Vec<_>, _>>()?;
        Ok(MovementPage::new(movements, total as u64, pagination))
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id), err)]
    async fn read_after(
        &self,
        tenant_id: TenantId,
        after: u64,
        limit: usize,
    ) -> Result<Vec<StockMovement>, LedgerError> {
        let sql = format!(
            "SELECT {COLUMNS} FROM stock_movements \
             WHERE tenant_id = $1 AND position > $2 ORDER BY position ASC LIMIT $3"
        );
        let rows = sqlx::query(&sql)
            .bind(tenant_id.as_uuid())
            .bind(after as i64)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("read_after", e))?;

        rows.iter().map(decode_movement).collect()
    }

    async fn head_position(&self, tenant_id: TenantId) -> Result<u64, LedgerError> {
        let head: Option<i64> = sqlx::query(
            "SELECT MAX(position) AS head FROM stock_movements WHERE tenant_id = $1",
        )
        .bind(tenant_id.as_uuid())
        .fetch_one(&self.pool)
        .await
        .and_then(|row| row.try_get("head"))
        .map_err(|e| map_sqlx_error("head_position", e))?;

        Ok(head.unwrap_or(0) as u64)
    }
}

/// Fold the tenant uuid into the 64-bit advisory lock key space.
fn advisory_key(tenant_id: TenantId) -> i64 {
    let bits = tenant_id.as_uuid().as_u128();
    ((bits >> 64) as u64 ^ bits as u64) as i64
}

fn decode_movement(row: &PgRow) -> Result<StockMovement, LedgerError> {
    let read = |e: sqlx::Error| map_sqlx_error("decode_movement", e);

    let movement_type: String = row.try_get("movement_type").map_err(read)?;
    let movement_type: MovementType = movement_type
        .parse()
        .map_err(|e: DomainError| LedgerError::Unavailable(format!("corrupt ledger row: {e}")))?;
    let position: i64 = row.try_get("position").map_err(read)?;

    Ok(StockMovement {
        movement_id: MovementId::from_uuid(row.try_get("movement_id").map_err(read)?),
        tenant_id: TenantId::from_uuid(row.try_get("tenant_id").map_err(read)?),
        position: position as u64,
        outlet_id: OutletId::from_uuid(row.try_get("outlet_id").map_err(read)?),
        product_id: ProductId::from_uuid(row.try_get("product_id").map_err(read)?),
        variation_id: row
            .try_get::<Option<Uuid>, _>("variation_id")
            .map_err(read)?
            .map(VariationId::from_uuid),
        movement_type,
        quantity: row.try_get("quantity").map_err(read)?,
        unit_cost: row
            .try_get::<Option<i64>, _>("unit_cost")
            .map_err(read)?
            .map(Money::from_minor),
        reference_id: row.try_get("reference_id").map_err(read)?,
        counterpart_outlet_id: row
            .try_get::<Option<Uuid>, _>("counterpart_outlet_id")
            .map_err(read)?
            .map(OutletId::from_uuid),
        supplier_id: row
            .try_get::<Option<Uuid>, _>("supplier_id")
            .map_err(read)?
            .map(SupplierId::from_uuid),
        reason: row.try_get("reason").map_err(read)?,
        actor: UserId::from_uuid(row.try_get("actor").map_err(read)?),
        occurred_at: row.try_get("occurred_at").map_err(read)?,
        recorded_at: row.try_get("recorded_at").map_err(read)?,
        idempotency_key: row.try_get("idempotency_key").map_err(read)?,
    })
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> LedgerError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {operation}: {}", db_err.message());
            match db_err.code().as_deref() {
                // Check constraint violation
                Some("23514") => LedgerError::Domain(DomainError::validation(msg)),
                _ => LedgerError::Unavailable(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            LedgerError::Unavailable(format!("connection pool closed in {operation}"))
        }
        other => LedgerError::Unavailable(format!("sqlx error in {operation}: {other}")),
    }
}
