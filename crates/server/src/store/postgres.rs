//! Postgres store backend.
//!
//! All queries are runtime-checked (`sqlx::query`, no compile-time macros)
//! so the crate builds without a live database. Status transitions use a
//! conditional `UPDATE ... WHERE status = $expected` as the per-order
//! compare-and-set; order placement runs order insert, line inserts, and
//! cart delete in one transaction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, QueryBuilder, Row, postgres::PgRow};

use tableside_core::{
    Cart, CartLine, CartRestaurant, CurrencyCode, MenuItemId, NewOrder, Order, OrderId, OrderLine,
    OrderStatus, Price, RestaurantId, UserId,
};

use super::{CartStore, OrderFilter, OrderScope, OrderStore, Storage, StoreError};

/// Durable store backed by `PostgreSQL`.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run pending migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if a migration fails to apply.
    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }

    async fn load_order_lines(&self, ids: &[i64]) -> Result<Vec<(i64, OrderLine)>, StoreError> {
        let rows = sqlx::query(
            "SELECT order_id, menu_item_id, name, quantity, unit_price, line_total, currency
             FROM order_lines
             WHERE order_id = ANY($1)
             ORDER BY order_id, position",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|row| order_line_from_row(&row)).collect()
    }

    async fn load_order(&self, id: OrderId) -> Result<Option<Order>, StoreError> {
        let row = sqlx::query(ORDER_SELECT_BY_ID)
            .bind(id.as_i64())
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let lines = self.load_order_lines(&[id.as_i64()]).await?;
        let order = order_from_row(&row, lines.into_iter().map(|(_, l)| l).collect())?;
        Ok(Some(order))
    }
}

const ORDER_SELECT_COLUMNS: &str = "id, customer_id, restaurant_id, total_amount, currency, \
     status, created_at, confirmed_at, preparing_at, ready_at, out_for_delivery_at, \
     delivered_at, cancelled_at, failed_at";

const ORDER_SELECT_BY_ID: &str = "SELECT id, customer_id, restaurant_id, total_amount, currency, \
     status, created_at, confirmed_at, preparing_at, ready_at, out_for_delivery_at, \
     delivered_at, cancelled_at, failed_at FROM orders WHERE id = $1";

/// The timestamp column stamped when entering `status`, if any.
const fn stamp_column(status: OrderStatus) -> Option<&'static str> {
    match status {
        OrderStatus::Confirmed => Some("confirmed_at"),
        OrderStatus::Preparing => Some("preparing_at"),
        OrderStatus::ReadyForPickup => Some("ready_at"),
        OrderStatus::OutForDelivery => Some("out_for_delivery_at"),
        OrderStatus::Delivered => Some("delivered_at"),
        OrderStatus::CancelledByUser | OrderStatus::CancelledByRestaurant => Some("cancelled_at"),
        OrderStatus::Failed => Some("failed_at"),
        OrderStatus::PendingPayment | OrderStatus::Placed => None,
    }
}

fn parse_status(raw: &str) -> Result<OrderStatus, StoreError> {
    raw.parse()
        .map_err(|e: String| StoreError::DataCorruption(format!("invalid status in database: {e}")))
}

fn parse_currency(raw: &str) -> Result<CurrencyCode, StoreError> {
    raw.parse().map_err(|e: String| {
        StoreError::DataCorruption(format!("invalid currency in database: {e}"))
    })
}

fn quantity_from_db(raw: i32) -> Result<u32, StoreError> {
    u32::try_from(raw)
        .map_err(|_| StoreError::DataCorruption(format!("negative quantity in database: {raw}")))
}

fn order_line_from_row(row: &PgRow) -> Result<(i64, OrderLine), StoreError> {
    let order_id: i64 = row.try_get("order_id")?;
    let currency = parse_currency(row.try_get::<&str, _>("currency")?)?;
    let unit_price: Decimal = row.try_get("unit_price")?;
    let line_total: Decimal = row.try_get("line_total")?;

    Ok((
        order_id,
        OrderLine {
            menu_item_id: MenuItemId::new(row.try_get("menu_item_id")?),
            name: row.try_get("name")?,
            quantity: quantity_from_db(row.try_get("quantity")?)?,
            unit_price: Price::new(unit_price, currency),
            line_total: Price::new(line_total, currency),
        },
    ))
}

fn order_from_row(row: &PgRow, lines: Vec<OrderLine>) -> Result<Order, StoreError> {
    let currency = parse_currency(row.try_get::<&str, _>("currency")?)?;
    let total_amount: Decimal = row.try_get("total_amount")?;

    Ok(Order {
        id: OrderId::new(row.try_get("id")?),
        customer_id: UserId::new(row.try_get("customer_id")?),
        restaurant_id: RestaurantId::new(row.try_get("restaurant_id")?),
        lines,
        total_price: Price::new(total_amount, currency),
        status: parse_status(row.try_get::<&str, _>("status")?)?,
        created_at: row.try_get("created_at")?,
        confirmed_at: row.try_get("confirmed_at")?,
        preparing_at: row.try_get("preparing_at")?,
        ready_at: row.try_get("ready_at")?,
        out_for_delivery_at: row.try_get("out_for_delivery_at")?,
        delivered_at: row.try_get("delivered_at")?,
        cancelled_at: row.try_get("cancelled_at")?,
        failed_at: row.try_get("failed_at")?,
    })
}

#[async_trait]
impl CartStore for PgStore {
    async fn get_cart(&self, owner: UserId) -> Result<Option<Cart>, StoreError> {
        let cart_row = sqlx::query(
            "SELECT restaurant_id, restaurant_name FROM carts WHERE owner_id = $1",
        )
        .bind(owner.as_i64())
        .fetch_optional(&self.pool)
        .await?;

        let Some(cart_row) = cart_row else {
            return Ok(None);
        };

        let restaurant = match (
            cart_row.try_get::<Option<i64>, _>("restaurant_id")?,
            cart_row.try_get::<Option<String>, _>("restaurant_name")?,
        ) {
            (Some(id), Some(name)) => Some(CartRestaurant {
                id: RestaurantId::new(id),
                name,
            }),
            _ => None,
        };

        let line_rows = sqlx::query(
            "SELECT menu_item_id, name, quantity, unit_price, currency
             FROM cart_lines
             WHERE owner_id = $1
             ORDER BY menu_item_id",
        )
        .bind(owner.as_i64())
        .fetch_all(&self.pool)
        .await?;

        let lines = line_rows
            .into_iter()
            .map(|row| {
                let currency = parse_currency(row.try_get::<&str, _>("currency")?)?;
                let unit_price: Decimal = row.try_get("unit_price")?;
                Ok(CartLine {
                    menu_item_id: MenuItemId::new(row.try_get("menu_item_id")?),
                    name: row.try_get("name")?,
                    quantity: quantity_from_db(row.try_get("quantity")?)?,
                    unit_price: Price::new(unit_price, currency),
                })
            })
            .collect::<Result<Vec<_>, StoreError>>()?;

        Ok(Some(Cart::from_parts(owner, restaurant, lines)))
    }

    async fn upsert_cart(&self, cart: &Cart) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO carts (owner_id, restaurant_id, restaurant_name, updated_at)
             VALUES ($1, $2, $3, now())
             ON CONFLICT (owner_id) DO UPDATE
             SET restaurant_id = EXCLUDED.restaurant_id,
                 restaurant_name = EXCLUDED.restaurant_name,
                 updated_at = now()",
        )
        .bind(cart.owner().as_i64())
        .bind(cart.restaurant().map(|r| r.id.as_i64()))
        .bind(cart.restaurant().map(|r| r.name.clone()))
        .execute(&mut *tx)
        .await?;

        // Replace the line set wholesale; carts are small.
        sqlx::query("DELETE FROM cart_lines WHERE owner_id = $1")
            .bind(cart.owner().as_i64())
            .execute(&mut *tx)
            .await?;

        for line in cart.lines() {
            sqlx::query(
                "INSERT INTO cart_lines (owner_id, menu_item_id, name, quantity, unit_price, currency)
                 VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(cart.owner().as_i64())
            .bind(line.menu_item_id.as_i64())
            .bind(&line.name)
            .bind(i32::try_from(line.quantity).unwrap_or(i32::MAX))
            .bind(line.unit_price.amount)
            .bind(line.unit_price.currency_code.code())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn delete_cart(&self, owner: UserId) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM carts WHERE owner_id = $1")
            .bind(owner.as_i64())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl OrderStore for PgStore {
    async fn get_order(&self, id: OrderId) -> Result<Option<Order>, StoreError> {
        self.load_order(id).await
    }

    async fn transition(
        &self,
        id: OrderId,
        expected: OrderStatus,
        next: OrderStatus,
        at: DateTime<Utc>,
    ) -> Result<Order, StoreError> {
        // Column name comes from a closed match, never from input.
        let sql = stamp_column(next).map_or_else(
            || "UPDATE orders SET status = $1 WHERE id = $2 AND status = $3".to_owned(),
            |col| {
                format!(
                    "UPDATE orders SET status = $1, {col} = COALESCE({col}, $4)
                     WHERE id = $2 AND status = $3"
                )
            },
        );

        let mut query = sqlx::query(&sql)
            .bind(next.to_string())
            .bind(id.as_i64())
            .bind(expected.to_string());
        if stamp_column(next).is_some() {
            query = query.bind(at);
        }

        let result = query.execute(&self.pool).await?;

        if result.rows_affected() == 0 {
            // Either the order is gone or another actor moved it first.
            let actual = self
                .load_order(id)
                .await?
                .ok_or(StoreError::OrderNotFound(id))?
                .status;
            return Err(StoreError::StaleStatus {
                order_id: id,
                expected,
                actual,
            });
        }

        self.load_order(id)
            .await?
            .ok_or(StoreError::OrderNotFound(id))
    }

    async fn list_orders(
        &self,
        scope: OrderScope,
        filter: &OrderFilter,
    ) -> Result<Vec<Order>, StoreError> {
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {ORDER_SELECT_COLUMNS} FROM orders WHERE "));

        match scope {
            OrderScope::Customer(customer) => {
                builder.push("customer_id = ").push_bind(customer.as_i64());
            }
            OrderScope::Restaurant(restaurant) => {
                builder
                    .push("restaurant_id = ")
                    .push_bind(restaurant.as_i64());
            }
        }

        if let Some(status) = filter.status {
            builder.push(" AND status = ").push_bind(status.to_string());
        }
        if let Some(from) = filter.from {
            builder.push(" AND created_at >= ").push_bind(from);
        }
        if let Some(to) = filter.to {
            builder.push(" AND created_at <= ").push_bind(to);
        }

        builder
            .push(" ORDER BY created_at DESC, id DESC LIMIT ")
            .push_bind(i64::from(filter.per_page))
            .push(" OFFSET ")
            .push_bind(i64::try_from(filter.offset()).unwrap_or(i64::MAX));

        let rows = builder.build().fetch_all(&self.pool).await?;

        let ids: Vec<i64> = rows
            .iter()
            .map(|row| row.try_get::<i64, _>("id"))
            .collect::<Result<_, _>>()?;
        let mut lines_by_order: std::collections::HashMap<i64, Vec<OrderLine>> =
            std::collections::HashMap::new();
        for (order_id, line) in self.load_order_lines(&ids).await? {
            lines_by_order.entry(order_id).or_default().push(line);
        }

        rows.iter()
            .map(|row| {
                let id: i64 = row.try_get("id")?;
                order_from_row(row, lines_by_order.remove(&id).unwrap_or_default())
            })
            .collect()
    }
}

#[async_trait]
impl Storage for PgStore {
    async fn place_order(&self, customer: UserId, order: NewOrder) -> Result<Order, StoreError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            "INSERT INTO orders (customer_id, restaurant_id, total_amount, currency, status)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING id, created_at",
        )
        .bind(order.customer_id.as_i64())
        .bind(order.restaurant_id.as_i64())
        .bind(order.total_price.amount)
        .bind(order.total_price.currency_code.code())
        .bind(order.status.to_string())
        .fetch_one(&mut *tx)
        .await?;

        let id: i64 = row.try_get("id")?;
        let created_at: DateTime<Utc> = row.try_get("created_at")?;

        for (position, line) in order.lines.iter().enumerate() {
            sqlx::query(
                "INSERT INTO order_lines
                     (order_id, position, menu_item_id, name, quantity, unit_price, line_total, currency)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            )
            .bind(id)
            .bind(i64::try_from(position).unwrap_or(i64::MAX))
            .bind(line.menu_item_id.as_i64())
            .bind(&line.name)
            .bind(i32::try_from(line.quantity).unwrap_or(i32::MAX))
            .bind(line.unit_price.amount)
            .bind(line.line_total.amount)
            .bind(line.unit_price.currency_code.code())
            .execute(&mut *tx)
            .await?;
        }

        // Cart delete rides the same transaction: both-or-neither.
        sqlx::query("DELETE FROM carts WHERE owner_id = $1")
            .bind(customer.as_i64())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(Order {
            id: OrderId::new(id),
            customer_id: order.customer_id,
            restaurant_id: order.restaurant_id,
            lines: order.lines,
            total_price: order.total_price,
            status: order.status,
            created_at,
            confirmed_at: None,
            preparing_at: None,
            ready_at: None,
            out_for_delivery_at: None,
            delivered_at: None,
            cancelled_at: None,
            failed_at: None,
        })
    }
}
