pub mod transaction;

use crate::config::AppConfig;
use crate::errors::ServiceError;
use metrics::{counter, gauge};
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use sea_orm_migration::MigratorTrait;
use std::time::Duration;
use tracing::{debug, error, info};

/// Type alias for a database connection pool
pub type DbPool = DatabaseConnection;

/// Configuration for database connection
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout: Duration,
    pub idle_timeout: Duration,
    pub acquire_timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: 10,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            acquire_timeout: Duration::from_secs(8),
        }
    }
}

impl DbConfig {
    /// An in-memory SQLite database lives and dies with its single connection,
    /// so the pool is pinned to exactly one.
    pub fn is_in_memory(&self) -> bool {
        self.url.starts_with("sqlite::memory:") || self.url.contains("mode=memory")
    }
}

impl From<&AppConfig> for DbConfig {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            url: cfg.database_url.clone(),
            max_connections: cfg.db_max_connections,
            min_connections: cfg.db_min_connections,
            connect_timeout: Duration::from_secs(cfg.db_connect_timeout_secs),
            idle_timeout: Duration::from_secs(cfg.db_idle_timeout_secs),
            acquire_timeout: Duration::from_secs(cfg.db_acquire_timeout_secs),
        }
    }
}

/// Establishes a connection pool to the database with custom configuration
pub async fn establish_connection_with_config(config: &DbConfig) -> Result<DbPool, ServiceError> {
    debug!("Configuring database connection with: {:?}", config);

    let mut opt = ConnectOptions::new(config.url.clone());
    opt.connect_timeout(config.connect_timeout)
        .acquire_timeout(config.acquire_timeout)
        .sqlx_logging(false);

    if config.is_in_memory() {
        opt.max_connections(1).min_connections(1);
    } else {
        opt.max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .idle_timeout(config.idle_timeout);
    }

    gauge!("fulfillment_db.max_connections", config.max_connections as f64);

    info!(
        "Connecting to database with max_connections={}",
        config.max_connections
    );

    let db_pool = Database::connect(opt).await.map_err(|e| {
        error!("Database connection establishment failed: {}", e);
        counter!("fulfillment_db.connection_failures", 1);
        ServiceError::DatabaseError(e)
    })?;

    info!("Database connection pool established successfully");
    Ok(db_pool)
}

/// Establish DB pool using AppConfig tuning
pub async fn establish_connection_from_app_config(cfg: &AppConfig) -> Result<DbPool, ServiceError> {
    let db_cfg: DbConfig = cfg.into();
    establish_connection_with_config(&db_cfg).await
}

/// Runs the embedded schema migrations.
pub async fn run_migrations(pool: &DbPool) -> Result<(), ServiceError> {
    info!("Running database migrations");
    let start = std::time::Instant::now();

    let result = crate::migrator::Migrator::up(pool, None)
        .await
        .map_err(ServiceError::DatabaseError);

    let elapsed = start.elapsed();
    match &result {
        Ok(_) => info!(
            "Database migrations completed successfully in {:?}",
            elapsed
        ),
        Err(e) => error!("Database migrations failed after {:?}: {}", elapsed, e),
    }

    result
}

/// Checks if the database connection is active
pub async fn check_connection(pool: &DbPool) -> Result<(), ServiceError> {
    let start = std::time::Instant::now();
    let result = pool.ping().await.map_err(ServiceError::DatabaseError);

    let elapsed = start.elapsed();
    match &result {
        Ok(_) => {
            debug!("Database connection check successful in {:?}", elapsed);
            gauge!("fulfillment_db.connection_latency", elapsed.as_millis() as f64);
        }
        Err(e) => {
            error!(
                "Database connection check failed after {:?}: {}",
                elapsed, e
            );
            counter!("fulfillment_db.connection_failures", 1);
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_config() -> DbConfig {
        DbConfig {
            url: "sqlite::memory:".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn detects_in_memory_urls() {
        assert!(memory_config().is_in_memory());
        assert!(DbConfig {
            url: "sqlite://file:fulfillment?mode=memory".into(),
            ..Default::default()
        }
        .is_in_memory());
        assert!(!DbConfig {
            url: "postgres://localhost/fulfillment".into(),
            ..Default::default()
        }
        .is_in_memory());
    }

    #[tokio::test]
    async fn connects_and_migrates_in_memory() {
        let pool = establish_connection_with_config(&memory_config())
            .await
            .unwrap();
        run_migrations(&pool).await.unwrap();
        assert!(check_connection(&pool).await.is_ok());
        // second run is a no-op
        run_migrations(&pool).await.unwrap();
    }

    #[tokio::test]
    async fn money_columns_round_trip() {
        use crate::entities::{order, order_detail, OrderPosition};
        use chrono::Utc;
        use rust_decimal_macros::dec;
        use sea_orm::{ActiveModelTrait, EntityTrait, Set};

        let pool = establish_connection_with_config(&memory_config())
            .await
            .unwrap();
        run_migrations(&pool).await.unwrap();

        let now = Utc::now();
        let order = order::ActiveModel {
            customer_id: Set(7),
            creator_user_id: Set(Some(1)),
            creator_customer_id: Set(None),
            collection_id: Set(None),
            cart_id: Set(None),
            box_id: Set(None),
            invoice_id: Set(None),
            position: Set(OrderPosition::Created),
            barcode: Set(None),
            purchase_method: Set(None),
            is_archived: Set(false),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&pool)
        .await
        .unwrap();

        let detail = order_detail::ActiveModel {
            order_id: Set(order.id),
            title: Set("Brass compass".into()),
            description: Set(None),
            notes: Set(None),
            color: Set(None),
            size: Set(None),
            capacity: Set(None),
            prepaid_value: Set(dec!(12.25)),
            original_product_price: Set(dec!(1234.5)),
            commission: Set(dec!(0.75)),
            total: Set(dec!(1247.5)),
            image_url: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&pool)
        .await
        .unwrap();

        let stored = order_detail::Entity::find_by_id(detail.id)
            .one(&pool)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.prepaid_value, dec!(12.25));
        assert_eq!(stored.original_product_price, dec!(1234.5));
        assert_eq!(stored.commission, dec!(0.75));
        assert_eq!(stored.total, dec!(1247.5));
    }
}
