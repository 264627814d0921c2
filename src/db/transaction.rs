/*!
 * Transaction helpers
 *
 * Every write path opens a transaction through [`begin`] and closes it through
 * [`commit`]. Dropping the returned transaction without committing rolls it
 * back, so an early `?` return leaves no partial writes behind.
 */

use crate::errors::ServiceError;
use metrics::counter;
use sea_orm::{DatabaseConnection, DatabaseTransaction, TransactionTrait};
use tracing::{debug, error};

pub async fn begin(
    db: &DatabaseConnection,
    operation: &'static str,
) -> Result<DatabaseTransaction, ServiceError> {
    let txn = db.begin().await.map_err(|e| {
        error!(operation, error = %e, "Failed to begin transaction");
        counter!("fulfillment_db.transaction.begin_failed", 1);
        ServiceError::DatabaseError(e)
    })?;
    debug!(operation, "Transaction started");
    counter!("fulfillment_db.transaction.started", 1);
    Ok(txn)
}

pub async fn commit(txn: DatabaseTransaction, operation: &'static str) -> Result<(), ServiceError> {
    txn.commit().await.map_err(|e| {
        error!(operation, error = %e, "Failed to commit transaction");
        counter!("fulfillment_db.transaction.commit_failed", 1);
        ServiceError::DatabaseError(e)
    })?;
    debug!(operation, "Transaction committed");
    counter!("fulfillment_db.transaction.committed", 1);
    Ok(())
}
