//! Audit / activity sink.
//!
//! Services build [`ActivityEntry`] values while their transaction runs and
//! publish them once it commits. A sink failure is logged by the event loop
//! and never surfaces to the request that produced the entry.

use crate::auth::ActorContext;
use crate::entities::order_activity_log;
use crate::errors::ServiceError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub actor_id: Option<i32>,
    pub actor_type: Option<String>,
    pub action_type: String,
    pub entity_type: String,
    pub entity_id: i32,
    pub details: Value,
    pub field_name: Option<String>,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl ActivityEntry {
    pub fn new(entity_type: &str, entity_id: i32, action_type: &str) -> Self {
        Self {
            actor_id: None,
            actor_type: None,
            action_type: action_type.to_string(),
            entity_type: entity_type.to_string(),
            entity_id,
            details: Value::Null,
            field_name: None,
            old_value: None,
            new_value: None,
            occurred_at: Utc::now(),
        }
    }

    pub fn by(mut self, actor: Option<&ActorContext>) -> Self {
        if let Some(actor) = actor {
            self.actor_id = Some(actor.actor_id);
            self.actor_type = Some(actor.actor_type.to_string());
        }
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }

    pub fn field_change(
        mut self,
        field: &str,
        old_value: Option<String>,
        new_value: Option<String>,
    ) -> Self {
        self.field_name = Some(field.to_string());
        self.old_value = old_value;
        self.new_value = new_value;
        self
    }
}

#[async_trait]
pub trait ActivitySink: Send + Sync {
    async fn record(&self, entry: &ActivityEntry) -> Result<(), ServiceError>;
}

/// Persists entries into `order_activity_log`.
#[derive(Clone)]
pub struct DbActivitySink {
    db: Arc<DatabaseConnection>,
}

impl DbActivitySink {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ActivitySink for DbActivitySink {
    async fn record(&self, entry: &ActivityEntry) -> Result<(), ServiceError> {
        let row = order_activity_log::ActiveModel {
            entity_type: Set(entry.entity_type.clone()),
            entity_id: Set(entry.entity_id),
            action_type: Set(entry.action_type.clone()),
            field_name: Set(entry.field_name.clone()),
            old_value: Set(entry.old_value.clone()),
            new_value: Set(entry.new_value.clone()),
            details: Set((!entry.details.is_null()).then(|| entry.details.clone())),
            actor_id: Set(entry.actor_id),
            actor_type: Set(entry.actor_type.clone()),
            created_at: Set(entry.occurred_at),
            ..Default::default()
        };
        row.insert(self.db.as_ref()).await?;
        Ok(())
    }
}

/// Emits entries as structured log lines only.
#[derive(Debug, Clone, Default)]
pub struct LogActivitySink;

#[async_trait]
impl ActivitySink for LogActivitySink {
    async fn record(&self, entry: &ActivityEntry) -> Result<(), ServiceError> {
        info!(
            target: "fulfillment_api::activity",
            entity_type = %entry.entity_type,
            entity_id = entry.entity_id,
            action = %entry.action_type,
            actor_id = ?entry.actor_id,
            actor_type = ?entry.actor_type,
            field = ?entry.field_name,
            old_value = ?entry.old_value,
            new_value = ?entry.new_value,
            details = %entry.details,
            "activity"
        );
        Ok(())
    }
}

/// Keeps entries in memory.
#[derive(Debug, Default)]
pub struct MemoryActivitySink {
    entries: RwLock<Vec<ActivityEntry>>,
}

impl MemoryActivitySink {
    pub async fn entries(&self) -> Vec<ActivityEntry> {
        self.entries.read().await.clone()
    }

    pub async fn entries_for(&self, entity_type: &str, entity_id: i32) -> Vec<ActivityEntry> {
        self.entries
            .read()
            .await
            .iter()
            .filter(|e| e.entity_type == entity_type && e.entity_id == entity_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl ActivitySink for MemoryActivitySink {
    async fn record(&self, entry: &ActivityEntry) -> Result<(), ServiceError> {
        self.entries.write().await.push(entry.clone());
        Ok(())
    }
}

/// Builds the sink selected by `activity_sink` in configuration.
pub fn sink_from_config(kind: &str, db: Arc<DatabaseConnection>) -> Arc<dyn ActivitySink> {
    match kind.to_ascii_lowercase().as_str() {
        "log" => Arc::new(LogActivitySink),
        _ => Arc::new(DbActivitySink::new(db)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{establish_connection_with_config, run_migrations, DbConfig};
    use sea_orm::EntityTrait;
    use serde_json::json;

    #[test]
    fn builder_records_actor_and_field_change() {
        let actor = ActorContext::customer(12);
        let entry = ActivityEntry::new("order", 3, "order_update")
            .by(Some(&actor))
            .field_change("barcode", None, Some("B-1".into()))
            .with_details(json!({"source": "unified_update"}));

        assert_eq!(entry.actor_id, Some(12));
        assert_eq!(entry.actor_type.as_deref(), Some("customer"));
        assert_eq!(entry.field_name.as_deref(), Some("barcode"));
        assert_eq!(entry.new_value.as_deref(), Some("B-1"));
        assert_eq!(entry.details["source"], "unified_update");
    }

    #[tokio::test]
    async fn db_sink_persists_entries() {
        let db = establish_connection_with_config(&DbConfig {
            url: "sqlite::memory:".into(),
            ..Default::default()
        })
        .await
        .unwrap();
        run_migrations(&db).await.unwrap();
        let db = Arc::new(db);

        let sink = DbActivitySink::new(db.clone());
        sink.record(
            &ActivityEntry::new("order", 77, "order_deleted")
                .by(Some(&ActorContext::user(1)))
                .with_details(json!({"position": 2})),
        )
        .await
        .unwrap();

        let rows = order_activity_log::Entity::find()
            .all(db.as_ref())
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].entity_id, 77);
        assert_eq!(rows[0].action_type, "order_deleted");
        assert_eq!(rows[0].actor_type.as_deref(), Some("user"));
        assert_eq!(rows[0].details, Some(json!({"position": 2})));
    }

    #[tokio::test]
    async fn memory_sink_filters_by_entity() {
        let sink = MemoryActivitySink::default();
        sink.record(&ActivityEntry::new("order", 1, "a")).await.unwrap();
        sink.record(&ActivityEntry::new("cart", 1, "b")).await.unwrap();
        sink.record(&ActivityEntry::new("order", 2, "c")).await.unwrap();

        let entries = sink.entries_for("order", 1).await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].action_type, "a");
    }
}
