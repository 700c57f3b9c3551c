//! Active service alerts.

use async_trait::async_trait;
use chrono::Utc;
use database::{alert, Database};
use serde_json::{json, Value};

use crate::error::ToolError;
use crate::names;
use crate::tool::{Tool, ToolArgs, ToolOutput, LOCALITY_SLOT};

pub struct GetServiceAlerts {
    db: Database,
}

impl GetServiceAlerts {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl Tool for GetServiceAlerts {
    fn name(&self) -> &str {
        names::GET_SERVICE_ALERTS
    }

    fn description(&self) -> &str {
        "List active service alerts (outages, low pressure, maintenance, water quality), optionally for one locality."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "locality": { "type": "string", "description": "Town or neighborhood. Omit to list every active alert." }
            }
        })
    }

    async fn execute(&self, args: ToolArgs) -> Result<ToolOutput, ToolError> {
        let locality = args.get_string_or_slot("locality", LOCALITY_SLOT);
        let alerts = alert::active_alerts(self.db.pool(), locality.as_deref(), Utc::now()).await?;

        let listed: Vec<Value> = alerts
            .iter()
            .map(|a| {
                json!({
                    "locality": a.locality,
                    "kind": a.kind,
                    "message": a.message,
                    "starts_at": a.starts_at,
                    "ends_at": a.ends_at,
                })
            })
            .collect();

        Ok(ToolOutput::success(json!({
            "locality": locality,
            "count": listed.len(),
            "alerts": listed,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ToolRegistry;
    use brain_core::ToolRequestMeta;
    use chrono::Duration;
    use database::AlertKind;
    use std::collections::HashMap;

    #[tokio::test]
    async fn test_alerts_follow_locality_slot() {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        db.migrate().await.unwrap();
        let now = Utc::now();
        alert::create_alert(
            db.pool(),
            "Tlaquepaque",
            AlertKind::Outage,
            "Corte programado por reparación",
            now - Duration::hours(1),
            Some(now + Duration::hours(5)),
        )
        .await
        .unwrap();
        alert::create_alert(db.pool(), "Zapopan", AlertKind::LowPressure, "Baja presión", now - Duration::hours(1), None)
            .await
            .unwrap();

        let mut registry = ToolRegistry::new();
        registry.register(GetServiceAlerts::new(db.clone()));

        let mut meta = ToolRequestMeta::default();
        meta.slots.insert("locality".into(), "tlaquepaque".into());
        let scoped = registry
            .execute(names::GET_SERVICE_ALERTS, HashMap::new(), meta)
            .await;
        assert_eq!(scoped.get("count"), Some(&json!(1)));
        assert_eq!(scoped.get("alerts").unwrap()[0]["kind"], "outage");

        let all = registry
            .execute(names::GET_SERVICE_ALERTS, HashMap::new(), ToolRequestMeta::default())
            .await;
        assert_eq!(all.get("count"), Some(&json!(2)));
    }
}
