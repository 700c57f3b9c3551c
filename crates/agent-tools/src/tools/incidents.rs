//! Incident reporting with an ordered chain of backends.

use std::env;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};
use database::{
    incident, Database, IncidentCategory, IncidentSeverity, NewIncident, SeveritySignals,
};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::error::ToolError;
use crate::names;
use crate::tool::{FailureKind, Tool, ToolArgs, ToolKind, ToolOutput, LOCALITY_SLOT};

/// Incidents returned by one listing.
pub const MAX_LISTED_INCIDENTS: i64 = 10;

/// Warning attached when no backend is configured.
pub const UNPERSISTED_WARNING: &str =
    "The report was received but could not be stored; staff will follow up manually.";

/// Somewhere an incident report can be delivered.
#[async_trait]
pub trait IncidentBackend: Send + Sync {
    /// Short name used in logs and results.
    fn name(&self) -> &str;

    /// Deliver the report under the given identifier.
    async fn submit(&self, id: &str, incident: &NewIncident) -> Result<(), ToolError>;
}

/// Stores incidents in the local database.
pub struct DatabaseIncidentBackend {
    db: Database,
}

impl DatabaseIncidentBackend {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl IncidentBackend for DatabaseIncidentBackend {
    fn name(&self) -> &str {
        "database"
    }

    async fn submit(&self, id: &str, new: &NewIncident) -> Result<(), ToolError> {
        incident::insert_incident(self.db.pool(), id, new, Utc::now()).await?;
        Ok(())
    }
}

/// Posts incidents as JSON to an external endpoint.
pub struct WebhookIncidentBackend {
    http: reqwest::Client,
    url: String,
}

impl WebhookIncidentBackend {
    pub fn new(http: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            http,
            url: url.into(),
        }
    }
}

#[async_trait]
impl IncidentBackend for WebhookIncidentBackend {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn submit(&self, id: &str, new: &NewIncident) -> Result<(), ToolError> {
        let mut body = serde_json::to_value(new)?;
        if let Some(map) = body.as_object_mut() {
            map.insert("id".to_string(), json!(id));
        }

        self.http
            .post(&self.url)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

/// Which backends to use and in what order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncidentBackendConfig {
    pub order: Vec<String>,
    pub webhook_url: Option<String>,
}

impl Default for IncidentBackendConfig {
    fn default() -> Self {
        Self {
            order: vec!["database".to_string(), "webhook".to_string()],
            webhook_url: None,
        }
    }
}

impl IncidentBackendConfig {
    /// Read `INCIDENT_BACKEND_ORDER` (comma separated, default
    /// `database,webhook`) and `INCIDENT_WEBHOOK_URL`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(raw) = env::var("INCIDENT_BACKEND_ORDER") {
            config.order = raw
                .split(',')
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect();
        }
        config.webhook_url = env::var("INCIDENT_WEBHOOK_URL")
            .ok()
            .filter(|url| !url.trim().is_empty());
        config
    }

    /// Build the backend chain. Unknown names and a webhook without a URL
    /// are skipped.
    pub fn build(&self, db: &Database, http: &reqwest::Client) -> Vec<Arc<dyn IncidentBackend>> {
        let mut backends: Vec<Arc<dyn IncidentBackend>> = Vec::new();
        for name in &self.order {
            match (name.as_str(), &self.webhook_url) {
                ("database", _) => backends.push(Arc::new(DatabaseIncidentBackend::new(db.clone()))),
                ("webhook", Some(url)) => {
                    backends.push(Arc::new(WebhookIncidentBackend::new(http.clone(), url.clone())))
                }
                ("webhook", None) => debug!("INCIDENT_WEBHOOK_URL not set, skipping webhook backend"),
                (other, _) => warn!(backend = %other, "Unknown incident backend"),
            }
        }
        backends
    }
}

/// Report an incident (leak, no water, sewage, ...).
pub struct ReportIncident {
    backends: Vec<Arc<dyn IncidentBackend>>,
    offset: FixedOffset,
}

impl ReportIncident {
    pub fn new(backends: Vec<Arc<dyn IncidentBackend>>, offset: FixedOffset) -> Self {
        Self { backends, offset }
    }

    /// Try each backend in order until one accepts the report.
    async fn deliver(&self, new: &NewIncident, now: DateTime<Utc>) -> ToolOutput {
        let id = incident::incident_id(now, self.offset);
        let accepted = |backend: Option<&str>| {
            let mut data = json!({
                "incident_id": id,
                "category": new.category.as_str(),
                "severity": new.severity.as_str(),
                "status": "pending",
                "persisted": backend.is_some(),
                "backend": backend,
            });
            if backend.is_none() {
                data["warning"] = json!(UNPERSISTED_WARNING);
            }
            ToolOutput::success(data)
        };

        if self.backends.is_empty() {
            warn!(incident_id = %id, "No incident backend configured, report not persisted");
            return accepted(None);
        }

        let mut last_error = None;
        for backend in &self.backends {
            match backend.submit(&id, new).await {
                Ok(()) => {
                    info!(
                        incident_id = %id,
                        backend = backend.name(),
                        severity = new.severity.as_str(),
                        "Incident reported"
                    );
                    return accepted(Some(backend.name()));
                }
                Err(e) => {
                    warn!(backend = backend.name(), error = %e, "Incident backend failed");
                    last_error = Some(e);
                }
            }
        }

        ToolOutput::failure(
            FailureKind::Unavailable,
            format!(
                "Could not register the incident: {}",
                last_error.map(|e| e.to_string()).unwrap_or_default()
            ),
        )
    }
}

fn coordinate(args: &ToolArgs, key: &str, limit: f64) -> Result<Option<f64>, ToolError> {
    let value = args.get_number_opt(key)?;
    if let Some(v) = value {
        if !(-limit..=limit).contains(&v) {
            return Err(ToolError::InvalidParameter {
                name: key.to_string(),
                reason: format!("must be between -{} and {}", limit, limit),
            });
        }
    }
    Ok(value)
}

#[async_trait]
impl Tool for ReportIncident {
    fn name(&self) -> &str {
        names::REPORT_INCIDENT
    }

    fn description(&self) -> &str {
        "Report a service incident such as a leak, no water, low pressure, sewage or contaminated water. Include coordinates when the citizen shared a location."
    }

    fn parameters(&self) -> Value {
        let categories: Vec<&str> = IncidentCategory::ALL.iter().map(|c| c.as_str()).collect();
        json!({
            "type": "object",
            "properties": {
                "category": { "type": "string", "enum": categories },
                "description": { "type": "string" },
                "latitude": { "type": "number" },
                "longitude": { "type": "number" },
                "address": { "type": "string", "description": "Street address or reference point" },
                "locality": { "type": "string" },
                "contract_number": { "type": "string" },
                "reporter_name": { "type": "string" },
                "reporter_phone": { "type": "string" },
                "affects_many": { "type": "boolean", "description": "More than one household is affected" },
                "is_flooding": { "type": "boolean", "description": "Water is flooding the street or a property" },
                "water_quality": { "type": "boolean", "description": "Water looks, smells or tastes wrong" }
            },
            "required": ["category", "description"]
        })
    }

    fn kind(&self) -> ToolKind {
        ToolKind::Write
    }

    async fn execute(&self, args: ToolArgs) -> Result<ToolOutput, ToolError> {
        let raw_category = args.get_string("category")?;
        let category =
            IncidentCategory::parse(&raw_category).ok_or_else(|| ToolError::InvalidParameter {
                name: "category".to_string(),
                reason: format!("unknown value '{}'", raw_category),
            })?;

        let signals = SeveritySignals {
            affects_many: args.get_bool_or("affects_many", false),
            is_flooding: args.get_bool_or("is_flooding", false),
            water_quality: args.get_bool_or("water_quality", false),
        };

        let new = NewIncident {
            category,
            description: args.get_string("description")?,
            severity: IncidentSeverity::derive(category, signals),
            latitude: coordinate(&args, "latitude", 90.0)?,
            longitude: coordinate(&args, "longitude", 180.0)?,
            address: args.get_string_opt("address"),
            locality: args.get_string_or_slot("locality", LOCALITY_SLOT),
            contract_number: args.contract_number().ok(),
            reporter_name: args.get_string_opt("reporter_name"),
            reporter_phone: args.get_string_opt("reporter_phone"),
            channel: args.meta.channel.clone(),
        };

        Ok(self.deliver(&new, Utc::now()).await)
    }
}

/// Incidents reported for a contract or phone number.
pub struct GetIncidents {
    db: Database,
}

impl GetIncidents {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl Tool for GetIncidents {
    fn name(&self) -> &str {
        names::GET_INCIDENTS
    }

    fn description(&self) -> &str {
        "List incidents previously reported for a contract or by a phone number, with their status."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "contract_number": { "type": "string" },
                "phone": { "type": "string" }
            }
        })
    }

    async fn execute(&self, args: ToolArgs) -> Result<ToolOutput, ToolError> {
        let contract = args.contract_number().ok();
        let phone = args.get_string_opt("phone");
        if contract.is_none() && phone.is_none() {
            return Err(ToolError::MissingParameter("contract_number or phone".to_string()));
        }

        let incidents = incident::list_incidents(
            self.db.pool(),
            contract.as_deref(),
            phone.as_deref(),
            MAX_LISTED_INCIDENTS,
        )
        .await?;

        let listed: Vec<Value> = incidents
            .iter()
            .map(|i| {
                json!({
                    "incident_id": i.id,
                    "category": i.category.as_str(),
                    "severity": i.severity.as_str(),
                    "status": i.status.as_str(),
                    "address": i.address,
                    "locality": i.locality,
                    "created_at": i.created_at,
                })
            })
            .collect();

        Ok(ToolOutput::success(json!({
            "count": listed.len(),
            "incidents": listed,
        })))
    }
}
