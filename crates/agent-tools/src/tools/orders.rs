//! Water-delivery (tanker) orders.

use async_trait::async_trait;
use chrono::Utc;
use database::{order, CancelOutcome, Database, NewOrder, Order};
use serde_json::{json, Value};

use crate::error::ToolError;
use crate::names;
use crate::tool::{Tool, ToolArgs, ToolKind, ToolOutput, LOCALITY_SLOT};

/// Orders returned by one listing.
pub const MAX_LISTED_ORDERS: i64 = 10;

/// Largest volume a single delivery can carry, in cubic meters.
pub const MAX_ORDER_VOLUME_M3: f64 = 20.0;

fn order_json(o: &Order) -> Value {
    json!({
        "order_id": o.id,
        "contract_number": o.contract_number,
        "address": o.address,
        "locality": o.locality,
        "volume_m3": o.volume_m3,
        "status": o.status.as_str(),
        "notes": o.notes,
        "cancel_reason": o.cancel_reason,
        "created_at": o.created_at,
        "updated_at": o.updated_at,
    })
}

fn order_id_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "order_id": { "type": "string" }
        },
        "required": ["order_id"]
    })
}

pub struct ListOrders {
    db: Database,
}

impl ListOrders {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl Tool for ListOrders {
    fn name(&self) -> &str {
        names::LIST_ORDERS
    }

    fn description(&self) -> &str {
        "List the water-delivery orders placed for a contract, newest first."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "contract_number": { "type": "string" }
            }
        })
    }

    async fn execute(&self, args: ToolArgs) -> Result<ToolOutput, ToolError> {
        let contract = args.contract_number()?;
        let orders = order::list_orders(self.db.pool(), &contract, MAX_LISTED_ORDERS).await?;
        Ok(ToolOutput::success(json!({
            "contract_number": contract,
            "count": orders.len(),
            "orders": orders.iter().map(order_json).collect::<Vec<_>>(),
        })))
    }
}

pub struct CreateOrder {
    db: Database,
}

impl CreateOrder {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl Tool for CreateOrder {
    fn name(&self) -> &str {
        names::CREATE_ORDER
    }

    fn description(&self) -> &str {
        "Place a water-delivery order (tanker truck) for a contract. Confirm address and volume with the customer first."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "contract_number": { "type": "string" },
                "address": { "type": "string", "description": "Delivery address" },
                "locality": { "type": "string" },
                "volume_m3": {
                    "type": "number",
                    "exclusiveMinimum": 0,
                    "maximum": MAX_ORDER_VOLUME_M3,
                    "description": "Requested volume in cubic meters"
                },
                "notes": { "type": "string" }
            },
            "required": ["address", "volume_m3"]
        })
    }

    fn kind(&self) -> ToolKind {
        ToolKind::Write
    }

    async fn execute(&self, args: ToolArgs) -> Result<ToolOutput, ToolError> {
        let volume_m3 = args.get_f64("volume_m3")?;
        if !(volume_m3 > 0.0 && volume_m3 <= MAX_ORDER_VOLUME_M3) {
            return Err(ToolError::InvalidParameter {
                name: "volume_m3".to_string(),
                reason: format!("must be greater than 0 and at most {}", MAX_ORDER_VOLUME_M3),
            });
        }

        let new = NewOrder {
            contract_number: args.contract_number()?,
            address: args.get_string("address")?,
            locality: args.get_string_or_slot("locality", LOCALITY_SLOT),
            volume_m3,
            notes: args.get_string_opt("notes"),
        };

        let created = order::create_order(self.db.pool(), &new, Utc::now()).await?;
        Ok(ToolOutput::success(order_json(&created)))
    }
}

pub struct GetOrder {
    db: Database,
}

impl GetOrder {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl Tool for GetOrder {
    fn name(&self) -> &str {
        names::GET_ORDER
    }

    fn description(&self) -> &str {
        "Get the status of a water-delivery order."
    }

    fn parameters(&self) -> Value {
        order_id_schema()
    }

    async fn execute(&self, args: ToolArgs) -> Result<ToolOutput, ToolError> {
        let id = args.get_string("order_id")?;
        let found = order::get_order(self.db.pool(), &id).await?;
        Ok(ToolOutput::success(order_json(&found)))
    }
}

/// Cancel an order unless it was already delivered.
pub struct CancelOrder {
    db: Database,
}

impl CancelOrder {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl Tool for CancelOrder {
    fn name(&self) -> &str {
        names::CANCEL_ORDER
    }

    fn description(&self) -> &str {
        "Cancel a water-delivery order. Delivered orders cannot be cancelled."
    }

    fn parameters(&self) -> Value {
        let mut schema = order_id_schema();
        schema["properties"]["reason"] = json!({ "type": "string" });
        schema
    }

    fn kind(&self) -> ToolKind {
        ToolKind::Write
    }

    async fn execute(&self, args: ToolArgs) -> Result<ToolOutput, ToolError> {
        let id = args.get_string("order_id")?;
        let reason = args.get_string_opt("reason");

        let outcome =
            order::cancel_order(self.db.pool(), &id, reason.as_deref(), Utc::now()).await?;
        let mut data = order_json(outcome.order());
        data["already_cancelled"] = json!(matches!(outcome, CancelOutcome::AlreadyCancelled(_)));
        Ok(ToolOutput::success(data))
    }
}
