//! Ticket tools: open, list, consult and update support tickets.

use async_trait::async_trait;
use chrono::Utc;
use database::{
    ticket, Database, FolioGenerator, NewTicket, Ticket, TicketCategory, TicketPriority,
    TicketStatus, TicketUpdate,
};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::error::ToolError;
use crate::names;
use crate::tool::{Tool, ToolArgs, ToolKind, ToolOutput};

/// Tickets returned by one listing.
pub const MAX_LISTED_TICKETS: i64 = 20;

/// Warning attached when a ticket could not be stored.
pub const DEGRADED_WARNING: &str =
    "The ticket could not be saved right now; it was registered locally and will be synchronized later.";

fn enum_values<T: Copy>(all: &[T], as_str: fn(&T) -> &'static str) -> Vec<&'static str> {
    all.iter().map(as_str).collect()
}

fn parse_enum<T>(
    args: &ToolArgs,
    key: &str,
    parse: fn(&str) -> Option<T>,
) -> Result<Option<T>, ToolError> {
    match args.get_string_opt(key) {
        None => Ok(None),
        Some(raw) => parse(&raw).map(Some).ok_or_else(|| ToolError::InvalidParameter {
            name: key.to_string(),
            reason: format!("unknown value '{}'", raw),
        }),
    }
}

fn ticket_summary(t: &Ticket) -> Value {
    json!({
        "folio": t.folio,
        "category": t.category.as_str(),
        "title": t.title,
        "status": t.status.as_str(),
        "priority": t.priority.as_str(),
        "created_at": t.created_at,
    })
}

fn ticket_detail(t: &Ticket) -> Value {
    json!({
        "folio": t.folio,
        "ticket_id": t.id,
        "category": t.category.as_str(),
        "title": t.title,
        "description": t.description,
        "status": t.status.as_str(),
        "priority": t.priority.as_str(),
        "contract_number": t.contract_number,
        "location": t.location,
        "notes": t.notes,
        "created_at": t.created_at,
        "updated_at": t.updated_at,
        "resolved_at": t.resolved_at,
    })
}

/// Open a ticket.
///
/// A store failure does not fail the call: the result carries a fallback
/// folio, `persisted: false` and a warning.
pub struct CreateTicket {
    db: Database,
    folios: FolioGenerator,
}

impl CreateTicket {
    pub fn new(db: Database, folios: FolioGenerator) -> Self {
        Self { db, folios }
    }

    /// Open a ticket outside the model's tool loop (human handoff).
    pub async fn open(&self, new: &NewTicket) -> ToolOutput {
        let now = Utc::now();
        match ticket::create_ticket(self.db.pool(), &self.folios, new, now).await {
            Ok(t) => {
                info!(folio = %t.folio, category = t.category.as_str(), "Ticket opened");
                ToolOutput::success(json!({
                    "folio": t.folio,
                    "ticket_id": t.id,
                    "status": t.status.as_str(),
                    "priority": t.priority.as_str(),
                    "persisted": true,
                }))
            }
            Err(e) => {
                let folio = self.folios.fallback(new.category, now);
                warn!(error = %e, folio = %folio, "Ticket store failed, issuing fallback folio");
                ToolOutput::success(json!({
                    "folio": folio,
                    "ticket_id": Value::Null,
                    "status": TicketStatus::Open.as_str(),
                    "priority": new.priority.as_str(),
                    "persisted": false,
                    "warning": DEGRADED_WARNING,
                }))
            }
        }
    }
}

#[async_trait]
impl Tool for CreateTicket {
    fn name(&self) -> &str {
        names::CREATE_TICKET
    }

    fn description(&self) -> &str {
        "Open a support ticket and return its folio. Use for leaks, payment problems, meter reading disputes, receipt reviews, digital receipt requests and clarifications."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "category": {
                    "type": "string",
                    "enum": enum_values(&TicketCategory::ALL, TicketCategory::as_str),
                },
                "title": { "type": "string", "description": "Short summary of the problem" },
                "description": { "type": "string", "description": "What the customer reported" },
                "contract_number": { "type": "string" },
                "email": { "type": "string" },
                "client_name": { "type": "string" },
                "location": { "type": "string", "description": "Address or reference point" },
                "priority": {
                    "type": "string",
                    "enum": enum_values(&TicketPriority::ALL, TicketPriority::as_str),
                }
            },
            "required": ["category", "title", "description"]
        })
    }

    fn kind(&self) -> ToolKind {
        ToolKind::Write
    }

    async fn execute(&self, args: ToolArgs) -> Result<ToolOutput, ToolError> {
        let category = parse_enum(&args, "category", TicketCategory::parse)?.unwrap_or_default();
        let new = NewTicket {
            category,
            title: args.get_string("title")?,
            description: args.get_string("description")?,
            priority: parse_enum(&args, "priority", TicketPriority::parse)?.unwrap_or_default(),
            contract_number: args.contract_number().ok(),
            client_name: args.get_string_opt("client_name"),
            client_email: args.get_string_opt("email"),
            location: args.get_string_opt("location"),
            channel: args.meta.channel.clone(),
        };
        Ok(self.open(&new).await)
    }
}

/// Tickets on file for a contract.
pub struct GetClientTickets {
    db: Database,
}

impl GetClientTickets {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl Tool for GetClientTickets {
    fn name(&self) -> &str {
        names::GET_CLIENT_TICKETS
    }

    fn description(&self) -> &str {
        "List the support tickets filed for a contract, newest first."
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
        let tickets =
            ticket::list_tickets_by_contract(self.db.pool(), &contract, MAX_LISTED_TICKETS).await?;

        Ok(ToolOutput::success(json!({
            "contract_number": contract,
            "count": tickets.len(),
            "tickets": tickets.iter().map(ticket_summary).collect::<Vec<_>>(),
        })))
    }
}

/// One ticket by folio.
pub struct GetTicket {
    db: Database,
}

impl GetTicket {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl Tool for GetTicket {
    fn name(&self) -> &str {
        names::GET_TICKET
    }

    fn description(&self) -> &str {
        "Look up a support ticket by its folio (e.g. FUG-20240501-0003)."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "folio": { "type": "string" }
            },
            "required": ["folio"]
        })
    }

    async fn execute(&self, args: ToolArgs) -> Result<ToolOutput, ToolError> {
        let folio = args.get_string("folio")?.to_uppercase();
        let t = ticket::get_ticket_by_folio(self.db.pool(), &folio).await?;
        Ok(ToolOutput::success(ticket_detail(&t)))
    }
}

/// Partial ticket update.
pub struct UpdateTicket {
    db: Database,
}

impl UpdateTicket {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl Tool for UpdateTicket {
    fn name(&self) -> &str {
        names::UPDATE_TICKET
    }

    fn description(&self) -> &str {
        "Update a ticket's status or priority, or append a note. Fields not given are left unchanged."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "folio": { "type": "string" },
                "status": {
                    "type": "string",
                    "enum": enum_values(&TicketStatus::ALL, TicketStatus::as_str),
                },
                "priority": {
                    "type": "string",
                    "enum": enum_values(&TicketPriority::ALL, TicketPriority::as_str),
                },
                "notes": { "type": "string", "description": "Note to append to the ticket" }
            },
            "required": ["folio"]
        })
    }

    fn kind(&self) -> ToolKind {
        ToolKind::Write
    }

    async fn execute(&self, args: ToolArgs) -> Result<ToolOutput, ToolError> {
        let folio = args.get_string("folio")?.to_uppercase();
        let update = TicketUpdate {
            status: parse_enum(&args, "status", TicketStatus::parse)?,
            priority: parse_enum(&args, "priority", TicketPriority::parse)?,
            note: args.get_string_opt("notes"),
        };

        let t = ticket::update_ticket(self.db.pool(), &folio, &update, Utc::now()).await?;
        Ok(ToolOutput::success(ticket_detail(&t)))
    }
}
