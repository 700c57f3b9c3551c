//! Service-desk tool implementations.

mod alerts;
mod billing;
mod customer;
mod incidents;
mod orders;
mod tickets;

pub use alerts::GetServiceAlerts;
pub use billing::{
    forecast, ConsumptionForecast, GetConsumption, GetConsumptionPrediction, GetContractDetails,
    GetDebt, DEFAULT_CONSUMPTION_WINDOW, MAX_LINE_ITEMS,
};
pub use customer::SearchCustomerByContract;
pub use incidents::{
    DatabaseIncidentBackend, GetIncidents, IncidentBackend, IncidentBackendConfig,
    ReportIncident, WebhookIncidentBackend,
};
pub use orders::{CancelOrder, CreateOrder, GetOrder, ListOrders};
pub use tickets::{CreateTicket, GetClientTickets, GetTicket, UpdateTicket, DEGRADED_WARNING};
