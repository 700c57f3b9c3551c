//! The closed set of intents a message can be classified into.

use serde::{Deserialize, Serialize};

/// Intent assigned to an inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Intent {
    /// Leak, burst pipe, sewage overflow or any other field incident.
    Leak,
    /// Balance, payments, receipts.
    Billing,
    /// Consumption history and forecasts.
    Consumption,
    /// Contract holder, tariff and service status.
    Contract,
    /// Follow-up on existing support tickets.
    Tickets,
    /// Tanker-truck water delivery orders.
    WaterDelivery,
    /// Outages and service alerts.
    ServiceStatus,
    /// The citizen asks for a person.
    RequestHumanAgent,
    /// Anything else.
    GeneralInfo,
}

impl Intent {
    pub const ALL: [Intent; 9] = [
        Intent::Leak,
        Intent::Billing,
        Intent::Consumption,
        Intent::Contract,
        Intent::Tickets,
        Intent::WaterDelivery,
        Intent::ServiceStatus,
        Intent::RequestHumanAgent,
        Intent::GeneralInfo,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Intent::Leak => "leak",
            Intent::Billing => "billing",
            Intent::Consumption => "consumption",
            Intent::Contract => "contract",
            Intent::Tickets => "tickets",
            Intent::WaterDelivery => "water-delivery",
            Intent::ServiceStatus => "service-status",
            Intent::RequestHumanAgent => "request-human-agent",
            Intent::GeneralInfo => "general-info",
        }
    }

    /// Parse a label, tolerating case, surrounding whitespace and `_`.
    pub fn parse(label: &str) -> Option<Intent> {
        let normalized = label.trim().to_ascii_lowercase().replace('_', "-");
        Intent::ALL
            .into_iter()
            .find(|intent| intent.label() == normalized)
    }

    /// One-line description shown to the classifier.
    pub fn description(&self) -> &'static str {
        match self {
            Intent::Leak => "reports of leaks, burst pipes, sewage, contamination or other incidents in the street or at home",
            Intent::Billing => "balance, debt, payments, receipts and charges",
            Intent::Consumption => "water consumption history, unusually high consumption, next bill estimate",
            Intent::Contract => "contract holder, address, tariff, meter and service status",
            Intent::Tickets => "status or changes to a support ticket (folio) already opened",
            Intent::WaterDelivery => "requesting, checking or cancelling a tanker-truck water delivery",
            Intent::ServiceStatus => "outages, low pressure, scheduled maintenance in an area",
            Intent::RequestHumanAgent => "the citizen explicitly asks to talk to a person or an agent",
            Intent::GeneralInfo => "greetings, office hours, procedures and anything else",
        }
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}
