//! Personas and the specialist router.
//!
//! Every [`Intent`] maps to exactly one [`Route`]: either a persona (its
//! instructions plus the tools it may call) or the human handoff, which
//! bypasses the model entirely.

use std::collections::HashMap;
use std::path::Path;

use agent_tools::names;
use tracing::info;

use crate::classifier::load_prompt_file;
use crate::intent::Intent;

/// The specialists a model turn can run as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PersonaKind {
    Leak,
    Billing,
    Consumption,
    Contract,
    Tickets,
    WaterDelivery,
    ServiceStatus,
    GeneralInfo,
}

impl PersonaKind {
    pub const ALL: [PersonaKind; 8] = [
        PersonaKind::Leak,
        PersonaKind::Billing,
        PersonaKind::Consumption,
        PersonaKind::Contract,
        PersonaKind::Tickets,
        PersonaKind::WaterDelivery,
        PersonaKind::ServiceStatus,
        PersonaKind::GeneralInfo,
    ];

    /// Persona name, also the override file stem in `PERSONA_PROMPT_DIR`.
    pub fn name(&self) -> &'static str {
        match self {
            PersonaKind::Leak => "leak",
            PersonaKind::Billing => "billing",
            PersonaKind::Consumption => "consumption",
            PersonaKind::Contract => "contract",
            PersonaKind::Tickets => "tickets",
            PersonaKind::WaterDelivery => "water-delivery",
            PersonaKind::ServiceStatus => "service-status",
            PersonaKind::GeneralInfo => "general-info",
        }
    }

    /// Tools this persona may call.
    pub fn tools(&self) -> &'static [&'static str] {
        match self {
            PersonaKind::Leak => &[
                names::REPORT_INCIDENT,
                names::GET_INCIDENTS,
                names::CREATE_TICKET,
                names::GET_SERVICE_ALERTS,
                names::GET_TICKET,
            ],
            PersonaKind::Billing => &[
                names::GET_DEBT,
                names::GET_CONTRACT_DETAILS,
                names::SEARCH_CUSTOMER_BY_CONTRACT,
                names::CREATE_TICKET,
                names::GET_CLIENT_TICKETS,
            ],
            PersonaKind::Consumption => &[
                names::GET_CONSUMPTION,
                names::GET_CONSUMPTION_PREDICTION,
                names::GET_CONTRACT_DETAILS,
                names::CREATE_TICKET,
            ],
            PersonaKind::Contract => &[
                names::GET_CONTRACT_DETAILS,
                names::SEARCH_CUSTOMER_BY_CONTRACT,
                names::CREATE_TICKET,
            ],
            PersonaKind::Tickets => &[
                names::GET_CLIENT_TICKETS,
                names::GET_TICKET,
                names::UPDATE_TICKET,
                names::CREATE_TICKET,
            ],
            PersonaKind::WaterDelivery => &[
                names::LIST_ORDERS,
                names::CREATE_ORDER,
                names::GET_ORDER,
                names::CANCEL_ORDER,
                names::GET_CONTRACT_DETAILS,
            ],
            PersonaKind::ServiceStatus => &[
                names::GET_SERVICE_ALERTS,
                names::GET_INCIDENTS,
                names::REPORT_INCIDENT,
            ],
            PersonaKind::GeneralInfo => &[names::GET_SERVICE_ALERTS],
        }
    }

    fn default_instructions(&self) -> &'static str {
        match self {
            PersonaKind::Leak => {
                "You take incident reports (leaks, burst pipes, sewage, contamination). \
                 Ask for the exact location if it is missing, then file it with report_incident \
                 and give the citizen the incident id. Flag flooding or many affected homes."
            }
            PersonaKind::Billing => {
                "You answer balance and payment questions. Use get_debt with the citizen's \
                 contract number and state the total, overdue and upcoming amounts. If a charge \
                 is disputed, open a receipt_review ticket and share the folio."
            }
            PersonaKind::Consumption => {
                "You explain water consumption. Use get_consumption for history and trend and \
                 get_consumption_prediction for the next bill. Suspected meter problems get a \
                 meter_reading ticket."
            }
            PersonaKind::Contract => {
                "You answer questions about the service contract: holder, address, tariff, meter \
                 and whether service is active, suspended or cut off."
            }
            PersonaKind::Tickets => {
                "You follow up on support tickets. Look them up by folio or by contract, report \
                 their status, and add notes or change status only when the citizen asks."
            }
            PersonaKind::WaterDelivery => {
                "You handle tanker-truck water deliveries. Confirm address and volume before \
                 create_order. Orders can be cancelled unless already delivered."
            }
            PersonaKind::ServiceStatus => {
                "You report outages, low pressure and maintenance. Check get_service_alerts for the \
                 citizen's locality; if nothing is listed and they have no water, offer to report it."
            }
            PersonaKind::GeneralInfo => {
                "You answer general questions about the water utility: office hours, procedures, \
                 payment channels. Keep it short and point to the right specialist topic."
            }
        }
    }
}

/// Shared rules appended to every persona's instructions.
const COMMON_RULES: &str = "Reply in the citizen's language, briefly and warmly. \
    Never invent amounts, folios or dates: only report what tools return. \
    If a tool fails, say you could not check right now and offer a ticket.";

/// A bound persona: instructions plus an allowed tool subset.
#[derive(Debug, Clone)]
pub struct Persona {
    pub kind: PersonaKind,
    pub instructions: String,
    pub tools: &'static [&'static str],
}

impl Persona {
    pub fn name(&self) -> &'static str {
        self.kind.name()
    }
}

/// What the router decided for an intent.
#[derive(Debug, Clone, Copy)]
pub enum Route<'a> {
    /// Run a persona turn.
    Persona(&'a Persona),
    /// Open an urgent ticket and reply with its folio; no model turn.
    HumanHandoff,
}

/// Static mapping from intent to persona.
#[derive(Debug, Clone)]
pub struct SpecialistRouter {
    personas: HashMap<PersonaKind, Persona>,
}

impl Default for SpecialistRouter {
    fn default() -> Self {
        Self::load(None::<&Path>)
    }
}

impl SpecialistRouter {
    /// Build every persona, reading `{dir}/{name}.md` overrides when present.
    pub fn load(prompt_dir: Option<impl AsRef<Path>>) -> Self {
        let dir: Option<&Path> = prompt_dir.as_ref().map(|d| d.as_ref());
        let personas = PersonaKind::ALL
            .into_iter()
            .map(|kind| {
                let base = dir
                    .and_then(|d| load_prompt_file(d.join(format!("{}.md", kind.name()))))
                    .inspect(|_| info!(persona = kind.name(), "Loaded persona prompt override"))
                    .unwrap_or_else(|| kind.default_instructions().to_string());
                let persona = Persona {
                    kind,
                    instructions: format!("{}\n\n{}", base, COMMON_RULES),
                    tools: kind.tools(),
                };
                (kind, persona)
            })
            .collect();
        Self { personas }
    }

    pub fn persona(&self, kind: PersonaKind) -> Option<&Persona> {
        self.personas.get(&kind)
    }

    pub fn route(&self, intent: Intent) -> Route<'_> {
        match persona_for(intent).and_then(|kind| self.persona(kind)) {
            Some(persona) => Route::Persona(persona),
            None => Route::HumanHandoff,
        }
    }
}

/// The persona each intent is handled by. `None` means human handoff.
pub fn persona_for(intent: Intent) -> Option<PersonaKind> {
    match intent {
        Intent::Leak => Some(PersonaKind::Leak),
        Intent::Billing => Some(PersonaKind::Billing),
        Intent::Consumption => Some(PersonaKind::Consumption),
        Intent::Contract => Some(PersonaKind::Contract),
        Intent::Tickets => Some(PersonaKind::Tickets),
        Intent::WaterDelivery => Some(PersonaKind::WaterDelivery),
        Intent::ServiceStatus => Some(PersonaKind::ServiceStatus),
        Intent::GeneralInfo => Some(PersonaKind::GeneralInfo),
        Intent::RequestHumanAgent => None,
    }
}
