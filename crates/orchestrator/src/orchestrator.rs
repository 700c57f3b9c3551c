//! The workflow runner: classify, route, execute, persist, respond.

use std::sync::Arc;

use agent_tools::{
    default_registry, names, CreateTicket, DeskServices, RegistryToolExecutor, ToolPolicy,
    ToolRegistry,
};
use brain_core::{Brain, ConversationStore, InboundMessage, Slots, ToolRequestMeta, TurnItem};
use database::{NewTicket, TicketCategory, TicketPriority};
use openai_brain::{OpenAiBrain, OpenAiBrainConfig};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::classifier::{Classification, Classifier};
use crate::config::OrchestratorConfig;
use crate::enrich::{compose_user_text, Geocoder, Transcriber};
use crate::error::OrchestratorError;
use crate::persona::{Persona, Route, SpecialistRouter};
use crate::runner::{run_persona_turn, TurnOutput};

/// Reply used whenever a turn fails before producing an answer.
pub const GENERIC_ERROR_REPLY: &str = "I had trouble processing that, please try again.";

/// Reply to a message with no content at all.
pub const EMPTY_MESSAGE_REPLY: &str =
    "I didn't receive any text. Please tell me how I can help you.";

/// History lines copied into a handoff ticket's description.
const HANDOFF_CONTEXT_ITEMS: usize = 6;

/// Normalized result of one turn.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WorkflowOutput {
    /// Reply for the citizen. Always present, even on failure.
    pub text: String,
    /// Intent label, when classification succeeded.
    pub classification: Option<String>,
    /// Tools invoked during the turn, in call order.
    pub tools_invoked: Vec<String>,
    /// Folio of a ticket opened during the turn.
    pub ticket_folio: Option<String>,
    /// Internal error description, for logs and callers (never shown to the citizen).
    pub error: Option<String>,
}

impl WorkflowOutput {
    fn failed(text: &str, error: &OrchestratorError) -> Self {
        Self {
            text: text.to_string(),
            error: Some(error.to_string()),
            ..Self::default()
        }
    }
}

/// Drives each inbound message through classification, routing and tool
/// execution, and keeps the bounded per-conversation history.
///
/// Turns for different conversations may run concurrently. Turns for the
/// same conversation are expected to be serialized by the caller.
pub struct Orchestrator {
    classifier: Classifier,
    responder: Arc<dyn Brain>,
    registry: Arc<ToolRegistry>,
    router: SpecialistRouter,
    store: Arc<ConversationStore>,
    handoff: CreateTicket,
    geocoder: Option<Arc<dyn Geocoder>>,
    transcriber: Option<Arc<dyn Transcriber>>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    /// Create an orchestrator over the given services.
    ///
    /// `responder` runs persona turns; the classifier carries its own brain.
    pub fn new(
        classifier: Classifier,
        responder: Arc<dyn Brain>,
        services: &DeskServices,
        config: OrchestratorConfig,
    ) -> Self {
        let store = Arc::new(ConversationStore::with_limits(
            config.max_history_items,
            config.conversation_ttl,
            config.max_conversations,
        ));
        let router = SpecialistRouter::load(config.persona_prompt_dir.as_ref());

        info!(
            responder = responder.name(),
            max_history_items = config.max_history_items,
            ttl_secs = config.conversation_ttl.as_secs(),
            "Orchestrator initialized"
        );

        Self {
            classifier,
            responder,
            registry: Arc::new(default_registry(services)),
            router,
            store,
            handoff: services.ticket_creator(),
            geocoder: None,
            transcriber: None,
            config,
        }
    }

    /// Build everything from environment variables.
    ///
    /// See [`OrchestratorConfig::from_env`], [`DeskServices::from_env`] and
    /// [`OpenAiBrainConfig::from_env`]. `OPENAI_CLASSIFIER_MODEL` selects a
    /// separate model for classification.
    pub async fn from_env() -> Result<Self, OrchestratorError> {
        let config = OrchestratorConfig::from_env();
        let services = DeskServices::from_env().await?;

        let responder = OpenAiBrain::from_env()?;
        let classifier_brain = OpenAiBrain::new(OpenAiBrainConfig::classifier_from_env()?)?;
        let classifier =
            Classifier::new(Arc::new(classifier_brain)).with_timeout(config.model_timeout);

        Ok(Self::new(classifier, Arc::new(responder), &services, config))
    }

    pub fn with_geocoder(mut self, geocoder: Arc<dyn Geocoder>) -> Self {
        self.geocoder = Some(geocoder);
        self
    }

    pub fn with_transcriber(mut self, transcriber: Arc<dyn Transcriber>) -> Self {
        self.transcriber = Some(transcriber);
        self
    }

    pub fn store(&self) -> &Arc<ConversationStore> {
        &self.store
    }

    pub fn registry(&self) -> &ToolRegistry {
        self.registry.as_ref()
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Start the background sweep of idle conversations.
    pub fn start_sweeper(&self) -> JoinHandle<()> {
        self.store.spawn_sweeper(self.config.sweep_interval)
    }

    /// Run one turn. Never fails: every error becomes a citizen-facing reply
    /// with `error` set.
    pub async fn run_workflow(&self, message: InboundMessage) -> WorkflowOutput {
        if message.is_empty() {
            debug!(conversation_id = %message.conversation_id, "Rejecting empty message");
            return WorkflowOutput::failed(EMPTY_MESSAGE_REPLY, &OrchestratorError::EmptyMessage);
        }

        let conversation_id = message.conversation_id.clone();
        let text = compose_user_text(
            &message,
            self.geocoder.as_deref(),
            self.transcriber.as_deref(),
        )
        .await;
        let state = self.store.get(&conversation_id).await;

        let classification = match self.classifier.classify(&state.history, &text).await {
            Ok(c) => c,
            Err(e) => {
                warn!(conversation_id = %conversation_id, error = %e, "Classification failed");
                return WorkflowOutput::failed(GENERIC_ERROR_REPLY, &e);
            }
        };
        let Classification { intent, slots: extracted } = classification;
        info!(conversation_id = %conversation_id, intent = %intent, "Message classified");

        self.store
            .record_classification(&conversation_id, intent.label(), &extracted)
            .await;
        let mut slots = state.slots.clone();
        slots.merge(&extracted);

        let user_item = TurnItem::user_with_image(text.clone(), message.image_url.clone());

        let turn = match self.router.route(intent) {
            Route::HumanHandoff => self.human_handoff(&message, &text, &slots, &state.history).await,
            Route::Persona(persona) => {
                let mut history = state.history;
                history.push(user_item.clone());
                match self.persona_turn(persona, &message, &slots, &history).await {
                    Ok(turn) => turn,
                    Err(e) => {
                        warn!(
                            conversation_id = %conversation_id,
                            persona = persona.name(),
                            error = %e,
                            "Persona turn failed"
                        );
                        return WorkflowOutput {
                            classification: Some(intent.label().to_string()),
                            ..WorkflowOutput::failed(GENERIC_ERROR_REPLY, &e)
                        };
                    }
                }
            }
        };

        if turn.text.is_empty() {
            warn!(conversation_id = %conversation_id, intent = %intent, "Turn produced no reply text");
        }

        let ticket_folio = opened_folio(&turn.items);
        let mut new_items = Vec::with_capacity(turn.items.len() + 1);
        new_items.push(user_item);
        new_items.extend(turn.items);
        let stored = self.store.append(&conversation_id, new_items).await;
        debug!(conversation_id = %conversation_id, history_items = stored, "History updated");

        WorkflowOutput {
            text: turn.text,
            classification: Some(intent.label().to_string()),
            tools_invoked: turn.tools_invoked,
            ticket_folio,
            error: None,
        }
    }

    async fn persona_turn(
        &self,
        persona: &Persona,
        message: &InboundMessage,
        slots: &Slots,
        history: &[TurnItem],
    ) -> Result<TurnOutput, OrchestratorError> {
        let executor = RegistryToolExecutor::from_shared(
            Arc::clone(&self.registry),
            ToolPolicy::default().allow_tools(persona.tools.iter().copied()),
        );
        let meta = ToolRequestMeta {
            conversation_id: Some(message.conversation_id.clone()),
            channel: message.channel.clone(),
            slots: slots.to_map(),
        };

        run_persona_turn(
            self.responder.as_ref(),
            persona,
            &executor,
            history,
            &meta,
            self.config.turn_limits(),
        )
        .await
    }

    /// Open an urgent ticket and acknowledge with its folio. No model call.
    async fn human_handoff(
        &self,
        message: &InboundMessage,
        text: &str,
        slots: &Slots,
        history: &[TurnItem],
    ) -> TurnOutput {
        let recent: Vec<String> = history
            .iter()
            .rev()
            .take(HANDOFF_CONTEXT_ITEMS)
            .map(TurnItem::render)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        let mut description = text.to_string();
        if !recent.is_empty() {
            description.push_str("\n\nRecent conversation:\n");
            description.push_str(&recent.join("\n"));
        }

        let new = NewTicket {
            category: TicketCategory::Urgent,
            title: "Citizen requested a human agent".to_string(),
            description,
            priority: TicketPriority::Urgent,
            contract_number: slots.contract_number.clone(),
            client_name: message.sender_name.clone(),
            client_email: None,
            location: message
                .location
                .as_ref()
                .and_then(|l| l.address.clone().or_else(|| l.name.clone())),
            channel: message.channel.clone(),
        };

        let output = self.handoff.open(&new).await;
        let folio = output
            .get("folio")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_default();
        info!(
            conversation_id = %message.conversation_id,
            folio = %folio,
            "Human handoff ticket opened"
        );

        let reply = format!(
            "I've passed your request to a customer service agent. Your folio is {}. \
             An agent will contact you as soon as possible.",
            folio
        );
        let call_id = format!("handoff-{}", folio);
        let arguments = json!({
            "category": TicketCategory::Urgent.as_str(),
            "priority": TicketPriority::Urgent.as_str(),
            "title": new.title,
        });

        TurnOutput {
            items: vec![
                TurnItem::ToolCall {
                    call_id: call_id.clone(),
                    name: names::CREATE_TICKET.to_string(),
                    arguments: arguments.to_string(),
                },
                TurnItem::ToolOutput {
                    call_id,
                    name: names::CREATE_TICKET.to_string(),
                    success: output.is_success(),
                    output: output.to_json().to_string(),
                },
                TurnItem::assistant(reply.clone()),
            ],
            text: reply,
            tools_invoked: vec![names::CREATE_TICKET.to_string()],
        }
    }
}

/// Folio of the last ticket successfully opened among `items`.
fn opened_folio(items: &[TurnItem]) -> Option<String> {
    items.iter().rev().find_map(|item| match item {
        TurnItem::ToolOutput {
            name,
            success: true,
            output,
            ..
        } if name == names::CREATE_TICKET => serde_json::from_str::<Value>(output)
            .ok()?
            .get("folio")?
            .as_str()
            .map(str::to_string),
        _ => None,
    })
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("responder", &self.responder.name())
            .field("classifier_prompt", &self.classifier.prompt_hash())
            .field("tools", &self.registry.list_tools().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opened_folio_reads_last_successful_ticket() {
        let items = vec![
            TurnItem::ToolOutput {
                call_id: "1".into(),
                name: names::CREATE_TICKET.into(),
                success: true,
                output: r#"{"success":true,"folio":"ACL-20260101-0001"}"#.into(),
            },
            TurnItem::ToolOutput {
                call_id: "2".into(),
                name: names::GET_DEBT.into(),
                success: true,
                output: r#"{"success":true,"folio":"nope"}"#.into(),
            },
            TurnItem::ToolOutput {
                call_id: "3".into(),
                name: names::CREATE_TICKET.into(),
                success: false,
                output: r#"{"success":false,"error":"x"}"#.into(),
            },
        ];
        assert_eq!(opened_folio(&items).as_deref(), Some("ACL-20260101-0001"));
        assert_eq!(opened_folio(&[]), None);
    }

    #[test]
    fn test_failed_output_keeps_reply() {
        let out = WorkflowOutput::failed(GENERIC_ERROR_REPLY, &OrchestratorError::EmptyMessage);
        assert_eq!(out.text, GENERIC_ERROR_REPLY);
        assert_eq!(out.error.as_deref(), Some("empty message"));
        assert!(out.tools_invoked.is_empty());
    }
}
