//! End-to-end turns through the orchestrator with scripted models.

use std::sync::Arc;
use std::time::Duration;

use agent_tools::DeskServices;
use async_trait::async_trait;
use brain_core::{InboundMessage, SharedLocation, TurnItem};
use database::{ticket, Database, TicketPriority};
use mock_brain::ScriptedBrain;
use orchestrator::{
    Classifier, Geocoder, Orchestrator, OrchestratorConfig, EMPTY_MESSAGE_REPLY,
    GENERIC_ERROR_REPLY,
};
use regex::Regex;
use serde_json::json;
use upstream_api::{UpstreamClient, UpstreamConfig};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CONVERSATION: &str = "5213312345678";

struct Harness {
    orchestrator: Orchestrator,
    classifier: Arc<ScriptedBrain>,
    responder: Arc<ScriptedBrain>,
    db: Database,
}

async fn harness(
    classifier: ScriptedBrain,
    responder: ScriptedBrain,
    upstream: Option<&MockServer>,
    config: OrchestratorConfig,
) -> Harness {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    db.migrate().await.unwrap();

    let mut services = DeskServices::new(db.clone());
    if let Some(server) = upstream {
        let config = UpstreamConfig::new(server.uri()).with_timeout(Duration::from_secs(2));
        services = services.with_upstream(UpstreamClient::new(config).unwrap());
    }

    let classifier = Arc::new(classifier);
    let responder = Arc::new(responder);
    let orchestrator = Orchestrator::new(
        Classifier::with_prompt(classifier.clone(), "classify"),
        responder.clone(),
        &services,
        config,
    );

    Harness {
        orchestrator,
        classifier,
        responder,
        db,
    }
}

fn folio_pattern() -> Regex {
    Regex::new(r"[A-Z]{3}-\d{8}-\d{4}").unwrap()
}

#[tokio::test]
async fn test_balance_query_keeps_contract_slot() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/GetDebt"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "<r><TotalDebt>150.00</TotalDebt><OverdueAmount>50.00</OverdueAmount>\
             <UpcomingAmount>100.00</UpcomingAmount></r>",
        ))
        .expect(2)
        .mount(&upstream)
        .await;

    let classifier = ScriptedBrain::new()
        .then_json(json!({ "category": "billing", "contract_number": "123456", "locality": null }))
        .then_json(json!({ "category": "billing", "contract_number": null, "locality": null }));
    let responder = ScriptedBrain::new()
        .then_tool_call("get_debt", json!({ "contract_number": "123456" }))
        .then_text("Your balance for contract 123456 is $150.00, of which $50.00 is overdue.")
        // Follow-up turn: the model omits the contract, the sticky slot fills it.
        .then_tool_call("get_debt", json!({}))
        .then_text("It is still $150.00.");

    let h = harness(classifier, responder, Some(&upstream), OrchestratorConfig::default()).await;

    let first = h
        .orchestrator
        .run_workflow(InboundMessage::text(
            CONVERSATION,
            "What's my balance for contract 123456",
        ))
        .await;

    assert!(first.error.is_none(), "unexpected error: {:?}", first.error);
    assert!(first.text.contains("150"));
    assert_eq!(first.classification.as_deref(), Some("billing"));
    assert_eq!(first.tools_invoked, vec!["get_debt"]);
    assert!(first.ticket_folio.is_none());

    let state = h.orchestrator.store().get(CONVERSATION).await;
    assert_eq!(state.slots.contract_number.as_deref(), Some("123456"));
    assert_eq!(state.classification.as_deref(), Some("billing"));
    // user, tool call, tool output, assistant
    assert_eq!(state.history.len(), 4);

    let second = h
        .orchestrator
        .run_workflow(InboundMessage::text(CONVERSATION, "and is it overdue?"))
        .await;
    assert!(second.error.is_none(), "unexpected error: {:?}", second.error);
    assert!(second.text.contains("150"));

    // The tool output the model saw on the follow-up came from the slot.
    let requests = h.responder.requests();
    let follow_up = &requests[3];
    let output = follow_up
        .items
        .iter()
        .rev()
        .find_map(|item| match item {
            TurnItem::ToolOutput { output, .. } => Some(output.clone()),
            _ => None,
        })
        .unwrap();
    assert!(output.contains("\"contract_number\":\"123456\""));
    assert!(output.contains("\"total_debt\":150"));

    // The classifier saw the earlier exchange as context.
    let classifier_requests = h.classifier.requests();
    let TurnItem::Message { content, .. } = &classifier_requests[1].items[0] else {
        panic!("classifier input should be a message");
    };
    assert!(content.starts_with("[CONTEXT:"));
}

#[tokio::test]
async fn test_human_handoff_opens_urgent_ticket() {
    let classifier = ScriptedBrain::new().then_json(json!({
        "category": "request-human-agent",
        "contract_number": "654321",
        "locality": null
    }));
    let h = harness(classifier, ScriptedBrain::new(), None, OrchestratorConfig::default()).await;

    let output = h
        .orchestrator
        .run_workflow(InboundMessage::text(CONVERSATION, "I want to speak to a real person"))
        .await;

    assert!(output.error.is_none());
    assert_eq!(output.classification.as_deref(), Some("request-human-agent"));
    assert!(folio_pattern().is_match(&output.text));
    assert!(output.tools_invoked.contains(&"create_ticket".to_string()));

    let folio = output.ticket_folio.expect("folio");
    assert!(folio.starts_with("URG-"));
    assert!(output.text.contains(&folio));

    let stored = ticket::get_ticket_by_folio(h.db.pool(), &folio).await.unwrap();
    assert_eq!(stored.priority, TicketPriority::Urgent);
    assert_eq!(stored.contract_number.as_deref(), Some("654321"));

    // No persona turn ran.
    assert!(h.responder.requests().is_empty());
}

#[tokio::test]
async fn test_handoff_with_store_down_still_returns_folio() {
    let classifier = ScriptedBrain::new().then_json(json!({
        "category": "request-human-agent",
        "contract_number": null,
        "locality": null
    }));
    let h = harness(classifier, ScriptedBrain::new(), None, OrchestratorConfig::default()).await;
    h.db.close().await;

    let output = h
        .orchestrator
        .run_workflow(InboundMessage::text(CONVERSATION, "quiero hablar con un asesor"))
        .await;

    let folio = output.ticket_folio.expect("fallback folio");
    assert!(folio_pattern().is_match(&folio));
    assert!(output.text.contains(&folio));

    let state = h.orchestrator.store().get(CONVERSATION).await;
    let degraded = state
        .history
        .iter()
        .find_map(|item| match item {
            TurnItem::ToolOutput { output, .. } => Some(output.clone()),
            _ => None,
        })
        .unwrap();
    assert!(degraded.contains("\"persisted\":false"));
    assert!(degraded.contains("\"warning\""));
}

#[tokio::test]
async fn test_empty_ticket_list_is_not_an_error() {
    let classifier = ScriptedBrain::new().then_json(json!({
        "category": "tickets",
        "contract_number": "999999",
        "locality": null
    }));
    let responder = ScriptedBrain::new()
        .then_tool_call("get_client_tickets", json!({}))
        .then_text("You have no tickets on file.");
    let h = harness(classifier, responder, None, OrchestratorConfig::default()).await;

    let output = h
        .orchestrator
        .run_workflow(InboundMessage::text(CONVERSATION, "do I have open tickets?"))
        .await;

    assert!(output.error.is_none());
    assert_eq!(output.tools_invoked, vec!["get_client_tickets"]);

    let requests = h.responder.requests();
    let last = requests[1].items.last().unwrap();
    match last {
        TurnItem::ToolOutput {
            success, output, ..
        } => {
            assert!(*success);
            assert!(output.contains("\"tickets\":[]"));
        }
        other => panic!("expected tool output, got {:?}", other),
    }
}

#[tokio::test]
async fn test_classification_failure_is_not_persisted() {
    let classifier = ScriptedBrain::new().then_text("I think this is about billing");
    let h = harness(classifier, ScriptedBrain::new(), None, OrchestratorConfig::default()).await;

    let output = h
        .orchestrator
        .run_workflow(InboundMessage::text(CONVERSATION, "hola"))
        .await;

    assert_eq!(output.text, GENERIC_ERROR_REPLY);
    assert!(output.error.is_some());
    assert!(output.classification.is_none());
    assert!(h.orchestrator.store().get(CONVERSATION).await.history.is_empty());
    assert!(h.responder.requests().is_empty());
}

#[tokio::test]
async fn test_empty_message_is_rejected_before_classification() {
    let h = harness(
        ScriptedBrain::new(),
        ScriptedBrain::new(),
        None,
        OrchestratorConfig::default(),
    )
    .await;

    let output = h
        .orchestrator
        .run_workflow(InboundMessage::text(CONVERSATION, "   "))
        .await;

    assert_eq!(output.text, EMPTY_MESSAGE_REPLY);
    assert_eq!(output.error.as_deref(), Some("empty message"));
    assert!(h.classifier.requests().is_empty());
}

#[tokio::test]
async fn test_persona_failure_returns_generic_reply() {
    let classifier = ScriptedBrain::new().then_json(json!({
        "category": "general-info",
        "contract_number": null,
        "locality": null
    }));
    let responder = ScriptedBrain::new()
        .then_error(brain_core::BrainError::Unavailable("overloaded".to_string()));
    let h = harness(classifier, responder, None, OrchestratorConfig::default()).await;

    let output = h
        .orchestrator
        .run_workflow(InboundMessage::text(CONVERSATION, "what are your office hours?"))
        .await;

    assert_eq!(output.text, GENERIC_ERROR_REPLY);
    assert_eq!(output.classification.as_deref(), Some("general-info"));
    assert!(output.error.unwrap().contains("overloaded"));
}

#[tokio::test]
async fn test_history_stays_bounded_across_turns() {
    let mut classifier = ScriptedBrain::new();
    let mut responder = ScriptedBrain::new();
    for i in 0..4 {
        classifier = classifier.then_json(json!({ "category": "general-info" }));
        responder = responder.then_text(format!("reply {}", i));
    }
    let config = OrchestratorConfig {
        max_history_items: 3,
        ..OrchestratorConfig::default()
    };
    let h = harness(classifier, responder, None, config).await;

    for i in 0..4 {
        h.orchestrator
            .run_workflow(InboundMessage::text(CONVERSATION, format!("question {}", i)))
            .await;
    }

    let history = h.orchestrator.store().get(CONVERSATION).await.history;
    assert_eq!(
        history,
        vec![
            TurnItem::assistant("reply 2"),
            TurnItem::user("question 3"),
            TurnItem::assistant("reply 3"),
        ]
    );
}

struct StaticGeocoder;

#[async_trait]
impl Geocoder for StaticGeocoder {
    async fn reverse(&self, _latitude: f64, _longitude: f64) -> Option<String> {
        Some("Av. Vallarta 1500, Guadalajara".to_string())
    }
}

#[tokio::test]
async fn test_shared_location_reaches_leak_persona() {
    let classifier = ScriptedBrain::new().then_json(json!({
        "category": "leak",
        "contract_number": null,
        "locality": "Guadalajara"
    }));
    let responder = ScriptedBrain::new()
        .then_tool_call(
            "report_incident",
            json!({
                "category": "leak",
                "description": "Fuga en la banqueta",
                "latitude": 20.6747,
                "longitude": -103.3873,
                "address": "Av. Vallarta 1500, Guadalajara"
            }),
        )
        .then_text("Reported. Your incident number is in the system.");
    let h = harness(classifier, responder, None, OrchestratorConfig::default()).await;
    let orchestrator = h.orchestrator.with_geocoder(Arc::new(StaticGeocoder));

    let message = InboundMessage::text(CONVERSATION, "hay una fuga aquí")
        .with_location(SharedLocation::new(20.6747, -103.3873))
        .with_channel("whatsapp");
    let output = orchestrator.run_workflow(message).await;

    assert!(output.error.is_none());
    assert_eq!(output.tools_invoked, vec!["report_incident"]);

    let TurnItem::Message { content, .. } = &h.classifier.requests()[0].items[0] else {
        panic!("classifier input should be a message");
    };
    assert!(content.contains("[user shared a location: Av. Vallarta 1500, Guadalajara]"));

    // The persona only sees its own tools.
    let offered: Vec<String> = h.responder.requests()[0]
        .tools
        .iter()
        .map(|t| t.name.clone())
        .collect();
    assert!(offered.contains(&"report_incident".to_string()));
    assert!(!offered.contains(&"create_order".to_string()));

    let state = orchestrator.store().get(CONVERSATION).await;
    assert_eq!(state.slots.locality.as_deref(), Some("Guadalajara"));
    assert!(matches!(
        &state.history[2],
        TurnItem::ToolOutput { success: true, output, .. } if output.contains("INC-")
    ));
}
