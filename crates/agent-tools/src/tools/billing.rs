//! Billing, consumption and contract lookups against the upstream services.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;
use upstream_api::{ConsumptionSummary, ConsumptionTrend, UpstreamClient, UpstreamResult};

use crate::error::ToolError;
use crate::names;
use crate::tool::{FailureKind, Tool, ToolArgs, ToolOutput};

/// Maximum debt line items returned to the model.
pub const MAX_LINE_ITEMS: usize = 10;

/// Default consumption window in billing periods.
pub const DEFAULT_CONSUMPTION_WINDOW: u64 = 12;

/// Largest consumption window a caller may request.
pub const MAX_CONSUMPTION_WINDOW: u64 = 24;

fn contract_schema(extra: Value) -> Value {
    let mut schema = json!({
        "type": "object",
        "properties": {
            "contract_number": {
                "type": "string",
                "description": "Customer contract number. Defaults to the one already given in the conversation."
            }
        }
    });
    if let (Some(props), Value::Object(extra)) = (schema["properties"].as_object_mut(), extra) {
        props.extend(extra);
    }
    schema
}

fn into_output<T>(result: UpstreamResult<T>, render: impl FnOnce(T) -> Value) -> ToolOutput {
    match result {
        UpstreamResult::Success(value) => ToolOutput::success(render(value)),
        UpstreamResult::Failure { error, .. } => ToolOutput::failure(FailureKind::Upstream, error),
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Outstanding balance for a contract.
pub struct GetDebt {
    client: UpstreamClient,
}

impl GetDebt {
    pub fn new(client: UpstreamClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Tool for GetDebt {
    fn name(&self) -> &str {
        names::GET_DEBT
    }

    fn description(&self) -> &str {
        "Look up the outstanding balance of a water contract: total, overdue and upcoming amounts with the most recent charges."
    }

    fn parameters(&self) -> Value {
        contract_schema(json!({}))
    }

    async fn execute(&self, args: ToolArgs) -> Result<ToolOutput, ToolError> {
        let contract = args.contract_number()?;
        debug!(contract_number = %contract, "Fetching debt");
        let result = self.client.debt(&contract).await?;

        Ok(into_output(result, |debt| {
            let line_items: Vec<Value> = debt
                .line_items
                .iter()
                .take(MAX_LINE_ITEMS)
                .map(|item| {
                    json!({
                        "concept": item.concept,
                        "amount": item.amount,
                        "due_date": item.due_date,
                        "period": item.period,
                    })
                })
                .collect();
            json!({
                "contract_number": debt.contract_number,
                "total_debt": debt.total_debt,
                "overdue": debt.overdue,
                "upcoming": debt.upcoming,
                "line_items": line_items,
                "line_items_total": debt.line_items.len(),
            })
        }))
    }
}

/// Consumption history and trend.
pub struct GetConsumption {
    client: UpstreamClient,
}

impl GetConsumption {
    pub fn new(client: UpstreamClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Tool for GetConsumption {
    fn name(&self) -> &str {
        names::GET_CONSUMPTION
    }

    fn description(&self) -> &str {
        "Get the water consumption history of a contract (cubic meters per billing period, most recent first) with its monthly average and trend."
    }

    fn parameters(&self) -> Value {
        contract_schema(json!({
            "months": {
                "type": "integer",
                "minimum": 1,
                "maximum": MAX_CONSUMPTION_WINDOW,
                "description": "Number of recent periods to return (default 12)."
            }
        }))
    }

    async fn execute(&self, args: ToolArgs) -> Result<ToolOutput, ToolError> {
        let contract = args.contract_number()?;
        let window = args
            .get_u64_or("months", DEFAULT_CONSUMPTION_WINDOW)
            .clamp(1, MAX_CONSUMPTION_WINDOW);
        let result = self.client.consumption(&contract, window as u32).await?;

        Ok(into_output(result, |summary| {
            let history: Vec<Value> = summary
                .history
                .iter()
                .take(window as usize)
                .map(|p| {
                    json!({
                        "period": p.period,
                        "cubic_meters": p.cubic_meters,
                        "reading_date": p.reading_date,
                    })
                })
                .collect();
            json!({
                "contract_number": summary.contract_number,
                "monthly_average": round2(summary.monthly_average),
                "trend": summary.trend.as_str(),
                "history": history,
            })
        }))
    }
}

/// Contract holder, address, tariff and service status.
pub struct GetContractDetails {
    client: UpstreamClient,
}

impl GetContractDetails {
    pub fn new(client: UpstreamClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Tool for GetContractDetails {
    fn name(&self) -> &str {
        names::GET_CONTRACT_DETAILS
    }

    fn description(&self) -> &str {
        "Get contract details: holder name, service address, locality, tariff, meter number and service status (active, suspended or cut_off)."
    }

    fn parameters(&self) -> Value {
        contract_schema(json!({}))
    }

    async fn execute(&self, args: ToolArgs) -> Result<ToolOutput, ToolError> {
        let contract = args.contract_number()?;
        let result = self.client.contract(&contract).await?;

        Ok(into_output(result, |details| {
            json!({
                "contract_number": details.contract_number,
                "holder": details.holder,
                "address": details.address,
                "locality": details.locality,
                "rate": details.rate,
                "meter_number": details.meter_number,
                "status": details.status.as_str(),
            })
        }))
    }
}

/// Forecast for the next billing period.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsumptionForecast {
    pub predicted_m3: f64,
    pub confidence: &'static str,
    pub basis_periods: usize,
    pub trend: ConsumptionTrend,
}

/// Forecast the next period from a consumption window.
///
/// Mean of the three most recent periods, moved 5% in the direction of the
/// trend. `None` when there is no history.
pub fn forecast(summary: &ConsumptionSummary) -> Option<ConsumptionForecast> {
    let n = summary.history.len();
    if n == 0 {
        return None;
    }
    let recent = &summary.history[..n.min(3)];
    let mean = recent.iter().map(|p| p.cubic_meters).sum::<f64>() / recent.len() as f64;
    let factor = match summary.trend {
        ConsumptionTrend::Increasing => 1.05,
        ConsumptionTrend::Decreasing => 0.95,
        ConsumptionTrend::Stable => 1.0,
    };
    let confidence = if n < 3 {
        "low"
    } else if n < 6 {
        "medium"
    } else {
        "high"
    };

    Some(ConsumptionForecast {
        predicted_m3: round2(mean * factor),
        confidence,
        basis_periods: n,
        trend: summary.trend,
    })
}

/// Expected consumption for the next billing period.
pub struct GetConsumptionPrediction {
    client: UpstreamClient,
}

impl GetConsumptionPrediction {
    pub fn new(client: UpstreamClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Tool for GetConsumptionPrediction {
    fn name(&self) -> &str {
        names::GET_CONSUMPTION_PREDICTION
    }

    fn description(&self) -> &str {
        "Estimate next period's water consumption for a contract from its recent history, with a confidence level."
    }

    fn parameters(&self) -> Value {
        contract_schema(json!({}))
    }

    async fn execute(&self, args: ToolArgs) -> Result<ToolOutput, ToolError> {
        let contract = args.contract_number()?;
        let result = self
            .client
            .consumption(&contract, DEFAULT_CONSUMPTION_WINDOW as u32)
            .await?;

        let summary = match result {
            UpstreamResult::Success(summary) => summary,
            UpstreamResult::Failure { error, .. } => {
                return Ok(ToolOutput::failure(FailureKind::Upstream, error))
            }
        };

        Ok(match forecast(&summary) {
            Some(f) => ToolOutput::success(json!({
                "contract_number": summary.contract_number,
                "predicted_cubic_meters": f.predicted_m3,
                "confidence": f.confidence,
                "basis_periods": f.basis_periods,
                "trend": f.trend.as_str(),
            })),
            None => ToolOutput::failure(
                FailureKind::NotFound,
                format!("No consumption history for contract {}", contract),
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{RetryPolicy, ToolRegistry};
    use brain_core::ToolRequestMeta;
    use std::collections::HashMap;
    use std::time::Duration;
    use upstream_api::{ConsumptionPeriod, UpstreamConfig};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(uri: &str) -> UpstreamClient {
        UpstreamClient::new(UpstreamConfig::new(uri).with_timeout(Duration::from_secs(2))).unwrap()
    }

    fn registry(client: UpstreamClient) -> ToolRegistry {
        let mut registry = ToolRegistry::with_retry_policy(
            RetryPolicy::default().with_backoff(Duration::from_millis(5)),
        );
        registry.register(GetDebt::new(client.clone()));
        registry.register(GetConsumption::new(client.clone()));
        registry.register(GetContractDetails::new(client.clone()));
        registry.register(GetConsumptionPrediction::new(client));
        registry
    }

    fn contract(c: &str) -> HashMap<String, Value> {
        HashMap::from([("contract_number".to_string(), json!(c))])
    }

    #[tokio::test]
    async fn test_get_debt_caps_line_items() {
        let server = MockServer::start().await;
        let items: String = (1..=15)
            .map(|i| {
                format!(
                    "<DebtItem><Concept>Consumo</Concept><Amount>10</Amount><DueDate>2024-{:02}-15</DueDate><Period>2024-{:02}</Period></DebtItem>",
                    (i % 12) + 1,
                    (i % 12) + 1
                )
            })
            .collect();
        Mock::given(method("POST"))
            .and(path("/GetDebt"))
            .respond_with(ResponseTemplate::new(200).set_body_string(format!(
                "<r><TotalDebt>150.00</TotalDebt><OverdueAmount>50.00</OverdueAmount>{}</r>",
                items
            )))
            .mount(&server)
            .await;

        let output = registry(client(&server.uri()))
            .execute(names::GET_DEBT, contract("123456"), ToolRequestMeta::default())
            .await;
        assert!(output.is_success());
        assert_eq!(output.get("total_debt"), Some(&json!(150.0)));
        assert_eq!(output.get("overdue"), Some(&json!(50.0)));
        assert_eq!(output.get("upcoming"), Some(&json!(0.0)));
        assert_eq!(output.get("line_items").unwrap().as_array().unwrap().len(), MAX_LINE_ITEMS);
        assert_eq!(output.get("line_items_total"), Some(&json!(15)));
    }

    #[tokio::test]
    async fn test_upstream_fault_is_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string(
                "<soap:Envelope><soap:Body><soap:Fault><faultstring>Contrato inexistente</faultstring></soap:Fault></soap:Body></soap:Envelope>",
            ))
            .expect(1)
            .mount(&server)
            .await;

        let output = registry(client(&server.uri()))
            .execute(names::GET_CONTRACT_DETAILS, contract("000"), ToolRequestMeta::default())
            .await;
        assert_eq!(output.error(), Some("Contrato inexistente"));
    }

    #[tokio::test]
    async fn test_network_failure_never_raises() {
        // Nothing listens on port 9 locally.
        let output = registry(client("http://127.0.0.1:9"))
            .execute(names::GET_DEBT, contract("123456"), ToolRequestMeta::default())
            .await;
        let json = output.to_json();
        assert_eq!(json["success"], false);
        assert!(!json["error"].as_str().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_transient_status_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&server)
            .await;

        let output = registry(client(&server.uri()))
            .execute(names::GET_CONSUMPTION, contract("1"), ToolRequestMeta::default())
            .await;
        assert!(!output.is_success());
    }

    #[tokio::test]
    async fn test_missing_contract_is_invalid_input() {
        let output = registry(client("http://127.0.0.1:9"))
            .execute(names::GET_DEBT, HashMap::new(), ToolRequestMeta::default())
            .await;
        assert!(matches!(
            output,
            ToolOutput::Failure {
                kind: FailureKind::InvalidInput,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_prediction() {
        let server = MockServer::start().await;
        let records: String = ["2024-01", "2024-02", "2024-03", "2024-04"]
            .iter()
            .map(|p| format!("<ConsumptionRecord><Period>{}</Period><CubicMeters>20</CubicMeters></ConsumptionRecord>", p))
            .collect();
        Mock::given(method("POST"))
            .and(path("/GetConsumption"))
            .respond_with(ResponseTemplate::new(200).set_body_string(format!("<r>{}</r>", records)))
            .mount(&server)
            .await;

        let output = registry(client(&server.uri()))
            .execute(names::GET_CONSUMPTION_PREDICTION, contract("1"), ToolRequestMeta::default())
            .await;
        assert_eq!(output.get("predicted_cubic_meters"), Some(&json!(20.0)));
        assert_eq!(output.get("confidence"), Some(&json!("medium")));
    }

    #[test]
    fn test_forecast_adjusts_for_trend() {
        let period = |m: f64| ConsumptionPeriod {
            period: String::new(),
            cubic_meters: m,
            reading_date: String::new(),
        };
        let summary = ConsumptionSummary {
            contract_number: "1".into(),
            monthly_average: 15.0,
            trend: ConsumptionTrend::Increasing,
            history: vec![period(20.0), period(20.0), period(20.0), period(10.0), period(10.0), period(10.0)],
        };
        let f = forecast(&summary).unwrap();
        assert_eq!(f.predicted_m3, 21.0);
        assert_eq!(f.confidence, "high");

        let empty = ConsumptionSummary {
            history: Vec::new(),
            ..summary
        };
        assert!(forecast(&empty).is_none());
    }
}
