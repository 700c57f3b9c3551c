//! HTTP client for the upstream SOAP services.

use reqwest::header::CONTENT_TYPE;
use secrecy::ExposeSecret;
use tracing::{debug, warn};

use crate::config::UpstreamConfig;
use crate::error::UpstreamError;
use crate::parser::{parse_consumption_response, parse_contract_response, parse_debt_response};
use crate::types::{ConsumptionSummary, ContractDetails, DebtSummary, UpstreamResult};

const SOAP_NAMESPACE: &str = "urn:aquacis:services";

/// Default number of billing periods requested for consumption history.
pub const DEFAULT_CONSUMPTION_MONTHS: u32 = 12;

/// Upstream operations the client knows how to call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    Debt,
    Consumption,
    Contract,
}

impl QueryKind {
    /// SOAP operation name.
    pub fn operation(&self) -> &'static str {
        match self {
            QueryKind::Debt => "GetDebt",
            QueryKind::Consumption => "GetConsumption",
            QueryKind::Contract => "GetContract",
        }
    }
}

/// Client for the billing, consumption and contract services.
///
/// Each call sends exactly one request. Errors are classified through
/// [`UpstreamError::is_transient`]; retries are left to the caller.
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    http: reqwest::Client,
    config: UpstreamConfig,
}

impl UpstreamClient {
    /// Create a client with the given configuration.
    pub fn new(config: UpstreamConfig) -> Result<Self, UpstreamError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| UpstreamError::Configuration(e.to_string()))?;
        Ok(Self { http, config })
    }

    /// Create a client from environment variables.
    pub fn from_env() -> Result<Self, UpstreamError> {
        Self::new(UpstreamConfig::from_env()?)
    }

    pub fn config(&self) -> &UpstreamConfig {
        &self.config
    }

    fn envelope(kind: QueryKind, contract_number: &str, months: Option<u32>) -> String {
        let months = months
            .map(|m| format!("<svc:Months>{}</svc:Months>", m))
            .unwrap_or_default();
        format!(
            concat!(
                r#"<?xml version="1.0" encoding="UTF-8"?>"#,
                r#"<soapenv:Envelope xmlns:soapenv="http://schemas.xmlsoap.org/soap/envelope/" xmlns:svc="{ns}">"#,
                "<soapenv:Header/><soapenv:Body><svc:{op}>",
                "<svc:ContractNumber>{contract}</svc:ContractNumber>{months}",
                "</svc:{op}></soapenv:Body></soapenv:Envelope>"
            ),
            ns = SOAP_NAMESPACE,
            op = kind.operation(),
            contract = escape_xml(contract_number),
            months = months,
        )
    }

    /// Send one request and return the raw response body.
    ///
    /// A `500` whose body carries a SOAP fault is returned as `Ok`, so the
    /// parser can surface the fault message.
    pub async fn fetch_raw(
        &self,
        kind: QueryKind,
        contract_number: &str,
        months: Option<u32>,
    ) -> Result<String, UpstreamError> {
        let url = format!("{}/{}", self.config.api_url, kind.operation());
        let body = Self::envelope(kind, contract_number, months);

        debug!(operation = kind.operation(), contract_number, "Sending upstream request");

        let mut request = self
            .http
            .post(&url)
            .header(CONTENT_TYPE, "text/xml; charset=utf-8")
            .header("SOAPAction", format!("{}/{}", SOAP_NAMESPACE, kind.operation()))
            .body(body);

        if let (Some(user), Some(token)) = (&self.config.username, &self.config.token) {
            request = request.basic_auth(user, Some(token.expose_secret()));
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if status.is_success() {
            return Ok(text);
        }

        if status.as_u16() == 500 && looks_like_fault(&text) {
            debug!(operation = kind.operation(), "Upstream returned SOAP fault");
            return Ok(text);
        }

        warn!(
            operation = kind.operation(),
            status = status.as_u16(),
            "Upstream request failed"
        );
        Err(UpstreamError::Status {
            status: status.as_u16(),
            body: text,
        })
    }

    /// Fetch and parse the debt summary for a contract.
    pub async fn debt(
        &self,
        contract_number: &str,
    ) -> Result<UpstreamResult<DebtSummary>, UpstreamError> {
        let raw = self.fetch_raw(QueryKind::Debt, contract_number, None).await?;
        Ok(parse_debt_response(&raw, contract_number))
    }

    /// Fetch and parse consumption history for the last `months` periods.
    pub async fn consumption(
        &self,
        contract_number: &str,
        months: u32,
    ) -> Result<UpstreamResult<ConsumptionSummary>, UpstreamError> {
        let raw = self
            .fetch_raw(QueryKind::Consumption, contract_number, Some(months))
            .await?;
        Ok(parse_consumption_response(&raw, contract_number))
    }

    /// Fetch and parse contract details.
    pub async fn contract(
        &self,
        contract_number: &str,
    ) -> Result<UpstreamResult<ContractDetails>, UpstreamError> {
        let raw = self
            .fetch_raw(QueryKind::Contract, contract_number, None)
            .await?;
        Ok(parse_contract_response(&raw, contract_number))
    }
}

fn looks_like_fault(body: &str) -> bool {
    let lower = body.to_ascii_lowercase();
    lower.contains(":fault") || lower.contains("<fault")
}

fn escape_xml(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> UpstreamClient {
        let config = UpstreamConfig::new(server.uri()).with_timeout(Duration::from_secs(2));
        UpstreamClient::new(config).unwrap()
    }

    #[test]
    fn test_envelope_escapes_contract() {
        let envelope = UpstreamClient::envelope(QueryKind::Debt, "12<34", None);
        assert!(envelope.contains("<svc:GetDebt>"));
        assert!(envelope.contains("12&lt;34"));
        assert!(!envelope.contains("Months"));
    }

    #[tokio::test]
    async fn test_debt_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/GetDebt"))
            .and(header("SOAPAction", "urn:aquacis:services/GetDebt"))
            .and(body_string_contains("<svc:ContractNumber>123456</svc:ContractNumber>"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "<Envelope><Body><TotalDebt>250.50</TotalDebt></Body></Envelope>",
            ))
            .expect(1)
            .mount(&server)
            .await;

        let result = client_for(&server).debt("123456").await.unwrap();
        assert_eq!(result.success().unwrap().total_debt, 250.5);
    }

    #[tokio::test]
    async fn test_consumption_sends_months() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/GetConsumption"))
            .and(body_string_contains("<svc:Months>12</svc:Months>"))
            .respond_with(ResponseTemplate::new(200).set_body_string(""))
            .mount(&server)
            .await;

        let result = client_for(&server)
            .consumption("123456", DEFAULT_CONSUMPTION_MONTHS)
            .await
            .unwrap();
        assert!(result.success().unwrap().history.is_empty());
    }

    #[tokio::test]
    async fn test_fault_on_500_is_parsed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/GetContract"))
            .respond_with(ResponseTemplate::new(500).set_body_string(
                "<soap:Envelope><soap:Body><soap:Fault><faultstring>Contrato inexistente</faultstring></soap:Fault></soap:Body></soap:Envelope>",
            ))
            .mount(&server)
            .await;

        let result = client_for(&server).contract("000").await.unwrap();
        assert_eq!(result.error(), Some("Contrato inexistente"));
    }

    #[tokio::test]
    async fn test_503_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
            .mount(&server)
            .await;

        let err = client_for(&server).debt("1").await.unwrap_err();
        assert!(err.is_transient());
        assert!(matches!(err, UpstreamError::Status { status: 503, .. }));
    }

    #[tokio::test]
    async fn test_401_is_permanent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("denied"))
            .mount(&server)
            .await;

        let err = client_for(&server).debt("1").await.unwrap_err();
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_slow_response_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("<r/>")
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let config = UpstreamConfig::new(server.uri()).with_timeout(Duration::from_millis(200));
        let client = UpstreamClient::new(config).unwrap();
        let err = client.debt("1").await.unwrap_err();
        assert!(matches!(err, UpstreamError::Timeout));
    }
}
