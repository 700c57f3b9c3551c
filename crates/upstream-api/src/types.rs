//! Typed upstream results.

use serde::{Deserialize, Serialize};

/// Outcome of parsing an upstream payload.
///
/// Callers must branch on the variant before reading payload fields. The
/// success variant never carries missing numbers: absent fields default to
/// zero or an empty string.
#[derive(Debug, Clone, PartialEq)]
pub enum UpstreamResult<T> {
    /// The payload was parsed.
    Success(T),
    /// The upstream reported an error or the payload could not be parsed.
    Failure {
        /// Human-readable message.
        error: String,
        /// The untransformed payload, for diagnostics.
        raw_response: Option<String>,
    },
}

impl<T> UpstreamResult<T> {
    /// Build a failure without a raw payload.
    pub fn failure(error: impl Into<String>) -> Self {
        UpstreamResult::Failure {
            error: error.into(),
            raw_response: None,
        }
    }

    /// Build a failure carrying the raw payload.
    pub fn failure_with_raw(error: impl Into<String>, raw: impl Into<String>) -> Self {
        UpstreamResult::Failure {
            error: error.into(),
            raw_response: Some(raw.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, UpstreamResult::Success(_))
    }

    /// The success payload, if any.
    pub fn success(&self) -> Option<&T> {
        match self {
            UpstreamResult::Success(value) => Some(value),
            UpstreamResult::Failure { .. } => None,
        }
    }

    /// The failure message, if any.
    pub fn error(&self) -> Option<&str> {
        match self {
            UpstreamResult::Success(_) => None,
            UpstreamResult::Failure { error, .. } => Some(error.as_str()),
        }
    }

    /// Transform the success payload.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> UpstreamResult<U> {
        match self {
            UpstreamResult::Success(value) => UpstreamResult::Success(f(value)),
            UpstreamResult::Failure {
                error,
                raw_response,
            } => UpstreamResult::Failure {
                error,
                raw_response,
            },
        }
    }
}

/// One outstanding charge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebtLineItem {
    /// Charge description (e.g., "Consumo de agua").
    pub concept: String,
    pub amount: f64,
    /// Due date as reported upstream (ISO `YYYY-MM-DD` expected).
    pub due_date: String,
    /// Billing period (e.g., "2024-05").
    pub period: String,
}

/// Debt summary for a contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebtSummary {
    pub contract_number: String,
    pub total_debt: f64,
    /// Amount already past due.
    pub overdue: f64,
    /// Amount not yet due.
    pub upcoming: f64,
    /// Line items, most recent first.
    pub line_items: Vec<DebtLineItem>,
}

/// Direction of consumption over the returned window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsumptionTrend {
    Increasing,
    Stable,
    Decreasing,
}

impl ConsumptionTrend {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConsumptionTrend::Increasing => "increasing",
            ConsumptionTrend::Stable => "stable",
            ConsumptionTrend::Decreasing => "decreasing",
        }
    }
}

/// Consumption for one billing period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsumptionPeriod {
    pub period: String,
    pub cubic_meters: f64,
    pub reading_date: String,
}

/// Consumption summary for a contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsumptionSummary {
    pub contract_number: String,
    /// Mean consumption per period over the returned window.
    pub monthly_average: f64,
    pub trend: ConsumptionTrend,
    /// Periods, most recent first.
    pub history: Vec<ConsumptionPeriod>,
}

/// Service status of a contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractStatus {
    Active,
    Suspended,
    CutOff,
}

impl ContractStatus {
    /// Map an upstream status string onto the enumeration.
    ///
    /// Unrecognised or missing values map to `Active`.
    pub fn from_upstream(raw: &str) -> Self {
        let lower = raw.trim().to_lowercase();
        if lower.contains("susp") {
            ContractStatus::Suspended
        } else if lower.contains("cort") || lower.contains("cut") {
            ContractStatus::CutOff
        } else {
            ContractStatus::Active
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ContractStatus::Active => "active",
            ContractStatus::Suspended => "suspended",
            ContractStatus::CutOff => "cut_off",
        }
    }
}

/// Contract detail record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractDetails {
    pub contract_number: String,
    /// Account holder name.
    pub holder: String,
    pub address: String,
    pub locality: String,
    /// Tariff name.
    pub rate: String,
    pub meter_number: String,
    pub status: ContractStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contract_status_mapping() {
        assert_eq!(ContractStatus::from_upstream("ACTIVO"), ContractStatus::Active);
        assert_eq!(ContractStatus::from_upstream("Suspendido"), ContractStatus::Suspended);
        assert_eq!(ContractStatus::from_upstream("CORTADO"), ContractStatus::CutOff);
        assert_eq!(ContractStatus::from_upstream("cut-off"), ContractStatus::CutOff);
        assert_eq!(ContractStatus::from_upstream(""), ContractStatus::Active);
    }

    #[test]
    fn test_map_preserves_failure() {
        let failure: UpstreamResult<u32> = UpstreamResult::failure_with_raw("boom", "<x/>");
        let mapped = failure.map(|v| v + 1);
        assert_eq!(mapped.error(), Some("boom"));
        assert!(!mapped.is_success());
    }
}
