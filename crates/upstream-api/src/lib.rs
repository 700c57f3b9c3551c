//! Client and response parsers for the water utility's upstream services.
//!
//! The billing, consumption and contract systems are exposed as SOAP
//! services. This crate provides:
//!
//! - [`UpstreamClient`] - sends one request per call and classifies failures
//!   as transient or permanent (retrying is the caller's decision)
//! - [`parse_debt_response`], [`parse_consumption_response`],
//!   [`parse_contract_response`] - tolerant parsers turning raw payloads into
//!   [`UpstreamResult`] values
//!
//! # Example
//!
//! ```rust,no_run
//! use upstream_api::{UpstreamClient, UpstreamResult};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = UpstreamClient::from_env()?;
//!     match client.debt("123456").await? {
//!         UpstreamResult::Success(debt) => println!("Total: {:.2}", debt.total_debt),
//!         UpstreamResult::Failure { error, .. } => println!("Upstream error: {}", error),
//!     }
//!     Ok(())
//! }
//! ```

mod client;
mod config;
mod error;
mod parser;
mod types;

pub use client::{QueryKind, UpstreamClient, DEFAULT_CONSUMPTION_MONTHS};
pub use config::UpstreamConfig;
pub use error::UpstreamError;
pub use parser::{
    classify_trend, parse_consumption_response, parse_contract_response, parse_debt_response,
};
pub use types::{
    ConsumptionPeriod, ConsumptionSummary, ConsumptionTrend, ContractDetails, ContractStatus,
    DebtLineItem, DebtSummary, UpstreamResult,
};
