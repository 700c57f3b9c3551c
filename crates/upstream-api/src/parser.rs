//! Tolerant parsers for upstream SOAP payloads.
//!
//! Every parser follows the same steps:
//!
//! 1. A fault marker short-circuits to a failure carrying the embedded
//!    message. Nothing else is read from a faulted payload.
//! 2. An empty payload is a valid "no data" answer: success with zeroed
//!    totals and empty lists.
//! 3. Each field is extracted independently. A missing field becomes `0` or
//!    an empty string; a present but unreadable number makes the payload
//!    malformed.
//! 4. Malformed payloads become failures carrying the raw body.
//!
//! Element names are matched case-insensitively and with any namespace
//! prefix, so `<ns2:TotalDebt>` and `<totaldebt>` are equivalent.

use std::collections::HashMap;
use std::fmt;
use std::sync::{LazyLock, RwLock};

use regex::Regex;
use tracing::{debug, warn};

use crate::types::{
    ConsumptionPeriod, ConsumptionSummary, ConsumptionTrend, ContractDetails, ContractStatus,
    DebtLineItem, DebtSummary, UpstreamResult,
};

/// Relative change within which consumption is considered stable.
const STABLE_BAND: f64 = 0.10;

/// Number of periods averaged at each end of the window for the trend.
const TREND_SAMPLE: usize = 3;

#[derive(Debug)]
enum ParseError {
    Pattern(regex::Error),
    InvalidNumber { field: String, value: String },
    NotMarkup,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::Pattern(e) => write!(f, "pattern error: {}", e),
            ParseError::InvalidNumber { field, value } => {
                write!(f, "field {} is not a number: {:?}", field, value)
            }
            ParseError::NotMarkup => write!(f, "payload is not XML"),
        }
    }
}

impl From<regex::Error> for ParseError {
    fn from(err: regex::Error) -> Self {
        ParseError::Pattern(err)
    }
}

static FAULT_OPEN_TAG: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"(?is)<(?:[\w.-]+:)?Fault(?:\s[^>]*)?>"));

/// Compiled element patterns, keyed by tag name.
static ELEMENT_PATTERNS: LazyLock<RwLock<HashMap<&'static str, Regex>>> =
    LazyLock::new(|| RwLock::new(HashMap::new()));

fn element_regex(tag: &'static str) -> Result<Regex, regex::Error> {
    if let Some(re) = ELEMENT_PATTERNS
        .read()
        .ok()
        .and_then(|patterns| patterns.get(tag).cloned())
    {
        return Ok(re);
    }

    let escaped = regex::escape(tag);
    let re = Regex::new(&format!(
        r"(?is)<(?:[\w.-]+:)?{escaped}(?:\s[^>]*)?>(.*?)</(?:[\w.-]+:)?{escaped}\s*>"
    ))?;
    if let Ok(mut patterns) = ELEMENT_PATTERNS.write() {
        patterns.insert(tag, re.clone());
    }
    Ok(re)
}

fn decode_text(raw: &str) -> String {
    let mut text = raw.trim();
    if let Some(inner) = text
        .strip_prefix("<![CDATA[")
        .and_then(|rest| rest.strip_suffix("]]>"))
    {
        return inner.trim().to_string();
    }
    // Child markup inside a text field is dropped.
    let stripped;
    if text.contains('<') {
        stripped = strip_tags(text);
        text = stripped.as_str();
    }
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
        .trim()
        .to_string()
}

fn strip_tags(text: &str) -> String {
    let mut output = String::with_capacity(text.len());
    let mut in_tag = false;
    for ch in text.chars() {
        match ch {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => output.push(ch),
            _ => {}
        }
    }
    output
}

/// Text of the first element named `tag`, if present.
fn first_text(xml: &str, tag: &'static str) -> Result<Option<String>, ParseError> {
    let re = element_regex(tag)?;
    Ok(re
        .captures(xml)
        .and_then(|caps| caps.get(1))
        .map(|m| decode_text(m.as_str())))
}

/// Text of the first element named `tag`, or an empty string.
fn text_or_empty(xml: &str, tag: &'static str) -> Result<String, ParseError> {
    Ok(first_text(xml, tag)?.unwrap_or_default())
}

/// Inner markup of every element named `tag`, in document order.
fn all_blocks(xml: &str, tag: &'static str) -> Result<Vec<String>, ParseError> {
    let re = element_regex(tag)?;
    Ok(re
        .captures_iter(xml)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str().to_string()))
        .collect())
}

fn parse_number(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !matches!(c, '$' | ',' | ' ' | '\u{a0}'))
        .collect();
    if cleaned.is_empty() {
        return Some(0.0);
    }
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Numeric value of the first element named `tag`; `0.0` when absent.
fn number_or_zero(xml: &str, tag: &'static str) -> Result<f64, ParseError> {
    match first_text(xml, tag)? {
        None => Ok(0.0),
        Some(raw) => parse_number(&raw).ok_or(ParseError::InvalidNumber {
            field: tag.to_string(),
            value: raw,
        }),
    }
}

/// Find a fault marker and return its human-readable message.
fn detect_fault(xml: &str) -> Result<Option<String>, ParseError> {
    let fault = FAULT_OPEN_TAG.as_ref().map_err(|e| ParseError::Pattern(e.clone()))?;
    if fault.is_match(xml) {
        for tag in ["faultstring", "Text", "Reason", "Message"] {
            if let Some(message) = first_text(xml, tag)?.filter(|m| !m.is_empty()) {
                return Ok(Some(message));
            }
        }
        return Ok(Some("upstream service reported a fault".to_string()));
    }

    for block in all_blocks(xml, "Error")? {
        if let Some(message) = error_block_message(&block)? {
            return Ok(Some(message));
        }
    }

    Ok(None)
}

/// Message of an `<Error>` block that reports a real error.
///
/// Services also send `<Error/>`-style placeholders on success: an empty
/// block, or a zero code with no message. Those are not faults.
fn error_block_message(block: &str) -> Result<Option<String>, ParseError> {
    for tag in ["Message", "Description"] {
        if let Some(message) = first_text(block, tag)?.filter(|m| !m.is_empty()) {
            return Ok(Some(message));
        }
    }

    if let Some(code) = first_text(block, "Code")?.filter(|c| !c.is_empty()) {
        let is_zero = parse_number(&code).is_some_and(|v| v == 0.0);
        if is_zero {
            return Ok(None);
        }
        return Ok(Some(format!("upstream service reported error code {}", code)));
    }

    // Bare text, e.g. `<Error>Contract not found</Error>`.
    if !block.contains('<') {
        let text = decode_text(block);
        if !text.is_empty() {
            return Ok(Some(text));
        }
    }
    Ok(None)
}

/// Shared parse driver: fault check, empty check, markup check, then `extract`.
fn parse_payload<T>(
    kind: &str,
    raw: &str,
    empty: impl FnOnce() -> T,
    extract: impl FnOnce(&str) -> Result<T, ParseError>,
) -> UpstreamResult<T> {
    let trimmed = raw.trim();

    match detect_fault(trimmed) {
        Ok(Some(message)) => {
            warn!(kind, error = %message, "upstream fault");
            return UpstreamResult::failure_with_raw(message, raw);
        }
        Ok(None) => {}
        Err(e) => {
            return UpstreamResult::failure_with_raw(
                format!("could not parse {} response: {}", kind, e),
                raw,
            );
        }
    }

    if trimmed.is_empty() {
        debug!(kind, "empty upstream payload, returning empty result");
        return UpstreamResult::Success(empty());
    }

    let result = if trimmed.starts_with('<') {
        extract(trimmed)
    } else {
        Err(ParseError::NotMarkup)
    };

    match result {
        Ok(value) => UpstreamResult::Success(value),
        Err(e) => {
            warn!(kind, error = %e, "malformed upstream payload");
            UpstreamResult::failure_with_raw(
                format!("could not parse {} response: {}", kind, e),
                raw,
            )
        }
    }
}

/// Parse a debt response.
pub fn parse_debt_response(raw: &str, contract_number: &str) -> UpstreamResult<DebtSummary> {
    let empty = || DebtSummary {
        contract_number: contract_number.to_string(),
        total_debt: 0.0,
        overdue: 0.0,
        upcoming: 0.0,
        line_items: Vec::new(),
    };

    parse_payload("debt", raw, empty, |xml| {
        let mut line_items = Vec::new();
        for block in all_blocks(xml, "DebtItem")? {
            line_items.push(DebtLineItem {
                concept: text_or_empty(&block, "Concept")?,
                amount: number_or_zero(&block, "Amount")?,
                due_date: text_or_empty(&block, "DueDate")?,
                period: text_or_empty(&block, "Period")?,
            });
        }
        line_items.sort_by(|a, b| {
            (b.due_date.as_str(), b.period.as_str()).cmp(&(a.due_date.as_str(), a.period.as_str()))
        });

        Ok(DebtSummary {
            contract_number: contract_number.to_string(),
            total_debt: number_or_zero(xml, "TotalDebt")?,
            overdue: number_or_zero(xml, "OverdueAmount")?,
            upcoming: number_or_zero(xml, "UpcomingAmount")?,
            line_items,
        })
    })
}

/// Classify the trend of a window of consumption values, most recent first.
///
/// Compares the mean of the most recent three periods with the mean of the
/// oldest three. A relative change within ±10% is stable.
pub fn classify_trend(values_newest_first: &[f64]) -> ConsumptionTrend {
    let n = values_newest_first.len();
    if n < 2 {
        return ConsumptionTrend::Stable;
    }
    let k = TREND_SAMPLE.min(n);
    let mean = |slice: &[f64]| slice.iter().sum::<f64>() / slice.len() as f64;
    let recent = mean(&values_newest_first[..k]);
    let oldest = mean(&values_newest_first[n - k..]);

    if oldest == 0.0 {
        return if recent > 0.0 {
            ConsumptionTrend::Increasing
        } else {
            ConsumptionTrend::Stable
        };
    }

    let change = (recent - oldest) / oldest;
    if change > STABLE_BAND {
        ConsumptionTrend::Increasing
    } else if change < -STABLE_BAND {
        ConsumptionTrend::Decreasing
    } else {
        ConsumptionTrend::Stable
    }
}

/// Parse a consumption history response.
pub fn parse_consumption_response(
    raw: &str,
    contract_number: &str,
) -> UpstreamResult<ConsumptionSummary> {
    let empty = || ConsumptionSummary {
        contract_number: contract_number.to_string(),
        monthly_average: 0.0,
        trend: ConsumptionTrend::Stable,
        history: Vec::new(),
    };

    parse_payload("consumption", raw, empty, |xml| {
        let mut history = Vec::new();
        for block in all_blocks(xml, "ConsumptionRecord")? {
            history.push(ConsumptionPeriod {
                period: text_or_empty(&block, "Period")?,
                cubic_meters: number_or_zero(&block, "CubicMeters")?,
                reading_date: text_or_empty(&block, "ReadingDate")?,
            });
        }
        history.sort_by(|a, b| b.period.cmp(&a.period));

        let values: Vec<f64> = history.iter().map(|p| p.cubic_meters).collect();
        let monthly_average = if values.is_empty() {
            0.0
        } else {
            values.iter().sum::<f64>() / values.len() as f64
        };

        Ok(ConsumptionSummary {
            contract_number: contract_number.to_string(),
            monthly_average,
            trend: classify_trend(&values),
            history,
        })
    })
}

/// Parse a contract detail response.
pub fn parse_contract_response(
    raw: &str,
    contract_number: &str,
) -> UpstreamResult<ContractDetails> {
    let empty = || ContractDetails {
        contract_number: contract_number.to_string(),
        holder: String::new(),
        address: String::new(),
        locality: String::new(),
        rate: String::new(),
        meter_number: String::new(),
        status: ContractStatus::Active,
    };

    parse_payload("contract", raw, empty, |xml| {
        Ok(ContractDetails {
            contract_number: contract_number.to_string(),
            holder: text_or_empty(xml, "Holder")?,
            address: text_or_empty(xml, "Address")?,
            locality: text_or_empty(xml, "Locality")?,
            rate: text_or_empty(xml, "Rate")?,
            meter_number: text_or_empty(xml, "MeterNumber")?,
            status: ContractStatus::from_upstream(&text_or_empty(xml, "Status")?),
        })
    })
}
