//! Tool registry: schema validation, retries and timeouts.

use std::collections::HashMap;
use std::env;
use std::sync::Arc;
use std::time::Duration;

use brain_core::{ToolDefinition, ToolRequestMeta};
use indexmap::IndexMap;
use serde_json::Value;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

use crate::error::ToolError;
use crate::tool::{FailureKind, Tool, ToolArgs, ToolKind, ToolOutput};

/// Default attempts for read tools.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default delay before the first retry.
pub const DEFAULT_BACKOFF_MS: u64 = 500;

/// Default time budget per attempt.
pub const DEFAULT_ATTEMPT_TIMEOUT_SECS: u64 = 30;

/// Retry and timeout policy applied by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts for read tools (write tools always get one).
    pub max_attempts: u32,
    /// Delay before the first retry; doubled for each further retry.
    pub initial_backoff: Duration,
    /// Time budget for one attempt.
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_backoff: Duration::from_millis(DEFAULT_BACKOFF_MS),
            attempt_timeout: Duration::from_secs(DEFAULT_ATTEMPT_TIMEOUT_SECS),
        }
    }
}

impl RetryPolicy {
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = backoff;
        self
    }

    pub fn with_attempt_timeout(mut self, attempt_timeout: Duration) -> Self {
        self.attempt_timeout = attempt_timeout;
        self
    }

    /// Read the policy from environment variables.
    ///
    /// - `TOOL_MAX_ATTEMPTS` (default: 3)
    /// - `TOOL_BACKOFF_MS` (default: 500)
    /// - `TOOL_ATTEMPT_TIMEOUT_SECS` (default: 30)
    ///
    /// Unparseable values fall back to the default with a warning.
    pub fn from_env() -> Self {
        fn read<T: std::str::FromStr>(key: &str, default: T) -> T {
            match env::var(key) {
                Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
                    warn!("Invalid {}: {:?}, using default", key, raw);
                    default
                }),
                Err(_) => default,
            }
        }

        Self::default()
            .with_max_attempts(read("TOOL_MAX_ATTEMPTS", DEFAULT_MAX_ATTEMPTS))
            .with_backoff(Duration::from_millis(read("TOOL_BACKOFF_MS", DEFAULT_BACKOFF_MS)))
            .with_attempt_timeout(Duration::from_secs(read(
                "TOOL_ATTEMPT_TIMEOUT_SECS",
                DEFAULT_ATTEMPT_TIMEOUT_SECS,
            )))
    }

    /// Delay after the given failed attempt (1-based).
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        self.initial_backoff.saturating_mul(factor)
    }
}

struct RegisteredTool {
    tool: Arc<dyn Tool>,
    validator: Option<jsonschema::Validator>,
}

/// Registry for managing tools.
///
/// [`ToolRegistry::execute`] never fails: unknown tools, invalid arguments,
/// timeouts and tool errors all come back as [`ToolOutput::Failure`].
pub struct ToolRegistry {
    /// Registered tools by name, in registration order.
    tools: IndexMap<String, RegisteredTool>,
    retry: RetryPolicy,
}

impl ToolRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::with_retry_policy(RetryPolicy::default())
    }

    pub fn with_retry_policy(retry: RetryPolicy) -> Self {
        Self {
            tools: IndexMap::new(),
            retry,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Register a tool.
    ///
    /// If a tool with the same name already exists, it will be replaced.
    pub fn register<T: Tool + 'static>(&mut self, tool: T) {
        self.register_arc(Arc::new(tool));
    }

    /// Register a shared tool.
    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        let validator = match jsonschema::validator_for(&tool.parameters()) {
            Ok(validator) => Some(validator),
            Err(e) => {
                error!("Schema for tool '{}' does not compile: {}", name, e);
                None
            }
        };
        info!("Registering tool: {}", name);
        self.tools.insert(name, RegisteredTool { tool, validator });
    }

    /// Get a list of registered tool names.
    pub fn list_tools(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name).map(|entry| &entry.tool)
    }

    /// Check if a tool is registered.
    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Definitions of every registered tool.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.tool.definition()).collect()
    }

    fn validate(&self, entry: &RegisteredTool, params: &HashMap<String, Value>) -> Result<(), ToolError> {
        let Some(validator) = entry.validator.as_ref() else {
            return Ok(());
        };
        let instance = Value::Object(params.clone().into_iter().collect());
        let errors: Vec<String> = validator
            .iter_errors(&instance)
            .map(|e| e.to_string())
            .collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ToolError::Validation(errors.join("; ")))
        }
    }

    /// Execute a tool by name.
    ///
    /// Read tools are retried on transient errors with doubling backoff.
    /// Write tools run once. Every attempt is bounded by the policy timeout.
    pub async fn execute(
        &self,
        name: &str,
        params: HashMap<String, Value>,
        meta: ToolRequestMeta,
    ) -> ToolOutput {
        let Some(entry) = self.tools.get(name) else {
            warn!(tool = name, "Unknown tool requested");
            return ToolError::NotFound(name.to_string()).into_output();
        };

        if let Err(e) = self.validate(entry, &params) {
            debug!(tool = name, error = %e, "Rejected tool arguments");
            return e.into_output();
        }

        let attempts = match entry.tool.kind() {
            ToolKind::Read => self.retry.max_attempts.max(1),
            ToolKind::Write => 1,
        };
        let args = ToolArgs::new(params).with_meta(meta);

        debug!("Executing tool '{}' with {} params", name, args.params.len());

        let mut attempt = 1;
        loop {
            let result = match timeout(self.retry.attempt_timeout, entry.tool.execute(args.clone())).await {
                Ok(result) => result,
                Err(_) => Err(ToolError::Timeout(self.retry.attempt_timeout)),
            };

            match result {
                Ok(output) => {
                    debug!(
                        tool = name,
                        attempt,
                        success = output.is_success(),
                        "Tool completed"
                    );
                    return output;
                }
                Err(e) if e.is_transient() && attempt < attempts => {
                    let delay = self.retry.backoff_after(attempt);
                    warn!(
                        tool = name,
                        attempt,
                        error = %e,
                        "Transient tool failure, retrying in {:?}",
                        delay
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    warn!(tool = name, attempt, error = %e, "Tool failed");
                    return e.into_output();
                }
            }
        }
    }

    /// Execute a tool with a JSON arguments string.
    pub async fn execute_json(&self, name: &str, args_json: &str, meta: ToolRequestMeta) -> ToolOutput {
        let params: HashMap<String, Value> = if args_json.trim().is_empty() {
            HashMap::new()
        } else {
            match serde_json::from_str(args_json) {
                Ok(params) => params,
                Err(e) => {
                    return ToolOutput::failure(
                        FailureKind::InvalidInput,
                        format!("Arguments are not a JSON object: {}", e),
                    )
                }
            }
        };
        self.execute(name, params, meta).await
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use upstream_api::UpstreamError;

    struct ContractLookup;

    #[async_trait]
    impl Tool for ContractLookup {
        fn name(&self) -> &str {
            "lookup_contract"
        }

        fn description(&self) -> &str {
            "Looks up a contract by number"
        }

        fn parameters(&self) -> Value {
            json!({
                "type": "object",
                "properties": { "contract_number": { "type": "string" } },
                "required": ["contract_number"]
            })
        }

        async fn execute(&self, args: ToolArgs) -> Result<ToolOutput, ToolError> {
            let contract = args.get_string("contract_number")?;
            Ok(ToolOutput::success(json!({ "contract_number": contract, "status": "active" })))
        }
    }

    /// Fails with a transient error a fixed number of times.
    struct FlakyTool {
        kind: ToolKind,
        failures: u32,
        calls: Arc<AtomicU32>,
    }

    #[async_trait]
    impl Tool for FlakyTool {
        fn name(&self) -> &str {
            "flaky"
        }

        fn description(&self) -> &str {
            "Fails before succeeding"
        }

        fn parameters(&self) -> Value {
            json!({ "type": "object", "properties": {} })
        }

        fn kind(&self) -> ToolKind {
            self.kind
        }

        async fn execute(&self, _args: ToolArgs) -> Result<ToolOutput, ToolError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.failures {
                Err(ToolError::Upstream(UpstreamError::Network("connection reset".into())))
            } else {
                Ok(ToolOutput::success(json!({ "call": call })))
            }
        }
    }

    /// Read tool over the store that hits a busy pool a fixed number of times.
    struct BusyStoreTool {
        failures: u32,
        calls: Arc<AtomicU32>,
    }

    #[async_trait]
    impl Tool for BusyStoreTool {
        fn name(&self) -> &str {
            "list_from_store"
        }

        fn description(&self) -> &str {
            "Reads from a contended store"
        }

        fn parameters(&self) -> Value {
            json!({ "type": "object", "properties": {} })
        }

        async fn execute(&self, _args: ToolArgs) -> Result<ToolOutput, ToolError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.failures {
                Err(ToolError::Database(database::DatabaseError::Busy(
                    "pool timed out while waiting for an open connection".into(),
                )))
            } else {
                Ok(ToolOutput::success(json!({ "tickets": [] })))
            }
        }
    }

    struct SlowTool;

    #[async_trait]
    impl Tool for SlowTool {
        fn name(&self) -> &str {
            "slow"
        }

        fn description(&self) -> &str {
            "Never finishes in time"
        }

        fn parameters(&self) -> Value {
            json!({ "type": "object" })
        }

        async fn execute(&self, _args: ToolArgs) -> Result<ToolOutput, ToolError> {
            sleep(Duration::from_secs(3600)).await;
            Ok(ToolOutput::success(json!({})))
        }
    }

    fn params(value: Value) -> HashMap<String, Value> {
        serde_json::from_value(value).unwrap()
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy::default()
            .with_backoff(Duration::from_millis(10))
            .with_attempt_timeout(Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_registry_basic() {
        let mut registry = ToolRegistry::new();
        registry.register(ContractLookup);

        assert!(registry.has_tool("lookup_contract"));
        assert!(!registry.has_tool("nonexistent"));
        assert_eq!(registry.list_tools(), vec!["lookup_contract"]);
        assert_eq!(registry.definitions()[0].name, "lookup_contract");
    }

    #[tokio::test]
    async fn test_registry_execute() {
        let mut registry = ToolRegistry::new();
        registry.register(ContractLookup);

        let result = registry
            .execute("lookup_contract", params(json!({ "contract_number": "123456" })), ToolRequestMeta::default())
            .await;
        assert!(result.is_success());
        assert_eq!(result.get("contract_number"), Some(&json!("123456")));
    }

    #[tokio::test]
    async fn test_schema_violation_is_failure() {
        let mut registry = ToolRegistry::new();
        registry.register(ContractLookup);

        let result = registry
            .execute("lookup_contract", params(json!({ "contract_number": 7 })), ToolRequestMeta::default())
            .await;
        match result {
            ToolOutput::Failure { kind, message } => {
                assert_eq!(kind, FailureKind::InvalidInput);
                assert!(!message.is_empty());
            }
            other => panic!("expected failure, got {:?}", other),
        }

        let missing = registry
            .execute("lookup_contract", HashMap::new(), ToolRequestMeta::default())
            .await;
        assert!(!missing.is_success());
    }

    #[tokio::test]
    async fn test_registry_execute_json() {
        let mut registry = ToolRegistry::new();
        registry.register(ContractLookup);

        let result = registry
            .execute_json("lookup_contract", r#"{"contract_number": "654321"}"#, ToolRequestMeta::default())
            .await;
        assert_eq!(result.get("contract_number"), Some(&json!("654321")));

        let garbage = registry
            .execute_json("lookup_contract", "not json", ToolRequestMeta::default())
            .await;
        assert!(!garbage.is_success());
    }

    #[tokio::test]
    async fn test_registry_not_found() {
        let registry = ToolRegistry::new();
        let result = registry
            .execute("nonexistent", HashMap::new(), ToolRequestMeta::default())
            .await;
        assert!(matches!(
            result,
            ToolOutput::Failure {
                kind: FailureKind::NotFound,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_read_tool_retries_transient_errors() {
        let calls = Arc::new(AtomicU32::new(0));
        let mut registry = ToolRegistry::with_retry_policy(fast_policy());
        registry.register(FlakyTool {
            kind: ToolKind::Read,
            failures: 2,
            calls: calls.clone(),
        });

        let result = registry
            .execute("flaky", HashMap::new(), ToolRequestMeta::default())
            .await;
        assert!(result.is_success());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_read_tool_gives_up_after_max_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let mut registry = ToolRegistry::with_retry_policy(fast_policy());
        registry.register(FlakyTool {
            kind: ToolKind::Read,
            failures: 10,
            calls: calls.clone(),
        });

        let result = registry
            .execute("flaky", HashMap::new(), ToolRequestMeta::default())
            .await;
        assert!(!result.is_success());
        assert!(!result.error().unwrap().is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), DEFAULT_MAX_ATTEMPTS);
    }

    #[tokio::test]
    async fn test_busy_store_is_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let mut registry = ToolRegistry::with_retry_policy(fast_policy());
        registry.register(BusyStoreTool {
            failures: 2,
            calls: calls.clone(),
        });

        let result = registry
            .execute("list_from_store", HashMap::new(), ToolRequestMeta::default())
            .await;
        assert!(result.is_success(), "{:?}", result);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_write_tool_runs_once() {
        let calls = Arc::new(AtomicU32::new(0));
        let mut registry = ToolRegistry::with_retry_policy(fast_policy());
        registry.register(FlakyTool {
            kind: ToolKind::Write,
            failures: 1,
            calls: calls.clone(),
        });

        let result = registry
            .execute("flaky", HashMap::new(), ToolRequestMeta::default())
            .await;
        assert!(!result.is_success());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_timeout() {
        let policy = RetryPolicy::default()
            .with_max_attempts(2)
            .with_attempt_timeout(Duration::from_secs(1));
        let mut registry = ToolRegistry::with_retry_policy(policy);
        registry.register(SlowTool);

        let result = registry
            .execute("slow", HashMap::new(), ToolRequestMeta::default())
            .await;
        assert!(matches!(
            result,
            ToolOutput::Failure {
                kind: FailureKind::Timeout,
                ..
            }
        ));
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_after(1), Duration::from_millis(500));
        assert_eq!(policy.backoff_after(2), Duration::from_millis(1000));
        assert_eq!(policy.backoff_after(3), Duration::from_millis(2000));
    }
}
