//! ToolExecutor implementation backed by ToolRegistry.

use std::collections::HashSet;
use std::sync::Arc;

use brain_core::{ToolDefinition, ToolExecutor, ToolRequest, ToolResult};
use tracing::warn;

use crate::ToolRegistry;

/// Which registry tools an executor exposes.
#[derive(Debug, Clone, Default)]
pub struct ToolPolicy {
    /// Allowed tool names. `None` allows every registered tool.
    pub allowlist: Option<HashSet<String>>,
}

impl ToolPolicy {
    pub fn allow_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let allowlist = self.allowlist.get_or_insert_with(HashSet::new);
        for tool in tools {
            allowlist.insert(tool.into());
        }
        self
    }

    pub fn allows(&self, tool: &str) -> bool {
        self.allowlist
            .as_ref()
            .map_or(true, |allowed| allowed.contains(tool))
    }
}

/// Exposes a shared [`ToolRegistry`] to a model, restricted by a policy.
///
/// Each persona gets its own executor over the same registry.
pub struct RegistryToolExecutor {
    registry: Arc<ToolRegistry>,
    policy: ToolPolicy,
}

impl RegistryToolExecutor {
    pub fn new(registry: ToolRegistry) -> Self {
        Self::with_policy(registry, ToolPolicy::default())
    }

    pub fn with_policy(registry: ToolRegistry, policy: ToolPolicy) -> Self {
        Self::from_shared(Arc::new(registry), policy)
    }

    pub fn from_shared(registry: Arc<ToolRegistry>, policy: ToolPolicy) -> Self {
        Self { registry, policy }
    }

    pub fn registry(&self) -> &ToolRegistry {
        self.registry.as_ref()
    }

    pub fn policy(&self) -> &ToolPolicy {
        &self.policy
    }
}

#[async_trait::async_trait]
impl ToolExecutor for RegistryToolExecutor {
    async fn execute(&self, request: ToolRequest) -> ToolResult {
        if !self.policy.allows(&request.name) {
            warn!(tool = %request.name, "Tool not allowed for this persona");
            return ToolResult::error(
                &request.id,
                format!("Tool not allowed: {}", request.name),
            );
        }

        let output = self
            .registry
            .execute(
                &request.name,
                request.arguments,
                request.metadata.unwrap_or_default(),
            )
            .await;

        let content = output.to_json().to_string();
        if output.is_success() {
            ToolResult::success(&request.id, content)
        } else {
            ToolResult {
                tool_call_id: request.id,
                content,
                success: false,
            }
        }
    }

    fn definitions(&self) -> Vec<ToolDefinition> {
        self.registry
            .definitions()
            .into_iter()
            .filter(|d| self.policy.allows(&d.name))
            .collect()
    }
}
