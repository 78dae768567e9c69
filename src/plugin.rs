//! Plugin registry: the extensible half of the action vocabulary. Plugins are
//! registered once at startup and read-only afterwards; the ordered union of
//! their actions is exactly what the planner is allowed to emit beyond the
//! built-in browser primitives. Dispatch is a single map lookup that fails
//! closed on a miss.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::PluginFailure;

/// One catalogue entry, exposed verbatim to the prompt-assembly collaborator.
#[derive(Debug, Clone, Serialize)]
pub struct ActionSpec {
    pub name: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub example_args: Option<Value>,
}

#[async_trait]
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;
    /// The actions this plugin contributes, in the order they should appear
    /// in the catalogue.
    fn actions(&self) -> Vec<ActionSpec>;
    async fn handle(
        &self,
        action: &str,
        args: &Map<String, Value>,
    ) -> Result<Option<String>, PluginFailure>;
}

pub struct PluginRegistry {
    plugins: Vec<Arc<dyn Plugin>>,
    by_action: HashMap<String, usize>,
}

impl PluginRegistry {
    pub fn new(plugins: Vec<Arc<dyn Plugin>>) -> Self {
        let mut by_action = HashMap::new();
        for (idx, plugin) in plugins.iter().enumerate() {
            for spec in plugin.actions() {
                by_action.insert(spec.name, idx);
            }
        }
        Self { plugins, by_action }
    }

    pub fn plugin_for(&self, action: &str) -> Option<&dyn Plugin> {
        self.by_action
            .get(action)
            .map(|&idx| self.plugins[idx].as_ref())
    }

    /// The full action catalogue, in registration order.
    pub fn catalogue(&self) -> Vec<ActionSpec> {
        self.plugins
            .iter()
            .flat_map(|plugin| plugin.actions())
            .collect()
    }
}

/// Pull a required string argument out of a plugin action's payload.
pub fn required_str<'a>(
    args: &'a Map<String, Value>,
    field: &str,
) -> Result<&'a str, PluginFailure> {
    args.get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| PluginFailure(format!("missing required string argument `{field}`")))
}
