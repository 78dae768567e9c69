use async_trait::async_trait;
use serde_json::{Map, Value, json};
use tokio::process::Command;
use tracing::debug;

use crate::error::PluginFailure;
use crate::plugin::{ActionSpec, Plugin, required_str};

/// Shell execution. A failed command is reported through the action's result
/// so the planner sees the failure as data.
pub struct ExecPlugin {
    shell: String,
}

impl ExecPlugin {
    pub fn new(shell: String) -> Self {
        Self { shell }
    }
}

#[async_trait]
impl Plugin for ExecPlugin {
    fn name(&self) -> &str {
        "exec"
    }

    fn actions(&self) -> Vec<ActionSpec> {
        vec![ActionSpec {
            name: "exec.shell".into(),
            description: "Execute a shell command".into(),
            example_args: Some(json!({"command": "cat ./foo.txt"})),
        }]
    }

    async fn handle(
        &self,
        action: &str,
        args: &Map<String, Value>,
    ) -> Result<Option<String>, PluginFailure> {
        match action {
            "exec.shell" => {
                let command = required_str(args, "command")?;
                debug!(%command, "running shell command");
                let output = Command::new(&self.shell)
                    .arg("-c")
                    .arg(command)
                    .output()
                    .await
                    .map_err(|err| {
                        PluginFailure(format!("failed to spawn `{}`: {err}", self.shell))
                    })?;

                let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
                if !output.stderr.is_empty() {
                    if !text.is_empty() {
                        text.push('\n');
                    }
                    text.push_str(&String::from_utf8_lossy(&output.stderr));
                }

                if output.status.success() {
                    Ok(Some(text))
                } else {
                    Err(PluginFailure(format!(
                        "command exited with {}: {}",
                        output.status,
                        text.trim()
                    )))
                }
            }
            other => Err(PluginFailure(format!("exec plugin has no action `{other}`"))),
        }
    }
}
