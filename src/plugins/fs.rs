use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use tracing::warn;

use crate::error::PluginFailure;
use crate::plugin::{ActionSpec, Plugin, required_str};

/// Filesystem access confined to a working-directory root.
pub struct FsPlugin {
    root: PathBuf,
}

impl FsPlugin {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Resolve a planner-supplied relative path inside the root. Absolute
    /// paths and `..` components are rejected so the planner cannot escape.
    fn resolve(&self, relative: &str) -> Result<PathBuf, PluginFailure> {
        let path = Path::new(relative);
        if path.is_absolute() {
            return Err(PluginFailure(format!("path `{relative}` must be relative")));
        }
        for component in path.components() {
            if matches!(component, Component::ParentDir) {
                return Err(PluginFailure(format!(
                    "path `{relative}` may not contain `..`"
                )));
            }
        }
        Ok(self.root.join(path))
    }
}

#[async_trait]
impl Plugin for FsPlugin {
    fn name(&self) -> &str {
        "fs"
    }

    fn actions(&self) -> Vec<ActionSpec> {
        vec![
            ActionSpec {
                name: "fs.readFile".into(),
                description: "Read a file".into(),
                example_args: Some(json!({"path": "./foo.txt"})),
            },
            ActionSpec {
                name: "fs.writeFile".into(),
                description: "Write a file".into(),
                example_args: Some(json!({"path": "./foo/bar.txt", "contents": "hello world"})),
            },
            ActionSpec {
                name: "fs.listFiles".into(),
                description: "List files".into(),
                example_args: Some(json!({"path": "."})),
            },
        ]
    }

    async fn handle(
        &self,
        action: &str,
        args: &Map<String, Value>,
    ) -> Result<Option<String>, PluginFailure> {
        match action {
            "fs.readFile" => {
                let path = self.resolve(required_str(args, "path")?)?;
                match tokio::fs::read_to_string(&path).await {
                    Ok(contents) => Ok(Some(contents)),
                    Err(err) => {
                        // A missing file is worth telling the planner about,
                        // not worth failing over.
                        warn!("fs.readFile {}: {err}", path.display());
                        Ok(None)
                    }
                }
            }
            "fs.writeFile" => {
                let path = self.resolve(required_str(args, "path")?)?;
                let contents = required_str(args, "contents")?;
                if let Some(parent) = path.parent() {
                    tokio::fs::create_dir_all(parent).await.map_err(|err| {
                        PluginFailure(format!("creating {}: {err}", parent.display()))
                    })?;
                }
                tokio::fs::write(&path, contents)
                    .await
                    .map_err(|err| PluginFailure(format!("writing {}: {err}", path.display())))?;
                Ok(None)
            }
            "fs.listFiles" => {
                let dir = self.resolve(args.get("path").and_then(Value::as_str).unwrap_or("."))?;
                let files = list_files(&dir, &self.root)
                    .map_err(|err| PluginFailure(format!("listing {}: {err}", dir.display())))?;
                Ok(Some(files.join("\n")))
            }
            other => Err(PluginFailure(format!("fs plugin has no action `{other}`"))),
        }
    }
}

/// Recursively list files under `dir`, as paths relative to `root`, skipping
/// dotfiles and dependency directories.
fn list_files(dir: &Path, root: &Path) -> std::io::Result<Vec<String>> {
    let mut found = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        if !current.exists() {
            continue;
        }
        for entry in std::fs::read_dir(&current)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') || name == "node_modules" || name == "target" {
                continue;
            }
            let path = entry.path();
            if entry.file_type()?.is_dir() {
                pending.push(path);
            } else {
                let display = path.strip_prefix(root).unwrap_or(&path);
                found.push(display.to_string_lossy().into_owned());
            }
        }
    }
    found.sort();
    Ok(found)
}
