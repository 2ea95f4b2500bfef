//! Reply plugins declared in JSON manifests.
//!
//! Every `*.json` file in the plugin directory is one plugin:
//!
//! ```json
//! {
//!   "commands": [
//!     { "pattern": "rules", "aliases": ["r"], "description": "Group rules", "reply": "Be nice, @user" }
//!   ]
//! }
//! ```
//!
//! `@user` in a reply mentions the sender.

use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use async_trait::async_trait;
use herald_core::{CommandDescriptor, InboundMessage, Invocation, OutboundContent};
use serde::Deserialize;

use super::{Plugin, PluginRegistrar, PluginSource};
use crate::{
    error::{HandlerError, PluginError},
    handler::{Handler, HandlerContext},
};

#[derive(Debug, Clone, Deserialize)]
struct Manifest {
    #[serde(default)]
    name: Option<String>,
    commands: Vec<ReplyCommand>,
}

#[derive(Debug, Clone, Deserialize)]
struct ReplyCommand {
    pattern: String,
    #[serde(default)]
    aliases: Vec<String>,
    #[serde(default)]
    description: String,
    reply: String,
}

/// Directory of JSON plugin manifests.
#[derive(Debug, Clone)]
pub struct ManifestDir {
    path: PathBuf,
}

impl ManifestDir {
    /// Source reading manifests from `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl PluginSource for ManifestDir {
    fn name(&self) -> &str {
        "manifest"
    }

    fn plugins(&self) -> Vec<Result<Box<dyn Plugin>, PluginError>> {
        let entries = match fs::read_dir(&self.path) {
            Ok(entries) => entries,
            Err(e) => {
                let error = PluginError::Io { path: self.path.clone(), reason: e.to_string() };
                return vec![Err(error)];
            },
        };

        let mut paths: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| {
                path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
            })
            .collect();
        paths.sort();

        paths
            .iter()
            .map(|path| ManifestPlugin::load(path).map(|p| Box::new(p) as Box<dyn Plugin>))
            .collect()
    }
}

/// Plugin built from one manifest file.
#[derive(Debug, Clone)]
pub struct ManifestPlugin {
    name: String,
    path: PathBuf,
    commands: Vec<ReplyCommand>,
}

impl ManifestPlugin {
    /// Read and parse a manifest.
    ///
    /// # Errors
    ///
    /// - `PluginError::Io` if the file cannot be read
    /// - `PluginError::Invalid` if it is not a valid manifest
    pub fn load(path: &Path) -> Result<Self, PluginError> {
        let text = fs::read_to_string(path)
            .map_err(|e| PluginError::Io { path: path.to_path_buf(), reason: e.to_string() })?;
        Self::parse(path, &text)
    }

    /// Parse manifest text. `path` names the plugin and appears in errors.
    ///
    /// # Errors
    ///
    /// `PluginError::Invalid` if the text is not a valid manifest.
    pub fn parse(path: &Path, text: &str) -> Result<Self, PluginError> {
        let manifest: Manifest = serde_json::from_str(text)
            .map_err(|e| PluginError::Invalid { path: path.to_path_buf(), reason: e.to_string() })?;

        let name = manifest.name.unwrap_or_else(|| {
            path.file_stem().map_or_else(
                || "manifest".to_string(),
                |stem| stem.to_string_lossy().into_owned(),
            )
        });
        Ok(Self { name, path: path.to_path_buf(), commands: manifest.commands })
    }

    /// Number of commands declared.
    pub fn command_count(&self) -> usize {
        self.commands.len()
    }
}

impl Plugin for ManifestPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn register(&self, registrar: &mut PluginRegistrar) -> Result<(), PluginError> {
        if self.commands.is_empty() {
            return Err(PluginError::Invalid {
                path: self.path.clone(),
                reason: "no commands declared".to_string(),
            });
        }

        for command in &self.commands {
            let descriptor = command
                .aliases
                .iter()
                .fold(CommandDescriptor::command(&command.pattern), |d, alias| d.alias(alias))
                .describe(&command.description);
            registrar.add(descriptor, Arc::new(Reply { text: command.reply.clone() }));
        }
        Ok(())
    }
}

struct Reply {
    text: String,
}

#[async_trait]
impl Handler for Reply {
    async fn handle(
        &self,
        ctx: HandlerContext,
        message: Arc<InboundMessage>,
        _invocation: Arc<Invocation>,
    ) -> Result<(), HandlerError> {
        let content = if self.text.contains("@user") {
            OutboundContent::Text {
                text: self.text.replace("@user", &message.sender.mention()),
                mentions: vec![message.sender.clone()],
            }
        } else {
            OutboundContent::text(self.text.clone())
        };
        ctx.client.send_message(&message.chat, content).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::load_plugins;

    const RULES: &str = r#"{
        "commands": [
            { "pattern": "rules", "aliases": ["r"], "description": "Group rules", "reply": "Be nice, @user" },
            { "pattern": "site", "reply": "https://example.org" }
        ]
    }"#;

    #[test]
    fn parse_names_plugin_after_file() {
        let plugin = ManifestPlugin::parse(Path::new("plugins/rules.json"), RULES).unwrap();

        assert_eq!(plugin.name(), "rules");
        assert_eq!(plugin.command_count(), 2);
    }

    #[test]
    fn parse_rejects_malformed_manifest() {
        let err = ManifestPlugin::parse(Path::new("bad.json"), "{ \"commands\": 3 }").unwrap_err();
        assert!(matches!(err, PluginError::Invalid { .. }));
    }

    #[test]
    fn empty_manifest_fails_registration() {
        let plugin = ManifestPlugin::parse(Path::new("empty.json"), r#"{"commands": []}"#).unwrap();
        let mut registrar = PluginRegistrar::default();
        assert!(plugin.register(&mut registrar).is_err());
    }

    #[test]
    fn directory_loads_json_files_and_skips_broken_ones() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("rules.json"), RULES).unwrap();
        fs::write(dir.path().join("broken.json"), "not json").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let source = ManifestDir::new(dir.path());
        let plugins = source.plugins();
        assert_eq!(plugins.len(), 2);

        let registry = load_plugins(&[Box::new(source) as Box<dyn PluginSource>]);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.resolve_command("r").unwrap().descriptor.pattern, "rules");
    }

    #[test]
    fn missing_directory_is_a_single_error() {
        let source = ManifestDir::new("/nonexistent/herald/plugins");
        let plugins = source.plugins();
        assert_eq!(plugins.len(), 1);
        assert!(matches!(plugins[0], Err(PluginError::Io { .. })));
    }
}
