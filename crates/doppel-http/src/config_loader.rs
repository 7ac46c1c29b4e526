//! On-disk configuration loader: discovers `*.yaml`/`*.yml`/`*.json`
//! plugin documents under one or more directories (via `globwalk`, as the
//! teacher's crates do) and parses them into
//! `doppel_core::config::PluginConfig` trees. This is the "configuration
//! loader" external collaborator spec.md §1 treats as out of scope for the
//! core — `doppel_core` never sees a file path, only the parsed result.

use std::path::{Path, PathBuf};

use doppel_core::config::{PluginConfig, ResourceConfig, ResponseConfig};
use doppel_core::error::{Error, Result};
use serde::Deserialize;

/// On-disk shape of one plugin configuration document.
#[derive(Debug, Deserialize)]
struct PluginDocument {
    /// Registered plugin name this document targets (e.g. `"rest"`).
    plugin: String,
    #[serde(default)]
    default_content_type: Option<String>,
    #[serde(default)]
    root_response: Option<ResponseConfig>,
    #[serde(default)]
    defaults_from_root_response: bool,
    #[serde(default)]
    resources: Vec<ResourceConfig>,
}

/// Discover and parse every plugin document under `directories`.
///
/// Each matched file becomes one [`PluginConfig`], with `parent_dir` set to
/// the file's containing directory so relative response-file and
/// script-file paths resolve correctly.
pub fn load_plugin_configs(directories: &[PathBuf]) -> Result<Vec<PluginConfig>> {
    let mut configs = Vec::new();
    for directory in directories {
        for entry in globwalk::GlobWalkerBuilder::from_patterns(directory, &["*.yaml", "*.yml", "*.json"])
            .build()
            .map_err(|err| Error::Generic(format!("invalid config glob under {}: {err}", directory.display())))?
        {
            let entry = entry.map_err(|err| Error::Generic(format!("walking config directory: {err}")))?;
            configs.push(load_one(entry.path())?);
        }
    }
    Ok(configs)
}

fn load_one(path: &Path) -> Result<PluginConfig> {
    let contents = std::fs::read_to_string(path)?;
    let document: PluginDocument = if path.extension().and_then(|e| e.to_str()) == Some("json") {
        serde_json::from_str(&contents)?
    } else {
        serde_yaml::from_str(&contents)?
    };

    let parent_dir = path.parent().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("."));

    Ok(PluginConfig {
        plugin_name: document.plugin,
        parent_dir,
        default_content_type: document.default_content_type,
        root_response: document.root_response,
        defaults_from_root_response: document.defaults_from_root_response,
        resources: document.resources,
    })
}
