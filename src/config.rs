use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::error::Error;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub project: Project,
    pub directories: Directories,
    #[serde(default)]
    pub entries: Entries,
    #[serde(default)]
    pub notification: Notification,
    #[serde(default)]
    pub build: Build,
}

#[derive(Debug, Deserialize)]
pub struct Project {
    pub name: String,
}

/// Logical directory roles mapped to path fragments. Source-side folders
/// may carry a leading underscore marker that never reaches the output
/// tree.
#[derive(Debug, Clone, Deserialize)]
pub struct Directories {
    pub source: String,
    pub images: String,
    pub styles: String,
    pub scripts: String,
    pub modules: String,
    pub node_modules: String,
}

impl Directories {
    pub fn fragments(&self) -> [(&'static str, &str); 6] {
        [
            ("source", self.source.as_str()),
            ("images", self.images.as_str()),
            ("styles", self.styles.as_str()),
            ("scripts", self.scripts.as_str()),
            ("modules", self.modules.as_str()),
            ("node_modules", self.node_modules.as_str()),
        ]
    }
}

/// Named glob targets, e.g. the primary stylesheet entry file.
#[derive(Debug, Clone, Deserialize)]
pub struct Entries {
    #[serde(default = "default_css_entry")]
    pub css: String,
}

impl Default for Entries {
    fn default() -> Self {
        Self {
            css: default_css_entry(),
        }
    }
}

fn default_css_entry() -> String {
    "main.scss".to_string()
}

/// Descriptor for user-facing failure surfacing. `{task}` and `{error}`
/// placeholders are filled in at notification time.
#[derive(Debug, Clone, Deserialize)]
pub struct Notification {
    #[serde(default = "default_notification_title")]
    pub title: String,
    #[serde(default = "default_notification_message")]
    pub message: String,
}

impl Default for Notification {
    fn default() -> Self {
        Self {
            title: default_notification_title(),
            message: default_notification_message(),
        }
    }
}

fn default_notification_title() -> String {
    "{task} failed".to_string()
}

fn default_notification_message() -> String {
    "{error}".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct Build {
    #[serde(default = "default_dest")]
    pub dest: String,
}

impl Default for Build {
    fn default() -> Self {
        Self {
            dest: default_dest(),
        }
    }
}

fn default_dest() -> String {
    "dist".to_string()
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config =
            toml::from_str(&content).with_context(|| "Failed to parse assetx.toml")?;

        config.validate()?;

        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        // Every role referenced by a task must resolve to a non-empty path.
        for (role, fragment) in self.directories.fragments() {
            if fragment.is_empty() {
                return Err(Error::Config(format!(
                    "directory role '{}' resolves to an empty path",
                    role
                ))
                .into());
            }
        }

        if self.build.dest.is_empty() {
            return Err(Error::Config("build.dest must not be empty".to_string()).into());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config() {
        let toml_content = r#"
[project]
name = "test-site"

[directories]
source = "src"
images = "_images"
styles = "_styles"
scripts = "_scripts"
modules = "_modules"
node_modules = "node_modules"

[entries]
css = "main.scss"

[notification]
title = "Build failed: {task}"
message = "{error}"
"#;

        let config: Config = toml::from_str(toml_content).unwrap();
        assert_eq!(config.project.name, "test-site");
        assert_eq!(config.directories.images, "_images");
        assert_eq!(config.entries.css, "main.scss");
        assert_eq!(config.notification.title, "Build failed: {task}");
        // [build] omitted falls back to the default destination.
        assert_eq!(config.build.dest, "dist");
    }

    #[test]
    fn test_empty_role_rejected() {
        let toml_content = r#"
[project]
name = "test-site"

[directories]
source = "src"
images = ""
styles = "_styles"
scripts = "_scripts"
modules = "_modules"
node_modules = "node_modules"
"#;

        let config: Config = toml::from_str(toml_content).unwrap();
        assert!(config.validate().is_err());
    }
}
