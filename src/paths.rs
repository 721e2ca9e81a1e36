//! Structured path-role resolution.
//!
//! Logical directory roles resolve to concrete source directories, glob
//! patterns, and destination paths. Output paths never retain the leading
//! underscore marker used for source-only folders.

use std::path::{Path, PathBuf};

use crate::config::Directories;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Source,
    Images,
    Styles,
    Scripts,
    Modules,
    NodeModules,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Source => "source",
            Role::Images => "images",
            Role::Styles => "styles",
            Role::Scripts => "scripts",
            Role::Modules => "modules",
            Role::NodeModules => "node_modules",
        }
    }
}

/// Resolves directory roles against a project base directory and a
/// destination root. Pure path arithmetic, no filesystem access.
#[derive(Debug, Clone)]
pub struct PathResolver {
    base_dir: PathBuf,
    dirs: Directories,
    dest_root: PathBuf,
}

impl PathResolver {
    pub fn new(base_dir: impl Into<PathBuf>, dirs: Directories, dest: &str) -> Self {
        let base_dir = base_dir.into();
        let dest_root = base_dir.join(dest);
        Self {
            base_dir,
            dirs,
            dest_root,
        }
    }

    pub fn dest_root(&self) -> &Path {
        &self.dest_root
    }

    fn fragment(&self, role: Role) -> Result<&str> {
        let fragment = match role {
            Role::Source => &self.dirs.source,
            Role::Images => &self.dirs.images,
            Role::Styles => &self.dirs.styles,
            Role::Scripts => &self.dirs.scripts,
            Role::Modules => &self.dirs.modules,
            Role::NodeModules => &self.dirs.node_modules,
        };
        if fragment.is_empty() {
            return Err(Error::Config(format!(
                "no path configured for role '{}'",
                role.as_str()
            )));
        }
        Ok(fragment)
    }

    /// Destination path for a role: the destination root joined with the
    /// role fragment, leading underscore stripped from each component.
    /// `dist` + `_images` -> `dist/images`.
    pub fn resolve(&self, role: Role) -> Result<PathBuf> {
        let fragment = self.fragment(role)?;
        let mut out = self.dest_root.clone();
        for component in Path::new(fragment).components() {
            let name = component.as_os_str().to_string_lossy();
            match name.strip_prefix('_') {
                Some(stripped) => out.push(stripped),
                None => out.push(&*name),
            }
        }
        Ok(out)
    }

    /// Source-side directory for a role, marker intact. The source and
    /// node_modules roles live at the project base; all others nest under
    /// the source root.
    pub fn source_dir(&self, role: Role) -> Result<PathBuf> {
        match role {
            Role::Source => Ok(self.base_dir.join(self.fragment(Role::Source)?)),
            Role::NodeModules => Ok(self.base_dir.join(self.fragment(Role::NodeModules)?)),
            _ => {
                let source = self.source_dir(Role::Source)?;
                Ok(source.join(self.fragment(role)?))
            }
        }
    }

    /// Recursive glob patterns matching the given extensions under a
    /// role's source directory, one pattern per extension.
    pub fn glob_for(&self, role: Role, extensions: &[&str]) -> Result<Vec<String>> {
        let dir = self.source_dir(role)?;
        Ok(extensions
            .iter()
            .map(|ext| format!("{}/**/*.{}", dir.display(), ext))
            .collect())
    }
}
