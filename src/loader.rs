//! Template loading for docgen.
//! Resolves template names inside the templates directory, reads them with a
//! size bound and lists what is available.
use crate::error::{Error, Result};
use globset::{Glob, GlobMatcher};
use log::{debug, warn};
use serde::Serialize;
use std::fs;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

/// A template available in the templates directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateInfo {
    /// File name, the identifier used in requests for top-level templates
    pub name: String,
    /// Path relative to the templates directory, always `/`-separated
    pub relative_path: String,
    pub size_bytes: u64,
}

impl std::fmt::Display for TemplateInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({:.2} KB)", self.relative_path, self.size_bytes as f64 / 1024.0)
    }
}

/// Trait for loading templates by name.
pub trait TemplateLoader: Send + Sync {
    /// Resolves a template name to its absolute path without touching the file.
    ///
    /// # Errors
    /// * `Error::InvalidInput` if the name would leave the templates directory
    fn resolve(&self, name: &str) -> Result<PathBuf>;

    /// Reads the template bytes.
    ///
    /// # Errors
    /// * `Error::TemplateNotFound` if the file does not exist
    /// * `Error::TemplateTooLarge` if the file exceeds the size limit
    fn load(&self, name: &str) -> Result<Vec<u8>>;

    /// Lists available templates sorted by relative path.
    fn list(&self) -> Result<Vec<TemplateInfo>>;

    /// Directory templates are read from.
    fn root(&self) -> &Path;
}

/// Loader for templates from a local directory.
pub struct LocalLoader {
    templates_dir: PathBuf,
    max_template_bytes: u64,
    matcher: GlobMatcher,
}

impl LocalLoader {
    /// Creates a new LocalLoader instance.
    ///
    /// # Arguments
    /// * `templates_dir` - Directory holding the templates, made absolute against the working directory
    /// * `max_template_bytes` - Largest template file accepted
    /// * `template_glob` - Pattern of files reported by `list`
    pub fn new<P: AsRef<Path>>(
        templates_dir: P,
        max_template_bytes: u64,
        template_glob: &str,
    ) -> Result<Self> {
        let templates_dir = templates_dir.as_ref();
        let templates_dir = if templates_dir.is_absolute() {
            templates_dir.to_path_buf()
        } else {
            std::env::current_dir()?.join(templates_dir)
        };
        let matcher = Glob::new(template_glob)
            .map_err(|e| Error::Config(format!("invalid template glob '{template_glob}': {e}")))?
            .compile_matcher();

        Ok(Self {
            templates_dir,
            max_template_bytes,
            matcher,
        })
    }
}

/// Checks that a request-supplied name stays below the templates directory.
fn validate_name(name: &str) -> Result<&Path> {
    let path = Path::new(name);
    let normal = path.components().all(|c| matches!(c, Component::Normal(_)));
    if name.trim().is_empty() || !normal || name.contains('\\') {
        return Err(Error::invalid_input(format!("invalid template name '{name}'")));
    }
    Ok(path)
}

impl TemplateLoader for LocalLoader {
    fn resolve(&self, name: &str) -> Result<PathBuf> {
        Ok(self.templates_dir.join(validate_name(name)?))
    }

    fn load(&self, name: &str) -> Result<Vec<u8>> {
        let path = self.resolve(name)?;
        debug!("Looking for template at '{}'.", path.display());

        if !path.is_file() {
            return Err(Error::TemplateNotFound {
                name: name.to_string(),
                path: path.display().to_string(),
            });
        }

        let size = fs::metadata(&path)?.len();
        if size > self.max_template_bytes {
            return Err(Error::TemplateTooLarge {
                name: name.to_string(),
                size,
                limit: self.max_template_bytes,
            });
        }

        Ok(fs::read(&path)?)
    }

    fn list(&self) -> Result<Vec<TemplateInfo>> {
        if !self.templates_dir.is_dir() {
            return Err(Error::Config(format!(
                "templates directory '{}' does not exist",
                self.templates_dir.display()
            )));
        }

        let mut templates = Vec::new();
        for entry in WalkDir::new(&self.templates_dir).follow_links(false) {
            let entry = entry.map_err(|e| Error::Io(e.into()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(&self.templates_dir)
                .map_err(|e| Error::Internal(e.to_string()))?;
            let relative_path = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            if !self.matcher.is_match(&relative_path) {
                continue;
            }

            let size_bytes = entry.metadata().map_err(|e| Error::Io(e.into()))?.len();
            if size_bytes == 0 {
                warn!("Template '{}' is empty.", relative_path);
            }
            templates.push(TemplateInfo {
                name: entry.file_name().to_string_lossy().into_owned(),
                relative_path,
                size_bytes,
            });
        }

        templates.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
        Ok(templates)
    }

    fn root(&self) -> &Path {
        &self.templates_dir
    }
}
