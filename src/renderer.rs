//! Download file-name rendering.
//! File names of generated documents come from a configurable MiniJinja
//! pattern such as `{{ stem }}_{{ timestamp }}.docx`.
use crate::error::{Error, Result};
use chrono::{DateTime, Local};
use minijinja::Environment;
use std::path::Path;

/// Trait for template rendering engines.
pub trait TemplateRenderer: Send + Sync {
    /// Renders a template string with the given context.
    ///
    /// # Arguments
    /// * `template` - Template string to render
    /// * `context` - Context variables for rendering
    ///
    /// # Returns
    /// * `Result<String>` - Rendered template string
    fn render(&self, template: &str, context: &serde_json::Value) -> Result<String>;
}

/// MiniJinja-based template rendering engine.
pub struct MiniJinjaRenderer {
    /// MiniJinja environment instance
    env: Environment<'static>,
}

impl MiniJinjaRenderer {
    /// Creates a new MiniJinjaRenderer instance with default environment.
    pub fn new() -> Self {
        let env = Environment::new();
        Self { env }
    }
}

impl Default for MiniJinjaRenderer {
    fn default() -> Self {
        MiniJinjaRenderer::new()
    }
}

impl TemplateRenderer for MiniJinjaRenderer {
    /// Renders a template string using MiniJinja.
    ///
    /// # Errors
    /// * `Error::Minijinja` if the pattern does not compile or render
    fn render(&self, template: &str, context: &serde_json::Value) -> Result<String> {
        let mut env = self.env.clone();
        env.add_template("temp", template).map_err(Error::Minijinja)?;

        let tmpl = env.get_template("temp").map_err(Error::Minijinja)?;

        tmpl.render(context).map_err(Error::Minijinja)
    }
}

/// Template file stem with the `_template` marker removed.
pub fn document_stem(template_name: &str) -> String {
    let stem = Path::new(template_name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "documento".to_string());
    stem.replace("_template", "")
}

/// Renders the download file name for a generated document.
///
/// The context exposes `stem`, `template` and `timestamp`.
pub fn download_file_name(
    renderer: &dyn TemplateRenderer,
    pattern: &str,
    template_name: &str,
    now: DateTime<Local>,
) -> Result<String> {
    let context = serde_json::json!({
        "stem": document_stem(template_name),
        "template": template_name,
        "timestamp": now.format("%Y-%m-%dT%H-%M-%S").to_string(),
    });
    let rendered = renderer.render(pattern, &context)?;
    Ok(sanitize_file_name(&rendered))
}

/// Keeps a file name safe for a `Content-Disposition` header (visible ASCII only).
pub fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| match c {
            '"' | '\\' | '/' | ';' => '_',
            c if !c.is_ascii_graphic() => '_',
            c => c,
        })
        .collect();
    if cleaned.is_empty() {
        "documento.docx".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_minijinja_renderer() {
        let engine = MiniJinjaRenderer::new();
        let context = serde_json::json!({"name": "test", "value": 42});
        assert_eq!(engine.render("Hello {{ name }}!", &context).unwrap(), "Hello test!");
        assert_eq!(engine.render("Value: {{ value }}", &context).unwrap(), "Value: 42");
        assert!(engine.render("{{ unclosed", &context).is_err());
    }

    #[test]
    fn test_document_stem() {
        assert_eq!(document_stem("termo_retirada_template.docx"), "termo_retirada");
        assert_eq!(document_stem("epi/termo_entrega_epi_template.docx"), "termo_entrega_epi");
    }

    #[test]
    fn test_download_file_name() {
        let now = Local.with_ymd_and_hms(2024, 5, 17, 9, 30, 0).unwrap();
        let name = download_file_name(
            &MiniJinjaRenderer::new(),
            "{{ stem }}_{{ timestamp }}.docx",
            "termo_devolucao_template.docx",
            now,
        )
        .unwrap();
        assert_eq!(name, "termo_devolucao_2024-05-17T09-30-00.docx");
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("a b\"c.docx"), "a_b_c.docx");
        assert_eq!(sanitize_file_name("termo_João.docx"), "termo_Jo_o.docx");
        assert_eq!(sanitize_file_name("  "), "documento.docx");
    }
}
