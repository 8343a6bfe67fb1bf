//! Document generation orchestration.
//! Loads a template, binds the data context into every text part and
//! serialises the archive again.

use crate::archive::DocxArchive;
use crate::binder::{BindOptions, Binder, NullPolicy};
use crate::error::{Error, Result};
use crate::loader::TemplateLoader;
use log::{debug, info, warn};
use serde_json::Value;
use std::sync::Arc;

/// Generates documents from templates served by a loader.
#[derive(Clone)]
pub struct DocumentGenerator {
    loader: Arc<dyn TemplateLoader>,
    max_uncompressed_bytes: u64,
    linebreaks: bool,
}

impl DocumentGenerator {
    pub fn new(
        loader: Arc<dyn TemplateLoader>,
        max_uncompressed_bytes: u64,
        linebreaks: bool,
    ) -> Self {
        Self {
            loader,
            max_uncompressed_bytes,
            linebreaks,
        }
    }

    pub fn loader(&self) -> &dyn TemplateLoader {
        self.loader.as_ref()
    }

    /// Generates a document.
    ///
    /// # Arguments
    /// * `template_name` - Template file name inside the templates directory
    /// * `data` - Data context, must be a JSON object
    /// * `policy` - Null-getter policy for this generation
    ///
    /// # Returns
    /// * `Result<Vec<u8>>` - The generated DOCX archive
    ///
    /// # Errors
    /// * `Error::InvalidInput` if `data` is not an object or the name is unsafe
    /// * `Error::TemplateNotFound` if the template does not exist
    /// * `Error::PlaceholderResolution` with every failed placeholder of every part
    /// * `Error::Archive` / `Error::Zip` for corrupt templates
    pub fn generate(
        &self,
        template_name: &str,
        data: &Value,
        policy: NullPolicy,
    ) -> Result<Vec<u8>> {
        if !data.is_object() {
            return Err(Error::invalid_input("'data' must be an object"));
        }

        let bytes = self.loader.load(template_name)?;
        debug!("Read template '{}' ({} bytes).", template_name, bytes.len());

        let mut archive = DocxArchive::from_bytes(&bytes, self.max_uncompressed_bytes)?;
        let binder = Binder::new(BindOptions {
            policy,
            linebreaks: self.linebreaks,
        });

        let mut errors = Vec::new();
        for part in archive.text_part_names()? {
            let xml = archive.read_text(&part)?;
            let bound = binder.bind_part(&part, &xml, data)?;
            if bound.errors.is_empty() {
                archive.write_text(&part, bound.xml)?;
            } else {
                errors.extend(bound.errors);
            }
        }

        if !errors.is_empty() {
            for error in &errors {
                warn!("{}", error);
            }
            return Err(Error::PlaceholderResolution(errors));
        }

        let output = archive.to_bytes()?;
        info!("Generated '{}' ({} bytes).", template_name, output.len());
        Ok(output)
    }
}
