//! Archive-backed document model.
//! A DOCX file is a zip archive of XML parts; only the text parts are ever
//! rewritten, everything else is carried through byte for byte.
use crate::constants::{MAIN_DOCUMENT_PART, TEXT_PART_GLOBS};
use crate::error::{Error, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use indexmap::IndexMap;
use log::debug;
use std::io::{Cursor, Read, Write};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// One archive member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub data: Vec<u8>,
    pub is_dir: bool,
}

/// In-memory DOCX archive.
#[derive(Debug)]
pub struct DocxArchive {
    entries: IndexMap<String, ArchiveEntry>,
}

fn text_part_globs() -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in TEXT_PART_GLOBS {
        builder.add(
            Glob::new(pattern).map_err(|e| Error::Internal(format!("bad part glob: {e}")))?,
        );
    }
    builder.build().map_err(|e| Error::Internal(format!("bad part glob: {e}")))
}

impl DocxArchive {
    /// Opens a DOCX archive from bytes.
    ///
    /// # Arguments
    /// * `bytes` - Raw archive content
    /// * `max_uncompressed_bytes` - Limit on the sum of decompressed entry sizes
    ///
    /// # Errors
    /// * `Error::Zip` if the buffer is not a zip archive
    /// * `Error::Archive` if the limit is exceeded or the main document part is missing
    pub fn from_bytes(bytes: &[u8], max_uncompressed_bytes: u64) -> Result<Self> {
        let mut archive = ZipArchive::new(Cursor::new(bytes))?;
        let mut entries = IndexMap::with_capacity(archive.len());
        let mut total: u64 = 0;

        for i in 0..archive.len() {
            let file = archive.by_index(i)?;
            let name = file.name().to_string();
            let is_dir = file.is_dir();
            let remaining = max_uncompressed_bytes.saturating_sub(total);

            let mut data = Vec::new();
            file.take(remaining.saturating_add(1)).read_to_end(&mut data)?;
            total += data.len() as u64;
            if total > max_uncompressed_bytes {
                return Err(Error::Archive(format!(
                    "archive expands beyond {max_uncompressed_bytes} bytes"
                )));
            }
            entries.insert(name, ArchiveEntry { data, is_dir });
        }

        if !entries.contains_key(MAIN_DOCUMENT_PART) {
            return Err(Error::Archive(format!("missing '{MAIN_DOCUMENT_PART}' part")));
        }
        debug!(
            "Opened archive with {} entries ({} bytes uncompressed).",
            entries.len(),
            total
        );

        Ok(Self { entries })
    }

    /// Names of every entry in archive order.
    pub fn entry_names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn entry(&self, name: &str) -> Option<&ArchiveEntry> {
        self.entries.get(name)
    }

    /// Parts whose run text may contain placeholders, in archive order.
    pub fn text_part_names(&self) -> Result<Vec<String>> {
        let globs = text_part_globs()?;
        Ok(self
            .entries
            .iter()
            .filter(|(name, entry)| !entry.is_dir && globs.is_match(name.as_str()))
            .map(|(name, _)| name.clone())
            .collect())
    }

    /// Reads a part as UTF-8 text.
    pub fn read_text(&self, name: &str) -> Result<String> {
        let entry = self
            .entries
            .get(name)
            .ok_or_else(|| Error::Archive(format!("missing '{name}' part")))?;
        String::from_utf8(entry.data.clone())
            .map_err(|e| Error::Archive(format!("part '{name}' is not UTF-8: {e}")))
    }

    /// Replaces the content of an existing part.
    pub fn write_text(&mut self, name: &str, content: String) -> Result<()> {
        let entry = self
            .entries
            .get_mut(name)
            .ok_or_else(|| Error::Archive(format!("missing '{name}' part")))?;
        entry.data = content.into_bytes();
        Ok(())
    }

    /// Serialises the archive with DEFLATE compression, preserving entry order.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        for (name, entry) in &self.entries {
            if entry.is_dir {
                writer.add_directory(name.as_str(), options)?;
            } else {
                writer.start_file(name.as_str(), options)?;
                writer.write_all(&entry.data)?;
            }
        }

        Ok(writer.finish()?.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default();
        for (name, data) in [
            ("[Content_Types].xml", "<Types/>"),
            ("word/document.xml", "<w:document/>"),
            ("word/header1.xml", "<w:hdr/>"),
            ("word/styles.xml", "<w:styles/>"),
            ("word/media/image1.png", "\u{89}PNG"),
        ] {
            writer.start_file(name, options).unwrap();
            writer.write_all(data.as_bytes()).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn test_text_part_names() {
        let archive = DocxArchive::from_bytes(&sample(), u64::MAX).unwrap();
        assert_eq!(
            archive.text_part_names().unwrap(),
            vec!["word/document.xml", "word/header1.xml"]
        );
    }

    #[test]
    fn test_uncompressed_limit() {
        let err = DocxArchive::from_bytes(&sample(), 10).unwrap_err();
        assert!(matches!(err, Error::Archive(_)));
    }

    #[test]
    fn test_not_a_zip() {
        assert!(matches!(
            DocxArchive::from_bytes(b"definitely not a zip", u64::MAX),
            Err(Error::Zip(_))
        ));
    }
}
