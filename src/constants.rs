//! Common constants used throughout the docgen service.

/// Supported configuration file names
pub const CONFIG_FILES: [&str; 3] = ["docgen.json", "docgen.yml", "docgen.yaml"];

/// Port used when neither the config file nor `PORT` overrides it
pub const DEFAULT_PORT: u16 = 3001;

/// Address the listener binds to by default
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Directory holding the DOCX templates, relative to the working directory
pub const DEFAULT_TEMPLATES_DIR: &str = "public/templates";

/// Request body cap
pub const DEFAULT_MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Template file cap
pub const DEFAULT_MAX_TEMPLATE_BYTES: u64 = 20 * 1024 * 1024;

/// Cap on the sum of decompressed archive entries
pub const DEFAULT_MAX_UNCOMPRESSED_BYTES: u64 = 100 * 1024 * 1024;

/// Pattern used to build the download file name
pub const DEFAULT_FILE_NAME_PATTERN: &str = "{{ stem }}_{{ timestamp }}.docx";

/// Files listed by the template catalogue
pub const DEFAULT_TEMPLATE_GLOB: &str = "**/*.docx";

/// MIME type of generated documents
pub const DOCX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// Main document part every DOCX archive must contain
pub const MAIN_DOCUMENT_PART: &str = "word/document.xml";

/// Archive parts whose `<w:t>` runs are scanned for placeholders
pub const TEXT_PART_GLOBS: [&str; 5] = [
    "word/document.xml",
    "word/header*.xml",
    "word/footer*.xml",
    "word/footnotes.xml",
    "word/endnotes.xml",
];

/// Opening placeholder delimiter
pub const TAG_OPEN: char = '{';

/// Closing placeholder delimiter
pub const TAG_CLOSE: char = '}';

/// Environment name that suppresses internal error details in responses
pub const PRODUCTION_ENV: &str = "production";
