mod common;

use common::{paragraph, simple_docx, write_template};
use docgen::error::Error;
use docgen::loader::{LocalLoader, TemplateLoader};
use tempfile::TempDir;

#[test]
fn test_list_templates() {
    let temp_dir = TempDir::new().unwrap();
    let template = simple_docx(&paragraph("{nome}"));
    write_template(temp_dir.path(), "termo_retirada_template.docx", &template);
    write_template(temp_dir.path(), "epi/entrega.docx", &template);
    write_template(temp_dir.path(), "vazio.docx", b"");
    write_template(temp_dir.path(), "leiame.txt", b"ignored");

    let loader = LocalLoader::new(temp_dir.path(), u64::MAX, "**/*.docx").unwrap();
    let templates = loader.list().unwrap();

    let paths: Vec<_> = templates.iter().map(|t| t.relative_path.as_str()).collect();
    assert_eq!(paths, vec!["epi/entrega.docx", "termo_retirada_template.docx", "vazio.docx"]);
    assert_eq!(templates[0].name, "entrega.docx");
    assert_eq!(templates[1].size_bytes, template.len() as u64);
    assert_eq!(templates[2].size_bytes, 0);
}

#[test]
fn test_list_with_custom_glob() {
    let temp_dir = TempDir::new().unwrap();
    write_template(temp_dir.path(), "a.docx", b"x");
    write_template(temp_dir.path(), "sub/b.docx", b"x");

    let loader = LocalLoader::new(temp_dir.path(), u64::MAX, "sub/*.docx").unwrap();
    let names: Vec<_> = loader
        .list()
        .unwrap()
        .into_iter()
        .map(|t| t.relative_path)
        .collect();
    assert_eq!(names, vec!["sub/b.docx"]);
}

#[test]
fn test_missing_directory() {
    let temp_dir = TempDir::new().unwrap();
    let missing = temp_dir.path().join("nope");
    let loader = LocalLoader::new(missing, u64::MAX, "**/*.docx").unwrap();
    assert!(matches!(loader.list(), Err(Error::Config(_))));
}

#[test]
fn test_invalid_glob() {
    let temp_dir = TempDir::new().unwrap();
    assert!(matches!(
        LocalLoader::new(temp_dir.path(), u64::MAX, "[unclosed"),
        Err(Error::Config(_))
    ));
}

#[test]
fn test_load_and_resolve() {
    let temp_dir = TempDir::new().unwrap();
    write_template(temp_dir.path(), "epi/entrega.docx", b"bytes");
    let loader = LocalLoader::new(temp_dir.path(), 5, "**/*.docx").unwrap();

    assert_eq!(loader.load("epi/entrega.docx").unwrap(), b"bytes");
    assert_eq!(
        loader.resolve("epi/entrega.docx").unwrap(),
        temp_dir.path().join("epi/entrega.docx")
    );
    assert!(matches!(loader.load("epi"), Err(Error::TemplateNotFound { .. })));
    assert!(matches!(loader.load("../entrega.docx"), Err(Error::InvalidInput { .. })));

    write_template(temp_dir.path(), "grande.docx", b"too many bytes");
    assert!(matches!(
        loader.load("grande.docx"),
        Err(Error::TemplateTooLarge { size: 14, .. })
    ));
}
