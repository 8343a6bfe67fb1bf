use std::io;

use docgen::error::{Error, PlaceholderError, PlaceholderErrorCode};

#[test]
fn test_error_conversion() {
    let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
    let err: Error = io_err.into();

    match err {
        Error::Io(_) => (),
        _ => panic!("Expected Io variant"),
    }
}

#[test]
fn test_error_display() {
    let err = Error::Config("invalid config".to_string());
    assert_eq!(err.to_string(), "Configuration error: invalid config.");

    let err = Error::TemplateNotFound {
        name: "a.docx".to_string(),
        path: "/t/a.docx".to_string(),
    };
    assert_eq!(err.to_string(), "Template 'a.docx' not found at '/t/a.docx'.");

    let err = Error::missing_fields(["templateName", "data"]);
    assert_eq!(
        err.to_string(),
        "Invalid input: missing required field(s): templateName, data."
    );
}

#[test]
fn test_placeholder_errors() {
    let errors = vec![
        PlaceholderError::new(
            "nome",
            PlaceholderErrorCode::UndefinedValue,
            "word/document.xml",
            "no value",
        ),
        PlaceholderError::new(
            "/itens",
            PlaceholderErrorCode::UnopenedLoop,
            "word/header1.xml",
            "no loop",
        ),
    ];
    assert_eq!(
        errors[0].to_string(),
        "undefined_value 'nome' in word/document.xml: no value"
    );

    let json = serde_json::to_value(&errors[1]).unwrap();
    assert_eq!(json["code"], "unopened_loop");
    assert_eq!(json["part"], "word/header1.xml");

    let err = Error::PlaceholderResolution(errors);
    assert_eq!(err.to_string(), "2 placeholder(s) could not be resolved.");
}
