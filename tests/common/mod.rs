#![allow(dead_code)]

use regex::Regex;
use std::io::{Cursor, Read, Write};
use std::path::Path;
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="xml" ContentType="application/xml"/></Types>"#;

pub fn paragraph(text: &str) -> String {
    format!("<w:p><w:r><w:t>{text}</w:t></w:r></w:p>")
}

/// A table row with one single-run paragraph per cell.
pub fn row(cells: &[&str]) -> String {
    let cells: String = cells
        .iter()
        .map(|c| format!("<w:tc>{}</w:tc>", paragraph(c)))
        .collect();
    format!("<w:tr>{cells}</w:tr>")
}

pub fn document(body: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{body}</w:body></w:document>"#
    )
}

pub fn header(body: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:hdr xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">{body}</w:hdr>"#
    )
}

/// Builds an in-memory DOCX from `(part name, content)` pairs.
pub fn docx(parts: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();
    writer.start_file("[Content_Types].xml", options).unwrap();
    writer.write_all(CONTENT_TYPES.as_bytes()).unwrap();
    for (name, content) in parts {
        writer.start_file(*name, options).unwrap();
        writer.write_all(content.as_bytes()).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

/// Template with a single main document part.
pub fn simple_docx(body: &str) -> Vec<u8> {
    docx(&[("word/document.xml", &document(body))])
}

pub fn write_template(dir: &Path, name: &str, bytes: &[u8]) {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, bytes).unwrap();
}

pub fn read_part(bytes: &[u8], name: &str) -> String {
    let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
    let mut file = archive.by_name(name).unwrap();
    let mut content = String::new();
    file.read_to_string(&mut content).unwrap();
    content
}

pub fn entry_names(bytes: &[u8]) -> Vec<String> {
    let archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
    archive.file_names().map(str::to_string).collect()
}

/// Concatenated `w:t` contents of a part.
pub fn visible_text(xml: &str) -> String {
    let re = Regex::new(r"<w:t(?:\s[^>]*)?>([^<]*)</w:t>").unwrap();
    re.captures_iter(xml).map(|c| c[1].to_string()).collect()
}

/// Panics unless `xml` parses with matching end tags.
pub fn assert_well_formed(xml: &str) {
    let mut reader = quick_xml::Reader::from_str(xml);
    loop {
        match reader.read_event() {
            Ok(quick_xml::events::Event::Eof) => break,
            Ok(_) => {}
            Err(e) => panic!("generated part is not well-formed: {e}"),
        }
    }
}

/// The running example: an equipment withdrawal form.
pub fn termo_retirada() -> Vec<u8> {
    let body = [
        paragraph("TERMO DE RETIRADA DE EPI"),
        paragraph("Colaborador: {nomeColaborador}"),
        paragraph("Matrícula: {matricula}"),
        format!(
            "<w:tbl>{}{}</w:tbl>",
            row(&["Descrição", "Qtd", "Estado"]),
            row(&["{#itens}{descricao}", "{quantidade}", "{estado}{/itens}"])
        ),
        paragraph("Total de itens: {totalItens}"),
        paragraph("{#observacoes}Obs: {observacoes}{/observacoes}"),
        paragraph("Data: {data}"),
    ]
    .concat();
    docx(&[
        ("word/document.xml", &document(&body)),
        ("word/header1.xml", &header(&paragraph("{empresa}"))),
        ("word/styles.xml", "<w:styles/>"),
    ])
}
