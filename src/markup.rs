//! WordprocessingML lexer.
//!
//! Splits an XML part into markup and run text, then finds `{...}` tags in
//! the text of `<w:t>` elements. Word routinely splits what the author typed
//! as one tag over several runs; a tag is moved whole into the run where it
//! starts and removed from the following runs.
use crate::constants::{TAG_CLOSE, TAG_OPEN};
use crate::error::{Error, PlaceholderError, PlaceholderErrorCode, Result};
use quick_xml::escape::unescape;
use quick_xml::events::Event;
use quick_xml::Reader;

/// Kind of an XML markup token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XmlTagKind {
    Open,
    Close,
    SelfClosing,
    /// Declarations, comments, processing instructions, CDATA
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlTag {
    pub name: String,
    pub kind: XmlTagKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagKind {
    /// `{expr}`
    Placeholder,
    /// `{#expr}`
    LoopOpen,
    /// `{^expr}`
    InvertedOpen,
    /// `{/expr}` or `{/}`
    LoopClose,
}

/// A template tag found in run text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateTag {
    pub kind: TagKind,
    /// Expression text without the kind prefix
    pub expression: String,
    /// Tag text as written, without delimiters
    pub id: String,
}

impl TemplateTag {
    fn classify(raw: &str) -> Self {
        let id = raw.trim().to_string();
        let (kind, rest) = match id.chars().next() {
            Some('#') => (TagKind::LoopOpen, &id[1..]),
            Some('^') => (TagKind::InvertedOpen, &id[1..]),
            Some('/') => (TagKind::LoopClose, &id[1..]),
            _ => (TagKind::Placeholder, id.as_str()),
        };
        let expression = rest.trim().to_string();
        Self {
            kind,
            expression,
            id,
        }
    }
}

/// A lexed piece of an XML part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Part {
    /// Emitted verbatim
    Markup { raw: String, tag: Option<XmlTag> },
    /// Unescaped literal run text
    Text(String),
    Tag(TemplateTag),
}

impl Part {
    pub fn xml_tag(&self) -> Option<&XmlTag> {
        match self {
            Part::Markup { tag, .. } => tag.as_ref(),
            _ => None,
        }
    }
}

/// Result of lexing one archive part.
#[derive(Debug, Default)]
pub struct LexedPart {
    pub parts: Vec<Part>,
    /// Unbalanced delimiter errors
    pub errors: Vec<PlaceholderError>,
}

enum RawNode<'a> {
    Element { raw: &'a str, tag: XmlTag },
    Text(&'a str),
}

fn element<'a>(raw: &'a str, name: &[u8], kind: XmlTagKind) -> RawNode<'a> {
    let name = String::from_utf8_lossy(name).into_owned();
    RawNode::Element {
        raw,
        tag: XmlTag { name, kind },
    }
}

/// Splits raw XML into element and text nodes, keeping every input byte.
///
/// # Errors
/// * `Error::Archive` if the part is not well-formed XML
fn segment<'a>(part_name: &str, xml: &'a str) -> Result<Vec<RawNode<'a>>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().check_end_names = true;

    let mut nodes = Vec::new();
    let mut depth = 0usize;
    loop {
        let start = reader.buffer_position() as usize;
        let event = reader.read_event().map_err(|e| {
            Error::Archive(format!(
                "malformed XML in '{part_name}' near byte {start}: {e}"
            ))
        })?;
        let raw = &xml[start..reader.buffer_position() as usize];

        let node = match event {
            Event::Eof => break,
            Event::Text(_) => RawNode::Text(raw),
            Event::Start(e) => {
                depth += 1;
                element(raw, e.name().as_ref(), XmlTagKind::Open)
            }
            Event::End(e) => {
                depth = depth.saturating_sub(1);
                element(raw, e.name().as_ref(), XmlTagKind::Close)
            }
            Event::Empty(e) => element(raw, e.name().as_ref(), XmlTagKind::SelfClosing),
            _ => element(raw, b"", XmlTagKind::Other),
        };
        nodes.push(node);
    }

    if depth > 0 {
        return Err(Error::Archive(format!(
            "malformed XML in '{part_name}': {depth} element(s) never closed"
        )));
    }
    Ok(nodes)
}

fn is_text_element(tag: &XmlTag, kind: XmlTagKind) -> bool {
    tag.name == "w:t" && tag.kind == kind
}

enum Piece {
    Literal(String),
    Tag(TemplateTag),
}

/// Lexes an XML part into markup, literal run text and template tags.
///
/// # Errors
/// * `Error::Archive` if the XML cannot be segmented or run text has invalid entities
pub fn lex(part_name: &str, xml: &str) -> Result<LexedPart> {
    let nodes = segment(part_name, xml)?;
    let mut errors = Vec::new();

    // Unescaped text of every node directly inside a <w:t> element
    let mut run_texts: Vec<Option<String>> = Vec::with_capacity(nodes.len());
    let mut in_text = false;
    for node in &nodes {
        match node {
            RawNode::Element { tag, .. } => {
                if is_text_element(tag, XmlTagKind::Open) {
                    in_text = true;
                } else if is_text_element(tag, XmlTagKind::Close) {
                    in_text = false;
                }
                run_texts.push(None);
            }
            RawNode::Text(raw) if in_text => {
                let text = unescape(raw).map_err(|e| {
                    Error::Archive(format!("invalid text in '{part_name}': {e}"))
                })?;
                run_texts.push(Some(text.into_owned()));
            }
            RawNode::Text(_) => run_texts.push(None),
        }
    }

    let mut pieces: Vec<Vec<Piece>> = run_texts.iter().map(|_| Vec::new()).collect();
    let mut open: Option<(usize, String)> = None;
    for (index, text) in run_texts.iter().enumerate() {
        let Some(text) = text else { continue };
        let mut literal = String::new();
        for c in text.chars() {
            match open.as_mut() {
                Some((start, buffer)) => {
                    if c == TAG_CLOSE {
                        let tag = TemplateTag::classify(buffer);
                        pieces[*start].push(Piece::Tag(tag));
                        open = None;
                    } else {
                        buffer.push(c);
                    }
                }
                None if c == TAG_OPEN => {
                    if !literal.is_empty() {
                        pieces[index].push(Piece::Literal(std::mem::take(&mut literal)));
                    }
                    open = Some((index, String::new()));
                }
                None => {
                    if c == TAG_CLOSE {
                        let context: String = literal.chars().rev().take(20).collect();
                        let context: String = context.chars().rev().collect();
                        errors.push(PlaceholderError::new(
                            format!("{context}{TAG_CLOSE}"),
                            PlaceholderErrorCode::UnopenedTag,
                            part_name,
                            format!("Closing delimiter '{TAG_CLOSE}' has no opening delimiter"),
                        ));
                    }
                    literal.push(c);
                }
            }
        }
        if !literal.is_empty() {
            pieces[index].push(Piece::Literal(literal));
        }
    }
    if let Some((_, buffer)) = open {
        errors.push(PlaceholderError::new(
            buffer.trim(),
            PlaceholderErrorCode::UnclosedTag,
            part_name,
            format!("Tag '{TAG_OPEN}{}' is never closed with '{TAG_CLOSE}'", buffer.trim()),
        ));
    }

    let mut parts = Vec::with_capacity(nodes.len());
    for (index, node) in nodes.into_iter().enumerate() {
        match node {
            RawNode::Element { raw, tag } => {
                let holds_tag = pieces
                    .get(index + 1)
                    .is_some_and(|p| p.iter().any(|piece| matches!(piece, Piece::Tag(_))));
                let raw = if holds_tag && is_text_element(&tag, XmlTagKind::Open) {
                    preserve_space(raw)
                } else {
                    raw.to_string()
                };
                parts.push(Part::Markup {
                    raw,
                    tag: Some(tag),
                });
            }
            RawNode::Text(raw) => {
                if run_texts[index].is_none() {
                    parts.push(Part::Markup {
                        raw: raw.to_string(),
                        tag: None,
                    });
                    continue;
                }
                for piece in std::mem::take(&mut pieces[index]) {
                    parts.push(match piece {
                        Piece::Literal(text) => Part::Text(text),
                        Piece::Tag(tag) => Part::Tag(tag),
                    });
                }
            }
        }
    }

    Ok(LexedPart { parts, errors })
}

/// Ensures a `<w:t>` start tag keeps leading and trailing spaces of substituted values.
fn preserve_space(raw: &str) -> String {
    if raw.contains("xml:space") {
        return raw.to_string();
    }
    match raw.strip_suffix('>') {
        Some(head) => format!("{head} xml:space=\"preserve\">"),
        None => raw.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(lexed: &LexedPart) -> Vec<&TemplateTag> {
        lexed
            .parts
            .iter()
            .filter_map(|p| match p {
                Part::Tag(tag) => Some(tag),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_segment_kinds() {
        let xml = "<?xml version=\"1.0\"?><w:p><w:r><w:br/><w:t xml:space=\"preserve\">a</w:t></w:r></w:p>";
        let nodes = segment("word/document.xml", xml).unwrap();
        let kinds: Vec<_> = nodes
            .iter()
            .filter_map(|n| match n {
                RawNode::Element { tag, .. } => Some((tag.name.as_str(), tag.kind)),
                RawNode::Text(_) => None,
            })
            .collect();
        assert_eq!(
            kinds,
            vec![
                ("", XmlTagKind::Other),
                ("w:p", XmlTagKind::Open),
                ("w:r", XmlTagKind::Open),
                ("w:br", XmlTagKind::SelfClosing),
                ("w:t", XmlTagKind::Open),
                ("w:t", XmlTagKind::Close),
                ("w:r", XmlTagKind::Close),
                ("w:p", XmlTagKind::Close),
            ]
        );
        let rebuilt: String = nodes
            .iter()
            .map(|n| match n {
                RawNode::Element { raw, .. } | RawNode::Text(raw) => *raw,
            })
            .collect();
        assert_eq!(rebuilt, xml);
    }

    #[test]
    fn test_classify() {
        assert_eq!(TemplateTag::classify(" #itens ").kind, TagKind::LoopOpen);
        assert_eq!(TemplateTag::classify("#itens").expression, "itens");
        assert_eq!(TemplateTag::classify("/itens").kind, TagKind::LoopClose);
        assert_eq!(TemplateTag::classify("^itens").kind, TagKind::InvertedOpen);
        assert_eq!(TemplateTag::classify("nome").kind, TagKind::Placeholder);
    }

    #[test]
    fn test_split_run_tag_is_recovered() {
        let xml = "<w:p><w:r><w:t>Nome: {nome</w:t></w:r><w:r><w:t>Colab</w:t></w:r>\
                   <w:r><w:t>orador}!</w:t></w:r></w:p>";
        let lexed = lex("word/document.xml", xml).unwrap();
        assert!(lexed.errors.is_empty());
        let found = tags(&lexed);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].expression, "nomeColaborador");
        let texts: Vec<_> = lexed
            .parts
            .iter()
            .filter_map(|p| match p {
                Part::Text(t) => Some(t.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(texts, vec!["Nome: ", "!"]);
        assert!(lexed.parts.contains(&Part::Markup {
            raw: "<w:t xml:space=\"preserve\">".to_string(),
            tag: Some(XmlTag {
                name: "w:t".to_string(),
                kind: XmlTagKind::Open,
            }),
        }));
    }

    #[test]
    fn test_text_outside_runs_is_markup() {
        let xml = "<w:p><w:instrText>{not_a_tag}</w:instrText><w:r><w:t>a &amp; b</w:t></w:r></w:p>";
        let lexed = lex("word/document.xml", xml).unwrap();
        assert!(tags(&lexed).is_empty());
        assert!(lexed.parts.contains(&Part::Text("a & b".to_string())));
    }

    #[test]
    fn test_unbalanced_delimiters() {
        let lexed = lex("word/document.xml", "<w:t>x} {open</w:t>").unwrap();
        let codes: Vec<_> = lexed.errors.iter().map(|e| e.code).collect();
        assert_eq!(
            codes,
            vec![PlaceholderErrorCode::UnopenedTag, PlaceholderErrorCode::UnclosedTag]
        );
    }

    #[test]
    fn test_malformed_markup() {
        assert!(matches!(lex("word/document.xml", "<w:p><w:r"), Err(Error::Archive(_))));
        assert!(matches!(
            lex("word/document.xml", "<w:p><w:r></w:p></w:r>"),
            Err(Error::Archive(_))
        ));
        assert!(matches!(lex("word/document.xml", "<w:p><w:r></w:r>"), Err(Error::Archive(_))));
    }

    #[test]
    fn test_attribute_with_angle_bracket() {
        let lexed = lex("word/document.xml", "<a b=\"x>y\"><w:t>{v}</w:t></a>").unwrap();
        assert_eq!(tags(&lexed).len(), 1);
    }
}
