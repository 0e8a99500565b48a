//! Comment document parser
//!
//! Turns a fetched payload into one of three shapes:
//! - a structured comment document
//! - an error document (the upstream rejected the content id)
//! - a malformed fallback (usually an HTML error page served instead of XML)

use crate::document::sanitize::sanitize;
use quick_xml::events::Event;
use quick_xml::Reader;
use scraper::{Html, Selector};
use serde::Deserialize;
use thiserror::Error;

/// Token the upstream puts in an otherwise empty document to reject a request
const ERROR_TOKEN: &[u8] = b"error";

/// A payload that is neither a comment document nor a usable fallback
#[derive(Debug, Error)]
#[error("{0}")]
pub struct ParseFailure(pub String);

/// One `<d>` node of a comment document, before it is typed
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CommentNode {
    /// Raw comma-separated `p` attribute
    #[serde(rename = "@p", default)]
    pub attributes: Option<String>,

    #[serde(rename = "$text", default)]
    pub text: String,
}

/// A parsed comment document
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CommentDocument {
    #[serde(rename = "chatid", default)]
    pub chat_id: Option<String>,

    #[serde(default)]
    pub mission: Option<String>,

    #[serde(rename = "maxlimit", default)]
    pub max_limit: Option<String>,

    #[serde(default)]
    pub max_count: Option<String>,

    #[serde(default)]
    pub source: Option<String>,

    /// Comment nodes in document order
    #[serde(rename = "d", default)]
    pub nodes: Vec<CommentNode>,
}

impl CommentDocument {
    /// Declared maximum number of entries a snapshot can hold
    ///
    /// Returns None when the element is absent, unparseable, or not positive.
    pub fn declared_max_limit(&self) -> Option<usize> {
        self.max_limit
            .as_deref()
            .and_then(|v| v.trim().parse::<usize>().ok())
            .filter(|&limit| limit > 0)
    }
}

/// Outcome of parsing a comment payload
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedResponse {
    Document(CommentDocument),

    /// The document's only root content is the token "error"
    ErrorDocument,

    /// Strict parsing failed but the payload reads as HTML
    MalformedFallback {
        /// Title of the HTML page, if any
        title: Option<String>,
    },
}

/// Shape of the root element gathered during the well-formedness pass
struct RootProbe {
    child_elements: usize,
    text: Vec<u8>,
}

impl RootProbe {
    fn is_error_token(&self) -> bool {
        self.child_elements == 0 && self.text.trim_ascii() == ERROR_TOKEN
    }
}

/// Checks well-formedness and records what sits directly under the root
fn probe_root(xml: &str) -> Result<RootProbe, String> {
    let mut reader = Reader::from_str(xml);
    let mut depth = 0usize;
    let mut saw_root = false;
    let mut probe = RootProbe {
        child_elements: 0,
        text: Vec::new(),
    };

    loop {
        match reader.read_event() {
            Ok(Event::Start(_)) | Ok(Event::Empty(_)) if depth == 0 && saw_root => {
                return Err("document has more than one root element".to_string());
            }
            Ok(Event::Start(_)) => {
                if depth == 1 {
                    probe.child_elements += 1;
                }
                saw_root = true;
                depth += 1;
            }
            Ok(Event::Empty(_)) => {
                if depth == 1 {
                    probe.child_elements += 1;
                }
                saw_root = true;
            }
            Ok(Event::End(_)) => depth = depth.saturating_sub(1),
            Ok(Event::Text(text)) if depth == 1 => probe.text.extend_from_slice(&text),
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(e.to_string()),
        }
    }

    if !saw_root {
        return Err("document has no root element".to_string());
    }
    if depth != 0 {
        return Err("document ended inside an open element".to_string());
    }

    Ok(probe)
}

/// Lenient second chance for payloads that are not XML
///
/// Any non-blank payload parses as HTML, which is how upstream error pages
/// show up.
fn parse_fallback(text: &str) -> Option<ParsedResponse> {
    if text.trim().is_empty() {
        return None;
    }

    let document = Html::parse_document(text);
    let title = Selector::parse("title").ok().and_then(|selector| {
        document
            .select(&selector)
            .next()
            .map(|element| element.text().collect::<String>().trim().to_string())
            .filter(|s| !s.is_empty())
    });

    Some(ParsedResponse::MalformedFallback { title })
}

/// Parses a live or historical comment payload
///
/// # Arguments
///
/// * `raw` - The payload exactly as fetched
///
/// # Returns
///
/// * `Ok(ParsedResponse)` - A document, an error document, or a fallback
/// * `Err(ParseFailure)` - The payload is neither XML nor readable as HTML
pub fn parse_comment_document(raw: &[u8]) -> Result<ParsedResponse, ParseFailure> {
    let text = sanitize(raw);

    let probe = match probe_root(&text) {
        Ok(probe) => probe,
        Err(xml_error) => {
            return parse_fallback(&text).ok_or_else(|| {
                ParseFailure(format!("payload is not a document: {}", xml_error))
            });
        }
    };

    if probe.is_error_token() {
        return Ok(ParsedResponse::ErrorDocument);
    }

    let document: CommentDocument = quick_xml::de::from_str(&text)
        .map_err(|e| ParseFailure(format!("unexpected document structure: {}", e)))?;

    Ok(ParsedResponse::Document(document))
}
