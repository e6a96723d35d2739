//! Namespace-tolerant element lookup shared by all document parsers.
//!
//! Each document family declares its own schema namespace, and publishers
//! do not always agree on the exact URI. [`Resolver`] first matches
//! elements in the root element's namespace and falls back to a plain
//! local-name match when nothing in that namespace is found.
//!
//! Element names on the platform contain dots (e.g.
//! `inBiddingZone_Domain.mRID`), so paths are separated with `/`.

use roxmltree::{Document, Node};

use crate::ParseError;

/// Local name of the element carrying a platform-side error.
const REASON: &str = "Reason";

/// Local name of a series block.
pub const TIME_SERIES: &str = "TimeSeries";

/// Parses `text` into a DOM.
///
/// # Errors
///
/// Returns [`ParseError::Malformed`] if the text is not well-formed XML.
pub fn parse_document(text: &str) -> Result<Document<'_>, ParseError> {
    Document::parse(text).map_err(|e| ParseError::Malformed(e.to_string()))
}

/// Looks up elements by local name, preferring the document namespace.
#[derive(Debug, Clone, Copy)]
pub struct Resolver<'a> {
    namespace: Option<&'a str>,
}

impl<'a> Resolver<'a> {
    /// Creates a resolver bound to the namespace of the document's root
    /// element.
    #[must_use]
    pub fn for_document(doc: &'a Document<'_>) -> Self {
        Self {
            namespace: doc.root_element().tag_name().namespace(),
        }
    }

    fn is_named(node: Node<'_, '_>, local: &str) -> bool {
        node.is_element() && node.tag_name().name() == local
    }

    fn in_namespace(&self, node: Node<'_, '_>) -> bool {
        node.tag_name().namespace() == self.namespace
    }

    /// Direct children of `node` named `local`.
    #[must_use]
    pub fn children<'n, 'i>(&self, node: Node<'n, 'i>, local: &str) -> Vec<Node<'n, 'i>> {
        let named: Vec<_> = node
            .children()
            .filter(|c| Self::is_named(*c, local))
            .collect();

        if named.iter().any(|c| self.in_namespace(*c)) {
            named.into_iter().filter(|c| self.in_namespace(*c)).collect()
        } else {
            named
        }
    }

    /// First direct child of `node` named `local`.
    #[must_use]
    pub fn child<'n, 'i>(&self, node: Node<'n, 'i>, local: &str) -> Option<Node<'n, 'i>> {
        node.children()
            .find(|c| Self::is_named(*c, local) && self.in_namespace(*c))
            .or_else(|| node.children().find(|c| Self::is_named(*c, local)))
    }

    /// All descendants of `node` named `local`, in document order.
    #[must_use]
    pub fn descendants<'n, 'i>(&self, node: Node<'n, 'i>, local: &str) -> Vec<Node<'n, 'i>> {
        let named: Vec<_> = node
            .descendants()
            .filter(|c| *c != node && Self::is_named(*c, local))
            .collect();

        if named.iter().any(|c| self.in_namespace(*c)) {
            named.into_iter().filter(|c| self.in_namespace(*c)).collect()
        } else {
            named
        }
    }

    /// Follows a `/`-separated path of child names from `node`.
    #[must_use]
    pub fn find<'n, 'i>(&self, node: Node<'n, 'i>, path: &str) -> Option<Node<'n, 'i>> {
        path.split('/')
            .try_fold(node, |current, segment| self.child(current, segment))
    }

    /// Trimmed text of the element at `path`, or `None` if the element is
    /// missing or blank.
    #[must_use]
    pub fn text_at<'n>(&self, node: Node<'n, '_>, path: &str) -> Option<&'n str> {
        self.find(node, path)
            .and_then(|n| n.text())
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }

    /// Returns the first path in `paths` that yields text.
    #[must_use]
    pub fn first_text<'n>(&self, node: Node<'n, '_>, paths: &[String]) -> Option<&'n str> {
        paths.iter().find_map(|p| self.text_at(node, p))
    }
}

/// Fails if the document carries a platform error.
///
/// A `Reason` element counts as an error when it is not nested inside a
/// series block; series-level reasons annotate data and are ignored.
///
/// # Errors
///
/// Returns [`ParseError::InBand`] with the reason's code and text.
pub fn check_in_band_error(doc: &Document<'_>) -> Result<(), ParseError> {
    match in_band_reason(doc) {
        Some((code, text)) => Err(ParseError::InBand { code, text }),
        None => Ok(()),
    }
}

fn in_band_reason(doc: &Document<'_>) -> Option<(String, String)> {
    let resolver = Resolver::for_document(doc);
    let root = doc.root_element();

    resolver
        .descendants(root, REASON)
        .into_iter()
        .find(|reason| {
            !reason
                .ancestors()
                .any(|a| a.is_element() && a.tag_name().name() == TIME_SERIES)
        })
        .map(|reason| {
            (
                resolver.text_at(reason, "code").unwrap_or_default().to_string(),
                resolver.text_at(reason, "text").unwrap_or_default().to_string(),
            )
        })
}

/// Extracts a `code: text` summary from an error body, if it is XML with a
/// document-level `Reason`.
#[must_use]
pub fn reason_summary(body: &str) -> Option<String> {
    let doc = Document::parse(body).ok()?;
    in_band_reason(&doc).map(|(code, text)| format!("{code}: {text}").trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const ACK: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Acknowledgement_MarketDocument xmlns="urn:iec62325.351:tc57wg16:451-1:acknowledgementdocument:7:0">
  <mRID>abc</mRID>
  <Reason>
    <code>999</code>
    <text>No matching data found</text>
  </Reason>
</Acknowledgement_MarketDocument>"#;

    #[test]
    fn document_level_reason_is_an_error() {
        let doc = parse_document(ACK).unwrap();
        let err = check_in_band_error(&doc).unwrap_err();
        assert_eq!(
            err,
            ParseError::InBand {
                code: "999".to_string(),
                text: "No matching data found".to_string(),
            }
        );
        assert_eq!(
            reason_summary(ACK).as_deref(),
            Some("999: No matching data found")
        );
    }

    #[test]
    fn series_level_reason_is_ignored() {
        let xml = r#"<Doc xmlns="urn:x"><TimeSeries><Period><Point>
            <position>1</position><Reason><code>A03</code></Reason>
        </Point></Period></TimeSeries></Doc>"#;
        let doc = parse_document(xml).unwrap();
        assert!(check_in_band_error(&doc).is_ok());
    }

    #[test]
    fn prefers_document_namespace_then_local_name() {
        let xml = r#"<Doc xmlns="urn:a" xmlns:b="urn:b">
            <b:value>foreign</b:value>
            <value>own</value>
            <other xmlns="urn:c">only</other>
        </Doc>"#;
        let doc = parse_document(xml).unwrap();
        let r = Resolver::for_document(&doc);
        let root = doc.root_element();

        assert_eq!(r.text_at(root, "value"), Some("own"));
        assert_eq!(r.children(root, "value").len(), 1);
        assert_eq!(r.text_at(root, "other"), Some("only"));
        assert_eq!(r.text_at(root, "missing"), None);
    }

    #[test]
    fn follows_paths() {
        let xml = r"<Doc><Period><timeInterval><start> 2025-01-01T00:00Z </start></timeInterval></Period></Doc>";
        let doc = parse_document(xml).unwrap();
        let r = Resolver::for_document(&doc);
        let period = r.child(doc.root_element(), "Period").unwrap();
        assert_eq!(r.text_at(period, "timeInterval/start"), Some("2025-01-01T00:00Z"));
    }

    #[test]
    fn rejects_malformed_xml() {
        assert!(matches!(
            parse_document("<Doc><unclosed></Doc>"),
            Err(ParseError::Malformed(_))
        ));
    }
}
