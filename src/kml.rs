//! # KML Document Model
//!
//! A small owned element tree over [`quick_xml`], just rich enough to read track
//! exports, pick out their markers and write a rebuilt document back out.
//!
//! Element lookups match on the *local* name (`kml:Placemark` and `Placemark`
//! are the same marker), so documents using a prefixed KML namespace are read
//! the same way as the usual default-namespace exports. Names and attributes are
//! written back exactly as read; the serializer never introduces prefixes.
//!
//! Whitespace-only text is dropped on read and the writer re-indents the output.

use std::fs;
use std::path::Path;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::error::{Result, TrackMergeError};

/// Default KML 2.2 namespace.
pub const KML_NAMESPACE: &str = "http://www.opengis.net/kml/2.2";

// =============================================================================
// Element Tree
// =============================================================================

/// A child of an [`Element`].
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Element(Element),
    Text(String),
}

/// An XML element with its attributes and children in document order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Element {
    /// Qualified name as it appeared in the source (prefix kept)
    pub name: String,
    /// Attributes in source order, values unescaped
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    /// Create an empty element.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Create an element holding a single text node.
    pub fn with_text(name: impl Into<String>, text: impl Into<String>) -> Self {
        let mut element = Self::new(name);
        element.children.push(Node::Text(text.into()));
        element
    }

    /// Name without any namespace prefix.
    pub fn local_name(&self) -> &str {
        local_part(&self.name)
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Iterate over child elements, skipping text.
    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(e) => Some(e),
            Node::Text(_) => None,
        })
    }

    /// Iterate over child elements with the given local name.
    pub fn children_named<'a, 'b>(&'a self, local: &'b str) -> impl Iterator<Item = &'a Element> + 'b
    where
        'a: 'b,
    {
        self.elements().filter(move |e| e.local_name() == local)
    }

    /// First child element with the given local name.
    pub fn child(&self, local: &str) -> Option<&Element> {
        self.elements().find(|e| e.local_name() == local)
    }

    pub fn child_mut(&mut self, local: &str) -> Option<&mut Element> {
        self.children.iter_mut().find_map(|node| match node {
            Node::Element(e) if e.local_name() == local => Some(e),
            _ => None,
        })
    }

    /// Follow a chain of local names, taking the first match at each level.
    pub fn find(&self, path: &[&str]) -> Option<&Element> {
        path.iter().try_fold(self, |el, name| el.child(name))
    }

    pub fn find_mut(&mut self, path: &[&str]) -> Option<&mut Element> {
        let mut current = self;
        for name in path {
            current = current.child_mut(name)?;
        }
        Some(current)
    }

    /// Concatenated text of the direct text children.
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|node| match node {
                Node::Text(t) => Some(t.as_str()),
                Node::Element(_) => None,
            })
            .collect()
    }

    /// Replace all direct text children with `text`.
    pub fn set_text(&mut self, text: impl Into<String>) {
        self.children.retain(|node| matches!(node, Node::Element(_)));
        self.children.insert(0, Node::Text(text.into()));
    }

    pub fn push(&mut self, child: Element) {
        self.children.push(Node::Element(child));
    }

    /// Copy of this element with its name and attributes but no children.
    pub fn shallow_clone(&self) -> Element {
        Element {
            name: self.name.clone(),
            attributes: self.attributes.clone(),
            children: Vec::new(),
        }
    }
}

fn local_part(name: &str) -> &str {
    name.rsplit(':').next().unwrap_or(name)
}

// =============================================================================
// Documents and Markers
// =============================================================================

/// What a marker (`Placemark`) draws.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerKind {
    /// Carries a `LineString`: the track path
    Path,
    /// Carries a `Point`
    Point,
    Other,
}

/// Classify a marker by its geometry. A line geometry wins over a point.
pub fn classify(marker: &Element) -> MarkerKind {
    if marker.child("LineString").is_some() {
        MarkerKind::Path
    } else if marker.child("Point").is_some() {
        MarkerKind::Point
    } else {
        MarkerKind::Other
    }
}

pub(crate) fn is_marker(element: &Element) -> bool {
    element.local_name() == "Placemark"
}

pub(crate) fn is_folder(element: &Element) -> bool {
    element.local_name() == "Folder"
}

/// A parsed KML file.
#[derive(Debug, Clone, PartialEq)]
pub struct KmlDocument {
    root: Element,
}

impl KmlDocument {
    /// Parse a document from a string.
    pub fn parse(xml: &str) -> Result<Self> {
        Ok(Self {
            root: parse_element_tree(xml)?,
        })
    }

    /// Read and parse a document from disk.
    pub fn read(path: &Path) -> Result<Self> {
        let xml = fs::read_to_string(path).map_err(|e| TrackMergeError::io(path, e))?;
        Self::parse(&xml)
    }

    pub fn root(&self) -> &Element {
        &self.root
    }

    /// The `Document` element under the root.
    pub fn document(&self) -> Result<&Element> {
        self.root
            .child("Document")
            .ok_or(TrackMergeError::MissingDocument)
    }

    /// All markers of the document in document order: direct `Placemark`
    /// children of `Document`, plus those inside its `Folder` children.
    pub fn markers(&self) -> Result<Vec<&Element>> {
        let document = self.document()?;
        let mut markers = Vec::new();
        for element in document.elements() {
            if is_marker(element) {
                markers.push(element);
            } else if is_folder(element) {
                markers.extend(element.elements().filter(|e| is_marker(e)));
            }
        }
        Ok(markers)
    }

    /// The first marker carrying a line geometry, in [`markers`](Self::markers)
    /// order. Any further line markers are ignored.
    pub fn path_marker(&self) -> Result<Option<&Element>> {
        Ok(self
            .markers()?
            .into_iter()
            .find(|m| classify(m) == MarkerKind::Path))
    }

    /// Serialize the document.
    pub fn to_bytes(&self, options: &WriteOptions) -> Result<Vec<u8>> {
        write_element_tree(&self.root, options)
    }

    pub fn into_root(self) -> Element {
        self.root
    }
}

impl From<Element> for KmlDocument {
    fn from(root: Element) -> Self {
        Self { root }
    }
}

// =============================================================================
// Reading
// =============================================================================

fn parse_element_tree(xml: &str) -> Result<Element> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        match reader.read_event()? {
            Event::Start(start) => stack.push(start_element(&start)?),
            Event::Empty(start) => {
                let element = start_element(&start)?;
                attach(&mut stack, &mut root, element)?;
            }
            Event::End(_) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| TrackMergeError::Malformed("unexpected closing tag".into()))?;
                attach(&mut stack, &mut root, element)?;
            }
            Event::Text(text) => {
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(Node::Text(text.unescape()?.into_owned()));
                }
            }
            Event::CData(data) => {
                if let Some(parent) = stack.last_mut() {
                    parent
                        .children
                        .push(Node::Text(String::from_utf8_lossy(&data).into_owned()));
                }
            }
            Event::Eof => break,
            // Declarations, comments, processing instructions and doctypes are not kept
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(TrackMergeError::Malformed(format!(
            "unclosed element <{}>",
            open.name
        )));
    }
    root.ok_or_else(|| TrackMergeError::Malformed("no root element".into()))
}

fn start_element(start: &BytesStart<'_>) -> Result<Element> {
    let mut element = Element::new(String::from_utf8_lossy(start.name().as_ref()));
    for attr in start.attributes() {
        let attr = attr.map_err(quick_xml::Error::from)?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr.unescape_value()?.into_owned();
        element.attributes.push((key, value));
    }
    Ok(element)
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, element: Element) -> Result<()> {
    match stack.last_mut() {
        Some(parent) => parent.push(element),
        None if root.is_none() => *root = Some(element),
        None => {
            return Err(TrackMergeError::Malformed(
                "more than one root element".into(),
            ))
        }
    }
    Ok(())
}

// =============================================================================
// Writing
// =============================================================================

/// Serializer settings.
#[derive(Debug, Clone)]
pub struct WriteOptions {
    /// Namespace declared as `xmlns` on the root when the root declares none.
    /// Default: the KML 2.2 namespace
    pub default_namespace: Option<String>,
    /// Spaces per indentation level; 0 writes everything on one line.
    /// Default: 2
    pub indent: usize,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            default_namespace: Some(KML_NAMESPACE.to_string()),
            indent: 2,
        }
    }
}

fn write_element_tree(root: &Element, options: &WriteOptions) -> Result<Vec<u8>> {
    let mut writer = if options.indent > 0 {
        Writer::new_with_indent(Vec::new(), b' ', options.indent)
    } else {
        Writer::new(Vec::new())
    };

    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let namespace = options
        .default_namespace
        .as_deref()
        .filter(|_| root.attribute("xmlns").is_none());
    write_element(&mut writer, root, namespace)?;

    let mut bytes = writer.into_inner();
    bytes.push(b'\n');
    Ok(bytes)
}

fn write_element<W: std::io::Write>(
    writer: &mut Writer<W>,
    element: &Element,
    namespace: Option<&str>,
) -> Result<()> {
    let mut start = BytesStart::new(element.name.as_str());
    if let Some(ns) = namespace {
        start.push_attribute(("xmlns", ns));
    }
    for (key, value) in &element.attributes {
        start.push_attribute((key.as_str(), value.as_str()));
    }

    if element.children.is_empty() {
        writer.write_event(Event::Empty(start))?;
        return Ok(());
    }

    writer.write_event(Event::Start(start))?;
    for child in &element.children {
        match child {
            Node::Element(e) => write_element(writer, e, None)?,
            Node::Text(t) => writer.write_event(Event::Text(BytesText::new(t)))?,
        }
    }
    writer.write_event(Event::End(BytesEnd::new(element.name.as_str())))?;
    Ok(())
}
