//! Output document assembly.
//!
//! The output is built fresh; the template document is only read. Under the
//! output `Document` come, in order:
//!
//! 1. the template's non-marker children (name, styles, style maps, ...),
//! 2. the template's first path marker, its `LineString` coordinates replaced by
//!    the given points' coordinates, one tuple per line (or kept as they are
//!    when the path is not rebuilt),
//! 3. the point markers, either flat, inside one named `Folder`, or not at all.
//!
//! Markers and marker-holding folders of the template are never copied over as
//! such, so no marker can appear twice. Folders without markers are metadata.

use log::warn;

use crate::error::Result;
use crate::kml::{is_folder, is_marker, Element, KmlDocument, Node, WriteOptions};
use crate::MarkerRecord;

/// Default label of the folder holding grouped points.
pub const DEFAULT_GROUP_LABEL: &str = "Data Points";

/// Default name given to an unnamed path marker.
pub const DEFAULT_PATH_NAME: &str = "Track Path";

/// How point markers are placed in the output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PointLayout {
    /// Directly under `Document`, after the path
    Flat,
    /// Inside one `Folder` with the given name, after the path
    Grouped { label: String },
    /// Omitted; only the path is written
    Suppressed,
}

/// Configuration for reassembly.
#[derive(Debug, Clone)]
pub struct ReassemblyConfig {
    /// Default: grouped under "Data Points"
    pub layout: PointLayout,
    /// Name assigned to the path marker when it has none. Existing names are
    /// left alone. `None` leaves the path unnamed.
    /// Default: "Track Path"
    pub default_path_name: Option<String>,
    /// Replace the path coordinates with the given points. When false the
    /// template's path geometry is written unchanged.
    /// Default: true
    pub rebuild_path: bool,
}

impl Default for ReassemblyConfig {
    fn default() -> Self {
        Self {
            layout: PointLayout::Grouped {
                label: DEFAULT_GROUP_LABEL.to_string(),
            },
            default_path_name: Some(DEFAULT_PATH_NAME.to_string()),
            rebuild_path: true,
        }
    }
}

impl ReassemblyConfig {
    /// Flat points and no path naming: the layout written by merge and cull.
    pub fn flat() -> Self {
        Self {
            layout: PointLayout::Flat,
            default_path_name: None,
            rebuild_path: true,
        }
    }

    /// Finalize layout: grouped points, or none at all when `remove_points`.
    /// The path is named but its geometry is left as it is.
    pub fn finalize(remove_points: bool) -> Self {
        let layout = if remove_points {
            PointLayout::Suppressed
        } else {
            Self::default().layout
        };
        Self {
            layout,
            rebuild_path: false,
            ..Self::default()
        }
    }
}

/// A reassembled document, ready to serialize.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputDocument {
    /// Template root without children
    root: Element,
    /// Template `Document` without children
    document: Element,
    /// Non-marker children of the template `Document`
    metadata: Vec<Element>,
    path: Option<Element>,
    points: Vec<Element>,
    layout: PointLayout,
}

impl OutputDocument {
    pub fn path(&self) -> Option<&Element> {
        self.path.as_ref()
    }

    /// Point markers in output order (empty when suppressed).
    pub fn points(&self) -> &[Element] {
        &self.points
    }

    pub fn layout(&self) -> &PointLayout {
        &self.layout
    }

    /// Coordinate tuples of the path, one per line; empty without a path.
    pub fn path_coordinates(&self) -> Vec<&str> {
        self.path
            .as_ref()
            .and_then(|p| p.find(&["LineString", "coordinates"]))
            .map(|c| {
                c.children
                    .iter()
                    .filter_map(|node| match node {
                        Node::Text(t) => Some(t.as_str()),
                        Node::Element(_) => None,
                    })
                    .flat_map(str::lines)
                    .filter(|line| !line.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Build the full element tree.
    pub fn to_document(&self) -> KmlDocument {
        let mut document = self.document.clone();
        for element in &self.metadata {
            document.push(element.clone());
        }
        if let Some(path) = &self.path {
            document.push(path.clone());
        }
        match &self.layout {
            PointLayout::Flat => {
                for point in &self.points {
                    document.push(point.clone());
                }
            }
            PointLayout::Grouped { label } if !self.points.is_empty() => {
                let mut folder = Element::new(qualified(&document.name, "Folder"));
                folder.push(Element::with_text(qualified(&document.name, "name"), label));
                for point in &self.points {
                    folder.push(point.clone());
                }
                document.push(folder);
            }
            PointLayout::Grouped { .. } | PointLayout::Suppressed => {}
        }

        let mut root = self.root.clone();
        root.push(document);
        KmlDocument::from(root)
    }

    pub fn to_bytes(&self, options: &WriteOptions) -> Result<Vec<u8>> {
        self.to_document().to_bytes(options)
    }
}

/// Build the output document from a point sequence and a template.
///
/// Fails only if the template has no `Document` element. A template without a
/// path marker produces a warning and an output without a path.
pub fn reassemble<T: MarkerRecord>(
    points: &[T],
    template: &KmlDocument,
    config: &ReassemblyConfig,
) -> Result<OutputDocument> {
    let template_document = template.document()?;

    let metadata = template_document
        .elements()
        .filter(|e| !is_marker(e) && !(is_folder(e) && e.elements().any(is_marker)))
        .cloned()
        .collect();

    let path = match template.path_marker()? {
        Some(marker) => Some(rebuild_path(marker, points, config)),
        None => {
            warn!("[Reassemble] No LineString path found; writing points only");
            None
        }
    };

    let points = match config.layout {
        PointLayout::Suppressed => Vec::new(),
        _ => points.iter().map(|p| p.marker().clone()).collect(),
    };

    Ok(OutputDocument {
        root: template.root().shallow_clone(),
        document: template_document.shallow_clone(),
        metadata,
        path,
        points,
        layout: config.layout.clone(),
    })
}

fn rebuild_path<T: MarkerRecord>(marker: &Element, points: &[T], config: &ReassemblyConfig) -> Element {
    let mut path = marker.clone();
    if config.rebuild_path {
        replace_coordinates(&mut path, points);
    }

    if let Some(default_name) = &config.default_path_name {
        let unnamed = path.child("name").map_or(true, |n| n.text().trim().is_empty());
        if unnamed {
            path.children.retain(|node| !matches!(node, Node::Element(e) if e.local_name() == "name"));
            let name = qualified(&path.name, "name");
            path.children
                .insert(0, Node::Element(Element::with_text(name, default_name.as_str())));
        }
    }

    path
}

fn replace_coordinates<T: MarkerRecord>(path: &mut Element, points: &[T]) {
    let coordinates = points
        .iter()
        .map(|p| p.coordinates().trim())
        .collect::<Vec<_>>()
        .join("\n");

    if let Some(line) = path.child_mut("LineString") {
        match line.child_mut("coordinates") {
            Some(coords) => coords.set_text(coordinates),
            None => {
                let name = qualified(&line.name, "coordinates");
                line.push(Element::with_text(name, coordinates));
            }
        }
    }
}

/// `local` with the namespace prefix of `sibling`, if it has one.
fn qualified(sibling: &str, local: &str) -> String {
    match sibling.rsplit_once(':') {
        Some((prefix, _)) => format!("{prefix}:{local}"),
        None => local.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::collect_point_markers;
    use crate::PointMarker;

    const TEMPLATE: &str = r##"<kml xmlns="http://www.opengis.net/kml/2.2"><Document>
        <name>Export</name>
        <Style id="line"><LineStyle><width>4</width></LineStyle></Style>
        <Placemark><styleUrl>#line</styleUrl>
          <LineString><tessellate>1</tessellate><coordinates>9,9 8,8</coordinates></LineString>
        </Placemark>
        <Placemark><name>p1</name><Point><coordinates>1,1,0</coordinates></Point></Placemark>
        <Placemark><name>p2</name><Point><coordinates>2,2,0</coordinates></Point></Placemark>
        <Folder><name>Old</name>
          <Placemark><name>p3</name><Point><coordinates>3,3,0</coordinates></Point></Placemark>
        </Folder>
    </Document></kml>"##;

    fn template() -> KmlDocument {
        KmlDocument::parse(TEMPLATE).unwrap()
    }

    fn points(doc: &KmlDocument) -> Vec<PointMarker> {
        collect_point_markers(doc).unwrap()
    }

    fn child_names(doc: &KmlDocument) -> Vec<String> {
        doc.document()
            .unwrap()
            .elements()
            .map(|e| e.local_name().to_string())
            .collect()
    }

    #[test]
    fn test_flat_layout_order() {
        let doc = template();
        let out = reassemble(&points(&doc), &doc, &ReassemblyConfig::flat())
            .unwrap()
            .to_document();

        assert_eq!(
            child_names(&out),
            vec!["name", "Style", "Placemark", "Placemark", "Placemark", "Placemark"]
        );
        let markers = out.markers().unwrap();
        assert!(markers[0].child("LineString").is_some());
        assert_eq!(markers[3].child("name").unwrap().text(), "p3");
    }

    #[test]
    fn test_path_rebuilt_from_points() {
        let doc = template();
        let pts = points(&doc);
        let out = reassemble(&pts[..2], &doc, &ReassemblyConfig::flat()).unwrap();

        assert_eq!(out.path_coordinates(), vec!["1,1,0", "2,2,0"]);
        let path = out.path().unwrap();
        assert_eq!(path.child("styleUrl").unwrap().text(), "#line");
        assert_eq!(path.find(&["LineString", "tessellate"]).unwrap().text(), "1");
    }

    #[test]
    fn test_grouped_layout() {
        let doc = template();
        let out = reassemble(&points(&doc), &doc, &ReassemblyConfig::default())
            .unwrap()
            .to_document();

        assert_eq!(child_names(&out), vec!["name", "Style", "Placemark", "Folder"]);
        let folder = out.document().unwrap().child("Folder").unwrap();
        assert_eq!(folder.child("name").unwrap().text(), DEFAULT_GROUP_LABEL);
        assert_eq!(folder.children_named("Placemark").count(), 3);
    }

    #[test]
    fn test_grouped_without_points_has_no_folder() {
        let doc = template();
        let out = reassemble::<PointMarker>(&[], &doc, &ReassemblyConfig::default())
            .unwrap()
            .to_document();
        assert_eq!(child_names(&out), vec!["name", "Style", "Placemark"]);
    }

    #[test]
    fn test_suppressed_layout_keeps_path_geometry() {
        let doc = template();
        let out = reassemble(&points(&doc), &doc, &ReassemblyConfig::finalize(true)).unwrap();
        assert!(out.points().is_empty());
        assert_eq!(out.path_coordinates(), vec!["9,9 8,8"]);
        assert_eq!(child_names(&out.to_document()), vec!["name", "Style", "Placemark"]);
    }

    #[test]
    fn test_finalize_names_path_without_touching_geometry() {
        let doc = KmlDocument::parse(
            "<kml><Document><Placemark><LineString>\
             <coordinates>1,1,0\n2,2,0\n3,3,0</coordinates></LineString></Placemark></Document></kml>",
        )
        .unwrap();
        let out = reassemble(&points(&doc), &doc, &ReassemblyConfig::finalize(false)).unwrap();
        assert_eq!(out.path_coordinates(), vec!["1,1,0", "2,2,0", "3,3,0"]);
        assert_eq!(out.path().unwrap().child("name").unwrap().text(), DEFAULT_PATH_NAME);

        let rebuilt = reassemble(&points(&doc), &doc, &ReassemblyConfig::default()).unwrap();
        assert!(rebuilt.path_coordinates().is_empty());
    }

    #[test]
    fn test_folders_without_markers_are_metadata() {
        let with_overlay = TEMPLATE.replace(
            "<Folder><name>Old</name>",
            "<Folder><name>Overlays</name><GroundOverlay><name>map</name></GroundOverlay></Folder>\
             <Folder><name>Old</name>",
        );
        let doc = KmlDocument::parse(&with_overlay).unwrap();
        let out = reassemble(&points(&doc), &doc, &ReassemblyConfig::flat())
            .unwrap()
            .to_document();

        let folders: Vec<String> = out
            .document()
            .unwrap()
            .children_named("Folder")
            .map(|f| f.child("name").unwrap().text())
            .collect();
        assert_eq!(folders, vec!["Overlays"]);
        assert_eq!(out.markers().unwrap().len(), 4);
    }

    #[test]
    fn test_path_naming() {
        let doc = template();
        let out = reassemble(&points(&doc), &doc, &ReassemblyConfig::default()).unwrap();
        assert_eq!(out.path().unwrap().child("name").unwrap().text(), DEFAULT_PATH_NAME);

        let named = TEMPLATE.replace("<styleUrl>#line</styleUrl>", "<name>Morning ride</name>");
        let doc = KmlDocument::parse(&named).unwrap();
        let out = reassemble(&points(&doc), &doc, &ReassemblyConfig::default()).unwrap();
        assert_eq!(out.path().unwrap().child("name").unwrap().text(), "Morning ride");

        let out = reassemble(&points(&template()), &template(), &ReassemblyConfig::flat()).unwrap();
        assert!(out.path().unwrap().child("name").is_none());
    }

    #[test]
    fn test_missing_path_is_not_fatal() {
        let doc = KmlDocument::parse(
            "<kml><Document><Placemark><Point><coordinates>1,1</coordinates></Point></Placemark></Document></kml>",
        )
        .unwrap();
        let out = reassemble(&points(&doc), &doc, &ReassemblyConfig::flat()).unwrap();
        assert!(out.path().is_none());
        assert!(out.path_coordinates().is_empty());
        assert_eq!(out.points().len(), 1);
    }

    #[test]
    fn test_missing_coordinates_element_created() {
        let doc = KmlDocument::parse(
            "<kml><Document><Placemark><LineString/></Placemark>\
             <Placemark><Point><coordinates>5,6</coordinates></Point></Placemark></Document></kml>",
        )
        .unwrap();
        let out = reassemble(&points(&doc), &doc, &ReassemblyConfig::flat()).unwrap();
        assert_eq!(out.path_coordinates(), vec!["5,6"]);
    }

    #[test]
    fn test_reassembly_is_deterministic() {
        let doc = template();
        let pts = points(&doc);
        let config = ReassemblyConfig::default();
        let a = reassemble(&pts, &doc, &config).unwrap();
        let b = reassemble(&pts, &doc, &config).unwrap();
        assert_eq!(a, b);
        let expected: Vec<&str> = pts.iter().map(|p| p.coordinates.as_str()).collect();
        assert_eq!(a.path_coordinates(), expected);
    }

    #[test]
    fn test_prefixed_template_names() {
        let doc = KmlDocument::parse(
            r#"<k:kml xmlns:k="http://www.opengis.net/kml/2.2"><k:Document>
                <k:Placemark><k:LineString><k:coordinates/></k:LineString></k:Placemark>
                <k:Placemark><k:Point><k:coordinates>1,2</k:coordinates></k:Point></k:Placemark>
            </k:Document></k:kml>"#,
        )
        .unwrap();
        let out = reassemble(&points(&doc), &doc, &ReassemblyConfig::default()).unwrap();
        assert_eq!(out.path().unwrap().child("name").unwrap().name, "k:name");

        let rebuilt = out.to_document();
        let folder = rebuilt.document().unwrap().child("Folder").unwrap();
        assert_eq!(folder.name, "k:Folder");
    }
}
