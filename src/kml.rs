//! KML document parsing.
//!
//! Walks the document as a stream of namespace-resolved events and groups
//! every `Placemark/Point/coordinates` under the `Folder` elements that
//! enclose it. Only elements in the KML 2.2 namespace are considered.

use crate::error::{ConvertError, Result};
use crate::types::{Folder, GeoPoint, ParsedDocument};
use geo::Point;
use quick_xml::events::Event;
use quick_xml::name::{Namespace, ResolveResult};
use quick_xml::NsReader;
use serde::Deserialize;
use tracing::{debug, info, warn};

pub const KML_NAMESPACE: &str = "http://www.opengis.net/kml/2.2";
pub const UNNAMED_FOLDER: &str = "Unnamed";

/// What to do when two folders carry the same display name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicateFolders {
    /// Append the later folder's points to the first folder of that name.
    #[default]
    Merge,
    /// Fail the parse.
    Reject,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ParserOptions {
    pub duplicate_folders: DuplicateFolders,
    /// Fail on an undecodable coordinate string instead of skipping the point.
    pub strict_coordinates: bool,
}

enum Node {
    Folder(usize),
    Name(usize),
    Placemark,
    Point { consumed: bool },
    Coordinates,
    Other,
}

#[derive(Default)]
struct PendingFolder {
    name: Option<String>,
    /// Nearest enclosing folder, as an index into the pending list.
    parent: Option<usize>,
    points: Vec<GeoPoint>,
}

pub fn parse_document(text: &str, options: &ParserOptions) -> Result<ParsedDocument> {
    let mut reader = NsReader::from_str(text);

    let mut stack: Vec<Node> = Vec::new();
    let mut pending: Vec<PendingFolder> = Vec::new();
    let mut text_buf = String::new();
    let mut saw_root = false;

    loop {
        let (ns, event) = reader
            .read_resolved_event()
            .map_err(|e| ConvertError::Parse(e.to_string()))?;
        let in_kml = matches!(ns, ResolveResult::Bound(Namespace(n)) if n == KML_NAMESPACE.as_bytes());

        match event {
            Event::Start(e) => {
                saw_root = true;
                let node = if in_kml {
                    match e.local_name().as_ref() {
                        b"Folder" => {
                            let parent = stack.iter().rev().find_map(|n| match n {
                                Node::Folder(idx) => Some(*idx),
                                _ => None,
                            });
                            pending.push(PendingFolder {
                                parent,
                                ..PendingFolder::default()
                            });
                            Node::Folder(pending.len() - 1)
                        }
                        b"name" => match stack.last() {
                            Some(Node::Folder(idx)) => {
                                text_buf.clear();
                                Node::Name(*idx)
                            }
                            _ => Node::Other,
                        },
                        b"Placemark" => Node::Placemark,
                        b"Point" if stack.iter().any(|n| matches!(n, Node::Placemark)) => {
                            Node::Point { consumed: false }
                        }
                        b"coordinates" if awaiting_coordinates(&stack) => {
                            text_buf.clear();
                            Node::Coordinates
                        }
                        _ => Node::Other,
                    }
                } else {
                    Node::Other
                };
                stack.push(node);
            }
            Event::Empty(_) => saw_root = true,
            Event::Text(e) => {
                if matches!(stack.last(), Some(Node::Name(_) | Node::Coordinates)) {
                    let unescaped = e
                        .unescape()
                        .map_err(|e| ConvertError::Parse(e.to_string()))?;
                    text_buf.push_str(&unescaped);
                }
            }
            Event::CData(e) => {
                if matches!(stack.last(), Some(Node::Name(_) | Node::Coordinates)) {
                    let raw = e.into_inner();
                    let s = std::str::from_utf8(&raw)
                        .map_err(|e| ConvertError::Parse(e.to_string()))?;
                    text_buf.push_str(s);
                }
            }
            Event::End(_) => match stack.pop() {
                Some(Node::Name(idx)) => {
                    let folder = &mut pending[idx];
                    if folder.name.is_none() {
                        folder.name = Some(text_buf.trim().to_string());
                    }
                }
                Some(Node::Coordinates) => {
                    mark_point_consumed(&mut stack);
                    match parse_coordinate(&text_buf) {
                        Some(point) => {
                            for node in &stack {
                                if let Node::Folder(idx) = node {
                                    pending[*idx].points.push(point);
                                }
                            }
                        }
                        None if options.strict_coordinates => {
                            return Err(ConvertError::Parse(format!(
                                "invalid coordinate string `{}`",
                                text_buf.trim()
                            )));
                        }
                        None => warn!("Skipping point with invalid coordinates `{}`", text_buf.trim()),
                    }
                }
                Some(_) => {}
                None => return Err(ConvertError::Parse("unmatched closing tag".to_string())),
            },
            Event::Eof => break,
            _ => {}
        }
    }

    if !saw_root {
        return Err(ConvertError::Parse("document has no root element".to_string()));
    }
    if !stack.is_empty() {
        return Err(ConvertError::Parse(format!(
            "unexpected end of document with {} unclosed element(s)",
            stack.len()
        )));
    }

    let document = collect_folders(pending, options)?;
    info!(
        "Parsed {} folders with {} points",
        document.folders().len(),
        document.total_points()
    );
    Ok(document)
}

/// A `coordinates` element counts only as the first one inside its `Point`.
fn awaiting_coordinates(stack: &[Node]) -> bool {
    stack
        .iter()
        .rev()
        .find_map(|n| match n {
            Node::Point { consumed } => Some(!consumed),
            _ => None,
        })
        .unwrap_or(false)
}

fn mark_point_consumed(stack: &mut [Node]) {
    if let Some(Node::Point { consumed }) = stack
        .iter_mut()
        .rev()
        .find(|n| matches!(n, Node::Point { .. }))
    {
        *consumed = true;
    }
}

/// Resolves names and applies the duplicate policy. Under merge, a folder
/// nested in a folder already merged into the same output is skipped, since
/// its points were collected by the enclosing one.
fn collect_folders(pending: Vec<PendingFolder>, options: &ParserOptions) -> Result<ParsedDocument> {
    let mut folders: Vec<Folder> = Vec::new();
    // Output folder each pending folder ended up in, by pending index.
    let mut merged_into: Vec<Option<usize>> = Vec::with_capacity(pending.len());
    let parents: Vec<Option<usize>> = pending.iter().map(|f| f.parent).collect();

    for folder in pending {
        let name = match folder.name {
            Some(name) if !name.is_empty() => name,
            _ => UNNAMED_FOLDER.to_string(),
        };
        if folder.points.is_empty() {
            debug!("Dropping folder '{}' with no points", name);
            merged_into.push(None);
            continue;
        }

        match folders.iter().position(|f| f.name == name) {
            Some(_) if options.duplicate_folders == DuplicateFolders::Reject => {
                return Err(ConvertError::Parse(format!("duplicate folder name '{name}'")));
            }
            Some(existing) if merged_ancestor(&parents, &merged_into, folder.parent, existing) => {
                debug!("Folder '{}' is nested in a folder of the same name, not merging", name);
                merged_into.push(Some(existing));
            }
            Some(existing) => {
                debug!("Merging {} points into folder '{}'", folder.points.len(), name);
                folders[existing].points.extend(folder.points);
                merged_into.push(Some(existing));
            }
            None => {
                merged_into.push(Some(folders.len()));
                folders.push(Folder {
                    name,
                    points: folder.points,
                });
            }
        }
    }

    if folders.is_empty() {
        return Err(ConvertError::NoData);
    }
    Ok(ParsedDocument::new(folders))
}

/// Whether any folder enclosing `parent` (inclusive) went into output `target`.
fn merged_ancestor(
    parents: &[Option<usize>],
    merged_into: &[Option<usize>],
    mut parent: Option<usize>,
    target: usize,
) -> bool {
    while let Some(idx) = parent {
        if merged_into[idx] == Some(target) {
            return true;
        }
        parent = parents[idx];
    }
    false
}

/// Decodes `lon,lat[,alt]`. Altitude is dropped; anything else is invalid.
pub fn parse_coordinate(text: &str) -> Option<GeoPoint> {
    let fields = text
        .trim()
        .split(',')
        .map(|f| f.trim().parse::<f64>())
        .collect::<Result<Vec<_>, _>>()
        .ok()?;
    if !fields.iter().all(|v| v.is_finite()) {
        return None;
    }
    match fields.as_slice() {
        [lon, lat] | [lon, lat, _] => Some(Point::new(*lon, *lat)),
        _ => None,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn kml(body: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<kml xmlns="http://www.opengis.net/kml/2.2"><Document>{body}</Document></kml>"#
        )
    }

    pub(crate) fn folder(name: &str, coords: &[&str]) -> String {
        let placemarks: String = coords
            .iter()
            .map(|c| format!("<Placemark><Point><coordinates>{c}</coordinates></Point></Placemark>"))
            .collect();
        format!("<Folder><name>{name}</name>{placemarks}</Folder>")
    }

    fn parse(text: &str) -> Result<ParsedDocument> {
        parse_document(text, &ParserOptions::default())
    }

    #[test]
    fn test_folders_in_document_order() {
        let text = kml(&format!(
            "{}{}",
            folder("B", &["1,2", "3,4,100"]),
            folder("A", &["5,6"])
        ));
        let doc = parse(&text).unwrap();

        let names: Vec<_> = doc.folder_names().collect();
        assert_eq!(names, vec!["B", "A"]);
        assert_eq!(
            doc.folder("B").unwrap().points,
            vec![Point::new(1.0, 2.0), Point::new(3.0, 4.0)]
        );
        assert_eq!(doc.total_points(), 3);
    }

    #[test]
    fn test_placemarks_found_in_nested_groups() {
        let text = kml(
            "<Folder><name>Deep</name><Document><Placemark><MultiGeometry>\
             <Point><coordinates> 7.5, 8.5 </coordinates></Point>\
             </MultiGeometry></Placemark></Document></Folder>",
        );
        let doc = parse(&text).unwrap();
        assert_eq!(doc.folder("Deep").unwrap().points, vec![Point::new(7.5, 8.5)]);
    }

    #[test]
    fn test_nested_folder_points_belong_to_both() {
        let text = kml(&format!(
            "<Folder><name>Outer</name>{}</Folder>",
            folder("Inner", &["1,1"])
        ));
        let doc = parse(&text).unwrap();
        let names: Vec<_> = doc.folder_names().collect();
        assert_eq!(names, vec!["Outer", "Inner"]);
        assert_eq!(doc.folder("Outer").unwrap().points.len(), 1);
        assert_eq!(doc.folder("Inner").unwrap().points.len(), 1);
    }

    #[test]
    fn test_malformed_coordinate_is_skipped() {
        let text = kml(&format!(
            "{}{}",
            folder("Bad", &["notacoord"]),
            folder("Mixed", &["notacoord", "1,2"])
        ));
        let doc = parse(&text).unwrap();
        assert!(doc.folder("Bad").is_none());
        assert_eq!(doc.folder("Mixed").unwrap().points, vec![Point::new(1.0, 2.0)]);
    }

    #[test]
    fn test_strict_mode_rejects_malformed_coordinate() {
        let text = kml(&folder("Bad", &["notacoord", "1,2"]));
        let options = ParserOptions {
            strict_coordinates: true,
            ..Default::default()
        };
        let err = parse_document(&text, &options).unwrap_err();
        assert!(matches!(err, ConvertError::Parse(msg) if msg.contains("notacoord")));
    }

    #[test]
    fn test_missing_or_blank_name_is_unnamed() {
        let text = kml(
            "<Folder><Placemark><Point><coordinates>1,2</coordinates></Point></Placemark></Folder>\
             <Folder><name>   </name><Placemark><Point><coordinates>3,4</coordinates></Point></Placemark></Folder>",
        );
        let doc = parse(&text).unwrap();
        assert_eq!(doc.folders().len(), 1);
        assert_eq!(doc.folders()[0].name, UNNAMED_FOLDER);
        assert_eq!(doc.folders()[0].points.len(), 2);
    }

    #[test]
    fn test_name_is_trimmed_and_unescaped() {
        let text = kml(&folder("  Cafés &amp; Bars \n", &["1,2"]));
        let doc = parse(&text).unwrap();
        assert_eq!(doc.folders()[0].name, "Cafés & Bars");
    }

    #[test]
    fn test_placemark_name_is_not_folder_name() {
        let text = kml(
            "<Folder><Placemark><name>Pin</name><Point><coordinates>1,2</coordinates></Point></Placemark></Folder>",
        );
        let doc = parse(&text).unwrap();
        assert_eq!(doc.folders()[0].name, UNNAMED_FOLDER);
    }

    #[test]
    fn test_duplicate_names_merge_by_default() {
        let text = kml(&format!(
            "{}{}{}",
            folder("Dup", &["1,1"]),
            folder("Other", &["2,2"]),
            folder("Dup", &["3,3"])
        ));
        let doc = parse(&text).unwrap();
        let names: Vec<_> = doc.folder_names().collect();
        assert_eq!(names, vec!["Dup", "Other"]);
        assert_eq!(
            doc.folder("Dup").unwrap().points,
            vec![Point::new(1.0, 1.0), Point::new(3.0, 3.0)]
        );
    }

    #[test]
    fn test_nested_same_name_folder_counts_points_once() {
        let text = kml(&format!(
            "<Folder><name>X</name>\
             <Placemark><Point><coordinates>0,0</coordinates></Point></Placemark>\
             <Folder><name>Y</name>{}</Folder></Folder>{}",
            folder("X", &["1,1"]),
            folder("X", &["2,2"])
        ));
        let doc = parse(&text).unwrap();
        assert_eq!(doc.folder_names().collect::<Vec<_>>(), vec!["X", "Y"]);
        assert_eq!(
            doc.folder("X").unwrap().points,
            vec![Point::new(0.0, 0.0), Point::new(1.0, 1.0), Point::new(2.0, 2.0)]
        );
        assert_eq!(doc.folder("Y").unwrap().points, vec![Point::new(1.0, 1.0)]);
    }

    #[test]
    fn test_duplicate_names_rejected_when_configured() {
        let text = kml(&format!("{}{}", folder("Dup", &["1,1"]), folder("Dup", &["3,3"])));
        let options = ParserOptions {
            duplicate_folders: DuplicateFolders::Reject,
            ..Default::default()
        };
        assert!(matches!(
            parse_document(&text, &options),
            Err(ConvertError::Parse(_))
        ));
    }

    #[test]
    fn test_only_first_coordinates_per_point() {
        let text = kml(
            "<Folder><name>F</name><Placemark><Point>\
             <coordinates>1,2</coordinates><coordinates>9,9</coordinates>\
             </Point></Placemark></Folder>",
        );
        let doc = parse(&text).unwrap();
        assert_eq!(doc.folder("F").unwrap().points, vec![Point::new(1.0, 2.0)]);
    }

    #[test]
    fn test_cdata_coordinates() {
        let text = kml(&folder("F", &["<![CDATA[4,5,0]]>"]));
        let doc = parse(&text).unwrap();
        assert_eq!(doc.folder("F").unwrap().points, vec![Point::new(4.0, 5.0)]);
    }

    #[test]
    fn test_no_points_is_no_data() {
        let text = kml(&format!(
            "{}<Placemark><Point><coordinates>1,2</coordinates></Point></Placemark>",
            folder("Empty", &[])
        ));
        assert!(matches!(parse(&text), Err(ConvertError::NoData)));
    }

    #[test]
    fn test_foreign_namespace_ignored() {
        let text = r#"<kml xmlns="http://example.com/not-kml"><Folder><name>X</name>
            <Placemark><Point><coordinates>1,2</coordinates></Point></Placemark></Folder></kml>"#;
        assert!(matches!(parse(text), Err(ConvertError::NoData)));
    }

    #[test]
    fn test_malformed_xml_is_parse_error() {
        assert!(matches!(parse("<kml><Folder></kml>"), Err(ConvertError::Parse(_))));
        assert!(matches!(
            parse(r#"<kml xmlns="http://www.opengis.net/kml/2.2"><Folder>"#),
            Err(ConvertError::Parse(_))
        ));
        assert!(matches!(parse("not xml at all"), Err(ConvertError::Parse(_))));
    }

    #[test]
    fn test_parse_coordinate() {
        assert_eq!(parse_coordinate("1.5,-2.5"), Some(Point::new(1.5, -2.5)));
        assert_eq!(parse_coordinate(" 1 , 2 , 3 "), Some(Point::new(1.0, 2.0)));
        assert_eq!(parse_coordinate("1,2,3,4"), None);
        assert_eq!(parse_coordinate("1"), None);
        assert_eq!(parse_coordinate("1,NaN"), None);
        assert_eq!(parse_coordinate(""), None);
    }
}
