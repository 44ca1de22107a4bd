//! `ZISRAWMETADATA` payload: an XML document describing the acquisition.
//!
//! Every element and attribute is flattened into the property table under a
//! `zeiss.` prefix, dot-joining the path from the document root. Sibling
//! identity is the tag name plus its `Id` attribute when present (CZI
//! disambiguates same-tag siblings this way, e.g. `<Distance Id="X">` vs.
//! `<Distance Id="Y">` under `<Scaling><Items>`); where a tag repeats under
//! the same parent with no distinguishing `Id`, only the first occurrence is
//! flattened — later siblings would otherwise overwrite the first under the
//! same key, silently discarding data, so they're skipped rather than
//! clobbering.

use std::collections::{HashMap, HashSet};

use quick_xml::events::Event;
use quick_xml::reader::Reader;

use crate::error::{CziError, DataError};
use crate::property::PropertyTable;

const PROPERTY_PREFIX: &str = "zeiss";

/// Fields pulled out of the flattened property table because callers need
/// them as typed values, not strings, to build the pyramid.
#[derive(Debug, Clone, Default)]
pub struct ImageMetadata {
    pub size_x: Option<i64>,
    pub size_y: Option<i64>,
    pub size_c: Option<i64>,
    pub size_z: Option<i64>,
    pub size_s: Option<i64>,
    pub scaling_x_um: Option<f64>,
    pub scaling_y_um: Option<f64>,
    /// `ObjectiveSettings/ObjectiveRef`'s `Id` attribute, naming which
    /// `Objectives/Objective` entry is in use.
    objective_ref: Option<String>,
    /// `Objective` `Id` -> `NominalMagnification`, collected from every
    /// `<Objective>` entry regardless of which one is active.
    objective_power_by_id: HashMap<String, f64>,
}

impl ImageMetadata {
    /// The active objective's nominal magnification, resolved via
    /// `ObjectiveSettings/ObjectiveRef`'s `Id` attribute.
    pub fn objective_power(&self) -> Option<f64> {
        let id = self.objective_ref.as_deref()?;
        self.objective_power_by_id.get(id).copied()
    }
}

struct Frame {
    children_seen: HashSet<String>,
    skip: bool,
    id_attr: Option<String>,
}

/// Parse the metadata XML, populating `properties` and returning the typed
/// fields the pyramid builder needs.
pub fn parse_metadata_xml(xml: &str, properties: &mut PropertyTable) -> Result<ImageMetadata, CziError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text = true;

    let mut path: Vec<String> = Vec::new();
    let mut stack: Vec<Frame> = Vec::new();
    let mut meta = ImageMetadata::default();

    loop {
        let event = reader
            .read_event()
            .map_err(|e| DataError::XmlParse(e.to_string()))?;

        match event {
            Event::Eof => break,

            Event::Start(e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                let id_attr = find_id_attr(&e)?;
                let skip = push_frame(&mut stack, &name, id_attr.as_deref());
                path.push(name);
                if !skip {
                    record_attributes(&e, &path, properties)?;
                }
            }

            Event::Empty(e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                let id_attr = find_id_attr(&e)?;
                let skip = push_frame(&mut stack, &name, id_attr.as_deref());
                path.push(name);
                if !skip {
                    record_attributes(&e, &path, properties)?;
                    if matches!(path.as_slice(), [.., a, b] if a == "ObjectiveSettings" && b == "ObjectiveRef")
                    {
                        meta.objective_ref = id_attr.clone();
                    }
                }
                path.pop();
                stack.pop();
            }

            Event::Text(t) => {
                let skip = stack.last().map(|f| f.skip).unwrap_or(false);
                if skip || path.is_empty() {
                    continue;
                }
                let text = t
                    .unescape()
                    .map_err(|e| DataError::XmlParse(e.to_string()))?
                    .into_owned();
                let trimmed = text.trim();
                if trimmed.is_empty() {
                    continue;
                }

                let key = format!("{PROPERTY_PREFIX}.{}", path.join("."));
                properties.set(key, trimmed);
                // The element being matched (e.g. `Distance`, `Objective`) is
                // the parent of the leaf text node currently open, one frame
                // below the top of the stack.
                let parent_id = stack
                    .len()
                    .checked_sub(2)
                    .and_then(|i| stack.get(i))
                    .and_then(|f| f.id_attr.as_deref());
                apply_known_field(&path, parent_id, trimmed, &mut meta);
            }

            Event::End(_) => {
                path.pop();
                stack.pop();
            }

            _ => {}
        }
    }

    Ok(meta)
}

/// Push a new stack frame for `name`, recording it as seen in the parent and
/// returning whether this element (a duplicate sibling, or nested under one)
/// should be skipped. Sibling identity is `name`, qualified by `id_attr`
/// when the element carries a distinguishing `Id` (e.g. `Distance Id="X"`).
fn push_frame(stack: &mut Vec<Frame>, name: &str, id_attr: Option<&str>) -> bool {
    let identity = match id_attr {
        Some(id) => format!("{name}#{id}"),
        None => name.to_string(),
    };

    let skip = stack.last().map(|f| f.skip).unwrap_or(false)
        || stack
            .last()
            .map(|f| f.children_seen.contains(&identity))
            .unwrap_or(false);

    if let Some(top) = stack.last_mut() {
        top.children_seen.insert(identity);
    }
    stack.push(Frame {
        children_seen: HashSet::new(),
        skip,
        id_attr: id_attr.map(str::to_string),
    });
    skip
}

/// Reads the `Id` attribute off a start/empty tag, if present.
fn find_id_attr(e: &quick_xml::events::BytesStart) -> Result<Option<String>, CziError> {
    for attr in e.attributes().flatten() {
        if attr.key.as_ref() == b"Id" {
            let value = attr
                .unescape_value()
                .map_err(|err| DataError::XmlParse(err.to_string()))?
                .into_owned();
            return Ok(Some(value));
        }
    }
    Ok(None)
}

fn record_attributes(
    e: &quick_xml::events::BytesStart,
    path: &[String],
    properties: &mut PropertyTable,
) -> Result<(), CziError> {
    let key = format!("{PROPERTY_PREFIX}.{}", path.join("."));
    for attr in e.attributes().flatten() {
        let attr_name = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let attr_value = attr
            .unescape_value()
            .map_err(|err| DataError::XmlParse(err.to_string()))?
            .into_owned();
        properties.set(format!("{key}.{attr_name}"), attr_value);
    }
    Ok(())
}

fn apply_known_field(path: &[String], parent_id: Option<&str>, text: &str, meta: &mut ImageMetadata) {
    let tail: Vec<&str> = path.iter().map(String::as_str).collect();
    match tail.as_slice() {
        [.., "Image", "SizeX"] => meta.size_x = text.parse().ok(),
        [.., "Image", "SizeY"] => meta.size_y = text.parse().ok(),
        [.., "Image", "SizeC"] => meta.size_c = text.parse().ok(),
        [.., "Image", "SizeZ"] => meta.size_z = text.parse().ok(),
        [.., "Image", "SizeS"] => meta.size_s = text.parse().ok(),
        [.., "Scaling", "Items", "Distance", "Value"] => {
            if let Ok(meters) = text.parse::<f64>() {
                match parent_id {
                    Some("X") => meta.scaling_x_um = Some(meters * 1_000_000.0),
                    Some("Y") => meta.scaling_y_um = Some(meters * 1_000_000.0),
                    // No Id to disambiguate: fall back to first-wins-X,
                    // second-wins-Y ordering.
                    _ => {
                        if meta.scaling_x_um.is_none() {
                            meta.scaling_x_um = Some(meters * 1_000_000.0);
                        } else if meta.scaling_y_um.is_none() {
                            meta.scaling_y_um = Some(meters * 1_000_000.0);
                        }
                    }
                }
            }
        }
        [.., "Objective", "NominalMagnification"] => {
            if let (Ok(power), Some(id)) = (text.parse::<f64>(), parent_id) {
                meta.objective_power_by_id.insert(id.to_string(), power);
            }
        }
        _ => {}
    }
}
