//! OpenCV cascade XML loader (`opencv_storage/cascade`, new format).

use std::path::Path;
use std::str::FromStr;

use quick_xml::Reader;
use quick_xml::events::Event;

use super::{
    CascadeData, FeatureRect, FeatureType, HAAR_RECT_COUNT, HaarFeature, LBP_SUBSET_WORDS,
    LbpFeature, NodeData, StageData, WeightedRect,
};
use crate::error::{Error, Result};
use crate::geometry::Size;

/// Bias subtracted from every stage threshold to absorb float rounding.
const THRESHOLD_EPS: f32 = 1e-5;

const MAX_DEPTH: usize = 64;

impl CascadeData {
    /// Loads a cascade from an OpenCV XML file.
    pub fn load(path: impl AsRef<Path>) -> Result<CascadeData> {
        let path = path.as_ref();
        let xml = std::fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let data = Self::from_xml_str(&xml)?;
        tracing::debug!(path = %path.display(), "Loaded cascade");
        Ok(data)
    }

    /// Parses a cascade from an OpenCV XML string.
    pub fn from_xml_str(xml: &str) -> Result<CascadeData> {
        let document = parse_document(xml)?;
        let root = document
            .children
            .first()
            .ok_or_else(|| Error::MissingElement("opencv_storage".to_string()))?;
        let cascade = if root.name == "cascade" {
            root
        } else {
            root.require("cascade")?
        };

        let data = parse_cascade(cascade)?;
        data.validate()?;

        tracing::debug!(
            feature_type = ?data.feature_type,
            stages = data.stages.len(),
            trees = data.nodes.len(),
            window = ?data.window,
            "Parsed cascade"
        );
        Ok(data)
    }
}

fn parse_cascade(cascade: &Element) -> Result<CascadeData> {
    let stage_type: String = cascade.require("stageType")?.value()?;
    if stage_type != "BOOST" {
        return Err(Error::UnsupportedStageType(stage_type));
    }

    let feature_type = match cascade.require("featureType")?.value::<String>()?.as_str() {
        "HAAR" => FeatureType::Haar,
        "LBP" => FeatureType::Lbp,
        other => return Err(Error::UnsupportedFeatureType(other.to_string())),
    };

    let width: i64 = cascade.require("width")?.value()?;
    let height: i64 = cascade.require("height")?.value()?;
    if width <= 0 || height <= 0 {
        return Err(Error::InvalidWindow {
            width: width.max(0) as usize,
            height: height.max(0) as usize,
        });
    }
    let window = Size::new(width as usize, height as usize);

    if let Some(depth) = cascade.child("stageParams").and_then(|p| p.child("maxDepth")) {
        let depth: usize = depth.value()?;
        if depth != 1 {
            return Err(Error::TreeCascade(depth));
        }
    }

    let categories: usize = cascade
        .require("featureParams")?
        .require("maxCatCount")?
        .value()?;
    let subset_size = categories.div_ceil(32);
    let node_step = 3 + subset_size.max(1);
    if feature_type == FeatureType::Lbp && subset_size != LBP_SUBSET_WORDS {
        return Err(Error::InvalidValue {
            element: "maxCatCount".to_string(),
            value: categories.to_string(),
        });
    }

    let mut data = CascadeData {
        feature_type,
        window,
        stages: Vec::new(),
        nodes: Vec::new(),
        leaves: Vec::new(),
        subsets: Vec::new(),
        haar_features: Vec::new(),
        lbp_features: Vec::new(),
    };

    for stage in cascade.require("stages")?.children.iter() {
        let threshold: f32 = stage.require("stageThreshold")?.value()?;
        let trees = &stage.require("weakClassifiers")?.children;
        data.stages.push(StageData {
            first: data.nodes.len(),
            ntrees: trees.len(),
            threshold: threshold - THRESHOLD_EPS,
        });

        for tree in trees {
            let internal: Vec<f64> = tree.require("internalNodes")?.values()?;
            let leaves: Vec<f32> = tree.require("leafValues")?.values()?;
            if internal.len() != node_step {
                if internal.len() > node_step && internal.len() % node_step == 0 {
                    return Err(Error::TreeCascade(internal.len() / node_step));
                }
                return Err(Error::InvalidValue {
                    element: "internalNodes".to_string(),
                    value: format!("{internal:?}"),
                });
            }
            if leaves.len() != 2 {
                return Err(Error::InvalidValue {
                    element: "leafValues".to_string(),
                    value: format!("{leaves:?}"),
                });
            }

            let feature = internal[2];
            if feature < 0.0 {
                return Err(Error::InvalidValue {
                    element: "internalNodes".to_string(),
                    value: format!("{internal:?}"),
                });
            }
            let threshold = if subset_size > 0 {
                data.subsets
                    .extend(internal[3..3 + subset_size].iter().map(|&w| w as i32 as u32));
                0.0
            } else {
                internal[3] as f32
            };
            data.nodes.push(NodeData {
                left: internal[0] as i32,
                right: internal[1] as i32,
                feature: feature as usize,
                threshold,
            });
            data.leaves.extend_from_slice(&leaves);
        }
    }

    let features = &cascade.require("features")?.children;
    match feature_type {
        FeatureType::Haar => {
            data.haar_features = features
                .iter()
                .map(parse_haar_feature)
                .collect::<Result<_>>()?
        }
        FeatureType::Lbp => {
            data.lbp_features = features
                .iter()
                .map(parse_lbp_feature)
                .collect::<Result<_>>()?
        }
    }

    Ok(data)
}

fn parse_haar_feature(node: &Element) -> Result<HaarFeature> {
    let rects = &node.require("rects")?.children;
    if rects.is_empty() || rects.len() > HAAR_RECT_COUNT {
        return Err(Error::InvalidValue {
            element: "rects".to_string(),
            value: format!("{} rectangles", rects.len()),
        });
    }

    let mut feature = HaarFeature::default();
    for (dst, rect) in feature.rects.iter_mut().zip(rects) {
        let values: Vec<f64> = rect.values()?;
        if values.len() != 5 {
            return Err(Error::InvalidValue {
                element: "rects".to_string(),
                value: rect.text.clone(),
            });
        }
        *dst = WeightedRect {
            rect: FeatureRect::new(
                values[0] as i32,
                values[1] as i32,
                values[2] as i32,
                values[3] as i32,
            ),
            weight: values[4] as f32,
        };
    }
    feature.tilted = match node.child("tilted") {
        Some(tilted) => tilted.value::<i32>()? != 0,
        None => false,
    };
    Ok(feature)
}

fn parse_lbp_feature(node: &Element) -> Result<LbpFeature> {
    let values: Vec<i32> = node.require("rect")?.values()?;
    if values.len() != 4 {
        return Err(Error::InvalidValue {
            element: "rect".to_string(),
            value: format!("{values:?}"),
        });
    }
    Ok(LbpFeature {
        rect: FeatureRect::new(values[0], values[1], values[2], values[3]),
    })
}

// ============================================================================
// Minimal element tree
// ============================================================================

#[derive(Debug, Default)]
struct Element {
    name: String,
    text: String,
    children: Vec<Element>,
}

impl Element {
    fn named(name: &[u8]) -> Element {
        Element {
            name: String::from_utf8_lossy(name).into_owned(),
            ..Element::default()
        }
    }

    fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    fn require(&self, name: &str) -> Result<&Element> {
        self.child(name)
            .ok_or_else(|| Error::MissingElement(name.to_string()))
    }

    fn value<T: FromStr>(&self) -> Result<T> {
        let text = self.text.trim();
        text.parse().map_err(|_| Error::InvalidValue {
            element: self.name.clone(),
            value: text.to_string(),
        })
    }

    fn values<T: FromStr>(&self) -> Result<Vec<T>> {
        self.text
            .split_whitespace()
            .map(|token| {
                token.parse().map_err(|_| Error::InvalidValue {
                    element: self.name.clone(),
                    value: token.to_string(),
                })
            })
            .collect()
    }
}

/// Parses `xml` into a tree rooted at an unnamed document element.
fn parse_document(xml: &str) -> Result<Element> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut stack = vec![Element::default()];
    loop {
        let event = reader.read_event().map_err(|source| Error::Xml {
            position: reader.buffer_position() as u64,
            source,
        })?;
        match event {
            Event::Start(e) => {
                if stack.len() > MAX_DEPTH {
                    return Err(Error::InvalidValue {
                        element: "document".to_string(),
                        value: format!("nesting deeper than {MAX_DEPTH}"),
                    });
                }
                stack.push(Element::named(e.local_name().as_ref()));
            }
            Event::Empty(e) => {
                let element = Element::named(e.local_name().as_ref());
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(element);
                }
            }
            Event::End(_) => {
                if stack.len() > 1
                    && let Some(element) = stack.pop()
                    && let Some(parent) = stack.last_mut()
                {
                    parent.children.push(element);
                }
            }
            Event::Text(e) => {
                if let Some(current) = stack.last_mut() {
                    let raw: &[u8] = &e;
                    let text = std::str::from_utf8(raw).map_err(|_| Error::InvalidValue {
                        element: current.name.clone(),
                        value: String::from_utf8_lossy(raw).into_owned(),
                    })?;
                    if !current.text.is_empty() {
                        current.text.push(' ');
                    }
                    current.text.push_str(text);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if stack.len() != 1 {
        return Err(Error::InvalidValue {
            element: "document".to_string(),
            value: format!("{} unclosed elements", stack.len() - 1),
        });
    }
    stack
        .pop()
        .ok_or_else(|| Error::MissingElement("opencv_storage".to_string()))
}
