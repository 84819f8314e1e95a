//! The artifact bundle format.
//!
//! ```text
//! magic "RTAF" | format u32 BE | header_len u64 BE | header json | body
//! ```
//!
//! The header carries everything needed to check an artifact's integrity (version, algorithm,
//! contract, metadata and widths) plus a table of the body's sections. The body is the
//! concatenation of those sections as raw little-endian `f32`/`u32` arrays.

use std::{collections::HashMap, io};

use machine_learning::{
    estimators::{
        Algorithm, Estimator, LinearRegression, Node, RandomForest, RegressionTree, Regressor,
    },
    scaling::{FeatureScaler, IdentityScaler, Scaler, ScalerKind, StandardScaler},
};
use serde::{Deserialize, Serialize};

use crate::{
    bundle::{self, ArtifactMetadata, ModelArtifact},
    contract::FeatureContract,
    error::{ArtifactErr, Result},
    version::VersionId,
};

#[cfg(not(target_endian = "little"))]
compile_error!("artifact sections are stored as raw little-endian arrays");

pub const MAGIC: [u8; 4] = *b"RTAF";
pub const FORMAT_VERSION: u32 = 1;

type FormatType = u32;
type LenType = u64;
const FORMAT_TYPE_SIZE: usize = size_of::<FormatType>();
const LEN_TYPE_SIZE: usize = size_of::<LenType>();
const PREAMBLE_SIZE: usize = MAGIC.len() + FORMAT_TYPE_SIZE + LEN_TYPE_SIZE;

/// Marks a leaf in the `forest.feature` section.
const LEAF: u32 = u32::MAX;

const SCALER_MEAN: &str = "scaler.mean";
const SCALER_SCALE: &str = "scaler.scale";
const LINEAR_COEF: &str = "linear.coef";
const LINEAR_INTERCEPT: &str = "linear.intercept";
const FOREST_TREE_LEN: &str = "forest.tree_len";
const FOREST_FEATURE: &str = "forest.feature";
const FOREST_VALUE: &str = "forest.value";
const FOREST_LEFT: &str = "forest.left";
const FOREST_RIGHT: &str = "forest.right";

/// The element type of a body section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DType {
    F32,
    U32,
}

impl DType {
    /// The size of an element in bytes.
    pub fn size(&self) -> usize {
        match self {
            Self::F32 => size_of::<f32>(),
            Self::U32 => size_of::<u32>(),
        }
    }
}

/// An entry of the header's section table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub name: String,
    pub dtype: DType,
    /// The amount of elements, not bytes.
    pub len: usize,
}

/// The part of an artifact that can be read without decoding the model parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactHeader {
    pub version: VersionId,
    pub algorithm: Algorithm,
    pub contract: FeatureContract,
    pub metadata: ArtifactMetadata,
    pub scaler: ScalerKind,
    pub scaler_width: usize,
    pub input_width: usize,
    pub sections: Vec<Section>,
}

impl ArtifactHeader {
    /// Runs the integrity checks that don't need the model parameters.
    pub fn check_integrity(&self) -> Result<()> {
        bundle::check_shapes(
            &self.version,
            &self.contract,
            self.scaler_width,
            self.input_width,
            &self.metadata,
        )?;

        if self.metadata.algorithm != self.algorithm {
            return Err(ArtifactErr::corruption(
                &self.version,
                format!(
                    "metadata says {} but the header says {}",
                    self.metadata.algorithm, self.algorithm
                ),
            ));
        }

        Ok(())
    }
}

// Element types a section can hold.
trait Element: bytemuck::Pod {
    const DTYPE: DType;
}

impl Element for f32 {
    const DTYPE: DType = DType::F32;
}

impl Element for u32 {
    const DTYPE: DType = DType::U32;
}

#[derive(Default)]
struct BodyWriter {
    sections: Vec<Section>,
    bytes: Vec<u8>,
}

impl BodyWriter {
    fn push<T: Element>(&mut self, name: &str, data: &[T]) {
        self.sections.push(Section {
            name: name.to_string(),
            dtype: T::DTYPE,
            len: data.len(),
        });
        self.bytes.extend_from_slice(bytemuck::cast_slice(data));
    }

    fn push_forest(&mut self, forest: &RandomForest) {
        let total = forest.trees().iter().map(|t| t.nodes().len()).sum();
        let mut tree_len = Vec::with_capacity(forest.trees().len());
        let mut feature = Vec::with_capacity(total);
        let mut value = Vec::with_capacity(total);
        let mut left = Vec::with_capacity(total);
        let mut right = Vec::with_capacity(total);

        for tree in forest.trees() {
            tree_len.push(tree.nodes().len() as u32);

            for node in tree.nodes() {
                let (f, v, l, r) = match *node {
                    Node::Split {
                        feature,
                        threshold,
                        left,
                        right,
                    } => (feature, threshold, left, right),
                    Node::Leaf { value } => (LEAF, value, 0, 0),
                };

                feature.push(f);
                value.push(v);
                left.push(l);
                right.push(r);
            }
        }

        self.push(FOREST_TREE_LEN, &tree_len);
        self.push(FOREST_FEATURE, &feature);
        self.push(FOREST_VALUE, &value);
        self.push(FOREST_LEFT, &left);
        self.push(FOREST_RIGHT, &right);
    }
}

/// Encodes an artifact into its bundle format.
///
/// # Arguments
/// * `artifact` - The artifact to encode, it's not checked for integrity.
///
/// # Returns
/// The encoded bytes or an io error if the header can't be serialized.
pub fn encode(artifact: &ModelArtifact) -> io::Result<Vec<u8>> {
    let mut body = BodyWriter::default();

    match artifact.scaler() {
        FeatureScaler::Standard(scaler) => {
            body.push(SCALER_MEAN, scaler.mean());
            body.push(SCALER_SCALE, scaler.scale());
        }
        FeatureScaler::Identity(_) => {}
    }

    match artifact.regressor() {
        Regressor::Linear(model) => {
            body.push(LINEAR_COEF, model.coef());
            body.push(LINEAR_INTERCEPT, &[model.intercept()]);
        }
        Regressor::RandomForest(forest) => body.push_forest(forest),
    }

    let header = ArtifactHeader {
        version: artifact.version().clone(),
        algorithm: artifact.algorithm(),
        contract: artifact.contract().clone(),
        metadata: artifact.metadata().clone(),
        scaler: artifact.scaler().kind(),
        scaler_width: artifact.scaler().width(),
        input_width: artifact.regressor().input_width(),
        sections: body.sections,
    };

    let header = serde_json::to_vec(&header)?;
    let mut buf = Vec::with_capacity(PREAMBLE_SIZE + header.len() + body.bytes.len());
    buf.extend_from_slice(&MAGIC);
    buf.extend_from_slice(&FORMAT_VERSION.to_be_bytes());
    buf.extend_from_slice(&(header.len() as LenType).to_be_bytes());
    buf.extend_from_slice(&header);
    buf.extend_from_slice(&body.bytes);
    Ok(buf)
}

/// Reads and checks only the header of an encoded artifact.
///
/// # Arguments
/// * `expected` - The version the bytes were stored under.
/// * `bytes` - The encoded artifact.
///
/// # Returns
/// The header, or a corruption error if it can't be parsed, belongs to another version or fails
/// the integrity checks.
pub fn read_header(expected: &VersionId, bytes: &[u8]) -> Result<ArtifactHeader> {
    split(expected, bytes).map(|(header, _)| header)
}

/// Decodes a whole artifact.
///
/// # Arguments
/// * `expected` - The version the bytes were stored under.
/// * `bytes` - The encoded artifact.
///
/// # Returns
/// The artifact, or a corruption error if any part of it is malformed or inconsistent.
pub fn decode(expected: &VersionId, bytes: &[u8]) -> Result<ModelArtifact> {
    let (header, body) = split(expected, bytes)?;
    let sections = SectionReader::new(&header, body)?;

    let scaler = match header.scaler {
        ScalerKind::Standard => {
            let mean = sections.take(SCALER_MEAN)?;
            let scale = sections.take(SCALER_SCALE)?;
            StandardScaler::from_parts(mean, scale)
                .map_err(|e| sections.corrupt(e.to_string()))?
                .into()
        }
        ScalerKind::Identity => IdentityScaler::new(header.scaler_width).into(),
    };

    let regressor = match header.algorithm {
        Algorithm::LinearRegression => {
            let coef = sections.take(LINEAR_COEF)?;
            let &[intercept] = sections.take::<f32>(LINEAR_INTERCEPT)?.as_slice() else {
                return Err(sections.corrupt("the intercept must hold a single value"));
            };
            LinearRegression::from_parts(coef, intercept).into()
        }
        Algorithm::RandomForest => sections.take_forest(header.input_width)?.into(),
    };

    let ArtifactHeader {
        version,
        contract,
        metadata,
        ..
    } = header;

    let artifact = ModelArtifact::new(version, contract, scaler, regressor, metadata);
    bundle::validate_integrity(&artifact)?;
    Ok(artifact)
}

fn split<'a>(expected: &VersionId, bytes: &'a [u8]) -> Result<(ArtifactHeader, &'a [u8])> {
    let corrupt = |reason: String| ArtifactErr::corruption(expected, reason);

    if bytes.len() < PREAMBLE_SIZE {
        return Err(corrupt(format!(
            "the buffer is too small {}, must at least be {PREAMBLE_SIZE} bytes",
            bytes.len()
        )));
    }

    let (magic, rest) = bytes.split_at(MAGIC.len());
    if magic != MAGIC {
        return Err(corrupt(format!("bad magic bytes {magic:?}")));
    }

    let (format, rest) = rest.split_at(FORMAT_TYPE_SIZE);
    let format = FormatType::from_be_bytes([format[0], format[1], format[2], format[3]]);
    if format != FORMAT_VERSION {
        return Err(corrupt(format!("unsupported format version {format}")));
    }

    let (len, rest) = rest.split_at(LEN_TYPE_SIZE);
    let mut len_buf = [0; LEN_TYPE_SIZE];
    len_buf.copy_from_slice(len);
    let header_len = LenType::from_be_bytes(len_buf);

    let header_len = usize::try_from(header_len)
        .ok()
        .filter(|&n| n <= rest.len())
        .ok_or_else(|| corrupt(format!("header length {header_len} overruns the buffer")))?;

    let (header, body) = rest.split_at(header_len);
    let header: ArtifactHeader =
        serde_json::from_slice(header).map_err(|e| corrupt(format!("invalid header: {e}")))?;

    if header.version != *expected {
        return Err(corrupt(format!(
            "stored under {expected} but the header says {}",
            header.version
        )));
    }

    header.check_integrity()?;
    Ok((header, body))
}

struct SectionReader<'a> {
    version: &'a VersionId,
    table: HashMap<&'a str, (DType, &'a [u8])>,
}

impl<'a> SectionReader<'a> {
    fn new(header: &'a ArtifactHeader, body: &'a [u8]) -> Result<Self> {
        let version = &header.version;
        let corrupt = |reason: String| ArtifactErr::corruption(version, reason);

        let mut table = HashMap::with_capacity(header.sections.len());
        let mut offset = 0usize;

        for Section { name, dtype, len } in &header.sections {
            let end = len
                .checked_mul(dtype.size())
                .and_then(|size| offset.checked_add(size))
                .filter(|&end| end <= body.len())
                .ok_or_else(|| corrupt(format!("section {name} overruns the body")))?;

            if table.insert(name.as_str(), (*dtype, &body[offset..end])).is_some() {
                return Err(corrupt(format!("duplicate section {name}")));
            }
            offset = end;
        }

        if offset != body.len() {
            return Err(corrupt(format!(
                "{} trailing bytes after the last section",
                body.len() - offset
            )));
        }

        Ok(Self { version, table })
    }

    fn corrupt(&self, reason: impl Into<String>) -> ArtifactErr {
        ArtifactErr::corruption(self.version, reason)
    }

    fn take<T: Element>(&self, name: &str) -> Result<Vec<T>> {
        let &(dtype, bytes) = self
            .table
            .get(name)
            .ok_or_else(|| self.corrupt(format!("missing section {name}")))?;

        if dtype != T::DTYPE {
            return Err(self.corrupt(format!(
                "section {name} holds {dtype:?}, expected {:?}",
                T::DTYPE
            )));
        }

        // The body isn't aligned, copy it into an aligned buffer.
        let mut out = vec![T::zeroed(); bytes.len() / size_of::<T>()];
        bytemuck::cast_slice_mut::<T, u8>(&mut out).copy_from_slice(bytes);
        Ok(out)
    }

    fn take_forest(&self, width: usize) -> Result<RandomForest> {
        let tree_len = self.take::<u32>(FOREST_TREE_LEN)?;
        let feature = self.take::<u32>(FOREST_FEATURE)?;
        let value = self.take::<f32>(FOREST_VALUE)?;
        let left = self.take::<u32>(FOREST_LEFT)?;
        let right = self.take::<u32>(FOREST_RIGHT)?;

        let total: usize = tree_len.iter().map(|&n| n as usize).sum();
        if [feature.len(), value.len(), left.len(), right.len()]
            .iter()
            .any(|&n| n != total)
        {
            return Err(self.corrupt("forest node sections disagree in length"));
        }

        let mut trees = Vec::with_capacity(tree_len.len());
        let mut start = 0;
        for &n in &tree_len {
            let end = start + n as usize;
            let nodes = (start..end)
                .map(|i| match feature[i] {
                    LEAF => Node::Leaf { value: value[i] },
                    f => Node::Split {
                        feature: f,
                        threshold: value[i],
                        left: left[i],
                        right: right[i],
                    },
                })
                .collect();

            let tree = RegressionTree::from_nodes(width, nodes)
                .map_err(|e| self.corrupt(format!("tree {}: {e}", trees.len())))?;
            trees.push(tree);
            start = end;
        }

        RandomForest::from_trees(width, trees).map_err(|e| self.corrupt(e.to_string()))
    }
}
