//! Model serialization/deserialization.
//!
//! A versioned, stable on-disk format for a trained `Mlp`. The internal
//! `Mlp`/`Layer` structs are not serialized directly so the file format can
//! stay put while the in-memory representation changes. Loading validates
//! dimensions, parameter lengths, and that every parameter is finite.

use std::path::Path;

use log::info;
use serde::{Deserialize, Serialize};

use crate::{Activation, Error, Layer, Mlp, Result};

pub const MODEL_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedModel {
    pub format_version: u32,
    pub layers: Vec<SavedLayer>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedLayer {
    pub in_dim: usize,
    pub out_dim: usize,
    pub activation: SavedActivation,
    /// Row-major (out_dim, in_dim).
    pub weights: Vec<f32>,
    pub biases: Vec<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SavedActivation {
    Relu,
    Identity,
}

impl From<Activation> for SavedActivation {
    fn from(value: Activation) -> Self {
        match value {
            Activation::ReLU => SavedActivation::Relu,
            Activation::Identity => SavedActivation::Identity,
        }
    }
}

impl From<SavedActivation> for Activation {
    fn from(value: SavedActivation) -> Self {
        match value {
            SavedActivation::Relu => Activation::ReLU,
            SavedActivation::Identity => Activation::Identity,
        }
    }
}

impl SavedModel {
    pub fn validate(&self) -> Result<()> {
        if self.format_version != MODEL_FORMAT_VERSION {
            return Err(Error::InvalidData(format!(
                "unsupported model format_version {}; expected {}",
                self.format_version, MODEL_FORMAT_VERSION
            )));
        }
        if self.layers.is_empty() {
            return Err(Error::InvalidData(
                "serialized model must have at least one layer".to_owned(),
            ));
        }

        for (i, pair) in self.layers.windows(2).enumerate() {
            if pair[1].in_dim != pair[0].out_dim {
                return Err(Error::InvalidData(format!(
                    "layer {} in_dim {} does not match previous out_dim {}",
                    i + 1,
                    pair[1].in_dim,
                    pair[0].out_dim
                )));
            }
        }
        Ok(())
    }
}

impl From<&Mlp> for SavedModel {
    fn from(model: &Mlp) -> Self {
        Self {
            format_version: MODEL_FORMAT_VERSION,
            layers: model.layers().iter().map(SavedLayer::from).collect(),
        }
    }
}

impl From<&Layer> for SavedLayer {
    fn from(layer: &Layer) -> Self {
        Self {
            in_dim: layer.in_dim(),
            out_dim: layer.out_dim(),
            activation: layer.activation().into(),
            weights: layer.weights().to_vec(),
            biases: layer.biases().to_vec(),
        }
    }
}

impl TryFrom<SavedModel> for Mlp {
    type Error = Error;

    fn try_from(value: SavedModel) -> std::result::Result<Self, Self::Error> {
        value.validate()?;

        let mut layers = Vec::with_capacity(value.layers.len());
        for (i, layer) in value.layers.into_iter().enumerate() {
            // Layer::from_parts performs shape validation and finiteness checks.
            let l = Layer::from_parts(
                layer.in_dim,
                layer.out_dim,
                layer.activation.into(),
                layer.weights,
                layer.biases,
            )
            .map_err(|e| Error::InvalidData(format!("layer {i} invalid: {e}")))?;
            layers.push(l);
        }

        Ok(Mlp::from_layers(layers))
    }
}

impl Mlp {
    /// Serialize the model to a pretty-printed JSON string.
    pub fn to_json_string_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&SavedModel::from(self))?)
    }

    /// Parse a model from a JSON string.
    pub fn from_json_str(s: &str) -> Result<Self> {
        let ser: SavedModel = serde_json::from_str(s)?;
        ser.try_into()
    }

    /// Save the model to a JSON file (pretty-printed).
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let p = path.as_ref();
        let s = self.to_json_string_pretty()?;
        std::fs::write(p, s).map_err(|e| Error::io(p, e))?;
        info!("saved model to {}", p.display());
        Ok(())
    }

    /// Load a model from a JSON file.
    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let p = path.as_ref();
        let s = std::fs::read_to_string(p).map_err(|e| Error::io(p, e))?;
        Self::from_json_str(&s)
    }
}
