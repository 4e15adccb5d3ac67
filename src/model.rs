//! Trained-parameter descriptors
//!
//! This module loads and saves the per-layer parameter descriptor the
//! visualization deployment ships as JSON: a sequence of entries tagged with
//! a layer type, each carrying that layer's parameters (kernel tensor for
//! convolution, window size for pooling, weight matrix and bias vector for
//! the classifier head). Entries may omit their parameter tensors, in which
//! case the layer is Gaussian-initialized from the supplied RNG.

use crate::layers::{ConvolutionLayer, Layer, MaxPoolingLayer, SoftMaxLayer};
use crate::tensor::Tensor;
use crate::utils::SimpleRng;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fs;

/// Descriptor for a single layer.
///
/// Field names follow the JSON layout of the deployed parameter files.
/// Different layer types require different fields:
///
/// - **ConvolutionLayer**: `kernelNum`, `kernelSize`, and optionally
///   `kernels` (kernelNum × kernelSize × kernelSize)
/// - **MaxPoolingLayer**: `kernelSize` (window size, also the stride)
/// - **SoftMaxLayer**: either `weight` and `bias`, or `inputUnits` and
///   `outputUnits` for random initialization
///
/// # Example
///
/// ```json
/// [
///   { "type": "ConvolutionLayer", "kernelNum": 16, "kernelSize": 3, "kernels": [...] },
///   { "type": "MaxPoolingLayer", "kernelSize": 2 },
///   { "type": "SoftMaxLayer", "weight": [...], "bias": [...] }
/// ]
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerDescriptor {
    /// Layer type tag: "ConvolutionLayer", "MaxPoolingLayer", or
    /// "SoftMaxLayer".
    #[serde(rename = "type")]
    pub layer_type: String,

    /// Number of kernels for a convolution layer.
    #[serde(rename = "kernelNum", default, skip_serializing_if = "Option::is_none")]
    pub kernel_num: Option<usize>,

    /// Kernel side length for a convolution layer, or the window size for a
    /// pooling layer.
    #[serde(rename = "kernelSize", default, skip_serializing_if = "Option::is_none")]
    pub kernel_size: Option<usize>,

    /// Trained kernel tensor for a convolution layer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kernels: Option<Vec<Vec<Vec<f64>>>>,

    /// Flattened-input width for a randomly initialized classifier head.
    #[serde(rename = "inputUnits", default, skip_serializing_if = "Option::is_none")]
    pub input_units: Option<usize>,

    /// Class count for a randomly initialized classifier head.
    #[serde(rename = "outputUnits", default, skip_serializing_if = "Option::is_none")]
    pub output_units: Option<usize>,

    /// Trained weight matrix for a classifier head.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<Vec<Vec<f64>>>,

    /// Trained bias vector for a classifier head.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bias: Option<Vec<f64>>,
}

fn invalid(message: String) -> Box<dyn Error> {
    Box::new(std::io::Error::new(
        std::io::ErrorKind::InvalidData,
        message,
    ))
}

/// Loads a model from a JSON descriptor file.
///
/// Reads the file at `path`, validates every entry, and builds the layer
/// sequence. Entries without parameter tensors are Gaussian-initialized from
/// `rng`.
///
/// # Returns
///
/// `Ok(Vec<Layer>)` on success, or an error if the file cannot be read, the
/// JSON is invalid, or a descriptor is inconsistent.
pub fn load_model(path: &str, rng: &mut SimpleRng) -> Result<Vec<Layer>, Box<dyn Error>> {
    let contents = fs::read_to_string(path)?;
    let descriptors: Vec<LayerDescriptor> = serde_json::from_str(&contents)?;
    build_layers(descriptors, rng)
}

/// Builds the layer sequence described by `descriptors`.
///
/// Validates every descriptor before building any layer, so a bad entry
/// fails the whole model without side effects.
pub fn build_layers(
    descriptors: Vec<LayerDescriptor>,
    rng: &mut SimpleRng,
) -> Result<Vec<Layer>, Box<dyn Error>> {
    if descriptors.is_empty() {
        return Err(invalid("model must have at least one layer".to_string()));
    }
    for (index, descriptor) in descriptors.iter().enumerate() {
        validate_descriptor(descriptor, index)?;
    }
    descriptors
        .into_iter()
        .enumerate()
        .map(|(index, descriptor)| build_layer(descriptor, index, rng))
        .collect()
}

/// Saves the current layer parameters as a JSON descriptor file.
///
/// The written file round-trips through [`load_model`].
pub fn save_model(path: &str, layers: &[Layer]) -> Result<(), Box<dyn Error>> {
    let descriptors = describe_layers(layers)?;
    let contents = serde_json::to_string(&descriptors)?;
    fs::write(path, contents)?;
    Ok(())
}

/// Converts live layers back into their descriptor form.
pub fn describe_layers(layers: &[Layer]) -> Result<Vec<LayerDescriptor>, Box<dyn Error>> {
    layers
        .iter()
        .map(|layer| match layer {
            Layer::Convolution(conv) => Ok(LayerDescriptor {
                layer_type: "ConvolutionLayer".to_string(),
                kernel_num: Some(conv.kernel_num()),
                kernel_size: Some(conv.kernel_size()),
                kernels: Some(
                    conv.kernels()
                        .to_vec3()
                        .ok_or_else(|| invalid("kernel tensor is not rank 3".to_string()))?,
                ),
                input_units: None,
                output_units: None,
                weight: None,
                bias: None,
            }),
            Layer::MaxPooling(pool) => Ok(LayerDescriptor {
                layer_type: "MaxPoolingLayer".to_string(),
                kernel_num: None,
                kernel_size: Some(pool.window()),
                kernels: None,
                input_units: None,
                output_units: None,
                weight: None,
                bias: None,
            }),
            Layer::SoftMax(head) => Ok(LayerDescriptor {
                layer_type: "SoftMaxLayer".to_string(),
                kernel_num: None,
                kernel_size: None,
                kernels: None,
                input_units: Some(head.input_units()),
                output_units: Some(head.output_units()),
                weight: Some(
                    head.weight()
                        .to_vec2()
                        .ok_or_else(|| invalid("weight tensor is not rank 2".to_string()))?,
                ),
                bias: Some(
                    head.bias()
                        .to_vec1()
                        .ok_or_else(|| invalid("bias tensor is not rank 1".to_string()))?,
                ),
            }),
        })
        .collect()
}

/// Validates a single layer descriptor.
fn validate_descriptor(descriptor: &LayerDescriptor, index: usize) -> Result<(), Box<dyn Error>> {
    match descriptor.layer_type.as_str() {
        "ConvolutionLayer" => {
            let kernel_num = descriptor.kernel_num.ok_or_else(|| {
                invalid(format!("layer {}: convolution requires 'kernelNum'", index))
            })?;
            let kernel_size = descriptor.kernel_size.ok_or_else(|| {
                invalid(format!("layer {}: convolution requires 'kernelSize'", index))
            })?;
            if kernel_num == 0 || kernel_size == 0 {
                return Err(invalid(format!(
                    "layer {}: kernelNum and kernelSize must be positive",
                    index
                )));
            }
            if let Some(kernels) = &descriptor.kernels {
                if kernels.len() != kernel_num {
                    return Err(invalid(format!(
                        "layer {}: {} kernels supplied but kernelNum is {}",
                        index,
                        kernels.len(),
                        kernel_num
                    )));
                }
            }
            Ok(())
        }
        "MaxPoolingLayer" => {
            let window = descriptor.kernel_size.ok_or_else(|| {
                invalid(format!("layer {}: pooling requires 'kernelSize'", index))
            })?;
            if window == 0 {
                return Err(invalid(format!(
                    "layer {}: pooling window must be positive",
                    index
                )));
            }
            Ok(())
        }
        "SoftMaxLayer" => {
            let has_parameters = descriptor.weight.is_some() && descriptor.bias.is_some();
            let has_units = descriptor.input_units.is_some() && descriptor.output_units.is_some();
            if !has_parameters && !has_units {
                return Err(invalid(format!(
                    "layer {}: classifier head requires 'weight' and 'bias', or \
                     'inputUnits' and 'outputUnits' for random initialization",
                    index
                )));
            }
            if let (Some(input_units), Some(output_units)) =
                (descriptor.input_units, descriptor.output_units)
            {
                if input_units == 0 || output_units == 0 {
                    return Err(invalid(format!(
                        "layer {}: inputUnits and outputUnits must be positive",
                        index
                    )));
                }
            }
            Ok(())
        }
        other => Err(invalid(format!(
            "layer {}: unknown layer type: {}",
            index, other
        ))),
    }
}

/// Builds a single layer from a validated descriptor.
fn build_layer(
    descriptor: LayerDescriptor,
    index: usize,
    rng: &mut SimpleRng,
) -> Result<Layer, Box<dyn Error>> {
    match descriptor.layer_type.as_str() {
        "ConvolutionLayer" => {
            let kernel_num = descriptor.kernel_num.unwrap_or(0);
            let kernel_size = descriptor.kernel_size.unwrap_or(0);
            let layer = match descriptor.kernels {
                Some(kernels) => {
                    let tensor = Tensor::from_vec3(kernels)?;
                    let layer = ConvolutionLayer::from_kernels(tensor)?;
                    if layer.kernel_size() != kernel_size {
                        return Err(invalid(format!(
                            "layer {}: kernels are {}x{} but kernelSize is {}",
                            index,
                            layer.kernel_size(),
                            layer.kernel_size(),
                            kernel_size
                        )));
                    }
                    layer
                }
                None => ConvolutionLayer::new(kernel_num, kernel_size, rng),
            };
            Ok(Layer::Convolution(layer))
        }
        "MaxPoolingLayer" => Ok(Layer::MaxPooling(MaxPoolingLayer::new(
            descriptor.kernel_size.unwrap_or(0),
        ))),
        "SoftMaxLayer" => {
            let layer = match (descriptor.weight, descriptor.bias) {
                (Some(weight), Some(bias)) => {
                    let weight = Tensor::from_vec2(weight)?;
                    let bias = Tensor::vector(bias);
                    SoftMaxLayer::from_parameters(weight, bias)?
                }
                _ => {
                    let input_units = descriptor.input_units.unwrap_or(0);
                    let output_units = descriptor.output_units.unwrap_or(0);
                    SoftMaxLayer::new(input_units, output_units, rng)
                }
            };
            Ok(Layer::SoftMax(layer))
        }
        other => Err(invalid(format!(
            "layer {}: unknown layer type: {}",
            index, other
        ))),
    }
}
