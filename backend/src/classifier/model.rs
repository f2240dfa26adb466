use std::path::Path;
use std::sync::Arc;

use tract_onnx::prelude::*;

use super::preprocess::InputTensor;
use crate::config::{ModelBackendKind, ModelConfig};

#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("Failed to load model {0}: {1}")]
    Load(String, String),
    #[error("Model error: {0}")]
    Model(String),
    #[error("Input tensor shape {actual:?} does not match model input {expected:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },
    #[error("Model backend '{0}' is not compiled into this build")]
    Unavailable(String),
    #[error("Model lock poisoned")]
    Poisoned,
}

/// An inference engine able to score a `(1, H, W, 3)` tensor.
///
/// Implementations must be callable from several request handlers at once;
/// engines that are not reentrant lock internally around the forward call.
pub trait InferenceBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Spatial input size `(height, width)` if the model declares it.
    fn input_size(&self) -> Option<(u32, u32)>;

    /// Output dimension if the model declares it.
    fn num_classes(&self) -> Option<usize>;

    fn run(&self, tensor: &InputTensor) -> Result<Vec<f32>, InferenceError>;
}

/// Process-wide classifier handle.
///
/// Built once at startup by [`ClassificationModel::load`] (or
/// [`ClassificationModel::from_backend`]) and handed to request handlers
/// through `web::Data`; clones share the same backend.
#[derive(Clone)]
pub struct ClassificationModel {
    backend: Arc<dyn InferenceBackend>,
    target_size: (u32, u32),
    num_classes: Option<usize>,
}

impl ClassificationModel {
    pub fn load(config: &ModelConfig) -> Result<Self, InferenceError> {
        log::info!(
            "Loading {:?} model from {}",
            config.backend,
            config.path.display()
        );
        let model = match config.backend {
            ModelBackendKind::Onnx => Self::from_backend(
                TractBackend::load(&config.path, config.default_input_size)?,
                config.default_input_size,
            ),
            ModelBackendKind::Torch => Self::load_torch(config)?,
        };
        log::info!(
            "Model ready: backend={}, input={}x{}, classes={:?}",
            model.backend_name(),
            model.target_size.0,
            model.target_size.1,
            model.num_classes
        );
        Ok(model)
    }

    #[cfg(feature = "torch")]
    fn load_torch(config: &ModelConfig) -> Result<Self, InferenceError> {
        Ok(Self::from_backend(
            torch::TorchBackend::load(&config.path)?,
            config.default_input_size,
        ))
    }

    #[cfg(not(feature = "torch"))]
    fn load_torch(_config: &ModelConfig) -> Result<Self, InferenceError> {
        Err(InferenceError::Unavailable("torch".to_string()))
    }

    /// Wraps an already constructed backend, introspecting its input size
    /// and class count. `default_size` is used when the backend cannot
    /// report its input size.
    pub fn from_backend(backend: impl InferenceBackend + 'static, default_size: (u32, u32)) -> Self {
        let target_size = backend.input_size().unwrap_or(default_size);
        let num_classes = backend.num_classes();
        Self {
            backend: Arc::new(backend),
            target_size,
            num_classes,
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// `(height, width)` the preprocessor must resize to.
    pub fn target_size(&self) -> (u32, u32) {
        self.target_size
    }

    pub fn num_classes(&self) -> Option<usize> {
        self.num_classes
    }

    pub fn predict(&self, tensor: &InputTensor) -> Result<Vec<f32>, InferenceError> {
        let (height, width) = self.target_size;
        let expected = vec![1, height as usize, width as usize, 3];
        if tensor.shape() != expected.as_slice() {
            return Err(InferenceError::ShapeMismatch {
                expected,
                actual: tensor.shape().to_vec(),
            });
        }
        self.backend.run(tensor)
    }
}

type TractPlan = SimplePlan<TypedFact, Box<dyn TypedOp>, TypedModel>;

/// ONNX model executed with tract. Runnable plans take `&self`, so no lock
/// is needed around inference.
pub struct TractBackend {
    plan: TractPlan,
    input_size: Option<(u32, u32)>,
    num_classes: Option<usize>,
}

impl TractBackend {
    pub fn load(path: &Path, default_size: (u32, u32)) -> Result<Self, InferenceError> {
        let load_err = |e: TractError| InferenceError::Load(path.display().to_string(), e.to_string());

        let model = tract_onnx::onnx().model_for_path(path).map_err(load_err)?;

        let input_size = model
            .clone()
            .into_typed()
            .ok()
            .and_then(|typed| declared_input_size(&typed));
        let (height, width) = input_size.unwrap_or(default_size);

        let optimized = model
            .with_input_fact(0, f32::fact([1, height as usize, width as usize, 3]).into())
            .map_err(load_err)?
            .into_optimized()
            .map_err(load_err)?;
        let num_classes = declared_classes(&optimized);
        let plan = optimized.into_runnable().map_err(load_err)?;

        Ok(Self {
            plan,
            input_size,
            num_classes,
        })
    }
}

fn declared_input_size(model: &TypedModel) -> Option<(u32, u32)> {
    let fact = model.input_fact(0).ok()?;
    if fact.shape.len() < 4 {
        return None;
    }
    let height = fact.shape[1].to_i64().ok()?;
    let width = fact.shape[2].to_i64().ok()?;
    if height <= 0 || width <= 0 {
        return None;
    }
    Some((height as u32, width as u32))
}

fn declared_classes(model: &TypedModel) -> Option<usize> {
    let fact = model.output_fact(0).ok()?;
    if fact.shape.len() < 2 {
        return None;
    }
    let classes = fact.shape[fact.shape.len() - 1].to_i64().ok()?;
    (classes > 0).then_some(classes as usize)
}

impl InferenceBackend for TractBackend {
    fn name(&self) -> &'static str {
        "onnx"
    }

    fn input_size(&self) -> Option<(u32, u32)> {
        self.input_size
    }

    fn num_classes(&self) -> Option<usize> {
        self.num_classes
    }

    fn run(&self, tensor: &InputTensor) -> Result<Vec<f32>, InferenceError> {
        let data: Vec<f32> = tensor.iter().copied().collect();
        let input = Tensor::from_shape(tensor.shape(), &data)
            .map_err(|e| InferenceError::Model(e.to_string()))?;
        let outputs = self
            .plan
            .run(tvec!(input.into()))
            .map_err(|e| InferenceError::Model(e.to_string()))?;
        let output = outputs
            .first()
            .ok_or_else(|| InferenceError::Model("model produced no outputs".to_string()))?;
        let view = output
            .to_array_view::<f32>()
            .map_err(|e| InferenceError::Model(e.to_string()))?;
        Ok(view.iter().copied().collect())
    }
}

#[cfg(feature = "torch")]
mod torch {
    use std::path::Path;
    use std::sync::Mutex;

    use tch::{CModule, Device, Kind, Tensor};

    use super::{InferenceBackend, InferenceError};
    use crate::classifier::preprocess::InputTensor;

    /// TorchScript module. libtorch modules are not safe to call
    /// concurrently, so the forward pass runs under a mutex.
    pub struct TorchBackend {
        module: Mutex<CModule>,
        device: Device,
    }

    impl TorchBackend {
        pub fn load(path: &Path) -> Result<Self, InferenceError> {
            let device = Device::cuda_if_available();
            let module = CModule::load_on_device(path, device)
                .map_err(|e| InferenceError::Load(path.display().to_string(), e.to_string()))?;
            Ok(Self {
                module: Mutex::new(module),
                device,
            })
        }
    }

    impl InferenceBackend for TorchBackend {
        fn name(&self) -> &'static str {
            "torch"
        }

        // TorchScript does not expose input or output shapes.
        fn input_size(&self) -> Option<(u32, u32)> {
            None
        }

        fn num_classes(&self) -> Option<usize> {
            None
        }

        fn run(&self, tensor: &InputTensor) -> Result<Vec<f32>, InferenceError> {
            let shape: Vec<i64> = tensor.shape().iter().map(|d| *d as i64).collect();
            let data: Vec<f32> = tensor.iter().copied().collect();
            let input = Tensor::from_slice(&data).view(shape.as_slice()).to_device(self.device);

            let output = {
                let module = self.module.lock().map_err(|_| InferenceError::Poisoned)?;
                module
                    .forward_ts(&[input])
                    .map_err(|e| InferenceError::Model(e.to_string()))?
            };

            let output_flat = output.to_kind(Kind::Float).to_device(Device::Cpu).view([-1]);
            let num_elements = output_flat.size()[0] as usize;
            let mut output_vec = vec![0.0f32; num_elements];
            output_flat.copy_data(&mut output_vec, num_elements);
            Ok(output_vec)
        }
    }
}
