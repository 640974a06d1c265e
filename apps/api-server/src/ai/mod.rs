pub mod models;

use self::models::{
    get_optional_str_from_params, get_str_from_params, load_model_list, CaptionModelInfo,
    ConcreteModelType,
};
use ai::{
    blip::{BLIPModel, BLIP},
    device::ComputeDevice,
    AIModel, ImageCaptionModel,
};
use anyhow::Context;
use std::{collections::HashMap, fmt, path::Path, str::FromStr};

/// Captioning models by name.
///
/// Filled once at startup, then shared read-only (behind an `Arc` in the
/// request context). Each entry is a handle to a model worker, so lookups
/// never block on inference.
#[derive(Clone, Default)]
pub struct ModelRegistry {
    models: HashMap<String, ImageCaptionModel>,
}

impl fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ModelRegistry")
            .field("models", &self.names())
            .finish()
    }
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the handle previously registered under `name`, if any.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        model: ImageCaptionModel,
    ) -> Option<ImageCaptionModel> {
        self.models.insert(name.into(), model)
    }

    pub fn get(&self, name: &str) -> Option<&ImageCaptionModel> {
        self.models.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.models.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names = self.models.keys().map(|v| v.as_str()).collect::<Vec<_>>();
        names.sort_unstable();
        names
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

/// Load every model in the model list, eagerly.
pub async fn init_model_registry(resources_dir: impl AsRef<Path>) -> anyhow::Result<ModelRegistry> {
    let resources_dir = resources_dir.as_ref();
    let mut registry = ModelRegistry::new();

    for info in load_model_list(resources_dir)? {
        let id = info.id.clone();
        let model = load_caption_model(resources_dir, info)
            .await
            .with_context(|| format!("failed to load caption model {}", id))?;
        registry.register(id, model);
    }

    tracing::info!("caption models ready: {:?}", registry.names());
    Ok(registry)
}

async fn load_caption_model(
    resources_dir: &Path,
    info: CaptionModelInfo,
) -> anyhow::Result<ImageCaptionModel> {
    let params = info.params;
    match info.model_type {
        ConcreteModelType::BLIP => {
            let model_path = resources_dir.join(get_str_from_params(&params, "model_path")?);
            let tokenizer_path =
                resources_dir.join(get_str_from_params(&params, "tokenizer_path")?);
            let model_type = match get_optional_str_from_params(&params, "model_type") {
                Some(v) => BLIPModel::from_str(&v)
                    .map_err(|_| anyhow::anyhow!("invalid BLIP model_type {}", v))?,
                None => BLIPModel::default(),
            };
            let device = match get_optional_str_from_params(&params, "device") {
                Some(v) => ComputeDevice::from_str(&v)
                    .map_err(|_| anyhow::anyhow!("invalid device {}", v))?,
                None => ComputeDevice::default(),
            };

            tracing::info!(
                "loading {} ({}, {}) from {}",
                info.id,
                model_type.as_ref(),
                device.as_ref(),
                model_path.display()
            );

            AIModel::new(info.id, move || async move {
                BLIP::new(model_path, tokenizer_path, model_type, device).await
            })
            .await
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! A stand-in captioner so handlers can be tested without weights.

    use super::ModelRegistry;
    use ai::{AIModel, ImageCaptionInput, ImageCaptionOutput, Model};
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    /// Describes the image size, one word per token, cut at `max_length`.
    pub struct StubCaptioner {
        pub calls: Arc<AtomicUsize>,
    }

    impl Model for StubCaptioner {
        type Item = ImageCaptionInput;
        type Output = ImageCaptionOutput;

        fn batch_size_limit(&self) -> usize {
            1
        }

        async fn process(
            &mut self,
            items: Vec<ImageCaptionInput>,
        ) -> anyhow::Result<Vec<anyhow::Result<ImageCaptionOutput>>> {
            self.calls.fetch_add(items.len(), Ordering::SeqCst);
            Ok(items
                .into_iter()
                .map(|item| {
                    let (height, width, _) = item.image.dim();
                    let size = format!("{}x{}", width, height);
                    let caption = ["a", size.as_str(), "picture", "of", "something"]
                        .into_iter()
                        .take(item.max_length.max(1))
                        .collect::<Vec<_>>()
                        .join(" ");
                    Ok(caption)
                })
                .collect())
        }
    }

    pub async fn stub_registry(name: &str) -> (ModelRegistry, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let model = AIModel::new(name.to_string(), move || async move {
            Ok(StubCaptioner { calls: calls_clone })
        })
        .await
        .expect("create stub captioner");

        let mut registry = ModelRegistry::new();
        registry.register(name, model);
        (registry, calls)
    }
}
