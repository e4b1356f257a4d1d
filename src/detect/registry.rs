use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Result};

use crate::catalog::ClassCatalog;
use crate::detect::backend::DetectorBackend;
use crate::detect::backends::ReplayBackend;
use crate::detect::detector::Detector;
use crate::detect::postprocess::DEFAULT_IOU_THRESHOLD;

/// Model input side used when no size is configured.
pub const DEFAULT_INPUT_SIZE: u32 = 640;

/// Settings handed to backend factories.
#[derive(Clone, Debug)]
pub struct DetectorSettings {
    pub model_path: Option<PathBuf>,
    pub replay_path: Option<PathBuf>,
    pub input_size: u32,
    pub iou_threshold: f32,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            model_path: None,
            replay_path: None,
            input_size: DEFAULT_INPUT_SIZE,
            iou_threshold: DEFAULT_IOU_THRESHOLD,
        }
    }
}

pub type BackendFactory = fn(&DetectorSettings) -> Result<Box<dyn DetectorBackend>>;

/// Registry of named detector backend factories.
pub struct BackendRegistry {
    factories: HashMap<String, BackendFactory>,
    default_name: Option<String>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
            default_name: None,
        }
    }

    /// Registry with every backend compiled into this build.
    ///
    /// The model backend is the default when present; otherwise replay.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        #[cfg(feature = "backend-tract")]
        registry.register("tract", build_tract);
        registry.register("replay", build_replay);
        registry
    }

    /// Register a factory. The first registered backend becomes the default.
    pub fn register(&mut self, name: &str, factory: BackendFactory) {
        if self.default_name.is_none() {
            self.default_name = Some(name.to_string());
        }
        self.factories.insert(name.to_string(), factory);
    }

    /// Set default backend by name.
    pub fn set_default(&mut self, name: &str) -> Result<()> {
        if !self.factories.contains_key(name) {
            return Err(anyhow!("backend '{}' not registered", name));
        }
        self.default_name = Some(name.to_string());
        Ok(())
    }

    pub fn default_name(&self) -> Option<&str> {
        self.default_name.as_deref()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// List registered backends, sorted.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }

    /// Build a backend immediately.
    pub fn build(&self, name: &str, settings: &DetectorSettings) -> Result<Box<dyn DetectorBackend>> {
        let factory = self.factory(name)?;
        factory(settings)
    }

    /// Build a detector that loads its backend on first use.
    ///
    /// Only an unknown backend name fails here; load errors surface from the detector.
    pub fn detector(
        &self,
        name: &str,
        settings: &DetectorSettings,
        catalog: Arc<ClassCatalog>,
    ) -> Result<Detector> {
        let factory = self.factory(name)?;
        let settings = settings.clone();
        Ok(Detector::lazy(name, catalog, move || factory(&settings)))
    }

    fn factory(&self, name: &str) -> Result<BackendFactory> {
        self.factories.get(name).copied().ok_or_else(|| {
            anyhow!(
                "detector backend '{}' not available (registered: {})",
                name,
                self.list().join(", ")
            )
        })
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn build_replay(settings: &DetectorSettings) -> Result<Box<dyn DetectorBackend>> {
    let path = settings
        .replay_path
        .as_ref()
        .ok_or_else(|| anyhow!("replay backend requires a replay file path"))?;
    Ok(Box::new(ReplayBackend::from_path(path)?))
}

#[cfg(feature = "backend-tract")]
fn build_tract(settings: &DetectorSettings) -> Result<Box<dyn DetectorBackend>> {
    use crate::detect::backends::TractBackend;

    let path = settings
        .model_path
        .as_ref()
        .ok_or_else(|| anyhow!("tract backend requires a model path"))?;
    Ok(Box::new(
        TractBackend::new(path, settings.input_size)?.with_iou_threshold(settings.iou_threshold),
    ))
}
