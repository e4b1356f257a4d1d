use std::sync::Arc;

use anyhow::Result;

use crate::catalog::ClassCatalog;
use crate::detect::backend::DetectorBackend;
use crate::detect::result::Detection;
use crate::error::SessionError;
use crate::frame::Frame;

type Loader = Box<dyn FnOnce() -> Result<Box<dyn DetectorBackend>> + Send>;

enum BackendState {
    Pending { name: String, loader: Loader },
    Ready(Box<dyn DetectorBackend>),
    Failed { name: String, reason: String },
    Loading,
}

/// Session-facing detector.
///
/// Wraps a backend, labels its output through the catalog and turns every failure into
/// `None` ("no result"). A lazily built detector loads its model exactly once: on the
/// first `detect` or an explicit `ensure_loaded`. A failed load is remembered and not
/// retried.
pub struct Detector {
    state: BackendState,
    catalog: Arc<ClassCatalog>,
}

impl Detector {
    pub fn new<B: DetectorBackend + 'static>(backend: B, catalog: Arc<ClassCatalog>) -> Self {
        Self::from_boxed(Box::new(backend), catalog)
    }

    pub fn from_boxed(backend: Box<dyn DetectorBackend>, catalog: Arc<ClassCatalog>) -> Self {
        Self {
            state: BackendState::Ready(backend),
            catalog,
        }
    }

    /// Defer model loading until first use.
    pub fn lazy<F>(name: impl Into<String>, catalog: Arc<ClassCatalog>, loader: F) -> Self
    where
        F: FnOnce() -> Result<Box<dyn DetectorBackend>> + Send + 'static,
    {
        Self {
            state: BackendState::Pending {
                name: name.into(),
                loader: Box::new(loader),
            },
            catalog,
        }
    }

    pub fn name(&self) -> &str {
        match &self.state {
            BackendState::Pending { name, .. } | BackendState::Failed { name, .. } => name,
            BackendState::Ready(backend) => backend.name(),
            BackendState::Loading => "loading",
        }
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self.state, BackendState::Ready(_))
    }

    pub fn catalog(&self) -> &Arc<ClassCatalog> {
        &self.catalog
    }

    /// Load the backend if it has not been loaded yet.
    pub fn ensure_loaded(&mut self) -> Result<(), SessionError> {
        if matches!(self.state, BackendState::Pending { .. }) {
            if let BackendState::Pending { name, loader } =
                std::mem::replace(&mut self.state, BackendState::Loading)
            {
                self.state = match loader().and_then(|mut backend| {
                    backend.warm_up()?;
                    Ok(backend)
                }) {
                    Ok(backend) => {
                        log::info!("detector '{}' loaded", name);
                        BackendState::Ready(backend)
                    }
                    Err(err) => {
                        log::error!("detector '{}' failed to load: {:#}", name, err);
                        BackendState::Failed {
                            name,
                            reason: format!("{:#}", err),
                        }
                    }
                };
            }
        }

        match &self.state {
            BackendState::Ready(_) => Ok(()),
            BackendState::Failed { name, reason } => Err(SessionError::DetectionUnavailable(
                format!("detector '{}' not loaded: {}", name, reason),
            )),
            BackendState::Pending { .. } | BackendState::Loading => Err(
                SessionError::DetectionUnavailable("detector not loaded".to_string()),
            ),
        }
    }

    /// Run detection. `None` means "skip this frame".
    pub fn detect(&mut self, frame: &Frame, confidence_threshold: f32) -> Option<Vec<Detection>> {
        if let Err(err) = self.ensure_loaded() {
            log::debug!("frame {} skipped: {}", frame.index, err);
            return None;
        }
        let BackendState::Ready(backend) = &mut self.state else {
            return None;
        };
        match backend.detect(frame, confidence_threshold) {
            Ok(raw) => Some(
                raw.into_iter()
                    .map(|r| Detection::labelled(r, &self.catalog))
                    .collect(),
            ),
            Err(err) => {
                log::warn!(
                    "detector '{}' failed on frame {}: {:#}",
                    backend.name(),
                    frame.index,
                    err
                );
                None
            }
        }
    }
}
