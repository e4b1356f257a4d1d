mod backend;
pub mod backends;
mod detector;
pub mod postprocess;
mod registry;
mod result;

pub use backend::DetectorBackend;
pub use backends::{ReplayBackend, ReplayEntry};
pub use detector::Detector;
pub use registry::{BackendFactory, BackendRegistry, DetectorSettings, DEFAULT_INPUT_SIZE};
pub use result::{BoundingBox, Detection, RawDetection};
