//! Hardware boundary: capability traits, the axis registry and mock devices.

pub mod capabilities;
pub mod mock;
pub mod registry;

pub use capabilities::{Movable, Readable};
pub use mock::{MockAxis, MockDetector, MotionLog, MotionRecord};
pub use registry::{create_mock_registry, AxisRegistry, MOCK_DETECTOR};
