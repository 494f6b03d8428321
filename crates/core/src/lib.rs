//! Core library for timed audiovisual sequences.
//!
//! A sequence is a fixed-length run that drives a 2D or 3D scene and
//! synthesized audio from one clock, fires timed cues along the way and
//! tells its host exactly once when it is done. Each module owns one part of
//! that: the timeline and driver, procedural audio, renderers, the
//! completion signal and the mount contract hosts use.

pub mod analysis;
pub mod assets;
pub mod audio;
pub mod completion;
pub mod config;
pub mod driver;
pub mod error;
pub mod host;
pub mod mapping;
pub mod presets;
pub mod render;
pub mod scene;
pub mod timeline;
pub mod view;

pub use analysis::{AudioProbe, ProbeFrame, ProbeSummary};
pub use assets::{AssetKind, AssetStatus, AssetStore};
pub use audio::{AudioEngine, EngineState, Sound};
pub use completion::{CompletionReceiver, CompletionSignal};
pub use config::{AppConfig, AudioConfig, RenderConfig, SequenceConfig};
pub use driver::{FrameLoop, Sequence, SequenceDriver, TickOutcome};
pub use error::{Result, SequenceError};
pub use host::{FrameRegistry, Viewport, ViewportBus};
pub use mapping::{Intensities, IntensityMatrix};
pub use presets::PresetKind;
pub use render::{FrameContext, FrameRng, Renderer, VisualFlag};
pub use scene::{SceneDescriptor, SceneInstance, ShadingMode};
pub use timeline::{Clock, ManualClock, MonotonicClock, Progress, Timeline};
pub use view::{Host, MountOptions, SequenceView};
