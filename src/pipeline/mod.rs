//! キャプチャと推論を分離したリアルタイムパイプライン
pub mod scheduler;
pub mod slot;
pub mod stage;

pub use scheduler::{
    FrameResults, FrameSource, Pipeline, PipelineReport, RenderControl, ResultSink, StampedFrame,
};
pub use slot::LatestSlot;
pub use stage::{StageCell, StageState, StopReason, StopSignal};
