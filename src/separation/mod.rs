//! Chunked stem separation.

pub mod chunk_plan;
pub mod orchestrator;
pub mod overlap_add;
pub mod separator;

pub use chunk_plan::{ChunkPlan, ChunkPolicy, Segment, plan};
pub use orchestrator::{
    InputAudio, OrchestratorConfig, RunEvent, RunFailure, RunHandle, RunReport, RunRequest,
    RunState, SeparationOrchestrator, StemOutput,
};
pub use overlap_add::OverlapAdd;
pub use separator::{MockSeparator, PassthroughSeparator, StemSeparator};
