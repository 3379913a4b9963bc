//! Shared data model: phases, wire events, status snapshots and briefings

pub mod briefing;
pub mod event;
pub mod phase;
pub mod status;

pub use briefing::{
    default_skeleton, deep_merge, EngineeredSolution, EvidenceDossier, GraphEdge, GraphNode,
    GraphNodeKind, InputMode, RedTeamAnalysis, SearchLevel, Source, SourceFeedback,
    StrategicBriefing, VisualData,
};
pub use event::{AgentEvent, END_MARKER, START_MARKER};
pub use phase::{Phase, PHASE_ORDER, WIRE_PHASES};
pub use status::{OperationStatus, ReasoningCycle, VectorStatus};
