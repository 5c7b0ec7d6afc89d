//! 编排核心：Plan/Execute/Reflect 状态机与 Run 协调

pub mod coordinator;
pub mod events;
pub mod loop_;
pub mod planner;
pub mod reflector;
pub mod types;

pub use coordinator::RunCoordinator;
pub use events::RunEvent;
pub use loop_::{run_loop, LoopSettings, RunContext};
pub use planner::Planner;
pub use reflector::{ReflectInput, Reflector};
pub use types::{
    Plan, ReflectionDecision, Run, RunFailure, RunReport, RunStatus, Step, StepStatus,
    StepSummary, Task,
};
