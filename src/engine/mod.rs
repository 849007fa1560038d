pub mod checkpoint;
pub mod control_loop;
pub mod loop_detector;
pub mod prompts;
pub mod state;

pub use checkpoint::Checkpoint;
pub use control_loop::{CancelFlag, ControlLoop, PhaseTransition, SessionOutcome, SessionStatus};
pub use loop_detector::{LoopDetector, Stagnation};
pub use state::{AgentState, Phase};
