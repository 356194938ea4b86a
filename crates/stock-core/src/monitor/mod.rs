pub mod dispatcher;
pub mod engine;
pub mod evaluator;
pub mod status;
pub mod tracker;

pub use dispatcher::{DispatchSummary, Dispatcher, Listener, ListenerError};
pub use engine::Monitor;
pub use evaluator::evaluate;
pub use status::{Observation, PollResult, Status, TargetStatus, TransitionKind};
pub use tracker::StateTracker;
