pub mod engine;
pub mod process;
pub mod result;
pub mod stats;

pub use engine::{Engine, EngineConfig, EngineState};
pub use process::{KillReason, ManagedProcess};
pub use result::{ExitState, ProcessOutcome, TestResult, TestStatus};
pub use stats::{ResourceReading, Sample, SampleStats};
