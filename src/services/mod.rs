pub mod monitor;
pub mod process_checker;
pub mod stats_collector;
pub mod supervisor;

pub use monitor::{LogSink, Monitor, SampleSink};
pub use process_checker::{ExitVerdict, OutputParser, TrimmedOutput, Verdict};
pub use stats_collector::{ProbeError, ResourceProbe, SysinfoProbe};
pub use supervisor::{Supervisor, SupervisorError};
