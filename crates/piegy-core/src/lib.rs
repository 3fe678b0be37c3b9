pub mod config;
pub mod constants;
pub mod event;
pub mod experiment;
pub mod grid;
pub mod metrics;
pub mod outcome;
pub mod patch;
pub mod rates;
pub mod record;
pub mod rng;
pub mod sampler;
pub mod simulation;
pub mod storage;
pub mod topology;

pub use config::{BoundaryMode, PatchParams, PayoffMatrix, Population, SimConfig, SimConfigError};
pub use experiment::{Experiment, RunResult};
pub use grid::{build_grid, Grid, GridError};
pub use metrics::{ExperimentSummary, FailedRun};
pub use outcome::{RunFailure, RunOutcome};
pub use record::{RecordSink, Trajectory};
pub use rng::{ChaChaSource, UniformSource};
pub use simulation::{run, RunReport, RunSettings, RunState, Simulation};
