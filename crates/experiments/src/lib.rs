//! A/B testing: experiments, their variants and conversion statistics.
//!
//! The experiment lifecycle is a command/event aggregate; `ABTestManager`
//! owns the experiments and derives read-only results from their counters.

pub mod config;
pub mod experiment;
pub mod manager;
pub mod stats;
pub mod templates;

pub use config::ExperimentConfig;
pub use experiment::{
    Experiment, ExperimentCommand, ExperimentEvent, ExperimentId, ExperimentStatus, Variant,
    VariantSpec,
};
pub use manager::{ABTestManager, ControlComparison, ExperimentResults, TestSummary, VariantResult};
pub use stats::{Interval, ProportionComparison};
pub use templates::ExperimentTemplate;
