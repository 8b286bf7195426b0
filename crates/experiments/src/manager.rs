use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use realty_core::{Aggregate, AggregateId, DomainError, DomainResult};
use realty_events::{EventEnvelope, EventStream};

use crate::config::ExperimentConfig;
use crate::experiment::{
    AddVariant, CreateExperiment, Experiment, ExperimentCommand, ExperimentEvent, ExperimentId,
    ExperimentStatus, RecordDataPoint, Transition, Variant, VariantSpec,
};
use crate::stats::{self, Interval};
use crate::templates;

const AGGREGATE_TYPE: &str = "experiments.test";

struct Entry {
    experiment: Experiment,
    history: EventStream<ExperimentEvent>,
}

/// Owns experiments, routes lifecycle commands and computes results.
///
/// Experiments are kept in creation order (v7 ids sort by time).
pub struct ABTestManager {
    config: ExperimentConfig,
    experiments: BTreeMap<ExperimentId, Entry>,
}

impl Default for ABTestManager {
    fn default() -> Self {
        Self::new(ExperimentConfig::default())
    }
}

impl ABTestManager {
    pub fn new(config: ExperimentConfig) -> Self {
        Self {
            config,
            experiments: BTreeMap::new(),
        }
    }

    pub fn config(&self) -> &ExperimentConfig {
        &self.config
    }

    pub fn create_test<I, S>(
        &mut self,
        name: impl Into<String>,
        hypothesis: impl Into<String>,
        variants: I,
    ) -> DomainResult<ExperimentId>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.create(CreateExperiment {
            experiment_id: ExperimentId::new(AggregateId::new()),
            name: name.into(),
            hypothesis: hypothesis.into(),
            description: String::new(),
            template: None,
            variants: variants.into_iter().map(VariantSpec::new).collect(),
            occurred_at: Utc::now(),
        })
    }

    /// Create a Draft experiment from a named template. `name` overrides the
    /// template's default name.
    pub fn create_test_from_template(
        &mut self,
        template: &str,
        name: Option<&str>,
        hypothesis: impl Into<String>,
    ) -> DomainResult<ExperimentId> {
        let template = templates::find(template)
            .ok_or_else(|| DomainError::not_found(format!("experiment template '{template}'")))?;

        self.create(CreateExperiment {
            experiment_id: ExperimentId::new(AggregateId::new()),
            name: name.unwrap_or(template.name).to_string(),
            hypothesis: hypothesis.into(),
            description: template.description.to_string(),
            template: Some(template.key.to_string()),
            variants: template
                .variants
                .iter()
                .map(|(label, description)| VariantSpec {
                    label: label.to_string(),
                    description: description.to_string(),
                })
                .collect(),
            occurred_at: Utc::now(),
        })
    }

    pub fn add_variant(&mut self, id: ExperimentId, label: impl Into<String>) -> DomainResult<()> {
        self.route(
            id,
            ExperimentCommand::AddVariant(AddVariant {
                experiment_id: id,
                variant: VariantSpec::new(label),
                occurred_at: Utc::now(),
            }),
        )
    }

    pub fn start_test(&mut self, id: ExperimentId) -> DomainResult<()> {
        self.route(id, ExperimentCommand::Start(transition(id)))
    }

    pub fn stop_test(&mut self, id: ExperimentId) -> DomainResult<()> {
        self.route(id, ExperimentCommand::Stop(transition(id)))
    }

    pub fn complete_test(&mut self, id: ExperimentId) -> DomainResult<()> {
        self.route(id, ExperimentCommand::Complete(transition(id)))
    }

    pub fn add_data_point(
        &mut self,
        id: ExperimentId,
        variant_label: &str,
        converted: bool,
        value: f64,
    ) -> DomainResult<()> {
        self.route(
            id,
            ExperimentCommand::RecordDataPoint(RecordDataPoint {
                experiment_id: id,
                variant_label: variant_label.to_string(),
                converted,
                value,
                occurred_at: Utc::now(),
            }),
        )
    }

    pub fn experiment(&self, id: ExperimentId) -> DomainResult<&Experiment> {
        self.entry(id).map(|entry| &entry.experiment)
    }

    pub fn history(&self, id: ExperimentId) -> DomainResult<&[EventEnvelope<ExperimentEvent>]> {
        self.entry(id).map(|entry| entry.history.events())
    }

    pub fn list_tests(&self, status: Option<ExperimentStatus>) -> Vec<&Experiment> {
        self.experiments
            .values()
            .map(|entry| &entry.experiment)
            .filter(|experiment| status.is_none_or(|s| experiment.status() == s))
            .collect()
    }

    pub fn test_summary(&self) -> TestSummary {
        let mut status_breakdown: BTreeMap<ExperimentStatus, usize> = BTreeMap::new();
        for entry in self.experiments.values() {
            *status_breakdown.entry(entry.experiment.status()).or_default() += 1;
        }

        TestSummary {
            total_tests: self.experiments.len(),
            status_breakdown,
            templates_available: templates::keys(),
            generated_at: Utc::now(),
        }
    }

    /// Current statistics for every variant against the first (control) variant.
    ///
    /// `Ok(None)` while any variant still has zero visitors.
    pub fn get_current_results(&self, id: ExperimentId) -> DomainResult<Option<ExperimentResults>> {
        let experiment = self.experiment(id)?;
        Ok(compute_results(experiment, self.config.confidence_level()))
    }

    /// Experiment metadata plus current results as pretty-printed JSON.
    pub fn export_results(&self, id: ExperimentId) -> DomainResult<String> {
        let experiment = self.experiment(id)?;
        let export = ExperimentExport {
            experiment_id: experiment.id_typed(),
            name: experiment.name().to_string(),
            hypothesis: experiment.hypothesis().to_string(),
            description: experiment.description().to_string(),
            template: experiment.template().map(str::to_string),
            status: experiment.status(),
            created_at: experiment.created_at(),
            started_at: experiment.started_at(),
            ended_at: experiment.ended_at(),
            variants: experiment.variants().to_vec(),
            results: compute_results(experiment, self.config.confidence_level()),
        };

        serde_json::to_string_pretty(&export)
            .map_err(|e| DomainError::validation(format!("experiment export failed: {e}")))
    }

    fn create(&mut self, cmd: CreateExperiment) -> DomainResult<ExperimentId> {
        let id = cmd.experiment_id;
        if self.experiments.contains_key(&id) {
            return Err(DomainError::conflict(format!("experiment {id} already exists")));
        }

        let mut experiment = Experiment::empty(id);
        let events = experiment.execute(&ExperimentCommand::Create(cmd))?;

        let mut history = EventStream::new(id.0, AGGREGATE_TYPE);
        history.append(events);

        info!(
            experiment_id = %id,
            name = experiment.name(),
            variants = experiment.variants().len(),
            "experiment created"
        );
        self.experiments.insert(id, Entry { experiment, history });
        Ok(id)
    }

    fn entry(&self, id: ExperimentId) -> DomainResult<&Entry> {
        self.experiments
            .get(&id)
            .ok_or_else(|| DomainError::not_found(format!("experiment {id}")))
    }

    fn route(&mut self, id: ExperimentId, cmd: ExperimentCommand) -> DomainResult<()> {
        let entry = self
            .experiments
            .get_mut(&id)
            .ok_or_else(|| DomainError::not_found(format!("experiment {id}")))?;

        let before = entry.experiment.status();
        let events = entry.experiment.execute(&cmd)?;
        entry.history.append(events);

        let after = entry.experiment.status();
        if before != after {
            info!(
                experiment_id = %id,
                from = before.as_str(),
                to = after.as_str(),
                "experiment transitioned"
            );
        } else {
            debug!(experiment_id = %id, "experiment updated");
        }
        Ok(())
    }
}

fn transition(id: ExperimentId) -> Transition {
    Transition {
        experiment_id: id,
        occurred_at: Utc::now(),
    }
}

fn compute_results(experiment: &Experiment, confidence_level: f64) -> Option<ExperimentResults> {
    let variants = experiment.variants();
    let control = variants.first()?;
    if variants.iter().any(|v| v.visitor_count() == 0) {
        return None;
    }

    let control_counts = (control.conversion_count(), control.visitor_count());
    let mut results = Vec::with_capacity(variants.len());
    for (i, variant) in variants.iter().enumerate() {
        let comparison = if i == 0 {
            None
        } else {
            let cmp = stats::compare_proportions(
                control_counts,
                (variant.conversion_count(), variant.visitor_count()),
                confidence_level,
            )?;
            let relative_lift = (cmp.control_rate > 0.0)
                .then(|| (cmp.treatment_rate - cmp.control_rate) / cmp.control_rate);
            Some(ControlComparison {
                control_interval: cmp.control_interval,
                confidence_interval: cmp.treatment_interval,
                difference: cmp.difference,
                relative_lift,
                z_score: cmp.z_score,
                p_value: cmp.p_value,
                significant: cmp.significant,
            })
        };

        results.push(VariantResult {
            label: variant.label().to_string(),
            visitors: variant.visitor_count(),
            conversions: variant.conversion_count(),
            conversion_rate: variant.conversion_rate(),
            average_value: variant.average_value(),
            is_control: i == 0,
            comparison,
        });
    }

    // First variant wins ties.
    let leader = results
        .iter()
        .fold(None::<&VariantResult>, |best, v| match best {
            Some(b) if b.conversion_rate >= v.conversion_rate => Some(b),
            _ => Some(v),
        })
        .map(|v| v.label.clone());

    Some(ExperimentResults {
        experiment_id: experiment.id_typed(),
        name: experiment.name().to_string(),
        status: experiment.status(),
        confidence_level,
        total_visitors: experiment.total_visitors(),
        any_significant: results
            .iter()
            .any(|v| v.comparison.as_ref().is_some_and(|c| c.significant)),
        leader,
        variants: results,
    })
}

/// Statistics of a treatment variant relative to the control.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlComparison {
    /// Comparison interval of the control rate for this pair.
    pub control_interval: Interval,
    /// Comparison interval of this variant's rate.
    pub confidence_interval: Interval,
    /// Interval of the rate difference (variant minus control).
    pub difference: Interval,
    /// Relative change vs. control; `None` when the control rate is zero.
    pub relative_lift: Option<f64>,
    pub z_score: f64,
    pub p_value: f64,
    pub significant: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantResult {
    pub label: String,
    pub visitors: u64,
    pub conversions: u64,
    pub conversion_rate: f64,
    pub average_value: f64,
    pub is_control: bool,
    pub comparison: Option<ControlComparison>,
}

/// Read-only snapshot of an experiment's statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentResults {
    pub experiment_id: ExperimentId,
    pub name: String,
    pub status: ExperimentStatus,
    pub confidence_level: f64,
    pub total_visitors: u64,
    pub variants: Vec<VariantResult>,
    /// Label of the variant with the highest conversion rate.
    pub leader: Option<String>,
    pub any_significant: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestSummary {
    pub total_tests: usize,
    pub status_breakdown: BTreeMap<ExperimentStatus, usize>,
    pub templates_available: Vec<&'static str>,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
struct ExperimentExport {
    experiment_id: ExperimentId,
    name: String,
    hypothesis: String,
    description: String,
    template: Option<String>,
    status: ExperimentStatus,
    created_at: Option<DateTime<Utc>>,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    variants: Vec<Variant>,
    results: Option<ExperimentResults>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn running_test(manager: &mut ABTestManager) -> ExperimentId {
        let id = manager
            .create_test("Open house banner", "A banner lifts sign-ups", ["control", "banner"])
            .unwrap();
        manager.start_test(id).unwrap();
        id
    }

    fn feed(manager: &mut ABTestManager, id: ExperimentId, label: &str, visitors: u64, conversions: u64) {
        for i in 0..visitors {
            manager.add_data_point(id, label, i < conversions, 0.0).unwrap();
        }
    }

    #[test]
    fn unknown_experiment_is_not_found_everywhere() {
        let mut manager = ABTestManager::default();
        let id = ExperimentId::new(AggregateId::new());

        assert!(manager.start_test(id).unwrap_err().is_not_found());
        assert!(manager.stop_test(id).unwrap_err().is_not_found());
        assert!(manager.complete_test(id).unwrap_err().is_not_found());
        assert!(manager.add_variant(id, "x").unwrap_err().is_not_found());
        assert!(manager.add_data_point(id, "a", true, 1.0).unwrap_err().is_not_found());
        assert!(manager.get_current_results(id).unwrap_err().is_not_found());
        assert!(manager.export_results(id).unwrap_err().is_not_found());
    }

    #[test]
    fn data_points_outside_running_are_invalid_state() {
        let mut manager = ABTestManager::default();

        let draft = manager.create_test("Draft", "", ["a", "b"]).unwrap();
        let err = manager.add_data_point(draft, "a", true, 1.0).unwrap_err();
        assert!(matches!(err, DomainError::InvalidState(_)));

        let stopped = running_test(&mut manager);
        manager.stop_test(stopped).unwrap();
        let err = manager.add_data_point(stopped, "control", true, 1.0).unwrap_err();
        assert!(matches!(err, DomainError::InvalidState(_)));

        let completed = running_test(&mut manager);
        manager.complete_test(completed).unwrap();
        let err = manager.add_data_point(completed, "control", false, 0.0).unwrap_err();
        assert!(matches!(err, DomainError::InvalidState(_)));
    }

    #[test]
    fn start_twice_is_invalid_state() {
        let mut manager = ABTestManager::default();
        let id = running_test(&mut manager);
        let err = manager.start_test(id).unwrap_err();
        assert!(matches!(err, DomainError::InvalidState(_)));
    }

    #[test]
    fn results_are_none_until_every_variant_has_visitors() {
        let mut manager = ABTestManager::default();
        let id = running_test(&mut manager);
        assert_eq!(manager.get_current_results(id).unwrap(), None);

        feed(&mut manager, id, "control", 5, 1);
        assert_eq!(manager.get_current_results(id).unwrap(), None);

        feed(&mut manager, id, "banner", 5, 2);
        assert!(manager.get_current_results(id).unwrap().is_some());
    }

    #[test]
    fn large_lift_is_significant() {
        let mut manager = ABTestManager::default();
        let id = running_test(&mut manager);
        feed(&mut manager, id, "control", 100, 10);
        feed(&mut manager, id, "banner", 100, 20);

        let results = manager.get_current_results(id).unwrap().unwrap();
        assert_eq!(results.confidence_level, 0.95);
        assert_eq!(results.total_visitors, 200);
        assert_eq!(results.leader.as_deref(), Some("banner"));

        let control = &results.variants[0];
        assert!(control.is_control);
        assert!(control.comparison.is_none());
        assert!((control.conversion_rate - 0.10).abs() < 1e-12);

        let cmp = results.variants[1].comparison.as_ref().unwrap();
        assert!(cmp.confidence_interval.lower > cmp.control_interval.upper);
        assert!(cmp.significant);
        assert!(results.any_significant);
        assert!((cmp.relative_lift.unwrap() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn small_lift_is_not_significant() {
        let mut manager = ABTestManager::default();
        let id = running_test(&mut manager);
        feed(&mut manager, id, "control", 100, 10);
        feed(&mut manager, id, "banner", 100, 12);

        let results = manager.get_current_results(id).unwrap().unwrap();
        let cmp = results.variants[1].comparison.as_ref().unwrap();
        assert!(cmp.control_interval.overlaps(&cmp.confidence_interval));
        assert!(!cmp.significant);
        assert!(!results.any_significant);
    }

    #[test]
    fn templates_create_draft_experiments() {
        let mut manager = ABTestManager::default();
        let id = manager
            .create_test_from_template("pricing_strategy", None, "Premium pricing sells slower")
            .unwrap();

        let experiment = manager.experiment(id).unwrap();
        assert_eq!(experiment.status(), ExperimentStatus::Draft);
        assert_eq!(experiment.name(), "Pricing Strategy Test");
        assert_eq!(experiment.template(), Some("pricing_strategy"));
        assert_eq!(experiment.variants()[0].label(), "Market Price");

        let err = manager
            .create_test_from_template("billboards", Some("x"), "")
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn summary_and_listing_track_statuses() {
        let mut manager = ABTestManager::default();
        manager.create_test("one", "", ["a", "b"]).unwrap();
        let running = running_test(&mut manager);

        let summary = manager.test_summary();
        assert_eq!(summary.total_tests, 2);
        assert_eq!(summary.status_breakdown.get(&ExperimentStatus::Draft), Some(&1));
        assert_eq!(summary.status_breakdown.get(&ExperimentStatus::Running), Some(&1));
        assert_eq!(summary.templates_available.len(), 3);

        let listed = manager.list_tests(Some(ExperimentStatus::Running));
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id_typed(), running);
        assert_eq!(manager.list_tests(None).len(), 2);
    }

    #[test]
    fn export_contains_variants_and_results() {
        let mut manager = ABTestManager::default();
        let id = running_test(&mut manager);
        feed(&mut manager, id, "control", 3, 1);
        feed(&mut manager, id, "banner", 3, 2);

        let json = manager.export_results(id).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["status"], "running");
        assert_eq!(value["variants"].as_array().unwrap().len(), 2);
        assert_eq!(value["results"]["leader"], "banner");
    }

    #[test]
    fn history_records_every_applied_event() {
        let mut manager = ABTestManager::default();
        let id = running_test(&mut manager);
        feed(&mut manager, id, "control", 2, 1);
        let _ = manager.add_data_point(id, "ghost", true, 0.0);

        assert_eq!(manager.history(id).unwrap().len(), 4);
    }

    #[derive(Debug, Clone)]
    enum Op {
        DataPoint { variant: usize, converted: bool, value: f64 },
        Stop,
        Complete,
        Start,
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            8 => (0usize..3, any::<bool>(), -1_000.0f64..1_000.0)
                .prop_map(|(variant, converted, value)| Op::DataPoint { variant, converted, value }),
            1 => Just(Op::Stop),
            1 => Just(Op::Complete),
            1 => Just(Op::Start),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: conversions never exceed visitors for any variant, whatever
        /// sequence of operations is applied.
        #[test]
        fn conversions_never_exceed_visitors(ops in prop::collection::vec(op_strategy(), 0..60)) {
            let mut manager = ABTestManager::default();
            let id = manager.create_test("prop", "", ["a", "b", "c"]).unwrap();
            manager.start_test(id).unwrap();
            let labels = ["a", "b", "c"];

            for op in ops {
                let _ = match op {
                    Op::DataPoint { variant, converted, value } => {
                        manager.add_data_point(id, labels[variant], converted, value)
                    }
                    Op::Stop => manager.stop_test(id),
                    Op::Complete => manager.complete_test(id),
                    Op::Start => manager.start_test(id),
                };

                for variant in manager.experiment(id).unwrap().variants() {
                    prop_assert!(variant.conversion_count() <= variant.visitor_count());
                }
            }
        }
    }
}
