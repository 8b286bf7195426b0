use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use realty_core::{Aggregate, AggregateId, AggregateRoot, DomainError};
use realty_events::Event;

/// Experiment identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExperimentId(pub AggregateId);

impl ExperimentId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for ExperimentId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Experiment lifecycle: `Draft -> Running -> Stopped | Completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExperimentStatus {
    Draft,
    Running,
    Stopped,
    Completed,
}

impl ExperimentStatus {
    pub const ALL: [ExperimentStatus; 4] = [
        ExperimentStatus::Draft,
        ExperimentStatus::Running,
        ExperimentStatus::Stopped,
        ExperimentStatus::Completed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ExperimentStatus::Draft => "draft",
            ExperimentStatus::Running => "running",
            ExperimentStatus::Stopped => "stopped",
            ExperimentStatus::Completed => "completed",
        }
    }
}

/// One arm of an experiment with its counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variant {
    label: String,
    description: String,
    visitor_count: u64,
    conversion_count: u64,
    value_sum: f64,
}

impl Variant {
    pub fn new(label: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            description: description.into(),
            visitor_count: 0,
            conversion_count: 0,
            value_sum: 0.0,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn visitor_count(&self) -> u64 {
        self.visitor_count
    }

    pub fn conversion_count(&self) -> u64 {
        self.conversion_count
    }

    pub fn value_sum(&self) -> f64 {
        self.value_sum
    }

    pub fn conversion_rate(&self) -> f64 {
        if self.visitor_count == 0 {
            0.0
        } else {
            self.conversion_count as f64 / self.visitor_count as f64
        }
    }

    pub fn average_value(&self) -> f64 {
        if self.visitor_count == 0 {
            0.0
        } else {
            self.value_sum / self.visitor_count as f64
        }
    }

    fn record(&mut self, converted: bool, value: f64) {
        self.visitor_count += 1;
        if converted {
            self.conversion_count += 1;
        }
        self.value_sum += value;
    }
}

/// Aggregate root: Experiment (A/B test).
#[derive(Debug, Clone, PartialEq)]
pub struct Experiment {
    id: ExperimentId,
    name: String,
    hypothesis: String,
    description: String,
    template: Option<String>,
    status: ExperimentStatus,
    variants: Vec<Variant>,
    created_at: Option<DateTime<Utc>>,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl Experiment {
    /// Create an empty, not-yet-created aggregate instance.
    pub fn empty(id: ExperimentId) -> Self {
        Self {
            id,
            name: String::new(),
            hypothesis: String::new(),
            description: String::new(),
            template: None,
            status: ExperimentStatus::Draft,
            variants: Vec::new(),
            created_at: None,
            started_at: None,
            ended_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> ExperimentId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn hypothesis(&self) -> &str {
        &self.hypothesis
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn template(&self) -> Option<&str> {
        self.template.as_deref()
    }

    pub fn status(&self) -> ExperimentStatus {
        self.status
    }

    /// Variants in creation order; the first one is the control.
    pub fn variants(&self) -> &[Variant] {
        &self.variants
    }

    pub fn variant(&self, label: &str) -> Option<&Variant> {
        self.variants.iter().find(|v| v.label == label)
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    pub fn total_visitors(&self) -> u64 {
        self.variants.iter().map(|v| v.visitor_count).sum()
    }
}

impl AggregateRoot for Experiment {
    type Id = ExperimentId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Label plus free-text description of a variant to create.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantSpec {
    pub label: String,
    pub description: String,
}

impl VariantSpec {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            description: String::new(),
        }
    }
}

/// Command: CreateExperiment. Needs at least two distinct, non-empty labels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateExperiment {
    pub experiment_id: ExperimentId,
    pub name: String,
    pub hypothesis: String,
    pub description: String,
    pub template: Option<String>,
    pub variants: Vec<VariantSpec>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AddVariant (Draft only).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddVariant {
    pub experiment_id: ExperimentId,
    pub variant: VariantSpec,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordDataPoint (Running only).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordDataPoint {
    pub experiment_id: ExperimentId,
    pub variant_label: String,
    pub converted: bool,
    pub value: f64,
    pub occurred_at: DateTime<Utc>,
}

/// Command for plain lifecycle transitions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub experiment_id: ExperimentId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExperimentCommand {
    Create(CreateExperiment),
    AddVariant(AddVariant),
    Start(Transition),
    RecordDataPoint(RecordDataPoint),
    Stop(Transition),
    Complete(Transition),
}

/// Event: ExperimentCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExperimentCreated {
    pub experiment_id: ExperimentId,
    pub name: String,
    pub hypothesis: String,
    pub description: String,
    pub template: Option<String>,
    pub variants: Vec<VariantSpec>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: VariantAdded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantAdded {
    pub experiment_id: ExperimentId,
    pub variant: VariantSpec,
    pub occurred_at: DateTime<Utc>,
}

/// Event: DataPointRecorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPointRecorded {
    pub experiment_id: ExperimentId,
    pub variant_label: String,
    pub converted: bool,
    pub value: f64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExperimentEvent {
    Created(ExperimentCreated),
    VariantAdded(VariantAdded),
    Started(Transition),
    DataPointRecorded(DataPointRecorded),
    Stopped(Transition),
    Completed(Transition),
}

impl Event for ExperimentEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ExperimentEvent::Created(_) => "experiments.test.created",
            ExperimentEvent::VariantAdded(_) => "experiments.test.variant_added",
            ExperimentEvent::Started(_) => "experiments.test.started",
            ExperimentEvent::DataPointRecorded(_) => "experiments.test.data_point_recorded",
            ExperimentEvent::Stopped(_) => "experiments.test.stopped",
            ExperimentEvent::Completed(_) => "experiments.test.completed",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ExperimentEvent::Created(e) => e.occurred_at,
            ExperimentEvent::VariantAdded(e) => e.occurred_at,
            ExperimentEvent::Started(e) => e.occurred_at,
            ExperimentEvent::DataPointRecorded(e) => e.occurred_at,
            ExperimentEvent::Stopped(e) => e.occurred_at,
            ExperimentEvent::Completed(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Experiment {
    type Command = ExperimentCommand;
    type Event = ExperimentEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ExperimentEvent::Created(e) => {
                self.id = e.experiment_id;
                self.name = e.name.clone();
                self.hypothesis = e.hypothesis.clone();
                self.description = e.description.clone();
                self.template = e.template.clone();
                self.variants = e
                    .variants
                    .iter()
                    .map(|spec| Variant::new(spec.label.clone(), spec.description.clone()))
                    .collect();
                self.status = ExperimentStatus::Draft;
                self.created_at = Some(e.occurred_at);
                self.created = true;
            }
            ExperimentEvent::VariantAdded(e) => {
                self.variants.push(Variant::new(
                    e.variant.label.clone(),
                    e.variant.description.clone(),
                ));
            }
            ExperimentEvent::Started(e) => {
                self.status = ExperimentStatus::Running;
                self.started_at = Some(e.occurred_at);
            }
            ExperimentEvent::DataPointRecorded(e) => {
                if let Some(variant) = self.variants.iter_mut().find(|v| v.label == e.variant_label) {
                    variant.record(e.converted, e.value);
                }
            }
            ExperimentEvent::Stopped(e) => {
                self.status = ExperimentStatus::Stopped;
                self.ended_at = Some(e.occurred_at);
            }
            ExperimentEvent::Completed(e) => {
                self.status = ExperimentStatus::Completed;
                self.ended_at = Some(e.occurred_at);
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ExperimentCommand::Create(cmd) => self.handle_create(cmd),
            ExperimentCommand::AddVariant(cmd) => {
                self.ensure_exists(cmd.experiment_id)?;
                self.ensure_status(ExperimentStatus::Draft, "add a variant")?;
                validate_label(&cmd.variant.label)?;
                if self.variant(&cmd.variant.label).is_some() {
                    return Err(DomainError::validation(format!(
                        "variant '{}' already exists",
                        cmd.variant.label
                    )));
                }
                Ok(vec![ExperimentEvent::VariantAdded(VariantAdded {
                    experiment_id: cmd.experiment_id,
                    variant: cmd.variant.clone(),
                    occurred_at: cmd.occurred_at,
                })])
            }
            ExperimentCommand::Start(cmd) => {
                self.ensure_exists(cmd.experiment_id)?;
                self.ensure_status(ExperimentStatus::Draft, "start")?;
                if self.variants.len() < 2 {
                    return Err(DomainError::validation(
                        "an experiment needs at least two variants to start",
                    ));
                }
                Ok(vec![ExperimentEvent::Started(cmd.clone())])
            }
            ExperimentCommand::RecordDataPoint(cmd) => self.handle_data_point(cmd),
            ExperimentCommand::Stop(cmd) => {
                self.ensure_exists(cmd.experiment_id)?;
                self.ensure_status(ExperimentStatus::Running, "stop")?;
                Ok(vec![ExperimentEvent::Stopped(cmd.clone())])
            }
            ExperimentCommand::Complete(cmd) => {
                self.ensure_exists(cmd.experiment_id)?;
                self.ensure_status(ExperimentStatus::Running, "complete")?;
                Ok(vec![ExperimentEvent::Completed(cmd.clone())])
            }
        }
    }
}

impl Experiment {
    fn ensure_exists(&self, experiment_id: ExperimentId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found(format!("experiment {experiment_id}")));
        }
        if self.id != experiment_id {
            return Err(DomainError::validation("experiment_id mismatch"));
        }
        Ok(())
    }

    fn ensure_status(&self, expected: ExperimentStatus, action: &str) -> Result<(), DomainError> {
        if self.status != expected {
            return Err(DomainError::invalid_state(format!(
                "cannot {action} an experiment in status {} (expected {})",
                self.status.as_str(),
                expected.as_str()
            )));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateExperiment) -> Result<Vec<ExperimentEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("experiment already exists"));
        }
        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("experiment name must not be empty"));
        }
        if cmd.variants.len() < 2 {
            return Err(DomainError::validation("an experiment needs at least two variants"));
        }
        for (i, spec) in cmd.variants.iter().enumerate() {
            validate_label(&spec.label)?;
            if cmd.variants[..i].iter().any(|prev| prev.label == spec.label) {
                return Err(DomainError::validation(format!(
                    "duplicate variant label '{}'",
                    spec.label
                )));
            }
        }

        Ok(vec![ExperimentEvent::Created(ExperimentCreated {
            experiment_id: cmd.experiment_id,
            name: cmd.name.clone(),
            hypothesis: cmd.hypothesis.clone(),
            description: cmd.description.clone(),
            template: cmd.template.clone(),
            variants: cmd.variants.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_data_point(&self, cmd: &RecordDataPoint) -> Result<Vec<ExperimentEvent>, DomainError> {
        self.ensure_exists(cmd.experiment_id)?;
        self.ensure_status(ExperimentStatus::Running, "record data for")?;

        if self.variant(&cmd.variant_label).is_none() {
            return Err(DomainError::not_found(format!(
                "variant '{}' in experiment {}",
                cmd.variant_label, self.id
            )));
        }
        if !cmd.value.is_finite() {
            return Err(DomainError::validation(format!(
                "data point value must be finite, got {}",
                cmd.value
            )));
        }

        Ok(vec![ExperimentEvent::DataPointRecorded(DataPointRecorded {
            experiment_id: cmd.experiment_id,
            variant_label: cmd.variant_label.clone(),
            converted: cmd.converted,
            value: cmd.value,
            occurred_at: cmd.occurred_at,
        })])
    }
}

fn validate_label(label: &str) -> Result<(), DomainError> {
    if label.trim().is_empty() {
        return Err(DomainError::validation("variant label must not be empty"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_experiment_id() -> ExperimentId {
        ExperimentId::new(AggregateId::new())
    }

    fn create_cmd(id: ExperimentId, labels: &[&str]) -> ExperimentCommand {
        ExperimentCommand::Create(CreateExperiment {
            experiment_id: id,
            name: "Listing headline".to_string(),
            hypothesis: "Shorter headlines convert better".to_string(),
            description: String::new(),
            template: None,
            variants: labels.iter().map(|l| VariantSpec::new(*l)).collect(),
            occurred_at: Utc::now(),
        })
    }

    fn transition(id: ExperimentId) -> Transition {
        Transition {
            experiment_id: id,
            occurred_at: Utc::now(),
        }
    }

    fn running() -> Experiment {
        let id = test_experiment_id();
        let mut experiment = Experiment::empty(id);
        experiment.execute(&create_cmd(id, &["control", "short"])).unwrap();
        experiment.execute(&ExperimentCommand::Start(transition(id))).unwrap();
        experiment
    }

    fn data_point(id: ExperimentId, label: &str, converted: bool, value: f64) -> ExperimentCommand {
        ExperimentCommand::RecordDataPoint(RecordDataPoint {
            experiment_id: id,
            variant_label: label.to_string(),
            converted,
            value,
            occurred_at: Utc::now(),
        })
    }

    #[test]
    fn create_requires_two_distinct_labels() {
        let id = test_experiment_id();
        let experiment = Experiment::empty(id);

        for labels in [&["only"][..], &["a", "a"][..], &["a", " "][..]] {
            let err = experiment.handle(&create_cmd(id, labels)).unwrap_err();
            assert!(matches!(err, DomainError::Validation(_)), "{labels:?}");
        }
        assert!(experiment.handle(&create_cmd(id, &["a", "b"])).is_ok());
    }

    #[test]
    fn variants_can_be_added_only_while_draft() {
        let id = test_experiment_id();
        let mut experiment = Experiment::empty(id);
        experiment.execute(&create_cmd(id, &["a", "b"])).unwrap();

        let add = |label: &str| {
            ExperimentCommand::AddVariant(AddVariant {
                experiment_id: id,
                variant: VariantSpec::new(label),
                occurred_at: Utc::now(),
            })
        };
        experiment.execute(&add("c")).unwrap();
        assert!(matches!(
            experiment.execute(&add("c")).unwrap_err(),
            DomainError::Validation(_)
        ));

        experiment.execute(&ExperimentCommand::Start(transition(id))).unwrap();
        assert!(matches!(
            experiment.execute(&add("d")).unwrap_err(),
            DomainError::InvalidState(_)
        ));
        assert_eq!(experiment.variants().len(), 3);
    }

    #[test]
    fn data_point_updates_counters() {
        let mut experiment = running();
        let id = experiment.id_typed();
        experiment.execute(&data_point(id, "short", true, 250.0)).unwrap();
        experiment.execute(&data_point(id, "short", false, 10.0)).unwrap();

        let variant = experiment.variant("short").unwrap();
        assert_eq!(variant.visitor_count(), 2);
        assert_eq!(variant.conversion_count(), 1);
        assert_eq!(variant.value_sum(), 260.0);
        assert_eq!(variant.average_value(), 130.0);
        assert_eq!(variant.conversion_rate(), 0.5);
    }

    #[test]
    fn data_point_rejections() {
        let mut experiment = running();
        let id = experiment.id_typed();

        let err = experiment.execute(&data_point(id, "missing", true, 1.0)).unwrap_err();
        assert!(err.is_not_found());

        let err = experiment.execute(&data_point(id, "short", true, f64::NAN)).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
        assert_eq!(experiment.total_visitors(), 0);
    }

    #[test]
    fn stop_and_complete_only_from_running() {
        let id = test_experiment_id();
        let mut experiment = Experiment::empty(id);
        experiment.execute(&create_cmd(id, &["a", "b"])).unwrap();

        let err = experiment.execute(&ExperimentCommand::Stop(transition(id))).unwrap_err();
        assert!(matches!(err, DomainError::InvalidState(_)));

        experiment.execute(&ExperimentCommand::Start(transition(id))).unwrap();
        experiment.execute(&ExperimentCommand::Complete(transition(id))).unwrap();
        assert_eq!(experiment.status(), ExperimentStatus::Completed);
        assert!(experiment.ended_at().is_some());

        let err = experiment.execute(&ExperimentCommand::Stop(transition(id))).unwrap_err();
        assert!(matches!(err, DomainError::InvalidState(_)));
        let err = experiment.execute(&ExperimentCommand::Start(transition(id))).unwrap_err();
        assert!(matches!(err, DomainError::InvalidState(_)));
    }
}
