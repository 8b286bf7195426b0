use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use realty_core::{Aggregate, AggregateId, AggregateRoot, DomainError};
use realty_events::Event;

use crate::client::ClientId;
use crate::provider::{ProviderId, ServiceProvider};

/// Service request identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServiceRequestId(pub AggregateId);

impl ServiceRequestId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for ServiceRequestId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Services a provider can be engaged for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceType {
    BusinessAnalytics,
    DataPlatformSetup,
    KpiIdentification,
    AbTesting,
    DashboardCreation,
    DataAnalysis,
    StrategicAnalytics,
}

impl ServiceType {
    pub const ALL: [ServiceType; 7] = [
        ServiceType::BusinessAnalytics,
        ServiceType::DataPlatformSetup,
        ServiceType::KpiIdentification,
        ServiceType::AbTesting,
        ServiceType::DashboardCreation,
        ServiceType::DataAnalysis,
        ServiceType::StrategicAnalytics,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            ServiceType::BusinessAnalytics => "Business Analytics",
            ServiceType::DataPlatformSetup => "Data Platform Setup",
            ServiceType::KpiIdentification => "KPI Identification",
            ServiceType::AbTesting => "A/B Testing",
            ServiceType::DashboardCreation => "Dashboard Creation",
            ServiceType::DataAnalysis => "Data Analysis",
            ServiceType::StrategicAnalytics => "Strategic Analytics",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectType {
    #[default]
    OneTime,
    Ongoing,
    Consultation,
}

impl ProjectType {
    pub fn label(&self) -> &'static str {
        match self {
            ProjectType::OneTime => "One-time project",
            ProjectType::Ongoing => "Ongoing project",
            ProjectType::Consultation => "Consultation",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

/// Service request status lifecycle.
///
/// `Created -> Assigned -> InProgress -> Completed`, with `Cancelled`
/// reachable from any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Created,
    Assigned,
    InProgress,
    Completed,
    Cancelled,
}

impl RequestStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RequestStatus::Completed | RequestStatus::Cancelled)
    }
}

pub const DEFAULT_ESTIMATED_DURATION_DAYS: u32 = 7;

/// Aggregate root: ServiceRequest.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceRequest {
    id: ServiceRequestId,
    client_id: Option<ClientId>,
    provider_id: Option<ProviderId>,
    service_type: ServiceType,
    project_type: ProjectType,
    title: String,
    priority: Priority,
    created_at: Option<DateTime<Utc>>,
    deadline: Option<DateTime<Utc>>,
    progress: u8,
    status_note: String,
    status: RequestStatus,
    version: u64,
    created: bool,
}

impl ServiceRequest {
    /// Create an empty, not-yet-created aggregate instance.
    pub fn empty(id: ServiceRequestId) -> Self {
        Self {
            id,
            client_id: None,
            provider_id: None,
            service_type: ServiceType::BusinessAnalytics,
            project_type: ProjectType::OneTime,
            title: String::new(),
            priority: Priority::Medium,
            created_at: None,
            deadline: None,
            progress: 0,
            status_note: String::new(),
            status: RequestStatus::Created,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> ServiceRequestId {
        self.id
    }

    pub fn client_id(&self) -> Option<ClientId> {
        self.client_id
    }

    pub fn provider_id(&self) -> Option<ProviderId> {
        self.provider_id
    }

    pub fn service_type(&self) -> ServiceType {
        self.service_type
    }

    pub fn project_type(&self) -> ProjectType {
        self.project_type
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        self.deadline
    }

    pub fn progress(&self) -> u8 {
        self.progress
    }

    pub fn status_note(&self) -> &str {
        &self.status_note
    }

    pub fn status(&self) -> RequestStatus {
        self.status
    }

    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        match self.deadline {
            Some(deadline) => now > deadline && !self.status.is_terminal(),
            None => false,
        }
    }

    /// Whole days left until the deadline (negative once it has passed).
    pub fn days_until_deadline(&self, now: DateTime<Utc>) -> Option<i64> {
        self.deadline.map(|deadline| (deadline - now).num_days())
    }

    /// Assign `provider` now. See [`AssignProvider`].
    pub fn assign_provider(
        &mut self,
        provider: &ServiceProvider,
    ) -> Result<Vec<ServiceRequestEvent>, DomainError> {
        self.execute(&ServiceRequestCommand::AssignProvider(AssignProvider {
            request_id: self.id,
            provider_id: provider.id_typed(),
            provider_services: provider.service_categories().to_vec(),
            occurred_at: Utc::now(),
        }))
    }

    /// Record progress now. See [`UpdateProgress`].
    pub fn update_progress(
        &mut self,
        percent: i64,
        note: impl Into<String>,
    ) -> Result<Vec<ServiceRequestEvent>, DomainError> {
        self.execute(&ServiceRequestCommand::UpdateProgress(UpdateProgress {
            request_id: self.id,
            percent,
            note: note.into(),
            occurred_at: Utc::now(),
        }))
    }

    /// Cancel now. See [`CancelRequest`].
    pub fn cancel(
        &mut self,
        reason: impl Into<String>,
    ) -> Result<Vec<ServiceRequestEvent>, DomainError> {
        self.execute(&ServiceRequestCommand::Cancel(CancelRequest {
            request_id: self.id,
            reason: reason.into(),
            occurred_at: Utc::now(),
        }))
    }
}

impl AggregateRoot for ServiceRequest {
    type Id = ServiceRequestId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateServiceRequest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateServiceRequest {
    pub request_id: ServiceRequestId,
    pub client_id: ClientId,
    pub service_type: ServiceType,
    pub project_type: ProjectType,
    pub title: String,
    pub priority: Priority,
    /// Explicit deadline; defaults to `occurred_at + estimated_duration_days`.
    pub deadline: Option<DateTime<Utc>>,
    pub estimated_duration_days: u32,
    pub occurred_at: DateTime<Utc>,
}

impl CreateServiceRequest {
    pub fn new(request_id: ServiceRequestId, client_id: ClientId, service_type: ServiceType) -> Self {
        Self {
            request_id,
            client_id,
            service_type,
            project_type: ProjectType::OneTime,
            title: "Real Estate Analytics Request".to_string(),
            priority: Priority::Medium,
            deadline: None,
            estimated_duration_days: DEFAULT_ESTIMATED_DURATION_DAYS,
            occurred_at: Utc::now(),
        }
    }
}

/// Command: AssignProvider. Legal only while the request is `Created`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignProvider {
    pub request_id: ServiceRequestId,
    pub provider_id: ProviderId,
    /// Services the provider offers; must include the request's service type.
    pub provider_services: Vec<ServiceType>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateProgress. Legal while `Assigned` or `InProgress`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateProgress {
    pub request_id: ServiceRequestId,
    pub percent: i64,
    pub note: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: Cancel. Idempotent once cancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelRequest {
    pub request_id: ServiceRequestId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceRequestCommand {
    Create(CreateServiceRequest),
    AssignProvider(AssignProvider),
    UpdateProgress(UpdateProgress),
    Cancel(CancelRequest),
}

/// Event: ServiceRequestCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRequestCreated {
    pub request_id: ServiceRequestId,
    pub client_id: ClientId,
    pub service_type: ServiceType,
    pub project_type: ProjectType,
    pub title: String,
    pub priority: Priority,
    pub deadline: DateTime<Utc>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ProviderAssigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderAssigned {
    pub request_id: ServiceRequestId,
    pub provider_id: ProviderId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: WorkStarted (Assigned -> InProgress).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkStarted {
    pub request_id: ServiceRequestId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ProgressUpdated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressUpdated {
    pub request_id: ServiceRequestId,
    pub previous: u8,
    pub percent: u8,
    pub note: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ServiceRequestCompleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRequestCompleted {
    pub request_id: ServiceRequestId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ServiceRequestCancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRequestCancelled {
    pub request_id: ServiceRequestId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceRequestEvent {
    Created(ServiceRequestCreated),
    ProviderAssigned(ProviderAssigned),
    WorkStarted(WorkStarted),
    ProgressUpdated(ProgressUpdated),
    Completed(ServiceRequestCompleted),
    Cancelled(ServiceRequestCancelled),
}

impl Event for ServiceRequestEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ServiceRequestEvent::Created(_) => "engagements.request.created",
            ServiceRequestEvent::ProviderAssigned(_) => "engagements.request.provider_assigned",
            ServiceRequestEvent::WorkStarted(_) => "engagements.request.work_started",
            ServiceRequestEvent::ProgressUpdated(_) => "engagements.request.progress_updated",
            ServiceRequestEvent::Completed(_) => "engagements.request.completed",
            ServiceRequestEvent::Cancelled(_) => "engagements.request.cancelled",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ServiceRequestEvent::Created(e) => e.occurred_at,
            ServiceRequestEvent::ProviderAssigned(e) => e.occurred_at,
            ServiceRequestEvent::WorkStarted(e) => e.occurred_at,
            ServiceRequestEvent::ProgressUpdated(e) => e.occurred_at,
            ServiceRequestEvent::Completed(e) => e.occurred_at,
            ServiceRequestEvent::Cancelled(e) => e.occurred_at,
        }
    }
}

impl Aggregate for ServiceRequest {
    type Command = ServiceRequestCommand;
    type Event = ServiceRequestEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ServiceRequestEvent::Created(e) => {
                self.id = e.request_id;
                self.client_id = Some(e.client_id);
                self.service_type = e.service_type;
                self.project_type = e.project_type;
                self.title = e.title.clone();
                self.priority = e.priority;
                self.created_at = Some(e.occurred_at);
                self.deadline = Some(e.deadline);
                self.status = RequestStatus::Created;
                self.created = true;
            }
            ServiceRequestEvent::ProviderAssigned(e) => {
                self.provider_id = Some(e.provider_id);
                self.status = RequestStatus::Assigned;
            }
            ServiceRequestEvent::WorkStarted(_) => {
                self.status = RequestStatus::InProgress;
            }
            ServiceRequestEvent::ProgressUpdated(e) => {
                self.progress = e.percent;
                self.status_note = e.note.clone();
            }
            ServiceRequestEvent::Completed(_) => {
                self.status = RequestStatus::Completed;
            }
            ServiceRequestEvent::Cancelled(e) => {
                self.status = RequestStatus::Cancelled;
                self.status_note = e.reason.clone();
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ServiceRequestCommand::Create(cmd) => self.handle_create(cmd),
            ServiceRequestCommand::AssignProvider(cmd) => self.handle_assign(cmd),
            ServiceRequestCommand::UpdateProgress(cmd) => self.handle_progress(cmd),
            ServiceRequestCommand::Cancel(cmd) => self.handle_cancel(cmd),
        }
    }
}

impl ServiceRequest {
    fn ensure_exists(&self, request_id: ServiceRequestId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found(format!("service request {request_id}")));
        }
        if self.id != request_id {
            return Err(DomainError::validation("request_id mismatch"));
        }
        Ok(())
    }

    fn handle_create(
        &self,
        cmd: &CreateServiceRequest,
    ) -> Result<Vec<ServiceRequestEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("service request already exists"));
        }
        if cmd.title.trim().is_empty() {
            return Err(DomainError::validation("title must not be empty"));
        }

        let deadline = match cmd.deadline {
            Some(deadline) if deadline < cmd.occurred_at => {
                return Err(DomainError::validation(
                    "deadline must not be before the request is created",
                ));
            }
            Some(deadline) => deadline,
            None => Duration::try_days(i64::from(cmd.estimated_duration_days))
                .and_then(|span| cmd.occurred_at.checked_add_signed(span))
                .ok_or_else(|| {
                    DomainError::validation(format!(
                        "an estimate of {} days puts the deadline out of range",
                        cmd.estimated_duration_days
                    ))
                })?,
        };

        Ok(vec![ServiceRequestEvent::Created(ServiceRequestCreated {
            request_id: cmd.request_id,
            client_id: cmd.client_id,
            service_type: cmd.service_type,
            project_type: cmd.project_type,
            title: cmd.title.clone(),
            priority: cmd.priority,
            deadline,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_assign(&self, cmd: &AssignProvider) -> Result<Vec<ServiceRequestEvent>, DomainError> {
        self.ensure_exists(cmd.request_id)?;

        if self.status != RequestStatus::Created {
            return Err(DomainError::invalid_state(format!(
                "a provider can only be assigned to a created request (status: {:?})",
                self.status
            )));
        }

        if !cmd.provider_services.contains(&self.service_type) {
            return Err(DomainError::validation(format!(
                "provider does not offer {}",
                self.service_type.label()
            )));
        }

        Ok(vec![ServiceRequestEvent::ProviderAssigned(ProviderAssigned {
            request_id: cmd.request_id,
            provider_id: cmd.provider_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_progress(
        &self,
        cmd: &UpdateProgress,
    ) -> Result<Vec<ServiceRequestEvent>, DomainError> {
        self.ensure_exists(cmd.request_id)?;

        if !matches!(self.status, RequestStatus::Assigned | RequestStatus::InProgress) {
            return Err(DomainError::invalid_state(format!(
                "progress can only be updated on assigned or in-progress requests (status: {:?})",
                self.status
            )));
        }

        if !(0..=100).contains(&cmd.percent) {
            return Err(DomainError::validation(format!(
                "progress must be between 0 and 100 (got {})",
                cmd.percent
            )));
        }
        let percent = cmd.percent as u8;
        if percent < self.progress {
            return Err(DomainError::validation(format!(
                "progress cannot decrease (current {}, got {percent})",
                self.progress
            )));
        }

        let mut events = Vec::with_capacity(2);
        if self.status == RequestStatus::Assigned && percent < 100 {
            events.push(ServiceRequestEvent::WorkStarted(WorkStarted {
                request_id: cmd.request_id,
                occurred_at: cmd.occurred_at,
            }));
        }
        events.push(ServiceRequestEvent::ProgressUpdated(ProgressUpdated {
            request_id: cmd.request_id,
            previous: self.progress,
            percent,
            note: cmd.note.clone(),
            occurred_at: cmd.occurred_at,
        }));
        if percent == 100 {
            events.push(ServiceRequestEvent::Completed(ServiceRequestCompleted {
                request_id: cmd.request_id,
                occurred_at: cmd.occurred_at,
            }));
        }

        Ok(events)
    }

    fn handle_cancel(&self, cmd: &CancelRequest) -> Result<Vec<ServiceRequestEvent>, DomainError> {
        self.ensure_exists(cmd.request_id)?;

        match self.status {
            RequestStatus::Cancelled => Ok(Vec::new()),
            RequestStatus::Completed => Err(DomainError::invalid_state(
                "a completed request cannot be cancelled",
            )),
            _ => Ok(vec![ServiceRequestEvent::Cancelled(ServiceRequestCancelled {
                request_id: cmd.request_id,
                reason: cmd.reason.clone(),
                occurred_at: cmd.occurred_at,
            })]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn test_request_id() -> ServiceRequestId {
        ServiceRequestId::new(AggregateId::new())
    }

    fn test_client_id() -> ClientId {
        ClientId::new(AggregateId::new())
    }

    fn test_provider() -> ServiceProvider {
        ServiceProvider::builder("Dana Ortiz", "Lead Analyst", "Northwind Analytics")
            .build()
            .unwrap()
    }

    fn created_request() -> ServiceRequest {
        let request_id = test_request_id();
        let mut request = ServiceRequest::empty(request_id);
        request
            .execute(&ServiceRequestCommand::Create(CreateServiceRequest::new(
                request_id,
                test_client_id(),
                ServiceType::DashboardCreation,
            )))
            .unwrap();
        request
    }

    fn assigned_request() -> ServiceRequest {
        let mut request = created_request();
        request.assign_provider(&test_provider()).unwrap();
        request
    }

    #[test]
    fn create_sets_default_deadline_one_week_out() {
        let request = created_request();
        assert_eq!(request.status(), RequestStatus::Created);
        let created_at = request.created_at().unwrap();
        assert_eq!(request.deadline().unwrap() - created_at, Duration::days(7));
        assert_eq!(request.version(), 1);
    }

    #[test]
    fn deadline_in_the_past_is_rejected() {
        let request_id = test_request_id();
        let request = ServiceRequest::empty(request_id);
        let mut cmd = CreateServiceRequest::new(request_id, test_client_id(), ServiceType::AbTesting);
        cmd.deadline = Some(cmd.occurred_at - Duration::days(1));

        let err = request.handle(&ServiceRequestCommand::Create(cmd)).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn estimate_past_the_calendar_is_rejected() {
        let request_id = test_request_id();
        let mut request = ServiceRequest::empty(request_id);
        let mut cmd = CreateServiceRequest::new(request_id, test_client_id(), ServiceType::AbTesting);
        cmd.estimated_duration_days = u32::MAX;

        let err = request.execute(&ServiceRequestCommand::Create(cmd)).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
        assert_eq!(request.version(), 0);
    }

    #[test]
    fn assign_moves_created_to_assigned() {
        let mut request = created_request();
        let provider = test_provider();
        let events = request.assign_provider(&provider).unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(request.status(), RequestStatus::Assigned);
        assert_eq!(request.provider_id(), Some(provider.id_typed()));
    }

    #[test]
    fn assign_outside_created_is_invalid_state() {
        let provider = test_provider();

        let mut assigned = assigned_request();
        let err = assigned.assign_provider(&provider).unwrap_err();
        assert!(matches!(err, DomainError::InvalidState(_)));

        let mut in_progress = assigned_request();
        in_progress.update_progress(10, "kickoff").unwrap();
        let err = in_progress.assign_provider(&provider).unwrap_err();
        assert!(matches!(err, DomainError::InvalidState(_)));

        let mut cancelled = created_request();
        cancelled.cancel("budget cut").unwrap();
        let err = cancelled.assign_provider(&provider).unwrap_err();
        assert!(matches!(err, DomainError::InvalidState(_)));
    }

    #[test]
    fn provider_without_the_service_is_rejected() {
        let mut request = created_request();
        let provider = ServiceProvider::builder("Sam", "Statistician", "Northwind")
            .service(ServiceType::AbTesting)
            .build()
            .unwrap();

        let err = request.assign_provider(&provider).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
        assert_eq!(request.status(), RequestStatus::Created);
    }

    #[test]
    fn progress_requires_assignment() {
        let mut request = created_request();
        let err = request.update_progress(10, "too early").unwrap_err();
        assert!(matches!(err, DomainError::InvalidState(_)));
    }

    #[test]
    fn first_progress_update_starts_work() {
        let mut request = assigned_request();
        let events = request.update_progress(0, "scoping").unwrap();

        assert!(matches!(events[0], ServiceRequestEvent::WorkStarted(_)));
        assert_eq!(request.status(), RequestStatus::InProgress);
        assert_eq!(request.status_note(), "scoping");
    }

    #[test]
    fn lower_progress_is_rejected() {
        let mut request = assigned_request();
        request.update_progress(40, "data loaded").unwrap();

        let err = request.update_progress(30, "oops").unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
        assert_eq!(request.progress(), 40);
    }

    #[test]
    fn out_of_range_progress_is_rejected() {
        let mut request = assigned_request();
        assert!(matches!(
            request.update_progress(101, "").unwrap_err(),
            DomainError::Validation(_)
        ));
        assert!(matches!(
            request.update_progress(-1, "").unwrap_err(),
            DomainError::Validation(_)
        ));
    }

    #[test]
    fn full_progress_completes_the_request() {
        let mut request = assigned_request();
        request.update_progress(50, "halfway").unwrap();
        let events = request.update_progress(100, "delivered").unwrap();

        assert!(matches!(events.last(), Some(ServiceRequestEvent::Completed(_))));
        assert_eq!(request.status(), RequestStatus::Completed);
        assert!(matches!(
            request.update_progress(100, "again").unwrap_err(),
            DomainError::InvalidState(_)
        ));
    }

    #[test]
    fn full_progress_straight_from_assigned_skips_in_progress() {
        let mut request = assigned_request();
        let events = request.update_progress(100, "done in one go").unwrap();
        assert!(!events.iter().any(|e| matches!(e, ServiceRequestEvent::WorkStarted(_))));
        assert_eq!(request.status(), RequestStatus::Completed);
    }

    #[test]
    fn cancel_is_idempotent() {
        let mut request = assigned_request();
        let first = request.cancel("client paused project").unwrap();
        assert_eq!(first.len(), 1);
        let version = request.version();

        let second = request.cancel("duplicate click").unwrap();
        assert!(second.is_empty());
        assert_eq!(request.version(), version);
        assert_eq!(request.status(), RequestStatus::Cancelled);
        assert_eq!(request.status_note(), "client paused project");
    }

    #[test]
    fn completed_request_cannot_be_cancelled() {
        let mut request = assigned_request();
        request.update_progress(100, "done").unwrap();
        let err = request.cancel("late").unwrap_err();
        assert!(matches!(err, DomainError::InvalidState(_)));
    }

    #[test]
    fn commands_on_uncreated_request_are_not_found() {
        let request_id = test_request_id();
        let request = ServiceRequest::empty(request_id);
        let err = request
            .handle(&ServiceRequestCommand::Cancel(CancelRequest {
                request_id,
                reason: String::new(),
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn overdue_only_while_open() {
        let mut request = assigned_request();
        let after_deadline = request.deadline().unwrap() + Duration::days(1);
        assert!(request.is_overdue(after_deadline));
        assert_eq!(request.days_until_deadline(after_deadline), Some(-1));

        request.update_progress(100, "done").unwrap();
        assert!(!request.is_overdue(after_deadline));
    }

    #[test]
    fn handle_does_not_mutate_state() {
        let request = assigned_request();
        let cmd = ServiceRequestCommand::UpdateProgress(UpdateProgress {
            request_id: request.id_typed(),
            percent: 20,
            note: "draft".to_string(),
            occurred_at: Utc::now(),
        });

        let events1 = request.handle(&cmd).unwrap();
        let events2 = request.handle(&cmd).unwrap();
        assert_eq!(events1, events2);
        assert_eq!(request.progress(), 0);
        assert_eq!(request.status(), RequestStatus::Assigned);
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: whatever progress values are submitted, accepted progress
        /// never decreases and 100 always means Completed.
        #[test]
        fn progress_is_monotonic(updates in prop::collection::vec(-10i64..=110, 1..20)) {
            let mut request = assigned_request();
            let mut last = 0u8;

            for percent in updates {
                let before = request.status();
                match request.update_progress(percent, "tick") {
                    Ok(_) => {
                        prop_assert!(request.progress() >= last);
                        last = request.progress();
                        if percent == 100 {
                            prop_assert_eq!(request.status(), RequestStatus::Completed);
                        } else {
                            prop_assert_eq!(request.status(), RequestStatus::InProgress);
                        }
                    }
                    Err(DomainError::Validation(_)) => {
                        prop_assert_eq!(request.status(), before);
                        prop_assert_eq!(request.progress(), last);
                    }
                    Err(DomainError::InvalidState(_)) => {
                        prop_assert_eq!(before, RequestStatus::Completed);
                    }
                    Err(other) => prop_assert!(false, "unexpected error: {other:?}"),
                }
            }
        }
    }
}
