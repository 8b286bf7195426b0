use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use realty_core::{Aggregate, AggregateId, DomainError, DomainResult};
use realty_events::{Event, EventEnvelope, EventStream};

use crate::client::{Client, ClientId};
use crate::provider::{ProviderId, ServiceProvider};
use crate::request::{
    AssignProvider, CancelRequest, CreateServiceRequest, Priority, RequestStatus, ServiceRequest,
    ServiceRequestCommand, ServiceRequestEvent, ServiceRequestId, ServiceType, UpdateProgress,
};

const AGGREGATE_TYPE: &str = "engagements.service_request";

struct RequestEntry {
    request: ServiceRequest,
    history: EventStream<ServiceRequestEvent>,
}

/// In-process registry of clients, providers and service requests.
///
/// Lifecycle operations are routed by request id; every applied event is kept
/// in the request's history so milestones can be rendered later.
#[derive(Default)]
pub struct Engagements {
    clients: HashMap<ClientId, Client>,
    providers: HashMap<ProviderId, ServiceProvider>,
    requests: HashMap<ServiceRequestId, RequestEntry>,
}

impl Engagements {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_client(&mut self, client: Client) -> DomainResult<ClientId> {
        let id = client.id_typed();
        if self.clients.contains_key(&id) {
            return Err(DomainError::conflict(format!("client {id} already registered")));
        }
        info!(client_id = %id, name = client.name(), "client registered");
        self.clients.insert(id, client);
        Ok(id)
    }

    pub fn add_provider(&mut self, provider: ServiceProvider) -> DomainResult<ProviderId> {
        let id = provider.id_typed();
        if self.providers.contains_key(&id) {
            return Err(DomainError::conflict(format!("provider {id} already registered")));
        }
        info!(provider_id = %id, name = provider.name(), "provider registered");
        self.providers.insert(id, provider);
        Ok(id)
    }

    pub fn client(&self, id: ClientId) -> DomainResult<&Client> {
        self.clients
            .get(&id)
            .ok_or_else(|| DomainError::not_found(format!("client {id}")))
    }

    pub fn client_mut(&mut self, id: ClientId) -> DomainResult<&mut Client> {
        self.clients
            .get_mut(&id)
            .ok_or_else(|| DomainError::not_found(format!("client {id}")))
    }

    pub fn provider(&self, id: ProviderId) -> DomainResult<&ServiceProvider> {
        self.providers
            .get(&id)
            .ok_or_else(|| DomainError::not_found(format!("provider {id}")))
    }

    pub fn request(&self, id: ServiceRequestId) -> DomainResult<&ServiceRequest> {
        self.entry(id).map(|entry| &entry.request)
    }

    /// Event history of a request, oldest first.
    pub fn history(&self, id: ServiceRequestId) -> DomainResult<&[EventEnvelope<ServiceRequestEvent>]> {
        self.entry(id).map(|entry| entry.history.events())
    }

    /// Open a request with default settings for `client_id`.
    pub fn create_request(
        &mut self,
        client_id: ClientId,
        service_type: ServiceType,
        title: impl Into<String>,
    ) -> DomainResult<ServiceRequestId> {
        let mut cmd = CreateServiceRequest::new(
            ServiceRequestId::new(AggregateId::new()),
            client_id,
            service_type,
        );
        cmd.title = title.into();
        self.open_request(cmd)
    }

    /// Open a request from a fully specified command. The client must be known.
    pub fn open_request(&mut self, cmd: CreateServiceRequest) -> DomainResult<ServiceRequestId> {
        self.client(cmd.client_id)?;
        let request_id = cmd.request_id;
        if self.requests.contains_key(&request_id) {
            return Err(DomainError::conflict(format!("service request {request_id} already exists")));
        }

        let mut request = ServiceRequest::empty(request_id);
        let events = request.execute(&ServiceRequestCommand::Create(cmd))?;

        let mut history = EventStream::new(request_id.0, AGGREGATE_TYPE);
        history.append(events);

        info!(
            request_id = %request_id,
            service = request.service_type().label(),
            "service request created"
        );
        self.requests.insert(request_id, RequestEntry { request, history });
        Ok(request_id)
    }

    pub fn assign_provider(
        &mut self,
        request_id: ServiceRequestId,
        provider_id: ProviderId,
    ) -> DomainResult<()> {
        let provider_services = self.provider(provider_id)?.service_categories().to_vec();
        self.route(
            request_id,
            ServiceRequestCommand::AssignProvider(AssignProvider {
                request_id,
                provider_id,
                provider_services,
                occurred_at: Utc::now(),
            }),
        )
    }

    pub fn update_progress(
        &mut self,
        request_id: ServiceRequestId,
        percent: i64,
        note: impl Into<String>,
    ) -> DomainResult<()> {
        self.route(
            request_id,
            ServiceRequestCommand::UpdateProgress(UpdateProgress {
                request_id,
                percent,
                note: note.into(),
                occurred_at: Utc::now(),
            }),
        )
    }

    pub fn cancel_request(
        &mut self,
        request_id: ServiceRequestId,
        reason: impl Into<String>,
    ) -> DomainResult<()> {
        self.route(
            request_id,
            ServiceRequestCommand::Cancel(CancelRequest {
                request_id,
                reason: reason.into(),
                occurred_at: Utc::now(),
            }),
        )
    }

    pub fn requests_for_client(&self, client_id: ClientId) -> Vec<&ServiceRequest> {
        let mut requests: Vec<&ServiceRequest> = self
            .requests
            .values()
            .map(|entry| &entry.request)
            .filter(|request| request.client_id() == Some(client_id))
            .collect();
        requests.sort_by_key(|request| request.created_at());
        requests
    }

    pub fn overdue_requests(&self, now: DateTime<Utc>) -> Vec<&ServiceRequest> {
        self.requests
            .values()
            .map(|entry| &entry.request)
            .filter(|request| request.is_overdue(now))
            .collect()
    }

    /// Render a request with resolved names and its milestones.
    pub fn request_summary(
        &self,
        request_id: ServiceRequestId,
        now: DateTime<Utc>,
    ) -> DomainResult<RequestSummary> {
        let entry = self.entry(request_id)?;
        let request = &entry.request;

        let client_name = request
            .client_id()
            .and_then(|id| self.clients.get(&id))
            .map(|client| client.name().to_string())
            .unwrap_or_default();
        let provider_name = request
            .provider_id()
            .and_then(|id| self.providers.get(&id))
            .map(|provider| provider.name().to_string());

        let milestones = entry
            .history
            .events()
            .iter()
            .map(|envelope| Milestone {
                sequence: envelope.sequence(),
                occurred_at: envelope.payload().occurred_at(),
                description: describe(envelope.payload(), &provider_name),
            })
            .collect();

        Ok(RequestSummary {
            request_id,
            title: request.title().to_string(),
            client_name,
            provider_name,
            service_type: request.service_type().label().to_string(),
            project_type: request.project_type().label().to_string(),
            priority: request.priority(),
            status: request.status(),
            progress: request.progress(),
            status_note: request.status_note().to_string(),
            created_at: request.created_at(),
            deadline: request.deadline(),
            days_until_deadline: request.days_until_deadline(now),
            overdue: request.is_overdue(now),
            milestones,
        })
    }

    fn entry(&self, id: ServiceRequestId) -> DomainResult<&RequestEntry> {
        self.requests
            .get(&id)
            .ok_or_else(|| DomainError::not_found(format!("service request {id}")))
    }

    fn route(&mut self, request_id: ServiceRequestId, cmd: ServiceRequestCommand) -> DomainResult<()> {
        let entry = self
            .requests
            .get_mut(&request_id)
            .ok_or_else(|| DomainError::not_found(format!("service request {request_id}")))?;

        let before = entry.request.status();
        let events = entry.request.execute(&cmd)?;
        entry.history.append(events);

        let after = entry.request.status();
        if before != after {
            info!(request_id = %request_id, from = ?before, to = ?after, "service request transitioned");
        }
        Ok(())
    }
}

fn describe(event: &ServiceRequestEvent, provider_name: &Option<String>) -> String {
    match event {
        ServiceRequestEvent::Created(e) => format!("Request created: {}", e.title),
        ServiceRequestEvent::ProviderAssigned(_) => match provider_name {
            Some(name) => format!("Assigned to {name}"),
            None => "Provider assigned".to_string(),
        },
        ServiceRequestEvent::WorkStarted(_) => "Work started".to_string(),
        ServiceRequestEvent::ProgressUpdated(e) if e.note.is_empty() => {
            format!("Progress {}% -> {}%", e.previous, e.percent)
        }
        ServiceRequestEvent::ProgressUpdated(e) => {
            format!("Progress {}% -> {}%: {}", e.previous, e.percent, e.note)
        }
        ServiceRequestEvent::Completed(_) => "Completed".to_string(),
        ServiceRequestEvent::Cancelled(e) => format!("Cancelled: {}", e.reason),
    }
}

/// One entry of a request's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Milestone {
    pub sequence: u64,
    pub occurred_at: DateTime<Utc>,
    pub description: String,
}

/// Read-only view of a service request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestSummary {
    pub request_id: ServiceRequestId,
    pub title: String,
    pub client_name: String,
    pub provider_name: Option<String>,
    pub service_type: String,
    pub project_type: String,
    pub priority: Priority,
    pub status: RequestStatus,
    pub progress: u8,
    pub status_note: String,
    pub created_at: Option<DateTime<Utc>>,
    pub deadline: Option<DateTime<Utc>>,
    pub days_until_deadline: Option<i64>,
    pub overdue: bool,
    pub milestones: Vec<Milestone>,
}
