//! Engagement records: clients, service providers and service requests.
//!
//! Business rules only (no IO). The service request lifecycle is a
//! command/event aggregate; `Engagements` is the in-process registry that owns
//! the records and their event history.

pub mod client;
pub mod provider;
pub mod registry;
pub mod request;

pub use client::{AnalyticsExperience, Client, ClientId, ClientProfile, ContactInfo};
pub use provider::{ProviderId, ServiceProvider, ServiceProviderBuilder};
pub use registry::{Engagements, Milestone, RequestSummary};
pub use request::{
    AssignProvider, CancelRequest, CreateServiceRequest, Priority, ProjectType, ServiceRequest,
    ServiceRequestCommand, ServiceRequestEvent, ServiceRequestId, ServiceType, RequestStatus,
    UpdateProgress,
};
