use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use realty_core::{AggregateId, DomainError, DomainResult, Entity};

use crate::request::ServiceType;

/// Service provider identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderId(pub AggregateId);

impl ProviderId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// A provider offering analytics services.
///
/// The profile is static: every field is fixed by [`ServiceProviderBuilder`]
/// and only getters are exposed afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceProvider {
    id: ProviderId,
    name: String,
    title: String,
    company: String,
    specialization: String,
    email: Option<String>,
    location: Option<String>,
    experience_years: u32,
    certifications: Vec<String>,
    technical_skills: Vec<String>,
    tools_expertise: Vec<String>,
    service_categories: Vec<ServiceType>,
    hourly_rate: Option<f64>,
    created_at: DateTime<Utc>,
}

impl ServiceProvider {
    pub fn builder(
        name: impl Into<String>,
        title: impl Into<String>,
        company: impl Into<String>,
    ) -> ServiceProviderBuilder {
        ServiceProviderBuilder {
            name: name.into(),
            title: title.into(),
            company: company.into(),
            specialization: "Real Estate Analytics".to_string(),
            email: None,
            location: None,
            experience_years: 0,
            certifications: Vec::new(),
            technical_skills: Vec::new(),
            tools_expertise: Vec::new(),
            service_categories: Vec::new(),
            hourly_rate: None,
        }
    }

    pub fn id_typed(&self) -> ProviderId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn company(&self) -> &str {
        &self.company
    }

    pub fn specialization(&self) -> &str {
        &self.specialization
    }

    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }

    pub fn experience_years(&self) -> u32 {
        self.experience_years
    }

    pub fn certifications(&self) -> &[String] {
        &self.certifications
    }

    pub fn technical_skills(&self) -> &[String] {
        &self.technical_skills
    }

    pub fn tools_expertise(&self) -> &[String] {
        &self.tools_expertise
    }

    pub fn service_categories(&self) -> &[ServiceType] {
        &self.service_categories
    }

    pub fn hourly_rate(&self) -> Option<f64> {
        self.hourly_rate
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn can_handle_service(&self, service: ServiceType) -> bool {
        self.service_categories.contains(&service)
    }
}

impl Entity for ServiceProvider {
    type Id = ProviderId;

    fn id(&self) -> &ProviderId {
        &self.id
    }
}

impl core::fmt::Display for ServiceProvider {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{} - {} @ {}", self.name, self.title, self.company)
    }
}

/// Builder for [`ServiceProvider`]; the only way to set optional profile data.
#[derive(Debug, Clone)]
pub struct ServiceProviderBuilder {
    name: String,
    title: String,
    company: String,
    specialization: String,
    email: Option<String>,
    location: Option<String>,
    experience_years: u32,
    certifications: Vec<String>,
    technical_skills: Vec<String>,
    tools_expertise: Vec<String>,
    service_categories: Vec<ServiceType>,
    hourly_rate: Option<f64>,
}

impl ServiceProviderBuilder {
    pub fn specialization(mut self, value: impl Into<String>) -> Self {
        self.specialization = value.into();
        self
    }

    pub fn email(mut self, value: impl Into<String>) -> Self {
        self.email = Some(value.into());
        self
    }

    pub fn location(mut self, value: impl Into<String>) -> Self {
        self.location = Some(value.into());
        self
    }

    pub fn experience_years(mut self, years: u32) -> Self {
        self.experience_years = years;
        self
    }

    pub fn certification(mut self, value: impl Into<String>) -> Self {
        push_unique(&mut self.certifications, value.into());
        self
    }

    pub fn skill(mut self, value: impl Into<String>) -> Self {
        push_unique(&mut self.technical_skills, value.into());
        self
    }

    pub fn tool(mut self, value: impl Into<String>) -> Self {
        push_unique(&mut self.tools_expertise, value.into());
        self
    }

    /// Restrict the offered services. Without any call the provider offers all
    /// service types.
    pub fn service(mut self, service: ServiceType) -> Self {
        if !self.service_categories.contains(&service) {
            self.service_categories.push(service);
        }
        self
    }

    pub fn hourly_rate(mut self, rate: f64) -> Self {
        self.hourly_rate = Some(rate);
        self
    }

    pub fn build(self) -> DomainResult<ServiceProvider> {
        if self.name.trim().is_empty() {
            return Err(DomainError::validation("provider name must not be empty"));
        }
        if let Some(rate) = self.hourly_rate {
            if !rate.is_finite() || rate < 0.0 {
                return Err(DomainError::validation("hourly rate must be a non-negative number"));
            }
        }

        let technical_skills = or_defaults(
            self.technical_skills,
            &[
                "SQL",
                "Python",
                "Data Analysis",
                "Statistical Analysis",
                "Dashboard Creation",
                "Data Visualization",
            ],
        );
        let tools_expertise = or_defaults(self.tools_expertise, &["SQL", "Excel", "Power BI"]);
        let service_categories = if self.service_categories.is_empty() {
            ServiceType::ALL.to_vec()
        } else {
            self.service_categories
        };

        Ok(ServiceProvider {
            id: ProviderId::new(AggregateId::new()),
            name: self.name,
            title: self.title,
            company: self.company,
            specialization: self.specialization,
            email: self.email,
            location: self.location,
            experience_years: self.experience_years,
            certifications: self.certifications,
            technical_skills,
            tools_expertise,
            service_categories,
            hourly_rate: self.hourly_rate,
            created_at: Utc::now(),
        })
    }
}

fn push_unique(list: &mut Vec<String>, value: String) {
    if !list.contains(&value) {
        list.push(value);
    }
}

fn or_defaults(values: Vec<String>, defaults: &[&str]) -> Vec<String> {
    if values.is_empty() {
        defaults.iter().map(|s| s.to_string()).collect()
    } else {
        values
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_offer_every_service() {
        let provider = ServiceProvider::builder("Dana Ortiz", "Lead Analyst", "Northwind Analytics")
            .build()
            .unwrap();
        for service in ServiceType::ALL {
            assert!(provider.can_handle_service(service));
        }
        assert!(provider.technical_skills().contains(&"SQL".to_string()));
    }

    #[test]
    fn explicit_services_restrict_capabilities() {
        let provider = ServiceProvider::builder("Dana Ortiz", "Lead Analyst", "Northwind Analytics")
            .service(ServiceType::AbTesting)
            .service(ServiceType::AbTesting)
            .build()
            .unwrap();
        assert_eq!(provider.service_categories(), [ServiceType::AbTesting]);
        assert!(!provider.can_handle_service(ServiceType::DashboardCreation));
    }

    #[test]
    fn negative_rate_is_rejected() {
        let err = ServiceProvider::builder("Dana", "Analyst", "Northwind")
            .hourly_rate(-5.0)
            .build()
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }
}
