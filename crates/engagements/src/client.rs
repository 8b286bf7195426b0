use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use realty_core::{AggregateId, DomainError, DomainResult, Entity};

/// Client identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(pub AggregateId);

impl ClientId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for ClientId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Self-reported analytics maturity of a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AnalyticsExperience {
    #[default]
    Beginner,
    Intermediate,
    Advanced,
}

impl AnalyticsExperience {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalyticsExperience::Beginner => "Beginner",
            AnalyticsExperience::Intermediate => "Intermediate",
            AnalyticsExperience::Advanced => "Advanced",
        }
    }
}

impl core::fmt::Display for AnalyticsExperience {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnalyticsExperience {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "beginner" => Ok(Self::Beginner),
            "intermediate" => Ok(Self::Intermediate),
            "advanced" => Ok(Self::Advanced),
            other => Err(DomainError::validation(format!(
                "invalid experience level '{other}': must be one of Beginner, Intermediate, Advanced"
            ))),
        }
    }
}

/// Contact information for a client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactInfo {
    pub email: Option<String>,
    pub phone: Option<String>,
}

/// A client requesting real estate analytics services.
///
/// Created once per engagement. Lists only grow through the explicit `add_*`
/// operations, which ignore duplicates; nothing is ever removed.
#[derive(Debug, Clone, PartialEq)]
pub struct Client {
    id: ClientId,
    name: String,
    location: String,
    company: Option<String>,
    industry: String,
    business_type: String,
    contact: ContactInfo,
    company_size: Option<String>,
    annual_revenue: Option<String>,
    created_at: DateTime<Utc>,
    primary_markets: Vec<String>,
    current_analytics_tools: Vec<String>,
    data_sources: Vec<String>,
    analytics_experience: AnalyticsExperience,
}

impl Client {
    pub fn new(name: impl Into<String>, location: impl Into<String>) -> DomainResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DomainError::validation("client name must not be empty"));
        }

        Ok(Self {
            id: ClientId::new(AggregateId::new()),
            name,
            location: location.into(),
            company: None,
            industry: "Real Estate".to_string(),
            business_type: "Consumer Products".to_string(),
            contact: ContactInfo::default(),
            company_size: None,
            annual_revenue: None,
            created_at: Utc::now(),
            primary_markets: vec!["Residential".to_string(), "Commercial".to_string()],
            current_analytics_tools: vec!["Excel".to_string()],
            data_sources: Vec::new(),
            analytics_experience: AnalyticsExperience::Beginner,
        })
    }

    pub fn with_company(mut self, company: impl Into<String>) -> Self {
        self.company = Some(company.into());
        self
    }

    pub fn with_industry(mut self, industry: impl Into<String>) -> Self {
        self.industry = industry.into();
        self
    }

    pub fn with_business_type(mut self, business_type: impl Into<String>) -> Self {
        self.business_type = business_type.into();
        self
    }

    pub fn with_contact(mut self, contact: ContactInfo) -> Self {
        self.contact = contact;
        self
    }

    pub fn with_company_size(mut self, size: impl Into<String>) -> Self {
        self.company_size = Some(size.into());
        self
    }

    pub fn with_annual_revenue(mut self, revenue: impl Into<String>) -> Self {
        self.annual_revenue = Some(revenue.into());
        self
    }

    /// Replace the default markets. An empty list keeps the defaults.
    pub fn with_primary_markets<I, S>(mut self, markets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let markets: Vec<String> = markets.into_iter().map(Into::into).collect();
        if !markets.is_empty() {
            self.primary_markets = markets;
        }
        self
    }

    pub fn with_experience(mut self, level: AnalyticsExperience) -> Self {
        self.analytics_experience = level;
        self
    }

    pub fn id_typed(&self) -> ClientId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn company(&self) -> Option<&str> {
        self.company.as_deref()
    }

    pub fn industry(&self) -> &str {
        &self.industry
    }

    pub fn business_type(&self) -> &str {
        &self.business_type
    }

    pub fn contact(&self) -> &ContactInfo {
        &self.contact
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn primary_markets(&self) -> &[String] {
        &self.primary_markets
    }

    pub fn current_analytics_tools(&self) -> &[String] {
        &self.current_analytics_tools
    }

    pub fn data_sources(&self) -> &[String] {
        &self.data_sources
    }

    pub fn analytics_experience(&self) -> AnalyticsExperience {
        self.analytics_experience
    }

    pub fn add_data_source(&mut self, source: impl Into<String>) {
        push_unique(&mut self.data_sources, source.into());
    }

    pub fn add_analytics_tool(&mut self, tool: impl Into<String>) {
        push_unique(&mut self.current_analytics_tools, tool.into());
    }

    pub fn add_primary_market(&mut self, market: impl Into<String>) {
        push_unique(&mut self.primary_markets, market.into());
    }

    pub fn update_analytics_experience(&mut self, level: AnalyticsExperience) {
        self.analytics_experience = level;
    }

    /// Parse and apply an experience level given as text.
    pub fn update_analytics_experience_str(&mut self, level: &str) -> DomainResult<()> {
        self.analytics_experience = level.parse()?;
        Ok(())
    }

    pub fn profile(&self) -> ClientProfile {
        ClientProfile {
            id: self.id,
            name: self.name.clone(),
            location: self.location.clone(),
            company: self.company.clone(),
            industry: self.industry.clone(),
            business_type: self.business_type.clone(),
            contact: self.contact.clone(),
            company_size: self.company_size.clone(),
            annual_revenue: self.annual_revenue.clone(),
            primary_markets: self.primary_markets.clone(),
            current_tools: self.current_analytics_tools.clone(),
            data_sources: self.data_sources.clone(),
            experience_level: self.analytics_experience,
            created_at: self.created_at,
        }
    }
}

impl Entity for Client {
    type Id = ClientId;

    fn id(&self) -> &ClientId {
        &self.id
    }
}

impl core::fmt::Display for Client {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Client: {} ({}) - {}", self.name, self.location, self.business_type)
    }
}

/// Read-only, serializable view of a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientProfile {
    pub id: ClientId,
    pub name: String,
    pub location: String,
    pub company: Option<String>,
    pub industry: String,
    pub business_type: String,
    pub contact: ContactInfo,
    pub company_size: Option<String>,
    pub annual_revenue: Option<String>,
    pub primary_markets: Vec<String>,
    pub current_tools: Vec<String>,
    pub data_sources: Vec<String>,
    pub experience_level: AnalyticsExperience,
    pub created_at: DateTime<Utc>,
}

fn push_unique(list: &mut Vec<String>, value: String) {
    if !list.contains(&value) {
        list.push(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_client_gets_default_markets_and_tools() {
        let client = Client::new("Acme Realty", "Austin, TX").unwrap();
        assert_eq!(client.primary_markets(), ["Residential", "Commercial"]);
        assert_eq!(client.current_analytics_tools(), ["Excel"]);
        assert_eq!(client.analytics_experience(), AnalyticsExperience::Beginner);
        assert!(client.data_sources().is_empty());
    }

    #[test]
    fn empty_name_is_rejected() {
        let err = Client::new("  ", "Austin").unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn add_operations_ignore_duplicates() {
        let mut client = Client::new("Acme Realty", "Austin").unwrap();
        client.add_data_source("MLS feed");
        client.add_data_source("MLS feed");
        client.add_analytics_tool("Excel");
        client.add_analytics_tool("Power BI");
        client.add_primary_market("Residential");

        assert_eq!(client.data_sources(), ["MLS feed"]);
        assert_eq!(client.current_analytics_tools(), ["Excel", "Power BI"]);
        assert_eq!(client.primary_markets().len(), 2);
    }

    #[test]
    fn experience_level_parses_case_insensitively() {
        let mut client = Client::new("Acme Realty", "Austin").unwrap();
        client.update_analytics_experience_str("advanced").unwrap();
        assert_eq!(client.analytics_experience(), AnalyticsExperience::Advanced);

        let err = client.update_analytics_experience_str("guru").unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
        assert_eq!(client.analytics_experience(), AnalyticsExperience::Advanced);
    }

    #[test]
    fn profile_reflects_builder_fields() {
        let client = Client::new("Acme Realty", "Austin")
            .unwrap()
            .with_company("Acme Holdings")
            .with_primary_markets(["Luxury"])
            .with_experience(AnalyticsExperience::Intermediate);

        let profile = client.profile();
        assert_eq!(profile.company.as_deref(), Some("Acme Holdings"));
        assert_eq!(profile.primary_markets, vec!["Luxury".to_string()]);
        assert_eq!(profile.experience_level, AnalyticsExperience::Intermediate);
        assert_eq!(profile.id, client.id_typed());
    }
}
