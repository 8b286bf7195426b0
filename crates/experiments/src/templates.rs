//! Ready-made experiment designs for common real estate tests.

use serde::Serialize;

/// A predefined experiment design. The first variant is the control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ExperimentTemplate {
    pub key: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub primary_metric: &'static str,
    pub secondary_metrics: &'static [&'static str],
    /// `(label, description)` pairs.
    pub variants: &'static [(&'static str, &'static str)],
}

pub static TEMPLATES: [ExperimentTemplate; 3] = [
    ExperimentTemplate {
        key: "pricing_strategy",
        name: "Pricing Strategy Test",
        description: "Test different pricing strategies for property listings",
        primary_metric: "conversion_rate",
        secondary_metrics: &["average_value", "time_to_sale"],
        variants: &[
            ("Market Price", "Price at market value"),
            ("Premium Price", "Price 5% above market value"),
        ],
    },
    ExperimentTemplate {
        key: "listing_photos",
        name: "Listing Photos Test",
        description: "Test different photo styles for property listings",
        primary_metric: "conversion_rate",
        secondary_metrics: &["viewing_time", "inquiry_rate"],
        variants: &[
            ("Professional Photos", "High-quality professional photography"),
            ("Staged Photos", "Professional photos with staging"),
        ],
    },
    ExperimentTemplate {
        key: "email_campaign",
        name: "Email Campaign Test",
        description: "Test different email marketing approaches",
        primary_metric: "conversion_rate",
        secondary_metrics: &["open_rate", "click_rate"],
        variants: &[
            ("Standard Email", "Standard property listing email"),
            ("Personalized Email", "Personalized email with buyer preferences"),
        ],
    },
];

pub fn find(key: &str) -> Option<&'static ExperimentTemplate> {
    TEMPLATES.iter().find(|t| t.key == key)
}

pub fn keys() -> Vec<&'static str> {
    TEMPLATES.iter().map(|t| t.key).collect()
}
