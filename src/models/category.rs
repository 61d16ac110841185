//! Fixed category share sets used to distribute baseline totals

use serde::{Deserialize, Serialize};

/// A named category with its static percentage weight
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryShare {
    pub name: String,
    pub percentage: f64,
}

/// Country with its baseline share and seasonal variation weight
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CountryShare {
    pub name: &'static str,
    pub percentage: f64,
    pub variation_weight: f64,
}

/// Downloadable template with its static share of downloads and clicks
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TemplateInfo {
    pub id: &'static str,
    pub title: &'static str,
    pub share: f64,
}

pub const COUNTRY_SHARES: [CountryShare; 4] = [
    CountryShare {
        name: "United States",
        percentage: 42.0,
        variation_weight: 1.0,
    },
    CountryShare {
        name: "Canada",
        percentage: 23.0,
        variation_weight: -0.5,
    },
    CountryShare {
        name: "India",
        percentage: 18.0,
        variation_weight: 0.3,
    },
    CountryShare {
        name: "Others",
        percentage: 17.0,
        variation_weight: -0.8,
    },
];

/// Order matters: ties for the top template go to the earlier entry.
pub const TEMPLATE_CATALOG: [TemplateInfo; 4] = [
    TemplateInfo {
        id: "2",
        title: "Designer Led UX Research",
        share: 32.0,
    },
    TemplateInfo {
        id: "1",
        title: "UX Research Intake Template",
        share: 24.0,
    },
    TemplateInfo {
        id: "3",
        title: "UX Research Dovetail Analysis",
        share: 20.0,
    },
    TemplateInfo {
        id: "4",
        title: "Find Your UX Research Method",
        share: 24.0,
    },
];

impl From<&CountryShare> for CategoryShare {
    fn from(country: &CountryShare) -> Self {
        Self {
            name: country.name.to_string(),
            percentage: country.percentage,
        }
    }
}

impl From<&TemplateInfo> for CategoryShare {
    fn from(template: &TemplateInfo) -> Self {
        Self {
            name: template.title.to_string(),
            percentage: template.share,
        }
    }
}

/// Country share set in display order
pub fn country_shares() -> Vec<CategoryShare> {
    COUNTRY_SHARES.iter().map(CategoryShare::from).collect()
}

/// Template share set in catalog order, named by title
pub fn template_shares() -> Vec<CategoryShare> {
    TEMPLATE_CATALOG.iter().map(CategoryShare::from).collect()
}

pub fn find_template(id: &str) -> Option<&'static TemplateInfo> {
    TEMPLATE_CATALOG.iter().find(|template| template.id == id)
}

/// Display title for a template id, falling back to "Template <id>"
pub fn template_title(id: &str) -> String {
    find_template(id)
        .map(|template| template.title.to_string())
        .unwrap_or_else(|| format!("Template {id}"))
}
