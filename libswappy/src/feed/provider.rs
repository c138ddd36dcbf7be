//! Service provider records and the feed's search filter

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkillLevel {
    Expert,
    Intermediate,
    Amateur,
    Beginner,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillWithLevel {
    pub name: String,
    pub level: SkillLevel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceProvider {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub avatar: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub service_name: Option<String>,
    #[serde(default)]
    pub rating: f32,
    #[serde(default)]
    pub reviews: u32,
    pub category: String,
    #[serde(default)]
    pub paid_price: Option<u32>,
    #[serde(default)]
    pub accepts_swap: bool,
    #[serde(default)]
    pub skills_offered: Vec<SkillWithLevel>,
    #[serde(default)]
    pub skills_wanted: Vec<SkillWithLevel>,
    #[serde(default)]
    pub bio: Option<String>,
}

/// Category plus free-text search over the provider feed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderFilter {
    pub query: String,
    pub category: Option<String>,
}

impl ProviderFilter {
    pub fn new(query: impl Into<String>, category: Option<String>) -> Self {
        Self {
            query: query.into(),
            category,
        }
    }

    /// Exact category match, then a case-insensitive substring match on
    /// name, service name, title or an offered skill. A blank query
    /// matches everything.
    pub fn matches(&self, provider: &ServiceProvider) -> bool {
        if let Some(category) = &self.category {
            if &provider.category != category {
                return false;
            }
        }

        if self.query.trim().is_empty() {
            return true;
        }
        let query = self.query.to_lowercase();
        let contains = |field: &str| field.to_lowercase().contains(&query);

        contains(&provider.name)
            || provider.service_name.as_deref().is_some_and(contains)
            || provider.title.as_deref().is_some_and(contains)
            || provider.skills_offered.iter().any(|skill| contains(&skill.name))
    }

    /// Providers passing the filter, in their original order
    pub fn apply<'a>(&self, providers: &'a [ServiceProvider]) -> Vec<&'a ServiceProvider> {
        providers.iter().filter(|p| self.matches(p)).collect()
    }
}
