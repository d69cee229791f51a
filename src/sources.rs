use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::scraping::extract::ExtractRules;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    /// Markup is complete in the first response.
    Static,
    /// Listings are filled in by client-side script and need a renderer.
    Dynamic,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub name: String,
    pub url: String,
    #[serde(rename = "strategy")]
    pub strategy_kind: StrategyKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rules: Option<ExtractRules>,
}

impl Source {
    pub fn new(
        name: impl Into<String>,
        url: impl Into<String>,
        strategy_kind: StrategyKind,
    ) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            strategy_kind,
            rules: None,
        }
    }

    pub fn with_rules(mut self, rules: ExtractRules) -> Self {
        self.rules = Some(rules);
        self
    }
}

/// Fixed list of sources for the lifetime of the process. Cloning shares the list.
#[derive(Debug, Clone, Default)]
pub struct SourceRegistry {
    sources: Arc<[Source]>,
}

impl SourceRegistry {
    pub fn new(sources: Vec<Source>) -> Self {
        Self {
            sources: sources.into(),
        }
    }

    pub fn snapshot(&self) -> Arc<[Source]> {
        Arc::clone(&self.sources)
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn find(&self, name: &str) -> Option<&Source> {
        self.sources.iter().find(|source| source.name == name)
    }
}

pub fn default_sources() -> Vec<Source> {
    vec![
        Source::new(
            "Sydney Opera House",
            "https://www.sydneyoperahouse.com/events-festivals",
            StrategyKind::Dynamic,
        ),
        Source::new(
            "Time Out Sydney",
            "https://www.timeout.com/sydney/things-to-do/sydney-events-calendar",
            StrategyKind::Dynamic,
        ),
        Source::new(
            "What's On Sydney",
            "https://whatson.cityofsydney.nsw.gov.au/",
            StrategyKind::Static,
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_source_config() {
        let source: Source = serde_json::from_str(
            r#"{"name": "Local Hall", "url": "https://hall.example.com/shows", "strategy": "static",
                "rules": {"card": "li.show", "title": "h4"}}"#,
        )
        .expect("parse source");
        assert_eq!(source.strategy_kind, StrategyKind::Static);
        let rules = source.rules.expect("rules");
        assert_eq!(rules.card, "li.show");
        assert_eq!(rules.title, "h4");
        assert_eq!(rules.price, ExtractRules::default().price);
    }

    #[test]
    fn snapshot_is_shared_and_stable() {
        let registry = SourceRegistry::new(default_sources());
        let first = registry.snapshot();
        let second = registry.clone().snapshot();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.len(), 3);
        assert_eq!(
            registry.find("What's On Sydney").map(|s| s.strategy_kind),
            Some(StrategyKind::Static)
        );
    }
}
