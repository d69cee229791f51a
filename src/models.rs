use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Canonical event as stored and served to callers.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub date: String, // free text, e.g. "Aug 24-28, 2023" or "Dec 3, 2023 • 8:00 PM"
    pub location: String,
    pub image_url: String,
    pub price: String, // free text, e.g. "$25.00 - $75.00" or "Free entry"
    pub category: String,
    pub ticket_url: String,
    pub popular: bool,
    pub is_new: bool,
    pub source_url: String,
    pub last_updated: DateTime<Utc>,
}

impl Event {
    pub fn identity(&self) -> (&str, &str) {
        (&self.source_url, &self.title)
    }
}

/// Fields accepted by create and upsert; `id` and `last_updated` are assigned by the store.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewEvent {
    pub title: String,
    pub description: String,
    pub date: String,
    pub location: String,
    pub image_url: String,
    pub price: String,
    pub category: String,
    pub ticket_url: String,
    #[serde(default)]
    pub popular: bool,
    #[serde(default)]
    pub is_new: bool,
    pub source_url: String,
}

impl NewEvent {
    /// Required text fields in declaration order, paired with their wire names.
    pub(crate) fn required_fields(&self) -> [(&'static str, &str); 9] {
        [
            ("title", self.title.as_str()),
            ("description", self.description.as_str()),
            ("date", self.date.as_str()),
            ("location", self.location.as_str()),
            ("imageUrl", self.image_url.as_str()),
            ("price", self.price.as_str()),
            ("category", self.category.as_str()),
            ("ticketUrl", self.ticket_url.as_str()),
            ("sourceUrl", self.source_url.as_str()),
        ]
    }
}

/// Partial update; `None` leaves the stored value untouched.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct EventPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub date: Option<String>,
    pub location: Option<String>,
    pub image_url: Option<String>,
    pub price: Option<String>,
    pub category: Option<String>,
    pub ticket_url: Option<String>,
    pub popular: Option<bool>,
    pub is_new: Option<bool>,
    pub source_url: Option<String>,
}

impl EventPatch {
    pub(crate) fn supplied_text_fields(&self) -> Vec<(&'static str, &str)> {
        [
            ("title", &self.title),
            ("description", &self.description),
            ("date", &self.date),
            ("location", &self.location),
            ("imageUrl", &self.image_url),
            ("price", &self.price),
            ("category", &self.category),
            ("ticketUrl", &self.ticket_url),
            ("sourceUrl", &self.source_url),
        ]
        .into_iter()
        .filter_map(|(name, value)| value.as_deref().map(|v| (name, v)))
        .collect()
    }

    pub(crate) fn apply(self, event: &mut Event) {
        if let Some(v) = self.title {
            event.title = v;
        }
        if let Some(v) = self.description {
            event.description = v;
        }
        if let Some(v) = self.date {
            event.date = v;
        }
        if let Some(v) = self.location {
            event.location = v;
        }
        if let Some(v) = self.image_url {
            event.image_url = v;
        }
        if let Some(v) = self.price {
            event.price = v;
        }
        if let Some(v) = self.category {
            event.category = v;
        }
        if let Some(v) = self.ticket_url {
            event.ticket_url = v;
        }
        if let Some(v) = self.popular {
            event.popular = v;
        }
        if let Some(v) = self.is_new {
            event.is_new = v;
        }
        if let Some(v) = self.source_url {
            event.source_url = v;
        }
    }
}

impl From<NewEvent> for EventPatch {
    fn from(fields: NewEvent) -> Self {
        Self {
            title: Some(fields.title),
            description: Some(fields.description),
            date: Some(fields.date),
            location: Some(fields.location),
            image_url: Some(fields.image_url),
            price: Some(fields.price),
            category: Some(fields.category),
            ticket_url: Some(fields.ticket_url),
            popular: Some(fields.popular),
            is_new: Some(fields.is_new),
            source_url: Some(fields.source_url),
        }
    }
}

/// Unstructured key/value bag produced by one extraction; shape depends on the source.
pub type RawRecord = Map<String, Value>;

/// Filter accepted by the query surface. Blank strings count as absent.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(default)]
pub struct EventQuery {
    pub search: Option<String>,
    pub category: Option<String>,
}

impl EventQuery {
    pub fn search(mut self, query: impl Into<String>) -> Self {
        self.search = Some(query.into());
        self
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub(crate) fn search_term(&self) -> Option<String> {
        non_blank(self.search.as_deref()).map(str::to_lowercase)
    }

    pub(crate) fn category_key(&self) -> Option<String> {
        non_blank(self.category.as_deref()).map(category_key)
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

pub(crate) fn category_key(category: &str) -> String {
    category.trim().to_lowercase()
}

pub(crate) fn search_text(title: &str, description: &str, location: &str) -> String {
    // Unit separator keeps a query from matching across field boundaries.
    format!(
        "{}\u{1f}{}\u{1f}{}",
        title.to_lowercase(),
        description.to_lowercase(),
        location.to_lowercase()
    )
}
