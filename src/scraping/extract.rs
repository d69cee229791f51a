use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{base, ScrapeError};
use crate::models::RawRecord;

static JSON_LD_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"script[type="application/ld+json"]"#).expect("json-ld selector")
});

/// CSS selectors describing how listing cards are laid out on a page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractRules {
    pub card: String,
    pub title: String,
    pub description: String,
    pub date: String,
    pub location: String,
    pub price: String,
    pub category: String,
    pub image: String,
    pub ticket: String,
}

impl Default for ExtractRules {
    fn default() -> Self {
        Self {
            card: r#".event-card, article.event, [itemtype$="schema.org/Event"]"#.into(),
            title: r#".event-title, [itemprop="name"], h2, h3"#.into(),
            description: r#".event-description, [itemprop="description"], p"#.into(),
            date: r#".event-date, [itemprop="startDate"], time"#.into(),
            location: r#".event-location, [itemprop="location"]"#.into(),
            price: r#".event-price, [itemprop="price"]"#.into(),
            category: r#".event-category, [itemprop="eventType"]"#.into(),
            image: "img".into(),
            ticket: r#"a.event-tickets, a[href*="ticket"]"#.into(),
        }
    }
}

impl ExtractRules {
    pub fn compile(&self) -> Result<CompiledRules, ScrapeError> {
        Ok(CompiledRules {
            card: parse_selector("card", &self.card)?,
            title: parse_selector("title", &self.title)?,
            description: parse_selector("description", &self.description)?,
            date: parse_selector("date", &self.date)?,
            location: parse_selector("location", &self.location)?,
            price: parse_selector("price", &self.price)?,
            category: parse_selector("category", &self.category)?,
            image: parse_selector("image", &self.image)?,
            ticket: parse_selector("ticket", &self.ticket)?,
        })
    }
}

fn parse_selector(field: &str, css: &str) -> Result<Selector, ScrapeError> {
    Selector::parse(css)
        .map_err(|err| ScrapeError::Rules(format!("{field} selector {css:?}: {err}")))
}

pub struct CompiledRules {
    card: Selector,
    title: Selector,
    description: Selector,
    date: Selector,
    location: Selector,
    price: Selector,
    category: Selector,
    image: Selector,
    ticket: Selector,
}

/// Pulls raw event records out of a page: schema.org JSON-LD blocks first, then listing cards.
/// A page offering neither is reported as unrecognised.
pub fn extract_records(html: &str, rules: &CompiledRules) -> Result<Vec<RawRecord>, ScrapeError> {
    let document = Html::parse_document(html);

    let mut recognised = false;
    let mut records = Vec::new();

    for script in document.select(&JSON_LD_SELECTOR) {
        let body = script.text().collect::<String>();
        let value: Value = match serde_json::from_str(body.trim()) {
            Ok(value) => value,
            Err(err) => {
                tracing::debug!(error = %err, "skipping malformed json-ld block");
                continue;
            }
        };
        let before = records.len();
        collect_json_ld_events(value, &mut records);
        recognised |= records.len() > before;
    }

    for card in document.select(&rules.card) {
        recognised = true;
        let record = card_record(&card, rules);
        if !record.is_empty() {
            records.push(record);
        }
    }

    if !recognised {
        return Err(ScrapeError::Parse(
            "no event markup or structured data found".to_string(),
        ));
    }
    Ok(records)
}

fn collect_json_ld_events(value: Value, out: &mut Vec<RawRecord>) {
    match value {
        Value::Array(items) => {
            for item in items {
                collect_json_ld_events(item, out);
            }
        }
        Value::Object(mut map) => {
            if let Some(graph) = map.remove("@graph") {
                collect_json_ld_events(graph, out);
            }
            if is_event_type(map.get("@type")) {
                out.push(map);
            }
        }
        _ => {}
    }
}

fn is_event_type(value: Option<&Value>) -> bool {
    match value {
        Some(Value::String(kind)) => kind.ends_with("Event"),
        Some(Value::Array(kinds)) => kinds.iter().any(|kind| is_event_type(Some(kind))),
        _ => false,
    }
}

fn card_record(card: &ElementRef<'_>, rules: &CompiledRules) -> RawRecord {
    let mut record = RawRecord::new();
    let mut put = |key: &str, value: Option<String>| {
        if let Some(value) = value {
            record.insert(key.to_string(), json!(value));
        }
    };

    put("title", base::first_text(card, &rules.title));
    put("description", base::first_text(card, &rules.description));
    put("date", base::first_text(card, &rules.date));
    put("location", base::first_text(card, &rules.location));
    put("price", base::first_text(card, &rules.price));
    put(
        "category",
        base::first_text(card, &rules.category)
            .or_else(|| card.value().attr("data-category").map(str::to_string)),
    );
    put(
        "imageUrl",
        base::first_attr(card, &rules.image, &["src", "data-src"]),
    );
    put("ticketUrl", base::first_attr(card, &rules.ticket, &["href"]));

    record
}
