use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use thiserror::Error;

use crate::models::{NewEvent, RawRecord};
use crate::scraping::base;
use crate::sources::Source;

static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("valid tag regex"));

const TITLE_KEYS: &[&str] = &["title", "name", "headline"];
const DESCRIPTION_KEYS: &[&str] = &["description", "summary", "blurb", "abstract"];
const DATE_KEYS: &[&str] = &["date", "startDate", "start_date", "when"];
const LOCATION_KEYS: &[&str] = &["location", "venue", "place", "address"];
const IMAGE_KEYS: &[&str] = &["imageUrl", "image_url", "image", "thumbnailUrl"];
const PRICE_KEYS: &[&str] = &["price", "cost", "offers"];
const CATEGORY_KEYS: &[&str] = &["category", "genre", "eventType", "keywords"];
const TICKET_KEYS: &[&str] = &["ticketUrl", "ticket_url", "tickets", "offers", "url"];
const POPULAR_KEYS: &[&str] = &["popular", "featured"];
const NEW_KEYS: &[&str] = &["isNew", "is_new", "new"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("missing required fields: {}", .fields.join(", "))]
pub struct ValidationError {
    pub fields: Vec<&'static str>,
}

/// Checks every required field is present and non-blank.
pub fn validate(fields: &NewEvent) -> Result<(), ValidationError> {
    let missing: Vec<&'static str> = fields
        .required_fields()
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(ValidationError { fields: missing })
    }
}

/// Maps a raw extracted record onto the canonical event fields for `source`.
pub fn normalize(raw: &RawRecord, source: &Source) -> Result<NewEvent, ValidationError> {
    let text = |keys: &[&str]| lookup(raw, keys, text_of).map(|v| clean(&v)).unwrap_or_default();
    let link = |keys: &[&str]| {
        lookup(raw, keys, url_of)
            .and_then(|href| base::absolute_url(&source.url, Some(href)))
            .unwrap_or_default()
    };

    let fields = NewEvent {
        title: text(TITLE_KEYS),
        description: text(DESCRIPTION_KEYS),
        date: text(DATE_KEYS),
        location: lookup(raw, LOCATION_KEYS, location_of)
            .map(|v| clean(&v))
            .unwrap_or_default(),
        image_url: link(IMAGE_KEYS),
        price: lookup(raw, PRICE_KEYS, price_of)
            .map(|v| clean(&v))
            .unwrap_or_default(),
        category: text(CATEGORY_KEYS),
        ticket_url: link(TICKET_KEYS),
        popular: lookup(raw, POPULAR_KEYS, flag_of).unwrap_or(false),
        is_new: lookup(raw, NEW_KEYS, flag_of).unwrap_or(false),
        source_url: source.url.clone(),
    };

    validate(&fields)?;
    Ok(fields)
}

/// First alias whose value yields something usable wins.
fn lookup<T>(raw: &RawRecord, keys: &[&str], read: fn(&Value) -> Option<T>) -> Option<T> {
    keys.iter().filter_map(|key| raw.get(*key)).find_map(read)
}

fn clean(input: &str) -> String {
    base::clean_text(&TAG_RE.replace_all(input, " "))
}

fn text_of(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Array(items) => items.iter().find_map(text_of),
        Value::Object(map) => map.get("name").and_then(text_of),
        _ => None,
    }
}

fn url_of(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Array(items) => items.iter().find_map(url_of),
        Value::Object(map) => ["url", "contentUrl", "@id"]
            .iter()
            .find_map(|key| map.get(*key).and_then(url_of)),
        _ => None,
    }
}

fn location_of(value: &Value) -> Option<String> {
    match value {
        Value::Object(map) => {
            let name = map.get("name").and_then(text_of);
            let address = map.get("address").and_then(location_of);
            match (name, address) {
                (Some(name), Some(address)) if !address.contains(&name) => {
                    Some(format!("{name}, {address}"))
                }
                (Some(name), Some(_)) | (Some(name), None) => Some(name),
                (None, Some(address)) => Some(address),
                (None, None) => {
                    let parts: Vec<String> = ["streetAddress", "addressLocality", "addressRegion"]
                        .iter()
                        .filter_map(|key| map.get(*key).and_then(text_of))
                        .collect();
                    (!parts.is_empty()).then(|| parts.join(", "))
                }
            }
        }
        Value::Array(items) => items.iter().find_map(location_of),
        other => text_of(other),
    }
}

fn price_of(value: &Value) -> Option<String> {
    match value {
        Value::Object(map) => {
            let amount = map
                .get("price")
                .or_else(|| map.get("lowPrice"))
                .and_then(text_of)?;
            if amount.trim().parse::<f64>().map(|p| p == 0.0).unwrap_or(false) {
                return Some("Free".to_string());
            }
            match map.get("priceCurrency").and_then(text_of) {
                Some(currency) => Some(format!("{currency} {amount}")),
                None => Some(amount),
            }
        }
        Value::Array(items) => items.iter().find_map(price_of),
        other => text_of(other),
    }
}

fn flag_of(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "yes" | "1" => Some(true),
            "false" | "no" | "0" => Some(false),
            _ => None,
        },
        Value::Number(n) => n.as_i64().map(|n| n != 0),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::StrategyKind;
    use serde_json::json;

    fn source() -> Source {
        Source::new(
            "What's On Sydney",
            "https://whatson.cityofsydney.nsw.gov.au/",
            StrategyKind::Static,
        )
    }

    fn record(value: Value) -> RawRecord {
        match value {
            Value::Object(map) => map,
            _ => panic!("record must be an object"),
        }
    }

    #[test]
    fn maps_card_keys_and_stamps_source() {
        let raw = record(json!({
            "title": "  Sydney   Film Festival ",
            "description": "<p>Australia's premier <b>film</b> festival</p>",
            "date": "Nov 15-26, 2023",
            "location": "State Theatre, Sydney",
            "imageUrl": "/images/sff.jpg",
            "price": "$18.00 - $150.00",
            "category": "Film",
            "ticketUrl": "https://www.sff.org.au/tickets",
        }));

        let event = normalize(&raw, &source()).expect("valid record");
        assert_eq!(event.title, "Sydney Film Festival");
        assert_eq!(event.description, "Australia's premier film festival");
        assert_eq!(
            event.image_url,
            "https://whatson.cityofsydney.nsw.gov.au/images/sff.jpg"
        );
        assert_eq!(event.source_url, "https://whatson.cityofsydney.nsw.gov.au/");
        assert!(!event.popular);
        assert!(!event.is_new);
    }

    #[test]
    fn maps_schema_org_shapes() {
        let raw = record(json!({
            "@type": "MusicEvent",
            "name": "Sydney Music Festival",
            "description": "Three days of music",
            "startDate": "2023-09-10T12:00",
            "location": {
                "@type": "Place",
                "name": "Sydney Olympic Park",
                "address": { "addressLocality": "Sydney" }
            },
            "image": ["https://img.example.com/a.jpg", "https://img.example.com/b.jpg"],
            "offers": {
                "price": "120.00",
                "priceCurrency": "AUD",
                "url": "https://tix.example.com/smf"
            },
            "keywords": ["Music", "Outdoor"],
            "isNew": "yes",
        }));

        let event = normalize(&raw, &source()).expect("valid record");
        assert_eq!(event.location, "Sydney Olympic Park, Sydney");
        assert_eq!(event.image_url, "https://img.example.com/a.jpg");
        assert_eq!(event.price, "AUD 120.00");
        assert_eq!(event.ticket_url, "https://tix.example.com/smf");
        assert_eq!(event.category, "Music");
        assert!(event.is_new);
    }

    #[test]
    fn zero_offer_price_reads_as_free() {
        let raw = record(json!({ "offers": [{ "price": 0, "priceCurrency": "AUD" }] }));
        assert_eq!(lookup(&raw, PRICE_KEYS, price_of).as_deref(), Some("Free"));
    }

    #[test]
    fn rejects_missing_fields_with_every_name() {
        let raw = record(json!({
            "title": "Bondi Beach Festival",
            "description": "   ",
            "date": "Dec 10, 2023",
            "location": "Bondi Beach, Sydney",
            "imageUrl": "https://img.example.com/bondi.jpg",
            "category": "Festival",
            "ticketUrl": "https://www.bondifestival.com.au/tickets",
        }));

        let err = normalize(&raw, &source()).expect_err("should reject");
        assert_eq!(err.fields, vec!["description", "price"]);
        assert_eq!(err.to_string(), "missing required fields: description, price");
    }
}
