use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::base::PageFetcher;
use super::dynamic::Renderer;
use super::ScrapeError;

struct Listing {
    page: &'static str,
    title: &'static str,
    description: &'static str,
    date: &'static str,
    location: &'static str,
    image_url: &'static str,
    price: &'static str,
    category: &'static str,
    ticket_url: &'static str,
    popular: bool,
    is_new: bool,
}

const OPERA_HOUSE: &str = "https://www.sydneyoperahouse.com/events-festivals";
const TIME_OUT: &str = "https://www.timeout.com/sydney/things-to-do/sydney-events-calendar";
const WHATS_ON: &str = "https://whatson.cityofsydney.nsw.gov.au/";

const LISTINGS: &[Listing] = &[
    Listing {
        page: OPERA_HOUSE,
        title: "Vivid Sydney Light Festival",
        description: "Experience Australia's most spectacular light show with stunning projections on the Sydney Opera House and landmarks throughout the city.",
        date: "Aug 24-28, 2023",
        location: "Sydney Opera House, Sydney",
        image_url: "https://images.unsplash.com/photo-1524293581917-878a6d017c71?auto=format&fit=crop&w=600&h=400",
        price: "$25.00 - $75.00",
        category: "Festival",
        ticket_url: "https://www.vividsydney.com/tickets",
        popular: true,
        is_new: false,
    },
    Listing {
        page: TIME_OUT,
        title: "Sydney Music Festival",
        description: "Three days of incredible music featuring top international and local artists across multiple stages.",
        date: "Sep 10-12, 2023",
        location: "Sydney Olympic Park, Sydney",
        image_url: "https://images.unsplash.com/photo-1459749411175-04bf5292ceea?auto=format&fit=crop&w=600&h=400",
        price: "$120.00 - $350.00",
        category: "Music",
        ticket_url: "https://www.sydneymusicfestival.com/tickets",
        popular: false,
        is_new: false,
    },
    Listing {
        page: WHATS_ON,
        title: "Sydney Harbor Food & Wine Festival",
        description: "Sample Australia's finest cuisine and wines with stunning harbor views. Meet celebrity chefs and enjoy cooking demonstrations.",
        date: "Oct 5-8, 2023",
        location: "Circular Quay, Sydney",
        image_url: "https://images.unsplash.com/photo-1414235077428-338989a2e8c0?auto=format&fit=crop&w=600&h=400",
        price: "$45.00 - $95.00",
        category: "Food",
        ticket_url: "https://www.sydneyfoodwinefestival.com/tickets",
        popular: false,
        is_new: true,
    },
    Listing {
        page: TIME_OUT,
        title: "Sydney Film Festival",
        description: "Australia's premier international film festival featuring the best in world cinema, documentaries, and Australian films.",
        date: "Nov 15-26, 2023",
        location: "State Theatre, Sydney",
        image_url: "https://images.unsplash.com/photo-1528072164453-f4e8ef0d475a?auto=format&fit=crop&w=600&h=400",
        price: "$18.00 - $150.00",
        category: "Film",
        ticket_url: "https://www.sff.org.au/tickets",
        popular: false,
        is_new: false,
    },
    Listing {
        page: TIME_OUT,
        title: "Sydney Comedy Festival",
        description: "Australia's biggest comedy festival featuring local and international comedians across multiple venues.",
        date: "Dec 3, 2023 • 8:00 PM",
        location: "Enmore Theatre, Newtown",
        image_url: "https://images.unsplash.com/photo-1514525253161-7a46d19cd819?auto=format&fit=crop&w=300&h=400",
        price: "$35.00",
        category: "Comedy",
        ticket_url: "https://www.sydneycomedyfest.com.au/tickets",
        popular: false,
        is_new: false,
    },
    Listing {
        page: WHATS_ON,
        title: "Bondi Beach Festival",
        description: "Celebrate summer at Sydney's iconic Bondi Beach with music, food, and beach activities.",
        date: "Dec 10, 2023 • 10:00 AM",
        location: "Bondi Beach, Sydney",
        image_url: "https://images.unsplash.com/photo-1507525428034-b723cf961d3e?auto=format&fit=crop&w=300&h=400",
        price: "$15.00",
        category: "Festival",
        ticket_url: "https://www.bondifestival.com.au/tickets",
        popular: false,
        is_new: false,
    },
    Listing {
        page: OPERA_HOUSE,
        title: "Contemporary Art Exhibition",
        description: "Explore contemporary art from Australian and international artists at this acclaimed exhibition.",
        date: "Dec 15-20, 2023",
        location: "Museum of Contemporary Art, Sydney",
        image_url: "https://images.unsplash.com/photo-1531058020387-3be344556be6?auto=format&fit=crop&w=300&h=400",
        price: "$22.00",
        category: "Art",
        ticket_url: "https://www.mca.com.au/tickets",
        popular: false,
        is_new: false,
    },
    Listing {
        page: WHATS_ON,
        title: "Sydney Food Markets",
        description: "Discover the best of Sydney's local produce and artisanal foods at this popular market.",
        date: "Dec 18, 2023 • 9:00 AM",
        location: "Carriageworks, Eveleigh",
        image_url: "https://images.unsplash.com/photo-1533900298318-6b8da08a523e?auto=format&fit=crop&w=300&h=400",
        price: "Free entry",
        category: "Food",
        ticket_url: "https://www.carriageworks.com.au/events/farmers-market",
        popular: false,
        is_new: false,
    },
];

/// Canned listing pages keyed by URL, served in place of the live sites during development.
#[derive(Debug, Clone, Default)]
pub struct FixturePages {
    pages: HashMap<String, String>,
}

impl FixturePages {
    pub fn new() -> Self {
        Self::default()
    }

    /// The bundled Sydney listings, one JSON-LD page per default source.
    pub fn bundled() -> Self {
        let mut grouped: HashMap<&str, Vec<Value>> = HashMap::new();
        for listing in LISTINGS {
            grouped.entry(listing.page).or_default().push(json!({
                "@context": "https://schema.org",
                "@type": "Event",
                "title": listing.title,
                "description": listing.description,
                "date": listing.date,
                "location": listing.location,
                "imageUrl": listing.image_url,
                "price": listing.price,
                "category": listing.category,
                "ticketUrl": listing.ticket_url,
                "popular": listing.popular,
                "isNew": listing.is_new,
            }));
        }

        grouped
            .into_iter()
            .fold(Self::new(), |pages, (url, events)| {
                pages.with_page(url, json_ld_page(&Value::Array(events)))
            })
    }

    pub fn with_page(mut self, url: impl Into<String>, html: impl Into<String>) -> Self {
        self.pages.insert(url.into(), html.into());
        self
    }

    fn page(&self, url: &str) -> Result<String, ScrapeError> {
        self.pages
            .get(url)
            .cloned()
            .ok_or_else(|| ScrapeError::Fetch(format!("no fixture page for {url}")))
    }
}

pub fn json_ld_page(data: &Value) -> String {
    format!(
        "<!doctype html><html><head><script type=\"application/ld+json\">{data}</script></head>\
         <body></body></html>"
    )
}

#[async_trait]
impl PageFetcher for FixturePages {
    async fn fetch_html(&self, url: &str) -> Result<String, ScrapeError> {
        self.page(url)
    }
}

#[async_trait]
impl Renderer for FixturePages {
    async fn render(&self, url: &str) -> Result<String, ScrapeError> {
        self.page(url)
    }
}
