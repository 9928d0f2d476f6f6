// src/services/events.rs

//! Events page fetcher and parser.
//!
//! The listing renders each event as an `<h3>` title followed, somewhere
//! later in the document, by a calendar image (`<img alt="Event Date">`)
//! whose following text is the date. Paragraphs next to the title form the
//! description.

use async_trait::async_trait;
use reqwest::Client;
use scraper::node::Element;
use scraper::{ElementRef, Html, Node, Selector};
use url::Url;

use crate::error::{AppError, Result};
use crate::models::{EventRecord, SourceConfig, normalize_text};
use crate::utils::{http, resolve_url, truncate_graphemes};

/// Siblings inspected after a date marker before giving up.
const MAX_DATE_SIBLINGS: usize = 12;

/// Shortest text accepted as a date.
const MIN_DATE_CHARS: usize = 4;

/// Events extracted from one fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchedEvents {
    /// Usable events in page order
    pub events: Vec<EventRecord>,
    /// Headings dropped because a required field was missing
    pub skipped: usize,
}

/// A source of candidate events.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Retrieve and parse the listing at `url`.
    ///
    /// Fails with `AppError::Fetch` when the page cannot be retrieved and
    /// `AppError::Parse` when it holds no event markup at all.
    async fn fetch(&self, url: &str) -> Result<FetchedEvents>;
}

/// Service for fetching events from the listing page.
pub struct EventCrawler {
    rules: SourceConfig,
    client: Client,
}

impl EventCrawler {
    /// Create a new crawler with the given source settings.
    pub fn new(rules: SourceConfig) -> Result<Self> {
        let client = http::create_client(&rules)?;
        Ok(Self { rules, client })
    }
}

#[async_trait]
impl EventSource for EventCrawler {
    async fn fetch(&self, url: &str) -> Result<FetchedEvents> {
        let page_url = Url::parse(url).map_err(|e| AppError::fetch(url, e))?;
        let html = http::fetch_text(&self.client, url).await?;
        let fetched = parse_events(&html, &page_url, &self.rules)?;

        log::info!(
            "Fetched {} events from {} ({} skipped)",
            fetched.events.len(),
            url,
            fetched.skipped
        );
        Ok(fetched)
    }
}

/// Extract events from a listing page.
pub fn parse_events(html: &str, page_url: &Url, rules: &SourceConfig) -> Result<FetchedEvents> {
    let document = Html::parse_document(html);
    let paragraph_sel = parse_selector("p")?;

    let headings = find_headings(&document, rules);
    if headings.is_empty() {
        return Err(AppError::parse(format!("no event headings found on {page_url}")));
    }

    let mut fetched = FetchedEvents::default();
    for HeadingSpan {
        heading,
        marker,
        link,
    } in headings
    {
        let title = element_text(heading);
        if title.is_empty() || rules.ignored_titles.iter().any(|t| t.trim() == title) {
            continue;
        }

        let date = match marker.and_then(|m| date_after_marker(m, &rules.details_label)) {
            Some(date) => date,
            None => match &rules.date_placeholder {
                Some(placeholder) => placeholder.clone(),
                None => {
                    log::warn!("Skipping event '{}': no date found", title);
                    fetched.skipped += 1;
                    continue;
                }
            },
        };

        let container = heading.parent().and_then(ElementRef::wrap);
        let description = container.map(|c| {
            let text = c
                .select(&paragraph_sel)
                .take(rules.description_paragraphs)
                .map(element_text)
                .collect::<Vec<_>>()
                .join(" ");
            truncate_graphemes(&text, rules.description_max_chars)
        });
        let url = link
            .and_then(|a| a.value().attr("href"))
            .map(|href| resolve_url(page_url, href.trim()))
            .unwrap_or_else(|| page_url.to_string());

        fetched.events.push(EventRecord::new(
            &title,
            &date,
            description.as_deref(),
            Some(&url),
        ));
    }

    Ok(fetched)
}

/// An `<h3>` with the markers found for it in document order.
struct HeadingSpan<'a> {
    heading: ElementRef<'a>,
    /// First date marker after the heading
    marker: Option<ElementRef<'a>>,
    /// First details link between the heading and the next one
    link: Option<ElementRef<'a>>,
}

/// Walk the document once, pairing every `<h3>` with the first date marker
/// that follows it and with the details link of its own span.
fn find_headings<'a>(document: &'a Html, rules: &SourceConfig) -> Vec<HeadingSpan<'a>> {
    let mut headings: Vec<HeadingSpan<'a>> = Vec::new();
    let mut pending = Vec::new();

    for node in document.root_element().descendants() {
        let Some(element) = ElementRef::wrap(node) else {
            continue;
        };
        if is_heading(element.value()) {
            pending.push(headings.len());
            headings.push(HeadingSpan {
                heading: element,
                marker: None,
                link: None,
            });
        } else if is_date_marker(element.value(), &rules.date_marker_alt) {
            for index in pending.drain(..) {
                headings[index].marker = Some(element);
            }
        } else if is_details_link(element, &rules.details_label) {
            if let Some(span) = headings.last_mut().filter(|span| span.link.is_none()) {
                span.link = Some(element);
            }
        }
    }

    headings
}

fn is_heading(element: &Element) -> bool {
    element.name() == "h3"
}

fn is_date_marker(element: &Element, marker_alt: &str) -> bool {
    element.name() == "img" && element.attr("alt").is_some_and(|alt| alt.trim() == marker_alt)
}

fn is_details_link(element: ElementRef<'_>, details_label: &str) -> bool {
    element.value().name() == "a"
        && element.value().attr("href").is_some()
        && element_text(element).starts_with(details_label)
}

/// Read the date that follows a marker image.
///
/// Looks through the marker's following siblings, or through its parent's
/// following siblings when the marker is the last child.
fn date_after_marker(marker: ElementRef<'_>, details_label: &str) -> Option<String> {
    let siblings = if marker.next_sibling().is_some() {
        marker.next_siblings()
    } else {
        marker.parent()?.next_siblings()
    };

    siblings
        .take(MAX_DATE_SIBLINGS)
        .find_map(|sibling| date_candidate(sibling.value(), ElementRef::wrap(sibling), details_label))
}

/// Date text carried by a sibling node, if it looks like one.
fn date_candidate(
    node: &Node,
    element: Option<ElementRef<'_>>,
    details_label: &str,
) -> Option<String> {
    let text = match node {
        Node::Text(text) => normalize_text(text),
        Node::Element(_) => {
            let text = element_text(element?);
            if text.starts_with(details_label) {
                return None;
            }
            text
        }
        _ => return None,
    };
    (text.chars().count() >= MIN_DATE_CHARS).then_some(text)
}

/// Normalized text content of an element.
fn element_text(element: ElementRef<'_>) -> String {
    normalize_text(&element.text().collect::<Vec<_>>().join(" "))
}

fn parse_selector(s: &str) -> Result<Selector> {
    Selector::parse(s).map_err(|e| AppError::selector(s, format!("{e:?}")))
}
