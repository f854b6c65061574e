//! Airbnb page parsing.
//!
//! Pure functions over fetched HTML: search results yield listing URLs,
//! listings yield the host link, host pages yield the profile fields.
//! Selectors and text patterns follow the pt-BR site with English fallbacks.

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use std::sync::LazyLock;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExtractError {
    #[error("listing page has no title (h1)")]
    MissingTitle,

    #[error("document has no readable content")]
    EmptyDocument,
}

/// Listing links found on one page of search results
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchPage {
    pub listing_urls: Vec<String>,
    pub next_page: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ListingPage {
    pub title: String,
    pub host_profile_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfilePage {
    pub name: Option<String>,
    pub listings_count: Option<u32>,
    pub rating: Option<f32>,
    pub review_count: Option<u32>,
    pub location: Option<String>,
    pub joined: Option<String>,
}

fn selector(css: &str) -> Selector {
    Selector::parse(css).unwrap()
}

static TITLE: LazyLock<Selector> = LazyLock::new(|| selector("title"));
static H1: LazyLock<Selector> = LazyLock::new(|| selector("h1"));
static ROOM_LINKS: LazyLock<Selector> = LazyLock::new(|| selector(r#"a[href*="/rooms/"]"#));
static SECTIONS: LazyLock<Selector> = LazyLock::new(|| selector("section"));
static NAV_LINKS: LazyLock<Selector> = LazyLock::new(|| selector("nav a[href]"));
static NEXT_LINKS: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    ["a[aria-label='Próximo']", "a[aria-label='Next']"]
        .into_iter()
        .map(selector)
        .collect()
});
// Tried in order; the first element that yields a /users/ link wins
static HOST_LINKS: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    [
        "a[aria-label*='anfitriã']",
        "a[aria-label*='host']",
        "a[aria-label*='Host']",
        "a[href*='/users/show/']",
        "a[href*='/users/profile/']",
        "a[href^='/users/']",
    ]
    .into_iter()
    .map(selector)
    .collect()
});

static SHOWING_OF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)de\s+(\d+)\s+ite").unwrap());
static COUNT_WORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d+)\s+(?:acomodaç|anúncio|listing)").unwrap()
});
static RATING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d[.,]\d{1,2})\s*(?:★|estrelas?|de\s+avalia|avaliação|rating)").unwrap()
});
static RATING_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:classificação|rating)\s*(\d[.,]\d{1,2})").unwrap()
});
static REVIEWS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d[\d.]*)\s*(?:avaliações|comentários|reviews)").unwrap()
});
static LOCATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:mora em|vive em|lives in)\s+([^\n·]+)").unwrap()
});
static JOINED_SINCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:anfitriã?o?\s+desde|no airbnb desde|joined in|hosting since)\s+([^\n·]+)")
        .unwrap()
});
static HOSTING_FOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\d+\s+(?:anos?|meses|years?|months?)\s+(?:hospedando|como anfitri[ãa]o?|hosting|on airbnb|no airbnb)")
        .unwrap()
});

/// Text of the `<title>` element
pub fn page_title(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    document
        .select(&TITLE)
        .next()
        .map(|el| collapse_whitespace(&el.text().collect::<String>()))
        .filter(|t| !t.is_empty())
}

/// Canonical form of a listing link: absolute, `/rooms/<id>`, no query or fragment
pub fn normalize_listing_url(href: &str, base: &Url) -> Option<String> {
    let mut url = base.join(href).ok()?;
    let segments: Vec<&str> = url.path_segments()?.filter(|s| !s.is_empty()).collect();
    match segments.as_slice() {
        ["rooms", id] if id.chars().all(|c| c.is_ascii_digit()) => {
            let path = format!("/rooms/{}", id);
            url.set_path(&path);
        }
        _ => return None,
    }
    url.set_query(None);
    url.set_fragment(None);
    Some(url.to_string())
}

fn absolute_url(href: &str, base: &Url) -> Option<String> {
    let mut url = base.join(href.trim()).ok()?;
    url.set_fragment(None);
    Some(url.to_string())
}

pub fn parse_search_page(html: &str, base: &Url) -> SearchPage {
    let document = Html::parse_document(html);

    let mut seen = HashSet::new();
    let listing_urls = document
        .select(&ROOM_LINKS)
        .filter_map(|a| a.value().attr("href"))
        .filter_map(|href| normalize_listing_url(href, base))
        .filter(|url| seen.insert(url.clone()))
        .collect();

    let next_page = NEXT_LINKS
        .iter()
        .find_map(|sel| document.select(sel).find_map(|a| a.value().attr("href")))
        .or_else(|| {
            document
                .select(&NAV_LINKS)
                .find(|a| {
                    let text = a.text().collect::<String>();
                    text.contains("Próximo") || text.contains("Next")
                })
                .and_then(|a| a.value().attr("href"))
        })
        .and_then(|href| absolute_url(href, base));

    SearchPage {
        listing_urls,
        next_page,
    }
}

pub fn parse_listing_page(html: &str, base: &Url) -> Result<ListingPage, ExtractError> {
    let document = Html::parse_document(html);

    let title = first_heading(&document).ok_or(ExtractError::MissingTitle)?;

    let host_profile_url = HOST_LINKS.iter().find_map(|sel| {
        document
            .select(sel)
            .filter_map(|a| a.value().attr("href"))
            .filter_map(|href| absolute_url(href, base))
            .find(|url| url.contains("/users/"))
    });

    Ok(ListingPage {
        title,
        host_profile_url,
    })
}

pub fn parse_profile_page(html: &str) -> Result<ProfilePage, ExtractError> {
    let document = Html::parse_document(html);
    let text = visible_text(&document);
    if text.is_empty() {
        return Err(ExtractError::EmptyDocument);
    }

    let name = first_heading(&document).map(|h| strip_about_prefix(&h));

    Ok(ProfilePage {
        name,
        listings_count: listings_count(&document, &text),
        rating: capture(&RATING, &text)
            .or_else(|| capture(&RATING_LABEL, &text))
            .and_then(|r| r.replace(',', ".").parse::<f32>().ok())
            .filter(|r| (0.0..=5.0).contains(r)),
        review_count: capture(&REVIEWS, &text).and_then(|n| parse_count(&n)),
        location: capture(&LOCATION, &text),
        joined: capture(&JOINED_SINCE, &text).or_else(|| {
            HOSTING_FOR
                .find(&text)
                .map(|m| collapse_whitespace(m.as_str()))
        }),
    })
}

/// Listing cards in the host's listings section, else the "de N itens"
/// pager, else any "N acomodações" mention
fn listings_count(document: &Html, text: &str) -> Option<u32> {
    let section = document
        .select(&SECTIONS)
        .filter(|s| {
            let t = s.text().collect::<String>();
            t.contains("Acomodações de") || t.contains("listings")
        })
        .min_by_key(|s| s.text().map(str::len).sum::<usize>());

    if let Some(section) = section {
        let cards = distinct_rooms(section);
        if cards > 0 {
            return Some(cards);
        }
        if let Some(n) = capture(&SHOWING_OF, text).and_then(|n| n.parse().ok()) {
            return Some(n);
        }
    }

    capture(&COUNT_WORD, text).and_then(|n| n.parse().ok())
}

fn distinct_rooms(section: ElementRef<'_>) -> u32 {
    section
        .select(&ROOM_LINKS)
        .filter_map(|a| a.value().attr("href"))
        .map(|href| href.split('?').next().unwrap_or(href))
        .collect::<HashSet<_>>()
        .len() as u32
}

fn first_heading(document: &Html) -> Option<String> {
    document
        .select(&H1)
        .map(|h| collapse_whitespace(&h.text().collect::<String>()))
        .find(|t| !t.is_empty())
}

fn strip_about_prefix(heading: &str) -> String {
    ["Sobre ", "About ", "Conheça "]
        .iter()
        .find_map(|prefix| heading.strip_prefix(prefix))
        .unwrap_or(heading)
        .trim()
        .to_string()
}

/// Text nodes outside script and style, one per line
fn visible_text(document: &Html) -> String {
    let mut lines = Vec::new();
    for node in document.root_element().descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node
            .parent()
            .and_then(|p| p.value().as_element().map(|e| e.name()))
            .is_some_and(|name| matches!(name, "script" | "style" | "noscript" | "title"));
        if hidden {
            continue;
        }
        let line = text.trim();
        if !line.is_empty() {
            lines.push(line.to_string());
        }
    }
    lines.join("\n")
}

fn capture(re: &Regex, text: &str) -> Option<String> {
    re.captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
}

fn parse_count(raw: &str) -> Option<u32> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
