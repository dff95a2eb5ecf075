use crate::error::ScrapeError;
use reqwest::blocking::Client;
use scraper::{ElementRef, Html};
use std::time::Duration;
use url::Url;

const SKIPPED_ELEMENTS: [&str; 4] = ["script", "style", "noscript", "template"];
const BLOCK_ELEMENTS: [&str; 16] = [
    "p", "div", "br", "li", "tr", "td", "th", "h1", "h2", "h3", "h4", "h5", "h6", "section",
    "article", "table",
];

/// Fetches the page behind a link annotation and returns its visible text.
pub trait LinkScraper {
    fn scrape(&self, uri: &str) -> Result<String, ScrapeError>;
}

impl<T: LinkScraper + ?Sized> LinkScraper for &T {
    fn scrape(&self, uri: &str) -> Result<String, ScrapeError> {
        (**self).scrape(uri)
    }
}

/// Scraper for runs without network access: every link yields no text.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopLinkScraper;

impl LinkScraper for NoopLinkScraper {
    fn scrape(&self, _uri: &str) -> Result<String, ScrapeError> {
        Ok(String::new())
    }
}

#[derive(Debug, Clone)]
pub struct HttpLinkScraper {
    client: Client,
}

impl HttpLinkScraper {
    pub fn new(timeout: Option<Duration>) -> Result<Self, ScrapeError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

impl LinkScraper for HttpLinkScraper {
    fn scrape(&self, uri: &str) -> Result<String, ScrapeError> {
        let url = parse_web_url(uri)?;
        let response = self.client.get(url).send()?;

        if !response.status().is_success() {
            return Err(ScrapeError::Status {
                uri: uri.to_string(),
                status: response.status().as_u16(),
            });
        }

        Ok(html_to_text(&response.text()?))
    }
}

pub fn parse_web_url(uri: &str) -> Result<Url, ScrapeError> {
    let url = Url::parse(uri.trim())?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        _ => Err(ScrapeError::UnsupportedUri(uri.to_string())),
    }
}

/// Visible text of an HTML page with scripts and styles removed, trimmed
/// per line and collapsed to single spaces.
pub fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut raw = String::new();
    collect_text(document.root_element(), &mut raw);

    raw.lines()
        .map(str::trim)
        .flat_map(|line| line.split("  "))
        .map(str::trim)
        .filter(|phrase| !phrase.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn collect_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        if let Some(text) = child.value().as_text() {
            out.push_str(text);
        } else if let Some(child_element) = ElementRef::wrap(child) {
            let name = child_element.value().name();
            if SKIPPED_ELEMENTS.contains(&name) {
                continue;
            }
            collect_text(child_element, out);
            if BLOCK_ELEMENTS.contains(&name) {
                out.push('\n');
            }
        }
    }
}
