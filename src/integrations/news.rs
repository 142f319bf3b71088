//! Latest headlines from the Astro Awani RSS feed.

use std::time::Duration;

use chrono::{DateTime, Datelike, FixedOffset};
use regex::Regex;
use serde::Serialize;

use crate::error::{ServiceError, ServiceResult};

use super::{http_agent, upstream_error};

pub const NEWS_SOURCE: &str = "Astro Awani";
pub const DEFAULT_DISPLAY_COUNT: usize = 5;

const MALAY_MONTHS: [&str; 12] = [
    "Januari", "Februari", "Mac", "April", "Mei", "Jun", "Julai", "Ogos", "September", "Oktober",
    "November", "Disember",
];

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NewsArticle {
    pub id: usize,
    pub title: String,
    pub link: String,
    pub image: Option<String>,
    pub date: String,
    pub excerpt: String,
    pub source: String,
}

/// Compiled patterns for pulling `<item>` fields out of an RSS document.
#[derive(Clone, Debug)]
pub struct FeedParser {
    item: Regex,
    title: Regex,
    link: Regex,
    description: Regex,
    pub_date: Regex,
    enclosure: Regex,
    cdata: Regex,
}

fn compile(pattern: &str) -> ServiceResult<Regex> {
    Regex::new(pattern).map_err(|err| ServiceError::Config(format!("Regex error: {err}")))
}

fn element(name: &str) -> ServiceResult<Regex> {
    compile(&format!(r"(?s)<{name}\b[^>]*>(.*?)</{name}>"))
}

impl FeedParser {
    pub fn new() -> ServiceResult<Self> {
        Ok(Self {
            item: element("item")?,
            title: element("title")?,
            link: element("link")?,
            description: element("description")?,
            pub_date: element("pubDate")?,
            enclosure: compile(r#"(?s)<enclosure\b[^>]*?\burl\s*=\s*["']([^"']+)["']"#)?,
            cdata: compile(r"(?s)^\s*<!\[CDATA\[(.*?)\]\]>\s*$")?,
        })
    }

    fn text_of(&self, pattern: &Regex, item: &str) -> String {
        let Some(raw) = pattern.captures(item).and_then(|c| c.get(1)) else {
            return String::new();
        };
        match self.cdata.captures(raw.as_str()).and_then(|c| c.get(1)) {
            Some(inner) => inner.as_str().trim().to_string(),
            None => decode_entities(raw.as_str().trim()),
        }
    }

    /// First `limit` items of the feed, in feed order.
    pub fn parse(&self, xml: &str, limit: usize, offset: &FixedOffset) -> Vec<NewsArticle> {
        self.item
            .captures_iter(xml)
            .filter_map(|c| c.get(1))
            .take(limit)
            .enumerate()
            .map(|(id, item)| {
                let item = item.as_str();
                let raw_date = self.text_of(&self.pub_date, item);
                NewsArticle {
                    id,
                    title: self.text_of(&self.title, item),
                    link: self.text_of(&self.link, item),
                    image: self
                        .enclosure
                        .captures(item)
                        .and_then(|c| c.get(1))
                        .map(|m| decode_entities(m.as_str())),
                    date: malay_date(&raw_date, offset).unwrap_or(raw_date),
                    excerpt: self.text_of(&self.description, item),
                    source: NEWS_SOURCE.to_string(),
                }
            })
            .collect()
    }
}

fn decode_entities(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// `Sun, 19 Oct 2026 06:05:00 +0000` at +08:00 becomes `19 Oktober 2026, 02:05 PM`.
pub fn malay_date(rfc2822: &str, offset: &FixedOffset) -> Option<String> {
    let local = DateTime::parse_from_rfc2822(rfc2822.trim())
        .ok()?
        .with_timezone(offset);
    let month = MALAY_MONTHS[local.month0() as usize];
    Some(format!(
        "{} {} {}, {}",
        local.day(),
        month,
        local.year(),
        local.format("%I:%M %p")
    ))
}

#[derive(Clone)]
pub struct NewsClient {
    agent: ureq::Agent,
    feed_url: String,
    parser: FeedParser,
}

impl NewsClient {
    pub fn new(feed_url: String) -> ServiceResult<Self> {
        Ok(Self {
            agent: http_agent(Duration::from_secs(15)),
            feed_url,
            parser: FeedParser::new()?,
        })
    }

    pub fn fetch_latest(&self, limit: usize, offset: &FixedOffset) -> ServiceResult<Vec<NewsArticle>> {
        let xml = self
            .agent
            .get(&self.feed_url)
            .call()
            .map_err(|e| upstream_error("news feed", e))?
            .into_string()?;
        let articles = self.parser.parse(&xml, limit, offset);
        tracing::debug!(count = articles.len(), "parsed news feed");
        Ok(articles)
    }
}
