//! Page layouts of the supported Kenyan job boards.
//!
//! A [`BoardDefinition`] says how to search a board and where things sit in
//! its markup: which element is one result card, which anchor in the card is
//! the posting, and which selectors hold the posting's fields, both on the
//! card and, for boards that need it, on the posting's own page.

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use std::sync::LazyLock;
use url::Url;

use crate::error::LayoutError;
use crate::types::job::{JobSource, RawEntry};

static ANCHOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").unwrap());

const RELATIVE_DATE: &str = r"(?i)(\d+\s+(?:minute|hour|day|week|month)s?\s+ago|today|yesterday)";

/// Compile a CSS selector.
pub fn css(selector: &str) -> Result<Selector, LayoutError> {
    Selector::parse(selector).map_err(|_| LayoutError::Selector(selector.to_string()))
}

/// Where one field's value sits inside a scope (a result card or a whole
/// posting page).
#[derive(Debug, Clone)]
pub enum FieldRule {
    /// Text of every matching element, joined with ", "
    Text(Selector),

    /// Text after `label` in the first matching element that contains it,
    /// e.g. `Deadline: Aug 12, 2025`
    AfterLabel { selector: Selector, label: String },

    /// Text of the element right after a heading that reads `label`
    NextToLabel { heading: Selector, label: String },

    /// First capture group over the scope's text
    Pattern(Regex),
}

impl FieldRule {
    pub fn text(selector: &str) -> Result<Self, LayoutError> {
        Ok(Self::Text(css(selector)?))
    }

    pub fn after_label(selector: &str, label: impl Into<String>) -> Result<Self, LayoutError> {
        Ok(Self::AfterLabel {
            selector: css(selector)?,
            label: label.into(),
        })
    }

    pub fn next_to_label(heading: &str, label: impl Into<String>) -> Result<Self, LayoutError> {
        Ok(Self::NextToLabel {
            heading: css(heading)?,
            label: label.into(),
        })
    }

    pub fn pattern(pattern: &str) -> Result<Self, LayoutError> {
        Ok(Self::Pattern(Regex::new(pattern)?))
    }

    /// Read the field from `scope`. Blank values read as `None`.
    pub fn read(&self, scope: ElementRef<'_>) -> Option<String> {
        let value = match self {
            Self::Text(selector) => {
                let parts: Vec<String> = scope
                    .select(selector)
                    .map(text_of)
                    .filter(|text| !text.is_empty())
                    .collect();
                parts.join(", ")
            }
            Self::AfterLabel { selector, label } => scope
                .select(selector)
                .map(text_of)
                .find_map(|text| value_after(&text, label))?,
            Self::NextToLabel { heading, label } => scope
                .select(heading)
                .filter(|el| text_of(*el).trim_end_matches(':').eq_ignore_ascii_case(label))
                .find_map(|el| el.next_siblings().find_map(ElementRef::wrap))
                .map(text_of)?,
            Self::Pattern(pattern) => pattern
                .captures(&text_of(scope))
                .and_then(|caps| caps.get(1))
                .map(|m| m.as_str().trim().to_string())?,
        };

        (!value.is_empty()).then_some(value)
    }
}

/// Field rules for one kind of scope. Fields without a rule stay as they are.
#[derive(Debug, Clone, Default)]
pub struct FieldLayout {
    pub date_posted: Option<FieldRule>,
    pub date_expires: Option<FieldRule>,
    pub qualification: Option<FieldRule>,
    pub years_of_experience: Option<FieldRule>,
    pub location: Option<FieldRule>,
}

impl FieldLayout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_date_posted(mut self, rule: FieldRule) -> Self {
        self.date_posted = Some(rule);
        self
    }

    pub fn with_date_expires(mut self, rule: FieldRule) -> Self {
        self.date_expires = Some(rule);
        self
    }

    pub fn with_qualification(mut self, rule: FieldRule) -> Self {
        self.qualification = Some(rule);
        self
    }

    pub fn with_experience(mut self, rule: FieldRule) -> Self {
        self.years_of_experience = Some(rule);
        self
    }

    pub fn with_location(mut self, rule: FieldRule) -> Self {
        self.location = Some(rule);
        self
    }

    /// Fill the fields `entry` lacks from `scope`. Present fields are kept.
    pub fn fill(&self, scope: ElementRef<'_>, entry: &mut RawEntry) {
        let read = |rule: &Option<FieldRule>| rule.as_ref().and_then(|rule| rule.read(scope));
        let found = RawEntry {
            date_posted: read(&self.date_posted),
            date_expires: read(&self.date_expires),
            qualification: read(&self.qualification),
            years_of_experience: read(&self.years_of_experience),
            location: read(&self.location),
            ..Default::default()
        };
        entry.fill_from(&found);
    }
}

/// How to query one board and read its pages.
#[derive(Debug, Clone)]
pub struct BoardDefinition {
    pub source: JobSource,

    /// Search URL with `{keyword}` and `{page}` placeholders
    pub search_url_template: String,

    /// One posting on a result page
    pub card_selector: Selector,

    /// The first anchor in a card whose resolved href matches this is the posting
    pub link_pattern: Regex,

    /// Fields shown on the result card
    pub card_fields: FieldLayout,

    /// Fields read from the posting's own page; `None` means no detail requests
    pub detail_fields: Option<FieldLayout>,
}

impl BoardDefinition {
    /// Build a definition from a card selector and a link pattern.
    pub fn new(
        source: JobSource,
        search_url_template: impl Into<String>,
        card_selector: &str,
        link_pattern: &str,
    ) -> Result<Self, LayoutError> {
        Ok(Self {
            source,
            search_url_template: search_url_template.into(),
            card_selector: css(card_selector)?,
            link_pattern: Regex::new(link_pattern)?,
            card_fields: FieldLayout::default(),
            detail_fields: None,
        })
    }

    pub fn with_card_fields(mut self, fields: FieldLayout) -> Self {
        self.card_fields = fields;
        self
    }

    pub fn with_detail_fields(mut self, fields: FieldLayout) -> Self {
        self.detail_fields = Some(fields);
        self
    }

    /// The built-in layout for a board.
    pub fn for_source(source: JobSource) -> Result<Self, LayoutError> {
        let definition = match source {
            JobSource::MyJobMag => Self::new(
                source,
                "https://www.myjobmag.co.ke/search/jobs?q={keyword}&currentpage={page}",
                "li.job-list-li",
                r"/job/[^/?#]+",
            )?
            .with_card_fields(FieldLayout::new().with_date_posted(FieldRule::text("li.job-date")?))
            .with_detail_fields(
                FieldLayout::new()
                    .with_date_posted(FieldRule::after_label(
                        "#posted-date, div.read-date-sec-li",
                        "Posted:",
                    )?)
                    .with_date_expires(FieldRule::after_label("div.read-date-sec-li", "Deadline:")?)
                    .with_qualification(FieldRule::text(
                        "span.jkey-info a[href*='/jobs-by-education/']",
                    )?)
                    .with_experience(FieldRule::next_to_label("span.jkey-title", "Experience")?)
                    .with_location(FieldRule::next_to_label("span.jkey-title", "Location")?),
            ),
            JobSource::BrighterMonday => Self::new(
                source,
                "https://www.brightermonday.co.ke/jobs?q={keyword}&page={page}",
                "div[data-cy=listing-cards-components], article",
                r"/(listings|job)/[^/?#]+",
            )?
            .with_card_fields(
                FieldLayout::new()
                    .with_date_posted(FieldRule::pattern(RELATIVE_DATE)?)
                    .with_location(FieldRule::text("[class*=location]")?),
            ),
            JobSource::Fuzu => Self::new(
                source,
                "https://www.fuzu.com/kenya/job?filters%5Bterm%5D={keyword}&page={page}",
                "div.job, article.job, li.job",
                r"/kenya/job/[^/?#]+",
            )?
            .with_card_fields(FieldLayout::new().with_date_posted(FieldRule::pattern(RELATIVE_DATE)?)),
            JobSource::CareerPointKenya => Self::new(
                source,
                "https://www.careerpointkenya.co.ke/page/{page}/?s={keyword}",
                "article",
                r"/(20\d{2}/\d{2}/[^/?#]+|job/[^/?#]+)",
            )?
            .with_card_fields(FieldLayout::new().with_date_posted(FieldRule::text("time.entry-date")?)),
            JobSource::MyJobsInKenya => Self::new(
                source,
                "https://www.myjobsinkenya.com/jobs?keyword={keyword}&page={page}",
                "div[class*=job], div[class*=listing], div[class*=card]",
                r"/jobs?/[^?#]*(view|\d+)",
            )?
            .with_card_fields(
                FieldLayout::new()
                    .with_date_posted(FieldRule::after_label("p, span, li, small", "Posted")?)
                    .with_date_expires(FieldRule::after_label("p, span, li, small", "Deadline")?)
                    .with_location(FieldRule::text("[class*=location]")?),
            ),
        };
        Ok(definition)
    }

    /// Layouts for every supported board.
    pub fn all() -> Result<Vec<Self>, LayoutError> {
        JobSource::ALL.into_iter().map(Self::for_source).collect()
    }

    /// Search URL for a keyword and 1-based page number.
    pub fn search_url(&self, keyword: &str, page: u32) -> String {
        let keyword: String = url::form_urlencoded::byte_serialize(keyword.trim().as_bytes()).collect();
        self.search_url_template
            .replace("{keyword}", &keyword)
            .replace("{page}", &page.to_string())
    }

    /// Pull postings out of a result page.
    ///
    /// Each card yields at most one entry, titled with its posting anchor's
    /// text (or `title` attribute when the anchor has no text). A link seen
    /// in an earlier card is skipped.
    pub fn extract_entries(&self, html: &str, page_url: &str) -> Vec<RawEntry> {
        let document = Html::parse_document(html);
        let base = Url::parse(page_url).ok();
        let mut seen = HashSet::new();
        let mut entries = Vec::new();

        for card in document.select(&self.card_selector) {
            let Some((link, title)) = self.posting_link(card, base.as_ref()) else {
                continue;
            };
            if !seen.insert(link.clone()) {
                continue;
            }

            let mut entry = RawEntry::new(title, link);
            self.card_fields.fill(card, &mut entry);
            entries.push(entry);
        }

        entries
    }

    /// Fill `entry` from its posting page. Returns it unchanged when the
    /// board has no detail layout.
    pub fn read_detail(&self, html: &str, mut entry: RawEntry) -> RawEntry {
        if let Some(fields) = &self.detail_fields {
            let document = Html::parse_document(html);
            fields.fill(document.root_element(), &mut entry);
        }
        entry
    }

    fn posting_link(&self, card: ElementRef<'_>, base: Option<&Url>) -> Option<(String, String)> {
        let anchors = std::iter::once(card)
            .filter(|el| el.value().name() == "a")
            .chain(card.select(&ANCHOR));

        for anchor in anchors {
            let Some(href) = anchor.value().attr("href") else {
                continue;
            };
            let link = match base {
                Some(base) => match base.join(href.trim()) {
                    Ok(url) => url.to_string(),
                    Err(_) => continue,
                },
                None => href.trim().to_string(),
            };
            if !self.link_pattern.is_match(&link) {
                continue;
            }

            let mut title = text_of(anchor);
            if title.is_empty() {
                title = anchor.value().attr("title").map(collapse).unwrap_or_default();
            }
            if !title.is_empty() {
                return Some((link, title));
            }
        }

        None
    }
}

/// Whitespace-collapsed text of an element and its descendants.
fn text_of(element: ElementRef<'_>) -> String {
    collapse(&element.text().collect::<Vec<_>>().join(" "))
}

fn collapse(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn value_after(text: &str, label: &str) -> Option<String> {
    let at = text.find(label)?;
    let value = text[at + label.len()..]
        .trim_start_matches(|c: char| c == ':' || c.is_whitespace())
        .trim();
    (!value.is_empty()).then(|| value.to_string())
}
