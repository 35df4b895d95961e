//! Course record extraction.
//!
//! Two strategies share one record shape:
//!
//! - **Tag-anchored**: select anchor elements, find a course-code token near
//!   each, then run an ordered enrollment pattern table and independent field
//!   rules over the anchor's (or its parent's) text.
//! - **API payload**: merge JSON objects field-for-field into records.
//!
//! A record without a course-code token is never produced.

use crate::data::records::{CourseRecord, Field, Unit};
use crate::scraper::errors::ScrapeError;
use crate::scraper::fetcher::PageKind;
use crate::scraper::json::parse_payload;
use crate::scraper::terms::{Calendar, normalize_term_label, season_from_date_range};
use crate::utils::squash_whitespace;
use html_scraper::{ElementRef, Html, Selector};
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::HashSet;
use tracing::debug;
use url::Url;

/// Compile a CSS selector, keeping the parser's message.
pub fn selector(css: &str) -> Result<Selector, ScrapeError> {
    Selector::parse(css).map_err(|e| ScrapeError::InvalidSelector {
        selector: css.to_string(),
        message: e.to_string(),
    })
}

pub fn pattern(re: &str) -> Result<Regex, ScrapeError> {
    Ok(Regex::new(re)?)
}

// --- enrollment pattern table ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrollmentShape {
    /// Two groups: enrolled and capacity.
    Paired,
    /// One group: enrolled. A number directly followed by `/` is never taken.
    Single,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrollmentMatch {
    Paired { enrolled: u32, capacity: u32 },
    Single(u32),
}

impl EnrollmentMatch {
    fn apply(self, record: &mut CourseRecord) {
        match self {
            Self::Paired { enrolled, capacity } => {
                record.enrollment = Some(format!("{enrolled}/{capacity}"));
                record.enrolled = Some(enrolled);
                record.capacity = Some(capacity);
            }
            Self::Single(enrolled) => {
                record.enrollment = Some(enrolled.to_string());
                record.enrolled = Some(enrolled);
            }
        }
    }
}

/// Ordered enrollment patterns; the first pattern that matches anywhere wins.
#[derive(Debug, Clone, Default)]
pub struct EnrollmentTable {
    patterns: Vec<(Regex, EnrollmentShape)>,
}

impl EnrollmentTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn paired(mut self, re: &str) -> Result<Self, ScrapeError> {
        self.patterns.push((pattern(re)?, EnrollmentShape::Paired));
        Ok(self)
    }

    pub fn single(mut self, re: &str) -> Result<Self, ScrapeError> {
        self.patterns.push((pattern(re)?, EnrollmentShape::Single));
        Ok(self)
    }

    pub fn evaluate(&self, text: &str) -> Option<EnrollmentMatch> {
        for (regex, shape) in &self.patterns {
            for caps in regex.captures_iter(text) {
                let Some(first) = caps.get(1) else { continue };
                let Ok(enrolled) = first.as_str().parse::<u32>() else { continue };
                match shape {
                    EnrollmentShape::Paired => {
                        if let Some(capacity) = caps.get(2).and_then(|m| m.as_str().parse().ok()) {
                            return Some(EnrollmentMatch::Paired { enrolled, capacity });
                        }
                    }
                    EnrollmentShape::Single => {
                        if !text[first.end()..].trim_start().starts_with('/') {
                            return Some(EnrollmentMatch::Single(enrolled));
                        }
                    }
                }
            }
        }
        None
    }
}

// --- field, code and title rules ---

#[derive(Debug, Clone)]
pub enum FieldSource {
    /// First capture group over the context text.
    Pattern(Regex),
    /// Text of the first matching element in the context.
    Selector(Selector),
    /// Texts of every matching element, joined with `"; "`.
    SelectorAll(Selector),
    /// First capture group over the text of the first matching element.
    SelectorPattern(Selector, Regex),
}

#[derive(Debug, Clone)]
pub struct FieldRule {
    pub field: Field,
    pub source: FieldSource,
}

impl FieldRule {
    pub fn pattern(field: Field, re: &str) -> Result<Self, ScrapeError> {
        Ok(Self {
            field,
            source: FieldSource::Pattern(pattern(re)?),
        })
    }

    pub fn selector(field: Field, css: &str) -> Result<Self, ScrapeError> {
        Ok(Self {
            field,
            source: FieldSource::Selector(selector(css)?),
        })
    }

    pub fn selector_all(field: Field, css: &str) -> Result<Self, ScrapeError> {
        Ok(Self {
            field,
            source: FieldSource::SelectorAll(selector(css)?),
        })
    }

    pub fn selector_pattern(field: Field, css: &str, re: &str) -> Result<Self, ScrapeError> {
        Ok(Self {
            field,
            source: FieldSource::SelectorPattern(selector(css)?, pattern(re)?),
        })
    }

    fn apply(&self, context: ElementRef<'_>, text: &str, record: &mut CourseRecord) {
        if record.is_set(self.field) {
            return;
        }
        let value = match &self.source {
            FieldSource::Pattern(re) => re
                .captures(text)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().trim().to_string()),
            FieldSource::Selector(sel) => context.select(sel).next().map(element_text),
            FieldSource::SelectorAll(sel) => {
                let parts: Vec<String> = context
                    .select(sel)
                    .map(element_text)
                    .filter(|t| !t.is_empty())
                    .collect();
                (!parts.is_empty()).then(|| parts.join("; "))
            }
            FieldSource::SelectorPattern(sel, re) => context
                .select(sel)
                .map(element_text)
                .find_map(|t| re.captures(&t).and_then(|c| c.get(1)).map(|m| m.as_str().to_string())),
        };
        if let Some(value) = value {
            record.fill(self.field, &value);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeSource {
    Text,
    /// The percent-decoded `href` attribute.
    Href,
}

/// Where the course-code token lives.
///
/// Every capture group except `title` contributes to the code, joined with a
/// space; a pattern without groups uses the whole match. Only the first match
/// is used, so cross-listed codes (`COS 126 / EGR 126`) keep their first code.
#[derive(Debug, Clone)]
pub struct CodeRule {
    /// Candidate elements inside the anchor; the anchor itself when absent.
    pub candidates: Option<Selector>,
    pub source: CodeSource,
    pub pattern: Regex,
}

impl CodeRule {
    pub fn text(candidates: Option<&str>, re: &str) -> Result<Self, ScrapeError> {
        Ok(Self {
            candidates: candidates.map(selector).transpose()?,
            source: CodeSource::Text,
            pattern: pattern(re)?,
        })
    }

    pub fn href(re: &str) -> Result<Self, ScrapeError> {
        Ok(Self {
            candidates: None,
            source: CodeSource::Href,
            pattern: pattern(re)?,
        })
    }

    /// Returns the code and, when the pattern has a `title` group, the title.
    fn find(&self, anchor: ElementRef<'_>) -> Option<(String, Option<String>)> {
        let from_candidate = |el: ElementRef<'_>| {
            let haystack = match self.source {
                CodeSource::Text => element_text(el),
                CodeSource::Href => {
                    let href = el.value().attr("href")?;
                    urlencoding::decode(href).map_or_else(|_| href.to_string(), |h| h.into_owned())
                }
            };
            self.match_code(&haystack)
        };
        match &self.candidates {
            Some(sel) => anchor.select(sel).find_map(from_candidate),
            None => from_candidate(anchor),
        }
    }

    fn match_code(&self, haystack: &str) -> Option<(String, Option<String>)> {
        let caps = self.pattern.captures(haystack)?;
        let parts: Vec<&str> = self
            .pattern
            .capture_names()
            .enumerate()
            .skip(1)
            .filter(|(_, name)| *name != Some("title"))
            .filter_map(|(i, _)| caps.get(i))
            .map(|m| m.as_str().trim())
            .filter(|s| !s.is_empty())
            .collect();
        let code = if self.pattern.captures_len() == 1 {
            squash_whitespace(caps.get(0)?.as_str())
        } else {
            squash_whitespace(&parts.join(" "))
        };
        if code.is_empty() {
            return None;
        }
        let title = caps
            .name("title")
            .map(|m| squash_whitespace(m.as_str()))
            .filter(|t| !t.is_empty());
        Some((code, title))
    }
}

#[derive(Debug, Clone)]
pub struct TitleRule {
    /// Element holding the title; the scope element itself when absent.
    pub selector: Option<Selector>,
    /// Removed from the title text, e.g. screen-reader suffixes.
    pub strip: Option<Regex>,
}

impl TitleRule {
    pub fn new(css: &str, strip: Option<&str>) -> Result<Self, ScrapeError> {
        Ok(Self {
            selector: Some(selector(css)?),
            strip: strip.map(pattern).transpose()?,
        })
    }

    /// Title is the anchor's own text, as on link listings.
    pub fn own_text() -> Self {
        Self {
            selector: None,
            strip: None,
        }
    }

    fn find(&self, scope: ElementRef<'_>) -> Option<String> {
        let el = match &self.selector {
            Some(sel) => scope.select(sel).next()?,
            None => scope,
        };
        let raw = element_text(el);
        let title = match &self.strip {
            Some(re) => squash_whitespace(&re.replace_all(&raw, "")),
            None => raw,
        };
        (!title.is_empty()).then_some(title)
    }
}

/// Explicit term patterns, then an optional date-based season fallback.
#[derive(Debug, Clone, Default)]
pub struct TermRule {
    pub patterns: Vec<Regex>,
    /// Season naming for normalization and the calendar used for date inference.
    pub calendar: Option<Calendar>,
}

impl TermRule {
    fn infer(&self, text: &str, record: &CourseRecord) -> Option<String> {
        let explicit = self.patterns.iter().find_map(|re| {
            let raw = re.captures(text)?.get(1)?.as_str().trim().to_string();
            Some(match self.calendar {
                Some(calendar) => normalize_term_label(&raw, calendar).unwrap_or(raw),
                None => raw,
            })
        });
        explicit.or_else(|| {
            let calendar = self.calendar?;
            let season = season_from_date_range(record.schedule.as_deref()?, calendar)?;
            Some(season.label(calendar).to_string())
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextScope {
    Anchor,
    /// The anchor's parent element, for headings whose details are siblings.
    Parent,
}

/// Tag-anchored extraction rules.
#[derive(Debug, Clone)]
pub struct TagRules {
    pub anchor: Selector,
    /// Anchors whose `href` does not match are ignored.
    pub href_filter: Option<Regex>,
    pub context: ContextScope,
    pub code: CodeRule,
    pub title: Option<TitleRule>,
    pub enrollment: EnrollmentTable,
    pub fields: Vec<FieldRule>,
    pub term: TermRule,
    /// Record the anchor's `href`, resolved against the page URL, as `source_url`.
    pub link: bool,
    /// Tried when these rules produce no records on a page.
    pub fallback: Option<Box<TagRules>>,
}

impl TagRules {
    pub fn new(anchor: &str, code: CodeRule) -> Result<Self, ScrapeError> {
        Ok(Self {
            anchor: selector(anchor)?,
            href_filter: None,
            context: ContextScope::Anchor,
            code,
            title: None,
            enrollment: EnrollmentTable::new(),
            fields: Vec::new(),
            term: TermRule::default(),
            link: false,
            fallback: None,
        })
    }

    /// Extract every record on an already parsed page.
    pub fn extract_document(&self, document: &Html, page_url: &str) -> Vec<CourseRecord> {
        let mut records: Vec<CourseRecord> = document
            .select(&self.anchor)
            .filter_map(|anchor| self.extract_anchor(anchor, page_url))
            .collect();
        if self.link {
            // Listings often link the same course more than once.
            let mut seen = HashSet::new();
            records.retain(|r| r.source_url.as_ref().is_none_or(|url| seen.insert(url.clone())));
        }

        match &self.fallback {
            Some(fallback) if records.is_empty() => {
                debug!(url = page_url, "Primary rules found nothing, trying fallback");
                fallback.extract_document(document, page_url)
            }
            _ => records,
        }
    }

    fn extract_anchor(&self, anchor: ElementRef<'_>, page_url: &str) -> Option<CourseRecord> {
        let href = anchor.value().attr("href");
        if let Some(filter) = &self.href_filter
            && !href.is_some_and(|h| filter.is_match(h))
        {
            return None;
        }

        let (code, code_title) = self.code.find(anchor)?;
        let context = match self.context {
            ContextScope::Anchor => anchor,
            ContextScope::Parent => anchor.parent().and_then(ElementRef::wrap).unwrap_or(anchor),
        };
        let text = context_text(context);

        let mut record = CourseRecord::new(code);
        record.subject = subject_of(&record.course_code);
        record.course_title = code_title.or_else(|| self.title.as_ref()?.find(context));

        if let Some(found) = self.enrollment.evaluate(&text) {
            found.apply(&mut record);
        }
        for rule in &self.fields {
            rule.apply(context, &text, &mut record);
        }
        if record.term_label.is_none() {
            record.term_label = self.term.infer(&text, &record);
        }
        if self.link {
            record.source_url = href.and_then(|h| resolve_url(page_url, h));
        }
        Some(record)
    }
}

/// Rules for enriching a record from its own detail page.
#[derive(Debug, Clone, Default)]
pub struct DetailRules {
    pub title: Option<TitleRule>,
    pub enrollment: EnrollmentTable,
    pub fields: Vec<FieldRule>,
    /// Detail pages visited per unit in test mode.
    pub test_limit: usize,
}

impl DetailRules {
    /// Fill fields the listing did not provide. Existing values are kept.
    pub fn enrich(&self, record: &mut CourseRecord, body: &str) {
        let document = Html::parse_document(body);
        let root = document.root_element();
        let text = context_text(root);

        if record.course_title.is_none() {
            record.course_title = self.title.as_ref().and_then(|t| t.find(root));
        }
        if record.enrollment.is_none()
            && let Some(found) = self.enrollment.evaluate(&text)
        {
            found.apply(record);
        }
        for rule in &self.fields {
            rule.apply(root, &text, record);
        }
    }
}

// --- API payloads ---

/// Record fields that payload keys may not shadow in the flattened output.
const RESERVED_KEYS: &[(&str, Option<Field>)] = &[
    ("course_code", None),
    ("course_title", Some(Field::Title)),
    ("subject", None),
    ("department", None),
    ("school", None),
    ("term", None),
    ("term_label", Some(Field::TermLabel)),
    ("enrollment", None),
    ("enrolled", Some(Field::Enrolled)),
    ("capacity", Some(Field::Capacity)),
    ("seats_open", Some(Field::SeatsOpen)),
    ("waitlist", Some(Field::Waitlist)),
    ("instructor", Some(Field::Instructor)),
    ("units", Some(Field::Units)),
    ("schedule", Some(Field::Schedule)),
    ("class_number", Some(Field::ClassNumber)),
    ("section", Some(Field::Section)),
    ("status", Some(Field::Status)),
    ("distribution_area", Some(Field::DistributionArea)),
    ("source_url", None),
    ("scraped_at", None),
];

#[derive(Debug, Clone, Default)]
pub struct PayloadRules {
    /// Key holding the record list when the payload is an object.
    pub records_key: Option<&'static str>,
    /// Key combinations forming the course code, tried in order.
    pub code_keys: Vec<Vec<&'static str>>,
    /// Payload keys copied into typed fields.
    pub fields: Vec<(&'static str, Field)>,
}

impl PayloadRules {
    pub fn extract(
        &self,
        body: &str,
        url: &str,
        unit: Option<&Unit>,
    ) -> Result<Vec<CourseRecord>, ScrapeError> {
        let payload = parse_payload(body).map_err(|source| ScrapeError::PayloadParse {
            url: url.to_string(),
            source,
        })?;

        let items: Vec<&Map<String, Value>> = match &payload {
            Value::Array(items) => items.iter().filter_map(Value::as_object).collect(),
            Value::Object(obj) => match self.records_key.and_then(|k| obj.get(k)?.as_array()) {
                Some(items) => items.iter().filter_map(Value::as_object).collect(),
                None => vec![obj],
            },
            _ => Vec::new(),
        };

        let base = unit.and_then(|u| u.payload.as_ref());
        Ok(items
            .into_iter()
            .filter_map(|item| {
                let mut merged = base.cloned().unwrap_or_default();
                merged.extend(item.iter().map(|(k, v)| (k.clone(), v.clone())));
                self.record_from(merged)
            })
            .collect())
    }

    /// Build a record from one merged payload object.
    pub fn record_from(&self, mut merged: Map<String, Value>) -> Option<CourseRecord> {
        let code = self.code_keys.iter().find_map(|keys| {
            let parts: Option<Vec<String>> =
                keys.iter().map(|k| merged.get(*k).and_then(value_text)).collect();
            parts.map(|p| p.join(" ")).filter(|c| !c.trim().is_empty())
        });
        let Some(code) = code else {
            debug!(keys = ?merged.keys().collect::<Vec<_>>(), "Payload entry has no course code, dropping");
            return None;
        };

        let mut record = CourseRecord::new(squash_whitespace(&code));
        record.subject = subject_of(&record.course_code);

        for (key, field) in &self.fields {
            if let Some(text) = merged.get(*key).and_then(value_text) {
                record.fill(*field, &text);
            }
        }
        for (key, field) in RESERVED_KEYS {
            let Some(value) = merged.remove(*key) else { continue };
            match field {
                Some(field) => {
                    if let Some(text) = value_text(&value) {
                        record.fill(*field, &text);
                    }
                }
                None if *key != "course_code" => {
                    merged.insert(format!("source_{key}"), value);
                }
                None => {}
            }
        }

        record.extra = merged;
        Some(record)
    }
}

pub(crate) fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

// --- strategy ---

#[derive(Debug, Clone)]
pub enum Extraction {
    Tagged(TagRules),
    Payload(PayloadRules),
}

impl Extraction {
    pub fn page_kind(&self) -> PageKind {
        match self {
            Self::Tagged(_) => PageKind::Html,
            Self::Payload(_) => PageKind::Json,
        }
    }

    pub fn extract(
        &self,
        body: &str,
        url: &str,
        unit: Option<&Unit>,
    ) -> Result<Vec<CourseRecord>, ScrapeError> {
        match self {
            Self::Tagged(rules) => Ok(rules.extract_document(&Html::parse_document(body), url)),
            Self::Payload(rules) => rules.extract(body, url, unit),
        }
    }
}

// --- helpers ---

pub(crate) fn element_text(el: ElementRef<'_>) -> String {
    squash_whitespace(&el.text().collect::<String>())
}

/// Text nodes joined with spaces, so adjacent cells never run together.
fn context_text(el: ElementRef<'_>) -> String {
    squash_whitespace(&el.text().collect::<Vec<_>>().join(" "))
}

/// Resolve a possibly relative link against the page it was found on.
pub(crate) fn resolve_url(page_url: &str, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') || href.starts_with("javascript:") {
        return None;
    }
    let base = Url::parse(page_url).ok()?;
    base.join(href).ok().map(String::from)
}

/// Subject prefix of a course code: everything before the first digit.
fn subject_of(code: &str) -> Option<String> {
    let prefix = code.split(|c: char| c.is_ascii_digit()).next()?.trim();
    (!prefix.is_empty()).then(|| prefix.to_string())
}
