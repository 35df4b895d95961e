//! Term and unit discovery: where each site lists what there is to scrape.
//!
//! Parsing is synchronous and happens on a fetched body, so no parsed document
//! is ever held across an await.

use crate::data::records::{TermDescriptor, Unit};
use crate::scraper::errors::ScrapeError;
use crate::scraper::extract::{element_text, resolve_url, value_text};
use crate::scraper::fetcher::{PageKind, PageSource};
use crate::scraper::json::parse_payload;
use crate::utils::render_template;
use html_scraper::{ElementRef, Html, Selector};
use regex::Regex;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::LazyLock;
use tracing::{debug, info, warn};

/// Template values for a term (and optionally a unit): `{term}`, `{unit}`, plus the term's params.
pub fn template_vars<'a>(term: &'a TermDescriptor, unit: Option<&'a Unit>) -> Vec<(&'a str, &'a str)> {
    let mut vars = vec![("term", term.code.as_str())];
    if let Some(unit) = unit {
        vars.push(("unit", unit.code.as_str()));
    }
    vars.extend(term.params.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    vars
}

#[derive(Debug, Clone)]
pub enum TermSource {
    /// Listings are not organised by term; one pass covers everything.
    Unscoped,
    /// A fixed list built from a year range.
    Generated(Vec<TermDescriptor>),
    /// Links whose href carries the term code in group 1. The fallback list
    /// is used when the page is unreachable or lists nothing.
    Links {
        page: &'static str,
        links: Selector,
        code: Regex,
        fallback: Vec<TermDescriptor>,
    },
    /// Options of a dropdown. A missing dropdown means the run cannot proceed.
    Dropdown { page: &'static str, select: Selector },
}

impl TermSource {
    pub async fn discover(
        &self,
        source: &dyn PageSource,
        base: &str,
        site: &str,
    ) -> Result<Vec<TermDescriptor>, ScrapeError> {
        let no_terms = || ScrapeError::NoTerms {
            site: site.to_string(),
        };

        let terms = match self {
            Self::Unscoped => return Ok(vec![TermDescriptor::unscoped()]),
            Self::Generated(terms) => terms.clone(),
            Self::Links {
                page,
                links,
                code,
                fallback,
            } => {
                let url = render_template(page, base, &[]);
                let found = match source.fetch_page(&url, PageKind::Html).await {
                    Some(body) => term_links(&body, links, code),
                    None => Vec::new(),
                };
                if found.is_empty() {
                    warn!(url, fallback = fallback.len(), "No term links found, using known terms");
                    fallback.clone()
                } else {
                    found
                }
            }
            Self::Dropdown { page, select } => {
                let url = render_template(page, base, &[]);
                let Some(body) = source.fetch_page(&url, PageKind::Html).await else {
                    warn!(url, "Failed to fetch term page");
                    return Err(no_terms());
                };
                match term_options(&body, select) {
                    Some(terms) => terms,
                    None => {
                        warn!(url, "Term dropdown not found");
                        return Err(no_terms());
                    }
                }
            }
        };

        if terms.is_empty() {
            return Err(no_terms());
        }
        info!(count = terms.len(), "Found terms");
        Ok(terms)
    }
}

fn term_links(body: &str, links: &Selector, code: &Regex) -> Vec<TermDescriptor> {
    let document = Html::parse_document(body);
    let mut seen = HashSet::new();
    document
        .select(links)
        .filter_map(|link| {
            let href = link.value().attr("href")?;
            let code = code.captures(href)?.get(1)?.as_str().to_string();
            let label = element_text(link);
            seen.insert(code.clone()).then(|| TermDescriptor::new(code, label))
        })
        .collect()
}

/// `None` when the dropdown itself is absent.
fn term_options(body: &str, select: &Selector) -> Option<Vec<TermDescriptor>> {
    let document = Html::parse_document(body);
    let dropdown = document.select(select).next()?;
    Some(
        options(dropdown)
            .filter(|(_, text)| !text.contains("Select"))
            .map(|(value, text)| TermDescriptor::new(value, text))
            .collect(),
    )
}

/// Non-empty `(value, text)` pairs of a `<select>`.
fn options(dropdown: ElementRef<'_>) -> impl Iterator<Item = (String, String)> + '_ {
    static OPTION: LazyLock<Selector> = LazyLock::new(|| Selector::parse("option").unwrap());

    dropdown.select(&OPTION).filter_map(|option| {
        let value = option.value().attr("value")?.trim();
        (!value.is_empty()).then(|| (value.to_string(), element_text(option)))
    })
}

#[derive(Debug, Clone)]
pub enum UnitSource {
    /// The whole term is one listing.
    Single,
    /// Group headers inside containers, each followed by `ul` lists of links
    /// reading `Name (CODE)`.
    GroupedLinks {
        page: &'static str,
        container: Selector,
        header: Selector,
        entry: Regex,
    },
    /// Links whose href matches; group 1 is the unit code. Names shorter than
    /// `min_name_len` are navigation noise.
    Links {
        page: &'static str,
        href: Regex,
        min_name_len: usize,
    },
    /// Dropdown options, then links carrying the code in their href.
    Dropdown {
        page: &'static str,
        select: Selector,
        link_fallback: Option<Regex>,
    },
    /// A JSON array of catalog entries; each entry becomes a unit and travels
    /// with it as payload.
    JsonCatalog {
        page: &'static str,
        id_keys: &'static [&'static str],
        name_keys: &'static [&'static str],
    },
}

impl UnitSource {
    fn page(&self) -> Option<&'static str> {
        match self {
            Self::Single => None,
            Self::GroupedLinks { page, .. }
            | Self::Links { page, .. }
            | Self::Dropdown { page, .. }
            | Self::JsonCatalog { page, .. } => Some(page),
        }
    }

    /// Whether the unit list must be fetched again for every term: its page
    /// uses `{term}` or one of the term's params.
    pub fn depends_on_term(&self, term: &TermDescriptor) -> bool {
        self.page().is_some_and(|page| {
            template_vars(term, None)
                .iter()
                .any(|(name, _)| page.contains(&format!("{{{name}}}")))
        })
    }

    pub async fn discover(
        &self,
        source: &dyn PageSource,
        base: &str,
        term: &TermDescriptor,
        fallback: &[Unit],
    ) -> Vec<Unit> {
        let Some(page) = self.page() else {
            return vec![Unit::default()];
        };
        let url = render_template(page, base, &template_vars(term, None));
        let kind = match self {
            Self::JsonCatalog { .. } => PageKind::Json,
            _ => PageKind::Html,
        };

        let units = match source.fetch_page(&url, kind).await {
            Some(body) => self.parse(&body, &url),
            None => {
                warn!(url, "Failed to fetch unit list");
                Vec::new()
            }
        };

        if units.is_empty() && !fallback.is_empty() {
            warn!(url, fallback = fallback.len(), "No units found, using known units");
            return fallback.to_vec();
        }
        info!(count = units.len(), "Found units");
        units
    }

    fn parse(&self, body: &str, page_url: &str) -> Vec<Unit> {
        match self {
            Self::Single => vec![Unit::default()],
            Self::GroupedLinks {
                container,
                header,
                entry,
                ..
            } => grouped_links(body, container, header, entry),
            Self::Links {
                href, min_name_len, ..
            } => link_units(body, page_url, href, *min_name_len),
            Self::Dropdown {
                select,
                link_fallback,
                ..
            } => dropdown_units(body, select, link_fallback.as_ref()),
            Self::JsonCatalog {
                id_keys, name_keys, ..
            } => catalog_units(body, id_keys, name_keys),
        }
    }
}

fn grouped_links(body: &str, container: &Selector, header: &Selector, entry: &Regex) -> Vec<Unit> {
    static LINK: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a").unwrap());

    let document = Html::parse_document(body);
    let mut units = Vec::new();
    for group in document.select(container) {
        for heading in group.select(header) {
            let school = element_text(heading);
            let lists = heading
                .next_siblings()
                .filter_map(ElementRef::wrap)
                .take_while(|el| el.value().name() == "ul");
            for list in lists {
                for link in list.select(&LINK) {
                    let text = element_text(link);
                    let Some(caps) = entry.captures(&text) else {
                        debug!(text, "Skipping unit link without code");
                        continue;
                    };
                    let mut unit = Unit::new(&caps[2], caps[1].trim());
                    unit.school = (!school.is_empty()).then(|| school.clone());
                    units.push(unit);
                }
            }
        }
    }
    units
}

fn link_units(body: &str, page_url: &str, href_re: &Regex, min_name_len: usize) -> Vec<Unit> {
    static LINK: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").unwrap());

    let document = Html::parse_document(body);
    let mut seen = HashSet::new();
    document
        .select(&LINK)
        .filter_map(|link| {
            let href = link.value().attr("href")?;
            let raw = href_re.captures(href)?.get(1)?.as_str();
            let code = urlencoding::decode(raw).map(|c| c.trim().to_string()).ok()?;
            let name = element_text(link);
            if code.is_empty() || name.chars().count() < min_name_len || !seen.insert(code.clone()) {
                return None;
            }
            Some(Unit {
                url: resolve_url(page_url, href),
                ..Unit::new(code, name)
            })
        })
        .collect()
}

fn dropdown_units(body: &str, select: &Selector, link_fallback: Option<&Regex>) -> Vec<Unit> {
    static LINK: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").unwrap());

    let document = Html::parse_document(body);
    let mut seen = HashSet::new();
    let mut units: Vec<Unit> = document
        .select(select)
        .flat_map(options)
        .filter(|(code, _)| seen.insert(code.clone()))
        .map(|(code, name)| Unit::new(code, name))
        .collect();

    if units.is_empty()
        && let Some(re) = link_fallback
    {
        units = document
            .select(&LINK)
            .filter_map(|link| {
                let code = re.captures(link.value().attr("href")?)?.get(1)?.as_str().to_string();
                seen.insert(code.clone()).then(|| Unit::new(code, element_text(link)))
            })
            .collect();
    }
    units
}

fn catalog_units(body: &str, id_keys: &[&str], name_keys: &[&str]) -> Vec<Unit> {
    let entries = match parse_payload(body) {
        Ok(Value::Array(entries)) => entries,
        Ok(_) => {
            warn!("Catalog payload is not a list");
            return Vec::new();
        }
        Err(e) => {
            warn!(error = %e, "Failed to parse catalog payload");
            return Vec::new();
        }
    };

    entries
        .into_iter()
        .filter_map(|entry| {
            let Value::Object(entry) = entry else { return None };
            let Some(code) = id_keys.iter().find_map(|k| entry.get(*k).and_then(value_text)) else {
                debug!("Catalog entry without id, skipping");
                return None;
            };
            let name_parts: Vec<String> = name_keys
                .iter()
                .filter_map(|k| entry.get(*k).and_then(value_text))
                .collect();
            let name = if name_parts.is_empty() { code.clone() } else { name_parts.join(" ") };
            Some(Unit {
                payload: Some(entry),
                ..Unit::new(code, name)
            })
        })
        .collect()
}
