//! Course search filters and their canonical query representation.

use tracing::debug;

use crate::cache::{LIST_SEPARATOR, QueryKey, normalize_list};

/// Cache namespace of the course list.
pub const COURSES_NAMESPACE: &str = "courses";

/// Ordering used when none is chosen.
pub const DEFAULT_ORDERING: &str = "-popularity_score";

/// First page number.
pub const FIRST_PAGE: u32 = 1;

/// Course list filters plus pagination.
///
/// Fields are only changed through [`FilterChange`], which keeps lists
/// normalised and resets `page` whenever anything else changes. That is what
/// makes the query-string round trip lossless.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterState {
    search: String,
    level: Vec<String>,
    field_of_study: Vec<String>,
    countries: Vec<String>,
    min_fee: Option<u64>,
    max_fee: Option<u64>,
    is_online: Option<bool>,
    is_part_time: Option<bool>,
    currency: Option<String>,
    ordering: String,
    page: u32,
}

/// One edit to a [`FilterState`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterChange {
    Search(String),
    Level(Vec<String>),
    FieldOfStudy(Vec<String>),
    Countries(Vec<String>),
    MinFee(Option<u64>),
    MaxFee(Option<u64>),
    IsOnline(Option<bool>),
    IsPartTime(Option<bool>),
    Currency(Option<String>),
    Ordering(String),
    Page(u32),
}

impl Default for FilterState {
    fn default() -> Self {
        Self {
            search: String::new(),
            level: Vec::new(),
            field_of_study: Vec::new(),
            countries: Vec::new(),
            min_fee: None,
            max_fee: None,
            is_online: None,
            is_part_time: None,
            currency: None,
            ordering: DEFAULT_ORDERING.to_string(),
            page: FIRST_PAGE,
        }
    }
}

impl FilterState {
    /// Apply a change, returning the updated state.
    pub fn with(mut self, change: FilterChange) -> Self {
        self.apply(change);
        self
    }

    /// Apply a change in place. Returns whether anything changed.
    ///
    /// Any effective change other than `Page` puts the state back on the
    /// first page.
    pub fn apply(&mut self, change: FilterChange) -> bool {
        let before = self.clone();

        match change {
            FilterChange::Search(search) => self.search = search.trim().to_string(),
            FilterChange::Level(level) => self.level = normalize_list(level),
            FilterChange::FieldOfStudy(fields) => self.field_of_study = normalize_list(fields),
            FilterChange::Countries(countries) => self.countries = normalize_list(countries),
            FilterChange::MinFee(fee) => self.min_fee = fee,
            FilterChange::MaxFee(fee) => self.max_fee = fee,
            FilterChange::IsOnline(flag) => self.is_online = flag,
            FilterChange::IsPartTime(flag) => self.is_part_time = flag,
            FilterChange::Currency(currency) => {
                self.currency = currency
                    .map(|c| c.trim().to_string())
                    .filter(|c| !c.is_empty());
            }
            FilterChange::Ordering(ordering) => {
                let ordering = ordering.trim();
                self.ordering = if ordering.is_empty() {
                    DEFAULT_ORDERING.to_string()
                } else {
                    ordering.to_string()
                };
            }
            FilterChange::Page(page) => {
                self.page = page.max(FIRST_PAGE);
                return self.page != before.page;
            }
        }

        if *self == before {
            return false;
        }
        self.page = FIRST_PAGE;
        true
    }

    pub fn search(&self) -> &str {
        &self.search
    }

    pub fn level(&self) -> &[String] {
        &self.level
    }

    pub fn field_of_study(&self) -> &[String] {
        &self.field_of_study
    }

    pub fn countries(&self) -> &[String] {
        &self.countries
    }

    pub fn min_fee(&self) -> Option<u64> {
        self.min_fee
    }

    pub fn max_fee(&self) -> Option<u64> {
        self.max_fee
    }

    pub fn is_online(&self) -> Option<bool> {
        self.is_online
    }

    pub fn is_part_time(&self) -> Option<bool> {
        self.is_part_time
    }

    pub fn currency(&self) -> Option<&str> {
        self.currency.as_deref()
    }

    pub fn ordering(&self) -> &str {
        &self.ordering
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    /// Check if every field is at its default.
    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }

    /// Canonical query pairs.
    ///
    /// Defaults are omitted (blank search, empty lists, unset options, the
    /// default ordering, page 1), so a cleared state projects to nothing.
    pub fn to_query_pairs(&self) -> Vec<(&'static str, String)> {
        let sep = LIST_SEPARATOR.to_string();
        let mut pairs = Vec::new();

        if !self.search.is_empty() {
            pairs.push(("search", self.search.clone()));
        }
        if !self.level.is_empty() {
            pairs.push(("level", self.level.join(&sep)));
        }
        if !self.field_of_study.is_empty() {
            pairs.push(("field_of_study", self.field_of_study.join(&sep)));
        }
        if !self.countries.is_empty() {
            pairs.push(("countries", self.countries.join(&sep)));
        }
        if let Some(fee) = self.min_fee {
            pairs.push(("min_fee", fee.to_string()));
        }
        if let Some(fee) = self.max_fee {
            pairs.push(("max_fee", fee.to_string()));
        }
        if let Some(flag) = self.is_online {
            pairs.push(("is_online", flag.to_string()));
        }
        if let Some(flag) = self.is_part_time {
            pairs.push(("is_part_time", flag.to_string()));
        }
        if let Some(currency) = &self.currency {
            pairs.push(("currency", currency.clone()));
        }
        if self.ordering != DEFAULT_ORDERING {
            pairs.push(("ordering", self.ordering.clone()));
        }
        if self.page != FIRST_PAGE {
            pairs.push(("page", self.page.to_string()));
        }

        pairs
    }

    /// Canonical query string (without the leading `?`).
    pub fn to_query_string(&self) -> String {
        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        for (name, value) in self.to_query_pairs() {
            serializer.append_pair(name, &value);
        }
        serializer.finish()
    }

    /// Restore a state from a query string (with or without the leading `?`).
    ///
    /// Unknown parameters and unparsable values are ignored. `q` is accepted
    /// as an alias for `search`; an explicit `search` wins.
    pub fn from_query_str(query: &str) -> Self {
        let query = query.strip_prefix('?').unwrap_or(query);
        let mut state = Self::default();
        let mut alias_search = None;
        let mut page = FIRST_PAGE;

        for (name, value) in url::form_urlencoded::parse(query.as_bytes()) {
            let change = match name.as_ref() {
                "search" => FilterChange::Search(value.into_owned()),
                "q" => {
                    alias_search = Some(value.into_owned());
                    continue;
                }
                "level" => FilterChange::Level(split_list(&value)),
                "field_of_study" => FilterChange::FieldOfStudy(split_list(&value)),
                "countries" => FilterChange::Countries(split_list(&value)),
                "min_fee" => FilterChange::MinFee(parse_or_skip(&name, &value)),
                "max_fee" => FilterChange::MaxFee(parse_or_skip(&name, &value)),
                "is_online" => FilterChange::IsOnline(parse_bool(&value)),
                "is_part_time" => FilterChange::IsPartTime(parse_bool(&value)),
                "currency" => FilterChange::Currency(Some(value.into_owned())),
                "ordering" => FilterChange::Ordering(value.into_owned()),
                "page" => {
                    page = parse_or_skip(&name, &value).unwrap_or(FIRST_PAGE);
                    continue;
                }
                other => {
                    debug!(param = %other, "Ignoring unknown filter parameter");
                    continue;
                }
            };
            state.apply(change);
        }

        if state.search.is_empty()
            && let Some(search) = alias_search
        {
            state.apply(FilterChange::Search(search));
        }

        // Applied last: every other change resets the page.
        state.apply(FilterChange::Page(page));
        state
    }

    /// Cache key of the course list for this state.
    pub fn query_key(&self) -> QueryKey {
        self.to_query_pairs()
            .into_iter()
            .fold(QueryKey::new(COURSES_NAMESPACE), |key, (name, value)| {
                key.param(name, value)
            })
    }
}

fn split_list(value: &str) -> Vec<String> {
    value.split(LIST_SEPARATOR).map(str::to_string).collect()
}

fn parse_or_skip<T: std::str::FromStr>(name: &str, value: &str) -> Option<T> {
    let parsed = value.trim().parse().ok();
    if parsed.is_none() && !value.trim().is_empty() {
        debug!(param = %name, %value, "Ignoring unparsable filter value");
    }
    parsed
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}
