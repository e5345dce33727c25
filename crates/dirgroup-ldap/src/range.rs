//! Ranged retrieval of oversized multi-valued attributes.
//!
//! Some directories return at most N values of a multi-valued attribute and
//! name the returned slice `<attr>;range=<low>-<high>`, with `*` as the upper
//! bound of the last slice. The loader re-reads the entry one slice at a time
//! and merges the slices back into the plain attribute.

use tracing::{debug, warn};

use crate::connection::DirectorySession;
use crate::error::LdapResult;
use crate::filter::FilterBuilder;
use crate::search::{LdapEntry, SearchRequest};

const RANGE_OPTION: &str = ";range=";

/// A parsed `<attr>;range=<low>-<high>` attribute id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeSpec {
    /// Attribute name without the range option.
    pub attribute: String,
    /// First value index.
    pub low: u32,
    /// Last value index, `None` for the terminal slice.
    pub high: Option<u32>,
}

impl RangeSpec {
    /// Parses an attribute id; `None` if it carries no range option.
    #[must_use]
    pub fn parse(id: &str) -> Option<Self> {
        let split = id.to_ascii_lowercase().find(RANGE_OPTION)?;
        let (attribute, rest) = id.split_at(split);
        let (low, high) = rest[RANGE_OPTION.len()..].split_once('-')?;
        let high = match high {
            "*" => None,
            n => Some(n.parse().ok()?),
        };
        Some(Self {
            attribute: attribute.to_string(),
            low: low.parse().ok()?,
            high,
        })
    }

    /// Whether this is the last slice.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.high.is_none()
    }

    fn names(&self, attribute: &str) -> bool {
        self.attribute.eq_ignore_ascii_case(attribute)
    }
}

/// Progress of one ranged retrieval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeState {
    /// Lower bound of the next request.
    pub low: u32,
    /// Upper bound of the next request.
    pub high: u32,
    /// Values accumulated so far.
    pub values: Vec<String>,
    /// Set once the retrieval is complete.
    pub finished: bool,
    /// Number of searches issued.
    pub requests: u32,
}

impl RangeState {
    /// Starts at `0..=step-1`. A zero step is treated as one.
    #[must_use]
    pub fn new(step: u32) -> Self {
        Self {
            low: 0,
            high: step.max(1) - 1,
            values: Vec::new(),
            finished: false,
            requests: 0,
        }
    }

    /// Attribute id requesting the current slice.
    #[must_use]
    pub fn attribute_id(&self, attribute: &str) -> String {
        format!("{attribute}{RANGE_OPTION}{}-{}", self.low, self.high)
    }

    /// Moves to the next slice; finishes if the bounds would overflow.
    pub fn advance(&mut self, step: u32) {
        self.advance_from(self.high, step);
    }

    /// Moves to the slice starting after `last`, the upper bound the server
    /// actually returned. Servers may cap a slice below the requested bound.
    pub fn advance_from(&mut self, last: u32, step: u32) {
        let next = last
            .checked_add(1)
            .and_then(|low| low.checked_add(step.max(1) - 1).map(|high| (low, high)));
        match next {
            Some((low, high)) => {
                self.low = low;
                self.high = high;
            }
            None => self.finished = true,
        }
    }
}

/// Loads every value of one ranged attribute of an entry.
#[derive(Debug, Clone)]
pub struct RangeAttributeLoader<'a> {
    base: &'a str,
    filter: &'a str,
    naming_attribute: &'a str,
    attribute: &'a str,
    step: u32,
}

impl<'a> RangeAttributeLoader<'a> {
    /// Creates a loader.
    ///
    /// `filter` is the search that produced the entry; each slice request
    /// narrows it to the entry's `naming_attribute` value.
    #[must_use]
    pub const fn new(
        base: &'a str,
        filter: &'a str,
        naming_attribute: &'a str,
        attribute: &'a str,
        step: u32,
    ) -> Self {
        Self {
            base,
            filter,
            naming_attribute,
            attribute,
            step,
        }
    }

    /// Whether the entry carries a ranged slice of the attribute.
    #[must_use]
    pub fn needs_paging(&self, entry: &LdapEntry) -> bool {
        entry
            .attributes
            .keys()
            .filter_map(|id| RangeSpec::parse(id))
            .any(|spec| spec.names(self.attribute))
    }

    /// Retrieves all values of the attribute, one slice per search.
    ///
    /// Stops on the terminal slice, when the attribute is missing from a
    /// response, or when the entry is no longer returned. Entries with another
    /// DN are logged and skipped.
    pub async fn fetch(
        &self,
        session: &mut dyn DirectorySession,
        entry: &LdapEntry,
    ) -> LdapResult<RangeState> {
        let mut state = RangeState::new(self.step);

        let Some(naming_value) = entry.get_attr(self.naming_attribute) else {
            debug!(dn = %entry.dn, attribute = self.naming_attribute, "entry has no naming value, not paging");
            state.finished = true;
            return Ok(state);
        };
        let filter = FilterBuilder::qualify(self.filter, self.naming_attribute, naming_value);

        debug!(dn = %entry.dn, attribute = self.attribute, "loading ranged attribute");

        while !state.finished {
            let id = state.attribute_id(self.attribute);
            let request = SearchRequest::new(self.base, filter.as_str()).with_attributes([id.as_str()]);
            state.requests += 1;
            debug!(range = %id, "requesting attribute slice");

            let response = session.search(&request).await?;

            let mut matched = false;
            let mut received = None;
            for candidate in response.entries {
                if candidate.dn != entry.dn {
                    warn!(
                        expected = %entry.dn,
                        returned = %candidate.dn,
                        "range search returned another entry, skipping it"
                    );
                    continue;
                }
                matched = true;
                for (name, values) in candidate.attributes {
                    // `None` upper bound marks the last slice.
                    let returned_high = match RangeSpec::parse(&name) {
                        Some(spec) if spec.names(self.attribute) => spec.high,
                        None if name.eq_ignore_ascii_case(self.attribute) => None,
                        _ => continue,
                    };
                    let count = values.len();
                    state.values.extend(values);
                    received = Some((count, returned_high));
                }
            }

            match received {
                Some((_, None)) => {
                    debug!(values = state.values.len(), "received last slice");
                    state.finished = true;
                }
                Some((0, Some(_))) => {
                    debug!("received an empty slice, stopping");
                    state.finished = true;
                }
                Some((_, Some(high))) if high < state.low => {
                    warn!(low = state.low, high, "slice ends before it starts, stopping");
                    state.finished = true;
                }
                Some((_, Some(high))) => {
                    if high < state.high {
                        debug!(requested = state.high, returned = high, "server capped the slice");
                    }
                    state.advance_from(high, self.step);
                }
                None if matched => {
                    debug!(values = state.values.len(), "attribute absent, no values left");
                    state.finished = true;
                }
                None => {
                    warn!(dn = %entry.dn, "entry disappeared during range retrieval");
                    state.finished = true;
                }
            }
        }

        Ok(state)
    }

    /// Fetches all values and stores them on the entry under the plain
    /// attribute name, replacing any ranged slice.
    ///
    /// Returns the number of searches issued.
    pub async fn load(
        &self,
        session: &mut dyn DirectorySession,
        entry: &mut LdapEntry,
    ) -> LdapResult<u32> {
        let state = self.fetch(session, entry).await?;
        if entry.get_attr(self.naming_attribute).is_none() {
            return Ok(state.requests);
        }

        entry.attributes.retain(|id, _| {
            !(id.eq_ignore_ascii_case(self.attribute)
                || RangeSpec::parse(id).is_some_and(|spec| spec.names(self.attribute)))
        });
        entry
            .attributes
            .insert(self.attribute.to_string(), state.values);

        Ok(state.requests)
    }
}
