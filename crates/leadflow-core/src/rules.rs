//! Assignment rules: which employees serve which service, in rotation order.

use std::collections::HashSet;
use std::fmt;

use chrono::NaiveDate;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuleError {
    #[error("invalid rule JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("service {0:?} configured more than once")]
    DuplicateService(String),

    #[error("service {service:?} lists a blank employee id")]
    BlankHandler { service: String },
}

/// One service and the ordered handlers that take turns receiving its leads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignmentRule {
    pub service: String,
    pub handlers: Vec<String>,
}

impl AssignmentRule {
    /// A rule only takes part in distribution when it names at least one
    /// handler and none of them is blank.
    pub fn is_usable(&self) -> bool {
        !self.handlers.is_empty() && !self.handlers.iter().any(|h| is_blank(h))
    }
}

/// The full set of rules for one day, in configuration order.
///
/// Serialises as a JSON object `{"Web Design": ["E1", "E2"], "SEO": []}`.
/// Key order in the source document is preserved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleSet {
    rules: Vec<AssignmentRule>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and validate a rule document.
    pub fn from_json(json: &str) -> Result<Self, RuleError> {
        let raw: RawRules = serde_json::from_str(json)?;
        Self::validated(raw)
    }

    fn validated(raw: RawRules) -> Result<Self, RuleError> {
        let mut set = Self::new();
        for (service, handlers) in raw.0 {
            if set.get(&service).is_some() {
                return Err(RuleError::DuplicateService(service));
            }
            if handlers.iter().any(|h| is_blank(h)) {
                return Err(RuleError::BlankHandler { service });
            }
            set.rules.push(AssignmentRule { service, handlers });
        }
        Ok(set)
    }

    pub fn to_json(&self) -> String {
        // Serialising strings and string lists cannot fail.
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }

    /// Set the handler rotation for a service, replacing any existing rule.
    pub fn insert<S: Into<String>>(&mut self, service: impl Into<String>, handlers: Vec<S>) {
        let service = service.into();
        let handlers: Vec<String> = handlers.into_iter().map(Into::into).collect();
        match self.rules.iter_mut().find(|r| r.service == service) {
            Some(rule) => rule.handlers = handlers,
            None => self.rules.push(AssignmentRule { service, handlers }),
        }
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with<S: Into<String>>(mut self, service: impl Into<String>, handlers: Vec<S>) -> Self {
        self.insert(service, handlers);
        self
    }

    pub fn get(&self, service: &str) -> Option<&[String]> {
        self.rules
            .iter()
            .find(|r| r.service == service)
            .map(|r| r.handlers.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = &AssignmentRule> {
        self.rules.iter()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Services with a non-empty handler list.
    pub fn usable_categories(&self) -> impl Iterator<Item = &str> {
        self.rules
            .iter()
            .filter(|r| r.is_usable())
            .map(|r| r.service.as_str())
    }

    pub fn has_usable_rules(&self) -> bool {
        self.rules.iter().any(AssignmentRule::is_usable)
    }

    /// `(service, handler)` pairs whose handler is not in `known`.
    pub fn unknown_handlers(&self, known: &HashSet<&str>) -> Vec<(String, String)> {
        self.rules
            .iter()
            .flat_map(|r| {
                r.handlers
                    .iter()
                    .filter(|h| !known.contains(h.as_str()))
                    .map(|h| (r.service.clone(), h.clone()))
            })
            .collect()
    }
}

impl Serialize for RuleSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.rules.len()))?;
        for rule in &self.rules {
            map.serialize_entry(&rule.service, &rule.handlers)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for RuleSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = RawRules::deserialize(deserializer)?;
        RuleSet::validated(raw).map_err(serde::de::Error::custom)
    }
}

fn is_blank(handler: &str) -> bool {
    handler.trim().is_empty()
}

/// Ordered `(key, value)` pairs straight from a JSON object, duplicates kept.
struct RawRules(Vec<(String, Vec<String>)>);

impl<'de> Deserialize<'de> for RawRules {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RawVisitor;

        impl<'de> Visitor<'de> for RawVisitor {
            type Value = RawRules;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("an object mapping service names to employee id lists")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<RawRules, A::Error> {
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((k, v)) = access.next_entry::<String, Vec<String>>()? {
                    entries.push((k, v));
                }
                Ok(RawRules(entries))
            }
        }

        deserializer.deserialize_map(RawVisitor)
    }
}

/// A saved rule set, keyed by the calendar day it applies to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSnapshot {
    pub day: NaiveDate,
    pub rules: RuleSet,
}
