//! Lead, employee, and assignment records shared by every store.

use serde::{Deserialize, Serialize};

/// A unit of work to be distributed: one sales lead.
///
/// Only `id`, `service` and `assigned_to` matter to assignment; the other
/// fields are carried so stores can round-trip the full record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lead {
    pub id: String,
    /// Service (category) label used to look up the handler rotation.
    pub service: String,
    /// Current handler (employee id). `None` or blank means unassigned.
    #[serde(default)]
    pub assigned_to: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    /// ISO 8601 timestamp string.
    #[serde(default)]
    pub created_at: Option<String>,
}

impl Lead {
    pub fn new(id: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            service: service.into(),
            assigned_to: None,
            name: None,
            created_at: None,
        }
    }

    pub fn with_handler(mut self, handler: impl Into<String>) -> Self {
        self.assigned_to = Some(handler.into());
        self
    }

    /// A lead is eligible for distribution when it has no handler.
    ///
    /// Whitespace-only handler ids count as empty.
    pub fn is_unassigned(&self) -> bool {
        self.assigned_to
            .as_deref()
            .is_none_or(|h| h.trim().is_empty())
    }
}

/// An entry in the employee directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Employee {
    pub id: String,
    pub name: String,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

/// A planned or committed lead → handler mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub lead_id: String,
    pub handler: String,
    pub service: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_handler_is_unassigned() {
        assert!(Lead::new("L1", "SEO").is_unassigned());
        assert!(Lead::new("L1", "SEO").with_handler("").is_unassigned());
        assert!(Lead::new("L1", "SEO").with_handler("   ").is_unassigned());
        assert!(!Lead::new("L1", "SEO").with_handler("E1").is_unassigned());
    }

    #[test]
    fn lead_json_with_null_handler() {
        let json = r#"{"id": "L7", "service": "Web Design", "assigned_to": null}"#;
        let lead: Lead = serde_json::from_str(json).unwrap();
        assert_eq!(lead.id, "L7");
        assert!(lead.is_unassigned());
        assert!(lead.name.is_none());
    }

    #[test]
    fn employee_defaults_to_active() {
        let emp: Employee = serde_json::from_str(r#"{"id": "E1", "name": "Asha"}"#).unwrap();
        assert!(emp.active);
    }
}
