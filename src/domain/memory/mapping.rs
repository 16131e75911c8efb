//! Stored parameter mapping

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// One learned `(context, parameter, value)` record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredMapping {
    id: Uuid,
    workflow_name: String,
    parameter: String,
    value: Value,
    context_text: String,
    embedding: Vec<f32>,
    usage_count: u64,
    created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_used_at: Option<DateTime<Utc>>,
}

impl StoredMapping {
    pub fn new(
        workflow_name: impl Into<String>,
        parameter: impl Into<String>,
        value: Value,
        context_text: impl Into<String>,
        embedding: Vec<f32>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            workflow_name: workflow_name.into(),
            parameter: parameter.into(),
            value,
            context_text: context_text.into(),
            embedding,
            usage_count: 0,
            created_at: Utc::now(),
            last_used_at: None,
        }
    }

    pub fn id(&self) -> &Uuid {
        &self.id
    }

    pub fn workflow_name(&self) -> &str {
        &self.workflow_name
    }

    pub fn parameter(&self) -> &str {
        &self.parameter
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn context_text(&self) -> &str {
        &self.context_text
    }

    pub fn embedding(&self) -> &[f32] {
        &self.embedding
    }

    pub fn usage_count(&self) -> u64 {
        self.usage_count
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_used_at(&self) -> Option<DateTime<Utc>> {
        self.last_used_at
    }

    /// Same workflow, parameter and context text
    pub fn same_key(&self, other: &StoredMapping) -> bool {
        self.workflow_name == other.workflow_name
            && self.parameter == other.parameter
            && self.context_text == other.context_text
    }

    /// Take a newer answer for the same key; identity and usage are kept
    pub fn absorb(&mut self, newer: StoredMapping) {
        self.value = newer.value;
        self.embedding = newer.embedding;
    }

    /// Count one more reuse
    pub fn record_usage(&mut self) -> u64 {
        self.usage_count += 1;
        self.last_used_at = Some(Utc::now());
        self.usage_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_mapping_creation() {
        let mapping = StoredMapping::new(
            "picnic_table",
            "leg_angle",
            json!(0.0),
            "table with vertical legs",
            vec![0.1, 0.2],
        );

        assert_eq!(mapping.workflow_name(), "picnic_table");
        assert_eq!(mapping.parameter(), "leg_angle");
        assert_eq!(mapping.usage_count(), 0);
        assert!(mapping.last_used_at().is_none());
    }

    #[test]
    fn test_absorb_keeps_usage() {
        let mut first = StoredMapping::new("t", "p", json!(1), "ctx", vec![1.0]);
        first.record_usage();
        first.record_usage();
        let id = *first.id();

        let second = StoredMapping::new("t", "p", json!(2), "ctx", vec![0.5]);
        assert!(first.same_key(&second));
        first.absorb(second);

        assert_eq!(first.value(), &json!(2));
        assert_eq!(first.usage_count(), 2);
        assert_eq!(first.id(), &id);
    }

    #[test]
    fn test_serde_roundtrip_preserves_usage() {
        let mut mapping = StoredMapping::new("t", "p", json!("x"), "ctx", vec![1.0]);
        mapping.record_usage();

        let restored: StoredMapping =
            serde_json::from_str(&serde_json::to_string(&mapping).unwrap()).unwrap();
        assert_eq!(restored.usage_count(), 1);
        assert_eq!(restored, mapping);
    }
}
