//! Stage descriptors: the plain-data input to `WizardEngine::set_stages`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageDescriptor {
    /// Unique, non-empty stage id
    pub id: String,

    /// Display label
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    /// Can be navigated to directly (not only by next/prev)
    #[serde(default, alias = "isNavigateable")]
    pub navigable: bool,

    /// Opaque host data attached to the stage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_data: Option<serde_json::Value>,

    /// Id of the successor stage (used by the referral strategy)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_stage: Option<String>,

    /// Initial value of the completion flag
    #[serde(default)]
    pub complete: bool,
}

impl StageDescriptor {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn navigable(mut self, navigable: bool) -> Self {
        self.navigable = navigable;
        self
    }

    pub fn with_next_stage(mut self, id: impl Into<String>) -> Self {
        self.next_stage = Some(id.into());
        self
    }

    pub fn with_content_data(mut self, data: serde_json::Value) -> Self {
        self.content_data = Some(data);
        self
    }

    pub fn complete(mut self, complete: bool) -> Self {
        self.complete = complete;
        self
    }
}

impl From<&str> for StageDescriptor {
    fn from(id: &str) -> Self {
        StageDescriptor::new(id)
    }
}

impl From<String> for StageDescriptor {
    fn from(id: String) -> Self {
        StageDescriptor::new(id)
    }
}

/// A stage entry as written in a wizard definition: a bare id or a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StageEntry {
    Id(String),
    Descriptor(StageDescriptor),
}

impl StageEntry {
    pub fn id(&self) -> &str {
        match self {
            StageEntry::Id(id) => id,
            StageEntry::Descriptor(descriptor) => &descriptor.id,
        }
    }
}

impl From<StageEntry> for StageDescriptor {
    fn from(entry: StageEntry) -> Self {
        match entry {
            StageEntry::Id(id) => StageDescriptor::new(id),
            StageEntry::Descriptor(descriptor) => descriptor,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Doc {
        stages: Vec<StageEntry>,
    }

    #[test]
    fn test_bare_and_table_entries() {
        let doc: Doc = toml::from_str(
            r#"
            stages = [
                "intro",
                { id = "details", label = "Details", isNavigateable = true, next_stage = "done" },
            ]
            "#,
        )
        .unwrap();

        let descriptors: Vec<StageDescriptor> = doc.stages.into_iter().map(Into::into).collect();
        assert_eq!(descriptors[0], StageDescriptor::new("intro"));
        assert_eq!(descriptors[1].label.as_deref(), Some("Details"));
        assert!(descriptors[1].navigable);
        assert_eq!(descriptors[1].next_stage.as_deref(), Some("done"));
        assert!(!descriptors[1].complete);
    }
}
