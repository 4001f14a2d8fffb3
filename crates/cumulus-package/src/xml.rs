use cumulus_core::CumulusError;
use serde::Deserialize;

/// The parts of an `.object`, `.workflow` or `.labels` file the scanner
/// reads. Any other element is ignored.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct MetadataDocument {
    #[serde(default)]
    fields: Vec<Component>,
    #[serde(default)]
    list_views: Vec<Component>,
    #[serde(default)]
    validation_rules: Vec<Component>,
    #[serde(default)]
    web_links: Vec<Component>,
    #[serde(default)]
    compact_layouts: Vec<Component>,
    #[serde(default)]
    field_sets: Vec<Component>,
    #[serde(default)]
    pub(crate) record_types: Vec<Component>,
    #[serde(default)]
    pub(crate) business_processes: Vec<Component>,
    #[serde(default)]
    pub(crate) labels: Vec<Component>,
    #[serde(default)]
    alerts: Vec<Component>,
    #[serde(default)]
    field_updates: Vec<Component>,
    #[serde(default)]
    outbound_messages: Vec<Component>,
    #[serde(default)]
    rules: Vec<Component>,
    #[serde(default)]
    tasks: Vec<Component>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Component {
    pub(crate) full_name: Option<String>,
    pub(crate) active: Option<bool>,
}

impl MetadataDocument {
    pub(crate) fn parse(text: &str, source: &str) -> Result<Self, CumulusError> {
        quick_xml::de::from_str(text)
            .map_err(|e| CumulusError::Parse(format!("invalid metadata XML in {source}: {e}")))
    }

    /// Child components named `element`.
    pub(crate) fn components(&self, element: &str) -> &[Component] {
        match element {
            "fields" => &self.fields,
            "listViews" => &self.list_views,
            "validationRules" => &self.validation_rules,
            "webLinks" => &self.web_links,
            "compactLayouts" => &self.compact_layouts,
            "fieldSets" => &self.field_sets,
            "recordTypes" => &self.record_types,
            "businessProcesses" => &self.business_processes,
            "labels" => &self.labels,
            "alerts" => &self.alerts,
            "fieldUpdates" => &self.field_updates,
            "outboundMessages" => &self.outbound_messages,
            "rules" => &self.rules,
            "tasks" => &self.tasks,
            _ => &[],
        }
    }
}
