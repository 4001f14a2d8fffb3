//! The closed table of metadata folders the scanner understands.

/// How members of one metadata type are extracted from its folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataParser {
    /// One member per file with `extension`, named by the file stem.
    FileName { extension: &'static str },
    /// One member per subfolder, plus `folder/stem` for each file inside it.
    /// `None` keeps the whole file name, as documents do.
    Folder { extension: Option<&'static str> },
    /// One member per subdirectory (Aura and Lightning web components).
    Bundle,
    /// Custom objects only; standard objects carry no `__` suffix.
    CustomObject,
    /// `Stem.fullName` for each `element` child of every `extension` file.
    /// With `custom_only`, components of standard objects that are not
    /// themselves custom are skipped.
    XmlElement {
        extension: &'static str,
        element: &'static str,
        custom_only: bool,
    },
    /// Label names from `.labels` files.
    CustomLabels,
    /// Active record types as `Object.Name`.
    RecordType,
    /// Business processes as `Object.Name`, percent-encoded.
    BusinessProcess,
}

/// One registry entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetadataType {
    /// Folder under the source root.
    pub folder: &'static str,
    /// Metadata API type name written to `<name>`.
    pub name: &'static str,
    pub parser: MetadataParser,
}

const fn file(folder: &'static str, name: &'static str, extension: &'static str) -> MetadataType {
    MetadataType {
        folder,
        name,
        parser: MetadataParser::FileName { extension },
    }
}

const fn element(
    folder: &'static str,
    name: &'static str,
    extension: &'static str,
    element: &'static str,
    custom_only: bool,
) -> MetadataType {
    MetadataType {
        folder,
        name,
        parser: MetadataParser::XmlElement {
            extension,
            element,
            custom_only,
        },
    }
}

const fn with(folder: &'static str, name: &'static str, parser: MetadataParser) -> MetadataType {
    MetadataType {
        folder,
        name,
        parser,
    }
}

/// Every supported metadata type, keyed by folder. A folder may appear more
/// than once when its files hold several types.
pub const METADATA_TYPES: &[MetadataType] = &[
    file("applications", "CustomApplication", "app"),
    with("aura", "AuraDefinitionBundle", MetadataParser::Bundle),
    file("classes", "ApexClass", "cls"),
    file("components", "ApexComponent", "component"),
    file("customMetadata", "CustomMetadata", "md"),
    file("customPermissions", "CustomPermission", "customPermission"),
    with(
        "dashboards",
        "Dashboard",
        MetadataParser::Folder {
            extension: Some("dashboard"),
        },
    ),
    with(
        "documents",
        "Document",
        MetadataParser::Folder { extension: None },
    ),
    with(
        "email",
        "EmailTemplate",
        MetadataParser::Folder {
            extension: Some("email"),
        },
    ),
    file("flexipages", "FlexiPage", "flexipage"),
    file("flows", "Flow", "flow"),
    file("globalValueSets", "GlobalValueSet", "globalValueSet"),
    file("groups", "Group", "group"),
    with("labels", "CustomLabel", MetadataParser::CustomLabels),
    file("layouts", "Layout", "layout"),
    with("lwc", "LightningComponentBundle", MetadataParser::Bundle),
    file("objectTranslations", "CustomObjectTranslation", "objectTranslation"),
    with("objects", "CustomObject", MetadataParser::CustomObject),
    element("objects", "CustomField", "object", "fields", true),
    element("objects", "ListView", "object", "listViews", true),
    element("objects", "ValidationRule", "object", "validationRules", true),
    element("objects", "WebLink", "object", "webLinks", true),
    element("objects", "CompactLayout", "object", "compactLayouts", true),
    element("objects", "FieldSet", "object", "fieldSets", true),
    with("objects", "RecordType", MetadataParser::RecordType),
    with("objects", "BusinessProcess", MetadataParser::BusinessProcess),
    file("pages", "ApexPage", "page"),
    file("permissionsets", "PermissionSet", "permissionset"),
    file("profiles", "Profile", "profile"),
    file("quickActions", "QuickAction", "quickAction"),
    file("remoteSiteSettings", "RemoteSiteSetting", "remoteSite"),
    with(
        "reports",
        "Report",
        MetadataParser::Folder {
            extension: Some("report"),
        },
    ),
    file("reportTypes", "ReportType", "reportType"),
    file("staticresources", "StaticResource", "resource"),
    file("tabs", "CustomTab", "tab"),
    file("translations", "Translations", "translation"),
    file("triggers", "ApexTrigger", "trigger"),
    file("workflows", "Workflow", "workflow"),
    element("workflows", "WorkflowAlert", "workflow", "alerts", false),
    element("workflows", "WorkflowFieldUpdate", "workflow", "fieldUpdates", false),
    element("workflows", "WorkflowOutboundMessage", "workflow", "outboundMessages", false),
    element("workflows", "WorkflowRule", "workflow", "rules", false),
    element("workflows", "WorkflowTask", "workflow", "tasks", false),
];

/// Registry entries for `folder`, in table order. Empty when the folder is
/// unknown.
///
/// # Examples
///
/// ```
/// use cumulus_package::parsers_for_folder;
///
/// let names: Vec<&str> = parsers_for_folder("classes").map(|t| t.name).collect();
/// assert_eq!(names, ["ApexClass"]);
/// assert_eq!(parsers_for_folder("nope").count(), 0);
/// ```
pub fn parsers_for_folder(folder: &str) -> impl Iterator<Item = &'static MetadataType> + '_ {
    METADATA_TYPES.iter().filter(move |t| t.folder == folder)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn type_names_unique() {
        let mut seen = HashSet::new();
        for t in METADATA_TYPES {
            assert!(seen.insert(t.name), "duplicate type {}", t.name);
        }
    }

    #[test]
    fn objects_folder_yields_every_component_type() {
        let names: Vec<&str> = parsers_for_folder("objects").map(|t| t.name).collect();
        assert_eq!(names.first(), Some(&"CustomObject"));
        assert!(names.contains(&"CustomField"));
        assert!(names.contains(&"RecordType"));
        assert!(names.contains(&"BusinessProcess"));
    }
}
