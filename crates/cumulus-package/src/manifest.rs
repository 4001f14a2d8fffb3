use std::collections::BTreeMap;
use std::fmt::Write as _;

use quick_xml::escape::escape;

/// XML namespace of the Metadata API.
pub const METADATA_NAMESPACE: &str = "http://soap.sforce.com/2006/04/metadata";

const INDENT: &str = "    ";

/// Sort key that orders metadata member names the way Salesforce lists them:
/// section by section, with namespaced names after local ones.
///
/// The name is split on `.` and `-`. Each section is prefixed with `5`, or
/// `8` when it still contains `__` after a trailing `__c` is removed. The
/// sections are joined with `_` and every `_` is then replaced by `Z` so that
/// underscores sort after letters.
///
/// # Examples
///
/// ```
/// use cumulus_package::metadata_sort_key;
///
/// assert_eq!(metadata_sort_key("Account.Amount__c"), "5AccountZ5AmountZZc");
/// assert!(metadata_sort_key("Local__c") < metadata_sort_key("ns__Remote__c"));
/// ```
pub fn metadata_sort_key(name: &str) -> String {
    name.split(['.', '-'])
        .map(|section| {
            let base = section.strip_suffix("__c").unwrap_or(section);
            let prefix = if base.contains("__") { '8' } else { '5' };
            format!("{prefix}{section}")
        })
        .collect::<Vec<_>>()
        .join("_")
        .replace('_', "Z")
}

/// A package.xml manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageXml {
    /// Package name written to `<fullName>`; omitted for unmanaged manifests.
    pub name: Option<String>,
    /// Metadata API version written to `<version>`.
    pub api_version: String,
    /// Members keyed by metadata type name.
    pub types: BTreeMap<String, Vec<String>>,
    /// Apex class written to `<postInstallClass>`.
    pub install_class: Option<String>,
    /// Apex class written to `<uninstallClass>`.
    pub uninstall_class: Option<String>,
}

impl PackageXml {
    /// Render the manifest.
    ///
    /// Types are ordered by name and members by [`metadata_sort_key`], with
    /// duplicates removed.
    ///
    /// # Examples
    ///
    /// ```
    /// use cumulus_package::PackageXml;
    ///
    /// let mut manifest = PackageXml {
    ///     name: Some("Cumulus".into()),
    ///     api_version: "38.0".into(),
    ///     ..PackageXml::default()
    /// };
    /// manifest.types.insert("ApexClass".into(), vec!["B".into(), "A".into()]);
    ///
    /// let xml = manifest.render();
    /// assert!(xml.contains("        <members>A</members>\n        <members>B</members>\n"));
    /// assert!(xml.ends_with("    <version>38.0</version>\n</Package>\n"));
    /// ```
    pub fn render(&self) -> String {
        let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        let _ = writeln!(xml, "<Package xmlns=\"{METADATA_NAMESPACE}\">");

        if let Some(name) = &self.name {
            element(&mut xml, 1, "fullName", name);
        }
        if let Some(class) = &self.install_class {
            element(&mut xml, 1, "postInstallClass", class);
        }

        for (type_name, members) in &self.types {
            let mut sorted: Vec<(String, &String)> = members
                .iter()
                .map(|m| (metadata_sort_key(m), m))
                .collect();
            sorted.sort();
            sorted.dedup_by(|a, b| a.1 == b.1);

            let _ = writeln!(xml, "{INDENT}<types>");
            for (_, member) in sorted {
                element(&mut xml, 2, "members", member);
            }
            element(&mut xml, 2, "name", type_name);
            let _ = writeln!(xml, "{INDENT}</types>");
        }

        if let Some(class) = &self.uninstall_class {
            element(&mut xml, 1, "uninstallClass", class);
        }
        element(&mut xml, 1, "version", &self.api_version);
        xml.push_str("</Package>\n");
        xml
    }
}

fn element(xml: &mut String, depth: usize, tag: &str, text: &str) {
    let _ = writeln!(
        xml,
        "{}<{tag}>{}</{tag}>",
        INDENT.repeat(depth),
        escape(text)
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sort_key_sections() {
        assert_eq!(metadata_sort_key("Foo"), "5Foo");
        assert_eq!(metadata_sort_key("Foo__c"), "5FooZZc");
        assert_eq!(metadata_sort_key("ns__Foo__c"), "8nsZZFooZZc");
        assert_eq!(metadata_sort_key("Layout-Page Layout"), "5LayoutZ5Page Layout");
    }

    #[test]
    fn namespaced_members_sort_last() {
        let mut names = vec!["ns__Beta__c", "Zeta__c", "Alpha__c"];
        names.sort_by_key(|n| metadata_sort_key(n));
        assert_eq!(names, ["Alpha__c", "Zeta__c", "ns__Beta__c"]);
    }

    #[test]
    fn render_full_manifest() {
        let mut types = BTreeMap::new();
        types.insert(
            "CustomObject".to_string(),
            vec!["Donation__c".to_string(), "Batch__c".to_string()],
        );
        types.insert(
            "ApexClass".to_string(),
            vec!["Install".to_string(), "Install".to_string()],
        );
        let manifest = PackageXml {
            name: Some("Cumulus & Co".into()),
            api_version: "38.0".into(),
            types,
            install_class: Some("Install".into()),
            uninstall_class: Some("Uninstall".into()),
        };

        let expected = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>
<Package xmlns=\"http://soap.sforce.com/2006/04/metadata\">
    <fullName>Cumulus &amp; Co</fullName>
    <postInstallClass>Install</postInstallClass>
    <types>
        <members>Install</members>
        <name>ApexClass</name>
    </types>
    <types>
        <members>Batch__c</members>
        <members>Donation__c</members>
        <name>CustomObject</name>
    </types>
    <uninstallClass>Uninstall</uninstallClass>
    <version>38.0</version>
</Package>
";
        assert_eq!(manifest.render(), expected);
    }

    #[test]
    fn unnamed_manifest_has_no_full_name() {
        let manifest = PackageXml {
            api_version: "38.0".into(),
            ..PackageXml::default()
        };
        assert!(!manifest.render().contains("fullName"));
    }
}
