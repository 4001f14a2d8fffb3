use std::fs;
use std::path::Path;

use cumulus_core::{CumulusError, PackageConfig};
use cumulus_package::{generate_package_xml, scan_metadata};
use tempfile::TempDir;

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

const DONATION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<CustomObject xmlns="http://soap.sforce.com/2006/04/metadata">
    <businessProcesses>
        <fullName>Major Gift</fullName>
        <isActive>true</isActive>
    </businessProcesses>
    <fields>
        <fullName>Amount__c</fullName>
        <type>Currency</type>
    </fields>
    <label>Donation</label>
    <recordTypes>
        <fullName>Standard</fullName>
        <active>true</active>
    </recordTypes>
    <recordTypes>
        <fullName>Retired</fullName>
        <active>false</active>
    </recordTypes>
</CustomObject>
"#;

const ACCOUNT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<CustomObject xmlns="http://soap.sforce.com/2006/04/metadata">
    <fields>
        <fullName>Industry</fullName>
    </fields>
    <fields>
        <fullName>Household__c</fullName>
    </fields>
    <listViews>
        <fullName>AllAccounts</fullName>
    </listViews>
</CustomObject>
"#;

const LABELS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<CustomLabels xmlns="http://soap.sforce.com/2006/04/metadata">
    <labels>
        <fullName>greeting</fullName>
        <value>Hello</value>
    </labels>
    <labels>
        <fullName>farewell</fullName>
        <value>Bye</value>
    </labels>
</CustomLabels>
"#;

fn source_tree() -> TempDir {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write(root, "classes/Rollup.cls", "public class Rollup {}");
    write(root, "classes/Rollup.cls-meta.xml", "<ApexClass/>");
    write(root, "classes/ns__Helper.cls", "public class ns__Helper {}");
    write(root, "objects/Donation__c.object", DONATION);
    write(root, "objects/Account.object", ACCOUNT);
    write(root, "labels/CustomLabels.labels", LABELS);
    write(root, "reports/Gifts/Top_Donors.report", "<Report/>");
    write(root, "reports/Gifts-meta.xml", "<ReportFolder/>");
    write(root, "documents/Logos/logo.png", "png");
    write(root, "lwc/giftEntry/giftEntry.js", "export default {}");
    write(root, ".hidden/ignored.txt", "x");
    write(root, "package.xml", "<Package/>");
    dir
}

#[test]
fn scan_collects_members_by_type() {
    let dir = source_tree();
    let types = scan_metadata(dir.path()).unwrap();

    assert_eq!(types["ApexClass"], ["Rollup", "ns__Helper"]);
    assert_eq!(types["CustomObject"], ["Donation__c"]);
    assert_eq!(
        types["CustomField"],
        ["Account.Household__c", "Donation__c.Amount__c"]
    );
    assert!(!types.contains_key("ListView"));
    assert_eq!(types["RecordType"], ["Donation__c.Standard"]);
    assert_eq!(types["BusinessProcess"], ["Donation__c.Major%20Gift"]);
    assert_eq!(types["CustomLabel"], ["greeting", "farewell"]);
    assert_eq!(types["Report"], ["Gifts", "Gifts/Top_Donors"]);
    assert_eq!(types["Document"], ["Logos", "Logos/logo.png"]);
    assert_eq!(types["LightningComponentBundle"], ["giftEntry"]);
}

#[test]
fn unknown_folder_is_rejected() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "mystery/thing.txt", "?");

    let err = scan_metadata(dir.path()).unwrap_err();
    match err {
        CumulusError::Parse(msg) => assert!(msg.contains("mystery"), "{msg}"),
        other => panic!("expected parse error, got {other:?}"),
    }
}

#[test]
fn missing_root_is_file_not_found() {
    let dir = TempDir::new().unwrap();
    let err = scan_metadata(&dir.path().join("src")).unwrap_err();
    assert!(matches!(err, CumulusError::FileNotFound(_)));
}

#[test]
fn generate_renders_sorted_manifest() {
    let dir = source_tree();
    let config = PackageConfig {
        name: Some("Cumulus".into()),
        install_class: Some("STG_InstallScript".into()),
        ..PackageConfig::default()
    };

    let xml = generate_package_xml(dir.path(), &config).unwrap();

    assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<Package"));
    assert!(xml.contains("    <fullName>Cumulus</fullName>\n"));
    assert!(xml.contains("    <postInstallClass>STG_InstallScript</postInstallClass>\n"));
    assert!(xml.contains(
        "    <types>\n        <members>Rollup</members>\n        <members>ns__Helper</members>\n        <name>ApexClass</name>\n    </types>\n"
    ));
    let apex = xml.find("<name>ApexClass</name>").unwrap();
    let object = xml.find("<name>CustomObject</name>").unwrap();
    assert!(apex < object);
    assert!(xml.ends_with("    <version>38.0</version>\n</Package>\n"));
}
