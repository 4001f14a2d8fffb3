use std::path::Path;
use std::process::Command;

/// Every environment variable the configuration reads.
const ENV_VARS: [&str; 19] = [
    "GITHUB_ORG_NAME",
    "GITHUB_REPO_NAME",
    "GITHUB_USERNAME",
    "GITHUB_PASSWORD",
    "MASTER_BRANCH",
    "PREFIX_RELEASE",
    "PREFIX_BETA",
    "LAST_REL_TAG",
    "CURRENT_REL_TAG",
    "PRINT_ONLY",
    "SF_USERNAME",
    "SF_PASSWORD",
    "SF_SERVERURL",
    "SF_API_VERSION",
    "NAMESPACE",
    "VERSION",
    "PUSH_REQUEST",
    "APEX_TEST_NAME_MATCH",
    "APEX_NAMESPACE",
];

fn init_template(dir: &Path) -> String {
    let output = Command::new(env!("CARGO_BIN_EXE_cumulus"))
        .arg("init")
        .current_dir(dir)
        .output()
        .unwrap();
    assert!(output.status.success(), "cumulus init failed: {}", String::from_utf8_lossy(&output.stderr));
    std::fs::read_to_string(dir.join(".cumulus.toml")).unwrap()
}

#[test]
fn init_writes_defaults_only() {
    let dir = tempfile::tempdir().unwrap();
    let content = init_template(dir.path());

    // Everything is commented out, so it parses to the defaults
    let config: cumulus_core::CumulusConfig = toml::from_str(&content).unwrap();
    assert_eq!(config.github.master_branch, "master");
    assert_eq!(config.release.prefixes.release, "release/");
    assert!(config.github.org_name.is_none());
    assert!(config.salesforce.username.is_none());
    assert_eq!(config.apex.test_name_match, "%_TEST");
}

#[test]
fn init_refuses_if_exists() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join(".cumulus.toml"), "# existing").unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_cumulus"))
        .arg("init")
        .current_dir(dir.path())
        .output()
        .unwrap();

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("already exists"));
    let content = std::fs::read_to_string(dir.path().join(".cumulus.toml")).unwrap();
    assert_eq!(content, "# existing");
}

#[test]
fn template_names_every_env_var() {
    let dir = tempfile::tempdir().unwrap();
    let content = init_template(dir.path());

    for var in ENV_VARS {
        assert!(content.contains(&format!("# {var}")), "{var} missing from template");
    }
    for section in ["[github]", "[release]", "[salesforce]", "[push]", "[package]", "[apex]"] {
        assert!(content.contains(section), "{section} missing from template");
    }
}

#[test]
fn uncommented_template_uses_example_values() {
    let dir = tempfile::tempdir().unwrap();
    let content = init_template(dir.path());

    // Turn `# key = value   # ENV` into `key = value   # ENV`.
    let uncommented: String = content
        .lines()
        .map(|line| match line.strip_prefix("# ") {
            Some(rest) if rest.starts_with(|c: char| c.is_ascii_lowercase()) && rest.contains(" = ") => rest,
            _ => line,
        })
        .collect::<Vec<_>>()
        .join("\n");

    let config = cumulus_core::CumulusConfig::from_toml(&uncommented).unwrap();
    assert_eq!(
        config.github.repository().unwrap(),
        ("SalesforceFoundation", "Cumulus")
    );
    assert_eq!(config.release.last_tag.as_deref(), Some("release/1.1"));
    assert_eq!(config.release.current_tag.as_deref(), Some("release/1.2"));
    assert_eq!(config.salesforce.username.as_deref(), Some("packaging@example.com"));
    assert_eq!(config.push.namespace.as_deref(), Some("npsp"));
    assert_eq!(config.package.install_class.as_deref(), Some("STG_InstallScript"));
    assert_eq!(config.apex.test_name_match, "%_TEST");
    assert_eq!(config.apex.namespace.as_deref(), Some("npsp"));
}
