// Integration tests for manifests against the built-in scenario library

use std::path::Path;

use lit_testing_framework::scenarios::{load_manifest, ScenarioRegistry};
use lit_testing_framework::HarnessError;

fn shipped_manifest() -> std::path::PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("itests.txt")
}

#[test]
fn test_shipped_manifest_resolves() {
    let entries = load_manifest(&shipped_manifest()).unwrap();
    let registry = ScenarioRegistry::builtin();

    let scenarios = registry.resolve(&entries).unwrap();
    assert_eq!(scenarios.len(), entries.len());
    // every built-in scenario is listed exactly once
    assert_eq!(scenarios.len(), registry.len());

    let labels: Vec<String> = scenarios.iter().map(|s| s.label()).collect();
    assert!(labels.contains(&"pushbreak:forward".to_string()));
    assert!(labels.contains(&"reconnect:run_test_unordered".to_string()));
    assert!(labels.contains(&"dlc:t_1300_1".to_string()));
    assert!(labels.contains(&"pushclose:roundtrip".to_string()));
    assert!(labels.contains(&"dlcrefund:reverse".to_string()));
    assert!(labels.contains(&"negotiatecontract:accept".to_string()));
    assert!(labels.contains(&"testreorg".to_string()));
}

#[test]
fn test_manifest_node_counts_match_registry_defaults() {
    let entries = load_manifest(&shipped_manifest()).unwrap();
    let registry = ScenarioRegistry::builtin();

    for entry in &entries {
        let selector = format!("{}:{}", entry.name, entry.function);
        let default = registry.select(&selector).unwrap();
        assert_eq!(
            default.node_count, entry.nodes,
            "node count of {} differs from the registry",
            selector
        );
    }
}

#[test]
fn test_yaml_manifest() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nightly.yaml");
    std::fs::write(
        &path,
        "scenarios:\n  - name: receive\n    nodes: 1\n  - name: pushbreak\n    nodes: 2\n    function: reverse\n",
    )
    .unwrap();

    let entries = load_manifest(&path).unwrap();
    let scenarios = ScenarioRegistry::builtin().resolve(&entries).unwrap();
    let labels: Vec<String> = scenarios.iter().map(|s| s.label()).collect();
    assert_eq!(labels, vec!["receive", "pushbreak:reverse"]);
}

#[test]
fn test_unknown_scenario_fails_before_running() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("itests.txt");
    std::fs::write(&path, "receive 1\nteleport 2\n").unwrap();

    let entries = load_manifest(&path).unwrap();
    match ScenarioRegistry::builtin().resolve(&entries) {
        Err(HarnessError::Config(msg)) => assert!(msg.contains("teleport:run_test")),
        Err(other) => panic!("expected config error, got {:?}", other),
        Ok(_) => panic!("unknown scenario resolved"),
    }
}

#[test]
fn test_malformed_line_names_line_number() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("itests.txt");
    std::fs::write(&path, "# channels\nfund 2\npush two\n").unwrap();

    match load_manifest(&path) {
        Err(HarnessError::Config(msg)) => assert!(msg.contains("line 3"), "{}", msg),
        other => panic!("expected config error, got {:?}", other),
    }
}

#[test]
fn test_missing_manifest_is_config_error() {
    let result = load_manifest(Path::new("/nonexistent/itests.txt"));
    assert!(matches!(result, Err(HarnessError::Config(_))));
}
