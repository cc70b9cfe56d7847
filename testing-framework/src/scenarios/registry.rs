//! Scenario registry
//!
//! Maps `(name, function)` pairs to scenario functions so that manifests and
//! the command line can select scenarios by name. Every lookup happens before
//! the first environment is created, so a typo fails the run without
//! starting a single node.

use std::collections::BTreeMap;

use super::manifest::{ManifestEntry, DEFAULT_FUNCTION};
use super::runner::{Scenario, ScenarioFn};
use crate::environment::TestEnvironment;
use crate::error::{HarnessError, Result};

struct Registered<E> {
    nodes: usize,
    run: ScenarioFn<E>,
}

/// Named scenario functions for environments of type `E`
pub struct ScenarioRegistry<E> {
    entries: BTreeMap<(String, String), Registered<E>>,
}

impl<E> Default for ScenarioRegistry<E> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }
}

impl<E> ScenarioRegistry<E> {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `name:function`, run with `nodes` payment nodes unless a
    /// manifest says otherwise
    pub fn register(
        &mut self,
        name: &str,
        function: &str,
        nodes: usize,
        run: ScenarioFn<E>,
    ) -> &mut Self {
        self.entries
            .insert((name.to_string(), function.to_string()), Registered { nodes, run });
        self
    }

    /// Whether `name:function` is registered
    pub fn contains(&self, name: &str, function: &str) -> bool {
        self.entries
            .contains_key(&(name.to_string(), function.to_string()))
    }

    /// Number of registered functions
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is registered
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Scenario for `name:function` with an explicit node count
    pub fn get(&self, name: &str, function: &str, nodes: usize) -> Result<Scenario<E>> {
        let registered = self
            .entries
            .get(&(name.to_string(), function.to_string()))
            .ok_or_else(|| {
                HarnessError::Config(format!("unknown scenario '{}:{}'", name, function))
            })?;
        Ok(Scenario {
            name: name.to_string(),
            function: function.to_string(),
            node_count: nodes,
            run: registered.run,
        })
    }

    /// Resolve every manifest entry, failing on the first unknown one
    pub fn resolve(&self, entries: &[ManifestEntry]) -> Result<Vec<Scenario<E>>> {
        entries
            .iter()
            .map(|entry| self.get(&entry.name, &entry.function, entry.nodes))
            .collect()
    }

    /// Resolve a `NAME[:FUNC]` selector with the registered node count
    pub fn select(&self, selector: &str) -> Result<Scenario<E>> {
        let (name, function) = selector
            .split_once(':')
            .unwrap_or((selector, DEFAULT_FUNCTION));
        let nodes = self
            .entries
            .get(&(name.to_string(), function.to_string()))
            .map(|registered| registered.nodes)
            .ok_or_else(|| {
                HarnessError::Config(format!("unknown scenario '{}:{}'", name, function))
            })?;
        self.get(name, function, nodes)
    }

    /// Every registered scenario with its default node count, sorted by name
    pub fn all(&self) -> Vec<Scenario<E>> {
        self.entries
            .iter()
            .map(|((name, function), registered)| Scenario {
                name: name.clone(),
                function: function.clone(),
                node_count: registered.nodes,
                run: registered.run,
            })
            .collect()
    }
}

impl ScenarioRegistry<TestEnvironment> {
    /// Registry holding the built-in scenario library
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        super::library::register_all(&mut registry);
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::BoxFuture;

    struct Dummy;

    fn ok(_: &mut Dummy) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(async { Ok(()) })
    }

    fn registry() -> ScenarioRegistry<Dummy> {
        let mut registry = ScenarioRegistry::new();
        registry
            .register("receive", "run_test", 1, ok)
            .register("pushbreak", "forward", 2, ok)
            .register("pushbreak", "reverse", 2, ok);
        registry
    }

    #[test]
    fn test_resolve_uses_manifest_node_count() {
        let entries = vec![ManifestEntry {
            name: "receive".to_string(),
            nodes: 3,
            function: "run_test".to_string(),
        }];
        let scenarios = registry().resolve(&entries).unwrap();
        assert_eq!(scenarios[0].node_count, 3);
        assert_eq!(scenarios[0].label(), "receive");
    }

    #[test]
    fn test_unknown_pair_is_config_error() {
        let entries = vec![ManifestEntry {
            name: "pushbreak".to_string(),
            nodes: 2,
            function: "sideways".to_string(),
        }];
        match registry().resolve(&entries) {
            Err(HarnessError::Config(msg)) => assert!(msg.contains("pushbreak:sideways")),
            other => panic!("expected config error, got {:?}", other.map(|s| s.len())),
        }
    }

    #[test]
    fn test_select() {
        let registry = registry();
        let scenario = registry.select("pushbreak:reverse").unwrap();
        assert_eq!(scenario.node_count, 2);
        assert_eq!(scenario.label(), "pushbreak:reverse");
        assert_eq!(registry.select("receive").unwrap().function, "run_test");
        assert!(registry.select("pushbreak").is_err());
        assert!(registry.contains("pushbreak", "forward"));
        assert_eq!(registry.all().len(), 3);
    }

    #[test]
    fn test_builtin_library() {
        let registry = ScenarioRegistry::builtin();
        for (name, function) in [
            ("testlib", "run_test"),
            ("receive", "run_test"),
            ("pushclose_reverse", "run_test"),
            ("pushclose", "roundtrip"),
            ("pushbreak", "reverse"),
            ("peercall", "fail"),
            ("reconnect", "run_test_unordered"),
            ("checkoraclefraud", "run_test"),
            ("dlc", "t_1300_1"),
            ("dlcrefund", "reverse"),
            ("negotiatecontract", "decline"),
            ("testreorg", "run_test"),
        ] {
            assert!(registry.contains(name, function), "{}:{}", name, function);
        }
    }
}
