use crate::config::Config;
use crate::error::{Result, SddError};
use crate::spec::{self, Spec};
use crate::sync::{self, CodeReference};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use std::path::Path;

// ---------------------------------------------------------------------------
// DependencyGraph
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Node {
    pub depends_on: Vec<String>,
    pub depended_by: Vec<String>,
}

/// spec-id → edges, rebuilt from the spec files on every invocation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DependencyGraph {
    pub nodes: BTreeMap<String, Node>,
}

impl DependencyGraph {
    pub fn build(specs: &[Spec]) -> Self {
        let mut nodes: BTreeMap<String, Node> = specs
            .iter()
            .map(|s| {
                (
                    s.id.clone(),
                    Node {
                        depends_on: s.depends_on().to_vec(),
                        depended_by: Vec::new(),
                    },
                )
            })
            .collect();

        let edges: Vec<(String, String)> = nodes
            .iter()
            .flat_map(|(id, n)| n.depends_on.iter().map(move |d| (id.clone(), d.clone())))
            .collect();
        for (from, to) in edges {
            if let Some(target) = nodes.get_mut(&to) {
                if !target.depended_by.contains(&from) {
                    target.depended_by.push(from);
                }
            }
        }
        Self { nodes }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    /// `(spec, dependency)` pairs whose dependency has no spec.
    pub fn unknown_dependencies(&self) -> Vec<(&str, &str)> {
        self.nodes
            .iter()
            .flat_map(|(id, n)| {
                n.depends_on
                    .iter()
                    .filter(|d| !self.nodes.contains_key(d.as_str()))
                    .map(move |d| (id.as_str(), d.as_str()))
            })
            .collect()
    }

    /// Each cycle once, as the path of ids ending back at its first element.
    pub fn find_cycles(&self) -> Vec<Vec<String>> {
        let mut cycles = Vec::new();
        let mut seen_sets: HashSet<BTreeSet<String>> = HashSet::new();
        let mut done: HashSet<&str> = HashSet::new();

        for start in self.nodes.keys() {
            let mut stack: Vec<&str> = Vec::new();
            self.visit(start, &mut stack, &mut done, &mut cycles, &mut seen_sets);
        }
        cycles
    }

    fn visit<'a>(
        &'a self,
        id: &'a str,
        stack: &mut Vec<&'a str>,
        done: &mut HashSet<&'a str>,
        cycles: &mut Vec<Vec<String>>,
        seen: &mut HashSet<BTreeSet<String>>,
    ) {
        if let Some(pos) = stack.iter().position(|s| *s == id) {
            let mut cycle: Vec<String> = stack[pos..].iter().map(|s| s.to_string()).collect();
            let key: BTreeSet<String> = cycle.iter().cloned().collect();
            if seen.insert(key) {
                cycle.push(id.to_string());
                cycles.push(cycle);
            }
            return;
        }
        if done.contains(id) {
            return;
        }
        let Some(node) = self.nodes.get(id) else {
            return;
        };
        stack.push(id);
        for dep in &node.depends_on {
            self.visit(dep, stack, done, cycles, seen);
        }
        stack.pop();
        done.insert(id);
    }

    /// Every spec that transitively depends on `id`, nearest first.
    pub fn impact(&self, id: &str) -> Vec<String> {
        let mut out = Vec::new();
        let mut visited: HashSet<&str> = HashSet::from([id]);
        let mut queue: VecDeque<&str> = VecDeque::from([id]);
        while let Some(cur) = queue.pop_front() {
            let Some(node) = self.nodes.get(cur) else {
                continue;
            };
            for dependent in &node.depended_by {
                if visited.insert(dependent.as_str()) {
                    out.push(dependent.clone());
                    queue.push_back(dependent.as_str());
                }
            }
        }
        out
    }

    pub fn to_mermaid(&self) -> String {
        let mut out = String::from("graph TD\n");
        for (id, node) in &self.nodes {
            if node.depends_on.is_empty() && node.depended_by.is_empty() {
                out.push_str(&format!("    {}[\"{}\"]\n", mermaid_id(id), id));
            }
            for dep in &node.depends_on {
                out.push_str(&format!(
                    "    {}[\"{}\"] --> {}[\"{}\"]\n",
                    mermaid_id(id),
                    id,
                    mermaid_id(dep),
                    dep
                ));
            }
        }
        out
    }
}

fn mermaid_id(id: &str) -> String {
    id.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

// ---------------------------------------------------------------------------
// Impact analysis
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    fn for_count(affected: usize) -> Self {
        match affected {
            0..=1 => RiskLevel::Low,
            2..=4 => RiskLevel::Medium,
            _ => RiskLevel::High,
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RiskLevel::Low => f.write_str("low"),
            RiskLevel::Medium => f.write_str("medium"),
            RiskLevel::High => f.write_str("high"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImpactReport {
    pub spec: String,
    pub depends_on: Vec<String>,
    pub direct_dependents: Vec<String>,
    pub transitive_dependents: Vec<String>,
    pub code_references: Vec<CodeReference>,
    pub affected_files: Vec<String>,
    pub risk: RiskLevel,
}

/// What a change to spec `id` touches: dependent specs and the files that
/// reference its requirements.
pub fn impact_report(root: &Path, cfg: &Config, id: &str) -> Result<ImpactReport> {
    let specs = spec::load_all(root)?;
    let target = specs
        .iter()
        .find(|s| s.id == id)
        .ok_or_else(|| SddError::FeatureNotFound(id.to_string()))?;
    let graph = DependencyGraph::build(&specs);

    let req_ids: HashSet<&str> = target.requirements.iter().map(|r| r.id.as_str()).collect();
    let code_references: Vec<CodeReference> = sync::scan_references(root, &cfg.sync)?
        .into_iter()
        .filter(|r| req_ids.contains(r.req_id.as_str()))
        .collect();
    let affected_files: Vec<String> = code_references
        .iter()
        .map(|r| r.file.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let node = graph.nodes.get(id).cloned().unwrap_or_default();
    let transitive = graph.impact(id);
    let risk = RiskLevel::for_count(transitive.len().max(affected_files.len()));

    Ok(ImpactReport {
        spec: id.to_string(),
        depends_on: node.depends_on,
        direct_dependents: node.depended_by,
        transitive_dependents: transitive,
        code_references,
        affected_files,
        risk,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::parse_spec_lenient;

    fn spec(id: &str, deps: &[&str]) -> Spec {
        let fm = if deps.is_empty() {
            "---\nstatus: draft\n---\n".to_string()
        } else {
            format!("---\nstatus: draft\ndepends_on: [{}]\n---\n", deps.join(", "))
        };
        parse_spec_lenient(&format!("{fm}# {id}\n")).unwrap().with_id(id)
    }

    #[test]
    fn reverse_edges() {
        let g = DependencyGraph::build(&[spec("auth", &[]), spec("billing", &["auth"])]);
        assert_eq!(g.nodes["auth"].depended_by, vec!["billing"]);
        assert!(g.unknown_dependencies().is_empty());
    }

    #[test]
    fn unknown_dependency_reported() {
        let g = DependencyGraph::build(&[spec("billing", &["payments"])]);
        assert_eq!(g.unknown_dependencies(), vec![("billing", "payments")]);
    }

    #[test]
    fn transitive_impact() {
        let g = DependencyGraph::build(&[
            spec("core", &[]),
            spec("auth", &["core"]),
            spec("billing", &["auth"]),
            spec("reports", &["billing", "core"]),
        ]);
        assert_eq!(g.impact("core"), vec!["auth", "reports", "billing"]);
        assert!(g.impact("reports").is_empty());
    }

    #[test]
    fn cycle_detected_once() {
        let g = DependencyGraph::build(&[spec("a", &["b"]), spec("b", &["a"]), spec("c", &[])]);
        let cycles = g.find_cycles();
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0], vec!["a", "b", "a"]);
    }

    #[test]
    fn mermaid_output() {
        let g = DependencyGraph::build(&[spec("auth", &[]), spec("auth/login", &["auth"])]);
        let m = g.to_mermaid();
        assert!(m.starts_with("graph TD\n"));
        assert!(m.contains("auth_login[\"auth/login\"] --> auth[\"auth\"]"));
    }
}
