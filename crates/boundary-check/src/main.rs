use std::collections::{HashMap, HashSet, VecDeque};
use std::hash::Hash;

use anyhow::{Context, Result};
use cargo_metadata::MetadataCommand;

/// A package that must stay free of the listed crates, directly or
/// transitively.
struct Boundary {
    package: &'static str,
    forbidden: &'static [&'static str],
}

const RUNTIME_CRATES: &[&str] = &[
    "axum",
    "hyper",
    "prometheus",
    "reqwest",
    "sqlx",
    "tokio",
    "tracing",
    "apptshare-auth",
    "apptshare-gateway",
];

const BOUNDARIES: &[Boundary] = &[
    Boundary {
        package: "apptshare-contracts",
        forbidden: RUNTIME_CRATES,
    },
    Boundary {
        package: "apptshare-policy",
        forbidden: RUNTIME_CRATES,
    },
    Boundary {
        package: "apptshare-auth",
        forbidden: &["apptshare-policy", "apptshare-gateway"],
    },
];

fn main() -> Result<()> {
    let metadata = MetadataCommand::new()
        .exec()
        .context("failed to run `cargo metadata`")?;

    let resolve = metadata
        .resolve
        .as_ref()
        .context("`cargo metadata` did not include a resolved dependency graph")?;

    let id_to_name: HashMap<_, _> = metadata
        .packages
        .iter()
        .map(|p| (p.id.clone(), p.name.as_str()))
        .collect();

    let adjacency: HashMap<_, _> = resolve
        .nodes
        .iter()
        .map(|node| {
            let deps: Vec<_> = node.deps.iter().map(|dep| dep.pkg.clone()).collect();
            (node.id.clone(), deps)
        })
        .collect();

    let mut failed = false;

    for boundary in BOUNDARIES {
        let package = metadata
            .packages
            .iter()
            .find(|p| p.name == boundary.package)
            .with_context(|| format!("package `{}` not found in workspace", boundary.package))?;

        let violations = reachable_forbidden(&package.id, &adjacency, &id_to_name, boundary.forbidden);

        if violations.is_empty() {
            println!(
                "OK: `{}` has no dependency edge to {}",
                boundary.package,
                boundary.forbidden.join(", ")
            );
        } else {
            eprintln!(
                "FAIL: `{}` depends on forbidden crate(s): {}",
                boundary.package,
                violations.join(", ")
            );
            failed = true;
        }
    }

    if failed {
        std::process::exit(1);
    }

    Ok(())
}

/// Breadth-first walk from `root`; returns the sorted names of forbidden
/// packages it reaches.
fn reachable_forbidden<K>(
    root: &K,
    adjacency: &HashMap<K, Vec<K>>,
    id_to_name: &HashMap<K, &str>,
    forbidden: &[&str],
) -> Vec<String>
where
    K: Clone + Eq + Hash,
{
    let mut visited = HashSet::new();
    let mut queue = VecDeque::new();
    queue.push_back(root.clone());
    visited.insert(root.clone());

    let mut violations = Vec::new();

    while let Some(current) = queue.pop_front() {
        let Some(deps) = adjacency.get(&current) else {
            continue;
        };

        for dep in deps.iter().cloned() {
            if !visited.insert(dep.clone()) {
                continue;
            }

            if let Some(name) = id_to_name.get(&dep)
                && forbidden.contains(name)
            {
                violations.push((*name).to_string());
            }

            queue.push_back(dep);
        }
    }

    violations.sort();
    violations.dedup();
    violations
}
