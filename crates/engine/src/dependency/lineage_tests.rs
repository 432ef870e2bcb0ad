// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

struct Graph {
    upstream: HashMap<ReflectionId, Vec<DependencyEntry>>,
    downstream: HashMap<ReflectionId, BTreeSet<ReflectionId>>,
}

/// Build from `(reflection, [upstream reflections])`; every reflection also reads a dataset.
fn graph(edges: &[(&str, &[&str])]) -> Graph {
    let mut g = Graph { upstream: HashMap::new(), downstream: HashMap::new() };
    for (id, parents) in edges {
        let mut deps = vec![DependencyEntry::dataset("dst-base", None)];
        for parent in *parents {
            deps.push(DependencyEntry::reflection(*parent));
            g.downstream
                .entry(ReflectionId::from_string(*parent))
                .or_default()
                .insert(ReflectionId::from_string(*id));
        }
        g.upstream.insert(ReflectionId::from_string(*id), deps);
    }
    g
}

fn lineage(g: &Graph, root: &str) -> Lineage {
    compute(&ReflectionId::from_string(root), &g.upstream, &g.downstream)
}

fn ids(l: &Lineage) -> Vec<(String, u32)> {
    l.entries.iter().map(|(r, b)| (r.to_string(), *b)).collect()
}

#[test]
fn chain_numbers_by_depth() {
    let g = graph(&[("rfl-a", &[]), ("rfl-b", &["rfl-a"]), ("rfl-c", &["rfl-b"])]);
    let l = lineage(&g, "rfl-a");
    assert!(!l.partial);
    assert_eq!(
        ids(&l),
        vec![("rfl-a".into(), 1), ("rfl-b".into(), 2), ("rfl-c".into(), 3)]
    );
}

#[test]
fn diamond_takes_deepest_parent() {
    let g = graph(&[
        ("rfl-a", &[]),
        ("rfl-b", &["rfl-a"]),
        ("rfl-c", &[]),
        ("rfl-d", &["rfl-b", "rfl-c"]),
    ]);
    let l = lineage(&g, "rfl-c");
    assert!(!l.partial);
    assert_eq!(ids(&l), vec![("rfl-c".into(), 1), ("rfl-d".into(), 3)]);
}

#[test]
fn lineage_from_middle_excludes_upstream() {
    let g = graph(&[("rfl-a", &[]), ("rfl-b", &["rfl-a"]), ("rfl-c", &["rfl-b"])]);
    let l = lineage(&g, "rfl-b");
    assert_eq!(l.batch_of(&"rfl-a".into()), None);
    assert_eq!(l.batch_of(&"rfl-b".into()), Some(2));
    assert_eq!(l.batch_of(&"rfl-c".into()), Some(3));
}

#[test]
fn cycle_is_partial_not_a_crash() {
    let g = graph(&[("rfl-a", &["rfl-b"]), ("rfl-b", &["rfl-a"])]);
    let l = lineage(&g, "rfl-a");
    assert!(l.partial);
    assert_eq!(l.entries.len(), 2);
}

#[test]
fn missing_upstream_is_partial() {
    let g = graph(&[("rfl-b", &["rfl-ghost"])]);
    let l = lineage(&g, "rfl-b");
    assert!(l.partial);
    assert_eq!(l.batch_of(&"rfl-b".into()), Some(2));
}

#[test]
fn unknown_root_is_a_single_partial_entry() {
    let g = graph(&[]);
    let l = lineage(&g, "rfl-x");
    assert!(l.partial);
    assert_eq!(ids(&l), vec![("rfl-x".into(), 1)]);
}
