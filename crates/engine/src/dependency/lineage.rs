// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Batch numbering of a reflection and everything downstream of it.

use refl_core::{DependencyEntry, ReflectionId};
use std::collections::{BTreeSet, HashMap, VecDeque};

/// Reflections in cascade order with their DAG depth from base datasets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Lineage {
    /// `(reflection, batch)` sorted by batch, then id.
    pub entries: Vec<(ReflectionId, u32)>,
    /// Some edge was missing or cyclic; batches around it are lower bounds.
    pub partial: bool,
}

impl Lineage {
    pub fn batch_of(&self, id: &ReflectionId) -> Option<u32> {
        self.entries.iter().find(|(r, _)| r == id).map(|(_, b)| *b)
    }
}

enum Mark {
    Visiting,
    Done(u32),
}

pub(super) fn compute(
    root: &ReflectionId,
    upstream: &HashMap<ReflectionId, Vec<DependencyEntry>>,
    downstream: &HashMap<ReflectionId, BTreeSet<ReflectionId>>,
) -> Lineage {
    let mut lineage = Lineage::default();

    let mut members = BTreeSet::new();
    let mut queue = VecDeque::from([root.clone()]);
    while let Some(id) = queue.pop_front() {
        if !members.insert(id.clone()) {
            continue;
        }
        if let Some(children) = downstream.get(&id) {
            queue.extend(children.iter().cloned());
        }
    }

    let mut marks: HashMap<ReflectionId, Mark> = HashMap::new();
    for id in &members {
        let batch = batch_of(id, upstream, &mut marks, &mut lineage.partial);
        lineage.entries.push((id.clone(), batch));
    }
    lineage.entries.sort_by(|(a, ab), (b, bb)| ab.cmp(bb).then_with(|| a.cmp(b)));
    lineage
}

fn batch_of(
    id: &ReflectionId,
    upstream: &HashMap<ReflectionId, Vec<DependencyEntry>>,
    marks: &mut HashMap<ReflectionId, Mark>,
    partial: &mut bool,
) -> u32 {
    match marks.get(id) {
        Some(Mark::Done(batch)) => return *batch,
        Some(Mark::Visiting) => {
            *partial = true;
            return 0;
        }
        None => {}
    }
    let Some(deps) = upstream.get(id) else {
        // No recorded dependencies: treat as reading base datasets only
        *partial = true;
        marks.insert(id.clone(), Mark::Done(1));
        return 1;
    };
    marks.insert(id.clone(), Mark::Visiting);
    let mut deepest = 0;
    for parent in deps.iter().filter_map(DependencyEntry::as_reflection) {
        deepest = deepest.max(batch_of(parent, upstream, marks, partial));
    }
    let batch = deepest + 1;
    marks.insert(id.clone(), Mark::Done(batch));
    batch
}

#[cfg(test)]
#[path = "lineage_tests.rs"]
mod tests;
