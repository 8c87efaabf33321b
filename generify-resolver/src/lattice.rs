//! Hierarchy range and lattice search
//!
//! Named worklist routines over the external hierarchy, used by the
//! binding factory to enumerate join/meet candidates and by the resolver
//! to enumerate interval members. Hierarchy graphs are externally bounded,
//! so plain breadth-first worklists with explicit visited sets suffice.

use crate::hierarchy::ClassHierarchy;
use crate::types::ClassId;
use std::collections::{HashSet, VecDeque};

/// Minimal classes that inherit from both `a` and `b`
///
/// Searches downward from `a`, keeping the shallowest hits and never
/// descending past one. Final classes short-circuit the search since they
/// admit no further descendants.
pub fn minimal_common_inheritors(
    hierarchy: &dyn ClassHierarchy,
    a: &ClassId,
    b: &ClassId,
) -> Vec<ClassId> {
    if hierarchy.is_subtype_or_self(a, b) {
        return vec![a.clone()];
    }
    if hierarchy.is_subtype_or_self(b, a) {
        return vec![b.clone()];
    }
    let mut found = Vec::new();
    let mut seen = HashSet::new();
    let mut queue: VecDeque<ClassId> = hierarchy.immediate_subtypes(a).into();
    while let Some(class) = queue.pop_front() {
        if !seen.insert(class.clone()) {
            continue;
        }
        if hierarchy.is_subtype_or_self(&class, b) {
            if !found.contains(&class) {
                found.push(class);
            }
            continue;
        }
        if hierarchy.is_final(&class) {
            continue;
        }
        queue.extend(hierarchy.immediate_subtypes(&class));
    }
    // keep only classes not below another hit
    found
        .iter()
        .filter(|candidate| {
            !found.iter().any(|other| {
                *candidate != other && hierarchy.is_subtype_or_self(candidate, other)
            })
        })
        .cloned()
        .collect()
}

/// Minimal common ancestors of `a` and `b` (join candidates)
///
/// Walks upward from `b` one supertype edge at a time and collects the
/// first ancestors that are also ancestors of `a`, never ascending past a
/// hit.
pub fn minimal_common_ancestors(
    hierarchy: &dyn ClassHierarchy,
    a: &ClassId,
    b: &ClassId,
) -> Vec<ClassId> {
    if hierarchy.is_subtype_or_self(a, b) {
        return vec![b.clone()];
    }
    if hierarchy.is_subtype_or_self(b, a) {
        return vec![a.clone()];
    }
    let above_a = ancestors_or_self(hierarchy, a);
    let mut found = Vec::new();
    let mut seen = HashSet::new();
    let mut queue: VecDeque<ClassId> = hierarchy.supertypes(b).into();
    while let Some(class) = queue.pop_front() {
        if !seen.insert(class.clone()) {
            continue;
        }
        if above_a.contains(&class) {
            if !found.contains(&class) {
                found.push(class);
            }
            continue;
        }
        queue.extend(hierarchy.supertypes(&class));
    }
    found
        .iter()
        .filter(|candidate| {
            !found.iter().any(|other| {
                *candidate != other && hierarchy.is_subtype_or_self(other, candidate)
            })
        })
        .cloned()
        .collect()
}

/// Every ancestor of `from`, including `from` itself, nearest first
///
/// This is the hierarchy range from a bound up to the universal root.
pub fn ancestors_or_self(hierarchy: &dyn ClassHierarchy, from: &ClassId) -> Vec<ClassId> {
    let mut out = vec![from.clone()];
    let mut seen: HashSet<ClassId> = HashSet::from([from.clone()]);
    let mut queue: VecDeque<ClassId> = hierarchy.supertypes(from).into();
    while let Some(class) = queue.pop_front() {
        if !seen.insert(class.clone()) {
            continue;
        }
        queue.extend(hierarchy.supertypes(&class));
        out.push(class);
    }
    out
}

/// Every class on an inheritance path from `from` up to `to`, inclusive,
/// `from` first
///
/// Walks one supertype edge at a time and keeps each visited class that
/// still lies below `to`. Empty when `to` is not an ancestor of `from`.
pub fn classes_between(
    hierarchy: &dyn ClassHierarchy,
    from: &ClassId,
    to: &ClassId,
) -> Vec<ClassId> {
    if !hierarchy.is_subtype_or_self(from, to) {
        return Vec::new();
    }
    ancestors_or_self(hierarchy, from)
        .into_iter()
        .filter(|class| hierarchy.is_subtype_or_self(class, to))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchy::TableHierarchy;

    fn shapes() -> TableHierarchy {
        let mut h = TableHierarchy::new("Object");
        h.marker("Marked");
        h.class("Shape", &[]);
        h.class("Drawable", &[]);
        h.class("Circle", &[]);
        h.extends("Circle", "Shape", &[]);
        h.extends("Circle", "Drawable", &[]);
        h.class("Square", &[]);
        h.extends("Square", "Shape", &[]);
        h.extends("Square", "Drawable", &[]);
        h.final_class("Dot", &[]);
        h.extends("Dot", "Shape", &[]);
        h
    }

    #[test]
    fn common_inheritors_of_two_interfaces_are_the_implementing_classes() {
        let h = shapes();
        let got = minimal_common_inheritors(&h, &ClassId::new("Shape"), &ClassId::new("Drawable"));
        assert!(got.contains(&ClassId::new("Circle")));
        assert!(got.contains(&ClassId::new("Square")));
        assert!(!got.contains(&ClassId::new("Dot")));
    }

    #[test]
    fn related_classes_short_circuit_to_the_subtype() {
        let h = shapes();
        let got = minimal_common_inheritors(&h, &ClassId::new("Circle"), &ClassId::new("Shape"));
        assert_eq!(got, vec![ClassId::new("Circle")]);
    }

    #[test]
    fn common_ancestors_of_siblings() {
        let h = shapes();
        let got = minimal_common_ancestors(&h, &ClassId::new("Circle"), &ClassId::new("Square"));
        assert!(got.contains(&ClassId::new("Shape")));
        assert!(got.contains(&ClassId::new("Drawable")));
        assert!(!got.contains(&ClassId::new("Object")));
    }

    #[test]
    fn classes_between_covers_both_ends() {
        let h = shapes();
        let got = classes_between(&h, &ClassId::new("Circle"), &ClassId::new("Shape"));
        assert_eq!(got.first(), Some(&ClassId::new("Circle")));
        assert!(got.contains(&ClassId::new("Shape")));
        assert!(!got.contains(&ClassId::new("Object")));
        assert!(!got.contains(&ClassId::new("Drawable")));
    }
}
