//! External class-hierarchy interface
//!
//! The engine consumes program structure exclusively through the
//! [`ClassHierarchy`] trait: read-only queries against a fixed snapshot.
//! Real embedders implement it over their own program index;
//! [`TableHierarchy`] is a small declarative implementation for tests and
//! stand-alone use.

use crate::types::{ClassId, Substitution, TypeExpr};
use std::collections::{BTreeMap, HashSet, VecDeque};

/// Read-only class-hierarchy queries consumed by the engine
///
/// All queries answer against a fixed snapshot and must be side-effect
/// free from the engine's point of view. `immediate_subtypes` must
/// terminate; classes marked final short-circuit downward searches since
/// they admit no further descendants.
pub trait ClassHierarchy {
    /// True iff `a` equals `b` or inherits from it
    fn is_subtype_or_self(&self, a: &ClassId, b: &ClassId) -> bool;

    /// Immediate (one-edge) subtypes of `class`
    fn immediate_subtypes(&self, class: &ClassId) -> Vec<ClassId>;

    /// Immediate (one-edge) supertypes of `class`
    fn supertypes(&self, class: &ClassId) -> Vec<ClassId>;

    /// True iff the class admits no descendants
    fn is_final(&self, class: &ClassId) -> bool;

    /// Map a type-argument substitution of `from` into the view of `to`,
    /// where the two classes are related by inheritance in either
    /// direction. `None` means the snapshot has no projection between
    /// them; parameters without a projection become raw holes.
    fn convert_substitution(
        &self,
        from: &ClassId,
        to: &ClassId,
        subst: &Substitution,
    ) -> Option<Substitution>;

    /// Ordered formal type-parameter names of `class`
    fn type_parameters(&self, class: &ClassId) -> Vec<String>;

    /// The universal root class (`Object` in Java-like hierarchies)
    fn root(&self) -> ClassId;

    /// Marker interfaces every array implicitly supports
    fn marker_interfaces(&self) -> Vec<ClassId>;

    /// True iff `class` is the root or one of the marker interfaces
    fn is_root_or_marker(&self, class: &ClassId) -> bool {
        *class == self.root() || self.marker_interfaces().contains(class)
    }
}

/// How one supertype parameter is written in terms of a subtype's use site
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Projection {
    /// The supertype parameter is instantiated by a subtype parameter
    Param(String),
    /// The supertype parameter is instantiated by a fixed type
    Exact(TypeExpr),
}

#[derive(Debug, Clone, Default)]
struct ClassEntry {
    parameters: Vec<String>,
    is_final: bool,
    /// Direct supertypes with per-parameter projections keyed by the
    /// supertype's parameter name
    supers: Vec<(ClassId, BTreeMap<String, Projection>)>,
}

/// Declarative in-memory hierarchy
///
/// Classes without a declared supertype implicitly extend the root.
/// Projections are declared per inheritance edge; `convert_substitution`
/// folds them along the edge path in either direction, dropping
/// parameters that have no projection (they become raw holes).
#[derive(Debug, Clone)]
pub struct TableHierarchy {
    root: ClassId,
    markers: Vec<ClassId>,
    classes: BTreeMap<ClassId, ClassEntry>,
}

impl TableHierarchy {
    pub fn new(root: &str) -> Self {
        let root = ClassId::new(root);
        let mut classes = BTreeMap::new();
        classes.insert(root.clone(), ClassEntry::default());
        Self {
            root,
            markers: Vec::new(),
            classes,
        }
    }

    /// Register a class with the given formal type parameters
    pub fn class(&mut self, name: &str, parameters: &[&str]) -> &mut Self {
        self.classes.insert(
            ClassId::new(name),
            ClassEntry {
                parameters: parameters.iter().map(|p| p.to_string()).collect(),
                ..ClassEntry::default()
            },
        );
        self
    }

    /// Register a class that admits no descendants
    pub fn final_class(&mut self, name: &str, parameters: &[&str]) -> &mut Self {
        self.class(name, parameters);
        if let Some(entry) = self.classes.get_mut(&ClassId::new(name)) {
            entry.is_final = true;
        }
        self
    }

    /// Register a marker interface (directly under the root)
    pub fn marker(&mut self, name: &str) -> &mut Self {
        self.class(name, &[]);
        self.markers.push(ClassId::new(name));
        self
    }

    /// Declare `sub extends sup`, projecting each supertype parameter to
    /// the named subtype parameter
    pub fn extends(&mut self, sub: &str, sup: &str, projections: &[(&str, &str)]) -> &mut Self {
        let mapping = projections
            .iter()
            .map(|(p, q)| (p.to_string(), Projection::Param(q.to_string())))
            .collect();
        self.push_edge(sub, sup, mapping)
    }

    /// Declare `sub extends sup` with explicit projections, allowing
    /// fixed-type instantiations such as `StringList extends List<String>`
    pub fn extends_with(
        &mut self,
        sub: &str,
        sup: &str,
        projections: Vec<(String, Projection)>,
    ) -> &mut Self {
        self.push_edge(sub, sup, projections.into_iter().collect())
    }

    fn push_edge(
        &mut self,
        sub: &str,
        sup: &str,
        mapping: BTreeMap<String, Projection>,
    ) -> &mut Self {
        let entry = self.classes.entry(ClassId::new(sub)).or_default();
        entry.supers.push((ClassId::new(sup), mapping));
        self
    }

    fn entry(&self, class: &ClassId) -> Option<&ClassEntry> {
        self.classes.get(class)
    }

    /// Edge path from `from` up to `to` as a list of `(sub, sup)` pairs,
    /// or `None` when `to` is not an ancestor of `from`
    fn path_up(&self, from: &ClassId, to: &ClassId) -> Option<Vec<(ClassId, ClassId)>> {
        if from == to {
            return Some(Vec::new());
        }
        let mut predecessor: BTreeMap<ClassId, ClassId> = BTreeMap::new();
        let mut queue = VecDeque::from([from.clone()]);
        let mut seen = HashSet::from([from.clone()]);
        while let Some(current) = queue.pop_front() {
            for sup in self.supertypes(&current) {
                if seen.insert(sup.clone()) {
                    predecessor.insert(sup.clone(), current.clone());
                    if sup == *to {
                        let mut path = Vec::new();
                        let mut node = to.clone();
                        while node != *from {
                            let prev = predecessor[&node].clone();
                            path.push((prev.clone(), node));
                            node = prev;
                        }
                        path.reverse();
                        return Some(path);
                    }
                    queue.push_back(sup);
                }
            }
        }
        None
    }

    fn edge_mapping(&self, sub: &ClassId, sup: &ClassId) -> Option<&BTreeMap<String, Projection>> {
        self.entry(sub)?
            .supers
            .iter()
            .find(|(s, _)| s == sup)
            .map(|(_, m)| m)
    }

    /// Fold a substitution one edge upward: express `sup`'s parameters in
    /// terms of the instantiation `subst` of `sub`
    fn convert_up(
        &self,
        sub: &ClassId,
        sup: &ClassId,
        subst: &Substitution,
    ) -> Option<Substitution> {
        let mapping = self.edge_mapping(sub, sup)?;
        let mut out = Substitution::empty();
        for param in self.type_parameters(sup) {
            match mapping.get(&param) {
                Some(Projection::Param(q)) => {
                    if let Some(t) = subst.get(q) {
                        out.insert(param, t.clone());
                    }
                }
                Some(Projection::Exact(t)) => out.insert(param, t.clone()),
                None => {}
            }
        }
        Some(out)
    }

    /// Fold a substitution one edge downward: recover `sub`'s parameters
    /// from an instantiation `subst` of `sup`. Exact projections cannot be
    /// inverted and leave raw holes.
    fn convert_down(
        &self,
        sub: &ClassId,
        sup: &ClassId,
        subst: &Substitution,
    ) -> Option<Substitution> {
        let mapping = self.edge_mapping(sub, sup)?;
        let mut out = Substitution::empty();
        for (sup_param, projection) in mapping {
            if let Projection::Param(sub_param) = projection {
                if let Some(t) = subst.get(sup_param) {
                    out.insert(sub_param.clone(), t.clone());
                }
            }
        }
        Some(out)
    }
}

impl ClassHierarchy for TableHierarchy {
    fn is_subtype_or_self(&self, a: &ClassId, b: &ClassId) -> bool {
        self.path_up(a, b).is_some()
    }

    fn immediate_subtypes(&self, class: &ClassId) -> Vec<ClassId> {
        if self
            .entry(class)
            .map(|entry| entry.is_final)
            .unwrap_or(true)
        {
            return Vec::new();
        }
        self.classes
            .iter()
            .filter(|(name, _)| *name != class)
            .filter(|(_, entry)| {
                if entry.supers.is_empty() {
                    *class == self.root
                } else {
                    entry.supers.iter().any(|(sup, _)| sup == class)
                }
            })
            .map(|(name, _)| name.clone())
            .collect()
    }

    fn supertypes(&self, class: &ClassId) -> Vec<ClassId> {
        if *class == self.root {
            return Vec::new();
        }
        match self.entry(class) {
            Some(entry) if !entry.supers.is_empty() => {
                entry.supers.iter().map(|(sup, _)| sup.clone()).collect()
            }
            Some(_) => vec![self.root.clone()],
            None => Vec::new(),
        }
    }

    fn is_final(&self, class: &ClassId) -> bool {
        self.entry(class).map(|e| e.is_final).unwrap_or(false)
    }

    fn convert_substitution(
        &self,
        from: &ClassId,
        to: &ClassId,
        subst: &Substitution,
    ) -> Option<Substitution> {
        if from == to {
            return Some(subst.clone());
        }
        if let Some(path) = self.path_up(from, to) {
            let mut current = subst.clone();
            for (sub, sup) in path {
                current = self.convert_up(&sub, &sup, &current)?;
            }
            return Some(current);
        }
        if let Some(path) = self.path_up(to, from) {
            let mut current = subst.clone();
            for (sub, sup) in path.iter().rev() {
                current = self.convert_down(sub, sup, &current)?;
            }
            return Some(current);
        }
        None
    }

    fn type_parameters(&self, class: &ClassId) -> Vec<String> {
        self.entry(class)
            .map(|e| e.parameters.clone())
            .unwrap_or_default()
    }

    fn root(&self) -> ClassId {
        self.root.clone()
    }

    fn marker_interfaces(&self) -> Vec<ClassId> {
        self.markers.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TypeExpr;

    fn collections() -> TableHierarchy {
        let mut h = TableHierarchy::new("Object");
        h.class("Collection", &["E"]);
        h.class("List", &["E"]);
        h.extends("List", "Collection", &[("E", "E")]);
        h.class("StringList", &[]);
        h.extends_with(
            "StringList",
            "List",
            vec![("E".to_string(), Projection::Exact(TypeExpr::nominal("String")))],
        );
        h
    }

    #[test]
    fn subtype_queries_follow_declared_edges() {
        let h = collections();
        let list = ClassId::new("List");
        let collection = ClassId::new("Collection");
        let object = ClassId::new("Object");
        assert!(h.is_subtype_or_self(&list, &collection));
        assert!(h.is_subtype_or_self(&list, &object));
        assert!(!h.is_subtype_or_self(&collection, &list));
    }

    #[test]
    fn convert_substitution_walks_edges_in_both_directions() {
        let h = collections();
        let mut args = Substitution::empty();
        args.insert("E", TypeExpr::nominal("Animal"));

        let up = h
            .convert_substitution(&ClassId::new("List"), &ClassId::new("Collection"), &args)
            .unwrap();
        assert_eq!(up.get("E"), Some(&TypeExpr::nominal("Animal")));

        let down = h
            .convert_substitution(&ClassId::new("Collection"), &ClassId::new("List"), &args)
            .unwrap();
        assert_eq!(down.get("E"), Some(&TypeExpr::nominal("Animal")));
    }

    #[test]
    fn exact_projections_convert_up_but_not_down() {
        let h = collections();
        let up = h
            .convert_substitution(
                &ClassId::new("StringList"),
                &ClassId::new("List"),
                &Substitution::empty(),
            )
            .unwrap();
        assert_eq!(up.get("E"), Some(&TypeExpr::nominal("String")));

        let mut list_args = Substitution::empty();
        list_args.insert("E", TypeExpr::nominal("String"));
        let down = h
            .convert_substitution(&ClassId::new("List"), &ClassId::new("StringList"), &list_args)
            .unwrap();
        assert!(down.is_raw());
    }

    #[test]
    fn final_classes_report_no_subtypes() {
        let mut h = TableHierarchy::new("Object");
        h.final_class("String", &[]);
        assert!(h.immediate_subtypes(&ClassId::new("String")).is_empty());
        assert!(h
            .immediate_subtypes(&ClassId::new("Object"))
            .contains(&ClassId::new("String")));
    }
}
