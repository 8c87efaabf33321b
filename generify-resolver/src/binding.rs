//! Partial type-variable bindings
//!
//! A [`Binding`] is an immutable-once-built partial map from variable
//! index to type expression, tagged with a cyclic flag that signals a
//! variable-to-variable entry still awaiting cycle elimination. All
//! operations are persistent: inputs are never mutated, a new binding is
//! returned.

use crate::error::{ResolveError, ResolveResult};
use crate::hierarchy::ClassHierarchy;
use crate::types::{TypeExpr, VarId, VariableUniverse, WildcardDirection};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::rc::Rc;

/// Outcome of ranking one binding (or one bound type) against another
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Same,
    Better,
    Worse,
    Incomparable,
}

impl Comparison {
    /// The comparison as seen from the other operand
    pub fn flipped(self) -> Self {
        match self {
            Comparison::Better => Comparison::Worse,
            Comparison::Worse => Comparison::Better,
            other => other,
        }
    }
}

/// Kind ranking used by [`Binding::compare`]: unbound is best, `Bottom`
/// is worst
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum TypeKind {
    Unbound,
    Primitive,
    Array,
    Class,
    Bottom,
    Other,
}

fn kind_of(ty: Option<&TypeExpr>) -> TypeKind {
    match ty {
        None => TypeKind::Unbound,
        Some(TypeExpr::Primitive(_)) => TypeKind::Primitive,
        Some(TypeExpr::Array(_)) => TypeKind::Array,
        Some(TypeExpr::Nominal { .. }) => TypeKind::Class,
        Some(TypeExpr::Bottom) => TypeKind::Bottom,
        Some(TypeExpr::Variable(_) | TypeExpr::Wildcard { .. } | TypeExpr::Null) => TypeKind::Other,
    }
}

/// A partial map from the universe's variables to type expressions
#[derive(Debug, Clone)]
pub struct Binding {
    universe: Rc<VariableUniverse>,
    entries: BTreeMap<VarId, TypeExpr>,
    cyclic: bool,
}

impl PartialEq for Binding {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.universe, &other.universe) && self.entries == other.entries
    }
}

impl Eq for Binding {}

impl Binding {
    /// The empty binding over `universe`
    pub fn empty(universe: Rc<VariableUniverse>) -> Self {
        Self {
            universe,
            entries: BTreeMap::new(),
            cyclic: false,
        }
    }

    /// A binding holding the single entry `var -> ty`
    pub fn singleton(
        universe: Rc<VariableUniverse>,
        var: VarId,
        ty: TypeExpr,
    ) -> ResolveResult<Self> {
        Self::empty(universe).bind(var, ty)
    }

    /// Extend with one entry, returning a new binding
    ///
    /// Entries are only ever added for variables in the universe; anything
    /// else is a broken invariant, not an unsatisfiable constraint.
    pub fn bind(&self, var: VarId, ty: TypeExpr) -> ResolveResult<Self> {
        if !self.universe.contains(var) {
            return Err(ResolveError::UnknownVariable { var });
        }
        let cyclic = matches!(ty, TypeExpr::Variable(_));
        let mut entries = self.entries.clone();
        entries.insert(var, ty);
        Ok(Self {
            universe: Rc::clone(&self.universe),
            entries,
            cyclic: self.cyclic || cyclic,
        })
    }

    pub fn universe(&self) -> &Rc<VariableUniverse> {
        &self.universe
    }

    pub fn get(&self, var: VarId) -> Option<&TypeExpr> {
        self.entries.get(&var)
    }

    pub fn binds(&self, var: VarId) -> bool {
        self.entries.contains_key(&var)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> impl Iterator<Item = (VarId, &TypeExpr)> {
        self.entries.iter().map(|(v, t)| (*v, t))
    }

    /// True while a variable-to-variable entry awaits cycle elimination
    pub fn is_cyclic(&self) -> bool {
        self.cyclic
    }

    /// The same binding with the cyclic flag consumed
    pub fn cleared_cyclic(&self) -> Self {
        Self {
            universe: Rc::clone(&self.universe),
            entries: self.entries.clone(),
            cyclic: false,
        }
    }

    /// True iff every entry resolves to a type without variables
    pub fn is_decided(&self) -> bool {
        self.entries.values().all(|t| t.is_concrete())
    }

    /// One-step substitution: replaces bound variables and rebuilds
    /// structure, leaving unbound variables in place
    pub fn apply(&self, ty: &TypeExpr) -> TypeExpr {
        match ty {
            TypeExpr::Variable(v) => self
                .entries
                .get(v)
                .cloned()
                .unwrap_or_else(|| ty.clone()),
            TypeExpr::Nominal { class, args } => TypeExpr::Nominal {
                class: class.clone(),
                args: args
                    .iter()
                    .map(|(p, t)| (p.clone(), self.apply(t)))
                    .collect(),
            },
            TypeExpr::Array(component) => TypeExpr::Array(Box::new(self.apply(component))),
            TypeExpr::Wildcard { direction, bound } => TypeExpr::Wildcard {
                direction: *direction,
                bound: bound.as_ref().map(|b| Box::new(self.apply(b))),
            },
            TypeExpr::Primitive(_) | TypeExpr::Null | TypeExpr::Bottom => ty.clone(),
        }
    }

    /// Full resolution: a variable-free type, or `None` when a reachable
    /// variable is unbound or still bound to `Bottom` or another variable
    pub fn substitute(&self, ty: &TypeExpr) -> Option<TypeExpr> {
        match ty {
            TypeExpr::Variable(v) => match self.entries.get(v) {
                None | Some(TypeExpr::Bottom) | Some(TypeExpr::Variable(_)) => None,
                Some(resolved) => self.substitute(resolved),
            },
            TypeExpr::Nominal { class, args } => {
                let mut resolved = Vec::with_capacity(args.len());
                for (p, t) in args.iter() {
                    resolved.push((p.clone(), self.substitute(t)?));
                }
                Some(TypeExpr::Nominal {
                    class: class.clone(),
                    args: resolved.into_iter().collect(),
                })
            }
            TypeExpr::Array(component) => {
                Some(TypeExpr::Array(Box::new(self.substitute(component)?)))
            }
            TypeExpr::Wildcard { direction, bound } => match bound {
                Some(b) => Some(TypeExpr::Wildcard {
                    direction: *direction,
                    bound: Some(Box::new(self.substitute(b)?)),
                }),
                None => Some(ty.clone()),
            },
            TypeExpr::Primitive(_) | TypeExpr::Null | TypeExpr::Bottom => Some(ty.clone()),
        }
    }

    /// Merge two bindings over the same universe
    ///
    /// A variable bound in exactly one side takes that entry after the
    /// other binding is applied to it; a variable bound in both takes the
    /// meet of the two candidates. An inconsistent meet makes the whole
    /// composition infeasible (`Ok(None)`); composing across universes is
    /// an internal failure.
    pub fn compose(
        &self,
        other: &Binding,
        hierarchy: &dyn ClassHierarchy,
    ) -> ResolveResult<Option<Binding>> {
        if !Rc::ptr_eq(&self.universe, &other.universe) {
            return Err(ResolveError::ForeignBinding);
        }
        let vars: BTreeSet<VarId> = self
            .entries
            .keys()
            .chain(other.entries.keys())
            .copied()
            .collect();
        let mut entries = BTreeMap::new();
        for var in vars {
            let merged = match (self.entries.get(&var), other.entries.get(&var)) {
                (Some(a), None) => other.apply(a),
                (None, Some(b)) => self.apply(b),
                (Some(a), Some(b)) => {
                    let a = other.apply(a);
                    let b = self.apply(b);
                    match meet_types(hierarchy, &a, &b) {
                        Some(t) => t,
                        None => return Ok(None),
                    }
                }
                (None, None) => unreachable!("key set is the union of both entry maps"),
            };
            if merged == TypeExpr::Variable(var) {
                continue;
            }
            entries.insert(var, merged);
        }
        let cyclic = entries.values().any(|t| matches!(t, TypeExpr::Variable(_)));
        Ok(Some(Binding {
            universe: Rc::clone(&self.universe),
            entries,
            cyclic,
        }))
    }

    /// Rank this binding against `other` under the solution partial order
    ///
    /// Folds the per-variable type comparisons: every bound variable must
    /// agree on direction (ties are skipped) or the bindings are
    /// incomparable.
    pub fn compare(&self, other: &Binding, hierarchy: &dyn ClassHierarchy) -> Comparison {
        if !Rc::ptr_eq(&self.universe, &other.universe) {
            return Comparison::Incomparable;
        }
        let vars: BTreeSet<VarId> = self
            .entries
            .keys()
            .chain(other.entries.keys())
            .copied()
            .collect();
        let mut overall = Comparison::Same;
        for var in vars {
            let step = compare_types(hierarchy, self.get(var), other.get(var));
            match step {
                Comparison::Same => continue,
                Comparison::Incomparable => return Comparison::Incomparable,
                direction => {
                    if overall == Comparison::Same {
                        overall = direction;
                    } else if overall != direction {
                        return Comparison::Incomparable;
                    }
                }
            }
        }
        overall
    }
}

impl fmt::Display for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self
            .entries
            .iter()
            .map(|(v, t)| format!("{v} -> {t}"))
            .collect();
        write!(f, "{{{}}}", rendered.join(", "))
    }
}

/// Rank two candidate types for the same variable
///
/// Kinds order as unbound < primitive < array < class < bottom, smaller
/// being more precise, except that the universal root and the marker
/// interfaces rank below any other class.
fn compare_types(
    hierarchy: &dyn ClassHierarchy,
    a: Option<&TypeExpr>,
    b: Option<&TypeExpr>,
) -> Comparison {
    let (ka, kb) = (kind_of(a), kind_of(b));
    if ka != kb {
        return if ka < kb {
            Comparison::Better
        } else {
            Comparison::Worse
        };
    }
    match (a, b) {
        (None, None) => Comparison::Same,
        (Some(TypeExpr::Bottom), Some(TypeExpr::Bottom)) => Comparison::Same,
        (Some(TypeExpr::Primitive(x)), Some(TypeExpr::Primitive(y))) => {
            if x == y {
                Comparison::Same
            } else {
                Comparison::Incomparable
            }
        }
        (Some(TypeExpr::Array(x)), Some(TypeExpr::Array(y))) => {
            compare_types(hierarchy, Some(x), Some(y))
        }
        (
            Some(TypeExpr::Nominal { class: ca, args: aa }),
            Some(TypeExpr::Nominal { class: cb, args: ab }),
        ) => {
            let a_generic = hierarchy.is_root_or_marker(ca);
            let b_generic = hierarchy.is_root_or_marker(cb);
            if a_generic && !b_generic {
                return Comparison::Worse;
            }
            if b_generic && !a_generic {
                return Comparison::Better;
            }
            if ca == cb {
                // a raw hole ranks like an erased (Bottom) argument
                static RAW_HOLE: TypeExpr = TypeExpr::Bottom;
                // direction must be consistent across every argument pair
                let params: BTreeSet<&String> = aa.params().chain(ab.params()).collect();
                let mut overall = Comparison::Same;
                for param in params {
                    let xa = aa.get(param).unwrap_or(&RAW_HOLE);
                    let xb = ab.get(param).unwrap_or(&RAW_HOLE);
                    match compare_types(hierarchy, Some(xa), Some(xb)) {
                        Comparison::Same => continue,
                        Comparison::Incomparable => return Comparison::Incomparable,
                        direction => {
                            if overall == Comparison::Same {
                                overall = direction;
                            } else if overall != direction {
                                return Comparison::Incomparable;
                            }
                        }
                    }
                }
                overall
            } else if hierarchy.is_subtype_or_self(ca, cb) {
                Comparison::Better
            } else if hierarchy.is_subtype_or_self(cb, ca) {
                Comparison::Worse
            } else {
                Comparison::Incomparable
            }
        }
        (
            Some(TypeExpr::Wildcard {
                direction: da,
                bound: ba,
            }),
            Some(TypeExpr::Wildcard {
                direction: db,
                bound: bb,
            }),
        ) if da == db => {
            let inner = compare_types(
                hierarchy,
                ba.as_ref().map(|b| b.as_ref()),
                bb.as_ref().map(|b| b.as_ref()),
            );
            match da {
                WildcardDirection::Extends => inner,
                WildcardDirection::Super => inner.flipped(),
            }
        }
        (Some(x), Some(y)) if x == y => Comparison::Same,
        _ => Comparison::Incomparable,
    }
}

/// Structural meet of two candidate types for one variable
///
/// This is the scalar fast path of the lattice intersect used when
/// `compose` finds a variable bound on both sides: agreement, `Bottom`
/// absorption, component-wise descent, and hierarchy containment. `None`
/// means the two candidates are inconsistent.
fn meet_types(hierarchy: &dyn ClassHierarchy, a: &TypeExpr, b: &TypeExpr) -> Option<TypeExpr> {
    if a == b {
        return Some(a.clone());
    }
    match (a, b) {
        (TypeExpr::Bottom, _) | (_, TypeExpr::Bottom) => Some(TypeExpr::Bottom),
        (TypeExpr::Null, _) | (_, TypeExpr::Null) => Some(TypeExpr::Null),
        // an unresolved variable yields to the other candidate
        (TypeExpr::Variable(_), other) => Some(other.clone()),
        (other, TypeExpr::Variable(_)) => Some(other.clone()),
        (TypeExpr::Array(x), TypeExpr::Array(y)) => {
            Some(TypeExpr::Array(Box::new(meet_types(hierarchy, x, y)?)))
        }
        (
            TypeExpr::Nominal { class: ca, args: aa },
            TypeExpr::Nominal { class: cb, args: ab },
        ) => {
            if ca == cb {
                let params: BTreeSet<String> =
                    aa.params().chain(ab.params()).cloned().collect();
                let mut merged = Vec::new();
                for param in params {
                    let met = match (aa.get(&param), ab.get(&param)) {
                        (Some(x), Some(y)) => meet_types(hierarchy, x, y)?,
                        (Some(x), None) | (None, Some(x)) => x.clone(),
                        (None, None) => continue,
                    };
                    merged.push((param, met));
                }
                Some(TypeExpr::Nominal {
                    class: ca.clone(),
                    args: merged.into_iter().collect(),
                })
            } else if hierarchy.is_subtype_or_self(ca, cb) {
                Some(a.clone())
            } else if hierarchy.is_subtype_or_self(cb, ca) {
                Some(b.clone())
            } else {
                None
            }
        }
        _ => None,
    }
}
