//! Lattice algebra over partial bindings
//!
//! [`BindingFactory`] owns the shape-respecting operations that turn one
//! subtyping constraint into zero, one, or several admissible bindings:
//! `rise` widens toward the upper side, `sink` is the conservative
//! bottom-defaulting fallback, `rise_with_wildcard` defers precision to a
//! fresh existential, and `union`/`intersect` enumerate join/meet
//! candidates over the class hierarchy. All five share one structural
//! descent (`balance`) parameterized by a three-method variable policy.
//!
//! Failure is always the silent `None`: "no admissible binding for this
//! shape" is an expected outcome of search, not an error.

use crate::binding::Binding;
use crate::error::ResolveResult;
use crate::hierarchy::ClassHierarchy;
use crate::lattice;
use crate::types::{ClassId, Constraint, Substitution, TypeExpr, VarId, VariableUniverse, WildcardDirection};
use std::rc::Rc;

/// Variable-handling policy for [`BindingFactory::balance`]
///
/// The sibling operations share the whole `(type, type)` descent and
/// differ only in how the three variable-involving shapes resolve.
trait Balancer {
    fn var_var(
        &self,
        factory: &BindingFactory,
        x: VarId,
        y: VarId,
        aux: Option<&mut Vec<Constraint>>,
    ) -> ResolveResult<Option<Binding>>;

    fn var_type(
        &self,
        factory: &BindingFactory,
        x: VarId,
        y: &TypeExpr,
        aux: Option<&mut Vec<Constraint>>,
    ) -> ResolveResult<Option<Binding>>;

    fn type_var(
        &self,
        factory: &BindingFactory,
        x: &TypeExpr,
        y: VarId,
        aux: Option<&mut Vec<Constraint>>,
    ) -> ResolveResult<Option<Binding>>;
}

/// Widening policy: bind the variable side toward the other side,
/// keeping existing structure wherever possible
struct Rise;

impl Balancer for Rise {
    fn var_var(
        &self,
        factory: &BindingFactory,
        x: VarId,
        y: VarId,
        _aux: Option<&mut Vec<Constraint>>,
    ) -> ResolveResult<Option<Binding>> {
        if x == y {
            return Ok(Some(factory.empty()));
        }
        factory.singleton(x, TypeExpr::Variable(y)).map(Some)
    }

    fn var_type(
        &self,
        factory: &BindingFactory,
        x: VarId,
        y: &TypeExpr,
        _aux: Option<&mut Vec<Constraint>>,
    ) -> ResolveResult<Option<Binding>> {
        match y {
            TypeExpr::Wildcard {
                direction: WildcardDirection::Extends,
                bound,
            } => {
                let bound = factory.wildcard_bound(bound);
                if bound.contains_variable(x) {
                    return Ok(None);
                }
                factory.singleton(x, bound).map(Some)
            }
            // below `? super B` the variable is unconstrained
            TypeExpr::Wildcard {
                direction: WildcardDirection::Super,
                ..
            } => factory.singleton(x, TypeExpr::Bottom).map(Some),
            _ => {
                if y.contains_variable(x) {
                    return Ok(None);
                }
                factory.singleton(x, y.clone()).map(Some)
            }
        }
    }

    fn type_var(
        &self,
        factory: &BindingFactory,
        x: &TypeExpr,
        y: VarId,
        _aux: Option<&mut Vec<Constraint>>,
    ) -> ResolveResult<Option<Binding>> {
        match x {
            TypeExpr::Wildcard {
                direction: WildcardDirection::Extends,
                bound,
            } => {
                let bound = factory.wildcard_bound(bound);
                if bound.contains_variable(y) {
                    return Ok(None);
                }
                factory.singleton(y, bound).map(Some)
            }
            // values under `? super B` range all the way up to the root
            TypeExpr::Wildcard {
                direction: WildcardDirection::Super,
                ..
            } => factory.singleton(y, factory.root_type()).map(Some),
            _ => {
                if x.contains_variable(y) {
                    return Ok(None);
                }
                factory.singleton(y, x.clone()).map(Some)
            }
        }
    }
}

/// Conservative policy: any unresolved variable goes straight to
/// `Bottom`, so the search tree never starves
struct Sink;

impl Balancer for Sink {
    fn var_var(
        &self,
        factory: &BindingFactory,
        x: VarId,
        y: VarId,
        _aux: Option<&mut Vec<Constraint>>,
    ) -> ResolveResult<Option<Binding>> {
        factory
            .singleton(x, TypeExpr::Bottom)?
            .bind(y, TypeExpr::Bottom)
            .map(Some)
    }

    fn var_type(
        &self,
        factory: &BindingFactory,
        x: VarId,
        _y: &TypeExpr,
        _aux: Option<&mut Vec<Constraint>>,
    ) -> ResolveResult<Option<Binding>> {
        factory.singleton(x, TypeExpr::Bottom).map(Some)
    }

    fn type_var(
        &self,
        factory: &BindingFactory,
        _x: &TypeExpr,
        y: VarId,
        _aux: Option<&mut Vec<Constraint>>,
    ) -> ResolveResult<Option<Binding>> {
        factory.singleton(y, TypeExpr::Bottom).map(Some)
    }
}

/// Wildcard policy: wherever a bound would have to name a concrete type
/// through a variable, introduce a fresh existential under a wildcard and
/// defer the real bound to an auxiliary constraint
struct RiseWithWildcard;

impl Balancer for RiseWithWildcard {
    fn var_var(
        &self,
        factory: &BindingFactory,
        x: VarId,
        y: VarId,
        aux: Option<&mut Vec<Constraint>>,
    ) -> ResolveResult<Option<Binding>> {
        Rise.var_var(factory, x, y, aux)
    }

    fn var_type(
        &self,
        factory: &BindingFactory,
        x: VarId,
        y: &TypeExpr,
        aux: Option<&mut Vec<Constraint>>,
    ) -> ResolveResult<Option<Binding>> {
        match y {
            TypeExpr::Nominal { .. } | TypeExpr::Array(_) if !y.contains_variable(x) => match aux {
                Some(list) => {
                    let fresh = factory.fresh_variable();
                    list.push(Constraint::new(TypeExpr::Variable(fresh), y.clone()));
                    factory
                        .singleton(x, TypeExpr::wildcard_extends(TypeExpr::Variable(fresh)))
                        .map(Some)
                }
                None => Rise.var_type(factory, x, y, None),
            },
            _ => Rise.var_type(factory, x, y, aux),
        }
    }

    fn type_var(
        &self,
        factory: &BindingFactory,
        x: &TypeExpr,
        y: VarId,
        aux: Option<&mut Vec<Constraint>>,
    ) -> ResolveResult<Option<Binding>> {
        match x {
            TypeExpr::Nominal { .. } | TypeExpr::Array(_) if !x.contains_variable(y) => match aux {
                Some(list) => {
                    let fresh = factory.fresh_variable();
                    list.push(Constraint::new(x.clone(), TypeExpr::Variable(fresh)));
                    factory
                        .singleton(y, TypeExpr::wildcard_super(TypeExpr::Variable(fresh)))
                        .map(Some)
                }
                None => Rise.type_var(factory, x, y, None),
            },
            _ => Rise.type_var(factory, x, y, aux),
        }
    }
}

/// Stateless lattice algebra bound to one hierarchy snapshot and one
/// variable universe
pub struct BindingFactory<'h> {
    hierarchy: &'h dyn ClassHierarchy,
    universe: Rc<VariableUniverse>,
}

impl<'h> BindingFactory<'h> {
    pub fn new(hierarchy: &'h dyn ClassHierarchy, universe: Rc<VariableUniverse>) -> Self {
        Self { hierarchy, universe }
    }

    pub fn universe(&self) -> &Rc<VariableUniverse> {
        &self.universe
    }

    /// Least additional binding making `x <: y`, or `None`
    ///
    /// When `aux` is absent, shapes that could only be satisfied by
    /// deferring work to the caller's constraint set fail instead.
    pub fn rise(
        &self,
        x: &TypeExpr,
        y: &TypeExpr,
        aux: Option<&mut Vec<Constraint>>,
    ) -> ResolveResult<Option<Binding>> {
        self.balance(x, y, &Rise, aux)
    }

    /// Conservative fallback binding for `x <: y`
    pub fn sink(
        &self,
        x: &TypeExpr,
        y: &TypeExpr,
        aux: Option<&mut Vec<Constraint>>,
    ) -> ResolveResult<Option<Binding>> {
        self.balance(x, y, &Sink, aux)
    }

    /// Like [`rise`](Self::rise), but producing wildcard-parameterized
    /// results tied to fresh existentials through `aux`
    pub fn rise_with_wildcard(
        &self,
        x: &TypeExpr,
        y: &TypeExpr,
        aux: &mut Vec<Constraint>,
    ) -> ResolveResult<Option<Binding>> {
        self.balance(x, y, &RiseWithWildcard, Some(aux))
    }

    /// Join candidates for two lower bounds
    ///
    /// For instantiations of the same class the arguments merge through
    /// `rise`; for different classes every minimal common inheritor
    /// yields one candidate with hierarchy-derived substitutions.
    pub fn union(&self, x: &TypeExpr, y: &TypeExpr) -> ResolveResult<Vec<(TypeExpr, Binding)>> {
        if x == y {
            return Ok(vec![(x.clone(), self.empty())]);
        }
        match (x, y) {
            (TypeExpr::Bottom, other) | (other, TypeExpr::Bottom) => {
                Ok(vec![(other.clone(), self.empty())])
            }
            (TypeExpr::Null, other) | (other, TypeExpr::Null)
                if matches!(other, TypeExpr::Nominal { .. } | TypeExpr::Array(_)) =>
            {
                Ok(vec![(other.clone(), self.empty())])
            }
            (TypeExpr::Array(cx), TypeExpr::Array(cy)) => Ok(self
                .union(cx, cy)?
                .into_iter()
                .map(|(t, b)| (TypeExpr::Array(Box::new(t)), b))
                .collect()),
            (
                TypeExpr::Nominal { class: cx, .. },
                TypeExpr::Nominal { class: cy, .. },
            ) if cx == cy => Ok(self.merge_same_class(x, y)?.into_iter().collect()),
            (
                TypeExpr::Nominal { class: cx, args: ax },
                TypeExpr::Nominal { class: cy, args: ay },
            ) => {
                let mut out: Vec<(TypeExpr, Binding)> = Vec::new();
                for descendant in lattice::minimal_common_inheritors(self.hierarchy, cx, cy) {
                    let xd = self.viewed_as(cx, ax, &descendant);
                    let yd = self.viewed_as(cy, ay, &descendant);
                    if let Some(pair) = self.merge_same_class(&xd, &yd)? {
                        if !out.iter().any(|(t, _)| *t == pair.0) {
                            out.push(pair);
                        }
                    }
                }
                Ok(out)
            }
            _ => Ok(Vec::new()),
        }
    }

    /// Meet candidates for two upper bounds
    ///
    /// Symmetric to [`union`](Self::union) but walking upward: every
    /// minimal common ancestor yields one candidate. Arrays mixed with
    /// class types meet through the universal root and the marker
    /// interfaces arrays implicitly support, and instantiations of the
    /// same class with no `rise` between them fall back to the raw form
    /// rather than failing.
    pub fn intersect(&self, x: &TypeExpr, y: &TypeExpr) -> ResolveResult<Vec<(TypeExpr, Binding)>> {
        if x == y {
            return Ok(vec![(x.clone(), self.empty())]);
        }
        match (x, y) {
            (TypeExpr::Bottom, _) | (_, TypeExpr::Bottom) => {
                Ok(vec![(TypeExpr::Bottom, self.empty())])
            }
            (TypeExpr::Null, _) | (_, TypeExpr::Null) => Ok(vec![(TypeExpr::Null, self.empty())]),
            (TypeExpr::Array(cx), TypeExpr::Array(cy)) => Ok(self
                .intersect(cx, cy)?
                .into_iter()
                .map(|(t, b)| (TypeExpr::Array(Box::new(t)), b))
                .collect()),
            (TypeExpr::Array(_), TypeExpr::Nominal { class, .. })
            | (TypeExpr::Nominal { class, .. }, TypeExpr::Array(_)) => {
                let mut out: Vec<(TypeExpr, Binding)> = Vec::new();
                let mut universal = vec![self.hierarchy.root()];
                universal.extend(self.hierarchy.marker_interfaces());
                for candidate in universal {
                    if self.hierarchy.is_subtype_or_self(class, &candidate) {
                        let ty = TypeExpr::Nominal {
                            class: candidate,
                            args: Substitution::empty(),
                        };
                        if !out.iter().any(|(t, _)| *t == ty) {
                            out.push((ty, self.empty()));
                        }
                    }
                }
                Ok(out)
            }
            (
                TypeExpr::Nominal { class: cx, .. },
                TypeExpr::Nominal { class: cy, .. },
            ) if cx == cy => match self.merge_same_class(x, y)? {
                Some(pair) => Ok(vec![pair]),
                None => Ok(vec![(
                    TypeExpr::Nominal {
                        class: cx.clone(),
                        args: Substitution::empty(),
                    },
                    self.empty(),
                )]),
            },
            (
                TypeExpr::Nominal { class: cx, args: ax },
                TypeExpr::Nominal { class: cy, args: ay },
            ) => {
                let mut out: Vec<(TypeExpr, Binding)> = Vec::new();
                for ancestor in lattice::minimal_common_ancestors(self.hierarchy, cx, cy) {
                    let xa = self.viewed_as(cx, ax, &ancestor);
                    let ya = self.viewed_as(cy, ay, &ancestor);
                    let pair = match self.merge_same_class(&xa, &ya)? {
                        Some(pair) => pair,
                        None => (
                            TypeExpr::Nominal {
                                class: ancestor,
                                args: Substitution::empty(),
                            },
                            self.empty(),
                        ),
                    };
                    if !out.iter().any(|(t, _)| *t == pair.0) {
                        out.push(pair);
                    }
                }
                Ok(out)
            }
            _ => Ok(Vec::new()),
        }
    }

    /// Shared structural descent classifying `(x, y)` into the four
    /// variable/type shapes and delegating the variable-involving ones to
    /// the policy
    fn balance(
        &self,
        x: &TypeExpr,
        y: &TypeExpr,
        policy: &dyn Balancer,
        aux: Option<&mut Vec<Constraint>>,
    ) -> ResolveResult<Option<Binding>> {
        match (x, y) {
            (TypeExpr::Variable(vx), TypeExpr::Variable(vy)) => {
                policy.var_var(self, *vx, *vy, aux)
            }
            (TypeExpr::Variable(vx), _) => policy.var_type(self, *vx, y, aux),
            (_, TypeExpr::Variable(vy)) => policy.type_var(self, x, *vy, aux),
            _ => self.balance_types(x, y, policy, aux),
        }
    }

    /// The policy-independent `(type, type)` shape
    fn balance_types(
        &self,
        x: &TypeExpr,
        y: &TypeExpr,
        policy: &dyn Balancer,
        mut aux: Option<&mut Vec<Constraint>>,
    ) -> ResolveResult<Option<Binding>> {
        if x == y {
            return Ok(Some(self.empty()));
        }
        match (x, y) {
            (TypeExpr::Bottom, _) => Ok(Some(self.empty())),
            (_, TypeExpr::Bottom) => Ok(None),
            (TypeExpr::Null, TypeExpr::Nominal { .. } | TypeExpr::Array(_)) => {
                Ok(Some(self.empty()))
            }

            // the 3x3 wildcard unfolding: each case either resolves
            // directly or defers a derived constraint on the bounds
            (
                TypeExpr::Wildcard {
                    direction: dx,
                    bound: bx,
                },
                TypeExpr::Wildcard {
                    direction: dy,
                    bound: by,
                },
            ) => {
                let bx = self.wildcard_bound(bx);
                let by = self.wildcard_bound(by);
                match (dx, dy) {
                    (WildcardDirection::Extends, WildcardDirection::Extends) => {
                        self.defer(aux, bx, by)
                    }
                    (WildcardDirection::Super, WildcardDirection::Super) => {
                        self.defer(aux, by, bx)
                    }
                    (WildcardDirection::Super, WildcardDirection::Extends) => {
                        if by == self.root_type() {
                            Ok(Some(self.empty()))
                        } else {
                            Ok(None)
                        }
                    }
                    (WildcardDirection::Extends, WildcardDirection::Super) => Ok(None),
                }
            }
            (_, TypeExpr::Wildcard { direction, bound }) => {
                let bound = self.wildcard_bound(bound);
                match direction {
                    WildcardDirection::Extends => self.defer(aux, x.clone(), bound),
                    WildcardDirection::Super => self.defer(aux, bound, x.clone()),
                }
            }
            (TypeExpr::Wildcard { direction, bound }, _) => {
                let bound = self.wildcard_bound(bound);
                match direction {
                    WildcardDirection::Extends => self.defer(aux, bound, y.clone()),
                    WildcardDirection::Super => {
                        if *y == self.root_type() {
                            Ok(Some(self.empty()))
                        } else {
                            Ok(None)
                        }
                    }
                }
            }

            (TypeExpr::Array(cx), TypeExpr::Array(cy)) => self.balance(cx, cy, policy, aux),
            (TypeExpr::Array(_), TypeExpr::Nominal { class, .. }) => {
                if self.hierarchy.is_root_or_marker(class) {
                    Ok(Some(self.empty()))
                } else {
                    Ok(None)
                }
            }

            (
                TypeExpr::Nominal { class: cx, args: ax },
                TypeExpr::Nominal { class: cy, args: ay },
            ) => {
                let viewed = if cx == cy {
                    ax.clone()
                } else {
                    if !self.hierarchy.is_subtype_or_self(cx, cy) {
                        return Ok(None);
                    }
                    self.hierarchy
                        .convert_substitution(cx, cy, ax)
                        .unwrap_or_else(Substitution::empty)
                };
                let mut acc = self.empty();
                for (param, yarg) in ay.iter() {
                    // a raw hole on the lower side is an erased argument
                    let xarg = viewed.get(param).cloned().unwrap_or(TypeExpr::Bottom);
                    match self.balance(&xarg, yarg, policy, aux.as_deref_mut())? {
                        Some(b) => match acc.compose(&b, self.hierarchy)? {
                            Some(next) => acc = next,
                            None => return Ok(None),
                        },
                        None => return Ok(None),
                    }
                }
                Ok(Some(acc))
            }

            _ => Ok(None),
        }
    }

    /// One candidate for two instantiations of the same class, merging
    /// arguments through `rise` in whichever direction admits one
    fn merge_same_class(
        &self,
        x: &TypeExpr,
        y: &TypeExpr,
    ) -> ResolveResult<Option<(TypeExpr, Binding)>> {
        if let Some(b) = self.rise(x, y, None)? {
            let merged = b.apply(y);
            return Ok(Some((merged, b)));
        }
        if let Some(b) = self.rise(y, x, None)? {
            let merged = b.apply(x);
            return Ok(Some((merged, b)));
        }
        Ok(None)
    }

    /// `class<args>` re-expressed as an instantiation of `target`, raw
    /// when the snapshot has no projection
    fn viewed_as(&self, class: &ClassId, args: &Substitution, target: &ClassId) -> TypeExpr {
        TypeExpr::Nominal {
            class: target.clone(),
            args: self
                .hierarchy
                .convert_substitution(class, target, args)
                .unwrap_or_else(Substitution::empty),
        }
    }

    fn defer(
        &self,
        aux: Option<&mut Vec<Constraint>>,
        lower: TypeExpr,
        upper: TypeExpr,
    ) -> ResolveResult<Option<Binding>> {
        if lower == upper {
            return Ok(Some(self.empty()));
        }
        match aux {
            Some(list) => {
                list.push(Constraint::new(lower, upper));
                Ok(Some(self.empty()))
            }
            None => Ok(None),
        }
    }

    fn wildcard_bound(&self, bound: &Option<Box<TypeExpr>>) -> TypeExpr {
        bound
            .as_ref()
            .map(|b| (**b).clone())
            .unwrap_or_else(|| self.root_type())
    }

    fn root_type(&self) -> TypeExpr {
        TypeExpr::Nominal {
            class: self.hierarchy.root(),
            args: Substitution::empty(),
        }
    }

    fn empty(&self) -> Binding {
        Binding::empty(Rc::clone(&self.universe))
    }

    fn singleton(&self, var: VarId, ty: TypeExpr) -> ResolveResult<Binding> {
        Binding::singleton(Rc::clone(&self.universe), var, ty)
    }

    fn fresh_variable(&self) -> VarId {
        self.universe.fresh()
    }
}
