//! Resolver search tree
//!
//! A state machine over constraint shapes, re-evaluated after every
//! binding application: each node holds an accumulated binding and a
//! residual constraint set, applies one reduction rule, spawns one child
//! per admissible candidate binding, and recurses depth-first. Leaves
//! with no constraints left register their binding as a solution; a node
//! whose reduction yields no children is a dead end and contributes
//! nothing.

use crate::binding::Binding;
use crate::error::{ResolveError, ResolveResult};
use crate::factory::BindingFactory;
use crate::hierarchy::ClassHierarchy;
use crate::lattice;
use crate::solutions::SolutionHolder;
use crate::types::{
    Constraint, ConstraintSystem, Substitution, TypeExpr, VarId, VariableUniverse,
};
use indexmap::IndexSet;
use petgraph::algo::tarjan_scc;
use petgraph::graphmap::DiGraphMap;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

/// Options recognized by the resolver
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolverSettings {
    /// Explore every branch and keep the non-dominated solution set
    /// instead of stopping at the first success
    pub exhaustive: bool,
    /// Offer wildcard-parameterized candidates alongside concrete ones
    pub cook_to_wildcards: bool,
}

/// Per-variable well-formedness check applied to complete bindings
///
/// A fully reduced binding is excluded from the accepted-solution set
/// when any entry is inadmissible at its use site; the search itself
/// continues.
pub trait BindingValidator {
    fn is_admissible(&self, var: VarId, ty: &TypeExpr) -> bool;
}

/// Accepts every binding
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl BindingValidator for AcceptAll {
    fn is_admissible(&self, _var: VarId, _ty: &TypeExpr) -> bool {
        true
    }
}

/// Resolve a constraint system into its non-dominated solution set
pub fn resolve(
    system: &ConstraintSystem,
    settings: ResolverSettings,
    hierarchy: &dyn ClassHierarchy,
) -> ResolveResult<SolutionHolder> {
    Resolver::new(system, settings, hierarchy).run()
}

/// Which side of the shared variable a constraint pair sits on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PairSide {
    /// `var <: T1` and `var <: T2`
    Upper,
    /// `T1 <: var` and `T2 <: var`
    Lower,
}

#[derive(Debug)]
struct SharedPair {
    var: VarId,
    side: PairSide,
    first: Constraint,
    second: Constraint,
}

/// Depth-first resolver over one constraint system
pub struct Resolver<'a> {
    hierarchy: &'a dyn ClassHierarchy,
    factory: BindingFactory<'a>,
    settings: ResolverSettings,
    validator: &'a dyn BindingValidator,
    cancel: Option<Arc<AtomicBool>>,
    universe: Rc<VariableUniverse>,
    constraints: IndexSet<Constraint>,
    solutions: SolutionHolder,
}

impl<'a> Resolver<'a> {
    pub fn new(
        system: &ConstraintSystem,
        settings: ResolverSettings,
        hierarchy: &'a dyn ClassHierarchy,
    ) -> Self {
        Self {
            hierarchy,
            factory: BindingFactory::new(hierarchy, Rc::clone(&system.universe)),
            settings,
            validator: &AcceptAll,
            cancel: None,
            universe: Rc::clone(&system.universe),
            constraints: system.constraints.clone(),
            solutions: SolutionHolder::new(),
        }
    }

    /// Exclude bindings the embedder considers illegal at their use sites
    pub fn with_validator(mut self, validator: &'a dyn BindingValidator) -> Self {
        self.validator = validator;
        self
    }

    /// Cooperative cancellation, checked between reduction steps
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Run the search to exhaustion (or cancellation) and return every
    /// solution collected
    pub fn run(mut self) -> ResolveResult<SolutionHolder> {
        let root = Binding::empty(Rc::clone(&self.universe));
        let constraints = simplify(self.constraints.clone());
        self.explore(root, constraints)?;
        Ok(self.solutions)
    }

    fn explore(
        &mut self,
        binding: Binding,
        constraints: IndexSet<Constraint>,
    ) -> ResolveResult<bool> {
        if let Some(flag) = &self.cancel {
            if flag.load(Ordering::Relaxed) {
                trace!("search cancelled");
                return Ok(false);
            }
        }
        if binding.is_cyclic() {
            return self.reduce_cycles(binding, constraints);
        }
        if constraints.is_empty() {
            return Ok(self.register(binding));
        }
        if let Some(constraint) = self.find_type_type(&constraints) {
            return self.reduce_type_type(binding, constraints, constraint);
        }
        if let Some((var, lower, upper)) = self.find_interval(&constraints) {
            return self.reduce_interval(binding, constraints, var, lower, upper);
        }
        if let Some(pair) = self.find_same_side_pair(&constraints) {
            return self.reduce_pair(binding, constraints, pair);
        }
        if let Some(constraint) = self.find_terminal(&constraints) {
            return self.reduce_terminal(binding, constraints, constraint);
        }
        if constraints
            .iter()
            .any(|c| c.lower.as_variable().is_some() && c.upper.as_variable().is_some())
        {
            return self.reduce_cycles(binding, constraints);
        }
        self.reduce_bottom_default(binding, constraints)
    }

    /// Compose a candidate into the accumulated binding, rebuild the
    /// residual constraint set, and recurse
    fn spawn(
        &mut self,
        parent: &Binding,
        constraints: &IndexSet<Constraint>,
        remove: &[&Constraint],
        candidate: Binding,
        extra: Vec<Constraint>,
    ) -> ResolveResult<bool> {
        let Some(child) = parent.compose(&candidate, self.hierarchy)? else {
            return Ok(false);
        };
        let mut next = IndexSet::new();
        for constraint in constraints {
            if remove.iter().any(|r| *r == constraint) {
                continue;
            }
            next.insert(Constraint::new(
                child.apply(&constraint.lower),
                child.apply(&constraint.upper),
            ));
        }
        for constraint in extra {
            next.insert(Constraint::new(
                child.apply(&constraint.lower),
                child.apply(&constraint.upper),
            ));
        }
        self.explore(child, simplify(next))
    }

    fn register(&mut self, binding: Binding) -> bool {
        for (var, ty) in binding.entries() {
            if !self.validator.is_admissible(var, ty) {
                debug!(solution = %binding, variable = %var, "discarding inadmissible solution");
                return false;
            }
        }
        debug!(solution = %binding, "registering solution");
        self.solutions.insert(binding, self.hierarchy);
        true
    }

    /// Rule 1: collapse strongly connected components of the
    /// variable-to-variable constraint graph onto one representative
    fn reduce_cycles(
        &mut self,
        binding: Binding,
        constraints: IndexSet<Constraint>,
    ) -> ResolveResult<bool> {
        let was_cyclic = binding.is_cyclic();
        let cleared = binding.cleared_cyclic();

        let mut graph: DiGraphMap<VarId, ()> = DiGraphMap::new();
        for constraint in &constraints {
            if let (Some(a), Some(b)) = (
                constraint.lower.as_variable(),
                constraint.upper.as_variable(),
            ) {
                if a != b {
                    graph.add_edge(a, b, ());
                }
            }
        }
        for (var, ty) in cleared.entries() {
            if let Some(target) = ty.as_variable() {
                if var != target {
                    graph.add_edge(var, target, ());
                }
            }
        }

        let mut redirect: BTreeMap<VarId, VarId> = BTreeMap::new();
        for component in tarjan_scc(&graph) {
            if component.len() < 2 {
                continue;
            }
            let representative = *component.iter().min().expect("non-empty component");
            for member in component {
                if member != representative {
                    redirect.insert(member, representative);
                }
            }
        }

        if redirect.is_empty() {
            // flag consumed, nothing to collapse
            return if was_cyclic {
                self.explore(cleared, constraints)
            } else {
                self.reduce_bottom_default(cleared, constraints)
            };
        }
        trace!(collapsed = redirect.len(), "eliminating variable cycles");

        let mut collapse = Binding::empty(Rc::clone(&self.universe));
        for (member, representative) in &redirect {
            collapse = collapse.bind(*member, TypeExpr::Variable(*representative))?;
        }

        // rebuild the accumulated binding under the collapse
        let mut merged = collapse.clone();
        for (var, ty) in cleared.entries() {
            let target = *redirect.get(&var).unwrap_or(&var);
            let rewritten = collapse.apply(ty);
            if rewritten == TypeExpr::Variable(target) {
                continue;
            }
            match merged.get(target) {
                None => merged = merged.bind(target, rewritten)?,
                Some(existing) if *existing == rewritten => {}
                Some(TypeExpr::Variable(_)) => merged = merged.bind(target, rewritten)?,
                Some(_) => {
                    return Err(ResolveError::InconsistentCycleCollapse { var: target });
                }
            }
        }

        let next: IndexSet<Constraint> = constraints
            .iter()
            .map(|c| Constraint::new(collapse.apply(&c.lower), collapse.apply(&c.upper)))
            .collect();
        self.explore(merged.cleared_cyclic(), simplify(next))
    }

    /// Rule 2: a constraint with no bare variable on either side reduces
    /// through rise, sink, and (in wildcard mode) rise-with-wildcard
    fn reduce_type_type(
        &mut self,
        binding: Binding,
        constraints: IndexSet<Constraint>,
        constraint: Constraint,
    ) -> ResolveResult<bool> {
        trace!(%constraint, "reducing type/type constraint");
        let mut candidates: Vec<(Binding, Vec<Constraint>)> = Vec::new();

        let mut rise_aux = Vec::new();
        let rise = self
            .factory
            .rise(&constraint.lower, &constraint.upper, Some(&mut rise_aux))?;
        if let Some(b) = &rise {
            candidates.push((b.clone(), rise_aux));
        }

        if self.settings.cook_to_wildcards {
            let mut aux = Vec::new();
            if let Some(b) =
                self.factory
                    .rise_with_wildcard(&constraint.lower, &constraint.upper, &mut aux)?
            {
                // structurally equal to rise's result: drop this branch
                if candidates.iter().all(|(held, _)| *held != b) {
                    candidates.push((b, aux));
                }
            }
        }

        // a fully decided rise dominates the conservative fallback
        let rise_decided = rise.as_ref().map(Binding::is_decided).unwrap_or(false);
        if self.settings.exhaustive || !rise_decided {
            let mut aux = Vec::new();
            if let Some(b) = self
                .factory
                .sink(&constraint.lower, &constraint.upper, Some(&mut aux))?
            {
                if candidates.iter().all(|(held, _)| *held != b) {
                    candidates.push((b, aux));
                }
            }
        }

        let mut found = false;
        for (candidate, aux) in candidates {
            found |= self.spawn(&binding, &constraints, &[&constraint], candidate, aux)?;
            if found && !self.settings.exhaustive {
                return Ok(true);
            }
        }
        Ok(found)
    }

    /// Rule 3: a variable bounded from both sides binds to each member of
    /// the inheritance range between its bounds
    fn reduce_interval(
        &mut self,
        binding: Binding,
        constraints: IndexSet<Constraint>,
        var: VarId,
        lower_constraint: Constraint,
        upper_constraint: Constraint,
    ) -> ResolveResult<bool> {
        let lower = lower_constraint.lower.clone();
        let upper = upper_constraint.upper.clone();
        trace!(%var, %lower, %upper, "reducing interval constraint");
        let remove = [&lower_constraint, &upper_constraint];

        if lower == upper {
            let candidate = Binding::singleton(Rc::clone(&self.universe), var, lower)?;
            return self.spawn(&binding, &constraints, &remove, candidate, Vec::new());
        }

        // the correction binds variables occurring inside the bounds
        let mut aux = Vec::new();
        let correction = match self.factory.rise(&lower, &upper, Some(&mut aux))? {
            Some(b) => b,
            None => {
                aux.clear();
                match self.factory.sink(&lower, &upper, Some(&mut aux))? {
                    Some(b) => b,
                    None => return Ok(false),
                }
            }
        };

        let mut found = false;
        for (ty, extra) in self.interval_candidates(&lower, &upper)? {
            let candidate = Binding::singleton(Rc::clone(&self.universe), var, ty)?;
            let Some(candidate) = candidate.compose(&correction, self.hierarchy)? else {
                continue;
            };
            let mut carried = aux.clone();
            carried.extend(extra);
            found |= self.spawn(&binding, &constraints, &remove, candidate, carried)?;
            if found && !self.settings.exhaustive {
                return Ok(true);
            }
        }
        Ok(found)
    }

    /// Rule 5: two constraints bounding the same variable from the same
    /// side collapse through intersect/union into one candidate each
    fn reduce_pair(
        &mut self,
        binding: Binding,
        constraints: IndexSet<Constraint>,
        pair: SharedPair,
    ) -> ResolveResult<bool> {
        let candidates = match pair.side {
            PairSide::Upper => self
                .factory
                .intersect(&pair.first.upper, &pair.second.upper)?,
            PairSide::Lower => self.factory.union(&pair.first.lower, &pair.second.lower)?,
        };
        trace!(
            var = %pair.var,
            count = candidates.len(),
            "reducing same-side constraint pair"
        );
        let remove = [&pair.first, &pair.second];
        let var_ty = TypeExpr::Variable(pair.var);
        let mut found = false;
        for (ty, candidate) in candidates {
            let replacement = match pair.side {
                PairSide::Upper => Constraint::new(var_ty.clone(), ty),
                PairSide::Lower => Constraint::new(ty, var_ty.clone()),
            };
            found |= self.spawn(&binding, &constraints, &remove, candidate, vec![replacement])?;
            if found && !self.settings.exhaustive {
                return Ok(true);
            }
        }
        Ok(found)
    }

    /// Rule 4: a chain terminal with a concrete bound enumerates the
    /// hierarchy range from the bound up to the universal root
    fn reduce_terminal(
        &mut self,
        binding: Binding,
        constraints: IndexSet<Constraint>,
        constraint: Constraint,
    ) -> ResolveResult<bool> {
        let (var, bound) = match (
            constraint.lower.as_variable(),
            constraint.upper.as_variable(),
        ) {
            (Some(v), None) => (v, constraint.upper.clone()),
            (None, Some(v)) => (v, constraint.lower.clone()),
            _ => unreachable!("terminal constraints have exactly one bare variable side"),
        };
        trace!(%var, %bound, "reducing terminal constraint");

        let mut candidates: Vec<(TypeExpr, Vec<Constraint>)> = Vec::new();
        match &bound {
            TypeExpr::Nominal { class, args } => {
                for ancestor in lattice::ancestors_or_self(self.hierarchy, class) {
                    let converted = self
                        .hierarchy
                        .convert_substitution(class, &ancestor, args)
                        .unwrap_or_else(Substitution::empty);
                    let ty = TypeExpr::Nominal {
                        class: ancestor,
                        args: converted,
                    };
                    if candidates.iter().any(|(t, _)| *t == ty) {
                        continue;
                    }
                    let wildcarded = if self.settings.cook_to_wildcards {
                        self.wildcardized(&ty)
                    } else {
                        None
                    };
                    candidates.push((ty, Vec::new()));
                    if let Some(variant) = wildcarded {
                        candidates.push(variant);
                    }
                }
            }
            TypeExpr::Array(_) => {
                candidates.push((bound.clone(), Vec::new()));
                for marker in self.hierarchy.marker_interfaces() {
                    candidates.push((
                        TypeExpr::Nominal {
                            class: marker,
                            args: Substitution::empty(),
                        },
                        Vec::new(),
                    ));
                }
                candidates.push((
                    TypeExpr::Nominal {
                        class: self.hierarchy.root(),
                        args: Substitution::empty(),
                    },
                    Vec::new(),
                ));
            }
            TypeExpr::Primitive(_) | TypeExpr::Bottom | TypeExpr::Null => {
                candidates.push((bound.clone(), Vec::new()));
            }
            TypeExpr::Variable(_) | TypeExpr::Wildcard { .. } => {}
        }

        // exhaustive mode: a variable whose only constraint equates it to
        // a fully erased use of a class may erase outright
        if self.settings.exhaustive
            && is_fully_erased_nominal(&bound)
            && self.is_only_constraint_on(&constraints, &constraint, var)
        {
            candidates.push((TypeExpr::Bottom, Vec::new()));
        }

        let remove = [&constraint];
        let mut found = false;
        for (ty, extra) in candidates {
            let candidate = Binding::singleton(Rc::clone(&self.universe), var, ty)?;
            found |= self.spawn(&binding, &constraints, &remove, candidate, extra)?;
            if found && !self.settings.exhaustive {
                return Ok(true);
            }
        }
        Ok(found)
    }

    /// Rule 4 fallback: every variable with no lower-bound constraint
    /// defaults to `Bottom` in a single child
    fn reduce_bottom_default(
        &mut self,
        binding: Binding,
        constraints: IndexSet<Constraint>,
    ) -> ResolveResult<bool> {
        let mut with_lower_bound: BTreeSet<VarId> = BTreeSet::new();
        let mut mentioned: BTreeSet<VarId> = BTreeSet::new();
        for constraint in &constraints {
            if let Some(var) = constraint.upper.as_variable() {
                with_lower_bound.insert(var);
            }
            constraint.lower.collect_variables(&mut mentioned);
            constraint.upper.collect_variables(&mut mentioned);
        }
        let defaulted: Vec<VarId> = mentioned
            .difference(&with_lower_bound)
            .filter(|var| !binding.binds(**var))
            .copied()
            .collect();
        if defaulted.is_empty() {
            trace!("dead end: no defaultable variables");
            return Ok(false);
        }
        trace!(count = defaulted.len(), "defaulting unbounded variables to bottom");
        let mut fallback = Binding::empty(Rc::clone(&self.universe));
        for var in defaulted {
            fallback = fallback.bind(var, TypeExpr::Bottom)?;
        }
        self.spawn(&binding, &constraints, &[], fallback, Vec::new())
    }

    fn find_type_type(&self, constraints: &IndexSet<Constraint>) -> Option<Constraint> {
        constraints
            .iter()
            .find(|c| c.lower.as_variable().is_none() && c.upper.as_variable().is_none())
            .cloned()
    }

    fn find_interval(
        &self,
        constraints: &IndexSet<Constraint>,
    ) -> Option<(VarId, Constraint, Constraint)> {
        for upper_c in constraints {
            let Some(var) = upper_c.lower.as_variable() else {
                continue;
            };
            if upper_c.upper.as_variable().is_some() || upper_c.upper.contains_variable(var) {
                continue;
            }
            for lower_c in constraints {
                if lower_c.upper.as_variable() == Some(var)
                    && lower_c.lower.as_variable().is_none()
                    && !lower_c.lower.contains_variable(var)
                {
                    return Some((var, lower_c.clone(), upper_c.clone()));
                }
            }
        }
        None
    }

    fn find_same_side_pair(&self, constraints: &IndexSet<Constraint>) -> Option<SharedPair> {
        let mut uppers: BTreeMap<VarId, Vec<&Constraint>> = BTreeMap::new();
        let mut lowers: BTreeMap<VarId, Vec<&Constraint>> = BTreeMap::new();
        for constraint in constraints {
            if let Some(var) = constraint.lower.as_variable() {
                if constraint.upper.as_variable().is_none()
                    && !constraint.upper.contains_variable(var)
                {
                    uppers.entry(var).or_default().push(constraint);
                }
            }
            if let Some(var) = constraint.upper.as_variable() {
                if constraint.lower.as_variable().is_none()
                    && !constraint.lower.contains_variable(var)
                {
                    lowers.entry(var).or_default().push(constraint);
                }
            }
        }
        for (var, found) in &uppers {
            if found.len() >= 2 {
                return Some(SharedPair {
                    var: *var,
                    side: PairSide::Upper,
                    first: found[0].clone(),
                    second: found[1].clone(),
                });
            }
        }
        for (var, found) in &lowers {
            if found.len() >= 2 {
                return Some(SharedPair {
                    var: *var,
                    side: PairSide::Lower,
                    first: found[0].clone(),
                    second: found[1].clone(),
                });
            }
        }
        None
    }

    fn find_terminal(&self, constraints: &IndexSet<Constraint>) -> Option<Constraint> {
        constraints
            .iter()
            .find(|c| match (c.lower.as_variable(), c.upper.as_variable()) {
                (Some(var), None) => {
                    is_enumerable_bound(&c.upper) && !c.upper.contains_variable(var)
                }
                (None, Some(var)) => {
                    is_enumerable_bound(&c.lower) && !c.lower.contains_variable(var)
                }
                _ => false,
            })
            .cloned()
    }

    /// Range members between an interval's bounds, most precise first,
    /// always covering both bounds themselves
    fn interval_candidates(
        &self,
        lower: &TypeExpr,
        upper: &TypeExpr,
    ) -> ResolveResult<Vec<(TypeExpr, Vec<Constraint>)>> {
        let mut types: Vec<TypeExpr> = Vec::new();
        if let (
            TypeExpr::Nominal { class: lc, args: la },
            TypeExpr::Nominal { class: uc, args: ua },
        ) = (lower, upper)
        {
            for class in lattice::classes_between(self.hierarchy, lc, uc) {
                let args = self
                    .hierarchy
                    .convert_substitution(uc, &class, ua)
                    .or_else(|| self.hierarchy.convert_substitution(lc, &class, la))
                    .unwrap_or_else(Substitution::empty);
                let ty = TypeExpr::Nominal { class, args };
                if !types.contains(&ty) {
                    types.push(ty);
                }
            }
        }
        if !types.contains(lower) {
            types.push(lower.clone());
        }
        if !types.contains(upper) {
            types.push(upper.clone());
        }

        let mut out = Vec::with_capacity(types.len());
        for ty in types {
            let wildcarded = if self.settings.cook_to_wildcards {
                self.wildcardized(&ty)
            } else {
                None
            };
            out.push((ty, Vec::new()));
            if let Some(variant) = wildcarded {
                out.push(variant);
            }
        }
        Ok(out)
    }

    /// A wildcard-parameterized variant of `ty`: each concrete argument
    /// becomes `? extends f` for a fresh existential `f` tied to the real
    /// argument by an auxiliary constraint
    fn wildcardized(&self, ty: &TypeExpr) -> Option<(TypeExpr, Vec<Constraint>)> {
        let TypeExpr::Nominal { class, args } = ty else {
            return None;
        };
        if args.is_raw() {
            return None;
        }
        let mut aux = Vec::new();
        let mut wildcarded = Substitution::empty();
        for (param, arg) in args.iter() {
            if matches!(arg, TypeExpr::Wildcard { .. }) {
                wildcarded.insert(param.clone(), arg.clone());
                continue;
            }
            let fresh = self.universe.fresh();
            aux.push(Constraint::new(TypeExpr::Variable(fresh), arg.clone()));
            wildcarded.insert(
                param.clone(),
                TypeExpr::wildcard_extends(TypeExpr::Variable(fresh)),
            );
        }
        Some((
            TypeExpr::Nominal {
                class: class.clone(),
                args: wildcarded,
            },
            aux,
        ))
    }

    fn is_only_constraint_on(
        &self,
        constraints: &IndexSet<Constraint>,
        constraint: &Constraint,
        var: VarId,
    ) -> bool {
        constraints
            .iter()
            .filter(|c| c.lower.contains_variable(var) || c.upper.contains_variable(var))
            .all(|c| c == constraint)
    }
}

/// Trivially satisfied constraints disappear from the residual set
fn simplify(constraints: IndexSet<Constraint>) -> IndexSet<Constraint> {
    constraints
        .into_iter()
        .filter(|c| !is_trivial(c))
        .collect()
}

fn is_trivial(constraint: &Constraint) -> bool {
    constraint.lower == constraint.upper
        || matches!(constraint.lower, TypeExpr::Bottom)
        || (matches!(constraint.lower, TypeExpr::Null)
            && !matches!(constraint.upper, TypeExpr::Primitive(_)))
}

fn is_enumerable_bound(ty: &TypeExpr) -> bool {
    matches!(
        ty,
        TypeExpr::Nominal { .. }
            | TypeExpr::Array(_)
            | TypeExpr::Primitive(_)
            | TypeExpr::Bottom
            | TypeExpr::Null
    )
}

/// A class instantiation every argument of which is already erased
fn is_fully_erased_nominal(ty: &TypeExpr) -> bool {
    match ty {
        TypeExpr::Nominal { args, .. } => {
            !args.is_raw() && args.iter().all(|(_, t)| t.is_bottom())
        }
        _ => false,
    }
}
