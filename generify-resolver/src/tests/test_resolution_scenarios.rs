//! End-to-end resolution scenarios

use crate::hierarchy::TableHierarchy;
use crate::resolver::{resolve, BindingValidator, Resolver, ResolverSettings};
use crate::types::{ConstraintSystem, TypeExpr, VarId, VariableUniverse};
use pretty_assertions::assert_eq;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

fn animals() -> TableHierarchy {
    let mut h = TableHierarchy::new("Object");
    h.class("Animal", &[]);
    h.class("Dog", &[]);
    h.extends("Dog", "Animal", &[]);
    h
}

fn collections() -> TableHierarchy {
    let mut h = animals();
    h.class("Collection", &["E"]);
    h.class("List", &["E"]);
    h.extends("List", "Collection", &[("E", "E")]);
    h.class("Comparable", &["T"]);
    h.class("Container", &["E"]);
    h
}

#[test]
fn interval_resolution_picks_the_most_precise_member_first() {
    // Dog <: v0, v0 <: Animal
    let h = animals();
    let universe = VariableUniverse::with_variables(1);
    let mut system = ConstraintSystem::new(universe);
    system.add(TypeExpr::nominal("Dog"), TypeExpr::variable(0));
    system.add(TypeExpr::variable(0), TypeExpr::nominal("Animal"));

    let solutions = resolve(&system, ResolverSettings::default(), &h).unwrap();
    assert_eq!(solutions.len(), 1);
    let best = solutions.best_solution().unwrap();
    assert_eq!(best.get(VarId(0)), Some(&TypeExpr::nominal("Dog")));
}

#[test]
fn exhaustive_interval_resolution_collapses_to_the_dominating_member() {
    let h = animals();
    let universe = VariableUniverse::with_variables(1);
    let mut system = ConstraintSystem::new(universe);
    system.add(TypeExpr::nominal("Dog"), TypeExpr::variable(0));
    system.add(TypeExpr::variable(0), TypeExpr::nominal("Animal"));

    let settings = ResolverSettings {
        exhaustive: true,
        ..ResolverSettings::default()
    };
    let solutions = resolve(&system, settings, &h).unwrap();
    // both Dog and Animal are explored, and Dog dominates
    assert_eq!(solutions.len(), 1);
    assert_eq!(
        solutions.best_solution().unwrap().get(VarId(0)),
        Some(&TypeExpr::nominal("Dog"))
    );
}

/// Rejects one specific assignment for one variable
struct Reject(VarId, TypeExpr);

impl BindingValidator for Reject {
    fn is_admissible(&self, var: VarId, ty: &TypeExpr) -> bool {
        var != self.0 || *ty != self.1
    }
}

#[test]
fn interval_enumeration_covers_both_bounds() {
    // with the lower bound vetoed, the upper bound itself must be offered
    let h = animals();
    let universe = VariableUniverse::with_variables(1);
    let mut system = ConstraintSystem::new(universe);
    system.add(TypeExpr::nominal("Dog"), TypeExpr::variable(0));
    system.add(TypeExpr::variable(0), TypeExpr::nominal("Animal"));

    let veto = Reject(VarId(0), TypeExpr::nominal("Dog"));
    let solutions = Resolver::new(&system, ResolverSettings::default(), &h)
        .with_validator(&veto)
        .run()
        .unwrap();
    assert_eq!(
        solutions.best_solution().unwrap().get(VarId(0)),
        Some(&TypeExpr::nominal("Animal"))
    );
}

#[test]
fn shared_upper_bounds_meet_through_the_same_class_path() {
    // v0 <: Comparable<Dog>, v0 <: Comparable<Animal>
    let h = collections();
    let universe = VariableUniverse::with_variables(1);
    let mut system = ConstraintSystem::new(universe);
    system.add(
        TypeExpr::variable(0),
        TypeExpr::nominal_with("Comparable", vec![("T", TypeExpr::nominal("Dog"))]),
    );
    system.add(
        TypeExpr::variable(0),
        TypeExpr::nominal_with("Comparable", vec![("T", TypeExpr::nominal("Animal"))]),
    );

    let solutions = resolve(&system, ResolverSettings::default(), &h).unwrap();
    assert_eq!(solutions.len(), 1);
    assert_eq!(
        solutions.best_solution().unwrap().get(VarId(0)),
        Some(&TypeExpr::nominal_with(
            "Comparable",
            vec![("T", TypeExpr::nominal("Animal"))]
        ))
    );
}

#[test]
fn self_referential_constraints_erase_to_bottom() {
    // v0 <: Container<v0>
    let h = collections();
    let universe = VariableUniverse::with_variables(1);
    let mut system = ConstraintSystem::new(universe);
    system.add(
        TypeExpr::variable(0),
        TypeExpr::nominal_with("Container", vec![("E", TypeExpr::variable(0))]),
    );

    let solutions = resolve(&system, ResolverSettings::default(), &h).unwrap();
    assert_eq!(solutions.len(), 1);
    assert_eq!(
        solutions.best_solution().unwrap().get(VarId(0)),
        Some(&TypeExpr::Bottom)
    );
}

#[test]
fn variable_cycles_collapse_onto_one_representative() {
    // v0 <: v1, v1 <: v0
    let h = animals();
    let universe = VariableUniverse::with_variables(2);
    let mut system = ConstraintSystem::new(universe);
    system.add(TypeExpr::variable(0), TypeExpr::variable(1));
    system.add(TypeExpr::variable(1), TypeExpr::variable(0));

    let solutions = resolve(&system, ResolverSettings::default(), &h).unwrap();
    assert_eq!(solutions.len(), 1);
    let best = solutions.best_solution().unwrap();
    assert_eq!(best.get(VarId(1)), Some(&TypeExpr::variable(0)));
    assert_eq!(best.get(VarId(0)), None);
}

/// Accepts only wildcard-parameterized collection types for `v0`
struct RequireWildcardCollection;

impl BindingValidator for RequireWildcardCollection {
    fn is_admissible(&self, var: VarId, ty: &TypeExpr) -> bool {
        if var != VarId(0) {
            return true;
        }
        match ty {
            TypeExpr::Nominal { class, args } => {
                class.name() == "Collection"
                    && !args.is_raw()
                    && args.iter().all(|(_, t)| matches!(t, TypeExpr::Wildcard { .. }))
            }
            _ => false,
        }
    }
}

#[test]
fn wildcard_mode_produces_existential_solutions_instead_of_failing() {
    // List <: v0, v0 <: Collection<Animal>, where a concrete argument is
    // inadmissible at the use site
    let h = collections();
    let universe = VariableUniverse::with_variables(1);
    let mut system = ConstraintSystem::new(universe);
    system.add(TypeExpr::nominal("List"), TypeExpr::variable(0));
    system.add(
        TypeExpr::variable(0),
        TypeExpr::nominal_with("Collection", vec![("E", TypeExpr::nominal("Animal"))]),
    );

    let settings = ResolverSettings {
        cook_to_wildcards: true,
        ..ResolverSettings::default()
    };
    let validator = RequireWildcardCollection;
    let solutions = Resolver::new(&system, settings, &h)
        .with_validator(&validator)
        .run()
        .unwrap();

    let best = solutions.best_solution().expect("wildcard solution");
    let bound = best.get(VarId(0)).unwrap();
    assert_eq!(
        *bound,
        TypeExpr::nominal_with(
            "Collection",
            vec![("E", TypeExpr::wildcard_extends(TypeExpr::nominal("Animal")))]
        )
    );
}

/// Rejects every nominal assignment for one variable
struct RejectNominals(VarId);

impl BindingValidator for RejectNominals {
    fn is_admissible(&self, var: VarId, ty: &TypeExpr) -> bool {
        var != self.0 || !matches!(ty, TypeExpr::Nominal { .. })
    }
}

#[test]
fn exhaustive_mode_offers_erasure_for_fully_erased_bounds() {
    // v0 <: Container<_> where every class assignment is inadmissible
    let h = collections();
    let universe = VariableUniverse::with_variables(1);
    let mut system = ConstraintSystem::new(universe);
    system.add(
        TypeExpr::variable(0),
        TypeExpr::nominal_with("Container", vec![("E", TypeExpr::Bottom)]),
    );

    let validator = RejectNominals(VarId(0));

    // the greedy mode has no admissible candidate left
    let greedy = Resolver::new(&system, ResolverSettings::default(), &h)
        .with_validator(&validator)
        .run()
        .unwrap();
    assert!(greedy.is_empty());

    // exhaustive mode may erase the argument outright
    let settings = ResolverSettings {
        exhaustive: true,
        ..ResolverSettings::default()
    };
    let exhaustive = Resolver::new(&system, settings, &h)
        .with_validator(&validator)
        .run()
        .unwrap();
    assert_eq!(
        exhaustive.best_solution().unwrap().get(VarId(0)),
        Some(&TypeExpr::Bottom)
    );
}

#[test]
fn exhaustive_mode_retains_every_incomparable_solution() {
    let mut h = TableHierarchy::new("Object");
    h.class("Animal", &[]);
    h.class("Pet", &[]);
    h.class("Dog", &[]);
    h.extends("Dog", "Animal", &[]);
    h.extends("Dog", "Pet", &[]);

    let universe = VariableUniverse::with_variables(1);
    let mut system = ConstraintSystem::new(universe);
    system.add(TypeExpr::nominal("Dog"), TypeExpr::variable(0));

    let veto = Reject(VarId(0), TypeExpr::nominal("Dog"));
    let settings = ResolverSettings {
        exhaustive: true,
        ..ResolverSettings::default()
    };
    let solutions = Resolver::new(&system, settings, &h)
        .with_validator(&veto)
        .run()
        .unwrap();

    // Animal and Pet are incomparable; the root is dominated by both
    let bound: Vec<&TypeExpr> = solutions
        .solutions()
        .iter()
        .map(|b| b.get(VarId(0)).unwrap())
        .collect();
    assert_eq!(bound.len(), 2);
    assert!(bound.contains(&&TypeExpr::nominal("Animal")));
    assert!(bound.contains(&&TypeExpr::nominal("Pet")));
}

#[test]
fn unbounded_variables_default_to_bottom() {
    // v0 <: v1 leaves v0 without a lower bound
    let h = animals();
    let universe = VariableUniverse::with_variables(2);
    let mut system = ConstraintSystem::new(universe);
    system.add(TypeExpr::variable(0), TypeExpr::variable(1));

    let solutions = resolve(&system, ResolverSettings::default(), &h).unwrap();
    assert_eq!(solutions.len(), 1);
    let best = solutions.best_solution().unwrap();
    assert_eq!(best.get(VarId(0)), Some(&TypeExpr::Bottom));
    assert_eq!(best.get(VarId(1)), None);
}

#[test]
fn a_cancelled_search_returns_the_solutions_found_so_far() {
    let h = animals();
    let universe = VariableUniverse::with_variables(1);
    let mut system = ConstraintSystem::new(universe);
    system.add(TypeExpr::nominal("Dog"), TypeExpr::variable(0));

    let flag = Arc::new(AtomicBool::new(false));
    flag.store(true, Ordering::Relaxed);
    let solutions = Resolver::new(&system, ResolverSettings::default(), &h)
        .with_cancel_flag(Arc::clone(&flag))
        .run()
        .unwrap();
    assert!(solutions.is_empty());
}

#[test]
fn an_unsatisfiable_system_produces_no_solutions_and_no_error() {
    // String[] <: Animal has no admissible binding anywhere
    let h = animals();
    let universe = VariableUniverse::with_variables(0);
    let mut system = ConstraintSystem::new(universe);
    system.add(
        TypeExpr::array(TypeExpr::nominal("Dog")),
        TypeExpr::nominal("Animal"),
    );

    let solutions = resolve(&system, ResolverSettings::default(), &h).unwrap();
    assert!(solutions.is_empty());
}
