//! Property tests for the binding algebra

use crate::binding::{Binding, Comparison};
use crate::hierarchy::TableHierarchy;
use crate::types::{TypeExpr, VarId, VariableUniverse};
use pretty_assertions::assert_eq;
use std::rc::Rc;

fn animals() -> TableHierarchy {
    let mut h = TableHierarchy::new("Object");
    h.marker("Cloneable");
    h.marker("Serializable");
    h.class("Animal", &[]);
    h.class("Dog", &[]);
    h.extends("Dog", "Animal", &[]);
    h.class("Cat", &[]);
    h.extends("Cat", "Animal", &[]);
    h.class("List", &["E"]);
    h
}

fn sample_bindings(universe: &Rc<VariableUniverse>) -> Vec<Binding> {
    vec![
        Binding::empty(Rc::clone(universe)),
        Binding::singleton(Rc::clone(universe), VarId(0), TypeExpr::nominal("Dog")).unwrap(),
        Binding::singleton(
            Rc::clone(universe),
            VarId(1),
            TypeExpr::nominal_with("List", vec![("E", TypeExpr::nominal("Animal"))]),
        )
        .unwrap(),
        Binding::empty(Rc::clone(universe))
            .bind(VarId(0), TypeExpr::nominal("Animal"))
            .unwrap()
            .bind(VarId(2), TypeExpr::Bottom)
            .unwrap(),
        Binding::singleton(Rc::clone(universe), VarId(2), TypeExpr::array(TypeExpr::nominal("Cat")))
            .unwrap(),
    ]
}

#[test]
fn compose_with_the_empty_binding_is_identity() {
    let h = animals();
    let universe = VariableUniverse::with_variables(3);
    let empty = Binding::empty(Rc::clone(&universe));
    for b in sample_bindings(&universe) {
        assert_eq!(b.compose(&empty, &h).unwrap(), Some(b.clone()));
        assert_eq!(empty.compose(&b, &h).unwrap(), Some(b));
    }
}

#[test]
fn repeated_apply_reaches_the_substitute_fixpoint() {
    let universe = VariableUniverse::with_variables(3);
    let b = Binding::empty(Rc::clone(&universe))
        .bind(
            VarId(0),
            TypeExpr::nominal_with("List", vec![("E", TypeExpr::variable(1))]),
        )
        .unwrap()
        .bind(VarId(1), TypeExpr::nominal("Dog"))
        .unwrap();

    let ty = TypeExpr::array(TypeExpr::variable(0));
    let mut current = ty.clone();
    loop {
        let next = b.apply(&current);
        if next == current {
            break;
        }
        current = next;
    }
    assert_eq!(Some(current), b.substitute(&ty));
}

#[test]
fn compare_is_reflexive_and_antisymmetric() {
    let h = animals();
    let universe = VariableUniverse::with_variables(3);
    let bindings = sample_bindings(&universe);
    for a in &bindings {
        assert_eq!(a.compare(a, &h), Comparison::Same);
        for b in &bindings {
            match a.compare(b, &h) {
                Comparison::Better => assert_eq!(b.compare(a, &h), Comparison::Worse),
                Comparison::Worse => assert_eq!(b.compare(a, &h), Comparison::Better),
                Comparison::Same => assert_eq!(b.compare(a, &h), Comparison::Same),
                Comparison::Incomparable => {
                    assert_eq!(b.compare(a, &h), Comparison::Incomparable)
                }
            }
        }
    }
}

#[test]
fn compare_is_transitive_along_comparable_chains() {
    let h = animals();
    let universe = VariableUniverse::with_variables(1);
    let dog =
        Binding::singleton(Rc::clone(&universe), VarId(0), TypeExpr::nominal("Dog")).unwrap();
    let animal =
        Binding::singleton(Rc::clone(&universe), VarId(0), TypeExpr::nominal("Animal")).unwrap();
    let bottom = Binding::singleton(Rc::clone(&universe), VarId(0), TypeExpr::Bottom).unwrap();

    assert_eq!(dog.compare(&animal, &h), Comparison::Better);
    assert_eq!(animal.compare(&bottom, &h), Comparison::Better);
    assert_eq!(dog.compare(&bottom, &h), Comparison::Better);
}

#[test]
fn generic_argument_chains_flatten_through_compose() {
    let h = animals();
    let universe = VariableUniverse::with_variables(3);
    let outer = Binding::singleton(
        Rc::clone(&universe),
        VarId(0),
        TypeExpr::nominal_with("List", vec![("E", TypeExpr::variable(1))]),
    )
    .unwrap();
    let inner =
        Binding::singleton(Rc::clone(&universe), VarId(1), TypeExpr::nominal("Cat")).unwrap();
    let composed = outer.compose(&inner, &h).unwrap().unwrap();
    assert_eq!(
        composed.substitute(&TypeExpr::variable(0)),
        Some(TypeExpr::nominal_with(
            "List",
            vec![("E", TypeExpr::nominal("Cat"))]
        ))
    );
}
