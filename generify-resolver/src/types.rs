//! Type expression model for the resolution engine
//!
//! A closed tagged union over which every structural recursion in the
//! engine (apply, substitute, compare, balance) pattern-matches
//! exhaustively. Type expressions are immutable and structurally equal;
//! the constraint front-end owns them and the engine never mutates one.

use indexmap::IndexSet;
use std::cell::Cell;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::rc::Rc;

/// Type variable identifier, unique within one [`VariableUniverse`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(pub u32);

impl fmt::Display for VarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Reference to a declared class or interface in the external hierarchy
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(pub String);

impl ClassId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Mapping from a class's formal type parameters to type expressions
///
/// An empty substitution denotes a raw use of the class. Parameters are
/// keyed by name; a parameter missing from the map is an erased "hole",
/// which is how partially raw instantiations are represented.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Substitution(BTreeMap<String, TypeExpr>);

impl Substitution {
    pub fn empty() -> Self {
        Self(BTreeMap::new())
    }

    /// True iff no parameter is instantiated (a raw use)
    pub fn is_raw(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, param: &str) -> Option<&TypeExpr> {
        self.0.get(param)
    }

    pub fn insert(&mut self, param: impl Into<String>, ty: TypeExpr) {
        self.0.insert(param.into(), ty);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &TypeExpr)> {
        self.0.iter()
    }

    pub fn params(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }
}

impl FromIterator<(String, TypeExpr)> for Substitution {
    fn from_iter<I: IntoIterator<Item = (String, TypeExpr)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Direction of a use-site wildcard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum WildcardDirection {
    /// `? extends B` — covariant upper bound
    Extends,
    /// `? super B` — contravariant lower bound
    Super,
}

/// Recursive type expression
///
/// The variants mirror the surface type language of the programs being
/// generified: unknowns to solve for, nominal class types with argument
/// substitutions, arrays, wildcards, primitives, the null type, and the
/// least type `Bottom` used to mean "unconstrained / eliminated".
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TypeExpr {
    /// An unknown to be solved for
    Variable(VarId),

    /// A declared class or interface with a type-argument substitution;
    /// an empty substitution is a raw use
    Nominal { class: ClassId, args: Substitution },

    /// Array of a component type
    Array(Box<TypeExpr>),

    /// Use-site existential: `? extends B` / `? super B`; a missing bound
    /// is the unbounded `?`
    Wildcard {
        direction: WildcardDirection,
        bound: Option<Box<TypeExpr>>,
    },

    /// Built-in primitive such as `int`
    Primitive(String),

    /// The null type, below every reference type
    Null,

    /// The least type: no constraint, or an argument eliminated to raw
    Bottom,
}

impl TypeExpr {
    /// Create a variable reference
    pub fn variable(index: u32) -> Self {
        TypeExpr::Variable(VarId(index))
    }

    /// Create a raw (unparameterized) nominal type
    pub fn nominal(name: impl Into<String>) -> Self {
        TypeExpr::Nominal {
            class: ClassId::new(name),
            args: Substitution::empty(),
        }
    }

    /// Create a nominal type with explicit type arguments
    pub fn nominal_with(name: impl Into<String>, args: Vec<(&str, TypeExpr)>) -> Self {
        TypeExpr::Nominal {
            class: ClassId::new(name),
            args: args
                .into_iter()
                .map(|(p, t)| (p.to_string(), t))
                .collect(),
        }
    }

    /// Create an array type
    pub fn array(component: TypeExpr) -> Self {
        TypeExpr::Array(Box::new(component))
    }

    /// Create a `? extends bound` wildcard
    pub fn wildcard_extends(bound: TypeExpr) -> Self {
        TypeExpr::Wildcard {
            direction: WildcardDirection::Extends,
            bound: Some(Box::new(bound)),
        }
    }

    /// Create a `? super bound` wildcard
    pub fn wildcard_super(bound: TypeExpr) -> Self {
        TypeExpr::Wildcard {
            direction: WildcardDirection::Super,
            bound: Some(Box::new(bound)),
        }
    }

    /// Create a primitive type
    pub fn primitive(name: impl Into<String>) -> Self {
        TypeExpr::Primitive(name.into())
    }

    /// The variable id if this expression is a bare variable
    pub fn as_variable(&self) -> Option<VarId> {
        match self {
            TypeExpr::Variable(v) => Some(*v),
            _ => None,
        }
    }

    /// The class reference if this expression is a nominal type
    pub fn class(&self) -> Option<&ClassId> {
        match self {
            TypeExpr::Nominal { class, .. } => Some(class),
            _ => None,
        }
    }

    pub fn is_bottom(&self) -> bool {
        matches!(self, TypeExpr::Bottom)
    }

    /// True iff no type variable is reachable anywhere in this expression
    pub fn is_concrete(&self) -> bool {
        match self {
            TypeExpr::Variable(_) => false,
            TypeExpr::Nominal { args, .. } => args.iter().all(|(_, t)| t.is_concrete()),
            TypeExpr::Array(component) => component.is_concrete(),
            TypeExpr::Wildcard { bound, .. } => {
                bound.as_ref().map(|b| b.is_concrete()).unwrap_or(true)
            }
            TypeExpr::Primitive(_) | TypeExpr::Null | TypeExpr::Bottom => true,
        }
    }

    /// True iff `var` occurs anywhere in this expression
    pub fn contains_variable(&self, var: VarId) -> bool {
        match self {
            TypeExpr::Variable(v) => *v == var,
            TypeExpr::Nominal { args, .. } => {
                args.iter().any(|(_, t)| t.contains_variable(var))
            }
            TypeExpr::Array(component) => component.contains_variable(var),
            TypeExpr::Wildcard { bound, .. } => bound
                .as_ref()
                .map(|b| b.contains_variable(var))
                .unwrap_or(false),
            TypeExpr::Primitive(_) | TypeExpr::Null | TypeExpr::Bottom => false,
        }
    }

    /// Collect every variable reachable in this expression
    pub fn collect_variables(&self, out: &mut BTreeSet<VarId>) {
        match self {
            TypeExpr::Variable(v) => {
                out.insert(*v);
            }
            TypeExpr::Nominal { args, .. } => {
                for (_, t) in args.iter() {
                    t.collect_variables(out);
                }
            }
            TypeExpr::Array(component) => component.collect_variables(out),
            TypeExpr::Wildcard { bound, .. } => {
                if let Some(b) = bound {
                    b.collect_variables(out);
                }
            }
            TypeExpr::Primitive(_) | TypeExpr::Null | TypeExpr::Bottom => {}
        }
    }
}

impl fmt::Display for TypeExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeExpr::Variable(v) => write!(f, "{v}"),
            TypeExpr::Nominal { class, args } => {
                write!(f, "{class}")?;
                if !args.is_raw() {
                    let rendered: Vec<String> = args
                        .iter()
                        .map(|(p, t)| format!("{p}={t}"))
                        .collect();
                    write!(f, "<{}>", rendered.join(", "))?;
                }
                Ok(())
            }
            TypeExpr::Array(component) => write!(f, "{component}[]"),
            TypeExpr::Wildcard { direction, bound } => match (direction, bound) {
                (WildcardDirection::Extends, Some(b)) => write!(f, "? extends {b}"),
                (WildcardDirection::Super, Some(b)) => write!(f, "? super {b}"),
                (_, None) => write!(f, "?"),
            },
            TypeExpr::Primitive(name) => f.write_str(name),
            TypeExpr::Null => f.write_str("null"),
            TypeExpr::Bottom => f.write_str("_"),
        }
    }
}

/// A subtype constraint: `lower <: upper`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Constraint {
    pub lower: TypeExpr,
    pub upper: TypeExpr,
}

impl Constraint {
    pub fn new(lower: TypeExpr, upper: TypeExpr) -> Self {
        Self { lower, upper }
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <: {}", self.lower, self.upper)
    }
}

/// The fixed universe of bound variables for one resolution run
///
/// The constraint front-end allocates one index per unknown before
/// resolution starts. The search itself may allocate fresh existentials
/// (`riseWithWildcard`), so the universe grows monotonically behind a
/// shared handle; bindings remember their universe so that combining
/// bindings from different runs is detectable.
#[derive(Debug)]
pub struct VariableUniverse {
    next: Cell<u32>,
}

impl VariableUniverse {
    /// Create a universe holding `count` pre-allocated variables
    pub fn with_variables(count: u32) -> Rc<Self> {
        Rc::new(Self {
            next: Cell::new(count),
        })
    }

    /// Allocate a fresh variable index
    pub fn fresh(&self) -> VarId {
        let id = self.next.get();
        self.next.set(id + 1);
        VarId(id)
    }

    pub fn contains(&self, var: VarId) -> bool {
        var.0 < self.next.get()
    }

    pub fn len(&self) -> usize {
        self.next.get() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.next.get() == 0
    }
}

/// The input to resolution: deduplicated subtype constraints plus the
/// bound-variable universe they range over
#[derive(Debug, Clone)]
pub struct ConstraintSystem {
    pub constraints: IndexSet<Constraint>,
    pub universe: Rc<VariableUniverse>,
}

impl ConstraintSystem {
    pub fn new(universe: Rc<VariableUniverse>) -> Self {
        Self {
            constraints: IndexSet::new(),
            universe,
        }
    }

    /// Add `lower <: upper`; structural duplicates are ignored
    pub fn add(&mut self, lower: TypeExpr, upper: TypeExpr) {
        self.constraints.insert(Constraint::new(lower, upper));
    }

    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structural_equality_ignores_argument_insertion_order() {
        let a = TypeExpr::nominal_with(
            "Map",
            vec![
                ("K", TypeExpr::nominal("String")),
                ("V", TypeExpr::nominal("Integer")),
            ],
        );
        let b = TypeExpr::nominal_with(
            "Map",
            vec![
                ("V", TypeExpr::nominal("Integer")),
                ("K", TypeExpr::nominal("String")),
            ],
        );
        assert_eq!(a, b);
    }

    #[test]
    fn constraint_set_deduplicates_structurally() {
        let universe = VariableUniverse::with_variables(1);
        let mut system = ConstraintSystem::new(universe);
        system.add(TypeExpr::nominal("Dog"), TypeExpr::variable(0));
        system.add(TypeExpr::nominal("Dog"), TypeExpr::variable(0));
        assert_eq!(system.len(), 1);
    }

    #[test]
    fn display_renders_java_like_surface_syntax() {
        let ty = TypeExpr::nominal_with(
            "List",
            vec![("E", TypeExpr::wildcard_extends(TypeExpr::nominal("Animal")))],
        );
        assert_eq!(ty.to_string(), "List<E=? extends Animal>");
        assert_eq!(
            TypeExpr::array(TypeExpr::primitive("int")).to_string(),
            "int[]"
        );
        assert_eq!(TypeExpr::Bottom.to_string(), "_");
    }

    #[test]
    fn fresh_variables_extend_the_universe() {
        let universe = VariableUniverse::with_variables(2);
        assert!(universe.contains(VarId(1)));
        assert!(!universe.contains(VarId(2)));
        let fresh = universe.fresh();
        assert_eq!(fresh, VarId(2));
        assert!(universe.contains(fresh));
    }
}
