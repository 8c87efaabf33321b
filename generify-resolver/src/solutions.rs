//! Solution collection
//!
//! [`SolutionHolder`] accumulates the bindings registered at successful
//! leaves and keeps only the ones not dominated by another under the
//! binding partial order.

use crate::binding::{Binding, Comparison};
use crate::hierarchy::ClassHierarchy;

/// The growing set of non-dominated solutions
#[derive(Debug, Default)]
pub struct SolutionHolder {
    retained: Vec<Binding>,
}

impl SolutionHolder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offer a solution; returns whether it was retained
    ///
    /// The candidate is dropped when any held binding is `Better` or
    /// `Same`; otherwise it is inserted and every held binding it
    /// dominates is dropped.
    pub fn insert(&mut self, candidate: Binding, hierarchy: &dyn ClassHierarchy) -> bool {
        for held in &self.retained {
            match held.compare(&candidate, hierarchy) {
                Comparison::Better | Comparison::Same => return false,
                Comparison::Worse | Comparison::Incomparable => {}
            }
        }
        self.retained
            .retain(|held| candidate.compare(held, hierarchy) != Comparison::Better);
        self.retained.push(candidate);
        true
    }

    /// Any one retained solution; callers needing every maximal solution
    /// iterate [`solutions`](Self::solutions)
    pub fn best_solution(&self) -> Option<&Binding> {
        self.retained.first()
    }

    pub fn solutions(&self) -> &[Binding] {
        &self.retained
    }

    pub fn len(&self) -> usize {
        self.retained.len()
    }

    pub fn is_empty(&self) -> bool {
        self.retained.is_empty()
    }
}
