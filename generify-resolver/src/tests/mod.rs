//! Integration tests for the resolution engine
//!
//! Module-level unit tests live next to their modules; the files here
//! exercise the engine end to end: the binding algebra properties, the
//! lattice operations over realistic hierarchies, and full resolution
//! scenarios in both greedy and exhaustive modes.

// Binding algebra property tests
mod test_binding_algebra;


// End-to-end resolution scenarios
mod test_resolution_scenarios;
