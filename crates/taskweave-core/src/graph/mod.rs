//! Task dependency graph analysis.

pub mod cycles;

pub use cycles::{
    CycleError, DependencyGraph, check_dependency_change, invalid_dependencies,
    would_create_cycle,
};
