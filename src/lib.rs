// thiserror's #[error("...{field}...")] format strings reference struct fields,
// but the compiler doesn't see through the derive macro and reports false positives.
#![allow(unused_assignments)]

//! # xi-kernel
//!
//! A small stateful graph kernel that is the only writer of a knowledge graph
//! of symbols and edges, checks a fixed set of structural invariants after
//! every mutation, and drives a bounded evaluation loop that turns generation
//! replies into provenance-tagged graph nodes.
//!
//! ## Architecture
//!
//! - **Authority** (`authority`): unforgeable write tokens bound to one store
//! - **Graph** (`graph`): copy-on-write symbol/edge store with frozen snapshots
//! - **Invariants** (`invariant`): write-through, provenance, lineage closure, symbol-first
//! - **Generation** (`port`): the boundary to whatever backs content generation
//! - **Kernel** (`kernel`): mutation gateway, `prompt` / `critique` / `link`
//! - **Evaluation** (`eval`): step loop with completion marker, error stop, and budget
//!
//! ## Library usage
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use serde_json::json;
//! use xi_kernel::eval::{Evaluator, Goal};
//! use xi_kernel::kernel::Kernel;
//! use xi_kernel::port::mock::MockPort;
//! use xi_kernel::symbol::{EdgeSpec, SymbolSpec};
//!
//! let mut kernel = Kernel::with_port(Arc::new(MockPort::new().complete_on(3)));
//! kernel.create_symbol(SymbolSpec::new("a", "concept", json!({"name": "A"}))).unwrap();
//! kernel.create_symbol(SymbolSpec::new("b", "concept", json!({"name": "B"}))).unwrap();
//! kernel.create_edge(EdgeSpec::new("a", "b", "related").because("shared topic")).unwrap();
//!
//! let goal = Goal::new("essay", json!({"task": "outline an essay"})).with_max_steps(5);
//! let result = Evaluator::default().run(&mut kernel, &goal);
//! assert!(result.completed);
//! ```

pub mod authority;
pub mod config;
pub mod error;
pub mod eval;
pub mod graph;
pub mod invariant;
pub mod kernel;
pub mod port;
pub mod symbol;
