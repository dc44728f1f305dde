#![forbid(unsafe_code)]

//! Symbol table, type system and partial evaluator for the Instruction
//! Description Language.
//!
//! A [`SymbolTable`] is built once per architecture configuration and frozen.
//! IDL bodies are then pruned against it: anything the configuration decides
//! is folded away, and what remains is the configuration-specific semantics.

pub mod config;
pub mod driver;
pub mod error;
pub mod eval;
pub mod pool;
pub mod prune;
pub mod return_values;
pub mod symtab;
pub mod types;
pub mod value;
pub mod var;

pub use config::{ArchConfig, Config, ConfigKind, ExtensionState, ParamWithValue, ParamWithoutValue};
pub use driver::{prune_functions, prune_operations, prune_units, BatchReport, CompilationUnit, PruneFailure};
pub use error::IdlError;
pub use eval::{literal_for, type_of, value_of};
pub use pool::{PoolOptions, PoolStats, SymtabLease};
pub use prune::{prune_expr, prune_function, prune_stmt_list, Flow, Prune, PrunedStmts};
pub use return_values::{invert_condition, return_values, ReturnValue};
pub use symtab::{Symbol, SymbolTable};
pub use types::{EnumDef, Type, TypeKind, Width};
pub use value::Value;
pub use var::Var;
