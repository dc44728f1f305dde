#![forbid(unsafe_code)]
#![allow(unused_assignments)]

//! Prunes many independent compilation units against one frozen table.

use idl_ast::{FunctionDef, Operation, Origin};
use miette::Diagnostic;
use rayon::prelude::*;
use thiserror::Error;
use tracing::{debug, warn};

use crate::error::IdlError;
use crate::prune::Prune;
use crate::symtab::SymbolTable;

/// Something pruned on its own lease: a function or an instruction operation.
pub trait CompilationUnit: Prune<Output = Self> + Sync + Send + Sized {
    fn unit_name(&self) -> String;

    fn origin(&self) -> Option<&Origin>;
}

impl CompilationUnit for FunctionDef {
    fn unit_name(&self) -> String {
        format!("function {}", self.name.node)
    }

    fn origin(&self) -> Option<&Origin> {
        self.origin.as_ref()
    }
}

impl CompilationUnit for Operation {
    fn unit_name(&self) -> String {
        format!("instruction {}", self.instruction.node)
    }

    fn origin(&self) -> Option<&Origin> {
        self.origin.as_ref()
    }
}

#[derive(Debug, Error, Diagnostic)]
#[error("failed to prune {unit}{}", at(.origin))]
#[diagnostic(code(idl::prune_failure))]
pub struct PruneFailure {
    pub unit: String,
    pub origin: Option<Origin>,
    #[source]
    #[diagnostic_source]
    pub error: IdlError,
}

fn at(origin: &Option<Origin>) -> String {
    origin.as_ref().map(|o| format!(" ({o})")).unwrap_or_default()
}

#[derive(Debug)]
pub struct BatchReport<U> {
    /// Pruned units in input order, skipping failures.
    pub pruned: Vec<U>,
    pub failures: Vec<PruneFailure>,
}

impl<U> BatchReport<U> {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Prunes every unit in parallel. A failing unit is reported and does not
/// stop the others; the frozen global scope is never modified.
pub fn prune_units<U: CompilationUnit>(
    symtab: &SymbolTable,
    units: &[U],
) -> Result<BatchReport<U>, IdlError> {
    if !symtab.is_frozen() {
        return Err(symtab.invalid("batch pruning requires a frozen symbol table"));
    }

    let results: Vec<Result<U, PruneFailure>> = units
        .par_iter()
        .map(|unit| prune_one(symtab, unit))
        .collect();

    let mut report = BatchReport {
        pruned: Vec::with_capacity(units.len()),
        failures: Vec::new(),
    };
    for result in results {
        match result {
            Ok(unit) => report.pruned.push(unit),
            Err(failure) => {
                warn!(unit = %failure.unit, error = %failure.error, "prune failed");
                report.failures.push(failure);
            }
        }
    }
    debug!(
        pruned = report.pruned.len(),
        failed = report.failures.len(),
        "batch pruned"
    );
    Ok(report)
}

pub fn prune_functions(
    symtab: &SymbolTable,
    functions: &[FunctionDef],
) -> Result<BatchReport<FunctionDef>, IdlError> {
    prune_units(symtab, functions)
}

pub fn prune_operations(
    symtab: &SymbolTable,
    operations: &[Operation],
) -> Result<BatchReport<Operation>, IdlError> {
    prune_units(symtab, operations)
}

fn prune_one<U: CompilationUnit>(symtab: &SymbolTable, unit: &U) -> Result<U, PruneFailure> {
    let fail = |error| PruneFailure {
        unit: unit.unit_name(),
        origin: unit.origin().cloned(),
        error,
    };
    let mut lease = symtab.global_clone().map_err(fail)?;
    let result = unit.prune(&mut lease);
    let released = lease.release();
    let pruned = result.map_err(fail)?;
    released.map_err(fail)?;
    Ok(pruned)
}
