#![forbid(unsafe_code)]
#![allow(unused_assignments)]

use miette::Diagnostic;
use thiserror::Error;

use crate::types::SchemaError;

/// Structural failures of the IDL core.
///
/// A value that cannot be determined statically is not an error; evaluation
/// reports it as `None`. Every variant here points at a defect in the caller,
/// the input AST, or the configuration.
#[derive(Debug, Error, Diagnostic)]
pub enum IdlError {
    #[error("duplicate definition of `{name}`")]
    #[diagnostic(code(idl::duplicate_definition))]
    DuplicateDefinition { name: String, callstack: Vec<String> },

    #[error("invalid symbol table operation: {message}")]
    #[diagnostic(code(idl::invalid_operation))]
    InvalidOperation { message: String, callstack: Vec<String> },

    #[error("malformed template binding for `{name}`: template index and function name must be given together")]
    #[diagnostic(code(idl::malformed_template_binding))]
    MalformedTemplateBinding { name: String },

    #[error("undefined type `{name}`")]
    #[diagnostic(code(idl::undefined_type))]
    UndefinedType { name: String, callstack: Vec<String> },

    #[error("unsupported schema for parameter `{param}`")]
    #[diagnostic(code(idl::unsupported_schema))]
    UnsupportedSchema {
        param: String,
        #[source]
        cause: SchemaError,
    },

    #[error("invalid configuration: {message}")]
    #[diagnostic(code(idl::invalid_config))]
    InvalidConfig { message: String },
}

impl IdlError {
    /// Scope owners active when the error was raised, innermost first.
    pub fn callstack(&self) -> &[String] {
        match self {
            IdlError::DuplicateDefinition { callstack, .. }
            | IdlError::InvalidOperation { callstack, .. }
            | IdlError::UndefinedType { callstack, .. } => callstack,
            _ => &[],
        }
    }
}
