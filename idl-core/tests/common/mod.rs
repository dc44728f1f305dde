#![allow(dead_code)]

use std::sync::Arc;

use idl_core::{Config, SymbolTable};

pub const RV32: &str = r#"{
    "name": "rv32",
    "type": "fully configured",
    "mxlen": 32,
    "implemented_extensions": ["I", "C", "Zicsr"],
    "params": [
        { "name": "XLEN", "schema": { "type": "integer", "enum": [32, 64] },
          "value": 32, "defined_by": ["I"] },
        { "name": "PMP_ENTRIES", "schema": { "type": "integer", "minimum": 0, "maximum": 64 },
          "value": 16, "defined_by": ["Smpmp"] },
        { "name": "MTVAL_WIDTH", "schema": { "type": "integer", "maximum": 64 },
          "defined_by": ["Sm"] }
    ]
}"#;

pub fn config(text: &str) -> Arc<Config> {
    Arc::new(Config::from_json_str(text).expect("valid config"))
}

/// A frozen table for the `RV32` configuration.
pub fn rv32() -> SymbolTable {
    let mut table = SymbolTable::new(Some(config(RV32))).expect("symbol table");
    table.deep_freeze().expect("freeze");
    table
}
