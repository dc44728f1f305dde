#![forbid(unsafe_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use idl_ast::{FunctionDef, Param, ScopeOwner, TypeName};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::config::{ArchConfig, ExtensionState};
use crate::error::IdlError;
use crate::pool::{ClonePool, PoolOptions, PoolStats, SymtabLease};
use crate::types::{EnumDef, Type, Width};
use crate::value::Value;
use crate::var::Var;

/// Builtin that folds to whether an extension is implemented.
pub const IMPLEMENTED: &str = "implemented?";

/// Builtins that never return to their caller.
pub const NORETURN_BUILTINS: [&str; 2] = ["raise", "raise_precise"];

/// Nested user-function evaluations deeper than this give up and stay symbolic.
pub const MAX_CALL_DEPTH: usize = 16;

/// Calls evaluated on behalf of one top-level call before giving up.
pub const MAX_CALL_EVALUATIONS: usize = 1024;

#[derive(Clone, Debug, PartialEq)]
pub enum Symbol {
    Var(Var),
    Type(Type),
    Function(Arc<FunctionDef>),
}

impl Symbol {
    pub fn as_var(&self) -> Option<&Var> {
        match self {
            Symbol::Var(var) => Some(var),
            _ => None,
        }
    }

    pub fn as_type(&self) -> Option<&Type> {
        match self {
            Symbol::Type(ty) => Some(ty),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&Arc<FunctionDef>> {
        match self {
            Symbol::Function(def) => Some(def),
            _ => None,
        }
    }

    fn fingerprint(&self) -> String {
        match self {
            Symbol::Var(var) => match var.value() {
                Some(value) => format!("var {} = {value}", var.ty()),
                None => format!("var {}", var.ty()),
            },
            Symbol::Type(ty) => match ty.kind() {
                crate::types::TypeKind::Enum(def) => format!("type {ty} {:?}", def.members),
                _ => format!("type {ty}"),
            },
            Symbol::Function(def) => format!("function {def}"),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct Scope {
    owner: Option<ScopeOwner>,
    entries: HashMap<String, Symbol>,
}

impl Scope {
    fn owned_by(owner: Option<ScopeOwner>) -> Self {
        Self {
            owner,
            entries: HashMap::new(),
        }
    }

    pub fn owner(&self) -> Option<&ScopeOwner> {
        self.owner.as_ref()
    }

    pub fn get(&self, name: &str) -> Option<&Symbol> {
        self.entries.get(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Scoped symbols for one configuration.
///
/// The global scope holds builtins and architecture parameters. It is shared
/// behind an `Arc` and becomes read-only after [`SymbolTable::deep_freeze`].
/// Local scopes are owned by the table, so a clone can be modified without
/// affecting the table it came from.
#[derive(Debug, Default)]
pub struct SymbolTable {
    global: Arc<Scope>,
    locals: Vec<Scope>,
    frozen: bool,
    config: Option<Arc<dyn ArchConfig>>,
    mxlen: Option<u32>,
    content_hash: Option<String>,
    pool: Option<Arc<ClonePool>>,
    call_depth: usize,
    call_budget: Option<Arc<AtomicUsize>>,
}

impl SymbolTable {
    /// Builds the global scope for `config`. Without a configuration, or with
    /// an unconfigured one, no parameters are seeded and `mxlen` is unknown.
    pub fn new(config: Option<Arc<dyn ArchConfig>>) -> Result<Self, IdlError> {
        let configured = config.as_ref().filter(|c| !c.unconfigured());
        let mxlen = configured.and_then(|c| c.mxlen());

        let mut table = SymbolTable {
            config: config.clone(),
            mxlen,
            ..SymbolTable::default()
        };
        table.seed_builtins()?;

        if let Some(config) = configured {
            for param in config.params_with_value() {
                let ty = Type::from_json_schema(&param.schema).map_err(|cause| {
                    IdlError::UnsupportedSchema {
                        param: param.name.clone(),
                        cause,
                    }
                })?;
                let value =
                    Value::from_json(&param.value).ok_or_else(|| IdlError::InvalidConfig {
                        message: format!(
                            "parameter `{}` has a value with no IDL representation",
                            param.name
                        ),
                    })?;
                let ty = ty.patched_for_value(&value).make_const().make_global();
                let value = value.fit_to(&ty);
                table.add_param(Var::param(param.name, ty, Some(value)))?;
            }
            for param in config.params_without_value() {
                let ty = Type::from_json_schema(&param.schema).map_err(|cause| {
                    IdlError::UnsupportedSchema {
                        param: param.name.clone(),
                        cause,
                    }
                })?;
                table.add_param(Var::param(param.name, ty.make_global(), None))?;
            }
        }

        debug!(
            config = config.as_ref().map(|c| c.name()).unwrap_or("<none>"),
            symbols = table.global.len(),
            "symbol table created"
        );
        Ok(table)
    }

    fn seed_builtins(&mut self) -> Result<(), IdlError> {
        let xreg = Type::bits_width(self.mxlen.into());
        self.add_type("XReg", xreg.clone())?;
        self.add_type("Boolean", Type::boolean())?;
        self.add(Var::new(
            "X",
            Type::array(xreg, Width::Known(32)).make_global(),
            None,
        ))?;
        for b in [true, false] {
            self.add(Var::new(
                b.to_string(),
                Type::boolean().make_const().make_global(),
                Some(Value::Bool(b)),
            ))?;
        }

        let extensions = self
            .config
            .as_ref()
            .map(|c| c.known_extensions())
            .unwrap_or_default();
        self.add_enum(EnumDef::new(
            "ExtensionName",
            extensions
                .into_iter()
                .enumerate()
                .map(|(i, name)| (name, i as u128))
                .collect(),
        ))?;

        self.add_function(FunctionDef::builtin(
            IMPLEMENTED,
            vec![Param::new("extension", TypeName::named("ExtensionName"))],
            Some(TypeName::Boolean),
        ))?;
        for name in NORETURN_BUILTINS {
            self.add_function(FunctionDef::builtin(
                name,
                vec![
                    Param::new("code", TypeName::bits(32)),
                    Param::new("tval", TypeName::named("XReg")),
                ],
                None,
            ))?;
        }
        Ok(())
    }

    /// Parameters may be declared by more than one extension; the copies must
    /// agree on type and, when pinned, on value.
    fn add_param(&mut self, var: Var) -> Result<(), IdlError> {
        if let Some(existing) = self.global.get(var.name()) {
            let compatible = match existing.as_var() {
                Some(prev) => {
                    prev.ty().equal_to(var.ty()) && (!prev.is_const() || prev.value() == var.value())
                }
                None => false,
            };
            if compatible {
                return Ok(());
            }
            return Err(IdlError::DuplicateDefinition {
                name: var.name().to_string(),
                callstack: self.callstack(),
            });
        }
        self.add(var)
    }

    pub fn push(&mut self, owner: Option<ScopeOwner>) {
        self.locals.push(Scope::owned_by(owner));
    }

    pub fn pop(&mut self) -> Result<(), IdlError> {
        match self.locals.pop() {
            Some(_) => Ok(()),
            None => Err(self.invalid("cannot pop global scope")),
        }
    }

    /// Runs `f` in a fresh scope that is popped whether or not `f` succeeds.
    pub fn scoped<T>(
        &mut self,
        owner: Option<ScopeOwner>,
        f: impl FnOnce(&mut Self) -> Result<T, IdlError>,
    ) -> Result<T, IdlError> {
        self.push(owner);
        let result = f(self);
        let popped = self.pop();
        let value = result?;
        popped?;
        Ok(value)
    }

    /// Number of scopes, the global one included.
    pub fn levels(&self) -> usize {
        self.locals.len() + 1
    }

    pub fn at_global_scope(&self) -> bool {
        self.locals.is_empty()
    }

    /// Innermost-first lookup. Absence is not an error.
    pub fn get(&self, name: &str) -> Option<&Symbol> {
        self.locals
            .iter()
            .rev()
            .find_map(|scope| scope.entries.get(name))
            .or_else(|| self.global.entries.get(name))
    }

    pub fn get_var(&self, name: &str) -> Option<&Var> {
        self.get(name).and_then(Symbol::as_var)
    }

    pub fn get_global(&self, name: &str) -> Option<&Symbol> {
        self.global.entries.get(name)
    }

    /// Looks `name` up in the outermost `level` scopes only, innermost of
    /// those first. Level 1 is the global scope.
    pub fn get_from(&self, name: &str, level: usize) -> Result<Option<&Symbol>, IdlError> {
        if level == 0 || level > self.levels() {
            return Err(self.invalid(format!(
                "level {level} is out of range (table has {} levels)",
                self.levels()
            )));
        }
        Ok(self.locals[..level - 1]
            .iter()
            .rev()
            .find_map(|scope| scope.entries.get(name))
            .or_else(|| self.global.entries.get(name)))
    }

    fn innermost_mut(&mut self) -> Result<&mut Scope, IdlError> {
        if self.locals.is_empty() {
            if self.frozen {
                return Err(self.invalid("cannot add to a frozen global scope"));
            }
            return Ok(Arc::make_mut(&mut self.global));
        }
        let last = self.locals.len() - 1;
        Ok(&mut self.locals[last])
    }

    fn insert(&mut self, name: String, symbol: Symbol) -> Result<(), IdlError> {
        self.innermost_mut()?.entries.insert(name, symbol);
        Ok(())
    }

    /// Inserts into the innermost scope, replacing any entry there.
    pub fn add(&mut self, var: Var) -> Result<(), IdlError> {
        self.insert(var.name().to_string(), Symbol::Var(var))
    }

    /// Inserts into the innermost scope; the name must not exist in any scope.
    pub fn add_strict(&mut self, var: Var) -> Result<(), IdlError> {
        if self.get(var.name()).is_some() {
            return Err(IdlError::DuplicateDefinition {
                name: var.name().to_string(),
                callstack: self.callstack(),
            });
        }
        self.add(var)
    }

    pub fn add_type(&mut self, name: impl Into<String>, ty: Type) -> Result<(), IdlError> {
        self.insert(name.into(), Symbol::Type(ty))
    }

    pub fn add_enum(&mut self, def: EnumDef) -> Result<(), IdlError> {
        self.add_type(def.name.clone(), Type::enum_class(def))
    }

    pub fn add_function(&mut self, def: FunctionDef) -> Result<(), IdlError> {
        let name = def.name.node.clone();
        if self.get(&name).is_some() {
            return Err(IdlError::DuplicateDefinition {
                name,
                callstack: self.callstack(),
            });
        }
        self.insert(name, Symbol::Function(Arc::new(def)))
    }

    /// Updates the known value of the innermost variable called `name`.
    ///
    /// Constants are never changed. A variable in a frozen global scope is
    /// shadowed in the innermost local scope instead. Returns whether the
    /// update was recorded.
    pub fn refine(&mut self, name: &str, value: Option<Value>) -> bool {
        for scope in self.locals.iter_mut().rev() {
            match scope.entries.get_mut(name) {
                Some(Symbol::Var(var)) => {
                    if var.is_const() {
                        return false;
                    }
                    var.set_value(value);
                    return true;
                }
                Some(_) => return false,
                None => {}
            }
        }

        let global = match self.global.entries.get(name).and_then(Symbol::as_var) {
            Some(var) if !var.is_const() => var,
            _ => return false,
        };
        if global.value() == value.as_ref() {
            return true;
        }
        if self.frozen {
            let mut shadow = global.clone();
            shadow.set_value(value);
            return match self.locals.last_mut() {
                Some(scope) => {
                    scope.entries.insert(name.to_string(), Symbol::Var(shadow));
                    true
                }
                None => false,
            };
        }
        if let Some(Symbol::Var(var)) = Arc::make_mut(&mut self.global).entries.get_mut(name) {
            var.set_value(value);
        }
        true
    }

    /// Forgets the known value of every variable in `names`.
    pub fn nullify<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for name in names {
            self.refine(name.as_ref(), None);
        }
    }

    /// Variables matching `pred`, innermost scope first. With `single_scope`,
    /// stops after the first scope that has any match.
    pub fn find_all(&self, single_scope: bool, pred: impl Fn(&Var) -> bool) -> Vec<&Var> {
        let mut found = Vec::new();
        let scopes = self
            .locals
            .iter()
            .rev()
            .chain(std::iter::once(self.global.as_ref()));
        for scope in scopes {
            let before = found.len();
            found.extend(
                scope
                    .entries
                    .values()
                    .filter_map(Symbol::as_var)
                    .filter(|var| pred(var)),
            );
            if single_scope && found.len() > before {
                break;
            }
        }
        found
    }

    pub fn deep_freeze(&mut self) -> Result<(), IdlError> {
        let options = self
            .config
            .as_ref()
            .map(|c| c.pool_options())
            .unwrap_or_default();
        self.deep_freeze_with(options)
    }

    /// Makes the global scope read-only, records its content hash, and sets
    /// up the lease pool. Freezing a frozen table does nothing.
    pub fn deep_freeze_with(&mut self, options: PoolOptions) -> Result<(), IdlError> {
        if self.frozen {
            return Ok(());
        }
        if !self.at_global_scope() {
            return Err(self.invalid("deep_freeze requires the table to be at global scope"));
        }
        self.frozen = true;
        self.content_hash = Some(self.compute_hash());
        self.pool = Some(Arc::new(ClonePool::new(self.global_only(), options)));
        debug!(
            hash = self.content_hash.as_deref().unwrap_or_default(),
            initial = options.initial,
            "symbol table frozen"
        );
        Ok(())
    }

    fn compute_hash(&self) -> String {
        let mut hasher = Sha256::new();
        if let Some(config) = &self.config {
            hasher.update(config.content_hash().as_bytes());
        }
        let ordered: BTreeMap<&String, &Symbol> = self.global.entries.iter().collect();
        for (name, symbol) in ordered {
            hasher.update(name.as_bytes());
            hasher.update(symbol.fingerprint().as_bytes());
        }
        hex::encode(hasher.finalize())
    }

    /// An independent copy for speculative pruning. The global scope is
    /// shared; local scopes are copied.
    pub fn deep_clone(&self) -> SymbolTable {
        SymbolTable {
            global: Arc::clone(&self.global),
            locals: self.locals.clone(),
            frozen: self.frozen,
            config: self.config.clone(),
            mxlen: self.mxlen,
            content_hash: self.content_hash.clone(),
            pool: None,
            call_depth: self.call_depth,
            call_budget: self.call_budget.clone(),
        }
    }

    pub(crate) fn global_only(&self) -> SymbolTable {
        SymbolTable {
            global: Arc::clone(&self.global),
            locals: Vec::new(),
            frozen: self.frozen,
            config: self.config.clone(),
            mxlen: self.mxlen,
            content_hash: self.content_hash.clone(),
            pool: None,
            call_depth: self.call_depth,
            call_budget: self.call_budget.clone(),
        }
    }

    /// A global-only table for evaluating a function call, or `None` once
    /// calls nest too deeply to follow.
    /// Frames nested under one top-level call share a budget of evaluations.
    pub(crate) fn call_frame(&self) -> Option<SymbolTable> {
        if self.call_depth >= MAX_CALL_DEPTH {
            return None;
        }
        let budget = match &self.call_budget {
            Some(budget) => Arc::clone(budget),
            None => Arc::new(AtomicUsize::new(MAX_CALL_EVALUATIONS)),
        };
        budget
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |left| left.checked_sub(1))
            .ok()?;
        let mut frame = self.global_only();
        frame.call_depth += 1;
        frame.call_budget = Some(budget);
        Some(frame)
    }

    /// Leases a global-only table from the pool of a frozen table.
    pub fn global_clone(&self) -> Result<SymtabLease, IdlError> {
        match &self.pool {
            Some(pool) if self.frozen => Ok(pool.lease()),
            _ => Err(self.invalid("global_clone requires a frozen symbol table")),
        }
    }

    pub(crate) fn attach_pool(&mut self, pool: Arc<ClonePool>) {
        self.pool = Some(pool);
    }

    pub(crate) fn detach_pool(&mut self) {
        self.pool = None;
    }

    pub fn reset_to_global(&mut self) {
        self.locals.clear();
    }

    pub fn pool_stats(&self) -> Option<PoolStats> {
        self.pool.as_ref().map(|pool| pool.stats())
    }

    /// Owners of the pushed scopes, innermost first.
    pub fn callstack(&self) -> Vec<String> {
        self.locals
            .iter()
            .rev()
            .filter_map(|scope| scope.owner.as_ref().map(ToString::to_string))
            .collect()
    }

    pub fn content_hash(&self) -> Option<&str> {
        self.content_hash.as_deref()
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn mxlen(&self) -> Option<u32> {
        self.mxlen
    }

    pub fn config(&self) -> Option<&Arc<dyn ArchConfig>> {
        self.config.as_ref()
    }

    pub fn extension_state(&self, extension: &str) -> ExtensionState {
        match &self.config {
            Some(config) => config.extension_state(extension),
            None => ExtensionState::Unknown,
        }
    }

    pub(crate) fn invalid(&self, message: impl Into<String>) -> IdlError {
        IdlError::InvalidOperation {
            message: message.into(),
            callstack: self.callstack(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_are_seeded_without_config() {
        let table = SymbolTable::new(None).expect("symbol table");
        assert_eq!(table.mxlen(), None);
        assert_eq!(
            table.get_var("true").and_then(Var::value),
            Some(&Value::Bool(true))
        );
        let x = table.get_var("X").expect("X");
        assert_eq!(x.ty().array_len(), Some(Width::Known(32)));
        assert_eq!(x.ty().element_type().and_then(Type::width), None);
        assert!(table.get(IMPLEMENTED).and_then(Symbol::as_function).is_some());
    }

    #[test]
    fn get_from_checks_level_range() {
        let mut table = SymbolTable::new(None).expect("symbol table");
        table.push(None);
        table
            .add(Var::new("t", Type::bits(4), Some(Value::Bits(1))))
            .expect("add");
        assert!(table.get_from("t", 1).expect("level 1").is_none());
        assert!(table.get_from("t", 2).expect("level 2").is_some());
        assert!(table.get_from("t", 0).is_err());
        assert!(table.get_from("t", 3).is_err());
    }

    #[test]
    fn refine_skips_constants() {
        let mut table = SymbolTable::new(None).expect("symbol table");
        table.push(None);
        table
            .add(Var::new("c", Type::bits(4).make_const(), Some(Value::Bits(3))))
            .expect("add");
        assert!(!table.refine("c", None));
        assert_eq!(table.get_var("c").and_then(Var::value), Some(&Value::Bits(3)));
        assert!(!table.refine("true", Some(Value::Bool(false))));
    }

    #[test]
    fn freezing_requires_global_scope() {
        let mut table = SymbolTable::new(None).expect("symbol table");
        table.push(None);
        assert!(table.deep_freeze().is_err());
        table.pop().expect("pop");
        table.deep_freeze().expect("freeze");
        assert!(table.is_frozen());
        assert_eq!(table.content_hash().map(str::len), Some(64));
        assert!(table.add(Var::new("late", Type::bits(1), None)).is_err());
    }

    #[test]
    fn find_all_can_stop_at_first_scope() {
        let mut table = SymbolTable::new(None).expect("symbol table");
        table.push(None);
        table.add(Var::new("a", Type::bits(4), None)).expect("add");
        table.push(None);
        table.add(Var::new("b", Type::bits(4), None)).expect("add");

        let all = table.find_all(false, |v| v.ty().width() == Some(4));
        assert_eq!(all.len(), 2);
        let nearest = table.find_all(true, |v| v.ty().width() == Some(4));
        assert_eq!(nearest.len(), 1);
        assert_eq!(nearest[0].name(), "b");
    }
}
