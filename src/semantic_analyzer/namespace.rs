// Scope stack and identifier descriptors.
//
// The stack grows by one layer per block that may introduce bindings. Slot
// counters live on the layers that own storage: the root layer for globals
// and every function layer for its params and locals.

use std::collections::HashMap;
use std::fmt;

use log::debug;

use crate::ast::ast_def::Pos;
use super::types::TypeDesc;
use super::{SemResult, SemanticError, SemanticErrorKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageClass {
    Global,
    /// Declared in a nested block at global nesting; keeps a global slot
    /// but the name is gone once the block ends.
    GlobalLocal,
    Param,
    Local,
}

impl fmt::Display for StorageClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            StorageClass::Global => "global",
            StorageClass::GlobalLocal => "global.local",
            StorageClass::Param => "param",
            StorageClass::Local => "local",
        };
        write!(f, "{}", text)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IdentDesc {
    pub name: String,
    pub ty: TypeDesc,
    pub storage: StorageClass,
    pub index: usize,
    pub built_in: bool,
}

impl IdentDesc {
    pub fn new(name: &str, ty: TypeDesc) -> Self {
        Self { name: name.to_string(), ty, storage: StorageClass::Global, index: 0, built_in: false }
    }

    pub fn param(name: &str, ty: TypeDesc) -> Self {
        Self { storage: StorageClass::Param, ..Self::new(name, ty) }
    }
}

impl fmt::Display for IdentDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, {}, ", self.ty, self.storage)?;
        if self.built_in {
            write!(f, "built-in")
        } else {
            write!(f, "{}", self.index)
        }
    }
}

#[derive(Debug, Default)]
struct ScopeLayer {
    idents: HashMap<String, IdentDesc>,
    func: Option<IdentDesc>,
    var_index: usize,
    param_index: usize,
}

/// Lexical scope stack used throughout one analysis run.
pub struct Namesp {
    layers: Vec<ScopeLayer>,
}

impl Namesp {
    pub fn new() -> Self {
        Self { layers: vec![ScopeLayer::default()] }
    }

    pub fn enter_scope(&mut self) {
        self.layers.push(ScopeLayer::default());
    }

    pub fn enter_function_scope(&mut self, func: IdentDesc) {
        self.layers.push(ScopeLayer { func: Some(func), ..ScopeLayer::default() });
    }

    pub fn exit_scope(&mut self) {
        debug_assert!(self.layers.len() > 1, "the root scope is never popped");
        self.layers.pop();
    }

    /// Whether the current layer is the root scope.
    pub fn is_global(&self) -> bool {
        self.layers.len() == 1
    }

    /// Descriptor of the nearest enclosing function, if any.
    pub fn current_function(&self) -> Option<&IdentDesc> {
        self.layers.iter().rev().find_map(|layer| layer.func.as_ref())
    }

    fn func_layer_index(&self) -> Option<usize> {
        self.layers.iter().rposition(|layer| layer.func.is_some())
    }

    pub fn lookup(&self, name: &str) -> Option<&IdentDesc> {
        self.layers.iter().rev().find_map(|layer| layer.idents.get(name))
    }

    /// Declares an identifier in the current layer. Storage class is decided
    /// here (except params, which the caller pre-assigns) and the slot index
    /// is drawn from the owning layer's counter. Fails on a conflicting
    /// declaration and leaves every scope untouched in that case.
    pub fn add_ident(&mut self, mut ident: IdentDesc, pos: Option<Pos>) -> SemResult<IdentDesc> {
        let func_layer = self.func_layer_index();

        if ident.storage != StorageClass::Param {
            ident.storage = if func_layer.is_some() {
                StorageClass::Local
            } else if self.is_global() {
                StorageClass::Global
            } else {
                StorageClass::GlobalLocal
            };
        }

        if let Some(old) = self.lookup(&ident.name) {
            let conflict = match ident.storage {
                StorageClass::Param => old.storage == StorageClass::Param,
                StorageClass::Local => {
                    !matches!(old.storage, StorageClass::Global | StorageClass::GlobalLocal)
                }
                _ => true,
            };
            if conflict {
                return Err(SemanticError::new(
                    SemanticErrorKind::AlreadyDeclared(ident.name.clone()),
                    pos,
                ));
            }
        }

        if !ident.ty.is_func() {
            if ident.storage == StorageClass::Param {
                let layer = &mut self.layers[func_layer.expect("parameters live in a function scope")];
                ident.index = layer.param_index;
                layer.param_index += 1;
            } else {
                let layer = &mut self.layers[func_layer.unwrap_or(0)];
                ident.index = layer.var_index;
                layer.var_index += 1;
            }
        }

        let layer = self.layers.last_mut().expect("scope stack is never empty");
        layer.idents.insert(ident.name.clone(), ident.clone());
        Ok(ident)
    }

    /// Flags every root-scope identifier as part of the built-in library.
    pub fn mark_all_built_in(&mut self) {
        for ident in self.layers[0].idents.values_mut() {
            ident.built_in = true;
        }
        debug!("marked {} built-in identifiers", self.layers[0].idents.len());
    }

    /// User globals start counting from zero again after seeding.
    pub fn reset_global_var_counter(&mut self) {
        self.layers[0].var_index = 0;
    }
}

impl Default for Namesp {
    fn default() -> Self {
        Self::new()
    }
}
