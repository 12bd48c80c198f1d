//! Resolving patch targets to concrete method bodies.
//!
//! A patch target is addressed by fully qualified type name plus method name.
//! Lookup fails loudly: [`crate::Error::TypeNotFound`] and
//! [`crate::Error::MethodNotFound`] when a name is absent, and
//! [`crate::Error::AmbiguousMethod`] when more than one overload matches.
//! Ambiguity is never resolved by an implicit first-match rule — that would
//! make patch targeting depend on method declaration order, which is not
//! stable across rebuilds of the target module. Callers disambiguate by
//! supplying the exact parameter type list.
//!
//! Locating is read-only, so resolving many targets fans out across a rayon
//! thread pool ([`locate_many`]); the mutating injection stage that follows
//! stays single-writer.

use rayon::prelude::*;

use crate::{
    module::{MethodDef, Module, TypeDef},
    Error, Result,
};

/// A resolved patch target: indices of the method within the module.
///
/// Handles stay valid for the lifetime of the module they were resolved
/// against as long as no types or methods are removed; the engine only ever
/// appends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodHandle {
    /// Index into the module's type table
    pub type_index: usize,
    /// Index into that type's method list
    pub method_index: usize,
}

impl MethodHandle {
    /// Borrows the type and method this handle names.
    pub fn resolve<'m>(&self, module: &'m Module) -> Option<(&'m TypeDef, &'m MethodDef)> {
        let type_def = module.types.get(self.type_index)?;
        let method = type_def.methods.get(self.method_index)?;
        Some((type_def, method))
    }
}

/// One lookup request, optionally narrowed by an exact parameter type list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocateQuery {
    /// Fully qualified type name
    pub type_name: String,
    /// Method name
    pub method_name: String,
    /// Exact parameter type names, when the name alone is ambiguous
    pub signature: Option<Vec<String>>,
}

impl LocateQuery {
    /// Creates a by-name query.
    pub fn new(type_name: impl Into<String>, method_name: impl Into<String>) -> Self {
        LocateQuery {
            type_name: type_name.into(),
            method_name: method_name.into(),
            signature: None,
        }
    }
}

/// Resolves `(type_name, method_name)` to a unique method.
///
/// # Errors
/// [`crate::Error::TypeNotFound`], [`crate::Error::MethodNotFound`], or
/// [`crate::Error::AmbiguousMethod`] when the name matches several overloads.
pub fn locate(module: &Module, type_name: &str, method_name: &str) -> Result<MethodHandle> {
    locate_query(
        module,
        &LocateQuery::new(type_name, method_name),
    )
}

/// Resolves a [`LocateQuery`], honoring its optional signature narrowing.
pub fn locate_query(module: &Module, query: &LocateQuery) -> Result<MethodHandle> {
    let type_index = module
        .find_type_index(&query.type_name)
        .ok_or_else(|| Error::TypeNotFound {
            type_name: query.type_name.clone(),
        })?;
    let type_def = &module.types[type_index];

    let matches: Vec<usize> = match &query.signature {
        Some(params) => type_def
            .methods_named(&query.method_name)
            .filter(|(_, method)| &method.signature.params == params)
            .map(|(index, _)| index)
            .collect(),
        None => type_def
            .methods_named(&query.method_name)
            .map(|(index, _)| index)
            .collect(),
    };

    match matches.as_slice() {
        [] => Err(Error::MethodNotFound {
            type_name: query.type_name.clone(),
            method_name: query.method_name.clone(),
        }),
        [method_index] => Ok(MethodHandle {
            type_index,
            method_index: *method_index,
        }),
        _ => Err(Error::AmbiguousMethod {
            type_name: query.type_name.clone(),
            method_name: query.method_name.clone(),
            candidates: matches.len(),
        }),
    }
}

/// Resolves many queries in parallel, failing on the first unresolvable one.
///
/// Results come back in query order. Lookup is read-only, so the fan-out is
/// safe against the shared module.
pub fn locate_many(module: &Module, queries: &[LocateQuery]) -> Result<Vec<MethodHandle>> {
    queries
        .par_iter()
        .map(|query| locate_query(module, query))
        .collect()
}
