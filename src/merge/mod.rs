//! Combining modules into one self-contained module.
//!
//! Merging copies every type from one or more supplementary modules into a
//! primary module, producing a fresh [`Module`] and leaving both inputs
//! untouched. Three concerns make this more than concatenation:
//!
//! - **Name collisions.** Independently compiled modules routinely carry
//!   duplicate copies of shared dependency types. Collisions are resolved
//!   deterministically by merge order: the first-seen definition survives and
//!   later colliding definitions are dropped. Dropping is only sound when the
//!   definitions are interchangeable, so colliding types must agree on their
//!   full member name/signature sets; any mismatch is a hard
//!   [`crate::Error::MergeConflict`], never a silent pick.
//! - **Reference rewriting.** Member references that pointed at a dropped
//!   duplicate resolve by name against the survivor. References that were
//!   external in their original module but now name a type living inside the
//!   merged module are rewritten to internal references; references to
//!   genuinely external modules stay external.
//! - **Reference table hygiene.** Copied method bodies carry reference
//!   indices of their source module; those are remapped into the merged
//!   module's tables, and extern modules that no reference uses anymore are
//!   dropped from the extern table.
//!
//! # Usage Examples
//!
//! ```rust,no_run
//! use patchscope::{merge::merge, Module};
//! use std::path::Path;
//!
//! let primary = Module::from_file(Path::new("game.psmc"))?;
//! let hooks = Module::from_file(Path::new("hooks.psmc"))?;
//! let merged = merge(&primary, std::slice::from_ref(&hooks))?;
//! assert!(merged.find_type("Game.Game1").is_some());
//! # Ok::<(), patchscope::Error>(())
//! ```

use std::collections::HashSet;

use crate::{
    module::{MemberRef, Module, Operand, RefScope, TypeDef},
    Error, Result,
};

/// Merges `supplements` into `primary`, producing a new module.
///
/// Supplements are applied in order; collision resolution is first-seen-wins
/// across the primary and all earlier supplements. Inputs are not mutated, so
/// a failed merge can be retried with different supplements without reloading
/// anything from disk.
///
/// # Errors
/// [`crate::Error::MergeConflict`] when colliding definitions cannot be
/// reconciled by reference rewriting alone, [`crate::Error::Malformed`] when a
/// supplement's own reference tables are broken.
pub fn merge(primary: &Module, supplements: &[Module]) -> Result<Module> {
    let mut merged = primary.clone();

    for supplement in supplements {
        merge_one(&mut merged, supplement)?;
    }

    internalize_references(&mut merged)?;
    rebuild_extern_table(&mut merged);

    Ok(merged)
}

fn merge_one(merged: &mut Module, supplement: &Module) -> Result<()> {
    let first_new_type = merged.types.len();

    for type_def in &supplement.types {
        match merged.find_type(&type_def.full_name) {
            Some(existing) => ensure_compatible(existing, type_def)?,
            None => {
                merged.add_type(type_def.clone());
            }
        }
    }

    // Remap the supplement's reference table into the merged module's table.
    let mut ref_map = Vec::with_capacity(supplement.member_refs.len());
    for member_ref in &supplement.member_refs {
        let remapped = remap_reference(merged, supplement, member_ref)?;
        ref_map.push(merged.intern_member_ref(remapped));
    }

    // Bodies copied this round still carry supplement-relative indices.
    for type_def in &mut merged.types[first_new_type..] {
        for method in &mut type_def.methods {
            for instruction in &mut method.body.instructions {
                if let Operand::Member(index) = &mut instruction.operand {
                    let mapped = ref_map.get(*index as usize).ok_or_else(|| {
                        malformed_error!(
                            "Supplement '{}' body references missing member #{}",
                            supplement.name,
                            index
                        )
                    })?;
                    *index = *mapped;
                }
            }
        }
    }

    Ok(())
}

fn remap_reference(
    merged: &mut Module,
    supplement: &Module,
    member_ref: &MemberRef,
) -> Result<MemberRef> {
    match member_ref.scope {
        RefScope::Internal => {
            // The type is either freshly copied or a colliding survivor;
            // either way it must resolve by name, with a matching signature.
            check_internal_resolution(merged, member_ref)?;
            Ok(MemberRef {
                scope: RefScope::Internal,
                ..member_ref.clone()
            })
        }
        RefScope::Extern(extern_index) => {
            let module_name = supplement
                .extern_refs
                .get(extern_index as usize)
                .ok_or_else(|| {
                    malformed_error!(
                        "Supplement '{}' reference to '{}.{}' names missing extern module index {}",
                        supplement.name,
                        member_ref.type_name,
                        member_ref.member_name,
                        extern_index
                    )
                })?;

            if merged.find_type(&member_ref.type_name).is_some() {
                check_internal_resolution(merged, member_ref)?;
                Ok(MemberRef {
                    scope: RefScope::Internal,
                    ..member_ref.clone()
                })
            } else {
                let extern_index = merged.intern_extern_ref(module_name);
                Ok(MemberRef {
                    scope: RefScope::Extern(extern_index),
                    ..member_ref.clone()
                })
            }
        }
    }
}

/// Rewrites external references that now resolve inside the merged module.
///
/// Runs after all supplements are in so that a reference held by the primary,
/// or by an early supplement, still becomes internal when a later supplement
/// provides the type.
fn internalize_references(merged: &mut Module) -> Result<()> {
    for index in 0..merged.member_refs.len() {
        let member_ref = merged.member_refs[index].clone();
        if let RefScope::Extern(_) = member_ref.scope {
            if merged.find_type(&member_ref.type_name).is_some() {
                check_internal_resolution(merged, &member_ref)?;
                merged.member_refs[index].scope = RefScope::Internal;
            }
        }
    }
    Ok(())
}

fn check_internal_resolution(merged: &Module, member_ref: &MemberRef) -> Result<()> {
    let type_def = merged.find_type(&member_ref.type_name).ok_or_else(|| {
        malformed_error!(
            "Reference to '{}.{}' does not resolve to any merged type",
            member_ref.type_name,
            member_ref.member_name
        )
    })?;

    let resolves = type_def.methods_named(&member_ref.member_name).any(|(_, method)| {
        method.arg_slots() == member_ref.param_count
            && method.returns_value() == member_ref.returns
    });
    if !resolves {
        return Err(Error::MergeConflict {
            type_name: member_ref.type_name.clone(),
            reason: format!(
                "reference to member '{}' cannot be rewritten: no method with {} argument slot(s){} exists on the surviving definition",
                member_ref.member_name,
                member_ref.param_count,
                if member_ref.returns { " returning a value" } else { "" },
            ),
        });
    }
    Ok(())
}

fn ensure_compatible(survivor: &TypeDef, dropped: &TypeDef) -> Result<()> {
    let shape = |type_def: &TypeDef| {
        let mut members: Vec<(String, Vec<String>, Option<String>, bool)> = type_def
            .methods
            .iter()
            .map(|method| {
                (
                    method.name.clone(),
                    method.signature.params.clone(),
                    method.signature.returns.clone(),
                    method.is_static(),
                )
            })
            .collect();
        members.sort();
        members
    };

    let survivor_shape = shape(survivor);
    let dropped_shape = shape(dropped);
    if survivor_shape == dropped_shape {
        return Ok(());
    }

    let divergent = dropped_shape
        .iter()
        .find(|member| !survivor_shape.contains(member))
        .or_else(|| survivor_shape.iter().find(|member| !dropped_shape.contains(member)));

    Err(Error::MergeConflict {
        type_name: survivor.full_name.clone(),
        reason: match divergent {
            Some((name, params, returns, _)) => format!(
                "colliding definitions disagree on member '{}({})' -> {}",
                name,
                params.join(", "),
                returns.as_deref().unwrap_or("Void")
            ),
            None => "colliding definitions have incompatible member sets".to_string(),
        },
    })
}

/// Drops extern modules no surviving reference uses and compacts the indices.
fn rebuild_extern_table(merged: &mut Module) {
    let used: HashSet<u32> = merged
        .member_refs
        .iter()
        .filter_map(|member_ref| match member_ref.scope {
            RefScope::Extern(index) => Some(index),
            RefScope::Internal => None,
        })
        .collect();

    let mut remap = vec![None; merged.extern_refs.len()];
    let mut compacted = Vec::with_capacity(used.len());
    for (index, name) in merged.extern_refs.iter().enumerate() {
        if used.contains(&(index as u32)) {
            remap[index] = Some(compacted.len() as u32);
            compacted.push(name.clone());
        }
    }

    merged.extern_refs = compacted;
    for member_ref in &mut merged.member_refs {
        if let RefScope::Extern(index) = &mut member_ref.scope {
            if let Some(Some(new_index)) = remap.get(*index as usize) {
                *index = *new_index;
            }
        }
    }
}
