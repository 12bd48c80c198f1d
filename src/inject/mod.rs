//! Splicing hook calls into method bodies.
//!
//! The injector rewrites a located method so that a hook method is called at
//! designated points while the method's observable behavior is otherwise
//! unchanged:
//!
//! - [`inject_entry`] places a call to the hook before the method's original
//!   first instruction, so the hook runs before any original side effect.
//! - [`inject_exit`] places a call immediately before **every** return
//!   instruction — a method may have several — and retargets any branch that
//!   jumped directly to a return onto the spliced call, so the hook observes
//!   control just before the method actually leaves, on every return path.
//!
//! # Guarantees
//!
//! - Argument and local slot numbering is untouched; an instruction that read
//!   slot 3 before injection still reads slot 3 afterwards.
//! - Every spliced sequence is stack-neutral: an optional `ldarg.0` to
//!   forward the patched method's slot 0, the call itself, and a `pop` when
//!   the hook returns a value. The evaluation stack depth after the splice
//!   equals the depth before it at that point.
//! - Branch targets are labels, not offsets, so instructions that branch into
//!   the untouched portion of the body keep their targets without fixups. An
//!   entry prologue runs exactly once; loop back-edges to the original first
//!   instruction do not re-enter it.
//! - The replacement instruction list is built completely before it is
//!   committed, and the rewritten body is stack-simulated before the commit;
//!   on any failure the method body is left exactly as it was.
//!
//! Exceptional (non-return) exits are not instrumented; only explicit return
//! points are exit points.
//!
//! # Failure Modes
//!
//! Every unresolvable or unusable hook is
//! [`crate::Error::InjectionTargetInvalid`]: the hook's type or method is
//! absent from the module (the merge step must run first and must include the
//! hook-defining module), the hook is not static, takes more than one
//! argument, or forwards an argument the target cannot supply.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{
    locate::MethodHandle,
    module::{
        validation, Instruction, Label, MemberRef, MethodDef, Module, OpCode, Operand, RefScope,
    },
    Error, Result,
};

/// An identifier for a hook method: declaring type plus method name.
///
/// Hook references are supplied by the caller of each pass and resolved
/// against the merged module's own type table at injection time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HookRef {
    /// Fully qualified name of the hook's declaring type
    pub type_name: String,
    /// Name of the hook method
    pub method_name: String,
}

impl HookRef {
    /// Creates a hook reference.
    pub fn new(type_name: impl Into<String>, method_name: impl Into<String>) -> Self {
        HookRef {
            type_name: type_name.into(),
            method_name: method_name.into(),
        }
    }
}

impl std::fmt::Display for HookRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.type_name, self.method_name)
    }
}

struct ResolvedHook {
    member_ref: MemberRef,
    forwards_argument: bool,
    returns: bool,
}

/// Injects a call to `hook` at the entry of the method `target` names.
///
/// # Errors
/// [`crate::Error::InjectionTargetInvalid`] if the hook cannot be resolved or
/// applied; the target body is unchanged in that case.
pub fn inject_entry(module: &mut Module, target: MethodHandle, hook: &HookRef) -> Result<()> {
    let resolved = resolve_hook(module, target, hook)?;
    let ref_index = module.intern_member_ref(resolved.member_ref.clone());

    let (type_index, method_index) = (target.type_index, target.method_index);
    let mut candidate = module.types[type_index].methods[method_index].clone();

    let mut instructions = Vec::with_capacity(candidate.body.instructions.len() + 3);
    instructions.extend(splice_sequence(&mut candidate, &resolved, ref_index));
    instructions.extend(candidate.body.instructions.iter().cloned());
    candidate.body.replace_instructions(instructions);

    commit(module, target, candidate)
}

/// Injects a call to `hook` immediately before every return of the method
/// `target` names.
///
/// Branches and switch entries that targeted a return are retargeted onto the
/// spliced call so the hook fires on every return path, including jumps
/// straight to a shared return instruction. The method's return value is not
/// disturbed. A body with no return instructions is left unchanged.
///
/// # Errors
/// [`crate::Error::InjectionTargetInvalid`] if the hook cannot be resolved or
/// applied; the target body is unchanged in that case.
pub fn inject_exit(module: &mut Module, target: MethodHandle, hook: &HookRef) -> Result<()> {
    let resolved = resolve_hook(module, target, hook)?;
    let ref_index = module.intern_member_ref(resolved.member_ref.clone());

    let (type_index, method_index) = (target.type_index, target.method_index);
    let mut candidate = module.types[type_index].methods[method_index].clone();
    if candidate.body.exit_points().is_empty() {
        return Ok(());
    }

    let originals: Vec<Instruction> = candidate.body.instructions.clone();
    let mut instructions = Vec::with_capacity(originals.len() + 3);
    let mut retargeted: HashMap<Label, Label> = HashMap::new();

    for instruction in originals {
        if instruction.is_exit() {
            let splice = splice_sequence(&mut candidate, &resolved, ref_index);
            retargeted.insert(instruction.label, splice[0].label);
            instructions.extend(splice);
        }
        instructions.push(instruction);
    }

    for instruction in &mut instructions {
        match &mut instruction.operand {
            Operand::Target(target_label) => {
                if let Some(new_target) = retargeted.get(target_label) {
                    *target_label = *new_target;
                }
            }
            Operand::Switch(targets) => {
                for target_label in targets {
                    if let Some(new_target) = retargeted.get(target_label) {
                        *target_label = *new_target;
                    }
                }
            }
            _ => {}
        }
    }

    candidate.body.replace_instructions(instructions);
    commit(module, target, candidate)
}

/// Builds the stack-neutral call sequence for one injection point.
fn splice_sequence(
    candidate: &mut MethodDef,
    resolved: &ResolvedHook,
    ref_index: u32,
) -> Vec<Instruction> {
    let mut splice = Vec::with_capacity(3);
    if resolved.forwards_argument {
        splice.push(Instruction::new(
            candidate.body.fresh_label(),
            OpCode::LdArg,
            Operand::Slot(0),
        ));
    }
    splice.push(Instruction::new(
        candidate.body.fresh_label(),
        OpCode::Call,
        Operand::Member(ref_index),
    ));
    if resolved.returns {
        splice.push(Instruction::new(
            candidate.body.fresh_label(),
            OpCode::Pop,
            Operand::None,
        ));
    }
    splice
}

/// Stack-checks the rewritten method and swaps it in.
fn commit(module: &mut Module, target: MethodHandle, mut candidate: MethodDef) -> Result<()> {
    let type_def = &module.types[target.type_index];
    let required = validation::simulate_stack(module, type_def, &candidate)?;
    candidate.body.max_stack = candidate.body.max_stack.max(required);

    module.types[target.type_index].methods[target.method_index] = candidate;
    Ok(())
}

fn resolve_hook(module: &Module, target: MethodHandle, hook: &HookRef) -> Result<ResolvedHook> {
    let invalid = |reason: String| Error::InjectionTargetInvalid {
        type_name: hook.type_name.clone(),
        method_name: hook.method_name.clone(),
        reason,
    };

    let (target_type, target_method) = target
        .resolve(module)
        .ok_or_else(|| malformed_error!("Stale method handle passed to the injector"))?;

    let hook_type = module
        .find_type(&hook.type_name)
        .ok_or_else(|| invalid("hook type is not present in the module".to_string()))?;

    let matches: Vec<&MethodDef> = hook_type
        .methods_named(&hook.method_name)
        .map(|(_, method)| method)
        .collect();
    let hook_method = match matches.as_slice() {
        [] => return Err(invalid("hook method is not defined on its type".to_string())),
        [method] => *method,
        _ => {
            return Err(invalid(format!(
                "hook name matches {} overloads",
                matches.len()
            )))
        }
    };

    if !hook_method.is_static() {
        return Err(invalid("hook methods must be static".to_string()));
    }

    let forwards_argument = match hook_method.signature.params.len() {
        0 => false,
        1 => {
            let forwarded_type = if target_method.is_static() {
                target_method.signature.params.first().cloned()
            } else {
                Some(target_type.full_name.clone())
            };
            match forwarded_type {
                None => {
                    return Err(invalid(format!(
                        "hook takes one argument but target '{}.{}' has no argument slot to forward",
                        target_type.full_name, target_method.name
                    )))
                }
                Some(forwarded_type) if forwarded_type != hook_method.signature.params[0] => {
                    return Err(invalid(format!(
                        "hook expects '{}' but the target forwards '{}'",
                        hook_method.signature.params[0], forwarded_type
                    )))
                }
                Some(_) => true,
            }
        }
        arity => {
            return Err(invalid(format!(
                "hook takes {arity} arguments, only zero or one is supported"
            )))
        }
    };

    Ok(ResolvedHook {
        member_ref: MemberRef {
            scope: RefScope::Internal,
            type_name: hook.type_name.clone(),
            member_name: hook.method_name.clone(),
            param_count: u16::from(forwards_argument),
            returns: hook_method.returns_value(),
        },
        forwards_argument,
        returns: hook_method.returns_value(),
    })
}
