//! Structural validation of modules and method bodies.
//!
//! The engine assumes target method bodies are well-formed before patching and
//! must leave them well-formed after; this module is where that property is
//! checked. Validation covers the reference tables, the entry point, and every
//! method body: operand shapes, slot bounds, branch targets, and a forward
//! evaluation-stack simulation that rejects underflow, inconsistent depths at
//! join points, and returns with the wrong number of values on the stack.
//!
//! [`crate::module::Module::validate`] is the public entry point; the
//! injection engine additionally uses the stack simulation to recompute
//! `max_stack` after splicing hook calls into a body.

use std::collections::HashMap;

use crate::{
    module::{
        instruction::{FlowType, Instruction, Label, OpCode, Operand},
        MemberRef, MethodDef, Module, RefScope, TypeDef,
    },
    Result,
};

/// Validates the whole module. See [`crate::module::Module::validate`].
pub(crate) fn validate_module(module: &Module) -> Result<()> {
    for (index, type_def) in module.types.iter().enumerate() {
        if module.find_type_index(&type_def.full_name) != Some(index) {
            return Err(malformed_error!(
                "Duplicate type definition '{}'",
                type_def.full_name
            ));
        }
    }

    for (index, member_ref) in module.member_refs.iter().enumerate() {
        validate_member_ref(module, index, member_ref)?;
    }

    if let Some(entry_point) = &module.entry_point {
        let type_def = module.types.get(entry_point.type_index as usize).ok_or_else(|| {
            malformed_error!("Entry point references missing type index {}", entry_point.type_index)
        })?;
        if type_def.methods.get(entry_point.method_index as usize).is_none() {
            return Err(malformed_error!(
                "Entry point references missing method index {} on type '{}'",
                entry_point.method_index,
                type_def.full_name
            ));
        }
    }

    for type_def in &module.types {
        for method in &type_def.methods {
            validate_body(module, type_def, method)?;
            let depth = simulate_stack(module, type_def, method)?;
            if depth > method.body.max_stack {
                return Err(malformed_error!(
                    "Method '{}.{}' needs stack depth {} but declares max_stack {}",
                    type_def.full_name,
                    method.name,
                    depth,
                    method.body.max_stack
                ));
            }
        }
    }

    Ok(())
}

fn validate_member_ref(module: &Module, index: usize, member_ref: &MemberRef) -> Result<()> {
    match member_ref.scope {
        RefScope::Extern(extern_index) => {
            if module.extern_refs.get(extern_index as usize).is_none() {
                return Err(malformed_error!(
                    "Member reference #{} names missing extern module index {}",
                    index,
                    extern_index
                ));
            }
            Ok(())
        }
        RefScope::Internal => {
            let type_def = module.find_type(&member_ref.type_name).ok_or_else(|| {
                malformed_error!(
                    "Member reference #{index} to '{}.{}' does not resolve to an internal type",
                    member_ref.type_name,
                    member_ref.member_name
                )
            })?;
            let matches = type_def.methods_named(&member_ref.member_name).any(|(_, method)| {
                method.arg_slots() == member_ref.param_count
                    && method.returns_value() == member_ref.returns
            });
            if !matches {
                return Err(malformed_error!(
                    "Member reference #{index} to '{}.{}' does not match any method signature",
                    member_ref.type_name,
                    member_ref.member_name
                ));
            }
            Ok(())
        }
    }
}

fn validate_body(module: &Module, type_def: &TypeDef, method: &MethodDef) -> Result<()> {
    let body = &method.body;
    let context = || format!("{}.{}", type_def.full_name, method.name);

    let mut seen = HashMap::with_capacity(body.instructions.len());
    for (position, instruction) in body.instructions.iter().enumerate() {
        if seen.insert(instruction.label, position).is_some() {
            return Err(malformed_error!(
                "Duplicate instruction label {} in '{}'",
                instruction.label,
                context()
            ));
        }
    }

    for instruction in &body.instructions {
        if instruction.operand.kind() != instruction.opcode.operand_kind() {
            return Err(malformed_error!(
                "Instruction '{}' in '{}' carries a {:?} operand but requires {:?}",
                instruction,
                context(),
                instruction.operand.kind(),
                instruction.opcode.operand_kind()
            ));
        }

        match &instruction.operand {
            Operand::Slot(slot) => {
                let bound = match instruction.opcode {
                    OpCode::LdArg => method.arg_slots(),
                    _ => u16::try_from(body.locals.len()).unwrap_or(u16::MAX),
                };
                if *slot >= bound {
                    return Err(malformed_error!(
                        "Instruction '{}' in '{}' references slot {} of {}",
                        instruction,
                        context(),
                        slot,
                        bound
                    ));
                }
            }
            Operand::Member(ref_index) => {
                if module.member_refs.get(*ref_index as usize).is_none() {
                    return Err(malformed_error!(
                        "Instruction '{}' in '{}' references missing member #{}",
                        instruction,
                        context(),
                        ref_index
                    ));
                }
            }
            Operand::Target(target) => {
                if !seen.contains_key(target) {
                    return Err(malformed_error!(
                        "Instruction '{}' in '{}' branches to missing label {}",
                        instruction,
                        context(),
                        target
                    ));
                }
            }
            Operand::Switch(targets) => {
                for target in targets {
                    if !seen.contains_key(target) {
                        return Err(malformed_error!(
                            "Instruction '{}' in '{}' switches to missing label {}",
                            instruction,
                            context(),
                            target
                        ));
                    }
                }
            }
            _ => {}
        }
    }

    if let Some(last) = body.instructions.last() {
        match last.opcode.flow_type() {
            FlowType::Return | FlowType::Branch => {}
            _ => {
                return Err(malformed_error!(
                    "Method '{}' falls off the end of its body after '{}'",
                    context(),
                    last
                ));
            }
        }
    }

    Ok(())
}

/// Simulates the evaluation stack of `method` and returns the maximum depth
/// any reachable point requires.
///
/// # Errors
/// [`crate::Error::Malformed`] on stack underflow, inconsistent depths where
/// control paths join, or a return with the wrong number of values on the
/// stack.
pub(crate) fn simulate_stack(
    module: &Module,
    type_def: &TypeDef,
    method: &MethodDef,
) -> Result<u16> {
    let body = &method.body;
    if body.instructions.is_empty() {
        return Ok(0);
    }

    let mut position_of = HashMap::with_capacity(body.instructions.len());
    for (position, instruction) in body.instructions.iter().enumerate() {
        position_of.insert(instruction.label, position);
    }

    let context = || format!("{}.{}", type_def.full_name, method.name);
    let ret_arity = i32::from(method.returns_value());

    let mut depth_at: Vec<Option<i32>> = vec![None; body.instructions.len()];
    let mut worklist = vec![(0usize, 0i32)];
    let mut max_depth = 0i32;

    while let Some((position, depth)) = worklist.pop() {
        match depth_at[position] {
            Some(known) if known == depth => continue,
            Some(known) => {
                return Err(malformed_error!(
                    "Inconsistent stack depth at '{}' in '{}': {} vs {}",
                    body.instructions[position],
                    context(),
                    known,
                    depth
                ));
            }
            None => depth_at[position] = Some(depth),
        }

        let instruction = &body.instructions[position];
        let (pops, pushes) = stack_effect(module, instruction, ret_arity)?;

        if depth < pops {
            return Err(malformed_error!(
                "Stack underflow at '{}' in '{}': depth {} with {} operands required",
                instruction,
                context(),
                depth,
                pops
            ));
        }
        let after = depth - pops + pushes;
        max_depth = max_depth.max(depth.max(after));

        if instruction.opcode.flow_type() == FlowType::Return {
            if depth != ret_arity {
                return Err(malformed_error!(
                    "Return in '{}' leaves stack depth {} but the method {}",
                    context(),
                    depth,
                    if ret_arity == 1 {
                        "returns one value"
                    } else {
                        "returns nothing"
                    }
                ));
            }
            continue;
        }

        for successor in successors(instruction, position, &position_of) {
            if successor >= body.instructions.len() {
                return Err(malformed_error!(
                    "Control falls off the end of '{}' after '{}'",
                    context(),
                    instruction
                ));
            }
            worklist.push((successor, after));
        }
    }

    Ok(u16::try_from(max_depth).unwrap_or(u16::MAX))
}

fn stack_effect(module: &Module, instruction: &Instruction, ret_arity: i32) -> Result<(i32, i32)> {
    let effect = match instruction.opcode {
        OpCode::Nop => (0, 0),
        OpCode::LdArg | OpCode::LdLoc | OpCode::LdcI4 | OpCode::LdStr => (0, 1),
        OpCode::StLoc | OpCode::Pop => (1, 0),
        OpCode::Dup => (1, 2),
        OpCode::Add | OpCode::Sub | OpCode::Mul | OpCode::Ceq => (2, 1),
        OpCode::Ret => (ret_arity, 0),
        OpCode::Br => (0, 0),
        OpCode::BrTrue | OpCode::BrFalse | OpCode::Switch => (1, 0),
        OpCode::Call => {
            let Operand::Member(ref_index) = instruction.operand else {
                return Err(malformed_error!("Call instruction without a member operand"));
            };
            let member_ref = module
                .member_refs
                .get(ref_index as usize)
                .ok_or_else(|| malformed_error!("Call references missing member #{}", ref_index))?;
            (i32::from(member_ref.param_count), i32::from(member_ref.returns))
        }
    };
    Ok(effect)
}

fn successors(
    instruction: &Instruction,
    position: usize,
    position_of: &HashMap<Label, usize>,
) -> Vec<usize> {
    let target_position = |label: &Label| position_of.get(label).copied();

    match instruction.opcode.flow_type() {
        FlowType::Return => Vec::new(),
        FlowType::Normal => vec![position + 1],
        FlowType::Branch => match &instruction.operand {
            Operand::Target(target) => target_position(target).into_iter().collect(),
            _ => Vec::new(),
        },
        FlowType::ConditionalBranch => {
            let mut result = vec![position + 1];
            if let Operand::Target(target) = &instruction.operand {
                result.extend(target_position(target));
            }
            result
        }
        FlowType::Switch => {
            let mut result = vec![position + 1];
            if let Operand::Switch(targets) = &instruction.operand {
                for target in targets {
                    result.extend(target_position(target));
                }
            }
            result
        }
    }
}
