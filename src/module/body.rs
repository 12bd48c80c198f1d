//! Representation of one method's executable body.
//!
//! A [`MethodBody`] owns an ordered instruction sequence, the method's local
//! variable slots, and the label counter used to mint body-unique
//! [`crate::module::Label`]s. Bodies are mutated exclusively by wholesale
//! replacement of the instruction list ([`MethodBody::replace_instructions`]),
//! which is what gives the hook injector its patch-or-unchanged guarantee.

use crate::module::instruction::{Instruction, Label, OpCode, Operand};

/// The executable body of a method.
///
/// # Examples
///
/// ```rust
/// use patchscope::module::{MethodBody, OpCode, Operand};
///
/// let mut body = MethodBody::new();
/// body.emit(OpCode::LdcI4, Operand::Int32(42));
/// body.emit(OpCode::Ret, Operand::None);
/// assert_eq!(body.instructions.len(), 2);
/// assert_eq!(body.exit_points().len(), 1);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MethodBody {
    /// Maximum evaluation stack depth this body requires
    pub max_stack: u16,
    /// Type names of the local variable slots, in slot order
    pub locals: Vec<String>,
    /// The instruction sequence
    pub instructions: Vec<Instruction>,
    /// Next unassigned label value
    next_label: u32,
}

impl MethodBody {
    /// Creates an empty body with no locals and no instructions.
    pub fn new() -> Self {
        MethodBody::default()
    }

    /// Rebuilds a body from decoded parts. Labels in `instructions` must be
    /// below `next_label`.
    pub(crate) fn from_parts(
        max_stack: u16,
        locals: Vec<String>,
        instructions: Vec<Instruction>,
        next_label: u32,
    ) -> Self {
        MethodBody {
            max_stack,
            locals,
            instructions,
            next_label,
        }
    }

    /// Mints a fresh body-unique label without emitting an instruction.
    pub fn fresh_label(&mut self) -> Label {
        let label = Label::new(self.next_label);
        self.next_label += 1;
        label
    }

    /// Appends an instruction and returns its label.
    pub fn emit(&mut self, opcode: OpCode, operand: Operand) -> Label {
        let label = self.fresh_label();
        self.instructions.push(Instruction::new(label, opcode, operand));
        label
    }

    /// Adds a local variable slot and returns its index.
    pub fn add_local(&mut self, type_name: impl Into<String>) -> u16 {
        self.locals.push(type_name.into());
        u16::try_from(self.locals.len() - 1).unwrap_or(u16::MAX)
    }

    /// Position of the instruction carrying `label`, if present.
    pub fn index_of(&self, label: Label) -> Option<usize> {
        self.instructions
            .iter()
            .position(|instruction| instruction.label == label)
    }

    /// Labels of every normal exit point, in instruction order.
    ///
    /// A method may have more than one return; each is an independent exit
    /// point for exit-hook injection.
    pub fn exit_points(&self) -> Vec<Label> {
        self.instructions
            .iter()
            .filter(|instruction| instruction.is_exit())
            .map(|instruction| instruction.label)
            .collect()
    }

    /// Replaces the whole instruction sequence.
    ///
    /// Callers build the replacement list completely before committing it, so
    /// a failure while preparing an edit leaves the body untouched.
    pub fn replace_instructions(&mut self, instructions: Vec<Instruction>) {
        self.instructions = instructions;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_are_unique_and_stable() {
        let mut body = MethodBody::new();
        let first = body.emit(OpCode::Nop, Operand::None);
        let second = body.emit(OpCode::Ret, Operand::None);
        assert_ne!(first, second);
        assert_eq!(body.index_of(first), Some(0));
        assert_eq!(body.index_of(second), Some(1));

        let fresh = body.fresh_label();
        assert!(fresh.value() > second.value());
        assert_eq!(body.index_of(fresh), None);
    }

    #[test]
    fn exit_points_enumerates_every_return() {
        let mut body = MethodBody::new();
        let early = body.emit(OpCode::Ret, Operand::None);
        body.emit(OpCode::Nop, Operand::None);
        let late = body.emit(OpCode::Ret, Operand::None);
        assert_eq!(body.exit_points(), vec![early, late]);
    }

    #[test]
    fn local_slots_are_indexed_in_order() {
        let mut body = MethodBody::new();
        assert_eq!(body.add_local("Int32"), 0);
        assert_eq!(body.add_local("String"), 1);
        assert_eq!(body.locals, vec!["Int32", "String"]);
    }
}
