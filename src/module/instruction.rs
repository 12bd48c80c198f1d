//! Instruction representation for method bodies.
//!
//! This module defines the type system for the instructions a module container
//! carries: the operation codes ([`OpCode`]), their operands ([`Operand`]), the
//! control flow classification used by injection and validation ([`FlowType`]),
//! and the label-addressed [`Instruction`] itself.
//!
//! # Architecture
//!
//! Control transfers are represented as references to instructions, not as raw
//! byte offsets: every instruction owns a body-unique [`Label`], and branch
//! operands name the label of their target. Splicing new instructions into a
//! body therefore never invalidates existing branch targets, which is what
//! makes entry/exit hook injection safe without offset fixups. Ordinal
//! positions exist only on the wire, where the container codec maps labels to
//! instruction indices and back.
//!
//! # Key Components
//!
//! - [`Instruction`] - One operation with its label and operand
//! - [`OpCode`] - The operation set, with fixed wire codes and stack behavior
//! - [`Operand`] - Type-safe operand representation
//! - [`OperandKind`] - Which operand shape an opcode requires
//! - [`FlowType`] - How an instruction affects control flow

use std::fmt;

use strum::{EnumCount, EnumIter};

/// A body-unique identifier for one instruction.
///
/// Labels are assigned when a body is decoded or when an instruction is
/// emitted, and stay stable across edits. Branch operands refer to labels, so
/// inserting or removing unrelated instructions never retargets a branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Label(u32);

impl Label {
    /// Creates a label from its raw value.
    pub fn new(value: u32) -> Self {
        Label(value)
    }

    /// The raw label value.
    pub fn value(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

/// The operation codes a method body can contain.
///
/// Discriminants are the wire encoding used by the container format and must
/// never be reordered. The set is deliberately small: enough to express
/// argument/local traffic, arithmetic, calls, branching, and returns, which is
/// everything the merge and injection engines need to reason about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumCount, EnumIter)]
#[repr(u8)]
pub enum OpCode {
    /// No operation
    Nop = 0x00,
    /// Load argument slot onto the stack
    LdArg = 0x01,
    /// Load local variable slot onto the stack
    LdLoc = 0x02,
    /// Store the top of the stack into a local variable slot
    StLoc = 0x03,
    /// Load a 32-bit integer constant
    LdcI4 = 0x04,
    /// Load an inline string constant
    LdStr = 0x05,
    /// Discard the top of the stack
    Pop = 0x06,
    /// Duplicate the top of the stack
    Dup = 0x07,
    /// Add the two topmost values
    Add = 0x08,
    /// Subtract the two topmost values
    Sub = 0x09,
    /// Multiply the two topmost values
    Mul = 0x0A,
    /// Compare the two topmost values for equality
    Ceq = 0x0B,
    /// Call the method named by a member reference
    Call = 0x0C,
    /// Return to the caller
    Ret = 0x0D,
    /// Unconditional branch
    Br = 0x0E,
    /// Branch if the top of the stack is non-zero
    BrTrue = 0x0F,
    /// Branch if the top of the stack is zero
    BrFalse = 0x10,
    /// Jump through a table of targets indexed by the top of the stack
    Switch = 0x11,
}

impl OpCode {
    /// Decodes a wire byte into an opcode.
    pub fn from_byte(byte: u8) -> Option<OpCode> {
        match byte {
            0x00 => Some(OpCode::Nop),
            0x01 => Some(OpCode::LdArg),
            0x02 => Some(OpCode::LdLoc),
            0x03 => Some(OpCode::StLoc),
            0x04 => Some(OpCode::LdcI4),
            0x05 => Some(OpCode::LdStr),
            0x06 => Some(OpCode::Pop),
            0x07 => Some(OpCode::Dup),
            0x08 => Some(OpCode::Add),
            0x09 => Some(OpCode::Sub),
            0x0A => Some(OpCode::Mul),
            0x0B => Some(OpCode::Ceq),
            0x0C => Some(OpCode::Call),
            0x0D => Some(OpCode::Ret),
            0x0E => Some(OpCode::Br),
            0x0F => Some(OpCode::BrTrue),
            0x10 => Some(OpCode::BrFalse),
            0x11 => Some(OpCode::Switch),
            _ => None,
        }
    }

    /// The wire encoding of this opcode.
    pub fn to_byte(self) -> u8 {
        self as u8
    }

    /// Human-readable mnemonic.
    pub fn mnemonic(self) -> &'static str {
        match self {
            OpCode::Nop => "nop",
            OpCode::LdArg => "ldarg",
            OpCode::LdLoc => "ldloc",
            OpCode::StLoc => "stloc",
            OpCode::LdcI4 => "ldc.i4",
            OpCode::LdStr => "ldstr",
            OpCode::Pop => "pop",
            OpCode::Dup => "dup",
            OpCode::Add => "add",
            OpCode::Sub => "sub",
            OpCode::Mul => "mul",
            OpCode::Ceq => "ceq",
            OpCode::Call => "call",
            OpCode::Ret => "ret",
            OpCode::Br => "br",
            OpCode::BrTrue => "brtrue",
            OpCode::BrFalse => "brfalse",
            OpCode::Switch => "switch",
        }
    }

    /// The operand shape this opcode requires.
    pub fn operand_kind(self) -> OperandKind {
        match self {
            OpCode::Nop
            | OpCode::Pop
            | OpCode::Dup
            | OpCode::Add
            | OpCode::Sub
            | OpCode::Mul
            | OpCode::Ceq
            | OpCode::Ret => OperandKind::None,
            OpCode::LdArg | OpCode::LdLoc | OpCode::StLoc => OperandKind::Slot,
            OpCode::LdcI4 => OperandKind::Int32,
            OpCode::LdStr => OperandKind::String,
            OpCode::Call => OperandKind::Member,
            OpCode::Br | OpCode::BrTrue | OpCode::BrFalse => OperandKind::Target,
            OpCode::Switch => OperandKind::SwitchTable,
        }
    }

    /// How this opcode affects control flow.
    pub fn flow_type(self) -> FlowType {
        match self {
            OpCode::Ret => FlowType::Return,
            OpCode::Br => FlowType::Branch,
            OpCode::BrTrue | OpCode::BrFalse => FlowType::ConditionalBranch,
            OpCode::Switch => FlowType::Switch,
            _ => FlowType::Normal,
        }
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

/// The operand shape an opcode requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandKind {
    /// No operand
    None,
    /// 32-bit signed immediate
    Int32,
    /// Argument or local variable slot index
    Slot,
    /// Inline UTF-8 string
    String,
    /// Index into the module's member reference table
    Member,
    /// Single branch target label
    Target,
    /// Table of branch target labels
    SwitchTable,
}

/// A decoded instruction operand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    /// No operand
    None,
    /// 32-bit signed immediate
    Int32(i32),
    /// Argument or local variable slot index
    Slot(u16),
    /// Inline string constant
    String(String),
    /// Index into the module's member reference table
    Member(u32),
    /// Branch target
    Target(Label),
    /// Switch target table
    Switch(Vec<Label>),
}

impl Operand {
    /// The shape of this operand.
    pub fn kind(&self) -> OperandKind {
        match self {
            Operand::None => OperandKind::None,
            Operand::Int32(_) => OperandKind::Int32,
            Operand::Slot(_) => OperandKind::Slot,
            Operand::String(_) => OperandKind::String,
            Operand::Member(_) => OperandKind::Member,
            Operand::Target(_) => OperandKind::Target,
            Operand::Switch(_) => OperandKind::SwitchTable,
        }
    }
}

/// How an instruction affects control flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowType {
    /// Execution continues with the next instruction
    Normal,
    /// Execution continues at the branch target only
    Branch,
    /// Execution continues at the target or falls through
    ConditionalBranch,
    /// Execution continues at one of the table targets or falls through
    Switch,
    /// Execution leaves the method
    Return,
}

/// One instruction in a method body.
///
/// Instructions are identified by their [`Label`], never by position; see the
/// module documentation for why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    /// Body-unique identity of this instruction
    pub label: Label,
    /// The operation
    pub opcode: OpCode,
    /// The operand, matching `opcode.operand_kind()`
    pub operand: Operand,
}

impl Instruction {
    /// Creates an instruction.
    pub fn new(label: Label, opcode: OpCode, operand: Operand) -> Self {
        Instruction {
            label,
            opcode,
            operand,
        }
    }

    /// `true` if this instruction is a normal exit point of its method.
    ///
    /// Only explicit returns count as exit points; exceptional control
    /// transfers are not modelled and are never treated as exits.
    pub fn is_exit(&self) -> bool {
        self.opcode.flow_type() == FlowType::Return
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.operand {
            Operand::None => write!(f, "{}: {}", self.label, self.opcode),
            Operand::Int32(value) => write!(f, "{}: {} {}", self.label, self.opcode, value),
            Operand::Slot(slot) => write!(f, "{}: {} {}", self.label, self.opcode, slot),
            Operand::String(text) => write!(f, "{}: {} \"{}\"", self.label, self.opcode, text),
            Operand::Member(index) => write!(f, "{}: {} #{}", self.label, self.opcode, index),
            Operand::Target(target) => write!(f, "{}: {} {}", self.label, self.opcode, target),
            Operand::Switch(targets) => {
                write!(f, "{}: {} [", self.label, self.opcode)?;
                for (position, target) in targets.iter().enumerate() {
                    if position > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{target}")?;
                }
                write!(f, "]")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn wire_codes_roundtrip() {
        for opcode in OpCode::iter() {
            assert_eq!(
                OpCode::from_byte(opcode.to_byte()),
                Some(opcode),
                "wire code for {opcode} must roundtrip"
            );
        }
        assert_eq!(OpCode::from_byte(0xFF), None);
    }

    #[test]
    fn operand_kinds_are_consistent() {
        assert_eq!(OpCode::Call.operand_kind(), OperandKind::Member);
        assert_eq!(Operand::Member(3).kind(), OperandKind::Member);
        assert_eq!(OpCode::Switch.operand_kind(), OperandKind::SwitchTable);
        assert_eq!(Operand::Switch(vec![]).kind(), OperandKind::SwitchTable);
    }

    #[test]
    fn exit_classification() {
        let ret = Instruction::new(Label::new(0), OpCode::Ret, Operand::None);
        let br = Instruction::new(Label::new(1), OpCode::Br, Operand::Target(Label::new(0)));
        assert!(ret.is_exit());
        assert!(!br.is_exit());
    }

    #[test]
    fn display_formats() {
        let instr = Instruction::new(Label::new(4), OpCode::LdcI4, Operand::Int32(7));
        assert_eq!(instr.to_string(), "L4: ldc.i4 7");
    }
}
