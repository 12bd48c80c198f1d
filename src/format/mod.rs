//! Binary module container encoding and decoding.
//!
//! This module implements the patchscope module container (PSMC) format, the
//! on-disk representation of a [`crate::module::Module`]. A container is a
//! little-endian stream:
//!
//! ```text
//! [magic "PSMC"] [version u16] [flags u16]
//! [module name]
//! [entry point: type index u32, method index u32]
//! [extern refs] [member refs] [types -> methods -> bodies -> instructions]
//! [SHA-1 digest over all preceding bytes]
//! ```
//!
//! Strings are `u32`-length-prefixed UTF-8. Branch operands are stored as
//! instruction ordinals within their body and materialized as stable
//! [`crate::module::Label`]s on load; nothing offset-addressed survives into
//! the in-memory model. The trailing digest is verified on load, so silent
//! corruption of an intermediate artifact surfaces as
//! [`crate::Error::Malformed`] instead of propagating into a patched output.
//!
//! Decoding an unmutated module and encoding it again is byte-identical.
//!
//! # Failure Modes
//!
//! - [`crate::Error::Empty`] - empty input
//! - [`crate::Error::NotSupported`] - wrong magic, or a structural version
//!   this library does not understand
//! - [`crate::Error::Malformed`] - truncation, dangling indices or ordinals,
//!   invalid operand encodings, digest mismatch
//! - [`crate::Error::FileError`] - I/O while reading from disk

use std::{fs, path::Path};

use memmap2::Mmap;
use sha1::{Digest, Sha1};

use crate::{
    file::{Parser, Writer},
    module::{
        EntryPoint, Instruction, Label, MemberRef, MethodAttributes, MethodBody, MethodDef, Module,
        OpCode, Operand, OperandKind, RefScope, Signature, TypeAttributes, TypeDef,
    },
    Result,
};

/// Magic bytes opening every module container.
pub const FORMAT_MAGIC: [u8; 4] = *b"PSMC";

/// The structural version this library reads and writes.
pub const FORMAT_VERSION: u16 = 1;

/// Size of the trailing SHA-1 content digest in bytes.
pub const DIGEST_SIZE: usize = 20;

const NO_INDEX: u32 = 0xFFFF_FFFF;

/// Loads a module container from disk through a memory mapping.
pub(crate) fn read_file(path: &Path) -> Result<Module> {
    let file = fs::File::open(path)?;
    if file.metadata()?.len() == 0 {
        return Err(crate::Error::Empty);
    }

    // File backed read-only mapping; the file is not written through it
    let mmap = unsafe { Mmap::map(&file)? };
    read_module(&mmap)
}

/// Decodes a module container from memory.
pub(crate) fn read_module(data: &[u8]) -> Result<Module> {
    if data.is_empty() {
        return Err(crate::Error::Empty);
    }
    if data.len() < FORMAT_MAGIC.len() + 4 || data[..FORMAT_MAGIC.len()] != FORMAT_MAGIC {
        return Err(crate::Error::NotSupported);
    }

    let mut parser = Parser::new(data);
    parser.seek(FORMAT_MAGIC.len())?;
    let version = parser.read_le::<u16>()?;
    if version != FORMAT_VERSION {
        return Err(crate::Error::NotSupported);
    }
    let _flags = parser.read_le::<u16>()?;

    if data.len() < parser.pos() + DIGEST_SIZE {
        return Err(malformed_error!("Container too short for content digest"));
    }
    let payload = &data[..data.len() - DIGEST_SIZE];
    let stored_digest = &data[data.len() - DIGEST_SIZE..];
    let computed_digest = Sha1::digest(payload);
    if stored_digest != computed_digest.as_slice() {
        return Err(malformed_error!(
            "Content digest mismatch, the container is corrupted"
        ));
    }

    // Re-bound the parser to the payload so the digest is never parsed as content
    let mut parser = Parser::new(payload);
    parser.seek(FORMAT_MAGIC.len() + 4)?;

    let name = parser.read_prefixed_string_utf8()?;

    let entry_type = parser.read_le::<u32>()?;
    let entry_method = parser.read_le::<u32>()?;
    let entry_point = match (entry_type, entry_method) {
        (NO_INDEX, NO_INDEX) => None,
        (NO_INDEX, _) | (_, NO_INDEX) => {
            return Err(malformed_error!("Half-present entry point reference"));
        }
        (type_index, method_index) => Some(EntryPoint {
            type_index,
            method_index,
        }),
    };

    let extern_count = parser.read_le::<u32>()? as usize;
    parser.ensure_remaining(extern_count.saturating_mul(4))?;
    let mut extern_refs = Vec::with_capacity(extern_count);
    for _ in 0..extern_count {
        extern_refs.push(parser.read_prefixed_string_utf8()?);
    }

    let member_count = parser.read_le::<u32>()? as usize;
    parser.ensure_remaining(member_count.saturating_mul(8))?;
    let mut member_refs = Vec::with_capacity(member_count);
    for index in 0..member_count {
        member_refs.push(read_member_ref(&mut parser, index, extern_refs.len())?);
    }

    let type_count = parser.read_le::<u32>()? as usize;
    parser.ensure_remaining(type_count.saturating_mul(8))?;
    let mut types = Vec::with_capacity(type_count);
    for _ in 0..type_count {
        types.push(read_type(&mut parser)?);
    }

    if parser.has_more_data() {
        return Err(malformed_error!(
            "{} trailing bytes after the type table",
            parser.remaining()
        ));
    }

    Ok(Module {
        name,
        entry_point,
        extern_refs,
        member_refs,
        types,
    })
}

fn read_member_ref(parser: &mut Parser<'_>, index: usize, extern_count: usize) -> Result<MemberRef> {
    let scope_raw = parser.read_le::<u32>()?;
    let scope = if scope_raw == NO_INDEX {
        RefScope::Internal
    } else {
        if scope_raw as usize >= extern_count {
            return Err(malformed_error!(
                "Member reference #{} names missing extern module index {}",
                index,
                scope_raw
            ));
        }
        RefScope::Extern(scope_raw)
    };

    let type_name = parser.read_prefixed_string_utf8()?;
    let member_name = parser.read_prefixed_string_utf8()?;
    let param_count = parser.read_le::<u16>()?;
    let returns = parser.read_le::<u8>()? != 0;

    Ok(MemberRef {
        scope,
        type_name,
        member_name,
        param_count,
        returns,
    })
}

fn read_type(parser: &mut Parser<'_>) -> Result<TypeDef> {
    let full_name = parser.read_prefixed_string_utf8()?;
    let flags = TypeAttributes::from_bits_truncate(parser.read_le::<u32>()?);

    let method_count = parser.read_le::<u32>()? as usize;
    parser.ensure_remaining(method_count.saturating_mul(8))?;
    let mut methods = Vec::with_capacity(method_count);
    for _ in 0..method_count {
        methods.push(read_method(parser)?);
    }

    Ok(TypeDef {
        full_name,
        flags,
        methods,
    })
}

fn read_method(parser: &mut Parser<'_>) -> Result<MethodDef> {
    let name = parser.read_prefixed_string_utf8()?;
    let flags = MethodAttributes::from_bits_truncate(parser.read_le::<u32>()?);

    let param_count = parser.read_le::<u32>()? as usize;
    parser.ensure_remaining(param_count.saturating_mul(4))?;
    let mut params = Vec::with_capacity(param_count);
    for _ in 0..param_count {
        params.push(parser.read_prefixed_string_utf8()?);
    }

    let returns = match parser.read_le::<u8>()? {
        0 => None,
        1 => Some(parser.read_prefixed_string_utf8()?),
        other => {
            return Err(malformed_error!(
                "Invalid return presence marker {} in method '{}'",
                other,
                name
            ));
        }
    };

    let local_count = parser.read_le::<u32>()? as usize;
    parser.ensure_remaining(local_count.saturating_mul(4))?;
    let mut locals = Vec::with_capacity(local_count);
    for _ in 0..local_count {
        locals.push(parser.read_prefixed_string_utf8()?);
    }

    let max_stack = parser.read_le::<u16>()?;

    let instruction_count = parser.read_le::<u32>()? as usize;
    parser.ensure_remaining(instruction_count)?;
    let mut instructions = Vec::with_capacity(instruction_count);
    for ordinal in 0..instruction_count {
        instructions.push(read_instruction(parser, &name, ordinal, instruction_count)?);
    }

    Ok(MethodDef {
        name,
        flags,
        signature: Signature::new(params, returns),
        body: MethodBody::from_parts(
            max_stack,
            locals,
            instructions,
            u32::try_from(instruction_count).unwrap_or(u32::MAX),
        ),
    })
}

fn read_instruction(
    parser: &mut Parser<'_>,
    method_name: &str,
    ordinal: usize,
    instruction_count: usize,
) -> Result<Instruction> {
    let raw_opcode = parser.read_le::<u8>()?;
    let opcode = OpCode::from_byte(raw_opcode).ok_or_else(|| {
        malformed_error!(
            "Unknown opcode {:#04x} in method '{}'",
            raw_opcode,
            method_name
        )
    })?;

    let read_target = |parser: &mut Parser<'_>| -> Result<Label> {
        let target = parser.read_le::<u32>()? as usize;
        if target >= instruction_count {
            return Err(malformed_error!(
                "Branch ordinal {} out of range in method '{}'",
                target,
                method_name
            ));
        }
        Ok(Label::new(target as u32))
    };

    let operand = match opcode.operand_kind() {
        OperandKind::None => Operand::None,
        OperandKind::Int32 => Operand::Int32(parser.read_le::<i32>()?),
        OperandKind::Slot => Operand::Slot(parser.read_le::<u16>()?),
        OperandKind::String => Operand::String(parser.read_prefixed_string_utf8()?),
        OperandKind::Member => Operand::Member(parser.read_le::<u32>()?),
        OperandKind::Target => Operand::Target(read_target(parser)?),
        OperandKind::SwitchTable => {
            let target_count = parser.read_le::<u32>()? as usize;
            parser.ensure_remaining(target_count.saturating_mul(4))?;
            let mut targets = Vec::with_capacity(target_count);
            for _ in 0..target_count {
                targets.push(read_target(parser)?);
            }
            Operand::Switch(targets)
        }
    };

    Ok(Instruction::new(Label::new(ordinal as u32), opcode, operand))
}

/// Encodes a module into container bytes, digest included.
pub(crate) fn write_module(module: &Module) -> Result<Vec<u8>> {
    let mut writer = Writer::new();
    writer.write_bytes(&FORMAT_MAGIC);
    writer.write_le(FORMAT_VERSION);
    writer.write_le(0u16);

    writer.write_prefixed_string_utf8(&module.name);

    match &module.entry_point {
        Some(entry_point) => {
            writer.write_le(entry_point.type_index);
            writer.write_le(entry_point.method_index);
        }
        None => {
            writer.write_le(NO_INDEX);
            writer.write_le(NO_INDEX);
        }
    }

    writer.write_le(u32::try_from(module.extern_refs.len()).unwrap_or(u32::MAX));
    for extern_ref in &module.extern_refs {
        writer.write_prefixed_string_utf8(extern_ref);
    }

    writer.write_le(u32::try_from(module.member_refs.len()).unwrap_or(u32::MAX));
    for member_ref in &module.member_refs {
        let scope_raw = match member_ref.scope {
            RefScope::Internal => NO_INDEX,
            RefScope::Extern(index) => index,
        };
        writer.write_le(scope_raw);
        writer.write_prefixed_string_utf8(&member_ref.type_name);
        writer.write_prefixed_string_utf8(&member_ref.member_name);
        writer.write_le(member_ref.param_count);
        writer.write_le(u8::from(member_ref.returns));
    }

    writer.write_le(u32::try_from(module.types.len()).unwrap_or(u32::MAX));
    for type_def in &module.types {
        write_type(&mut writer, type_def)?;
    }

    let digest = Sha1::digest(writer.as_slice());
    writer.write_bytes(&digest);

    Ok(writer.into_bytes())
}

fn write_type(writer: &mut Writer, type_def: &TypeDef) -> Result<()> {
    writer.write_prefixed_string_utf8(&type_def.full_name);
    writer.write_le(type_def.flags.bits());

    writer.write_le(u32::try_from(type_def.methods.len()).unwrap_or(u32::MAX));
    for method in &type_def.methods {
        write_method(writer, type_def, method)?;
    }
    Ok(())
}

fn write_method(writer: &mut Writer, type_def: &TypeDef, method: &MethodDef) -> Result<()> {
    writer.write_prefixed_string_utf8(&method.name);
    writer.write_le(method.flags.bits());

    writer.write_le(u32::try_from(method.signature.params.len()).unwrap_or(u32::MAX));
    for param in &method.signature.params {
        writer.write_prefixed_string_utf8(param);
    }

    match &method.signature.returns {
        Some(returns) => {
            writer.write_le(1u8);
            writer.write_prefixed_string_utf8(returns);
        }
        None => writer.write_le(0u8),
    }

    writer.write_le(u32::try_from(method.body.locals.len()).unwrap_or(u32::MAX));
    for local in &method.body.locals {
        writer.write_prefixed_string_utf8(local);
    }

    writer.write_le(method.body.max_stack);

    let body = &method.body;
    let mut ordinal_of = std::collections::HashMap::with_capacity(body.instructions.len());
    for (ordinal, instruction) in body.instructions.iter().enumerate() {
        ordinal_of.insert(instruction.label, ordinal as u32);
    }
    let resolve = |label: &Label| -> Result<u32> {
        ordinal_of.get(label).copied().ok_or_else(|| {
            malformed_error!(
                "Branch target {} in '{}.{}' does not name an instruction",
                label,
                type_def.full_name,
                method.name
            )
        })
    };

    writer.write_le(u32::try_from(body.instructions.len()).unwrap_or(u32::MAX));
    for instruction in &body.instructions {
        writer.write_le(instruction.opcode.to_byte());
        match &instruction.operand {
            Operand::None => {}
            Operand::Int32(value) => writer.write_le(*value),
            Operand::Slot(slot) => writer.write_le(*slot),
            Operand::String(text) => writer.write_prefixed_string_utf8(text),
            Operand::Member(index) => writer.write_le(*index),
            Operand::Target(target) => writer.write_le(resolve(target)?),
            Operand::Switch(targets) => {
                writer.write_le(u32::try_from(targets.len()).unwrap_or(u32::MAX));
                for target in targets {
                    writer.write_le(resolve(target)?);
                }
            }
        }
    }

    Ok(())
}
