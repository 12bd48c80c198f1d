//! In-memory model of a compiled module container.
//!
//! This module implements the data model every other part of the engine works
//! against: a [`Module`] owning its type table, each [`TypeDef`] owning its
//! methods, each [`MethodDef`] owning exactly one [`MethodBody`]. The model is
//! fully owned data — one owner per loaded module graph, no shared registries —
//! so a pass can drop its whole working set by dropping one value.
//!
//! # Key Components
//!
//! ## Structure
//! - [`Module`] - Root of the model: metadata, reference tables, type table
//! - [`TypeDef`] / [`MethodDef`] / [`Signature`] - Definitions
//! - [`MethodBody`] - Instruction sequence and local slots
//! - [`Instruction`] / [`OpCode`] / [`Operand`] / [`Label`] - Code model
//!
//! ## References
//! - [`MemberRef`] - A named reference to a method, internal or external
//! - [`RefScope`] - Whether a reference resolves inside this module
//! - [`EntryPoint`] - Optional designated entry method
//!
//! # Invariants
//!
//! Every instruction operand must reference only entries of the owning
//! module's reference tables, and every internal reference must resolve
//! against the module's own type table. [`Module::validate`] checks these
//! invariants plus per-body stack discipline; the pipeline runs it before
//! persisting anything.
//!
//! # Usage Examples
//!
//! ```rust
//! use patchscope::module::{MethodAttributes, MethodDef, Module, OpCode, Operand, Signature, TypeDef};
//!
//! let mut module = Module::new("Game");
//! let mut game_type = TypeDef::new("Game.Game1");
//! let mut init = MethodDef::new(
//!     "Initialize",
//!     MethodAttributes::PUBLIC,
//!     Signature::new(vec![], None),
//! );
//! init.body.emit(OpCode::Nop, Operand::None);
//! init.body.emit(OpCode::Ret, Operand::None);
//! game_type.add_method(init);
//! module.add_type(game_type);
//!
//! assert!(module.find_type("Game.Game1").is_some());
//! module.validate()?;
//! # Ok::<(), patchscope::Error>(())
//! ```

mod body;
mod instruction;
pub(crate) mod validation;

pub use body::MethodBody;
pub use instruction::{FlowType, Instruction, Label, OpCode, Operand, OperandKind};

use std::fmt;
use std::path::Path;

use bitflags::bitflags;

use crate::Result;

bitflags! {
    /// Attributes of a type definition.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TypeAttributes: u32 {
        /// Type is visible outside its module
        const PUBLIC = 0x0001;
        /// Type cannot be extended
        const SEALED = 0x0002;
        /// Type cannot be instantiated
        const ABSTRACT = 0x0004;
    }
}

bitflags! {
    /// Attributes of a method definition.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MethodAttributes: u32 {
        /// Method is visible outside its type
        const PUBLIC = 0x0001;
        /// Method has no receiver; argument slot 0 is its first parameter
        const STATIC = 0x0002;
        /// Method participates in dynamic dispatch
        const VIRTUAL = 0x0004;
    }
}

/// A method signature: parameter type names and optional return type name.
///
/// Type names are compared textually; two signatures are the same signature
/// exactly when their rendered forms are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Signature {
    /// Parameter type names, in declaration order
    pub params: Vec<String>,
    /// Return type name, `None` for void
    pub returns: Option<String>,
}

impl Signature {
    /// Creates a signature from parameter type names and an optional return type.
    pub fn new(params: Vec<String>, returns: Option<String>) -> Self {
        Signature { params, returns }
    }

    /// The void-to-void signature.
    pub fn empty() -> Self {
        Signature {
            params: Vec::new(),
            returns: None,
        }
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (position, param) in self.params.iter().enumerate() {
            if position > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{param}")?;
        }
        write!(f, ") -> {}", self.returns.as_deref().unwrap_or("Void"))
    }
}

/// A method definition owned by exactly one type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDef {
    /// Method name, unique per type only together with the signature
    pub name: String,
    /// Method attributes
    pub flags: MethodAttributes,
    /// Parameter and return types
    pub signature: Signature,
    /// The executable body
    pub body: MethodBody,
}

impl MethodDef {
    /// Creates a method with an empty body.
    pub fn new(name: impl Into<String>, flags: MethodAttributes, signature: Signature) -> Self {
        MethodDef {
            name: name.into(),
            flags,
            signature,
            body: MethodBody::new(),
        }
    }

    /// `true` if the method has no receiver.
    pub fn is_static(&self) -> bool {
        self.flags.contains(MethodAttributes::STATIC)
    }

    /// `true` if the method leaves a value on the caller's stack.
    pub fn returns_value(&self) -> bool {
        self.signature.returns.is_some()
    }

    /// Number of argument slots, counting the receiver of instance methods.
    pub fn arg_slots(&self) -> u16 {
        let receiver = u16::from(!self.is_static());
        receiver + u16::try_from(self.signature.params.len()).unwrap_or(u16::MAX)
    }
}

/// A type definition: a named, ordered set of methods.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDef {
    /// Fully qualified name, e.g. `Game.Game1`
    pub full_name: String,
    /// Type attributes
    pub flags: TypeAttributes,
    /// Methods defined on this type, in declaration order
    pub methods: Vec<MethodDef>,
}

impl TypeDef {
    /// Creates an empty public type.
    pub fn new(full_name: impl Into<String>) -> Self {
        TypeDef {
            full_name: full_name.into(),
            flags: TypeAttributes::PUBLIC,
            methods: Vec::new(),
        }
    }

    /// Appends a method and returns its index.
    pub fn add_method(&mut self, method: MethodDef) -> usize {
        self.methods.push(method);
        self.methods.len() - 1
    }

    /// All methods named `name`, with their indices. More than one entry
    /// means the name alone is ambiguous.
    pub fn methods_named<'a, 'n>(
        &'a self,
        name: &'n str,
    ) -> impl Iterator<Item = (usize, &'a MethodDef)> + use<'a, 'n> {
        self.methods
            .iter()
            .enumerate()
            .filter(move |(_, method)| method.name == name)
    }

    /// The unique method matching `name` and exact parameter types, if any.
    pub fn find_method(&self, name: &str, params: &[String]) -> Option<(usize, &MethodDef)> {
        self.methods_named(name)
            .find(|(_, method)| method.signature.params == params)
    }
}

/// Whether a member reference resolves inside the owning module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefScope {
    /// Resolves against the owning module's own type table
    Internal,
    /// Resolves in the external module at this index of the extern table
    Extern(u32),
}

/// A by-name reference to a method, used as a call operand.
///
/// The parameter count and return flag are carried on the reference itself so
/// stack effects of calls can be computed without resolving external modules.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemberRef {
    /// Where the referenced member lives
    pub scope: RefScope,
    /// Full name of the declaring type
    pub type_name: String,
    /// Name of the referenced method
    pub member_name: String,
    /// Number of stack slots a call through this reference consumes,
    /// counting the receiver of instance methods
    pub param_count: u16,
    /// Whether the call pushes a result
    pub returns: bool,
}

/// The designated entry method of a module, by type and method index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryPoint {
    /// Index into the module's type table
    pub type_index: u32,
    /// Index into that type's method list
    pub method_index: u32,
}

/// The unit of compiled code being transformed.
///
/// Created by loading a container from disk ([`Module::from_file`]), from
/// memory ([`Module::from_mem`]), or by merging ([`crate::merge::merge`]).
/// Mutated in place by the hook injector, then serialized back with
/// [`Module::write_to_file`] and discarded at the end of a pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Module {
    /// Module name
    pub name: String,
    /// Optional designated entry method
    pub entry_point: Option<EntryPoint>,
    /// Names of external modules this module references
    pub extern_refs: Vec<String>,
    /// Member reference table; call operands index into this
    pub member_refs: Vec<MemberRef>,
    /// The type table
    pub types: Vec<TypeDef>,
}

impl Module {
    /// Creates an empty module.
    pub fn new(name: impl Into<String>) -> Self {
        Module {
            name: name.into(),
            entry_point: None,
            extern_refs: Vec::new(),
            member_refs: Vec::new(),
            types: Vec::new(),
        }
    }

    /// Loads a module container from disk via a memory mapping.
    ///
    /// # Errors
    /// [`crate::Error::FileError`] on I/O failure, [`crate::Error::NotSupported`]
    /// if the file is not a container of a known version, [`crate::Error::Malformed`]
    /// if the container is structurally damaged or fails its digest check.
    pub fn from_file(path: &Path) -> Result<Module> {
        crate::format::read_file(path)
    }

    /// Parses a module container from a byte buffer.
    ///
    /// Same failure modes as [`Module::from_file`], minus the I/O.
    pub fn from_mem(data: &[u8]) -> Result<Module> {
        crate::format::read_module(data)
    }

    /// Serializes this module to container bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        crate::format::write_module(self)
    }

    /// Serializes this module and atomically persists it at `path`.
    ///
    /// The bytes are written to a temporary sibling first and renamed into
    /// place only once complete, so a failure never leaves a partial artifact.
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let bytes = self.to_bytes()?;
        crate::file::Output::create(path, &bytes)?.finalize()
    }

    /// Index of the type named `full_name`, if present.
    pub fn find_type_index(&self, full_name: &str) -> Option<usize> {
        self.types
            .iter()
            .position(|type_def| type_def.full_name == full_name)
    }

    /// The type named `full_name`, if present.
    pub fn find_type(&self, full_name: &str) -> Option<&TypeDef> {
        self.types
            .iter()
            .find(|type_def| type_def.full_name == full_name)
    }

    /// Appends a type and returns its index.
    pub fn add_type(&mut self, type_def: TypeDef) -> usize {
        self.types.push(type_def);
        self.types.len() - 1
    }

    /// Interns an external module name, returning its extern table index.
    pub fn intern_extern_ref(&mut self, module_name: &str) -> u32 {
        if let Some(index) = self
            .extern_refs
            .iter()
            .position(|existing| existing == module_name)
        {
            return index as u32;
        }
        self.extern_refs.push(module_name.to_string());
        (self.extern_refs.len() - 1) as u32
    }

    /// Interns a member reference, returning its reference table index.
    ///
    /// Structurally identical references share one table entry.
    pub fn intern_member_ref(&mut self, member_ref: MemberRef) -> u32 {
        if let Some(index) = self
            .member_refs
            .iter()
            .position(|existing| *existing == member_ref)
        {
            return index as u32;
        }
        self.member_refs.push(member_ref);
        (self.member_refs.len() - 1) as u32
    }

    /// Checks the whole module for structural soundness.
    ///
    /// Verifies reference tables (no dangling extern or member indices,
    /// internal references resolve against the type table with matching
    /// signature summaries), the entry point, and every method body (operand
    /// shapes, branch labels, slot indices, and evaluation stack discipline).
    ///
    /// # Errors
    /// [`crate::Error::Malformed`] describing the first violation found.
    pub fn validate(&self) -> Result<()> {
        validation::validate_module(self)
    }
}
