//! # patchscope Prelude
//!
//! This module provides a convenient prelude for the most commonly used types
//! and functions of the library. Import it to get quick access to the
//! essentials of loading, merging, and patching module containers.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all patchscope operations
pub use crate::Error;

/// The result type used throughout patchscope
pub use crate::Result;

// ================================================================================================
// Module Model
// ================================================================================================

/// The unit of compiled code being transformed
pub use crate::module::Module;

/// Definitions owned by a module
pub use crate::module::{MethodAttributes, MethodBody, MethodDef, Signature, TypeAttributes, TypeDef};

/// The instruction model
pub use crate::module::{Instruction, Label, OpCode, Operand};

/// Reference table entries
pub use crate::module::{EntryPoint, MemberRef, RefScope};

// ================================================================================================
// Engine Operations
// ================================================================================================

/// Module merging
pub use crate::merge::merge;

/// Patch target resolution
pub use crate::locate::{locate, locate_many, LocateQuery, MethodHandle};

/// Hook injection
pub use crate::inject::{inject_entry, inject_exit, HookRef};

// ================================================================================================
// Pipeline and Boundary
// ================================================================================================

/// The pass pipeline
pub use crate::pipeline::{
    run_pass, run_two_pass, LogProgress, NullProgress, PassDescriptor, PatchPlan, PatchTarget,
    ProgressSink, StagePlan,
};

/// The isolation boundary
pub use crate::boundary::{patch_two_pass, Host, PatcherOptions, HOOK_PASS_PATCHER};
