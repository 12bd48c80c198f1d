// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![deny(missing_docs)]

//! # patchscope
//!
//! A framework for merging compiled module containers and rewriting method
//! bodies so that designated hook methods run at method entry and before every
//! return. `patchscope` is the engine behind mod-loading setups that turn an
//! unmodified executable module into one that fires extensibility events,
//! without source code or a build step for the original program.
//!
//! ## Features
//!
//! - **📦 Module containers** - Load, inspect, and write self-describing
//!   binary module containers with digest-verified integrity
//! - **🔗 Module merging** - Combine a primary module with supplementary
//!   modules, resolving duplicate type definitions deterministically and
//!   rewriting cross-module references
//! - **🪝 Hook injection** - Splice stack-neutral hook calls at method entry
//!   and at every return point, without disturbing slot numbering or branch
//!   targets
//! - **🔁 Two-pass pipeline** - Run merge → locate → inject → persist twice
//!   with independent hook sets, the first pass's artifact feeding the second
//! - **🧱 Disposable contexts** - Execute each pass's patcher inside a
//!   string-addressed, fully disposable execution context
//! - **🛡️ All-or-nothing passes** - Atomic output persistence; a failed pass
//!   never leaves a partially patched artifact
//!
//! ## Quick Start
//!
//! Add `patchscope` to your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! patchscope = "0.2"
//! ```
//!
//! ### Using the Prelude
//!
//! ```rust,no_run
//! use patchscope::prelude::*;
//!
//! // Load a module container and look around
//! let module = Module::from_file("game.psmc".as_ref())?;
//! println!("{} defines {} types", module.name, module.types.len());
//! # Ok::<(), patchscope::Error>(())
//! ```
//!
//! ### Patching a Module
//!
//! ```rust,no_run
//! use patchscope::prelude::*;
//!
//! let descriptor = PassDescriptor::new(
//!     "game.psmc",
//!     vec!["framework.psmc".into()],
//!     vec![PatchTarget::new(
//!         "Game.Game1",
//!         "Initialize",
//!         Some(HookRef::new("Events.GameEvents", "BeforeInit")),
//!         Some(HookRef::new("Events.GameEvents", "AfterInit")),
//!     )?],
//!     "game.patched.psmc",
//! );
//! run_pass(&descriptor, &LogProgress)?;
//! # Ok::<(), patchscope::Error>(())
//! ```
//!
//! ## Architecture
//!
//! `patchscope` is organized into focused modules, lowest layer first:
//!
//! - [`file`] - Bounds-checked binary reading, writing, atomic persistence
//! - [`module`] - The in-memory model: types, methods, label-addressed
//!   instructions, structural validation
//! - [`format`] - The module container codec with byte-identical round trips
//! - [`merge`] - Collision-resolving module combination
//! - [`locate`] - Deterministic patch target resolution
//! - [`inject`] - Entry and exit hook splicing
//! - [`pipeline`] - The pass runner, descriptors, plans, and progress
//! - [`boundary`] - Disposable per-pass execution contexts
//!
//! A patch run flows top-down: the [`boundary`] drives the [`pipeline`],
//! which drives [`merge`], [`locate`], and [`inject`] over the [`module`]
//! model, consuming and producing containers via [`format`].
//!
//! ## Error Handling
//!
//! All operations return [`Result<T, Error>`](Result) with the specific
//! failure kind and identifying context:
//!
//! ```rust,no_run
//! use patchscope::{Error, Module};
//!
//! match Module::from_file(std::path::Path::new("game.psmc")) {
//!     Ok(module) => println!("Loaded {}", module.name),
//!     Err(Error::NotSupported) => println!("Not a module container"),
//!     Err(Error::Malformed { message, .. }) => println!("Damaged container: {message}"),
//!     Err(e) => println!("Error: {e}"),
//! }
//! ```
//!
//! Every failure is terminal for the pass that produced it; the engine never
//! retries a deterministic transform and never emits partial output.

#[macro_use]
pub(crate) mod error;

/// Convenient re-exports of the most commonly used types and functions.
pub mod prelude;

/// Low-level binary reading, writing, and atomic output persistence.
pub mod file;

/// The in-memory module model and its structural validation.
pub mod module;

/// The binary module container codec.
pub mod format;

/// Merging supplementary modules into a primary module.
pub mod merge;

/// Resolving patch targets to concrete methods.
pub mod locate;

/// Splicing hook calls into method bodies.
pub mod inject;

/// The merge → locate → inject → persist pass pipeline.
pub mod pipeline;

/// Disposable execution contexts for pass patchers.
pub mod boundary;

/// `patchscope` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is
/// always [`Error`]. Used consistently throughout the crate for all fallible
/// operations.
pub type Result<T> = std::result::Result<T, Error>;

/// `patchscope` Error type
///
/// The main error type for all operations in this crate, covering container
/// parsing, merging, target lookup, injection, the boundary, and I/O.
pub use error::Error;

/// The unit of compiled code being transformed.
///
/// See [`module::Module`] for loading, inspection, and persistence.
pub use module::Module;
