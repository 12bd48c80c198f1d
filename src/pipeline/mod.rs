//! The merge → locate → inject → persist pass runner.
//!
//! A patch run is one or two passes, each an all-or-nothing unit:
//!
//! 1. Load the primary and supplementary modules.
//! 2. Merge them into one self-contained module.
//! 3. Locate every patch target (parallel, read-only).
//! 4. Inject the hooks — entry before exit for a method receiving both, so
//!    the entry splice is already part of the body when the exit splice's
//!    bookkeeping runs. Injections commit serially into the single shared
//!    module.
//! 5. Validate the patched module and persist it atomically.
//!
//! Any component failure aborts the pass with the specific failing target's
//! identity in the error; because the output is written to a temporary path
//! and renamed only on full success, an aborted pass never leaves a
//! partially-patched artifact behind. Nothing is retried — the transform is
//! deterministic, so a retry with unchanged inputs cannot do better.
//!
//! Pass two of a two-pass run consumes pass one's output as its primary
//! module; the passes run strictly sequentially.
//!
//! # Key Components
//!
//! - [`run_pass`] / [`run_two_pass`] - The drivers
//! - [`PassDescriptor`] / [`PatchTarget`] - Immutable pass configuration
//! - [`PatchPlan`] / [`StagePlan`] - JSON-loadable two-pass configuration
//! - [`ProgressSink`] - Injected stage/percentage collaborator
//!
//! # Usage Examples
//!
//! ```rust,no_run
//! use patchscope::{
//!     inject::HookRef,
//!     pipeline::{run_pass, NullProgress, PassDescriptor, PatchTarget},
//! };
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
//!     "game.stage1.psmc",
//! );
//! run_pass(&descriptor, &NullProgress)?;
//! # Ok::<(), patchscope::Error>(())
//! ```

mod descriptor;
mod plan;
mod progress;

pub use descriptor::{PassDescriptor, PatchTarget};
pub use plan::{PatchPlan, StagePlan};
pub use progress::{LogProgress, NullProgress, ProgressSink};

use progress::ScaledProgress;

use crate::{
    inject::{inject_entry, inject_exit},
    locate::{locate_many, LocateQuery},
    merge::merge,
    module::Module,
    Result,
};

/// Runs one complete pass: merge, locate, inject, validate, persist.
///
/// # Errors
/// Any failure of a component stage aborts the pass and is returned as-is;
/// no output file exists at `descriptor.output` in that case (a pre-existing
/// file at that path is left untouched).
pub fn run_pass(descriptor: &PassDescriptor, progress: &dyn ProgressSink) -> Result<()> {
    for target in &descriptor.targets {
        target.ensure_hooked()?;
    }

    progress.report(0, "loading primary module");
    let primary = Module::from_file(&descriptor.primary)?;

    progress.report(10, "loading supplementary modules");
    let supplements = descriptor
        .supplements
        .iter()
        .map(|path| Module::from_file(path))
        .collect::<Result<Vec<Module>>>()?;

    progress.report(25, "merging modules");
    let mut merged = merge(&primary, &supplements)?;
    drop(primary);
    drop(supplements);

    progress.report(45, "locating patch targets");
    let queries: Vec<LocateQuery> = descriptor.targets.iter().map(PatchTarget::query).collect();
    let handles = locate_many(&merged, &queries)?;

    progress.report(60, "injecting hooks");
    for (target, handle) in descriptor.targets.iter().zip(handles) {
        // Entry strictly before exit within one method
        if let Some(entry_hook) = &target.entry_hook {
            inject_entry(&mut merged, handle, entry_hook)?;
        }
        if let Some(exit_hook) = &target.exit_hook {
            inject_exit(&mut merged, handle, exit_hook)?;
        }
    }

    progress.report(85, "validating patched module");
    merged.validate()?;

    progress.report(90, "writing output");
    merged.write_to_file(&descriptor.output)?;

    progress.report(100, "pass complete");
    Ok(())
}

/// Runs two passes in sequence.
///
/// `pass_two.primary` is expected to be `pass_one.output`; the second pass
/// starts only after the first has fully persisted its artifact. Progress of
/// the passes is reported through `progress` as 0–50 and 50–100 respectively.
///
/// # Errors
/// The first failing pass aborts the run. A pass one failure leaves no
/// intermediate file; a pass two failure leaves pass one's output on disk
/// untouched and produces no final artifact.
pub fn run_two_pass(
    pass_one: &PassDescriptor,
    pass_two: &PassDescriptor,
    progress: &dyn ProgressSink,
) -> Result<()> {
    run_pass(pass_one, &ScaledProgress::new(progress, 0, "pass one"))?;
    run_pass(pass_two, &ScaledProgress::new(progress, 50, "pass two"))
}
