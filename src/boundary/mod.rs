//! Disposable execution contexts for pass patchers.
//!
//! Each pass of a patch run executes inside a context that owns every piece
//! of state the pass creates — loaded modules, resolved types, the patcher
//! instance itself. Destroying the context releases all of it at once, so
//! nothing a pass loaded can leak into the next pass, and a failed pass is
//! cleaned up the same way as a successful one.
//!
//! The orchestrator addresses a context purely through string-keyed calls:
//! patcher types are instantiated by registry name, configuration is plain
//! strings and paths, and methods are dispatched by name through
//! [`Host::invoke`]. No object reference ever crosses the boundary in either
//! direction — handles are opaque integers — which keeps the orchestrator
//! side fully typed while the contexts stay disposable.
//!
//! There is no process-global registry: every patch run constructs its own
//! [`Host`], and separate runs share no mutable state.
//!
//! # Key Components
//!
//! - [`Host`] - Owns the patcher registry and all live contexts
//! - [`ContextId`] / [`InstanceId`] - Opaque handles
//! - [`PassPatcher`] - The trait a patcher implements behind the boundary
//! - [`PatcherOptions`] - String/path-valued patcher configuration
//! - [`HookPassPatcher`] - Built-in patcher running one pipeline pass
//! - [`patch_two_pass`] - The full two-pass driver over the boundary
//!
//! # Usage Examples
//!
//! ```rust,no_run
//! use patchscope::boundary::{patch_two_pass, Host};
//! use patchscope::pipeline::{LogProgress, PatchPlan};
//! use std::path::Path;
//!
//! let plan = PatchPlan::from_file(Path::new("plan.json"))?;
//! let host = Host::new();
//! patch_two_pass(&host, &plan, &LogProgress)?;
//! # Ok::<(), patchscope::Error>(())
//! ```

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicU64, Ordering},
        Mutex,
    },
};

use dashmap::DashMap;

use crate::{
    pipeline::{run_pass, LogProgress, PassDescriptor, PatchPlan, PatchTarget, ProgressSink},
    Error, Result,
};

/// Registry name of the built-in hook pass patcher.
pub const HOOK_PASS_PATCHER: &str = "Patchscope.HookPassPatcher";

/// Opaque handle to a live context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(u64);

/// Opaque handle to a patcher instance inside a context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstanceId {
    context: u64,
    instance: u64,
}

/// Configuration for a pass patcher: strings, paths, and target tuples only.
///
/// The module being patched is not part of the options; it is the argument of
/// the `"Patch"` invocation, so one configured patcher describes a pass
/// independently of its input.
#[derive(Debug, Clone, Default)]
pub struct PatcherOptions {
    /// Modules merged into the pass input, in merge order
    pub supplements: Vec<PathBuf>,
    /// The methods the pass patches
    pub targets: Vec<PatchTarget>,
    /// Where the patched module is written
    pub output: PathBuf,
}

impl PatcherOptions {
    /// Extracts the options of a pass descriptor (everything but the primary).
    pub fn from_descriptor(descriptor: &PassDescriptor) -> Self {
        PatcherOptions {
            supplements: descriptor.supplements.clone(),
            targets: descriptor.targets.clone(),
            output: descriptor.output.clone(),
        }
    }
}

/// A patcher living behind the boundary.
///
/// Implementations receive configuration once and then handle string-keyed
/// invocations. The only method every patcher understands is `"Patch"` with
/// an input path argument.
pub trait PassPatcher: Send {
    /// Applies configuration before any invocation.
    fn configure(&mut self, options: &PatcherOptions) -> Result<()>;

    /// Dispatches a named method with a single string argument.
    ///
    /// # Errors
    /// [`crate::Error::Error`] for unknown method names, plus whatever the
    /// dispatched operation fails with.
    fn invoke(&mut self, method: &str, argument: &str) -> Result<()>;
}

/// Constructor for a registered patcher type.
///
/// Receives the artifact path given to [`Host::instantiate`]; the path is
/// known to exist when the factory runs.
pub type PatcherFactory = Box<dyn Fn(&Path) -> Result<Box<dyn PassPatcher>> + Send + Sync>;

struct Context {
    instances: DashMap<u64, Mutex<Box<dyn PassPatcher>>>,
    next_instance: AtomicU64,
}

/// Owner of all boundary state for one patch run.
pub struct Host {
    registry: HashMap<String, PatcherFactory>,
    contexts: DashMap<u64, Context>,
    next_context: AtomicU64,
}

impl Host {
    /// Creates a host with the built-in patcher types registered.
    pub fn new() -> Self {
        let mut host = Host {
            registry: HashMap::new(),
            contexts: DashMap::new(),
            next_context: AtomicU64::new(1),
        };
        host.register(
            HOOK_PASS_PATCHER,
            Box::new(|artifact: &Path| {
                Ok(Box::new(HookPassPatcher::from_artifact(artifact)) as Box<dyn PassPatcher>)
            }),
        );
        host
    }

    /// Registers a patcher type under a string name.
    ///
    /// Later registrations replace earlier ones with the same name.
    pub fn register(&mut self, type_name: impl Into<String>, factory: PatcherFactory) {
        self.registry.insert(type_name.into(), factory);
    }

    /// Creates a fresh, empty context.
    pub fn create_context(&self) -> ContextId {
        let id = self.next_context.fetch_add(1, Ordering::Relaxed);
        self.contexts.insert(
            id,
            Context {
                instances: DashMap::new(),
                next_instance: AtomicU64::new(1),
            },
        );
        ContextId(id)
    }

    /// Instantiates a registered patcher type inside `context`.
    ///
    /// # Errors
    /// [`crate::Error::PatcherTypeNotFound`] when `type_name` is not
    /// registered or `artifact_path` does not exist on disk;
    /// [`crate::Error::Error`] when the context has been destroyed.
    pub fn instantiate(
        &self,
        context: ContextId,
        artifact_path: &Path,
        type_name: &str,
    ) -> Result<InstanceId> {
        let factory = self
            .registry
            .get(type_name)
            .ok_or_else(|| Error::PatcherTypeNotFound {
                type_name: type_name.to_string(),
            })?;
        if !artifact_path.exists() {
            return Err(Error::PatcherTypeNotFound {
                type_name: type_name.to_string(),
            });
        }

        let patcher = factory(artifact_path)?;
        let entry = self
            .contexts
            .get(&context.0)
            .ok_or_else(|| Error::Error(format!("Context {} has been destroyed", context.0)))?;

        let instance = entry.next_instance.fetch_add(1, Ordering::Relaxed);
        entry.instances.insert(instance, Mutex::new(patcher));
        Ok(InstanceId {
            context: context.0,
            instance,
        })
    }

    /// Applies options to an instance.
    ///
    /// # Errors
    /// [`crate::Error::Error`] for stale handles, plus whatever the patcher's
    /// own configuration fails with.
    pub fn configure(&self, instance: InstanceId, options: &PatcherOptions) -> Result<()> {
        self.with_instance(instance, |patcher| patcher.configure(options))
    }

    /// Invokes a named method with a single string argument on an instance.
    ///
    /// # Errors
    /// [`crate::Error::Error`] for stale handles or unknown method names,
    /// plus whatever the dispatched operation fails with.
    pub fn invoke(&self, instance: InstanceId, method: &str, argument: &str) -> Result<()> {
        self.with_instance(instance, |patcher| patcher.invoke(method, argument))
    }

    /// Destroys a context and every instance it owns.
    ///
    /// Infallible and idempotent; safe to call at any time, including after a
    /// failed invocation, to force release of a pass's resources.
    pub fn destroy_context(&self, context: ContextId) {
        self.contexts.remove(&context.0);
    }

    /// Number of currently live contexts.
    pub fn live_contexts(&self) -> usize {
        self.contexts.len()
    }

    fn with_instance<F>(&self, instance: InstanceId, operation: F) -> Result<()>
    where
        F: FnOnce(&mut dyn PassPatcher) -> Result<()>,
    {
        let context = self
            .contexts
            .get(&instance.context)
            .ok_or_else(|| Error::Error(format!("Context {} has been destroyed", instance.context)))?;
        let entry = context.instances.get(&instance.instance).ok_or_else(|| {
            Error::Error(format!(
                "Instance {} does not exist in context {}",
                instance.instance, instance.context
            ))
        })?;
        let mut patcher = entry.lock().map_err(|_| Error::LockError)?;
        operation(patcher.as_mut())
    }
}

impl Default for Host {
    fn default() -> Self {
        Host::new()
    }
}

/// The built-in patcher: runs one hook-injection pipeline pass.
///
/// Relative supplement paths in its options resolve against the directory of
/// the artifact it was instantiated from.
pub struct HookPassPatcher {
    search_dir: PathBuf,
    options: Option<PatcherOptions>,
}

impl HookPassPatcher {
    fn from_artifact(artifact_path: &Path) -> Self {
        let search_dir = if artifact_path.is_dir() {
            artifact_path.to_path_buf()
        } else {
            artifact_path
                .parent()
                .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
        };
        HookPassPatcher {
            search_dir,
            options: None,
        }
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.search_dir.join(path)
        }
    }
}

impl PassPatcher for HookPassPatcher {
    fn configure(&mut self, options: &PatcherOptions) -> Result<()> {
        let mut resolved = options.clone();
        resolved.supplements = resolved
            .supplements
            .iter()
            .map(|path| self.resolve(path))
            .collect();
        self.options = Some(resolved);
        Ok(())
    }

    fn invoke(&mut self, method: &str, argument: &str) -> Result<()> {
        match method {
            "Patch" => {
                let options = self.options.as_ref().ok_or_else(|| {
                    Error::Error("Patcher invoked before being configured".to_string())
                })?;
                let descriptor = PassDescriptor::new(
                    argument,
                    options.supplements.clone(),
                    options.targets.clone(),
                    options.output.clone(),
                );
                run_pass(&descriptor, &LogProgress)
            }
            unknown => Err(Error::Error(format!(
                "Unknown boundary method '{unknown}'"
            ))),
        }
    }
}

/// Drives a full two-pass run across the boundary.
///
/// Mirrors the installer flow: create a context, instantiate the pass
/// patcher, configure it, invoke `"Patch"`, and destroy the context — once
/// per pass, with the second patcher instantiated only after pass one's
/// artifact exists. Contexts are destroyed even when an invocation fails.
///
/// # Errors
/// The first failing boundary operation aborts the run; the intermediate
/// artifact, if already written, is left on disk for diagnosis.
pub fn patch_two_pass(host: &Host, plan: &PatchPlan, progress: &dyn ProgressSink) -> Result<()> {
    let (pass_one, pass_two) = plan.descriptors();

    let context = host.create_context();
    let first = drive_pass(host, context, &pass_one, "first pass", 5, progress);
    host.destroy_context(context);
    first?;

    let context = host.create_context();
    let second = drive_pass(host, context, &pass_two, "second pass", 55, progress);
    host.destroy_context(context);
    second?;

    progress.report(100, "patching complete");
    Ok(())
}

fn drive_pass(
    host: &Host,
    context: ContextId,
    descriptor: &PassDescriptor,
    stage: &str,
    base: u8,
    progress: &dyn ProgressSink,
) -> Result<()> {
    progress.report(base, &format!("creating {stage} patcher"));
    let patcher = host.instantiate(context, &descriptor.primary, HOOK_PASS_PATCHER)?;

    progress.report(base + 5, &format!("configuring {stage} patcher"));
    host.configure(patcher, &PatcherOptions::from_descriptor(descriptor))?;

    progress.report(base + 10, &format!("running {stage}"));
    host.invoke(patcher, "Patch", &descriptor.primary.to_string_lossy())
}
