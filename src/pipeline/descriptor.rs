//! Immutable configuration of a single patch pass.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::{inject::HookRef, locate::LocateQuery, Error, Result};

/// One method to patch, with the hooks to splice into it.
///
/// At least one of `entry_hook` and `exit_hook` must be present; the pass
/// runner rejects targets that name neither.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchTarget {
    /// Fully qualified name of the type owning the target method
    pub type_name: String,
    /// Name of the target method
    pub method_name: String,
    /// Exact parameter type names, required when the method name alone is
    /// ambiguous
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<Vec<String>>,
    /// Hook to call on method entry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_hook: Option<HookRef>,
    /// Hook to call before every return
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_hook: Option<HookRef>,
}

impl PatchTarget {
    /// Creates a target, requiring at least one hook.
    ///
    /// # Errors
    /// [`crate::Error::Error`] when both hooks are absent.
    pub fn new(
        type_name: impl Into<String>,
        method_name: impl Into<String>,
        entry_hook: Option<HookRef>,
        exit_hook: Option<HookRef>,
    ) -> Result<Self> {
        let target = PatchTarget {
            type_name: type_name.into(),
            method_name: method_name.into(),
            signature: None,
            entry_hook,
            exit_hook,
        };
        target.ensure_hooked()?;
        Ok(target)
    }

    /// Verifies that this target names at least one hook.
    pub(crate) fn ensure_hooked(&self) -> Result<()> {
        if self.entry_hook.is_none() && self.exit_hook.is_none() {
            return Err(Error::Error(format!(
                "Patch target '{}.{}' specifies neither an entry nor an exit hook",
                self.type_name, self.method_name
            )));
        }
        Ok(())
    }

    /// The lookup this target resolves through.
    pub(crate) fn query(&self) -> LocateQuery {
        LocateQuery {
            type_name: self.type_name.clone(),
            method_name: self.method_name.clone(),
            signature: self.signature.clone(),
        }
    }
}

/// Immutable configuration for one invocation of the pipeline.
///
/// Created once per pass and never mutated afterwards; a failed pass can be
/// retried with a different descriptor without touching this one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassDescriptor {
    /// The module being patched
    pub primary: PathBuf,
    /// Modules merged into the primary before patching, in merge order
    #[serde(default)]
    pub supplements: Vec<PathBuf>,
    /// The methods to patch
    pub targets: Vec<PatchTarget>,
    /// Where the patched module is written
    pub output: PathBuf,
}

impl PassDescriptor {
    /// Creates a pass descriptor.
    pub fn new(
        primary: impl Into<PathBuf>,
        supplements: Vec<PathBuf>,
        targets: Vec<PatchTarget>,
        output: impl Into<PathBuf>,
    ) -> Self {
        PassDescriptor {
            primary: primary.into(),
            supplements,
            targets,
            output: output.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_without_hooks_is_rejected() {
        assert!(PatchTarget::new("Game.Game1", "Initialize", None, None).is_err());
    }

    #[test]
    fn target_roundtrips_through_json() {
        let target = PatchTarget::new(
            "Game.Game1",
            "Initialize",
            Some(HookRef::new("Events.GameEvents", "BeforeInit")),
            None,
        )
        .unwrap();
        let json = serde_json::to_string(&target).unwrap();
        let parsed: PatchTarget = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, target);
        assert!(!json.contains("exit_hook"), "absent hooks are omitted");
    }
}
