//! Patch plans: serialized descriptions of a full two-pass run.
//!
//! A plan names the unpatched primary module, the intermediate artifact that
//! carries pass one's result into pass two, the final output, and the
//! supplement/target sets of both passes. Plans are plain JSON, so installers
//! and tools can generate them without linking this crate.
//!
//! ```json
//! {
//!   "primary": "game.psmc",
//!   "intermediate": "game.stage1.psmc",
//!   "output": "game.patched.psmc",
//!   "pass_one": {
//!     "supplements": ["framework.psmc"],
//!     "targets": [
//!       {
//!         "type_name": "Game.Game1",
//!         "method_name": "Initialize",
//!         "entry_hook": { "type_name": "Events.GameEvents", "method_name": "BeforeInit" }
//!       }
//!     ]
//!   },
//!   "pass_two": { "supplements": [], "targets": [] }
//! }
//! ```

use std::{fs, path::Path, path::PathBuf};

use serde::{Deserialize, Serialize};

use crate::{
    pipeline::descriptor::{PassDescriptor, PatchTarget},
    Error, Result,
};

/// Supplements and targets of one pass within a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagePlan {
    /// Modules merged into the pass's primary, in merge order
    #[serde(default)]
    pub supplements: Vec<PathBuf>,
    /// The methods this pass patches
    #[serde(default)]
    pub targets: Vec<PatchTarget>,
}

/// A complete two-pass patch run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchPlan {
    /// The unpatched primary module
    pub primary: PathBuf,
    /// Where pass one's output lands; consumed as pass two's primary
    pub intermediate: PathBuf,
    /// The final artifact
    pub output: PathBuf,
    /// First pass configuration
    pub pass_one: StagePlan,
    /// Second pass configuration
    pub pass_two: StagePlan,
}

impl PatchPlan {
    /// Loads a plan from a JSON file.
    ///
    /// # Errors
    /// [`crate::Error::FileError`] on I/O failure, [`crate::Error::Error`]
    /// when the JSON does not describe a plan.
    pub fn from_file(path: &Path) -> Result<PatchPlan> {
        let raw = fs::read_to_string(path)?;
        serde_json::from_str(&raw)
            .map_err(|error| Error::Error(format!("Invalid patch plan '{}': {error}", path.display())))
    }

    /// Expands the plan into its two pass descriptors.
    ///
    /// Pass one reads `primary` and writes `intermediate`; pass two reads
    /// `intermediate` and writes `output`.
    pub fn descriptors(&self) -> (PassDescriptor, PassDescriptor) {
        (
            PassDescriptor::new(
                self.primary.clone(),
                self.pass_one.supplements.clone(),
                self.pass_one.targets.clone(),
                self.intermediate.clone(),
            ),
            PassDescriptor::new(
                self.intermediate.clone(),
                self.pass_two.supplements.clone(),
                self.pass_two.targets.clone(),
                self.output.clone(),
            ),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_parses_from_json() {
        let json = r#"{
            "primary": "game.psmc",
            "intermediate": "stage1.psmc",
            "output": "patched.psmc",
            "pass_one": {
                "supplements": ["framework.psmc"],
                "targets": [{
                    "type_name": "Game.Game1",
                    "method_name": "Initialize",
                    "entry_hook": { "type_name": "Events.GameEvents", "method_name": "BeforeInit" }
                }]
            },
            "pass_two": {}
        }"#;

        let plan: PatchPlan = serde_json::from_str(json).unwrap();
        let (pass_one, pass_two) = plan.descriptors();
        assert_eq!(pass_one.output, pass_two.primary);
        assert_eq!(pass_one.targets.len(), 1);
        assert!(pass_two.targets.is_empty());
    }
}
