//! Integration tests for the isolation boundary driving full patch runs.

mod common;

use std::sync::Mutex;

use patchscope::prelude::*;
use tempfile::tempdir;

struct Recording(Mutex<Vec<(u8, String)>>);

impl ProgressSink for Recording {
    fn report(&self, percent: u8, stage: &str) {
        self.0.lock().unwrap().push((percent, stage.to_string()));
    }
}

fn plan_in(dir: &std::path::Path) -> PatchPlan {
    let primary = common::write_module(dir, "game.psmc", &common::game_module());
    let framework = common::write_module(dir, "framework.psmc", &common::framework_module());
    let mods = common::write_module(dir, "mods.psmc", &common::mods_module());

    PatchPlan {
        primary,
        intermediate: dir.join("stage1.psmc"),
        output: dir.join("patched.psmc"),
        pass_one: StagePlan {
            supplements: vec![framework],
            targets: vec![PatchTarget::new(
                "Game.Game1",
                "Initialize",
                Some(HookRef::new("Events.GameEvents", "BeforeInit")),
                Some(HookRef::new("Events.GameEvents", "AfterInit")),
            )
            .unwrap()],
        },
        pass_two: StagePlan {
            supplements: vec![mods],
            targets: vec![PatchTarget::new(
                "Mods.Loader",
                "Boot",
                Some(HookRef::new("Events.ModEvents", "AfterLoad")),
                None,
            )
            .unwrap()],
        },
    }
}

#[test]
fn two_pass_run_over_the_boundary_produces_the_final_artifact() {
    let dir = tempdir().unwrap();
    let plan = plan_in(dir.path());

    let host = Host::new();
    let progress = Recording(Mutex::new(Vec::new()));
    patch_two_pass(&host, &plan, &progress).unwrap();

    assert_eq!(host.live_contexts(), 0, "every context must be torn down");

    let patched = Module::from_file(&plan.output).unwrap();
    patched.validate().unwrap();
    assert!(patched.find_type("Events.GameEvents").is_some());
    assert!(patched.find_type("Mods.Loader").is_some());

    let events = progress.0.lock().unwrap();
    assert!(events
        .iter()
        .any(|(_, stage)| stage.contains("first pass")));
    assert!(events
        .iter()
        .any(|(_, stage)| stage.contains("second pass")));
    assert_eq!(events.last().map(|(percent, _)| *percent), Some(100));
}

#[test]
fn boundary_failure_still_tears_the_context_down() {
    let dir = tempdir().unwrap();
    let mut plan = plan_in(dir.path());
    // Ask pass one for a hook that no supplement defines.
    plan.pass_one.targets = vec![PatchTarget::new(
        "Game.Game1",
        "Initialize",
        Some(HookRef::new("Events.Missing", "Nowhere")),
        None,
    )
    .unwrap()];

    let host = Host::new();
    let result = patch_two_pass(&host, &plan, &NullProgress);

    assert!(matches!(result, Err(Error::InjectionTargetInvalid { .. })));
    assert_eq!(host.live_contexts(), 0, "failed runs must release their contexts");
    assert!(!plan.intermediate.exists());
    assert!(!plan.output.exists());
}

#[test]
fn plan_json_drives_the_same_run() {
    let dir = tempdir().unwrap();
    let plan = plan_in(dir.path());

    let plan_path = dir.path().join("plan.json");
    std::fs::write(&plan_path, serde_json::to_string_pretty(&plan).unwrap()).unwrap();
    let loaded = PatchPlan::from_file(&plan_path).unwrap();
    assert_eq!(loaded, plan);

    let host = Host::new();
    patch_two_pass(&host, &loaded, &NullProgress).unwrap();
    assert!(plan.output.exists());
}
