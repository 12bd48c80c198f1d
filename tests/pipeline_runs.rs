//! Integration tests for the pass pipeline and the two-pass flow.

mod common;

use std::{
    fs,
    sync::Mutex,
};

use patchscope::prelude::*;
use tempfile::tempdir;

struct Recording(Mutex<Vec<(u8, String)>>);

impl Recording {
    fn new() -> Self {
        Recording(Mutex::new(Vec::new()))
    }

    fn events(&self) -> Vec<(u8, String)> {
        self.0.lock().unwrap().clone()
    }
}

impl ProgressSink for Recording {
    fn report(&self, percent: u8, stage: &str) {
        self.0.lock().unwrap().push((percent, stage.to_string()));
    }
}

fn initialize_target() -> PatchTarget {
    PatchTarget::new(
        "Game.Game1",
        "Initialize",
        Some(HookRef::new("Events.GameEvents", "BeforeInit")),
        Some(HookRef::new("Events.GameEvents", "AfterInit")),
    )
    .unwrap()
}

#[test]
fn a_pass_produces_a_loadable_patched_module() {
    let dir = tempdir().unwrap();
    let primary = common::write_module(dir.path(), "game.psmc", &common::game_module());
    let framework = common::write_module(dir.path(), "framework.psmc", &common::framework_module());
    let output = dir.path().join("stage1.psmc");

    let progress = Recording::new();
    let descriptor = PassDescriptor::new(
        primary,
        vec![framework],
        vec![initialize_target()],
        &output,
    );
    run_pass(&descriptor, &progress).unwrap();

    let patched = Module::from_file(&output).unwrap();
    patched.validate().unwrap();
    assert!(patched.find_type("Events.GameEvents").is_some());

    let events = progress.events();
    assert_eq!(events.first().map(|(percent, _)| *percent), Some(0));
    assert_eq!(events.last().map(|(percent, _)| *percent), Some(100));
    assert!(
        events.windows(2).all(|pair| pair[0].0 <= pair[1].0),
        "progress must increase monotonically: {events:?}"
    );
}

#[test]
fn missing_target_fails_and_writes_nothing() {
    let dir = tempdir().unwrap();
    let primary = common::write_module(dir.path(), "game.psmc", &common::game_module());
    let framework = common::write_module(dir.path(), "framework.psmc", &common::framework_module());
    let output = dir.path().join("stage1.psmc");

    let descriptor = PassDescriptor::new(
        primary,
        vec![framework],
        vec![PatchTarget::new(
            "Game.Game1",
            "DoesNotExist",
            Some(HookRef::new("Events.GameEvents", "BeforeInit")),
            None,
        )
        .unwrap()],
        &output,
    );

    let result = run_pass(&descriptor, &NullProgress);
    assert!(matches!(
        result,
        Err(Error::MethodNotFound { method_name, .. }) if method_name == "DoesNotExist"
    ));
    assert!(!output.exists(), "no output may be written for a failed pass");
    assert_eq!(
        fs::read_dir(dir.path())
            .unwrap()
            .filter(|entry| {
                entry
                    .as_ref()
                    .unwrap()
                    .file_name()
                    .to_string_lossy()
                    .ends_with(".tmp")
            })
            .count(),
        0,
        "no temporary file may be left behind"
    );
}

#[test]
fn ambiguous_target_without_signature_fails() {
    let dir = tempdir().unwrap();
    let mut game = common::game_module();
    // Add an overload so the name alone no longer resolves.
    let game_type_index = game.find_type_index("Game.Game1").unwrap();
    game.types[game_type_index].add_method(MethodDef::new(
        "TakeDamage",
        MethodAttributes::PUBLIC,
        Signature::new(vec!["Int32".into(), "Boolean".into()], None),
    ));
    let primary = common::write_module(dir.path(), "game.psmc", &game);
    let framework = common::write_module(dir.path(), "framework.psmc", &common::framework_module());
    let output = dir.path().join("stage1.psmc");

    let descriptor = PassDescriptor::new(
        primary,
        vec![framework],
        vec![PatchTarget::new(
            "Game.Game1",
            "TakeDamage",
            None,
            Some(HookRef::new("Events.PlayerEvents", "OnDamage")),
        )
        .unwrap()],
        &output,
    );

    assert!(matches!(
        run_pass(&descriptor, &NullProgress),
        Err(Error::AmbiguousMethod { candidates: 2, .. })
    ));
    assert!(!output.exists());
}

#[test]
fn two_passes_chain_through_the_intermediate_artifact() {
    let dir = tempdir().unwrap();
    let primary = common::write_module(dir.path(), "game.psmc", &common::game_module());
    let framework = common::write_module(dir.path(), "framework.psmc", &common::framework_module());
    let mods = common::write_module(dir.path(), "mods.psmc", &common::mods_module());
    let intermediate = dir.path().join("stage1.psmc");
    let output = dir.path().join("patched.psmc");

    let pass_one = PassDescriptor::new(
        primary,
        vec![framework],
        vec![initialize_target()],
        &intermediate,
    );
    let pass_two = PassDescriptor::new(
        &intermediate,
        vec![mods],
        vec![PatchTarget::new(
            "Mods.Loader",
            "Boot",
            Some(HookRef::new("Events.ModEvents", "AfterLoad")),
            None,
        )
        .unwrap()],
        &output,
    );

    let progress = Recording::new();
    run_two_pass(&pass_one, &pass_two, &progress).unwrap();

    assert!(intermediate.exists(), "pass one's artifact must survive");
    let patched = Module::from_file(&output).unwrap();
    patched.validate().unwrap();

    // Pass one's hooks are still in place in the final artifact...
    let game = patched.find_type("Game.Game1").unwrap();
    let (_, initialize) = game.find_method("Initialize", &[]).unwrap();
    assert_eq!(
        common::opcodes(initialize),
        vec![
            OpCode::Call,
            OpCode::Nop,
            OpCode::Nop,
            OpCode::Call,
            OpCode::Ret
        ]
    );

    // ...and pass two added its own on top.
    let loader = patched.find_type("Mods.Loader").unwrap();
    let (_, boot) = loader.find_method("Boot", &["Int32".to_string()]).unwrap();
    assert_eq!(boot.body.instructions[0].opcode, OpCode::Call);
    assert_eq!(
        common::call_target(&patched, &boot.body.instructions[0]).member_name,
        "AfterLoad"
    );

    let events = progress.events();
    assert!(events.iter().any(|(_, stage)| stage.starts_with("pass one:")));
    assert!(events.iter().any(|(_, stage)| stage.starts_with("pass two:")));
    assert!(events.windows(2).all(|pair| pair[0].0 <= pair[1].0));
}

#[test]
fn corrupted_intermediate_fails_pass_two_loudly() {
    let dir = tempdir().unwrap();
    let primary = common::write_module(dir.path(), "game.psmc", &common::game_module());
    let framework = common::write_module(dir.path(), "framework.psmc", &common::framework_module());
    let intermediate = dir.path().join("stage1.psmc");
    let output = dir.path().join("patched.psmc");

    let pass_one = PassDescriptor::new(
        primary,
        vec![framework],
        vec![initialize_target()],
        &intermediate,
    );
    run_pass(&pass_one, &NullProgress).unwrap();

    // Corrupt the intermediate before pass two consumes it.
    let mut bytes = fs::read(&intermediate).unwrap();
    let middle = bytes.len() / 2;
    bytes[middle] ^= 0xA5;
    fs::write(&intermediate, &bytes).unwrap();

    let pass_two = PassDescriptor::new(&intermediate, vec![], vec![], &output);
    assert!(matches!(
        run_pass(&pass_two, &NullProgress),
        Err(Error::Malformed { .. })
    ));
    assert!(!output.exists(), "a corrupted input must never yield an output");
}
