//! Integration tests for hook injection semantics.

mod common;

use patchscope::prelude::*;

fn merged_game() -> Module {
    merge(&common::game_module(), &[common::framework_module()]).unwrap()
}

#[test]
fn initialize_gets_entry_and_exit_hooks() {
    // Game.Game1.Initialize has two original instructions and one return.
    // With an entry and an exit hook the body must become exactly:
    // [call BeforeInit, <original 1>, <original 2>, call AfterInit, ret]
    let mut module = merged_game();
    let handle = locate(&module, "Game.Game1", "Initialize").unwrap();

    inject_entry(
        &mut module,
        handle,
        &HookRef::new("Events.GameEvents", "BeforeInit"),
    )
    .unwrap();
    inject_exit(
        &mut module,
        handle,
        &HookRef::new("Events.GameEvents", "AfterInit"),
    )
    .unwrap();

    let (_, initialize) = handle.resolve(&module).unwrap();
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

    let entry_call = common::call_target(&module, &initialize.body.instructions[0]);
    assert_eq!(entry_call.member_name, "BeforeInit");
    let exit_call = common::call_target(&module, &initialize.body.instructions[3]);
    assert_eq!(exit_call.member_name, "AfterInit");

    module.validate().unwrap();
}

#[test]
fn exit_hook_covers_every_return_path() {
    // TakeDamage has two returns, one of them reached by a branch that jumps
    // straight onto the return instruction.
    let mut module = merged_game();
    let handle = locate(&module, "Game.Game1", "TakeDamage").unwrap();

    inject_exit(
        &mut module,
        handle,
        &HookRef::new("Events.PlayerEvents", "OnDamage"),
    )
    .unwrap();

    let (_, take_damage) = handle.resolve(&module).unwrap();
    assert_eq!(
        common::opcodes(take_damage),
        vec![
            OpCode::LdArg,
            OpCode::BrFalse,
            OpCode::Nop,
            OpCode::Call,
            OpCode::Ret,
            OpCode::Call,
            OpCode::Ret
        ],
        "each of the two returns gets its own preceding hook call"
    );

    // The branch that used to jump onto the second return must now land on
    // the spliced call, so the hook also fires on that path.
    let Operand::Target(branch_target) = &take_damage.body.instructions[1].operand else {
        panic!("expected a branch at instruction 1");
    };
    let target_index = take_damage.body.index_of(*branch_target).unwrap();
    assert_eq!(
        take_damage.body.instructions[target_index].opcode,
        OpCode::Call,
        "branch-to-return must be retargeted onto the hook call"
    );

    module.validate().unwrap();
}

#[test]
fn slot_references_survive_entry_and_exit_injection() {
    // GetScore reads local slot 3; the injected calls must not renumber it.
    let mut module = merged_game();
    let handle = locate(&module, "Game.Game1", "GetScore").unwrap();

    inject_entry(
        &mut module,
        handle,
        &HookRef::new("Events.GameEvents", "BeforeInit"),
    )
    .unwrap();
    inject_exit(
        &mut module,
        handle,
        &HookRef::new("Events.GameEvents", "AfterInit"),
    )
    .unwrap();

    let (_, get_score) = handle.resolve(&module).unwrap();
    let load = get_score
        .body
        .instructions
        .iter()
        .find(|instruction| instruction.opcode == OpCode::LdLoc)
        .unwrap();
    assert_eq!(load.operand, Operand::Slot(3));
    assert_eq!(get_score.body.locals.len(), 4);

    // The return value is produced after the exit hook call is spliced in
    // front of the return, so the hook cannot disturb it.
    let opcodes = common::opcodes(get_score);
    assert_eq!(
        opcodes,
        vec![OpCode::Call, OpCode::LdLoc, OpCode::Call, OpCode::Ret]
    );

    module.validate().unwrap();
}

#[test]
fn entry_prologue_does_not_capture_back_edges() {
    // A loop branching back to the original first instruction must not
    // re-enter the entry prologue.
    let mut module = merged_game();
    let game = module.find_type("Game.Game1").unwrap();
    let first_label = {
        let (_, take_damage) = game.find_method("TakeDamage", &["Int32".to_string()]).unwrap();
        take_damage.body.instructions[0].label
    };

    let handle = locate(&module, "Game.Game1", "TakeDamage").unwrap();
    inject_entry(
        &mut module,
        handle,
        &HookRef::new("Events.GameEvents", "BeforeInit"),
    )
    .unwrap();

    let (_, take_damage) = handle.resolve(&module).unwrap();
    assert_eq!(take_damage.body.instructions[0].opcode, OpCode::Call);
    assert_eq!(
        take_damage.body.instructions[1].label,
        first_label,
        "the original first instruction keeps its identity behind the prologue"
    );
}

#[test]
fn unresolvable_hook_fails_without_mutation() {
    let mut module = merged_game();
    let handle = locate(&module, "Game.Game1", "Initialize").unwrap();
    let before = handle.resolve(&module).unwrap().1.clone();

    let result = inject_entry(
        &mut module,
        handle,
        &HookRef::new("Events.Missing", "Nowhere"),
    );
    assert!(matches!(result, Err(Error::InjectionTargetInvalid { .. })));

    let (_, initialize) = handle.resolve(&module).unwrap();
    assert_eq!(*initialize, before, "failed injection must not leave edits behind");
}

#[test]
fn pipeline_orders_entry_before_exit_in_one_method() {
    // Driving both hooks through a pass descriptor gives the same body as
    // manual entry-then-exit injection.
    let mut manual = merged_game();
    let handle = locate(&manual, "Game.Game1", "Initialize").unwrap();
    inject_entry(
        &mut manual,
        handle,
        &HookRef::new("Events.GameEvents", "BeforeInit"),
    )
    .unwrap();
    inject_exit(
        &mut manual,
        handle,
        &HookRef::new("Events.GameEvents", "AfterInit"),
    )
    .unwrap();
    let (_, expected) = handle.resolve(&manual).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let primary = common::write_module(dir.path(), "game.psmc", &common::game_module());
    let framework = common::write_module(dir.path(), "framework.psmc", &common::framework_module());
    let output = dir.path().join("patched.psmc");

    let descriptor = PassDescriptor::new(
        primary,
        vec![framework],
        vec![PatchTarget::new(
            "Game.Game1",
            "Initialize",
            Some(HookRef::new("Events.GameEvents", "BeforeInit")),
            Some(HookRef::new("Events.GameEvents", "AfterInit")),
        )
        .unwrap()],
        &output,
    );
    run_pass(&descriptor, &NullProgress).unwrap();

    let patched = Module::from_file(&output).unwrap();
    let game = patched.find_type("Game.Game1").unwrap();
    let (_, initialize) = game.find_method("Initialize", &[]).unwrap();
    assert_eq!(common::opcodes(initialize), common::opcodes(expected));
}
