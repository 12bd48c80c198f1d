//! Shared module builders for the integration tests.
//!
//! The scenarios mirror a small game executable plus a framework module that
//! carries the hook-defining event types.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use patchscope::prelude::*;

/// A primary module shaped like a small game executable.
///
/// `Game.Game1` defines:
/// - `Initialize()` - instance, void, two original instructions and one return
/// - `TakeDamage(Int32)` - instance, void, two returns, one reached by a
///   branch directly onto the return instruction
/// - `GetScore()` - instance, returns Int32 read from local slot 3
pub fn game_module() -> Module {
    let mut module = Module::new("Game");
    let mut game = TypeDef::new("Game.Game1");

    let mut initialize = MethodDef::new("Initialize", MethodAttributes::PUBLIC, Signature::empty());
    initialize.body.emit(OpCode::Nop, Operand::None);
    initialize.body.emit(OpCode::Nop, Operand::None);
    initialize.body.emit(OpCode::Ret, Operand::None);
    game.add_method(initialize);

    let mut take_damage = MethodDef::new(
        "TakeDamage",
        MethodAttributes::PUBLIC,
        Signature::new(vec!["Int32".into()], None),
    );
    take_damage.body.max_stack = 1;
    take_damage.body.emit(OpCode::LdArg, Operand::Slot(1));
    let branch = take_damage.body.fresh_label();
    let nop = take_damage.body.fresh_label();
    let early_ret = take_damage.body.fresh_label();
    let late_ret = take_damage.body.fresh_label();
    take_damage.body.instructions.extend([
        Instruction::new(branch, OpCode::BrFalse, Operand::Target(late_ret)),
        Instruction::new(nop, OpCode::Nop, Operand::None),
        Instruction::new(early_ret, OpCode::Ret, Operand::None),
        Instruction::new(late_ret, OpCode::Ret, Operand::None),
    ]);
    game.add_method(take_damage);

    let mut get_score = MethodDef::new(
        "GetScore",
        MethodAttributes::PUBLIC,
        Signature::new(vec![], Some("Int32".into())),
    );
    get_score.body.max_stack = 1;
    for _ in 0..4 {
        get_score.body.add_local("Int32");
    }
    get_score.body.emit(OpCode::LdLoc, Operand::Slot(3));
    get_score.body.emit(OpCode::Ret, Operand::None);
    game.add_method(get_score);

    let type_index = module.add_type(game) as u32;
    module.entry_point = Some(EntryPoint {
        type_index,
        method_index: 0,
    });
    module
}

/// A hook method: static, no parameters, no return value.
pub fn static_void_hook(name: &str) -> MethodDef {
    let mut method = MethodDef::new(
        name,
        MethodAttributes::PUBLIC | MethodAttributes::STATIC,
        Signature::empty(),
    );
    method.body.emit(OpCode::Ret, Operand::None);
    method
}

/// The shared utility type that independently compiled modules duplicate.
pub fn shared_utils_type() -> TypeDef {
    let mut utils = TypeDef::new("Shared.Utils");
    let mut clamp = MethodDef::new(
        "Clamp",
        MethodAttributes::PUBLIC | MethodAttributes::STATIC,
        Signature::new(vec!["Int32".into()], Some("Int32".into())),
    );
    clamp.body.max_stack = 1;
    clamp.body.emit(OpCode::LdArg, Operand::Slot(0));
    clamp.body.emit(OpCode::Ret, Operand::None);
    utils.add_method(clamp);
    utils
}

/// A framework module defining the event hook types plus a duplicated copy of
/// `Shared.Utils`.
pub fn framework_module() -> Module {
    let mut module = Module::new("Framework");

    let mut game_events = TypeDef::new("Events.GameEvents");
    game_events.add_method(static_void_hook("BeforeInit"));
    game_events.add_method(static_void_hook("AfterInit"));
    module.add_type(game_events);

    let mut player_events = TypeDef::new("Events.PlayerEvents");
    player_events.add_method(static_void_hook("OnDamage"));
    module.add_type(player_events);

    module.add_type(shared_utils_type());
    module
}

/// A mods module that duplicates `Shared.Utils` and calls it through an
/// external reference, exercising reference rewriting during merge.
pub fn mods_module() -> Module {
    let mut module = Module::new("Mods");
    module.add_type(shared_utils_type());

    let core = module.intern_extern_ref("FrameworkCore");
    let clamp_ref = module.intern_member_ref(MemberRef {
        scope: RefScope::Extern(core),
        type_name: "Shared.Utils".into(),
        member_name: "Clamp".into(),
        param_count: 1,
        returns: true,
    });

    let mut loader = TypeDef::new("Mods.Loader");
    let mut boot = MethodDef::new(
        "Boot",
        MethodAttributes::PUBLIC | MethodAttributes::STATIC,
        Signature::new(vec!["Int32".into()], Some("Int32".into())),
    );
    boot.body.max_stack = 1;
    boot.body.emit(OpCode::LdArg, Operand::Slot(0));
    boot.body.emit(OpCode::Call, Operand::Member(clamp_ref));
    boot.body.emit(OpCode::Ret, Operand::None);
    loader.add_method(boot);
    module.add_type(loader);

    module.add_type({
        let mut mod_events = TypeDef::new("Events.ModEvents");
        mod_events.add_method(static_void_hook("AfterLoad"));
        mod_events
    });

    module
}

/// Writes `module` into `dir` under `name` and returns the path.
pub fn write_module(dir: &Path, name: &str, module: &Module) -> PathBuf {
    let path = dir.join(name);
    module
        .write_to_file(&path)
        .unwrap_or_else(|error| panic!("failed to write {name}: {error}"));
    path
}

/// Opcode sequence of a method, for structural assertions.
pub fn opcodes(method: &MethodDef) -> Vec<OpCode> {
    method
        .body
        .instructions
        .iter()
        .map(|instruction| instruction.opcode)
        .collect()
}

/// The member reference a call instruction goes through.
pub fn call_target<'m>(module: &'m Module, instruction: &Instruction) -> &'m MemberRef {
    match instruction.operand {
        Operand::Member(index) => &module.member_refs[index as usize],
        _ => panic!("instruction {instruction} is not a call"),
    }
}
