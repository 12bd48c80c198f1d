use std::path::Path;

use anyhow::Context;
use patchscope::Module;
use serde::Serialize;

use crate::app::GlobalOptions;

#[derive(Debug, Serialize)]
pub struct ContainerInfo {
    pub name: String,
    pub entry_point: Option<String>,
    pub type_count: usize,
    pub method_count: usize,
    pub extern_modules: Vec<String>,
    pub member_ref_count: usize,
}

pub fn run(path: &Path, opts: &GlobalOptions) -> anyhow::Result<()> {
    let module = Module::from_file(path)
        .with_context(|| format!("failed to load '{}'", path.display()))?;

    let entry_point = module.entry_point.as_ref().and_then(|entry| {
        let type_def = module.types.get(entry.type_index as usize)?;
        let method = type_def.methods.get(entry.method_index as usize)?;
        Some(format!("{}.{}", type_def.full_name, method.name))
    });

    let info = ContainerInfo {
        name: module.name.clone(),
        entry_point,
        type_count: module.types.len(),
        method_count: module.types.iter().map(|t| t.methods.len()).sum(),
        extern_modules: module.extern_refs.clone(),
        member_ref_count: module.member_refs.len(),
    };

    if opts.json {
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    println!("Module:       {}", info.name);
    println!(
        "Entry point:  {}",
        info.entry_point.as_deref().unwrap_or("(none)")
    );
    println!("Types:        {}", info.type_count);
    println!("Methods:      {}", info.method_count);
    println!("Member refs:  {}", info.member_ref_count);
    if info.extern_modules.is_empty() {
        println!("Extern refs:  (none)");
    } else {
        println!("Extern refs:  {}", info.extern_modules.join(", "));
    }
    Ok(())
}
