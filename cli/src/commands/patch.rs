use std::path::Path;

use anyhow::Context;
use patchscope::{
    boundary::{patch_two_pass, Host},
    pipeline::{LogProgress, PatchPlan},
};

use crate::app::GlobalOptions;

pub fn run(plan_path: &Path, opts: &GlobalOptions) -> anyhow::Result<()> {
    let plan = PatchPlan::from_file(plan_path)
        .with_context(|| format!("failed to load patch plan '{}'", plan_path.display()))?;

    let host = Host::new();
    patch_two_pass(&host, &plan, &LogProgress).with_context(|| "patch run failed")?;

    if opts.json {
        println!(
            "{}",
            serde_json::json!({
                "intermediate": plan.intermediate,
                "output": plan.output,
                "status": "ok",
            })
        );
    } else {
        println!("Patched module written to {}", plan.output.display());
    }
    Ok(())
}
