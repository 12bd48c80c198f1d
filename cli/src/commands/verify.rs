use std::path::Path;

use anyhow::Context;
use patchscope::Module;

use crate::app::GlobalOptions;

pub fn run(path: &Path, opts: &GlobalOptions) -> anyhow::Result<()> {
    let module = Module::from_file(path)
        .with_context(|| format!("failed to load '{}'", path.display()))?;

    match module.validate() {
        Ok(()) => {
            if opts.json {
                println!(
                    "{}",
                    serde_json::json!({ "file": path, "status": "ok" })
                );
            } else {
                println!("{}: ok", path.display());
            }
            Ok(())
        }
        Err(error) => {
            if opts.json {
                println!(
                    "{}",
                    serde_json::json!({ "file": path, "status": "invalid", "error": error.to_string() })
                );
            } else {
                eprintln!("{}: invalid: {error}", path.display());
            }
            std::process::exit(1);
        }
    }
}
