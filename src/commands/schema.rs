use schemars::schema_for;

use crate::config::RigConfig;

/// Print the JSON Schema for a rig's `settings/config.toml` to stdout.
pub fn run_schema() -> anyhow::Result<()> {
    let schema = schema_for!(RigConfig);
    let json = serde_json::to_string_pretty(&schema)?;
    println!("{json}");
    Ok(())
}
