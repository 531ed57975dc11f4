use hoist_core::Settings;

/// Print the resolved settings, after file and environment, as JSON.
pub fn show(settings: &Settings) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(settings)?);
    Ok(())
}
