use anyhow::Result;

use crate::cli::output::format_outputs_table;

/// Handle the outputs command
pub fn execute(json: bool) -> Result<()> {
    let outputs = super::read_outputs()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&outputs)?);
    } else {
        println!("{}", format_outputs_table(&outputs));
        println!(
            "Deployed at {}",
            outputs.deployed_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
    }

    Ok(())
}
