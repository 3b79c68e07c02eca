//! Fields command - list the report catalog.

use clap::Args;

use exrep_core::catalog::canonical_fields;

/// Arguments for the fields command.
#[derive(Args)]
pub struct FieldsArgs {
    /// Print the fields as a JSON array
    #[arg(long)]
    json: bool,
}

pub fn run(args: FieldsArgs) -> anyhow::Result<()> {
    if args.json {
        println!("{}", serde_json::to_string_pretty(canonical_fields())?);
        return Ok(());
    }

    for field in canonical_fields() {
        println!("{field}");
    }

    Ok(())
}
