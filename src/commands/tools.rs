use colored::Colorize;
use prettytable::{format, Table};

use crate::error::Result;
use crate::tools::ToolRegistry;

/// Short form of a Google scope URL for display.
fn short_scope(scope: &str) -> &str {
    scope
        .strip_prefix("https://www.googleapis.com/auth/")
        .unwrap_or(scope)
}

fn build_table(registry: &ToolRegistry) -> Table {
    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_BORDERS_ONLY);
    table.add_row(prettytable::row![
        "Tool".bold(),
        "Scopes".bold(),
        "Description".bold()
    ]);

    for descriptor in registry.descriptors() {
        let scopes = descriptor
            .required_scopes
            .iter()
            .map(|s| short_scope(s))
            .collect::<Vec<_>>()
            .join(", ");
        let description = if descriptor.description.chars().count() > 60 {
            let cut: String = descriptor.description.chars().take(57).collect();
            format!("{cut}...")
        } else {
            descriptor.description.clone()
        };
        table.add_row(prettytable::row![descriptor.name.cyan(), scopes, description]);
    }
    table
}

/// Print every registered tool with its scopes
pub fn list_tools(registry: &ToolRegistry) -> Result<()> {
    if registry.is_empty() {
        println!("{}", "No tools registered.".yellow());
        return Ok(());
    }

    println!("\nRegistered tools ({}):", registry.len());
    build_table(registry).printstd();
    println!();
    Ok(())
}
