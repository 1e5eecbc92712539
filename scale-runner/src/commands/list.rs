//! List registered tests.

use anyhow::{Context, Result};
use std::path::Path;

use crate::registry::Registry;

/// Run the list command.
pub fn run(suite_dir: &Path) -> Result<()> {
    let registry = Registry::load(suite_dir).context("cannot load test registry")?;
    print!("{}", render(&registry));
    Ok(())
}

/// Name, description and directory of every test, in registry order.
pub fn render(registry: &Registry) -> String {
    let tests = registry.tests();
    if tests.is_empty() {
        return "No tests registered.\n".to_string();
    }

    let width = tests.iter().map(|t| t.name.len()).max().unwrap_or(0).max(4);
    let mut out = format!("{:<width$}  DESCRIPTION\n", "TEST", width = width);
    for test in tests {
        let description = test.description.as_deref().unwrap_or("-");
        out.push_str(&format!("{:<width$}  {}\n", test.name, description, width = width));
    }
    out.push_str(&format!("\n{} tests\n", tests.len()));
    out
}
