use std::path::Path;

use serde_json::json;

use crate::config::Config;
use crate::error::{RenoError, Result};
use crate::output::{self, Format};
use crate::phase::AliasTable;
use crate::store::repo::RENO_DIR;

/// Validate the configured alias table without opening the store, so a
/// broken table can be inspected even though it blocks every other command.
pub fn check(repo_root: &Path, list: bool, format: Format) -> Result<()> {
    let config = Config::load(&repo_root.join(RENO_DIR))?;
    let table = AliasTable::build(&config.aliases);
    let problems = table.validate().err().unwrap_or_default();

    match format {
        Format::Json => {
            let mut out = json!({
                "valid": problems.is_empty(),
                "problems": problems,
                "alias_count": table.entries().len(),
            });
            if list {
                out["aliases"] = json!(table.entries());
            }
            output::print_json(&out)?;
        }
        _ => {
            if list {
                for entry in table.entries() {
                    println!("{:40} {}", entry.alias, entry.phase);
                }
                println!();
            }
            if problems.is_empty() {
                println!("alias table ok ({} aliases)", table.entries().len());
            }
            for problem in &problems {
                println!("problem: {problem}");
            }
        }
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(RenoError::InvalidAliasTable(format!(
            "{} problem(s) found",
            problems.len()
        )))
    }
}
