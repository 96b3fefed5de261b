use std::fs;
use std::io::Read;

use crate::error::Result;
use crate::extract;
use crate::output::{self, Format};

/// Extract categories and activities from a plain-text budget (`-` reads
/// stdin).
pub fn extract(source: &str, format: Format) -> Result<()> {
    let text = if source == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        fs::read_to_string(source)?
    };
    let extraction = extract::extract_activities(&text);

    match format {
        Format::Json => output::print_json(&extraction)?,
        _ => {
            println!("strategy: {}", extraction.strategy);
            for category in &extraction.categories {
                println!("{}", category.name);
                for a in &category.activities {
                    let code = a.code.as_deref().map(|c| format!("{c} ")).unwrap_or_default();
                    match a.amount_cents {
                        Some(cents) => println!(
                            "  {code}{}  {}.{:02}",
                            a.description,
                            cents / 100,
                            cents % 100
                        ),
                        None => println!("  {code}{}", a.description),
                    }
                }
            }
        }
    }
    Ok(())
}
