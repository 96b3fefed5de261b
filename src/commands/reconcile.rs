use std::path::Path;

use serde_json::json;

use crate::error::Result;
use crate::output::{self, Format};
use crate::reconcile::{self, ReconcileReport};
use crate::store::repo::Repo;

/// Exit status when the stores disagree and nothing was corrected.
pub const MISMATCH_EXIT_CODE: i32 = 2;

pub fn run(repo_root: &Path, apply: bool, format: Format) -> Result<()> {
    let repo = Repo::open(repo_root)?;
    let _lock = if apply { Some(repo.lock()?) } else { None };
    let crm = repo.crm()?;
    let records = repo.retry_policy().run("list_records", || crm.list_records())?;
    let report = reconcile::diff(&records, &repo.db.list_all()?, &repo.aliases, repo.db.intents()?);

    let corrected = if apply {
        Some(reconcile::apply(&repo.db, &report)?)
    } else {
        None
    };

    match format {
        Format::Json => {
            let mut out = json!(report);
            if let Some(ref corrected) = corrected {
                out["corrected"] = json!(corrected);
            }
            output::print_json(&out)?;
        }
        _ => print_report(&report, corrected.as_ref().map(Vec::len)),
    }

    if report.has_mismatches() && corrected.is_none() {
        std::process::exit(MISMATCH_EXIT_CODE);
    }
    Ok(())
}

fn print_report(report: &ReconcileReport, corrected: Option<usize>) {
    let c = &report.counts;
    println!(
        "crm {}  local {}  matched {}  mismatched {}  missing locally {}  missing in crm {}  orphaned {}",
        c.crm_records,
        c.local_properties,
        c.matched,
        c.mismatched,
        c.missing_locally,
        c.missing_in_crm,
        c.orphaned
    );
    for m in &report.mismatches {
        println!(
            "  {}: crm '{}' ({}) vs local {}",
            m.unique_id,
            m.crm_status.as_deref().unwrap_or(""),
            m.crm_phase,
            m.local_phase
        );
    }
    if !report.pending_intents.is_empty() {
        println!(
            "{} pending phase write(s); run `reno resume`",
            report.pending_intents.len()
        );
    }
    if let Some(n) = corrected {
        println!("corrected {n} propert{}", if n == 1 { "y" } else { "ies" });
    }
}
