use std::fs;
use std::path::{Path, PathBuf};

use colored::Colorize;
use serde_json::{Value, json};

use crate::build_info;
use crate::config::{Config, CrmBackend};
use crate::error::Result;
use crate::model::Phase;
use crate::output::Format;
use crate::phase::AliasTable;
use crate::store::db::PropertyDb;
use crate::store::repo::RENO_DIR;
use crate::sync::LAST_SYNC_KEY;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Level {
    Ok,
    Warn,
    Error,
}

#[derive(Debug)]
struct Check {
    category: &'static str,
    level: Level,
    message: String,
}

impl Check {
    fn ok(category: &'static str, msg: impl Into<String>) -> Self {
        Self {
            category,
            level: Level::Ok,
            message: msg.into(),
        }
    }
    fn warn(category: &'static str, msg: impl Into<String>) -> Self {
        Self {
            category,
            level: Level::Warn,
            message: msg.into(),
        }
    }
    fn error(category: &'static str, msg: impl Into<String>) -> Self {
        Self {
            category,
            level: Level::Error,
            message: msg.into(),
        }
    }

    fn prefix(&self) -> String {
        match self.level {
            Level::Ok => " ok ".green().to_string(),
            Level::Warn => "warn".yellow().to_string(),
            Level::Error => " ERR".red().bold().to_string(),
        }
    }

    fn to_json(&self) -> Value {
        json!({
            "category": self.category,
            "level": match self.level {
                Level::Ok => "ok",
                Level::Warn => "warn",
                Level::Error => "error",
            },
            "message": self.message,
        })
    }
}

pub fn run(format: Format) -> Result<()> {
    let cwd = std::env::current_dir()?;
    let mut checks: Vec<Check> = Vec::new();

    let reno_dir = find_reno_dir(&cwd);

    let config = run_core_checks(&mut checks, reno_dir.as_deref());

    if let (Some(reno), Some(config)) = (reno_dir.as_deref(), config.as_ref()) {
        run_store_checks(&mut checks, reno);
        run_crm_checks(&mut checks, reno, config);
    }

    run_env_checks(&mut checks, reno_dir.as_deref());

    let passed = checks.iter().filter(|c| c.level == Level::Ok).count();
    let warnings = checks.iter().filter(|c| c.level == Level::Warn).count();
    let errors = checks.iter().filter(|c| c.level == Level::Error).count();

    match format {
        Format::Json => {
            let arr: Vec<Value> = checks.iter().map(|c| c.to_json()).collect();
            let output = json!({
                "checks": arr,
                "build": {
                    "version": env!("CARGO_PKG_VERSION"),
                    "git_sha": build_info::git_sha(),
                },
                "summary": {
                    "passed": passed,
                    "warnings": warnings,
                    "errors": errors,
                }
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        _ => {
            let mut current_cat = "";
            for check in &checks {
                if check.category != current_cat {
                    if !current_cat.is_empty() {
                        eprintln!();
                    }
                    eprintln!("{}", check.category.bold());
                    current_cat = check.category;
                }
                eprintln!("  {}  {}", check.prefix(), check.message);
            }
            eprintln!();
            eprintln!(
                "{} passed, {} warnings, {} errors",
                passed.to_string().green(),
                warnings.to_string().yellow(),
                if errors > 0 {
                    errors.to_string().red().bold().to_string()
                } else {
                    errors.to_string()
                },
            );
        }
    }

    if errors > 0 {
        std::process::exit(1);
    }
    Ok(())
}

/// Walk up from cwd to find the `.reno/` directory.
fn find_reno_dir(start: &Path) -> Option<PathBuf> {
    let mut dir = start.to_path_buf();
    loop {
        let reno = dir.join(RENO_DIR);
        if reno.is_dir() {
            return Some(reno);
        }
        if !dir.pop() {
            return None;
        }
    }
}

fn run_core_checks(checks: &mut Vec<Check>, reno_dir: Option<&Path>) -> Option<Config> {
    match build_info::git_sha() {
        Some(sha) => checks.push(Check::ok(
            "Core",
            format!("reno {} ({sha})", env!("CARGO_PKG_VERSION")),
        )),
        None => checks.push(Check::ok(
            "Core",
            format!("reno {}", env!("CARGO_PKG_VERSION")),
        )),
    }

    let Some(reno) = reno_dir else {
        checks.push(Check::error("Core", "not a reno workspace (run reno init)"));
        return None;
    };
    checks.push(Check::ok("Core", ".reno/ found"));

    let config = match Config::load(reno) {
        Ok(config) => {
            checks.push(Check::ok(
                "Core",
                format!("config valid (crm backend: {})", config.crm.backend),
            ));
            config
        }
        Err(e) => {
            checks.push(Check::error("Core", format!("config: {e}")));
            return None;
        }
    };

    let table = AliasTable::build(&config.aliases);
    match table.validate() {
        Ok(()) => checks.push(Check::ok(
            "Core",
            format!("alias table valid ({} aliases)", table.entries().len()),
        )),
        Err(problems) => {
            for problem in problems {
                checks.push(Check::error("Core", format!("alias table: {problem}")));
            }
        }
    }
    Some(config)
}

fn run_store_checks(checks: &mut Vec<Check>, reno: &Path) {
    let db_path = reno.join("reno.db");
    if !db_path.exists() {
        checks.push(Check::error("Store", "missing reno.db (run reno init)"));
        return;
    }
    let db = match PropertyDb::open(&db_path) {
        Ok(db) => db,
        Err(e) => {
            checks.push(Check::error("Store", format!("cannot open reno.db: {e}")));
            return;
        }
    };

    match db.count_by_phase() {
        Ok(counts) => {
            let total: usize = counts.iter().map(|(_, n)| n).sum();
            checks.push(Check::ok("Store", format!("{total} properties")));
            let orphaned = counts
                .iter()
                .find(|(p, _)| *p == Phase::Orphaned)
                .map(|(_, n)| *n)
                .unwrap_or(0);
            if orphaned > 0 {
                checks.push(Check::warn(
                    "Store",
                    format!("{orphaned} orphaned properties (fix with reno phase set)"),
                ));
            }
        }
        Err(e) => checks.push(Check::error("Store", format!("cannot read properties: {e}"))),
    }

    match db.intents() {
        Ok(intents) if intents.is_empty() => {
            checks.push(Check::ok("Store", "no pending phase writes"));
        }
        Ok(intents) => checks.push(Check::warn(
            "Store",
            format!("{} pending phase write(s) (run reno resume)", intents.len()),
        )),
        Err(e) => checks.push(Check::error("Store", format!("cannot read intents: {e}"))),
    }

    match db.get_metadata(LAST_SYNC_KEY) {
        Ok(Some(at)) => checks.push(Check::ok("Store", format!("last sync {at}"))),
        Ok(None) => checks.push(Check::warn("Store", "never synced (run reno sync)")),
        Err(e) => checks.push(Check::error("Store", format!("cannot read metadata: {e}"))),
    }
}

fn run_crm_checks(checks: &mut Vec<Check>, reno: &Path, config: &Config) {
    match config.crm.backend {
        CrmBackend::Snapshot => {
            let path = reno.join(&config.crm.snapshot_path);
            if !path.exists() {
                checks.push(Check::warn(
                    "CRM",
                    format!("snapshot {} not found (empty table)", path.display()),
                ));
                return;
            }
            match fs::read_to_string(&path)
                .map_err(|e| e.to_string())
                .and_then(|data| {
                    serde_json::from_str::<Vec<Value>>(&data).map_err(|e| e.to_string())
                }) {
                Ok(records) => checks.push(Check::ok(
                    "CRM",
                    format!("snapshot readable ({} records)", records.len()),
                )),
                Err(e) => checks.push(Check::error("CRM", format!("corrupt snapshot: {e}"))),
            }
        }
        CrmBackend::Airtable => {
            if Config::airtable_token().is_some() {
                checks.push(Check::ok("CRM", "airtable token set"));
            } else {
                checks.push(Check::error(
                    "CRM",
                    format!("{} is not set", crate::config::ENV_AIRTABLE_TOKEN),
                ));
            }
            checks.push(Check::ok(
                "CRM",
                format!(
                    "airtable base {} table '{}'",
                    config.crm.base_id.as_deref().unwrap_or("-"),
                    config.crm.table
                ),
            ));
        }
    }
}

fn run_env_checks(checks: &mut Vec<Check>, reno_dir: Option<&Path>) {
    let in_path = std::env::var_os("PATH")
        .map(|paths| std::env::split_paths(&paths).any(|dir| dir.join("reno").exists()))
        .unwrap_or(false);

    if in_path {
        checks.push(Check::ok("Environment", "reno in PATH"));
    } else {
        checks.push(Check::warn("Environment", "reno not in PATH"));
    }

    if let Some(reno) = reno_dir {
        let workspace_root = reno.parent().unwrap_or(Path::new("."));
        let gitignore_path = workspace_root.join(".gitignore");

        if gitignore_path.exists() {
            let content = fs::read_to_string(&gitignore_path).unwrap_or_default();
            check_gitignore_entry(checks, &content, "reno.db");
            check_gitignore_entry(checks, &content, "sync.lock");
        }
    }
}

fn check_gitignore_entry(checks: &mut Vec<Check>, content: &str, pattern: &str) {
    let covered = content.lines().any(|line| {
        let line = line.trim();
        !line.starts_with('#') && (line.contains(pattern) || line == ".reno" || line == ".reno/")
    });

    if covered {
        checks.push(Check::ok("Environment", format!("{pattern} gitignored")));
    } else {
        checks.push(Check::warn(
            "Environment",
            format!("{pattern} not gitignored"),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::repo::Repo;
    use tempfile::tempdir;

    fn levels(checks: &[Check]) -> Vec<Level> {
        checks.iter().map(|c| c.level).collect()
    }

    #[test]
    fn missing_workspace_is_an_error() {
        let mut checks = Vec::new();
        assert!(run_core_checks(&mut checks, None).is_none());
        assert!(levels(&checks).contains(&Level::Error));
    }

    #[test]
    fn fresh_workspace_warns_about_sync() {
        let dir = tempdir().unwrap();
        let repo = Repo::init(dir.path()).unwrap();
        let mut checks = Vec::new();
        let config = run_core_checks(&mut checks, Some(repo.root())).unwrap();
        run_store_checks(&mut checks, repo.root());
        run_crm_checks(&mut checks, repo.root(), &config);

        assert!(!levels(&checks).contains(&Level::Error));
        assert!(checks.iter().any(|c| c.message.contains("never synced")));
        assert!(checks.iter().any(|c| c.message.contains("snapshot")));
    }

    #[test]
    fn pending_intent_is_a_warning() {
        let dir = tempdir().unwrap();
        let repo = Repo::init(dir.path()).unwrap();
        let property = crate::model::Property::new("SP-1");
        repo.db.insert(&property).unwrap();
        repo.db
            .put_intent(&crate::model::PhaseIntent {
                property_id: property.id,
                unique_id: property.unique_id.clone(),
                target: Phase::InitialCheck,
                source: crate::model::ChangeSource::Action,
                created_at: chrono::Utc::now(),
            })
            .unwrap();

        let mut checks = Vec::new();
        run_store_checks(&mut checks, repo.root());
        assert!(checks.iter().any(|c| {
            c.level == Level::Warn && c.message.contains("pending phase write")
        }));
    }

    #[test]
    fn gitignore_coverage() {
        let mut checks = Vec::new();
        check_gitignore_entry(&mut checks, "# comment reno.db\ntarget/\n", "reno.db");
        check_gitignore_entry(&mut checks, ".reno/\n", "sync.lock");
        assert_eq!(levels(&checks), [Level::Warn, Level::Ok]);
    }
}
