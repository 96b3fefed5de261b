use std::fs;
use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::config::{CONFIG_FILE, Config};
use crate::crm::{self, Crm, RetryPolicy};
use crate::error::{RenoError, Result};
use crate::model::Property;
use crate::phase::AliasTable;
use crate::store::db::PropertyDb;
use crate::store::lock::{self, StoreLock};

pub const RENO_DIR: &str = ".reno";
const DB_FILE: &str = "reno.db";
const LOCK_FILE: &str = "sync.lock";

/// Minimum number of hex characters accepted as a property id prefix.
const MIN_PREFIX_LEN: usize = 4;

/// An opened `.reno/` workspace: configuration, validated alias table and
/// the property store.
pub struct Repo {
    root: PathBuf,
    pub config: Config,
    pub aliases: AliasTable,
    pub db: PropertyDb,
}

impl Repo {
    /// Create `.reno/` with a default config and an empty store.
    pub fn init(repo_root: &Path) -> Result<Self> {
        let root = repo_root.join(RENO_DIR);
        if root.join(CONFIG_FILE).exists() {
            return Err(RenoError::AlreadyInitialized);
        }
        fs::create_dir_all(&root)?;
        fs::write(root.join(CONFIG_FILE), Config::default().to_yaml()?)?;
        PropertyDb::open(&root.join(DB_FILE))?;
        tracing::info!(path = %root.display(), "initialized workspace");
        Self::open(repo_root)
    }

    /// Open an existing workspace. The alias table is validated here, so a
    /// broken `aliases:` section stops every command before it touches data.
    pub fn open(repo_root: &Path) -> Result<Self> {
        let root = repo_root.join(RENO_DIR);
        if !root.join(CONFIG_FILE).exists() {
            return Err(RenoError::NotInitialized);
        }
        let config = Config::load(&root)?;
        let aliases = AliasTable::load(&config.aliases)?;
        let db = PropertyDb::open(&root.join(DB_FILE))?;
        Ok(Self {
            root,
            config,
            aliases,
            db,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn crm(&self) -> Result<Box<dyn Crm>> {
        crm::open(&self.config, &self.root)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::from_config(&self.config)
    }

    /// Exclusive lock for bulk writers (sync, resume, reconcile --apply).
    pub fn lock(&self) -> Result<StoreLock> {
        lock::acquire_lock(&self.root.join(LOCK_FILE))
    }

    /// Resolve a user-supplied property reference to a stored property.
    pub fn resolve(&self, input: &str) -> Result<Property> {
        let id = resolve_property_input(input, &self.db.keys()?)?;
        self.db.get(id)
    }
}

/// Resolution order: exact Unique ID, case-insensitive Unique ID, exact
/// UUID, then a unique lowercase-hex UUID prefix.
pub fn resolve_property_input(input: &str, keys: &[(Uuid, String)]) -> Result<Uuid> {
    let raw = input.trim();
    if raw.is_empty() {
        return Err(RenoError::PropertyNotFound(input.to_string()));
    }

    if let Some((id, _)) = keys.iter().find(|(_, uid)| uid == raw) {
        return Ok(*id);
    }
    let folded: Vec<&(Uuid, String)> = keys
        .iter()
        .filter(|(_, uid)| uid.eq_ignore_ascii_case(raw))
        .collect();
    if let [(id, _)] = folded.as_slice() {
        return Ok(*id);
    }

    if let Ok(exact) = Uuid::parse_str(raw) {
        return keys
            .iter()
            .find(|(id, _)| *id == exact)
            .map(|(id, _)| *id)
            .ok_or_else(|| RenoError::PropertyNotFound(raw.to_string()));
    }

    let prefix = raw.to_ascii_lowercase();
    let is_prefix_like = prefix.len() >= MIN_PREFIX_LEN
        && prefix.bytes().all(|b| b.is_ascii_hexdigit() || b == b'-');
    if !is_prefix_like {
        return Err(RenoError::PropertyNotFound(raw.to_string()));
    }

    let mut matches: Vec<&(Uuid, String)> = keys
        .iter()
        .filter(|(id, _)| id.to_string().starts_with(&prefix))
        .collect();
    matches.sort_by_key(|(id, _)| *id);
    matches.dedup_by_key(|(id, _)| *id);

    match matches.as_slice() {
        [] => Err(RenoError::PropertyNotFound(raw.to_string())),
        [(id, _)] => Ok(*id),
        many => Err(RenoError::PropertyAmbiguous(
            raw.to_string(),
            many.iter()
                .map(|(id, uid)| format!("{id} ({uid})"))
                .collect::<Vec<_>>()
                .join(", "),
        )),
    }
}

const MAX_UNIQUE_ID_LEN: usize = 64;

/// Unique IDs are the join key with the CRM: non-empty, no whitespace or
/// control characters, bounded length.
pub fn validate_unique_id(unique_id: &str) -> Result<()> {
    let invalid = |reason: &str| RenoError::InvalidUniqueId(unique_id.to_string(), reason.into());
    if unique_id.trim().is_empty() {
        return Err(invalid("must not be empty"));
    }
    if unique_id.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(invalid("must not contain whitespace"));
    }
    if unique_id.chars().count() > MAX_UNIQUE_ID_LEN {
        return Err(invalid("longer than 64 characters"));
    }
    Ok(())
}

/// Walk up from the current directory to find the directory holding `.reno/`.
pub fn find_repo_root() -> Result<PathBuf> {
    let mut dir = std::env::current_dir().map_err(RenoError::Io)?;
    loop {
        if dir.join(RENO_DIR).join(CONFIG_FILE).exists() {
            return Ok(dir);
        }
        if !dir.pop() {
            return Err(RenoError::NotInitialized);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn key(uuid: &str, uid: &str) -> (Uuid, String) {
        (Uuid::parse_str(uuid).unwrap(), uid.to_string())
    }

    fn keys() -> Vec<(Uuid, String)> {
        vec![
            key("deadbeef-0000-4000-8000-000000000001", "SP-0001"),
            key("deadbeef-1111-4000-8000-000000000002", "SP-0002"),
            key("cafebabe-0000-4000-8000-000000000003", "sp-0003"),
        ]
    }

    #[test]
    fn resolves_exact_unique_id() {
        let id = resolve_property_input("SP-0002", &keys()).unwrap();
        assert_eq!(id.to_string(), "deadbeef-1111-4000-8000-000000000002");
    }

    #[test]
    fn resolves_unique_id_case_insensitively() {
        let id = resolve_property_input("SP-0003", &keys()).unwrap();
        assert_eq!(id.to_string(), "cafebabe-0000-4000-8000-000000000003");
    }

    #[test]
    fn resolves_full_uuid() {
        let id =
            resolve_property_input("CAFEBABE-0000-4000-8000-000000000003", &keys()).unwrap();
        assert_eq!(id.to_string(), "cafebabe-0000-4000-8000-000000000003");
    }

    #[test]
    fn resolves_unique_prefix() {
        let id = resolve_property_input("cafe", &keys()).unwrap();
        assert_eq!(id.to_string(), "cafebabe-0000-4000-8000-000000000003");
        let id = resolve_property_input("deadbeef-1", &keys()).unwrap();
        assert_eq!(id.to_string(), "deadbeef-1111-4000-8000-000000000002");
    }

    #[test]
    fn reports_ambiguous_prefix() {
        let err = resolve_property_input("deadbeef", &keys()).unwrap_err();
        match err {
            RenoError::PropertyAmbiguous(prefix, matches) => {
                assert_eq!(prefix, "deadbeef");
                assert!(matches.contains("SP-0001"));
                assert!(matches.contains("SP-0002"));
            }
            other => panic!("expected PropertyAmbiguous, got {other:?}"),
        }
    }

    #[test]
    fn short_or_unknown_input_is_not_found() {
        for input in ["", "dea", "SP-9999", "zzzzzz"] {
            assert!(
                matches!(
                    resolve_property_input(input, &keys()),
                    Err(RenoError::PropertyNotFound(_))
                ),
                "input {input:?}"
            );
        }
    }

    #[test]
    fn unique_id_validation() {
        assert!(validate_unique_id("SP-0001").is_ok());
        let long = "x".repeat(65);
        for bad in ["", "   ", "SP 1", "SP-1\t", long.as_str()] {
            let err = validate_unique_id(bad).unwrap_err();
            assert_eq!(err.code(), "invalid_unique_id", "input {bad:?}");
        }
    }

    #[test]
    fn init_then_open() {
        let dir = tempdir().unwrap();
        let repo = Repo::init(dir.path()).unwrap();
        assert!(repo.root().join(CONFIG_FILE).exists());
        assert!(repo.root().join(DB_FILE).exists());
        assert!(matches!(
            Repo::init(dir.path()),
            Err(RenoError::AlreadyInitialized)
        ));
        assert!(Repo::open(dir.path()).is_ok());
    }

    #[test]
    fn open_without_init_fails() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            Repo::open(dir.path()),
            Err(RenoError::NotInitialized)
        ));
    }

    #[test]
    fn open_rejects_invalid_alias_table() {
        let dir = tempdir().unwrap();
        Repo::init(dir.path()).unwrap();
        fs::write(
            dir.path().join(RENO_DIR).join(CONFIG_FILE),
            "aliases:\n  done: [\"in progress\"]\n",
        )
        .unwrap();
        let err = Repo::open(dir.path()).err().unwrap();
        assert_eq!(err.code(), "invalid_alias_table");
    }

    #[test]
    fn resolve_through_repo() {
        let dir = tempdir().unwrap();
        let repo = Repo::init(dir.path()).unwrap();
        let property = Property::new("SP-0100");
        repo.db.insert(&property).unwrap();
        assert_eq!(repo.resolve("sp-0100").unwrap().id, property.id);
    }
}
