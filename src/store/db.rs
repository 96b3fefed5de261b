use std::path::Path;

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, Transaction, params};
use uuid::Uuid;

use crate::error::{RenoError, Result};
use crate::model::{ChangeSource, HistoryEntry, Phase, PhaseIntent, Property};

const PROPERTY_COLUMNS: &str = "id, unique_id, address, area, renovator, technical_constructor, \
     phase, set_up_status, estimated_visit_date, initial_checklist, final_checklist, \
     created_at, updated_at";

/// Internal relational store for properties, their phase history and
/// in-flight phase intents.
pub struct PropertyDb {
    conn: Connection,
}

impl PropertyDb {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        let db = Self { conn };
        db.create_tables()?;
        Ok(db)
    }

    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        let db = Self { conn };
        db.create_tables()?;
        Ok(db)
    }

    fn create_tables(&self) -> Result<()> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS properties (
                id TEXT PRIMARY KEY,
                unique_id TEXT NOT NULL UNIQUE,
                address TEXT,
                area TEXT,
                renovator TEXT,
                technical_constructor TEXT,
                phase TEXT NOT NULL DEFAULT 'upcoming-settlements',
                set_up_status TEXT,
                estimated_visit_date TEXT,
                initial_checklist TEXT,
                final_checklist TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS phase_history (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                property_id TEXT NOT NULL REFERENCES properties(id),
                from_phase TEXT,
                to_phase TEXT NOT NULL,
                source TEXT NOT NULL,
                note TEXT,
                at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS phase_intents (
                property_id TEXT PRIMARY KEY REFERENCES properties(id),
                unique_id TEXT NOT NULL,
                target TEXT NOT NULL,
                source TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_properties_phase ON properties(phase);
            CREATE INDEX IF NOT EXISTS idx_history_property ON phase_history(property_id);
            CREATE TABLE IF NOT EXISTS metadata (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );",
        )?;
        Ok(())
    }

    /// Begin a transaction; writes made through `self` while it is open
    /// are part of it.
    pub fn transaction(&self) -> Result<Transaction<'_>> {
        Ok(self.conn.unchecked_transaction()?)
    }

    pub fn insert(&self, property: &Property) -> Result<()> {
        if self.get_by_unique_id(&property.unique_id)?.is_some() {
            return Err(RenoError::DuplicateUniqueId(property.unique_id.clone()));
        }
        self.conn.execute(
            &format!(
                "INSERT INTO properties ({PROPERTY_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)"
            ),
            params![
                property.id.to_string(),
                property.unique_id,
                property.address,
                property.area,
                property.renovator,
                property.technical_constructor,
                property.phase.slug(),
                property.set_up_status,
                property.estimated_visit_date.map(|d| d.to_string()),
                json_text(property.initial_checklist.as_ref())?,
                json_text(property.final_checklist.as_ref())?,
                property.created_at.to_rfc3339(),
                property.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn update(&self, property: &Property) -> Result<()> {
        if let Some(other) = self.get_by_unique_id(&property.unique_id)? {
            if other.id != property.id {
                return Err(RenoError::DuplicateUniqueId(property.unique_id.clone()));
            }
        }
        let changed = self.conn.execute(
            "UPDATE properties SET unique_id = ?2, address = ?3, area = ?4, renovator = ?5,
                technical_constructor = ?6, phase = ?7, set_up_status = ?8,
                estimated_visit_date = ?9, initial_checklist = ?10, final_checklist = ?11,
                updated_at = ?12
             WHERE id = ?1",
            params![
                property.id.to_string(),
                property.unique_id,
                property.address,
                property.area,
                property.renovator,
                property.technical_constructor,
                property.phase.slug(),
                property.set_up_status,
                property.estimated_visit_date.map(|d| d.to_string()),
                json_text(property.initial_checklist.as_ref())?,
                json_text(property.final_checklist.as_ref())?,
                property.updated_at.to_rfc3339(),
            ],
        )?;
        if changed == 0 {
            return Err(RenoError::PropertyNotFound(property.id.to_string()));
        }
        Ok(())
    }

    pub fn get(&self, id: Uuid) -> Result<Property> {
        self.conn
            .query_row(
                &format!("SELECT {PROPERTY_COLUMNS} FROM properties WHERE id = ?1"),
                params![id.to_string()],
                row_to_property,
            )
            .optional()?
            .ok_or_else(|| RenoError::PropertyNotFound(id.to_string()))
    }

    pub fn get_by_unique_id(&self, unique_id: &str) -> Result<Option<Property>> {
        Ok(self
            .conn
            .query_row(
                &format!("SELECT {PROPERTY_COLUMNS} FROM properties WHERE unique_id = ?1"),
                params![unique_id],
                row_to_property,
            )
            .optional()?)
    }

    pub fn list_all(&self) -> Result<Vec<Property>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {PROPERTY_COLUMNS} FROM properties ORDER BY unique_id"
        ))?;
        let properties = stmt
            .query_map([], row_to_property)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(properties)
    }

    pub fn list_by_phase(&self, phase: Phase) -> Result<Vec<Property>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {PROPERTY_COLUMNS} FROM properties WHERE phase = ?1 ORDER BY unique_id"
        ))?;
        let properties = stmt
            .query_map(params![phase.slug()], row_to_property)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(properties)
    }

    /// `(id, unique_id)` pairs for every stored property.
    pub fn keys(&self) -> Result<Vec<(Uuid, String)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, unique_id FROM properties ORDER BY unique_id")?;
        let keys = stmt
            .query_map([], |row| {
                let id: String = row.get(0)?;
                let id = Uuid::parse_str(&id).map_err(|e| conversion(0, e))?;
                Ok((id, row.get(1)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(keys)
    }

    pub fn count_by_phase(&self) -> Result<Vec<(Phase, usize)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT phase, COUNT(*) FROM properties GROUP BY phase")?;
        let mut counts = stmt
            .query_map([], |row| {
                let slug: String = row.get(0)?;
                let phase = parse_phase(0, &slug)?;
                let count: i64 = row.get(1)?;
                Ok((phase, usize::try_from(count).unwrap_or_default()))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        counts.sort();
        Ok(counts)
    }

    pub fn delete(&self, id: Uuid) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        let key = id.to_string();
        tx.execute("DELETE FROM phase_intents WHERE property_id = ?1", params![key])?;
        tx.execute("DELETE FROM phase_history WHERE property_id = ?1", params![key])?;
        let removed = tx.execute("DELETE FROM properties WHERE id = ?1", params![key])?;
        if removed == 0 {
            return Err(RenoError::PropertyNotFound(key));
        }
        tx.commit()?;
        Ok(())
    }

    pub fn append_history(&self, entry: &HistoryEntry) -> Result<()> {
        self.conn.execute(
            "INSERT INTO phase_history (property_id, from_phase, to_phase, source, note, at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                entry.property_id.to_string(),
                entry.from.map(|p| p.slug()),
                entry.to.slug(),
                entry.source.to_string(),
                entry.note,
                entry.at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn history(&self, id: Uuid) -> Result<Vec<HistoryEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT property_id, from_phase, to_phase, source, note, at
             FROM phase_history WHERE property_id = ?1 ORDER BY seq",
        )?;
        let entries = stmt
            .query_map(params![id.to_string()], |row| {
                let property_id: String = row.get(0)?;
                let from: Option<String> = row.get(1)?;
                let to: String = row.get(2)?;
                let source: String = row.get(3)?;
                let at: String = row.get(5)?;
                Ok(HistoryEntry {
                    property_id: Uuid::parse_str(&property_id).map_err(|e| conversion(0, e))?,
                    from: from.map(|s| parse_phase(1, &s)).transpose()?,
                    to: parse_phase(2, &to)?,
                    source: source.parse().map_err(|e: String| conversion(3, e))?,
                    note: row.get(4)?,
                    at: parse_timestamp(5, &at)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    /// Record that a phase write is about to reach the CRM. Replaces any
    /// earlier intent for the same property.
    pub fn put_intent(&self, intent: &PhaseIntent) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO phase_intents (property_id, unique_id, target, source, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                intent.property_id.to_string(),
                intent.unique_id,
                intent.target.slug(),
                intent.source.to_string(),
                intent.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn clear_intent(&self, id: Uuid) -> Result<()> {
        self.conn.execute(
            "DELETE FROM phase_intents WHERE property_id = ?1",
            params![id.to_string()],
        )?;
        Ok(())
    }

    pub fn intents(&self) -> Result<Vec<PhaseIntent>> {
        let mut stmt = self.conn.prepare(
            "SELECT property_id, unique_id, target, source, created_at
             FROM phase_intents ORDER BY created_at, unique_id",
        )?;
        let intents = stmt
            .query_map([], |row| {
                let property_id: String = row.get(0)?;
                let target: String = row.get(2)?;
                let source: String = row.get(3)?;
                let created_at: String = row.get(4)?;
                Ok(PhaseIntent {
                    property_id: Uuid::parse_str(&property_id).map_err(|e| conversion(0, e))?,
                    unique_id: row.get(1)?,
                    target: parse_phase(2, &target)?,
                    source: source.parse().map_err(|e: String| conversion(3, e))?,
                    created_at: parse_timestamp(4, &created_at)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(intents)
    }

    /// Persist a phase change: property row, history entry and intent
    /// removal commit together or not at all.
    pub fn apply_phase(
        &self,
        property: &Property,
        from: Option<Phase>,
        source: ChangeSource,
        note: Option<&str>,
    ) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        self.update(property)?;
        self.append_history(&HistoryEntry {
            property_id: property.id,
            from,
            to: property.phase,
            source,
            note: note.map(str::to_string),
            at: property.updated_at,
        })?;
        self.clear_intent(property.id)?;
        tx.commit()?;
        Ok(())
    }

    pub fn get_metadata(&self, key: &str) -> Result<Option<String>> {
        Ok(self
            .conn
            .query_row(
                "SELECT value FROM metadata WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?)
    }

    pub fn set_metadata(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO metadata (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }
}

fn json_text(value: Option<&serde_json::Value>) -> Result<Option<String>> {
    Ok(value.map(serde_json::to_string).transpose()?)
}

fn conversion(idx: usize, err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, err.into())
}

fn parse_phase(idx: usize, slug: &str) -> rusqlite::Result<Phase> {
    Phase::from_slug(slug).ok_or_else(|| conversion(idx, format!("unknown phase '{slug}'")))
}

fn parse_timestamp(idx: usize, text: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| conversion(idx, e))
}

fn parse_json(idx: usize, text: Option<String>) -> rusqlite::Result<Option<serde_json::Value>> {
    text.map(|t| serde_json::from_str(&t).map_err(|e| conversion(idx, e)))
        .transpose()
}

fn row_to_property(row: &Row<'_>) -> rusqlite::Result<Property> {
    let id: String = row.get(0)?;
    let phase: String = row.get(6)?;
    let visit: Option<String> = row.get(8)?;
    let created_at: String = row.get(11)?;
    let updated_at: String = row.get(12)?;
    Ok(Property {
        id: Uuid::parse_str(&id).map_err(|e| conversion(0, e))?,
        unique_id: row.get(1)?,
        address: row.get(2)?,
        area: row.get(3)?,
        renovator: row.get(4)?,
        technical_constructor: row.get(5)?,
        phase: parse_phase(6, &phase)?,
        set_up_status: row.get(7)?,
        estimated_visit_date: visit
            .map(|d| NaiveDate::parse_from_str(&d, "%Y-%m-%d").map_err(|e| conversion(8, e)))
            .transpose()?,
        initial_checklist: parse_json(9, row.get(9)?)?,
        final_checklist: parse_json(10, row.get(10)?)?,
        created_at: parse_timestamp(11, &created_at)?,
        updated_at: parse_timestamp(12, &updated_at)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn property(unique_id: &str) -> Property {
        let mut p = Property::new(unique_id);
        p.address = Some("Calle Mayor 1".into());
        p.renovator = Some("Obras Norte".into());
        p
    }

    #[test]
    fn insert_and_read_back() {
        let db = PropertyDb::open_memory().unwrap();
        let mut p = property("SP-0001");
        p.estimated_visit_date = NaiveDate::from_ymd_opt(2026, 3, 14);
        p.initial_checklist = Some(json!({"kitchen": {"sink": {"status": "ok"}}}));
        db.insert(&p).unwrap();

        let read = db.get(p.id).unwrap();
        assert_eq!(read.unique_id, "SP-0001");
        assert_eq!(read.estimated_visit_date, p.estimated_visit_date);
        assert_eq!(read.initial_checklist, p.initial_checklist);
        assert_eq!(read.phase, Phase::UpcomingSettlements);

        let by_key = db.get_by_unique_id("SP-0001").unwrap().unwrap();
        assert_eq!(by_key.id, p.id);
    }

    #[test]
    fn duplicate_unique_id_is_rejected() {
        let db = PropertyDb::open_memory().unwrap();
        db.insert(&property("SP-0001")).unwrap();
        let err = db.insert(&property("SP-0001")).unwrap_err();
        assert!(matches!(err, RenoError::DuplicateUniqueId(_)));
    }

    #[test]
    fn update_cannot_steal_another_unique_id() {
        let db = PropertyDb::open_memory().unwrap();
        db.insert(&property("SP-0001")).unwrap();
        let mut second = property("SP-0002");
        db.insert(&second).unwrap();
        second.unique_id = "SP-0001".into();
        assert!(matches!(
            db.update(&second),
            Err(RenoError::DuplicateUniqueId(_))
        ));
    }

    #[test]
    fn get_missing_property_fails() {
        let db = PropertyDb::open_memory().unwrap();
        assert!(matches!(
            db.get(Uuid::new_v4()),
            Err(RenoError::PropertyNotFound(_))
        ));
        assert!(db.get_by_unique_id("nope").unwrap().is_none());
    }

    #[test]
    fn apply_phase_records_history_and_clears_intent() {
        let db = PropertyDb::open_memory().unwrap();
        let mut p = property("SP-0001");
        db.insert(&p).unwrap();
        db.put_intent(&PhaseIntent {
            property_id: p.id,
            unique_id: p.unique_id.clone(),
            target: Phase::InitialCheck,
            source: ChangeSource::Action,
            created_at: Utc::now(),
        })
        .unwrap();
        assert_eq!(db.intents().unwrap().len(), 1);

        p.phase = Phase::InitialCheck;
        p.set_up_status = Some(Phase::InitialCheck.canonical_label().into());
        db.apply_phase(
            &p,
            Some(Phase::UpcomingSettlements),
            ChangeSource::Action,
            Some("visit scheduled"),
        )
        .unwrap();

        assert_eq!(db.get(p.id).unwrap().phase, Phase::InitialCheck);
        assert!(db.intents().unwrap().is_empty());
        let history = db.history(p.id).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].from, Some(Phase::UpcomingSettlements));
        assert_eq!(history[0].to, Phase::InitialCheck);
        assert_eq!(history[0].source, ChangeSource::Action);
        assert_eq!(history[0].note.as_deref(), Some("visit scheduled"));
    }

    #[test]
    fn delete_removes_history_and_intents() {
        let db = PropertyDb::open_memory().unwrap();
        let p = property("SP-0001");
        db.insert(&p).unwrap();
        db.append_history(&HistoryEntry {
            property_id: p.id,
            from: None,
            to: Phase::UpcomingSettlements,
            source: ChangeSource::Manual,
            note: None,
            at: Utc::now(),
        })
        .unwrap();
        db.delete(p.id).unwrap();
        assert!(db.get(p.id).is_err());
        assert!(db.history(p.id).unwrap().is_empty());
        assert!(db.delete(p.id).is_err());
    }

    #[test]
    fn count_by_phase_groups_rows() {
        let db = PropertyDb::open_memory().unwrap();
        db.insert(&property("A")).unwrap();
        let mut b = property("B");
        b.phase = Phase::Done;
        db.insert(&b).unwrap();
        db.insert(&property("C")).unwrap();
        let counts = db.count_by_phase().unwrap();
        assert_eq!(
            counts,
            vec![(Phase::UpcomingSettlements, 2), (Phase::Done, 1)]
        );
        assert_eq!(db.list_by_phase(Phase::Done).unwrap().len(), 1);
    }

    #[test]
    fn metadata_round_trip() {
        let db = PropertyDb::open_memory().unwrap();
        assert_eq!(db.get_metadata("last_sync_at").unwrap(), None);
        db.set_metadata("last_sync_at", "2026-01-01T00:00:00Z").unwrap();
        assert_eq!(
            db.get_metadata("last_sync_at").unwrap().as_deref(),
            Some("2026-01-01T00:00:00Z")
        );
    }
}
