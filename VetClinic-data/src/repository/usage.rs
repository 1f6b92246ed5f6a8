use rusqlite::{params_from_iter, Row};
use tracing::debug;

use super::appointment::optional_name;
use super::errors::RepositoryError;
use super::query::Conditions;
use crate::database::DatabasePool;
use crate::models::{
    display_name, optional_timestamp_at, timestamp_at, to_db_timestamp, UsageFilter, UsageRecord,
};

const USAGE_COLUMNS: &str = "SELECT am.id, am.quantity, am.recorded_at,
        a.id, a.kind, a.status, a.requested_date, a.scheduled_at,
        a.branch_id, b.name,
        m.id, m.name, m.category, m.stock,
        p.id, p.name, p.species,
        o.id, ou.first_name, ou.last_name, ou.username,
        a.vet_id, vu.first_name, vu.last_name, vu.username,
        mr.id, mr.diagnosis
    FROM appointment_medications am
    JOIN appointments a ON a.id = am.appointment_id
    JOIN branches b ON b.id = a.branch_id
    JOIN medications m ON m.id = am.medication_id
    JOIN patients p ON p.id = a.patient_id
    JOIN owners o ON o.id = p.owner_id
    JOIN users ou ON ou.id = o.user_id
    LEFT JOIN users vu ON vu.id = a.vet_id
    LEFT JOIN medical_records mr ON mr.appointment_id = a.id";

fn map_usage(row: &Row<'_>) -> rusqlite::Result<UsageRecord> {
    let owner_first: String = row.get(18)?;
    let owner_last: String = row.get(19)?;
    let owner_username: String = row.get(20)?;

    Ok(UsageRecord {
        use_id: row.get(0)?,
        quantity: row.get(1)?,
        recorded_at: timestamp_at(row, 2)?,
        appointment_id: row.get(3)?,
        appointment_kind: row.get(4)?,
        appointment_status: row.get(5)?,
        requested_date: row.get(6)?,
        scheduled_at: optional_timestamp_at(row, 7)?,
        branch_id: row.get(8)?,
        branch_name: row.get(9)?,
        medication_id: row.get(10)?,
        medication_name: row.get(11)?,
        category: row.get(12)?,
        stock_now: row.get(13)?,
        patient_id: row.get(14)?,
        patient_name: row.get(15)?,
        patient_species: row.get(16)?,
        owner_id: row.get(17)?,
        owner_name: display_name(&owner_first, &owner_last, &owner_username),
        vet_id: row.get(21)?,
        vet_name: optional_name(row, 22)?,
        record_id: row.get(25)?,
        diagnosis: row.get(26)?,
    })
}

/// Read side of the dispensation ledger, used by analytics and reports
#[derive(Debug, Clone)]
pub struct UsageRepository {
    pool: DatabasePool,
}

impl UsageRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    /// Dispensed medications matching `filter`, most recent first
    pub fn list(&self, filter: &UsageFilter) -> Result<Vec<UsageRecord>, RepositoryError> {
        debug!("Listing medication usage with {:?}", filter);
        let mut conds = Conditions::new();
        conds.scope("a.branch_id", filter.scope);
        conds.push_opt("am.recorded_at >= ?", filter.since.as_ref().map(to_db_timestamp));
        conds.push_opt("o.id = ?", filter.owner_id);

        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(&format!(
            "{}{} ORDER BY am.recorded_at DESC, am.id DESC",
            USAGE_COLUMNS,
            conds.where_sql()
        ))?;
        let usage = stmt
            .query_map(params_from_iter(conds.params()), map_usage)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(usage)
    }
}
