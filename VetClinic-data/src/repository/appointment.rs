use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, OptionalExtension, Row};
use tracing::{debug, info};

use super::errors::RepositoryError;
use super::query::Conditions;
use crate::database::DatabasePool;
use crate::models::{
    display_name, optional_timestamp_at, timestamp_at, to_db_timestamp, Appointment,
    AppointmentFilter, AppointmentStatus, MedicationUse, NewAppointment,
};

pub(crate) const APPOINTMENT_COLUMNS: &str = "SELECT a.id, a.patient_id, p.name, p.species,
        o.id, o.user_id, ou.first_name, ou.last_name, ou.username, o.phone, ou.phone,
        a.vet_id, vu.first_name, vu.last_name, vu.username,
        a.branch_id, b.name, a.requested_date, a.scheduled_at, a.duration_minutes,
        a.kind, a.status, a.notes, mr.id
    FROM appointments a
    JOIN patients p ON p.id = a.patient_id
    JOIN owners o ON o.id = p.owner_id
    JOIN users ou ON ou.id = o.user_id
    JOIN branches b ON b.id = a.branch_id
    LEFT JOIN users vu ON vu.id = a.vet_id
    LEFT JOIN medical_records mr ON mr.appointment_id = a.id";

/// Display name for an optional joined user
pub(crate) fn optional_name(
    row: &Row<'_>,
    first: usize,
) -> rusqlite::Result<Option<String>> {
    let username: Option<String> = row.get(first + 2)?;
    Ok(match username {
        Some(username) => {
            let first_name: Option<String> = row.get(first)?;
            let last_name: Option<String> = row.get(first + 1)?;
            Some(display_name(
                first_name.as_deref().unwrap_or(""),
                last_name.as_deref().unwrap_or(""),
                &username,
            ))
        }
        None => None,
    })
}

pub(crate) fn map_appointment(row: &Row<'_>) -> rusqlite::Result<Appointment> {
    let owner_first: String = row.get(6)?;
    let owner_last: String = row.get(7)?;
    let owner_username: String = row.get(8)?;
    let profile_phone: String = row.get(9)?;
    let account_phone: String = row.get(10)?;

    Ok(Appointment {
        id: row.get(0)?,
        patient_id: row.get(1)?,
        patient_name: row.get(2)?,
        patient_species: row.get(3)?,
        owner_id: row.get(4)?,
        owner_user_id: row.get(5)?,
        owner_name: display_name(&owner_first, &owner_last, &owner_username),
        owner_phone: if profile_phone.trim().is_empty() { account_phone } else { profile_phone },
        vet_id: row.get(11)?,
        vet_name: optional_name(row, 12)?,
        branch_id: row.get(15)?,
        branch_name: row.get(16)?,
        requested_date: row.get(17)?,
        scheduled_at: optional_timestamp_at(row, 18)?,
        duration_minutes: row.get(19)?,
        kind: row.get(20)?,
        status: row.get(21)?,
        notes: row.get(22)?,
        record_id: row.get(23)?,
    })
}

/// Repository for appointments
#[derive(Debug, Clone)]
pub struct AppointmentRepository {
    pool: DatabasePool,
}

impl AppointmentRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    pub fn create(&self, new: &NewAppointment) -> Result<Appointment, RepositoryError> {
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO appointments
                (patient_id, branch_id, vet_id, requested_date, scheduled_at, kind, status, notes)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                new.patient_id,
                new.branch_id,
                new.vet_id,
                new.requested_date,
                new.scheduled_at.as_ref().map(to_db_timestamp),
                new.kind,
                new.status,
                new.notes.trim(),
            ],
        )?;
        let id = conn.last_insert_rowid();
        info!("Created {} appointment {} for patient {}", new.status, id, new.patient_id);

        conn.query_row(&format!("{} WHERE a.id = ?1", APPOINTMENT_COLUMNS), [id], map_appointment)
            .map_err(RepositoryError::from)
    }

    pub fn get(&self, id: i64) -> Result<Option<Appointment>, RepositoryError> {
        let conn = self.pool.get()?;
        let appointment = conn
            .query_row(&format!("{} WHERE a.id = ?1", APPOINTMENT_COLUMNS), [id], map_appointment)
            .optional()?;
        Ok(appointment)
    }

    /// Appointments matching `filter`, newest requested date first
    pub fn list(&self, filter: &AppointmentFilter) -> Result<Vec<Appointment>, RepositoryError> {
        debug!("Listing appointments with {:?}", filter);
        let mut conds = Conditions::new();
        conds.scope("a.branch_id", filter.scope);
        conds.push_opt("a.vet_id = ?", filter.vet_id);
        conds.push_opt("o.id = ?", filter.owner_id);
        conds.push_opt("a.patient_id = ?", filter.patient_id);
        conds.push_opt("a.status = ?", filter.status.map(|s| s.as_str().to_string()));
        conds.push_opt("a.kind = ?", filter.kind.map(|k| k.as_str().to_string()));
        if filter.unassigned {
            conds.push("a.vet_id IS NULL", []);
        }
        conds.search(
            &[
                "p.name",
                "ou.first_name",
                "ou.last_name",
                "vu.first_name",
                "vu.last_name",
                "a.notes",
            ],
            filter.search.as_deref(),
        );
        conds.push_opt("a.requested_date >= ?", filter.requested_from.map(|d| d.to_string()));
        conds.push_opt("a.requested_date <= ?", filter.requested_to.map(|d| d.to_string()));

        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(&format!(
            "{}{} ORDER BY a.requested_date DESC, a.scheduled_at IS NULL, a.scheduled_at DESC, a.id DESC",
            APPOINTMENT_COLUMNS,
            conds.where_sql()
        ))?;
        let appointments = stmt
            .query_map(params_from_iter(conds.params()), map_appointment)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(appointments)
    }

    /// Confirm a vet and a time; the requested date follows the confirmed date
    pub fn assign(
        &self,
        id: i64,
        vet_id: i64,
        scheduled_at: DateTime<Utc>,
    ) -> Result<Appointment, RepositoryError> {
        let conn = self.pool.get()?;
        let changed = conn.execute(
            "UPDATE appointments
             SET vet_id = ?1, scheduled_at = ?2, requested_date = ?3, status = ?4
             WHERE id = ?5",
            params![
                vet_id,
                to_db_timestamp(&scheduled_at),
                scheduled_at.date_naive(),
                AppointmentStatus::Scheduled,
                id,
            ],
        )?;
        if changed == 0 {
            return Err(RepositoryError::NotFound(format!("Appointment {}", id)));
        }
        info!("Assigned vet {} to appointment {} at {}", vet_id, id, scheduled_at);

        conn.query_row(&format!("{} WHERE a.id = ?1", APPOINTMENT_COLUMNS), [id], map_appointment)
            .map_err(RepositoryError::from)
    }

    /// Change the status; `scheduled_at` is written only when given
    pub fn set_status(
        &self,
        id: i64,
        status: AppointmentStatus,
        scheduled_at: Option<DateTime<Utc>>,
    ) -> Result<Appointment, RepositoryError> {
        let conn = self.pool.get()?;
        let changed = conn.execute(
            "UPDATE appointments SET status = ?1, scheduled_at = COALESCE(?2, scheduled_at)
             WHERE id = ?3",
            params![status, scheduled_at.as_ref().map(to_db_timestamp), id],
        )?;
        if changed == 0 {
            return Err(RepositoryError::NotFound(format!("Appointment {}", id)));
        }
        info!("Appointment {} is now {}", id, status);

        conn.query_row(&format!("{} WHERE a.id = ?1", APPOINTMENT_COLUMNS), [id], map_appointment)
            .map_err(RepositoryError::from)
    }

    /// Put the appointment back in the pending queue without vet or time
    pub fn reopen(&self, id: i64) -> Result<Appointment, RepositoryError> {
        let conn = self.pool.get()?;
        let changed = conn.execute(
            "UPDATE appointments SET status = ?1, scheduled_at = NULL, vet_id = NULL WHERE id = ?2",
            params![AppointmentStatus::Pending, id],
        )?;
        if changed == 0 {
            return Err(RepositoryError::NotFound(format!("Appointment {}", id)));
        }
        info!("Reopened appointment {}", id);

        conn.query_row(&format!("{} WHERE a.id = ?1", APPOINTMENT_COLUMNS), [id], map_appointment)
            .map_err(RepositoryError::from)
    }

    /// Medications dispensed during the appointment, by name
    pub fn medication_uses(&self, appointment_id: i64) -> Result<Vec<MedicationUse>, RepositoryError> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT am.id, am.appointment_id, am.medication_id, m.name, m.category,
                    am.quantity, am.recorded_at
             FROM appointment_medications am
             JOIN medications m ON m.id = am.medication_id
             WHERE am.appointment_id = ?1
             ORDER BY m.name",
        )?;
        let uses = stmt
            .query_map([appointment_id], |row| {
                Ok(MedicationUse {
                    id: row.get(0)?,
                    appointment_id: row.get(1)?,
                    medication_id: row.get(2)?,
                    medication_name: row.get(3)?,
                    category: row.get(4)?,
                    quantity: row.get(5)?,
                    recorded_at: timestamp_at(row, 6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(uses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AppointmentKind, BranchScope};
    use crate::testing::Fixture;
    use chrono::{Duration, NaiveDate};

    fn request(fixture: &Fixture, date: NaiveDate, notes: &str) -> NewAppointment {
        NewAppointment {
            patient_id: fixture.patient_id,
            branch_id: fixture.branch_id,
            vet_id: None,
            requested_date: date,
            scheduled_at: None,
            kind: AppointmentKind::Consultation,
            status: AppointmentStatus::Pending,
            notes: notes.to_string(),
        }
    }

    #[test]
    fn test_created_appointment_carries_display_fields() {
        let fixture = Fixture::new();
        let repo = AppointmentRepository::new(fixture.pool.clone());
        let today = Utc::now().date_naive();

        let created = repo.create(&request(&fixture, today, "limping")).unwrap();
        assert_eq!(created.patient_name, "Luna");
        assert_eq!(created.owner_name, "Ana Gómez");
        assert_eq!(created.owner_phone, "351-555-0101");
        assert_eq!(created.branch_name, "Centro");
        assert_eq!(created.status, AppointmentStatus::Pending);
        assert!(created.vet_name.is_none());
        assert!(created.record_id.is_none());
    }

    #[test]
    fn test_list_filters_and_ordering() {
        let fixture = Fixture::new();
        let repo = AppointmentRepository::new(fixture.pool.clone());
        let today = Utc::now().date_naive();

        let older = repo.create(&request(&fixture, today, "checkup")).unwrap();
        let newer = repo
            .create(&request(&fixture, today + Duration::days(3), "vaccine booster"))
            .unwrap();
        repo.assign(newer.id, fixture.vet_id, Utc::now() + Duration::days(3)).unwrap();

        let all = repo.list(&AppointmentFilter::scoped(BranchScope::All)).unwrap();
        assert_eq!(all.iter().map(|a| a.id).collect::<Vec<_>>(), vec![newer.id, older.id]);

        let unassigned = repo
            .list(&AppointmentFilter {
                unassigned: true,
                ..AppointmentFilter::default()
            })
            .unwrap();
        assert_eq!(unassigned.len(), 1);
        assert_eq!(unassigned[0].id, older.id);

        let by_vet_name = repo
            .list(&AppointmentFilter {
                search: Some("rivas".to_string()),
                ..AppointmentFilter::default()
            })
            .unwrap();
        assert_eq!(by_vet_name.len(), 1);
        assert_eq!(by_vet_name[0].id, newer.id);

        let other_branch = repo
            .list(&AppointmentFilter::scoped(BranchScope::Branch(fixture.other_branch_id)))
            .unwrap();
        assert!(other_branch.is_empty());

        let from_tomorrow = repo
            .list(&AppointmentFilter {
                requested_from: Some(today + Duration::days(1)),
                ..AppointmentFilter::default()
            })
            .unwrap();
        assert_eq!(from_tomorrow.len(), 1);
    }

    #[test]
    fn test_assign_then_reopen() {
        let fixture = Fixture::new();
        let repo = AppointmentRepository::new(fixture.pool.clone());
        let today = Utc::now().date_naive();
        let created = repo.create(&request(&fixture, today, "")).unwrap();

        let at = Utc::now() + Duration::days(2);
        let assigned = repo.assign(created.id, fixture.vet_id, at).unwrap();
        assert_eq!(assigned.status, AppointmentStatus::Scheduled);
        assert_eq!(assigned.requested_date, at.date_naive());
        assert_eq!(assigned.vet_name.as_deref(), Some("Laura Rivas"));

        let reopened = repo.reopen(created.id).unwrap();
        assert_eq!(reopened.status, AppointmentStatus::Pending);
        assert!(reopened.vet_id.is_none());
        assert!(reopened.scheduled_at.is_none());
    }

    #[test]
    fn test_set_status_keeps_existing_time() {
        let fixture = Fixture::new();
        let repo = AppointmentRepository::new(fixture.pool.clone());
        let created = repo.create(&request(&fixture, Utc::now().date_naive(), "")).unwrap();
        let at = Utc::now() + Duration::hours(5);
        repo.assign(created.id, fixture.vet_id, at).unwrap();

        let cancelled = repo.set_status(created.id, AppointmentStatus::Cancelled, None).unwrap();
        assert_eq!(cancelled.status, AppointmentStatus::Cancelled);
        assert!(cancelled.scheduled_at.is_some());
    }
}
