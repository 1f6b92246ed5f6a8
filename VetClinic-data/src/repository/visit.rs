//! Appointment completion: the medical record, the attended status and the
//! pharmacy stock are written together or not at all.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use rusqlite::{params, OptionalExtension, TransactionBehavior};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::errors::RepositoryError;
use super::record::{fetch_record, upsert_linked};
use crate::database::DatabasePool;
use crate::models::{
    now_utc, to_db_timestamp, AppointmentStatus, MedicalRecord, RecordInput, StockChange,
};

/// Everything a vet submits when closing an appointment
#[derive(Debug, Clone)]
pub struct VisitCompletion {
    pub appointment_id: i64,
    pub vet_id: i64,
    pub record: RecordInput,
    /// `None` when no medication was used. Otherwise (medication id, quantity)
    /// pairs; a repeated id keeps its last quantity.
    pub medications: Option<Vec<(i64, i64)>>,
}

#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "with-api", derive(utoipa::ToSchema))]
pub struct VisitOutcome {
    pub record: MedicalRecord,
    /// Stock movements caused by this submission; a positive delta left the shelf
    pub stock_changes: Vec<StockChange>,
}

/// Repository for the visit completion transaction
#[derive(Debug, Clone)]
pub struct VisitRepository {
    pool: DatabasePool,
}

impl VisitRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    /// Upsert the linked record, mark the appointment attended and reconcile
    /// dispensed medications against the branch stock, in one write-locking
    /// transaction. Any error leaves the database untouched.
    pub fn complete(&self, visit: &VisitCompletion) -> Result<VisitOutcome, RepositoryError> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let (patient_id, branch_id): (i64, i64) = tx
            .query_row(
                "SELECT patient_id, branch_id FROM appointments WHERE id = ?1",
                [visit.appointment_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?
            .ok_or_else(|| RepositoryError::NotFound(format!("Appointment {}", visit.appointment_id)))?;

        let record_id = upsert_linked(&tx, visit.appointment_id, patient_id, visit.vet_id, &visit.record)?;
        tx.execute(
            "UPDATE appointments SET status = ?1 WHERE id = ?2",
            params![AppointmentStatus::Attended, visit.appointment_id],
        )?;

        let previous: HashMap<i64, (i64, i64)> = {
            let mut stmt = tx.prepare(
                "SELECT medication_id, id, quantity FROM appointment_medications
                 WHERE appointment_id = ?1",
            )?;
            let rows = stmt
                .query_map([visit.appointment_id], |row| {
                    Ok((row.get::<_, i64>(0)?, (row.get::<_, i64>(1)?, row.get::<_, i64>(2)?)))
                })?
                .collect::<Result<HashMap<_, _>, _>>()?;
            rows
        };
        let now = to_db_timestamp(&now_utc());
        let mut stock_changes = Vec::new();

        match &visit.medications {
            Some(entries) => {
                let submitted: BTreeMap<i64, i64> = entries.iter().copied().collect();
                let ids: BTreeSet<i64> = submitted.keys().chain(previous.keys()).copied().collect();

                for medication_id in ids {
                    let (name, stock): (String, i64) = tx
                        .query_row(
                            "SELECT name, stock FROM medications WHERE id = ?1 AND branch_id = ?2",
                            params![medication_id, branch_id],
                            |row| Ok((row.get(0)?, row.get(1)?)),
                        )
                        .optional()?
                        .ok_or(RepositoryError::MedicationNotInBranch(medication_id))?;

                    let new_quantity = submitted.get(&medication_id).copied().unwrap_or(0);
                    let old = previous.get(&medication_id).copied();
                    let delta = new_quantity - old.map(|(_, quantity)| quantity).unwrap_or(0);

                    if delta > stock {
                        warn!(
                            "Appointment {} needs {} more of '{}' but only {} left",
                            visit.appointment_id, delta, name, stock
                        );
                        return Err(RepositoryError::InsufficientStock {
                            medication: name,
                            available: stock,
                        });
                    }
                    if delta != 0 {
                        tx.execute(
                            "UPDATE medications SET stock = stock - ?1, updated_at = ?2 WHERE id = ?3",
                            params![delta, now, medication_id],
                        )?;
                        stock_changes.push(StockChange {
                            medication_id,
                            medication_name: name,
                            delta,
                            stock_after: stock - delta,
                        });
                    }

                    match (old, new_quantity > 0) {
                        (Some((use_id, _)), true) => {
                            tx.execute(
                                "UPDATE appointment_medications SET quantity = ?1 WHERE id = ?2",
                                params![new_quantity, use_id],
                            )?;
                        }
                        (None, true) => {
                            tx.execute(
                                "INSERT INTO appointment_medications
                                    (appointment_id, medication_id, quantity, recorded_at)
                                 VALUES (?1, ?2, ?3, ?4)",
                                params![visit.appointment_id, medication_id, new_quantity, now],
                            )?;
                        }
                        (Some((use_id, _)), false) => {
                            tx.execute("DELETE FROM appointment_medications WHERE id = ?1", [use_id])?;
                        }
                        (None, false) => {}
                    }
                }
            }
            None => {
                let mut restored: Vec<(i64, i64)> = previous
                    .iter()
                    .map(|(medication_id, (_, quantity))| (*medication_id, *quantity))
                    .collect();
                restored.sort_unstable();

                for (medication_id, quantity) in restored {
                    tx.execute(
                        "UPDATE medications SET stock = stock + ?1, updated_at = ?2 WHERE id = ?3",
                        params![quantity, now, medication_id],
                    )?;
                    let (name, stock): (String, i64) = tx.query_row(
                        "SELECT name, stock FROM medications WHERE id = ?1",
                        [medication_id],
                        |row| Ok((row.get(0)?, row.get(1)?)),
                    )?;
                    stock_changes.push(StockChange {
                        medication_id,
                        medication_name: name,
                        delta: -quantity,
                        stock_after: stock,
                    });
                }
                tx.execute(
                    "DELETE FROM appointment_medications WHERE appointment_id = ?1",
                    [visit.appointment_id],
                )?;
            }
        }

        let record = fetch_record(&tx, record_id)?;
        tx.commit()?;

        debug!("Stock changes for appointment {}: {:?}", visit.appointment_id, stock_changes);
        info!(
            "Completed appointment {} with record {} ({} stock movements)",
            visit.appointment_id,
            record_id,
            stock_changes.len()
        );
        Ok(VisitOutcome { record, stock_changes })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AppointmentKind, MedicationCategory, MedicationInput, NewAppointment};
    use crate::repository::{AppointmentRepository, MedicationRepository};
    use crate::testing::Fixture;
    use chrono::Utc;

    struct Setup {
        fixture: Fixture,
        visits: VisitRepository,
        appointments: AppointmentRepository,
        medications: MedicationRepository,
        appointment_id: i64,
    }

    fn setup() -> Setup {
        let fixture = Fixture::new();
        let appointments = AppointmentRepository::new(fixture.pool.clone());
        let appointment_id = appointments
            .create(&NewAppointment {
                patient_id: fixture.patient_id,
                branch_id: fixture.branch_id,
                vet_id: Some(fixture.vet_id),
                requested_date: Utc::now().date_naive(),
                scheduled_at: Some(Utc::now()),
                kind: AppointmentKind::Consultation,
                status: AppointmentStatus::Scheduled,
                notes: String::new(),
            })
            .unwrap()
            .id;
        Setup {
            visits: VisitRepository::new(fixture.pool.clone()),
            medications: MedicationRepository::new(fixture.pool.clone()),
            appointments,
            fixture,
            appointment_id,
        }
    }

    fn add_medication(setup: &Setup, branch_id: i64, name: &str, stock: i64) -> i64 {
        setup
            .medications
            .create(&MedicationInput {
                branch_id,
                name: name.to_string(),
                category: MedicationCategory::AnalgesicsAntiInflammatories,
                description: String::new(),
                stock,
            })
            .unwrap()
            .id
    }

    fn visit(setup: &Setup, medications: Option<Vec<(i64, i64)>>) -> VisitCompletion {
        VisitCompletion {
            appointment_id: setup.appointment_id,
            vet_id: setup.fixture.vet_id,
            record: RecordInput {
                diagnosis: "Sprain".to_string(),
                treatment: "Anti-inflammatory".to_string(),
                ..RecordInput::default()
            },
            medications,
        }
    }

    fn stock(setup: &Setup, id: i64) -> i64 {
        setup.medications.get(id).unwrap().unwrap().stock
    }

    #[test]
    fn test_first_completion_dispenses_stock() {
        let setup = setup();
        let meloxicam = add_medication(&setup, setup.fixture.branch_id, "Meloxicam", 10);

        let outcome = setup.visits.complete(&visit(&setup, Some(vec![(meloxicam, 3)]))).unwrap();

        assert_eq!(stock(&setup, meloxicam), 7);
        assert_eq!(outcome.stock_changes.len(), 1);
        assert_eq!(outcome.stock_changes[0].delta, 3);
        assert_eq!(outcome.stock_changes[0].stock_after, 7);
        assert_eq!(outcome.record.appointment_id, Some(setup.appointment_id));
        let appointment = setup.appointments.get(setup.appointment_id).unwrap().unwrap();
        assert_eq!(appointment.status, AppointmentStatus::Attended);
        assert_eq!(appointment.record_id, Some(outcome.record.id));
        assert_eq!(setup.appointments.medication_uses(setup.appointment_id).unwrap()[0].quantity, 3);
    }

    #[test]
    fn test_resubmission_applies_only_the_difference() {
        let setup = setup();
        let meloxicam = add_medication(&setup, setup.fixture.branch_id, "Meloxicam", 10);
        let tramadol = add_medication(&setup, setup.fixture.branch_id, "Tramadol", 5);

        setup
            .visits
            .complete(&visit(&setup, Some(vec![(meloxicam, 3), (tramadol, 2)])))
            .unwrap();
        let second = setup
            .visits
            .complete(&visit(&setup, Some(vec![(meloxicam, 5), (meloxicam, 1)])))
            .unwrap();

        // meloxicam 3 -> 1 returns two units, tramadol dropped returns both
        assert_eq!(stock(&setup, meloxicam), 9);
        assert_eq!(stock(&setup, tramadol), 5);
        assert_eq!(second.stock_changes.iter().map(|c| c.delta).collect::<Vec<_>>(), vec![-2, -2]);

        let uses = setup.appointments.medication_uses(setup.appointment_id).unwrap();
        assert_eq!(uses.len(), 1);
        assert_eq!(uses[0].medication_id, meloxicam);
        assert_eq!(uses[0].quantity, 1);
    }

    #[test]
    fn test_not_used_returns_everything() {
        let setup = setup();
        let meloxicam = add_medication(&setup, setup.fixture.branch_id, "Meloxicam", 10);
        setup.visits.complete(&visit(&setup, Some(vec![(meloxicam, 4)]))).unwrap();

        let outcome = setup.visits.complete(&visit(&setup, None)).unwrap();

        assert_eq!(stock(&setup, meloxicam), 10);
        assert_eq!(outcome.stock_changes[0].delta, -4);
        assert!(setup.appointments.medication_uses(setup.appointment_id).unwrap().is_empty());
    }

    #[test]
    fn test_insufficient_stock_rolls_back_everything() {
        let setup = setup();
        let meloxicam = add_medication(&setup, setup.fixture.branch_id, "Meloxicam", 10);
        let tramadol = add_medication(&setup, setup.fixture.branch_id, "Tramadol", 1);

        let err = setup
            .visits
            .complete(&visit(&setup, Some(vec![(meloxicam, 2), (tramadol, 2)])))
            .unwrap_err();

        assert_eq!(err.to_string(), "Insufficient stock for Tramadol. Available: 1");
        assert_eq!(stock(&setup, meloxicam), 10);
        assert_eq!(stock(&setup, tramadol), 1);
        let appointment = setup.appointments.get(setup.appointment_id).unwrap().unwrap();
        assert_eq!(appointment.status, AppointmentStatus::Scheduled);
        assert!(appointment.record_id.is_none());
    }

    #[test]
    fn test_medication_of_another_branch_is_rejected() {
        let setup = setup();
        let foreign = add_medication(&setup, setup.fixture.other_branch_id, "Cefalexin", 10);

        let err = setup.visits.complete(&visit(&setup, Some(vec![(foreign, 1)]))).unwrap_err();

        assert!(matches!(err, RepositoryError::MedicationNotInBranch(id) if id == foreign));
        assert_eq!(stock(&setup, foreign), 10);
    }

    #[test]
    fn test_missing_appointment_is_not_found() {
        let setup = setup();
        let mut missing = visit(&setup, None);
        missing.appointment_id = 4040;
        assert!(matches!(setup.visits.complete(&missing), Err(RepositoryError::NotFound(_))));
    }
}
