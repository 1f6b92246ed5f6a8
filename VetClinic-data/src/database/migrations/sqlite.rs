use rusqlite::{params, Connection};
use tracing::info;

/// Run SQLite migrations
pub fn run_migrations(conn: &Connection) -> Result<(), String> {
    info!("Running SQLite migrations");

    create_core_tables(conn)?;
    create_clinical_tables(conn)?;
    create_catalog_tables(conn)?;
    create_indexes(conn)?;
    seed_vaccine_schedule(conn)?;

    info!("SQLite migrations completed successfully");
    Ok(())
}

/// Branches, users and their owner profiles
fn create_core_tables(conn: &Connection) -> Result<(), String> {
    info!("Creating branch, user and owner tables if not exists");

    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS branches (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            address TEXT NOT NULL,
            city TEXT NOT NULL DEFAULT '',
            phone TEXT NOT NULL DEFAULT ''
        );

        CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            username TEXT NOT NULL UNIQUE,
            email TEXT NOT NULL DEFAULT '',
            first_name TEXT NOT NULL DEFAULT '',
            last_name TEXT NOT NULL DEFAULT '',
            password_hash TEXT NOT NULL,
            role TEXT NOT NULL,
            phone TEXT NOT NULL DEFAULT '',
            address TEXT NOT NULL DEFAULT '',
            specialty TEXT NOT NULL DEFAULT '',
            available INTEGER NOT NULL DEFAULT 1,
            is_active INTEGER NOT NULL DEFAULT 1,
            is_superuser INTEGER NOT NULL DEFAULT 0,
            branch_id INTEGER REFERENCES branches(id) ON DELETE SET NULL,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS owners (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL UNIQUE REFERENCES users(id) ON DELETE CASCADE,
            phone TEXT NOT NULL DEFAULT '',
            address TEXT NOT NULL DEFAULT '',
            city TEXT NOT NULL DEFAULT '',
            notes TEXT NOT NULL DEFAULT ''
        );",
    )
    .map_err(|e| format!("Failed to create core tables: {}", e))
}

/// Patients, appointments, records and the pharmacy ledger
fn create_clinical_tables(conn: &Connection) -> Result<(), String> {
    info!("Creating clinical tables if not exists");

    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS patients (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            species TEXT NOT NULL,
            breed TEXT NOT NULL DEFAULT '',
            sex TEXT NOT NULL DEFAULT '',
            birth_date TEXT NOT NULL,
            owner_id INTEGER NOT NULL REFERENCES owners(id) ON DELETE CASCADE,
            vaccines TEXT NOT NULL DEFAULT '',
            allergies TEXT NOT NULL DEFAULT ''
        );

        CREATE TABLE IF NOT EXISTS appointments (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            patient_id INTEGER NOT NULL REFERENCES patients(id) ON DELETE CASCADE,
            vet_id INTEGER REFERENCES users(id) ON DELETE SET NULL,
            branch_id INTEGER NOT NULL REFERENCES branches(id) ON DELETE RESTRICT,
            requested_date TEXT NOT NULL,
            scheduled_at TEXT,
            duration_minutes INTEGER NOT NULL DEFAULT 30,
            kind TEXT NOT NULL DEFAULT 'consultation',
            status TEXT NOT NULL DEFAULT 'pending',
            notes TEXT NOT NULL DEFAULT ''
        );

        CREATE TABLE IF NOT EXISTS medications (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            branch_id INTEGER NOT NULL REFERENCES branches(id) ON DELETE RESTRICT,
            name TEXT NOT NULL,
            category TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            stock INTEGER NOT NULL DEFAULT 0 CHECK (stock >= 0),
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE (branch_id, name)
        );

        CREATE TABLE IF NOT EXISTS appointment_medications (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            appointment_id INTEGER NOT NULL REFERENCES appointments(id) ON DELETE CASCADE,
            medication_id INTEGER NOT NULL REFERENCES medications(id) ON DELETE RESTRICT,
            quantity INTEGER NOT NULL DEFAULT 1 CHECK (quantity > 0),
            recorded_at TEXT NOT NULL,
            UNIQUE (appointment_id, medication_id)
        );

        CREATE TABLE IF NOT EXISTS medical_records (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            patient_id INTEGER NOT NULL REFERENCES patients(id) ON DELETE CASCADE,
            vet_id INTEGER REFERENCES users(id) ON DELETE SET NULL,
            recorded_at TEXT NOT NULL,
            diagnosis TEXT NOT NULL,
            treatment TEXT NOT NULL,
            notes TEXT NOT NULL DEFAULT '',
            weight_kg REAL,
            temperature_c REAL,
            exams TEXT NOT NULL DEFAULT '',
            next_checkup TEXT,
            no_next_checkup INTEGER NOT NULL DEFAULT 0,
            appointment_id INTEGER UNIQUE REFERENCES appointments(id) ON DELETE SET NULL
        );",
    )
    .map_err(|e| format!("Failed to create clinical tables: {}", e))
}

/// Storefront products and the vaccine schedule
fn create_catalog_tables(conn: &Connection) -> Result<(), String> {
    info!("Creating catalog tables if not exists");

    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS products (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            category TEXT NOT NULL,
            price_cents INTEGER NOT NULL CHECK (price_cents >= 1),
            contact_phone TEXT NOT NULL DEFAULT '',
            available INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS vaccines (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            species TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            recommended_age INTEGER NOT NULL,
            age_unit TEXT NOT NULL DEFAULT 'weeks',
            booster TEXT NOT NULL DEFAULT '',
            sort_order INTEGER NOT NULL DEFAULT 0,
            UNIQUE (species, name)
        );

        CREATE TABLE IF NOT EXISTS vaccine_records (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            patient_id INTEGER NOT NULL REFERENCES patients(id) ON DELETE CASCADE,
            vaccine_id INTEGER NOT NULL REFERENCES vaccines(id) ON DELETE CASCADE,
            applied_on TEXT NOT NULL,
            notes TEXT NOT NULL DEFAULT '',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE (patient_id, vaccine_id)
        );",
    )
    .map_err(|e| format!("Failed to create catalog tables: {}", e))
}

fn create_indexes(conn: &Connection) -> Result<(), String> {
    info!("Creating indexes");

    conn.execute_batch(
        "CREATE INDEX IF NOT EXISTS idx_appointments_branch_status
            ON appointments (branch_id, status);
        CREATE INDEX IF NOT EXISTS idx_appointments_requested_date
            ON appointments (requested_date DESC);
        CREATE INDEX IF NOT EXISTS idx_appointments_vet
            ON appointments (vet_id);
        CREATE INDEX IF NOT EXISTS idx_medical_records_patient
            ON medical_records (patient_id, recorded_at DESC);
        CREATE INDEX IF NOT EXISTS idx_appointment_medications_recorded
            ON appointment_medications (recorded_at DESC);
        CREATE INDEX IF NOT EXISTS idx_patients_owner
            ON patients (owner_id);",
    )
    .map_err(|e| format!("Failed to create index: {}", e))
}

/// (species, name, recommended age in weeks, sort order, booster, description)
const VACCINE_SCHEDULE: [(&str, &str, i64, i64, &str, &str); 10] = [
    (
        "canine",
        "Parvovirus (CPV)",
        6,
        10,
        "Boosters at 9 and 12 weeks",
        "First immunization against canine parvovirus for puppies.",
    ),
    (
        "canine",
        "Distemper (CDV)",
        6,
        20,
        "Boosters at 9 and 12 weeks",
        "Early protection against the canine distemper virus.",
    ),
    (
        "canine",
        "Infectious hepatitis (CAV-1)",
        8,
        30,
        "Booster one month later, then yearly",
        "Combined vaccine against adenovirus and viral liver disease.",
    ),
    (
        "canine",
        "Leptospirosis",
        12,
        40,
        "Booster at 16 weeks, then yearly",
        "Prevents leptospira infections in urban and rural areas.",
    ),
    (
        "canine",
        "Rabies",
        16,
        50,
        "Mandatory yearly booster",
        "Mandatory vaccination against canine rabies.",
    ),
    (
        "canine",
        "Bordetella (kennel cough)",
        18,
        60,
        "Yearly booster depending on exposure",
        "Recommended for dogs in frequent contact with other animals.",
    ),
    (
        "feline",
        "Feline triple (FVRCP)",
        8,
        10,
        "Boosters every 3-4 weeks until 16 weeks",
        "Covers rhinotracheitis, calicivirus and feline panleukopenia.",
    ),
    (
        "feline",
        "Feline leukemia (FeLV)",
        12,
        20,
        "Second dose at 16 weeks, then yearly",
        "Recommended for cats with outdoor access or living in colonies.",
    ),
    (
        "feline",
        "Rabies",
        16,
        30,
        "Yearly booster as required by local rules",
        "Protection against feline rabies and legal compliance.",
    ),
    (
        "feline",
        "Bordetella bronchiseptica",
        16,
        40,
        "Yearly for cats at risk",
        "Recommended for cats living in shelters or boarding.",
    ),
];

/// Insert the reference vaccine schedule, keeping any edited rows intact
fn seed_vaccine_schedule(conn: &Connection) -> Result<(), String> {
    info!("Seeding vaccine schedule");

    let mut stmt = conn
        .prepare(
            "INSERT OR IGNORE INTO vaccines
                (species, name, recommended_age, age_unit, sort_order, booster, description)
             VALUES (?1, ?2, ?3, 'weeks', ?4, ?5, ?6)",
        )
        .map_err(|e| e.to_string())?;

    for (species, name, age, order, booster, description) in VACCINE_SCHEDULE {
        stmt.execute(params![species, name, age, order, booster, description])
            .map_err(|e| format!("Failed to seed vaccine {}: {}", name, e))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn migrated() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        conn
    }

    #[test]
    fn test_migrations_create_all_tables() {
        let conn = migrated();
        for table in [
            "branches",
            "users",
            "owners",
            "patients",
            "appointments",
            "medications",
            "appointment_medications",
            "medical_records",
            "products",
            "vaccines",
            "vaccine_records",
        ] {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
                    [table],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(count, 1, "missing table {}", table);
        }
    }

    #[test]
    fn test_migrations_are_idempotent() {
        let conn = migrated();
        run_migrations(&conn).unwrap();

        let vaccines: i64 = conn
            .query_row("SELECT COUNT(*) FROM vaccines", [], |row| row.get(0))
            .unwrap();
        assert_eq!(vaccines, 10);
    }

    #[test]
    fn test_vaccine_seed_per_species() {
        let conn = migrated();
        let canine: i64 = conn
            .query_row("SELECT COUNT(*) FROM vaccines WHERE species = 'canine'", [], |row| row.get(0))
            .unwrap();
        let feline: i64 = conn
            .query_row("SELECT COUNT(*) FROM vaccines WHERE species = 'feline'", [], |row| row.get(0))
            .unwrap();
        assert_eq!(canine, 6);
        assert_eq!(feline, 4);
    }

    #[test]
    fn test_stock_cannot_go_negative() {
        let conn = migrated();
        conn.execute(
            "INSERT INTO branches (name, address) VALUES ('Centro', 'Main 1')",
            [],
        )
        .unwrap();
        let result = conn.execute(
            "INSERT INTO medications (branch_id, name, category, stock, created_at, updated_at)
             VALUES (1, 'Amoxicillin', 'antibiotics', -1, 'now', 'now')",
            [],
        );
        assert!(result.is_err());
    }
}
