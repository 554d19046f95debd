//! Schema bootstrap and demo data for the safety-events database.
//!
//! Mirrors the relational model the schema descriptor documents. Dates are
//! stored as ISO-8601 text.

use safeq_core::error::StoreError;
use sqlx::SqlitePool;
use tracing::{debug, info};

const SCHEMA: &[(&str, &str)] = &[
    (
        "person",
        r#"
        CREATE TABLE IF NOT EXISTS person (
            person_id   INTEGER PRIMARY KEY,
            matricule   TEXT,
            name        TEXT,
            family_name TEXT,
            role        TEXT
        )
        "#,
    ),
    (
        "organizational_unit",
        r#"
        CREATE TABLE IF NOT EXISTS organizational_unit (
            unit_id    INTEGER PRIMARY KEY,
            identifier TEXT,
            name       TEXT,
            location   TEXT
        )
        "#,
    ),
    (
        "event",
        r#"
        CREATE TABLE IF NOT EXISTS event (
            event_id               INTEGER PRIMARY KEY,
            declared_by_id         INTEGER REFERENCES person(person_id),
            description            TEXT,
            start_datetime         TEXT,
            end_datetime           TEXT,
            organizational_unit_id INTEGER REFERENCES organizational_unit(unit_id),
            type                   TEXT,
            classification         TEXT
        )
        "#,
    ),
    (
        "risk",
        r#"
        CREATE TABLE IF NOT EXISTS risk (
            risk_id     INTEGER PRIMARY KEY,
            name        TEXT,
            gravity     TEXT,
            probability TEXT
        )
        "#,
    ),
    (
        "corrective_measure",
        r#"
        CREATE TABLE IF NOT EXISTS corrective_measure (
            measure_id             INTEGER PRIMARY KEY,
            name                   TEXT,
            description            TEXT,
            owner_id               INTEGER REFERENCES person(person_id),
            implementation_date    TEXT,
            cost                   REAL,
            organizational_unit_id INTEGER REFERENCES organizational_unit(unit_id)
        )
        "#,
    ),
    (
        "event_employee",
        r#"
        CREATE TABLE IF NOT EXISTS event_employee (
            event_id  INTEGER NOT NULL REFERENCES event(event_id),
            person_id INTEGER NOT NULL REFERENCES person(person_id),
            PRIMARY KEY (event_id, person_id)
        )
        "#,
    ),
    (
        "event_risk",
        r#"
        CREATE TABLE IF NOT EXISTS event_risk (
            event_id INTEGER NOT NULL REFERENCES event(event_id),
            risk_id  INTEGER NOT NULL REFERENCES risk(risk_id),
            PRIMARY KEY (event_id, risk_id)
        )
        "#,
    ),
    (
        "event_corrective_measure",
        r#"
        CREATE TABLE IF NOT EXISTS event_corrective_measure (
            event_id   INTEGER NOT NULL REFERENCES event(event_id),
            measure_id INTEGER NOT NULL REFERENCES corrective_measure(measure_id),
            PRIMARY KEY (event_id, measure_id)
        )
        "#,
    ),
];

const INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_event_start ON event(start_datetime DESC)",
    "CREATE INDEX IF NOT EXISTS idx_event_unit ON event(organizational_unit_id)",
    "CREATE INDEX IF NOT EXISTS idx_measure_owner ON corrective_measure(owner_id)",
];

/// Create every table and index. Idempotent.
pub async fn create_schema(pool: &SqlitePool) -> Result<(), StoreError> {
    for (table, ddl) in SCHEMA {
        sqlx::query(ddl)
            .execute(pool)
            .await
            .map_err(|e| StoreError::execution("SchemaError", format!("{table} table: {e}")))?;
    }

    for ddl in INDEXES {
        sqlx::query(ddl)
            .execute(pool)
            .await
            .map_err(|e| StoreError::execution("SchemaError", format!("index: {e}")))?;
    }

    debug!(tables = SCHEMA.len(), "Schema bootstrap complete");
    Ok(())
}

const SEED: &[&str] = &[
    r#"INSERT OR IGNORE INTO person (person_id, matricule, name, family_name, role) VALUES
        (1, 'M1001', 'Jean', 'Dupont', 'Technicien de maintenance'),
        (2, 'M1002', 'Marie', 'Martin', 'Responsable HSE'),
        (3, 'M1003', 'Ahmed', 'Benali', 'Opérateur'),
        (4, 'M1004', 'Sophie', 'Bernard', 'Cheffe d''équipe')"#,
    r#"INSERT OR IGNORE INTO organizational_unit (unit_id, identifier, name, location) VALUES
        (1, 'ATL-01', 'Atelier assemblage', 'Lyon'),
        (2, 'LOG-02', 'Plateforme logistique', 'Marseille')"#,
    r#"INSERT OR IGNORE INTO event (event_id, declared_by_id, description, start_datetime,
        end_datetime, organizational_unit_id, type, classification) VALUES
        (101, 3, 'Chute d''un carton depuis un rayonnage', '2024-02-12T08:30:00', '2024-02-12T09:00:00', 2, 'Presque accident', 'Mineur'),
        (102, 1, 'Panne électrique sur la ligne 3', '2024-03-04T14:10:00', NULL, 1, 'Incident', 'Grave'),
        (103, 4, 'Glissade sur sol mouillé près du quai', '2024-04-18T06:45:00', '2024-04-18T07:30:00', 2, 'Accident', 'Modéré')"#,
    r#"INSERT OR IGNORE INTO risk (risk_id, name, gravity, probability) VALUES
        (1, 'Électrocution', 'Élevée', 'Moyenne'),
        (2, 'Chute d''objets', 'Moyenne', 'Élevée'),
        (3, 'Incendie', 'Critique', 'Faible'),
        (4, 'Glissade', 'Moyenne', 'Moyenne')"#,
    r#"INSERT OR IGNORE INTO corrective_measure (measure_id, name, description, owner_id,
        implementation_date, cost, organizational_unit_id) VALUES
        (1, 'Consignation électrique', 'Procédure de consignation avant intervention', 2, '2024-03-10', 1500.0, 1),
        (2, 'Filets de rayonnage', 'Pose de filets anti-chute sur les rayonnages', 4, '2024-02-20', 3200.5, 2),
        (3, 'Tapis absorbants', 'Tapis absorbants au quai de chargement', 2, '2024-04-25', NULL, 2)"#,
    r#"INSERT OR IGNORE INTO event_employee (event_id, person_id) VALUES
        (101, 3), (102, 1), (102, 4), (103, 3), (103, 4)"#,
    r#"INSERT OR IGNORE INTO event_risk (event_id, risk_id) VALUES
        (101, 2), (102, 1), (102, 3), (103, 4)"#,
    r#"INSERT OR IGNORE INTO event_corrective_measure (event_id, measure_id) VALUES
        (101, 2), (102, 1), (103, 3)"#,
];

/// Insert a small demo data set. Idempotent.
pub async fn seed_demo(pool: &SqlitePool) -> Result<(), StoreError> {
    let mut tx = pool
        .begin()
        .await
        .map_err(|e| StoreError::Connection(e.to_string()))?;

    for statement in SEED {
        sqlx::query(statement)
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::execution("SeedError", e.to_string()))?;
    }

    tx.commit()
        .await
        .map_err(|e| StoreError::execution("SeedError", e.to_string()))?;

    info!("Demo data seeded");
    Ok(())
}
