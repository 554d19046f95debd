//! Static description of the safety-events schema.
//!
//! Injected verbatim into every generation prompt. There is no
//! introspection: a change to the physical schema must be mirrored here.

/// Tables, keys, join conventions and worked examples (SQLite dialect).
pub const SCHEMA_DESCRIPTION: &str = r#"## DATABASE SCHEMA (SQLite)

### person (alias p)
- person_id INTEGER PRIMARY KEY
- matricule TEXT, name TEXT (first name), family_name TEXT, role TEXT

### organizational_unit (alias ou)
- unit_id INTEGER PRIMARY KEY
- identifier TEXT, name TEXT, location TEXT

### event (alias e) -- central table
- event_id INTEGER PRIMARY KEY
- declared_by_id INTEGER -> person.person_id
- description TEXT
- start_datetime TEXT (ISO-8601), end_datetime TEXT (ISO-8601, nullable)
- organizational_unit_id INTEGER -> organizational_unit.unit_id
- type TEXT (e.g. 'Accident', 'Incident', 'Presque accident')
- classification TEXT (e.g. 'Mineur', 'Modéré', 'Grave')

### risk (alias r)
- risk_id INTEGER PRIMARY KEY
- name TEXT, gravity TEXT, probability TEXT

### corrective_measure (alias cm)
- measure_id INTEGER PRIMARY KEY
- name TEXT, description TEXT
- owner_id INTEGER -> person.person_id
- implementation_date TEXT (ISO-8601)
- cost REAL (nullable)
- organizational_unit_id INTEGER -> organizational_unit.unit_id

### Link tables
- event_employee (alias ee): event_id -> event, person_id -> person
- event_risk (alias er): event_id -> event, risk_id -> risk
- event_corrective_measure (alias ecm): event_id -> event, measure_id -> corrective_measure

### Join conventions
- People involved in an event: person p JOIN event_employee ee ON p.person_id = ee.person_id
- Person who declared an event: event e JOIN person p ON e.declared_by_id = p.person_id
- Risks of an event: risk r JOIN event_risk er ON r.risk_id = er.risk_id
- Measures of an event: corrective_measure cm JOIN event_corrective_measure ecm ON cm.measure_id = ecm.measure_id
- Use LEFT JOIN to keep rows without a match, INNER JOIN to drop them.

## EXAMPLE QUERIES

-- Recent events with declarer and unit
SELECT e.event_id, e.description, e.type, e.classification, e.start_datetime,
       p.name || ' ' || p.family_name AS declarer, ou.name AS unit
FROM event e
LEFT JOIN person p ON e.declared_by_id = p.person_id
LEFT JOIN organizational_unit ou ON e.organizational_unit_id = ou.unit_id
ORDER BY e.start_datetime DESC
LIMIT 10;

-- People involved in a given event
SELECT p.person_id, p.name, p.family_name, p.role
FROM person p
INNER JOIN event_employee ee ON p.person_id = ee.person_id
WHERE ee.event_id = 5;

-- Events per type
SELECT e.type, COUNT(*) AS event_count, COUNT(DISTINCT e.declared_by_id) AS declarer_count
FROM event e
GROUP BY e.type
ORDER BY event_count DESC;

-- Severe risks and how many events they appear in
SELECT r.risk_id, r.name, r.gravity, r.probability, COUNT(er.event_id) AS event_count
FROM risk r
LEFT JOIN event_risk er ON r.risk_id = er.risk_id
WHERE r.gravity IN ('Élevée', 'Critique')
GROUP BY r.risk_id, r.name, r.gravity, r.probability
ORDER BY event_count DESC;

-- Total cost of corrective measures per unit
SELECT ou.name AS unit, COUNT(cm.measure_id) AS measure_count,
       COALESCE(SUM(cm.cost), 0) AS total_cost
FROM organizational_unit ou
LEFT JOIN corrective_measure cm ON ou.unit_id = cm.organizational_unit_id
GROUP BY ou.unit_id, ou.name
ORDER BY total_cost DESC;
"#;

/// The schema description handed to the query generator.
pub fn schema_description() -> &'static str {
    SCHEMA_DESCRIPTION
}
