use crate::model::{ClassMapping, PeriodicTest, Student};
use crate::roll::{self, RollUpdate};
use anyhow::Context;
use rusqlite::types::{Type, Value};
use rusqlite::{params_from_iter, Connection, OptionalExtension, Row};
use serde::de::DeserializeOwned;
use std::path::Path;

pub const DB_FILE: &str = "school.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)
        .with_context(|| format!("failed to create workspace {}", workspace.to_string_lossy()))?;
    let db_path = workspace.join(DB_FILE);
    let conn = Connection::open(&db_path)
        .with_context(|| format!("failed to open {}", db_path.to_string_lossy()))?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS class_mappings(
            id TEXT PRIMARY KEY,
            year TEXT NOT NULL,
            class_name TEXT NOT NULL,
            division TEXT NOT NULL,
            subjects_json TEXT NOT NULL,
            elective_groups_json TEXT NOT NULL,
            updated_at TEXT,
            UNIQUE(year, class_name, division)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_class_mappings_class ON class_mappings(class_name)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            first_name TEXT NOT NULL,
            middle_name TEXT,
            last_name TEXT,
            class_name TEXT NOT NULL,
            division TEXT NOT NULL,
            roll_number INTEGER NOT NULL,
            electives_json TEXT NOT NULL DEFAULT '[]',
            updated_at TEXT
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_scope_roll
         ON students(class_name, division, roll_number)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS periodic_tests(
            id TEXT PRIMARY KEY,
            test_name TEXT NOT NULL,
            year TEXT NOT NULL,
            class_name TEXT NOT NULL,
            subject TEXT NOT NULL,
            test_date TEXT NOT NULL,
            max_marks REAL,
            updated_at TEXT
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_periodic_tests_occurrence
         ON periodic_tests(test_name, year, class_name)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    Ok(conn)
}

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row("SELECT value_json FROM settings WHERE key = ?", [key], |r| {
            r.get(0)
        })
        .optional()?;
    match raw {
        Some(s) => Ok(Some(
            serde_json::from_str(&s).with_context(|| format!("corrupt setting {}", key))?,
        )),
        None => Ok(None),
    }
}

pub fn settings_set_json(conn: &Connection, key: &str, value: &serde_json::Value) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, value.to_string()),
    )?;
    Ok(())
}

fn json_col<T: DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn to_json<T: serde::Serialize>(value: &T) -> anyhow::Result<String> {
    serde_json::to_string(value).context("failed to encode json column")
}

// ---- class mappings ----

const CLASS_MAPPING_COLS: &str =
    "id, year, class_name, division, subjects_json, elective_groups_json";

fn class_mapping_row(row: &Row<'_>) -> rusqlite::Result<ClassMapping> {
    Ok(ClassMapping {
        id: row.get(0)?,
        year: row.get(1)?,
        class: row.get(2)?,
        division: row.get(3)?,
        subjects: json_col(row, 4)?,
        elective_groups: json_col(row, 5)?,
    })
}

pub fn list_class_mappings(conn: &Connection, class: Option<&str>) -> anyhow::Result<Vec<ClassMapping>> {
    let mut sql = format!("SELECT {} FROM class_mappings", CLASS_MAPPING_COLS);
    let mut binds: Vec<Value> = Vec::new();
    if let Some(c) = class {
        sql.push_str(" WHERE class_name = ?");
        binds.push(Value::Text(c.to_string()));
    }
    sql.push_str(" ORDER BY year, class_name, division, rowid");

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(binds), class_mapping_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn get_class_mapping(conn: &Connection, id: &str) -> anyhow::Result<Option<ClassMapping>> {
    let sql = format!("SELECT {} FROM class_mappings WHERE id = ?", CLASS_MAPPING_COLS);
    Ok(conn.query_row(&sql, [id], class_mapping_row).optional()?)
}

/// The mapping a student of (class, division) studies under. Latest year wins
/// when several years are stored.
pub fn find_class_mapping(
    conn: &Connection,
    class: &str,
    division: &str,
) -> anyhow::Result<Option<ClassMapping>> {
    let sql = format!(
        "SELECT {} FROM class_mappings
         WHERE class_name = ? AND division = ?
         ORDER BY year DESC
         LIMIT 1",
        CLASS_MAPPING_COLS
    );
    Ok(conn
        .query_row(&sql, [class, division], class_mapping_row)
        .optional()?)
}

pub fn class_mapping_scope_taken(
    conn: &Connection,
    m: &ClassMapping,
    except_id: Option<&str>,
) -> anyhow::Result<bool> {
    let hit: Option<String> = conn
        .query_row(
            "SELECT id FROM class_mappings
             WHERE year = ? AND class_name = ? AND division = ? AND id <> ?",
            (&m.year, &m.class, &m.division, except_id.unwrap_or("")),
            |r| r.get(0),
        )
        .optional()?;
    Ok(hit.is_some())
}

pub fn insert_class_mapping(conn: &Connection, m: &ClassMapping) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO class_mappings(
           id, year, class_name, division, subjects_json, elective_groups_json, updated_at
         ) VALUES(?, ?, ?, ?, ?, ?, strftime('%Y-%m-%dT%H:%M:%SZ','now'))",
        (
            &m.id,
            &m.year,
            &m.class,
            &m.division,
            to_json(&m.subjects)?,
            to_json(&m.elective_groups)?,
        ),
    )?;
    Ok(())
}

pub fn update_class_mapping(conn: &Connection, m: &ClassMapping) -> anyhow::Result<bool> {
    let n = conn.execute(
        "UPDATE class_mappings
         SET year = ?, class_name = ?, division = ?, subjects_json = ?, elective_groups_json = ?,
             updated_at = strftime('%Y-%m-%dT%H:%M:%SZ','now')
         WHERE id = ?",
        (
            &m.year,
            &m.class,
            &m.division,
            to_json(&m.subjects)?,
            to_json(&m.elective_groups)?,
            &m.id,
        ),
    )?;
    Ok(n > 0)
}

pub fn delete_class_mapping(conn: &Connection, id: &str) -> anyhow::Result<bool> {
    Ok(conn.execute("DELETE FROM class_mappings WHERE id = ?", [id])? > 0)
}

// ---- students ----

const STUDENT_COLS: &str =
    "id, first_name, middle_name, last_name, class_name, division, roll_number, electives_json";

fn student_row(row: &Row<'_>) -> rusqlite::Result<Student> {
    Ok(Student {
        id: row.get(0)?,
        first_name: row.get(1)?,
        middle_name: row.get(2)?,
        last_name: row.get(3)?,
        class: row.get(4)?,
        division: row.get(5)?,
        roll_number: row.get(6)?,
        selected_elective_groups: json_col(row, 7)?,
    })
}

/// Students of one class-division, by roll number.
pub fn list_students(conn: &Connection, class: &str, division: &str) -> anyhow::Result<Vec<Student>> {
    let sql = format!(
        "SELECT {} FROM students
         WHERE class_name = ? AND division = ?
         ORDER BY roll_number, rowid",
        STUDENT_COLS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([class, division], student_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn get_student(conn: &Connection, id: &str) -> anyhow::Result<Option<Student>> {
    let sql = format!("SELECT {} FROM students WHERE id = ?", STUDENT_COLS);
    Ok(conn.query_row(&sql, [id], student_row).optional()?)
}

pub fn insert_student(conn: &Connection, s: &Student) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO students(
           id, first_name, middle_name, last_name, class_name, division, roll_number,
           electives_json, updated_at
         ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, strftime('%Y-%m-%dT%H:%M:%SZ','now'))",
        (
            &s.id,
            &s.first_name,
            s.middle_name.as_deref(),
            s.last_name.as_deref(),
            &s.class,
            &s.division,
            s.roll_number,
            to_json(&s.selected_elective_groups)?,
        ),
    )?;
    Ok(())
}

pub fn update_student(conn: &Connection, s: &Student) -> anyhow::Result<bool> {
    let n = conn.execute(
        "UPDATE students
         SET first_name = ?, middle_name = ?, last_name = ?, class_name = ?, division = ?,
             roll_number = ?, electives_json = ?,
             updated_at = strftime('%Y-%m-%dT%H:%M:%SZ','now')
         WHERE id = ?",
        (
            &s.first_name,
            s.middle_name.as_deref(),
            s.last_name.as_deref(),
            &s.class,
            &s.division,
            s.roll_number,
            to_json(&s.selected_elective_groups)?,
            &s.id,
        ),
    )?;
    Ok(n > 0)
}

pub fn delete_student(conn: &Connection, id: &str) -> anyhow::Result<bool> {
    Ok(conn.execute("DELETE FROM students WHERE id = ?", [id])? > 0)
}

/// Writes roll numbers one row at a time, skipping rows already holding the
/// target number. Returns how many rows changed.
pub fn apply_roll_updates(
    conn: &Connection,
    roster: &[Student],
    updates: &[RollUpdate],
) -> anyhow::Result<usize> {
    let mut written = 0;
    for u in roll::changed(roster, updates) {
        written += conn
            .execute(
                "UPDATE students
                 SET roll_number = ?, updated_at = strftime('%Y-%m-%dT%H:%M:%SZ','now')
                 WHERE id = ?",
                (u.new_roll_number, &u.student_id),
            )
            .with_context(|| format!("failed to renumber student {}", u.student_id))?;
    }
    Ok(written)
}

// ---- periodic tests ----

#[derive(Debug, Clone, Default)]
pub struct PeriodicTestFilter {
    pub test_name: Option<String>,
    pub year: Option<String>,
    pub class: Option<String>,
}

const PERIODIC_TEST_COLS: &str = "id, test_name, year, class_name, subject, test_date, max_marks";

fn periodic_test_row(row: &Row<'_>) -> rusqlite::Result<PeriodicTest> {
    Ok(PeriodicTest {
        id: row.get(0)?,
        test_name: row.get(1)?,
        year: row.get(2)?,
        class: row.get(3)?,
        subject: row.get(4)?,
        test_date: row.get(5)?,
        max_marks: row.get(6)?,
    })
}

pub fn list_periodic_tests(
    conn: &Connection,
    filter: &PeriodicTestFilter,
) -> anyhow::Result<Vec<PeriodicTest>> {
    let mut clauses: Vec<&str> = Vec::new();
    let mut binds: Vec<Value> = Vec::new();
    if let Some(v) = &filter.test_name {
        clauses.push("test_name = ?");
        binds.push(Value::Text(v.clone()));
    }
    if let Some(v) = &filter.year {
        clauses.push("year = ?");
        binds.push(Value::Text(v.clone()));
    }
    if let Some(v) = &filter.class {
        clauses.push("class_name = ?");
        binds.push(Value::Text(v.clone()));
    }

    let mut sql = format!("SELECT {} FROM periodic_tests", PERIODIC_TEST_COLS);
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }
    sql.push_str(" ORDER BY test_date, test_name, class_name, rowid");

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(binds), periodic_test_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn get_periodic_test(conn: &Connection, id: &str) -> anyhow::Result<Option<PeriodicTest>> {
    let sql = format!("SELECT {} FROM periodic_tests WHERE id = ?", PERIODIC_TEST_COLS);
    Ok(conn.query_row(&sql, [id], periodic_test_row).optional()?)
}

pub fn insert_periodic_test(conn: &Connection, t: &PeriodicTest) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO periodic_tests(
           id, test_name, year, class_name, subject, test_date, max_marks, updated_at
         ) VALUES(?, ?, ?, ?, ?, ?, ?, strftime('%Y-%m-%dT%H:%M:%SZ','now'))",
        (
            &t.id,
            &t.test_name,
            &t.year,
            &t.class,
            &t.subject,
            &t.test_date,
            t.max_marks,
        ),
    )?;
    Ok(())
}

pub fn update_periodic_test(conn: &Connection, t: &PeriodicTest) -> anyhow::Result<bool> {
    let n = conn.execute(
        "UPDATE periodic_tests
         SET test_name = ?, year = ?, class_name = ?, subject = ?, test_date = ?, max_marks = ?,
             updated_at = strftime('%Y-%m-%dT%H:%M:%SZ','now')
         WHERE id = ?",
        (
            &t.test_name,
            &t.year,
            &t.class,
            &t.subject,
            &t.test_date,
            t.max_marks,
            &t.id,
        ),
    )?;
    Ok(n > 0)
}

pub fn delete_periodic_test(conn: &Connection, id: &str) -> anyhow::Result<bool> {
    Ok(conn.execute("DELETE FROM periodic_tests WHERE id = ?", [id])? > 0)
}
