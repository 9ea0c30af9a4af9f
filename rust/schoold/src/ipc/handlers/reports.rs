use crate::db::{self, PeriodicTestFilter};
use crate::electives::{self, GroupMatch, ResolvedSubjects};
use crate::ipc::error::{db_err, err, ok};
use crate::ipc::helpers::{db_conn, optional_str, required_str};
use crate::ipc::types::{AppState, Request};
use crate::sheet::{self, ResultSheet, SheetHeader};
use anyhow::Context;
use rusqlite::Connection;
use serde_json::json;
use std::collections::HashSet;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::setup;

/// Subjects examined in (testName, year, class); `not_found` when the test
/// has no rows for that class.
fn test_subjects(
    conn: &Connection,
    req: &Request,
    test_name: &str,
    year: &str,
    class: &str,
) -> Result<HashSet<String>, serde_json::Value> {
    let filter = PeriodicTestFilter {
        test_name: Some(test_name.to_string()),
        year: Some(year.to_string()),
        class: Some(class.to_string()),
    };
    let tests = db::list_periodic_tests(conn, &filter)
        .map_err(|e| db_err(&req.id, "db_query_failed", e))?;
    let scheduled = electives::scheduled_subjects(&tests, test_name, year, class);
    if scheduled.is_empty() {
        return Err(err(
            &req.id,
            "not_found",
            "no periodic test scheduled for this class",
            Some(json!({ "testName": test_name, "year": year, "class": class })),
        ));
    }
    Ok(scheduled)
}

fn resolve_for(
    conn: &Connection,
    req: &Request,
    class: &str,
    scheduled: Option<&HashSet<String>>,
    mode: GroupMatch,
) -> Result<ResolvedSubjects, serde_json::Value> {
    let mappings = db::list_class_mappings(conn, None)
        .map_err(|e| db_err(&req.id, "db_query_failed", e))?;
    Ok(electives::resolve(&mappings, class, scheduled, mode))
}

fn handle_resolve_subjects(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let class = match required_str(req, "class") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let (_, mode) = setup::report_settings(conn);

    let scheduled = match optional_str(req, "testName") {
        Some(test_name) => {
            let year = match required_str(req, "year") {
                Ok(v) => v,
                Err(e) => return e,
            };
            match test_subjects(conn, req, &test_name, &year, &class) {
                Ok(v) => Some(v),
                Err(e) => return e,
            }
        }
        None => None,
    };

    let resolved = match resolve_for(conn, req, &class, scheduled.as_ref(), mode) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let mut listed: Option<Vec<String>> = scheduled.map(|s| s.into_iter().collect());
    if let Some(v) = listed.as_mut() {
        v.sort();
    }

    ok(
        &req.id,
        json!({
            "class": class,
            "coreSubjects": resolved.core_subjects,
            "electiveGroups": resolved.elective_groups,
            "testSubjects": listed,
            "electiveMatch": mode.as_str()
        }),
    )
}

fn load_sheet(conn: &Connection, req: &Request) -> Result<ResultSheet, serde_json::Value> {
    let class = required_str(req, "class")?;
    let division = required_str(req, "division")?;
    let test_name = required_str(req, "testName")?;
    let year = required_str(req, "year")?;

    let (options, mode) = setup::report_settings(conn);
    let scheduled = test_subjects(conn, req, &test_name, &year, &class)?;
    let resolved = resolve_for(conn, req, &class, Some(&scheduled), mode)?;
    let students = db::list_students(conn, &class, &division)
        .map_err(|e| db_err(&req.id, "db_query_failed", e))?;

    debug!(
        class = %class,
        division = %division,
        core = resolved.core_subjects.len(),
        groups = resolved.elective_groups.len(),
        students = students.len(),
        "building result sheet"
    );
    Ok(sheet::build_result_sheet(
        SheetHeader {
            test_name,
            year,
            class,
            division,
        },
        &resolved,
        &students,
        &options,
    ))
}

fn handle_result_sheet(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    match load_sheet(conn, req) {
        Ok(sheet) => ok(&req.id, json!(sheet)),
        Err(e) => e,
    }
}

fn write_sheet_csv(sheet: &ResultSheet, out_path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.to_string_lossy()))?;
    }
    let file = File::create(out_path)
        .with_context(|| format!("failed to create {}", out_path.to_string_lossy()))?;
    sheet::write_csv(sheet, BufWriter::new(file))
}

fn handle_result_sheet_csv(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let out_path = match required_str(req, "outPath") {
        Ok(v) => PathBuf::from(v),
        Err(e) => return e,
    };
    let sheet = match load_sheet(conn, req) {
        Ok(v) => v,
        Err(e) => return e,
    };

    match write_sheet_csv(&sheet, &out_path) {
        Ok(()) => ok(
            &req.id,
            json!({
                "path": out_path.to_string_lossy(),
                "rowCount": sheet.rows.len()
            }),
        ),
        Err(e) => err(&req.id, "io_failed", format!("{e:#}"), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "reports.resolveSubjects" => Some(handle_resolve_subjects(state, req)),
        "reports.resultSheet" => Some(handle_result_sheet(state, req)),
        "reports.resultSheetCsv" => Some(handle_result_sheet_csv(state, req)),
        _ => None,
    }
}
