use crate::db;
use crate::ipc::error::{db_err, err, invalid, ok};
use crate::ipc::helpers::{db_conn, params_as, required_str};
use crate::ipc::types::{AppState, Request};
use crate::model::{
    resolvable_selections, validate_selections, ElectiveGroup, ElectiveSelection, Student,
};
use crate::roll;
use rusqlite::Connection;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

fn scope_params(req: &Request) -> Result<(String, String), serde_json::Value> {
    Ok((required_str(req, "class")?, required_str(req, "division")?))
}

/// Elective groups a student of (class, division) may choose from.
fn groups_for(conn: &Connection, class: &str, division: &str) -> anyhow::Result<Vec<ElectiveGroup>> {
    Ok(db::find_class_mapping(conn, class, division)?
        .map(|m| m.elective_groups)
        .unwrap_or_default())
}

fn parse_selections(req: &Request) -> Result<Option<Vec<ElectiveSelection>>, serde_json::Value> {
    match req.params.get("selectedElectiveGroups") {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(v) => serde_json::from_value(v.clone())
            .map(Some)
            .map_err(|e| err(&req.id, "bad_params", e.to_string(), None)),
    }
}

/// Renumbers one class-division alphabetically. Returns rows changed.
fn normalize_scope(conn: &Connection, class: &str, division: &str) -> anyhow::Result<usize> {
    let roster = db::list_students(conn, class, division)?;
    let updates = roll::reorder(&roster);
    let changed = db::apply_roll_updates(conn, &roster, &updates)?;
    if changed > 0 {
        info!(class, division, changed, "roll numbers reordered");
    }
    Ok(changed)
}

fn handle_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let (class, division) = match scope_params(req) {
        Ok(v) => v,
        Err(e) => return e,
    };

    match db::list_students(conn, &class, &division) {
        Ok(students) => {
            let rows: Vec<serde_json::Value> = students
                .iter()
                .map(|s| {
                    let mut v = json!(s);
                    v["displayName"] = json!(s.display_name(true));
                    v
                })
                .collect();
            ok(&req.id, json!({ "students": rows }))
        }
        Err(e) => db_err(&req.id, "db_query_failed", e),
    }
}

fn handle_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let student = match params_as::<Student>(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let mut student = match student.normalized() {
        Ok(v) => v,
        Err(e) => return invalid(&req.id, &e),
    };

    let groups = match groups_for(conn, &student.class, &student.division) {
        Ok(v) => v,
        Err(e) => return db_err(&req.id, "db_query_failed", e),
    };
    let selections = std::mem::take(&mut student.selected_elective_groups);
    student.selected_elective_groups = match validate_selections(selections, Some(&groups)) {
        Ok(v) => v,
        Err(e) => return invalid(&req.id, &e),
    };

    let roster = match db::list_students(conn, &student.class, &student.division) {
        Ok(v) => v,
        Err(e) => return db_err(&req.id, "db_query_failed", e),
    };
    let assignment = roll::assign_on_create(&roster, &student.first_name);
    student.id = Uuid::new_v4().to_string();
    student.roll_number = assignment.roll_number;

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };
    if let Err(e) = db::apply_roll_updates(&tx, &roster, &assignment.roster_updates) {
        let _ = tx.rollback();
        return db_err(&req.id, "db_update_failed", e);
    }
    if let Err(e) = db::insert_student(&tx, &student) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_insert_failed",
            format!("{e:#}"),
            Some(json!({ "table": "students" })),
        );
    }
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }

    info!(
        class = %student.class,
        division = %student.division,
        roll_number = student.roll_number,
        shifted = assignment.roster_updates.len(),
        "student added"
    );
    ok(
        &req.id,
        json!({
            "studentId": student.id,
            "rollNumber": assignment.roll_number,
            "rosterUpdates": assignment.roster_updates
        }),
    )
}

fn handle_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let id = match required_str(req, "id") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let existing = match db::get_student(conn, &id) {
        Ok(Some(v)) => v,
        Ok(None) => return err(&req.id, "not_found", "student not found", None),
        Err(e) => return db_err(&req.id, "db_query_failed", e),
    };

    let p = &req.params;
    let text = |key: &str| p.get(key).and_then(|v| v.as_str()).map(|s| s.to_string());
    // Present-but-null clears an optional name.
    let optional_text = |key: &str, current: &Option<String>| match p.get(key) {
        None => current.clone(),
        Some(v) => v.as_str().map(|s| s.to_string()),
    };
    let updated = Student {
        id: existing.id.clone(),
        first_name: text("firstName").unwrap_or_else(|| existing.first_name.clone()),
        middle_name: optional_text("middleName", &existing.middle_name),
        last_name: optional_text("lastName", &existing.last_name),
        class: text("class").unwrap_or_else(|| existing.class.clone()),
        division: text("division").unwrap_or_else(|| existing.division.clone()),
        roll_number: existing.roll_number,
        selected_elective_groups: existing.selected_elective_groups.clone(),
    };
    let mut updated = match updated.normalized() {
        Ok(v) => v,
        Err(e) => return invalid(&req.id, &e),
    };

    let moved = updated.class != existing.class || updated.division != existing.division;
    let mut dropped_electives = 0;
    match parse_selections(req) {
        Ok(Some(selections)) => {
            let groups = match groups_for(conn, &updated.class, &updated.division) {
                Ok(v) => v,
                Err(e) => return db_err(&req.id, "db_query_failed", e),
            };
            updated.selected_elective_groups = match validate_selections(selections, Some(&groups)) {
                Ok(v) => v,
                Err(e) => return invalid(&req.id, &e),
            };
        }
        // Carried-over selections must still resolve in the new scope.
        Ok(None) if moved => {
            let groups = match groups_for(conn, &updated.class, &updated.division) {
                Ok(v) => v,
                Err(e) => return db_err(&req.id, "db_query_failed", e),
            };
            let before = updated.selected_elective_groups.len();
            updated.selected_elective_groups =
                resolvable_selections(std::mem::take(&mut updated.selected_elective_groups), &groups);
            dropped_electives = before - updated.selected_elective_groups.len();
        }
        Ok(None) => {}
        Err(e) => return e,
    }

    let renamed = updated.first_name != existing.first_name;

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };
    if let Err(e) = db::update_student(&tx, &updated) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_update_failed",
            format!("{e:#}"),
            Some(json!({ "table": "students" })),
        );
    }
    let mut renumbered = 0;
    if moved || renamed {
        match normalize_scope(&tx, &updated.class, &updated.division) {
            Ok(n) => renumbered += n,
            Err(e) => {
                let _ = tx.rollback();
                return db_err(&req.id, "db_update_failed", e);
            }
        }
    }
    if moved {
        match normalize_scope(&tx, &existing.class, &existing.division) {
            Ok(n) => renumbered += n,
            Err(e) => {
                let _ = tx.rollback();
                return db_err(&req.id, "db_update_failed", e);
            }
        }
    }
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }

    if dropped_electives > 0 {
        info!(
            class = %updated.class,
            division = %updated.division,
            dropped = dropped_electives,
            "elective selections dropped on move"
        );
    }
    ok(
        &req.id,
        json!({
            "ok": true,
            "renumbered": renumbered,
            "droppedElectives": dropped_electives
        }),
    )
}

fn handle_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let id = match required_str(req, "id") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let existing = match db::get_student(conn, &id) {
        Ok(Some(v)) => v,
        Ok(None) => return err(&req.id, "not_found", "student not found", None),
        Err(e) => return db_err(&req.id, "db_query_failed", e),
    };

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };
    if let Err(e) = db::delete_student(&tx, &id) {
        let _ = tx.rollback();
        return db_err(&req.id, "db_delete_failed", e);
    }
    let renumbered = match normalize_scope(&tx, &existing.class, &existing.division) {
        Ok(n) => n,
        Err(e) => {
            let _ = tx.rollback();
            return db_err(&req.id, "db_update_failed", e);
        }
    };
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }

    ok(&req.id, json!({ "ok": true, "renumbered": renumbered }))
}

fn handle_reorder(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let (class, division) = match scope_params(req) {
        Ok(v) => v,
        Err(e) => return e,
    };

    let roster = match db::list_students(conn, &class, &division) {
        Ok(v) => v,
        Err(e) => return db_err(&req.id, "db_query_failed", e),
    };
    let updates = roll::reorder(&roster);

    // Each row is its own write; a partial run is repaired by calling again.
    let changed = match db::apply_roll_updates(conn, &roster, &updates) {
        Ok(n) => n,
        Err(e) => return db_err(&req.id, "db_update_failed", e),
    };
    info!(class = %class, division = %division, changed, "roll numbers reordered");

    ok(
        &req.id,
        json!({ "rollNumbers": updates, "changed": changed }),
    )
}

fn handle_set_electives(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let id = match required_str(req, "id") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let selections = match parse_selections(req) {
        Ok(Some(v)) => v,
        Ok(None) => {
            return err(&req.id, "bad_params", "missing selectedElectiveGroups", None);
        }
        Err(e) => return e,
    };
    let mut student = match db::get_student(conn, &id) {
        Ok(Some(v)) => v,
        Ok(None) => return err(&req.id, "not_found", "student not found", None),
        Err(e) => return db_err(&req.id, "db_query_failed", e),
    };

    let groups = match groups_for(conn, &student.class, &student.division) {
        Ok(v) => v,
        Err(e) => return db_err(&req.id, "db_query_failed", e),
    };
    student.selected_elective_groups = match validate_selections(selections, Some(&groups)) {
        Ok(v) => v,
        Err(e) => return invalid(&req.id, &e),
    };

    match db::update_student(conn, &student) {
        Ok(_) => ok(
            &req.id,
            json!({ "selectedElectiveGroups": student.selected_elective_groups }),
        ),
        Err(e) => db_err(&req.id, "db_update_failed", e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.list" => Some(handle_list(state, req)),
        "students.create" => Some(handle_create(state, req)),
        "students.update" => Some(handle_update(state, req)),
        "students.delete" => Some(handle_delete(state, req)),
        "students.reorder" => Some(handle_reorder(state, req)),
        "students.setElectives" => Some(handle_set_electives(state, req)),
        _ => None,
    }
}
