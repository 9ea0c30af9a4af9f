use crate::db;
use crate::ipc::error::{db_err, err, invalid, ok};
use crate::ipc::helpers::{db_conn, optional_str, params_as, required_str};
use crate::ipc::types::{AppState, Request};
use crate::model::ClassMapping;
use serde_json::json;
use uuid::Uuid;

fn handle_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "classMappings": [] }));
    };
    let class = optional_str(req, "class");
    match db::list_class_mappings(conn, class.as_deref()) {
        Ok(rows) => ok(&req.id, json!({ "classMappings": rows })),
        Err(e) => db_err(&req.id, "db_query_failed", e),
    }
}

fn scope_conflict(req: &Request, m: &ClassMapping) -> serde_json::Value {
    err(
        &req.id,
        "conflict",
        "a class mapping already exists for this year, class and division",
        Some(json!({ "year": m.year, "class": m.class, "division": m.division })),
    )
}

fn handle_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let mapping = match params_as::<ClassMapping>(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let mut mapping = match mapping.validated() {
        Ok(v) => v,
        Err(e) => return invalid(&req.id, &e),
    };

    match db::class_mapping_scope_taken(conn, &mapping, None) {
        Ok(true) => return scope_conflict(req, &mapping),
        Ok(false) => {}
        Err(e) => return db_err(&req.id, "db_query_failed", e),
    }

    mapping.id = Uuid::new_v4().to_string();
    if let Err(e) = db::insert_class_mapping(conn, &mapping) {
        return err(
            &req.id,
            "db_insert_failed",
            format!("{e:#}"),
            Some(json!({ "table": "class_mappings" })),
        );
    }
    ok(&req.id, json!({ "classMappingId": mapping.id }))
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
    match db::get_class_mapping(conn, &id) {
        Ok(Some(_)) => {}
        Ok(None) => return err(&req.id, "not_found", "class mapping not found", None),
        Err(e) => return db_err(&req.id, "db_query_failed", e),
    }

    let mapping = match params_as::<ClassMapping>(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let mut mapping = match mapping.validated() {
        Ok(v) => v,
        Err(e) => return invalid(&req.id, &e),
    };
    mapping.id = id;

    match db::class_mapping_scope_taken(conn, &mapping, Some(&mapping.id)) {
        Ok(true) => return scope_conflict(req, &mapping),
        Ok(false) => {}
        Err(e) => return db_err(&req.id, "db_query_failed", e),
    }

    match db::update_class_mapping(conn, &mapping) {
        Ok(_) => ok(&req.id, json!({ "ok": true })),
        Err(e) => err(
            &req.id,
            "db_update_failed",
            format!("{e:#}"),
            Some(json!({ "table": "class_mappings" })),
        ),
    }
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
    match db::delete_class_mapping(conn, &id) {
        Ok(true) => ok(&req.id, json!({ "ok": true })),
        Ok(false) => err(&req.id, "not_found", "class mapping not found", None),
        Err(e) => db_err(&req.id, "db_delete_failed", e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "classMappings.list" => Some(handle_list(state, req)),
        "classMappings.create" => Some(handle_create(state, req)),
        "classMappings.update" => Some(handle_update(state, req)),
        "classMappings.delete" => Some(handle_delete(state, req)),
        _ => None,
    }
}
