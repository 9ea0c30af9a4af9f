use crate::db;
use crate::electives::GroupMatch;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::sheet::{SheetOptions, DEFAULT_NA_LABEL};
use rusqlite::Connection;
use serde_json::{json, Map, Value};
use tracing::warn;

#[derive(Clone, Copy)]
enum SetupSection {
    Reports,
}

impl SetupSection {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "reports" => Some(Self::Reports),
            _ => None,
        }
    }

    fn key(self) -> &'static str {
        match self {
            Self::Reports => "setup.reports",
        }
    }
}

fn default_section(section: SetupSection) -> Value {
    match section {
        SetupSection::Reports => json!({
            "notApplicableLabel": DEFAULT_NA_LABEL,
            "electiveMatch": GroupMatch::default().as_str(),
            "showMiddleName": false
        }),
    }
}

fn as_object_mut(value: &mut Value) -> Result<&mut Map<String, Value>, String> {
    value
        .as_object_mut()
        .ok_or_else(|| "internal setup object must be a JSON object".to_string())
}

fn parse_bool(v: &Value, key: &str) -> Result<bool, String> {
    v.as_bool().ok_or_else(|| format!("{} must be boolean", key))
}

fn parse_label(v: &Value, key: &str, max_len: usize) -> Result<String, String> {
    let s = v.as_str().ok_or_else(|| format!("{} must be string", key))?;
    let s = s.trim();
    if s.is_empty() || s.chars().count() > max_len {
        return Err(format!("{} length must be 1..={}", key, max_len));
    }
    Ok(s.to_string())
}

fn merge_section_patch(
    section: SetupSection,
    current: &mut Value,
    patch: &Map<String, Value>,
) -> Result<(), String> {
    let obj = as_object_mut(current)?;
    match section {
        SetupSection::Reports => {
            for (k, v) in patch {
                let next = match k.as_str() {
                    "notApplicableLabel" => json!(parse_label(v, k, 16)?),
                    "electiveMatch" => {
                        let s = v.as_str().unwrap_or_default();
                        let mode = GroupMatch::parse(s)
                            .ok_or_else(|| "electiveMatch must be one of: substring, exact".to_string())?;
                        json!(mode.as_str())
                    }
                    "showMiddleName" => json!(parse_bool(v, k)?),
                    other => return Err(format!("unknown reports setting: {}", other)),
                };
                obj.insert(k.clone(), next);
            }
        }
    }
    Ok(())
}

fn load_section(conn: &Connection, section: SetupSection) -> anyhow::Result<Value> {
    let mut merged = default_section(section);
    if let Some(stored) = db::settings_get_json(conn, section.key())? {
        if let (Some(base), Some(over)) = (merged.as_object_mut(), stored.as_object()) {
            for (k, v) in over {
                base.insert(k.clone(), v.clone());
            }
        }
    }
    Ok(merged)
}

/// Settings a result sheet is built with. Falls back to defaults when the
/// stored section cannot be read.
pub fn report_settings(conn: &Connection) -> (SheetOptions, GroupMatch) {
    let section = match load_section(conn, SetupSection::Reports) {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, "falling back to default report settings");
            default_section(SetupSection::Reports)
        }
    };
    let defaults = SheetOptions::default();
    let options = SheetOptions {
        na_label: section
            .get("notApplicableLabel")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .unwrap_or(defaults.na_label),
        show_middle_name: section
            .get("showMiddleName")
            .and_then(|v| v.as_bool())
            .unwrap_or(defaults.show_middle_name),
    };
    let mode = section
        .get("electiveMatch")
        .and_then(|v| v.as_str())
        .and_then(GroupMatch::parse)
        .unwrap_or_default();
    (options, mode)
}

fn handle_setup_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match load_section(conn, SetupSection::Reports) {
        Ok(reports) => ok(&req.id, json!({ "reports": reports })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_setup_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(section_raw) = req.params.get("section").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing section", None);
    };
    let Some(section) = SetupSection::parse(section_raw) else {
        return err(&req.id, "bad_params", "unknown section", None);
    };
    let Some(patch_obj) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "patch must be an object", None);
    };

    let mut current = match load_section(conn, section) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if let Err(msg) = merge_section_patch(section, &mut current, patch_obj) {
        return err(&req.id, "bad_params", msg, None);
    }
    if let Err(e) = db::settings_set_json(conn, section.key(), &current) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    ok(&req.id, json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "setup.get" => Some(handle_setup_get(state, req)),
        "setup.update" => Some(handle_setup_update(state, req)),
        _ => None,
    }
}
