use crate::ipc::error::{commit_failed, tx_failed, update_failed, HandlerErr};
use crate::ipc::helpers::{optional_bool, required_str, respond, workspace};
use crate::ipc::types::{AppState, Request};
use crate::model::DailyTask;
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;

fn fetch_task(conn: &Connection, task_id: &str) -> Result<DailyTask, HandlerErr> {
    let sql = format!("SELECT {} FROM daily_tasks WHERE id = ?", DailyTask::COLUMNS);
    conn.query_row(&sql, [task_id], DailyTask::from_row)
        .optional()?
        .ok_or_else(|| HandlerErr::not_found("task"))
}

/// The two flags change independently; an absent flag keeps its value.
fn daily_tasks_update(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let task_id = required_str(params, "taskId")?;
    let grading_done = optional_bool(params, "gradingDone")?;
    let review_done = optional_bool(params, "reviewDone")?;

    let tx = conn.unchecked_transaction().map_err(tx_failed)?;
    let mut task = fetch_task(&tx, &task_id)?;
    if let Some(v) = grading_done {
        task.grading_done = v;
    }
    if let Some(v) = review_done {
        task.review_done = v;
    }
    tx.execute(
        "UPDATE daily_tasks SET grading_done = ?, review_done = ? WHERE id = ?",
        (task.grading_done, task.review_done, &task.id),
    )
    .map_err(update_failed("daily_tasks"))?;
    tx.commit().map_err(commit_failed)?;
    Ok(task.to_json())
}

fn daily_tasks_delete(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let task_id = required_str(params, "taskId")?;
    let n = conn
        .execute("DELETE FROM daily_tasks WHERE id = ?", [&task_id])
        .map_err(update_failed("daily_tasks"))?;
    if n == 0 {
        return Err(HandlerErr::not_found("task"));
    }
    Ok(json!({ "deleted": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let params = &req.params;
    let result = match req.method.as_str() {
        "dailyTasks.update" => workspace(state).and_then(|ws| daily_tasks_update(&ws.conn, params)),
        "dailyTasks.delete" => workspace(state).and_then(|ws| daily_tasks_delete(&ws.conn, params)),
        _ => return None,
    };
    Some(respond(req, result))
}
