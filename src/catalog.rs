use crate::classroom::{classroom_teacher, clean_opt, require_member};
use crate::db;
use crate::error::{CoreError, CoreResult};
use crate::identity::Actor;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, Row};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Lesson {
    pub id: String,
    pub classroom_id: String,
    pub title: String,
    pub description: Option<String>,
    pub video_ref: Option<String>,
    pub notes_ref: Option<String>,
    pub order: i64,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    pub id: String,
    pub classroom_id: String,
    pub lesson_id: Option<String>,
    pub title: String,
    pub description: String,
    pub document_ref: Option<String>,
    pub due_date: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Default)]
pub struct NewLesson {
    pub title: String,
    pub description: Option<String>,
    pub video_ref: Option<String>,
    pub notes_ref: Option<String>,
    /// Appended after the current last lesson when absent.
    pub order: Option<i64>,
}

/// Outer `None` leaves a field untouched; `Some(None)` clears it.
#[derive(Debug, Clone, Default)]
pub struct LessonPatch {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub video_ref: Option<Option<String>>,
    pub notes_ref: Option<Option<String>>,
    pub order: Option<i64>,
}

#[derive(Debug, Clone, Default)]
pub struct NewAssignment {
    pub lesson_id: Option<String>,
    pub title: String,
    pub description: String,
    pub document_ref: Option<String>,
    pub due_date: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct AssignmentPatch {
    pub lesson_id: Option<Option<String>>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub document_ref: Option<Option<String>>,
    pub due_date: Option<Option<String>>,
}

const LESSON_COLS: &str =
    "id, classroom_id, title, description, video_ref, notes_ref, sort_order, created_at";
const ASSIGNMENT_COLS: &str =
    "id, classroom_id, lesson_id, title, description, document_ref, due_date, created_at";

fn lesson_from_row(r: &Row<'_>) -> rusqlite::Result<Lesson> {
    Ok(Lesson {
        id: r.get(0)?,
        classroom_id: r.get(1)?,
        title: r.get(2)?,
        description: r.get(3)?,
        video_ref: r.get(4)?,
        notes_ref: r.get(5)?,
        order: r.get(6)?,
        created_at: r.get(7)?,
    })
}

fn assignment_from_row(r: &Row<'_>) -> rusqlite::Result<Assignment> {
    Ok(Assignment {
        id: r.get(0)?,
        classroom_id: r.get(1)?,
        lesson_id: r.get(2)?,
        title: r.get(3)?,
        description: r.get(4)?,
        document_ref: r.get(5)?,
        due_date: r.get(6)?,
        created_at: r.get(7)?,
    })
}

fn clean_title(title: &str) -> CoreResult<String> {
    let t = title.trim();
    if t.is_empty() {
        return Err(CoreError::invalid("title must not be empty"));
    }
    Ok(t.to_string())
}

/// Normalizes an RFC 3339 timestamp to UTC so stored dates compare as text.
pub fn normalize_due_date(raw: &str) -> CoreResult<String> {
    let parsed = DateTime::parse_from_rfc3339(raw.trim())
        .map_err(|_| CoreError::invalid("dueDate must be an RFC 3339 timestamp"))?;
    Ok(parsed
        .with_timezone(&Utc)
        .to_rfc3339_opts(SecondsFormat::Micros, true))
}

fn clean_due_date(raw: Option<&str>) -> CoreResult<Option<String>> {
    clean_opt(raw).map(|s| normalize_due_date(&s)).transpose()
}

pub(crate) fn load_lesson(conn: &Connection, lesson_id: &str) -> CoreResult<Lesson> {
    conn.query_row(
        &format!("SELECT {LESSON_COLS} FROM lessons WHERE id = ?"),
        [lesson_id],
        lesson_from_row,
    )
    .optional()?
    .ok_or(CoreError::NotFound("lesson"))
}

pub(crate) fn load_assignment(conn: &Connection, assignment_id: &str) -> CoreResult<Assignment> {
    conn.query_row(
        &format!("SELECT {ASSIGNMENT_COLS} FROM assignments WHERE id = ?"),
        [assignment_id],
        assignment_from_row,
    )
    .optional()?
    .ok_or(CoreError::NotFound("assignment"))
}

/// Lessons in display order: `order`, then creation time, then id.
pub(crate) fn load_lessons(conn: &Connection, classroom_id: &str) -> CoreResult<Vec<Lesson>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {LESSON_COLS} FROM lessons
         WHERE classroom_id = ?
         ORDER BY sort_order, created_at, id"
    ))?;
    let rows = stmt
        .query_map([classroom_id], lesson_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub(crate) fn load_assignments(conn: &Connection, classroom_id: &str) -> CoreResult<Vec<Assignment>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ASSIGNMENT_COLS} FROM assignments
         WHERE classroom_id = ?
         ORDER BY due_date IS NULL, due_date, created_at, id"
    ))?;
    let rows = stmt
        .query_map([classroom_id], assignment_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// A linked lesson must exist and live in the same classroom.
fn check_lesson_link(conn: &Connection, classroom_id: &str, lesson_id: &str) -> CoreResult<()> {
    let lesson = load_lesson(conn, lesson_id)?;
    if lesson.classroom_id != classroom_id {
        return Err(CoreError::invalid(
            "linked lesson belongs to a different classroom",
        ));
    }
    Ok(())
}

pub fn create_lesson(
    conn: &Connection,
    actor: &Actor,
    classroom_id: &str,
    new: NewLesson,
) -> CoreResult<Lesson> {
    let title = clean_title(&new.title)?;
    let tx = db::write_tx(conn)?;
    actor.require_owner(&classroom_teacher(&tx, classroom_id)?)?;

    let order = match new.order {
        Some(o) => o,
        None => tx.query_row(
            "SELECT COALESCE(MAX(sort_order) + 1, 0) FROM lessons WHERE classroom_id = ?",
            [classroom_id],
            |r| r.get(0),
        )?,
    };
    let lesson = Lesson {
        id: Uuid::new_v4().to_string(),
        classroom_id: classroom_id.to_string(),
        title,
        description: clean_opt(new.description.as_deref()),
        video_ref: clean_opt(new.video_ref.as_deref()),
        notes_ref: clean_opt(new.notes_ref.as_deref()),
        order,
        created_at: db::now_ts(),
    };
    tx.execute(
        &format!("INSERT INTO lessons({LESSON_COLS}) VALUES(?, ?, ?, ?, ?, ?, ?, ?)"),
        (
            &lesson.id,
            &lesson.classroom_id,
            &lesson.title,
            &lesson.description,
            &lesson.video_ref,
            &lesson.notes_ref,
            lesson.order,
            &lesson.created_at,
        ),
    )?;
    tx.commit()?;
    info!(lesson_id = %lesson.id, classroom_id, "lesson created");
    Ok(lesson)
}

pub fn update_lesson(
    conn: &Connection,
    actor: &Actor,
    lesson_id: &str,
    patch: LessonPatch,
) -> CoreResult<Lesson> {
    let tx = db::write_tx(conn)?;
    let mut lesson = load_lesson(&tx, lesson_id)?;
    actor.require_owner(&classroom_teacher(&tx, &lesson.classroom_id)?)?;

    if let Some(title) = patch.title {
        lesson.title = clean_title(&title)?;
    }
    if let Some(v) = patch.description {
        lesson.description = clean_opt(v.as_deref());
    }
    if let Some(v) = patch.video_ref {
        lesson.video_ref = clean_opt(v.as_deref());
    }
    if let Some(v) = patch.notes_ref {
        lesson.notes_ref = clean_opt(v.as_deref());
    }
    if let Some(o) = patch.order {
        lesson.order = o;
    }
    tx.execute(
        "UPDATE lessons
         SET title = ?, description = ?, video_ref = ?, notes_ref = ?, sort_order = ?
         WHERE id = ?",
        (
            &lesson.title,
            &lesson.description,
            &lesson.video_ref,
            &lesson.notes_ref,
            lesson.order,
            lesson_id,
        ),
    )?;
    tx.commit()?;
    Ok(lesson)
}

/// Deletes a lesson. Assignments linked to it are kept with their link
/// nulled; watch progress for the lesson goes with it.
pub fn delete_lesson(conn: &Connection, actor: &Actor, lesson_id: &str) -> CoreResult<()> {
    let tx = db::write_tx(conn)?;
    let lesson = load_lesson(&tx, lesson_id)?;
    actor.require_owner(&classroom_teacher(&tx, &lesson.classroom_id)?)?;

    let unlinked = tx.execute(
        "UPDATE assignments SET lesson_id = NULL WHERE lesson_id = ?",
        [lesson_id],
    )?;
    tx.execute("DELETE FROM video_progress WHERE lesson_id = ?", [lesson_id])?;
    tx.execute("DELETE FROM lessons WHERE id = ?", [lesson_id])?;
    tx.commit()?;
    info!(lesson_id, unlinked, "lesson deleted");
    Ok(())
}

pub fn list_lessons(conn: &Connection, actor: &Actor, classroom_id: &str) -> CoreResult<Vec<Lesson>> {
    require_member(conn, actor, classroom_id)?;
    load_lessons(conn, classroom_id)
}

pub fn get_lesson(conn: &Connection, actor: &Actor, lesson_id: &str) -> CoreResult<Lesson> {
    let lesson = load_lesson(conn, lesson_id)?;
    require_member(conn, actor, &lesson.classroom_id)?;
    Ok(lesson)
}

pub fn create_assignment(
    conn: &Connection,
    actor: &Actor,
    classroom_id: &str,
    new: NewAssignment,
) -> CoreResult<Assignment> {
    let title = clean_title(&new.title)?;
    let due_date = clean_due_date(new.due_date.as_deref())?;
    let lesson_id = clean_opt(new.lesson_id.as_deref());

    let tx = db::write_tx(conn)?;
    actor.require_owner(&classroom_teacher(&tx, classroom_id)?)?;
    if let Some(lid) = &lesson_id {
        check_lesson_link(&tx, classroom_id, lid)?;
    }

    let assignment = Assignment {
        id: Uuid::new_v4().to_string(),
        classroom_id: classroom_id.to_string(),
        lesson_id,
        title,
        description: new.description.trim().to_string(),
        document_ref: clean_opt(new.document_ref.as_deref()),
        due_date,
        created_at: db::now_ts(),
    };
    tx.execute(
        &format!("INSERT INTO assignments({ASSIGNMENT_COLS}) VALUES(?, ?, ?, ?, ?, ?, ?, ?)"),
        (
            &assignment.id,
            &assignment.classroom_id,
            &assignment.lesson_id,
            &assignment.title,
            &assignment.description,
            &assignment.document_ref,
            &assignment.due_date,
            &assignment.created_at,
        ),
    )?;
    tx.commit()?;
    info!(assignment_id = %assignment.id, classroom_id, "assignment created");
    Ok(assignment)
}

pub fn update_assignment(
    conn: &Connection,
    actor: &Actor,
    assignment_id: &str,
    patch: AssignmentPatch,
) -> CoreResult<Assignment> {
    let tx = db::write_tx(conn)?;
    let mut a = load_assignment(&tx, assignment_id)?;
    actor.require_owner(&classroom_teacher(&tx, &a.classroom_id)?)?;

    if let Some(title) = patch.title {
        a.title = clean_title(&title)?;
    }
    if let Some(desc) = patch.description {
        a.description = desc.trim().to_string();
    }
    if let Some(v) = patch.document_ref {
        a.document_ref = clean_opt(v.as_deref());
    }
    if let Some(v) = patch.due_date {
        a.due_date = clean_due_date(v.as_deref())?;
    }
    if let Some(v) = patch.lesson_id {
        let lesson_id = clean_opt(v.as_deref());
        if let Some(lid) = &lesson_id {
            check_lesson_link(&tx, &a.classroom_id, lid)?;
        }
        a.lesson_id = lesson_id;
    }
    tx.execute(
        "UPDATE assignments
         SET lesson_id = ?, title = ?, description = ?, document_ref = ?, due_date = ?
         WHERE id = ?",
        (
            &a.lesson_id,
            &a.title,
            &a.description,
            &a.document_ref,
            &a.due_date,
            assignment_id,
        ),
    )?;
    tx.commit()?;
    Ok(a)
}

pub fn delete_assignment(conn: &Connection, actor: &Actor, assignment_id: &str) -> CoreResult<()> {
    let tx = db::write_tx(conn)?;
    let a = load_assignment(&tx, assignment_id)?;
    actor.require_owner(&classroom_teacher(&tx, &a.classroom_id)?)?;
    let dropped = tx.execute(
        "DELETE FROM submissions WHERE assignment_id = ?",
        [assignment_id],
    )?;
    tx.execute("DELETE FROM assignments WHERE id = ?", [assignment_id])?;
    tx.commit()?;
    info!(assignment_id, submissions = dropped, "assignment deleted");
    Ok(())
}

pub fn list_assignments(
    conn: &Connection,
    actor: &Actor,
    classroom_id: &str,
) -> CoreResult<Vec<Assignment>> {
    require_member(conn, actor, classroom_id)?;
    load_assignments(conn, classroom_id)
}
