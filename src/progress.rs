use crate::catalog::load_lesson;
use crate::classroom::{classroom_teacher, is_enrolled, require_member};
use crate::config::ProgressSetup;
use crate::db;
use crate::error::{CoreError, CoreResult};
use crate::identity::Actor;
use rusqlite::{Connection, OptionalExtension, Row};
use serde::Serialize;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoProgress {
    pub student_id: String,
    pub lesson_id: String,
    pub watched_duration_seconds: f64,
    pub total_duration_seconds: f64,
    pub is_completed: bool,
    pub last_watched_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MergedProgress {
    pub watched: f64,
    pub completed: bool,
}

/// Folds an incoming playback report into the stored state. Watched time
/// never decreases and completion never reverts; the total always takes the
/// incoming value since the source media may have changed.
pub fn merge_report(
    prior: Option<MergedProgress>,
    watched: f64,
    total: f64,
    threshold: f64,
) -> MergedProgress {
    let (prior_watched, prior_completed) = prior
        .map(|p| (p.watched, p.completed))
        .unwrap_or((0.0, false));
    let watched = prior_watched.max(watched);
    let reached = total > 0.0 && watched / total >= threshold;
    MergedProgress {
        watched,
        completed: prior_completed || reached,
    }
}

fn validate_durations(watched: f64, total: f64) -> CoreResult<()> {
    if !watched.is_finite() || watched < 0.0 {
        return Err(CoreError::invalid(
            "watchedDurationSeconds must be a non-negative number",
        ));
    }
    if !total.is_finite() || total <= 0.0 {
        return Err(CoreError::invalid(
            "totalDurationSeconds must be a positive number",
        ));
    }
    Ok(())
}

const PROGRESS_COLS: &str =
    "student_id, lesson_id, watched_seconds, total_seconds, is_completed, last_watched_at";

fn progress_from_row(r: &Row<'_>) -> rusqlite::Result<VideoProgress> {
    Ok(VideoProgress {
        student_id: r.get(0)?,
        lesson_id: r.get(1)?,
        watched_duration_seconds: r.get(2)?,
        total_duration_seconds: r.get(3)?,
        is_completed: r.get::<_, i64>(4)? != 0,
        last_watched_at: r.get(5)?,
    })
}

fn find_progress(
    conn: &Connection,
    student_id: &str,
    lesson_id: &str,
) -> CoreResult<Option<VideoProgress>> {
    Ok(conn
        .query_row(
            &format!("SELECT {PROGRESS_COLS} FROM video_progress WHERE student_id = ? AND lesson_id = ?"),
            (student_id, lesson_id),
            progress_from_row,
        )
        .optional()?)
}

/// All progress rows for lessons of one classroom.
pub(crate) fn load_classroom_progress(
    conn: &Connection,
    classroom_id: &str,
) -> CoreResult<Vec<VideoProgress>> {
    let mut stmt = conn.prepare(
        "SELECT vp.student_id, vp.lesson_id, vp.watched_seconds, vp.total_seconds,
                vp.is_completed, vp.last_watched_at
         FROM video_progress vp
         JOIN lessons l ON l.id = vp.lesson_id
         WHERE l.classroom_id = ?
         ORDER BY vp.student_id, l.sort_order, l.created_at",
    )?;
    let rows = stmt
        .query_map([classroom_id], progress_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Records watch progress for the calling student.
pub fn report_progress(
    conn: &Connection,
    setup: &ProgressSetup,
    actor: &Actor,
    lesson_id: &str,
    watched_duration_seconds: f64,
    total_duration_seconds: f64,
) -> CoreResult<VideoProgress> {
    validate_durations(watched_duration_seconds, total_duration_seconds)?;

    let tx = db::write_tx(conn)?;
    let lesson = load_lesson(&tx, lesson_id)?;
    if !is_enrolled(&tx, &lesson.classroom_id, &actor.id)? {
        return Err(CoreError::NotFound("enrollment"));
    }

    let prior = find_progress(&tx, &actor.id, lesson_id)?;
    let merged = merge_report(
        prior.as_ref().map(|p| MergedProgress {
            watched: p.watched_duration_seconds,
            completed: p.is_completed,
        }),
        watched_duration_seconds,
        total_duration_seconds,
        setup.completion_threshold,
    );
    let now = db::now_ts();
    tx.execute(
        &format!(
            "INSERT INTO video_progress({PROGRESS_COLS}) VALUES(?, ?, ?, ?, ?, ?)
             ON CONFLICT(student_id, lesson_id) DO UPDATE SET
               watched_seconds = excluded.watched_seconds,
               total_seconds = excluded.total_seconds,
               is_completed = excluded.is_completed,
               last_watched_at = excluded.last_watched_at"
        ),
        (
            &actor.id,
            lesson_id,
            merged.watched,
            total_duration_seconds,
            merged.completed as i64,
            &now,
        ),
    )?;
    tx.commit()?;

    let was_completed = prior.map(|p| p.is_completed).unwrap_or(false);
    if merged.completed && !was_completed {
        info!(lesson_id, student_id = %actor.id, "video completed");
    }
    Ok(VideoProgress {
        student_id: actor.id.clone(),
        lesson_id: lesson_id.to_string(),
        watched_duration_seconds: merged.watched,
        total_duration_seconds,
        is_completed: merged.completed,
        last_watched_at: now,
    })
}

/// The caller's own progress on a lesson, if they have started it.
pub fn get_progress(
    conn: &Connection,
    actor: &Actor,
    lesson_id: &str,
) -> CoreResult<Option<VideoProgress>> {
    let lesson = load_lesson(conn, lesson_id)?;
    require_member(conn, actor, &lesson.classroom_id)?;
    find_progress(conn, &actor.id, lesson_id)
}

/// Owners see every student's rows; students see only their own.
pub fn list_progress(
    conn: &Connection,
    actor: &Actor,
    classroom_id: &str,
) -> CoreResult<Vec<VideoProgress>> {
    require_member(conn, actor, classroom_id)?;
    let rows = load_classroom_progress(conn, classroom_id)?;
    if actor.owns(&classroom_teacher(conn, classroom_id)?) {
        return Ok(rows);
    }
    Ok(rows.into_iter().filter(|p| p.student_id == actor.id).collect())
}
