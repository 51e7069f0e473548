//! Read-side completion statistics. Everything here is a pure function of a
//! [`ClassroomSnapshot`]; the snapshot itself is loaded inside one read
//! transaction so the numbers are mutually consistent, but it may lag
//! concurrent writers.

use crate::catalog::{load_lessons, Lesson};
use crate::classroom::{classroom_teacher, Enrollment};
use crate::db;
use crate::error::{CoreError, CoreResult};
use crate::identity::{Actor, Role};
use crate::progress::{load_classroom_progress, VideoProgress};
use rusqlite::Connection;
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct ClassroomSnapshot {
    pub classroom_id: String,
    pub students: Vec<Enrollment>,
    pub lessons: Vec<Lesson>,
    pub progress: Vec<VideoProgress>,
    pub assignment_count: usize,
    /// (student id, grade) for every stored submission.
    pub submissions: Vec<(String, Option<i64>)>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LessonProgressRow {
    pub lesson_id: String,
    pub title: String,
    pub started: bool,
    pub progress_percentage: i64,
    pub is_completed: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StudentStats {
    pub student_id: String,
    pub display_name: Option<String>,
    pub completed_videos: usize,
    pub total_videos: usize,
    pub completion_percentage: i64,
    pub average_progress: i64,
    pub total_assignments: usize,
    pub submitted_assignments: usize,
    pub graded_assignments: usize,
    pub average_grade: Option<i64>,
    pub lessons: Vec<LessonProgressRow>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LessonSummary {
    pub lesson_id: String,
    pub title: String,
    pub started_count: usize,
    pub completed_count: usize,
    pub average_progress: i64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClassroomStats {
    pub classroom_id: String,
    pub student_count: usize,
    pub total_videos: usize,
    pub total_assignments: usize,
    pub average_completion: i64,
    pub average_progress: i64,
    pub students: Vec<StudentStats>,
    pub lessons: Vec<LessonSummary>,
}

fn round_pct(x: f64) -> i64 {
    if x.is_nan() {
        return 0;
    }
    x.clamp(0.0, 100.0).round() as i64
}

/// `round(100 * watched / total)`, clamped to 0..=100. Replays can push
/// watched time past the media length.
pub fn progress_percentage(watched: f64, total: f64) -> i64 {
    if !(total > 0.0) {
        return 0;
    }
    round_pct(100.0 * watched / total)
}

/// `round(100 * completed / total)`, 0 when there are no videos.
pub fn completion_percentage(completed: usize, total: usize) -> i64 {
    if total == 0 {
        return 0;
    }
    round_pct(100.0 * completed as f64 / total as f64)
}

fn mean_rounded<I: IntoIterator<Item = i64>>(values: I) -> Option<i64> {
    let (sum, n) = values
        .into_iter()
        .fold((0i64, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 {
        None
    } else {
        Some((sum as f64 / n as f64).round() as i64)
    }
}

fn video_lessons(snapshot: &ClassroomSnapshot) -> Vec<&Lesson> {
    snapshot
        .lessons
        .iter()
        .filter(|l| l.video_ref.is_some())
        .collect()
}

type ProgressIndex<'a> = HashMap<(&'a str, &'a str), &'a VideoProgress>;

fn index_progress(snapshot: &ClassroomSnapshot) -> ProgressIndex<'_> {
    snapshot
        .progress
        .iter()
        .map(|p| ((p.student_id.as_str(), p.lesson_id.as_str()), p))
        .collect()
}

fn student_stats_from(
    snapshot: &ClassroomSnapshot,
    videos: &[&Lesson],
    index: &ProgressIndex<'_>,
    student: &Enrollment,
) -> StudentStats {
    let sid = student.student_id.as_str();
    let lessons: Vec<LessonProgressRow> = videos
        .iter()
        .map(|l| match index.get(&(sid, l.id.as_str())) {
            Some(p) => LessonProgressRow {
                lesson_id: l.id.clone(),
                title: l.title.clone(),
                started: true,
                progress_percentage: progress_percentage(
                    p.watched_duration_seconds,
                    p.total_duration_seconds,
                ),
                is_completed: p.is_completed,
            },
            None => LessonProgressRow {
                lesson_id: l.id.clone(),
                title: l.title.clone(),
                started: false,
                progress_percentage: 0,
                is_completed: false,
            },
        })
        .collect();

    let completed_videos = lessons.iter().filter(|r| r.is_completed).count();
    let total_videos = videos.len();

    let mine: Vec<Option<i64>> = snapshot
        .submissions
        .iter()
        .filter(|(s, _)| s == sid)
        .map(|(_, g)| *g)
        .collect();
    let grades: Vec<i64> = mine.iter().flatten().copied().collect();

    StudentStats {
        student_id: student.student_id.clone(),
        display_name: student.display_name.clone(),
        completed_videos,
        total_videos,
        completion_percentage: completion_percentage(completed_videos, total_videos),
        average_progress: mean_rounded(lessons.iter().map(|r| r.progress_percentage))
            .unwrap_or(0),
        total_assignments: snapshot.assignment_count,
        submitted_assignments: mine.len(),
        graded_assignments: grades.len(),
        average_grade: mean_rounded(grades),
        lessons,
    }
}

pub fn compute_student_stats(snapshot: &ClassroomSnapshot, student_id: &str) -> Option<StudentStats> {
    let student = snapshot
        .students
        .iter()
        .find(|s| s.student_id == student_id)?;
    let videos = video_lessons(snapshot);
    let index = index_progress(snapshot);
    Some(student_stats_from(snapshot, &videos, &index, student))
}

pub fn compute_classroom_stats(snapshot: &ClassroomSnapshot) -> ClassroomStats {
    let videos = video_lessons(snapshot);
    let index = index_progress(snapshot);

    let students: Vec<StudentStats> = snapshot
        .students
        .iter()
        .map(|s| student_stats_from(snapshot, &videos, &index, s))
        .collect();

    let lessons = videos
        .iter()
        .map(|l| {
            let rows: Vec<&VideoProgress> = snapshot
                .students
                .iter()
                .filter_map(|s| index.get(&(s.student_id.as_str(), l.id.as_str())).copied())
                .collect();
            LessonSummary {
                lesson_id: l.id.clone(),
                title: l.title.clone(),
                started_count: rows.len(),
                completed_count: rows.iter().filter(|p| p.is_completed).count(),
                // Students who never started count as 0%.
                average_progress: mean_rounded(snapshot.students.iter().map(|s| {
                    index
                        .get(&(s.student_id.as_str(), l.id.as_str()))
                        .map(|p| {
                            progress_percentage(p.watched_duration_seconds, p.total_duration_seconds)
                        })
                        .unwrap_or(0)
                }))
                .unwrap_or(0),
            }
        })
        .collect();

    ClassroomStats {
        classroom_id: snapshot.classroom_id.clone(),
        student_count: students.len(),
        total_videos: videos.len(),
        total_assignments: snapshot.assignment_count,
        average_completion: mean_rounded(students.iter().map(|s| s.completion_percentage))
            .unwrap_or(0),
        average_progress: mean_rounded(students.iter().map(|s| s.average_progress)).unwrap_or(0),
        students,
        lessons,
    }
}

pub fn load_snapshot(conn: &Connection, classroom_id: &str) -> CoreResult<ClassroomSnapshot> {
    let tx = db::read_tx(conn)?;
    classroom_teacher(&tx, classroom_id)?;

    let students = {
        let mut stmt = tx.prepare(
            "SELECT student_id, display_name, enrolled_at
             FROM enrollments
             WHERE classroom_id = ?
             ORDER BY enrolled_at, student_id",
        )?;
        let rows = stmt
            .query_map([classroom_id], |r| {
                Ok(Enrollment {
                    student_id: r.get(0)?,
                    display_name: r.get(1)?,
                    enrolled_at: r.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        rows
    };
    let lessons = load_lessons(&tx, classroom_id)?;
    let progress = load_classroom_progress(&tx, classroom_id)?;
    let assignment_count: i64 = tx.query_row(
        "SELECT COUNT(*) FROM assignments WHERE classroom_id = ?",
        [classroom_id],
        |r| r.get(0),
    )?;
    let submissions = {
        let mut stmt = tx.prepare(
            "SELECT s.student_id, s.grade
             FROM submissions s
             JOIN assignments a ON a.id = s.assignment_id
             WHERE a.classroom_id = ?",
        )?;
        let rows = stmt
            .query_map([classroom_id], |r| Ok((r.get(0)?, r.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        rows
    };
    tx.commit()?;

    Ok(ClassroomSnapshot {
        classroom_id: classroom_id.to_string(),
        students,
        lessons,
        progress,
        assignment_count: assignment_count as usize,
        submissions,
    })
}

/// Classroom-wide analytics; owner or admin only.
pub fn classroom_stats(conn: &Connection, actor: &Actor, classroom_id: &str) -> CoreResult<ClassroomStats> {
    actor.require_owner(&classroom_teacher(conn, classroom_id)?)?;
    Ok(compute_classroom_stats(&load_snapshot(conn, classroom_id)?))
}

/// One student's numbers. Students may only ask about themselves; when
/// `student_id` is omitted the caller's own id is used.
pub fn student_stats(
    conn: &Connection,
    actor: &Actor,
    classroom_id: &str,
    student_id: Option<&str>,
) -> CoreResult<StudentStats> {
    let teacher_id = classroom_teacher(conn, classroom_id)?;
    let target = student_id.unwrap_or(&actor.id);
    let is_self = actor.role == Role::Student && actor.id == target;
    if !is_self {
        actor.require_owner(&teacher_id)?;
    }
    let snapshot = load_snapshot(conn, classroom_id)?;
    compute_student_stats(&snapshot, target).ok_or(CoreError::NotFound("enrollment"))
}
