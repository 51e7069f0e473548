use crate::catalog::load_assignment;
use crate::classroom::{classroom_teacher, clean_opt, is_enrolled, require_member};
use crate::db;
use crate::error::{CoreError, CoreResult};
use crate::identity::{Actor, Role};
use rusqlite::{Connection, OptionalExtension, Row};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info};
use uuid::Uuid;

pub const MIN_GRADE: i64 = 0;
pub const MAX_GRADE: i64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionStatus {
    Submitted,
    Graded,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub id: String,
    pub assignment_id: String,
    pub student_id: String,
    pub content: Option<String>,
    pub document_ref: Option<String>,
    pub submitted_at: String,
    pub grade: Option<i64>,
    pub feedback: Option<String>,
    pub graded_at: Option<String>,
    /// Bumped on every resubmission; graders pass it back to detect races.
    pub version: i64,
    pub content_hash: String,
    pub status: SubmissionStatus,
    /// Submitted after the assignment's due date.
    pub late: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitOutcome {
    pub submission: Submission,
    pub resubmitted: bool,
    /// False when a resubmission carried byte-identical work. The grade is
    /// cleared either way.
    pub content_changed: bool,
}

const SUBMISSION_SELECT: &str = "SELECT s.id, s.assignment_id, s.student_id, s.content,
        s.document_ref, s.submitted_at, s.grade, s.feedback, s.graded_at, s.version,
        s.content_hash,
        CASE WHEN a.due_date IS NOT NULL AND s.submitted_at > a.due_date THEN 1 ELSE 0 END
     FROM submissions s
     JOIN assignments a ON a.id = s.assignment_id";

fn submission_from_row(r: &Row<'_>) -> rusqlite::Result<Submission> {
    let grade: Option<i64> = r.get(6)?;
    Ok(Submission {
        id: r.get(0)?,
        assignment_id: r.get(1)?,
        student_id: r.get(2)?,
        content: r.get(3)?,
        document_ref: r.get(4)?,
        submitted_at: r.get(5)?,
        grade,
        feedback: r.get(7)?,
        graded_at: r.get(8)?,
        version: r.get(9)?,
        content_hash: r.get(10)?,
        status: if grade.is_some() {
            SubmissionStatus::Graded
        } else {
            SubmissionStatus::Submitted
        },
        late: r.get::<_, i64>(11)? != 0,
    })
}

/// SHA-256 over the submitted artifact (text and document reference).
pub fn content_hash(content: Option<&str>, document_ref: Option<&str>) -> String {
    let mut h = Sha256::new();
    h.update(b"content:");
    h.update(content.unwrap_or_default().as_bytes());
    h.update([0u8]);
    h.update(b"document:");
    h.update(document_ref.unwrap_or_default().as_bytes());
    format!("{:x}", h.finalize())
}

pub(crate) fn load_submission(conn: &Connection, submission_id: &str) -> CoreResult<Submission> {
    conn.query_row(
        &format!("{SUBMISSION_SELECT} WHERE s.id = ?"),
        [submission_id],
        submission_from_row,
    )
    .optional()?
    .ok_or(CoreError::NotFound("submission"))
}

fn find_submission(
    conn: &Connection,
    assignment_id: &str,
    student_id: &str,
) -> CoreResult<Option<Submission>> {
    Ok(conn
        .query_row(
            &format!("{SUBMISSION_SELECT} WHERE s.assignment_id = ? AND s.student_id = ?"),
            (assignment_id, student_id),
            submission_from_row,
        )
        .optional()?)
}

/// Creates or overwrites the caller's submission for an assignment. Any
/// resubmission clears grade, feedback and gradedAt.
pub fn submit(
    conn: &Connection,
    actor: &Actor,
    assignment_id: &str,
    content: Option<&str>,
    document_ref: Option<&str>,
) -> CoreResult<SubmitOutcome> {
    actor.require_role(Role::Student, "submit work")?;
    let content = content
        .filter(|c| !c.trim().is_empty())
        .map(str::to_string);
    let document_ref = clean_opt(document_ref);
    if content.is_none() && document_ref.is_none() {
        return Err(CoreError::invalid(
            "submission needs content or a document",
        ));
    }
    let hash = content_hash(content.as_deref(), document_ref.as_deref());

    let tx = db::write_tx(conn)?;
    let assignment = load_assignment(&tx, assignment_id)?;
    if !is_enrolled(&tx, &assignment.classroom_id, &actor.id)? {
        return Err(CoreError::NotFound("enrollment"));
    }

    let now = db::now_ts();
    let prior: Option<(String, String)> = tx
        .query_row(
            "SELECT id, content_hash FROM submissions WHERE assignment_id = ? AND student_id = ?",
            (assignment_id, &actor.id),
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()?;

    let (submission_id, resubmitted, content_changed) = match prior {
        None => {
            let id = Uuid::new_v4().to_string();
            tx.execute(
                "INSERT INTO submissions(id, assignment_id, student_id, content, document_ref,
                                         submitted_at, version, content_hash)
                 VALUES(?, ?, ?, ?, ?, ?, 1, ?)",
                (
                    &id,
                    assignment_id,
                    &actor.id,
                    &content,
                    &document_ref,
                    &now,
                    &hash,
                ),
            )?;
            (id, false, true)
        }
        Some((id, old_hash)) => {
            tx.execute(
                "UPDATE submissions
                 SET content = ?, document_ref = ?, submitted_at = ?, content_hash = ?,
                     grade = NULL, feedback = NULL, graded_at = NULL,
                     version = version + 1
                 WHERE id = ?",
                (&content, &document_ref, &now, &hash, &id),
            )?;
            (id, true, old_hash != hash)
        }
    };
    let submission = load_submission(&tx, &submission_id)?;
    tx.commit()?;

    info!(
        submission_id = %submission.id,
        assignment_id,
        student_id = %actor.id,
        version = submission.version,
        resubmitted,
        "submission stored"
    );
    Ok(SubmitOutcome {
        submission,
        resubmitted,
        content_changed,
    })
}

/// Grades a submission. With `expected_version`, the grade only lands if no
/// resubmission happened since the grader loaded it.
pub fn grade(
    conn: &Connection,
    actor: &Actor,
    submission_id: &str,
    grade: i64,
    feedback: Option<&str>,
    expected_version: Option<i64>,
) -> CoreResult<Submission> {
    if !(MIN_GRADE..=MAX_GRADE).contains(&grade) {
        return Err(CoreError::invalid(format!(
            "grade must be in {}..={}",
            MIN_GRADE, MAX_GRADE
        )));
    }

    let tx = db::write_tx(conn)?;
    let current = load_submission(&tx, submission_id)?;
    let assignment = load_assignment(&tx, &current.assignment_id)?;
    actor.require_owner(&classroom_teacher(&tx, &assignment.classroom_id)?)?;

    if let Some(expected) = expected_version {
        if expected != current.version {
            debug!(
                submission_id,
                expected,
                current = current.version,
                "grade rejected on stale version"
            );
            return Err(CoreError::Conflict(format!(
                "submission changed (version {} != {}); reload and retry",
                current.version, expected
            )));
        }
    }

    tx.execute(
        "UPDATE submissions SET grade = ?, feedback = ?, graded_at = ? WHERE id = ?",
        (grade, clean_opt(feedback), db::now_ts(), submission_id),
    )?;
    let graded = load_submission(&tx, submission_id)?;
    tx.commit()?;

    info!(submission_id, grade, grader = %actor.id, "submission graded");
    Ok(graded)
}

/// All submissions for an assignment, oldest first.
pub fn list_submissions(
    conn: &Connection,
    actor: &Actor,
    assignment_id: &str,
) -> CoreResult<Vec<Submission>> {
    let assignment = load_assignment(conn, assignment_id)?;
    actor.require_owner(&classroom_teacher(conn, &assignment.classroom_id)?)?;
    let mut stmt = conn.prepare(&format!(
        "{SUBMISSION_SELECT} WHERE s.assignment_id = ? ORDER BY s.submitted_at, s.rowid"
    ))?;
    let rows = stmt
        .query_map([assignment_id], submission_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn get_my_submission(
    conn: &Connection,
    actor: &Actor,
    assignment_id: &str,
) -> CoreResult<Option<Submission>> {
    let assignment = load_assignment(conn, assignment_id)?;
    require_member(conn, actor, &assignment.classroom_id)?;
    find_submission(conn, assignment_id, &actor.id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{create_assignment, NewAssignment};
    use crate::classroom::{create_classroom, join_by_pin};
    use crate::config::ClassroomSetup;
    use crate::db::test_support::{temp_db, temp_dir};

    fn teacher() -> Actor {
        Actor::new("t1", Role::Teacher)
    }

    fn student() -> Actor {
        Actor::new("s1", Role::Student)
    }

    /// Classroom with one enrolled student and one assignment.
    fn fixture(conn: &Connection) -> String {
        let c = create_classroom(conn, &ClassroomSetup::default(), &teacher(), "Math101", None)
            .expect("classroom");
        join_by_pin(conn, &student(), &c.pin).expect("join");
        create_assignment(
            conn,
            &teacher(),
            &c.id,
            NewAssignment {
                title: "Essay".into(),
                description: "Write".into(),
                ..Default::default()
            },
        )
        .expect("assignment")
        .id
    }

    #[test]
    fn hash_separates_content_and_document() {
        assert_ne!(content_hash(Some("ab"), None), content_hash(Some("a"), Some("b")));
        assert_eq!(content_hash(Some("x"), None), content_hash(Some("x"), None));
        assert_eq!(content_hash(None, None).len(), 64);
    }

    #[test]
    fn empty_submission_is_rejected() {
        let conn = temp_db("classroomd-submit-empty");
        let aid = fixture(&conn);
        let err = submit(&conn, &student(), &aid, Some("   "), Some("")).unwrap_err();
        assert_eq!(err.code(), "invalid_argument");
    }

    #[test]
    fn resubmission_overwrites_and_clears_grade() {
        let conn = temp_db("classroomd-resubmit");
        let aid = fixture(&conn);
        let first = submit(&conn, &student(), &aid, Some("draft"), None).expect("submit");
        assert!(!first.resubmitted);
        assert_eq!(first.submission.version, 1);

        let graded = grade(&conn, &teacher(), &first.submission.id, 85, Some("good"), None)
            .expect("grade");
        assert_eq!(graded.grade, Some(85));
        assert_eq!(graded.status, SubmissionStatus::Graded);

        let second = submit(&conn, &student(), &aid, Some("final"), None).expect("resubmit");
        assert!(second.resubmitted);
        assert!(second.content_changed);
        let s = &second.submission;
        assert_eq!(s.id, first.submission.id);
        assert_eq!(s.content.as_deref(), Some("final"));
        assert_eq!((s.grade, s.feedback.as_deref(), s.graded_at.as_deref()), (None, None, None));
        assert_eq!(s.status, SubmissionStatus::Submitted);
        assert_eq!(s.version, 2);
        assert!(s.submitted_at >= first.submission.submitted_at);

        let all = list_submissions(&conn, &teacher(), &aid).expect("list");
        assert_eq!(all.len(), 1);
    }

    #[test]
    fn identical_resubmission_still_clears_grade() {
        let conn = temp_db("classroomd-resubmit-same");
        let aid = fixture(&conn);
        let first = submit(&conn, &student(), &aid, Some("same"), None).expect("submit");
        grade(&conn, &teacher(), &first.submission.id, 70, None, None).expect("grade");
        let again = submit(&conn, &student(), &aid, Some("same"), None).expect("resubmit");
        assert!(!again.content_changed);
        assert_eq!(again.submission.grade, None);
    }

    #[test]
    fn grade_bounds_and_authorization() {
        let conn = temp_db("classroomd-grade-auth");
        let aid = fixture(&conn);
        let s = submit(&conn, &student(), &aid, None, Some("blob://doc")).expect("submit");
        let sid = s.submission.id;
        assert_eq!(
            grade(&conn, &teacher(), &sid, 101, None, None).unwrap_err().code(),
            "invalid_argument"
        );
        assert_eq!(
            grade(&conn, &teacher(), &sid, -1, None, None).unwrap_err().code(),
            "invalid_argument"
        );
        assert_eq!(
            grade(&conn, &Actor::new("t2", Role::Teacher), &sid, 50, None, None)
                .unwrap_err()
                .code(),
            "forbidden"
        );
        assert_eq!(
            grade(&conn, &student(), &sid, 50, None, None).unwrap_err().code(),
            "forbidden"
        );
        let g = grade(&conn, &Actor::new("root", Role::Admin), &sid, 100, None, None)
            .expect("admin grade");
        assert_eq!(g.grade, Some(100));
        // Re-grading overwrites.
        let g = grade(&conn, &teacher(), &sid, 0, Some("redo"), Some(1)).expect("regrade");
        assert_eq!(g.grade, Some(0));
        assert_eq!(g.feedback.as_deref(), Some("redo"));
    }

    #[test]
    fn stale_version_grade_conflicts() {
        let conn = temp_db("classroomd-grade-conflict");
        let aid = fixture(&conn);
        let s = submit(&conn, &student(), &aid, Some("v1"), None).expect("submit");
        let seen_version = s.submission.version;
        submit(&conn, &student(), &aid, Some("v2"), None).expect("resubmit");

        let err = grade(&conn, &teacher(), &s.submission.id, 90, None, Some(seen_version))
            .unwrap_err();
        assert_eq!(err.code(), "conflict");
        let still = load_submission(&conn, &s.submission.id).expect("load");
        assert_eq!(still.grade, None);

        grade(&conn, &teacher(), &s.submission.id, 90, None, Some(seen_version + 1))
            .expect("grade current version");
    }

    #[test]
    fn unenrolled_student_cannot_submit() {
        let conn = temp_db("classroomd-submit-unenrolled");
        let aid = fixture(&conn);
        let err = submit(&conn, &Actor::new("s9", Role::Student), &aid, Some("x"), None)
            .unwrap_err();
        assert_eq!(err.code(), "not_found");
        let err = submit(&conn, &teacher(), &aid, Some("x"), None).unwrap_err();
        assert_eq!(err.code(), "forbidden");
    }

    #[test]
    fn concurrent_resubmissions_keep_one_consistent_record() {
        let ws = temp_dir("classroomd-submit-race");
        let aid = fixture(&db::open_db(&ws).expect("init"));

        std::thread::scope(|s| {
            for i in 0..4 {
                let ws = ws.clone();
                let aid = aid.clone();
                s.spawn(move || {
                    let conn = db::open_db(&ws).expect("open");
                    for j in 0..5 {
                        submit(&conn, &student(), &aid, Some(&format!("w{i}-{j}")), None)
                            .expect("submit");
                    }
                });
            }
        });

        let conn = db::open_db(&ws).expect("reopen");
        let all = list_submissions(&conn, &teacher(), &aid).expect("list");
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].version, 20);
        assert_eq!(
            all[0].content_hash,
            content_hash(all[0].content.as_deref(), None)
        );
    }
}
