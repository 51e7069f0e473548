use crate::config::ClassroomSetup;
use crate::db;
use crate::error::{CoreError, CoreResult};
use crate::identity::{Actor, Role};
use rand::Rng;
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

pub const PIN_LEN: usize = 6;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Classroom {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub teacher_id: String,
    pub pin: String,
    pub student_ids: Vec<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Enrollment {
    pub student_id: String,
    pub display_name: Option<String>,
    pub enrolled_at: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinOutcome {
    pub classroom: Classroom,
    /// Set when the student was already a member; the join was a no-op.
    pub already_enrolled: bool,
}

pub fn generate_pin<R: Rng + ?Sized>(rng: &mut R, space: u32) -> String {
    let n = rng.gen_range(0..space.max(1));
    format!("{:06}", n)
}

pub fn is_valid_pin(pin: &str) -> bool {
    pin.len() == PIN_LEN && pin.bytes().all(|b| b.is_ascii_digit())
}

fn pin_in_use(conn: &Connection, pin: &str) -> CoreResult<bool> {
    let hit: Option<i64> = conn
        .query_row("SELECT 1 FROM classrooms WHERE pin = ?", [pin], |r| r.get(0))
        .optional()?;
    Ok(hit.is_some())
}

/// Draws PINs until one is free. Must run inside a write transaction so the
/// check and the following insert/update see no interleaved writer.
fn allocate_pin(conn: &Connection, setup: &ClassroomSetup) -> CoreResult<String> {
    let mut rng = rand::thread_rng();
    for _ in 0..setup.pin_max_attempts {
        let candidate = generate_pin(&mut rng, setup.pin_space);
        if !pin_in_use(conn, &candidate)? {
            return Ok(candidate);
        }
    }
    warn!(
        attempts = setup.pin_max_attempts,
        pin_space = setup.pin_space,
        "pin allocation exhausted"
    );
    Err(CoreError::ResourceExhausted(format!(
        "no free classroom PIN after {} attempts",
        setup.pin_max_attempts
    )))
}

fn clean_name(name: &str) -> CoreResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(CoreError::invalid("name must not be empty"));
    }
    Ok(name.to_string())
}

pub(crate) fn clean_opt(v: Option<&str>) -> Option<String> {
    v.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}

fn load_student_ids(conn: &Connection, classroom_id: &str) -> CoreResult<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT student_id FROM enrollments WHERE classroom_id = ? ORDER BY enrolled_at, student_id",
    )?;
    let ids = stmt
        .query_map([classroom_id], |r| r.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ids)
}

/// Loads a classroom with no access check.
pub(crate) fn load_classroom(conn: &Connection, classroom_id: &str) -> CoreResult<Classroom> {
    let row: Option<(String, Option<String>, String, String, String)> = conn
        .query_row(
            "SELECT name, description, teacher_id, pin, created_at FROM classrooms WHERE id = ?",
            [classroom_id],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?)),
        )
        .optional()?;
    let Some((name, description, teacher_id, pin, created_at)) = row else {
        return Err(CoreError::NotFound("classroom"));
    };
    Ok(Classroom {
        id: classroom_id.to_string(),
        name,
        description,
        teacher_id,
        pin,
        student_ids: load_student_ids(conn, classroom_id)?,
        created_at,
    })
}

pub(crate) fn classroom_teacher(conn: &Connection, classroom_id: &str) -> CoreResult<String> {
    conn.query_row(
        "SELECT teacher_id FROM classrooms WHERE id = ?",
        [classroom_id],
        |r| r.get(0),
    )
    .optional()?
    .ok_or(CoreError::NotFound("classroom"))
}

pub(crate) fn is_enrolled(conn: &Connection, classroom_id: &str, student_id: &str) -> CoreResult<bool> {
    let hit: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM enrollments WHERE classroom_id = ? AND student_id = ?",
            (classroom_id, student_id),
            |r| r.get(0),
        )
        .optional()?;
    Ok(hit.is_some())
}

/// Owner/admin, or a student enrolled in the classroom.
pub(crate) fn require_member(conn: &Connection, actor: &Actor, classroom_id: &str) -> CoreResult<()> {
    let teacher_id = classroom_teacher(conn, classroom_id)?;
    if actor.owns(&teacher_id) {
        return Ok(());
    }
    if actor.role == Role::Student && is_enrolled(conn, classroom_id, &actor.id)? {
        return Ok(());
    }
    Err(CoreError::forbidden("not a member of this classroom"))
}

pub fn create_classroom(
    conn: &Connection,
    setup: &ClassroomSetup,
    actor: &Actor,
    name: &str,
    description: Option<&str>,
) -> CoreResult<Classroom> {
    if !(actor.role == Role::Teacher || actor.is_admin()) {
        return Err(CoreError::forbidden("only teachers can create classrooms"));
    }
    let name = clean_name(name)?;
    let description = clean_opt(description);

    let tx = db::write_tx(conn)?;
    let pin = allocate_pin(&tx, setup)?;
    let id = Uuid::new_v4().to_string();
    let created_at = db::now_ts();
    tx.execute(
        "INSERT INTO classrooms(id, name, description, teacher_id, pin, created_at)
         VALUES(?, ?, ?, ?, ?, ?)",
        (&id, &name, &description, &actor.id, &pin, &created_at),
    )?;
    tx.commit()?;

    info!(classroom_id = %id, teacher_id = %actor.id, "classroom created");
    Ok(Classroom {
        id,
        name,
        description,
        teacher_id: actor.id.clone(),
        pin,
        student_ids: Vec::new(),
        created_at,
    })
}

pub fn get_classroom(conn: &Connection, actor: &Actor, classroom_id: &str) -> CoreResult<Classroom> {
    require_member(conn, actor, classroom_id)?;
    load_classroom(conn, classroom_id)
}

pub fn list_classrooms(conn: &Connection, actor: &Actor) -> CoreResult<Vec<Classroom>> {
    let tx = db::read_tx(conn)?;
    let ids: Vec<String> = match actor.role {
        Role::Admin => {
            let mut stmt = tx.prepare("SELECT id FROM classrooms ORDER BY created_at, id")?;
            let rows = stmt
                .query_map([], |r| r.get(0))?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        }
        Role::Teacher => {
            let mut stmt = tx.prepare(
                "SELECT id FROM classrooms WHERE teacher_id = ? ORDER BY created_at, id",
            )?;
            let rows = stmt
                .query_map([&actor.id], |r| r.get(0))?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        }
        Role::Student => {
            let mut stmt = tx.prepare(
                "SELECT c.id FROM classrooms c
                 JOIN enrollments e ON e.classroom_id = c.id
                 WHERE e.student_id = ?
                 ORDER BY c.created_at, c.id",
            )?;
            let rows = stmt
                .query_map([&actor.id], |r| r.get(0))?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        }
    };
    let out = ids
        .iter()
        .map(|id| load_classroom(&tx, id))
        .collect::<CoreResult<Vec<_>>>()?;
    tx.commit()?;
    Ok(out)
}

/// Renames a classroom. `description` of `None` leaves it unchanged; `Some(None)` clears it.
pub fn rename_classroom(
    conn: &Connection,
    actor: &Actor,
    classroom_id: &str,
    name: &str,
    description: Option<Option<&str>>,
) -> CoreResult<Classroom> {
    let name = clean_name(name)?;
    let tx = db::write_tx(conn)?;
    actor.require_owner(&classroom_teacher(&tx, classroom_id)?)?;
    tx.execute(
        "UPDATE classrooms SET name = ? WHERE id = ?",
        (&name, classroom_id),
    )?;
    if let Some(desc) = description {
        tx.execute(
            "UPDATE classrooms SET description = ? WHERE id = ?",
            (clean_opt(desc), classroom_id),
        )?;
    }
    let out = load_classroom(&tx, classroom_id)?;
    tx.commit()?;
    Ok(out)
}

pub fn regenerate_pin(
    conn: &Connection,
    setup: &ClassroomSetup,
    actor: &Actor,
    classroom_id: &str,
) -> CoreResult<Classroom> {
    let tx = db::write_tx(conn)?;
    actor.require_owner(&classroom_teacher(&tx, classroom_id)?)?;
    let pin = allocate_pin(&tx, setup)?;
    tx.execute(
        "UPDATE classrooms SET pin = ? WHERE id = ?",
        (&pin, classroom_id),
    )?;
    let out = load_classroom(&tx, classroom_id)?;
    tx.commit()?;
    info!(classroom_id, "classroom pin regenerated");
    Ok(out)
}

pub fn join_by_pin(conn: &Connection, actor: &Actor, pin: &str) -> CoreResult<JoinOutcome> {
    actor.require_role(Role::Student, "join a classroom")?;
    let pin = pin.trim();
    if !is_valid_pin(pin) {
        return Err(CoreError::invalid("pin must be 6 digits"));
    }

    let tx = db::write_tx(conn)?;
    let classroom_id: Option<String> = tx
        .query_row("SELECT id FROM classrooms WHERE pin = ?", [pin], |r| r.get(0))
        .optional()?;
    let Some(classroom_id) = classroom_id else {
        return Err(CoreError::NotFound("classroom"));
    };

    let inserted = tx.execute(
        "INSERT OR IGNORE INTO enrollments(classroom_id, student_id, display_name, enrolled_at)
         VALUES(?, ?, ?, ?)",
        (&classroom_id, &actor.id, &actor.display_name, db::now_ts()),
    )?;
    let classroom = load_classroom(&tx, &classroom_id)?;
    tx.commit()?;

    let already_enrolled = inserted == 0;
    if !already_enrolled {
        info!(classroom_id = %classroom.id, student_id = %actor.id, "student enrolled");
    }
    Ok(JoinOutcome {
        classroom,
        already_enrolled,
    })
}

/// Removes a student together with their submissions and watch progress in
/// this classroom. Students may only remove themselves.
pub fn unenroll(
    conn: &Connection,
    actor: &Actor,
    classroom_id: &str,
    student_id: &str,
) -> CoreResult<()> {
    let tx = db::write_tx(conn)?;
    let teacher_id = classroom_teacher(&tx, classroom_id)?;
    let is_self = actor.role == Role::Student && actor.id == student_id;
    if !is_self {
        actor.require_owner(&teacher_id)?;
    }
    if !is_enrolled(&tx, classroom_id, student_id)? {
        return Err(CoreError::NotFound("enrollment"));
    }

    tx.execute(
        "DELETE FROM submissions
         WHERE student_id = ?1
           AND assignment_id IN (SELECT id FROM assignments WHERE classroom_id = ?2)",
        (student_id, classroom_id),
    )?;
    tx.execute(
        "DELETE FROM video_progress
         WHERE student_id = ?1
           AND lesson_id IN (SELECT id FROM lessons WHERE classroom_id = ?2)",
        (student_id, classroom_id),
    )?;
    tx.execute(
        "DELETE FROM enrollments WHERE classroom_id = ? AND student_id = ?",
        (classroom_id, student_id),
    )?;
    tx.commit()?;
    info!(classroom_id, student_id, "student unenrolled");
    Ok(())
}

pub fn list_students(conn: &Connection, actor: &Actor, classroom_id: &str) -> CoreResult<Vec<Enrollment>> {
    require_member(conn, actor, classroom_id)?;
    let mut stmt = conn.prepare(
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
    Ok(rows)
}

pub fn delete_classroom(conn: &Connection, actor: &Actor, classroom_id: &str) -> CoreResult<()> {
    let tx = db::write_tx(conn)?;
    actor.require_owner(&classroom_teacher(&tx, classroom_id)?)?;

    // Dependency order; there is no ON DELETE CASCADE.
    tx.execute(
        "DELETE FROM video_progress
         WHERE lesson_id IN (SELECT id FROM lessons WHERE classroom_id = ?)",
        [classroom_id],
    )?;
    tx.execute(
        "DELETE FROM submissions
         WHERE assignment_id IN (SELECT id FROM assignments WHERE classroom_id = ?)",
        [classroom_id],
    )?;
    tx.execute("DELETE FROM assignments WHERE classroom_id = ?", [classroom_id])?;
    tx.execute("DELETE FROM lessons WHERE classroom_id = ?", [classroom_id])?;
    tx.execute("DELETE FROM enrollments WHERE classroom_id = ?", [classroom_id])?;
    tx.execute("DELETE FROM classrooms WHERE id = ?", [classroom_id])?;
    tx.commit()?;

    info!(classroom_id, requester = %actor.id, "classroom deleted");
    Ok(())
}
