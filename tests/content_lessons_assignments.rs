mod test_support;

use serde_json::json;
use test_support::{spawn_with_workspace, student, teacher, temp_dir};

#[test]
fn lessons_default_to_append_order_and_accept_patches() {
    let workspace = temp_dir("classroomd-lessons");
    let mut s = spawn_with_workspace(&workspace);
    let (classroom_id, pin) = s.create_classroom("t1", "Math101");
    s.join("s1", &pin);

    let a = s.create_lesson("t1", &classroom_id, "Fractions", Some("fractions.mp4"));
    let b = s.create_lesson("t1", &classroom_id, "Reading notes", None);

    let listed = s.ok(
        "lessons.list",
        json!({ "actor": student("s1"), "classroomId": classroom_id }),
    );
    let lessons = listed["lessons"].as_array().expect("lessons");
    assert_eq!(lessons.len(), 2);
    assert_eq!(lessons[0]["id"], json!(a));
    assert_eq!(lessons[1]["id"], json!(b));
    assert!(lessons[0]["order"].as_i64() < lessons[1]["order"].as_i64());
    assert!(lessons[1]["videoRef"].is_null());

    let updated = s.ok(
        "lessons.update",
        json!({
            "actor": teacher("t1"),
            "lessonId": b,
            "order": -1,
            "videoRef": "notes.mp4",
            "description": null
        }),
    );
    assert_eq!(updated["lesson"]["videoRef"], json!("notes.mp4"));
    assert_eq!(updated["lesson"]["title"], json!("Reading notes"));

    let listed = s.ok(
        "lessons.list",
        json!({ "actor": teacher("t1"), "classroomId": classroom_id }),
    );
    assert_eq!(listed["lessons"][0]["id"], json!(b));

    assert_eq!(
        s.err_code(
            "lessons.create",
            json!({ "actor": student("s1"), "classroomId": classroom_id, "title": "Nope" })
        ),
        "forbidden"
    );
    assert_eq!(
        s.err_code(
            "lessons.update",
            json!({ "actor": teacher("t1"), "lessonId": a, "title": null })
        ),
        "bad_params"
    );
    assert_eq!(
        s.err_code(
            "lessons.open",
            json!({ "actor": student("outsider"), "lessonId": a })
        ),
        "forbidden"
    );
}

#[test]
fn deleting_a_lesson_nulls_assignment_links() {
    let workspace = temp_dir("classroomd-weak-link");
    let mut s = spawn_with_workspace(&workspace);
    let (classroom_id, _) = s.create_classroom("t1", "Math101");
    let lesson_id = s.create_lesson("t1", &classroom_id, "L1", Some("v.mp4"));
    let assignment_id = s.create_assignment("t1", &classroom_id, "HW1", Some(&lesson_id));

    s.ok(
        "lessons.delete",
        json!({ "actor": teacher("t1"), "lessonId": lesson_id }),
    );

    let listed = s.ok(
        "assignments.list",
        json!({ "actor": teacher("t1"), "classroomId": classroom_id }),
    );
    let assignments = listed["assignments"].as_array().expect("assignments");
    assert_eq!(assignments.len(), 1);
    assert_eq!(assignments[0]["id"], json!(assignment_id));
    assert!(assignments[0]["lessonId"].is_null());
}

#[test]
fn assignment_links_stay_inside_the_classroom() {
    let workspace = temp_dir("classroomd-link-scope");
    let mut s = spawn_with_workspace(&workspace);
    let (c1, _) = s.create_classroom("t1", "Math101");
    let (c2, _) = s.create_classroom("t1", "Physics");
    let foreign_lesson = s.create_lesson("t1", &c2, "Waves", Some("waves.mp4"));

    assert_eq!(
        s.err_code(
            "assignments.create",
            json!({
                "actor": teacher("t1"),
                "classroomId": c1,
                "title": "HW",
                "lessonId": foreign_lesson
            })
        ),
        "invalid_argument"
    );

    let assignment_id = s.create_assignment("t1", &c1, "HW", None);
    assert_eq!(
        s.err_code(
            "assignments.update",
            json!({ "actor": teacher("t1"), "assignmentId": assignment_id, "lessonId": foreign_lesson })
        ),
        "invalid_argument"
    );

    let updated = s.ok(
        "assignments.update",
        json!({
            "actor": teacher("t1"),
            "assignmentId": assignment_id,
            "dueDate": "2026-03-01T10:00:00+02:00"
        }),
    );
    assert_eq!(
        updated["assignment"]["dueDate"],
        json!("2026-03-01T08:00:00.000000Z")
    );
    assert_eq!(
        s.err_code(
            "assignments.update",
            json!({ "actor": teacher("t1"), "assignmentId": assignment_id, "dueDate": "next week" })
        ),
        "invalid_argument"
    );

    s.ok(
        "assignments.delete",
        json!({ "actor": teacher("t1"), "assignmentId": assignment_id }),
    );
    let listed = s.ok(
        "assignments.list",
        json!({ "actor": teacher("t1"), "classroomId": c1 }),
    );
    assert_eq!(listed["assignments"], json!([]));
}
