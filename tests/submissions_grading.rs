mod test_support;

use serde_json::json;
use test_support::{spawn_with_workspace, student, teacher, temp_dir};

#[test]
fn resubmission_clears_grade_and_refreshes_submitted_at() {
    let workspace = temp_dir("classroomd-resubmit");
    let mut s = spawn_with_workspace(&workspace);
    let (classroom_id, pin) = s.create_classroom("t1", "Math101");
    s.join("s1", &pin);
    let assignment_id = s.create_assignment("t1", &classroom_id, "Essay", None);

    let first = s.ok(
        "submissions.submit",
        json!({ "actor": student("s1"), "assignmentId": assignment_id, "content": "draft" }),
    );
    assert_eq!(first["resubmitted"], json!(false));
    let submission_id = first["submission"]["id"].as_str().expect("id").to_string();
    let first_at = first["submission"]["submittedAt"]
        .as_str()
        .expect("submittedAt")
        .to_string();
    let version = first["submission"]["version"].as_i64().expect("version");

    let graded = s.ok(
        "submissions.grade",
        json!({
            "actor": teacher("t1"),
            "submissionId": submission_id,
            "grade": 85,
            "feedback": "Good start",
            "expectedVersion": version
        }),
    );
    assert_eq!(graded["submission"]["grade"], json!(85));
    assert_eq!(graded["submission"]["status"], json!("graded"));

    let second = s.ok(
        "submissions.submit",
        json!({ "actor": student("s1"), "assignmentId": assignment_id, "content": "final" }),
    );
    assert_eq!(second["resubmitted"], json!(true));
    assert_eq!(second["contentChanged"], json!(true));
    let sub = &second["submission"];
    assert_eq!(sub["id"], json!(submission_id));
    assert!(sub["grade"].is_null());
    assert!(sub["feedback"].is_null());
    assert!(sub["gradedAt"].is_null());
    assert_eq!(sub["status"], json!("submitted"));
    assert_eq!(sub["content"], json!("final"));
    assert!(sub["submittedAt"].as_str().expect("submittedAt") > first_at.as_str());

    let listed = s.ok(
        "submissions.list",
        json!({ "actor": teacher("t1"), "assignmentId": assignment_id }),
    );
    assert_eq!(listed["submissions"].as_array().map(|a| a.len()), Some(1));

    let mine = s.ok(
        "submissions.mine",
        json!({ "actor": student("s1"), "assignmentId": assignment_id }),
    );
    assert_eq!(mine["submission"]["content"], json!("final"));
}

#[test]
fn stale_grade_is_a_conflict() {
    let workspace = temp_dir("classroomd-grade-conflict");
    let mut s = spawn_with_workspace(&workspace);
    let (classroom_id, pin) = s.create_classroom("t1", "Math101");
    s.join("s1", &pin);
    let assignment_id = s.create_assignment("t1", &classroom_id, "Essay", None);

    let first = s.ok(
        "submissions.submit",
        json!({ "actor": student("s1"), "assignmentId": assignment_id, "content": "v1" }),
    );
    let submission_id = first["submission"]["id"].as_str().expect("id").to_string();
    let seen_version = first["submission"]["version"].as_i64().expect("version");

    s.ok(
        "submissions.submit",
        json!({ "actor": student("s1"), "assignmentId": assignment_id, "content": "v2" }),
    );
    assert_eq!(
        s.err_code(
            "submissions.grade",
            json!({
                "actor": teacher("t1"),
                "submissionId": submission_id,
                "grade": 70,
                "expectedVersion": seen_version
            })
        ),
        "conflict"
    );

    let mine = s.ok(
        "submissions.mine",
        json!({ "actor": student("s1"), "assignmentId": assignment_id }),
    );
    assert!(mine["submission"]["grade"].is_null());
}

#[test]
fn grade_range_and_authorization_are_enforced() {
    let workspace = temp_dir("classroomd-grade-range");
    let mut s = spawn_with_workspace(&workspace);
    let (classroom_id, pin) = s.create_classroom("t1", "Math101");
    s.join("s1", &pin);
    let assignment_id = s.create_assignment("t1", &classroom_id, "Quiz", None);
    let submitted = s.ok(
        "submissions.submit",
        json!({ "actor": student("s1"), "assignmentId": assignment_id, "documentRef": "quiz.pdf" }),
    );
    let submission_id = submitted["submission"]["id"].as_str().expect("id").to_string();

    for bad in [-1, 101] {
        assert_eq!(
            s.err_code(
                "submissions.grade",
                json!({ "actor": teacher("t1"), "submissionId": submission_id, "grade": bad })
            ),
            "invalid_argument"
        );
    }
    assert_eq!(
        s.err_code(
            "submissions.grade",
            json!({ "actor": teacher("t2"), "submissionId": submission_id, "grade": 50 })
        ),
        "forbidden"
    );
    for edge in [0, 100] {
        let graded = s.ok(
            "submissions.grade",
            json!({ "actor": teacher("t1"), "submissionId": submission_id, "grade": edge }),
        );
        assert_eq!(graded["submission"]["grade"], json!(edge));
    }

    assert_eq!(
        s.err_code(
            "submissions.submit",
            json!({ "actor": student("s1"), "assignmentId": assignment_id, "content": "   " })
        ),
        "invalid_argument"
    );
    assert_eq!(
        s.err_code(
            "submissions.submit",
            json!({ "actor": student("stranger"), "assignmentId": assignment_id, "content": "hi" })
        ),
        "not_found"
    );
    assert_eq!(
        s.err_code(
            "submissions.list",
            json!({ "actor": student("s1"), "assignmentId": assignment_id })
        ),
        "forbidden"
    );
}

#[test]
fn fractional_or_huge_grades_are_invalid_arguments() {
    let workspace = temp_dir("classroomd-grade-numbers");
    let mut s = spawn_with_workspace(&workspace);
    let (classroom_id, pin) = s.create_classroom("t1", "Math101");
    s.join("s1", &pin);
    let assignment_id = s.create_assignment("t1", &classroom_id, "Quiz", None);
    let submitted = s.ok(
        "submissions.submit",
        json!({ "actor": student("s1"), "assignmentId": assignment_id, "content": "answer" }),
    );
    let submission_id = submitted["submission"]["id"].as_str().expect("id").to_string();

    for bad in [json!(85.5), json!(1e20), json!(-0.5)] {
        assert_eq!(
            s.err_code(
                "submissions.grade",
                json!({ "actor": teacher("t1"), "submissionId": submission_id, "grade": bad })
            ),
            "invalid_argument"
        );
    }
    assert_eq!(
        s.err_code(
            "submissions.grade",
            json!({ "actor": teacher("t1"), "submissionId": submission_id, "grade": "85" })
        ),
        "bad_params"
    );

    let graded = s.ok(
        "submissions.grade",
        json!({ "actor": teacher("t1"), "submissionId": submission_id, "grade": 90.0 }),
    );
    assert_eq!(graded["submission"]["grade"], json!(90));
}
