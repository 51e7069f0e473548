mod test_support;

use serde_json::json;
use test_support::{admin, spawn_with_workspace, teacher, temp_dir};

#[test]
fn export_then_import_restores_workspace_state() {
    let workspace = temp_dir("classroomd-backup-ipc");
    let bundle = workspace.join("exports").join("backup.zip");
    let mut s = spawn_with_workspace(&workspace);
    let (kept_id, _) = s.create_classroom("t1", "Math101");

    assert_eq!(
        s.err_code(
            "backup.export",
            json!({ "actor": teacher("t1"), "outPath": bundle.to_string_lossy() })
        ),
        "forbidden"
    );
    let exported = s.ok(
        "backup.export",
        json!({ "actor": admin("root"), "outPath": bundle.to_string_lossy() }),
    );
    assert_eq!(exported["bundleFormat"], json!("classroom-workspace-v1"));
    assert!(bundle.is_file());

    s.create_classroom("t1", "Created after export");
    let before = s.ok("classrooms.list", json!({ "actor": admin("root") }));
    assert_eq!(before["classrooms"].as_array().map(|a| a.len()), Some(2));

    let imported = s.ok(
        "backup.import",
        json!({ "actor": admin("root"), "inPath": bundle.to_string_lossy() }),
    );
    assert_eq!(imported["bundleFormatDetected"], json!("classroom-workspace-v1"));
    assert_eq!(imported["dbSha256"], exported["dbSha256"]);

    let after = s.ok("classrooms.list", json!({ "actor": admin("root") }));
    let rows = after["classrooms"].as_array().expect("classrooms");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["id"], json!(kept_id));
}

#[test]
fn rejected_import_leaves_workspace_usable() {
    let workspace = temp_dir("classroomd-backup-reject");
    let mut s = spawn_with_workspace(&workspace);
    s.create_classroom("t1", "Math101");

    let junk = workspace.join("junk.zip");
    std::fs::write(&junk, b"definitely not a zip").expect("write junk");
    assert_eq!(
        s.err_code(
            "backup.import",
            json!({ "actor": admin("root"), "inPath": junk.to_string_lossy() })
        ),
        "import_failed"
    );
    assert_eq!(
        s.err_code(
            "backup.import",
            json!({
                "actor": admin("root"),
                "inPath": workspace.join("missing.zip").to_string_lossy()
            })
        ),
        "not_found"
    );

    let listed = s.ok("classrooms.list", json!({ "actor": admin("root") }));
    assert_eq!(listed["classrooms"].as_array().map(|a| a.len()), Some(1));
}

#[test]
fn checksum_mismatch_is_rejected_over_ipc() {
    use std::io::{Read, Write};

    let workspace = temp_dir("classroomd-backup-checksum");
    let bundle = workspace.join("good.zip");
    let tampered = workspace.join("tampered.zip");
    let mut s = spawn_with_workspace(&workspace);
    let (kept_id, _) = s.create_classroom("t1", "Math101");
    s.ok(
        "backup.export",
        json!({ "actor": admin("root"), "outPath": bundle.to_string_lossy() }),
    );

    let mut archive =
        zip::ZipArchive::new(std::fs::File::open(&bundle).expect("open bundle")).expect("zip");
    let mut out = zip::ZipWriter::new(std::fs::File::create(&tampered).expect("create"));
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).expect("entry");
        let name = entry.name().to_string();
        let mut bytes = Vec::new();
        entry.read_to_end(&mut bytes).expect("read entry");
        if name == "db/classroom.sqlite3" {
            let last = bytes.len() - 1;
            bytes[last] ^= 0xff;
        }
        out.start_file(name.as_str(), zip::write::FileOptions::default())
            .expect("start entry");
        out.write_all(&bytes).expect("write entry");
    }
    out.finish().expect("finish");

    s.create_classroom("t1", "Created after export");
    assert_eq!(
        s.err_code(
            "backup.import",
            json!({ "actor": admin("root"), "inPath": tampered.to_string_lossy() })
        ),
        "import_failed"
    );
    assert!(!workspace.join("classroom.sqlite3.importing").exists());

    let listed = s.ok("classrooms.list", json!({ "actor": admin("root") }));
    let rows = listed["classrooms"].as_array().expect("classrooms");
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().any(|r| r["id"] == json!(kept_id)));
}
