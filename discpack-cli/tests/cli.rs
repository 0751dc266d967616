use assert_cmd::prelude::*;
use assert_fs::prelude::*;
use predicates::prelude::*;
use std::process::Command;

fn data_dir(td: &assert_fs::TempDir) -> assert_fs::fixture::ChildPath {
    let data = td.child("data");
    data.create_dir_all().unwrap();
    for (name, len) in [("a.bin", 3000usize), ("b.bin", 2500), ("c.bin", 700), ("d.bin", 100)] {
        data.child(name).write_binary(&vec![b'x'; len]).unwrap();
    }
    data
}

fn discpack(td: &assert_fs::TempDir) -> Command {
    let mut cmd = Command::cargo_bin("discpack").unwrap();
    cmd.current_dir(td.path()).env_remove("RUST_LOG");
    cmd
}

#[test]
fn plan_prints_sets_and_writes_json() {
    let td = assert_fs::TempDir::new().unwrap();
    data_dir(&td);

    discpack(&td)
        .args([
            "plan",
            "--granularity", "1K",
            "--capacity", "4000",
            "--no-split",
            "--json", "plan.json",
            "data",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("Fileset #1-1:"))
        .stdout(predicate::str::contains("Fileset #2-1:"))
        .stdout(predicate::str::contains("Files (3, 3800 bytes"))
        .stdout(predicate::str::contains("Sets: 2, parts: 2, packed 6300 of 6300 bytes"));

    td.child("plan.json")
        .assert(predicate::str::contains("\"input_files\": 4"))
        .assert(predicate::str::contains("\"primary_capacity\": 4000"));
}

#[test]
fn config_file_supplies_capacities() {
    let td = assert_fs::TempDir::new().unwrap();
    data_dir(&td);
    td.child("discpack.toml")
        .write_str("[pack]\nbucket_granularity = 1024\nprimary_capacity = 4000\nsplit = false\n\n[log]\nlevel = \"warn\"\n")
        .unwrap();

    discpack(&td)
        .args(["plan", "--config", "discpack.toml", "data"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Sets: 2"));
}

#[test]
fn oversized_file_fails_unless_allowed() {
    let td = assert_fs::TempDir::new().unwrap();
    let data = data_dir(&td);
    data.child("huge.bin").write_binary(&vec![0u8; 5000]).unwrap();

    discpack(&td)
        .args(["plan", "--granularity", "1024", "--capacity", "4000", "--no-split", "data"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("1 file(s) could not be packed"));

    discpack(&td)
        .args([
            "plan", "--granularity", "1024", "--capacity", "4000", "--no-split",
            "--allow-unpacked", "data",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("huge.bin (5000 bytes, TooLarge)"));
}

#[test]
fn set_limit_leaves_files_unpacked() {
    let td = assert_fs::TempDir::new().unwrap();
    data_dir(&td);

    discpack(&td)
        .args([
            "plan", "--granularity", "1024", "--capacity", "4000", "--no-split",
            "--sets", "1", "--allow-unpacked", "data",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("SetLimit"))
        .stdout(predicate::str::contains("Sets: 1"));
}

#[test]
fn exclude_glob_filters_inputs() {
    let td = assert_fs::TempDir::new().unwrap();
    data_dir(&td);

    discpack(&td)
        .args([
            "plan", "--granularity", "1024", "--capacity", "4000", "--no-split",
            "--exclude", "**/b.bin", "data",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("b.bin").not())
        .stdout(predicate::str::contains("Sets: 1"));
}

#[test]
fn overlapping_inputs_are_packed_once() {
    let td = assert_fs::TempDir::new().unwrap();
    data_dir(&td);

    discpack(&td)
        .args([
            "plan", "--granularity", "1024", "--capacity", "4000", "--no-split",
            "data", "./data", "data/a.bin",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("Sets: 2, parts: 2, packed 6300 of 6300 bytes"));
}

#[test]
fn halving_splits_until_parts_hold_one_heavy_file() {
    let td = assert_fs::TempDir::new().unwrap();
    data_dir(&td);

    discpack(&td)
        .args([
            "plan", "--granularity", "1024", "--capacity", "4000",
            "--secondary-capacity", "2000", "--split-strategy", "halving", "data",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("Fileset #1-3:"))
        .stdout(predicate::str::contains("Fileset #2-1:"))
        .stdout(predicate::str::contains("Sets: 2, parts: 4, packed 6300 of 6300 bytes"));
}

#[test]
fn generate_writes_seeded_files() {
    let td = assert_fs::TempDir::new().unwrap();

    discpack(&td)
        .args([
            "generate", "--dir", "gen", "--count", "3",
            "--min-size", "1K", "--max-size", "4K", "--total", "100K", "--seed", "7",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("Generated 3 file(s)"));

    for n in 1..=3 {
        let p = td.child(format!("gen/testFile{}.dat", n));
        p.assert(predicate::path::is_file());
        let len = std::fs::metadata(p.path()).unwrap().len();
        assert!((1024..4096).contains(&len), "size {} out of range", len);
    }
}

#[cfg(unix)]
fn fake_archiver(td: &assert_fs::TempDir, body: &str) -> std::path::PathBuf {
    use std::os::unix::fs::PermissionsExt;
    let script = td.child("fake7z.sh");
    script.write_str(&format!("#!/bin/sh\n{}\n", body)).unwrap();
    std::fs::set_permissions(script.path(), std::fs::Permissions::from_mode(0o755)).unwrap();
    script.path().to_path_buf()
}

#[cfg(unix)]
#[test]
fn pack_numbers_archives_and_continues_numbering() {
    let td = assert_fs::TempDir::new().unwrap();
    data_dir(&td);
    // $4 is the archive path: a -tzip -mx0 <archive> <files...>
    let script = fake_archiver(&td, "touch \"$4\"\necho \"Everything is Ok\"");
    let args = [
        "pack", "--granularity", "1024", "--capacity", "4000", "--no-split",
        "--dest", "out", "--archiver", script.to_str().unwrap(), "data",
    ];

    discpack(&td).args(args).assert().success();
    td.child("out/arch1-1.zip").assert(predicate::path::exists());
    td.child("out/arch2-1.zip").assert(predicate::path::exists());

    discpack(&td).args(args).assert().success();
    td.child("out/arch3-1.zip").assert(predicate::path::exists());
    td.child("out/arch4-1.zip").assert(predicate::path::exists());
}

#[cfg(unix)]
#[test]
fn pack_writes_one_archive_per_split_part() {
    let td = assert_fs::TempDir::new().unwrap();
    data_dir(&td);
    let script = fake_archiver(&td, "touch \"$4\"\necho \"Everything is Ok\"");

    discpack(&td)
        .args([
            "pack", "--granularity", "1024", "--capacity", "4000",
            "--secondary-capacity", "3500", "--dest", "out",
            "--archiver", script.to_str().unwrap(), "data",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("Fileset #1-2:"));
    td.child("out/arch1-1.zip").assert(predicate::path::exists());
    td.child("out/arch1-2.zip").assert(predicate::path::exists());
    td.child("out/arch2-1.zip").assert(predicate::path::exists());
    td.child("out/arch2-2.zip").assert(predicate::path::missing());
}

#[cfg(unix)]
#[test]
fn pack_fails_when_archiver_reports_errors() {
    let td = assert_fs::TempDir::new().unwrap();
    data_dir(&td);
    let script = fake_archiver(&td, "echo \"data/a.bin     CRC Failed\"");

    discpack(&td)
        .args([
            "pack", "--granularity", "1024", "--capacity", "4000", "--no-split",
            "--dest", "out", "--archiver", script.to_str().unwrap(), "data",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("2 archive(s) failed"));
}

#[test]
fn compression_requires_zip() {
    let td = assert_fs::TempDir::new().unwrap();
    data_dir(&td);

    discpack(&td)
        .args(["pack", "--dest", "out", "--format", "7z", "--compression", "5", "data"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("only supported with --format zip"));
}
