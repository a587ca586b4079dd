use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn prints_version() {
    Command::cargo_bin("shortfeed")
        .expect("shortfeed binary")
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn prints_help() {
    Command::cargo_bin("shortfeed")
        .expect("shortfeed binary")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("shortfeed").and(predicate::str::contains("--feed")));
}

#[test]
fn rejects_unknown_feed_type() {
    Command::cargo_bin("shortfeed")
        .expect("shortfeed binary")
        .args(["--feed", "trending"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("unknown feed type"));
}

#[test]
fn rejects_unknown_arguments() {
    Command::cargo_bin("shortfeed")
        .expect("shortfeed binary")
        .arg("--bogus")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--bogus"));
}
