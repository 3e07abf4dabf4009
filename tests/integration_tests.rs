//! Integration tests for the quire CLI.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// Helper to create a quire Command
fn quire() -> Command {
    let mut cmd = cargo_bin_cmd!("quire");
    cmd.env_remove("RUST_LOG")
        .env_remove("QUIRE_GENERATE_CMD")
        .env_remove("QUIRE_MAX_CONCURRENCY");
    cmd
}

fn create_temp_project() -> TempDir {
    TempDir::new().unwrap()
}

fn init_project(dir: &TempDir) {
    quire()
        .current_dir(dir.path())
        .arg("init")
        .assert()
        .success();
}

// =============================================================================
// Basic CLI Tests
// =============================================================================

mod cli_basics {
    use super::*;

    #[test]
    fn test_help() {
        quire()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("review"));
    }

    #[test]
    fn test_version() {
        quire().arg("--version").assert().success();
    }

    #[test]
    fn test_init_creates_structure() {
        let dir = create_temp_project();

        quire()
            .current_dir(dir.path())
            .arg("init")
            .assert()
            .success()
            .stdout(predicate::str::contains("Initialized quire project"));

        assert!(dir.path().join(".quire/quire.toml").exists());
        assert!(dir.path().join(".quire/workflows").is_dir());
        assert!(dir.path().join(".quire/issues").is_dir());
        assert!(dir.path().join(".quire/changes").is_dir());
    }

    #[test]
    fn test_init_idempotent() {
        let dir = create_temp_project();
        init_project(&dir);
        quire()
            .current_dir(dir.path())
            .arg("init")
            .assert()
            .success()
            .stdout(predicate::str::contains("already exists"));
    }

    #[test]
    fn test_commands_require_init() {
        let dir = create_temp_project();
        quire()
            .current_dir(dir.path())
            .args(["start", "novel"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("quire init"));
    }

    #[test]
    fn test_unknown_stage_is_rejected() {
        let dir = create_temp_project();
        init_project(&dir);
        quire()
            .current_dir(dir.path())
            .args(["skip", "novel", "galley"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid stage"));
    }
}

// =============================================================================
// Workflow Tests
// =============================================================================

mod workflow {
    use super::*;

    #[test]
    fn test_start_and_status() {
        let dir = create_temp_project();
        init_project(&dir);

        quire()
            .current_dir(dir.path())
            .args(["start", "novel"])
            .assert()
            .success()
            .stdout(predicate::str::contains("acquisitions"));

        quire()
            .current_dir(dir.path())
            .args(["status", "novel"])
            .assert()
            .success()
            .stdout(predicate::str::contains("in progress"))
            .stdout(predicate::str::contains("Next stage: acquisitions"));

        assert!(dir.path().join(".quire/workflows/novel.json").exists());
    }

    #[test]
    fn test_start_twice_fails() {
        let dir = create_temp_project();
        init_project(&dir);
        quire()
            .current_dir(dir.path())
            .args(["start", "novel"])
            .assert()
            .success();
        quire()
            .current_dir(dir.path())
            .args(["start", "novel"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("already started"));
    }

    #[test]
    fn test_status_json_uses_wire_names() {
        let dir = create_temp_project();
        init_project(&dir);
        quire()
            .current_dir(dir.path())
            .args(["start", "novel"])
            .assert()
            .success();

        let output = quire()
            .current_dir(dir.path())
            .args(["status", "novel", "--json"])
            .output()
            .unwrap();
        assert!(output.status.success());
        let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        assert_eq!(report["current_stage"], "acquisitions");
        assert_eq!(report["stages"]["cold_read"], "not_started");
    }

    #[test]
    fn test_skip_out_of_order_fails() {
        let dir = create_temp_project();
        init_project(&dir);
        quire()
            .current_dir(dir.path())
            .args(["start", "novel"])
            .assert()
            .success();

        quire()
            .current_dir(dir.path())
            .args(["skip", "novel", "copy"])
            .assert()
            .failure()
            .stderr(predicate::str::contains(
                "Cannot run copy. Must complete acquisitions first.",
            ));
    }

    #[test]
    fn test_skip_in_order_advances() {
        let dir = create_temp_project();
        init_project(&dir);
        quire()
            .current_dir(dir.path())
            .args(["start", "novel"])
            .assert()
            .success();

        for stage in ["acquisitions", "developmental"] {
            quire()
                .current_dir(dir.path())
                .args(["skip", "novel", stage])
                .assert()
                .success();
        }
        quire()
            .current_dir(dir.path())
            .args(["status", "novel"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Next stage: line"));
    }

    #[test]
    fn test_reset_allows_restart() {
        let dir = create_temp_project();
        init_project(&dir);
        quire()
            .current_dir(dir.path())
            .args(["start", "novel"])
            .assert()
            .success();
        quire()
            .current_dir(dir.path())
            .args(["reset", "novel"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Reset workflow"));
        quire()
            .current_dir(dir.path())
            .args(["start", "novel"])
            .assert()
            .success();
    }

    #[test]
    fn test_status_lists_workflows() {
        let dir = create_temp_project();
        init_project(&dir);
        for id in ["alpha", "beta"] {
            quire()
                .current_dir(dir.path())
                .args(["start", id])
                .assert()
                .success();
        }
        quire()
            .current_dir(dir.path())
            .arg("status")
            .assert()
            .success()
            .stdout(predicate::str::contains("alpha"))
            .stdout(predicate::str::contains("beta"));
    }
}

// =============================================================================
// Config Tests
// =============================================================================

mod config {
    use super::*;

    #[test]
    fn test_config_show_defaults() {
        let dir = create_temp_project();
        quire()
            .current_dir(dir.path())
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("using defaults"))
            .stdout(predicate::str::contains("[backend]"));
    }

    #[test]
    fn test_config_show_reflects_env() {
        let dir = create_temp_project();
        quire()
            .current_dir(dir.path())
            .env("QUIRE_MODEL", "house-model")
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("house-model"));
    }

    #[test]
    fn test_config_validate_reports_warnings() {
        let dir = create_temp_project();
        init_project(&dir);
        fs::write(
            dir.path().join(".quire/quire.toml"),
            "[extraction]\nmax_concurrency = 0\n",
        )
        .unwrap();
        quire()
            .current_dir(dir.path())
            .args(["config", "validate"])
            .assert()
            .success()
            .stdout(predicate::str::contains("max_concurrency is 0"));
    }

    #[test]
    fn test_config_init_refuses_overwrite() {
        let dir = create_temp_project();
        init_project(&dir);
        quire()
            .current_dir(dir.path())
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("already exists"));
    }
}

// =============================================================================
// Review and fix flow against a scripted command backend
// =============================================================================

#[cfg(unix)]
mod review_flow {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::path::PathBuf;

    const MANUSCRIPT: &str = "It was a dark and stormy night.\n";

    /// A generator that answers review prompts with one finding, rewrite
    /// prompts with a fixed sentence and bible prompts with one character.
    fn write_stub(dir: &TempDir) -> PathBuf {
        let path = dir.path().join("stub-generate.sh");
        let script = r###"#!/bin/sh
prompt=$(cat)
case "$prompt" in
  *"## Context Segment"*)
    echo "The storm broke at midnight."
    ;;
  *"STYLE SHEET (characters)"*)
    echo '{"characters": [{"name": "Ana", "age": 35, "occupation": "Lighthouse keeper"}]}'
    ;;
  *"STYLE SHEET"*)
    echo '[]'
    ;;
  *)
    echo '[{"location": "Chapter 1", "original_text": "It was a dark and stormy night.", "description": "Opening cliche", "suggestion": "Open on action", "severity": "major"}]'
    ;;
esac
"###;
        fs::write(&path, script).unwrap();
        let mut perms = fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&path, perms).unwrap();
        path
    }

    fn setup() -> (TempDir, PathBuf) {
        let dir = create_temp_project();
        init_project(&dir);
        let stub = write_stub(&dir);
        fs::write(dir.path().join("book.txt"), MANUSCRIPT).unwrap();
        quire()
            .current_dir(dir.path())
            .args(["start", "book"])
            .assert()
            .success();
        (dir, stub)
    }

    #[test]
    fn test_review_then_fix() {
        let (dir, stub) = setup();

        quire()
            .current_dir(dir.path())
            .env("QUIRE_GENERATE_CMD", &stub)
            .args(["review", "book", "book.txt"])
            .assert()
            .success()
            .stdout(predicate::str::contains("1 issues"))
            .stdout(predicate::str::contains("Opening cliche"))
            .stdout(predicate::str::contains("Next stage: developmental"));

        quire()
            .current_dir(dir.path())
            .args(["issues", "book", "acquisitions"])
            .assert()
            .success()
            .stdout(predicate::str::contains("#1"))
            .stdout(predicate::str::contains("market_fit"));

        quire()
            .current_dir(dir.path())
            .env("QUIRE_GENERATE_CMD", &stub)
            .args([
                "fix",
                "book",
                "acquisitions",
                "book.txt",
                "--issues",
                "1",
                "--output",
                "edited.txt",
            ])
            .assert()
            .success()
            .stdout(predicate::str::contains("Applied 1 of 1 requested fixes"));

        let edited = fs::read_to_string(dir.path().join("edited.txt")).unwrap();
        assert_eq!(edited, "The storm broke at midnight.\n");
        assert_eq!(
            fs::read_to_string(dir.path().join("book.txt")).unwrap(),
            MANUSCRIPT
        );

        let output = quire()
            .current_dir(dir.path())
            .args(["status", "book", "--json"])
            .output()
            .unwrap();
        let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        assert_eq!(report["total_issues_found"], 1);
        assert_eq!(report["total_fixes_applied"], 1);
        assert!(report["usage"]["calls"].as_u64().unwrap() >= 2);

        let changes = fs::read_dir(dir.path().join(".quire/changes/book"))
            .unwrap()
            .count();
        assert_eq!(changes, 1);

        quire()
            .current_dir(dir.path())
            .args(["issues", "book", "acquisitions"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[applied]"));
    }

    #[test]
    fn test_review_out_of_order_stage_fails() {
        let (dir, stub) = setup();
        quire()
            .current_dir(dir.path())
            .env("QUIRE_GENERATE_CMD", &stub)
            .args(["review", "book", "book.txt", "--stage", "proof"])
            .assert()
            .failure()
            .stderr(predicate::str::contains(
                "Cannot run proof. Must complete acquisitions first.",
            ));
    }

    #[test]
    fn test_reset_discards_stored_issues() {
        let (dir, stub) = setup();
        quire()
            .current_dir(dir.path())
            .env("QUIRE_GENERATE_CMD", &stub)
            .args(["review", "book", "book.txt"])
            .assert()
            .success();

        quire()
            .current_dir(dir.path())
            .args(["reset", "book"])
            .assert()
            .success();
        quire()
            .current_dir(dir.path())
            .args(["start", "book"])
            .assert()
            .success();
        quire()
            .current_dir(dir.path())
            .args(["issues", "book", "acquisitions"])
            .assert()
            .success()
            .stdout(predicate::str::contains("No issues stored"));
    }

    #[test]
    fn test_bible_extract_writes_notes_and_counts_usage() {
        let (dir, stub) = setup();
        quire()
            .current_dir(dir.path())
            .env("QUIRE_GENERATE_CMD", &stub)
            .args(["bible", "extract", "book", "book.txt", "--output", "notes.md"])
            .assert()
            .success()
            .stdout(predicate::str::contains("1 characters, 0 locations"));

        let notes = fs::read_to_string(dir.path().join("notes.md")).unwrap();
        assert!(notes.contains("- **Ana**: age 35; Lighthouse keeper"));

        quire()
            .current_dir(dir.path())
            .args(["bible", "show", "book"])
            .assert()
            .success()
            .stdout(predicate::str::contains("## Characters"));

        let output = quire()
            .current_dir(dir.path())
            .args(["status", "book", "--json"])
            .output()
            .unwrap();
        let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        // one segment, four entity kinds
        assert_eq!(report["usage"]["calls"], 4);
        assert_eq!(report["usage"]["estimated_calls"], 4);

        quire()
            .current_dir(dir.path())
            .args(["status", "book"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Backend usage: 4 calls"));
    }

    #[test]
    fn test_bible_show_without_extract_fails() {
        let (dir, _stub) = setup();
        quire()
            .current_dir(dir.path())
            .args(["bible", "show", "book"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("No series bible for 'book'"));
    }

    #[test]
    fn test_ignore_and_unignore() {
        let (dir, stub) = setup();
        quire()
            .current_dir(dir.path())
            .env("QUIRE_GENERATE_CMD", &stub)
            .args(["review", "book", "book.txt"])
            .assert()
            .success();

        quire()
            .current_dir(dir.path())
            .args(["ignore", "book", "acquisitions", "1"])
            .assert()
            .success();
        quire()
            .current_dir(dir.path())
            .args(["issues", "book", "acquisitions"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[ignored]"));

        quire()
            .current_dir(dir.path())
            .args(["unignore", "book", "acquisitions", "1"])
            .assert()
            .success();
        quire()
            .current_dir(dir.path())
            .args(["ignore", "book", "acquisitions", "7"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Issue 7 not found"));
    }
}
