use std::path::PathBuf;
use std::process::{Command, Output};

fn glint() -> Command {
    Command::new(env!("CARGO_BIN_EXE_glint"))
}

/// Write `source` to a fresh script file. The directory guard must outlive the run.
fn script(source: &str) -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("main.gl");
    std::fs::write(&path, source).expect("write script");
    (dir, path)
}

fn stdout(out: &Output) -> String {
    String::from_utf8_lossy(&out.stdout).trim().to_string()
}

fn stderr(out: &Output) -> String {
    String::from_utf8_lossy(&out.stderr).to_string()
}

fn run_source(source: &str, extra: &[&str]) -> Output {
    let (_dir, path) = script(source);
    glint()
        .arg("run")
        .arg(&path)
        .args(extra)
        .output()
        .expect("failed to run glint")
}

// --- run ---

#[test]
fn run_prints_result() {
    let out = run_source("fn main() { return 20 * 2 + 2; }", &[]);
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    assert_eq!(stdout(&out), "42");
}

#[test]
fn run_prints_fractions() {
    let out = run_source("fn main() { return 3 / 2; }", &[]);
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    assert_eq!(stdout(&out), "1.5");
}

#[test]
fn run_print_syscall_writes_stdout() {
    let out = run_source("fn main() { print(3); print(0.25); return 7; }", &[]);
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    assert_eq!(stdout(&out), "3\n0.25\n7");
}

#[test]
fn run_top_level_statements_before_main() {
    let out = run_source("var g = 5;\nprint(g);\nfn main() { return g + 1; }", &[]);
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    assert_eq!(stdout(&out), "5\n6");
}

#[test]
fn run_named_function_with_args() {
    let out = run_source("fn add(a, b) { return a + b; }", &["--function", "add", "-1", "0.5"]);
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    assert_eq!(stdout(&out), "-0.5");
}

#[test]
fn run_named_function_wrong_arity() {
    let out = run_source("fn add(a, b) { return a + b; }", &["--function", "add", "1"]);
    assert!(!out.status.success());
    assert!(stderr(&out).contains("takes 2 arguments"), "stderr: {}", stderr(&out));
}

#[test]
fn run_unknown_function() {
    let out = run_source("fn main() { return 0; }", &["--function", "nope"]);
    assert!(!out.status.success());
    assert!(stderr(&out).contains("no function named 'nope'"));
}

#[test]
fn run_warns_when_main_takes_parameters() {
    let out = run_source("fn main(a) { return a; }", &["--no-color"]);
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    assert_eq!(stdout(&out), "0");
    assert!(stderr(&out).starts_with("warning: "), "stderr: {}", stderr(&out));
}

// --- errors ---

#[test]
fn compile_error_shows_code_and_location() {
    let out = run_source("fn main() {\n  return y;\n}", &["--no-color"]);
    assert!(!out.status.success());
    let err = stderr(&out);
    assert!(err.starts_with("error[GL-R001]: undefined symbol 'y'"), "stderr: {err}");
    assert!(err.contains("--> 2:10"), "stderr: {err}");
    assert!(err.contains("  return y;"), "stderr: {err}");
}

#[test]
fn every_parse_error_is_reported() {
    let out = run_source("x = ;\ny = );\n", &["--no-color"]);
    assert!(!out.status.success());
    assert_eq!(stderr(&out).matches("error").count(), 2, "stderr: {}", stderr(&out));
}

#[test]
fn runtime_error_points_at_source() {
    let out = run_source("fn main() {\n  var a[2];\n  return a[5];\n}", &["--no-color"]);
    assert!(!out.status.success());
    let err = stderr(&out);
    assert!(err.contains("GL-V004"), "stderr: {err}");
    assert!(err.contains("--> 3:11"), "stderr: {err}");
}

#[test]
fn division_by_zero_fails() {
    let out = run_source("fn main() { var z = 0; return 1 / z; }", &["--no-color"]);
    assert!(!out.status.success());
    assert!(stderr(&out).contains("GL-V005"));
}

#[test]
fn deep_recursion_overflows_small_stack() {
    let out = run_source("fn f(n) { return f(n + 1); } fn main() { return f(0); }", &["--stack", "64"]);
    assert!(!out.status.success());
    assert!(stderr(&out).contains("GL-V001"), "stderr: {}", stderr(&out));
}

#[test]
fn json_diagnostics() {
    let out = run_source("fn main() { return y; }", &["--format", "json"]);
    assert!(!out.status.success());
    let err = stderr(&out);
    let line = err.lines().next().expect("one diagnostic");
    let v: serde_json::Value = serde_json::from_str(line).expect("valid JSON");
    assert_eq!(v["code"], "GL-R001");
    assert_eq!(v["severity"], "error");
    assert_eq!(v["labels"][0]["line"], 1);
}

#[test]
fn missing_file() {
    let out = glint().args(["run", "/nonexistent/script.gl"]).output().expect("failed to run glint");
    assert!(!out.status.success());
    assert!(stderr(&out).contains("cannot read"));
}

// --- build / exec ---

#[test]
fn build_then_exec() {
    let (dir, path) = script("fn main() { print(1); return 2; }");
    let image = dir.path().join("out.glc");
    let out = glint().arg("build").arg(&path).arg("-o").arg(&image).output().expect("failed to run glint");
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    let bytes = std::fs::read(&image).expect("image written");
    assert_eq!(&bytes[..4], &1u32.to_le_bytes());

    let out = glint().arg("exec").arg(&image).output().expect("failed to run glint");
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    assert_eq!(stdout(&out), "1\n2");
}

#[test]
fn build_default_output_path() {
    let (dir, path) = script("fn main() { return 1; }");
    let out = glint().arg("build").arg(&path).output().expect("failed to run glint");
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    assert!(dir.path().join("main.glc").exists());
}

#[test]
fn exec_rejects_bad_image() {
    let dir = tempfile::tempdir().expect("tempdir");
    let image = dir.path().join("bad.glc");
    std::fs::write(&image, [9u8, 0, 0, 0, 0, 0, 0, 0]).expect("write image");
    let out = glint().arg("exec").arg(&image).output().expect("failed to run glint");
    assert!(!out.status.success());
    assert!(stderr(&out).contains("GL-V007"), "stderr: {}", stderr(&out));
}

// --- dump ---

#[test]
fn dump_tree() {
    let (_dir, path) = script("fn main() { return 1; }");
    let out = glint().arg("dump").arg(&path).output().expect("failed to run glint");
    assert!(out.status.success());
    assert!(stdout(&out).contains("FuncDef 'main'"));
}

#[test]
fn dump_listing() {
    let (_dir, path) = script("fn helper() { return 1; } fn main() { return helper(); }");
    let out = glint().arg("dump").arg(&path).arg("--listing").output().expect("failed to run glint");
    assert!(out.status.success());
    let listing = stdout(&out);
    assert!(listing.starts_with("top:"), "{listing}");
    assert!(listing.contains("helper:"));
    assert!(listing.contains("CALL"));
}

#[test]
fn dump_json() {
    let (_dir, path) = script("var g; fn main() { return g; }");
    let out = glint().arg("dump").arg(&path).arg("--json").output().expect("failed to run glint");
    assert!(out.status.success());
    let v: serde_json::Value = serde_json::from_slice(&out.stdout).expect("valid JSON");
    assert!(v.is_array());
}

// --- explain ---

#[test]
fn explain_code() {
    let out = glint().args(["explain", "GL-T001"]).output().expect("failed to run glint");
    assert!(out.status.success());
    assert!(stdout(&out).contains("array size must be const"));
}

#[test]
fn explain_lists_codes() {
    let out = glint().arg("explain").output().expect("failed to run glint");
    assert!(out.status.success());
    let text = stdout(&out);
    assert!(text.contains("GL-L001"));
    assert!(text.contains("GL-V007"));
}

#[test]
fn explain_unknown_code() {
    let out = glint().args(["explain", "GL-Z999"]).output().expect("failed to run glint");
    assert!(!out.status.success());
    assert!(stderr(&out).contains("unknown error code"));
}
