use std::fs;
use std::io::Write;
use std::process::{Command, Output, Stdio};
use std::sync::atomic::{AtomicUsize, Ordering};

const COMPILER: &str = env!("CARGO_BIN_EXE_pymepa");

static TEST_COUNTER: AtomicUsize = AtomicUsize::new(0);

fn run_with_stdin(args: &[&str], source: &str) -> Output {
  let mut child = Command::new(COMPILER)
    .args(args)
    .stdin(Stdio::piped())
    .stdout(Stdio::piped())
    .stderr(Stdio::piped())
    .spawn()
    .expect("failed to run compiler");
  child
    .stdin
    .take()
    .expect("stdin is piped")
    .write_all(source.as_bytes())
    .expect("failed to write source");
  child.wait_with_output().expect("failed to wait for compiler")
}

#[test]
fn compiles_file_argument() {
  // Unique file names keep parallel tests apart.
  let id = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
  let path = std::env::temp_dir().join(format!("pymepa_cli_{}_{id}.py", std::process::id()));
  fs::write(&path, "x = 1\nprint(x)\n").expect("failed to write source file");

  let output = Command::new(COMPILER)
    .arg("--file")
    .arg(&path)
    .output()
    .expect("failed to run compiler");
  let _ = fs::remove_file(&path);

  assert!(output.status.success());
  let stdout = String::from_utf8_lossy(&output.stdout);
  let lines: Vec<&str> = stdout.lines().collect();
  assert_eq!(lines[..2], ["INPP", "AMEM 1"]);
  assert!(lines.contains(&"IMPR"));
  assert_eq!(lines.last(), Some(&"PARA"));
}

#[test]
fn reads_standard_input_when_no_file_is_given() {
  let output = run_with_stdin(&[], "print(1)\n");
  assert!(output.status.success());
  let stdout = String::from_utf8_lossy(&output.stdout);
  assert!(stdout.contains("CRCT 1\nIMPR\n"));
}

#[test]
fn errors_go_to_stderr_with_failure_status() {
  let output = run_with_stdin(&[], "print(x)\n");
  assert_eq!(output.status.code(), Some(1));
  assert!(output.stdout.is_empty());
  let stderr = String::from_utf8_lossy(&output.stderr);
  assert!(stderr.contains("semantic error on line 1: variable 'x' not declared"));
}

#[test]
fn emits_tokens() {
  let output = run_with_stdin(&["--emit", "tokens"], "x = 1\n");
  assert!(output.status.success());
  let stdout = String::from_utf8_lossy(&output.stdout);
  let lines: Vec<&str> = stdout.lines().map(str::trim).collect();
  assert_eq!(
    lines,
    [
      "1  IDENTIFIER x",
      "1  ASSIGN     =",
      "1  NUMBER     1",
      "1  NEWLINE",
      "2  EOF",
    ]
  );
}

#[test]
fn emits_ast_without_semantic_checks() {
  let output = run_with_stdin(&["--emit", "ast"], "print(x)\n");
  assert!(output.status.success());
  let stdout = String::from_utf8_lossy(&output.stdout);
  assert!(stdout.contains("Program"));
  assert!(stdout.contains("\"print\""));
}

#[test]
fn missing_file_is_reported() {
  let output = Command::new(COMPILER)
    .args(["--file", "/nonexistent/pymepa/source.py"])
    .output()
    .expect("failed to run compiler");
  assert_eq!(output.status.code(), Some(1));
  let stderr = String::from_utf8_lossy(&output.stderr);
  assert!(stderr.contains("error reading source file"));
}
