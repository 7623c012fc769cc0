use std::time::Duration;

use tokio::io::AsyncReadExt;

use runnable::worker::{CommandLine, Launcher, OsLauncher, ProcessHandle, EXIT_CODE_UNSET};

fn command(line: &str) -> CommandLine {
    CommandLine::parse(line).unwrap()
}

async fn run_to_completion(line: &str) -> (i32, String) {
    let mut process = OsLauncher::new().spawn(&command(line)).unwrap();
    let mut output = process.take_output().unwrap();

    let mut buf = Vec::new();
    output.read_to_end(&mut buf).await.unwrap();
    let code = process.wait().await.unwrap();

    (code, String::from_utf8(buf).unwrap())
}

#[tokio::test]
async fn test_simple_command_output() {
    let (code, output) = run_to_completion("echo hello").await;
    assert_eq!(code, 0);
    assert_eq!(output, "hello\n");
}

#[tokio::test]
async fn test_empty_output() {
    let (code, output) = run_to_completion("true").await;
    assert_eq!(code, 0);
    assert!(output.is_empty());
}

#[tokio::test]
async fn test_large_output() {
    let (code, output) = run_to_completion("seq 1 1000").await;
    assert_eq!(code, 0);
    assert_eq!(output.lines().count(), 1000);
    assert_eq!(output.lines().last(), Some("1000"));
}

#[tokio::test]
async fn test_nonzero_exit_code() {
    let (code, _) = run_to_completion("sh -c 'exit 3'").await;
    assert_eq!(code, 3);
}

#[tokio::test]
async fn test_stdout_and_stderr_are_merged() {
    let (code, output) = run_to_completion("sh -c 'echo out; echo err >&2'").await;
    assert_eq!(code, 0);
    assert!(output.contains("out\n"));
    assert!(output.contains("err\n"));
}

#[tokio::test]
async fn test_arguments_are_not_shell_interpreted() {
    // No shell is involved, so the glob and variable are passed through.
    let (_, output) = run_to_completion("echo '*' '$HOME'").await;
    assert_eq!(output, "* $HOME\n");
}

#[tokio::test]
async fn test_stdin_is_closed() {
    let result = tokio::time::timeout(Duration::from_secs(5), run_to_completion("cat")).await;
    let (code, output) = result.expect("cat should see EOF on stdin");
    assert_eq!(code, 0);
    assert!(output.is_empty());
}

#[tokio::test]
async fn test_missing_binary_fails_to_spawn() {
    let result = OsLauncher::new().spawn(&command("/nonexistent/definitely-not-a-binary"));
    assert!(result.is_err());
}

#[tokio::test]
async fn test_output_is_taken_once() {
    let mut process = OsLauncher::new().spawn(&command("true")).unwrap();
    assert!(process.take_output().is_some());
    assert!(process.take_output().is_none());
    process.wait().await.unwrap();
}

#[tokio::test]
async fn test_kill_terminates_process() {
    let mut process = OsLauncher::new().spawn(&command("sleep 30")).unwrap();
    process.start_kill().unwrap();

    let code = tokio::time::timeout(Duration::from_secs(5), process.wait())
        .await
        .expect("killed process should exit promptly")
        .unwrap();
    // Killed by a signal, so there is no exit code.
    assert_eq!(code, EXIT_CODE_UNSET);
}
