mod common;

use common::{run, run_os};

fn stdout(output: &std::process::Output) -> String {
    String::from_utf8(output.stdout.clone()).expect("stdout should be UTF-8")
}

fn stderr(output: &std::process::Output) -> String {
    String::from_utf8(output.stderr.clone()).expect("stderr should be UTF-8")
}

#[test]
fn substitutes_stdin() {
    let output = run(
        &[],
        &[("USER", "alice"), ("HOME", "/home/alice")],
        "$USER lives in ${HOME}.\n",
    );
    assert_eq!(Some(0), output.status.code());
    assert_eq!("alice lives in /home/alice.\n", stdout(&output));
}

#[test]
fn restricts_to_shell_format() {
    let output = run(
        &["$USER"],
        &[("USER", "alice"), ("HOME", "/home/alice")],
        "$USER lives in ${HOME}.\n",
    );
    assert_eq!(Some(0), output.status.code());
    assert_eq!("alice lives in ${HOME}.\n", stdout(&output));
}

#[test]
fn lists_variables() {
    let output = run(&["--variables", "$B ${A} $A"], &[], "$IGNORED\n");
    assert_eq!(Some(0), output.status.code());
    assert_eq!("A\nB\n", stdout(&output));
    let output = run(&["-v", "no references"], &[], "");
    assert_eq!(Some(0), output.status.code());
    assert_eq!("", stdout(&output));
}

#[test]
fn help_and_version() {
    let output = run(&["--help"], &[], "");
    assert_eq!(Some(0), output.status.code());
    assert!(stdout(&output).starts_with("Usage: envsubst [OPTION] [SHELL-FORMAT]"));
    let output = run(&["-V"], &[], "");
    assert_eq!(Some(0), output.status.code());
    assert!(stdout(&output).starts_with("envsubst "));
}

#[test]
fn variables_without_pattern() {
    let output = run(&["-v"], &[], "");
    assert_eq!(Some(1), output.status.code());
    assert!(stderr(&output).starts_with("envsubst: missing arguments\n"));
}

#[test]
fn too_many_arguments() {
    let output = run(&["$A", "$B"], &[], "");
    assert_eq!(Some(1), output.status.code());
    assert!(stderr(&output).starts_with("envsubst: too many arguments\n"));
}

#[test]
fn unknown_option() {
    let output = run(&["--bogus"], &[], "");
    assert_eq!(Some(1), output.status.code());
    assert!(stderr(&output).contains("Try 'envsubst --help' for more information"));
}

#[cfg(unix)]
#[test]
fn arguments_that_are_not_utf8() {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    let output = run_os(&[OsStr::from_bytes(b"$A\xff")], &[("A", "a")], "$A\n");
    assert_eq!(Some(1), output.status.code());
    assert!(output.stdout.is_empty());
    let stderr = stderr(&output);
    assert!(stderr.contains("not valid UTF-8"), "{stderr}");
    assert!(stderr.contains("Try 'envsubst --help' for more information"));
}
