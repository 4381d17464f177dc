use std::ffi::OsStr;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Output, Stdio};

/// Return the path of the envsubst binary built alongside the tests.
pub fn envsubst_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_envsubst"))
}

/// Run envsubst with `args` under exactly the environment `env`, feeding it `stdin`.
pub fn run(args: &[&str], env: &[(&str, &str)], stdin: &str) -> Output {
    run_os(args, env, stdin)
}

/// Like [run], but the arguments need not be UTF-8.
pub fn run_os<S: AsRef<OsStr>>(args: &[S], env: &[(&str, &str)], stdin: &str) -> Output {
    let mut child = Command::new(envsubst_binary())
        .args(args)
        .env_clear()
        .envs(env.iter().copied())
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("envsubst should spawn");
    let mut input = child.stdin.take().expect("stdin should be piped");
    // envsubst exits without reading stdin in some modes; a broken pipe is expected there.
    let _ = input.write_all(stdin.as_bytes());
    drop(input);
    child.wait_with_output().expect("envsubst should run to completion")
}
