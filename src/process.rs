//! External process invocation for the wrapped deobfuscators.
//!
//! Every tool adapter reduces a request to an [`Invocation`]: a program, its arguments, an
//! optional line of stdin, and the path at which the tool is expected to leave its result.
//! [`Invocation::run`] executes it once under a wall-clock timeout and maps everything that can
//! go wrong onto a [`ToolFailure`].
//!
//! A failed invocation is an ordinary value. Nothing in here returns [`crate::Error`]; the
//! pipeline records the failure and moves on to the next tool.

use std::{
    ffi::{OsStr, OsString},
    fmt, fs,
    io::{self, Read, Write},
    path::{Path, PathBuf},
    process::{Child, Command, ExitStatus, Stdio},
    sync::mpsc::{self, Receiver, RecvTimeoutError, Sender},
    thread,
    time::{Duration, Instant},
};

/// Default wall-clock limit for a single tool invocation.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// How often a running child is polled for exit.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// A fully resolved command line for one tool run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    program: OsString,
    args: Vec<OsString>,
    stdin: Option<String>,
    expected_output: PathBuf,
}

impl Invocation {
    /// Creates an invocation of `program` that is expected to produce `expected_output`.
    pub fn new(program: impl AsRef<OsStr>, expected_output: impl Into<PathBuf>) -> Self {
        Self {
            program: program.as_ref().to_os_string(),
            args: Vec::new(),
            stdin: None,
            expected_output: expected_output.into(),
        }
    }

    /// Appends a single argument.
    #[must_use]
    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    /// Appends several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|arg| arg.as_ref().to_os_string()));
        self
    }

    /// Sets the text written to the process's stdin before it is closed.
    #[must_use]
    pub fn stdin(mut self, text: impl Into<String>) -> Self {
        self.stdin = Some(text.into());
        self
    }

    /// The program to execute.
    pub fn program(&self) -> &OsStr {
        &self.program
    }

    /// The arguments passed to the program.
    pub fn arguments(&self) -> &[OsString] {
        &self.args
    }

    /// The literal stdin text, if any.
    pub fn stdin_text(&self) -> Option<&str> {
        self.stdin.as_deref()
    }

    /// Where the tool is expected to write its result.
    pub fn expected_output(&self) -> &Path {
        &self.expected_output
    }

    /// Runs the command once.
    ///
    /// Succeeds with the expected output path if the process exits with status zero *and* that
    /// path exists afterwards.
    ///
    /// # Arguments
    ///
    /// * `timeout` - Wall-clock limit; the process is killed when it is exceeded.
    ///
    /// # Errors
    ///
    /// Returns a [`ToolFailure`] describing why no artifact was produced.
    pub fn run(&self, timeout: Duration) -> Result<PathBuf, ToolFailure> {
        log::debug!("running {}", self);

        let result = self.execute(timeout);
        if let Err(failure) = &result {
            log::debug!("{} failed: {}", self, failure);
        }
        result
    }

    fn execute(&self, timeout: Duration) -> Result<PathBuf, ToolFailure> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(if self.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let deadline = Instant::now() + timeout;
        let mut child = command.spawn().map_err(ToolFailure::Launch)?;

        let (sender, receiver) = mpsc::channel();
        let mut helpers = 0;
        if let (Some(pipe), Some(text)) = (child.stdin.take(), self.stdin.as_deref()) {
            feed(pipe, text.to_owned(), sender.clone());
            helpers += 1;
        }
        if let Some(pipe) = child.stdout.take() {
            drain(Stream::Stdout, pipe, sender.clone());
            helpers += 1;
        }
        if let Some(pipe) = child.stderr.take() {
            drain(Stream::Stderr, pipe, sender.clone());
            helpers += 1;
        }
        drop(sender);

        let status = match wait_until(&mut child, deadline) {
            Ok(Some(status)) => status,
            Ok(None) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(ToolFailure::Timeout(timeout));
            }
            Err(error) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(ToolFailure::Launch(error));
            }
        };

        // A background grandchild may keep the pipes open after the tool itself exited.
        let (stdout, stderr) = match collect(&receiver, helpers, deadline) {
            Ok(output) => output,
            Err(Collect::Expired) => return Err(ToolFailure::Timeout(timeout)),
            Err(Collect::Failed(error)) => return Err(ToolFailure::Launch(error)),
        };

        if !status.success() {
            return Err(ToolFailure::NonZeroExit {
                status,
                stdout,
                stderr,
            });
        }

        if self.expected_output.exists() {
            return Ok(self.expected_output.clone());
        }

        Err(ToolFailure::MissingOutput {
            directory_listing: list_directory(&self.expected_output),
            expected: self.expected_output.clone(),
        })
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.to_string_lossy())?;
        for arg in &self.args {
            let arg = arg.to_string_lossy();
            if arg.contains(char::is_whitespace) {
                write!(f, " \"{arg}\"")?;
            } else {
                write!(f, " {arg}")?;
            }
        }
        Ok(())
    }
}

/// Why a tool invocation did not yield an artifact.
///
/// The [`fmt::Display`] text of a failure is the raw error message that the failure patterns
/// of each tool are matched against, so it must embed the captured output verbatim.
#[derive(Debug)]
pub enum ToolFailure {
    /// The process could not be started, or talking to it failed at the OS level.
    Launch(io::Error),
    /// The process did not exit within the limit and was killed.
    Timeout(Duration),
    /// The process exited unsuccessfully.
    NonZeroExit {
        /// Exit status as reported by the OS
        status: ExitStatus,
        /// Captured standard output
        stdout: String,
        /// Captured standard error
        stderr: String,
    },
    /// The process exited cleanly but the expected artifact does not exist.
    MissingOutput {
        /// The path the tool was expected to write
        expected: PathBuf,
        /// Names of the entries next to the expected path, for diagnosis
        directory_listing: Vec<String>,
    },
}

impl ToolFailure {
    /// Returns `true` for [`ToolFailure::Timeout`].
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, ToolFailure::Timeout(_))
    }

    /// Short stable label for reports.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            ToolFailure::Launch(_) => "os-launch-failure",
            ToolFailure::Timeout(_) => "timeout",
            ToolFailure::NonZeroExit { .. } => "non-zero-exit",
            ToolFailure::MissingOutput { .. } => "missing-expected-output",
        }
    }
}

impl fmt::Display for ToolFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolFailure::Launch(error) => {
                write!(f, "OS error occurred while deobfuscating: {error}.")
            }
            ToolFailure::Timeout(limit) => write!(
                f,
                "Timed out after {} seconds while deobfuscating.",
                limit.as_secs_f64()
            ),
            ToolFailure::NonZeroExit {
                status,
                stdout,
                stderr,
            } => write!(
                f,
                "An unexpected error occurred when deobfuscating ({status}). stderr: {stderr} stdout: {stdout}."
            ),
            ToolFailure::MissingOutput {
                expected,
                directory_listing,
            } => write!(
                f,
                "Failed to produce the expected output file {}; contents of the output directory are [{}].",
                expected.display(),
                directory_listing.join(", ")
            ),
        }
    }
}

impl std::error::Error for ToolFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ToolFailure::Launch(error) => Some(error),
            _ => None,
        }
    }
}

/// Which child pipe a helper thread served.
#[derive(Debug, Clone, Copy)]
enum Stream {
    Stdin,
    Stdout,
    Stderr,
}

/// What a helper thread hands back when its pipe is done.
type Delivery = (Stream, io::Result<Vec<u8>>);

enum Collect {
    /// The deadline passed with a helper still blocked on its pipe.
    Expired,
    Failed(io::Error),
}

/// Writes `text` to the child's stdin on a helper thread and closes it.
fn feed<W: Write + Send + 'static>(mut pipe: W, text: String, sender: Sender<Delivery>) {
    thread::spawn(move || {
        let result = match pipe.write_all(text.as_bytes()) {
            // The tool exited without reading its input; its exit status tells the rest.
            Err(error) if error.kind() == io::ErrorKind::BrokenPipe => Ok(()),
            other => other,
        };
        drop(pipe);
        let _ = sender.send((Stream::Stdin, result.map(|()| Vec::new())));
    });
}

/// Reads a pipe to the end on a helper thread so the child never blocks on a full pipe.
fn drain<R: Read + Send + 'static>(stream: Stream, mut pipe: R, sender: Sender<Delivery>) {
    thread::spawn(move || {
        let mut buffer = Vec::new();
        let result = pipe.read_to_end(&mut buffer).map(|_| buffer);
        // The receiver is gone once the runner gave up on this invocation.
        let _ = sender.send((stream, result));
    });
}

/// Waits for `pending` helper deliveries, no later than `deadline`.
///
/// Helpers still running when the deadline passes stay detached.
fn collect(
    receiver: &Receiver<Delivery>,
    mut pending: usize,
    deadline: Instant,
) -> Result<(String, String), Collect> {
    let (mut stdout, mut stderr) = (Vec::new(), Vec::new());
    while pending > 0 {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let (stream, result) = match receiver.recv_timeout(remaining) {
            Ok(delivery) => delivery,
            Err(RecvTimeoutError::Timeout) => return Err(Collect::Expired),
            Err(RecvTimeoutError::Disconnected) => {
                return Err(Collect::Failed(io::Error::other(
                    "pipe helper thread panicked",
                )))
            }
        };
        let bytes = result.map_err(Collect::Failed)?;
        match stream {
            Stream::Stdin => {}
            Stream::Stdout => stdout = bytes,
            Stream::Stderr => stderr = bytes,
        }
        pending -= 1;
    }

    Ok((
        String::from_utf8_lossy(&stdout).into_owned(),
        String::from_utf8_lossy(&stderr).into_owned(),
    ))
}

/// Polls the child until it exits or `deadline` passes. `Ok(None)` means the deadline passed.
fn wait_until(child: &mut Child, deadline: Instant) -> io::Result<Option<ExitStatus>> {
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }

        let now = Instant::now();
        if now >= deadline {
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL.min(deadline - now));
    }
}

fn list_directory(expected: &Path) -> Vec<String> {
    let directory = match expected.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut names: Vec<String> = match fs::read_dir(directory) {
        Ok(entries) => entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect(),
        Err(_) => Vec::new(),
    };
    names.sort();
    names
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn shell(script: &str, expected_output: &Path) -> Invocation {
        Invocation::new("sh", expected_output).args(["-c", script])
    }

    #[test]
    fn succeeds_when_output_exists() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.bin");

        let invocation = shell(&format!("echo done > '{}'", out.display()), &out);
        let result = invocation.run(DEFAULT_TIMEOUT).unwrap();

        assert_eq!(result, out);
    }

    #[test]
    fn clean_exit_without_output_is_missing_output() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("input.exe"), b"MZ").unwrap();
        let out = dir.path().join("never.bin");

        let failure = shell("exit 0", &out).run(DEFAULT_TIMEOUT).unwrap_err();

        match &failure {
            ToolFailure::MissingOutput {
                expected,
                directory_listing,
            } => {
                assert_eq!(expected, &out);
                assert_eq!(directory_listing, &vec!["input.exe".to_string()]);
            }
            other => panic!("unexpected failure: {other:?}"),
        }
        assert!(failure.to_string().contains("never.bin"));
        assert_eq!(failure.label(), "missing-expected-output");
    }

    #[test]
    fn non_zero_exit_embeds_stdout_and_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.bin");

        let failure = shell("echo to-stdout; echo to-stderr >&2; exit 3", &out)
            .run(DEFAULT_TIMEOUT)
            .unwrap_err();

        assert!(matches!(failure, ToolFailure::NonZeroExit { .. }));
        let message = failure.to_string();
        assert!(message.contains("to-stdout"));
        assert!(message.contains("to-stderr"));
    }

    #[test]
    fn non_zero_exit_wins_over_existing_output() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.bin");
        std::fs::write(&out, b"stale").unwrap();

        let failure = shell("exit 1", &out).run(DEFAULT_TIMEOUT).unwrap_err();
        assert!(matches!(failure, ToolFailure::NonZeroExit { .. }));
    }

    #[test]
    fn timeout_kills_the_process() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.bin");

        let started = Instant::now();
        let failure = shell(&format!("sleep 5; touch '{}'", out.display()), &out)
            .run(Duration::from_millis(200))
            .unwrap_err();

        assert!(failure.is_timeout());
        assert!(started.elapsed() < Duration::from_secs(4));
        assert!(failure.to_string().contains("Timed out"));
        assert!(!out.exists());
    }

    #[test]
    fn background_grandchild_does_not_outlive_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.bin");

        // The tool exits at once, but the backgrounded sleep inherits stdout and stderr.
        let started = Instant::now();
        let failure = shell(&format!("touch '{}'; sleep 6 & exit 0", out.display()), &out)
            .run(Duration::from_secs(1))
            .unwrap_err();

        assert!(failure.is_timeout());
        assert!(started.elapsed() < Duration::from_secs(3));
        assert!(out.exists());
    }

    #[test]
    fn missing_program_is_launch_failure() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.bin");

        let failure = Invocation::new(dir.path().join("no-such-tool"), &out)
            .run(DEFAULT_TIMEOUT)
            .unwrap_err();

        assert!(matches!(failure, ToolFailure::Launch(_)));
        assert!(failure.to_string().starts_with("OS error occurred"));
    }

    #[test]
    fn stdin_text_reaches_the_process() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("from-stdin.txt");

        let invocation = shell(&format!("read line; echo \"$line\" > '{}'", out.display()), &out)
            .stdin("hello from stdin\n");
        invocation.run(DEFAULT_TIMEOUT).unwrap();

        let written = std::fs::read_to_string(&out).unwrap();
        assert_eq!(written.trim(), "hello from stdin");
    }

    #[test]
    fn unread_stdin_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.bin");

        let invocation =
            shell(&format!("touch '{}'", out.display()), &out).stdin("\n".repeat(1 << 20));
        assert_eq!(invocation.run(DEFAULT_TIMEOUT).unwrap(), out);
    }

    #[test]
    fn display_quotes_arguments_with_spaces() {
        let invocation = Invocation::new("mono", "/tmp/out")
            .arg("/opt/tools/ConfuserEx String Decryptor.exe")
            .arg("-f");

        assert_eq!(
            invocation.to_string(),
            "mono \"/opt/tools/ConfuserEx String Decryptor.exe\" -f"
        );
    }
}
