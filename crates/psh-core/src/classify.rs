//! Turns exit codes and stderr text into user-facing failure descriptions.
//!
//! Exit code 255 (or no code at all) means `ssh` itself failed; a negative
//! code means the process was killed by a signal; anything else came from the
//! remote command.

use std::fmt;

use crate::TRANSPORT_FAILURE_CODE;

/// Where a failure originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The transport failed (exit 255 or indeterminate).
    Transport,
    /// The transport was terminated by a signal.
    Signal,
    /// The remote command ran and exited nonzero.
    RemoteCommand,
}

impl FailureKind {
    pub fn from_code(code: Option<i32>) -> Self {
        match code {
            None | Some(TRANSPORT_FAILURE_CODE) => FailureKind::Transport,
            Some(c) if c < 0 => FailureKind::Signal,
            Some(_) => FailureKind::RemoteCommand,
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FailureKind::Transport => "ssh",
            FailureKind::Signal => "signal",
            FailureKind::RemoteCommand => "remote",
        })
    }
}

/// Stderr captured from the transport, decoded or not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StderrText {
    Text(String),
    Bytes(Vec<u8>),
}

impl StderrText {
    /// Decode to text, replacing invalid UTF-8, with CRs and trailing newlines removed.
    ///
    /// ssh writes CRLF line endings to stderr.
    pub fn normalized(&self) -> String {
        let text = match self {
            StderrText::Text(s) => s.clone(),
            StderrText::Bytes(b) => String::from_utf8_lossy(b).into_owned(),
        };
        text.replace('\r', "").trim_end_matches('\n').to_string()
    }
}

impl From<String> for StderrText {
    fn from(s: String) -> Self {
        StderrText::Text(s)
    }
}

impl From<&str> for StderrText {
    fn from(s: &str) -> Self {
        StderrText::Text(s.to_string())
    }
}

impl From<Vec<u8>> for StderrText {
    fn from(b: Vec<u8>) -> Self {
        StderrText::Bytes(b)
    }
}

const HINTS: &[(&str, &str)] = &[
    (
        "host key verification failed",
        "SSH to this server with your terminal to verify the host key or change the host_key_checking setting.",
    ),
    (
        "permission denied",
        "You must set up ssh public key authentication with this server for psh to work.",
    ),
    (
        "timed out",
        "The connect_timeout setting can be raised in the psh config if needed.",
    ),
];

const WINDOWS_MUX_SIGNATURE: &str = "getsockname failed: bad file descriptor";
const WINDOWS_MUX_HINT: &str =
    "This is likely from SSH not supporting multiplexing on Windows. You can disable multiplexing in the psh config.";

/// Build the message shown to the user for a failed operation.
pub fn classify(title: &str, code: Option<i32>, stderr: Option<&StderrText>) -> String {
    classify_for_platform(title, code, stderr, cfg!(windows))
}

pub(crate) fn classify_for_platform(
    title: &str,
    code: Option<i32>,
    stderr: Option<&StderrText>,
    windows: bool,
) -> String {
    let kind = FailureKind::from_code(code);
    let code_text = code.map_or_else(|| "unknown".to_string(), |c| c.to_string());
    let error = stderr.map(StderrText::normalized).unwrap_or_default();

    if error.is_empty() {
        return format!("{title}.\nAn unknown {kind} error occurred.\nError Code: {code_text}");
    }

    let mut msg = format!("{title}.\n\nCode: {code_text} ({kind})\nError: {error}");
    let lower = error.to_lowercase();
    for (needle, hint) in HINTS {
        if lower.contains(needle) {
            msg.push_str("\n\n");
            msg.push_str(hint);
        }
    }
    if windows && lower.contains(WINDOWS_MUX_SIGNATURE) {
        msg.push_str("\n\n");
        msg.push_str(WINDOWS_MUX_HINT);
    }
    msg
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_from_codes() {
        assert_eq!(FailureKind::from_code(None), FailureKind::Transport);
        assert_eq!(FailureKind::from_code(Some(255)), FailureKind::Transport);
        assert_eq!(FailureKind::from_code(Some(-9)), FailureKind::Signal);
        assert_eq!(FailureKind::from_code(Some(1)), FailureKind::RemoteCommand);
    }

    #[test]
    fn generic_message_without_stderr() {
        let msg = classify("Could not connect", Some(255), None);
        assert_eq!(msg, "Could not connect.\nAn unknown ssh error occurred.\nError Code: 255");

        let empty = StderrText::Text("\r\n".into());
        let msg = classify("Oops", None, Some(&empty));
        assert!(msg.contains("An unknown ssh error occurred"));
        assert!(msg.contains("Error Code: unknown"));
    }

    #[test]
    fn remote_error_with_text() {
        let err = StderrText::from("cat: x: No such file or directory\r\n");
        let msg = classify("Unable to open x", Some(1), Some(&err));
        assert_eq!(
            msg,
            "Unable to open x.\n\nCode: 1 (remote)\nError: cat: x: No such file or directory"
        );
    }

    #[test]
    fn hints_are_case_insensitive() {
        let err = StderrText::from("Host key verification failed.");
        let msg = classify("Could not connect", Some(255), Some(&err));
        assert!(msg.contains("verify the host key"));

        let err = StderrText::from("user@host: PERMISSION DENIED (publickey).");
        let msg = classify("Could not connect", Some(255), Some(&err));
        assert!(msg.contains("public key authentication"));

        let err = StderrText::from("ssh: connect to host x port 22: Connection timed out");
        let msg = classify("Could not connect", Some(255), Some(&err));
        assert!(msg.contains("connect_timeout"));
    }

    #[test]
    fn windows_hint_only_on_windows() {
        let err = StderrText::from("getsockname failed: Bad file descriptor");
        let on = classify_for_platform("t", Some(255), Some(&err), true);
        let off = classify_for_platform("t", Some(255), Some(&err), false);
        assert!(on.contains("multiplexing on Windows"));
        assert!(!off.contains("multiplexing on Windows"));
    }

    #[test]
    fn bytes_are_decoded_lossily() {
        let err = StderrText::Bytes(vec![b'b', b'a', b'd', 0xff, b'\n']);
        let msg = classify("t", Some(2), Some(&err));
        assert!(msg.contains("Error: bad\u{fffd}"));
    }

    #[test]
    fn signal_kind_is_reported() {
        let err = StderrText::from("killed");
        let msg = classify("t", Some(-15), Some(&err));
        assert!(msg.contains("Code: -15 (signal)"));
    }
}
