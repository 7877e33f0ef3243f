//! Sentinel tokens and request framing for the unframed shell stream.
//!
//! The transport gives us raw bytes with no message boundaries. Every request
//! ends with a `printf` that emits a blank separator, the shell's `$?`, and a
//! freshly generated sentinel, each on its own line. The reader consumes lines
//! until one equals the sentinel exactly; the line before it is the status.

use rand::Rng;

use crate::error::{PshError, PshResult};

/// Fixed ASCII prefix of every sentinel line.
pub const SENTINEL_PREFIX: &str = "PSH_SENTINEL_";

/// Number of random characters appended to the prefix.
pub const SENTINEL_RANDOM_LEN: usize = 30;

const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Generate a fresh sentinel token.
///
/// Must be called once per submission. Reusing a token lets a late echo
/// from a previous, poorly drained command terminate the wrong read.
pub fn new_sentinel() -> String {
    sentinel_from_rng(&mut rand::thread_rng())
}

/// Generate a sentinel from a caller-provided random source.
pub fn sentinel_from_rng<R: Rng + ?Sized>(rng: &mut R) -> String {
    let mut token = String::with_capacity(SENTINEL_PREFIX.len() + SENTINEL_RANDOM_LEN);
    token.push_str(SENTINEL_PREFIX);
    for _ in 0..SENTINEL_RANDOM_LEN {
        token.push(ALPHABET[rng.gen_range(0..ALPHABET.len())] as char);
    }
    token
}

/// The trailing statement that reports `$?` and the sentinel.
fn status_trailer(sentinel: &str) -> String {
    format!("printf '\\n%s\\n%s\\n' \"$?\" '{sentinel}'")
}

/// Build the bytes written to the shell for an ordinary command.
///
/// An empty command produces only the trailer, which is how the login
/// banner gets drained during connect. A command that already ends in a
/// control operator (`;`, `&`, `|`) is joined to the trailer with a newline,
/// since `;` after any of them is a shell syntax error.
pub fn command_request(command: &str, sentinel: &str) -> Vec<u8> {
    let command = command.trim_end();
    let mut request = String::with_capacity(command.len() + 64);
    if !command.is_empty() {
        request.push_str(command);
        request.push_str(if ends_with_operator(command) { "\n" } else { "; " });
    }
    request.push_str(&status_trailer(sentinel));
    request.push('\n');
    request.into_bytes()
}

fn ends_with_operator(command: &str) -> bool {
    let mut tail = command.chars().rev();
    matches!(tail.next(), Some(';' | '&' | '|')) && tail.next() != Some('\\')
}

/// The command that streams a file's raw contents.
///
/// `quoted_path` must already be shell-quoted. Sent through
/// [`command_request`] like any other command, so the blob ends with the
/// separator newline and the status line that [`strip_blob`] removes.
pub fn file_read_command(quoted_path: &str) -> String {
    format!("cat -- {quoted_path}")
}

/// Strip trailing `\n` then trailing `\r` bytes.
pub fn trim_line_ending(line: &[u8]) -> &[u8] {
    let mut end = line.len();
    while end > 0 && line[end - 1] == b'\n' {
        end -= 1;
    }
    while end > 0 && line[end - 1] == b'\r' {
        end -= 1;
    }
    &line[..end]
}

/// Whether a raw line read from the shell is exactly the sentinel.
pub fn is_sentinel_line(line: &[u8], sentinel: &str) -> bool {
    trim_line_ending(line) == sentinel.as_bytes()
}

fn parse_status(text: &str) -> PshResult<i32> {
    text.trim()
        .parse::<i32>()
        .map_err(|_| PshError::Desync(format!("expected exit status, got {text:?}")))
}

/// Split the lines preceding the sentinel into output and exit status.
///
/// The last line is the status. At most one trailing blank line is then
/// dropped: it is the separator the trailer emits when the command's own
/// output already ended with a newline.
pub fn split_status(mut lines: Vec<String>) -> PshResult<(Vec<String>, i32)> {
    let status = lines
        .pop()
        .ok_or_else(|| PshError::Desync("sentinel arrived without a status line".into()))?;
    let code = parse_status(&status)?;
    if lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }
    Ok((lines, code))
}

/// Split a raw blob (everything before the sentinel line) into content and status.
///
/// The blob ends with `<sync newline><status>\n`; both are removed so the
/// content comes back byte-for-byte.
pub fn strip_blob(mut blob: Vec<u8>) -> PshResult<(Vec<u8>, i32)> {
    if blob.last() != Some(&b'\n') {
        return Err(PshError::Desync("raw response missing status line".into()));
    }
    blob.pop();
    let split = blob
        .iter()
        .rposition(|&b| b == b'\n')
        .ok_or_else(|| PshError::Desync("raw response missing sync newline".into()))?;
    let code = parse_status(&String::from_utf8_lossy(&blob[split + 1..]))?;
    blob.truncate(split);
    Ok((blob, code))
}
