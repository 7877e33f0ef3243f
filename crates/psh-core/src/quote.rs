//! POSIX shell quoting for command lines sent to the remote shell.

use std::borrow::Cow;

use crate::error::{PshError, PshResult};

/// Quote a single word for a POSIX shell.
///
/// The remote side is always a POSIX shell, so unix rules apply even when
/// psh itself runs on Windows.
pub fn quote(word: &str) -> String {
    shell_escape::unix::escape(Cow::Borrowed(word)).into_owned()
}

/// Quote a remote file path for use as a command argument.
///
/// Paths that are not absolute are taken relative to the home directory,
/// since the shell's current directory can be anywhere after browsing.
/// The `~/` prefix stays outside the quotes so the remote shell expands it.
pub fn remote_path(path: &str) -> PshResult<String> {
    if path.is_empty() {
        return Err(PshError::InvalidPath("empty remote path".into()));
    }
    if path.starts_with('/') {
        return Ok(quote(path));
    }
    let relative = path.strip_prefix("~/").unwrap_or(path);
    if relative.is_empty() {
        return Ok("~/".to_string());
    }
    Ok(format!("~/{}", quote(relative)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_words_untouched() {
        assert_eq!(quote("file.txt"), "file.txt");
        assert_eq!(quote("dir/sub-dir/"), "dir/sub-dir/");
    }

    #[test]
    fn special_characters_quoted() {
        assert_eq!(quote("my file"), "'my file'");
        assert_eq!(quote("*.c"), "'*.c'");
        assert_eq!(quote("it's"), "'it'\\''s'");
        assert_eq!(quote(""), "''");
    }

    #[test]
    fn non_ascii_is_quoted_intact() {
        let q = quote("résumé ü.txt");
        assert!(q.starts_with('\''));
        assert!(q.contains("résumé ü.txt"));
    }

    #[test]
    fn absolute_paths() {
        assert_eq!(remote_path("/etc/hosts").unwrap(), "/etc/hosts");
        assert_eq!(remote_path("/tmp/a b").unwrap(), "'/tmp/a b'");
    }

    #[test]
    fn relative_paths_anchor_at_home() {
        assert_eq!(remote_path("notes.txt").unwrap(), "~/notes.txt");
        assert_eq!(remote_path("~/a b/c").unwrap(), "~/'a b/c'");
        assert_eq!(remote_path("~/").unwrap(), "~/");
    }

    #[test]
    fn empty_path_rejected() {
        assert!(remote_path("").is_err());
    }
}
