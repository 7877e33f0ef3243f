//! Remote filesystem operations and browsing, with a temp dir as `$HOME`.
#![cfg(unix)]

use std::fs;
use std::path::Path;
use std::process::Command;
use std::sync::Arc;

use psh_client::remote::{self, FileContents};
use psh_client::{ActionOutcome, Browser, Selection, SessionRegistry, ShellChannel};
use psh_core::{BrowseAction, EntryKind, EntrySize, PathItem, PathStack, PshError};
use tempfile::TempDir;

fn shell_in(home: &Path) -> ShellChannel {
    let mut command = Command::new("sh");
    command.env("HOME", home).current_dir(home);
    ShellChannel::connect_command(command, "local").expect("connect to local sh")
}

fn fixture() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    fs::create_dir_all(root.join("src/bin")).unwrap();
    fs::create_dir(root.join("sub dir")).unwrap();
    fs::write(root.join("src/a.c"), "int a;\n").unwrap();
    fs::write(root.join("src/b.c"), "int b;\n").unwrap();
    fs::write(root.join("src/c.h"), "").unwrap();
    fs::write(root.join("my file.txt"), "spaces\n").unwrap();
    fs::write(root.join("star*name"), "star\n").unwrap();
    fs::write(root.join("résumé.txt"), "accents\n").unwrap();
    fs::write(root.join("five"), "12345").unwrap();
    dir
}

#[test]
fn long_listing_of_home() {
    let home = fixture();
    let channel = shell_in(home.path());
    let listing = remote::list_dir(&channel, false).unwrap();
    assert!(listing.warnings.is_empty(), "{:?}", listing.warnings);

    let find = |name: &str| {
        listing
            .entries
            .iter()
            .find(|e| e.name == name)
            .unwrap_or_else(|| panic!("{name} missing from {:?}", listing.entries))
    };
    assert_eq!(find("src/").kind, EntryKind::Folder);
    // some filesystems report a link count of 1 for every folder
    assert!(matches!(find("src/").size, EntrySize::Subfolders(0 | 1)));
    assert_eq!(find("sub dir/").size, EntrySize::Subfolders(0));
    assert_eq!(find("five").size, EntrySize::Bytes(5));
    assert_eq!(find("my file.txt").kind, EntryKind::File);
    find("star*name");
    find("résumé.txt");
    assert!(listing.entries.iter().all(|e| e.name != "./"));
}

#[test]
fn hidden_files_on_request() {
    let home = fixture();
    fs::write(home.path().join(".secret"), "x").unwrap();
    let channel = shell_in(home.path());

    let visible = remote::list_dir(&channel, false).unwrap();
    assert!(visible.entries.iter().all(|e| e.name != ".secret"));
    let all = remote::list_dir(&channel, true).unwrap();
    assert!(all.entries.iter().any(|e| e.name == ".secret"));
}

#[test]
fn short_listing_marks_folders() {
    let home = fixture();
    let channel = shell_in(home.path());
    let names = remote::list_names(&channel).unwrap();
    let folders: Vec<_> = names.iter().filter(|e| e.is_folder()).map(|e| e.name.as_str()).collect();
    assert!(folders.contains(&"src/"));
    assert!(folders.contains(&"sub dir/"));
    assert!(names.iter().any(|e| e.name == "résumé.txt" && !e.is_folder()));
}

#[test]
fn navigation() {
    let home = fixture();
    let channel = shell_in(home.path());
    remote::change_dir(&channel, "sub dir/").unwrap();
    assert!(remote::working_dir(&channel).unwrap().ends_with("/sub dir"));
    remote::change_dir_up(&channel).unwrap();
    remote::go_to(&channel, "src/bin").unwrap();
    assert!(remote::working_dir(&channel).unwrap().ends_with("/src/bin"));
    remote::go_to(&channel, "").unwrap();
    assert_eq!(
        Path::new(&remote::working_dir(&channel).unwrap()).canonicalize().unwrap(),
        home.path().canonicalize().unwrap()
    );

    let err = remote::change_dir(&channel, "missing/").unwrap_err();
    match err {
        PshError::RemoteCommand { code, message } => {
            assert_ne!(code, 0);
            assert!(message.starts_with("Failed to enter missing/."));
        }
        other => panic!("expected remote error, got {other:?}"),
    }
    // still usable after a failed cd
    assert!(remote::exists(&channel, "src").unwrap());
}

#[test]
fn glob_expands_files_only() {
    let home = fixture();
    let channel = shell_in(home.path());
    remote::change_dir(&channel, "src/").unwrap();

    let mut matches = remote::glob(&channel, "*.c").unwrap();
    matches.sort();
    assert_eq!(matches, vec!["a.c", "b.c"]);

    let mut both = remote::glob(&channel, "*.c *.h").unwrap();
    both.sort();
    assert_eq!(both, vec!["a.c", "b.c", "c.h"]);

    assert!(remote::glob(&channel, "*").unwrap().iter().all(|n| n != "bin/"));
    assert!(remote::glob(&channel, "*.zzz").unwrap().is_empty());
    assert!(matches!(
        remote::glob(&channel, "a.c"),
        Err(PshError::InvalidGlob(_))
    ));
}

#[test]
fn exists_and_make_dirs() {
    let home = fixture();
    let channel = shell_in(home.path());
    assert!(remote::exists(&channel, "my file.txt").unwrap());
    assert!(remote::exists(&channel, "star*name").unwrap());
    assert!(!remote::exists(&channel, "nope").unwrap());

    remote::make_dirs(&channel, "deep/er dir/").unwrap();
    assert!(home.path().join("deep/er dir").is_dir());
    assert!(remote::exists(&channel, "~/deep/er dir").unwrap());
}

#[test]
fn read_file_is_byte_exact() {
    let home = fixture();
    let binary: Vec<u8> = vec![0, 0xff, b'\r', b'\n', 0xc3, b'\n', b'\n', 0x80, b'z'];
    fs::write(home.path().join("blob.bin"), &binary).unwrap();
    let channel = shell_in(home.path());

    let contents = remote::read_file(&channel, "blob.bin").unwrap();
    assert_eq!(
        contents,
        FileContents {
            bytes: binary,
            complete: true,
            warning: None,
        }
    );

    assert_eq!(remote::read_file(&channel, "five").unwrap().bytes, b"12345");
    assert_eq!(remote::read_file(&channel, "src/c.h").unwrap().bytes, b"");
    assert_eq!(remote::read_file(&channel, "my file.txt").unwrap().bytes, b"spaces\n");
    assert_eq!(remote::read_file(&channel, "star*name").unwrap().bytes, b"star\n");
    assert_eq!(remote::read_file(&channel, "résumé.txt").unwrap().bytes, b"accents\n");

    let absolute = home.path().join("five");
    let contents = remote::read_file(&channel, absolute.to_str().unwrap()).unwrap();
    assert_eq!(contents.bytes, b"12345");
}

#[test]
fn read_missing_file_is_remote_error() {
    let home = fixture();
    let channel = shell_in(home.path());
    match remote::read_file(&channel, "absent.txt") {
        Err(PshError::RemoteCommand { code, message }) => {
            assert_eq!(code, 1);
            assert!(message.starts_with("Failed to read absent.txt."), "{message}");
            assert!(message.contains("No such file or directory"), "{message}");
        }
        other => panic!("expected remote error, got {other:?}"),
    }
    // the channel is still in sync
    assert_eq!(remote::read_file(&channel, "five").unwrap().bytes, b"12345");
}

#[test]
fn read_after_transport_loss_is_incomplete() {
    let home = fixture();
    let channel = shell_in(home.path());
    let _ = channel.run_cmd("exit 255");
    let contents = remote::read_file(&channel, "five").unwrap();
    assert!(!contents.complete);
    assert!(contents.bytes.is_empty());
    assert!(contents.warning.unwrap().starts_with("Connection lost while reading five."));
}

#[test]
fn create_file_keeps_existing_content() {
    let home = fixture();
    let channel = shell_in(home.path());
    remote::create_file(&channel, "five").unwrap();
    assert_eq!(fs::read(home.path().join("five")).unwrap(), b"12345");
    remote::create_file(&channel, "fresh.txt").unwrap();
    assert_eq!(fs::read(home.path().join("fresh.txt")).unwrap(), b"");
}

#[test]
fn registry_loads_each_buffer_once() {
    let home = fixture();
    let channel = Arc::new(shell_in(home.path()));
    let mut registry = SessionRegistry::new();
    let a = registry.register(Arc::clone(&channel), "src/a.c");
    let b = registry.register(Arc::clone(&channel), "src/b.c");
    drop(channel);
    assert!(registry.is_pending(a) && registry.is_pending(b));

    assert_eq!(registry.load(a).unwrap().bytes, b"int a;\n");
    assert!(!registry.is_pending(a));
    assert!(!registry.is_idle());
    assert!(registry.load(a).is_err());

    assert_eq!(registry.load(b).unwrap().bytes, b"int b;\n");
    assert!(registry.is_idle());
}

#[test]
fn browser_walks_folders_and_runs_actions() {
    let home = fixture();
    let channel = Arc::new(shell_in(home.path()));
    let mut browser = Browser::new(channel, false).unwrap();

    let view = browser.list().unwrap();
    assert_eq!(view.path, "");
    assert_eq!(view.actions, vec![BrowseAction::Glob, BrowseAction::New]);

    assert_eq!(browser.select("src/").unwrap(), Selection::Folder);
    let view = browser.list().unwrap();
    assert_eq!(view.path, "src/");
    assert!(view.entries.iter().any(|e| e.name == "bin/"));

    let spec = browser.start_action(BrowseAction::Glob);
    assert_eq!(spec.label, "Glob");
    assert!(matches!(browser.run_action("a.c"), Err(PshError::InvalidGlob(_))));
    match browser.run_action("*.c").unwrap() {
        ActionOutcome::Files(mut files) => {
            files.sort();
            assert_eq!(files, vec!["src/a.c", "src/b.c"]);
        }
        other => panic!("expected files, got {other:?}"),
    }
    assert_eq!(browser.stack().len(), 1);

    assert_eq!(browser.select("bin/").unwrap(), Selection::Folder);
    let view = browser.list().unwrap();
    assert!(view.entries.is_empty());
    assert_eq!(view.actions, vec![BrowseAction::New]);

    browser.start_action(BrowseAction::New);
    let outcome = browser.run_action("notes/todo.txt").unwrap();
    assert_eq!(
        outcome,
        ActionOutcome::Created {
            folder: "src/bin/notes/".into(),
            file: Some("src/bin/notes/todo.txt".into()),
        }
    );
    assert!(home.path().join("src/bin/notes/todo.txt").is_file());

    assert_eq!(
        browser.back().unwrap(),
        Some(PathItem::Entry("bin/".into()))
    );
    assert_eq!(
        browser.select("a.c").unwrap(),
        Selection::File("src/a.c".into())
    );
    assert_eq!(browser.back().unwrap(), Some(PathItem::Entry("a.c".into())));
    assert_eq!(browser.current_path(), "src/");
    assert!(remote::working_dir(browser.channel()).unwrap().ends_with("/src"));
}

#[test]
fn browser_resumes_saved_stack() {
    let home = fixture();
    let channel = Arc::new(shell_in(home.path()));
    let saved = PathStack::from_items(vec![
        PathItem::Entry("src/".into()),
        PathItem::Entry("bin/".into()),
        PathItem::Entry("main.rs".into()),
    ]);
    let browser = Browser::resume(Arc::clone(&channel), &saved, false).unwrap();
    assert_eq!(browser.current_path(), "src/bin/");

    let gone = PathStack::from_items(vec![
        PathItem::Entry("src/".into()),
        PathItem::Entry("vanished/".into()),
    ]);
    let browser = Browser::resume(channel, &gone, false).unwrap();
    assert_eq!(browser.current_path(), "src/");
}

#[test]
fn browser_stops_at_filesystem_root() {
    let home = fixture();
    let channel = Arc::new(shell_in(home.path()));
    let mut browser = Browser::resume(channel, &PathStack::from_dir("/"), false).unwrap();
    assert_eq!(browser.current_path(), "/");
    assert!(!browser.stack().can_go_back());

    assert_eq!(browser.back().unwrap(), None);
    assert_eq!(browser.select("../").unwrap(), Selection::Folder);
    assert_eq!(browser.current_path(), "/");
    assert_eq!(remote::working_dir(browser.channel()).unwrap(), "/");

    // the stack still matches the shell: entering a folder lands under `/`
    let top = home
        .path()
        .components()
        .nth(1)
        .and_then(|c| c.as_os_str().to_str())
        .unwrap()
        .to_string();
    browser.select(&format!("{top}/")).unwrap();
    assert_eq!(browser.current_path(), format!("/{top}/"));
    assert_eq!(remote::working_dir(browser.channel()).unwrap(), format!("/{top}"));
}
