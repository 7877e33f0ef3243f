//! `psh cat user@host:path...` — print remote files.
//!
//! Files on the same host are opened together, so several files share one
//! shell. Output keeps the argument order. A file cut short by a lost
//! connection is printed as far as it got and counts as a failure.

use std::io::Write;

use anyhow::{bail, Result};
use psh_client::{open_files, OpenedFile};
use psh_core::RemoteEndpoint;
use tracing::warn;

use crate::commands::{blocking, endpoint};
use crate::config::Settings;

/// Argument indices per target, in first-seen order.
fn group_by_target(endpoints: &[RemoteEndpoint]) -> Vec<(String, Vec<usize>)> {
    let mut groups: Vec<(String, Vec<usize>)> = Vec::new();
    for (i, endpoint) in endpoints.iter().enumerate() {
        match groups.iter_mut().find(|(target, _)| *target == endpoint.target) {
            Some((_, indices)) => indices.push(i),
            None => groups.push((endpoint.target.clone(), vec![i])),
        }
    }
    groups
}

pub async fn run(locations: &[String], settings: &Settings) -> Result<()> {
    let endpoints = locations
        .iter()
        .map(|location| endpoint(location))
        .collect::<Result<Vec<_>>>()?;

    let mut opened: Vec<Option<OpenedFile>> = endpoints.iter().map(|_| None).collect();
    for (target, indices) in group_by_target(&endpoints) {
        let paths: Vec<String> = indices.iter().map(|&i| endpoints[i].path.clone()).collect();
        let config = settings.transport.clone();
        let browse = settings.browse.clone();
        let files = blocking(move || open_files(&target, &paths, &config, &browse)).await?;
        for (i, file) in indices.into_iter().zip(files) {
            opened[i] = Some(file);
        }
    }

    let mut failed = 0;
    let mut stdout = std::io::stdout().lock();
    for (location, file) in locations.iter().zip(opened) {
        let Some(file) = file else { continue };
        match file.contents {
            Ok(contents) => {
                stdout.write_all(&contents.bytes)?;
                if !contents.complete {
                    failed += 1;
                    if let Some(warning) = &contents.warning {
                        warn!("{}", warning);
                    }
                    eprintln!("psh: {location} is incomplete");
                }
            }
            Err(e) => {
                failed += 1;
                eprintln!("psh: {e}");
            }
        }
    }
    stdout.flush()?;

    if failed > 0 {
        bail!("{failed} of {} file(s) could not be read", locations.len());
    }
    Ok(())
}
