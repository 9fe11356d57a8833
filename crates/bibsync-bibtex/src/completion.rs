//! Record completion through an external bibliography tool.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::process::Stdio;

use thiserror::Error;
use tokio::process::Command;

use bibsync_core::PublicationRecord;

use crate::{BibError, format_record, parse_bib_str};

/// Key given to seed records before completion.
pub const SEED_ID: &str = "temp_entry";

#[derive(Error, Debug)]
pub enum CompletionError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("completion tool exited with {}", exit_code(.code))]
    Failed { code: Option<i32> },
    #[error("completion tool produced no output")]
    EmptyOutput,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Bib(#[from] BibError),
}

fn exit_code(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("status {c}"),
        None => "a signal".to_string(),
    }
}

/// Something that can fill in the missing fields of a sparse record.
pub trait CompletionOracle: Send + Sync {
    fn name(&self) -> &str;

    fn complete<'a>(
        &'a self,
        seed: &'a PublicationRecord,
    ) -> Pin<Box<dyn Future<Output = Result<PublicationRecord, CompletionError>> + Send + 'a>>;
}

/// Build the minimal record handed to a completion oracle: a DOI when the
/// input looks like one (`10.` prefix), a title otherwise.
pub fn seed_record(input: &str) -> PublicationRecord {
    let input = input.trim();
    let mut record = if input.starts_with("10.") {
        PublicationRecord::new("").with_doi(input)
    } else {
        PublicationRecord::new(input)
    };
    record.id = SEED_ID.to_string();
    record
}

/// The `btac` command-line tool, run as `btac <in.bib> -o <out.bib>`.
pub struct Btac {
    pub program: PathBuf,
}

impl Default for Btac {
    fn default() -> Self {
        Self {
            program: PathBuf::from("btac"),
        }
    }
}

impl Btac {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    async fn run(&self, seed: &PublicationRecord) -> Result<PublicationRecord, CompletionError> {
        let dir = tokio::task::spawn_blocking(tempfile::tempdir)
            .await
            .map_err(std::io::Error::other)??;
        let input = dir.path().join("input.bib");
        let output = dir.path().join("output.bib");
        tokio::fs::write(&input, format_record(seed)?).await?;

        let program = self.program.display().to_string();
        let result = Command::new(&self.program)
            .arg(&input)
            .arg("-o")
            .arg(&output)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|source| CompletionError::Spawn {
                program: program.clone(),
                source,
            })?;

        for line in String::from_utf8_lossy(&result.stdout).lines() {
            tracing::info!(program = %program, "{line}");
        }
        for line in String::from_utf8_lossy(&result.stderr).lines() {
            tracing::warn!(program = %program, "{line}");
        }

        if !result.status.success() {
            return Err(CompletionError::Failed {
                code: result.status.code(),
            });
        }

        let content = match tokio::fs::read_to_string(&output).await {
            Ok(c) if !c.trim().is_empty() => c,
            Ok(_) => return Err(CompletionError::EmptyOutput),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(CompletionError::EmptyOutput);
            }
            Err(e) => return Err(e.into()),
        };

        parse_bib_str(&content)?
            .into_iter()
            .next()
            .ok_or(CompletionError::EmptyOutput)
    }
}

impl CompletionOracle for Btac {
    fn name(&self) -> &str {
        "btac"
    }

    fn complete<'a>(
        &'a self,
        seed: &'a PublicationRecord,
    ) -> Pin<Box<dyn Future<Output = Result<PublicationRecord, CompletionError>> + Send + 'a>> {
        Box::pin(self.run(seed))
    }
}
