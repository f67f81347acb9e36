//! Chat history persistence.
//!
//! Each day and query mode gets its own JSON file named
//! `<DD-MM-YYYY>_<mode>.json` containing an array of turns, newest first.
//! Question and answer are prepended together so a reader always sees
//! complete exchanges at the top of the file.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;

use crate::models::ChatTurn;
use crate::query::QueryMode;

pub struct ChatLog {
    dir: PathBuf,
}

impl ChatLog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, mode: QueryMode) -> PathBuf {
        let day = Local::now().format("%d-%m-%Y");
        self.dir.join(format!("{}_{}.json", day, mode.as_str()))
    }

    /// Record one question/answer exchange at the top of today's log.
    pub async fn append(&self, mode: QueryMode, question: &str, answer: &str) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("failed to create {}", self.dir.display()))?;

        let path = self.path_for(mode);
        let mut turns = read_turns(&path).await?;

        let timestamp = Local::now().format("%H:%M:%S").to_string();
        let mut exchange = vec![
            ChatTurn {
                role: "user".to_string(),
                content: question.to_string(),
                timestamp: timestamp.clone(),
            },
            ChatTurn {
                role: "assistant".to_string(),
                content: answer.to_string(),
                timestamp,
            },
        ];
        exchange.append(&mut turns);

        let json = serde_json::to_string_pretty(&exchange)
            .context("failed to serialize chat history")?;
        tokio::fs::write(&path, json)
            .await
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(())
    }

    /// Load today's history for a mode, newest exchange first. Empty when
    /// no log exists yet.
    pub async fn load(&self, mode: QueryMode) -> Result<Vec<ChatTurn>> {
        read_turns(&self.path_for(mode)).await
    }

    /// Delete today's history for a mode. A missing file is not an error.
    pub async fn clear(&self, mode: QueryMode) -> Result<()> {
        let path = self.path_for(mode);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("failed to remove {}", path.display())),
        }
    }
}

async fn read_turns(path: &Path) -> Result<Vec<ChatTurn>> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e).with_context(|| format!("failed to read {}", path.display())),
    };
    serde_json::from_slice(&bytes).with_context(|| format!("failed to parse {}", path.display()))
}
