//! 对话历史 (JSON 持久化)

use anyhow::{Context, Result};
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub timestamp: String,
    pub role: Role,
    pub text: String,
}

pub struct ConversationHistory {
    path: PathBuf,
    max_turns: usize,
    turns: Vec<Turn>,
}

impl ConversationHistory {
    /// 读取历史; 文件不存在或损坏时从空开始
    pub fn load(path: &Path, max_turns: usize) -> Self {
        let turns = match fs::read_to_string(path) {
            Ok(json) => serde_json::from_str(&json).unwrap_or_else(|e| {
                warn!("⚠️ 对话历史加载失败: {}", e);
                Vec::new()
            }),
            Err(_) => Vec::new(),
        };
        Self {
            path: path.to_path_buf(),
            max_turns: max_turns.max(1),
            turns,
        }
    }

    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(&self.turns)?;
        fs::write(&self.path, json).with_context(|| format!("保存对话历史失败: {}", self.path.display()))
    }

    /// 追加一轮对话, 超过上限时丢弃最早的
    pub fn add_turn(&mut self, role: Role, text: &str) -> Result<()> {
        self.turns.push(Turn {
            timestamp: Local::now().to_rfc3339(),
            role,
            text: text.to_string(),
        });
        if self.turns.len() > self.max_turns {
            let excess = self.turns.len() - self.max_turns;
            self.turns.drain(..excess);
        }
        self.save()
    }

    pub fn recent(&self, limit: usize) -> &[Turn] {
        &self.turns[self.turns.len().saturating_sub(limit)..]
    }

    /// 最近 limit 轮, 格式 "User: ..." / "Nova: ..."
    pub fn context_string(&self, limit: usize) -> String {
        self.recent(limit)
            .iter()
            .map(|t| {
                let who = match t.role {
                    Role::User => "User",
                    Role::Assistant => "Nova",
                };
                format!("{}: {}", who, t.text)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn clear(&mut self) -> Result<()> {
        self.turns.clear();
        self.save()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trim_and_context() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        let mut h = ConversationHistory::load(&path, 3);
        h.add_turn(Role::User, "hello").unwrap();
        h.add_turn(Role::Assistant, "hi there").unwrap();
        h.add_turn(Role::User, "what is this").unwrap();
        h.add_turn(Role::Assistant, "a cup").unwrap();

        assert_eq!(h.len(), 3);
        assert_eq!(h.context_string(2), "User: what is this\nNova: a cup");
        assert_eq!(h.context_string(0), "");

        let reloaded = ConversationHistory::load(&path, 3);
        assert_eq!(reloaded.len(), 3);
        assert_eq!(reloaded.recent(1)[0].text, "a cup");
    }

    #[test]
    fn test_corrupt_history_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        fs::write(&path, "{not json").unwrap();
        let mut h = ConversationHistory::load(&path, 20);
        assert!(h.is_empty());
        h.add_turn(Role::User, "hey").unwrap();
        h.clear().unwrap();
        assert!(ConversationHistory::load(&path, 20).is_empty());
    }
}
