use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};

use crate::session::{Message, Role};

/// 記錄檔中的單筆資料，沿用原始系統的格式：
/// `{"type": "human" | "ai", "content": "..."}` 的扁平陣列。
#[derive(Debug, Serialize, Deserialize)]
struct StoredRecord {
    #[serde(rename = "type")]
    kind: String,
    content: String,
}

/// 從記錄檔還原出來的一則訊息。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMessage {
    pub role: Role,
    pub content: String,
}

/// 以單一 JSON 檔案保存整段對話的儲存層。
///
/// 讀取端刻意做得極為寬容：檔案不存在、無法讀取、格式損毀，
/// 一律視為「沒有歷史」，絕不讓儲存層的問題阻斷會談啟動。
pub struct ConversationStore {
    path: PathBuf,
}

impl ConversationStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 讀取對話記錄。
    ///
    /// 空白內容的訊息與未知類型（原始資料中還有 `"tool"` 等）
    /// 會在這裡被過濾，呼叫端拿到的序列可以直接使用。
    pub fn load(&self) -> Vec<StoredMessage> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) => {
                if err.kind() != io::ErrorKind::NotFound {
                    warn!("讀取對話記錄失敗: {err}");
                }
                return Vec::new();
            }
        };

        let records: Vec<StoredRecord> = match serde_json::from_str(&raw) {
            Ok(records) => records,
            Err(err) => {
                warn!("解析對話記錄失敗，視為沒有歷史: {err}");
                return Vec::new();
            }
        };

        records
            .into_iter()
            .filter_map(|record| {
                if record.content.trim().is_empty() {
                    return None;
                }
                let role = match record.kind.as_str() {
                    "human" => Role::User,
                    "ai" => Role::Assistant,
                    _ => return None,
                };
                Some(StoredMessage {
                    role,
                    content: record.content,
                })
            })
            .collect()
    }

    /// 把目前的對話寫回記錄檔（覆寫全檔）。
    pub fn save(&self, messages: &[Message]) -> Result<()> {
        let records: Vec<StoredRecord> = messages
            .iter()
            .map(|message| StoredRecord {
                kind: String::from(match message.role {
                    Role::User => "human",
                    Role::Assistant => "ai",
                }),
                content: message.content.clone(),
            })
            .collect();

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("建立記錄目錄失敗: {}", parent.display()))?;
            }
        }
        let serialized =
            serde_json::to_string_pretty(&records).context("序列化對話記錄失敗")?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("寫入對話記錄失敗: {}", self.path.display()))?;
        Ok(())
    }

    /// 刪除記錄檔。檔案本來就不存在不是錯誤（冪等）。
    pub fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => {
                Err(err).with_context(|| format!("刪除對話記錄失敗: {}", self.path.display()))
            }
        }
    }
}
