use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// 伺服器設定的頂層結構，通常從 `config/server.toml` 載入。
/// 描述監聽位址、對話記錄檔位置，以及兩個外部能力腳本的啟動方式。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP 伺服器的監聽位址（例如 `0.0.0.0:5000`）。
    #[serde(default = "default_bind")]
    pub bind: String,
    /// 對話記錄檔的路徑。
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,
    /// 暫存上傳影像的目錄，每次呼叫影像能力前會在此寫入一個暫存檔。
    #[serde(default = "default_uploads_dir")]
    pub uploads_dir: PathBuf,
    /// 外部能力的啟動命令。
    #[serde(default)]
    pub capabilities: CapabilityCommands,
}

/// 兩個外部能力（文字問答與影像分析）各自的啟動命令。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityCommands {
    /// 文字問答能力。
    #[serde(default = "default_chat_command")]
    pub chat: CapabilityCommand,
    /// 影像分析能力。
    #[serde(default = "default_image_command")]
    pub image: CapabilityCommand,
}

/// 單一外部能力的啟動命令。實際呼叫時，本次請求的內容
/// （訊息文字或暫存影像的路徑）會被附加為最後一個引數。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityCommand {
    /// 要執行的程式（例如 `python3`）。
    pub program: String,
    /// 傳給程式的固定引數（例如腳本路徑）。
    #[serde(default)]
    pub args: Vec<String>,
}

impl ServerConfig {
    /// 從指定的工作目錄讀取設定。
    /// 如果 `config/server.toml` 不存在，則使用指向內建 Python 腳本的預設設定。
    ///
    /// 無論來源為何，`PORT` 環境變數（Render 等平台會提供）都會覆寫監聽埠。
    pub fn load(workspace_root: &Path) -> Result<Self> {
        let config_path = workspace_root.join("config/server.toml");
        let mut config = if config_path.exists() {
            let raw = fs::read_to_string(&config_path)
                .with_context(|| format!("讀取伺服器設定失敗: {}", config_path.display()))?;
            let parsed: ServerConfig = toml::from_str(&raw)
                .with_context(|| format!("解析伺服器設定失敗: {}", config_path.display()))?;
            parsed
        } else {
            Self::default_stub()
        };

        if let Ok(port) = env::var("PORT") {
            if let Ok(port) = port.parse::<u16>() {
                config.bind = override_port(&config.bind, port);
            }
        }

        Ok(config.normalize(workspace_root))
    }

    /// 標準化設定中的路徑，將相對路徑解析為相對於工作目錄的絕對路徑。
    fn normalize(mut self, workspace_root: &Path) -> Self {
        if self.store_path.is_relative() {
            self.store_path = workspace_root.join(&self.store_path);
        }
        if self.uploads_dir.is_relative() {
            self.uploads_dir = workspace_root.join(&self.uploads_dir);
        }
        self
    }

    /// 產生一個預設的、指向內建 Python 腳本的設定。
    fn default_stub() -> Self {
        Self {
            bind: default_bind(),
            store_path: default_store_path(),
            uploads_dir: default_uploads_dir(),
            capabilities: CapabilityCommands::default(),
        }
    }
}

impl Default for CapabilityCommands {
    fn default() -> Self {
        Self {
            chat: default_chat_command(),
            image: default_image_command(),
        }
    }
}

fn default_bind() -> String {
    String::from("0.0.0.0:5000")
}

fn default_store_path() -> PathBuf {
    PathBuf::from("conversation.json")
}

fn default_uploads_dir() -> PathBuf {
    PathBuf::from("uploads")
}

fn default_chat_command() -> CapabilityCommand {
    CapabilityCommand {
        program: String::from("python3"),
        args: vec![String::from("simple_chat_api.py")],
    }
}

fn default_image_command() -> CapabilityCommand {
    CapabilityCommand {
        program: String::from("python3"),
        args: vec![String::from("image_api.py")],
    }
}

/// 將監聽位址中的埠號替換為指定值。
/// 位址格式不符預期時，退回 `0.0.0.0:{port}`。
fn override_port(bind: &str, port: u16) -> String {
    match bind.rsplit_once(':') {
        Some((host, _)) => format!("{host}:{port}"),
        None => format!("0.0.0.0:{port}"),
    }
}
