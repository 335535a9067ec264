use tokio::process::Command;

use crate::config::CapabilityCommand;

use super::{Capability, CapabilityError};

use async_trait::async_trait;

/// `Capability` 的子程序實作：每次呼叫啟動一個外部程序，
/// 等待它結束，並把退出狀態與輸出對應為成功或失敗。
///
/// 外部腳本的契約沿用原始系統：回覆寫到 stdout，
/// 診斷訊息寫到 stderr，失敗以非零狀態結束。
pub struct ProcessCapability {
    /// 用於日誌的能力標籤。
    label: String,
    /// 啟動命令；本次請求的酬載會被附加為最後一個引數。
    command: CapabilityCommand,
}

impl ProcessCapability {
    pub fn new(label: impl Into<String>, command: CapabilityCommand) -> Self {
        Self {
            label: label.into(),
            command,
        }
    }
}

#[async_trait]
impl Capability for ProcessCapability {
    fn name(&self) -> &str {
        &self.label
    }

    /// 啟動一次性的子程序並收集其輸出。
    ///
    /// 與互動式代理不同，這裡的外部腳本是「執行到結束」的模式，
    /// 所以直接使用 `output()` 收集全部輸出即可；`kill_on_drop`
    /// 確保呼叫被取消時子程序不會殘留。
    async fn invoke(&self, payload: &str) -> Result<String, CapabilityError> {
        let mut command = Command::new(&self.command.program);
        command.args(&self.command.args);
        command.arg(payload);
        command.kill_on_drop(true);

        let output = command
            .output()
            .await
            .map_err(|source| CapabilityError::Spawn {
                program: self.command.program.clone(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(CapabilityError::Exited {
                status: output.status,
                stderr,
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if stdout.is_empty() {
            return Err(CapabilityError::EmptyOutput);
        }
        Ok(stdout)
    }
}
