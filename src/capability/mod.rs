//! `capability` 模組負責把外部的推論程式包裝成統一的呼叫介面。
//!
//! 每個能力（文字問答、影像分析）都是一個黑盒子：給定一個字串
//! 酬載，回傳一段文字或一個失敗原因。`process` 子模組提供以
//! 子程序實作的版本；`artifact` 子模組提供影像酬載所需的暫存檔守衛。

/// `artifact` 模組：影像能力呼叫期間的暫存檔管理。
pub mod artifact;
/// `process` 模組：以「每次呼叫啟動一個子程序」方式實作的能力後端。
pub mod process;

pub use artifact::TempArtifact;
pub use process::ProcessCapability;

use async_trait::async_trait;

/// 能力呼叫可能的失敗原因。
///
/// 這些原因只會被記錄到日誌中，永遠不會原封不動地呈現給使用者。
#[derive(Debug, thiserror::Error)]
pub enum CapabilityError {
    /// 外部程序根本無法啟動（例如找不到直譯器）。
    #[error("無法啟動能力程序 {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    /// 外部程序啟動了，但以非零狀態結束。
    #[error("能力程序以非零狀態結束 ({status}): {stderr}")]
    Exited {
        status: std::process::ExitStatus,
        stderr: String,
    },
    /// 外部程序正常結束，卻沒有產生任何輸出。
    #[error("能力程序未產生任何輸出")]
    EmptyOutput,
}

/// 定義了所有能力後端都必須遵守的通用行為介面。
///
/// 實作可以啟動子程序、呼叫行程內的模型，或轉送到遠端服務；
/// 調度層對此一無所知，只依賴這個契約。
#[async_trait]
pub trait Capability: Send + Sync {
    /// 回傳此能力的名稱，用於日誌記錄。
    fn name(&self) -> &str;

    /// 非同步地執行一次能力呼叫。
    ///
    /// # Arguments
    /// * `payload` - 本次請求的內容：訊息文字，或暫存影像檔的路徑。
    ///
    /// # Returns
    /// * `Ok(text)` - 能力成功回覆的文字（已去除前後空白，保證非空）。
    /// * `Err(reason)` - 呼叫失敗的原因。不重試；由呼叫端決定如何呈現。
    async fn invoke(&self, payload: &str) -> Result<String, CapabilityError>;
}
