//! 會談狀態與回合調度的核心組件。
//!
//! 此模組負責維護對話逐字稿、接收使用者回合、呼叫對應的外部能力，
//! 並把異質的呼叫結果正規化為一致的成對訊息。

// --- 子模組宣告 ---

/// `message` 模組：定義訊息、角色與回合等基礎資料型別。
pub mod message;

/// `orchestrator` 模組：提供 `ChatSession`，會談生命週期的核心調度者。
pub mod orchestrator;

/// `transcript` 模組：附加式的對話逐字稿。
pub mod transcript;

// --- 公共 API 重新導出 ---

pub use message::{Message, Role, Turn};
pub use orchestrator::{ChatSession, GREETING, TurnFailure, TurnReceipt, TurnRejected};
pub use transcript::Transcript;
