use chrono::{DateTime, Utc};

/// 訊息的發話者。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// 使用者送出的內容。
    User,
    /// 助理（或系統代為產生）的回覆。
    Assistant,
}

/// 對話逐字稿中單一則訊息。
///
/// 訊息一旦建立即不可變；逐字稿只會附加，不會修改。
/// 內容保證去除前後空白後非空，空白訊息在進入逐字稿前就被過濾。
#[derive(Debug, Clone)]
pub struct Message {
    /// 會談內遞增的序號。
    pub id: u64,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// 一次使用者回合：文字提問，或一張已解碼的上傳影像。
///
/// 回合是暫時性的請求單位，不會被保存；它被調度層消耗一次，
/// 產生成對的訊息後即丟棄。
#[derive(Debug, Clone)]
pub enum Turn {
    /// 文字提問。
    Text(String),
    /// 影像上傳。無論來自 multipart 或 base64 data URL，
    /// 進到這裡時都已統一解碼為位元組。
    Image {
        bytes: Vec<u8>,
        /// 原始檔名，用於逐字稿顯示與暫存檔命名。
        file_name: String,
    },
}
