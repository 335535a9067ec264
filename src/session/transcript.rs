use chrono::Utc;

use super::message::{Message, Role};

/// 管理單一會談的完整對話逐字稿。
///
/// 逐字稿是附加式的有序序列，插入順序即對話順序。
/// 第一則訊息可能是合成的開場白；開場白只存在於記憶體中，
/// 永遠不會被寫回儲存層。
#[derive(Default)]
pub struct Transcript {
    messages: Vec<Message>,
    next_id: u64,
    greeting_id: Option<u64>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// 附加一則訊息並回傳其複本。
    /// 呼叫端負責保證內容去除空白後非空。
    pub fn push(&mut self, role: Role, content: impl Into<String>) -> Message {
        self.next_id += 1;
        let message = Message {
            id: self.next_id,
            role,
            content: content.into(),
            created_at: Utc::now(),
        };
        self.messages.push(message.clone());
        message
    }

    /// 附加合成的開場白，並將其標記為不可持久化。
    pub fn push_greeting(&mut self, content: &str) -> Message {
        let message = self.push(Role::Assistant, content);
        self.greeting_id = Some(message.id);
        message
    }

    /// 回傳所有訊息（包含開場白）。
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// 回傳可持久化、可對外呈現的訊息，即排除合成開場白後的序列。
    pub fn durable_messages(&self) -> impl Iterator<Item = &Message> {
        self.messages
            .iter()
            .filter(|message| Some(message.id) != self.greeting_id)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
