//! INVADUCTAR GPT 後端：接收文字提問與影像上傳，
//! 轉交給外部推論腳本，並以逐字稿形式維護整段對話。

pub mod capability;
pub mod config;
pub mod server;
pub mod session;
pub mod store;
