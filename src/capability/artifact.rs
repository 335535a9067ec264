use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;

/// 影像能力呼叫期間的暫存檔守衛。
///
/// 影像位元組必須以檔案路徑的形式交給外部程序，這個型別負責
/// 把位元組寫進上傳目錄，並在自身被丟棄時移除該檔案。
/// 無論呼叫成功或失敗，暫存檔的生命週期都不會超過一次呼叫。
pub struct TempArtifact {
    path: PathBuf,
}

impl TempArtifact {
    /// 把影像位元組寫入上傳目錄，檔名由時間戳記（含毫秒）
    /// 與清理過的原始檔名組成，避免同時進行的呼叫互相覆蓋。
    pub fn write(uploads_dir: &Path, original_name: &str, bytes: &[u8]) -> Result<Self> {
        fs::create_dir_all(uploads_dir)
            .with_context(|| format!("建立上傳目錄失敗: {}", uploads_dir.display()))?;

        let stamp = Local::now().format("%Y%m%d_%H%M%S%.3f");
        let path = uploads_dir.join(format!("{stamp}_{}", sanitize_name(original_name)));
        fs::write(&path, bytes)
            .with_context(|| format!("寫入暫存影像失敗: {}", path.display()))?;
        Ok(Self { path })
    }

    /// 暫存檔的完整路徑，作為酬載傳給影像能力。
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempArtifact {
    fn drop(&mut self) {
        // 清理失敗時無處回報，忽略錯誤。
        let _ = fs::remove_file(&self.path);
    }
}

/// 只保留檔名中安全的字元，其餘以底線取代。
/// 傳入的名稱可能含有路徑分隔符或其他使用者控制的內容。
fn sanitize_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '-' | '_') {
                ch
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.trim_matches('_').is_empty() {
        String::from("upload.png")
    } else {
        cleaned
    }
}
