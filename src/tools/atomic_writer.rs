use anyhow::{Context, Result, bail};
use log::debug;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

/// 輸出檔案的容器類別，決定暫存檔的驗證方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    /// 影片容器，以 ffprobe 驗證可解析
    Video,
    Png,
    Jpeg,
    /// 純文字（僅檢查非空）
    Text,
}

/// 目標路徑對應的同目錄暫存路徑
///
/// 副檔名保留在最後，外部工具（ffmpeg）才能正確推斷容器格式。
#[must_use]
pub fn temp_path_for(target: &Path) -> PathBuf {
    let parent = target.parent().unwrap_or(Path::new("."));
    let stem = target
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output");

    match target.extension().and_then(|e| e.to_str()) {
        Some(ext) => parent.join(format!(".{stem}.tmp.{ext}")),
        None => parent.join(format!(".{stem}.tmp")),
    }
}

/// 原子寫入：先寫暫存檔、驗證、再改名到目標路徑
///
/// 改名前的任何失敗都會移除暫存檔，目標路徑永遠不會出現
/// 半成品。producer 負責把內容寫到傳入的暫存路徑。
pub fn write_atomic<F>(target: &Path, kind: OutputKind, producer: F) -> Result<()>
where
    F: FnOnce(&Path) -> Result<()>,
{
    let tmp = temp_path_for(target);

    // 清掉前一次中斷留下的暫存檔
    if tmp.exists() {
        fs::remove_file(&tmp)
            .with_context(|| format!("無法清除舊的暫存檔: {}", tmp.display()))?;
    }

    let result = producer(&tmp).and_then(|()| validate_output(&tmp, kind));

    match result {
        Ok(()) => {
            fs::rename(&tmp, target).with_context(|| {
                format!("無法改名暫存檔: {} -> {}", tmp.display(), target.display())
            })?;
            debug!("輸出已就位: {}", target.display());
            Ok(())
        }
        Err(e) => {
            if tmp.exists() {
                let _ = fs::remove_file(&tmp);
            }
            Err(e)
        }
    }
}

/// 驗證暫存檔非空且符合容器格式
fn validate_output(path: &Path, kind: OutputKind) -> Result<()> {
    let metadata = fs::metadata(path)
        .with_context(|| format!("輸出檔案未建立: {}", path.display()))?;

    if metadata.len() == 0 {
        bail!("輸出檔案為空: {}", path.display());
    }

    match kind {
        OutputKind::Text => Ok(()),
        OutputKind::Png => validate_signature(path, &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]),
        OutputKind::Jpeg => validate_signature(path, &[0xFF, 0xD8, 0xFF]),
        OutputKind::Video => validate_video_container(path),
    }
}

fn validate_signature(path: &Path, expected: &[u8]) -> Result<()> {
    use std::io::Read;

    let mut header = vec![0u8; expected.len()];
    let mut file =
        fs::File::open(path).with_context(|| format!("無法開啟輸出檔案: {}", path.display()))?;
    file.read_exact(&mut header)
        .with_context(|| format!("輸出檔案過短: {}", path.display()))?;

    if header != expected {
        bail!("輸出檔案格式不符: {}", path.display());
    }
    Ok(())
}

/// 以 ffprobe 確認影片容器可解析
fn validate_video_container(path: &Path) -> Result<()> {
    let output = Command::new("ffprobe")
        .args(["-v", "error", "-show_entries", "format=duration", "-of", "json"])
        .arg(path)
        .output()
        .with_context(|| format!("無法執行 ffprobe 驗證輸出: {}", path.display()))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("輸出影片無法解析: {}", stderr.trim());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_HEADER: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

    #[test]
    fn test_temp_path_keeps_extension_last() {
        let tmp = temp_path_for(Path::new("/out/work_HQ_01_16x9.png"));
        assert_eq!(tmp, PathBuf::from("/out/.work_HQ_01_16x9.tmp.png"));

        let tmp = temp_path_for(Path::new("/out/process_log"));
        assert_eq!(tmp, PathBuf::from("/out/.process_log.tmp"));
    }

    #[test]
    fn test_successful_write_renames_into_place() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("a.png");

        write_atomic(&target, OutputKind::Png, |tmp| {
            let mut content = PNG_HEADER.to_vec();
            content.extend_from_slice(b"data");
            fs::write(tmp, content)?;
            Ok(())
        })
        .unwrap();

        assert!(target.exists());
        assert!(!temp_path_for(&target).exists());
    }

    #[test]
    fn test_producer_failure_leaves_no_target() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("a.png");

        let result = write_atomic(&target, OutputKind::Png, |tmp| {
            // 模擬寫到一半失敗
            fs::write(tmp, b"partial")?;
            bail!("producer 中斷");
        });

        assert!(result.is_err());
        assert!(!target.exists());
        assert!(!temp_path_for(&target).exists());
    }

    #[test]
    fn test_empty_output_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("a.txt");

        let result = write_atomic(&target, OutputKind::Text, |tmp| {
            fs::write(tmp, b"")?;
            Ok(())
        });

        assert!(result.is_err());
        assert!(!target.exists());
    }

    #[test]
    fn test_wrong_signature_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("a.jpg");

        let result = write_atomic(&target, OutputKind::Jpeg, |tmp| {
            fs::write(tmp, b"not a jpeg at all")?;
            Ok(())
        });

        assert!(result.is_err());
        assert!(!target.exists());
        assert!(!temp_path_for(&target).exists());
    }

    #[test]
    fn test_missing_output_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("a.txt");

        // producer 回報成功但沒有寫任何東西
        let result = write_atomic(&target, OutputKind::Text, |_tmp| Ok(()));

        assert!(result.is_err());
        assert!(!target.exists());
    }

    #[test]
    fn test_stale_temp_file_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("a.txt");
        fs::write(temp_path_for(&target), b"stale").unwrap();

        write_atomic(&target, OutputKind::Text, |tmp| {
            fs::write(tmp, b"fresh")?;
            Ok(())
        })
        .unwrap();

        assert_eq!(fs::read(&target).unwrap(), b"fresh");
    }
}
