use crate::component::selection::{ClipUnit, Selection};
use crate::component::session::OperationKind;
use crate::tools::ensure_directory_exists;
use anyhow::Result;
use std::path::{Path, PathBuf};

/// 固定作業數：驗證、複製母帶、母帶最佳化、場景偵測、收尾
pub const FIXED_OPERATIONS: u32 = 5;

/// 標準輸出資料夾結構
#[derive(Debug, Clone)]
pub struct OutputFolders {
    pub root: PathBuf,
    pub masters: PathBuf,
    pub video_clips: PathBuf,
    pub stills_hq: PathBuf,
    pub stills_compressed: PathBuf,
    pub temp_thumbnails: PathBuf,
}

impl OutputFolders {
    #[must_use]
    pub fn locate(output_root: &Path, project_date: &str, artwork_name: &str) -> Self {
        let root = output_root.join(format!("{project_date}_{artwork_name}"));
        Self {
            masters: root.join("Masters"),
            video_clips: root.join("Video-clips"),
            stills_hq: root.join("Stills").join("HQ"),
            stills_compressed: root.join("Stills").join("Compressed"),
            temp_thumbnails: root.join("temp_thumbnails"),
            root,
        }
    }

    pub fn create_all(&self) -> Result<()> {
        for dir in [
            &self.root,
            &self.masters,
            &self.video_clips,
            &self.stills_hq,
            &self.stills_compressed,
            &self.temp_thumbnails,
        ] {
            ensure_directory_exists(dir)?;
        }
        Ok(())
    }
}

/// 輸出檔名都是（作品、類別、序號、後綴）的固定函數：
/// 相同輸入與相同選擇必定產生相同檔名。
#[must_use]
pub fn clip_filename(artwork_name: &str, clip_seq: usize) -> String {
    format!("{artwork_name}_clip_{clip_seq:02}.mp4")
}

#[must_use]
pub fn group_filename(artwork_name: &str, group_seq: usize) -> String {
    format!("{artwork_name}_group_{group_seq:02}.mp4")
}

#[must_use]
pub fn still_hq_filename(artwork_name: &str, scene_index: usize, aspect: &str) -> String {
    format!("{artwork_name}_HQ_{scene_index:02}_{aspect}.png")
}

#[must_use]
pub fn still_web_filename(artwork_name: &str, scene_index: usize, aspect: &str) -> String {
    format!("{artwork_name}_compressed_{scene_index:02}_{aspect}.jpg")
}

#[must_use]
pub fn optimized_master_filename(artwork_name: &str) -> String {
    format!("{artwork_name}_master.mp4")
}

/// 剪輯作業清單
///
/// 單元依選擇模型的順序排列；剪輯與群組各自獨立編號。
#[must_use]
pub fn build_clip_operations(selection: &Selection) -> Vec<(OperationKind, ClipUnit)> {
    let mut clip_seq = 0;
    let mut group_seq = 0;

    selection
        .clip_units()
        .into_iter()
        .map(|unit| {
            let kind = match &unit {
                ClipUnit::Single(scene_index) => {
                    clip_seq += 1;
                    OperationKind::EncodeClip {
                        clip_seq,
                        scene_index: *scene_index,
                    }
                }
                ClipUnit::Group { members, .. } => {
                    group_seq += 1;
                    OperationKind::EncodeGroup {
                        group_seq,
                        members: members.clone(),
                    }
                }
            };
            (kind, unit)
        })
        .collect()
}

/// 工作階段的總作業數
#[must_use]
pub fn total_operations(selection: &Selection) -> u32 {
    FIXED_OPERATIONS + selection.clip_units().len() as u32 + selection.stills_scope().len() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_folder_layout() {
        let folders = OutputFolders::locate(Path::new("/out"), "26-08-06", "work");
        assert_eq!(folders.root, PathBuf::from("/out/26-08-06_work"));
        assert_eq!(folders.masters, PathBuf::from("/out/26-08-06_work/Masters"));
        assert_eq!(
            folders.stills_hq,
            PathBuf::from("/out/26-08-06_work/Stills/HQ")
        );
    }

    #[test]
    fn test_filenames_are_deterministic() {
        assert_eq!(clip_filename("work", 3), "work_clip_03.mp4");
        assert_eq!(group_filename("work", 1), "work_group_01.mp4");
        assert_eq!(still_hq_filename("work", 7, "16x9"), "work_HQ_07_16x9.png");
        assert_eq!(
            still_web_filename("work", 7, "16x9"),
            "work_compressed_07_16x9.jpg"
        );
        // 重複呼叫結果不變
        assert_eq!(clip_filename("work", 3), clip_filename("work", 3));
    }

    #[test]
    fn test_still_names_keep_original_scene_index() {
        // 場景 3 未被選取時，場景 4 的編號不會往前遞補
        assert_eq!(still_hq_filename("work", 4, "16x9"), "work_HQ_04_16x9.png");
    }

    #[test]
    fn test_clip_operations_number_per_category() {
        // 單選 {1,4}、群組 {2,3}：剪輯與群組各自編號
        let mut selection = Selection::new(5);
        selection.select(1).unwrap();
        selection.select(4).unwrap();
        selection.group(&[2, 3]).unwrap();

        let operations = build_clip_operations(&selection);
        assert_eq!(operations.len(), 3);
        assert_eq!(operations[0].0.name(), "encode_clip_01");
        assert_eq!(operations[1].0.name(), "encode_group_01");
        assert_eq!(operations[2].0.name(), "encode_clip_02");
    }

    #[test]
    fn test_total_operations_counts_all_stages() {
        let mut selection = Selection::new(5);
        selection.select(1).unwrap();
        selection.group(&[2, 3]).unwrap();

        // 5 個固定作業 + 2 個剪輯單元 + 3 張靜態圖
        assert_eq!(total_operations(&selection), 10);
    }
}
