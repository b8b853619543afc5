/// 嵌入輸出檔案的版權與來源資訊
///
/// 由編排器以設定值與工作階段內容組成，靜態圖與剪輯
/// 輸出都帶相同的標記。
#[derive(Debug, Clone)]
pub struct ProvenanceMetadata {
    pub copyright: String,
    pub creator: String,
    pub software: String,
    pub description: String,
    pub source_file: String,
}

impl ProvenanceMetadata {
    /// 轉成 ffmpeg 的 `-metadata` 參數序列
    #[must_use]
    pub fn to_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        let mut push = |key: &str, value: &str| {
            if !value.is_empty() {
                args.push("-metadata".to_string());
                args.push(format!("{key}={value}"));
            }
        };

        push("copyright", &self.copyright);
        push("artist", &self.creator);
        push("encoder", &self.software);
        push("description", &self.description);
        push("comment", &format!("source={}", self.source_file));
        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_args() {
        let metadata = ProvenanceMetadata {
            copyright: "© Studio".to_string(),
            creator: "archive tool".to_string(),
            software: "video_archive_prep".to_string(),
            description: "Artwork: work".to_string(),
            source_file: "master.mov".to_string(),
        };

        let args = metadata.to_args();
        assert!(args.contains(&"copyright=© Studio".to_string()));
        assert!(args.contains(&"comment=source=master.mov".to_string()));
        assert_eq!(args.iter().filter(|a| *a == "-metadata").count(), 5);
    }

    #[test]
    fn test_empty_fields_are_omitted() {
        let metadata = ProvenanceMetadata {
            copyright: String::new(),
            creator: "tool".to_string(),
            software: String::new(),
            description: String::new(),
            source_file: "m.mov".to_string(),
        };

        let args = metadata.to_args();
        assert!(!args.iter().any(|a| a.starts_with("copyright=")));
        assert!(args.contains(&"artist=tool".to_string()));
    }
}
