use chrono::NaiveDate;
use rand::{distr::Alphanumeric, Rng};
use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tokio::{fs, io::AsyncWriteExt};

/// Directory below the media root that receives uploads, split by date.
pub const UPLOAD_DIR: &str = "img_predict";

/// Writes uploaded images below a media directory.
#[derive(Debug, Clone)]
pub struct ImageStore {
    media_dir: PathBuf,
}

impl ImageStore {
    pub fn new(media_dir: impl Into<PathBuf>) -> Self {
        Self {
            media_dir: media_dir.into(),
        }
    }

    pub fn media_dir(&self) -> &Path {
        &self.media_dir
    }

    /// Saves `data` as `img_predict/YYYY/MM/DD/<file_name>` and returns that
    /// relative path. Existing files are never overwritten.
    pub async fn save(
        &self,
        file_name: &str,
        data: &[u8],
        date: NaiveDate,
    ) -> std::io::Result<String> {
        let relative_dir = upload_dir_for(date);
        let directory = self.media_dir.join(&relative_dir);
        fs::create_dir_all(&directory).await?;

        let file_name = sanitize_file_name(file_name);
        let mut candidate = file_name.clone();
        loop {
            let open_result = fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(directory.join(&candidate))
                .await;

            match open_result {
                Ok(mut file) => {
                    file.write_all(data).await?;
                    file.flush().await?;
                    let relative_path = format!("{}/{}", relative_dir, candidate);
                    tracing::debug!("Stored upload at {}", relative_path);
                    return Ok(relative_path);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    candidate = with_random_suffix(&file_name);
                }
                Err(e) => return Err(e),
            }
        }
    }

    pub async fn remove(&self, relative_path: &str) -> std::io::Result<()> {
        fs::remove_file(self.media_dir.join(relative_path)).await
    }
}

fn upload_dir_for(date: NaiveDate) -> String {
    format!("{}/{}", UPLOAD_DIR, date.format("%Y/%m/%d"))
}

/// Keeps the last path component, turns whitespace into `_` and drops anything
/// other than alphanumerics, `_`, `-` and `.`.
pub fn sanitize_file_name(file_name: &str) -> String {
    let base_name = file_name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base_name
        .trim()
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .filter(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'))
        .collect();

    match cleaned.as_str() {
        "" | "." | ".." => "upload".to_string(),
        _ => cleaned,
    }
}

fn with_random_suffix(file_name: &str) -> String {
    let suffix: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(7)
        .map(char::from)
        .collect();

    match file_name.rsplit_once('.') {
        Some((stem, extension)) if !stem.is_empty() => format!("{}_{}.{}", stem, suffix, extension),
        _ => format!("{}_{}", file_name, suffix),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 9).unwrap()
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("my digit.png"), "my_digit.png");
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("C:\\Users\\me\\seven (1).jpg"), "seven_1.jpg");
        assert_eq!(sanitize_file_name("$$$"), "upload");
        assert_eq!(sanitize_file_name(".."), "upload");
    }

    #[test]
    fn test_random_suffix_keeps_extension() {
        let name = with_random_suffix("seven.png");

        assert!(name.starts_with("seven_"));
        assert!(name.ends_with(".png"));
        assert_eq!(name.len(), "seven_.png".len() + 7);
    }

    #[tokio::test]
    async fn test_save_uses_dated_directory() {
        let media_dir = tempfile::tempdir().unwrap();
        let store = ImageStore::new(media_dir.path());

        let relative_path = store.save("seven.png", b"png bytes", date()).await.unwrap();

        assert_eq!(relative_path, "img_predict/2024/03/09/seven.png");
        let written = std::fs::read(media_dir.path().join(&relative_path)).unwrap();
        assert_eq!(written, b"png bytes");
    }

    #[tokio::test]
    async fn test_save_never_overwrites() {
        let media_dir = tempfile::tempdir().unwrap();
        let store = ImageStore::new(media_dir.path());

        let first = store.save("seven.png", b"first", date()).await.unwrap();
        let second = store.save("seven.png", b"second", date()).await.unwrap();

        assert_ne!(first, second);
        assert_eq!(std::fs::read(media_dir.path().join(&first)).unwrap(), b"first");
        assert_eq!(std::fs::read(media_dir.path().join(&second)).unwrap(), b"second");
    }

    #[tokio::test]
    async fn test_remove() {
        let media_dir = tempfile::tempdir().unwrap();
        let store = ImageStore::new(media_dir.path());
        let relative_path = store.save("seven.png", b"bytes", date()).await.unwrap();

        store.remove(&relative_path).await.unwrap();

        assert!(!media_dir.path().join(&relative_path).exists());
    }
}
