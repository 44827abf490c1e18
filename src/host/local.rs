use super::{normalize_path, ExecOutput, FileInfo, FileMeta, HostFs};
use anyhow::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use walkdir::WalkDir;

/// 主控主机本地文件系统
pub struct LocalHost {
    name: String,
}

impl LocalHost {
    pub fn new() -> Self {
        Self {
            name: "local".to_string(),
        }
    }
}

impl Default for LocalHost {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HostFs for LocalHost {
    async fn list_files(
        &self,
        root: &str,
        on_file: &mut (dyn FnMut(FileInfo) + Send),
    ) -> Result<()> {
        let base = PathBuf::from(root);

        if !base.exists() {
            return Ok(());
        }

        // 遍历在 blocking 线程进行，文件经通道边走边回调
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let walker = tokio::task::spawn_blocking(move || {
            let entries = WalkDir::new(&base)
                .follow_links(false)
                .into_iter()
                .filter_map(|e| e.ok());

            for entry in entries {
                let Ok(metadata) = entry.metadata() else {
                    continue;
                };
                if !metadata.is_file() {
                    continue;
                }

                let Some(relative_path) = entry
                    .path()
                    .strip_prefix(&base)
                    .ok()
                    .and_then(|p| p.to_str())
                else {
                    continue;
                };
                if relative_path.is_empty() {
                    continue;
                }

                let modified = metadata
                    .modified()
                    .ok()
                    .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                    .map(|d| d.as_secs() as i64)
                    .unwrap_or(0);

                let sent = tx.send(FileInfo {
                    path: normalize_path(relative_path),
                    size: metadata.len(),
                    modified_time: modified,
                    checksum: None,
                });
                // 接收端放弃时停止遍历
                if sent.is_err() {
                    break;
                }
            }
        });

        while let Some(file) = rx.recv().await {
            on_file(file);
        }
        walker.await?;

        Ok(())
    }

    async fn stat(&self, path: &str) -> Result<Option<FileMeta>> {
        match fs::metadata(path).await {
            Ok(metadata) => {
                let modified = metadata
                    .modified()?
                    .duration_since(std::time::UNIX_EPOCH)?
                    .as_secs() as i64;

                Ok(Some(FileMeta {
                    size: if metadata.is_dir() { 0 } else { metadata.len() },
                    modified_time: modified,
                    is_dir: metadata.is_dir(),
                }))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        let data = fs::read(path).await?;
        Ok(data)
    }

    async fn write(&self, path: &str, data: Vec<u8>) -> Result<()> {
        let full_path = PathBuf::from(path);

        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        // 临时文件写入后原子重命名
        let temp_path = PathBuf::from(format!("{}.mountsync.tmp", path));
        fs::write(&temp_path, data).await?;
        fs::rename(&temp_path, &full_path).await?;

        Ok(())
    }

    async fn create_dir_all(&self, path: &str) -> Result<()> {
        fs::create_dir_all(path).await?;
        Ok(())
    }

    async fn exec(&self, cmd: &str) -> Result<ExecOutput> {
        let output = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(cmd)
            .output()
            .await?;

        Ok(ExecOutput {
            exit_code: output.status.code().unwrap_or(255) as u32,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    async fn ping(&self) -> Result<()> {
        // 本地主机始终可达，仅确认根目录可读
        let _ = fs::metadata(Path::new("/")).await?;
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
