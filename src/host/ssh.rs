use super::{
    normalize_path, with_timeout, ExecOutput, FileInfo, FileMeta, HostFs, IO_TIMEOUT_SECS,
    OP_TIMEOUT_SECS,
};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::time::Duration;
use russh::client::AuthResult;
use russh::keys::PrivateKeyWithHashAlg;
use russh::ChannelMsg;
use russh_sftp::client::SftpSession;
use russh_sftp::protocol::StatusCode;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::{debug, info};

pub(crate) struct Client;

impl russh::client::Handler for Client {
    type Error = anyhow::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &russh::keys::PublicKey,
    ) -> Result<bool, Self::Error> {
        // 主机密钥由控制面在添加服务器时确认，这里不再拦截
        debug!("server key: {:?}", server_public_key);
        Ok(true)
    }
}

/// 远程 Docker 主机，通过 SSH（SFTP + exec）访问
pub struct SshHost {
    session: Mutex<russh::client::Handle<Client>>,
    sftp: SftpSession,
    name: String,
}

impl SshHost {
    pub async fn connect(
        host_with_port: &str,
        user: &str,
        key_path: Option<&str>,
        password: Option<&str>,
    ) -> Result<Self> {
        let (host, port) = match host_with_port.rsplit_once(':') {
            Some((h, p)) => {
                let port: u16 = p
                    .parse()
                    .map_err(|_| anyhow!("invalid port in host: {host_with_port}"))?;
                (h.to_string(), port)
            }
            None => (host_with_port.to_string(), 22u16),
        };

        let config = russh::client::Config::default();
        let mut session =
            russh::client::connect(Arc::new(config), (host.as_str(), port), Client).await?;

        let authenticated = if let Some(key_path) = key_path {
            let key = russh::keys::load_secret_key(key_path, None)?;
            let hash = session.best_supported_rsa_hash().await?.flatten();
            let res = session
                .authenticate_publickey(user, PrivateKeyWithHashAlg::new(Arc::new(key), hash))
                .await?;
            matches!(res, AuthResult::Success)
        } else {
            let res = session
                .authenticate_password(user, password.unwrap_or(""))
                .await?;
            matches!(res, AuthResult::Success)
        };

        if !authenticated {
            return Err(anyhow!("SSH 认证失败: {}@{}", user, host_with_port));
        }

        let channel = session.channel_open_session().await?;
        channel.request_subsystem(true, "sftp").await?;
        let sftp = SftpSession::new(channel.into_stream()).await?;

        info!("SSH 主机已连接: {}@{}", user, host_with_port);

        Ok(Self {
            session: Mutex::new(session),
            sftp,
            name: format!("ssh://{}@{}", user, host_with_port),
        })
    }

    /// 逐级创建远程目录（SFTP 无递归创建）
    async fn sftp_create_dir_all(&self, path: &str) -> Result<()> {
        let mut current = String::new();
        for part in path.split('/').filter(|s| !s.is_empty()) {
            current.push('/');
            current.push_str(part);
            // 已存在时忽略错误
            let _ = self.sftp.create_dir(&current).await;
        }
        Ok(())
    }
}

impl SshHost {
    async fn stat_inner(&self, path: &str) -> Result<Option<FileMeta>> {
        match self.sftp.metadata(path).await {
            Ok(attrs) => Ok(Some(FileMeta {
                size: attrs.size.unwrap_or(0),
                modified_time: attrs.mtime.unwrap_or(0) as i64,
                is_dir: attrs.is_dir(),
            })),
            Err(russh_sftp::client::error::Error::Status(status))
                if status.status_code == StatusCode::NoSuchFile =>
            {
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn write_inner(&self, path: &str, data: Vec<u8>) -> Result<()> {
        let path = normalize_path(path);

        if let Some(parent) = std::path::Path::new(&path).parent() {
            let parent = parent.to_string_lossy().replace('\\', "/");
            if !parent.is_empty() && parent != "/" {
                self.sftp_create_dir_all(&parent).await?;
            }
        }

        // 临时文件写入后重命名；SFTP 的 rename 不允许目标存在，先移除旧文件
        let temp_path = format!("{}.mountsync.tmp", path);
        let mut file = self.sftp.create(&temp_path).await?;
        file.write_all(&data).await?;
        file.shutdown().await?;

        if self.sftp.try_exists(&path).await? {
            self.sftp.remove_file(&path).await?;
        }
        self.sftp.rename(&temp_path, &path).await?;

        Ok(())
    }

    async fn exec_inner(&self, cmd: &str) -> Result<ExecOutput> {
        let channel = {
            let session = self.session.lock().await;
            session.channel_open_session().await?
        };

        let mut channel = channel;
        channel.exec(true, cmd).await?;

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let mut exit_code = 0u32;

        while let Some(msg) = channel.wait().await {
            match msg {
                ChannelMsg::Data { ref data } => stdout.extend_from_slice(data),
                ChannelMsg::ExtendedData { ref data, .. } => stderr.extend_from_slice(data),
                ChannelMsg::ExitStatus { exit_status } => exit_code = exit_status,
                _ => {}
            }
        }

        Ok(ExecOutput {
            exit_code,
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
        })
    }
}

#[async_trait]
impl HostFs for SshHost {
    async fn list_files(
        &self,
        root: &str,
        on_file: &mut (dyn FnMut(FileInfo) + Send),
    ) -> Result<()> {
        let root = normalize_path(root.trim_end_matches('/'));
        let op_timeout = Duration::from_secs(OP_TIMEOUT_SECS);

        if !with_timeout(op_timeout, "sftp exists", async {
            Ok(self.sftp.try_exists(&root).await?)
        })
        .await?
        {
            return Ok(());
        }

        let mut dirs = VecDeque::from([root.clone()]);
        let prefix = format!("{}/", root);

        while let Some(dir) = dirs.pop_front() {
            let entries = with_timeout(op_timeout, "sftp read_dir", async {
                Ok(self.sftp.read_dir(&dir).await?)
            })
            .await?;

            for entry in entries {
                let full = format!("{}/{}", dir, entry.file_name());
                let file_type = entry.file_type();

                if file_type.is_dir() {
                    dirs.push_back(full);
                } else if file_type.is_file() {
                    let meta = entry.metadata();
                    let relative = full.strip_prefix(&prefix).unwrap_or(&full).to_string();

                    // 每个文件在遍历中即时上报
                    on_file(FileInfo {
                        path: relative,
                        size: meta.size.unwrap_or(0),
                        modified_time: meta.mtime.unwrap_or(0) as i64,
                        checksum: None,
                    });
                }
                // 符号链接等特殊文件不参与迁移
            }
        }

        Ok(())
    }

    async fn stat(&self, path: &str) -> Result<Option<FileMeta>> {
        with_timeout(
            Duration::from_secs(OP_TIMEOUT_SECS),
            "sftp stat",
            self.stat_inner(path),
        )
        .await
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        with_timeout(Duration::from_secs(IO_TIMEOUT_SECS), "sftp read", async {
            let mut file = self.sftp.open(path).await?;
            let mut data = Vec::new();
            file.read_to_end(&mut data).await?;
            Ok(data)
        })
        .await
    }

    async fn write(&self, path: &str, data: Vec<u8>) -> Result<()> {
        with_timeout(
            Duration::from_secs(IO_TIMEOUT_SECS),
            "sftp write",
            self.write_inner(path, data),
        )
        .await
    }

    async fn create_dir_all(&self, path: &str) -> Result<()> {
        with_timeout(
            Duration::from_secs(OP_TIMEOUT_SECS),
            "sftp mkdir",
            self.sftp_create_dir_all(&normalize_path(path)),
        )
        .await
    }

    async fn exec(&self, cmd: &str) -> Result<ExecOutput> {
        with_timeout(
            Duration::from_secs(OP_TIMEOUT_SECS),
            "ssh exec",
            self.exec_inner(cmd),
        )
        .await
    }

    async fn ping(&self) -> Result<()> {
        with_timeout(Duration::from_secs(OP_TIMEOUT_SECS), "sftp ping", async {
            let _ = self.sftp.metadata(".").await?;
            Ok(())
        })
        .await
    }

    fn name(&self) -> &str {
        &self.name
    }
}
