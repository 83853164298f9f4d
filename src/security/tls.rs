//! TLS 配置
//!
//! 证书和私钥都是 PEM 文件，路径来自配置文件的 `[security]` 段。

use anyhow::{anyhow, Result};
use std::path::{Path, PathBuf};

/// TLS 证书路径
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsConfig {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

impl TlsConfig {
    pub fn new(cert_path: impl Into<PathBuf>, key_path: impl Into<PathBuf>) -> Self {
        Self {
            cert_path: cert_path.into(),
            key_path: key_path.into(),
        }
    }

    /// 配置目录下的 `cert.crt` / `cert.key`
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join("cert.crt"), dir.join("cert.key"))
    }

    /// 验证证书文件存在
    pub fn validate(&self) -> Result<()> {
        if !self.cert_path.exists() {
            return Err(anyhow!("证书文件不存在: {}", self.cert_path.display()));
        }
        if !self.key_path.exists() {
            return Err(anyhow!("私钥文件不存在: {}", self.key_path.display()));
        }
        Ok(())
    }

    /// 创建 TLS 接受器
    #[cfg(feature = "security")]
    pub fn create_acceptor(&self) -> Result<tokio_rustls::TlsAcceptor> {
        use rustls::ServerConfig;
        use rustls_pemfile::{certs, private_key};
        use std::io::BufReader;

        self.validate()?;

        let cert_file = std::fs::File::open(&self.cert_path)?;
        let mut cert_reader = BufReader::new(cert_file);
        let cert_chain = certs(&mut cert_reader)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| anyhow!("读取证书失败: {:?}", e))?;

        let key_file = std::fs::File::open(&self.key_path)?;
        let mut key_reader = BufReader::new(key_file);
        let key = private_key(&mut key_reader)
            .map_err(|e| anyhow!("读取私钥失败: {:?}", e))?
            .ok_or_else(|| anyhow!("未找到私钥: {}", self.key_path.display()))?;

        let mut config = ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(cert_chain, key)
            .map_err(|e| anyhow!("创建服务器配置失败: {:?}", e))?;
        config.alpn_protocols = vec![b"http/1.1".to_vec()];

        Ok(tokio_rustls::TlsAcceptor::from(std::sync::Arc::new(config)))
    }
}
