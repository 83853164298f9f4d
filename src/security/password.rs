//! 密码校验
//!
//! 密码文件只保存 SHA-512 十六进制摘要 (一行)。

use std::fs;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use sha2::{Digest, Sha512};

/// 计算密码摘要 (小写十六进制 SHA-512)
pub fn hash_password(password: &str) -> String {
    hex::encode(Sha512::digest(password.as_bytes()))
}

/// 密码门
#[derive(Clone)]
pub struct PasswordGate {
    reference: String,
}

impl std::fmt::Debug for PasswordGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordGate").finish_non_exhaustive()
    }
}

impl PasswordGate {
    /// 从已有摘要创建
    pub fn from_hash(hash: &str) -> Self {
        Self {
            reference: hash.trim().to_ascii_lowercase(),
        }
    }

    /// 从明文创建 (测试和首次设置用)
    pub fn from_password(password: &str) -> Self {
        Self::from_hash(&hash_password(password))
    }

    /// 读取密码文件
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("读取密码文件失败: {}", path.display()))?;
        let hash = content.lines().next().unwrap_or("").trim();
        if hash.len() != 128 || !hash.bytes().all(|b| b.is_ascii_hexdigit()) {
            anyhow::bail!("密码文件格式无效: {}", path.display());
        }
        Ok(Self::from_hash(hash))
    }

    /// 存储的摘要，同时用作会话 cookie 的签名密钥
    pub fn reference(&self) -> &str {
        &self.reference
    }

    /// 校验候选密码
    pub fn verify(&self, candidate: &str) -> bool {
        constant_time_eq(hash_password(candidate).as_bytes(), self.reference.as_bytes())
    }
}

/// 常量时间比较
pub(crate) fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// 写入密码文件，Unix 上权限为 0600
pub fn write_password_file(path: &Path, password: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("创建目录失败: {}", parent.display()))?;
        }
    }

    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options
        .open(path)
        .with_context(|| format!("写入密码文件失败: {}", path.display()))?;
    writeln!(file, "{}", hash_password(password))?;

    // 文件已存在时 mode() 不生效
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_sha512_hex() {
        let hash = hash_password("abc");
        assert_eq!(hash.len(), 128);
        assert!(hash.starts_with("ddaf35a193617aba"));
    }

    #[test]
    fn test_verify() {
        let gate = PasswordGate::from_password("hunter2");
        assert!(gate.verify("hunter2"));
        assert!(!gate.verify("hunter3"));
        assert!(!gate.verify(""));
    }

    #[test]
    fn test_from_hash_tolerates_case_and_newline() {
        let hash = format!("{}\n", hash_password("pw").to_uppercase());
        assert!(PasswordGate::from_hash(&hash).verify("pw"));
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"same", b"same"));
        assert!(!constant_time_eq(b"same", b"sane"));
        assert!(!constant_time_eq(b"short", b"longer"));
    }

    #[test]
    fn test_write_and_load_password_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("camp_password.txt");

        write_password_file(&path, "secret").unwrap();
        let gate = PasswordGate::load(&path).unwrap();
        assert!(gate.verify("secret"));
        assert!(!gate.verify("Secret"));

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn test_load_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pw.txt");
        fs::write(&path, "not a hash\n").unwrap();
        assert!(PasswordGate::load(&path).is_err());
        assert!(PasswordGate::load(&dir.path().join("missing")).is_err());
    }
}
