//! 安全模块
//!
//! 提供密码校验、会话 cookie 和 TLS 配置

pub mod password;
pub mod session;
pub mod tls;

pub use password::{hash_password, write_password_file, PasswordGate};
pub use session::{SessionSigner, SessionToken, DEFAULT_MAX_AGE, SESSION_COOKIE};
pub use tls::TlsConfig;

/// 登录失败后的固定延迟
pub const LOGIN_FAILURE_DELAY: std::time::Duration = std::time::Duration::from_secs(1);

/// 运行时安全配置
pub struct SecurityConfig {
    /// None 表示不需要登录
    pub gate: Option<PasswordGate>,
    pub signer: SessionSigner,
    pub tls: Option<TlsConfig>,
}

impl SecurityConfig {
    /// 不需要登录
    pub fn open(max_age: std::time::Duration) -> Self {
        Self {
            gate: None,
            signer: SessionSigner::random(max_age),
            tls: None,
        }
    }

    /// 需要登录，cookie 用密码摘要签名
    pub fn with_password(gate: PasswordGate, max_age: std::time::Duration) -> Self {
        let signer = SessionSigner::new(gate.reference().as_bytes().to_vec(), max_age);
        Self {
            gate: Some(gate),
            signer,
            tls: None,
        }
    }

    pub fn with_tls(mut self, tls: TlsConfig) -> Self {
        self.tls = Some(tls);
        self
    }

    pub fn require_login(&self) -> bool {
        self.gate.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_config() {
        let config = SecurityConfig::open(DEFAULT_MAX_AGE);
        assert!(!config.require_login());
        assert!(config.tls.is_none());
    }

    #[test]
    fn test_password_signs_cookies() {
        let gate = PasswordGate::from_password("pw");
        let a = SecurityConfig::with_password(gate.clone(), DEFAULT_MAX_AGE);
        let b = SecurityConfig::with_password(gate, DEFAULT_MAX_AGE);
        assert!(a.require_login());
        // 相同密码签发的 cookie 在重启后仍然有效
        assert!(b.signer.verify(&a.signer.issue().value));

        let other = SecurityConfig::with_password(PasswordGate::from_password("new"), DEFAULT_MAX_AGE);
        assert!(!other.signer.verify(&a.signer.issue().value));
    }
}
