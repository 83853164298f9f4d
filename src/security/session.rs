//! 会话 cookie
//!
//! cookie 值为 `<签发时间毫秒>.<HMAC-SHA256 十六进制>`。签名密钥是密码摘要，
//! 修改密码后旧 cookie 全部失效。

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;

use super::password::constant_time_eq;

type HmacSha256 = Hmac<Sha256>;

/// cookie 名
pub const SESSION_COOKIE: &str = "camp";

/// 默认有效期 31 天
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(31 * 24 * 60 * 60);

/// 已签名的会话 token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionToken {
    pub issued_at_ms: u64,
    pub value: String,
}

/// 会话签发与校验
pub struct SessionSigner {
    key: Vec<u8>,
    max_age: Duration,
    last_issued: AtomicU64,
}

impl SessionSigner {
    pub fn new(key: impl Into<Vec<u8>>, max_age: Duration) -> Self {
        Self {
            key: key.into(),
            max_age,
            last_issued: AtomicU64::new(0),
        }
    }

    /// 随机密钥 (未配置密码时使用)
    pub fn random(max_age: Duration) -> Self {
        let mut key = vec![0u8; 32];
        rand::thread_rng().fill_bytes(&mut key);
        Self::new(key, max_age)
    }

    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    fn sign(&self, issued_at_ms: u64) -> String {
        let mut mac = HmacSha256::new_from_slice(&self.key)
            .expect("HMAC can take key of any size");
        mac.update(issued_at_ms.to_string().as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// 签发新 token，签发时间严格递增
    pub fn issue(&self) -> SessionToken {
        let now = now_ms();
        let mut previous = self.last_issued.load(Ordering::Relaxed);
        let issued_at_ms = loop {
            let candidate = now.max(previous + 1);
            match self.last_issued.compare_exchange_weak(
                previous,
                candidate,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break candidate,
                Err(actual) => previous = actual,
            }
        };

        SessionToken {
            issued_at_ms,
            value: format!("{}.{}", issued_at_ms, self.sign(issued_at_ms)),
        }
    }

    /// 校验 cookie 值
    pub fn verify(&self, value: &str) -> bool {
        self.verify_at(value, now_ms())
    }

    fn verify_at(&self, value: &str, now: u64) -> bool {
        let Some((timestamp, signature)) = value.split_once('.') else {
            return false;
        };
        let Ok(issued_at_ms) = timestamp.parse::<u64>() else {
            return false;
        };
        // 单调签发可能让时间戳略微领先时钟
        if issued_at_ms > now + 1_000 {
            return false;
        }
        if u128::from(now.saturating_sub(issued_at_ms)) > self.max_age.as_millis() {
            return false;
        }
        constant_time_eq(self.sign(issued_at_ms).as_bytes(), signature.as_bytes())
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_then_verify() {
        let signer = SessionSigner::new(b"key".to_vec(), DEFAULT_MAX_AGE);
        let token = signer.issue();
        assert!(signer.verify(&token.value));
    }

    #[test]
    fn test_issue_is_monotonic() {
        let signer = SessionSigner::random(DEFAULT_MAX_AGE);
        let mut last = 0;
        for _ in 0..1000 {
            let token = signer.issue();
            assert!(token.issued_at_ms > last);
            last = token.issued_at_ms;
        }
    }

    #[test]
    fn test_wrong_key_rejected() {
        let a = SessionSigner::new(b"a".to_vec(), DEFAULT_MAX_AGE);
        let b = SessionSigner::new(b"b".to_vec(), DEFAULT_MAX_AGE);
        assert!(!b.verify(&a.issue().value));
    }

    #[test]
    fn test_tampered_or_malformed_rejected() {
        let signer = SessionSigner::new(b"key".to_vec(), DEFAULT_MAX_AGE);
        let token = signer.issue();
        let (ts, sig) = token.value.split_once('.').unwrap();

        let shifted = format!("{}.{}", ts.parse::<u64>().unwrap() - 1, sig);
        assert!(!signer.verify(&shifted));
        assert!(!signer.verify(ts));
        assert!(!signer.verify(""));
        assert!(!signer.verify("abc.def"));
    }

    #[test]
    fn test_expired_and_future_rejected() {
        let signer = SessionSigner::new(b"key".to_vec(), Duration::from_secs(60));
        let token = signer.issue();
        let t = token.issued_at_ms;

        assert!(signer.verify_at(&token.value, t + 59_000));
        assert!(!signer.verify_at(&token.value, t + 61_000));
        assert!(!signer.verify_at(&token.value, t.saturating_sub(5_000)));
    }
}
