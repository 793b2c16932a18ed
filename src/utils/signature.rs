use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// 托管服务请求签名工具
pub struct SignatureHelper;

impl SignatureHelper {
    /// 签名: hex(HMAC-SHA256(timestamp + method + path + body))
    pub fn custody_signature(
        secret: &str,
        timestamp: &str,
        method: &str,
        request_path: &str,
        body: &str,
    ) -> String {
        let prehash = format!("{}{}{}{}", timestamp, method.to_uppercase(), request_path, body);
        let mut mac =
            HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC 支持任意长度密钥");
        mac.update(prehash.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// 毫秒级时间戳
    pub fn timestamp_ms() -> String {
        Utc::now().timestamp_millis().to_string()
    }
}
