//! 加签：HMAC-SHA256(secret, "{timestamp}\n{secret}")，base64 后作为 `sign` 查询参数。

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use url::Url;

type HmacSha256 = Hmac<Sha256>;

/// 计算签名，`timestamp` 为毫秒级时间戳
pub fn compute_signature(timestamp: i64, secret: &str) -> String {
    let string_to_sign = format!("{timestamp}\n{secret}");
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(string_to_sign.as_bytes());
    STANDARD.encode(mac.finalize().into_bytes())
}

/// 在 webhook URL 上设置 `timestamp` 与 `sign` 参数，已有的同名参数会被替换，不修改传入的 URL
pub fn signed_url(url: &Url, secret: &str, timestamp: i64) -> Url {
    let sign = compute_signature(timestamp, secret);
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .into_owned()
        .filter(|(k, _)| k != "timestamp" && k != "sign")
        .collect();

    let mut signed = url.clone();
    signed
        .query_pairs_mut()
        .clear()
        .extend_pairs(&kept)
        .append_pair("timestamp", &timestamp.to_string())
        .append_pair("sign", &sign);
    signed
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "SEC000000000000000000000";

    fn base() -> Url {
        Url::parse("https://oapi.dingtalk.com/robot/send?access_token=abc").unwrap()
    }

    #[test]
    fn test_signature_depends_on_timestamp() {
        let a = compute_signature(1_700_000_000_000, SECRET);
        let b = compute_signature(1_700_000_000_001, SECRET);
        assert_ne!(a, b);
        assert_eq!(a, compute_signature(1_700_000_000_000, SECRET));
        assert_ne!(a, compute_signature(1_700_000_000_000, "another-secret"));
    }

    #[test]
    fn test_signature_matches_hmac() {
        let mut mac = HmacSha256::new_from_slice(SECRET.as_bytes()).unwrap();
        mac.update(format!("1700000000000\n{SECRET}").as_bytes());
        let expected = STANDARD.encode(mac.finalize().into_bytes());
        assert_eq!(compute_signature(1_700_000_000_000, SECRET), expected);
    }

    #[test]
    fn test_signed_url_keeps_token_and_encodes_sign() {
        let url = signed_url(&base(), SECRET, 1_700_000_000_000);
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();

        assert_eq!(pairs[0], ("access_token".to_string(), "abc".to_string()));
        assert_eq!(
            pairs[1],
            ("timestamp".to_string(), "1700000000000".to_string())
        );
        assert_eq!(pairs[2].0, "sign");
        assert_eq!(pairs[2].1, compute_signature(1_700_000_000_000, SECRET));

        // base64 '+', '/' and '=' must be percent-encoded in the raw query.
        let raw_sign = url.query().unwrap().split("sign=").nth(1).unwrap();
        assert!(!raw_sign.contains('+'));
        assert!(!raw_sign.contains('/'));
        assert!(!raw_sign.contains('='));
    }

    #[test]
    fn test_signed_url_replaces_stale_signature() {
        let url = Url::parse(
            "https://oapi.dingtalk.com/robot/send?access_token=a&timestamp=1&sign=old",
        )
        .unwrap();
        let signed = signed_url(&url, SECRET, 2);
        let pairs: Vec<(String, String)> = signed.query_pairs().into_owned().collect();

        assert_eq!(
            pairs,
            vec![
                ("access_token".to_string(), "a".to_string()),
                ("timestamp".to_string(), "2".to_string()),
                ("sign".to_string(), compute_signature(2, SECRET)),
            ]
        );
    }

    #[test]
    fn test_signed_url_leaves_input_untouched() {
        let url = base();
        let _ = signed_url(&url, SECRET, 1);
        assert_eq!(url.as_str(), "https://oapi.dingtalk.com/robot/send?access_token=abc");
    }
}
