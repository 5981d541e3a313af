use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};
use url::Url;

/// A page visit as stored in the `visits` table.
#[derive(Clone, Debug, Default)]
pub struct Visit {
    pub created_at: String,
    pub path: String,
    pub country: String,
    pub ip: String,
    pub user_agent: String,
    pub device_type: String,
    pub visitor: String,
}

pub fn analyze(visit: &mut Visit) {
    visit.path = visit_path(&visit.path);
    visit.country = visit_country(&visit.country);
    if visit.device_type.is_empty() {
        visit.device_type = device_type(&visit.user_agent).to_string();
    }
    if visit.visitor.is_empty() {
        visit.visitor = hash_uuid(&format!("{}{}", visit.ip, visit.user_agent));
    }
}

static RE_BOT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)bot|crawl|fetch|spider|scan|curl|wget|python|okhttp|headless|\+http")
        .expect("re")
});
static RE_TABLET: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)iPad|Tablet|Kindle|Silk|PlayBook").expect("re"));
static RE_MOBILE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)Mobile|iPhone|iPod|Android|Windows Phone|BlackBerry|Opera Mini").expect("re")
});

/// `Bot`, `Tablet`, `Mobile` or `Desktop`; empty when there is no user agent.
fn device_type(user_agent: &str) -> &'static str {
    if user_agent.trim().is_empty() {
        return "";
    }
    if RE_BOT.is_match(user_agent) {
        return "Bot";
    }
    if is_tablet(user_agent) {
        return "Tablet";
    }
    if RE_MOBILE.is_match(user_agent) {
        return "Mobile";
    }
    "Desktop"
}

fn is_tablet(user_agent: &str) -> bool {
    if RE_TABLET.is_match(user_agent) {
        return true;
    }
    // Android tablets omit "Mobile".
    user_agent.contains("Android") && !user_agent.contains("Mobile")
}

fn visit_path(path: &str) -> String {
    let path = path.trim();
    if let Ok(u) = Url::parse(path) {
        if u.has_host() {
            return u.path().to_string();
        }
    }
    if path.is_empty() {
        return "/".to_string();
    }
    path.split(['?', '#']).next().unwrap_or(path).to_string()
}

fn visit_country(country: &str) -> String {
    country.trim().to_uppercase()
}

fn hash_uuid(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    let sum = hasher.finalize();
    uuid_from_bytes(&sum[..16])
}

fn uuid_from_bytes(b: &[u8]) -> String {
    format!(
        "{}-{}-{}-{}-{}",
        hex::encode(&b[0..4]),
        hex::encode(&b[4..6]),
        hex::encode(&b[6..8]),
        hex::encode(&b[8..10]),
        hex::encode(&b[10..16])
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const IPHONE: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Mobile/15E148 Safari/604.1";
    const IPAD: &str = "Mozilla/5.0 (iPad; CPU OS 17_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Safari/604.1";
    const ANDROID_TAB: &str = "Mozilla/5.0 (Linux; Android 13; SM-X200) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/118.0 Safari/537.36";
    const ANDROID_PHONE: &str = "Mozilla/5.0 (Linux; Android 13; Pixel 7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/118.0 Mobile Safari/537.36";
    const DESKTOP: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/118.0 Safari/537.36";

    #[test]
    fn classifies_devices() {
        assert_eq!(device_type(IPHONE), "Mobile");
        assert_eq!(device_type(ANDROID_PHONE), "Mobile");
        assert_eq!(device_type(IPAD), "Tablet");
        assert_eq!(device_type(ANDROID_TAB), "Tablet");
        assert_eq!(device_type(DESKTOP), "Desktop");
        assert_eq!(device_type("Googlebot/2.1 (+http://www.google.com/bot.html)"), "Bot");
        assert_eq!(device_type(""), "");
    }

    #[test]
    fn normalizes_visit() {
        let mut visit = Visit {
            path: "https://blog.example.com/posts/hello?utm=x".to_string(),
            country: " ng ".to_string(),
            ip: "10.0.0.1".to_string(),
            user_agent: DESKTOP.to_string(),
            ..Default::default()
        };
        analyze(&mut visit);
        assert_eq!(visit.path, "/posts/hello");
        assert_eq!(visit.country, "NG");
        assert_eq!(visit.device_type, "Desktop");
        assert_eq!(visit.visitor.len(), 36);
        assert_eq!(visit.visitor.matches('-').count(), 4);
    }

    #[test]
    fn same_client_same_visitor() {
        let mut a = Visit {
            ip: "1.2.3.4".to_string(),
            user_agent: IPHONE.to_string(),
            ..Default::default()
        };
        let mut b = a.clone();
        b.path = "/about#team".to_string();
        analyze(&mut a);
        analyze(&mut b);
        assert_eq!(a.visitor, b.visitor);
        assert_eq!(a.path, "/");
        assert_eq!(b.path, "/about");
    }
}
