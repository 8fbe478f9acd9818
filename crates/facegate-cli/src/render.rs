//! Terminal rendering of daemon replies.

use chrono::{DateTime, Utc};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Candidate {
    pub name: String,
    pub distance: f32,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Decision {
    NoFace,
    Granted {
        identity: String,
        confidence: f32,
        emotion: String,
        suspicion_score: f32,
        suspicious: bool,
        department: Option<String>,
    },
    Denied {
        closest: Vec<Candidate>,
    },
}

#[derive(Debug, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub user_name: String,
    pub confidence: f32,
    #[serde(default)]
    pub emotion: String,
    #[serde(default)]
    pub suspicious: bool,
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct UserRecord {
    #[serde(default)]
    pub employee_id: String,
    #[serde(default)]
    pub department: String,
    pub registered_at: DateTime<Utc>,
    pub last_seen: Option<DateTime<Utc>>,
    #[serde(default)]
    pub total_access_count: u64,
}

#[derive(Debug, Deserialize)]
pub struct UserSummary {
    pub name: String,
    pub photo_count: usize,
    pub record: Option<UserRecord>,
}

#[derive(Debug, Deserialize)]
pub struct Statistics {
    pub total_users: usize,
    pub total_photos: usize,
    pub total_accesses: usize,
    pub total_denials: usize,
    pub suspicious_count: usize,
    pub total_logs: usize,
}

pub fn emotion_glyph(emotion: &str) -> &'static str {
    match emotion.to_lowercase().as_str() {
        "happy" => "😊",
        "sad" => "😢",
        "angry" => "😠",
        "fear" => "😨",
        "surprise" => "😮",
        "disgust" => "🤢",
        _ => "😐",
    }
}

pub fn decision(d: &Decision) -> String {
    match d {
        Decision::NoFace => "ACCESS DENIED: no face detected".to_string(),
        Decision::Granted {
            identity,
            confidence,
            emotion,
            suspicion_score,
            suspicious,
            department,
        } => {
            let mut out = format!(
                "ACCESS GRANTED: {identity}\n  confidence: {:.1}%\n  emotion:    {} {emotion}\n  department: {}",
                confidence * 100.0,
                emotion_glyph(emotion),
                department.as_deref().unwrap_or("N/A"),
            );
            if *suspicious {
                out.push_str(&format!(
                    "\n  WARNING: unusual behaviour ({:.1}%)",
                    suspicion_score * 100.0
                ));
            }
            out
        }
        Decision::Denied { closest } => {
            let mut out = "ACCESS DENIED: unknown person".to_string();
            for c in closest {
                out.push_str(&format!("\n  {}: {:.1}%", c.name, (1.0 - c.distance) * 100.0));
            }
            out
        }
    }
}

pub fn logs(entries: &[LogEntry]) -> String {
    if entries.is_empty() {
        return "No logs".to_string();
    }
    let mut out = format!(
        "{:<20} {:<20} {:>7} {:<10} {:<10} {}",
        "TIMESTAMP", "USER", "CONF%", "EMOTION", "SUSPICIOUS", "STATUS"
    );
    for e in entries {
        out.push_str(&format!(
            "\n{:<20} {:<20} {:>7.2} {:<10} {:<10} {}",
            e.timestamp.format("%Y-%m-%d %H:%M:%S"),
            e.user_name,
            e.confidence,
            e.emotion,
            if e.suspicious { "yes" } else { "no" },
            e.status,
        ));
    }
    out
}

pub fn users(users: &[UserSummary]) -> String {
    if users.is_empty() {
        return "No users yet".to_string();
    }
    let mut out = format!("{} user(s)", users.len());
    for u in users {
        out.push_str(&format!("\n\n{}\n  photos:       {}", u.name, u.photo_count));
        if let Some(r) = &u.record {
            out.push_str(&format!(
                "\n  employee id:  {}\n  department:   {}\n  registered:   {}\n  last seen:    {}\n  access count: {}",
                or_na(&r.employee_id),
                or_na(&r.department),
                r.registered_at.format("%Y-%m-%d"),
                r.last_seen
                    .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_else(|| "Never".to_string()),
                r.total_access_count,
            ));
        }
    }
    out
}

pub fn statistics(s: &Statistics) -> String {
    format!(
        "users:      {}\nphotos:     {}\ngranted:    {}\ndenied:     {}\nsuspicious: {}\nlog size:   {}",
        s.total_users, s.total_photos, s.total_accesses, s.total_denials, s.suspicious_count, s.total_logs
    )
}

fn or_na(s: &str) -> &str {
    if s.is_empty() { "N/A" } else { s }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_granted_rendering() {
        let d: Decision = serde_json::from_str(
            r#"{"outcome":"granted","identity":"Alice","confidence":0.7,"emotion":"happy",
                "suspicion_score":0.6,"suspicious":true,"department":null}"#,
        )
        .unwrap();
        let text = decision(&d);
        assert!(text.starts_with("ACCESS GRANTED: Alice"));
        assert!(text.contains("70.0%"));
        assert!(text.contains("department: N/A"));
        assert!(text.contains("unusual behaviour (60.0%)"));
    }

    #[test]
    fn test_denied_lists_candidates() {
        let d: Decision = serde_json::from_str(
            r#"{"outcome":"denied","closest":[{"name":"Bob","distance":0.65}]}"#,
        )
        .unwrap();
        assert_eq!(decision(&d), "ACCESS DENIED: unknown person\n  Bob: 35.0%");
    }

    #[test]
    fn test_no_face() {
        let d: Decision = serde_json::from_str(r#"{"outcome":"no_face"}"#).unwrap();
        assert_eq!(decision(&d), "ACCESS DENIED: no face detected");
    }

    #[test]
    fn test_log_table() {
        let entries: Vec<LogEntry> = serde_json::from_str(
            r#"[{"timestamp":"2026-01-02T03:04:05Z","user_name":"Unknown","confidence":0.0,
                 "emotion":"","suspicious":false,"status":"denied"}]"#,
        )
        .unwrap();
        let text = logs(&entries);
        assert!(text.lines().nth(1).unwrap().starts_with("2026-01-02 03:04:05"));
        assert!(text.ends_with("denied"));
        assert_eq!(logs(&[]), "No logs");
    }

    #[test]
    fn test_emotion_glyph_fallback() {
        assert_eq!(emotion_glyph("HAPPY"), "😊");
        assert_eq!(emotion_glyph("unknown"), "😐");
    }
}
