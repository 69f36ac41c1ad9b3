use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};

/// Разобрать момент времени из строки producer'а.
///
/// Принимает RFC 3339 (`2025-03-01T10:00:00.123456Z`, `...+03:00`)
/// и «наивные» ISO-строки без зоны, которые трактуются как UTC
/// (`2025-03-01T10:00:00.123`, `2025-03-01 10:00:00`).
pub fn parse_instant(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Some(t.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// RFC 3339 в UTC с суффиксом `Z` и минимально нужной дробной частью.
pub fn format_instant(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// serde-адаптер для `Option<DateTime<Utc>>`.
///
/// Десериализация: строка (см. [`parse_instant`]), целое число
/// (Unix epoch в миллисекундах) или `null`. Всё остальное — ошибка.
pub mod serde_instant {
    use chrono::{DateTime, Utc};
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(t) => serializer.serialize_str(&super::format_instant(t)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        match serde_json::Value::deserialize(deserializer)? {
            serde_json::Value::Null => Ok(None),
            serde_json::Value::String(s) => super::parse_instant(&s)
                .map(Some)
                .ok_or_else(|| D::Error::custom(format!("invalid timestamp '{s}'"))),
            serde_json::Value::Number(n) => n
                .as_i64()
                .and_then(DateTime::from_timestamp_millis)
                .map(Some)
                .ok_or_else(|| D::Error::custom(format!("timestamp out of range: {n}"))),
            other => Err(D::Error::custom(format!(
                "expected timestamp string or epoch millis, got {other}"
            ))),
        }
    }
}
