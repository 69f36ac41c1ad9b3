use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use radar_api::parse_instant;

/// Как распределить пакеты во времени.
#[derive(Debug, Clone, PartialEq)]
pub enum Pacing {
    /// Без пауз.
    Flat,
    /// Фиксированный шаг.
    Interval(Duration),
    /// Повторить записанные интервалы между значениями поля.
    Recorded(String),
}

/// Пакет и момент его отправки относительно начала прохода.
#[derive(Debug)]
pub struct Entry {
    pub offset: Duration,
    pub record: Map<String, Value>,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct Skipped {
    pub not_object: usize,
    pub no_time: usize,
}

/// Разложить записи по времени. Не-объекты и (для `Recorded`) записи
/// без разбираемого времени пропускаются.
pub fn build(records: Vec<Value>, pacing: &Pacing) -> (Vec<Entry>, Skipped) {
    let mut skipped = Skipped::default();
    let objects: Vec<Map<String, Value>> = records
        .into_iter()
        .filter_map(|v| match v {
            Value::Object(map) => Some(map),
            _ => {
                skipped.not_object += 1;
                None
            }
        })
        .collect();

    let entries = match pacing {
        Pacing::Flat => objects
            .into_iter()
            .map(|record| Entry { offset: Duration::ZERO, record })
            .collect(),
        Pacing::Interval(step) => objects
            .into_iter()
            .enumerate()
            .map(|(i, record)| Entry {
                offset: step.saturating_mul(u32::try_from(i).unwrap_or(u32::MAX)),
                record,
            })
            .collect(),
        Pacing::Recorded(field) => {
            let mut timed: Vec<(DateTime<Utc>, Map<String, Value>)> = objects
                .into_iter()
                .filter_map(|record| match record.get(field).and_then(instant_of) {
                    Some(t) => Some((t, record)),
                    None => {
                        skipped.no_time += 1;
                        None
                    }
                })
                .collect();
            timed.sort_by_key(|(t, _)| *t);

            let t0 = timed.first().map(|(t, _)| *t);
            timed
                .into_iter()
                .map(|(t, record)| {
                    let offset = t0
                        .and_then(|t0| (t - t0).to_std().ok())
                        .unwrap_or(Duration::ZERO);
                    Entry { offset, record }
                })
                .collect()
        }
    };
    (entries, skipped)
}

fn instant_of(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => parse_instant(s),
        Value::Number(n) => n.as_i64().and_then(DateTime::from_timestamp_millis),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn offsets(entries: &[Entry]) -> Vec<u64> {
        entries.iter().map(|e| e.offset.as_millis() as u64).collect()
    }

    #[test]
    fn flat_and_interval() {
        let records = vec![json!({"a": 1}), json!({"a": 2}), json!({"a": 3})];
        let (flat, _) = build(records.clone(), &Pacing::Flat);
        assert_eq!(offsets(&flat), [0, 0, 0]);

        let (paced, skipped) = build(records, &Pacing::Interval(Duration::from_millis(500)));
        assert_eq!(offsets(&paced), [0, 500, 1000]);
        assert_eq!(skipped, Skipped::default());
    }

    #[test]
    fn recorded_gaps_sorted_and_anchored() {
        let records = vec![
            json!({"track_id": "B", "tofa_utc": "2024-05-01T10:00:01.250Z"}),
            json!({"track_id": "A", "tofa_utc": "2024-05-01T10:00:00Z"}),
            json!({"track_id": "C", "tofa_utc": 1714557603000i64}),
            json!({"track_id": "no-time"}),
            json!([1, 2]),
        ];
        let (entries, skipped) = build(records, &Pacing::Recorded("tofa_utc".into()));

        let ids: Vec<_> = entries.iter().map(|e| e.record["track_id"].as_str().unwrap()).collect();
        assert_eq!(ids, ["A", "B", "C"]);
        assert_eq!(offsets(&entries), [0, 1250, 3000]);
        assert_eq!(skipped, Skipped { not_object: 1, no_time: 1 });
    }

    #[test]
    fn recorded_with_no_times_is_empty() {
        let (entries, skipped) = build(vec![json!({"x": 1})], &Pacing::Recorded("tofa_utc".into()));
        assert!(entries.is_empty());
        assert_eq!(skipped.no_time, 1);
    }
}
