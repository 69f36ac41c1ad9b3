use chrono::{DateTime, Utc};
use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use crate::time::serde_instant;

/// Имя поля с идентификатором, который присваивает хранилище.
pub const STORED_ID_FIELD: &str = "_id";

/// Идентификатор записи, присвоенный хранилищем при append.
/// Монотонно растёт в пределах одного хранилища — по нему
/// определяется «свежесть» записи.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StoredId(pub u64);

impl std::fmt::Display for StoredId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Собственная позиция носителя сенсора.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Map<String, Value>")]
pub struct OwnPosition {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude_degdec: Option<Number>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude_degdec: Option<Number>,
    /// Неизвестные вложенные поля и явные `null` — переносятся как есть.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TryFrom<Map<String, Value>> for OwnPosition {
    type Error = serde_json::Error;

    fn try_from(mut map: Map<String, Value>) -> Result<Self, Self::Error> {
        Ok(Self {
            latitude_degdec: take(&mut map, "latitude_degdec")?,
            longitude_degdec: take(&mut map, "longitude_degdec")?,
            extra: map,
        })
    }
}

/// Одно наблюдение радарного трека плюс метки времени жизненного цикла.
///
/// Известные поля типизированы, все остальные поля producer'а лежат
/// в `extra` и проходят decode → persist → broadcast без изменений.
/// Все измерения необязательны: producer не обязан их присылать.
/// Явный `null` в известном поле остаётся в `extra`, чтобы отличать
/// «прислали null» от «не прислали». Измерения хранятся как
/// `serde_json::Number`: `9410` остаётся целым.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Map<String, Value>")]
pub struct TrackEvent {
    /// Присваивается хранилищем; у входящих datagram'ов всегда `None`.
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<StoredId>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub track_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub freq_mhz: Option<Number>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prf_hz: Option<Number>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pw_us: Option<Number>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amplitude_db: Option<Number>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scan_type: Option<String>,
    /// Time of first arrival, as reported by the sensor.
    #[serde(serialize_with = "serde_instant::serialize", skip_serializing_if = "Option::is_none")]
    pub tofa_utc: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub own_position: Option<OwnPosition>,

    /// Часы producer'а — недоверенные, только для диагностики.
    #[serde(serialize_with = "serde_instant::serialize", skip_serializing_if = "Option::is_none")]
    pub ts_sent: Option<DateTime<Utc>>,
    /// Момент чтения datagram'а из сокета.
    #[serde(serialize_with = "serde_instant::serialize", skip_serializing_if = "Option::is_none")]
    pub ts_received: Option<DateTime<Utc>>,
    /// Момент подтверждения append хранилищем.
    #[serde(serialize_with = "serde_instant::serialize", skip_serializing_if = "Option::is_none")]
    pub ts_stored: Option<DateTime<Utc>>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Поля, которые всегда перезаписывает сервер: входящий `null` в них
/// не переносится.
const SERVER_FIELDS: [&str; 3] = [STORED_ID_FIELD, "ts_received", "ts_stored"];

impl TryFrom<Map<String, Value>> for TrackEvent {
    type Error = serde_json::Error;

    fn try_from(mut map: Map<String, Value>) -> Result<Self, Self::Error> {
        for field in SERVER_FIELDS {
            if map.get(field).is_some_and(Value::is_null) {
                map.shift_remove(field);
            }
        }
        Ok(Self {
            id: take(&mut map, STORED_ID_FIELD)?,
            track_id: take(&mut map, "track_id")?,
            freq_mhz: take(&mut map, "freq_mhz")?,
            prf_hz: take(&mut map, "prf_hz")?,
            pw_us: take(&mut map, "pw_us")?,
            amplitude_db: take(&mut map, "amplitude_db")?,
            scan_type: take(&mut map, "scan_type")?,
            tofa_utc: take_instant(&mut map, "tofa_utc")?,
            own_position: take(&mut map, "own_position")?,
            ts_sent: take_instant(&mut map, "ts_sent")?,
            ts_received: take_instant(&mut map, "ts_received")?,
            ts_stored: take_instant(&mut map, "ts_stored")?,
            extra: map,
        })
    }
}

/// Забрать известное поле из карты. Отсутствующее или `null` — `None`,
/// причём `null` остаётся в карте и попадает в `extra`.
fn take<T: DeserializeOwned>(map: &mut Map<String, Value>, key: &str) -> Result<Option<T>, serde_json::Error> {
    match map.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(_) => {
            let value = map.shift_remove(key).unwrap_or(Value::Null);
            serde_json::from_value(value)
                .map(Some)
                .map_err(|e| serde_json::Error::custom(format!("{key}: {e}")))
        }
    }
}

fn take_instant(map: &mut Map<String, Value>, key: &str) -> Result<Option<DateTime<Utc>>, serde_json::Error> {
    match map.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(_) => {
            let value = map.shift_remove(key).unwrap_or(Value::Null);
            serde_instant::deserialize(value).map_err(|e| serde_json::Error::custom(format!("{key}: {e}")))
        }
    }
}

impl TrackEvent {
    /// `ts_received - ts_sent` в миллисекундах.
    ///
    /// Чисто диагностическая величина: часы producer'а не синхронизированы,
    /// значение может быть отрицательным.
    pub fn network_delay_ms(&self) -> Option<i64> {
        match (self.ts_sent, self.ts_received) {
            (Some(sent), Some(received)) => Some((received - sent).num_milliseconds()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn unknown_fields_survive_round_trip() {
        let input = json!({
            "track_id": "T-17",
            "freq_mhz": 9410.5,
            "own_position": { "latitude_degdec": 21.1, "longitude_degdec": 72.6, "alt_m": 40 },
            "emitter": { "class": "nav", "confidence": 0.93 },
            "tags": ["a", "b"],
        });
        let event: TrackEvent = serde_json::from_value(input.clone()).unwrap();
        assert_eq!(event.track_id.as_deref(), Some("T-17"));
        assert_eq!(event.extra["emitter"]["class"], "nav");
        assert_eq!(event.own_position.as_ref().unwrap().extra["alt_m"], 40);

        let back = serde_json::to_value(&event).unwrap();
        assert_eq!(back, input);
    }

    #[test]
    fn explicit_nulls_and_integers_survive_round_trip() {
        let input = json!({
            "track_id": "x",
            "scan_type": null,
            "freq_mhz": 9410,
            "prf_hz": 1200.5,
            "own_position": null,
            "tofa_utc": null,
        });
        let event: TrackEvent = serde_json::from_value(input.clone()).unwrap();
        assert_eq!(event.scan_type, None);
        assert_eq!(event.freq_mhz, Some(Number::from(9410)));
        assert!(event.extra["scan_type"].is_null());

        assert_eq!(serde_json::to_value(&event).unwrap(), input);
    }

    #[test]
    fn nested_null_position_fields_survive() {
        let input = json!({ "own_position": { "latitude_degdec": null, "longitude_degdec": 72 } });
        let event: TrackEvent = serde_json::from_value(input.clone()).unwrap();
        let position = event.own_position.as_ref().unwrap();
        assert_eq!(position.latitude_degdec, None);
        assert_eq!(position.longitude_degdec, Some(Number::from(72)));
        assert_eq!(serde_json::to_value(&event).unwrap(), input);
    }

    #[test]
    fn null_server_fields_are_not_carried() {
        let event: TrackEvent =
            serde_json::from_value(json!({ "ts_received": null, "ts_stored": null, "_id": null })).unwrap();
        assert!(event.extra.is_empty());
    }

    #[test]
    fn wrong_type_names_the_field() {
        let err = serde_json::from_value::<TrackEvent>(json!({ "freq_mhz": "high" })).unwrap_err();
        assert!(err.to_string().contains("freq_mhz"), "{err}");
    }

    #[test]
    fn stored_id_serializes_as_underscore_id() {
        let event = TrackEvent {
            id: Some(StoredId(42)),
            track_id: Some("T-1".into()),
            ..Default::default()
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value[STORED_ID_FIELD], 42);
        let back: TrackEvent = serde_json::from_value(value).unwrap();
        assert_eq!(back.id, Some(StoredId(42)));
    }

    #[test]
    fn network_delay_can_be_negative_under_skew() {
        let received = Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap();
        let event = TrackEvent {
            ts_sent: Some(received + chrono::TimeDelta::milliseconds(250)),
            ts_received: Some(received),
            ..Default::default()
        };
        assert_eq!(event.network_delay_ms(), Some(-250));
    }

    #[test]
    fn network_delay_needs_both_instants() {
        let event = TrackEvent {
            ts_received: Some(Utc::now()),
            ..Default::default()
        };
        assert_eq!(event.network_delay_ms(), None);
    }
}
