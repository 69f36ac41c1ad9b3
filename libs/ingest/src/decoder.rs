use serde_json::Value;

use radar_api::{TrackEvent, STORED_ID_FIELD};

use crate::error::DecodeError;

/// Разобрать payload одного datagram'а в `TrackEvent`.
///
/// Любые байты от сети — ожидаемый вход: функция никогда не паникует,
/// любая проблема превращается в `DecodeError`. Неизвестные поля
/// сохраняются в `extra`. Входящий `_id` отбрасывается — идентификатор
/// записи назначает хранилище.
pub fn decode(payload: &[u8]) -> Result<TrackEvent, DecodeError> {
    if payload.iter().all(u8::is_ascii_whitespace) {
        return Err(DecodeError::Empty);
    }

    let value: Value = serde_json::from_slice(payload).map_err(DecodeError::Syntax)?;
    let mut object = match value {
        Value::Object(map) => map,
        other => return Err(DecodeError::NotAnObject(json_kind(&other))),
    };
    object.remove(STORED_ID_FIELD);

    serde_json::from_value(Value::Object(object)).map_err(DecodeError::Field)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
