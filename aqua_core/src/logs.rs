//! Executed-dose log as exported by the device.

use chrono::NaiveDateTime;
use serde::Serialize;
use serde_json::{Value, json};

use crate::device::DeviceConfig;
use crate::error::{DoserError, Result};
use crate::util::{DEVICE_LOG_FORMAT, parse_device_timestamp};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEntry {
    pub timestamp: NaiveDateTime,
    pub pump_id: u8,
    pub dose_ml: f64,
    pub origin: String,
}

impl LogEntry {
    /// Device wire form: `{timestamp, bombaId, bomba, dosagem, origem}`.
    pub fn to_device_value(&self, config: &DeviceConfig) -> Value {
        let name = config
            .pump(self.pump_id)
            .map_or_else(|| format!("Bomba {}", self.pump_id), |p| p.display_name());
        json!({
            "timestamp": self.timestamp.format(DEVICE_LOG_FORMAT).to_string(),
            "bombaId": self.pump_id,
            "bomba": name,
            "dosagem": self.dose_ml,
            "origem": self.origin,
        })
    }
}

/// Parse a log export: an array, `{"logs": [...]}`, or an object keyed by entry id.
///
/// Entries that cannot be placed (bad timestamp, unknown pump, missing dose)
/// are skipped with a warning.
pub fn parse_dose_log(doc: &Value, config: &DeviceConfig) -> Result<Vec<LogEntry>> {
    let items: Vec<&Value> = match doc {
        Value::Array(items) => items.iter().collect(),
        Value::Object(obj) => match obj.get("logs") {
            Some(Value::Array(items)) => items.iter().collect(),
            Some(_) => {
                return Err(DoserError::Format("\"logs\" is not an array".into()));
            }
            None => obj.values().collect(),
        },
        _ => return Err(DoserError::Format("dose log must be an array or object".into())),
    };

    let mut out = Vec::with_capacity(items.len());
    for (index, item) in items.into_iter().enumerate() {
        match parse_entry(item, config) {
            Ok(entry) => out.push(entry),
            Err(reason) => tracing::warn!(index, reason, "log entry skipped"),
        }
    }
    Ok(out)
}

fn parse_entry(item: &Value, config: &DeviceConfig) -> std::result::Result<LogEntry, &'static str> {
    let obj = item.as_object().ok_or("not an object")?;
    let timestamp = obj
        .get("timestamp")
        .and_then(Value::as_str)
        .and_then(parse_device_timestamp)
        .ok_or("unparseable timestamp")?;
    let by_id = obj
        .get("bombaId")
        .and_then(Value::as_u64)
        .and_then(|id| u8::try_from(id).ok())
        .filter(|id| config.pump(*id).is_some());
    let pump_id = by_id
        .or_else(|| {
            obj.get("bomba")
                .and_then(Value::as_str)
                .and_then(|name| config.pump_by_name(name))
        })
        .ok_or("unknown pump")?;
    let dose_ml = obj
        .get("dosagem")
        .and_then(Value::as_f64)
        .ok_or("missing dose")?;
    let origin = obj
        .get("origem")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    Ok(LogEntry {
        timestamp,
        pump_id,
        dose_ml,
        origin,
    })
}

/// Newest first; ties keep their input order.
pub fn sort_newest_first(entries: &mut [LogEntry]) {
    entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> DeviceConfig {
        let mut c = DeviceConfig::default();
        if let Some(p) = c.pump_mut(2) {
            p.name = "Magnesio".into();
        }
        c
    }

    #[test]
    fn accepts_all_three_shapes() {
        let entry = json!({"timestamp":"14/10/2026 08:20","bomba":"Bomba 1","dosagem":2.0,"origem":"Programado"});
        let c = cfg();
        assert_eq!(parse_dose_log(&json!([entry.clone()]), &c).unwrap().len(), 1);
        assert_eq!(parse_dose_log(&json!({"logs":[entry.clone()]}), &c).unwrap().len(), 1);
        assert_eq!(parse_dose_log(&json!({"-Nx1": entry}), &c).unwrap().len(), 1);
        assert!(parse_dose_log(&json!("nope"), &c).is_err());
    }

    #[test]
    fn pump_resolved_by_id_then_name() {
        let c = cfg();
        let doc = json!([
            {"timestamp":"14/10/2026 08:20:00","bombaId":3,"bomba":"Magnesio","dosagem":1.0,"origem":"x"},
            {"timestamp":"14/10/2026 08:21:00","bomba":"magnesio","dosagem":1.0,"origem":"x"},
        ]);
        let logs = parse_dose_log(&doc, &c).unwrap();
        assert_eq!(logs[0].pump_id, 3);
        assert_eq!(logs[1].pump_id, 2);
    }

    #[test]
    fn bad_entries_are_skipped() {
        let doc = json!([
            {"timestamp":"yesterday","bomba":"Bomba 1","dosagem":1.0},
            {"timestamp":"14/10/2026 08:20","bomba":"Bomba 7","dosagem":1.0},
            {"timestamp":"14/10/2026 08:20","bomba":"Bomba 1"},
            {"timestamp":"14/10/2026 08:20","bomba":"Bomba 1","dosagem":0.8},
        ]);
        let logs = parse_dose_log(&doc, &cfg()).unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].origin, "");
    }

    #[test]
    fn newest_first() {
        let doc = json!([
            {"timestamp":"13/10/2026 23:59","bomba":"Bomba 1","dosagem":1.0},
            {"timestamp":"14/10/2026 00:01","bomba":"Bomba 1","dosagem":1.0},
        ]);
        let mut logs = parse_dose_log(&doc, &cfg()).unwrap();
        sort_newest_first(&mut logs);
        assert_eq!(logs[0].timestamp.format("%d").to_string(), "14");
    }

    #[test]
    fn device_value_uses_display_name() {
        let c = cfg();
        let e = &parse_dose_log(
            &json!([{"timestamp":"14/10/2026 08:20","bombaId":2,"dosagem":1.5,"origem":"Teste"}]),
            &c,
        )
        .unwrap()[0];
        let v = e.to_device_value(&c);
        assert_eq!(v["bomba"], "Magnesio");
        assert_eq!(v["timestamp"], "14/10/2026 08:20");
    }
}
