//! Pump configuration document.
//!
//! The wire shape is an object keyed `bomb1`..`bomb3`. Parsing is lenient in
//! the same way the device firmware is: anything missing or mistyped falls
//! back to the slot default. Strictness is applied by [`DeviceConfig::validate`]
//! before a document is uploaded.

use std::collections::HashSet;

use chrono::Weekday;
use serde_json::{Map, Value, json};

use crate::error::{DoserError, Result};

pub const PUMP_COUNT: u8 = 3;
pub const SCHEDULE_SLOTS: usize = 3;
/// Dose assigned to a slot the document does not describe.
pub const DEFAULT_SLOT_DOSE_ML: f64 = 0.5;

/// Sunday-first, seven days.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WeekdayMask(pub [bool; 7]);

impl WeekdayMask {
    pub const ALL: Self = Self([true; 7]);
    pub const NONE: Self = Self([false; 7]);

    pub fn is_active_on(&self, day: Weekday) -> bool {
        self.0[day.num_days_from_sunday() as usize]
    }

    /// Pads with `false` or truncates to seven entries.
    fn from_value(v: Option<&Value>) -> Self {
        let mut days = [false; 7];
        if let Some(arr) = v.and_then(Value::as_array) {
            for (slot, item) in days.iter_mut().zip(arr) {
                *slot = truthy(item);
            }
        }
        Self(days)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Schedule {
    pub id: u32,
    pub hour: u32,
    pub minute: u32,
    pub dose_ml: f64,
    pub enabled: bool,
    pub weekdays: WeekdayMask,
}

impl Schedule {
    pub fn disabled(id: u32) -> Self {
        Self {
            id,
            hour: 0,
            minute: 0,
            dose_ml: DEFAULT_SLOT_DOSE_ML,
            enabled: false,
            weekdays: WeekdayMask::NONE,
        }
    }

    pub const fn minutes_of_day(&self) -> u32 {
        self.hour.saturating_mul(60).saturating_add(self.minute)
    }

    pub fn time_label(&self) -> String {
        format!("{:02}:{:02}", self.hour, self.minute)
    }

    fn from_value(raw: Option<&Value>, index: usize) -> Self {
        let mut s = Self::disabled(slot_id(index));
        let Some(obj) = raw.and_then(Value::as_object) else {
            return s;
        };
        if let Some(id) = obj.get("id").and_then(Value::as_u64) {
            s.id = u32::try_from(id).unwrap_or(u32::MAX);
        }
        let time = obj.get("time");
        let (hour, minute) = (field_u32(time, "hour"), field_u32(time, "minute"));
        if hour > 23 || minute > 59 {
            tracing::warn!(slot = s.id, hour, minute, "schedule time out of range; slot disabled");
            return s;
        }
        s.hour = hour;
        s.minute = minute;
        s.dose_ml = obj
            .get("dosagem")
            .and_then(Value::as_f64)
            .unwrap_or(DEFAULT_SLOT_DOSE_ML);
        s.enabled = obj.get("status").is_some_and(truthy);
        s.weekdays = WeekdayMask::from_value(obj.get("diasSemanaSelecionados"));
        s
    }

    fn to_value(&self, index: usize) -> Value {
        json!({
            "id": slot_id(index),
            "time": { "hour": self.hour, "minute": self.minute },
            "dosagem": self.dose_ml,
            "status": self.enabled,
            "diasSemanaSelecionados": self.weekdays.0,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BombConfig {
    id: u8,
    pub name: String,
    /// Multiplier applied to the pump run time per ml.
    pub calibration_coef: f64,
    pub stock_ml: f64,
    pub schedules: Vec<Schedule>,
}

impl BombConfig {
    fn with_defaults(id: u8) -> Self {
        Self {
            id,
            name: default_name(id),
            calibration_coef: 1.0,
            stock_ml: 0.0,
            schedules: (0..SCHEDULE_SLOTS).map(|i| Schedule::disabled(slot_id(i))).collect(),
        }
    }

    pub const fn id(&self) -> u8 {
        self.id
    }

    /// Display name, falling back to `Bomba N` when blank.
    pub fn display_name(&self) -> String {
        let trimmed = self.name.trim();
        if trimmed.is_empty() {
            default_name(self.id)
        } else {
            trimmed.to_string()
        }
    }

    fn from_value(id: u8, raw: &Map<String, Value>) -> Self {
        let mut pump = Self::with_defaults(id);
        if let Some(name) = raw.get("name").and_then(Value::as_str) {
            pump.name = name.to_string();
        }
        pump.calibration_coef = raw.get("calibrCoef").and_then(Value::as_f64).unwrap_or(1.0);
        pump.stock_ml = raw
            .get("quantidadeEstoque")
            .and_then(Value::as_f64)
            .unwrap_or(0.0);

        let listed = raw
            .get("schedules")
            .and_then(Value::as_array)
            .filter(|a| !a.is_empty());
        pump.schedules = match listed {
            Some(items) => (0..SCHEDULE_SLOTS)
                .map(|i| Schedule::from_value(items.get(i), i))
                .collect(),
            // Older firmware kept one schedule directly on the pump object.
            None => {
                let mut first = Schedule::from_value(Some(&Value::Object(raw.clone())), 0);
                first.id = slot_id(0);
                std::iter::once(first)
                    .chain((1..SCHEDULE_SLOTS).map(|i| Schedule::disabled(slot_id(i))))
                    .collect()
            }
        };
        pump
    }

    fn to_value(&self) -> Value {
        json!({
            "name": self.name,
            "calibrCoef": self.calibration_coef,
            "quantidadeEstoque": self.stock_ml,
            "schedules": self
                .schedules
                .iter()
                .enumerate()
                .map(|(i, s)| s.to_value(i))
                .collect::<Vec<_>>(),
        })
    }
}

/// All pumps of one device, always `PUMP_COUNT` of them in id order.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceConfig {
    pumps: Vec<BombConfig>,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            pumps: (1..=PUMP_COUNT).map(BombConfig::with_defaults).collect(),
        }
    }
}

impl DeviceConfig {
    /// Build from a decoded document. Only a non-object document is an error.
    pub fn from_document(doc: &Value) -> Result<Self> {
        let obj = doc
            .as_object()
            .ok_or_else(|| DoserError::Format("configuration document is not an object".into()))?;
        let pumps = (1..=PUMP_COUNT)
            .map(|id| match obj.get(&format!("bomb{id}")).and_then(Value::as_object) {
                Some(raw) => BombConfig::from_value(id, raw),
                None => BombConfig::with_defaults(id),
            })
            .collect();
        Ok(Self { pumps })
    }

    pub fn to_document(&self) -> Value {
        let mut obj = Map::new();
        for pump in &self.pumps {
            obj.insert(format!("bomb{}", pump.id), pump.to_value());
        }
        Value::Object(obj)
    }

    pub fn pumps(&self) -> &[BombConfig] {
        &self.pumps
    }

    pub fn pump(&self, id: u8) -> Option<&BombConfig> {
        self.pumps.iter().find(|p| p.id == id)
    }

    pub fn pump_mut(&mut self, id: u8) -> Option<&mut BombConfig> {
        self.pumps.iter_mut().find(|p| p.id == id)
    }

    /// Resolve a pump from a log label: its display name or `Bomba N`.
    pub fn pump_by_name(&self, label: &str) -> Option<u8> {
        let label = label.trim();
        self.pumps
            .iter()
            .find(|p| p.display_name().eq_ignore_ascii_case(label))
            .or_else(|| self.pumps.iter().find(|p| default_name(p.id).eq_ignore_ascii_case(label)))
            .map(BombConfig::id)
    }

    /// Copy with one pump's calibration coefficient replaced.
    pub fn with_calibration(&self, pump_id: u8, coef: f64) -> Result<Self> {
        if !coef.is_finite() || coef <= 0.0 {
            return Err(DoserError::InvalidCommand(format!(
                "calibration coefficient must be finite and > 0 (got {coef})"
            )));
        }
        let mut next = self.clone();
        let pump = next
            .pump_mut(pump_id)
            .ok_or_else(|| DoserError::InvalidCommand(format!("unknown pump {pump_id}")))?;
        pump.calibration_coef = coef;
        Ok(next)
    }

    /// Check the document is something the device can run.
    pub fn validate(&self) -> Result<()> {
        for pump in &self.pumps {
            let name = pump.display_name();
            if !pump.calibration_coef.is_finite() || pump.calibration_coef <= 0.0 {
                return Err(invalid(format!("{name}: calibration coefficient must be > 0")));
            }
            if !pump.stock_ml.is_finite() || pump.stock_ml < 0.0 {
                return Err(invalid(format!("{name}: stock must be >= 0")));
            }
            if pump.schedules.len() != SCHEDULE_SLOTS {
                return Err(invalid(format!(
                    "{name}: expected {SCHEDULE_SLOTS} schedule slots, found {}",
                    pump.schedules.len()
                )));
            }
            let mut seen = HashSet::new();
            for s in &pump.schedules {
                if s.hour > 23 || s.minute > 59 {
                    return Err(invalid(format!(
                        "{name}: schedule {} has invalid time {}",
                        s.id,
                        s.time_label()
                    )));
                }
                if !s.enabled {
                    continue;
                }
                if !s.dose_ml.is_finite() || s.dose_ml <= 0.0 {
                    return Err(invalid(format!(
                        "{name}: schedule {} needs a dose > 0",
                        s.id
                    )));
                }
                if !seen.insert(s.minutes_of_day()) {
                    return Err(invalid(format!(
                        "{name}: duplicate schedule time {}",
                        s.time_label()
                    )));
                }
            }
        }
        Ok(())
    }

    /// Enabled schedules active on `day`, as `(pump_id, schedule)`.
    pub fn schedules_on(&self, day: Weekday) -> impl Iterator<Item = (u8, &Schedule)> {
        self.pumps.iter().flat_map(move |p| {
            p.schedules
                .iter()
                .filter(move |s| s.enabled && s.weekdays.is_active_on(day))
                .map(move |s| (p.id, s))
        })
    }
}

fn invalid(msg: String) -> DoserError {
    DoserError::InvalidCommand(msg)
}

fn default_name(id: u8) -> String {
    format!("Bomba {id}")
}

fn slot_id(index: usize) -> u32 {
    u32::try_from(index + 1).unwrap_or(u32::MAX)
}

fn field_u32(obj: Option<&Value>, key: &str) -> u32 {
    obj.and_then(|o| o.get(key))
        .and_then(Value::as_u64)
        .map_or(0, |v| u32::try_from(v).unwrap_or(u32::MAX))
}

fn truthy(v: &Value) -> bool {
    match v {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Null => false,
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_pumps_get_defaults() {
        let cfg = DeviceConfig::from_document(&json!({})).unwrap();
        assert_eq!(cfg.pumps().len(), usize::from(PUMP_COUNT));
        let p3 = cfg.pump(3).unwrap();
        assert_eq!(p3.name, "Bomba 3");
        assert_eq!(p3.calibration_coef, 1.0);
        assert_eq!(p3.schedules.len(), SCHEDULE_SLOTS);
        assert!(p3.schedules.iter().all(|s| !s.enabled && s.dose_ml == 0.5));
    }

    #[test]
    fn out_of_range_time_disables_slot() {
        let doc = json!({ "bomb1": { "schedules": [
            { "id": 7, "time": { "hour": 100_000_000, "minute": 0 },
              "dosagem": 1.0, "status": true },
            { "id": 8, "time": { "hour": 9, "minute": 60 }, "dosagem": 1.0, "status": true }
        ] } });
        let cfg = DeviceConfig::from_document(&doc).unwrap();
        let slots = &cfg.pump(1).unwrap().schedules;
        assert_eq!(slots[0].id, 7);
        assert!(!slots[0].enabled && slots[0].hour == 0);
        assert!(!slots[1].enabled);
        cfg.validate().unwrap();
    }

    #[test]
    fn legacy_pump_fills_first_slot() {
        let doc = json!({
            "bomb1": {
                "name": "KH",
                "time": {"hour": 7, "minute": 15},
                "dosagem": 3.5,
                "status": true,
                "diasSemanaSelecionados": [true, false, true]
            }
        });
        let cfg = DeviceConfig::from_document(&doc).unwrap();
        let s = &cfg.pump(1).unwrap().schedules[0];
        assert_eq!((s.hour, s.minute, s.dose_ml, s.enabled), (7, 15, 3.5, true));
        assert_eq!(s.weekdays.0, [true, false, true, false, false, false, false]);
        assert!(!cfg.pump(1).unwrap().schedules[1].enabled);
    }

    #[test]
    fn weekday_mask_is_sunday_first() {
        let mut days = [false; 7];
        days[0] = true;
        let mask = WeekdayMask(days);
        assert!(mask.is_active_on(Weekday::Sun));
        assert!(!mask.is_active_on(Weekday::Mon));
    }

    #[test]
    fn non_object_document_is_format_error() {
        assert!(matches!(
            DeviceConfig::from_document(&json!([1])),
            Err(DoserError::Format(_))
        ));
    }

    #[test]
    fn document_round_trips_through_model() {
        let mut cfg = DeviceConfig::default();
        let p = cfg.pump_mut(2).unwrap();
        p.name = "Ca".into();
        p.schedules[1] = Schedule {
            id: 2,
            hour: 21,
            minute: 30,
            dose_ml: 1.25,
            enabled: true,
            weekdays: WeekdayMask::ALL,
        };
        let back = DeviceConfig::from_document(&cfg.to_document()).unwrap();
        assert_eq!(back, cfg);
    }

    #[test]
    fn duplicate_enabled_times_rejected() {
        let mut cfg = DeviceConfig::default();
        let p = cfg.pump_mut(1).unwrap();
        for s in p.schedules.iter_mut().take(2) {
            s.enabled = true;
            s.hour = 8;
            s.weekdays = WeekdayMask::ALL;
        }
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate schedule time 08:00"));
        // Disabled defaults all sit at 00:00 and are fine.
        assert!(DeviceConfig::default().validate().is_ok());
    }

    #[test]
    fn pump_by_name_accepts_display_or_default_label() {
        let mut cfg = DeviceConfig::default();
        cfg.pump_mut(1).unwrap().name = "Alk".into();
        assert_eq!(cfg.pump_by_name("alk"), Some(1));
        assert_eq!(cfg.pump_by_name("Bomba 1"), Some(1));
        assert_eq!(cfg.pump_by_name("Bomba 9"), None);
    }
}
