//! Derive entity semantics from register table metadata.
//!
//! Every entry gets two tags at load time: a [`CodecKind`] deciding how raw values are
//! decoded and encoded, and an [`EntityKind`] deciding how the entity is exposed.
//! Read-only entries only become sensors or binary sensors, writable entries become
//! switches, selects, climate setpoints or numbers.

use tracing::{debug, info};

use crate::register::{PlatformHint, RegisterEntry, RegisterTable};

/// Units that turn a writable entry into a climate setpoint.
pub const TEMPERATURE_UNITS: [&str; 2] = ["°C", "K"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodecKind {
    Switch,
    Select,
    Numeric,
    Climate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Sensor,
    BinarySensor,
    Switch,
    Select,
    Climate,
    Number,
}

fn is_temperature(unit: Option<&str>) -> bool {
    unit.is_some_and(|unit| TEMPERATURE_UNITS.contains(&unit))
}

/// The order of the checks is authoritative: an entry that is both switch-like and
/// enumerated is a switch.
pub fn codec_kind(entry: &RegisterEntry) -> CodecKind {
    if entry.class.is_bit() || entry.switch.is_some() {
        CodecKind::Switch
    } else if entry.select.as_ref().is_some_and(|values| !values.is_empty()) {
        CodecKind::Select
    } else if entry.is_writable()
        && is_temperature(entry.unit.as_deref())
        && matches!(entry.platform, None | Some(PlatformHint::Climate))
    {
        CodecKind::Climate
    } else {
        CodecKind::Numeric
    }
}

pub fn entity_kind(entry: &RegisterEntry, codec: CodecKind) -> EntityKind {
    if entry.is_writable() {
        match codec {
            CodecKind::Switch => EntityKind::Switch,
            CodecKind::Select => EntityKind::Select,
            CodecKind::Climate => EntityKind::Climate,
            CodecKind::Numeric => EntityKind::Number,
        }
    } else {
        match codec {
            CodecKind::Switch => EntityKind::BinarySensor,
            _ => EntityKind::Sensor,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceClass {
    Temperature,
    Pressure,
    Energy,
    Power,
    Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateClass {
    Measurement,
    TotalIncreasing,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UnitMapping {
    pub unit: Option<String>,
    pub device_class: Option<DeviceClass>,
    pub state_class: Option<StateClass>,
}

impl UnitMapping {
    fn new(unit: &str, device_class: Option<DeviceClass>, state_class: StateClass) -> Self {
        Self {
            unit: Some(unit.to_string()),
            device_class,
            state_class: Some(state_class),
        }
    }
}

/// Normalize a table unit and derive the device and state class of a sensor.
pub fn unit_mapping(unit: Option<&str>) -> UnitMapping {
    use DeviceClass::*;
    use StateClass::*;

    let Some(unit) = unit else {
        return UnitMapping::default();
    };
    let unit = unit.trim();

    match unit {
        "°C" | "K" => return UnitMapping::new(unit, Some(Temperature), Measurement),
        "‰" | "%" | "ppm" => return UnitMapping::new(unit, None, Measurement),
        _ => {}
    }

    match unit.to_lowercase().as_str() {
        "bar" => UnitMapping::new("bar", Some(Pressure), Measurement),
        "kwh" | "kw/h" => UnitMapping::new("kWh", Some(Energy), TotalIncreasing),
        "w" => UnitMapping::new("W", Some(Power), Measurement),
        "kw" => UnitMapping::new("kW", Some(Power), Measurement),
        "l/min" | "l pro min" => UnitMapping::new("l/min", None, Measurement),
        "m³/h" => UnitMapping::new("m³/h", None, Measurement),
        "h" | "std" => UnitMapping::new("h", Some(Duration), TotalIncreasing),
        "min" => UnitMapping::new("min", Some(Duration), Measurement),
        "s" | "sek" | "sec" => UnitMapping::new("s", Some(Duration), Measurement),
        "d" | "days" => UnitMapping::new("d", Some(Duration), Measurement),
        _ => UnitMapping::new(unit, None, Measurement),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SensorDescription {
    pub key: String,
    pub name: String,
    pub unit: Option<String>,
    pub device_class: Option<DeviceClass>,
    pub state_class: Option<StateClass>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BinarySensorDescription {
    pub key: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SwitchDescription {
    pub key: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectDescription {
    pub key: String,
    pub name: String,
    pub options: Vec<String>,
    pub default_option: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClimateDescription {
    pub key: String,
    pub name: String,
    pub min_value: f64,
    pub max_value: f64,
    pub step: f64,
    pub temperature_unit: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NumberDescription {
    pub key: String,
    pub name: String,
    pub min_value: f64,
    pub max_value: f64,
    pub step: f64,
    pub unit: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
/// Typed entity descriptions for the adapters that project hub state.
pub struct EntityDescriptions {
    pub sensors: Vec<SensorDescription>,
    pub binary_sensors: Vec<BinarySensorDescription>,
    pub switches: Vec<SwitchDescription>,
    pub selects: Vec<SelectDescription>,
    pub climates: Vec<ClimateDescription>,
    pub numbers: Vec<NumberDescription>,
}

impl EntityDescriptions {
    pub fn len(&self) -> usize {
        self.sensors.len()
            + self.binary_sensors.len()
            + self.switches.len()
            + self.selects.len()
            + self.climates.len()
            + self.numbers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Build the descriptions of every exposed entity, in table order.
pub fn describe(table: &RegisterTable) -> EntityDescriptions {
    let mut descriptions = EntityDescriptions::default();

    for table_entry in table.iter() {
        let entry = &table_entry.entry;
        if table_entry.internal {
            continue;
        }
        let key = entry.key.clone();
        let name = entry.name.clone();

        match table_entry.kind {
            EntityKind::Sensor => {
                let mapping = unit_mapping(entry.unit.as_deref());
                descriptions.sensors.push(SensorDescription {
                    key,
                    name,
                    unit: mapping.unit,
                    device_class: mapping.device_class,
                    state_class: mapping.state_class,
                });
            }
            EntityKind::BinarySensor => {
                descriptions
                    .binary_sensors
                    .push(BinarySensorDescription { key, name });
            }
            EntityKind::Switch => descriptions.switches.push(SwitchDescription { key, name }),
            EntityKind::Select => {
                let (options, default_option) = match &entry.select {
                    Some(values) => (values.labels(), values.default_label().map(str::to_string)),
                    None => (Vec::new(), None),
                };
                debug!(%key, ?options, ?default_option, "select");
                descriptions.selects.push(SelectDescription {
                    key,
                    name,
                    options,
                    default_option,
                });
            }
            EntityKind::Climate => descriptions.climates.push(ClimateDescription {
                key,
                name,
                min_value: entry.min_or_default(),
                max_value: entry.max_or_default(),
                step: entry.step_or_default(),
                temperature_unit: entry.unit.clone().unwrap_or_else(|| "°C".to_string()),
            }),
            EntityKind::Number => descriptions.numbers.push(NumberDescription {
                key,
                name,
                min_value: entry.min_or_default(),
                max_value: entry.max_or_default(),
                step: entry.step_or_default(),
                unit: entry.unit.clone(),
            }),
        }
    }

    info!(
        sensors = descriptions.sensors.len(),
        binary_sensors = descriptions.binary_sensors.len(),
        switches = descriptions.switches.len(),
        selects = descriptions.selects.len(),
        climates = descriptions.climates.len(),
        numbers = descriptions.numbers.len(),
        "entities classified"
    );

    descriptions
}
