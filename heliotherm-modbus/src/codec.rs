//! Conversions between raw Modbus words and typed entity values.
//!
//! The lower half packs integers into big-endian [`Word`] sequences, the upper half
//! turns raw integers into [`Value`]s and [`WriteValue`]s back into raw integers,
//! one codec per [`CodecKind`].

use std::fmt;

use tokio_modbus::Address;

use crate::classify::CodecKind;
use crate::error::{DecodeError, ValidationError};
use crate::register::{DataWidth, RegisterEntry, SelectValues, SwitchMap, TableEntry};

/// 16-bit value stored in Modbus register.
pub type Word = u16;

/// Raw reading the device reports for a sensor without a valid value.
pub const INVALID_READING: i64 = -500;

/// Labels that encode a switch as off, compared after trimming and lowercasing.
pub const OFF_WORDS: [&str; 6] = ["off", "aus", "false", "0", "nein", "no"];

#[derive(Debug)]
pub struct WordsCountError {}

/// Decode a value from big-endian ordered `Word`s.
pub trait Decode: Sized {
    fn from_be_words(words: &[Word]) -> Result<Self, WordsCountError>;
}

macro_rules! impl_decode {
    ($num_type:ty) => {
        impl Decode for $num_type {
            fn from_be_words(words: &[Word]) -> Result<Self, WordsCountError> {
                let bytes = words
                    .iter()
                    .copied()
                    .flat_map(u16::to_be_bytes)
                    .collect::<Vec<u8>>();
                let array = bytes.try_into().or(Err(WordsCountError {}))?;
                Ok(<$num_type>::from_be_bytes(array))
            }
        }
    };
}

impl_decode!(i16);
impl_decode!(i32);
impl_decode!(u16);
impl_decode!(u32);

/// Encode a value into big-endian ordered `Word`s, most significant word first.
pub trait Encode {
    fn to_be_words(self) -> Vec<Word>;
}

macro_rules! impl_encode {
    ($num_type:ty) => {
        impl Encode for $num_type {
            fn to_be_words(self) -> Vec<Word> {
                self.to_be_bytes()
                    .chunks_exact(2)
                    .map(|chunk| u16::from_be_bytes([chunk[0], chunk[1]]))
                    .collect()
            }
        }
    };
}

impl_encode!(i16);
impl_encode!(i32);
impl_encode!(u16);
impl_encode!(u32);

#[derive(Debug, Clone, PartialEq, Eq)]
/// Result of one bulk read, bits for coils and discrete inputs, words for registers.
pub enum RawBlock {
    Bits(Vec<bool>),
    Words(Vec<Word>),
}

impl RawBlock {
    pub fn len(&self) -> usize {
        match self {
            RawBlock::Bits(bits) => bits.len(),
            RawBlock::Words(words) => words.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read the raw integer of `width` starting at `offset` into the block.
    pub fn raw_at(&self, offset: usize, width: DataWidth) -> Result<i64, DecodeError> {
        let size = usize::from(width.word_size());
        let len = self.len();
        if offset + size > len {
            return Err(DecodeError::OutOfBounds {
                offset,
                width: size,
                len,
            });
        }

        match (self, width) {
            (RawBlock::Bits(bits), DataWidth::Bit) => Ok(i64::from(bits[offset])),
            (RawBlock::Words(words), width) => {
                let words = &words[offset..offset + size];
                let out_of_bounds = |_| DecodeError::OutOfBounds {
                    offset,
                    width: size,
                    len,
                };
                match width {
                    DataWidth::Int16 => i16::from_be_words(words)
                        .map(i64::from)
                        .map_err(out_of_bounds),
                    DataWidth::UInt16 => u16::from_be_words(words)
                        .map(i64::from)
                        .map_err(out_of_bounds),
                    DataWidth::Int32 => i32::from_be_words(words)
                        .map(i64::from)
                        .map_err(out_of_bounds),
                    DataWidth::UInt32 => u32::from_be_words(words)
                        .map(i64::from)
                        .map_err(out_of_bounds),
                    DataWidth::Bit => Err(DecodeError::WrongBuffer),
                }
            }
            (RawBlock::Bits(_), _) => Err(DecodeError::WrongBuffer),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// What the write pipeline sends for one entity.
pub enum RawWrite {
    Coil(bool),
    Words(Vec<Word>),
}

impl RawWrite {
    /// Words for logging and receipts, coils report as 0 or 1.
    pub fn words(&self) -> Vec<Word> {
        match self {
            RawWrite::Coil(bit) => vec![Word::from(*bit)],
            RawWrite::Words(words) => words.clone(),
        }
    }
}

/// Pack a raw integer for `width`. Every word is masked to 16 bits.
pub fn encode_raw(raw: i64, width: DataWidth) -> RawWrite {
    match width {
        DataWidth::Bit => RawWrite::Coil(raw != 0),
        DataWidth::Int16 | DataWidth::UInt16 => RawWrite::Words(vec![(raw & 0xFFFF) as Word]),
        DataWidth::Int32 | DataWidth::UInt32 => {
            RawWrite::Words(((raw & 0xFFFF_FFFF) as u32).to_be_words())
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchState {
    On,
    Off,
}

impl SwitchState {
    pub fn is_on(&self) -> bool {
        matches!(self, SwitchState::On)
    }
}

impl fmt::Display for SwitchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SwitchState::On => f.write_str("on"),
            SwitchState::Off => f.write_str("off"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectValue {
    Option(String),
    /// The device reported an index the entry does not enumerate.
    Invalid(i64),
}

impl SelectValue {
    pub fn label(&self) -> Option<&str> {
        match self {
            SelectValue::Option(label) => Some(label.as_str()),
            SelectValue::Invalid(_) => None,
        }
    }
}

impl fmt::Display for SelectValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectValue::Option(label) => f.write_str(label),
            SelectValue::Invalid(raw) => write!(f, "invalid value: {raw}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
/// Live value of a setpoint together with its configured bounds.
pub struct ClimateValue {
    pub temperature: Option<f64>,
    pub target_temp_low: f64,
    pub target_temp_high: f64,
}

#[derive(Debug, Clone, PartialEq)]
/// Decoded entity value as stored in the hub snapshot.
pub enum Value {
    Switch(SwitchState),
    Select(SelectValue),
    Number(Option<f64>),
    Climate(ClimateValue),
}

impl Value {
    /// Numeric reading of number and climate entities.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(value) => *value,
            Value::Climate(climate) => climate.temperature,
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Switch(state) => state.fmt(f),
            Value::Select(select) => select.fmt(f),
            Value::Number(Some(value)) => write!(f, "{value}"),
            Value::Number(None) => f.write_str("unavailable"),
            Value::Climate(climate) => match climate.temperature {
                Some(value) => write!(
                    f,
                    "{value} [{}, {}]",
                    climate.target_temp_low, climate.target_temp_high
                ),
                None => write!(
                    f,
                    "unavailable [{}, {}]",
                    climate.target_temp_low, climate.target_temp_high
                ),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
/// Value of a write request before it is encoded for its entity.
pub enum WriteValue {
    Bool(bool),
    Text(String),
    Number(f64),
    Climate {
        temperature: Option<f64>,
        target_temp_low: Option<f64>,
        target_temp_high: Option<f64>,
    },
}

impl WriteValue {
    pub fn temperature(value: f64) -> Self {
        WriteValue::Climate {
            temperature: Some(value),
            target_temp_low: None,
            target_temp_high: None,
        }
    }

    fn describe(&self) -> String {
        match self {
            WriteValue::Bool(value) => value.to_string(),
            WriteValue::Text(value) => format!("{value:?}"),
            WriteValue::Number(value) => value.to_string(),
            WriteValue::Climate { temperature, .. } => format!("climate({temperature:?})"),
        }
    }
}

impl From<bool> for WriteValue {
    fn from(value: bool) -> Self {
        WriteValue::Bool(value)
    }
}

impl From<&str> for WriteValue {
    fn from(value: &str) -> Self {
        WriteValue::Text(value.to_string())
    }
}

impl From<String> for WriteValue {
    fn from(value: String) -> Self {
        WriteValue::Text(value)
    }
}

impl From<f64> for WriteValue {
    fn from(value: f64) -> Self {
        WriteValue::Number(value)
    }
}

impl From<i32> for WriteValue {
    fn from(value: i32) -> Self {
        WriteValue::Number(f64::from(value))
    }
}

impl From<ClimateValue> for WriteValue {
    fn from(value: ClimateValue) -> Self {
        WriteValue::Climate {
            temperature: value.temperature,
            target_temp_low: Some(value.target_temp_low),
            target_temp_high: Some(value.target_temp_high),
        }
    }
}

pub fn decode_switch(raw: i64, map: Option<&SwitchMap>) -> SwitchState {
    let off = map.map_or(0, |map| map.off);
    if raw == off {
        SwitchState::Off
    } else {
        SwitchState::On
    }
}

/// Off writes the map's `off` value, on always writes 1.
pub fn encode_switch(
    value: &WriteValue,
    map: Option<&SwitchMap>,
) -> Result<i64, ValidationError> {
    let off = map.map_or(0, |map| map.off);
    let on = match value {
        WriteValue::Bool(value) => *value,
        WriteValue::Text(text) => !OFF_WORDS.contains(&text.trim().to_lowercase().as_str()),
        WriteValue::Number(number) => *number != 0.0,
        WriteValue::Climate { .. } => {
            return Err(ValidationError::Malformed {
                expected: "bool, text or number",
                found: value.describe(),
            })
        }
    };
    Ok(if on { 1 } else { off })
}

pub fn decode_numeric(raw: i64, factor: f64) -> Option<f64> {
    if raw == INVALID_READING {
        None
    } else {
        Some(raw as f64 * factor)
    }
}

/// Scale a physical value to its raw integer, rounding to nearest.
pub fn encode_numeric(value: f64, entry: &RegisterEntry) -> Result<i64, ValidationError> {
    if !value.is_finite() {
        return Err(ValidationError::Malformed {
            expected: "finite number",
            found: value.to_string(),
        });
    }
    let (min, max) = (entry.min_or_default(), entry.max_or_default());
    if value < min || value > max {
        return Err(ValidationError::OutOfRange { value, min, max });
    }
    if entry.factor == 0.0 {
        return Err(ValidationError::ZeroFactor);
    }
    Ok((value / entry.factor).round() as i64)
}

fn number_of(value: &WriteValue) -> Result<f64, ValidationError> {
    let malformed = || ValidationError::Malformed {
        expected: "number",
        found: value.describe(),
    };
    match value {
        WriteValue::Number(number) => Ok(*number),
        WriteValue::Text(text) => text.trim().parse::<f64>().map_err(|_| malformed()),
        WriteValue::Climate {
            temperature: Some(temperature),
            ..
        } => Ok(*temperature),
        WriteValue::Climate {
            temperature: None, ..
        }
        | WriteValue::Bool(_) => Err(malformed()),
    }
}

pub fn decode_select(raw: i64, values: &SelectValues) -> SelectValue {
    match values.label(raw) {
        Some(label) => SelectValue::Option(label.to_string()),
        None => SelectValue::Invalid(raw),
    }
}

/// Accept a label, exact match first then case-insensitive, or an enumerated index.
pub fn encode_select(value: &WriteValue, values: &SelectValues) -> Result<i64, ValidationError> {
    match value {
        WriteValue::Text(label) => {
            if let Some((index, _)) = values.iter().find(|(_, option)| *option == label.as_str()) {
                return Ok(index);
            }
            let lower = label.to_lowercase();
            values
                .iter()
                .find(|(_, option)| option.to_lowercase() == lower)
                .map(|(index, _)| index)
                .ok_or_else(|| ValidationError::UnknownOption {
                    option: label.clone(),
                    allowed: values.labels(),
                })
        }
        WriteValue::Number(number) => {
            let index = *number as i64;
            if index as f64 != *number || !values.contains_index(index) {
                return Err(ValidationError::UnknownIndex {
                    index,
                    allowed: values.indices(),
                });
            }
            Ok(index)
        }
        _ => Err(ValidationError::Malformed {
            expected: "option label or index",
            found: value.describe(),
        }),
    }
}

pub fn decode_climate(raw: i64, entry: &RegisterEntry) -> ClimateValue {
    ClimateValue {
        temperature: decode_numeric(raw, entry.factor),
        target_temp_low: entry.min_or_default(),
        target_temp_high: entry.max_or_default(),
    }
}

/// Decode one entity from the bulk read of its class, `base` being the first address read.
pub fn decode_entity(
    entry: &TableEntry,
    block: &RawBlock,
    base: Address,
) -> Result<Value, DecodeError> {
    let register = &entry.entry;
    let offset = usize::from(register.address.checked_sub(base).ok_or(
        DecodeError::OutOfBounds {
            offset: 0,
            width: usize::from(register.width.word_size()),
            len: block.len(),
        },
    )?);
    let raw = block.raw_at(offset, register.width)?;

    Ok(match entry.codec {
        CodecKind::Switch => Value::Switch(decode_switch(raw, register.switch.as_ref())),
        CodecKind::Select => match &register.select {
            Some(values) => Value::Select(decode_select(raw, values)),
            None => Value::Select(SelectValue::Invalid(raw)),
        },
        CodecKind::Numeric => Value::Number(decode_numeric(raw, register.factor)),
        CodecKind::Climate => Value::Climate(decode_climate(raw, register)),
    })
}

/// Encode a write request for `entry` into what goes on the wire.
pub fn encode_entity(entry: &TableEntry, value: &WriteValue) -> Result<RawWrite, ValidationError> {
    let register = &entry.entry;
    let raw = match entry.codec {
        CodecKind::Switch => encode_switch(value, register.switch.as_ref())?,
        CodecKind::Select => {
            let values = register.select.clone().unwrap_or_default();
            encode_select(value, &values)?
        }
        CodecKind::Numeric | CodecKind::Climate => encode_numeric(number_of(value)?, register)?,
    };
    Ok(encode_raw(raw, register.width))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::register::RegisterTable;

    fn table() -> RegisterTable {
        RegisterTable::new(vec![
            RegisterEntry::input("temp_aussen", "Temp. Aussen", 10, DataWidth::Int16)
                .factor(0.1)
                .unit("°C"),
            RegisterEntry::input("energie", "Energie", 60, DataWidth::UInt32).unit("kWh"),
            RegisterEntry::holding("modus", "Modus", 100, DataWidth::UInt16)
                .select([(0, "Off"), (1, "On"), (2, "Auto")], Some(1)),
            RegisterEntry::holding("kuehlen", "Kühlen", 101, DataWidth::UInt16)
                .select([(0, "Heizen"), (1, "Kühlen")], None),
            RegisterEntry::holding("raum_soll", "Raum Soll", 102, DataWidth::Int16)
                .factor(0.1)
                .unit("°C")
                .bounds(10.0, 25.0),
            RegisterEntry::holding("offset", "Offset", 103, DataWidth::Int16)
                .factor(0.1)
                .bounds(-5.0, 5.0),
            RegisterEntry::holding("pv", "PV", 104, DataWidth::UInt16).switch(0, Some(1)),
            RegisterEntry::holding("zaehler", "Zähler", 110, DataWidth::UInt32)
                .bounds(0.0, 100_000.0),
            RegisterEntry::holding("leistung", "Leistung", 112, DataWidth::Int16)
                .bounds(-10.0, 10.0),
            RegisterEntry::holding("kaputt", "Kaputt", 113, DataWidth::Int16)
                .factor(0.0)
                .bounds(0.0, 10.0),
            RegisterEntry::coil("pumpe", "Pumpe", 0),
        ])
        .unwrap()
    }

    fn entry<'a>(table: &'a RegisterTable, key: &str) -> &'a TableEntry {
        table.get(key).unwrap()
    }

    #[test]
    fn test_word_round_trip() {
        assert_eq!(70000u32.to_be_words(), vec![1, 4464]);
        assert_eq!(u32::from_be_words(&[1, 4464]).unwrap(), 70000);
        assert_eq!((-2i32).to_be_words(), vec![0xFFFF, 0xFFFE]);
        assert!(u32::from_be_words(&[1]).is_err());
    }

    #[test]
    fn test_encode_raw_masks_words() {
        assert_eq!(encode_raw(-1, DataWidth::Int16), RawWrite::Words(vec![65535]));
        assert_eq!(encode_raw(70000, DataWidth::UInt32), RawWrite::Words(vec![1, 4464]));
        assert_eq!(encode_raw(-1, DataWidth::Int32), RawWrite::Words(vec![65535, 65535]));
        assert_eq!(encode_raw(1, DataWidth::Bit), RawWrite::Coil(true));
        assert_eq!(RawWrite::Coil(false).words(), vec![0]);
    }

    #[test]
    fn test_scaled_temperature_decode() {
        let table = table();
        let block = RawBlock::Words(vec![215]);
        let value = decode_entity(entry(&table, "temp_aussen"), &block, 10).unwrap();
        assert_eq!(value, Value::Number(Some(21.5)));
    }

    #[test]
    fn test_negative_reading_decodes_signed() {
        let table = table();
        let block = RawBlock::Words(vec![(-73i16) as u16]);
        let value = decode_entity(entry(&table, "temp_aussen"), &block, 10).unwrap();
        let reading = value.as_f64().unwrap();
        assert!((reading + 7.3).abs() < 1e-9);
    }

    #[test]
    fn test_invalid_reading_is_no_value() {
        assert_eq!(decode_numeric(-500, 0.1), None);
        assert_eq!(decode_numeric(-500, 1.0), None);
        assert_eq!(decode_numeric(-499, 1.0), Some(-499.0));

        let table = table();
        let block = RawBlock::Words(vec![(-500i16) as u16]);
        let value = decode_entity(entry(&table, "temp_aussen"), &block, 10).unwrap();
        assert_eq!(value, Value::Number(None));
    }

    #[test]
    fn test_wide_value_decode() {
        let table = table();
        let block = RawBlock::Words(vec![1, 4464]);
        let value = decode_entity(entry(&table, "energie"), &block, 60).unwrap();
        assert_eq!(value, Value::Number(Some(70000.0)));

        let raw = encode_entity(entry(&table, "zaehler"), &70000.into()).unwrap();
        let RawWrite::Words(words) = raw else {
            panic!("expected words");
        };
        assert_eq!(u32::from_be_words(&words).unwrap(), 70000);
    }

    #[test]
    fn test_out_of_bounds_slice() {
        let table = table();
        let block = RawBlock::Words(vec![1]);
        assert_eq!(
            decode_entity(entry(&table, "energie"), &block, 60),
            Err(DecodeError::OutOfBounds {
                offset: 0,
                width: 2,
                len: 1
            })
        );
        assert!(decode_entity(entry(&table, "temp_aussen"), &block, 11).is_err());
    }

    #[test]
    fn test_wrong_buffer_kind() {
        let table = table();
        let bits = RawBlock::Bits(vec![true]);
        assert_eq!(
            decode_entity(entry(&table, "temp_aussen"), &bits, 10),
            Err(DecodeError::WrongBuffer)
        );
        let value = decode_entity(entry(&table, "pumpe"), &bits, 0).unwrap();
        assert_eq!(value, Value::Switch(SwitchState::On));
    }

    #[test]
    fn test_switch_decode() {
        let map = SwitchMap { off: 0, on: None };
        assert_eq!(decode_switch(0, Some(&map)), SwitchState::Off);
        assert_eq!(decode_switch(1, Some(&map)), SwitchState::On);
        assert_eq!(decode_switch(7, Some(&map)), SwitchState::On);

        let inverted = SwitchMap { off: 1, on: Some(0) };
        assert_eq!(decode_switch(1, Some(&inverted)), SwitchState::Off);
        assert_eq!(decode_switch(0, None), SwitchState::Off);
        assert_eq!(SwitchState::On.to_string(), "on");
    }

    #[test]
    fn test_switch_encode_is_tolerant() {
        let map = SwitchMap { off: 0, on: Some(1) };
        let off: [WriteValue; 7] = [
            "OFF".into(),
            "Aus".into(),
            " nein ".into(),
            "no".into(),
            "false".into(),
            false.into(),
            0.into(),
        ];
        for value in off {
            assert_eq!(encode_switch(&value, Some(&map)), Ok(0), "{value:?}");
        }

        let on: [WriteValue; 4] = ["on".into(), "ja".into(), true.into(), 2.into()];
        for value in on {
            assert_eq!(encode_switch(&value, Some(&map)), Ok(1), "{value:?}");
        }

        assert!(encode_switch(&WriteValue::temperature(1.0), Some(&map)).is_err());
    }

    #[test]
    fn test_switch_encode_writes_one_for_on() {
        let map = SwitchMap { off: 2, on: Some(5) };
        assert_eq!(encode_switch(&false.into(), Some(&map)), Ok(2));
        assert_eq!(encode_switch(&true.into(), Some(&map)), Ok(1));
        assert_eq!(encode_switch(&"an".into(), Some(&map)), Ok(1));
        assert_eq!(encode_switch(&true.into(), None), Ok(1));
        assert_eq!(encode_switch(&"aus".into(), None), Ok(0));
    }

    #[test]
    fn test_select_codec() {
        let table = table();
        let modus = entry(&table, "modus");

        assert_eq!(encode_entity(modus, &"auto".into()), Ok(RawWrite::Words(vec![2])));
        assert_eq!(encode_entity(modus, &"Auto".into()), Ok(RawWrite::Words(vec![2])));
        assert_eq!(encode_entity(modus, &1.into()), Ok(RawWrite::Words(vec![1])));

        let block = RawBlock::Words(vec![5]);
        let value = decode_entity(modus, &block, 100).unwrap();
        assert_eq!(value, Value::Select(SelectValue::Invalid(5)));
        assert_eq!(value.to_string(), "invalid value: 5");

        let block = RawBlock::Words(vec![2]);
        let value = decode_entity(modus, &block, 100).unwrap();
        assert_eq!(value, Value::Select(SelectValue::Option("Auto".to_string())));
    }

    #[test]
    fn test_select_label_is_case_insensitive() {
        let table = table();
        assert_eq!(
            encode_entity(entry(&table, "kuehlen"), &"kühlen".into()),
            Ok(RawWrite::Words(vec![1]))
        );
    }

    #[test]
    fn test_select_rejects_unknown_values() {
        let table = table();
        let modus = entry(&table, "modus");

        let err = encode_entity(modus, &"Turbo".into()).unwrap_err();
        assert_eq!(
            err,
            ValidationError::UnknownOption {
                option: "Turbo".to_string(),
                allowed: vec!["Off".to_string(), "On".to_string(), "Auto".to_string()],
            }
        );
        assert!(err.to_string().contains("Auto"));

        assert!(matches!(
            encode_entity(modus, &7.into()),
            Err(ValidationError::UnknownIndex { index: 7, .. })
        ));
        assert!(encode_entity(modus, &1.5.into()).is_err());
        assert!(encode_entity(modus, &true.into()).is_err());
    }

    #[test]
    fn test_numeric_bounds() {
        let table = table();
        let raum = entry(&table, "raum_soll");

        assert_eq!(encode_entity(raum, &10.0.into()), Ok(RawWrite::Words(vec![100])));
        assert_eq!(encode_entity(raum, &25.0.into()), Ok(RawWrite::Words(vec![250])));
        assert!(matches!(
            encode_entity(raum, &9.9.into()),
            Err(ValidationError::OutOfRange { .. })
        ));
        assert!(matches!(
            encode_entity(raum, &25.1.into()),
            Err(ValidationError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_numeric_rounds_to_nearest() {
        let table = table();
        let raum = entry(&table, "raum_soll");
        assert_eq!(encode_entity(raum, &21.46.into()), Ok(RawWrite::Words(vec![215])));
        assert_eq!(encode_entity(raum, &21.44.into()), Ok(RawWrite::Words(vec![214])));
    }

    #[test]
    fn test_numeric_round_trip_within_factor() {
        let table = table();
        let offset = entry(&table, "offset");
        let mut value = -5.0;
        while value <= 5.0 {
            let RawWrite::Words(words) = encode_entity(offset, &value.into()).unwrap() else {
                panic!("expected words");
            };
            let decoded = decode_entity(offset, &RawBlock::Words(words), 103)
                .unwrap()
                .as_f64()
                .unwrap();
            assert!((decoded - value).abs() <= 0.1, "{value} -> {decoded}");
            value += 0.37;
        }
    }

    #[test]
    fn test_negative_value_is_masked() {
        let table = table();
        assert_eq!(
            encode_entity(entry(&table, "leistung"), &(-1.0).into()),
            Ok(RawWrite::Words(vec![65535]))
        );
    }

    #[test]
    fn test_zero_factor_is_rejected() {
        let table = table();
        assert_eq!(
            encode_entity(entry(&table, "kaputt"), &1.0.into()),
            Err(ValidationError::ZeroFactor)
        );
    }

    #[test]
    fn test_numeric_accepts_text_and_rejects_bool() {
        let table = table();
        let raum = entry(&table, "raum_soll");
        assert_eq!(encode_entity(raum, &" 20.5 ".into()), Ok(RawWrite::Words(vec![205])));
        assert!(matches!(
            encode_entity(raum, &"warm".into()),
            Err(ValidationError::Malformed { .. })
        ));
        assert!(matches!(
            encode_entity(raum, &true.into()),
            Err(ValidationError::Malformed { .. })
        ));
        assert!(encode_entity(raum, &f64::NAN.into()).is_err());
    }

    #[test]
    fn test_climate_codec() {
        let table = table();
        let raum = entry(&table, "raum_soll");
        assert_eq!(raum.codec, CodecKind::Climate);

        let value = decode_entity(raum, &RawBlock::Words(vec![205]), 102).unwrap();
        assert_eq!(
            value,
            Value::Climate(ClimateValue {
                temperature: Some(20.5),
                target_temp_low: 10.0,
                target_temp_high: 25.0,
            })
        );

        assert_eq!(
            encode_entity(raum, &WriteValue::temperature(21.0)),
            Ok(RawWrite::Words(vec![210]))
        );
        let missing = WriteValue::Climate {
            temperature: None,
            target_temp_low: Some(10.0),
            target_temp_high: None,
        };
        assert!(encode_entity(raum, &missing).is_err());
    }
}
