use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

use tracing::{debug, warn};

pub use tokio_modbus::{Address, Quantity};

use crate::classify::{self, CodecKind, EntityKind};
use crate::error::{Error, Result};

/// Bounds applied to entries that do not configure their own `min`/`max`.
pub const DEFAULT_BOUNDS: (f64, f64) = (0.0, 50.0);

/// Step reported for number and climate entities without an explicit step.
pub const DEFAULT_STEP: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RegisterClass {
    Coil,
    DiscreteInput,
    HoldingRegister,
    InputRegister,
}

impl RegisterClass {
    pub const ALL: [RegisterClass; 4] = [
        RegisterClass::InputRegister,
        RegisterClass::HoldingRegister,
        RegisterClass::Coil,
        RegisterClass::DiscreteInput,
    ];

    pub fn is_writable(&self) -> bool {
        matches!(self, RegisterClass::Coil | RegisterClass::HoldingRegister)
    }

    /// Coils and discrete inputs hold single bits instead of 16-bit words.
    pub fn is_bit(&self) -> bool {
        matches!(self, RegisterClass::Coil | RegisterClass::DiscreteInput)
    }

    /// Largest quantity a single Modbus read request may ask for.
    pub fn max_quantity(&self) -> Quantity {
        // https://en.wikipedia.org/wiki/Modbus#Function_codes_4_(read_input_registers)_and_3_(read_holding_registers)
        if self.is_bit() {
            2000
        } else {
            125
        }
    }
}

impl fmt::Display for RegisterClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RegisterClass::Coil => "coils",
            RegisterClass::DiscreteInput => "discrete inputs",
            RegisterClass::HoldingRegister => "holding registers",
            RegisterClass::InputRegister => "input registers",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataWidth {
    Bit,
    Int16,
    UInt16,
    Int32,
    UInt32,
}

impl DataWidth {
    pub fn word_size(&self) -> Quantity {
        match self {
            DataWidth::Bit => 1,
            DataWidth::Int16 => 1,
            DataWidth::UInt16 => 1,
            DataWidth::Int32 => 2,
            DataWidth::UInt32 => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Raw values of a boolean-like entity. Every value other than `off` reads as on, writing on
/// sends 1.
pub struct SwitchMap {
    pub off: i64,
    /// The device's on value as documented, not used by the codec.
    pub on: Option<i64>,
}

impl Default for SwitchMap {
    fn default() -> Self {
        Self { off: 0, on: None }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
/// Enumerated options of a select entity, keyed by raw index.
pub struct SelectValues {
    options: BTreeMap<i64, String>,
    default: Option<i64>,
}

impl SelectValues {
    pub fn new<'a>(
        options: impl IntoIterator<Item = (i64, &'a str)>,
        default: Option<i64>,
    ) -> Self {
        Self {
            options: options
                .into_iter()
                .map(|(index, label)| (index, label.to_string()))
                .collect(),
            default,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.options.is_empty()
    }

    pub fn label(&self, index: i64) -> Option<&str> {
        self.options.get(&index).map(String::as_str)
    }

    pub fn contains_index(&self, index: i64) -> bool {
        self.options.contains_key(&index)
    }

    /// Labels in index order.
    pub fn labels(&self) -> Vec<String> {
        self.options.values().cloned().collect()
    }

    pub fn indices(&self) -> Vec<i64> {
        self.options.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (i64, &str)> {
        self.options
            .iter()
            .map(|(index, label)| (*index, label.as_str()))
    }

    pub fn default_label(&self) -> Option<&str> {
        self.default.and_then(|index| self.label(index))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Explicit override of the widget kind inferred for a writable temperature entry.
pub enum PlatformHint {
    Climate,
    Number,
}

#[derive(Debug, Clone, PartialEq)]
/// Single entry of the register table, one per entity key.
pub struct RegisterEntry {
    pub key: String,
    pub name: String,
    pub class: RegisterClass,
    pub address: Address,
    pub width: DataWidth,
    pub factor: f64,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub step: Option<f64>,
    pub unit: Option<String>,
    pub switch: Option<SwitchMap>,
    pub select: Option<SelectValues>,
    pub hand_override: Option<String>,
    pub read_only: bool,
    pub platform: Option<PlatformHint>,
}

impl RegisterEntry {
    pub fn new(
        key: &str,
        name: &str,
        class: RegisterClass,
        address: Address,
        width: DataWidth,
    ) -> Self {
        Self {
            key: key.to_string(),
            name: name.to_string(),
            class,
            address,
            width,
            factor: 1.0,
            min: None,
            max: None,
            step: None,
            unit: None,
            switch: None,
            select: None,
            hand_override: None,
            read_only: false,
            platform: None,
        }
    }

    pub fn input(key: &str, name: &str, address: Address, width: DataWidth) -> Self {
        Self::new(key, name, RegisterClass::InputRegister, address, width)
    }

    pub fn holding(key: &str, name: &str, address: Address, width: DataWidth) -> Self {
        Self::new(key, name, RegisterClass::HoldingRegister, address, width)
    }

    pub fn coil(key: &str, name: &str, address: Address) -> Self {
        Self::new(key, name, RegisterClass::Coil, address, DataWidth::Bit)
    }

    pub fn discrete_input(key: &str, name: &str, address: Address) -> Self {
        Self::new(key, name, RegisterClass::DiscreteInput, address, DataWidth::Bit)
    }

    pub fn factor(mut self, factor: f64) -> Self {
        self.factor = factor;
        self
    }

    pub fn unit(mut self, unit: &str) -> Self {
        self.unit = Some(unit.to_string());
        self
    }

    pub fn bounds(mut self, min: f64, max: f64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }

    pub fn step(mut self, step: f64) -> Self {
        self.step = Some(step);
        self
    }

    pub fn switch(mut self, off: i64, on: Option<i64>) -> Self {
        self.switch = Some(SwitchMap { off, on });
        self
    }

    pub fn select<'a>(
        mut self,
        options: impl IntoIterator<Item = (i64, &'a str)>,
        default: Option<i64>,
    ) -> Self {
        self.select = Some(SelectValues::new(options, default));
        self
    }

    pub fn hand_override(mut self, key: &str) -> Self {
        self.hand_override = Some(key.to_string());
        self
    }

    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    pub fn platform(mut self, hint: PlatformHint) -> Self {
        self.platform = Some(hint);
        self
    }

    pub fn is_writable(&self) -> bool {
        self.class.is_writable() && !self.read_only
    }

    pub fn min_or_default(&self) -> f64 {
        self.min.unwrap_or(DEFAULT_BOUNDS.0)
    }

    pub fn max_or_default(&self) -> f64 {
        self.max.unwrap_or(DEFAULT_BOUNDS.1)
    }

    pub fn step_or_default(&self) -> f64 {
        self.step.unwrap_or(DEFAULT_STEP)
    }

    /// Inclusive range of addresses occupied by this entry, `None` if it runs past the
    /// address space.
    pub fn occupied(&self) -> Option<RegisterSpan> {
        let high = self.address.checked_add(self.width.word_size() - 1)?;
        Some(RegisterSpan {
            low: self.address,
            high,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Inclusive address span `[low, high]`.
pub struct RegisterSpan {
    pub low: Address,
    pub high: Address,
}

impl RegisterSpan {
    pub fn count(&self) -> Quantity {
        self.high - self.low + 1
    }

    fn cover(self, other: RegisterSpan) -> RegisterSpan {
        RegisterSpan {
            low: self.low.min(other.low),
            high: self.high.max(other.high),
        }
    }

    fn overlaps(&self, other: &RegisterSpan) -> bool {
        self.low <= other.high && other.low <= self.high
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
/// Minimal span per register class. An absent span means the class is not read at all.
pub struct RegisterSpans {
    pub coils: Option<RegisterSpan>,
    pub discrete_inputs: Option<RegisterSpan>,
    pub holding_registers: Option<RegisterSpan>,
    pub input_registers: Option<RegisterSpan>,
}

impl RegisterSpans {
    pub fn get(&self, class: RegisterClass) -> Option<RegisterSpan> {
        match class {
            RegisterClass::Coil => self.coils,
            RegisterClass::DiscreteInput => self.discrete_inputs,
            RegisterClass::HoldingRegister => self.holding_registers,
            RegisterClass::InputRegister => self.input_registers,
        }
    }

    fn slot(&mut self, class: RegisterClass) -> &mut Option<RegisterSpan> {
        match class {
            RegisterClass::Coil => &mut self.coils,
            RegisterClass::DiscreteInput => &mut self.discrete_inputs,
            RegisterClass::HoldingRegister => &mut self.holding_registers,
            RegisterClass::InputRegister => &mut self.input_registers,
        }
    }
}

/// Compute the minimal span covering every occupied word, per register class.
pub fn register_range<'a>(entries: impl IntoIterator<Item = &'a RegisterEntry>) -> RegisterSpans {
    let mut spans = RegisterSpans::default();
    for entry in entries {
        let Some(occupied) = entry.occupied() else {
            continue;
        };
        let slot = spans.slot(entry.class);
        *slot = Some(match *slot {
            Some(span) => span.cover(occupied),
            None => occupied,
        });
    }
    spans
}

#[derive(Debug, Clone, PartialEq)]
/// Register entry together with what was derived from it at load time.
pub struct TableEntry {
    pub entry: RegisterEntry,
    pub codec: CodecKind,
    pub kind: EntityKind,
    /// Referenced as another entry's hand-override companion, never exposed.
    pub internal: bool,
}

#[derive(Debug, Clone)]
/// Immutable register table, validated and classified once at start-up.
pub struct RegisterTable {
    entries: Vec<TableEntry>,
    index: HashMap<String, usize>,
    spans: RegisterSpans,
}

impl RegisterTable {
    pub fn new(entries: Vec<RegisterEntry>) -> Result<Self> {
        let mut index = HashMap::with_capacity(entries.len());
        for (i, entry) in entries.iter().enumerate() {
            if index.insert(entry.key.clone(), i).is_some() {
                return Err(Error::Configuration(format!(
                    "duplicate entity key `{}`",
                    entry.key
                )));
            }
        }

        let mut entries = entries;
        for entry in entries.iter_mut() {
            Self::check_width(entry)?;
            if entry.factor == 0.0 {
                warn!(
                    key = %entry.key,
                    "scale factor is zero, writes to this entity will be rejected"
                );
            }
        }
        Self::check_overlaps(&entries)?;

        let spans = register_range(&entries);
        for class in RegisterClass::ALL {
            if let Some(span) = spans.get(class) {
                if span.count() > class.max_quantity() {
                    return Err(Error::Configuration(format!(
                        "{class} span {}..={} exceeds {} per request",
                        span.low,
                        span.high,
                        class.max_quantity()
                    )));
                }
            }
        }

        let internal: HashSet<String> = entries
            .iter()
            .filter_map(|entry| entry.hand_override.clone())
            .collect();
        for key in &internal {
            if !index.contains_key(key) {
                warn!(
                    companion = %key,
                    "hand-override companion is not defined in the register table"
                );
            }
        }

        let entries = entries
            .into_iter()
            .map(|entry| {
                let codec = classify::codec_kind(&entry);
                let kind = classify::entity_kind(&entry, codec);
                let internal = internal.contains(&entry.key);
                TableEntry {
                    entry,
                    codec,
                    kind,
                    internal,
                }
            })
            .collect::<Vec<_>>();

        let table = Self {
            entries,
            index,
            spans,
        };
        table.log_summary();

        Ok(table)
    }

    pub fn get(&self, key: &str) -> Option<&TableEntry> {
        self.index.get(key).map(|&i| &self.entries[i])
    }

    /// Entries in table order.
    pub fn iter(&self) -> impl Iterator<Item = &TableEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn spans(&self) -> &RegisterSpans {
        &self.spans
    }

    fn check_width(entry: &mut RegisterEntry) -> Result<()> {
        if entry.class.is_bit() {
            entry.width = DataWidth::Bit;
        } else if entry.width == DataWidth::Bit {
            return Err(Error::Configuration(format!(
                "`{}` is a {} entry and cannot have bit width",
                entry.key, entry.class
            )));
        }
        if entry.occupied().is_none() {
            return Err(Error::Configuration(format!(
                "`{}` at address {} runs past the address space",
                entry.key, entry.address
            )));
        }
        Ok(())
    }

    fn check_overlaps(entries: &[RegisterEntry]) -> Result<()> {
        for class in RegisterClass::ALL {
            let mut occupied = entries
                .iter()
                .filter(|entry| entry.class == class)
                .filter_map(|entry| entry.occupied().map(|span| (span, &entry.key)))
                .collect::<Vec<_>>();
            occupied.sort_by_key(|(span, _)| span.low);

            for pair in occupied.windows(2) {
                let (first, first_key) = &pair[0];
                let (second, second_key) = &pair[1];
                if first.overlaps(second) {
                    return Err(Error::Configuration(format!(
                        "{class} of `{first_key}` and `{second_key}` overlap"
                    )));
                }
            }
        }
        Ok(())
    }

    fn log_summary(&self) {
        for class in RegisterClass::ALL {
            match self.spans.get(class) {
                Some(span) => debug!(%class, low = span.low, high = span.high, "register span"),
                None => debug!(%class, "no entries"),
            }
        }
        for entry in self.entries.iter().filter(|entry| entry.internal) {
            debug!(key = %entry.entry.key, "hand-override companion is used internally only");
        }
        debug!(entries = self.entries.len(), "register table loaded");
    }
}
