use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio_modbus::{Address, Quantity};

use crate::codec::{encode_raw, RawWrite, Word};
use crate::core::{Connect, Transport};
use crate::error::TransportError;
use crate::register::{RegisterClass, RegisterEntry, RegisterTable};

#[derive(Debug, Clone, Default)]
/// Raw Modbus values of one register class.
pub struct Registers<T>(HashMap<Address, T>);

impl<T: Copy + Default> Registers<T> {
    /// Insert new consecutive values starting at `addr` address.
    pub fn insert(&mut self, addr: Address, values: &[T]) {
        for (offset, value) in (0..).zip(values) {
            self.0.insert(addr + offset, *value);
        }
    }

    /// Read `cnt` consecutive values starting at `addr`. Unmapped addresses read as default.
    pub fn read(&self, addr: Address, cnt: Quantity) -> Vec<T> {
        (0..cnt)
            .map(|i| self.0.get(&(addr + i)).copied().unwrap_or_default())
            .collect()
    }

    /// Write `values` into existing consecutive addresses starting at `addr`.
    pub fn write(&mut self, addr: Address, values: &[T]) -> Result<(), TransportError> {
        for (offset, _) in (0..).zip(values) {
            let reg_addr = addr + offset;
            if !self.0.contains_key(&reg_addr) {
                return Err(TransportError::Exception(format!(
                    "IllegalDataAddress {reg_addr}"
                )));
            }
        }
        self.insert(addr, values);
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
/// Modbus data store of the simulated device.
pub struct DataStore {
    pub coils: Registers<bool>,
    pub discrete_inputs: Registers<bool>,
    pub holding_registers: Registers<Word>,
    pub input_registers: Registers<Word>,
}

impl DataStore {
    /// Store with every address occupied by `table` set to zero.
    pub fn from_table(table: &RegisterTable) -> Self {
        let mut store = Self::default();
        for table_entry in table.iter() {
            store.set(&table_entry.entry, 0);
        }
        store
    }

    /// Store the raw value of `entry` the way the device would hold it.
    pub fn set(&mut self, entry: &RegisterEntry, raw: i64) {
        match (entry.class, encode_raw(raw, entry.width)) {
            (RegisterClass::Coil, raw) => self.coils.insert(entry.address, &[raw_bit(&raw)]),
            (RegisterClass::DiscreteInput, raw) => {
                self.discrete_inputs.insert(entry.address, &[raw_bit(&raw)])
            }
            (RegisterClass::HoldingRegister, raw) => {
                self.holding_registers.insert(entry.address, &raw.words())
            }
            (RegisterClass::InputRegister, raw) => {
                self.input_registers.insert(entry.address, &raw.words())
            }
        }
    }
}

fn raw_bit(raw: &RawWrite) -> bool {
    match raw {
        RawWrite::Coil(bit) => *bit,
        RawWrite::Words(words) => words.iter().any(|word| *word != 0),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteRecord {
    Coil(Address, bool),
    Register(Address, Word),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    /// The connection breaks, the hub has to reconnect.
    Disconnect,
    /// The device answers with an exception response.
    Exception,
}

#[derive(Debug, Default)]
struct DeviceState {
    store: DataStore,
    failures: HashMap<RegisterClass, Failure>,
    short_reads: HashMap<RegisterClass, usize>,
    stalls: HashMap<RegisterClass, Arc<Notify>>,
    refuse_connect: bool,
    writes: Vec<WriteRecord>,
    reads: Vec<RegisterClass>,
    connects: usize,
    disconnects: usize,
}

#[derive(Debug, Clone, Default)]
/// In-memory heat pump speaking the [`Transport`] interface, with failure injection.
pub struct SimulatedDevice(Arc<Mutex<DeviceState>>);

impl SimulatedDevice {
    pub fn new(store: DataStore) -> Self {
        Self(Arc::new(Mutex::new(DeviceState {
            store,
            ..DeviceState::default()
        })))
    }

    pub fn from_table(table: &RegisterTable) -> Self {
        Self::new(DataStore::from_table(table))
    }

    pub fn set(&self, entry: &RegisterEntry, raw: i64) {
        self.0.lock().store.set(entry, raw);
    }

    pub fn holding_registers(&self, addr: Address, cnt: Quantity) -> Vec<Word> {
        self.0.lock().store.holding_registers.read(addr, cnt)
    }

    pub fn coils(&self, addr: Address, cnt: Quantity) -> Vec<bool> {
        self.0.lock().store.coils.read(addr, cnt)
    }

    /// Make every read of `class` fail until [`SimulatedDevice::recover`].
    pub fn fail(&self, class: RegisterClass, failure: Failure) {
        self.0.lock().failures.insert(class, failure);
    }

    pub fn recover(&self, class: RegisterClass) {
        self.0.lock().failures.remove(&class);
    }

    /// Answer reads of `class` with `by` values less than requested.
    pub fn shorten(&self, class: RegisterClass, by: usize) {
        self.0.lock().short_reads.insert(class, by);
    }

    /// Hold every read of `class` after it arrived until [`SimulatedDevice::release`].
    pub fn stall(&self, class: RegisterClass) {
        self.0.lock().stalls.insert(class, Arc::new(Notify::new()));
    }

    pub fn release(&self, class: RegisterClass) {
        if let Some(stall) = self.0.lock().stalls.remove(&class) {
            stall.notify_one();
        }
    }

    pub fn refuse_connect(&self, refuse: bool) {
        self.0.lock().refuse_connect = refuse;
    }

    /// Every write in the order it arrived.
    pub fn writes(&self) -> Vec<WriteRecord> {
        self.0.lock().writes.clone()
    }

    /// Classes of every bulk read in the order it arrived.
    pub fn reads(&self) -> Vec<RegisterClass> {
        self.0.lock().reads.clone()
    }

    pub fn connects(&self) -> usize {
        self.0.lock().connects
    }

    pub fn disconnects(&self) -> usize {
        self.0.lock().disconnects
    }

    async fn read<T: Copy + Default + Send>(
        &self,
        class: RegisterClass,
        addr: Address,
        cnt: Quantity,
        registers: impl FnOnce(&DataStore) -> &Registers<T>,
    ) -> Result<Vec<T>, TransportError> {
        let stall = {
            let mut state = self.0.lock();
            state.reads.push(class);
            let stall = state.stalls.get(&class).cloned();
            stall
        };
        if let Some(stall) = stall {
            stall.notified().await;
        }

        let state = self.0.lock();
        match state.failures.get(&class) {
            Some(Failure::Disconnect) => {
                return Err(TransportError::Io(std::io::Error::new(
                    std::io::ErrorKind::ConnectionReset,
                    format!("simulated failure reading {class}"),
                )))
            }
            Some(Failure::Exception) => {
                return Err(TransportError::Exception("ServerDeviceFailure".to_string()))
            }
            None => {}
        }
        let mut values = registers(&state.store).read(addr, cnt);
        if let Some(by) = state.short_reads.get(&class) {
            values.truncate(values.len().saturating_sub(*by));
        }
        Ok(values)
    }
}

#[async_trait]
impl Connect for SimulatedDevice {
    async fn connect(&self) -> Result<Box<dyn Transport>, TransportError> {
        let mut state = self.0.lock();
        if state.refuse_connect {
            return Err(TransportError::Connect {
                addr: "simulator".to_string(),
                source: std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused"),
            });
        }
        state.connects += 1;
        Ok(Box::new(self.clone()))
    }
}

#[async_trait]
impl Transport for SimulatedDevice {
    async fn read_coils(
        &mut self,
        addr: Address,
        cnt: Quantity,
    ) -> Result<Vec<bool>, TransportError> {
        self.read(RegisterClass::Coil, addr, cnt, |store| &store.coils).await
    }

    async fn read_discrete_inputs(
        &mut self,
        addr: Address,
        cnt: Quantity,
    ) -> Result<Vec<bool>, TransportError> {
        self.read(RegisterClass::DiscreteInput, addr, cnt, |store| {
            &store.discrete_inputs
        })
        .await
    }

    async fn read_holding_registers(
        &mut self,
        addr: Address,
        cnt: Quantity,
    ) -> Result<Vec<Word>, TransportError> {
        self.read(RegisterClass::HoldingRegister, addr, cnt, |store| {
            &store.holding_registers
        })
        .await
    }

    async fn read_input_registers(
        &mut self,
        addr: Address,
        cnt: Quantity,
    ) -> Result<Vec<Word>, TransportError> {
        self.read(RegisterClass::InputRegister, addr, cnt, |store| {
            &store.input_registers
        })
        .await
    }

    async fn write_single_coil(
        &mut self,
        addr: Address,
        value: bool,
    ) -> Result<(), TransportError> {
        let mut state = self.0.lock();
        state.store.coils.write(addr, &[value])?;
        state.writes.push(WriteRecord::Coil(addr, value));
        Ok(())
    }

    async fn write_single_register(
        &mut self,
        addr: Address,
        word: Word,
    ) -> Result<(), TransportError> {
        let mut state = self.0.lock();
        state.store.holding_registers.write(addr, &[word])?;
        state.writes.push(WriteRecord::Register(addr, word));
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        self.0.lock().disconnects += 1;
        Ok(())
    }
}
