use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_modbus::Address;
use tracing::{debug, error, info, warn};

use crate::classify::{self, EntityDescriptions};
use crate::codec::{self, RawBlock, RawWrite, Value};
use crate::config::{self, GatewayConfig};
use crate::core::{self, Connect, TcpConnector, Transport};
use crate::error::{DecodeError, Error, Result, TransportError};
use crate::register::{RegisterClass, RegisterSpan, RegisterTable};

pub type SubscriptionId = u64;

type Callback = Arc<dyn Fn() + Send + Sync>;

/// Periodic polling task. It only stops between cycles.
struct Poller {
    handle: JoinHandle<()>,
    stop: Arc<Notify>,
}

/// Snapshot of decoded values keyed by entity key.
pub type Data = HashMap<String, Value>;

#[derive(Debug, Default)]
/// Outcome of a poll cycle whose bulk reads all succeeded.
pub struct CycleReport {
    pub updated: usize,
    /// Entities that kept their previous value, as [`Error::Decode`].
    pub decode_errors: Vec<Error>,
}

impl CycleReport {
    pub fn is_complete(&self) -> bool {
        self.decode_errors.is_empty()
    }
}

/// Run one call against the shared connection, opening it first if needed.
///
/// The transport lock is held for the duration of the call only. A connection fault drops
/// the connection so the next call reconnects.
macro_rules! locked {
    ($inner:expr, $transport:ident => $call:expr) => {{
        let mut slot = $inner.transport.lock().await;
        let mut $transport = match slot.take() {
            Some(transport) => transport,
            None => $inner.open().await?,
        };
        let result = $call.await;
        match &result {
            Err(err) if err.is_connection_fault() => {
                warn!(hub = %$inner.name, error = %err, "dropping connection");
                if let Err(err) = $transport.disconnect().await {
                    debug!(hub = %$inner.name, error = %err, "disconnect failed");
                }
            }
            _ => *slot = Some($transport),
        }
        result
    }};
}

struct HubInner {
    name: String,
    table: RegisterTable,
    descriptions: EntityDescriptions,
    scan_interval: Duration,
    connector: Box<dyn Connect>,
    transport: tokio::sync::Mutex<Option<Box<dyn Transport>>>,
    data: RwLock<Arc<Data>>,
    subscribers: Mutex<Vec<(SubscriptionId, Callback)>>,
    next_id: AtomicU64,
    poller: Mutex<Option<Poller>>,
}

impl HubInner {
    async fn open(&self) -> std::result::Result<Box<dyn Transport>, TransportError> {
        let transport = self.connector.connect().await.inspect_err(|err| {
            error!(hub = %self.name, error = %err, "connection failed");
        })?;
        info!(hub = %self.name, "connected");
        Ok(transport)
    }

    async fn read_block(
        &self,
        class: RegisterClass,
        span: RegisterSpan,
    ) -> std::result::Result<RawBlock, TransportError> {
        locked!(self, transport => core::read_span(transport.as_mut(), class, span))
    }

    async fn write_raw(
        &self,
        address: Address,
        raw: &RawWrite,
    ) -> std::result::Result<(), TransportError> {
        locked!(self, transport => core::write_raw(transport.as_mut(), address, raw))
    }

    async fn poll(&self) -> Result<CycleReport> {
        let mut blocks = HashMap::new();
        for class in RegisterClass::ALL {
            let Some(span) = self.table.spans().get(class) else {
                continue;
            };
            match self.read_block(class, span).await {
                Ok(block) => {
                    blocks.insert(class, (span.low, block));
                }
                Err(err) => {
                    error!(hub = %self.name, %class, error = %err, "poll cycle failed");
                    return Err(err.into());
                }
            }
        }

        let previous = Arc::clone(&self.data.read());
        let mut data = Data::clone(&previous);
        let mut report = CycleReport::default();
        for table_entry in self.table.iter() {
            let key = &table_entry.entry.key;
            let decoded = match blocks.get(&table_entry.entry.class) {
                Some((base, block)) => codec::decode_entity(table_entry, block, *base),
                None => Err(DecodeError::MissingBuffer),
            };
            match decoded {
                Ok(value) => {
                    data.insert(key.clone(), value);
                    report.updated += 1;
                }
                Err(source) => {
                    warn!(
                        hub = %self.name,
                        %key,
                        error = %source,
                        "decode failed, keeping previous value"
                    );
                    report.decode_errors.push(Error::Decode {
                        key: key.clone(),
                        source,
                    });
                }
            }
        }
        *self.data.write() = Arc::new(data);
        debug!(
            hub = %self.name,
            updated = report.updated,
            failed = report.decode_errors.len(),
            "poll cycle done"
        );

        self.notify();
        Ok(report)
    }

    fn notify(&self) {
        let subscribers = self
            .subscribers
            .lock()
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect::<Vec<_>>();
        for callback in subscribers {
            callback();
        }
    }

    /// Signal the poller and wait until a cycle already running has finished.
    async fn stop_polling(&self) {
        let poller = self.poller.lock().take();
        let Some(poller) = poller else {
            return;
        };
        poller.stop.notify_one();
        if let Err(err) = poller.handle.await {
            warn!(hub = %self.name, error = %err, "poller ended abnormally");
        }
        debug!(hub = %self.name, "polling stopped");
    }
}

impl Drop for HubInner {
    fn drop(&mut self) {
        if let Some(poller) = self.poller.get_mut().take() {
            poller.handle.abort();
        }
    }
}

#[derive(Clone)]
/// Owner of the connection to one heat pump and of the latest decoded values.
///
/// Polling runs while at least one subscriber is registered. Every transport call goes
/// through one lock so polls and writes never interleave on the wire, decoding happens
/// outside of it. Readers get the snapshot of the last completed cycle.
pub struct Hub {
    inner: Arc<HubInner>,
}

impl Hub {
    pub fn new(
        name: &str,
        table: RegisterTable,
        connector: impl Connect + 'static,
        scan_interval: Duration,
    ) -> Self {
        let descriptions = classify::describe(&table);
        let seconds = config::effective_scan_interval(scan_interval.as_secs());
        let scan_interval = Duration::from_secs(seconds);
        info!(hub = %name, ?scan_interval, entities = table.len(), "hub created");

        Self {
            inner: Arc::new(HubInner {
                name: name.to_string(),
                table,
                descriptions,
                scan_interval,
                connector: Box::new(connector),
                transport: tokio::sync::Mutex::new(None),
                data: RwLock::new(Arc::new(Data::new())),
                subscribers: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(1),
                poller: Mutex::new(None),
            }),
        }
    }

    /// Hub talking Modbus/TCP to the device described by `config`.
    pub fn from_config(config: &GatewayConfig, table: RegisterTable) -> Result<Self> {
        let connector = TcpConnector::from_config(config)?;
        Ok(Self::new(&config.name, table, connector, config.scan_interval()))
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn table(&self) -> &RegisterTable {
        &self.inner.table
    }

    pub fn descriptions(&self) -> &EntityDescriptions {
        &self.inner.descriptions
    }

    pub fn scan_interval(&self) -> Duration {
        self.inner.scan_interval
    }

    /// Values of the last completed cycle.
    pub fn data(&self) -> Arc<Data> {
        Arc::clone(&self.inner.data.read())
    }

    pub fn value(&self, key: &str) -> Option<Value> {
        self.inner.data.read().get(key).cloned()
    }

    pub fn is_polling(&self) -> bool {
        self.inner.poller.lock().is_some()
    }

    /// Open the connection now instead of on the first transport call.
    pub async fn connect(&self) -> Result<()> {
        let mut slot = self.inner.transport.lock().await;
        if slot.is_none() {
            *slot = Some(self.inner.open().await?);
        }
        Ok(())
    }

    pub async fn close(&self) -> Result<()> {
        let transport = self.inner.transport.lock().await.take();
        if let Some(mut transport) = transport {
            transport.disconnect().await?;
            info!(hub = %self.inner.name, "disconnected");
        }
        Ok(())
    }

    /// Run one poll cycle now, independent of the timer and of subscribers.
    ///
    /// A failed bulk read aborts the cycle with the data left untouched and nobody notified.
    pub async fn refresh(&self) -> Result<CycleReport> {
        self.inner.poll().await
    }

    /// Register `callback` to be called after every completed cycle, in registration order.
    /// The first subscriber starts polling.
    ///
    /// Must be called from within a tokio runtime.
    pub fn subscribe(&self, callback: impl Fn() + Send + Sync + 'static) -> SubscriptionId {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let first = {
            let mut subscribers = self.inner.subscribers.lock();
            subscribers.push((id, Arc::new(callback)));
            subscribers.len() == 1
        };
        debug!(hub = %self.inner.name, id, "subscribed");
        if first {
            self.start_polling();
        }
        id
    }

    /// Remove a subscription, `false` if it was not registered. The last one stops polling,
    /// waiting for a cycle already running to complete, and closes the connection.
    pub async fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let (removed, last) = {
            let mut subscribers = self.inner.subscribers.lock();
            let before = subscribers.len();
            subscribers.retain(|(subscription, _)| *subscription != id);
            (subscribers.len() != before, subscribers.is_empty())
        };
        if !removed {
            return false;
        }
        debug!(hub = %self.inner.name, id, "unsubscribed");

        if last {
            self.inner.stop_polling().await;
            if let Err(err) = self.close().await {
                warn!(hub = %self.inner.name, error = %err, "closing connection failed");
            }
        }
        true
    }

    fn start_polling(&self) {
        let inner = Arc::downgrade(&self.inner);
        let period = self.inner.scan_interval;
        let stop = Arc::new(Notify::new());
        let handle = tokio::spawn(poll_forever(inner, period, Arc::clone(&stop)));
        let previous = self.inner.poller.lock().replace(Poller { handle, stop });
        if let Some(previous) = previous {
            previous.stop.notify_one();
        }
        info!(hub = %self.inner.name, ?period, "polling started");
    }

    pub(crate) async fn write_raw(
        &self,
        address: Address,
        raw: &RawWrite,
    ) -> std::result::Result<(), TransportError> {
        self.inner.write_raw(address, raw).await
    }
}

async fn poll_forever(inner: Weak<HubInner>, period: Duration, stop: Arc<Notify>) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            biased;
            _ = stop.notified() => break,
            _ = interval.tick() => {}
        }
        let Some(inner) = inner.upgrade() else {
            break;
        };
        // failures are logged by the cycle itself, the next tick retries
        let _ = inner.poll().await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;

    use super::*;
    use crate::codec::{SelectValue, SwitchState};
    use crate::register::{DataWidth, RegisterEntry};
    use crate::simulator::{Failure, SimulatedDevice};
    use tokio::sync::mpsc;
    use tracing_test::traced_test;

    fn table() -> RegisterTable {
        RegisterTable::new(vec![
            RegisterEntry::input("temp_aussen", "Temp. Aussen", 10, DataWidth::Int16)
                .factor(0.1)
                .unit("°C"),
            RegisterEntry::input("verdichter", "Verdichter", 11, DataWidth::Int16).switch(0, None),
            RegisterEntry::input("stunden", "Stunden", 12, DataWidth::UInt32).unit("h"),
            RegisterEntry::holding("betriebsart", "Betriebsart", 100, DataWidth::UInt16)
                .select([(0, "Aus"), (1, "Automatik")], Some(1)),
            RegisterEntry::holding("raum_soll", "Raum Soll", 101, DataWidth::Int16)
                .factor(0.1)
                .unit("°C")
                .bounds(10.0, 25.0),
            RegisterEntry::coil("pumpe", "Pumpe", 0),
        ])
        .unwrap()
    }

    fn hub() -> (Hub, SimulatedDevice) {
        let table = table();
        let device = SimulatedDevice::from_table(&table);
        for (key, raw) in [
            ("temp_aussen", 215),
            ("verdichter", 1),
            ("stunden", 70000),
            ("betriebsart", 1),
            ("raum_soll", 205),
            ("pumpe", 1),
        ] {
            device.set(&table.get(key).unwrap().entry, raw);
        }
        let hub = Hub::new("test", table, device.clone(), Duration::from_secs(15));
        (hub, device)
    }

    fn set(hub: &Hub, device: &SimulatedDevice, key: &str, raw: i64) {
        device.set(&hub.table().get(key).unwrap().entry, raw);
    }

    fn notifier(hub: &Hub) -> (SubscriptionId, mpsc::UnboundedReceiver<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = hub.subscribe(move || {
            let _ = tx.send(());
        });
        (id, rx)
    }

    #[tokio::test]
    async fn test_refresh_decodes_every_entity() {
        let (hub, device) = hub();
        let report = hub.refresh().await.unwrap();
        assert_eq!(report.updated, 6);
        assert!(report.is_complete());

        assert_eq!(hub.value("temp_aussen"), Some(Value::Number(Some(21.5))));
        assert_eq!(hub.value("verdichter"), Some(Value::Switch(SwitchState::On)));
        assert_eq!(hub.value("stunden"), Some(Value::Number(Some(70000.0))));
        assert_eq!(
            hub.value("betriebsart"),
            Some(Value::Select(SelectValue::Option("Automatik".to_string())))
        );
        assert_eq!(hub.value("raum_soll").and_then(|value| value.as_f64()), Some(20.5));
        assert_eq!(hub.value("pumpe"), Some(Value::Switch(SwitchState::On)));

        assert_eq!(
            device.reads(),
            vec![
                RegisterClass::InputRegister,
                RegisterClass::HoldingRegister,
                RegisterClass::Coil,
            ]
        );
        assert_eq!(device.connects(), 1);
    }

    #[tokio::test]
    async fn test_scan_interval_floor() {
        let table = table();
        let device = SimulatedDevice::from_table(&table);
        let hub = Hub::new("test", table, device, Duration::from_secs(2));
        assert_eq!(hub.scan_interval(), Duration::from_secs(15));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_failed_read_leaves_data_unchanged() {
        let (hub, device) = hub();
        let (_id, mut rx) = notifier(&hub);
        rx.recv().await.unwrap();
        let before = hub.data();

        set(&hub, &device, "temp_aussen", 300);
        device.fail(RegisterClass::HoldingRegister, Failure::Disconnect);
        assert!(matches!(hub.refresh().await, Err(Error::Transport(_))));

        assert_eq!(*hub.data(), *before);
        assert!(rx.try_recv().is_err());
        assert!(logs_contain("poll cycle failed"));
    }

    #[tokio::test]
    async fn test_connection_fault_reconnects_lazily() {
        let (hub, device) = hub();
        hub.refresh().await.unwrap();

        device.fail(RegisterClass::InputRegister, Failure::Disconnect);
        assert!(hub.refresh().await.is_err());
        assert_eq!(device.disconnects(), 1);

        device.recover(RegisterClass::InputRegister);
        hub.refresh().await.unwrap();
        assert_eq!(device.connects(), 2);
    }

    #[tokio::test]
    async fn test_exception_keeps_connection() {
        let (hub, device) = hub();
        device.fail(RegisterClass::Coil, Failure::Exception);
        assert!(hub.refresh().await.is_err());

        device.recover(RegisterClass::Coil);
        hub.refresh().await.unwrap();
        assert_eq!(device.connects(), 1);
        assert_eq!(device.disconnects(), 0);
    }

    #[tokio::test]
    async fn test_refused_connection_fails_cycle() {
        let (hub, device) = hub();
        device.refuse_connect(true);
        assert!(hub.refresh().await.is_err());
        assert!(hub.data().is_empty());

        device.refuse_connect(false);
        hub.refresh().await.unwrap();
        assert_eq!(hub.data().len(), 6);
    }

    #[tokio::test]
    async fn test_short_read_fails_single_entity() {
        let (hub, device) = hub();
        hub.refresh().await.unwrap();

        set(&hub, &device, "temp_aussen", 100);
        set(&hub, &device, "stunden", 1);
        device.shorten(RegisterClass::InputRegister, 1);
        let report = hub.refresh().await.unwrap();

        assert_eq!(report.updated, 5);
        assert_eq!(report.decode_errors.len(), 1);
        assert!(matches!(
            &report.decode_errors[0],
            Error::Decode { key, source: DecodeError::OutOfBounds { .. } } if key == "stunden"
        ));
        assert_eq!(hub.value("temp_aussen"), Some(Value::Number(Some(10.0))));
        assert_eq!(hub.value("stunden"), Some(Value::Number(Some(70000.0))));
    }

    #[tokio::test]
    async fn test_subscribers_notified_in_registration_order() {
        let (hub, _device) = hub();
        let order = Arc::new(Mutex::new(Vec::new()));

        let first = Arc::clone(&order);
        hub.subscribe(move || first.lock().push(1));
        let second = Arc::clone(&order);
        let (tx, mut rx) = mpsc::unbounded_channel();
        hub.subscribe(move || {
            second.lock().push(2);
            let _ = tx.send(());
        });

        rx.recv().await.unwrap();
        assert_eq!(order.lock()[..2], [1, 2]);

        hub.refresh().await.unwrap();
        let order = order.lock().clone();
        assert_eq!(order.len() % 2, 0);
        assert!(order.chunks(2).all(|pair| pair == [1, 2]));
    }

    #[tokio::test]
    async fn test_unsubscribe_is_idempotent() {
        let (hub, device) = hub();
        assert!(!hub.is_polling());

        let (first, mut rx) = notifier(&hub);
        let (second, _rx) = notifier(&hub);
        assert!(hub.is_polling());
        rx.recv().await.unwrap();

        assert!(hub.unsubscribe(first).await);
        assert!(!hub.unsubscribe(first).await);
        assert!(hub.is_polling());

        assert!(hub.unsubscribe(second).await);
        assert!(!hub.is_polling());
        assert_eq!(device.disconnects(), 1);

        assert!(!hub.unsubscribe(second).await);
        assert_eq!(device.disconnects(), 1);
    }

    #[tokio::test]
    async fn test_last_unsubscribe_lets_running_cycle_finish() {
        let (hub, device) = hub();
        device.stall(RegisterClass::InputRegister);
        let (id, _rx) = notifier(&hub);
        while device.reads().is_empty() {
            tokio::task::yield_now().await;
        }

        let unsubscribing = tokio::spawn({
            let hub = hub.clone();
            async move { hub.unsubscribe(id).await }
        });
        tokio::task::yield_now().await;
        assert!(!unsubscribing.is_finished());
        assert!(!hub.is_polling());

        device.release(RegisterClass::InputRegister);
        assert!(unsubscribing.await.unwrap());

        assert_eq!(
            device.reads(),
            vec![
                RegisterClass::InputRegister,
                RegisterClass::HoldingRegister,
                RegisterClass::Coil,
            ]
        );
        assert_eq!(hub.value("temp_aussen"), Some(Value::Number(Some(21.5))));
        assert_eq!(device.disconnects(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_polls_on_every_tick_until_unsubscribed() {
        let (hub, device) = hub();
        let period = hub.scan_interval();
        let (id, mut rx) = notifier(&hub);
        rx.recv().await.unwrap();
        assert_eq!(device.reads().len(), 3);

        set(&hub, &device, "temp_aussen", -55);
        tokio::time::advance(period).await;
        rx.recv().await.unwrap();
        assert_eq!(device.reads().len(), 6);
        assert_eq!(hub.value("temp_aussen"), Some(Value::Number(Some(-5.5))));

        assert!(hub.unsubscribe(id).await);
        tokio::time::advance(period * 3).await;
        tokio::task::yield_now().await;
        assert_eq!(device.reads().len(), 6);
        assert_eq!(device.disconnects(), 1);
    }

    #[tokio::test]
    async fn test_subscribe_during_notification_joins_next_cycle() {
        let (hub, _device) = hub();
        let calls = Arc::new(Mutex::new(Vec::new()));
        let registered = Arc::new(AtomicBool::new(false));
        let (tx, mut rx) = mpsc::unbounded_channel();

        let first = Arc::clone(&calls);
        let nested = hub.clone();
        hub.subscribe(move || {
            first.lock().push("first");
            if !registered.swap(true, Ordering::SeqCst) {
                let late = Arc::clone(&first);
                nested.subscribe(move || late.lock().push("late"));
            }
            let _ = tx.send(());
        });

        rx.recv().await.unwrap();
        assert_eq!(*calls.lock(), ["first"]);

        hub.refresh().await.unwrap();
        assert_eq!(*calls.lock(), ["first", "first", "late"]);
    }

    #[tokio::test]
    async fn test_refresh_without_subscribers_notifies_nobody() {
        let (hub, _device) = hub();
        let (id, mut rx) = notifier(&hub);
        rx.recv().await.unwrap();
        hub.unsubscribe(id).await;

        hub.refresh().await.unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_connect_and_close() {
        let (hub, device) = hub();
        hub.connect().await.unwrap();
        hub.connect().await.unwrap();
        assert_eq!(device.connects(), 1);

        hub.close().await.unwrap();
        hub.close().await.unwrap();
        assert_eq!(device.disconnects(), 1);

        hub.refresh().await.unwrap();
        assert_eq!(device.connects(), 2);
    }
}
