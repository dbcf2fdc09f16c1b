use tracing::{info, warn};

use crate::codec::{self, RawWrite, Word, WriteValue};
use crate::error::{Error, Result};
use crate::hub::Hub;
use crate::register::{DataWidth, RegisterClass};

#[derive(Debug)]
/// Outcome of a write whose register writes all went through.
pub struct WriteReceipt {
    pub key: String,
    /// Raw words sent for the entity, coils as 0 or 1.
    pub words: Vec<Word>,
    /// Hand-override companion that was set to 1 after the entity itself.
    pub override_written: Option<String>,
    /// Failure of the re-poll that followed the write.
    pub refresh: Option<Error>,
}

impl WriteReceipt {
    pub fn is_refreshed(&self) -> bool {
        self.refresh.is_none()
    }
}

impl Hub {
    /// Encode and write `value` to the entity `key`, then re-poll.
    ///
    /// Unknown or read-only entities and values the entity cannot encode fail before any
    /// transport I/O. A failing hand-override write fails the whole call even though the
    /// entity itself was already written. A failing re-poll does not fail the write, it is
    /// reported in [`WriteReceipt::refresh`].
    pub async fn write(&self, key: &str, value: impl Into<WriteValue>) -> Result<WriteReceipt> {
        let value = value.into();
        let entry = self
            .table()
            .get(key)
            .ok_or_else(|| Error::UnknownEntity(key.to_string()))?;
        if !entry.entry.is_writable() {
            return Err(Error::ReadOnly(key.to_string()));
        }

        let raw = codec::encode_entity(entry, &value).map_err(|source| Error::Validation {
            key: key.to_string(),
            source,
        })?;
        let words = raw.words();
        info!(hub = %self.name(), %key, ?value, ?words, "writing");
        self.write_raw(entry.entry.address, &raw).await?;

        let override_written = match &entry.entry.hand_override {
            Some(companion) => {
                self.write_hand_override(key, companion).await?;
                Some(companion.clone())
            }
            None => None,
        };

        let refresh = match self.refresh().await {
            Ok(_) => None,
            Err(err) => {
                warn!(hub = %self.name(), %key, error = %err, "re-poll after write failed");
                Some(err)
            }
        };

        Ok(WriteReceipt {
            key: key.to_string(),
            words,
            override_written,
            refresh,
        })
    }

    async fn write_hand_override(&self, key: &str, companion: &str) -> Result<()> {
        let target = self.table().get(companion).ok_or_else(|| {
            Error::Configuration(format!(
                "hand-override companion `{companion}` of `{key}` is not defined"
            ))
        })?;
        let target = &target.entry;
        if target.class != RegisterClass::HoldingRegister || target.width != DataWidth::UInt16 {
            return Err(Error::Configuration(format!(
                "hand-override companion `{companion}` of `{key}` must be a UInt16 holding register"
            )));
        }

        info!(hub = %self.name(), %key, %companion, "activating hand override");
        self.write_raw(target.address, &RawWrite::Words(vec![1])).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::codec::{SelectValue, SwitchState, Value};
    use crate::error::ValidationError;
    use crate::register::{RegisterEntry, RegisterTable};
    use crate::simulator::{Failure, SimulatedDevice, WriteRecord};

    fn table() -> RegisterTable {
        RegisterTable::new(vec![
            RegisterEntry::input("temp_aussen", "Temp. Aussen", 10, DataWidth::Int16)
                .factor(0.1)
                .unit("°C"),
            RegisterEntry::holding("betriebsart", "Betriebsart", 100, DataWidth::UInt16)
                .select([(0, "Aus"), (1, "Automatik"), (2, "Kühlen")], Some(1)),
            RegisterEntry::holding(
                "ruecklauf_soll",
                "Rücklaufsolltemperatur",
                102,
                DataWidth::Int16,
            )
            .factor(0.1)
            .unit("°C")
            .bounds(5.0, 65.0)
            .hand_override("ruecklauf_hand_aktiv"),
            RegisterEntry::holding("ruecklauf_hand_aktiv", "Hand-Aktiv", 103, DataWidth::UInt16)
                .switch(0, Some(1)),
            RegisterEntry::holding(
                "verdichterdrehzahl",
                "Verdichterdrehzahl",
                104,
                DataWidth::Int16,
            )
            .bounds(0.0, 1000.0)
            .read_only(),
            RegisterEntry::holding("leistung", "Leistung", 105, DataWidth::Int16)
                .bounds(-10.0, 10.0),
            RegisterEntry::holding("zaehler", "Zähler", 106, DataWidth::UInt32)
                .bounds(0.0, 100_000.0),
            RegisterEntry::holding("ohne_partner", "Ohne Partner", 108, DataWidth::Int16)
                .hand_override("fehlt"),
            RegisterEntry::holding("falscher_partner", "Falscher Partner", 109, DataWidth::Int16)
                .hand_override("partner_int16"),
            RegisterEntry::holding("partner_int16", "Partner", 110, DataWidth::Int16)
                .switch(0, Some(1)),
            RegisterEntry::coil("pumpe", "Pumpe", 0),
        ])
        .unwrap()
    }

    fn hub() -> (Hub, SimulatedDevice) {
        let table = table();
        let device = SimulatedDevice::from_table(&table);
        let hub = Hub::new("test", table, device.clone(), Duration::from_secs(15));
        (hub, device)
    }

    #[tokio::test]
    async fn test_select_write_is_visible_after_re_poll() {
        let (hub, device) = hub();
        let receipt = hub.write("betriebsart", "kühlen").await.unwrap();

        assert_eq!(receipt.words, vec![2]);
        assert!(receipt.override_written.is_none());
        assert!(receipt.is_refreshed());
        assert_eq!(device.writes(), vec![WriteRecord::Register(100, 2)]);
        assert_eq!(
            hub.value("betriebsart"),
            Some(Value::Select(SelectValue::Option("Kühlen".to_string())))
        );
    }

    #[tokio::test]
    async fn test_hand_override_written_after_entity_and_polled_once() {
        let (hub, device) = hub();
        let receipt = hub.write("ruecklauf_soll", 30.5).await.unwrap();

        assert_eq!(receipt.words, vec![305]);
        assert_eq!(receipt.override_written.as_deref(), Some("ruecklauf_hand_aktiv"));
        assert_eq!(
            device.writes(),
            vec![WriteRecord::Register(102, 305), WriteRecord::Register(103, 1)]
        );
        assert_eq!(
            device.reads(),
            vec![
                RegisterClass::InputRegister,
                RegisterClass::HoldingRegister,
                RegisterClass::Coil,
            ]
        );
        assert_eq!(hub.value("ruecklauf_hand_aktiv"), Some(Value::Switch(SwitchState::On)));
    }

    #[tokio::test]
    async fn test_unknown_and_read_only_fail_before_io() {
        let (hub, device) = hub();
        assert!(matches!(
            hub.write("gibt_es_nicht", 1).await,
            Err(Error::UnknownEntity(key)) if key == "gibt_es_nicht"
        ));
        assert!(matches!(
            hub.write("verdichterdrehzahl", 500).await,
            Err(Error::ReadOnly(_))
        ));
        assert!(matches!(
            hub.write("temp_aussen", 20.0).await,
            Err(Error::ReadOnly(_))
        ));
        assert!(device.writes().is_empty());
        assert!(device.reads().is_empty());
        assert_eq!(device.connects(), 0);
    }

    #[tokio::test]
    async fn test_invalid_value_fails_before_io() {
        let (hub, device) = hub();
        assert!(matches!(
            hub.write("ruecklauf_soll", 70.0).await,
            Err(Error::Validation {
                source: ValidationError::OutOfRange { .. },
                ..
            })
        ));
        assert!(matches!(
            hub.write("betriebsart", "Turbo").await,
            Err(Error::Validation {
                source: ValidationError::UnknownOption { .. },
                ..
            })
        ));
        assert!(device.writes().is_empty());
        assert_eq!(device.connects(), 0);
    }

    #[tokio::test]
    async fn test_negative_value_is_sent_masked() {
        let (hub, device) = hub();
        let receipt = hub.write("leistung", -1).await.unwrap();
        assert_eq!(receipt.words, vec![65535]);
        assert_eq!(device.writes(), vec![WriteRecord::Register(105, 65535)]);
        assert_eq!(hub.value("leistung"), Some(Value::Number(Some(-1.0))));
    }

    #[tokio::test]
    async fn test_wide_value_writes_two_registers() {
        let (hub, device) = hub();
        hub.write("zaehler", 70000).await.unwrap();
        assert_eq!(
            device.writes(),
            vec![WriteRecord::Register(106, 1), WriteRecord::Register(107, 4464)]
        );
        assert_eq!(hub.value("zaehler"), Some(Value::Number(Some(70000.0))));
    }

    #[tokio::test]
    async fn test_coil_write() {
        let (hub, device) = hub();
        let receipt = hub.write("pumpe", "on").await.unwrap();
        assert_eq!(receipt.words, vec![1]);
        assert_eq!(device.writes(), vec![WriteRecord::Coil(0, true)]);
        assert_eq!(device.coils(0, 1), vec![true]);
        assert_eq!(hub.value("pumpe"), Some(Value::Switch(SwitchState::On)));

        hub.write("pumpe", false).await.unwrap();
        assert_eq!(hub.value("pumpe"), Some(Value::Switch(SwitchState::Off)));
    }

    #[tokio::test]
    async fn test_missing_companion_fails_after_primary_write() {
        let (hub, device) = hub();
        assert!(matches!(
            hub.write("ohne_partner", 5).await,
            Err(Error::Configuration(_))
        ));
        assert!(matches!(
            hub.write("falscher_partner", 5).await,
            Err(Error::Configuration(_))
        ));
        assert_eq!(
            device.writes(),
            vec![WriteRecord::Register(108, 5), WriteRecord::Register(109, 5)]
        );
        assert!(device.reads().is_empty());
    }

    #[tokio::test]
    async fn test_failed_re_poll_is_reported_separately() {
        let (hub, device) = hub();
        device.fail(RegisterClass::InputRegister, Failure::Exception);

        let receipt = hub.write("betriebsart", 0).await.unwrap();
        assert!(matches!(receipt.refresh, Some(Error::Transport(_))));
        assert_eq!(device.holding_registers(100, 1), vec![0]);
        assert!(hub.data().is_empty());
    }

    #[tokio::test]
    async fn test_failed_write_is_transport_error() {
        let device = SimulatedDevice::from_table(&table());
        let table = RegisterTable::new(vec![RegisterEntry::holding(
            "nicht_im_geraet",
            "Nicht im Gerät",
            200,
            DataWidth::UInt16,
        )
        .bounds(0.0, 10.0)])
        .unwrap();
        let hub = Hub::new("other", table, device.clone(), Duration::from_secs(15));

        assert!(matches!(
            hub.write("nicht_im_geraet", 1).await,
            Err(Error::Transport(_))
        ));
        assert!(device.writes().is_empty());
    }
}
