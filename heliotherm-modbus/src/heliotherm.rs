//! Register map of Heliotherm heat pumps with an RCG controller.
//!
//! Addresses follow the vendor's Modbus documentation for RCG firmware 1.0.5.4 and were
//! checked against a Heliotherm Complete RCG 2.0.0.10. Input registers 0..=9, 51..=59 and
//! 76..=99 are unused.

use crate::error::Result;
use crate::register::{DataWidth, PlatformHint, RegisterEntry, RegisterTable};

const OPERATING_MODES: [(i64, &str); 8] = [
    (0, "Aus"),
    (1, "Automatik"),
    (2, "Kühlen"),
    (3, "Sommer"),
    (4, "Dauerbetrieb"),
    (5, "Absenkbetrieb"),
    (6, "Urlaub"),
    (7, "Party"),
];

const COMPRESSOR_REQUESTS: [(i64, &str); 4] = [
    (0, "Keine Anforderung"),
    (10, "Kühlen"),
    (20, "Heizen"),
    (30, "Warmwasser"),
];

fn temperature(key: &str, name: &str, address: u16) -> RegisterEntry {
    RegisterEntry::input(key, name, address, DataWidth::Int16)
        .factor(0.1)
        .unit("°C")
}

fn state(key: &str, name: &str, address: u16) -> RegisterEntry {
    RegisterEntry::input(key, name, address, DataWidth::Int16).switch(0, None)
}

fn counter(key: &str, name: &str, address: u16, unit: &str) -> RegisterEntry {
    RegisterEntry::input(key, name, address, DataWidth::UInt32).unit(unit)
}

fn operating_mode(key: &str, name: &str, address: u16) -> RegisterEntry {
    RegisterEntry::holding(key, name, address, DataWidth::UInt16).select(OPERATING_MODES, Some(1))
}

/// Writable temperature shown as a plain number.
fn setpoint(key: &str, name: &str, address: u16, step: f64, min: f64, max: f64) -> RegisterEntry {
    RegisterEntry::holding(key, name, address, DataWidth::Int16)
        .factor(0.1)
        .unit("°C")
        .step(step)
        .bounds(min, max)
        .platform(PlatformHint::Number)
}

fn pv_offset(key: &str, name: &str, address: u16) -> RegisterEntry {
    RegisterEntry::holding(key, name, address, DataWidth::UInt16)
        .factor(0.1)
        .unit("K")
        .step(0.1)
        .bounds(0.0, 10.0)
        .platform(PlatformHint::Number)
}

fn toggle(key: &str, name: &str, address: u16) -> RegisterEntry {
    RegisterEntry::holding(key, name, address, DataWidth::UInt16).switch(0, Some(1))
}

/// Every entry of the built-in table, in register order.
pub fn entries() -> Vec<RegisterEntry> {
    vec![
        // input registers
        temperature("temp_aussen", "Temp. Aussen", 10),
        temperature("temp_brauchwasser", "Temp. Brauchwasser", 11),
        temperature("temp_vorlauf", "Temp. Vorlauf", 12),
        temperature("temp_ruecklauf", "Temp. Rücklauf", 13),
        temperature("temp_pufferspeicher", "Temp. Pufferspeicher", 14),
        temperature("temp_eq_eintritt", "Temp. EQ Eintritt", 15),
        temperature("temp_eq_austritt", "Temp. EQ Austritt", 16),
        temperature("temp_sauggas", "Temp. Sauggas", 17),
        temperature("temp_verdampfung", "Temp. Verdampfung", 18),
        temperature("temp_kondensation", "Temp. Kondensation", 19),
        temperature("temp_heissgas", "Temp. Heißgas", 20),
        RegisterEntry::input("niederdruck", "Niederdruck", 21, DataWidth::Int16)
            .factor(0.1)
            .unit("bar"),
        RegisterEntry::input("hochdruck", "Hochdruck", 22, DataWidth::Int16)
            .factor(0.1)
            .unit("bar"),
        state("heizkreispumpe", "Heizkreispumpe", 23),
        state("pufferladepumpe", "Pufferladepumpe", 24),
        state("verdichter", "Verdichter", 25),
        state("stoerung", "Störung", 26),
        state("vierwegenventil_abtaubetrieb", "Vierwegenventil Abtaubetrieb", 27),
        RegisterEntry::input("wmz_durchfluss", "WMZ Durchfluss", 28, DataWidth::Int16)
            .factor(0.1)
            .unit("l/min"),
        RegisterEntry::input("n_soll_verdichter", "n-Soll Verdichter", 29, DataWidth::Int16)
            .unit("‰"),
        RegisterEntry::input("cop", "COP", 30, DataWidth::Int16).factor(0.1),
        temperature("temp_frischwasser", "Temp. Frischwasser", 31),
        state("evu_sperre_aktiv", "EVU Sperre aktiv", 32),
        temperature("temp_aussen_verzoegert", "Temp. Aussen verzögert", 33),
        temperature("hkr_solltemp", "HKR Solltemp.", 34),
        temperature("mkr1_solltemp", "MKR1 Solltemp.", 35),
        temperature("mkr2_solltemp", "MKR2 Solltemp.", 36),
        state("eq_ventilator_pumpe", "EQ Ventilator/Pumpe", 37),
        state("ww_vorrang_ww", "WW Vorrang WW", 38),
        state("kuehlen_umv_passiv", "Kühlen UMV passiv", 39),
        RegisterEntry::input("expansionsventil", "Expansionsventil", 40, DataWidth::Int16)
            .factor(0.1)
            .unit("‰"),
        RegisterEntry::input("verdichteranforderung", "Verdichteranforderung", 41, DataWidth::Int16)
            .select(COMPRESSOR_REQUESTS, None),
        counter("betriebsstunden_im_ww_betrieb", "Betriebsstunden im WW-Betrieb", 42, "h"),
        counter("betriebsstunden_im_hzg_betrieb", "Betriebsstunden im HZG-Betrieb", 44, "h"),
        temperature("mkr1_vorlauftemperatur", "MKR1 Vorlauftemperatur", 46),
        temperature("mkr1_ruecklauftemperatur", "MKR1 Rücklauftemperatur", 47),
        temperature("mkr2_vorlauftemperatur", "MKR2 Vorlauftemperatur", 48),
        temperature("mkr2_ruecklauftemperatur", "MKR2 Rücklauftemperatur", 49),
        temperature("raumfuehler_1", "Raumfühler 1", 50),
        counter("wmz_heizung", "WMZ Heizung", 60, "kW/h"),
        counter("stromzaehler_heizung", "Stromzähler Heizung", 62, "kW/h"),
        counter("wmz_brauchwasser", "WMZ Brauchwasser", 64, "kW/h"),
        counter("stromzaehler_brauchwasser", "Stromzähler Brauchwasser", 66, "kW/h"),
        counter("stromzaehler_gesamt", "Stromzähler Gesamt", 68, "kW/h"),
        counter("stromzaehler_leistung", "Stromzähler Leistung", 70, "W"),
        counter("wmz_gesamt", "WMZ Gesamt", 72, "kW/h"),
        counter("wmz_leistung", "WMZ Leistung", 74, "kW").factor(0.1),
        // holding registers
        operating_mode("select_betriebsart", "Betriebsart", 100),
        setpoint("climate_raumsolltemperatur", "Raumsolltemperatur", 101, 0.5, 10.0, 25.0),
        setpoint("climate_ruecklaufsolltemperatur", "Rücklaufsolltemperatur", 102, 0.5, 5.0, 65.0)
            .hand_override("switch_ruecklaufsolltemperatur_hand_aktiv"),
        toggle(
            "switch_ruecklaufsolltemperatur_hand_aktiv",
            "Rücklaufsolltemperatur Hand-Aktiv",
            103,
        ),
        setpoint(
            "climate_min_ruecklauftemperatur_kuehlen",
            "min Rücklauftemperatur Kühlen",
            104,
            1.0,
            15.0,
            25.0,
        ),
        // 105 is the hot water target, 106 the frost protection limit
        setpoint("climate_ww_normaltemperatur", "WW Normaltemperatur", 105, 1.0, 5.0, 65.0),
        setpoint("climate_ww_minimaltemperatur", "WW Minimaltemperatur", 106, 1.0, 5.0, 65.0),
        operating_mode("select_mkr1_betriebsart", "MKR1 Betriebsart", 107),
        setpoint(
            "climate_mkr1_raumsolltemperatur",
            "MKR1 Raumsolltemperatur",
            108,
            0.5,
            10.0,
            25.0,
        ),
        setpoint("climate_mkr1_solltemperatur", "MKR1 Solltemperatur", 109, 0.5, 5.0, 65.0)
            .hand_override("switch_mkr1_solltemperatur_hand_aktiv"),
        toggle("switch_mkr1_solltemperatur_hand_aktiv", "MKR1 Solltemperatur Hand-Aktiv", 110),
        setpoint(
            "climate_mkr1_min_ruecklauftemperatur_kuehlen",
            "MKR1 min Rücklauftemperatur Kühlen",
            111,
            1.0,
            15.0,
            25.0,
        ),
        operating_mode("select_mkr2_betriebsart", "MKR2 Betriebsart", 112),
        setpoint(
            "climate_mkr2_raumsolltemperatur",
            "MKR2 Raumsolltemperatur",
            113,
            0.5,
            10.0,
            25.0,
        ),
        setpoint("climate_mkr2_solltemperatur", "MKR2 Solltemperatur", 114, 0.5, 5.0, 65.0)
            .hand_override("switch_mkr2_solltemperatur_hand_aktiv"),
        toggle("switch_mkr2_solltemperatur_hand_aktiv", "MKR2 Solltemperatur Hand-Aktiv", 115),
        setpoint(
            "climate_mkr2_min_ruecklauftemperatur_kuehlen",
            "MKR2 min Rücklauftemperatur Kühlen",
            116,
            1.0,
            15.0,
            25.0,
        ),
        toggle("switch_pv_anforderung", "PV Anforderung", 117),
        pv_offset("climate_pv_heizen_offset", "PV Heizen Offset", 118),
        pv_offset("climate_pv_kuehlen_offset", "PV Kühlen Offset", 119),
        pv_offset("climate_pv_heizen_offset_mkr1", "PV Heizen Offset MKR1", 120),
        pv_offset("climate_pv_kuehlen_offset_mkr1", "PV Kühlen Offset MKR1", 121),
        pv_offset("climate_pv_heizen_offset_mkr2", "PV Heizen Offset MKR2", 122),
        pv_offset("climate_pv_kuehlen_offset_mkr2", "PV Kühlen Offset MKR2", 123),
        RegisterEntry::holding("climate_ww_normal_max", "WW Normal Max", 124, DataWidth::UInt16)
            .factor(0.1)
            .unit("°C")
            .step(1.0)
            .bounds(5.0, 65.0)
            .platform(PlatformHint::Number),
        // the upper bound depends on the rated power of the heat pump
        RegisterEntry::holding(
            "input_vorgabe_leistungsaufnahme",
            "Vorgabe Leistungsaufnahme",
            125,
            DataWidth::UInt16,
        )
        .unit("W")
        .step(1.0)
        .bounds(0.0, 7000.0)
        .platform(PlatformHint::Number),
        // must never be written
        RegisterEntry::holding(
            "input_vorgabe_verdichterdrehzahl",
            "Vorgabe Verdichterdrehzahl",
            126,
            DataWidth::Int16,
        )
        .unit("‰")
        .step(1.0)
        .bounds(0.0, 1000.0)
        .platform(PlatformHint::Number)
        .read_only(),
        toggle("switch_ext_anforderung", "Ext. Anforderung", 127),
        toggle("switch_entstoeren", "Entstören", 128),
        setpoint(
            "climate_aussentemperatur_handwert",
            "Aussentemperatur Handwert",
            129,
            0.1,
            -49.9,
            60.0,
        )
        .hand_override("switch_aussentemperatur_hand_aktiv"),
        toggle("switch_aussentemperatur_hand_aktiv", "Aussentemperatur Hand-Aktiv", 130),
        setpoint(
            "climate_puffertemperatur_handwert",
            "Puffertemperatur Handwert",
            131,
            0.1,
            5.0,
            60.0,
        )
        .hand_override("switch_puffertemperatur_hand_aktiv"),
        toggle("switch_puffertemperatur_hand_aktiv", "Puffertemperatur Hand-Aktiv", 132),
        setpoint(
            "climate_brauchwassertemperatur_handwert",
            "Brauchwassertemperatur Handwert",
            133,
            0.1,
            5.0,
            60.0,
        )
        .hand_override("switch_brauchwassertemperatur_hand_aktiv"),
        toggle(
            "switch_brauchwassertemperatur_hand_aktiv",
            "Brauchwassertemperatur Hand-Aktiv",
            134,
        ),
        setpoint("climate_hkr_heizgrenze", "HKR Heizgrenze", 135, 1.0, 5.0, 30.0),
        setpoint(
            "climate_hkr_ruecklaufsoll_bei_heizgrenze",
            "HKR Rücklaufsoll bei Heizgrenze",
            136,
            0.1,
            15.0,
            35.0,
        ),
        setpoint(
            "climate_hkr_ruecklaufsoll_bei_0_c",
            "HKR Rücklaufsoll bei 0°C",
            137,
            0.1,
            15.0,
            35.0,
        ),
        setpoint(
            "climate_hkr_ruecklaufsoll_bei_15_c",
            "HKR Rücklaufsoll bei -15°C",
            138,
            0.1,
            15.0,
            35.0,
        ),
        setpoint("climate_mkr1_heizgrenze", "MKR1 Heizgrenze", 139, 1.0, 5.0, 30.0),
        setpoint(
            "climate_mkr1_ruecklaufsoll_bei_heizgrenze",
            "MKR1 Rücklaufsoll bei Heizgrenze",
            140,
            0.1,
            15.0,
            35.0,
        ),
        setpoint(
            "climate_mkr1_ruecklaufsoll_bei_0_c",
            "MKR1 Rücklaufsoll bei 0°C",
            141,
            0.1,
            15.0,
            35.0,
        ),
        setpoint(
            "climate_mkr1_ruecklaufsoll_bei_15_c",
            "MKR1 Rücklaufsoll bei -15°C",
            142,
            0.1,
            15.0,
            35.0,
        ),
        setpoint("climate_mkr2_heizgrenze", "MKR2 Heizgrenze", 143, 1.0, 5.0, 30.0),
        setpoint(
            "climate_mkr2_ruecklaufsoll_bei_heizgrenze",
            "MKR2 Rücklaufsoll bei Heizgrenze",
            144,
            0.1,
            15.0,
            35.0,
        ),
        setpoint(
            "climate_mkr2_ruecklaufsoll_bei_0_c",
            "MKR2 Rücklaufsoll bei 0°C",
            145,
            0.1,
            15.0,
            35.0,
        ),
        setpoint(
            "climate_mkr2_ruecklaufsoll_bei_15_c",
            "MKR2 Rücklaufsoll bei -15°C",
            146,
            0.1,
            15.0,
            35.0,
        ),
        RegisterEntry::holding(
            "switch_2_stufe_handwert",
            "2. Stufe Handwert",
            147,
            DataWidth::Int16,
        )
        .switch(0, Some(1))
        .hand_override("switch_2_stufe_hand_aktiv"),
        toggle("switch_2_stufe_hand_aktiv", "2. Stufe Hand-Aktiv", 148),
        RegisterEntry::holding(
            "switch_evu_sperre_handwert",
            "EVU Sperre Handwert",
            149,
            DataWidth::Int16,
        )
        .switch(0, Some(1))
        .hand_override("switch_evu_sperre_hand_aktiv"),
        toggle("switch_evu_sperre_hand_aktiv", "EVU Sperre Hand-Aktiv", 150),
        // room control unit TF22
        RegisterEntry::holding("input_tf22_handwert", "TF22 Handwert", 151, DataWidth::Int16)
            .step(1.0)
            .bounds(-80.0, 80.0)
            .platform(PlatformHint::Number)
            .hand_override("switch_tf22_hand_aktiv"),
        toggle("switch_tf22_hand_aktiv", "TF22 Hand-Aktiv", 152),
    ]
}

impl RegisterTable {
    /// The built-in Heliotherm register table.
    pub fn heliotherm() -> Result<Self> {
        RegisterTable::new(entries())
    }
}
