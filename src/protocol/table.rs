//! Device-specific constants: indicator bit positions, key codes and which
//! key toggles which indicator.
//!
//! Firmware revisions of the controller have shuffled these values around, so
//! they live in a [`ControllerTable`] rather than in the decoding logic.

use strum_macros::{AsRefStr, Display, EnumIter, EnumString};


/// States reported by the controller.
///
/// Most correspond to an LED on the keypad. [`State::HeaterAutoMode`] and
/// [`State::FilterLowSpeed`] are synthetic.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, EnumIter, EnumString, Display, AsRefStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum State {
    #[strum(to_string = "HEATER_1")]
    Heater1,
    #[strum(to_string = "VALVE_3")]
    Valve3,
    CheckSystem,
    Pool,
    Spa,
    Filter,
    Lights,
    #[strum(to_string = "AUX_1")]
    Aux1,
    #[strum(to_string = "AUX_2")]
    Aux2,
    Service,
    #[strum(to_string = "AUX_3")]
    Aux3,
    #[strum(to_string = "AUX_4")]
    Aux4,
    #[strum(to_string = "AUX_5")]
    Aux5,
    #[strum(to_string = "AUX_6")]
    Aux6,
    #[strum(to_string = "VALVE_4")]
    Valve4,
    Spillover,
    SystemOff,
    #[strum(to_string = "AUX_7")]
    Aux7,
    #[strum(to_string = "AUX_8")]
    Aux8,
    #[strum(to_string = "AUX_9")]
    Aux9,
    #[strum(to_string = "AUX_10")]
    Aux10,
    #[strum(to_string = "AUX_11")]
    Aux11,
    #[strum(to_string = "AUX_12")]
    Aux12,
    #[strum(to_string = "AUX_13")]
    Aux13,
    #[strum(to_string = "AUX_14")]
    Aux14,
    SuperChlorinate,
    HeaterAutoMode,
    FilterLowSpeed,
}

/// Keys which can be sent to the controller.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, EnumIter, EnumString, Display, AsRefStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum Key {
    Right,
    Menu,
    Left,
    Service,
    Minus,
    Plus,
    PoolSpa,
    Filter,
    Lights,
    #[strum(to_string = "AUX_1")]
    Aux1,
    #[strum(to_string = "AUX_2")]
    Aux2,
    #[strum(to_string = "AUX_3")]
    Aux3,
    #[strum(to_string = "AUX_4")]
    Aux4,
    #[strum(to_string = "AUX_5")]
    Aux5,
    #[strum(to_string = "AUX_6")]
    Aux6,
    #[strum(to_string = "AUX_7")]
    Aux7,
    #[strum(to_string = "VALVE_3")]
    Valve3,
    #[strum(to_string = "VALVE_4")]
    Valve4,
    #[strum(to_string = "HEATER_1")]
    Heater1,
    #[strum(to_string = "AUX_8")]
    Aux8,
    #[strum(to_string = "AUX_9")]
    Aux9,
    #[strum(to_string = "AUX_10")]
    Aux10,
    #[strum(to_string = "AUX_11")]
    Aux11,
    #[strum(to_string = "AUX_12")]
    Aux12,
    #[strum(to_string = "AUX_13")]
    Aux13,
    #[strum(to_string = "AUX_14")]
    Aux14,
}

/// Where the value of a [`State`] comes from.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Indicator {
    /// Bit position in the LED bitmask frame
    Led(u8),

    /// The given LED bit is flashing (e.g. FILTER flashing means low speed)
    Flashing(u8),

    /// Tracked from the `Heater1` display line
    HeaterAutoMode,
}

/// A key press which toggles a state.
#[derive(Copy, Clone, Debug)]
pub struct Toggle {
    pub state: State,
    pub key: Key,

    /// An additional state that must end up with the given value
    pub also: Option<(State, bool)>,

    /// Only permitted once a multi-speed pump has been seen on the bus
    pub requires_multi_speed_pump: bool,
}

impl Toggle {
    const fn key(state: State, key: Key) -> Self {
        Self { state, key, also: None, requires_multi_speed_pump: false }
    }
}

#[derive(Debug)]
pub struct ControllerTable {
    pub name: &'static str,
    pub indicators: &'static [(State, Indicator)],
    pub keys: &'static [(Key, u32)],
    pub toggles: &'static [Toggle],
}

impl ControllerTable {
    pub fn indicator(&self, state: State) -> Option<Indicator> {
        self.indicators.iter()
            .find(|(s, _)| *s == state)
            .map(|(_, indicator)| *indicator)
    }

    pub fn key_code(&self, key: Key) -> Option<u32> {
        self.keys.iter()
            .find(|(k, _)| *k == key)
            .map(|(_, code)| *code)
    }

    /// Reverse lookup of a key code seen in a key event frame.
    pub fn key_for_code(&self, code: u32) -> Option<Key> {
        self.keys.iter()
            .find(|(_, c)| *c == code)
            .map(|(key, _)| *key)
    }

    pub fn toggle(&self, state: State) -> Option<&Toggle> {
        self.toggles.iter().find(|t| t.state == state)
    }

    /// Bit mask of an LED indicator, if `state` is backed by one.
    pub fn led_mask(&self, state: State) -> Option<u32> {
        match self.indicator(state)? {
            Indicator::Led(bit) => Some(1 << bit),
            _ => None
        }
    }
}


/// AquaLogic/ProLogic with the PS-8/PS-16 keypad layout.
pub static AQUALOGIC: ControllerTable = ControllerTable {
    name: "AquaLogic",
    indicators: &[
        (State::Heater1, Indicator::Led(0)),
        (State::Valve3, Indicator::Led(1)),
        (State::CheckSystem, Indicator::Led(2)),
        (State::Pool, Indicator::Led(3)),
        (State::Spa, Indicator::Led(4)),
        (State::Filter, Indicator::Led(5)),
        (State::Lights, Indicator::Led(6)),
        (State::Aux1, Indicator::Led(7)),
        (State::Aux2, Indicator::Led(8)),
        (State::Service, Indicator::Led(9)),
        (State::Aux3, Indicator::Led(10)),
        (State::Aux4, Indicator::Led(11)),
        (State::Aux5, Indicator::Led(12)),
        (State::Aux6, Indicator::Led(13)),
        (State::Valve4, Indicator::Led(14)),
        (State::Spillover, Indicator::Led(15)),
        (State::SystemOff, Indicator::Led(16)),
        (State::Aux7, Indicator::Led(17)),
        (State::Aux8, Indicator::Led(18)),
        (State::Aux9, Indicator::Led(19)),
        (State::Aux10, Indicator::Led(20)),
        (State::Aux11, Indicator::Led(21)),
        (State::Aux12, Indicator::Led(22)),
        (State::Aux13, Indicator::Led(23)),
        (State::Aux14, Indicator::Led(24)),
        (State::SuperChlorinate, Indicator::Led(25)),
        (State::HeaterAutoMode, Indicator::HeaterAutoMode),
        (State::FilterLowSpeed, Indicator::Flashing(5)),
    ],
    // second word of a key event is the same on first down, 0000 every 100ms while holding
    keys: &[
        (Key::Right, 0x0001),
        (Key::Menu, 0x0002),
        (Key::Left, 0x0004),
        (Key::Service, 0x0008),
        (Key::Minus, 0x0010),
        (Key::Plus, 0x0020),
        (Key::PoolSpa, 0x0040),
        (Key::Filter, 0x0080),
        (Key::Lights, 0x0100),
        (Key::Aux1, 0x0200),
        (Key::Aux2, 0x0400),
        (Key::Aux3, 0x0800),
        (Key::Aux4, 0x1000),
        (Key::Aux5, 0x2000),
        (Key::Aux6, 0x4000),
        (Key::Aux7, 0x8000),
        // wireless key events only
        (Key::Valve3, 0x0001_0000),
        (Key::Valve4, 0x0002_0000),
        (Key::Heater1, 0x0004_0000),
        (Key::Aux8, 0x0008_0000),
        (Key::Aux9, 0x0010_0000),
        (Key::Aux10, 0x0020_0000),
        (Key::Aux11, 0x0040_0000),
        (Key::Aux12, 0x0080_0000),
        (Key::Aux13, 0x0100_0000),
        (Key::Aux14, 0x0200_0000),
    ],
    toggles: &[
        Toggle::key(State::Heater1, Key::Heater1),
        Toggle::key(State::Valve3, Key::Valve3),
        Toggle::key(State::Valve4, Key::Valve4),
        Toggle::key(State::Service, Key::Service),
        Toggle::key(State::Filter, Key::Filter),
        Toggle::key(State::Lights, Key::Lights),
        Toggle::key(State::Aux1, Key::Aux1),
        Toggle::key(State::Aux2, Key::Aux2),
        Toggle::key(State::Aux3, Key::Aux3),
        Toggle::key(State::Aux4, Key::Aux4),
        Toggle::key(State::Aux5, Key::Aux5),
        Toggle::key(State::Aux6, Key::Aux6),
        Toggle::key(State::Aux7, Key::Aux7),
        Toggle::key(State::Aux8, Key::Aux8),
        Toggle::key(State::Aux9, Key::Aux9),
        Toggle::key(State::Aux10, Key::Aux10),
        Toggle::key(State::Aux11, Key::Aux11),
        Toggle::key(State::Aux12, Key::Aux12),
        Toggle::key(State::Aux13, Key::Aux13),
        Toggle::key(State::Aux14, Key::Aux14),
        // POOL_SPA cycles pool -> spa -> spillover; retries walk it to the wanted one
        Toggle::key(State::Pool, Key::PoolSpa),
        Toggle::key(State::Spa, Key::PoolSpa),
        Toggle::key(State::HeaterAutoMode, Key::Heater1),
        // FILTER cycles high -> low -> off. If the pump is off the retry sends
        // another FILTER to reach low speed; if it is at low speed, turning low
        // speed off retries until the pump is back at high speed.
        Toggle {
            state: State::FilterLowSpeed,
            key: Key::Filter,
            also: Some((State::Filter, true)),
            requires_multi_speed_pump: true,
        },
    ],
};


#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn test_every_state_has_an_indicator() {
        for state in State::iter() {
            assert!(AQUALOGIC.indicator(state).is_some(), "{state} has no indicator");
        }
    }

    #[test]
    fn test_names() {
        assert_eq!(State::from_str("AUX_10").unwrap(), State::Aux10);
        assert_eq!(State::from_str("filter_low_speed").unwrap(), State::FilterLowSpeed);
        assert_eq!(Key::from_str("POOL_SPA").unwrap(), Key::PoolSpa);
        assert_eq!(Key::Heater1.to_string(), "HEATER_1");
        assert!(State::from_str("JACUZZI").is_err());
    }

    #[test]
    fn test_toggle_keys_exist() {
        for toggle in AQUALOGIC.toggles {
            assert!(AQUALOGIC.key_code(toggle.key).is_some());
        }

        assert!(AQUALOGIC.toggle(State::CheckSystem).is_none());
        assert!(AQUALOGIC.toggle(State::SystemOff).is_none());
    }

    #[test]
    fn test_key_codes_are_unique() {
        for (key, code) in AQUALOGIC.keys {
            assert_eq!(AQUALOGIC.key_for_code(*code), Some(*key));
        }
    }

    #[test]
    fn test_led_mask() {
        assert_eq!(AQUALOGIC.led_mask(State::Filter), Some(0x20));
        assert_eq!(AQUALOGIC.led_mask(State::FilterLowSpeed), None);
    }
}
