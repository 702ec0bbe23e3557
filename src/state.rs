//! Last-known values reported by the controller, and the rules that update
//! them from decoded frames.

use packed_struct::prelude::*;
use strum::IntoEnumIterator;
use tracing::{debug, info, warn};

use crate::protocol::{frames::{Frame, FrameType, LedsPayload, PumpStatusPayload}, table::{ControllerTable, Indicator, State}};


/// Vendor degree sign on the display
const DISPLAY_DEGREE: u8 = 0xdf;


#[derive(Clone, Debug, Default, PartialEq)]
pub struct DeviceState {
    /// Temperature and salt level units
    pub is_metric: bool,

    pub air_temp: Option<i32>,
    pub pool_temp: Option<i32>,
    pub spa_temp: Option<i32>,

    /// Chlorinator output, percent
    pub pool_chlorinator: Option<u8>,
    pub spa_chlorinator: Option<u8>,

    /// g/L when metric, otherwise PPM
    pub salt_level: Option<f32>,

    /// Percent. Requires a Hayward VSP pump on the bus
    pub pump_speed: Option<u16>,
    /// Watts. Requires a Hayward VSP pump on the bus
    pub pump_power: Option<u16>,

    /// LEDs that are lit (flashing LEDs included)
    pub states: u32,
    /// LEDs that are flashing
    pub flashing_states: u32,

    pub heater_auto_mode: bool,

    pub check_system_msg: Option<String>,

    /// Latched once a pump status frame has been seen
    pub multi_speed_pump: bool,
}

impl DeviceState {
    /// Value of `state` as last reported by the controller.
    pub fn observed(&self, table: &ControllerTable, state: State) -> bool {
        match table.indicator(state) {
            Some(Indicator::Led(bit)) => self.states & (1 << bit) != 0,
            Some(Indicator::Flashing(bit)) => self.flashing_states & (1 << bit) != 0,
            Some(Indicator::HeaterAutoMode) => self.heater_auto_mode,
            None => false,
        }
    }

    /// All states currently enabled, synthetic ones included.
    pub fn enabled_states(&self, table: &ControllerTable) -> Vec<State> {
        State::iter()
            .filter(|state| self.observed(table, *state))
            .collect()
    }

    /// The check system message, only while the CHECK_SYSTEM LED is lit.
    pub fn check_system_message(&self, table: &ControllerTable) -> Option<&str> {
        if self.observed(table, State::CheckSystem) {
            self.check_system_msg.as_deref()
        } else {
            None
        }
    }

    /// Apply a frame. Returns true if any value changed.
    pub fn dispatch(&mut self, table: &ControllerTable, frame: &Frame) -> bool {
        let before = self.clone();

        self.apply(table, frame);

        *self != before
    }

    fn apply(&mut self, table: &ControllerTable, frame: &Frame) {
        let payload = &frame.payload[..];

        match frame.frame_type {
            FrameType::KeepAlive => {},

            FrameType::LocalWiredKeyEvent
            | FrameType::RemoteWiredKeyEvent
            | FrameType::WirelessKeyEvent
            | FrameType::OnOffEvent => {
                let key = frame.key_code().and_then(|code| table.key_for_code(code));
                match key {
                    Some(key) => info!("{:?}: {key}", frame.frame_type),
                    None => info!("{:?}: {payload:02x?}", frame.frame_type),
                }
            },

            FrameType::Leds => {
                debug!("LEDs: {payload:02x?}");

                let leds = match payload.get(..8).map(LedsPayload::unpack_from_slice) {
                    Some(Ok(leds)) => leds,
                    _ => {
                        warn!("malformed LED frame: {payload:02x?}");
                        return;
                    }
                };

                // a flashing LED counts as on
                self.states = leds.on | leds.flashing;
                self.flashing_states = leds.flashing;
            },

            FrameType::PumpSpeedRequest => {
                let [hi, lo, ..] = payload else {
                    warn!("malformed pump speed request: {payload:02x?}");
                    return;
                };

                let speed = u16::from_be_bytes([*hi, *lo]);
                debug!("pump speed request: {speed}%");

                self.pump_speed = Some(speed);
            },

            FrameType::PumpStatus => {
                let status = match payload.get(..5).map(PumpStatusPayload::unpack_from_slice) {
                    Some(Ok(status)) => status,
                    _ => {
                        warn!("malformed pump status: {payload:02x?}");
                        return;
                    }
                };

                let power = status.power();
                debug!("pump speed: {}%, power: {power} watts", status.speed);

                self.multi_speed_pump = true;
                self.pump_speed = Some(status.speed as u16);
                self.pump_power = Some(power);
            },

            FrameType::DisplayUpdate => {
                let text = display_text(payload);
                debug!("display update: {text:?}");

                self.apply_display(&text);
            },

            FrameType::LongDisplayUpdate => {
                debug!("long display update: {payload:02x?}");
            },

            FrameType::Unknown(tag) => {
                info!("unknown frame: {tag:04x} {payload:02x?}");
            }
        }
    }

    fn apply_display(&mut self, text: &str) {
        let parts: Vec<&str> = text.split_whitespace().collect();

        let (first, second, rest) = match &parts[..] {
            [first, second, rest @ ..] => (*first, *second, rest),
            _ => return,
        };

        let parsed = match (first, second) {
            ("Pool", "Temp") => parse_temperature(rest).map(|(value, metric)| {
                self.pool_temp = Some(value);
                self.is_metric = metric;
            }),
            ("Spa", "Temp") => parse_temperature(rest).map(|(value, metric)| {
                self.spa_temp = Some(value);
                self.is_metric = metric;
            }),
            ("Air", "Temp") => parse_temperature(rest).map(|(value, metric)| {
                self.air_temp = Some(value);
                self.is_metric = metric;
            }),
            ("Pool", "Chlorinator") => parse_percent(rest).map(|value| {
                self.pool_chlorinator = Some(value);
            }),
            ("Spa", "Chlorinator") => parse_percent(rest).map(|value| {
                self.spa_chlorinator = Some(value);
            }),
            ("Salt", "Level") => parse_salt(rest).map(|(value, metric)| {
                self.salt_level = Some(value);
                if let Some(metric) = metric {
                    self.is_metric = metric;
                }
            }),
            ("Check", "System") => {
                self.check_system_msg = Some(rest.join(" "));
                Some(())
            },
            ("Heater1", mode) => {
                self.heater_auto_mode = mode == "Auto";
                Some(())
            },
            _ => Some(()),
        };

        if parsed.is_none() {
            debug!("unparseable display line: {text:?}");
        }
    }
}

/// Decode display text, mapping the vendor degree sign.
pub fn display_text(payload: &[u8]) -> String {
    payload.iter()
        .map(|b| match *b {
            DISPLAY_DEGREE => '°',
            // latin-1
            other => other as char,
        })
        .collect()
}

/// `<temp>°[C|F]`
fn parse_temperature(rest: &[&str]) -> Option<(i32, bool)> {
    let token = rest.first()?;
    let unit = token.chars().last()?;
    let value = token[..token.len() - unit.len_utf8()].trim_end_matches('°');

    Some((value.parse().ok()?, unit == 'C'))
}

/// `<value>%`
fn parse_percent(rest: &[&str]) -> Option<u8> {
    rest.first()?.trim_end_matches('%').parse().ok()
}

/// `<value> [g/L|PPM]`
fn parse_salt(rest: &[&str]) -> Option<(f32, Option<bool>)> {
    let value = rest.first()?.parse().ok()?;
    let metric = rest.get(1).map(|unit| *unit == "g/L");

    Some((value, metric))
}


#[cfg(test)]
mod tests {
    use rstest::rstest;

    use crate::protocol::table::AQUALOGIC;

    use super::*;

    fn display(text: &[u8]) -> Frame {
        Frame::new(FrameType::DisplayUpdate, text.to_vec())
    }

    fn leds(on: u32, flashing: u32) -> Frame {
        let mut payload = on.to_le_bytes().to_vec();
        payload.extend(flashing.to_le_bytes());
        Frame::new(FrameType::Leds, payload)
    }

    #[test]
    fn test_leds() {
        let mut state = DeviceState::default();

        let filter = AQUALOGIC.led_mask(State::Filter).unwrap();
        let pool = AQUALOGIC.led_mask(State::Pool).unwrap();

        assert!(state.dispatch(&AQUALOGIC, &leds(filter | pool, filter)));

        let enabled = state.enabled_states(&AQUALOGIC);
        assert!(enabled.contains(&State::Pool));
        assert!(enabled.contains(&State::Filter));
        assert!(enabled.contains(&State::FilterLowSpeed));
        assert!(!enabled.contains(&State::Spa));

        assert!(state.observed(&AQUALOGIC, State::Filter));

        // same reading again
        assert!(!state.dispatch(&AQUALOGIC, &leds(filter | pool, filter)));

        // filter stops flashing
        assert!(state.dispatch(&AQUALOGIC, &leds(filter | pool, 0)));
        assert!(!state.observed(&AQUALOGIC, State::FilterLowSpeed));
        assert!(state.observed(&AQUALOGIC, State::Filter));
    }

    #[test]
    fn test_flashing_only_counts_as_on() {
        let mut state = DeviceState::default();
        let lights = AQUALOGIC.led_mask(State::Lights).unwrap();

        state.dispatch(&AQUALOGIC, &leds(0, lights));
        assert!(state.observed(&AQUALOGIC, State::Lights));
    }

    #[test]
    fn test_short_leds_frame_ignored() {
        let mut state = DeviceState::default();
        let frame = Frame::new(FrameType::Leds, vec![0xff, 0xff]);

        assert!(!state.dispatch(&AQUALOGIC, &frame));
    }

    #[test]
    fn test_temperatures() {
        let mut state = DeviceState::default();

        assert!(state.dispatch(&AQUALOGIC, &display(b"Air Temp   -6\xdfC")));
        assert_eq!(state.air_temp, Some(-6));
        assert!(state.is_metric);

        assert!(state.dispatch(&AQUALOGIC, &display(b"  Pool Temp 78\xdfF ")));
        assert_eq!(state.pool_temp, Some(78));
        assert!(!state.is_metric);

        assert!(!state.dispatch(&AQUALOGIC, &display(b"  Pool Temp 78\xdfF ")));

        state.dispatch(&AQUALOGIC, &display(b"Spa Temp 101\xdfF"));
        assert_eq!(state.spa_temp, Some(101));
    }

    #[rstest]
    #[case("-6\u{b0}C", Some((-6, true)))]
    #[case("78\u{b0}F", Some((78, false)))]
    #[case("104F", Some((104, false)))]
    #[case("--\u{b0}F", None)]
    #[case("", None)]
    fn test_parse_temperature(#[case] token: &str, #[case] expected: Option<(i32, bool)>) {
        assert_eq!(parse_temperature(&[token]), expected);
    }

    #[test]
    fn test_chlorinator_and_salt() {
        let mut state = DeviceState::default();

        state.dispatch(&AQUALOGIC, &display(b"Pool Chlorinator 50%"));
        state.dispatch(&AQUALOGIC, &display(b"Spa Chlorinator 3%"));
        state.dispatch(&AQUALOGIC, &display(b"Salt Level 3.1 g/L"));

        assert_eq!(state.pool_chlorinator, Some(50));
        assert_eq!(state.spa_chlorinator, Some(3));
        assert_eq!(state.salt_level, Some(3.1));
        assert!(state.is_metric);

        state.dispatch(&AQUALOGIC, &display(b"Salt Level 3100 PPM"));
        assert_eq!(state.salt_level, Some(3100.0));
        assert!(!state.is_metric);
    }

    #[test]
    fn test_unparseable_value_is_ignored() {
        let mut state = DeviceState::default();

        state.dispatch(&AQUALOGIC, &display(b"Pool Temp 20\xdfC"));
        assert!(!state.dispatch(&AQUALOGIC, &display(b"Pool Temp --\xdfC")));
        assert_eq!(state.pool_temp, Some(20));

        assert!(!state.dispatch(&AQUALOGIC, &display(b"Pool Temp")));
        assert!(!state.dispatch(&AQUALOGIC, &display(b"Menu")));
    }

    #[test]
    fn test_check_system() {
        let mut state = DeviceState::default();

        state.dispatch(&AQUALOGIC, &display(b"Check System Low Salt"));
        assert_eq!(state.check_system_msg.as_deref(), Some("Low Salt"));
        assert_eq!(state.check_system_message(&AQUALOGIC), None);

        let check = AQUALOGIC.led_mask(State::CheckSystem).unwrap();
        state.dispatch(&AQUALOGIC, &leds(check, 0));
        assert_eq!(state.check_system_message(&AQUALOGIC), Some("Low Salt"));
    }

    #[test]
    fn test_display_text() {
        assert_eq!(display_text(b"Pool Temp 80\xdfF  "), "Pool Temp 80°F  ");
        assert_eq!(display_text(b"Salt Level 3.2 g/L"), "Salt Level 3.2 g/L");
    }

    #[test]
    fn test_heater_auto_mode() {
        let mut state = DeviceState::default();

        assert!(state.dispatch(&AQUALOGIC, &display(b"Heater1 Auto Control")));
        assert!(state.observed(&AQUALOGIC, State::HeaterAutoMode));

        assert!(state.dispatch(&AQUALOGIC, &display(b"Heater1 Manual Off")));
        assert!(!state.observed(&AQUALOGIC, State::HeaterAutoMode));
    }

    #[test]
    fn test_pump() {
        let mut state = DeviceState::default();

        let request = Frame::new(FrameType::PumpSpeedRequest, vec![0x00, 0x4b]);
        assert!(state.dispatch(&AQUALOGIC, &request));
        assert_eq!(state.pump_speed, Some(75));
        assert!(!state.multi_speed_pump);

        let status = Frame::new(FrameType::PumpStatus, vec![0x00, 0x00, 0x32, 0x21, 0x05, 0x00]);
        assert!(state.dispatch(&AQUALOGIC, &status));
        assert_eq!(state.pump_speed, Some(50));
        assert_eq!(state.pump_power, Some(2105));
        assert!(state.multi_speed_pump);

        let short = Frame::new(FrameType::PumpStatus, vec![0x00, 0x00, 0x32]);
        assert!(!state.dispatch(&AQUALOGIC, &short));
    }

    #[test]
    fn test_frames_without_state() {
        let mut state = DeviceState::default();

        assert!(!state.dispatch(&AQUALOGIC, &Frame::keep_alive()));
        assert!(!state.dispatch(&AQUALOGIC, &Frame::key_event(0x0100)));
        assert!(!state.dispatch(&AQUALOGIC, &Frame::new(FrameType::Unknown(0x0505), vec![1, 2, 3])));
        assert_eq!(state, DeviceState::default());
    }
}
