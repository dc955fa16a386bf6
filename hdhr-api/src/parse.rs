//! Parsers for get/set reply values.
//!
//! Device firmware varies in spacing and in which optional fields it reports,
//! so every parser here splits on whitespace, ignores unknown keys and fills
//! absent fields with defaults. Only values that cannot mean anything (a
//! non-numeric signal level, a channel that is not a number) are errors.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::{ApiError, Result};
use crate::models::{Channel, DeviceChannel, DeviceFrequency, Features, Lineup, TunerStatus};

/// Parse a `/tunerN/status` line such as
/// `ch=8vsb:13 lock=8vsb ss=78 snq=91 seq=100 bps=19000 pps=1200`
pub fn parse_status(line: &str) -> Result<TunerStatus> {
    let mut status = TunerStatus::default();

    for token in line.split_whitespace() {
        let Some((key, value)) = token.split_once('=') else {
            continue;
        };
        match key {
            "ch" => status.channel = value.to_string(),
            "lock" => status.lock = value.to_string(),
            "ss" => status.ss = parse_percent(key, value)?,
            "snq" => status.snq = parse_percent(key, value)?,
            "seq" => status.seq = parse_percent(key, value)?,
            "bps" => status.bps = parse_number(key, value)?,
            "pps" => status.pps = parse_number(key, value)?,
            _ => {}
        }
    }

    Ok(status)
}

impl fmt::Display for TunerStatus {
    /// Renders the same `key=value` line the device reports
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ch={} lock={} ss={} snq={} seq={} bps={} pps={}",
            self.channel, self.lock, self.ss, self.snq, self.seq, self.bps, self.pps
        )
    }
}

fn parse_number(key: &str, value: &str) -> Result<u64> {
    value
        .parse()
        .map_err(|_| ApiError::ProtocolParse(format!("status field {}={:?} is not a number", key, value)))
}

fn parse_percent(key: &str, value: &str) -> Result<u8> {
    // Some firmware briefly reports values above 100 while retuning.
    Ok(parse_number(key, value)?.min(100) as u8)
}

/// Parse `/tunerN/channel`: `none` or `<modulation>:<number>`
pub fn parse_channel(value: &str) -> Result<Option<u32>> {
    let value = value.trim();
    if value.is_empty() || value.eq_ignore_ascii_case("none") {
        return Ok(None);
    }

    let number = value.rsplit(':').next().unwrap_or(value);
    number
        .parse()
        .map(Some)
        .map_err(|_| ApiError::ProtocolParse(format!("channel {:?} has no channel number", value)))
}

/// Parse `/tunerN/streaminfo`
///
/// Program lines look like `3: 13.1 WNET`; the `tsid=` line and the literal
/// `none` (no signal) carry no programs.
pub fn parse_stream_info(value: &str) -> Result<BTreeMap<u16, Channel>> {
    let mut programs = BTreeMap::new();

    for line in value.lines().map(str::trim) {
        let Some((id, rest)) = line.split_once(':') else {
            continue;
        };
        let id: u16 = id.trim().parse().map_err(|_| {
            ApiError::ProtocolParse(format!("streaminfo line {:?} has no program id", line))
        })?;

        let mut words = rest.split_whitespace();
        let program = words.next().unwrap_or_default().to_string();
        let callsign = words.collect::<Vec<_>>().join(" ");

        programs.insert(id, Channel { program, callsign });
    }

    Ok(programs)
}

/// Parse `/sys/features`, one `key: value value ...` line per capability
pub fn parse_features(value: &str) -> Features {
    let mut features = Features::default();

    for line in value.lines() {
        let Some((key, values)) = line.split_once(':') else {
            continue;
        };
        let values: Vec<String> = values.split_whitespace().map(str::to_string).collect();
        match key.trim() {
            "channelmap" => features.channel_maps = values,
            "modulation" => features.modulations = values,
            "auto-modulation" => features.auto_modulations = values,
            _ => {}
        }
    }

    features
}

/// Parse `/tunerN/lineup`
///
/// One entry per line: `<channel> <guide-number> <guide-name...>`, or
/// `<channel> none` for a channel without a mapped program.
pub fn parse_lineup(value: &str) -> Result<Lineup> {
    let mut lineup = Lineup::new();

    for line in value.lines() {
        let mut words = line.split_whitespace();
        let Some(channel) = words.next() else {
            continue;
        };
        let channel: u32 = channel.parse().map_err(|_| {
            ApiError::ProtocolParse(format!("lineup line {:?} has no channel number", line.trim()))
        })?;

        let entry = match words.next() {
            None => None,
            Some(number) if number.eq_ignore_ascii_case("none") => Some(DeviceChannel::default()),
            Some(number) => Some(DeviceChannel {
                frequency: Some(DeviceFrequency {
                    guide_number: number.to_string(),
                    guide_name: words.collect::<Vec<_>>().join(" "),
                }),
            }),
        };
        lineup.insert(channel, entry);
    }

    Ok(lineup)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    #[test]
    fn test_parse_status_full_line() {
        let status = parse_status("ch=8vsb:13 lock=8vsb ss=78 snq=91 seq=100 bps=19000 pps=1200").unwrap();
        assert_eq!(
            status,
            TunerStatus {
                channel: "8vsb:13".to_string(),
                lock: "8vsb".to_string(),
                ss: 78,
                snq: 91,
                seq: 100,
                bps: 19000,
                pps: 1200,
            }
        );
        assert!(status.is_locked());
    }

    #[test]
    fn test_parse_status_missing_and_unknown_keys() {
        let status = parse_status("  ch=none   lock=none  dbg=-450/1200 ss=0 ").unwrap();
        assert_eq!(status, TunerStatus::default());

        let status = parse_status("ss=55").unwrap();
        assert_eq!(status.ss, 55);
        assert_eq!(status.channel, "none");
        assert_eq!(status.bps, 0);
    }

    #[test]
    fn test_parse_status_clamps_percent() {
        assert_eq!(parse_status("ss=140").unwrap().ss, 100);
    }

    #[test]
    fn test_parse_status_non_numeric() {
        assert!(matches!(parse_status("ss=strong"), Err(ApiError::ProtocolParse(_))));
    }

    #[test]
    fn test_parse_status_render_is_stable() {
        let line = "ch=auto:13 lock=8vsb ss=78 snq=91 seq=100 bps=19000 pps=1200";
        let first = parse_status(line).unwrap();
        let second = parse_status(&first.to_string()).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.to_string(), line);
    }

    #[test]
    fn test_parse_status_same_line_twice() {
        let line = "ch=13 lock=8vsb ss=78 snq=91 seq=100 bps=19000 pps=1200";
        let first = parse_status(line).unwrap();
        let second = parse_status(line).unwrap();
        assert_eq!(first, second);
        assert_eq!(
            first,
            TunerStatus {
                channel: "13".to_string(),
                lock: "8vsb".to_string(),
                ss: 78,
                snq: 91,
                seq: 100,
                bps: 19_000,
                pps: 1_200,
            }
        );
    }

    #[rstest]
    #[case("auto:13", Some(13))]
    #[case("8vsb:7", Some(7))]
    #[case(" auto:36 \n", Some(36))]
    #[case("none", None)]
    #[case("", None)]
    fn test_parse_channel(#[case] input: &str, #[case] expected: Option<u32>) {
        assert_eq!(parse_channel(input).unwrap(), expected);
    }

    #[test]
    fn test_parse_channel_invalid() {
        assert!(matches!(parse_channel("auto:abc"), Err(ApiError::ProtocolParse(_))));
    }

    #[test]
    fn test_parse_stream_info() {
        let programs = parse_stream_info("3: 13.1 WNET\n4: 13.2 NJ PBS\ntsid=0x0001\n").unwrap();
        assert_eq!(programs.len(), 2);
        assert_eq!(
            programs[&3],
            Channel {
                program: "13.1".to_string(),
                callsign: "WNET".to_string(),
            }
        );
        assert_eq!(programs[&4].callsign, "NJ PBS");
    }

    #[test]
    fn test_parse_stream_info_no_signal() {
        assert!(parse_stream_info("none").unwrap().is_empty());
        assert!(parse_stream_info("").unwrap().is_empty());
    }

    #[test]
    fn test_parse_stream_info_missing_callsign() {
        let programs = parse_stream_info("5: 0").unwrap();
        assert_eq!(programs[&5].program, "0");
        assert_eq!(programs[&5].callsign, "");
    }

    #[test]
    fn test_parse_features() {
        let features = parse_features(
            "channelmap: us-bcast us-cable\nmodulation: 8vsb qam256 qam64\nauto-modulation: auto auto6t\nextra: x\n",
        );
        assert_eq!(features.channel_maps, vec!["us-bcast", "us-cable"]);
        assert_eq!(features.modulations.len(), 3);
        assert!(features.supports_auto_modulation());
    }

    #[test]
    fn test_parse_lineup() {
        let lineup = parse_lineup("13 13.1 WNET Thirteen\n7 none\n\n9\n").unwrap();
        assert_eq!(lineup.keys().copied().collect::<Vec<_>>(), vec![7, 9, 13]);

        let mapped = lineup[&13].as_ref().and_then(|c| c.frequency.as_ref()).unwrap();
        assert_eq!(mapped.guide_number, "13.1");
        assert_eq!(mapped.guide_name, "WNET Thirteen");
        assert_eq!(lineup[&7], Some(DeviceChannel::default()));
        assert_eq!(lineup[&9], None);
    }

    #[test]
    fn test_parse_lineup_invalid_channel() {
        assert!(matches!(parse_lineup("abc 13.1 WNET"), Err(ApiError::ProtocolParse(_))));
    }

    proptest! {
        #[test]
        fn test_parsers_never_panic(input in ".{0,200}") {
            let _ = parse_status(&input);
            let _ = parse_channel(&input);
            let _ = parse_stream_info(&input);
            let _ = parse_features(&input);
            let _ = parse_lineup(&input);
        }

        #[test]
        fn test_status_render_round_trip(
            ss in 0u8..=100,
            snq in 0u8..=100,
            seq in 0u8..=100,
            bps in any::<u64>(),
            pps in any::<u64>(),
        ) {
            let status = TunerStatus {
                channel: "auto:13".to_string(),
                lock: "8vsb".to_string(),
                ss, snq, seq, bps, pps,
            };
            prop_assert_eq!(parse_status(&status.to_string()).unwrap(), status);
        }
    }
}
