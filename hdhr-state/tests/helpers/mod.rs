//! Scripted in-memory `DeviceTransport` for registry and poller tests

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hdhr_api::{
    ApiError, Channel, Device, DeviceDetails, DeviceId, DeviceTransport, Features, Lineup, Result,
    Tuner, TunerState, TunerStatus,
};
use parking_lot::Mutex;

#[derive(Default)]
struct Script {
    discovered: Vec<Device>,
    reachable: HashMap<Ipv4Addr, Device>,
    details: HashMap<Ipv4Addr, Result<DeviceDetails>>,
    states: HashMap<(DeviceId, u8), VecDeque<Result<TunerState>>>,
    steady: Option<TunerState>,
    delay: Option<Duration>,
    sets: Vec<(Tuner, u32)>,
    reject_sets: bool,
}

/// Transport whose answers are set up by the test
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    script: Arc<Mutex<Script>>,
    completed_state_calls: Arc<AtomicUsize>,
    details_calls: Arc<AtomicUsize>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer broadcast discovery with `device`, and unicast discovery at its address
    pub fn with_device(self, device: Device) -> Self {
        {
            let mut script = self.script.lock();
            script.reachable.insert(device.ip, device.clone());
            script.discovered.push(device);
        }
        self
    }

    /// Answer only unicast discovery at the device's address
    pub fn with_reachable(self, device: Device) -> Self {
        self.script.lock().reachable.insert(device.ip, device);
        self
    }

    pub fn set_details(&self, ip: Ipv4Addr, details: Result<DeviceDetails>) {
        self.script.lock().details.insert(ip, details);
    }

    /// Queue one answer for the next state query of a tuner
    pub fn push_state(&self, device_id: &DeviceId, index: u8, state: Result<TunerState>) {
        self.script
            .lock()
            .states
            .entry((device_id.clone(), index))
            .or_default()
            .push_back(state);
    }

    /// Answer given once a tuner's queue is empty
    pub fn set_steady_state(&self, state: TunerState) {
        self.script.lock().steady = Some(state);
    }

    /// Delay every state query
    pub fn set_delay(&self, delay: Duration) {
        self.script.lock().delay = Some(delay);
    }

    pub fn reject_sets(&self) {
        self.script.lock().reject_sets = true;
    }

    pub fn sets(&self) -> Vec<(Tuner, u32)> {
        self.script.lock().sets.clone()
    }

    /// State queries that ran to completion, excluding abandoned ones
    pub fn completed_state_calls(&self) -> usize {
        self.completed_state_calls.load(Ordering::SeqCst)
    }

    pub fn details_calls(&self) -> usize {
        self.details_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DeviceTransport for ScriptedTransport {
    async fn discover(&self, _broadcast: Ipv4Addr) -> Result<Vec<Device>> {
        Ok(self.script.lock().discovered.clone())
    }

    async fn add_device(&self, ip: Ipv4Addr) -> Result<Device> {
        self.script
            .lock()
            .reachable
            .get(&ip)
            .cloned()
            .ok_or_else(|| ApiError::DeviceUnreachable(ip.to_string()))
    }

    async fn get_device_details(&self, device: &Device) -> Result<DeviceDetails> {
        self.details_calls.fetch_add(1, Ordering::SeqCst);
        self.script
            .lock()
            .details
            .get(&device.ip)
            .cloned()
            .unwrap_or_else(|| Err(ApiError::DeviceUnreachable(device.ip.to_string())))
    }

    async fn get_channel(&self, tuner: &Tuner) -> Result<Option<u32>> {
        Ok(self.get_tuner_state(tuner).await?.channel_number)
    }

    async fn get_stream_info(&self, tuner: &Tuner) -> Result<BTreeMap<u16, Channel>> {
        Ok(self.get_tuner_state(tuner).await?.programs)
    }

    async fn get_status(&self, tuner: &Tuner) -> Result<TunerStatus> {
        Ok(self.get_tuner_state(tuner).await?.status)
    }

    async fn get_lineup(&self, tuner: &Tuner) -> Result<Lineup> {
        Ok(self.get_tuner_state(tuner).await?.lineup)
    }

    async fn set_channel(&self, tuner: &Tuner, channel: u32) -> Result<()> {
        let mut script = self.script.lock();
        script.sets.push((tuner.clone(), channel));
        if script.reject_sets {
            return Err(ApiError::ChannelSet("ERROR: invalid channel".to_string()));
        }
        Ok(())
    }

    async fn get_tuner_state(&self, tuner: &Tuner) -> Result<TunerState> {
        let delay = self.script.lock().delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let answer = {
            let mut script = self.script.lock();
            let queued = script
                .states
                .get_mut(&(tuner.device_id.clone(), tuner.index))
                .and_then(VecDeque::pop_front);
            match queued {
                Some(answer) => answer,
                None => Ok(script.steady.clone().unwrap_or_else(TunerState::no_signal)),
            }
        };

        self.completed_state_calls.fetch_add(1, Ordering::SeqCst);
        answer
    }
}

pub fn device(id: u32, ip: [u8; 4], tuners: u8) -> Device {
    Device::new(DeviceId::from_u32(id), Ipv4Addr::from(ip)).with_tuner_count(tuners)
}

pub fn details(model: &str, tuner_count: u8) -> DeviceDetails {
    DeviceDetails {
        model: model.to_string(),
        version: "20230713".to_string(),
        copyright: String::new(),
        features: Features::default(),
        tuner_count,
    }
}

/// A locked tuner on `channel` showing one program
pub fn tuned(channel: u32, program: &str, ss: u8) -> TunerState {
    let mut programs = BTreeMap::new();
    programs.insert(
        3,
        Channel {
            program: program.to_string(),
            callsign: "WNET".to_string(),
        },
    );
    let status = TunerStatus {
        channel: format!("8vsb:{}", channel),
        lock: "8vsb".to_string(),
        ss,
        snq: 90,
        seq: 100,
        bps: 19_000_000,
        pps: 1_200,
    };
    TunerState::assemble(programs, Some(channel), status, Lineup::new())
}
