use std::time::Duration;

use aqua_core::codec::{CFG_END, CFG_START};
use aqua_core::{
    DeviceConfig, DoserError, FetchCfg, LinkProfile, LinkState, Session, TransferCfg,
};
use aqua_link::{CONFIG_HANDLE, SimHandle, SimState, SimulatedDevice, TEST_HANDLE, TIME_HANDLE};
use aqua_traits::ManualClock;
use chrono::{NaiveDate, NaiveDateTime};
use rstest::rstest;

fn eight_am() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2026, 10, 14)
        .unwrap()
        .and_hms_opt(8, 0, 0)
        .unwrap()
}

fn open(
    clock: &ManualClock,
    state: SimState,
    transfer: TransferCfg,
) -> (Session<SimulatedDevice>, SimHandle) {
    let profile = LinkProfile::default();
    let dev = SimulatedDevice::new(profile.clone(), state);
    let handle = dev.handle();
    let mut session = Session::builder()
        .with_link(dev)
        .with_profile(profile)
        .with_clock(Box::new(clock.clone()))
        .with_transfer(transfer)
        .with_fetch(FetchCfg::default())
        .build()
        .unwrap();
    session.connect("sim-aquabalance").unwrap();
    (session, handle)
}

#[rstest]
#[case(1)]
#[case(20)]
#[case(180)]
fn fetch_returns_device_document(#[case] chunk: usize) {
    let clock = ManualClock::new();
    let mut state = SimState::new(eight_am());
    state.chunk_size = chunk;
    state.config.pump_mut(2).unwrap().name = "Cálcio".into();
    let (mut s, sim) = open(&clock, state, TransferCfg::default());

    let cfg = s.fetch_config_blocking(None).unwrap();
    assert_eq!(cfg, sim.config());
    assert_eq!(s.device().unwrap().name, "AquaBalancePro");
}

#[test]
fn push_then_fetch_round_trips() {
    let clock = ManualClock::new();
    let (mut s, sim) = open(&clock, SimState::new(eight_am()), TransferCfg::default());
    let mut cfg = DeviceConfig::default();
    {
        let p = cfg.pump_mut(1).unwrap();
        p.calibration_coef = 1.125;
        p.schedules[0].enabled = true;
        p.schedules[0].hour = 7;
        p.schedules[0].dose_ml = 2.0;
    }
    s.push_config(&cfg).unwrap();
    assert_eq!(sim.config(), cfg);
    assert_eq!(s.fetch_config_blocking(None).unwrap(), cfg);
}

#[test]
fn silent_device_times_out() {
    let clock = ManualClock::new();
    let mut state = SimState::new(eight_am());
    state.behaviour.silent_config = true;
    let (mut s, _sim) = open(&clock, state, TransferCfg::default());
    assert_eq!(
        s.fetch_config_blocking(None).unwrap_err(),
        DoserError::RequestTimeout
    );
    assert!(clock.elapsed() >= Duration::from_secs(6));
}

#[test]
fn link_loss_mid_transfer_is_link_unavailable() {
    let clock = ManualClock::new();
    let mut state = SimState::new(eight_am());
    state.behaviour.drop_after_notifications = Some(5);
    let (mut s, _sim) = open(&clock, state, TransferCfg::default());
    assert_eq!(
        s.fetch_config_blocking(None).unwrap_err(),
        DoserError::LinkUnavailable
    );
    assert_eq!(s.state(), LinkState::Disconnected);
    assert!(clock.elapsed() < Duration::from_secs(6));
}

#[test]
fn second_connect_does_not_resubscribe() {
    let clock = ManualClock::new();
    let (mut s, sim) = open(&clock, SimState::new(eight_am()), TransferCfg::default());
    s.connect("sim-aquabalance").unwrap();
    assert_eq!(sim.subscription_count(CONFIG_HANDLE), 1);
    assert_eq!(sim.subscription_count(TIME_HANDLE), 1);
}

#[test]
fn status_and_garbage_status() {
    let clock = ManualClock::new();
    let (mut s, sim) = open(&clock, SimState::new(eight_am()), TransferCfg::default());
    sim.with_state(|st| {
        st.status.wifi_connected = true;
        st.status.wifi_rssi = Some(-58);
    });
    sim.push_status();
    sim.push_raw_status(b"\x00\x01garbage");
    s.pump();
    let snap = s.status().unwrap();
    assert_eq!(snap.time.as_deref(), Some("14/10/2026 08:00:00"));
    assert_eq!(snap.wifi_rssi, Some(-58));
    assert_eq!(snap.ap_ssid.as_deref(), Some("AquaBalancePro"));
}

#[test]
fn clock_sync_and_test_dose_reach_device() {
    let clock = ManualClock::new();
    let (mut s, sim) = open(&clock, SimState::new(eight_am()), TransferCfg::default());
    let later = eight_am() + chrono::Duration::minutes(95);
    s.sync_time(later).unwrap();
    assert_eq!(sim.clock(), later);

    s.test_dose(3, 0.75).unwrap();
    let logs = sim.logs();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].pump_id, 3);
    assert_eq!(logs[0].origin, "Teste");
    assert_eq!(logs[0].timestamp, later);
}

#[test]
fn refused_connect_maps_to_link_error() {
    let clock = ManualClock::new();
    let mut state = SimState::new(eight_am());
    state.behaviour.fail_connect = true;
    let profile = LinkProfile::default();
    let mut s = Session::builder()
        .with_link(SimulatedDevice::new(profile.clone(), state))
        .with_profile(profile)
        .with_clock(Box::new(clock))
        .build()
        .unwrap();
    assert!(matches!(s.connect("nowhere"), Err(DoserError::Link(_))));
    assert_eq!(s.state(), LinkState::Disconnected);
}

#[test]
fn stray_config_frames_do_not_leak_into_next_fetch() {
    let clock = ManualClock::new();
    let (mut s, sim) = open(&clock, SimState::new(eight_am()), TransferCfg::default());
    sim.push_config_frame(CFG_START);
    sim.push_config_frame(b"{\"bomb1\":{\"name\":\"Ghost\"}}");
    sim.push_config_frame(CFG_END);
    s.pump();
    assert!(s.last_config().is_none());

    sim.push_config_frame(CFG_START);
    sim.push_config_frame(b"{\"bomb1\":");
    s.pump();
    assert_eq!(s.fetch_config_blocking(None).unwrap(), sim.config());
}

#[test]
fn journal_keeps_write_order_across_channels() {
    let clock = ManualClock::new();
    let (mut s, sim) = open(&clock, SimState::new(eight_am()), TransferCfg::default());
    s.sync_time(eight_am()).unwrap();
    s.test_dose(1, 0.5).unwrap();
    let handles: Vec<_> = sim.journal().into_iter().map(|(h, _)| h).collect();
    assert_eq!(handles, vec![TIME_HANDLE, TEST_HANDLE]);
}

#[test]
fn status_wait_over_simulator() {
    let clock = ManualClock::new();
    let (mut s, sim) = open(&clock, SimState::new(eight_am()), TransferCfg::default());
    sim.push_status();
    let snap = s.wait_for_status(None).unwrap();
    assert_eq!(snap.ap_ssid.as_deref(), Some("AquaBalancePro"));
}
