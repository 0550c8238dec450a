//! Block size and sample rate changes.

use crate::helpers::*;
use mixhost::plugin::{PluginId, Reconfiguration, WorkerState};

const DYNAMIC_URI: &str = "urn:mixhost:test#loaded-sample";

fn lv2_plugin(name: &str) -> MockPlugin {
    MockPlugin::new(PluginId::Lv2(format!("urn:mixhost:test#{name}")), name, 2)
}

fn instantiations(log: &CallLog) -> usize {
    log.count(|c| matches!(c, Call::Instantiate { .. }))
}

#[test]
fn test_ladspa_resize_in_place() {
    let plugin = MockPlugin::new(PluginId::Ladspa(1601), "Gain", 2).into_arc();
    let log = plugin.log();
    let mut module = load(&plugin, test_config(2));
    module.set_control_value(plugin.gain_port(), 2.0).unwrap();

    assert_eq!(module.block_size_strategy(), Reconfiguration::InPlace);
    let before = module.ports().audio_input_ptr(0, 0).unwrap();
    let generation = module.ports().generation();

    module.resize_buffers(256).unwrap();

    assert_eq!(instantiations(&log), 1);
    assert_eq!(module.config().block_size, 256);
    assert_eq!(module.ports().block_size(), 256);
    assert_eq!(module.ports().generation(), generation + 1);
    assert_ne!(module.ports().audio_input_ptr(0, 0).unwrap(), before);
    assert!(module.ports().is_connected(0));
    assert!(module.is_active());

    let output = process_block(&mut module, &[vec![0.5; 256], vec![0.25; 256]], 256);
    assert_eq!(output[0], vec![1.0; 256]);
    assert_eq!(output[1], vec![0.5; 256]);
    assert_eq!(log.calls().last(), Some(&Call::Run { frames: 256 }));
}

#[test]
fn test_ladspa_rate_change_reloads() {
    let plugin = MockPlugin::new(PluginId::Ladspa(1602), "Gain", 2).into_arc();
    let log = plugin.log();
    let mut module = load(&plugin, test_config(2));
    module.set_control_value(plugin.gain_port(), 0.5).unwrap();

    assert_eq!(module.sample_rate_strategy(), Reconfiguration::Reload);
    module.handle_sample_rate_change(44100.0).unwrap();

    assert_eq!(instantiations(&log), 2);
    assert_eq!(
        log.calls()
            .iter()
            .filter(|c| matches!(c, Call::Instantiate { .. }))
            .last(),
        Some(&Call::Instantiate { sample_rate: 44100.0 })
    );
    assert_eq!(module.config().sample_rate, 44100.0);
    assert_eq!(module.features().sample_rate(), 44100.0);
    assert_eq!(module.control_value(plugin.gain_port()), Some(0.5));
}

#[test]
fn test_unchanged_values_are_noops() {
    let plugin = MockPlugin::new(PluginId::Ladspa(1603), "Gain", 2).into_arc();
    let log = plugin.log();
    let mut module = load(&plugin, test_config(2));
    log.clear();

    module.resize_buffers(TEST_BLOCK_SIZE).unwrap();
    module.handle_sample_rate_change(TEST_SAMPLE_RATE).unwrap();
    assert!(log.calls().is_empty());
}

#[test]
fn test_extensible_resize_reloads_with_fresh_urid_table() {
    let plugin = lv2_plugin("granular").into_arc();
    let log = plugin.log();
    let mut module = load(&plugin, test_config(2));
    let baseline = module.urids().len();

    module.urids().intern(DYNAMIC_URI);
    assert!(module.urids().contains(DYNAMIC_URI));
    module.set_control_value(plugin.gain_port(), 3.0).unwrap();
    module.set_bypass(true);
    let old_ui = module.take_ui_endpoint().unwrap();

    assert_eq!(module.block_size_strategy(), Reconfiguration::Reload);
    module.resize_buffers(128).unwrap();

    assert_eq!(instantiations(&log), 2);
    assert!(!module.urids().contains(DYNAMIC_URI));
    assert_eq!(module.urids().len(), baseline);
    assert_eq!(module.features().max_block(), 128);

    // Strip settings survive the reload.
    assert_eq!(module.control_value(plugin.gain_port()), Some(3.0));
    assert!(module.bypass());
    assert!(module.is_active());

    assert!(!old_ui.is_connected());
    let new_ui = module.take_ui_endpoint().unwrap();
    assert!(new_ui.is_connected());
}

#[test]
fn test_fixed_block_plugin_resized_in_place() {
    let plugin = lv2_plugin("eq").fixed_block().into_arc();
    let log = plugin.log();
    let mut module = load(&plugin, test_config(2));
    module.urids().intern(DYNAMIC_URI);

    assert_eq!(module.block_size_strategy(), Reconfiguration::InPlace);
    assert_eq!(module.sample_rate_strategy(), Reconfiguration::InPlace);
    module.resize_buffers(512).unwrap();

    assert_eq!(instantiations(&log), 1);
    assert!(module.urids().contains(DYNAMIC_URI));
    assert!(log.calls().contains(&Call::Options { max_block: 512 }));

    // Deactivated around the change, then back.
    let calls = log.calls();
    let options_at = calls.iter().position(|c| matches!(c, Call::Options { .. })).unwrap();
    assert_eq!(calls[options_at - 1], Call::Deactivate);
    assert_eq!(calls[options_at + 1], Call::Activate);
}

#[test]
fn test_inactive_module_stays_inactive_after_reload() {
    let plugin = lv2_plugin("chorus").into_arc();
    let mut module = load(&plugin, test_config(2));
    module.deactivate();

    module.resize_buffers(32).unwrap();
    assert!(!module.is_active());
    assert_eq!(module.ports().block_size(), 32);
}

#[test]
fn test_worker_restarted_by_reload() {
    let plugin = lv2_plugin("sampler")
        .with_worker()
        .schedule_on_first_run(b"warm up")
        .into_arc();
    let log = plugin.log();
    let config = test_config(2).spawn_worker_thread(false);
    let mut module = load(&plugin, config);

    process_block(&mut module, &[vec![0.0; 64], vec![0.0; 64]], 64);
    assert_eq!(module.worker().pending_requests(), 1);

    module.resize_buffers(128).unwrap();

    // Fresh rings: the request queued before the reload is gone.
    assert_eq!(module.worker().state(), WorkerState::Running);
    assert_eq!(module.worker().pending_requests(), 0);

    process_block(&mut module, &[vec![0.0; 128], vec![0.0; 128]], 128);
    assert_eq!(module.worker().pending_requests(), 1);
    assert_eq!(module.worker().step(), 1);
    assert_eq!(log.count(|c| *c == Call::Work(b"warm up".to_vec())), 1);
}

#[test]
fn test_failed_reload_leaves_module_passing_audio() {
    let plugin = MockPlugin::new(PluginId::Ladspa(1604), "Gain", 2)
        .fails_after(1)
        .into_arc();
    let mut module = load(&plugin, test_config(2));
    module.set_control_value(plugin.gain_port(), 2.0).unwrap();

    assert!(module.handle_sample_rate_change(44100.0).is_err());
    assert_eq!(module.instance_count(), 0);
    assert!(!module.is_active());
    assert_eq!(module.config().sample_rate, TEST_SAMPLE_RATE);

    // Nothing to activate: the strip keeps passing audio through.
    module.activate();
    assert!(!module.is_active());

    let input = vec![generate_noise(64, 3), generate_sine(220.0, TEST_SAMPLE_RATE, 64)];
    let output = process_block(&mut module, &input, 64);
    assert!(bit_identical(&output[0], &input[0]));
    assert!(bit_identical(&output[1], &input[1]));
    assert_eq!(plugin.log().runs(), 0);
}
