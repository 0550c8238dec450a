//! Module lifecycle: load, process, bypass, controls, latency, unload.

use crate::helpers::*;
use approx::assert_relative_eq;
use mixhost::plugin::{PluginError, PluginId, PluginModule, MAX_IMPULSE_FRAMES};
use std::sync::Arc;

fn stereo_gain() -> Arc<MockPlugin> {
    MockPlugin::new(PluginId::Ladspa(1501), "Stereo Gain", 2).into_arc()
}

#[test]
fn test_load_activates_and_runs() {
    let plugin = stereo_gain();
    let log = plugin.log();
    let mut module = load(&plugin, test_config(2));

    assert!(module.is_active());
    assert_eq!(module.instance_count(), 1);
    assert_eq!(
        log.calls()[..2],
        [
            Call::Instantiate {
                sample_rate: TEST_SAMPLE_RATE
            },
            Call::Activate
        ]
    );

    module.set_control_value(plugin.gain_port(), 2.0).unwrap();
    let input = vec![vec![0.5; 64], vec![-0.25; 64]];
    let output = process_block(&mut module, &input, 64);

    assert_eq!(output[0], vec![1.0; 64]);
    assert_eq!(output[1], vec![-0.5; 64]);
    assert_eq!(log.runs(), 1);
}

#[test]
fn test_gain_on_sine() {
    let plugin = stereo_gain();
    let mut module = load(&plugin, test_config(2));
    module.set_control_value(plugin.gain_port(), 0.5).unwrap();

    let sine = generate_sine(1000.0, TEST_SAMPLE_RATE, 64);
    let output = process_block(&mut module, &[sine.clone(), sine.clone()], 64);
    for (out, x) in output[0].iter().zip(&sine) {
        assert_relative_eq!(*out, x * 0.5, epsilon = 1e-6);
    }
}

#[test]
fn test_mono_plugin_instantiated_per_channel() {
    let plugin = MockPlugin::new(PluginId::Ladspa(1502), "Mono Gain", 1).into_arc();
    let log = plugin.log();
    let mut module = load(&plugin, test_config(2));

    assert_eq!(module.instance_count(), 2);
    assert_eq!(log.count(|c| matches!(c, Call::Instantiate { .. })), 2);

    module.set_control_value(plugin.gain_port(), 3.0).unwrap();
    let output = process_block(&mut module, &[vec![1.0; 64], vec![0.5; 64]], 64);
    assert_eq!(output[0], vec![3.0; 64]);
    assert_eq!(output[1], vec![1.5; 64]);
    assert_eq!(log.runs(), 2);
}

#[test]
fn test_channel_mismatch_refused() {
    let plugin = MockPlugin::new(PluginId::Ladspa(1503), "Surround", 3).into_arc();
    let result = PluginModule::load_with(
        &plugin.descriptor(),
        Arc::new(MockResolver::new([Arc::clone(&plugin)])),
        test_config(2),
    );
    assert!(matches!(
        result,
        Err(PluginError::ChannelMismatch {
            plugin_inputs: 3,
            channels: 2,
            ..
        })
    ));
    assert_eq!(plugin.log().count(|c| matches!(c, Call::Instantiate { .. })), 0);
}

#[test]
fn test_mono_worker_plugin_not_duplicated() {
    let plugin = MockPlugin::new(PluginId::Lv2("urn:mixhost:test#mono-sampler".into()), "Mono Sampler", 1)
        .with_worker()
        .into_arc();
    let result = PluginModule::load_with(
        &plugin.descriptor(),
        Arc::new(MockResolver::new([Arc::clone(&plugin)])),
        test_config(2),
    );
    assert!(matches!(result, Err(PluginError::ChannelMismatch { .. })));
}

#[test]
fn test_missing_required_feature() {
    let plugin = MockPlugin::new(PluginId::Lv2("urn:mixhost:test#needy".into()), "Needy", 2)
        .requires("urn:mixhost:test#teleport")
        .into_arc();
    let result = PluginModule::load_with(
        &plugin.descriptor(),
        Arc::new(MockResolver::new([Arc::clone(&plugin)])),
        test_config(2),
    );
    match result {
        Err(PluginError::MissingFeature { feature, .. }) => {
            assert_eq!(feature, "urn:mixhost:test#teleport");
        }
        other => panic!("expected MissingFeature, got {other:?}"),
    }
}

#[test]
fn test_implicit_features_not_missing() {
    let plugin = MockPlugin::new(PluginId::Lv2("urn:mixhost:test#live".into()), "Live", 2)
        .requires(mixhost::plugin::uri::LV2_IS_LIVE)
        .requires(mixhost::plugin::uri::URID_MAP)
        .into_arc();
    let module = load(&plugin, test_config(2));
    assert!(module.features().provides(mixhost::plugin::uri::URID_MAP));
}

#[test]
fn test_unresolvable_plugin() {
    let descriptor = mixhost::PluginDescriptor::new(PluginId::Ladspa(9999), "Ghost");
    let result = PluginModule::load_with(&descriptor, Arc::new(MockResolver::default()), test_config(2));
    assert!(matches!(result, Err(PluginError::LoadFailed { .. })));
}

#[test]
fn test_bypass_is_bit_identical() {
    let plugin = stereo_gain();
    let log = plugin.log();
    let mut module = load(&plugin, test_config(2));
    module.set_control_value(plugin.gain_port(), 3.0).unwrap();

    let input = vec![generate_noise(64, 7), generate_sine(440.0, TEST_SAMPLE_RATE, 64)];
    module.set_bypass(true);
    assert!(module.bypass());
    let output = process_block(&mut module, &input, 64);

    assert!(bit_identical(&output[0], &input[0]));
    assert!(bit_identical(&output[1], &input[1]));
    assert_eq!(log.runs(), 0);

    module.set_bypass(false);
    let output = process_block(&mut module, &input, 64);
    assert!(!bit_identical(&output[0], &input[0]));
    assert_eq!(log.runs(), 1);
}

#[test]
fn test_inactive_module_passes_audio() {
    let plugin = stereo_gain();
    let log = plugin.log();
    let mut module = load(&plugin, test_config(2));
    module.set_control_value(plugin.gain_port(), 2.0).unwrap();

    module.deactivate();
    assert!(!module.is_active());
    let input = vec![vec![0.125; 64], vec![0.75; 64]];
    let output = process_block(&mut module, &input, 64);
    assert_eq!(output, input);
    assert_eq!(log.runs(), 0);

    module.activate();
    let output = process_block(&mut module, &input, 64);
    assert_eq!(output[0], vec![0.25; 64]);
}

#[test]
fn test_frames_clamped_to_block_size() {
    let plugin = stereo_gain();
    let log = plugin.log();
    let mut module = load(&plugin, test_config(2));

    process_block(&mut module, &[vec![0.0; 256], vec![0.0; 256]], 256);
    assert_eq!(log.calls().last(), Some(&Call::Run { frames: TEST_BLOCK_SIZE }));
}

#[test]
fn test_control_values_validated() {
    let plugin = stereo_gain();
    let mut module = load(&plugin, test_config(2));
    let gain = plugin.gain_port();

    assert_eq!(module.control_value(gain), Some(1.0));
    assert_eq!(module.set_control_value(gain, 9.0).unwrap(), 4.0);
    assert_eq!(module.set_control_value(gain, -1.0).unwrap(), 0.0);
    assert_eq!(module.set_control_value(gain, f32::NAN).unwrap(), 1.0);

    assert!(matches!(
        module.set_control_value(0, 1.0),
        Err(PluginError::NotControlInput(0))
    ));
    assert!(matches!(
        module.set_control_value(gain + 1, 1.0),
        Err(PluginError::NotControlInput(_))
    ));
    assert!(matches!(
        module.set_control_value(42, 1.0),
        Err(PluginError::InvalidPort(42))
    ));
}

#[test]
fn test_latency_applies_from_next_block() {
    let plugin = MockPlugin::new(PluginId::Ladspa(1504), "Lookahead", 2)
        .reports_latency(128)
        .into_arc();
    let mut module = load(&plugin, test_config(2));
    let mut ui = module.take_ui_endpoint().unwrap();
    let input = vec![vec![0.0; 64]; 2];

    assert_eq!(module.latency(), 0);
    process_block(&mut module, &input, 64);
    assert_eq!(module.latency(), 0);
    process_block(&mut module, &input, 64);
    assert_eq!(module.latency(), 128);
    process_block(&mut module, &input, 64);

    // Only the change is reported to the UI.
    let events = ui.drain_plugin_events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].port, 5);
    assert_eq!(events[0].as_f32(), Some(128.0));
}

#[test]
fn test_impulse_response_matches_gain() {
    let plugin = stereo_gain();
    let log = plugin.log();
    let mut module = load(&plugin, test_config(2));
    module.set_control_value(plugin.gain_port(), 2.5).unwrap();

    // Longer than one block, and not a multiple of it.
    let response = module.impulse_response(150).unwrap();
    assert_eq!(response.len(), 2);
    for channel in &response {
        assert_eq!(channel.len(), 150);
        assert_relative_eq!(channel[0], 2.5);
        assert!(channel[1..].iter().all(|&s| s == 0.0));
    }

    // Rendered on a scratch instance; the strip itself did not run.
    assert_eq!(log.count(|c| matches!(c, Call::Instantiate { .. })), 2);
    assert_eq!(log.runs(), 3);
    assert_eq!(module.instance_count(), 1);
    assert!(module.is_active());
    let output = process_block(&mut module, &[vec![1.0; 64], vec![1.0; 64]], 64);
    assert_eq!(output[0], vec![2.5; 64]);
}

#[test]
fn test_impulse_response_is_bounded() {
    let plugin = stereo_gain();
    let module = load(&plugin, test_config(2));
    assert!(module.impulse_response(0).unwrap().iter().all(Vec::is_empty));
    let response = module.impulse_response(usize::MAX).unwrap();
    assert_eq!(response[0].len(), MAX_IMPULSE_FRAMES);
}

#[test]
fn test_impulse_response_refused_for_worker_plugins() {
    let plugin = MockPlugin::new(PluginId::Lv2("urn:mixhost:test#granular".into()), "Granular", 2)
        .with_worker()
        .into_arc();
    let module = load(&plugin, test_config(2));
    assert!(matches!(
        module.impulse_response(64),
        Err(PluginError::MissingFeature { .. })
    ));
}

#[test]
fn test_unload_deactivates() {
    let plugin = stereo_gain();
    let log = plugin.log();
    let mut module = load(&plugin, test_config(2));
    let ui = module.take_ui_endpoint().unwrap();
    assert!(ui.is_connected());

    drop(module);
    assert_eq!(log.calls().last(), Some(&Call::Deactivate));
    assert!(!ui.is_connected());
}
