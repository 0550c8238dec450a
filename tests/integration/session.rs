//! Presets, plugin state, strip snapshots and UI traffic.

use crate::helpers::*;
use mixhost::plugin::{EventError, ModuleState, PluginError, PluginId, Preset};
use std::sync::Arc;

fn reverb() -> MockPlugin {
    MockPlugin::new(PluginId::Lv2("urn:mixhost:test#reverb".into()), "Reverb", 2)
}

#[test]
fn test_apply_preset() {
    let plugin = reverb()
        .preset(
            Preset::new("urn:mixhost:test#reverb-hall", "Hall")
                .value("gain", 3.5)
                .value("in_0", 1.0)
                .value("size", 0.8),
        )
        .preset(Preset::new("urn:mixhost:test#reverb-room", "Room").value("gain", 0.5))
        .into_arc();
    let mut module = load(&plugin, test_config(2));

    assert_eq!(module.presets().len(), 2);
    assert_eq!(module.current_preset(), None);

    // Audio port and unknown symbol are skipped.
    assert_eq!(module.apply_preset(0).unwrap(), 1);
    assert_eq!(module.control_value(plugin.gain_port()), Some(3.5));
    assert_eq!(module.current_preset(), Some("urn:mixhost:test#reverb-hall"));

    assert_eq!(module.apply_preset(1).unwrap(), 1);
    assert_eq!(module.control_value(plugin.gain_port()), Some(0.5));

    assert!(matches!(module.apply_preset(2), Err(PluginError::InvalidPreset(2))));
    assert_eq!(module.current_preset(), Some("urn:mixhost:test#reverb-room"));
}

#[test]
fn test_plugin_state_roundtrip() {
    let plugin = reverb().with_state().into_arc();
    let log = plugin.log();
    let mut module = load(&plugin, test_config(2));

    plugin.set_blob(b"impulse.wav");
    let saved = module.save_state().unwrap();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].key, BLOB_KEY);
    assert_eq!(saved[0].value, b"impulse.wav");

    plugin.set_blob(b"");
    log.clear();
    module.restore_state(&saved).unwrap();
    assert_eq!(plugin.blob(), b"impulse.wav");

    // Without thread-safe restore the plugin is paused around the call.
    assert!(!module.has_safe_restore());
    assert_eq!(
        log.calls(),
        vec![Call::Deactivate, Call::Restore { properties: 1 }, Call::Activate]
    );
    assert!(module.is_active());
}

#[test]
fn test_restore_reaches_every_channel_instance() {
    let plugin = MockPlugin::new(PluginId::Lv2("urn:mixhost:test#mono-convolver".into()), "Mono Convolver", 1)
        .with_state()
        .into_arc();
    let log = plugin.log();
    let mut module = load(&plugin, test_config(2));
    assert_eq!(module.instance_count(), 2);

    plugin.set_blob(b"cathedral.wav");
    let saved = module.save_state().unwrap();
    log.clear();
    module.restore_state(&saved).unwrap();

    assert_eq!(log.count(|c| *c == Call::Restore { properties: 1 }), 2);
    assert_eq!(log.count(|c| *c == Call::Deactivate), 2);
    assert_eq!(log.count(|c| *c == Call::Activate), 2);
    let first_restore = log.position(|c| matches!(c, Call::Restore { .. })).unwrap();
    let first_activate = log.position(|c| *c == Call::Activate).unwrap();
    assert!(first_restore < first_activate);
    assert!(module.is_active());
}

#[test]
fn test_thread_safe_restore_keeps_running() {
    let plugin = reverb().with_state().thread_safe_restore().into_arc();
    let log = plugin.log();
    let mut module = load(&plugin, test_config(2));
    assert!(module.has_safe_restore());

    plugin.set_blob(b"plate");
    let saved = module.save_state().unwrap();
    log.clear();
    module.restore_state(&saved).unwrap();
    assert_eq!(log.calls(), vec![Call::Restore { properties: 1 }]);
}

#[test]
fn test_state_without_interface() {
    let plugin = reverb().into_arc();
    let mut module = load(&plugin, test_config(2));

    assert!(module.save_state().unwrap().is_empty());
    assert!(matches!(module.restore_state(&[]), Err(PluginError::State(_))));
    assert!(module.is_active());
}

#[test]
fn test_module_state_survives_session_entries() {
    let plugin = reverb()
        .preset(Preset::new("urn:mixhost:test#reverb-hall", "Hall").value("gain", 2.5))
        .into_arc();
    let mut module = load(&plugin, test_config(2));
    module.apply_preset(0).unwrap();
    module.set_bypass(true);

    let entries = module.module_state().to_entries();
    let state = ModuleState::from_entries(entries).unwrap();
    assert_eq!(state.plugin, plugin.descriptor().id);
    assert_eq!(state.control("gain"), Some(2.5));

    let mut restored = load(&plugin, test_config(2));
    restored.restore_module_state(&state);
    assert_eq!(restored.control_value(plugin.gain_port()), Some(2.5));
    assert_eq!(restored.current_preset(), Some("urn:mixhost:test#reverb-hall"));
    assert!(restored.bypass());
}

#[test]
fn test_ui_control_applied_next_block() {
    let plugin = reverb().into_arc();
    let mut module = load(&plugin, test_config(2));
    let mut ui = module.take_ui_endpoint().unwrap();
    assert!(module.take_ui_endpoint().is_none());

    ui.send_control(plugin.gain_port(), 2.0).unwrap();
    assert_eq!(module.control_value(plugin.gain_port()), Some(1.0));

    let output = process_block(&mut module, &[vec![0.5; 64], vec![0.5; 64]], 64);
    assert_eq!(module.control_value(plugin.gain_port()), Some(2.0));
    assert_eq!(output[0], vec![1.0; 64]);

    // Clamped like any other control write.
    ui.send_control(plugin.gain_port(), 100.0).unwrap();
    process_block(&mut module, &[vec![0.5; 64], vec![0.5; 64]], 64);
    assert_eq!(module.control_value(plugin.gain_port()), Some(4.0));
}

#[test]
fn test_ui_ring_full_is_reported() {
    let plugin = reverb().into_arc();
    let mut module = load(&plugin, test_config(2).event_ring_size(64));
    let mut ui = module.take_ui_endpoint().unwrap();

    // 12-byte header plus a 4-byte float per control event.
    for i in 0..4 {
        ui.send_control(plugin.gain_port(), i as f32).unwrap();
    }
    assert_eq!(ui.send_control(plugin.gain_port(), 0.5), Err(EventError::RingFull));

    process_block(&mut module, &[vec![0.0; 64], vec![0.0; 64]], 64);
    assert_eq!(module.control_value(plugin.gain_port()), Some(3.0));
    assert_eq!(ui.send_control(plugin.gain_port(), 0.5), Ok(()));
}

#[test]
fn test_saved_state_reloads_through_host() {
    let plugin = reverb().into_arc();
    let mut host = mixhost::PluginHost::builder()
        .scanner(MockScanner::new(
            mixhost::PluginAbi::Extensible,
            vec![plugin.descriptor()],
        ))
        .resolver(Arc::new(MockResolver::new([Arc::clone(&plugin)])))
        .block_size(TEST_BLOCK_SIZE)
        .build();

    let mut state = ModuleState::new(plugin.descriptor().id);
    state.controls.push(mixhost::plugin::ControlValue {
        symbol: "gain".into(),
        value: 0.25,
    });
    state.bypass = true;

    let module = host.restore(&state).unwrap();
    assert_eq!(module.control_value(plugin.gain_port()), Some(0.25));
    assert!(module.bypass());
    assert_eq!(module.config().block_size, TEST_BLOCK_SIZE);
}
