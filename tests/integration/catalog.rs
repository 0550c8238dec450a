//! Discovery and host-level loading.

use crate::helpers::*;
use mixhost::prelude::*;
use mixhost::{DiscoverySession, PluginAbi};
use std::sync::Arc;

fn mixed_scanners() -> (MockScanner, MockScanner) {
    let ladspa = MockScanner::new(
        PluginAbi::Simple,
        vec![
            PluginDescriptor::new(PluginId::Ladspa(1), "Z-Reverb").audio_io(2, 2),
            PluginDescriptor::new(PluginId::Ladspa(2), "A-Delay").audio_io(1, 1),
        ],
    );
    let lv2 = MockScanner::new(
        PluginAbi::Extensible,
        vec![PluginDescriptor::new(PluginId::Lv2("urn:mixhost:test#filter".into()), "M-Filter").audio_io(2, 2)],
    );
    (ladspa, lv2)
}

fn names(catalog: &[PluginDescriptor]) -> Vec<&str> {
    catalog.iter().map(|d| d.name.as_str()).collect()
}

#[test]
fn test_catalog_sorted_across_abis() {
    let (ladspa, lv2) = mixed_scanners();
    let mut session = DiscoverySession::new().scanner(ladspa).scanner(lv2);
    session.spawn_discover_thread();

    let catalog = session.get_all_plugins();
    assert_eq!(names(&catalog), ["A-Delay", "M-Filter", "Z-Reverb"]);
    assert_eq!(catalog[1].abi(), PluginAbi::Extensible);
    assert!(!session.is_discovering());
}

#[test]
fn test_catalog_snapshot_is_stable() {
    let (ladspa, lv2) = mixed_scanners();
    let mut session = DiscoverySession::new().scanner(ladspa).scanner(lv2);
    let first = session.get_all_plugins();
    let second = session.get_all_plugins();
    assert!(Arc::ptr_eq(&first, &second));
}

#[test]
fn test_favorites_flagged() {
    let (ladspa, lv2) = mixed_scanners();
    let mut host = PluginHost::builder()
        .scanner(ladspa)
        .scanner(lv2)
        .favorites([PluginId::Ladspa(2)])
        .build();

    let catalog = host.catalog();
    let favorites: Vec<_> = catalog.iter().filter(|d| d.favorite).map(|d| d.name.as_str()).collect();
    assert_eq!(favorites, ["A-Delay"]);
}

#[test]
fn test_host_loads_from_catalog() {
    let plugin = MockPlugin::new(PluginId::Ladspa(2), "A-Delay", 1).into_arc();
    let (ladspa, lv2) = mixed_scanners();
    let mut host = PluginHost::builder()
        .scanner(ladspa)
        .scanner(lv2)
        .resolver(Arc::new(MockResolver::new([Arc::clone(&plugin)])))
        .sample_rate(TEST_SAMPLE_RATE)
        .block_size(TEST_BLOCK_SIZE)
        .channels(2)
        .build();

    assert_eq!(host.config().block_size, TEST_BLOCK_SIZE);
    let mut module = host.load(&PluginId::Ladspa(2)).unwrap();
    assert_eq!(module.instance_count(), 2);
    assert_eq!(module.descriptor().name, "A-Delay");

    let output = process_block(&mut module, &[vec![0.5; 64], vec![0.5; 64]], 64);
    assert_eq!(output, vec![vec![0.5; 64]; 2]);
}

#[test]
fn test_host_unknown_plugin() {
    let (ladspa, lv2) = mixed_scanners();
    let mut host = PluginHost::builder()
        .scanner(ladspa)
        .scanner(lv2)
        .discover_on_build(false)
        .build();

    assert!(host.find(&PluginId::Ladspa(77)).is_none());
    assert!(matches!(
        host.load(&PluginId::Ladspa(77)),
        Err(Error::NotFound(PluginId::Ladspa(77)))
    ));
}

#[test]
fn test_host_surfaces_load_errors() {
    let (ladspa, lv2) = mixed_scanners();
    let mut host = PluginHost::builder()
        .scanner(ladspa)
        .scanner(lv2)
        .resolver(Arc::new(MockResolver::default()))
        .build();

    let result = host.load(&PluginId::Ladspa(1));
    assert!(matches!(
        result,
        Err(Error::Plugin(mixhost::plugin::PluginError::LoadFailed { .. }))
    ));
}
