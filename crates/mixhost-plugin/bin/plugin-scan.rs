//! Plugin catalog listing
//!
//! Runs one discovery and prints every plugin found, sorted by name.

use mixhost_plugin::DiscoverySession;

fn main() {
    // Initialize logging
    tracing_subscriber::fmt::init();

    let mut session = DiscoverySession::native();
    session.spawn_discover_thread();
    let plugins = session.get_all_plugins();

    for plugin in plugins.iter() {
        println!(
            "{:<6} {:>2}/{:<2} {:<40} {}",
            plugin.abi(),
            plugin.audio_inputs,
            plugin.audio_outputs,
            plugin.name,
            plugin.id
        );
    }
    tracing::info!("{} plugins found", plugins.len());
}
